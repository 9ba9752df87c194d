//! mapping one parsed TransXChange service onto the store: operator
//! resolution, deferral to better sources, service reconciliation and the
//! route/trip hand-off.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::warn;

use omnibus_core::import::reconcile::{
    find_service, resolve_operator, should_defer_to_other_source, unique_service_code,
    IncomingService, OperatorRef,
};
use omnibus_core::import::text::title_case;
use omnibus_core::import::ImportContext;
use omnibus_core::model::{OperatorId, Service};
use omnibus_core::store::Store;

use crate::import::journeys::handle_journeys;
use crate::import::{ResolvedStop, ServiceDescriptions};
use crate::txc::{TransXChangeDocument, TxcService};
use crate::TxcError;

/// TNDS documents are named like `ea_21-45A-_-y08-1.xml`; everything but
/// the trailing version number is the region's service code
pub fn service_code_from_filename(filename: &str) -> Option<String> {
    let stem = Path::new(filename).file_name()?.to_str()?;
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() != 5 {
        return None;
    }
    let net = parts[0].split('_').next()?;
    if net.len() <= 3 && !net.is_empty() && net.chars().all(|c| c.is_ascii_lowercase()) {
        Some(parts[..4].join("-"))
    } else {
        None
    }
}

/// the operators a service's journeys actually reference, resolved to rows.
/// a document may list operators its journeys never use.
fn service_operators(
    store: &Store,
    ctx: &mut ImportContext,
    document: &TransXChangeDocument,
    service: &TxcService,
) -> Vec<OperatorId> {
    let mut wanted: Vec<&crate::txc::TxcOperator> = document.operators.iter().collect();
    if document.operators.len() > 1 {
        let referenced: HashSet<&str> = document
            .vehicle_journeys
            .iter()
            .filter(|journey| journey.service_ref == service.service_code)
            .filter_map(|journey| journey.operator_ref.as_deref())
            .chain(service.registered_operator_ref.as_deref())
            .collect();
        wanted.retain(|operator| referenced.contains(operator.id.as_str()));
    }
    wanted
        .into_iter()
        .filter_map(|operator| {
            resolve_operator(
                store,
                ctx,
                &OperatorRef {
                    national_code: operator.national_code.as_deref(),
                    code: operator.code.as_deref(),
                    licence: operator.licence_number.as_deref(),
                    name: operator.name.as_deref(),
                },
            )
        })
        .collect()
}

/// last-ditch operator guess for files named like `KCTB_xxx.xml`
fn operator_from_filename(store: &Store, filename: &str) -> Option<OperatorId> {
    let basename = Path::new(filename).file_name()?.to_str()?;
    let (code, rest) = basename.split_at_checked(4)?;
    if rest.starts_with('_') && code.chars().all(|c| c.is_ascii_uppercase()) {
        store.operator(code).map(|operator| operator.id.clone())
    } else {
        None
    }
}

fn service_description(service: &TxcService) -> String {
    let mut description = service.description.clone();
    if description.chars().any(|c| c.is_ascii_uppercase())
        && !description.chars().any(|c| c.is_ascii_lowercase())
    {
        description = title_case(&description);
    }

    let mut origin = service.origin.clone();
    let mut destination = service.destination.clone();
    if !origin.is_empty() && !destination.is_empty() {
        if origin.to_uppercase() == origin && destination.to_uppercase() == destination {
            origin = title_case(&origin);
            destination = title_case(&destination);
        }
        if description.is_empty() {
            description = format!("{origin} - {destination}");
            let vias = &service.vias;
            if vias.len() == 1 {
                let via = &vias[0];
                if via.contains("via ") {
                    return format!("{description} {via}");
                } else if via.contains(',') || via.contains(" and ") || via.contains('&') {
                    return format!("{description} via {via}");
                }
            }
            if !vias.is_empty() {
                let mut parts = vec![origin];
                parts.extend(vias.iter().cloned());
                parts.push(destination);
                description = parts.join(" - ");
            }
        }
    }
    if description == "Origin - Destination" {
        description.clear();
    }
    description
}

/// one parsed service, potentially several lines, each reconciled and
/// imported separately
#[allow(clippy::too_many_arguments)]
pub fn handle_service(
    store: &mut Store,
    ctx: &mut ImportContext,
    document: &TransXChangeDocument,
    service_index: usize,
    filename: &str,
    stops: &HashMap<String, ResolvedStop>,
    descriptions: &ServiceDescriptions,
) -> Result<(), TxcError> {
    let txc_service = &document.services[service_index];

    if let (Some(start), Some(end)) = (
        txc_service.operating_period_start,
        txc_service.operating_period_end,
    ) {
        if end < start {
            warn!(
                "skipping {filename} {}: end {end} is before start {start}",
                txc_service.service_code
            );
            return Ok(());
        }
        if end < ctx.today {
            warn!(
                "{filename}: {} end {end} is in the past",
                txc_service.service_code
            );
        }
    }

    let mut operators = service_operators(store, ctx, document, txc_service);
    if operators.is_empty() {
        operators.extend(operator_from_filename(store, filename));
    }

    let description = service_description(txc_service);
    let unique_code = unique_service_code(&txc_service.service_code).map(str::to_string);

    let known_stops: HashSet<String> = stops
        .values()
        .filter_map(|stop| match stop {
            ResolvedStop::Known(code) => Some(code.clone()),
            ResolvedStop::Unknown(_) => None,
        })
        .collect();

    for line in &txc_service.lines {
        if should_defer_to_other_source(store, ctx, &operators, &line.line_name) {
            continue;
        }
        // a publisher's newer feed generation wins over its older one
        if let Some(preferred) = ctx.preferred_source.filter(|p| *p != ctx.source) {
            let covered = store.services().any(|(id, service)| {
                service.current
                    && service.line_name.eq_ignore_ascii_case(&line.line_name)
                    && store
                        .routes_of_service(id)
                        .iter()
                        .any(|route| route.source == preferred)
            });
            if covered {
                continue;
            }
        }

        let service_code = if ctx.is_tnds {
            service_code_from_filename(filename)
                .unwrap_or_else(|| txc_service.service_code.clone())
        } else if let Some(code) = &unique_code {
            code.clone()
        } else {
            String::new()
        };

        let incoming = IncomingService {
            line_name: &line.line_name,
            description: &description,
            service_code: &txc_service.service_code,
            source_code: (!service_code.is_empty()).then_some(service_code.as_str()),
            operators: &operators,
            stops: &known_stops,
            single_document: document.services.len() == 1,
        };

        let existing = find_service(store, ctx, &incoming);
        let service_id = existing.unwrap_or_else(|| {
            store.create_service(Service {
                line_name: line.line_name.clone(),
                ..Default::default()
            })
        });
        let created = existing.is_none();
        let previously_current = store
            .service(service_id)
            .is_some_and(|service| service.current);

        let journeys = document.journeys_for(&txc_service.service_code, &line.id);
        if journeys.is_empty() {
            warn!("{} has no journeys", txc_service.service_code);
            continue;
        }

        // narrow per-field update of the shared row
        let mut line_brand = line.line_brand.clone();
        let mut public_use = true;
        if let Some(value) = &txc_service.public_use {
            match value.as_str() {
                "0" | "false" => {
                    if journeys.len() < 5 {
                        public_use = false;
                    }
                }
                _ => public_use = true,
            }
        }
        if !txc_service.marketing_name.is_empty() {
            let marketing = &txc_service.marketing_name;
            if marketing == "CornwallbyKernow" {
                // not a brand, despite where it is written
            } else if marketing.contains("tudents only") || marketing.contains("pupils only") {
                public_use = false;
            } else {
                line_brand = marketing.clone();
                if line_brand.split_whitespace().any(|word| word == line.line_name) {
                    line_brand = line_brand
                        .split_whitespace()
                        .filter(|word| *word != line.line_name)
                        .collect::<Vec<&str>>()
                        .join(" ");
                }
            }
        }

        {
            let region = ctx.region.clone();
            let service = store.service_mut(service_id).expect("service row exists");
            service.line_name = line.line_name.clone();
            service.date = Some(ctx.today);
            service.current = true;
            service.source = Some(ctx.source);
            service.line_brand = line_brand.clone();
            service.public_use = public_use;
            if !txc_service.mode.is_empty() {
                service.mode = txc_service.mode.clone();
            }
            if region.is_some() {
                service.region = region;
            }
            if !service_code.is_empty() {
                service.service_code = service_code.clone();
            }
            if !description.is_empty() {
                service.description = description.clone();
            }

            service.outbound_description.clear();
            service.inbound_description.clear();
            if line.outbound_description != line.inbound_description
                || txc_service.origin == "Origin"
            {
                if !line.outbound_description.is_empty() {
                    service.outbound_description = line.outbound_description.clone();
                    if service.description.is_empty() || txc_service.lines.len() > 1 {
                        service.description = line.outbound_description.clone();
                    }
                }
                if !line.inbound_description.is_empty() {
                    service.inbound_description = line.inbound_description.clone();
                    if service.description.is_empty() {
                        service.description = line.inbound_description.clone();
                    }
                }
            }
            let (outbound, inbound) = descriptions.for_filename(filename);
            if let Some(inbound) = inbound {
                service.description = inbound.to_string();
                service.inbound_description = inbound.to_string();
            }
            if let Some(outbound) = outbound {
                service.description = outbound.to_string();
                service.outbound_description = outbound.to_string();
            }
        }

        // a row resurrected from not-current gets a fresh slug
        if !created && !previously_current {
            store.reslug_service(service_id);
        }

        if !operators.is_empty() {
            let service = store.service_mut(service_id).expect("service row exists");
            if created || !ctx.service_ids.contains(&service_id) {
                service.operators = operators.clone();
            } else {
                for operator in &operators {
                    if !service.operators.contains(operator) {
                        service.operators.push(operator.clone());
                    }
                }
            }
        }
        ctx.service_ids.insert(service_id);

        let mut route_code = filename.to_string();
        if document.services.len() > 1 {
            route_code.push_str(&format!("#{}", txc_service.service_code));
        }
        if txc_service.lines.len() > 1 {
            route_code.push_str(&format!("#{}", line.id));
        }

        // the route's shape is the union of the tracks its journeys cover
        let mut seen_links = HashSet::new();
        let mut geometry: Vec<Vec<(f64, f64)>> = Vec::new();
        for journey in &journeys {
            let Some(pattern) = txc_service.journey_patterns.get(&journey.journey_pattern_ref)
            else {
                continue;
            };
            for section_ref in &pattern.section_refs {
                let Some(section) = document.journey_pattern_sections.get(section_ref) else {
                    continue;
                };
                for link in &section.timing_links {
                    if let Some(route_link) = link.route_link_ref.as_deref() {
                        if seen_links.insert(route_link) {
                            if let Some(track) = document.route_link_tracks.get(route_link) {
                                geometry.push(track.clone());
                            }
                        }
                    }
                }
            }
        }

        let revision_number = document.revision_number.clone();
        let description_for_route = description.clone();
        let (route_id, _) = store.upsert_route(ctx.source, &route_code, |route| {
            route.service = service_id;
            route.line_name = line.line_name.clone();
            route.line_brand = line_brand.clone();
            route.description = description_for_route;
            route.service_code = txc_service.service_code.clone();
            route.revision_number = revision_number;
            route.geometry = geometry;
            route.start_date = txc_service.operating_period_start;
            route.end_date = txc_service.operating_period_end;
            route.origin = if txc_service.origin == "Origin" {
                String::new()
            } else {
                txc_service.origin.clone()
            };
            match txc_service.destination.split_once(" via ") {
                _ if txc_service.destination == "Destination" => {}
                Some((destination, via)) => {
                    route.destination = destination.to_string();
                    route.via = via.to_string();
                }
                None => route.destination = txc_service.destination.clone(),
            }
        });
        ctx.route_ids.insert(route_id);

        handle_journeys(store, ctx, document, txc_service, &journeys, route_id, stops)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_service_code_from_filename() {
        assert_eq!(
            service_code_from_filename("ea_21-45A-_-y08-1.xml"),
            Some("ea_21-45A-_-y08".to_string())
        );
        assert_eq!(service_code_from_filename("swe_33-9A-A-y10-2.xml"), Some("swe_33-9A-A-y10".to_string()));
        assert_eq!(service_code_from_filename("FECS_45A.xml"), None);
        assert_eq!(service_code_from_filename("NATX_323.xml"), None);
    }
}
