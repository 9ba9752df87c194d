//! identity resolution: mapping a parsed service onto the row that already
//! describes it, across operator-code schemes, line renames and re-imports,
//! without inventing duplicates or merging genuinely distinct lines.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::import::{lookups, ImportContext, MissingOperator};
use crate::model::{OperatorId, ServiceId};
use crate::store::Store;

/// a newly parsed service, as the format crates hand it over. persistence
/// identity is decided here, never by the parser.
#[derive(Debug)]
pub struct IncomingService<'a> {
    pub line_name: &'a str,
    pub description: &'a str,
    /// the feed's own service code, whatever its scheme
    pub service_code: &'a str,
    /// the source-local code (e.g. derived from a regional archive's file
    /// name), when the batch follows a per-source code convention
    pub source_code: Option<&'a str>,
    pub operators: &'a [OperatorId],
    /// stops the incoming trips visit, for the geography tie-break
    pub stops: &'a HashSet<String>,
    /// the source document describes only this one service, which makes the
    /// stop-overlap tie-break safe to use
    pub single_document: bool,
}

/// a registration-derived service code is nationally unique, so it matches
/// regardless of line name or operator
pub fn unique_service_code(code: &str) -> Option<&str> {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    let re = SCHEME.get_or_init(|| Regex::new(r"^P[BCDFGHKM]\d+:\d+.*$").unwrap());
    re.is_match(code).then_some(code)
}

/// finds the existing service an incoming one describes, or None when a new
/// row should be created. rules are tried strictly in order and the first
/// hit wins; ties inside a rule resolve current-first then oldest-first.
pub fn find_service(
    store: &Store,
    ctx: &ImportContext,
    incoming: &IncomingService,
) -> Option<ServiceId> {
    // 1. a scheme-compliant unique code beats every heuristic
    if let Some(code) = unique_service_code(incoming.service_code) {
        if let Some(id) = store.service_by_code(code) {
            return Some(id);
        }
    }

    // 2. candidates that share the line name
    let candidates = store.services_by_line_name(incoming.line_name);

    // 3. prefer rows worked by one of the incoming operators
    let overlapping: Vec<ServiceId> = candidates
        .iter()
        .copied()
        .filter(|id| {
            store.service(*id).is_some_and(|service| {
                service
                    .operators
                    .iter()
                    .any(|op| incoming.operators.contains(op))
            })
        })
        .collect();
    let narrowed = if incoming.operators.is_empty() {
        candidates
    } else {
        overlapping
    };

    // 4. geography tie-break: a row that already stops where these trips
    //    stop, or a placeholder (stop usages but no timetable yet).
    //    multi-service documents match on the recorded service code or the
    //    description instead, which is less likely to cross-match there.
    let found = narrowed.iter().copied().find(|id| {
        if incoming.single_document {
            store.service_has_stop_time_at(*id, incoming.stops)
                || (store.service_has_stop_usage_at(*id, incoming.stops)
                    && !store.service_has_routes(*id))
        } else {
            store
                .routes_of_service(*id)
                .iter()
                .any(|route| route.service_code == incoming.service_code)
                || (!incoming.description.is_empty()
                    && store
                        .service(*id)
                        .is_some_and(|s| s.description == incoming.description))
        }
    });
    if found.is_some() {
        return found;
    }

    // 5. within a region-partitioned archive the service code is at least
    //    unique per source
    if ctx.is_tnds {
        let code = incoming.source_code.unwrap_or(incoming.service_code);
        if let Some(id) = store.service_by_source_and_code(ctx.source, code) {
            return Some(id);
        }
    }

    // 6. nothing fits; the caller creates a new row
    None
}

/// the operator fields a feed may carry, in whatever mixture it has
#[derive(Debug, Default)]
pub struct OperatorRef<'a> {
    pub national_code: Option<&'a str>,
    pub code: Option<&'a str>,
    pub licence: Option<&'a str>,
    pub name: Option<&'a str>,
}

const NATIONAL_SCHEME: &str = "National Operator Codes";

/// resolution ladder for inconsistent operator references. never fails:
/// when every rung misses, the reference is recorded for triage and the
/// caller carries on operator-less.
pub fn resolve_operator(
    store: &Store,
    ctx: &mut ImportContext,
    operator: &OperatorRef,
) -> Option<OperatorId> {
    // (a) national operator code
    if let Some(code) = operator.national_code {
        if let Some(found) = store.operator_by_code(NATIONAL_SCHEME, code) {
            return Some(found.id.clone());
        }
    }

    // (b) registered licence number
    if let Some(licence) = operator.licence {
        if let Some(found) = store.operator_by_licence(licence) {
            return Some(found.id.clone());
        }
    }

    // (c) trading name: the static alias table first, then an exact match
    //     (ambiguous names fall through rather than guessing)
    if let Some(name) = operator.name.filter(|n| !lookups::is_non_operator_name(n)) {
        if let Some(noc) = lookups::operator_for_trading_name(name) {
            if store.operator(noc).is_some() {
                return Some(noc.to_string());
            }
        }
        if let Some(found) = store.operator_by_name(name) {
            return Some(found.id.clone());
        }
    }

    // (d) regional scheme code
    if let Some(code) = operator.code {
        if let Some(noc) = lookups::operator_for_code(code) {
            if store.operator(noc).is_some() {
                return Some(noc.to_string());
            }
        }
        if let Some(region) = ctx.region.as_deref() {
            if let Some(found) = store.operator_by_code(region, code) {
                return Some(found.id.clone());
            }
        }
        if let Some(found) = store.operator_by_code(NATIONAL_SCHEME, code) {
            return Some(found.id.clone());
        }
    }

    // (e) give up, but keep the evidence
    ctx.record_missing_operator(MissingOperator {
        code: operator
            .national_code
            .or(operator.code)
            .unwrap_or_default()
            .to_string(),
        name: operator.name.unwrap_or_default().to_string(),
        licence: operator.licence.unwrap_or_default().to_string(),
    });
    None
}

/// whether this line should be left to a better source. a legacy feed must
/// not clobber the authoritative one, and the check runs over the operator
/// family (corporate parent), because group services get shuffled between
/// sibling subsidiaries between publications.
pub fn should_defer_to_other_source(
    store: &Store,
    ctx: &ImportContext,
    operators: &[OperatorId],
    line_name: &str,
) -> bool {
    if operators.is_empty() {
        return false;
    }

    // a region-partitioned archive defers unconditionally for operators the
    // open-data platform covers completely
    if ctx.is_tnds
        && operators
            .iter()
            .all(|op| ctx.open_data_operators.contains(op))
    {
        return true;
    }

    // partially covered operators defer only when another live source
    // already carries this line for the same operator family
    if !operators
        .iter()
        .all(|op| ctx.incomplete_operators.contains(op))
    {
        return false;
    }
    let parent = store
        .operator(&operators[0])
        .and_then(|op| op.parent.clone());
    store.services().any(|(_, service)| {
        if !service.current
            || service.source == Some(ctx.source)
            || !service.line_name.eq_ignore_ascii_case(line_name)
        {
            return false;
        }
        match &parent {
            Some(parent) => service.operators.iter().any(|op| {
                store
                    .operator(op)
                    .is_some_and(|o| o.parent.as_deref() == Some(parent))
            }),
            None => service.operators.iter().any(|op| operators.contains(op)),
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Operator, Service};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn test_source() -> crate::model::SourceId {
        crate::model::SourceId(999)
    }

    fn store_with_operators() -> Store {
        let mut store = Store::new();
        store.add_operator(Operator {
            id: "FECS".to_string(),
            name: "First Eastern Counties".to_string(),
            parent: Some("First".to_string()),
            licences: vec!["PF0000459".to_string()],
            region: None,
        });
        store.add_operator(Operator {
            id: "FCWL".to_string(),
            name: "First Kernow".to_string(),
            parent: Some("First".to_string()),
            licences: Vec::new(),
            region: None,
        });
        store.add_operator_code("FECS", "National Operator Codes", "FECS");
        store.add_operator_code("FECS", "EA", "FE");
        store
    }

    #[test]
    fn test_operator_ladder_in_order() {
        let store = store_with_operators();
        let mut ctx = ImportContext::new(test_source(), today());
        ctx.region = Some("EA".to_string());

        // national code wins outright
        let found = resolve_operator(
            &store,
            &mut ctx,
            &OperatorRef {
                national_code: Some("FECS"),
                ..Default::default()
            },
        );
        assert_eq!(found.as_deref(), Some("FECS"));

        // licence number
        let found = resolve_operator(
            &store,
            &mut ctx,
            &OperatorRef {
                licence: Some("PF0000459"),
                ..Default::default()
            },
        );
        assert_eq!(found.as_deref(), Some("FECS"));

        // trading-name alias table
        let found = resolve_operator(
            &store,
            &mut ctx,
            &OperatorRef {
                name: Some("First Cornwall"),
                ..Default::default()
            },
        );
        assert_eq!(found.as_deref(), Some("FCWL"));

        // regional scheme code
        let found = resolve_operator(
            &store,
            &mut ctx,
            &OperatorRef {
                code: Some("FE"),
                ..Default::default()
            },
        );
        assert_eq!(found.as_deref(), Some("FECS"));

        // nothing matches: recorded, not fatal
        let found = resolve_operator(
            &store,
            &mut ctx,
            &OperatorRef {
                code: Some("ZZZZ"),
                name: Some("Mystery Coaches"),
                ..Default::default()
            },
        );
        assert!(found.is_none());
        assert_eq!(ctx.missing_operators.len(), 1);
    }

    #[test]
    fn test_find_service_prefers_unique_code() {
        let mut store = store_with_operators();
        let matching = store.create_service(Service {
            line_name: "completely different".to_string(),
            service_code: "PF0000459:12".to_string(),
            current: true,
            ..Default::default()
        });
        store.create_service(Service {
            line_name: "45A".to_string(),
            current: true,
            ..Default::default()
        });

        let ctx = ImportContext::new(test_source(), today());
        let stops = HashSet::new();
        let incoming = IncomingService {
            line_name: "45A",
            description: "",
            service_code: "PF0000459:12",
            source_code: None,
            operators: &[],
            stops: &stops,
            single_document: true,
        };
        assert_eq!(find_service(&store, &ctx, &incoming), Some(matching));
    }

    #[test]
    fn test_find_service_narrows_by_operator_then_creates() {
        let mut store = store_with_operators();
        let theirs = store.create_service(Service {
            line_name: "7".to_string(),
            operators: vec!["FCWL".to_string()],
            current: true,
            ..Default::default()
        });
        let ours = store.create_service(Service {
            line_name: "7".to_string(),
            operators: vec!["FECS".to_string()],
            current: true,
            ..Default::default()
        });
        // our row is the placeholder kind: stop usages, no routes
        store.set_stop_usages(
            ours,
            vec![crate::model::StopUsage {
                service: ours,
                stop: "2900A181".to_string(),
                direction: crate::model::Direction::Outbound,
                order: 0,
                timing_status: Default::default(),
            }],
        );

        let ctx = ImportContext::new(test_source(), today());
        let stops: HashSet<String> = HashSet::from(["2900A181".to_string()]);
        let operators = vec!["FECS".to_string()];
        let incoming = IncomingService {
            line_name: "7",
            description: "",
            service_code: "ea_21-7-_-y08",
            source_code: None,
            operators: &operators,
            stops: &stops,
            single_document: true,
        };
        assert_eq!(find_service(&store, &ctx, &incoming), Some(ours));
        assert_ne!(find_service(&store, &ctx, &incoming), Some(theirs));

        // an unrelated line finds nothing and will be created fresh
        let incoming = IncomingService {
            line_name: "99X",
            description: "",
            service_code: "ea_21-99X-_-y08",
            source_code: None,
            operators: &operators,
            stops: &stops,
            single_document: true,
        };
        assert_eq!(find_service(&store, &ctx, &incoming), None);
    }

    #[test]
    fn test_defer_uses_operator_family() {
        let mut store = store_with_operators();
        let bods = store.get_or_create_source("Better Bus Data", "");
        store.create_service(Service {
            line_name: "X1".to_string(),
            operators: vec!["FCWL".to_string()],
            current: true,
            source: Some(bods),
            ..Default::default()
        });
        let legacy = store.get_or_create_source("EA", "");

        let mut ctx = ImportContext::new(legacy, today());
        ctx.incomplete_operators.insert("FECS".to_string());

        // sibling subsidiary (same parent "First") already covers X1
        assert!(should_defer_to_other_source(
            &store,
            &ctx,
            &["FECS".to_string()],
            "X1"
        ));
        // but not a line nobody else has
        assert!(!should_defer_to_other_source(
            &store,
            &ctx,
            &["FECS".to_string()],
            "X99"
        ));
    }

    #[test]
    fn test_unique_service_code_scheme() {
        assert!(unique_service_code("PF0000459:12").is_some());
        assert!(unique_service_code("PB0001746:61A").is_some());
        assert!(unique_service_code("ea_21-45A-_-y08").is_none());
        assert!(unique_service_code("").is_none());
    }
}
