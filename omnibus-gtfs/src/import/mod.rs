//! mapping a static GTFS bundle into the shared model: agencies to
//! operators, routes to services and routes, calendar.txt and
//! calendar_dates.txt to calendars, trips and stop_times to trips.

use std::collections::{HashMap, HashSet};

use gtfs_structures::{DirectionType, Exception, Gtfs, PickupDropOffType, RouteType};
use itertools::Itertools;
use log::warn;

use omnibus_core::import::{sync, ImportContext};
use omnibus_core::model::{
    CalendarId, CalendarPattern, ExceptionPattern, Operator, RouteId, Service, StopPoint, StopRef,
    StopTime, TimeOfDay, TimingStatus, Trip, TripId,
};
use omnibus_core::store::Store;

use crate::GtfsError;

/// route_type to mode, for the handful of modes the site distinguishes
fn mode_for(route_type: RouteType) -> &'static str {
    match route_type {
        RouteType::Tramway => "tram",
        RouteType::Rail => "rail",
        RouteType::Bus => "bus",
        RouteType::Ferry => "ferry",
        RouteType::Coach => "coach",
        _ => "",
    }
}

/// a stable display code for a route: the short name when it is short
/// enough, the long name when that is effectively a code, otherwise the
/// first token of the raw id
fn route_display_code(short_name: &str, long_name: &str, route_id: &str) -> String {
    if !short_name.is_empty() && short_name.len() <= 8 {
        short_name.to_string()
    } else if !long_name.is_empty() && long_name.len() <= 4 {
        long_name.to_string()
    } else {
        route_id.split_whitespace().next().unwrap_or(route_id).to_string()
    }
}

fn time_of_day(seconds: Option<u32>) -> Option<TimeOfDay> {
    seconds.map(|s| TimeOfDay(s as i32))
}

/// calendar_dates.txt rows become dated exceptions: exception_type 1
/// (added) turns into an operating special day, 2 (removed) into a
/// suppressed day
fn exception_patterns(dates: &[gtfs_structures::CalendarDate]) -> Vec<ExceptionPattern> {
    dates
        .iter()
        .map(|date| {
            let added = date.exception_type == Exception::Added;
            ExceptionPattern {
                start_date: date.date,
                end_date: Some(date.date),
                operation: added,
                special: added,
                summary: String::new(),
            }
        })
        .collect()
}

/// imports one GTFS bundle under the `collection` name its service codes
/// are scoped by
pub fn handle_bundle(
    store: &mut Store,
    ctx: &mut ImportContext,
    gtfs: &Gtfs,
    collection: &str,
) -> Result<(), GtfsError> {
    // shapes, ordered by point sequence
    let mut shapes: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
    for (shape_id, points) in &gtfs.shapes {
        let line = points
            .iter()
            .sorted_by_key(|point| point.sequence)
            .map(|point| (point.longitude, point.latitude))
            .collect();
        shapes.insert(shape_id.as_str(), line);
    }

    // agencies become operators
    let mut operators: HashMap<String, String> = HashMap::new();
    for agency in &gtfs.agencies {
        let id = agency.id.clone().unwrap_or_else(|| agency.name.clone());
        if store.operator(&id).is_none() {
            store.add_operator(Operator {
                id: id.clone(),
                name: agency.name.clone(),
                parent: None,
                licences: Vec::new(),
                region: None,
            });
        }
        operators.insert(id.clone(), id);
    }

    for stop in gtfs.stops.values() {
        if store.stop(&stop.id).is_none() {
            store.upsert_stop(StopPoint {
                atco_code: stop.id.clone(),
                common_name: stop.name.clone().unwrap_or_default(),
                active: true,
                latlong: match (stop.longitude, stop.latitude) {
                    (Some(lon), Some(lat)) => Some((lon, lat)),
                    _ => None,
                },
            });
        }
    }

    // calendars: the weekly pattern plus its dated exceptions, interned so
    // identical service ids share a row
    let mut calendars: HashMap<&str, CalendarId> = HashMap::new();
    for (service_id, calendar) in &gtfs.calendar {
        let mut pattern = CalendarPattern {
            days: [
                calendar.monday,
                calendar.tuesday,
                calendar.wednesday,
                calendar.thursday,
                calendar.friday,
                calendar.saturday,
                calendar.sunday,
            ],
            start_date: Some(calendar.start_date),
            end_date: Some(calendar.end_date),
            ..Default::default()
        };
        if let Some(dates) = gtfs.calendar_dates.get(service_id) {
            pattern.exceptions = exception_patterns(dates);
        }
        calendars.insert(service_id.as_str(), ctx.intern_calendar(store, &pattern)?);
    }
    // services defined only by calendar_dates.txt: an exception-only
    // pattern with no weekday flag at all
    for (service_id, dates) in &gtfs.calendar_dates {
        if calendars.contains_key(service_id.as_str()) {
            continue;
        }
        let Some(start) = dates.iter().map(|date| date.date).min() else {
            continue;
        };
        let pattern = CalendarPattern {
            days: [false; 7],
            start_date: Some(start),
            end_date: dates.iter().map(|date| date.date).max(),
            exceptions: exception_patterns(dates),
            ..Default::default()
        };
        calendars.insert(service_id.as_str(), ctx.intern_calendar(store, &pattern)?);
    }

    // routes.txt: one service and one route per row
    let mut route_rows: HashMap<&str, RouteId> = HashMap::new();
    for (route_id, route) in &gtfs.routes {
        let short_name = route.short_name.clone().unwrap_or_default();
        let long_name = route.long_name.clone().unwrap_or_default();
        let display_code = route_display_code(&short_name, &long_name, route_id);
        let service_code = format!("{collection}-{display_code}");

        let service_id = store
            .service_by_source_and_code(ctx.source, &service_code)
            .unwrap_or_else(|| {
                store.create_service(Service {
                    line_name: short_name.clone(),
                    ..Default::default()
                })
            });
        {
            let service = store.service_mut(service_id).expect("service row exists");
            service.line_name = short_name.clone();
            service.description = long_name.clone();
            service.service_code = service_code;
            service.mode = mode_for(route.route_type).to_string();
            service.current = true;
            service.date = Some(ctx.today);
            service.source = Some(ctx.source);
            service.public_use = true;
            if let Some(agency) = route.agency_id.as_ref().and_then(|id| operators.get(id)) {
                if ctx.service_ids.contains(&service_id) {
                    if !service.operators.contains(agency) {
                        service.operators.push(agency.clone());
                    }
                } else {
                    service.operators = vec![agency.clone()];
                }
            }
        }
        ctx.service_ids.insert(service_id);

        let line_name = short_name.clone();
        let description = long_name.clone();
        let (row, _) = store.upsert_route(ctx.source, route_id, |row| {
            row.service = service_id;
            row.line_name = line_name;
            row.description = description;
            row.service_code = route_id.clone();
        });
        ctx.route_ids.insert(row);
        route_rows.insert(route_id.as_str(), row);
    }

    // trips and their ordered stop times, grouped per route so identity
    // preservation sees each route's journeys together
    let mut by_route: HashMap<RouteId, Vec<(Trip, Vec<StopTime>)>> = HashMap::new();
    let mut headsigns: HashMap<&str, (HashSet<&str>, HashSet<&str>)> = HashMap::new();
    let mut route_shapes: HashMap<RouteId, HashSet<&str>> = HashMap::new();

    for trip in gtfs.trips.values().sorted_by(|a, b| a.id.cmp(&b.id)) {
        let Some(route) = route_rows.get(trip.route_id.as_str()) else {
            warn!("trip {} references unknown route {}", trip.id, trip.route_id);
            continue;
        };
        let calendar = calendars.get(trip.service_id.as_str()).copied();
        if calendar.is_none() {
            warn!(
                "trip {} has no calendar for service {}",
                trip.id, trip.service_id
            );
        }
        let inbound = trip.direction_id == Some(DirectionType::Inbound);

        if let Some(headsign) = trip.trip_headsign.as_deref() {
            let entry = headsigns.entry(trip.route_id.as_str()).or_default();
            if inbound {
                entry.1.insert(headsign);
            } else {
                entry.0.insert(headsign);
            }
        }
        if let Some(shape_id) = trip.shape_id.as_deref() {
            route_shapes.entry(*route).or_default().insert(shape_id);
        }

        let stop_times: Vec<StopTime> = trip
            .stop_times
            .iter()
            .sorted_by_key(|st| st.stop_sequence)
            .map(|st| {
                let pick_up = st.pickup_type != PickupDropOffType::NotAvailable;
                let set_down = st.drop_off_type != PickupDropOffType::NotAvailable;
                StopTime {
                    sequence: st.stop_sequence.try_into().unwrap_or(u16::MAX),
                    stop: StopRef::Stop(st.stop.id.clone()),
                    arrival: time_of_day(st.arrival_time),
                    departure: time_of_day(st.departure_time),
                    pick_up,
                    set_down,
                    timing_status: TimingStatus::Unknown,
                }
            })
            .collect();
        if stop_times.is_empty() {
            warn!("trip {} has no stop times", trip.id);
            continue;
        }

        let start = stop_times
            .first()
            .and_then(StopTime::departure_or_arrival)
            .unwrap_or_default();
        let end = stop_times
            .last()
            .and_then(StopTime::arrival_or_departure)
            .unwrap_or_default();
        let destination = stop_times
            .last()
            .and_then(|st| st.stop.atco_code())
            .map(str::to_string);

        by_route.entry(*route).or_default().push((
            Trip {
                id: TripId(0),
                route: *route,
                calendar,
                inbound,
                journey_pattern: String::new(),
                // realtime trip updates match on the feed's trip id
                ticket_machine_code: trip.id.clone(),
                start,
                end,
                destination,
                block: None,
                vehicle_type: None,
                garage: None,
                sequence: None,
                notes: Vec::new(),
            },
            stop_times,
        ));
    }

    for (route, mut trips) in by_route.into_iter().sorted_by_key(|(route, _)| *route) {
        trips.sort_by(|(a, _), (b, _)| a.start.cmp(&b.start));
        sync::replace_route_trips(store, route, trips);
    }

    // a route's geometry is its trips' shapes
    for (route, shape_ids) in route_shapes {
        let geometry: Vec<Vec<(f64, f64)>> = shape_ids
            .iter()
            .sorted()
            .filter_map(|shape_id| shapes.get(*shape_id).cloned())
            .collect();
        if let Some(route) = store.route_mut(route) {
            route.geometry = geometry;
        }
    }

    // derive descriptions from headsigns where routes.txt gave none
    for (route_id, (outbound, inbound)) in headsigns {
        let Some(route) = route_rows.get(route_id) else {
            continue;
        };
        let service_id = match store.route(*route) {
            Some(route) => route.service,
            None => continue,
        };
        let needs_description = store
            .service(service_id)
            .is_some_and(|service| service.description.is_empty());
        if !needs_description || outbound.len() > 1 || inbound.len() > 1 {
            continue;
        }
        let origin = inbound.iter().next().copied();
        let destination = outbound.iter().next().copied();
        let service = store.service_mut(service_id).expect("service row exists");
        match (origin, destination) {
            (Some(origin), _) if origin.contains(" - ") => {
                service.inbound_description = origin.to_string();
                service.description = origin.to_string();
            }
            (_, Some(destination)) if destination.contains(" - ") => {
                service.outbound_description = destination.to_string();
                service.description = destination.to_string();
            }
            (Some(origin), Some(destination)) => {
                service.description = format!("{origin} - {destination}");
                service.outbound_description = service.description.clone();
                service.inbound_description = format!("{destination} - {origin}");
            }
            _ => {}
        }
    }

    Ok(())
}
