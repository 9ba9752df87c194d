//! end-of-batch reconciliation: retiring what the feed no longer carries,
//! keeping stable identifiers where the schedule did not really change, and
//! recomputing the denormalized fields the public site reads.

use itertools::Itertools;
use log::info;

use crate::import::ImportContext;
use crate::model::{
    Direction, OperatorId, RouteId, ServiceId, SourceId, StopTime, StopUsage, TimingStatus, Trip,
};
use crate::store::Store;

/// writes a route's fresh trips, reusing the existing primary keys when the
/// journey count and every start time are unchanged pairwise in order. a
/// verbatim republication (the common case) then keeps external references
/// to the trips valid; a real schedule change replaces them wholesale.
pub fn replace_route_trips(
    store: &mut Store,
    route: RouteId,
    incoming: Vec<(Trip, Vec<StopTime>)>,
) {
    let existing: Vec<_> = store
        .trips_of_route(route)
        .iter()
        .map(|trip| (trip.id, trip.start))
        .collect();

    let reusable = existing.len() == incoming.len()
        && existing
            .iter()
            .zip(&incoming)
            .all(|((_, old_start), (new, _))| *old_start == new.start);

    if reusable {
        for ((old_id, _), (mut trip, stop_times)) in existing.into_iter().zip(incoming) {
            trip.id = old_id;
            store.replace_trip(trip, stop_times);
        }
    } else {
        if !existing.is_empty() {
            info!("journeys changed, replacing {} trips", existing.len());
        }
        store.delete_trips_of_route(route);
        for (trip, stop_times) in incoming {
            store.insert_trip(trip, stop_times);
        }
    }
}

/// retires this source's contribution that the batch did not confirm:
/// routes gone from the feed are deleted, and services left with no route
/// at all are marked not current. a service another source still vouches
/// for keeps its remaining routes and stays current.
pub fn mark_old_services_as_not_current(store: &mut Store, ctx: &ImportContext) {
    let stale: Vec<RouteId> = store
        .routes_of_source(ctx.source)
        .into_iter()
        .filter(|id| !ctx.route_ids.contains(id))
        .collect();
    store.delete_routes(&stale);

    let orphaned: Vec<ServiceId> = store
        .services()
        .filter(|(id, service)| {
            service.current
                && service.source == Some(ctx.source)
                && !ctx.service_ids.contains(id)
                && !store.service_has_routes(*id)
        })
        .map(|(id, _)| id)
        .collect();
    for id in orphaned {
        if let Some(service) = store.service_mut(id) {
            service.current = false;
            service.geometry.clear();
        }
    }
}

/// cross-source cleanup once an authoritative feed has imported: removes
/// other sources' routes for these operators (joint services excluded, they
/// belong to more than one operator set) and deactivates what that leaves
/// routeless. `protected` names the sources whose rows must survive.
pub fn clean_up(store: &mut Store, operators: &[OperatorId], protected: &[SourceId]) {
    let doomed: Vec<RouteId> = store
        .services()
        .filter(|(_, service)| {
            !service.operators.is_empty()
                && service.operators.iter().all(|op| operators.contains(op))
        })
        .flat_map(|(id, _)| store.routes_of_service(id))
        .filter(|route| !protected.contains(&route.source))
        .map(|route| route.id)
        .collect();
    store.delete_routes(&doomed);

    let orphaned: Vec<ServiceId> = store
        .services()
        .filter(|(id, service)| {
            service.current
                && service.operators.iter().any(|op| operators.contains(op))
                && !store.service_has_routes(*id)
        })
        .map(|(id, _)| id)
        .collect();
    for id in orphaned {
        if let Some(service) = store.service_mut(id) {
            service.current = false;
        }
    }
}

/// recomputes the denormalized fields of every service this batch touched,
/// then sweeps calendars nothing references any more
pub fn finish_services(store: &mut Store, ctx: &ImportContext) {
    for id in ctx.service_ids.iter().copied().sorted() {
        let usages = stop_usages_for(store, id);
        store.set_stop_usages(id, usages);
        update_search_text(store, id);
        update_geometry(store, id);
    }
    let orphans = store.orphaned_calendars();
    store.delete_calendars(&orphans);
}

/// derives the ordered stop list per direction by walking every trip's
/// stop times in sequence and merging them into the widest pattern: each
/// journey's stops appear in their own order, with stops unknown so far
/// spliced in after the last position both patterns share
fn stop_usages_for(store: &Store, service: ServiceId) -> Vec<StopUsage> {
    let mut usages = Vec::new();
    for (direction, inbound) in [(Direction::Outbound, false), (Direction::Inbound, true)] {
        let mut pattern: Vec<(String, TimingStatus)> = Vec::new();
        for route in store.routes_of_service(service) {
            for trip in store.trips_of_route(route.id) {
                if trip.inbound != inbound {
                    continue;
                }
                let stops: Vec<(String, TimingStatus)> = store
                    .stop_times(trip.id)
                    .iter()
                    .filter_map(|st| {
                        st.stop
                            .atco_code()
                            .map(|code| (code.to_string(), st.timing_status))
                    })
                    .collect();
                merge_stopping_pattern(&mut pattern, &stops);
            }
        }
        usages.extend(
            pattern
                .into_iter()
                .enumerate()
                .map(|(order, (stop, timing_status))| StopUsage {
                    service,
                    stop,
                    direction,
                    order,
                    timing_status,
                }),
        );
    }
    usages
}

fn merge_stopping_pattern(
    master: &mut Vec<(String, TimingStatus)>,
    stops: &[(String, TimingStatus)],
) {
    let mut insert_at = 0;
    for (stop, timing_status) in stops {
        match master[insert_at..].iter().position(|(s, _)| s == stop) {
            Some(offset) => insert_at += offset + 1,
            None => {
                master.insert(insert_at, (stop.clone(), *timing_status));
                insert_at += 1;
            }
        }
    }
}

/// one flat lowercase haystack for the site's search box
fn update_search_text(store: &mut Store, id: ServiceId) {
    let Some(service) = store.service(id) else {
        return;
    };
    let operator_names: Vec<String> = service
        .operators
        .iter()
        .filter_map(|op| store.operator(op))
        .map(|op| op.name.clone())
        .collect();
    let text = [
        service.line_name.as_str(),
        service.line_brand.as_str(),
        service.description.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .chain(operator_names.iter().map(String::as_str))
    .join(" ")
    .to_lowercase();
    if let Some(service) = store.service_mut(id) {
        service.search_text = text;
    }
}

/// the service's geometry is the union of its routes' shapes
fn update_geometry(store: &mut Store, id: ServiceId) {
    let geometry: Vec<Vec<(f64, f64)>> = store
        .routes_of_service(id)
        .iter()
        .flat_map(|route| route.geometry.iter().cloned())
        .collect();
    if let Some(service) = store.service_mut(id) {
        service.geometry = geometry;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CalendarPattern, Service, StopRef, TimeOfDay, TripId};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn trip(route: RouteId, start: &str, end: &str) -> Trip {
        Trip {
            id: TripId(0),
            route,
            calendar: None,
            inbound: false,
            journey_pattern: String::new(),
            ticket_machine_code: String::new(),
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            destination: None,
            block: None,
            vehicle_type: None,
            garage: None,
            sequence: None,
            notes: Vec::new(),
        }
    }

    fn stop_time(sequence: u16, stop: &str, departure: &str) -> StopTime {
        StopTime {
            sequence,
            stop: StopRef::Stop(stop.to_string()),
            arrival: None,
            departure: Some(departure.parse::<TimeOfDay>().unwrap()),
            pick_up: true,
            set_down: true,
            timing_status: TimingStatus::Principal,
        }
    }

    #[test]
    fn test_trip_ids_survive_unchanged_reimport() {
        let mut store = Store::new();
        let source = store.get_or_create_source("EA", "");
        let service = store.create_service(Service {
            line_name: "45A".to_string(),
            current: true,
            ..Default::default()
        });
        let (route, _) = store.upsert_route(source, "ea_21-45A-_-y08.xml", |route| {
            route.service = service;
        });

        let journeys = || {
            vec![
                (
                    trip(route, "09:00", "09:45"),
                    vec![stop_time(0, "2900A181", "09:00"), stop_time(1, "2900B482", "09:45")],
                ),
                (
                    trip(route, "10:00", "10:45"),
                    vec![stop_time(0, "2900A181", "10:00"), stop_time(1, "2900B482", "10:45")],
                ),
            ]
        };

        replace_route_trips(&mut store, route, journeys());
        let first_ids: Vec<TripId> = store.trips_of_route(route).iter().map(|t| t.id).collect();
        assert_eq!(first_ids.len(), 2);

        // identical republication: same keys
        replace_route_trips(&mut store, route, journeys());
        let second_ids: Vec<TripId> = store.trips_of_route(route).iter().map(|t| t.id).collect();
        assert_eq!(first_ids, second_ids);

        // a changed start time forces fresh rows
        let mut changed = journeys();
        changed[1].0.start = "10:30".parse().unwrap();
        replace_route_trips(&mut store, route, changed);
        let third_ids: Vec<TripId> = store.trips_of_route(route).iter().map(|t| t.id).collect();
        assert_eq!(third_ids.len(), 2);
        assert_ne!(first_ids, third_ids);
    }

    #[test]
    fn test_gc_is_scoped_to_the_batch_source() {
        let mut store = Store::new();
        let source_a = store.get_or_create_source("A", "");
        let source_b = store.get_or_create_source("B", "");
        let service = store.create_service(Service {
            line_name: "1".to_string(),
            current: true,
            source: Some(source_a),
            ..Default::default()
        });
        let (route_a, _) = store.upsert_route(source_a, "one", |route| {
            route.service = service;
        });
        let (route_b, _) = store.upsert_route(source_b, "one", |route| {
            route.service = service;
        });
        replace_route_trips(
            &mut store,
            route_b,
            vec![(trip(route_b, "08:00", "08:30"), vec![stop_time(0, "x", "08:00")])],
        );

        // a re-import of source A that no longer carries the route
        let ctx = ImportContext::new(source_a, today());
        mark_old_services_as_not_current(&mut store, &ctx);

        assert!(store.route(route_a).is_none());
        // source B's route still vouches for the service
        assert!(store.route(route_b).is_some());
        assert!(store.service(service).unwrap().current);
        assert_eq!(store.trips_of_route(route_b).len(), 1);

        // now source B withdraws too
        let ctx = ImportContext::new(source_b, today());
        mark_old_services_as_not_current(&mut store, &ctx);
        assert!(store.route(route_b).is_none());
        // the service belongs to source A, so B's sweep leaves the flag;
        // A's next run retires it
        let ctx = ImportContext::new(source_a, today());
        mark_old_services_as_not_current(&mut store, &ctx);
        assert!(!store.service(service).unwrap().current);
    }

    #[test]
    fn test_widest_pattern_merges_short_workings() {
        let mut store = Store::new();
        let source = store.get_or_create_source("EA", "");
        let service = store.create_service(Service {
            line_name: "45A".to_string(),
            current: true,
            ..Default::default()
        });
        let (route, _) = store.upsert_route(source, "r", |route| {
            route.service = service;
        });
        // the full run visits a-b-c-d; a short working skips b
        replace_route_trips(
            &mut store,
            route,
            vec![
                (
                    trip(route, "09:00", "09:30"),
                    vec![
                        stop_time(0, "a", "09:00"),
                        stop_time(1, "b", "09:10"),
                        stop_time(2, "c", "09:20"),
                        stop_time(3, "d", "09:30"),
                    ],
                ),
                (
                    trip(route, "10:00", "10:20"),
                    vec![
                        stop_time(0, "a", "10:00"),
                        stop_time(1, "c", "10:10"),
                        stop_time(2, "d", "10:20"),
                    ],
                ),
            ],
        );

        let mut ctx = ImportContext::new(source, today());
        ctx.service_ids.insert(service);
        finish_services(&mut store, &ctx);

        let order: Vec<&str> = store
            .stop_usages(service)
            .iter()
            .map(|usage| usage.stop.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_finish_services_sweeps_orphaned_calendars() {
        let mut store = Store::new();
        let source = store.get_or_create_source("EA", "");
        let service = store.create_service(Service {
            line_name: "1".to_string(),
            current: true,
            ..Default::default()
        });
        let (route, _) = store.upsert_route(source, "r", |route| {
            route.service = service;
        });
        let calendar = store
            .create_calendar(&CalendarPattern {
                days: [true; 7],
                start_date: Some(today()),
                ..Default::default()
            })
            .unwrap();
        let mut first = trip(route, "09:00", "09:30");
        first.calendar = Some(calendar);
        replace_route_trips(&mut store, route, vec![(first, vec![])]);

        // replacement with a different start abandons the old calendar
        let replacement = store
            .create_calendar(&CalendarPattern {
                days: [true, true, true, true, true, false, false],
                start_date: Some(today()),
                ..Default::default()
            })
            .unwrap();
        let mut second = trip(route, "09:15", "09:45");
        second.calendar = Some(replacement);
        replace_route_trips(&mut store, route, vec![(second, vec![])]);

        let mut ctx = ImportContext::new(source, today());
        ctx.service_ids.insert(service);
        finish_services(&mut store, &ctx);

        assert!(store.calendar(calendar).is_none());
        assert!(store.calendar(replacement).is_some());
    }

    #[test]
    fn test_clean_up_spares_joint_services() {
        let mut store = Store::new();
        store.add_operator(crate::model::Operator {
            id: "AAAA".to_string(),
            name: "Alpha".to_string(),
            parent: None,
            licences: Vec::new(),
            region: None,
        });
        let legacy = store.get_or_create_source("legacy", "");
        let bods = store.get_or_create_source("open data", "");

        let solo = store.create_service(Service {
            line_name: "1".to_string(),
            operators: vec!["AAAA".to_string()],
            current: true,
            ..Default::default()
        });
        let joint = store.create_service(Service {
            line_name: "2".to_string(),
            operators: vec!["AAAA".to_string(), "BBBB".to_string()],
            current: true,
            ..Default::default()
        });
        let (solo_route, _) = store.upsert_route(legacy, "1", |r| r.service = solo);
        let (joint_route, _) = store.upsert_route(legacy, "2", |r| r.service = joint);

        clean_up(&mut store, &["AAAA".to_string()], &[bods]);

        assert!(store.route(solo_route).is_none());
        assert!(!store.service(solo).unwrap().current);
        // joint service kept: its operator set is not wholly ours
        assert!(store.route(joint_route).is_some());
        assert!(store.service(joint).unwrap().current);
    }
}
