//! turning vehicle journeys into trips: walking the journey pattern's
//! timing links to accumulate clock times, normalizing activities and
//! timing statuses, and interning the pattern's calendar.

use std::collections::HashMap;

use log::warn;

use omnibus_core::import::sync::replace_route_trips;
use omnibus_core::import::ImportContext;
use omnibus_core::model::{
    CalendarId, RouteId, StopRef, StopTime, TimeOfDay, TimingStatus, Trip, TripId,
};
use omnibus_core::store::Store;

use crate::import::ResolvedStop;
use crate::txc::{TransXChangeDocument, TxcService, VehicleJourney};
use crate::TxcError;

fn normalize_timing_status(raw: Option<&str>) -> TimingStatus {
    match raw {
        None => TimingStatus::Unknown,
        Some("principalTimingPoint") | Some("principleTimingPoint") | Some("PTP") => {
            TimingStatus::Principal
        }
        Some("otherPoint") | Some("OTH") => TimingStatus::Other,
        Some("timeInfoPoint") | Some("TIP") => TimingStatus::TimeInfo,
        Some(other) => {
            warn!("unrecognised timing status {other}");
            TimingStatus::Unknown
        }
    }
}

fn apply_activity(stop_time: &mut StopTime, activity: Option<&str>) {
    match activity {
        Some("pickUp") => stop_time.set_down = false,
        Some("setDown") => stop_time.pick_up = false,
        Some("pass") => {
            stop_time.pick_up = false;
            stop_time.set_down = false;
        }
        _ => {}
    }
}

fn add_seconds(time: TimeOfDay, seconds: i64) -> TimeOfDay {
    time.checked_add_seconds(seconds).unwrap_or(time)
}

/// builds this journey's ordered stop times by walking its pattern's
/// timing links, accumulating run and wait times from the departure time
fn build_stop_times(
    document: &TransXChangeDocument,
    txc_service: &TxcService,
    journey: &VehicleJourney,
    stops: &HashMap<String, ResolvedStop>,
) -> Option<Vec<StopTime>> {
    let pattern = txc_service
        .journey_patterns
        .get(&journey.journey_pattern_ref)?;
    let departure_time = journey.departure_time?;

    let mut stop_times: Vec<StopTime> = Vec::new();
    let mut sequence: u16 = 0;
    let mut next_arrival = departure_time;
    let mut previous_wait: i64 = 0;
    let mut last_to = None;

    for section_ref in &pattern.section_refs {
        let Some(section) = document.journey_pattern_sections.get(section_ref) else {
            warn!("missing journey pattern section {section_ref}");
            return None;
        };
        for link in &section.timing_links {
            let arrival = next_arrival;
            let departure = add_seconds(arrival, link.from.wait_seconds + previous_wait);

            let mut stop_time = stop_time_at(&link.from, stops, sequence);
            stop_time.departure = Some(departure);
            if arrival != departure {
                stop_time.arrival = Some(arrival);
            }
            stop_times.push(stop_time);

            sequence += 1;
            next_arrival = add_seconds(departure, link.run_seconds);
            previous_wait = link.to.wait_seconds;
            last_to = Some(&link.to);
        }
    }

    let last = last_to?;
    let mut stop_time = stop_time_at(last, stops, sequence);
    stop_time.arrival = Some(next_arrival);
    stop_times.push(stop_time);

    // where some visits carry a timing status and others none, the blanks
    // are minor points rather than unknowns
    let any_known = stop_times
        .iter()
        .any(|st| st.timing_status != TimingStatus::Unknown);
    let any_blank = stop_times
        .iter()
        .any(|st| st.timing_status == TimingStatus::Unknown);
    if any_known && any_blank {
        for stop_time in &mut stop_times {
            if stop_time.timing_status == TimingStatus::Unknown {
                stop_time.timing_status = TimingStatus::Other;
            }
        }
    }

    Some(stop_times)
}

fn stop_time_at(
    usage: &crate::txc::StopUsageElement,
    stops: &HashMap<String, ResolvedStop>,
    fallback_sequence: u16,
) -> StopTime {
    let code = usage.stop_ref.to_uppercase();
    let stop = match stops.get(&code) {
        Some(ResolvedStop::Known(atco)) => StopRef::Stop(atco.clone()),
        Some(ResolvedStop::Unknown(raw)) => StopRef::Code(raw.clone()),
        None => StopRef::Code(usage.stop_ref.clone()),
    };
    let mut stop_time = StopTime {
        sequence: usage.sequence_number.unwrap_or(fallback_sequence),
        stop,
        arrival: None,
        departure: None,
        pick_up: true,
        set_down: true,
        timing_status: normalize_timing_status(usage.timing_status.as_deref()),
    };
    apply_activity(&mut stop_time, usage.activity.as_deref());
    stop_time
}

/// imports one line's journeys under its route, preserving trip identity
/// when the republished schedule is unchanged
pub fn handle_journeys(
    store: &mut Store,
    ctx: &mut ImportContext,
    document: &TransXChangeDocument,
    txc_service: &TxcService,
    journeys: &[&VehicleJourney],
    route: RouteId,
    stops: &HashMap<String, ResolvedStop>,
) -> Result<(), TxcError> {
    let mut default_calendar: Option<CalendarId> = None;
    let mut incoming: Vec<(Trip, Vec<StopTime>)> = Vec::new();

    for journey in journeys {
        let pattern = txc_service.journey_patterns.get(&journey.journey_pattern_ref);

        let profile = journey
            .operating_profile
            .as_ref()
            .or_else(|| pattern.and_then(|p| p.operating_profile.as_ref()));
        let calendar = match profile {
            Some(profile) => Some(ctx.intern_calendar(
                store,
                &profile.to_calendar_pattern(
                    txc_service.operating_period_start,
                    txc_service.operating_period_end,
                ),
            )?),
            None => match &txc_service.operating_profile {
                Some(service_profile) => {
                    if default_calendar.is_none() {
                        default_calendar = Some(ctx.intern_calendar(
                            store,
                            &service_profile.to_calendar_pattern(
                                txc_service.operating_period_start,
                                txc_service.operating_period_end,
                            ),
                        )?);
                    }
                    default_calendar
                }
                None => None,
            },
        };

        let Some(mut stop_times) = build_stop_times(document, txc_service, journey, stops) else {
            warn!("skipping journey {} with no times", journey.code);
            continue;
        };

        // the final visit only sets people down
        if let Some(last) = stop_times.last_mut() {
            if last.arrival.is_none() {
                last.arrival = last.departure.take();
            }
        }

        let start = stop_times
            .first()
            .and_then(StopTime::departure_or_arrival)
            .unwrap_or_default();
        let end = stop_times
            .last()
            .and_then(StopTime::arrival_or_departure)
            .unwrap_or_default();
        if start == end {
            warn!("journey {} takes no time", journey.code);
        }

        let destination = stop_times
            .last()
            .and_then(|st| st.stop.atco_code())
            .map(str::to_string);

        let block = (!journey.block_code.is_empty())
            .then(|| ctx.intern_block(store, &journey.block_code, &journey.block_description));
        let vehicle_type = (!journey.vehicle_type_code.is_empty()).then(|| {
            ctx.intern_vehicle_type(
                store,
                &journey.vehicle_type_code,
                &journey.vehicle_type_description,
            )
        });
        let garage = journey
            .garage_ref
            .as_deref()
            .and_then(|garage_ref| ctx.garage(garage_ref));

        let notes = journey
            .notes
            .iter()
            .map(|(code, text)| ctx.intern_note(store, code, text))
            .collect();

        let trip = Trip {
            id: TripId(0),
            route,
            calendar,
            inbound: pattern.is_some_and(|p| p.inbound),
            journey_pattern: journey.journey_pattern_ref.clone(),
            ticket_machine_code: journey.ticket_machine_journey_code.clone(),
            start,
            end,
            destination,
            block,
            vehicle_type,
            garage,
            sequence: journey.sequence_number,
            notes,
        };
        incoming.push((trip, stop_times));
    }

    replace_route_trips(store, route, incoming);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::txc::{JourneyPatternSection, StopUsageElement, TimingLink};

    fn usage(stop: &str, wait: i64, status: Option<&str>, activity: Option<&str>) -> StopUsageElement {
        StopUsageElement {
            stop_ref: stop.to_string(),
            activity: activity.map(str::to_string),
            timing_status: status.map(str::to_string),
            wait_seconds: wait,
            sequence_number: None,
        }
    }

    #[test]
    fn test_times_accumulate_over_links() {
        let mut document = TransXChangeDocument::default();
        document.journey_pattern_sections.insert(
            "JPS1".to_string(),
            JourneyPatternSection {
                timing_links: vec![
                    TimingLink {
                        from: usage("A", 0, Some("principalTimingPoint"), Some("pickUp")),
                        to: usage("B", 60, None, None),
                        run_seconds: 600,
                        route_link_ref: None,
                    },
                    TimingLink {
                        from: usage("B", 0, None, None),
                        to: usage("C", 0, Some("principalTimingPoint"), None),
                        run_seconds: 300,
                        route_link_ref: None,
                    },
                ],
            },
        );
        let mut service = crate::txc::TxcService {
            service_code: "s".to_string(),
            mode: String::new(),
            description: String::new(),
            origin: String::new(),
            destination: String::new(),
            vias: Vec::new(),
            marketing_name: String::new(),
            public_use: None,
            operating_period_start: None,
            operating_period_end: None,
            operating_profile: None,
            registered_operator_ref: None,
            lines: Vec::new(),
            journey_patterns: HashMap::new(),
        };
        service.journey_patterns.insert(
            "JP1".to_string(),
            crate::txc::JourneyPattern {
                id: "JP1".to_string(),
                inbound: false,
                section_refs: vec!["JPS1".to_string()],
                operating_profile: None,
            },
        );
        let journey = VehicleJourney {
            code: "VJ1".to_string(),
            service_ref: "s".to_string(),
            line_ref: "L1".to_string(),
            journey_pattern_ref: "JP1".to_string(),
            departure_time: Some(TimeOfDay::from_hms(9, 0, 0)),
            operating_profile: None,
            operator_ref: None,
            block_code: String::new(),
            block_description: String::new(),
            garage_ref: None,
            vehicle_type_code: String::new(),
            vehicle_type_description: String::new(),
            ticket_machine_journey_code: String::new(),
            ticket_machine_service_code: String::new(),
            sequence_number: None,
            notes: Vec::new(),
        };

        let stops = HashMap::new();
        let stop_times = build_stop_times(&document, &service, &journey, &stops).unwrap();

        assert_eq!(stop_times.len(), 3);
        // first stop departs at the journey's departure time
        assert_eq!(stop_times[0].departure, Some(TimeOfDay::from_hms(9, 0, 0)));
        assert!(!stop_times[0].set_down, "pickUp activity");
        // second stop: 10 minutes' run, then a minute's wait before leaving
        assert_eq!(stop_times[1].arrival, Some(TimeOfDay::from_hms(9, 10, 0)));
        assert_eq!(stop_times[1].departure, Some(TimeOfDay::from_hms(9, 11, 0)));
        // last stop arrives five minutes later
        assert_eq!(stop_times[2].arrival, Some(TimeOfDay::from_hms(9, 16, 0)));
        assert_eq!(stop_times[2].departure, None);
        // blank statuses in a mixed journey become minor points
        assert_eq!(stop_times[1].timing_status, TimingStatus::Other);
    }
}
