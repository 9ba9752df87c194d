//! the ATCO-CIF importer: a state machine over a file's record stream.
//! a QD record opens a route, QS opens a journey with its recurrence, QE
//! rows accumulate exceptions, QO/QI build up the calls, and QT closes the
//! journey and writes it out. notes trailing a call adjust its pick-up and
//! set-down flags; notes trailing the header attach to the whole journey.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use kdam::BarExt;
use log::warn;

use omnibus_core::import::{sync, ImportContext};
use omnibus_core::model::{
    CalendarPattern, ExceptionPattern, NoteId, RouteId, Service, ServiceId, StopPoint, StopRef,
    StopTime, TimingStatus, Trip, TripId,
};
use omnibus_core::store::Store;

use crate::record::{parse_record, CifRecord, JourneyHeader};
use crate::CifError;

/// which publisher a CIF archive belongs to, inferred from its file name
pub fn source_name_for_archive(archive_name: &str) -> &'static str {
    let lowered = archive_name.to_lowercase();
    if lowered.contains("ulb") || lowered.contains("ulsterbus") {
        "ULB"
    } else {
        "MET"
    }
}

struct OpenJourney {
    header: JourneyHeader,
    exceptions: Vec<ExceptionPattern>,
    stop_times: Vec<StopTime>,
    notes: Vec<NoteId>,
}

#[derive(Default)]
pub struct CifImporter {
    route: Option<RouteId>,
    service: Option<ServiceId>,
    journey: Option<OpenJourney>,
    /// routes seen this archive, by their `LINE_OPERATOR` key
    routes: HashMap<String, RouteId>,
    sequence: u16,
    previous_identity: [u8; 2],
}

impl CifImporter {
    pub fn new() -> CifImporter {
        CifImporter::default()
    }

    /// one `.cif` member: stop definitions first, then the journey records
    pub fn handle_file(
        &mut self,
        store: &mut Store,
        ctx: &mut ImportContext,
        content: &[u8],
    ) -> Result<(), CifError> {
        self.route = None;
        self.service = None;
        self.journey = None;
        self.sequence = 0;
        self.previous_identity = [0; 2];

        // stops pass
        for line in lines(content) {
            match parse_record(line) {
                Some(CifRecord::LocationName { stop_code, name }) => {
                    if !name.is_empty() && store.stop(&stop_code).is_none() {
                        store.upsert_stop(StopPoint {
                            atco_code: stop_code,
                            common_name: name,
                            active: true,
                            latlong: None,
                        });
                    }
                }
                Some(CifRecord::LocationGrid {
                    stop_code,
                    easting: Some(easting),
                    northing: Some(northing),
                }) => {
                    if let Some(stop) = store.stop(&stop_code).cloned() {
                        store.upsert_stop(StopPoint {
                            latlong: Some((easting, northing)),
                            ..stop
                        });
                    }
                }
                _ => {}
            }
        }

        // everything else
        for line in lines(content) {
            self.handle_line(store, ctx, line)?;
            if line.len() >= 2 {
                self.previous_identity = [line[0], line[1]];
            }
        }

        if self.journey.is_some() {
            warn!("file ended with an unterminated journey");
            self.journey = None;
        }
        Ok(())
    }

    fn handle_line(
        &mut self,
        store: &mut Store,
        ctx: &mut ImportContext,
        line: &[u8],
    ) -> Result<(), CifError> {
        let Some(record) = parse_record(line) else {
            return Ok(());
        };
        match record {
            CifRecord::RouteHeader {
                operator,
                line_name,
                outbound,
                description,
            } => self.open_route(store, ctx, &operator, &line_name, outbound, &description),
            CifRecord::JourneyHeader(header) => {
                self.journey = Some(OpenJourney {
                    header,
                    exceptions: Vec::new(),
                    stop_times: Vec::new(),
                    notes: Vec::new(),
                });
                self.sequence = 0;
            }
            CifRecord::Exception {
                start_date,
                end_date,
                operation,
            } => {
                if let (Some(journey), Some(start_date)) = (self.journey.as_mut(), start_date) {
                    journey.exceptions.push(ExceptionPattern {
                        start_date,
                        end_date,
                        operation,
                        special: false,
                        summary: String::new(),
                    });
                }
            }
            CifRecord::Origin {
                stop_code,
                departure,
            } => {
                if self.route.is_some() {
                    if let Some(journey) = self.journey.as_mut() {
                        self.sequence = 0;
                        journey.stop_times.push(StopTime {
                            sequence: 0,
                            stop: stop_ref(store, &stop_code),
                            arrival: departure,
                            departure,
                            pick_up: true,
                            set_down: true,
                            timing_status: TimingStatus::Unknown,
                        });
                    }
                }
            }
            CifRecord::Intermediate {
                stop_code,
                arrival,
                departure,
                timing_status,
            } => {
                if let Some(journey) = self.journey.as_mut() {
                    if !journey.stop_times.is_empty() {
                        self.sequence += 1;
                        let Some(timing_status) = timing_status else {
                            warn!("unrecognised timing status in {stop_code} call");
                            return Ok(());
                        };
                        journey.stop_times.push(StopTime {
                            sequence: self.sequence,
                            stop: stop_ref(store, &stop_code),
                            arrival,
                            departure,
                            pick_up: true,
                            set_down: true,
                            timing_status,
                        });
                    }
                }
            }
            CifRecord::Destination { stop_code, arrival } => {
                self.sequence += 1;
                let sequence = self.sequence;
                if let Some(mut journey) = self.journey.take() {
                    if !journey.stop_times.is_empty() {
                        journey.stop_times.push(StopTime {
                            sequence,
                            stop: stop_ref(store, &stop_code),
                            arrival,
                            departure: None,
                            pick_up: false,
                            set_down: true,
                            timing_status: TimingStatus::Unknown,
                        });
                        self.close_journey(store, ctx, journey)?;
                    }
                }
            }
            CifRecord::Note { code, text } => self.handle_note(store, ctx, &code, &text),
            CifRecord::LocationName { .. } | CifRecord::LocationGrid { .. } => {}
        }
        Ok(())
    }

    fn open_route(
        &mut self,
        store: &mut Store,
        ctx: &mut ImportContext,
        operator: &str,
        line_name: &str,
        outbound: bool,
        description: &str,
    ) {
        let key = format!("{line_name}_{operator}").to_uppercase();
        if let Some(route) = self.routes.get(&key) {
            self.route = Some(*route);
            self.service = store.route(*route).map(|r| r.service);
            if let Some(service) = self.service.and_then(|id| store.service_mut(id)) {
                if outbound {
                    service.description = description.to_string();
                    service.outbound_description = description.to_string();
                } else {
                    service.inbound_description = description.to_string();
                }
            }
            return;
        }

        // the route key doubles as the source-scoped service code
        let service_id = store
            .service_by_source_and_code(ctx.source, &key)
            .unwrap_or_else(|| {
                store.create_service(Service {
                    line_name: line_name.to_string(),
                    service_code: key.clone(),
                    ..Default::default()
                })
            });
        {
            let region = ctx.region.clone();
            let service = store.service_mut(service_id).expect("service row exists");
            service.line_name = line_name.to_string();
            service.service_code = key.clone();
            service.current = true;
            service.date = Some(ctx.today);
            service.source = Some(ctx.source);
            service.region = region;
            if outbound {
                service.description = description.to_string();
                service.outbound_description = description.to_string();
            } else {
                service.inbound_description = description.to_string();
            }
            if !operator.is_empty() && !service.operators.iter().any(|op| op == operator) {
                service.operators.push(operator.to_string());
            }
        }
        ctx.service_ids.insert(service_id);

        let line_name = line_name.to_string();
        let description = description.to_string();
        let (route_id, created) = store.upsert_route(ctx.source, &key, |route| {
            route.service = service_id;
            route.line_name = line_name;
            route.description = description;
            route.service_code = key.clone();
        });
        if !created {
            store.delete_trips_of_route(route_id);
        }
        ctx.route_ids.insert(route_id);
        self.routes.insert(key, route_id);
        self.route = Some(route_id);
        self.service = Some(service_id);
    }

    fn close_journey(
        &mut self,
        store: &mut Store,
        ctx: &mut ImportContext,
        journey: OpenJourney,
    ) -> Result<(), CifError> {
        let Some(route) = self.route else {
            return Ok(());
        };
        let pattern = CalendarPattern {
            days: journey.header.days,
            start_date: journey.header.start_date,
            end_date: journey.header.end_date,
            summary: String::new(),
            exceptions: journey.exceptions,
            bank_holidays: Vec::new(),
        };
        let calendar = ctx.intern_calendar(store, &pattern)?;

        let start = journey
            .stop_times
            .first()
            .and_then(StopTime::departure_or_arrival)
            .unwrap_or_default();
        let end = journey
            .stop_times
            .last()
            .and_then(StopTime::arrival_or_departure)
            .unwrap_or_default();
        let destination = journey
            .stop_times
            .last()
            .and_then(|st| st.stop.atco_code())
            .map(str::to_string);

        let trip = Trip {
            id: TripId(0),
            route,
            calendar: Some(calendar),
            inbound: journey.header.inbound,
            journey_pattern: String::new(),
            ticket_machine_code: String::new(),
            start,
            end,
            destination,
            block: None,
            vehicle_type: None,
            garage: None,
            sequence: None,
            notes: journey.notes,
        };
        store.insert_trip(trip, journey.stop_times);
        Ok(())
    }

    /// a note's meaning depends on what it follows: after a call it narrows
    /// that call's pick-up/set-down, after the header it describes the
    /// whole journey
    fn handle_note(&mut self, store: &mut Store, ctx: &mut ImportContext, code: &str, text: &str) {
        match &self.previous_identity {
            b"QO" | b"QI" | b"QT" => {
                let after_destination = &self.previous_identity == b"QT";
                if let Some(journey) = self.journey.as_mut() {
                    let lowered = text.to_lowercase();
                    match lowered.as_str() {
                        "pick up only" | "pick up  only" => {
                            if !after_destination {
                                if let Some(last) = journey.stop_times.last_mut() {
                                    last.set_down = false;
                                }
                            }
                        }
                        "set down only" | ".set down only" | "drop off only" => {
                            if !after_destination {
                                if let Some(last) = journey.stop_times.last_mut() {
                                    last.pick_up = false;
                                }
                            }
                        }
                        other => warn!("unrecognised call note '{other}'"),
                    }
                }
            }
            b"QS" | b"QE" | b"QN" => {
                let note = ctx.intern_note(store, code, text);
                if let Some(journey) = self.journey.as_mut() {
                    journey.notes.push(note);
                }
            }
            _ => warn!("note in unexpected position: '{text}'"),
        }
    }
}

fn stop_ref(store: &Store, stop_code: &str) -> StopRef {
    if store.stop(stop_code).is_some() {
        StopRef::Stop(stop_code.to_string())
    } else {
        StopRef::Code(stop_code.to_string())
    }
}

fn lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content
        .split(|byte| *byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
}

/// works through every `.cif` member of an archive in listing order
pub fn handle_archive(
    store: &mut Store,
    ctx: &mut ImportContext,
    archive_path: &Path,
) -> Result<(), CifError> {
    let display = archive_path.display().to_string();
    let file = File::open(archive_path).map_err(|e| CifError::Io(display.clone(), e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| CifError::Archive(display.clone(), e))?;

    let names: Vec<String> = archive
        .file_names()
        .filter(|name| name.ends_with(".cif"))
        .map(str::to_string)
        .collect();

    let mut importer = CifImporter::new();
    let mut bar = kdam::Bar::builder()
        .total(names.len())
        .desc(display.clone())
        .build()
        .ok();
    for name in names {
        let mut member = archive
            .by_name(&name)
            .map_err(|e| CifError::Archive(display.clone(), e))?;
        let mut content = Vec::new();
        member
            .read_to_end(&mut content)
            .map_err(|e| CifError::Io(name.clone(), e))?;
        importer.handle_file(store, ctx, &content)?;
        if let Some(bar) = bar.as_mut() {
            let _ = bar.update(1);
        }
    }

    sync::mark_old_services_as_not_current(store, ctx);
    sync::finish_services(store, ctx);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;
    use omnibus_core::model::TimeOfDay;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const FILE: &[u8] = b"QLN100000000001Donegall Square\n\
QLN100000000002Glen Road\n\
QDNMET 163 OGlen Road - City Centre\n\
QSNMET 00000120240101999999991111100\n\
QE20240304202403040\n\
QO1000000000010905\n\
QI10000000000309100910B   T1\n\
QN00001Set down only\n\
QT1000000000020935\n";

    #[test]
    fn test_state_machine_builds_route_trip_and_calendar() {
        let mut store = Store::new();
        let source = store.get_or_create_source("MET", "");
        let mut ctx = ImportContext::new(source, date(2024, 5, 1));
        let mut importer = CifImporter::new();

        importer.handle_file(&mut store, &mut ctx, FILE).unwrap();

        // stops from the QL pass
        assert_eq!(store.stop("100000000001").unwrap().common_name, "Donegall Square");

        // one route under the LINE_OPERATOR key, holding one trip
        assert_eq!(ctx.route_ids.len(), 1);
        let route_id = *ctx.route_ids.iter().next().unwrap();
        let route = store.route(route_id).unwrap();
        assert_eq!(route.code, "163_MET");
        assert_eq!(route.line_name, "163");

        let trips = store.trips_of_route(route_id);
        assert_eq!(trips.len(), 1);
        let trip = trips[0];
        assert_eq!(trip.start, TimeOfDay::from_hms(9, 5, 0));
        assert_eq!(trip.end, TimeOfDay::from_hms(9, 35, 0));
        assert_eq!(trip.destination.as_deref(), Some("100000000002"));

        // the header's weekday-only pattern with its excluded monday
        let calendar = trip.calendar.unwrap();
        assert!(store.calendar_allows(calendar, date(2024, 3, 11), None));
        assert!(!store.calendar_allows(calendar, date(2024, 3, 4), None));
        assert!(!store.calendar_allows(calendar, date(2024, 3, 9), None));

        // the trailing note made the intermediate call set-down only
        let stop_times = store.stop_times(trip.id);
        assert_eq!(stop_times.len(), 3);
        assert!(!stop_times[1].pick_up);
        assert!(stop_times[1].set_down);
        assert_eq!(stop_times[1].timing_status, TimingStatus::Principal);
        // the unresolved middle stop kept its raw code
        assert_eq!(stop_times[1].stop, StopRef::Code("100000000003".to_string()));

        // re-importing the same file replaces rather than duplicates
        let mut importer = CifImporter::new();
        importer.handle_file(&mut store, &mut ctx, FILE).unwrap();
        assert_eq!(store.trips_of_route(route_id).len(), 1);
    }

    #[test]
    fn test_source_name_for_archive() {
        assert_eq!(source_name_for_archive("Ulsterbus.zip"), "ULB");
        assert_eq!(source_name_for_archive("metro_2024.zip"), "MET");
    }
}
