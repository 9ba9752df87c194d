mod store_error;

pub use store_error::StoreError;

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use itertools::Itertools;
use log::warn;

use crate::model::{
    allows, BankHoliday, BankHolidayDate, BankHolidayId, Block, BlockId, Calendar,
    CalendarBankHoliday, CalendarDate, CalendarId, CalendarPattern, DataSource, Garage, GarageId,
    HolidayRule, Note, NoteId, Operator, OperatorCode, OperatorId, Route, RouteId, Service,
    ServiceId, SourceId, StopPoint, StopTime, StopUsage, TimeOfDay, Trip, TripId, VehicleType,
    VehicleTypeId,
};

/// the persistent store. tables are plain maps keyed by row id; natural
/// keys (route `(source, code)`, operator codes, stop atco codes) are
/// enforced by the upsert methods rather than by separate indices.
///
/// writes to a shared service row go through narrow methods that touch a
/// specific field list, never a whole-row overwrite, so two import jobs
/// for different sources can update the same service without losing each
/// other's fields.
#[derive(Debug, Clone, Default)]
pub struct Store {
    sources: HashMap<SourceId, DataSource>,
    operators: HashMap<OperatorId, Operator>,
    operator_codes: Vec<OperatorCode>,
    stops: HashMap<String, StopPoint>,
    services: HashMap<ServiceId, Service>,
    routes: HashMap<RouteId, Route>,
    trips: HashMap<TripId, Trip>,
    stop_times: HashMap<TripId, Vec<StopTime>>,
    calendars: HashMap<CalendarId, Calendar>,
    calendar_dates: HashMap<CalendarId, Vec<CalendarDate>>,
    calendar_bank_holidays: HashMap<CalendarId, Vec<CalendarBankHoliday>>,
    bank_holidays: HashMap<BankHolidayId, BankHoliday>,
    bank_holiday_dates: Vec<BankHolidayDate>,
    stop_usages: HashMap<ServiceId, Vec<StopUsage>>,
    notes: HashMap<NoteId, Note>,
    blocks: HashMap<BlockId, Block>,
    vehicle_types: HashMap<VehicleTypeId, VehicleType>,
    garages: HashMap<GarageId, Garage>,
    slugs: HashSet<String>,
    next_id: u64,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// runs one archive's worth of writes all-or-nothing: if the closure
    /// errors, the store is rolled back to its state at entry, so a failed
    /// import leaves previously-current data untouched.
    pub fn run_batch<T, E>(
        &mut self,
        f: impl FnOnce(&mut Store) -> Result<T, E>,
    ) -> Result<T, E> {
        let checkpoint = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                *self = checkpoint;
                Err(e)
            }
        }
    }

    // --- data sources ---

    pub fn get_or_create_source(&mut self, name: &str, url: &str) -> SourceId {
        if let Some(source) = self.sources.values().find(|s| s.name == name) {
            return source.id;
        }
        let id = SourceId(self.next_id());
        self.sources.insert(
            id,
            DataSource {
                id,
                name: name.to_string(),
                url: url.to_string(),
                datetime: None,
                digest: None,
                region: None,
            },
        );
        id
    }

    pub fn source(&self, id: SourceId) -> Option<&DataSource> {
        self.sources.get(&id)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut DataSource> {
        self.sources.get_mut(&id)
    }

    pub fn touch_source(&mut self, id: SourceId, digest: Option<String>) {
        if let Some(source) = self.sources.get_mut(&id) {
            source.datetime = Some(Utc::now());
            if digest.is_some() {
                source.digest = digest;
            }
        }
    }

    // --- operators ---

    pub fn add_operator(&mut self, operator: Operator) {
        self.operators.insert(operator.id.clone(), operator);
    }

    pub fn add_operator_code(&mut self, operator: &str, scheme: &str, code: &str) {
        self.operator_codes.push(OperatorCode {
            operator: operator.to_string(),
            scheme: scheme.to_string(),
            code: code.to_string(),
        });
    }

    pub fn operator(&self, id: &str) -> Option<&Operator> {
        self.operators.get(id)
    }

    /// looks an operator up by its code under one scheme. mirrors a
    /// `.distinct().get()`: several rows naming the same operator are fine,
    /// rows naming different operators are ambiguous and match nothing.
    pub fn operator_by_code(&self, scheme: &str, code: &str) -> Option<&Operator> {
        let ids: Vec<&str> = self
            .operator_codes
            .iter()
            .filter(|row| row.scheme == scheme && row.code == code)
            .map(|row| row.operator.as_str())
            .unique()
            .collect();
        match ids.as_slice() {
            [id] => self.operators.get(*id),
            _ => None,
        }
    }

    pub fn operator_by_licence(&self, licence: &str) -> Option<&Operator> {
        let matches: Vec<&Operator> = self
            .operators
            .values()
            .filter(|o| o.licences.iter().any(|l| l == licence))
            .collect();
        match matches.as_slice() {
            [operator] => Some(operator),
            _ => None,
        }
    }

    /// exact-name match; ambiguous names match nothing and the caller falls
    /// through to its next resolution step
    pub fn operator_by_name(&self, name: &str) -> Option<&Operator> {
        let matches: Vec<&Operator> = self.operators.values().filter(|o| o.name == name).collect();
        match matches.as_slice() {
            [operator] => Some(operator),
            _ => None,
        }
    }

    // --- stops ---

    pub fn upsert_stop(&mut self, stop: StopPoint) {
        self.stops.insert(stop.atco_code.clone(), stop);
    }

    pub fn stop(&self, atco_code: &str) -> Option<&StopPoint> {
        self.stops.get(atco_code)
    }

    pub fn stops_by_codes<'a>(
        &self,
        codes: impl Iterator<Item = &'a str>,
    ) -> HashMap<String, StopPoint> {
        codes
            .filter_map(|code| self.stops.get(code))
            .map(|stop| (stop.atco_code.clone(), stop.clone()))
            .collect()
    }

    // --- bank holidays ---

    pub fn get_or_create_bank_holiday(&mut self, name: &str) -> BankHolidayId {
        if let Some(holiday) = self.bank_holidays.values().find(|h| h.name == name) {
            return holiday.id;
        }
        let id = BankHolidayId(self.next_id());
        self.bank_holidays.insert(
            id,
            BankHoliday {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    pub fn bank_holiday_by_name(&self, name: &str) -> Option<&BankHoliday> {
        self.bank_holidays.values().find(|h| h.name == name)
    }

    pub fn add_bank_holiday_date(&mut self, holiday: BankHolidayId, date: NaiveDate, scotland: Option<bool>) {
        self.bank_holiday_dates.push(BankHolidayDate {
            bank_holiday: holiday,
            date,
            scotland,
        });
    }

    /// resolves a calendar's holiday associations against the registered
    /// dates table. `scottish` selects region-restricted holiday dates;
    /// `None` keeps only nationwide rows.
    pub fn holiday_rules(&self, calendar: CalendarId, scottish: Option<bool>) -> Vec<HolidayRule> {
        self.calendar_bank_holidays
            .get(&calendar)
            .map(|rows| {
                rows.iter()
                    .map(|row| HolidayRule {
                        operation: row.operation,
                        dates: self
                            .bank_holiday_dates
                            .iter()
                            .filter(|d| d.bank_holiday == row.bank_holiday)
                            .filter(|d| match (d.scotland, scottish) {
                                (None, _) => true,
                                (Some(s), Some(want)) => s == want,
                                (Some(_), None) => false,
                            })
                            .map(|d| d.date)
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // --- calendars ---

    /// persists a parsed operating pattern. exception rows with an end date
    /// before their start date come from malformed upstream data; they are
    /// logged and dropped rather than failing the import.
    pub fn create_calendar(&mut self, pattern: &CalendarPattern) -> Result<CalendarId, StoreError> {
        let start_date = pattern
            .start_date
            .ok_or_else(|| StoreError::MissingField("calendar start date".to_string()))?;
        let id = CalendarId(self.next_id());
        let [mon, tue, wed, thu, fri, sat, sun] = pattern.days;
        self.calendars.insert(
            id,
            Calendar {
                id,
                mon,
                tue,
                wed,
                thu,
                fri,
                sat,
                sun,
                start_date,
                end_date: pattern.end_date,
                summary: pattern.summary.clone(),
            },
        );

        let dates = pattern
            .exceptions
            .iter()
            .filter(|exception| {
                let backwards = exception
                    .end_date
                    .is_some_and(|end| end < exception.start_date);
                if backwards {
                    warn!(
                        "dropping exception with end {} before start {}",
                        exception.end_date.unwrap(),
                        exception.start_date
                    );
                }
                !backwards
            })
            .map(|exception| CalendarDate {
                calendar: id,
                start_date: exception.start_date,
                end_date: exception.end_date,
                operation: exception.operation,
                special: exception.special,
                summary: exception.summary.clone(),
            })
            .collect();
        self.calendar_dates.insert(id, dates);

        let mut holidays: Vec<CalendarBankHoliday> = Vec::new();
        for (name, operation) in &pattern.bank_holidays {
            let holiday = self.get_or_create_bank_holiday(name);
            // a later association for the same holiday overrides an earlier
            // one (non-operation lists are emitted last by the parsers)
            if let Some(existing) = holidays.iter_mut().find(|h| h.bank_holiday == holiday) {
                existing.operation = *operation;
            } else {
                holidays.push(CalendarBankHoliday {
                    calendar: id,
                    bank_holiday: holiday,
                    operation: *operation,
                });
            }
        }
        self.calendar_bank_holidays.insert(id, holidays);

        Ok(id)
    }

    pub fn calendar(&self, id: CalendarId) -> Option<&Calendar> {
        self.calendars.get(&id)
    }

    pub fn calendar_dates(&self, id: CalendarId) -> &[CalendarDate] {
        self.calendar_dates
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// single-calendar form of the date resolution
    pub fn calendar_allows(
        &self,
        id: CalendarId,
        date: NaiveDate,
        scottish: Option<bool>,
    ) -> bool {
        let Some(calendar) = self.calendars.get(&id) else {
            return false;
        };
        let rules = self.holiday_rules(id, scottish);
        allows(calendar, self.calendar_dates(id), &rules, date)
    }

    /// bulk form: which of the candidate calendars (all of them, when no
    /// candidate set is given) operate on the date. one pass over the
    /// candidates with the exception and holiday tables already in hand, so
    /// a day's timetable over thousands of trips resolves in a single call.
    /// the result is exactly the set for which [Store::calendar_allows]
    /// returns true.
    pub fn calendars_on(
        &self,
        date: NaiveDate,
        candidates: Option<&[CalendarId]>,
        scottish: Option<bool>,
    ) -> HashSet<CalendarId> {
        let candidates: Vec<CalendarId> = match candidates {
            Some(ids) => ids.to_vec(),
            None => self.calendars.keys().copied().collect(),
        };
        candidates
            .into_iter()
            .filter(|id| {
                self.calendars.get(id).is_some_and(|calendar| {
                    let rules = self.holiday_rules(*id, scottish);
                    allows(calendar, self.calendar_dates(*id), &rules, date)
                })
            })
            .collect()
    }

    /// calendars referenced by at least one trip but by no current trip --
    /// patterns orphaned by trip replacement, swept opportunistically
    pub fn orphaned_calendars(&self) -> Vec<CalendarId> {
        let referenced: HashSet<CalendarId> =
            self.trips.values().filter_map(|trip| trip.calendar).collect();
        self.calendars
            .keys()
            .filter(|id| !referenced.contains(id))
            .copied()
            .collect()
    }

    pub fn delete_calendars(&mut self, ids: &[CalendarId]) {
        for id in ids {
            self.calendars.remove(id);
            self.calendar_dates.remove(id);
            self.calendar_bank_holidays.remove(id);
        }
    }

    // --- services ---

    pub fn create_service(&mut self, mut service: Service) -> ServiceId {
        let id = ServiceId(self.next_id());
        if service.slug.is_empty() {
            service.slug = self.make_unique_slug(&service.line_name);
        }
        self.slugs.insert(service.slug.clone());
        self.services.insert(id, service);
        id
    }

    pub fn service(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(&id)
    }

    pub fn service_mut(&mut self, id: ServiceId) -> Option<&mut Service> {
        self.services.get_mut(&id)
    }

    pub fn services(&self) -> impl Iterator<Item = (ServiceId, &Service)> {
        self.services.iter().map(|(id, service)| (*id, service))
    }

    /// candidate set for reconciliation: case-insensitive line-name match,
    /// current services first, then oldest row first
    pub fn services_by_line_name(&self, line_name: &str) -> Vec<ServiceId> {
        self.services
            .iter()
            .filter(|(_, s)| s.line_name.eq_ignore_ascii_case(line_name))
            .sorted_by_key(|(id, s)| (!s.current, **id))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn service_by_code(&self, service_code: &str) -> Option<ServiceId> {
        self.services
            .iter()
            .filter(|(_, s)| !s.service_code.is_empty() && s.service_code == service_code)
            .sorted_by_key(|(id, s)| (!s.current, **id))
            .map(|(id, _)| *id)
            .next()
    }

    pub fn service_by_source_and_code(
        &self,
        source: SourceId,
        service_code: &str,
    ) -> Option<ServiceId> {
        self.services
            .iter()
            .filter(|(_, s)| s.source == Some(source) && s.service_code == service_code)
            .sorted_by_key(|(id, _)| **id)
            .map(|(id, _)| *id)
            .next()
    }

    /// generates a slug that is free in the slug table, suffixing a counter
    /// on collision rather than erroring
    pub fn make_unique_slug(&self, base: &str) -> String {
        let base = slugify(base);
        if !self.slugs.contains(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !self.slugs.contains(candidate))
            .unwrap()
    }

    pub fn reslug_service(&mut self, id: ServiceId) {
        let Some(service) = self.services.get(&id) else {
            return;
        };
        let old = service.slug.clone();
        let fresh = self.make_unique_slug(&service.line_name);
        self.slugs.remove(&old);
        self.slugs.insert(fresh.clone());
        if let Some(service) = self.services.get_mut(&id) {
            service.slug = fresh;
        }
    }

    // --- stop usages ---

    pub fn set_stop_usages(&mut self, service: ServiceId, usages: Vec<StopUsage>) {
        self.stop_usages.insert(service, usages);
    }

    pub fn stop_usages(&self, service: ServiceId) -> &[StopUsage] {
        self.stop_usages
            .get(&service)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // --- routes ---

    /// update-or-create on the `(source, code)` natural key. the closure
    /// fills in or refreshes everything except the identity fields.
    pub fn upsert_route(
        &mut self,
        source: SourceId,
        code: &str,
        apply: impl FnOnce(&mut Route),
    ) -> (RouteId, bool) {
        let existing = self
            .routes
            .values()
            .find(|route| route.source == source && route.code == code)
            .map(|route| route.id);
        match existing {
            Some(id) => {
                let route = self.routes.get_mut(&id).unwrap();
                apply(route);
                (id, false)
            }
            None => {
                let id = RouteId(self.next_id());
                let mut route = Route {
                    id,
                    source,
                    code: code.to_string(),
                    service: ServiceId(0),
                    line_name: String::new(),
                    line_brand: String::new(),
                    description: String::new(),
                    origin: String::new(),
                    via: String::new(),
                    destination: String::new(),
                    service_code: String::new(),
                    revision_number: String::new(),
                    start_date: None,
                    end_date: None,
                    geometry: Vec::new(),
                };
                apply(&mut route);
                self.routes.insert(id, route);
                (id, true)
            }
        }
    }

    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(&id)
    }

    pub fn route_mut(&mut self, id: RouteId) -> Option<&mut Route> {
        self.routes.get_mut(&id)
    }

    pub fn routes_of_service(&self, service: ServiceId) -> Vec<&Route> {
        self.routes
            .values()
            .filter(|route| route.service == service)
            .sorted_by_key(|route| route.id)
            .collect()
    }

    pub fn routes_of_source(&self, source: SourceId) -> Vec<RouteId> {
        self.routes
            .values()
            .filter(|route| route.source == source)
            .map(|route| route.id)
            .sorted()
            .collect()
    }

    pub fn service_has_routes(&self, service: ServiceId) -> bool {
        self.routes.values().any(|route| route.service == service)
    }

    /// cascading delete: the routes' trips and their stop times go too
    pub fn delete_routes(&mut self, ids: &[RouteId]) {
        let ids: HashSet<RouteId> = ids.iter().copied().collect();
        let trip_ids: Vec<TripId> = self
            .trips
            .values()
            .filter(|trip| ids.contains(&trip.route))
            .map(|trip| trip.id)
            .collect();
        for trip_id in trip_ids {
            self.trips.remove(&trip_id);
            self.stop_times.remove(&trip_id);
        }
        for id in ids {
            self.routes.remove(&id);
        }
    }

    // --- trips ---

    pub fn insert_trip(&mut self, mut trip: Trip, stop_times: Vec<StopTime>) -> TripId {
        let id = TripId(self.next_id());
        trip.id = id;
        self.trips.insert(id, trip);
        self.stop_times.insert(id, stop_times);
        id
    }

    /// writes a trip under an existing id, replacing its stop times
    pub fn replace_trip(&mut self, trip: Trip, stop_times: Vec<StopTime>) {
        self.stop_times.insert(trip.id, stop_times);
        self.trips.insert(trip.id, trip);
    }

    pub fn trip(&self, id: TripId) -> Option<&Trip> {
        self.trips.get(&id)
    }

    /// a route's trips in creation order, which is the order their source
    /// file listed them
    pub fn trips_of_route(&self, route: RouteId) -> Vec<&Trip> {
        self.trips
            .values()
            .filter(|trip| trip.route == route)
            .sorted_by_key(|trip| trip.id)
            .collect()
    }

    pub fn delete_trips_of_route(&mut self, route: RouteId) {
        let ids: Vec<TripId> = self
            .trips
            .values()
            .filter(|trip| trip.route == route)
            .map(|trip| trip.id)
            .collect();
        for id in ids {
            self.trips.remove(&id);
            self.stop_times.remove(&id);
        }
    }

    pub fn stop_times(&self, trip: TripId) -> &[StopTime] {
        self.stop_times
            .get(&trip)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// does the service already stop at any of these stops? used as the
    /// geography tie-break when matching an incoming service
    pub fn service_has_stop_time_at(&self, service: ServiceId, stops: &HashSet<String>) -> bool {
        self.routes
            .values()
            .filter(|route| route.service == service)
            .any(|route| {
                self.trips
                    .values()
                    .filter(|trip| trip.route == route.id)
                    .any(|trip| {
                        self.stop_times(trip.id).iter().any(|st| {
                            st.stop.atco_code().is_some_and(|code| stops.contains(code))
                        })
                    })
            })
    }

    pub fn service_has_stop_usage_at(&self, service: ServiceId, stops: &HashSet<String>) -> bool {
        self.stop_usages(service)
            .iter()
            .any(|usage| stops.contains(&usage.stop))
    }

    /// the AVL-facing query: trips in progress at the given moment,
    /// including yesterday's past-midnight journeys still on the road
    pub fn trips_running_at(&self, date: NaiveDate, time: TimeOfDay) -> Vec<TripId> {
        let today = self.calendars_on(date, None, None);
        let yesterday = date
            .pred_opt()
            .map(|prev| self.calendars_on(prev, None, None))
            .unwrap_or_default();
        let late = time.previous_day_equivalent();
        self.trips
            .values()
            .filter(|trip| {
                let Some(calendar) = trip.calendar else {
                    return false;
                };
                (today.contains(&calendar) && trip.start <= time && time <= trip.end)
                    || (yesterday.contains(&calendar)
                        && trip.end.is_next_day()
                        && trip.start <= late
                        && late <= trip.end)
            })
            .map(|trip| trip.id)
            .sorted()
            .collect()
    }

    // --- ancillary interned rows ---

    pub fn get_or_create_note(&mut self, code: &str, text: &str) -> NoteId {
        if let Some(note) = self
            .notes
            .values()
            .find(|note| note.code == code && note.text == text)
        {
            return note.id;
        }
        let id = NoteId(self.next_id());
        self.notes.insert(
            id,
            Note {
                id,
                code: code.to_string(),
                text: text.to_string(),
            },
        );
        id
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn create_block(&mut self, code: &str, description: &str) -> BlockId {
        let id = BlockId(self.next_id());
        self.blocks.insert(
            id,
            Block {
                id,
                code: code.to_string(),
                description: description.to_string(),
            },
        );
        id
    }

    pub fn get_or_create_vehicle_type(&mut self, code: &str, description: &str) -> VehicleTypeId {
        if let Some(vt) = self.vehicle_types.values().find(|vt| vt.code == code) {
            return vt.id;
        }
        let id = VehicleTypeId(self.next_id());
        self.vehicle_types.insert(
            id,
            VehicleType {
                id,
                code: code.to_string(),
                description: description.to_string(),
            },
        );
        id
    }

    pub fn get_or_create_garage(&mut self, code: &str, name: &str) -> GarageId {
        if let Some(garage) = self
            .garages
            .values()
            .find(|garage| garage.code == code && garage.name.eq_ignore_ascii_case(name))
        {
            return garage.id;
        }
        let id = GarageId(self.next_id());
        self.garages.insert(
            id,
            Garage {
                id,
                code: code.to_string(),
                name: name.to_string(),
            },
        );
        id
    }
}

/// lowercases and squashes a display name into a url-safe slug
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("service");
    }
    slug
}
