mod import_error;
pub mod lookups;
pub mod reconcile;
pub mod sync;
pub mod text;

pub use import_error::ImportError;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use log::warn;

use crate::model::{
    BlockId, CalendarId, CalendarPattern, GarageId, NoteId, OperatorId, RouteId, ServiceId,
    SourceId, VehicleTypeId,
};
use crate::store::Store;

/// an operator reference the resolution ladder could not place, kept for
/// offline triage. the route is still imported, operator-less.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingOperator {
    pub code: String,
    pub name: String,
    pub licence: String,
}

/// the per-run state of one import job: which source we are writing,
/// the touched-row sets the sync pass works from, and the interning caches.
///
/// one context lives for one archive or one command invocation and is then
/// dropped. the caches must not outlive the run -- a calendar interned
/// against last night's data would be wrong tonight -- and keeping them
/// here rather than in any process-wide state is what lets jobs for
/// different sources run side by side.
pub struct ImportContext {
    pub source: SourceId,
    pub region: Option<String>,
    pub today: NaiveDate,
    /// the archive follows the region-partitioned legacy convention, which
    /// enables the source-local service-code fallback when matching
    pub is_tnds: bool,
    /// when one publisher offers two feed generations, the better one;
    /// lines it already covers are skipped in the other
    pub preferred_source: Option<SourceId>,
    /// operators fully covered by an authoritative open-data source
    pub open_data_operators: HashSet<OperatorId>,
    /// operators partially covered there, so legacy data is still wanted
    pub incomplete_operators: HashSet<OperatorId>,
    pub service_ids: HashSet<ServiceId>,
    pub route_ids: HashSet<RouteId>,
    pub missing_operators: Vec<MissingOperator>,
    calendar_cache: HashMap<u64, CalendarId>,
    note_cache: HashMap<String, NoteId>,
    garage_cache: HashMap<String, GarageId>,
    block_cache: HashMap<String, BlockId>,
    vehicle_type_cache: HashMap<String, VehicleTypeId>,
}

impl ImportContext {
    pub fn new(source: SourceId, today: NaiveDate) -> ImportContext {
        ImportContext {
            source,
            region: None,
            today,
            is_tnds: false,
            preferred_source: None,
            open_data_operators: HashSet::new(),
            incomplete_operators: HashSet::new(),
            service_ids: HashSet::new(),
            route_ids: HashSet::new(),
            missing_operators: Vec::new(),
            calendar_cache: HashMap::new(),
            note_cache: HashMap::new(),
            garage_cache: HashMap::new(),
            block_cache: HashMap::new(),
            vehicle_type_cache: HashMap::new(),
        }
    }

    /// whether this run imports a Scottish region, which selects the
    /// Scottish variants of regionally split bank holidays
    pub fn scottish(&self) -> Option<bool> {
        self.region.as_deref().map(|region| region == "S")
    }

    /// content-interning: journeys sharing one operating pattern share one
    /// calendar row instead of getting thousands of identical ones
    pub fn intern_calendar(
        &mut self,
        store: &mut Store,
        pattern: &CalendarPattern,
    ) -> Result<CalendarId, ImportError> {
        let key = pattern.content_hash();
        if let Some(id) = self.calendar_cache.get(&key) {
            return Ok(*id);
        }
        let id = store.create_calendar(pattern)?;
        self.calendar_cache.insert(key, id);
        Ok(id)
    }

    pub fn intern_note(&mut self, store: &mut Store, code: &str, text: &str) -> NoteId {
        let key = format!("{code}:{text}");
        if let Some(id) = self.note_cache.get(&key) {
            return *id;
        }
        let id = store.get_or_create_note(code, text);
        self.note_cache.insert(key, id);
        id
    }

    pub fn intern_block(&mut self, store: &mut Store, code: &str, description: &str) -> BlockId {
        if let Some(id) = self.block_cache.get(code) {
            return *id;
        }
        let id = store.create_block(code, description);
        self.block_cache.insert(code.to_string(), id);
        id
    }

    pub fn intern_vehicle_type(
        &mut self,
        store: &mut Store,
        code: &str,
        description: &str,
    ) -> VehicleTypeId {
        if let Some(id) = self.vehicle_type_cache.get(code) {
            return *id;
        }
        let id = store.get_or_create_vehicle_type(code, description);
        self.vehicle_type_cache.insert(code.to_string(), id);
        id
    }

    pub fn intern_garage(&mut self, store: &mut Store, code: &str, name: &str) -> GarageId {
        if let Some(id) = self.garage_cache.get(code) {
            return *id;
        }
        let id = store.get_or_create_garage(code, name);
        self.garage_cache.insert(code.to_string(), id);
        id
    }

    pub fn garage(&self, code: &str) -> Option<GarageId> {
        self.garage_cache.get(code).copied()
    }

    pub fn record_missing_operator(&mut self, missing: MissingOperator) {
        if !self.missing_operators.contains(&missing) {
            self.missing_operators.push(missing);
        }
    }

    /// log anything that needs a human: operators we could not place
    pub fn debrief(&self) {
        for missing in &self.missing_operators {
            warn!(
                "unresolved operator: code '{}' name '{}' licence '{}'",
                missing.code, missing.name, missing.licence
            );
        }
    }
}
