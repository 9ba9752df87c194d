use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{
    BlockId, CalendarId, GarageId, NoteId, RouteId, ServiceId, SourceId, TimeOfDay, TripId,
    VehicleTypeId,
};
use crate::model::network::OperatorId;

/// the line-level record shown to the public: aggregates the published
/// route versions, possibly from several data sources over time. `current`
/// is a soft-delete marker, flipped off when no source vouches for the
/// service any more.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Service {
    pub line_name: String,
    pub line_brand: String,
    pub description: String,
    pub outbound_description: String,
    pub inbound_description: String,
    pub service_code: String,
    pub slug: String,
    pub mode: String,
    pub region: Option<String>,
    pub public_use: bool,
    pub current: bool,
    pub date: Option<NaiveDate>,
    pub source: Option<SourceId>,
    pub operators: Vec<OperatorId>,
    /// denormalized search field, recomputed from routes and operators
    /// after each batch
    pub search_text: String,
    /// union of the routes' shapes, one polyline of (lon, lat) per leg
    pub geometry: Vec<Vec<(f64, f64)>>,
}

/// one published line-version from one data source. natural key is
/// `(source, code)`; re-importing the same file replaces the trips under
/// the same route row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub source: SourceId,
    pub code: String,
    pub service: ServiceId,
    pub line_name: String,
    pub line_brand: String,
    pub description: String,
    pub origin: String,
    pub via: String,
    pub destination: String,
    pub service_code: String,
    pub revision_number: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub geometry: Vec<Vec<(f64, f64)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// one scheduled vehicle journey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub route: RouteId,
    pub calendar: Option<CalendarId>,
    pub inbound: bool,
    pub journey_pattern: String,
    /// feed-specific journey identifier, used to match realtime trip updates
    pub ticket_machine_code: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub destination: Option<String>,
    pub block: Option<BlockId>,
    pub vehicle_type: Option<VehicleTypeId>,
    pub garage: Option<GarageId>,
    pub sequence: Option<u16>,
    pub notes: Vec<NoteId>,
}

impl Trip {
    /// total ordering for displaying a route's journeys: the feed's own
    /// sequence number when both sides carry one, otherwise departure then
    /// arrival time
    pub fn ordering_key(&self) -> (u16, TimeOfDay, TimeOfDay) {
        (self.sequence.unwrap_or(u16::MAX), self.start, self.end)
    }
}

/// how a stop-visit is classified for timetable display: a principal
/// timing point, a time-info point, some other minor point, or unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimingStatus {
    #[serde(rename = "PTP")]
    Principal,
    #[serde(rename = "TIP")]
    TimeInfo,
    #[serde(rename = "OTH")]
    Other,
    #[serde(rename = "")]
    #[default]
    Unknown,
}

impl TimingStatus {
    pub fn code(&self) -> &'static str {
        match self {
            TimingStatus::Principal => "PTP",
            TimingStatus::TimeInfo => "TIP",
            TimingStatus::Other => "OTH",
            TimingStatus::Unknown => "",
        }
    }
}

/// a stop reference: resolved against the local stop table, or kept as the
/// raw upstream code when no such stop exists here. the raw form is
/// recorded rather than dropped so the visit still renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopRef {
    Stop(String),
    Code(String),
}

impl StopRef {
    pub fn atco_code(&self) -> Option<&str> {
        match self {
            StopRef::Stop(atco) => Some(atco),
            StopRef::Code(_) => None,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            StopRef::Stop(code) | StopRef::Code(code) => code,
        }
    }
}

/// one visit within a trip. `sequence` is the ordering key and is unique
/// within the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
    pub sequence: u16,
    pub stop: StopRef,
    pub arrival: Option<TimeOfDay>,
    pub departure: Option<TimeOfDay>,
    pub pick_up: bool,
    pub set_down: bool,
    pub timing_status: TimingStatus,
}

impl StopTime {
    pub fn departure_or_arrival(&self) -> Option<TimeOfDay> {
        self.departure.or(self.arrival)
    }

    pub fn arrival_or_departure(&self) -> Option<TimeOfDay> {
        self.arrival.or(self.departure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub code: String,
    pub text: String,
}

/// vehicle-blocking group: journeys worked by the same vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleType {
    pub id: VehicleTypeId,
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Garage {
    pub id: GarageId,
    pub code: String,
    pub name: String,
}
