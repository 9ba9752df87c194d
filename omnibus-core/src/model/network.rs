use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Direction, ServiceId, SourceId, TimingStatus};

/// national operator code, e.g. "FECS". used directly as the operator's
/// primary key, the way the NOC database does.
pub type OperatorId = String;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub name: String,
    /// corporate parent grouping sibling trading names ("First", "Arriva"),
    /// consulted when deciding whether another source already covers a line
    pub parent: Option<String>,
    pub licences: Vec<String>,
    pub region: Option<String>,
}

/// an operator's code under one scheme ("National Operator Codes", a TNDS
/// region id, ...). feeds reference operators through these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCode {
    pub operator: OperatorId,
    pub scheme: String,
    pub code: String,
}

/// where a batch of data came from: one feed of one publisher. routes are
/// scoped to their source, which is what keeps concurrent imports of
/// different feeds from treading on each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub datetime: Option<DateTime<Utc>>,
    /// content digest of the last import, for skipping unchanged files
    pub digest: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPoint {
    pub atco_code: String,
    pub common_name: String,
    pub active: bool,
    pub latlong: Option<(f64, f64)>,
}

/// a service's presence at a stop, one row per (direction, position) in the
/// widest observed stopping pattern. recomputed from the trips after each
/// batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopUsage {
    pub service: ServiceId,
    pub stop: String,
    pub direction: Direction,
    pub order: usize,
    pub timing_status: TimingStatus,
}
