//! the feed manifest: a CSV listing the sources an import command should
//! work through, one row per feed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::import::ImportError;
use crate::model::OperatorId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    pub region: Option<String>,
    /// semicolon-separated national operator codes this feed covers
    #[serde(default)]
    pub operators: String,
    /// whether the feed covers everything its operators run; an incomplete
    /// feed leaves legacy sources in place
    #[serde(default)]
    pub complete: bool,
}

impl FeedSource {
    pub fn operator_ids(&self) -> Vec<OperatorId> {
        self.operators
            .split(';')
            .map(str::trim)
            .filter(|noc| !noc.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// reads manifest rows, optionally filtered to one named feed
pub fn read_manifest(path: &Path, name: Option<&str>) -> Result<Vec<FeedSource>, ImportError> {
    let reader = csv::ReaderBuilder::new()
        .from_path(path)
        .map_err(|e| ImportError::Manifest(format!("{}: {e}", path.display())))?;
    let rows = reader
        .into_deserialize::<FeedSource>()
        .map(|row| row.map_err(|e| ImportError::Manifest(format!("{e}"))))
        .collect::<Result<Vec<FeedSource>, ImportError>>()?;
    Ok(rows
        .into_iter()
        .filter(|row| name.map_or(true, |wanted| row.name == wanted))
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_operator_ids_split() {
        let source = FeedSource {
            name: "First East".to_string(),
            url: String::new(),
            region: Some("EA".to_string()),
            operators: "FECS; FESX ;".to_string(),
            complete: true,
        };
        assert_eq!(source.operator_ids(), vec!["FECS", "FESX"]);
    }
}
