#[derive(thiserror::Error, Debug)]
pub enum GtfsError {
    #[error("failed to read gtfs bundle: {0}")]
    Bundle(#[from] gtfs_structures::Error),
    #[error("failed reading '{0}': {1}")]
    Io(String, #[source] std::io::Error),
    #[error("failed to parse realtime feed: {0}")]
    Realtime(#[from] serde_json::Error),
    #[error(transparent)]
    Import(#[from] omnibus_core::import::ImportError),
}
