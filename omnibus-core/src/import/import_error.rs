use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed reading '{0}': {1}")]
    Io(String, #[source] std::io::Error),
    /// the archive itself is unreadable; fatal for this input only, the
    /// batch loop moves on to the next one
    #[error("unreadable archive '{0}': {1}")]
    Archive(String, String),
    #[error("failure reading feed manifest: {0}")]
    Manifest(String),
}
