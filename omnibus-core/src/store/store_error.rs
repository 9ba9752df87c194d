#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("no such row: {0}")]
    NotFound(String),
}
