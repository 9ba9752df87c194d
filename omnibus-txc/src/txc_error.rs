#[derive(thiserror::Error, Debug)]
pub enum TxcError {
    #[error("failed to parse TransXChange document: {0}")]
    Xml(#[from] minidom::Error),
    #[error("failed reading '{0}': {1}")]
    Io(String, #[source] std::io::Error),
    #[error("unreadable archive '{0}': {1}")]
    Archive(String, #[source] zip::result::ZipError),
    #[error("document has no {0}")]
    MissingElement(&'static str),
    #[error(transparent)]
    Import(#[from] omnibus_core::import::ImportError),
}
