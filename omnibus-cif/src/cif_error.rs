#[derive(thiserror::Error, Debug)]
pub enum CifError {
    #[error("failed reading '{0}': {1}")]
    Io(String, #[source] std::io::Error),
    #[error("unreadable archive '{0}': {1}")]
    Archive(String, #[source] zip::result::ZipError),
    #[error(transparent)]
    Import(#[from] omnibus_core::import::ImportError),
}
