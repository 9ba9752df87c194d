//! TransXChange support: a document model for the subset of the schema the
//! timetable pipeline consumes, the operating-profile flattener, and the
//! importer that lands parsed documents in the store.
pub mod app;
pub mod import;
pub mod txc;

mod txc_error;

pub use txc_error::TxcError;
