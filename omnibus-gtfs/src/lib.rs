//! GTFS support: mapping static schedule bundles into the shared model,
//! and the read-only realtime overlay that applies trip-update delays to
//! scheduled times.
pub mod app;
pub mod import;
pub mod realtime;

mod gtfs_error;

pub use gtfs_error::GtfsError;
