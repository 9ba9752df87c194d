//! shared model and import machinery for the omnibus feed pipeline.
//! format-specific crates (omnibus-txc, omnibus-cif, omnibus-gtfs) parse
//! their wire formats into the candidate types here, then hand them to the
//! reconciliation and sync layers to land them in the store.
pub mod fetch;
pub mod import;
pub mod manifest;
pub mod model;
pub mod store;
