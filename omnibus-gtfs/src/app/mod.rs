mod operation;

pub use operation::GtfsOperation;

use clap::Parser;

/// command line tool for importing GTFS schedule bundles
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct GtfsApp {
    #[command(subcommand)]
    pub op: GtfsOperation,
}
