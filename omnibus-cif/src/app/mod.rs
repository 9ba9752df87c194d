mod operation;

pub use operation::CifOperation;

use clap::Parser;

/// command line tool for importing ATCO-CIF timetable archives
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CifApp {
    #[command(subcommand)]
    pub op: CifOperation,
}
