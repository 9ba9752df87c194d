mod operation;

pub use operation::TxcOperation;

use clap::Parser;

/// command line tool for importing TransXChange timetable archives
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct TxcApp {
    #[command(subcommand)]
    pub op: TxcOperation,
}
