//! imports GTFS schedule bundles into the timetable store.
use clap::Parser;
use omnibus_core::store::Store;
use omnibus_gtfs::app::GtfsApp;

fn main() {
    env_logger::init();
    let args = GtfsApp::parse();
    let mut store = Store::new();
    args.op.run(&mut store);
}
