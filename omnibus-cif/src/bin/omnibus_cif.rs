//! imports ATCO-CIF archives into the timetable store.
use clap::Parser;
use omnibus_cif::app::CifApp;
use omnibus_core::store::Store;

fn main() {
    env_logger::init();
    let args = CifApp::parse();
    let mut store = Store::new();
    args.op.run(&mut store);
}
