//! imports TransXChange archives into the timetable store.
use clap::Parser;
use omnibus_core::store::Store;
use omnibus_txc::app::TxcApp;

fn main() {
    env_logger::init();
    let args = TxcApp::parse();
    let mut store = Store::new();
    args.op.run(&mut store);
}
