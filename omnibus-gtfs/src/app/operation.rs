use std::path::{Path, PathBuf};

use clap::Subcommand;
use log::{error, info};

use gtfs_structures::Gtfs;

use omnibus_core::fetch;
use omnibus_core::import::{sync, ImportContext};
use omnibus_core::store::Store;

use crate::import::handle_bundle;
use crate::GtfsError;

#[derive(Debug, Clone, Subcommand)]
pub enum GtfsOperation {
    /// import one or more GTFS collections from downloaded bundles
    Import {
        /// collection names; each maps to <data_dir>/<collection>.zip
        collections: Vec<String>,
        #[arg(long, default_value = ".")]
        data_dir: String,
        /// import even if the bundle's content has not changed
        #[arg(long)]
        force: bool,
    },
    /// read a bundle and report its row counts, without importing
    Summary {
        bundle: String,
    },
}

impl GtfsOperation {
    pub fn run(&self, store: &mut Store) {
        match self {
            GtfsOperation::Import {
                collections,
                data_dir,
                force,
            } => {
                for collection in collections {
                    if let Err(e) = import_collection(store, collection, Path::new(data_dir), *force)
                    {
                        error!("{collection}: {e}");
                    }
                }
            }
            GtfsOperation::Summary { bundle } => match Gtfs::new(bundle) {
                Ok(gtfs) => println!(
                    "{bundle}: {} routes, {} trips, {} calendars, {} shapes",
                    gtfs.routes.len(),
                    gtfs.trips.len(),
                    gtfs.calendar.len(),
                    gtfs.shapes.len()
                ),
                Err(e) => error!("{bundle}: {e}"),
            },
        }
    }
}

fn import_collection(
    store: &mut Store,
    collection: &str,
    data_dir: &Path,
    force: bool,
) -> Result<(), GtfsError> {
    let path: PathBuf = data_dir.join(format!("{collection}.zip"));
    let source = store.get_or_create_source(&format!("{collection} GTFS"), "");

    let (changed, digest) = match store.source(source) {
        Some(record) => fetch::source_changed(&path, record)
            .map_err(|e| GtfsError::Io(path.display().to_string(), e))?,
        None => return Ok(()),
    };
    if !changed && !force {
        info!("{collection}: unchanged, skipping");
        return Ok(());
    }

    let gtfs = Gtfs::new(path.to_str().unwrap_or_default())?;

    let ctx = store.run_batch(|store| {
        let mut ctx = ImportContext::new(source, chrono::Utc::now().date_naive());
        handle_bundle(store, &mut ctx, &gtfs, collection)?;
        sync::mark_old_services_as_not_current(store, &ctx);
        sync::finish_services(store, &ctx);
        store.touch_source(source, Some(digest));
        Ok::<ImportContext, GtfsError>(ctx)
    })?;

    ctx.debrief();
    info!(
        "{collection}: {} services, {} routes",
        ctx.service_ids.len(),
        ctx.route_ids.len()
    );
    Ok(())
}
