use std::path::Path;

use clap::Subcommand;
use log::{error, info};

use omnibus_core::import::ImportContext;
use omnibus_core::store::Store;

use crate::import::{handle_archive, source_name_for_archive};
use crate::CifError;

#[derive(Debug, Clone, Subcommand)]
pub enum CifOperation {
    /// import one or more CIF archives
    Import {
        /// zip archives of .cif files
        archives: Vec<String>,
    },
}

impl CifOperation {
    pub fn run(&self, store: &mut Store) {
        match self {
            CifOperation::Import { archives } => {
                for archive in archives {
                    if let Err(e) = import_archive(store, archive) {
                        error!("{archive}: {e}");
                    }
                }
            }
        }
    }
}

fn import_archive(store: &mut Store, archive: &str) -> Result<(), CifError> {
    let source_name = source_name_for_archive(archive);
    let source = store.get_or_create_source(source_name, "");

    let ctx = store.run_batch(|store| {
        let mut ctx = ImportContext::new(source, chrono::Utc::now().date_naive());
        ctx.region = Some("NI".to_string());
        handle_archive(store, &mut ctx, Path::new(archive))?;
        store.touch_source(source, None);
        Ok::<ImportContext, CifError>(ctx)
    })?;

    ctx.debrief();
    info!(
        "{archive}: {} services, {} routes",
        ctx.service_ids.len(),
        ctx.route_ids.len()
    );
    Ok(())
}
