use std::path::{Path, PathBuf};

use clap::Subcommand;
use log::{error, info, warn};

use omnibus_core::import::{sync, ImportContext};
use omnibus_core::store::Store;
use omnibus_core::{fetch, manifest};

use crate::import::{handle_archive, region_from_archive_name};
use crate::TxcError;

#[derive(Debug, Clone, Subcommand)]
pub enum TxcOperation {
    /// import one or more regional timetable archives
    Import {
        /// zip archives (or loose XML documents) to import
        archives: Vec<String>,
        /// restrict the import to these members of the archive
        #[arg(long)]
        files: Vec<String>,
    },
    /// import the feeds listed in a manifest, skipping unchanged files
    Feeds {
        /// CSV manifest of feed sources
        #[arg(long)]
        manifest_file: String,
        /// directory the downloaded archives live in
        #[arg(long, default_value = ".")]
        data_dir: String,
        /// only the named feed
        #[arg(long)]
        feed: Option<String>,
    },
    /// parse an archive and report what it contains, without importing
    Summary {
        archive: String,
    },
}

impl TxcOperation {
    pub fn run(&self, store: &mut Store) {
        match self {
            TxcOperation::Import { archives, files } => {
                for archive in archives {
                    if let Err(e) = import_archive(store, archive, files) {
                        error!("{archive}: {e}");
                    }
                }
            }
            TxcOperation::Feeds {
                manifest_file,
                data_dir,
                feed,
            } => {
                if let Err(e) =
                    import_feeds(store, Path::new(manifest_file), Path::new(data_dir), feed.as_deref())
                {
                    error!("{e}");
                }
            }
            TxcOperation::Summary { archive } => summarize(archive),
        }
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

/// one regional archive, imported in a single all-or-nothing batch
fn import_archive(store: &mut Store, archive: &str, files: &[String]) -> Result<(), TxcError> {
    let region = region_from_archive_name(archive);
    let basename = Path::new(archive)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(archive);
    let (source_name, url) = match &region {
        Some(region) => (
            region.clone(),
            format!("ftp://ftp.tnds.basemap.co.uk/{basename}"),
        ),
        None => (basename.to_string(), String::new()),
    };
    let source = store.get_or_create_source(&source_name, &url);

    let ctx = store.run_batch(|store| {
        let mut ctx = ImportContext::new(source, today());
        ctx.region = region.clone();
        ctx.is_tnds = region.is_some();
        handle_archive(store, &mut ctx, Path::new(archive), files)?;
        if files.is_empty() {
            sync::mark_old_services_as_not_current(store, &ctx);
        }
        sync::finish_services(store, &ctx);
        store.touch_source(source, None);
        Ok::<ImportContext, TxcError>(ctx)
    })?;

    ctx.debrief();
    info!(
        "{archive}: {} services, {} routes",
        ctx.service_ids.len(),
        ctx.route_ids.len()
    );
    Ok(())
}

/// the open-data style batch: one source per manifest row, re-imported only
/// when the downloaded file's content digest has changed
fn import_feeds(
    store: &mut Store,
    manifest_file: &Path,
    data_dir: &Path,
    feed: Option<&str>,
) -> Result<(), TxcError> {
    let rows = manifest::read_manifest(manifest_file, feed)?;
    for row in rows {
        let path: PathBuf = data_dir.join(format!("{}.zip", row.name));
        let source = store.get_or_create_source(&row.name, &row.url);

        let (changed, digest) = match store.source(source) {
            Some(record) => fetch::source_changed(&path, record)
                .map_err(|e| TxcError::Io(path.display().to_string(), e))?,
            None => continue,
        };
        if !changed && feed.is_none() {
            info!("{}: unchanged, skipping", row.name);
            continue;
        }

        let operators = row.operator_ids();
        let region = row.region.clone();
        let complete = row.complete;
        let ctx = store.run_batch(|store| {
            let mut ctx = ImportContext::new(source, today());
            ctx.region = region;
            if !complete {
                ctx.incomplete_operators.extend(operators.iter().cloned());
            }
            handle_archive(store, &mut ctx, &path, &[])?;
            sync::mark_old_services_as_not_current(store, &ctx);
            if complete {
                // this feed is authoritative for its operators: retire
                // their leftovers from every other unprotected source
                sync::clean_up(store, &operators, &[ctx.source]);
            }
            sync::finish_services(store, &ctx);
            store.touch_source(ctx.source, Some(digest));
            Ok::<ImportContext, TxcError>(ctx)
        })?;
        ctx.debrief();
    }
    Ok(())
}

/// parse-only pass over an archive, for eyeballing a feed before letting it
/// near the store
fn summarize(archive: &str) {
    let path = Path::new(archive);
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            error!("{archive}: {e}");
            return;
        }
    };
    let Ok(mut zip) = zip::ZipArchive::new(file) else {
        warn!("{archive} is not a zip archive");
        return;
    };
    let names: Vec<String> = zip
        .file_names()
        .filter(|name| name.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    let mut documents = 0usize;
    let mut services = 0usize;
    let mut journeys = 0usize;
    for name in &names {
        let Ok(member) = zip.by_name(name) else {
            continue;
        };
        match crate::txc::parse_document(std::io::BufReader::new(member)) {
            Ok(document) => {
                documents += 1;
                services += document.services.len();
                journeys += document.vehicle_journeys.len();
            }
            Err(e) => warn!("{name}: {e}"),
        }
    }
    println!("{archive}: {documents} documents, {services} services, {journeys} journeys");
}
