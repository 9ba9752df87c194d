//! the byte-fetch collaborator's local half: deciding whether a downloaded
//! file has really changed since the last import, by content digest rather
//! than timestamp, because some publishers re-stamp identical files nightly.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::model::DataSource;

/// streaming content digest of a file on disk
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// true when the file's content differs from what the source last imported,
/// along with the digest to record once the import commits
pub fn source_changed(path: &Path, source: &DataSource) -> io::Result<(bool, String)> {
    let digest = file_digest(path)?;
    let changed = source.digest.as_deref() != Some(digest.as_str());
    Ok((changed, digest))
}
