// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-tree export and import as tar.gz archives.
//!
//! Archives contain `runs/<run_id>/...` entries only. Import refuses
//! entries outside that namespace so a crafted archive cannot escape the
//! data root.

use crate::error::AssetsError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rn_core::{DataRoot, RunId};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Component, Path};
use tracing::info;

/// Pack the given runs into a tar.gz at `out`.
pub fn export_runs<W: Write>(
    root: &DataRoot,
    run_ids: &[RunId],
    out: W,
) -> Result<(), AssetsError> {
    let encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for id in run_ids {
        let dir = root.run_dir(id);
        if !dir.is_dir() {
            continue;
        }
        builder.append_dir_all(Path::new("runs").join(id.as_str()), &dir)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?.flush()?;
    info!(count = run_ids.len(), "runs exported");
    Ok(())
}

/// Convenience wrapper writing to a file path.
pub fn export_runs_to_file(
    root: &DataRoot,
    run_ids: &[RunId],
    out: &Path,
) -> Result<(), AssetsError> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    export_runs(root, run_ids, File::create(out)?)
}

/// Unpack a tar.gz produced by [`export_runs`] into the data root.
///
/// Returns the run ids that were materialized. Entries not under
/// `runs/<valid-run-id>/` are rejected.
pub fn import_archive<R: Read>(root: &DataRoot, archive: R) -> Result<Vec<RunId>, AssetsError> {
    let decoder = GzDecoder::new(BufReader::new(archive));
    let mut tar = tar::Archive::new(decoder);
    let mut imported = Vec::new();

    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let id = validate_entry_path(&path)?;
        if let Some(id) = id {
            if !imported.contains(&id) {
                imported.push(id);
            }
        }
        entry.unpack_in(root.path())?;
    }

    info!(count = imported.len(), "archive imported");
    Ok(imported)
}

/// Convenience wrapper reading from a file path.
pub fn import_archive_from_file(root: &DataRoot, path: &Path) -> Result<Vec<RunId>, AssetsError> {
    import_archive(root, File::open(path)?)
}

/// Check an archive entry stays under `runs/<run_id>/`; returns the id.
fn validate_entry_path(path: &Path) -> Result<Option<RunId>, AssetsError> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "runs" => {}
        _ => return Err(AssetsError::ArchiveEscape(path.to_owned())),
    }
    let id = match components.next() {
        Some(Component::Normal(second)) => {
            let name = second.to_string_lossy();
            match RunId::validate(&name) {
                Ok(id) => id,
                Err(_) => return Err(AssetsError::ArchiveEscape(path.to_owned())),
            }
        }
        // The bare `runs/` directory entry itself
        None => return Ok(None),
        _ => return Err(AssetsError::ArchiveEscape(path.to_owned())),
    };
    for rest in components {
        if !matches!(rest, Component::Normal(_)) {
            return Err(AssetsError::ArchiveEscape(path.to_owned()));
        }
    }
    Ok(Some(id))
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
