// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed blob store.
//!
//! Blobs live at `blobs/<aa>/<bb>/<hex>` keyed by the SHA-256 of their
//! contents. Input streams through the hasher into a same-filesystem
//! temp file which is fsynced and atomically renamed into place, so a
//! blob is never partially visible under its final name. Storing bytes
//! that already exist is a no-op.

use crate::error::AssetsError;
use rn_core::{DataRoot, Digest};
use sha2::{Digest as _, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const COPY_BUF: usize = 64 * 1024;

/// Handle over the `blobs/` tree.
#[derive(Debug, Clone)]
pub struct BlobStore {
    blobs_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl BlobStore {
    pub fn new(root: &DataRoot) -> BlobStore {
        let blobs_dir = root.blobs_dir();
        BlobStore {
            tmp_dir: blobs_dir.join("tmp"),
            blobs_dir,
        }
    }

    /// Final path of a digest (whether or not it exists).
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        let (a, b, hex) = digest.shard();
        self.blobs_dir.join(a).join(b).join(hex)
    }

    /// Path of a stored blob, or `BlobNotFound`.
    pub fn get_blob_path(&self, digest: &Digest) -> Result<PathBuf, AssetsError> {
        let path = self.blob_path(digest);
        if path.is_file() {
            Ok(path)
        } else {
            Err(AssetsError::BlobNotFound(digest.clone()))
        }
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.blob_path(digest).is_file()
    }

    /// Store a byte slice. Returns the digest and size.
    pub fn store_bytes(&self, bytes: &[u8]) -> Result<(Digest, u64), AssetsError> {
        let digest = Digest::of_bytes(bytes);
        if self.contains(&digest) {
            return Ok((digest, bytes.len() as u64));
        }
        fs::create_dir_all(&self.tmp_dir)?;
        let mut tmp = NamedTempFile::new_in(&self.tmp_dir)?;
        tmp.write_all(bytes)?;
        self.commit(tmp, &digest)?;
        Ok((digest, bytes.len() as u64))
    }

    /// Stream a file through the hasher into the store.
    pub fn store_file(&self, path: &Path) -> Result<(Digest, u64), AssetsError> {
        fs::create_dir_all(&self.tmp_dir)?;
        let mut src = File::open(path)?;
        let mut tmp = NamedTempFile::new_in(&self.tmp_dir)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF];
        let mut size = 0u64;
        loop {
            let n = src.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n])?;
            size += n as u64;
        }
        let digest = Digest::from_hasher(hasher);
        if self.contains(&digest) {
            // Duplicate content: discard the temp copy
            return Ok((digest, size));
        }
        self.commit(tmp, &digest)?;
        Ok((digest, size))
    }

    fn commit(&self, tmp: NamedTempFile, digest: &Digest) -> Result<(), AssetsError> {
        let target = self.blob_path(digest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        tmp.as_file().sync_all()?;
        // A concurrent writer of the same digest wrote identical bytes,
        // so a replacing rename is harmless either way.
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!(digest = %digest, "blob stored");
        Ok(())
    }

    /// Open a stored blob for reading.
    pub fn open(&self, digest: &Digest) -> Result<File, AssetsError> {
        Ok(File::open(self.get_blob_path(digest)?)?)
    }

    /// Byte size of a stored blob.
    pub fn size(&self, digest: &Digest) -> Result<u64, AssetsError> {
        Ok(fs::metadata(self.get_blob_path(digest)?)?.len())
    }
}

#[cfg(test)]
#[path = "cas_tests.rs"]
mod tests;
