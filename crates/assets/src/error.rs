// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type for the assets engine.

use rn_core::Digest;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from blob storage, snapshots, restore, and GC.
#[derive(Debug, Error)]
pub enum AssetsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("blob not found: {0}")]
    BlobNotFound(Digest),
    #[error("manifest not found: {0}")]
    ManifestNotFound(PathBuf),
    #[error("ignore rules error: {0}")]
    Ignore(#[from] ignore::Error),
    #[error("archive entry escapes target: {0}")]
    ArchiveEscape(PathBuf),
    #[error("blob {digest} failed integrity check during restore")]
    Corrupt { digest: Digest },
}
