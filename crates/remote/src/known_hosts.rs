// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Private known-hosts store.
//!
//! OpenSSH-compatible text format, one record per line:
//! `host key_type base64key` with `[host]:port` bracket syntax for
//! non-standard ports. Lives under the data root, separate from the OS
//! user's `~/.ssh/known_hosts`, so accepting a key for viewing never
//! touches the user's real SSH trust store. Reads and upserts go
//! through an advisory file lock.

use crate::error::{HostKeyProblem, HostKeyReason};
use fs2::FileExt;
use sha2::{Digest as _, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One accepted host key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyRecord {
    pub host: String,
    pub port: u16,
    pub key_type: String,
    /// Base64 key blob exactly as OpenSSH prints it.
    pub public_key: String,
}

impl HostKeyRecord {
    /// `aa:bb:...`-free SHA-256 fingerprint (lowercase hex) of the raw
    /// key blob.
    pub fn fingerprint_sha256(&self) -> String {
        fingerprint_sha256(&self.public_key)
    }

    fn host_field(&self) -> String {
        if self.port == 22 {
            self.host.clone()
        } else {
            format!("[{}]:{}", self.host, self.port)
        }
    }

    fn to_line(&self) -> String {
        format!("{} {} {}", self.host_field(), self.key_type, self.public_key)
    }
}

/// Hex SHA-256 over the base64-decoded key blob; falls back to hashing
/// the base64 text when it does not decode.
pub fn fingerprint_sha256(public_key_b64: &str) -> String {
    use base64::Engine as _;
    let raw = base64::engine::general_purpose::STANDARD
        .decode(public_key_b64.trim())
        .unwrap_or_else(|_| public_key_b64.trim().as_bytes().to_vec());
    let mut hasher = Sha256::new();
    hasher.update(&raw);
    hex::encode(hasher.finalize())
}

/// Outcome of verifying a presented key.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Key matches the stored record.
    Trusted,
    /// Needs explicit confirmation.
    Problem(HostKeyProblem),
}

/// The store itself.
#[derive(Debug, Clone)]
pub struct KnownHostsStore {
    path: PathBuf,
}

impl KnownHostsStore {
    pub fn new(path: impl Into<PathBuf>) -> KnownHostsStore {
        KnownHostsStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records currently in the store.
    pub fn records(&self) -> std::io::Result<Vec<HostKeyRecord>> {
        let Some(text) = self.read_locked()? else {
            return Ok(Vec::new());
        };
        Ok(parse(&text))
    }

    /// The stored record for `host:port`, if any.
    pub fn lookup(&self, host: &str, port: u16) -> std::io::Result<Option<HostKeyRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|r| r.host == host && r.port == port))
    }

    /// Strict verification of a presented key.
    pub fn verify(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        public_key: &str,
    ) -> std::io::Result<Verification> {
        let presented_fp = fingerprint_sha256(public_key);
        match self.lookup(host, port)? {
            Some(record) if record.public_key.trim() == public_key.trim() => {
                Ok(Verification::Trusted)
            }
            Some(record) => Ok(Verification::Problem(HostKeyProblem {
                host: host.to_string(),
                port,
                key_type: key_type.to_string(),
                fingerprint_sha256: presented_fp,
                public_key: public_key.to_string(),
                reason: HostKeyReason::Changed,
                expected: Some(record.fingerprint_sha256()),
            })),
            None => Ok(Verification::Problem(HostKeyProblem {
                host: host.to_string(),
                port,
                key_type: key_type.to_string(),
                fingerprint_sha256: presented_fp,
                public_key: public_key.to_string(),
                reason: HostKeyReason::Unknown,
                expected: None,
            })),
        }
    }

    /// Insert or replace the record for `host:port`.
    pub fn upsert(&self, record: HostKeyRecord) -> std::io::Result<()> {
        self.rewrite(|records| {
            records.retain(|r| !(r.host == record.host && r.port == record.port));
            records.push(record.clone());
        })
    }

    /// Drop the record for `host:port`; returns whether one existed.
    pub fn remove(&self, host: &str, port: u16) -> std::io::Result<bool> {
        let mut removed = false;
        self.rewrite(|records| {
            let before = records.len();
            records.retain(|r| !(r.host == host && r.port == port));
            removed = records.len() != before;
        })?;
        Ok(removed)
    }

    fn read_locked(&self) -> std::io::Result<Option<String>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        file.lock_shared()?;
        let mut text = String::new();
        let result = (&file).read_to_string(&mut text);
        let _ = fs2::FileExt::unlock(&file);
        result?;
        Ok(Some(text))
    }

    fn rewrite(&self, mutate: impl FnOnce(&mut Vec<HostKeyRecord>)) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut text = String::new();
        file.read_to_string(&mut text)?;
        let mut records = parse(&text);
        mutate(&mut records);

        let mut out = String::new();
        for record in &records {
            out.push_str(&record.to_line());
            out.push('\n');
        }
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(out.as_bytes())?;
        file.sync_all()?;
        let _ = fs2::FileExt::unlock(&file);
        Ok(())
    }
}

fn parse(text: &str) -> Vec<HostKeyRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(host_field), Some(key_type), Some(key)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let (host, port) = parse_host_field(host_field);
        records.push(HostKeyRecord {
            host,
            port,
            key_type: key_type.to_string(),
            public_key: key.to_string(),
        });
    }
    records
}

fn parse_host_field(field: &str) -> (String, u16) {
    if let Some(rest) = field.strip_prefix('[') {
        if let Some((host, port)) = rest.split_once("]:") {
            if let Ok(port) = port.parse() {
                return (host.to_string(), port);
            }
        }
    }
    (field.to_string(), 22)
}

#[cfg(test)]
#[path = "known_hosts_tests.rs"]
mod tests;
