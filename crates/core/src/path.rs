// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-assigned run path hierarchy.
//!
//! Paths are slash-delimited (`cv/resnet50/baseline`), each segment 1-64
//! characters of `[A-Za-z0-9._-]`, at most 200 characters overall. They are
//! display/query labels only and never touch the filesystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum overall length of a run path.
pub const MAX_PATH_LEN: usize = 200;

/// Maximum length of one path segment.
pub const MAX_SEGMENT_LEN: usize = 64;

/// Errors from run-path validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("run path is empty")]
    Empty,
    #[error("run path exceeds {MAX_PATH_LEN} characters ({0})")]
    TooLong(usize),
    #[error("invalid path segment: {0:?}")]
    BadSegment(String),
}

/// A validated slash-delimited run path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunPath(String);

impl RunPath {
    /// Validate and wrap a path string.
    pub fn parse(s: &str) -> Result<RunPath, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if s.len() > MAX_PATH_LEN {
            return Err(PathError::TooLong(s.len()));
        }
        for segment in s.split('/') {
            if !segment_ok(segment) {
                return Err(PathError::BadSegment(segment.to_string()));
            }
        }
        Ok(RunPath(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path's segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Whether this path equals `prefix` or sits below it.
    ///
    /// Prefix matching is segment-aligned: `cv/res` does not match
    /// `cv/resnet50`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || (self.0.len() > prefix.len()
                && self.0.starts_with(prefix)
                && self.0.as_bytes()[prefix.len()] == b'/')
    }
}

fn segment_ok(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= MAX_SEGMENT_LEN
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

impl fmt::Display for RunPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RunPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        RunPath::parse(&s)
    }
}

impl From<RunPath> for String {
    fn from(p: RunPath) -> String {
        p.0
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
