// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `.rnignore` compilation.
//!
//! Snapshot filtering uses gitignore syntax: `!` negation, trailing `/`
//! for directory-only patterns, `**` globs, and leading `/` anchoring.
//! Later patterns win, exactly as git evaluates them.

use crate::error::AssetsError;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// File name of the ignore rules at a workspace root.
pub const IGNORE_FILE: &str = ".rnignore";

/// Compiled ignore rules for one workspace root.
pub struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    /// Compile the `.rnignore` at `root`, or empty rules when absent.
    pub fn load(root: &Path) -> Result<IgnoreRules, AssetsError> {
        let file = root.join(IGNORE_FILE);
        let mut builder = GitignoreBuilder::new(root);
        if file.is_file() {
            if let Some(err) = builder.add(&file) {
                return Err(err.into());
            }
        }
        Ok(IgnoreRules {
            matcher: builder.build()?,
        })
    }

    /// Compile explicit pattern lines (callers without an ignore file).
    pub fn from_patterns<I, S>(root: &Path, patterns: I) -> Result<IgnoreRules, AssetsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder.add_line(None, pattern.as_ref())?;
        }
        Ok(IgnoreRules {
            matcher: builder.build()?,
        })
    }

    /// Empty rule set: nothing is ignored.
    pub fn none(root: &Path) -> IgnoreRules {
        IgnoreRules {
            matcher: GitignoreBuilder::new(root)
                .build()
                .unwrap_or_else(|_| Gitignore::empty()),
        }
    }

    /// Whether the workspace-relative `path` is excluded.
    pub fn is_ignored(&self, rel: &Path, is_dir: bool) -> bool {
        self.matcher.matched(rel, is_dir).is_ignore()
    }
}

#[cfg(test)]
#[path = "rnignore_tests.rs"]
mod tests;
