// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;
use yare::parameterized;

fn rules(patterns: &[&str]) -> IgnoreRules {
    IgnoreRules::from_patterns(Path::new("/ws"), patterns.iter().copied()).unwrap()
}

#[parameterized(
    glob_matches = { &["*.log"], "debug.log", false, true },
    glob_misses = { &["*.log"], "main.py", false, false },
    negation_wins_when_later = { &["*.log", "!keep.log"], "keep.log", false, false },
    negation_order_matters = { &["!keep.log", "*.log"], "keep.log", false, true },
    dir_only_trailing_slash = { &["build/"], "build", true, true },
    dir_only_skips_files = { &["build/"], "build", false, false },
    double_star = { &["**/cache"], "a/b/cache", true, true },
    anchored = { &["/top.txt"], "top.txt", false, true },
    anchored_not_nested = { &["/top.txt"], "sub/top.txt", false, false },
)]
fn pattern_cases(patterns: &[&str], rel: &str, is_dir: bool, ignored: bool) {
    assert_eq!(
        rules(patterns).is_ignored(&PathBuf::from(rel), is_dir),
        ignored,
        "{patterns:?} vs {rel}"
    );
}

#[test]
fn empty_rules_ignore_nothing() {
    let rules = IgnoreRules::none(Path::new("/ws"));
    assert!(!rules.is_ignored(Path::new("anything"), false));
}

#[test]
fn load_reads_rnignore_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".rnignore"), "*.log\n!keep.log\n").unwrap();
    let rules = IgnoreRules::load(dir.path()).unwrap();
    assert!(rules.is_ignored(Path::new("x.log"), false));
    assert!(!rules.is_ignored(Path::new("keep.log"), false));
    assert!(!rules.is_ignored(Path::new("a.py"), false));
}

#[test]
fn load_without_file_ignores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let rules = IgnoreRules::load(dir.path()).unwrap();
    assert!(!rules.is_ignored(Path::new("x.log"), false));
}
