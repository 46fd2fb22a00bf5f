// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listing, filtering, pagination, and path-tree aggregation.
//!
//! Queries run against the SQLite index; the store heals the index from
//! the files at open, so listings converge even after index loss.

use crate::index::IndexedRun;
use crate::store::{RunStore, StorageError};
use chrono::{DateTime, Utc};
use rn_core::{MetricMode, PrimaryMetric, RunId, RunStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on a requested page size.
pub const MAX_PAGE_SIZE: usize = 500;

/// Sort key for `list_runs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    CreatedAt,
    PrimaryMetric,
}

impl SortBy {
    pub fn parse(s: &str) -> Option<SortBy> {
        match s {
            "created_at" => Some(SortBy::CreatedAt),
            "primary_metric" => Some(SortBy::PrimaryMetric),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Option<SortDir> {
        match s {
            "asc" => Some(SortDir::Asc),
            "desc" => Some(SortDir::Desc),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Filters for `list_runs`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Segment-aligned path prefix.
    pub path_prefix: Option<String>,
    /// Keep only these statuses (empty = all).
    pub status_in: Vec<RunStatus>,
    /// Include soft-deleted runs.
    pub include_deleted: bool,
}

/// One row of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: RunId,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_metric: Option<PrimaryMetric>,
    pub deleted: bool,
}

impl From<IndexedRun> for RunSummary {
    fn from(row: IndexedRun) -> RunSummary {
        let primary_metric = match (&row.primary_metric_name, &row.primary_metric_mode) {
            (Some(name), Some(mode)) => {
                let mode = match mode.as_str() {
                    "max" => MetricMode::Max,
                    _ => MetricMode::Min,
                };
                Some(PrimaryMetric {
                    name: name.clone(),
                    mode,
                    best: row.primary_metric_best,
                    step: row.primary_metric_step,
                })
            }
            _ => None,
        };
        RunSummary {
            id: row.id,
            path: row.path,
            alias: row.alias,
            created_at: row.created_at,
            updated_at: row.updated_at,
            status: row.status,
            primary_metric,
            deleted: row.deleted_at.is_some(),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub per_page: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// A node of the hierarchical path tree.
#[derive(Debug, Clone, Serialize)]
pub struct PathNode {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_running: Option<bool>,
    pub children: Vec<PathNode>,
}

/// Query layer over a [`RunStore`].
pub struct RunQuery<'a> {
    store: &'a RunStore,
}

impl<'a> RunQuery<'a> {
    pub fn new(store: &'a RunStore) -> RunQuery<'a> {
        RunQuery { store }
    }

    /// Paged listing with stable id tie-breaking.
    pub fn list_runs(
        &self,
        filter: &ListFilter,
        sort_by: SortBy,
        sort_dir: SortDir,
        page: usize,
        per_page: usize,
    ) -> Result<Page<RunSummary>, StorageError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);

        let (where_sql, args_owned) = filter_sql(filter);
        let args: Vec<&dyn rusqlite::types::ToSql> =
            args_owned.iter().map(|a| a as &dyn rusqlite::types::ToSql).collect();

        let total = self.store.index().count(
            &format!("SELECT COUNT(*) FROM runs {where_sql}"),
            &args,
        )?;

        let order_sql = match sort_by {
            SortBy::CreatedAt => format!("created_at {0}, id {0}", sort_dir.sql()),
            SortBy::PrimaryMetric => format!(
                "primary_metric_best IS NULL, primary_metric_best {0}, id {0}",
                sort_dir.sql()
            ),
        };
        let offset = (page - 1) * per_page;
        let sql = format!(
            "SELECT id, path, alias, created_at, updated_at, status, pid,
                    primary_metric_name, primary_metric_mode, primary_metric_best,
                    primary_metric_step, deleted_at
             FROM runs {where_sql}
             ORDER BY {order_sql}
             LIMIT {per_page} OFFSET {offset}"
        );
        let rows = self.store.index().query_runs(&sql, &args)?;

        Ok(Page {
            items: rows.into_iter().map(RunSummary::from).collect(),
            total,
            page,
            per_page,
            has_next: (page * per_page) < total as usize,
            has_prev: page > 1,
        })
    }

    /// Every run under a segment-aligned prefix (non-deleted).
    pub fn runs_under_prefix(&self, prefix: &str) -> Result<Vec<RunSummary>, StorageError> {
        let filter = ListFilter {
            path_prefix: Some(prefix.to_string()),
            ..ListFilter::default()
        };
        let page = self.list_runs(
            &filter,
            SortBy::CreatedAt,
            SortDir::Asc,
            1,
            MAX_PAGE_SIZE,
        )?;
        let mut items = page.items;
        let mut next = 2usize;
        let mut has_next = page.has_next;
        while has_next {
            let page = self.list_runs(&filter, SortBy::CreatedAt, SortDir::Asc, next, MAX_PAGE_SIZE)?;
            has_next = page.has_next;
            items.extend(page.items);
            next += 1;
        }
        Ok(items)
    }

    /// Flat list of distinct paths, optionally with per-path stats.
    pub fn flat_paths(&self, include_stats: bool) -> Result<Vec<PathNode>, StorageError> {
        let rows = self.store.index().path_rows()?;
        let mut agg: BTreeMap<String, (u64, bool)> = BTreeMap::new();
        for (path, status, deleted) in rows {
            if deleted {
                continue;
            }
            let entry = agg.entry(path).or_insert((0, false));
            entry.0 += 1;
            entry.1 |= status == "running";
        }
        Ok(agg
            .into_iter()
            .map(|(path, (count, running))| PathNode {
                name: path.rsplit('/').next().unwrap_or(&path).to_string(),
                path: path.clone(),
                run_count: include_stats.then_some(count),
                has_running: include_stats.then_some(running),
                children: Vec::new(),
            })
            .collect())
    }

    /// Nested tree of path segments with aggregated stats.
    ///
    /// Soft-deleted runs never contribute to counts.
    pub fn path_tree(&self) -> Result<Vec<PathNode>, StorageError> {
        let rows = self.store.index().path_rows()?;

        #[derive(Default)]
        struct Node {
            count: u64,
            running: bool,
            children: BTreeMap<String, Node>,
        }

        let mut root = Node::default();
        for (path, status, deleted) in rows {
            if deleted {
                continue;
            }
            let running = status == "running";
            let mut node = &mut root;
            node.count += 1;
            node.running |= running;
            for segment in path.split('/') {
                node = node.children.entry(segment.to_string()).or_default();
                node.count += 1;
                node.running |= running;
            }
        }

        fn build(prefix: &str, children: BTreeMap<String, Node>) -> Vec<PathNode> {
            children
                .into_iter()
                .map(|(name, node)| {
                    let path = if prefix.is_empty() {
                        name.clone()
                    } else {
                        format!("{prefix}/{name}")
                    };
                    PathNode {
                        name,
                        run_count: Some(node.count),
                        has_running: Some(node.running),
                        children: build(&path, node.children),
                        path,
                    }
                })
                .collect()
        }

        Ok(build("", root.children))
    }

    /// Soft-delete every non-deleted run under a prefix; returns the count.
    pub fn soft_delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let runs = self.runs_under_prefix(prefix)?;
        let mut n = 0;
        for run in runs {
            if !run.deleted {
                self.store.soft_delete(&run.id)?;
                n += 1;
            }
        }
        Ok(n)
    }
}

fn filter_sql(filter: &ListFilter) -> (String, Vec<String>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<String> = Vec::new();

    if !filter.include_deleted {
        clauses.push("deleted_at IS NULL".to_string());
    }
    if let Some(prefix) = filter
        .path_prefix
        .as_deref()
        .map(|p| p.trim_end_matches('/'))
        .filter(|p| !p.is_empty())
    {
        args.push(prefix.to_string());
        let exact = format!("path = ?{}", args.len());
        args.push(format!("{prefix}/%"));
        clauses.push(format!("({exact} OR path LIKE ?{})", args.len()));
    }
    if !filter.status_in.is_empty() {
        let mut placeholders = Vec::new();
        for status in &filter.status_in {
            args.push(status.to_string());
            placeholders.push(format!("?{}", args.len()));
        }
        clauses.push(format!("status IN ({})", placeholders.join(", ")));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_sql, args)
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
