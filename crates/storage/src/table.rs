// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics table assembly for the query API.
//!
//! Turns a run's event rows into a columnar table: the x column (step or
//! time) followed by the union of metric names in first-appearance order.
//! Downsampling applies LTTB per numeric series and returns the union of
//! the selected rows, so every series keeps its visual shape.

use crate::downsample::lttb_indices;
use rn_core::MetricEvent;
use serde::Serialize;
use std::collections::BTreeSet;

/// Which value drives the x column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XAxis {
    Step,
    Time,
}

impl XAxis {
    pub fn parse(s: &str) -> Option<XAxis> {
        match s {
            "step" => Some(XAxis::Step),
            "time" => Some(XAxis::Time),
            _ => None,
        }
    }
}

/// Columnar metrics view returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
    pub total: usize,
    pub sampled: usize,
    /// Step of the last raw event, for the `X-Last-Step` header.
    #[serde(skip)]
    pub last_step: Option<u64>,
}

impl MetricsTable {
    /// Build the table from raw events.
    ///
    /// `downsample` of `None` disables downsampling; `Some(target)`
    /// keeps `min(target, total)` rows per series, so an explicit 0
    /// returns an empty table.
    pub fn build(
        events: &[MetricEvent],
        x_axis: XAxis,
        downsample: Option<usize>,
    ) -> MetricsTable {
        let total = events.len();
        let last_step = events.iter().rev().find_map(|e| e.step);

        // Union of metric names, first-appearance order
        let mut columns: Vec<String> = Vec::new();
        for event in events {
            for name in event.fields.keys() {
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.clone());
                }
            }
        }

        let xs: Vec<f64> = events
            .iter()
            .enumerate()
            .map(|(idx, e)| x_value(e, idx, x_axis))
            .collect();

        let keep: Vec<usize> = match downsample {
            None => (0..total).collect(),
            Some(target) if target >= total => (0..total).collect(),
            Some(target) => {
                let mut union: BTreeSet<usize> = BTreeSet::new();
                for name in &columns {
                    let series: Vec<(usize, (f64, f64))> = events
                        .iter()
                        .enumerate()
                        .filter_map(|(idx, e)| {
                            e.fields.get(name).map(|v| (idx, (xs[idx], *v)))
                        })
                        .collect();
                    let points: Vec<(f64, f64)> = series.iter().map(|(_, p)| *p).collect();
                    for sel in lttb_indices(&points, target) {
                        union.insert(series[sel].0);
                    }
                }
                union.into_iter().collect()
            }
        };

        let mut all_columns = Vec::with_capacity(columns.len() + 1);
        all_columns.push(
            match x_axis {
                XAxis::Step => "step",
                XAxis::Time => "time",
            }
            .to_string(),
        );
        all_columns.extend(columns.iter().cloned());

        let rows: Vec<Vec<Option<f64>>> = keep
            .iter()
            .map(|&idx| {
                let event = &events[idx];
                let mut row = Vec::with_capacity(all_columns.len());
                row.push(Some(xs[idx]));
                for name in &columns {
                    row.push(event.fields.get(name).copied());
                }
                row
            })
            .collect();

        let sampled = rows.len();
        MetricsTable {
            columns: all_columns,
            rows,
            total,
            sampled,
            last_step,
        }
    }
}

fn x_value(event: &MetricEvent, idx: usize, x_axis: XAxis) -> f64 {
    match x_axis {
        XAxis::Step => event.step.map(|s| s as f64).unwrap_or(idx as f64),
        XAxis::Time => event.ts.timestamp_millis() as f64 / 1000.0,
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
