// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Largest-Triangle-Three-Buckets downsampling.
//!
//! Selects one representative point per bucket by maximizing the triangle
//! area formed with the previously selected point and the average of the
//! next bucket. Both endpoints are always preserved, so monotonic x
//! sequences stay monotonic.

/// Indices of the points LTTB keeps when reducing `points` to `target`.
///
/// `points` are `(x, y)` pairs in x order. The selection always has
/// exactly `min(target, len)` entries: 0 keeps nothing, 1 keeps the
/// first point, 2 keeps both endpoints, `target >= len` keeps all.
/// Callers that want "no downsampling" skip the call rather than pass 0.
pub fn lttb_indices(points: &[(f64, f64)], target: usize) -> Vec<usize> {
    let n = points.len();
    if target == 0 {
        return Vec::new();
    }
    if target >= n {
        return (0..n).collect();
    }
    if target == 1 {
        return vec![0];
    }
    if target == 2 || n <= 2 {
        return vec![0, n - 1];
    }

    let mut selected = Vec::with_capacity(target);
    selected.push(0);

    // Interior points 1..n-1 are partitioned into target-2 buckets;
    // integer boundaries keep every bucket non-empty and disjoint, so
    // the selection is strictly increasing by construction.
    let interior = n - 2;
    let bucket_count = target - 2;
    let bound = |bucket: usize| 1 + bucket * interior / bucket_count;
    let mut prev = 0usize;

    for bucket in 0..bucket_count {
        let start = bound(bucket);
        let end = bound(bucket + 1);

        // Average of the following bucket (the last point for the final one)
        let (avg_x, avg_y) = if bucket + 1 < bucket_count {
            let (next_start, next_end) = (bound(bucket + 1), bound(bucket + 2));
            let len = (next_end - next_start) as f64;
            let (sx, sy) = points[next_start..next_end]
                .iter()
                .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
            (sx / len, sy / len)
        } else {
            points[n - 1]
        };

        let (px, py) = points[prev];
        let mut best_idx = start;
        let mut best_area = -1.0f64;
        for (idx, (x, y)) in points.iter().enumerate().take(end).skip(start) {
            let area = ((px - avg_x) * (y - py) - (px - x) * (avg_y - py)).abs();
            if area > best_area {
                best_area = area;
                best_idx = idx;
            }
        }

        selected.push(best_idx);
        prev = best_idx;
    }

    selected.push(n - 1);
    selected
}

#[cfg(test)]
#[path = "downsample_tests.rs"]
mod tests;
