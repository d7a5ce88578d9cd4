//! Traversal-based graph metrics.
//!
//! Optional second pass over the assembled graph. Breadth-first from every
//! root with an explicit queue, so deep spawn chains cannot exhaust the
//! stack.

use std::collections::{HashSet, VecDeque};

use crate::graph::Adjacency;
use crate::types::TraversalMetrics;

/// Compute depth and branching metrics.
///
/// Depth counts nodes, so a lone root has depth 1. Each root gets its own
/// visited set; a node reachable from two roots is measured from both.
pub fn compute_traversal_metrics(adjacency: &Adjacency) -> TraversalMetrics {
    let roots = adjacency.roots();
    let mut max_depth = 0;

    for &root in &roots {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
        queue.push_back((root, 1));

        while let Some((node, depth)) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            max_depth = max_depth.max(depth);

            for &child in &adjacency.children[node] {
                if !visited.contains(&child) {
                    queue.push_back((child, depth + 1));
                }
            }
        }
    }

    let fan_outs: Vec<usize> = adjacency
        .children
        .iter()
        .map(Vec::len)
        .filter(|&n| n > 0)
        .collect();
    let avg_branching_factor = if fan_outs.is_empty() {
        0.0
    } else {
        let avg = fan_outs.iter().sum::<usize>() as f64 / fan_outs.len() as f64;
        (avg * 100.0).round() / 100.0
    };

    TraversalMetrics {
        max_depth,
        avg_branching_factor,
        root_count: roots.len(),
    }
}
