//! Catchment aggregation over a colored routing graph.
//!
//! The catchment of a root is the share of the graph that resolves to it:
//! either the number of nodes *certain* for the root, or the total
//! probability mass the root holds across all colored nodes. This is the
//! primary output surface read back by reporting collaborators.
//!
//! Notes:
//! - Deterministic evaluation: results are keyed in ascending root order.
//! - Fractions divide by the total node count of the whole graph, even
//!   when the aggregation is restricted to a subset.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use crate::engine::errors::GraphError;
use crate::engine::graph::{NodeId, NodeQuery, RoutingGraph};

/// Counts, per root, the nodes whose color is certain for that root.
///
/// With `in_fraction`, counts are divided by the graph's total node count.
/// With `subset`, only nodes in the subset are counted (the fraction
/// denominator is unaffected).
///
/// Roots with no certain nodes do not appear in the result.
pub fn certain_catchment(
    graph: &RoutingGraph,
    in_fraction: bool,
    subset: Option<&FxHashSet<NodeId>>,
) -> Result<BTreeMap<NodeId, f64>, GraphError> {
    let mut catchment: BTreeMap<NodeId, f64> = BTreeMap::new();
    for node in graph.list_nodes(NodeQuery::certain(), subset)? {
        let root = graph.certain_color(node)?;
        *catchment.entry(root).or_insert(0.0) += 1.0;
    }
    if in_fraction {
        normalize(&mut catchment, graph.node_count());
    }
    Ok(catchment)
}

/// Sums, per root, the probability mass assigned to that root across all
/// colored nodes.
///
/// Same normalization and subsetting contract as [`certain_catchment`].
pub fn probabilistic_catchment(
    graph: &RoutingGraph,
    in_fraction: bool,
    subset: Option<&FxHashSet<NodeId>>,
) -> Result<BTreeMap<NodeId, f64>, GraphError> {
    let mut catchment: BTreeMap<NodeId, f64> = BTreeMap::new();
    for node in graph.list_nodes(NodeQuery::colored(), subset)? {
        for (root, probability) in graph.color(node)?.iter() {
            *catchment.entry(root).or_insert(0.0) += probability;
        }
    }
    if in_fraction {
        normalize(&mut catchment, graph.node_count());
    }
    Ok(catchment)
}

fn normalize(catchment: &mut BTreeMap<NodeId, f64>, total_nodes: usize) {
    let total = total_nodes as f64;
    for value in catchment.values_mut() {
        *value /= total;
    }
}
