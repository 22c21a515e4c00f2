//! Error types for routing-graph coloring and measurement selection.

use thiserror::Error;

use crate::engine::graph::NodeId;

/// Errors raised by graph queries, coloring algorithms, and measurement
/// selection.
///
/// Every variant represents a broken precondition or data contract, not a
/// transient condition: a failure aborts the operation in progress and the
/// caller must not retry. Variants carry the offending node identifier(s)
/// and the conflicting values where they exist.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in the future without breaking changes.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphError {
    /// A color distribution whose probabilities do not sum to 1 within
    /// tolerance, or that contains a negative or non-finite probability.
    ///
    /// `node` is present when the distribution was computed for (or being
    /// installed on) a specific node.
    #[error("invalid color distribution (sum of probabilities = {sum})")]
    InvalidDistribution { node: Option<NodeId>, sum: f64 },

    /// A route or color was set on a node that already has one.
    ///
    /// Routes are immutable once assigned; colors may only be overwritten
    /// through the explicit recolor path.
    #[error("node {node:?} already has a {property}")]
    AlreadySet {
        node: NodeId,
        property: &'static str,
    },

    /// A node's color was derived from its predecessors while at least one
    /// predecessor had no distribution yet.
    #[error("cannot derive color of node {node:?}: predecessor {predecessor:?} is uncolored")]
    UncoloredPredecessor {
        node: NodeId,
        predecessor: NodeId,
    },

    /// A node certain for one root was forced to a different root, or a
    /// downstream recomputation produced a certain color inconsistent with
    /// the color that forced it.
    #[error("node {node:?} is certain for root {existing:?}, conflicting with {proposed:?}")]
    Contradiction {
        node: NodeId,
        existing: NodeId,
        proposed: NodeId,
    },

    /// A node became certain for a color that none of its predecessors'
    /// distributions could have produced.
    #[error("no predecessor of node {node:?} assigns positive probability to root {color:?}")]
    InvariantViolation { node: NodeId, color: NodeId },

    /// The node is not present in the graph.
    #[error("node {node:?} not found in the routing graph")]
    NotFound { node: NodeId },

    /// The node has a color distribution but not a certain (one-hot) one.
    #[error("node {node:?} does not have a certain color")]
    NotCertain { node: NodeId },

    /// The node has no color distribution.
    #[error("node {node:?} does not have a color")]
    NoColor { node: NodeId },

    /// The node has no route label.
    #[error("node {node:?} does not have a route")]
    NoRoute { node: NodeId },

    /// A node proposed as a coloring root has predecessors.
    #[error("node {node:?} has predecessors and cannot be a root")]
    NotARoot { node: NodeId },

    /// A node enumeration combined more than one mutually exclusive filter.
    #[error("node queries accept at most one active filter ({active} requested)")]
    InvalidQuery { active: usize },

    /// A selection budget larger than the candidate pool.
    #[error("selection budget {budget} exceeds the {candidates} available candidates")]
    BudgetExceedsCandidates { budget: usize, candidates: usize },

    /// The graph contains a cycle. Routing graphs are acyclic by contract;
    /// this is only reachable through a malformed input.
    #[error("routing graph contains a cycle ({remaining} nodes unsorted)")]
    CycleDetected { remaining: usize },
}
