//! # Routecast - Catchment Inference on Routing Graphs
//!
//! Routecast infers, over a directed acyclic routing graph, how every node
//! ultimately resolves toward one of several designated root nodes. Each
//! node carries a probability distribution over roots (its "color");
//! newly revealed ground truth (a node's certain color) cascades through
//! the graph both upstream, by elimination, and downstream, by
//! recomputation. A second subsystem greedily selects which nodes to
//! measure next, under a budget, to maximize the expected number of
//! certainly-colored nodes.
//!
//! ## Architecture
//!
//! The system is organized into two modules:
//!
//! - **engine**: the routing graph, color distributions, coloring
//!   algorithms, scenario ensembles, and measurement selection
//! - **metrics**: catchment aggregation, the primary output surface
//!
//! ## Usage
//!
//! ```rust
//! use routecast::{NodeId, RoutingGraph};
//! use routecast::metrics::certain_catchment;
//!
//! let mut graph = RoutingGraph::from_edges([
//!     (NodeId(1), NodeId(3), None),
//!     (NodeId(2), NodeId(3), None),
//!     (NodeId(3), NodeId(4), None),
//! ]);
//! graph.set_probabilistic_coloring(&[NodeId(1), NodeId(2)])?;
//!
//! // A measurement reveals that node 4 routes to root 1; certainty
//! // cascades through the graph.
//! graph.propagate_certain_color(NodeId(4), NodeId(1))?;
//!
//! let catchment = certain_catchment(&graph, false, None)?;
//! assert_eq!(catchment.get(&NodeId(1)), Some(&3.0));
//! # Ok::<(), routecast::GraphError>(())
//! ```

#![forbid(unsafe_code)]

pub mod engine;
pub mod metrics;

// Re-export commonly used types
pub use engine::color::{ColorDistribution, DISTRIBUTION_EPSILON};
pub use engine::errors::GraphError;
pub use engine::graph::{Coloring, NodeId, NodeQuery, RoutingGraph};
pub use engine::scenario::{Ensemble, Scenario};
pub use engine::selection::{
    evaluate_efficiency, greedy_measurements, random_measurements, Evaluation, LazyBound,
    SelectionConfig, SelectionOutcome,
};
