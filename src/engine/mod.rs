//! The inference engine for routing-graph catchment.
//!
//! This module provides:
//! - **errors**: Error types for query and inference failures
//! - **color**: The validated per-node color distribution
//! - **graph**: The routing-graph structure with color and route state
//! - **coloring**: Probabilistic coloring and certain-color propagation
//! - **scenario**: Value-semantics color snapshots and weighted ensembles
//! - **selection**: Greedy and random measurement selection

pub mod color;
pub mod coloring;
pub mod errors;
pub mod graph;
pub mod scenario;
pub mod selection;
