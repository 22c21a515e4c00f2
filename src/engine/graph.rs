//! # Routing Graph
//!
//! The core directed-acyclic-graph structure for catchment inference.
//!
//! ## Key Components
//!
//! - **NodeId**: stable, caller-assigned node identifier (the original data
//!   keys nodes by AS number, so ids are sparse and the graph stores them
//!   in hash maps rather than dense vectors)
//!
//! - **RoutingGraph**: nodes with optional route labels, directed edges
//!   with optional preference metadata, and a per-node color distribution
//!   map that can be snapshotted and reinstalled wholesale
//!
//! ## Design
//!
//! - Structural mutation is idempotent: adding an existing node or edge is
//!   a no-op, and `add_edge` creates missing endpoints
//! - All enumeration is deterministic: node listings and the topological
//!   order are tie-broken by ascending `NodeId`
//! - The coloring lives in its own map, separate from the structure, so
//!   scenario branching can swap complete color states without touching
//!   adjacency

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::color::ColorDistribution;
use crate::engine::errors::GraphError;

/// A unique identifier for a node in the routing graph.
///
/// Implements `Ord`/`PartialOrd` for stable, deterministic iteration.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

/// A complete color state: one distribution per colored node.
///
/// Snapshots of this map are the unit of scenario branching; each snapshot
/// is an independently owned value and two snapshots never alias.
pub type Coloring = FxHashMap<NodeId, ColorDistribution>;

/// Per-node payload. The route label is oracle-assigned and immutable once
/// set.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct NodeRecord {
    route: Option<NodeId>,
}

/// Filter flags for node enumeration.
///
/// At most one flag may be active per query; combining several fails with
/// [`GraphError::InvalidQuery`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeQuery {
    pub with_color: bool,
    pub with_certain_color: bool,
    pub with_route: bool,
}

impl NodeQuery {
    /// No filter: every node matches.
    pub fn all() -> Self {
        Self::default()
    }

    /// Nodes that have a color distribution.
    pub fn colored() -> Self {
        Self {
            with_color: true,
            ..Self::default()
        }
    }

    /// Nodes whose color is certain (one-hot).
    pub fn certain() -> Self {
        Self {
            with_certain_color: true,
            ..Self::default()
        }
    }

    /// Nodes that carry a route label.
    pub fn routed() -> Self {
        Self {
            with_route: true,
            ..Self::default()
        }
    }

    fn active(&self) -> usize {
        usize::from(self.with_color)
            + usize::from(self.with_certain_color)
            + usize::from(self.with_route)
    }
}

/// A directed acyclic routing graph with per-node color distributions.
///
/// Structure (nodes and edges) is fixed before coloring begins, aside from
/// the optional [`prune_leaves`](RoutingGraph::prune_leaves) simplification
/// pass. Edge preference metadata is provenance only and never enters the
/// coloring arithmetic.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoutingGraph {
    /// All nodes, keyed by caller-assigned id.
    nodes: FxHashMap<NodeId, NodeRecord>,
    /// Outgoing adjacency, in edge insertion order.
    succs: FxHashMap<NodeId, Vec<NodeId>>,
    /// Incoming adjacency, in edge insertion order.
    preds: FxHashMap<NodeId, Vec<NodeId>>,
    /// Optional preference metadata per directed edge.
    prefs: FxHashMap<(NodeId, NodeId), Option<f64>>,
    /// Current color state. Swappable wholesale via
    /// [`coloring`](RoutingGraph::coloring) /
    /// [`install_coloring`](RoutingGraph::install_coloring).
    colors: Coloring,
}

const NO_NEIGHBORS: &[NodeId] = &[];

impl RoutingGraph {
    /// Creates an empty routing graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a list of `(predecessor, successor, preference)`
    /// edges, creating every endpoint.
    pub fn from_edges(edges: impl IntoIterator<Item = (NodeId, NodeId, Option<f64>)>) -> Self {
        let mut graph = Self::new();
        for (src, dst, preference) in edges {
            graph.add_edge(src, dst, preference);
        }
        graph
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of directed edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.prefs.len()
    }

    pub fn has_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn has_edge(&self, src: NodeId, dst: NodeId) -> bool {
        self.prefs.contains_key(&(src, dst))
    }

    /// Adds a node. Adding an existing node is a no-op.
    pub fn add_node(&mut self, node: NodeId) {
        self.nodes.entry(node).or_default();
    }

    /// Adds the directed edge `src -> dst`, creating missing endpoints.
    ///
    /// Adding an existing edge is a no-op; the first preference recorded
    /// for an edge wins.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, preference: Option<f64>) {
        self.add_node(src);
        self.add_node(dst);
        if self.has_edge(src, dst) {
            return;
        }
        self.prefs.insert((src, dst), preference);
        self.succs.entry(src).or_default().push(dst);
        self.preds.entry(dst).or_default().push(src);
    }

    /// Removes a node together with its incident edges, color, and route.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if the node is not in the graph.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        if self.nodes.remove(&node).is_none() {
            return Err(GraphError::NotFound { node });
        }
        for succ in self.succs.remove(&node).unwrap_or_default() {
            self.prefs.remove(&(node, succ));
            if let Some(preds) = self.preds.get_mut(&succ) {
                preds.retain(|p| *p != node);
            }
        }
        for pred in self.preds.remove(&node).unwrap_or_default() {
            self.prefs.remove(&(pred, node));
            if let Some(succs) = self.succs.get_mut(&pred) {
                succs.retain(|s| *s != node);
            }
        }
        self.colors.remove(&node);
        Ok(())
    }

    /// Removes the directed edge `src -> dst`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if the edge does not exist; the
    /// reported node is `src`.
    pub fn remove_edge(&mut self, src: NodeId, dst: NodeId) -> Result<(), GraphError> {
        if self.prefs.remove(&(src, dst)).is_none() {
            return Err(GraphError::NotFound { node: src });
        }
        if let Some(succs) = self.succs.get_mut(&src) {
            succs.retain(|s| *s != dst);
        }
        if let Some(preds) = self.preds.get_mut(&dst) {
            preds.retain(|p| *p != src);
        }
        Ok(())
    }

    /// Direct predecessors of a node, in edge insertion order.
    pub fn predecessors(&self, node: NodeId) -> &[NodeId] {
        self.preds.get(&node).map_or(NO_NEIGHBORS, Vec::as_slice)
    }

    /// Direct successors of a node, in edge insertion order.
    pub fn successors(&self, node: NodeId) -> &[NodeId] {
        self.succs.get(&node).map_or(NO_NEIGHBORS, Vec::as_slice)
    }

    /// The preference recorded for the edge `src -> dst`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if the edge does not exist.
    pub fn edge_preference(&self, src: NodeId, dst: NodeId) -> Result<Option<f64>, GraphError> {
        self.prefs
            .get(&(src, dst))
            .copied()
            .ok_or(GraphError::NotFound { node: src })
    }

    /// All node ids in ascending order.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// A topological order of the graph, ties broken by ascending `NodeId`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] if the graph is not acyclic.
    /// Acyclicity is part of the input contract; this is a defensive check.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut indegree: FxHashMap<NodeId, usize> = self
            .nodes
            .keys()
            .map(|node| (*node, self.predecessors(*node).len()))
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeId>> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| Reverse(*node))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for succ in self.successors(node) {
                let degree = indegree
                    .get_mut(succ)
                    .expect("successor of a live node is a live node");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(*succ));
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::CycleDetected {
                remaining: self.nodes.len() - order.len(),
            });
        }
        Ok(order)
    }

    /// Removes pure pass-through leaves: walking the reverse topological
    /// order, every node with zero successors and exactly one predecessor
    /// is dropped.
    ///
    /// A leaf hanging off a single predecessor carries no information for
    /// coloring, so pruning simplifies chains without affecting semantics.
    /// Chains collapse in a single pass because removing a sink is observed
    /// by its predecessor later in the reverse order.
    pub fn prune_leaves(&mut self) -> Result<(), GraphError> {
        let order = self.topological_order()?;
        for node in order.into_iter().rev() {
            if self.successors(node).is_empty() && self.predecessors(node).len() == 1 {
                self.remove_node(node)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Color state
    // ------------------------------------------------------------------

    pub fn has_color(&self, node: NodeId) -> bool {
        self.colors.contains_key(&node)
    }

    /// The node's color distribution.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if the node is absent,
    /// [`GraphError::NoColor`] if it has no distribution.
    pub fn color(&self, node: NodeId) -> Result<&ColorDistribution, GraphError> {
        if !self.has_node(node) {
            return Err(GraphError::NotFound { node });
        }
        self.colors.get(&node).ok_or(GraphError::NoColor { node })
    }

    pub fn has_certain_color(&self, node: NodeId) -> bool {
        self.colors
            .get(&node)
            .is_some_and(ColorDistribution::is_certain)
    }

    /// The root the node is certain for.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotCertain`] if the node's distribution is not
    /// one-hot (or absent), [`GraphError::NotFound`] if the node is absent.
    pub fn certain_color(&self, node: NodeId) -> Result<NodeId, GraphError> {
        if !self.has_node(node) {
            return Err(GraphError::NotFound { node });
        }
        self.colors
            .get(&node)
            .and_then(ColorDistribution::certain_root)
            .ok_or(GraphError::NotCertain { node })
    }

    /// Installs a color on an uncolored node.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if the node is absent,
    /// [`GraphError::AlreadySet`] if it already has a distribution.
    /// Overwriting is only possible through
    /// [`recolor`](RoutingGraph::recolor).
    pub fn set_color(&mut self, node: NodeId, color: ColorDistribution) -> Result<(), GraphError> {
        if !self.has_node(node) {
            return Err(GraphError::NotFound { node });
        }
        if self.has_color(node) {
            return Err(GraphError::AlreadySet {
                node,
                property: "color",
            });
        }
        self.colors.insert(node, color);
        Ok(())
    }

    /// Installs a color whether or not the node already has one.
    pub fn recolor(&mut self, node: NodeId, color: ColorDistribution) -> Result<(), GraphError> {
        if !self.has_node(node) {
            return Err(GraphError::NotFound { node });
        }
        self.colors.insert(node, color);
        Ok(())
    }

    /// Clones the complete color state out of the graph.
    ///
    /// The returned map is an independent value: mutating the graph
    /// afterwards does not affect it. This, together with
    /// [`install_coloring`](RoutingGraph::install_coloring), is the seam
    /// scenario branching is built on.
    pub fn coloring(&self) -> Coloring {
        self.colors.clone()
    }

    /// Replaces the graph's color state wholesale.
    pub fn install_coloring(&mut self, coloring: Coloring) {
        self.colors = coloring;
    }

    /// Number of nodes whose color is certain.
    pub fn certain_node_count(&self) -> usize {
        self.colors.values().filter(|c| c.is_certain()).count()
    }

    // ------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------

    pub fn has_route(&self, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|record| record.route.is_some())
    }

    /// The node's route label.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if the node is absent,
    /// [`GraphError::NoRoute`] if no route has been assigned.
    pub fn route(&self, node: NodeId) -> Result<NodeId, GraphError> {
        self.nodes
            .get(&node)
            .ok_or(GraphError::NotFound { node })?
            .route
            .ok_or(GraphError::NoRoute { node })
    }

    /// Assigns the oracle-provided route label of a node.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if either the node or the route target is
    /// absent from the graph, [`GraphError::AlreadySet`] if the node
    /// already carries a route; routes are immutable once set.
    pub fn set_route(&mut self, node: NodeId, route: NodeId) -> Result<(), GraphError> {
        if !self.has_node(route) {
            return Err(GraphError::NotFound { node: route });
        }
        let record = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NotFound { node })?;
        if record.route.is_some() {
            return Err(GraphError::AlreadySet {
                node,
                property: "route",
            });
        }
        record.route = Some(route);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Filtered enumeration
    // ------------------------------------------------------------------

    /// Lists nodes matching `query`, optionally restricted to `subset`, in
    /// ascending id order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidQuery`] when more than one filter flag
    /// is active.
    pub fn list_nodes(
        &self,
        query: NodeQuery,
        subset: Option<&FxHashSet<NodeId>>,
    ) -> Result<Vec<NodeId>, GraphError> {
        let active = query.active();
        if active > 1 {
            return Err(GraphError::InvalidQuery { active });
        }
        let nodes = self
            .nodes()
            .into_iter()
            .filter(|node| subset.map_or(true, |s| s.contains(node)))
            .filter(|node| {
                if query.with_color {
                    self.has_color(*node)
                } else if query.with_certain_color {
                    self.has_certain_color(*node)
                } else if query.with_route {
                    self.has_route(*node)
                } else {
                    true
                }
            })
            .collect();
        Ok(nodes)
    }

    /// Counts nodes matching `query`, with the same contract as
    /// [`list_nodes`](RoutingGraph::list_nodes).
    pub fn count_nodes(
        &self,
        query: NodeQuery,
        subset: Option<&FxHashSet<NodeId>>,
    ) -> Result<usize, GraphError> {
        Ok(self.list_nodes(query, subset)?.len())
    }
}
