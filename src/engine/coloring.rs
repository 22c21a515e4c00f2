//! # Coloring Algorithms
//!
//! The inference algorithms that assign and refine color distributions on a
//! [`RoutingGraph`]:
//!
//! - **Probabilistic initialization**: roots are seeded one-hot, every
//!   other node is derived in topological order as the unweighted mean of
//!   its predecessors
//! - **Forward refresh**: re-derives every not-yet-certain node after new
//!   certainty has been injected upstream
//! - **Certain-color propagation**: the bidirectional cascade: certainty
//!   climbs upstream by elimination (a sole predecessor that could explain
//!   the color must itself be certain) and descends downstream by
//!   recomputation
//!
//! The cascade is implemented with an explicit work-list of
//! `(node, color)` pairs rather than recursion, so its depth is not bounded
//! by the call stack on long chains. Per-node state only ever moves
//! Unknown → Probabilistic → Certain; Certain is absorbing, and any attempt
//! to force a different color on a certain node is a contradiction.
//!
//! Every operation here is fatal on error: `propagate_certain_color`
//! restores the graph's coloring to its pre-call state before returning a
//! failure, so partial cascades never leak into the graph.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::engine::color::ColorDistribution;
use crate::engine::errors::GraphError;
use crate::engine::graph::{NodeId, RoutingGraph};

impl RoutingGraph {
    /// Seeds every root with a one-hot distribution over the root set
    /// (itself = 1, all other roots = 0).
    ///
    /// Validates all roots before coloring any of them, so a failure leaves
    /// the graph untouched.
    ///
    /// # Errors
    ///
    /// * [`GraphError::NotFound`]: a proposed root is absent
    /// * [`GraphError::NotARoot`]: a proposed root has predecessors
    /// * [`GraphError::AlreadySet`]: a proposed root already has a color
    pub fn initialize_root_coloring(&mut self, roots: &[NodeId]) -> Result<(), GraphError> {
        for &root in roots {
            if !self.has_node(root) {
                return Err(GraphError::NotFound { node: root });
            }
            if !self.predecessors(root).is_empty() {
                return Err(GraphError::NotARoot { node: root });
            }
            if self.has_color(root) {
                return Err(GraphError::AlreadySet {
                    node: root,
                    property: "color",
                });
            }
        }
        for &root in roots {
            self.set_color(root, ColorDistribution::one_hot(roots, root))?;
        }
        Ok(())
    }

    /// Colors a node as the unweighted arithmetic mean of its
    /// predecessors' distributions.
    ///
    /// A node with no predecessors is left untouched. With `recolor` set,
    /// an existing distribution is overwritten; otherwise recoloring an
    /// already-colored node fails with [`GraphError::AlreadySet`].
    ///
    /// # Errors
    ///
    /// * [`GraphError::UncoloredPredecessor`]: a predecessor has no
    ///   distribution yet
    /// * [`GraphError::InvalidDistribution`]: the mean does not sum to 1
    pub fn derive_from_predecessors(
        &mut self,
        node: NodeId,
        recolor: bool,
    ) -> Result<(), GraphError> {
        if !self.has_node(node) {
            return Err(GraphError::NotFound { node });
        }
        if self.predecessors(node).is_empty() {
            return Ok(());
        }

        let mut dists = Vec::with_capacity(self.predecessors(node).len());
        for &pred in self.predecessors(node) {
            match self.color(pred) {
                Ok(dist) => dists.push(dist),
                Err(_) => {
                    return Err(GraphError::UncoloredPredecessor {
                        node,
                        predecessor: pred,
                    })
                }
            }
        }
        let mean = ColorDistribution::mean_of(&dists).map_err(|err| match err {
            GraphError::InvalidDistribution { sum, .. } => GraphError::InvalidDistribution {
                node: Some(node),
                sum,
            },
            other => other,
        })?;

        if recolor {
            self.recolor(node, mean)
        } else {
            self.set_color(node, mean)
        }
    }

    /// Computes the full probabilistic coloring of the graph: seeds the
    /// roots, then derives every other node in topological order.
    ///
    /// Called once at setup. Already-colored non-root nodes fail with
    /// [`GraphError::AlreadySet`]; this never silently re-derives.
    pub fn set_probabilistic_coloring(&mut self, roots: &[NodeId]) -> Result<(), GraphError> {
        let order = self.topological_order()?;
        self.initialize_root_coloring(roots)?;
        let root_set: FxHashSet<NodeId> = roots.iter().copied().collect();
        for node in order {
            if root_set.contains(&node) {
                continue;
            }
            self.derive_from_predecessors(node, false)?;
        }
        Ok(())
    }

    /// Re-derives the distribution of every node that is not yet certain,
    /// in topological order.
    ///
    /// Used after a certain color has been injected upstream, to let
    /// downstream distributions catch up without disturbing nodes that are
    /// already certain.
    pub fn refresh_forward(&mut self) -> Result<(), GraphError> {
        for node in self.topological_order()? {
            if self.has_certain_color(node) {
                continue;
            }
            self.derive_from_predecessors(node, true)?;
        }
        Ok(())
    }

    /// Forces `node` to be certain for `color` and cascades the
    /// consequences through the graph.
    ///
    /// The cascade works a list of `(node, color)` obligations:
    ///
    /// 1. A node already certain for `color` is skipped (idempotent); a
    ///    node certain for a different color is a contradiction.
    /// 2. Otherwise the node's distribution becomes one-hot at `color`.
    /// 3. *Upstream elimination*: among the node's predecessors, those
    ///    assigning positive probability to `color` could explain the new
    ///    certainty. None is an invariant violation. Exactly one, not yet
    ///    certain, must itself be certain for `color` and is enqueued.
    ///    Several means no upstream inference is possible.
    /// 4. *Downstream recomputation*: every not-yet-certain successor is
    ///    re-derived; if the recomputation turns one-hot it must match
    ///    `color` and the successor is enqueued.
    ///
    /// On any error the coloring is restored to its pre-call state.
    ///
    /// # Errors
    ///
    /// [`GraphError::Contradiction`], [`GraphError::InvariantViolation`],
    /// [`GraphError::UncoloredPredecessor`], [`GraphError::NotFound`].
    pub fn propagate_certain_color(
        &mut self,
        node: NodeId,
        color: NodeId,
    ) -> Result<(), GraphError> {
        let saved = self.coloring();
        match self.run_certain_color_cascade(node, color) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.install_coloring(saved);
                Err(err)
            }
        }
    }

    fn run_certain_color_cascade(&mut self, node: NodeId, color: NodeId) -> Result<(), GraphError> {
        if !self.has_node(node) {
            return Err(GraphError::NotFound { node });
        }

        let mut work: Vec<(NodeId, NodeId)> = vec![(node, color)];
        while let Some((current, forced)) = work.pop() {
            if self.has_certain_color(current) {
                let existing = self.certain_color(current)?;
                if existing != forced {
                    return Err(GraphError::Contradiction {
                        node: current,
                        existing,
                        proposed: forced,
                    });
                }
                continue;
            }

            self.recolor(current, ColorDistribution::certain(forced))?;

            // Upstream elimination: which predecessors could have produced
            // this color?
            let mut candidates: SmallVec<[NodeId; 4]> = SmallVec::new();
            for &pred in self.predecessors(current) {
                match self.color(pred) {
                    Ok(dist) => {
                        if dist.probability(forced) > 0.0 {
                            candidates.push(pred);
                        }
                    }
                    Err(_) => {
                        return Err(GraphError::UncoloredPredecessor {
                            node: current,
                            predecessor: pred,
                        })
                    }
                }
            }
            match candidates.len() {
                0 => {
                    return Err(GraphError::InvariantViolation {
                        node: current,
                        color: forced,
                    });
                }
                1 => {
                    let pred = candidates[0];
                    if !self.has_certain_color(pred) {
                        // The only possible explanation must itself be
                        // certain.
                        work.push((pred, forced));
                    }
                }
                // Several candidates: no upstream inference possible.
                _ => {}
            }

            // Downstream recomputation.
            let succs: SmallVec<[NodeId; 4]> = SmallVec::from_slice(self.successors(current));
            for succ in succs {
                if self.has_certain_color(succ) {
                    continue;
                }
                self.derive_from_predecessors(succ, true)?;
                if self.has_certain_color(succ) {
                    let derived = self.certain_color(succ)?;
                    if derived != forced {
                        return Err(GraphError::Contradiction {
                            node: succ,
                            existing: derived,
                            proposed: forced,
                        });
                    }
                    work.push((succ, forced));
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "certain-color cascade settled: {} nodes certain",
            self.certain_node_count()
        );

        Ok(())
    }
}
