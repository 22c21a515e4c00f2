//! # Color Distributions
//!
//! A color distribution maps each root of the routing graph to the
//! probability that a node ultimately resolves toward (takes the color of)
//! that root. The sum-to-one invariant is enforced at construction, never
//! after the fact: any `ColorDistribution` held by the graph is valid.
//!
//! A **certain** color is a distribution with exactly one entry equal to
//! 1.0. Certainty is tested with an exact comparison: certain mass only
//! ever arises from forcing a one-hot distribution or from averaging
//! entries that are themselves exactly 1.0, and `n * 1.0 / n` is exact in
//! IEEE arithmetic.

use std::collections::BTreeMap;

use crate::engine::errors::GraphError;
use crate::engine::graph::NodeId;

/// Tolerance for the sum-to-one check, to absorb rounding during
/// mean-of-predecessors derivation.
pub const DISTRIBUTION_EPSILON: f64 = 1e-4;

/// A per-node probability distribution over the graph's roots.
///
/// Keys are root node ids; values are probabilities. The support may be a
/// subset of the root set; an absent root carries probability 0. Entries
/// are stored in a `BTreeMap` so that iteration order is deterministic
/// (ascending root id), which keeps branching and aggregation reproducible.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorDistribution {
    probs: BTreeMap<NodeId, f64>,
}

impl ColorDistribution {
    /// Creates a distribution from raw probabilities, validating the
    /// invariant.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDistribution`] if any probability is
    /// negative or non-finite, or if the probabilities do not sum to 1
    /// within [`DISTRIBUTION_EPSILON`].
    pub fn new(probs: BTreeMap<NodeId, f64>) -> Result<Self, GraphError> {
        let sum: f64 = probs.values().sum();
        if probs.values().any(|p| !p.is_finite() || *p < 0.0)
            || (sum - 1.0).abs() > DISTRIBUTION_EPSILON
        {
            return Err(GraphError::InvalidDistribution { node: None, sum });
        }
        Ok(Self { probs })
    }

    /// A one-hot distribution with all mass on `root`.
    ///
    /// This is the distribution installed when a node's color becomes
    /// certain. Its support is the single entry `{root: 1.0}`.
    pub fn certain(root: NodeId) -> Self {
        Self {
            probs: BTreeMap::from([(root, 1.0)]),
        }
    }

    /// A one-hot distribution over an explicit root set: `root` gets 1.0,
    /// every other member of `roots` gets 0.0.
    ///
    /// Used when seeding the roots themselves, so that every root appears
    /// in each root's support.
    pub fn one_hot(roots: &[NodeId], root: NodeId) -> Self {
        let mut probs: BTreeMap<NodeId, f64> = roots.iter().map(|r| (*r, 0.0)).collect();
        probs.insert(root, 1.0);
        Self { probs }
    }

    /// The probability assigned to `root` (0.0 when `root` is not in the
    /// support).
    pub fn probability(&self, root: NodeId) -> f64 {
        self.probs.get(&root).copied().unwrap_or(0.0)
    }

    /// Sum of all probabilities. Within [`DISTRIBUTION_EPSILON`] of 1.0 by
    /// construction.
    pub fn sum(&self) -> f64 {
        self.probs.values().sum()
    }

    /// The root this distribution is certain for, if any entry is exactly
    /// 1.0.
    pub fn certain_root(&self) -> Option<NodeId> {
        self.probs
            .iter()
            .find(|(_, p)| **p == 1.0)
            .map(|(root, _)| *root)
    }

    /// Whether the distribution is one-hot.
    pub fn is_certain(&self) -> bool {
        self.certain_root().is_some()
    }

    /// Iterates over `(root, probability)` entries in ascending root order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.probs.iter().map(|(root, p)| (*root, *p))
    }

    /// Number of roots in the support.
    pub fn len(&self) -> usize {
        self.probs.len()
    }

    /// Whether the support is empty. Never true for a constructed
    /// distribution; exists for completeness of the container API.
    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// The unweighted arithmetic mean of several distributions, over the
    /// union of their supports.
    ///
    /// This is the derivation rule for a node with colored predecessors:
    /// for each root, sum the predecessors' probabilities and divide by the
    /// number of predecessors. Edge preference metadata never weighs in.
    /// Roots that accumulate no mass are dropped from the support, so a
    /// derived distribution only ever names colors the node can actually
    /// take.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDistribution`] if `dists` is empty or
    /// the mean does not satisfy the sum-to-one invariant.
    pub fn mean_of(dists: &[&ColorDistribution]) -> Result<Self, GraphError> {
        if dists.is_empty() {
            return Err(GraphError::InvalidDistribution {
                node: None,
                sum: 0.0,
            });
        }
        let mut sums: BTreeMap<NodeId, f64> = BTreeMap::new();
        for dist in dists {
            for (root, p) in dist.iter() {
                *sums.entry(root).or_insert(0.0) += p;
            }
        }
        let count = dists.len() as f64;
        for p in sums.values_mut() {
            *p /= count;
        }
        sums.retain(|_, p| *p > 0.0);
        Self::new(sums)
    }
}
