//! # Scenarios and Ensembles
//!
//! A **scenario** is one complete hypothesized color state of the whole
//! graph, paired with the probability that it is the true one. An
//! **ensemble** of scenarios represents the outstanding uncertainty about
//! ground truth before the next measurement.
//!
//! Scenarios have value semantics: each one owns its color map outright,
//! and branching always clones before mutating. Two scenarios never alias
//! the same mutable color state: contradictory propagations in one branch
//! must not corrupt another. This copy-on-branch step dominates the
//! selection algorithm's memory cost and is a first-class invariant, not an
//! optimization detail.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::color::DISTRIBUTION_EPSILON;
use crate::engine::errors::GraphError;
use crate::engine::graph::{Coloring, RoutingGraph};

/// One hypothesized full-graph coloring with its probability.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scenario {
    /// The complete color state under this hypothesis. Independently
    /// owned; never shared with another scenario.
    pub colors: Coloring,
    /// Probability that this scenario is the true state.
    pub weight: f64,
}

impl Scenario {
    pub fn new(colors: Coloring, weight: f64) -> Self {
        Self { colors, weight }
    }
}

/// A weighted collection of scenarios.
///
/// Weights sum to 1 at explicit construction ([`Ensemble::new`],
/// [`Ensemble::from_graph`]). Branched ensembles produced during
/// efficiency evaluation may carry total weight below 1 when the
/// probability threshold prunes low-probability branches; those are
/// intermediate values and are not re-validated.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ensemble {
    scenarios: Vec<Scenario>,
}

impl Ensemble {
    /// Creates an ensemble, validating that the weights are non-negative
    /// and sum to 1 within [`DISTRIBUTION_EPSILON`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDistribution`] on invalid weights.
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, GraphError> {
        let sum: f64 = scenarios.iter().map(|s| s.weight).sum();
        if scenarios.iter().any(|s| !s.weight.is_finite() || s.weight < 0.0)
            || (sum - 1.0).abs() > DISTRIBUTION_EPSILON
        {
            return Err(GraphError::InvalidDistribution { node: None, sum });
        }
        Ok(Self { scenarios })
    }

    /// The degenerate ensemble: a single scenario holding the graph's
    /// current coloring with weight 1.
    pub fn from_graph(graph: &RoutingGraph) -> Self {
        Self {
            scenarios: vec![Scenario::new(graph.coloring(), 1.0)],
        }
    }

    /// Wraps branched scenarios without weight validation (the total may
    /// legitimately be below 1 after threshold pruning).
    pub(crate) fn from_branches(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Sum of scenario weights.
    pub fn total_weight(&self) -> f64 {
        self.scenarios.iter().map(|s| s.weight).sum()
    }

    /// Draws the working set for one efficiency evaluation.
    ///
    /// With `sample_size` unset, or at least as large as the ensemble, every
    /// scenario is returned with its own weight. Otherwise `sample_size`
    /// scenarios are drawn without replacement with probability
    /// proportional to weight, and the drawn weights are renormalized to
    /// sum to 1, an unbiased-estimator speedup for large ensembles.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDistribution`] if the weights cannot
    /// be sampled (all zero, or non-finite).
    pub fn sample<R: Rng + ?Sized>(
        &self,
        sample_size: Option<usize>,
        rng: &mut R,
    ) -> Result<Vec<(&Scenario, f64)>, GraphError> {
        let take = match sample_size {
            Some(n) if n < self.scenarios.len() => n,
            _ => {
                return Ok(self
                    .scenarios
                    .iter()
                    .map(|s| (s, s.weight))
                    .collect());
            }
        };

        let drawn: Vec<&Scenario> = self
            .scenarios
            .choose_multiple_weighted(rng, take, |s| s.weight)
            .map_err(|_| GraphError::InvalidDistribution {
                node: None,
                sum: self.total_weight(),
            })?
            .collect();

        let normalization: f64 = drawn.iter().map(|s| s.weight).sum();
        Ok(drawn
            .into_iter()
            .map(|s| (s, s.weight / normalization))
            .collect())
    }
}
