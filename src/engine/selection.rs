//! # Measurement Selection
//!
//! Chooses which nodes to measure next, under a budget, to maximize the
//! expected number of nodes whose color becomes certain.
//!
//! ## Key Components
//!
//! - **evaluate_efficiency**: scores one candidate against an ensemble of
//!   scenarios by branching every scenario on the candidate's plausible
//!   colors and counting the certainty each branch would unlock
//! - **greedy_measurements**: the submodular greedy loop with a cached
//!   marginal-gain ordering and an optional lazy short-circuit
//! - **random_measurements**: the uniform-random baseline used to
//!   quantify the greedy algorithm's advantage
//!
//! ## Laziness
//!
//! Candidates are kept sorted descending by their cached marginal gain
//! from the previous round; this ordering is a loop invariant (asserted in
//! debug builds). Because gains only shrink as the selection grows
//! (submodularity), a candidate whose stale cached bound is already beaten
//! cannot become this round's best, so evaluation can stop early. The
//! bound the short-circuit compares against is configurable via
//! [`LazyBound`].
//!
//! All of this is hypothetical exploration: every entry point restores the
//! graph's own coloring before returning, so the graph stays authoritative
//! outside the search.

use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::engine::errors::GraphError;
use crate::engine::graph::{NodeId, RoutingGraph};
use crate::engine::scenario::{Ensemble, Scenario};

/// Cached marginal gain assigned to never-evaluated candidates. Large
/// enough to force a full evaluation sweep in the first greedy round.
pub const INITIAL_GAIN: f64 = 100_000.0;

/// Which reference gain the lazy short-circuit compares the next
/// candidate's stale bound against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyBound {
    /// Stop once the next cached bound no longer exceeds the best gain
    /// observed so far this round. The tight rule: dominates
    /// `LastEvaluated` under submodularity.
    BestThisRound,
    /// Stop once the next cached bound no longer exceeds the gain of the
    /// candidate evaluated last. Looser; stops earlier only when the last
    /// evaluation was also the running best.
    LastEvaluated,
}

/// Tuning knobs for efficiency evaluation and the greedy loop.
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Enables the lazy short-circuit in the greedy loop.
    pub lazy: bool,
    /// Reference gain used by the short-circuit.
    pub lazy_bound: LazyBound,
    /// Colors below this probability are not branched on, an
    /// accuracy/speed tradeoff. 0.0 branches on every plausible color.
    pub probability_threshold: f64,
    /// When set and smaller than the ensemble, each evaluation draws this
    /// many scenarios without replacement, proportionally to weight.
    pub sample_size: Option<usize>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            lazy: false,
            lazy_bound: LazyBound::BestThisRound,
            probability_threshold: 0.0,
            sample_size: None,
        }
    }
}

/// The scored outcome of evaluating one candidate node.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The branched ensemble that would result from measuring the node.
    pub ensemble: Ensemble,
    /// Expected number of certain nodes after the measurement.
    pub efficiency: f64,
}

/// The result of a measurement-selection run.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// Selected nodes, in measurement order.
    pub selected: Vec<NodeId>,
    /// Expected certain-node count before any measurement and after each
    /// one. Always one element longer than `selected`; non-decreasing for
    /// the greedy strategy.
    pub efficiencies: Vec<f64>,
}

/// Scores measuring `node` against `ensemble`.
///
/// For each (possibly sub-sampled) scenario: if the node is already
/// certain there, the scenario is carried forward unchanged and credits
/// its certain-node count; otherwise the scenario branches once per color
/// the node holds with probability at or above the threshold: the color
/// is forced via the certain-color cascade, the resulting certain count is
/// credited with weight `color probability x scenario weight`, and the
/// branch joins the output ensemble with that weight.
///
/// The graph's own coloring is untouched on return.
///
/// # Errors
///
/// [`GraphError::NoColor`] if the node is uncolored in a scenario, plus
/// anything the cascade itself can raise.
pub fn evaluate_efficiency<R: Rng + ?Sized>(
    graph: &mut RoutingGraph,
    node: NodeId,
    ensemble: &Ensemble,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<Evaluation, GraphError> {
    let saved = graph.coloring();
    let result = evaluate_branches(graph, node, ensemble, config, rng);
    graph.install_coloring(saved);
    result
}

fn evaluate_branches<R: Rng + ?Sized>(
    graph: &mut RoutingGraph,
    node: NodeId,
    ensemble: &Ensemble,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<Evaluation, GraphError> {
    let working_set = ensemble.sample(config.sample_size, rng)?;

    let mut branched: Vec<Scenario> = Vec::new();
    let mut efficiency = 0.0;

    for (scenario, weight) in working_set {
        graph.install_coloring(scenario.colors.clone());

        if graph.has_certain_color(node) {
            // Measuring a node that is already certain in this scenario
            // reveals nothing; carry the scenario forward unchanged.
            efficiency += graph.certain_node_count() as f64 * weight;
            branched.push(Scenario::new(scenario.colors.clone(), weight));
            continue;
        }

        let plausible: Vec<(NodeId, f64)> = graph.color(node)?.iter().collect();
        for (color, prob) in plausible {
            if prob < config.probability_threshold {
                continue;
            }
            // Fresh copy per branch: branches must never share state.
            graph.install_coloring(scenario.colors.clone());
            graph.propagate_certain_color(node, color)?;

            let certain = graph.certain_node_count() as f64;
            efficiency += certain * prob * weight;
            branched.push(Scenario::new(graph.coloring(), prob * weight));
        }
    }

    Ok(Evaluation {
        ensemble: Ensemble::from_branches(branched),
        efficiency,
    })
}

/// Greedily selects `budget` nodes maximizing expected certain-node count.
///
/// Seeds every candidate's cached marginal gain with [`INITIAL_GAIN`] so
/// the first round evaluates everything, then repeatedly picks the best
/// candidate, commits its branched ensemble (with one forward refresh per
/// retained scenario), updates the gain cache, and re-sorts the remaining
/// pool descending by cached gain.
///
/// Returns the ordered selection and the efficiency trace; the graph's own
/// coloring is untouched on return.
///
/// # Errors
///
/// [`GraphError::BudgetExceedsCandidates`] when `budget` is larger than
/// the candidate pool, plus anything evaluation can raise.
pub fn greedy_measurements<R: Rng + ?Sized>(
    graph: &mut RoutingGraph,
    candidates: &[NodeId],
    budget: usize,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<SelectionOutcome, GraphError> {
    if budget > candidates.len() {
        return Err(GraphError::BudgetExceedsCandidates {
            budget,
            candidates: candidates.len(),
        });
    }

    let saved = graph.coloring();
    let result = run_greedy(graph, candidates, budget, config, rng);
    graph.install_coloring(saved);
    result
}

fn run_greedy<R: Rng + ?Sized>(
    graph: &mut RoutingGraph,
    candidates: &[NodeId],
    budget: usize,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<SelectionOutcome, GraphError> {
    let mut pool: Vec<NodeId> = candidates.to_vec();
    let mut gains: FxHashMap<NodeId, f64> =
        pool.iter().map(|node| (*node, INITIAL_GAIN)).collect();

    let mut ensemble = Ensemble::from_graph(graph);
    let mut current_efficiency = graph.certain_node_count() as f64;

    let mut selected = Vec::with_capacity(budget);
    let mut efficiencies = vec![current_efficiency];

    while selected.len() < budget {
        debug_assert!(
            pool.windows(2).all(|w| gains[&w[0]] >= gains[&w[1]]),
            "candidate pool must stay sorted descending by cached gain"
        );

        let (best, evaluation, evaluated) =
            pick_next(graph, &pool, &gains, &ensemble, current_efficiency, config, rng)?;

        // Commit: adopt the winner's branched ensemble, letting every
        // retained scenario's probabilistic tail catch up with the newly
        // certain nodes.
        let mut committed = Vec::with_capacity(evaluation.ensemble.len());
        for scenario in evaluation.ensemble.scenarios() {
            graph.install_coloring(scenario.colors.clone());
            graph.refresh_forward()?;
            committed.push(Scenario::new(graph.coloring(), scenario.weight));
        }
        ensemble = Ensemble::from_branches(committed);

        for (node, efficiency) in evaluated {
            gains.insert(node, efficiency - current_efficiency);
        }
        gains.remove(&best);
        current_efficiency = evaluation.efficiency;

        pool.retain(|node| *node != best);
        pool.sort_by(|a, b| {
            gains[b]
                .partial_cmp(&gains[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });

        selected.push(best);
        efficiencies.push(current_efficiency);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "greedy round {}: selected {:?}, efficiency {:.3}",
            selected.len(),
            best,
            current_efficiency
        );
    }

    Ok(SelectionOutcome {
        selected,
        efficiencies,
    })
}

/// Evaluates candidates in cached-gain order and returns the best one,
/// its evaluation, and the `(node, efficiency)` pairs of everything that
/// was evaluated this round.
fn pick_next<R: Rng + ?Sized>(
    graph: &mut RoutingGraph,
    pool: &[NodeId],
    gains: &FxHashMap<NodeId, f64>,
    ensemble: &Ensemble,
    current_efficiency: f64,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<(NodeId, Evaluation, Vec<(NodeId, f64)>), GraphError> {
    let mut best: Option<(usize, Evaluation)> = None;
    let mut evaluated: Vec<(NodeId, f64)> = Vec::new();
    let mut last_gain = f64::NEG_INFINITY;
    let mut best_gain = f64::NEG_INFINITY;

    for (index, &candidate) in pool.iter().enumerate() {
        let evaluation = evaluate_efficiency(graph, candidate, ensemble, config, rng)?;
        evaluated.push((candidate, evaluation.efficiency));

        last_gain = evaluation.efficiency - current_efficiency;
        best_gain = best_gain.max(last_gain);
        let is_best = best
            .as_ref()
            .map_or(true, |(_, current)| evaluation.efficiency > current.efficiency);
        if is_best {
            best = Some((index, evaluation));
        }

        if config.lazy && index + 1 < pool.len() {
            let next_bound = gains[&pool[index + 1]];
            let reference = match config.lazy_bound {
                LazyBound::BestThisRound => best_gain,
                LazyBound::LastEvaluated => last_gain,
            };
            // The next candidate's stale bound is an upper bound on its
            // true gain; once beaten, no unevaluated candidate can win.
            if reference > next_bound {
                break;
            }
        }
    }

    let (index, evaluation) = best.expect("pool is non-empty when budget remains");
    Ok((pool[index], evaluation, evaluated))
}

/// Uniform-random baseline: selects `budget` candidates without
/// replacement and applies the efficiency evaluation sequentially in that
/// fixed order (no lazy skipping).
///
/// # Errors
///
/// [`GraphError::BudgetExceedsCandidates`] when `budget` is larger than
/// the candidate pool, plus anything evaluation can raise.
pub fn random_measurements<R: Rng + ?Sized>(
    graph: &mut RoutingGraph,
    candidates: &[NodeId],
    budget: usize,
    config: &SelectionConfig,
    rng: &mut R,
) -> Result<SelectionOutcome, GraphError> {
    if budget > candidates.len() {
        return Err(GraphError::BudgetExceedsCandidates {
            budget,
            candidates: candidates.len(),
        });
    }

    let selected: Vec<NodeId> = candidates.choose_multiple(rng, budget).copied().collect();

    let mut ensemble = Ensemble::from_graph(graph);
    let mut efficiencies = vec![graph.certain_node_count() as f64];

    for &node in &selected {
        let evaluation = evaluate_efficiency(graph, node, &ensemble, config, rng)?;
        efficiencies.push(evaluation.efficiency);
        ensemble = evaluation.ensemble;
    }

    Ok(SelectionOutcome {
        selected,
        efficiencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const R1: NodeId = NodeId(1);
    const R2: NodeId = NodeId(2);

    /// Roots 1 and 2; node 3 mixes them; 3 feeds a chain 4 -> 5; root 2
    /// also feeds a private tail 6.
    fn test_graph() -> RoutingGraph {
        let mut g = RoutingGraph::from_edges([
            (R1, NodeId(3), None),
            (R2, NodeId(3), None),
            (NodeId(3), NodeId(4), None),
            (NodeId(4), NodeId(5), None),
            (R2, NodeId(6), None),
        ]);
        g.set_probabilistic_coloring(&[R1, R2]).unwrap();
        g
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(1234)
    }

    // ============================================================================
    // evaluate_efficiency
    // ============================================================================

    #[test]
    fn evaluate_branches_on_plausible_colors() {
        let mut g = test_graph();
        let ensemble = Ensemble::from_graph(&g);
        let config = SelectionConfig::default();

        let evaluation =
            evaluate_efficiency(&mut g, NodeId(4), &ensemble, &config, &mut rng()).unwrap();

        // Node 4 holds {R1: 0.5, R2: 0.5}: two branches, each forcing the
        // chain 3-4-5 certain. Node 6 is certain (sole predecessor is a
        // root) from initialization, so each branch has 3 + 3 = 6 certain
        // nodes; expectation = 6.
        assert_eq!(evaluation.ensemble.len(), 2);
        assert!((evaluation.efficiency - 6.0).abs() < 1e-9);
        let weights: Vec<f64> = evaluation
            .ensemble
            .scenarios()
            .iter()
            .map(|s| s.weight)
            .collect();
        assert!((weights[0] - 0.5).abs() < 1e-12);
        assert!((weights[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn evaluate_carries_already_certain_nodes_unchanged() {
        let mut g = test_graph();
        let ensemble = Ensemble::from_graph(&g);
        let config = SelectionConfig::default();

        // Node 6 is already certain for R2 in every scenario.
        let evaluation =
            evaluate_efficiency(&mut g, NodeId(6), &ensemble, &config, &mut rng()).unwrap();
        assert_eq!(evaluation.ensemble.len(), 1);
        // Certain nodes: the two roots and node 6.
        assert!((evaluation.efficiency - 3.0).abs() < 1e-9);
    }

    #[test]
    fn evaluate_restores_graph_coloring() {
        let mut g = test_graph();
        let before = g.coloring();
        let ensemble = Ensemble::from_graph(&g);
        let config = SelectionConfig::default();

        evaluate_efficiency(&mut g, NodeId(4), &ensemble, &config, &mut rng()).unwrap();
        assert_eq!(g.coloring(), before);
    }

    #[test]
    fn evaluate_prunes_branches_below_threshold() {
        let mut g = test_graph();
        let ensemble = Ensemble::from_graph(&g);
        let config = SelectionConfig {
            probability_threshold: 0.6,
            ..SelectionConfig::default()
        };

        // Both of node 4's colors sit at 0.5 < 0.6, so nothing branches.
        let evaluation =
            evaluate_efficiency(&mut g, NodeId(4), &ensemble, &config, &mut rng()).unwrap();
        assert!(evaluation.ensemble.is_empty());
        assert_eq!(evaluation.efficiency, 0.0);
    }

    #[test]
    fn evaluate_errors_on_uncolored_node() {
        let mut g = RoutingGraph::from_edges([(R1, NodeId(3), None)]);
        let ensemble = Ensemble::from_graph(&g);
        let config = SelectionConfig::default();
        assert!(matches!(
            evaluate_efficiency(&mut g, NodeId(3), &ensemble, &config, &mut rng()),
            Err(GraphError::NoColor { node: NodeId(3) })
        ));
    }

    // ============================================================================
    // greedy_measurements
    // ============================================================================

    #[test]
    fn greedy_trace_is_non_decreasing() {
        let mut g = test_graph();
        let candidates = [NodeId(3), NodeId(4), NodeId(5)];
        let config = SelectionConfig::default();

        let outcome =
            greedy_measurements(&mut g, &candidates, 3, &config, &mut rng()).unwrap();

        assert_eq!(outcome.selected.len(), 3);
        assert_eq!(outcome.efficiencies.len(), 4);
        assert!(outcome
            .efficiencies
            .windows(2)
            .all(|w| w[1] >= w[0] - 1e-9));
    }

    #[test]
    fn greedy_is_deterministic_without_sampling() {
        let candidates = [NodeId(3), NodeId(4), NodeId(5)];
        let config = SelectionConfig::default();

        let mut first = test_graph();
        let a = greedy_measurements(&mut first, &candidates, 3, &config, &mut rng()).unwrap();
        let mut second = test_graph();
        let b = greedy_measurements(&mut second, &candidates, 3, &config, &mut rng()).unwrap();

        assert_eq!(a.selected, b.selected);
        assert_eq!(a.efficiencies, b.efficiencies);
    }

    #[test]
    fn greedy_lazy_matches_eager_selection() {
        let candidates = [NodeId(3), NodeId(4), NodeId(5), NodeId(6)];
        let eager = SelectionConfig::default();
        let lazy = SelectionConfig {
            lazy: true,
            ..SelectionConfig::default()
        };

        let mut g1 = test_graph();
        let a = greedy_measurements(&mut g1, &candidates, 4, &eager, &mut rng()).unwrap();
        let mut g2 = test_graph();
        let b = greedy_measurements(&mut g2, &candidates, 4, &lazy, &mut rng()).unwrap();

        assert_eq!(a.selected, b.selected);
        for (x, y) in a.efficiencies.iter().zip(&b.efficiencies) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn greedy_lazy_last_evaluated_bound_also_matches() {
        let candidates = [NodeId(3), NodeId(4), NodeId(5), NodeId(6)];
        let eager = SelectionConfig::default();
        let lazy = SelectionConfig {
            lazy: true,
            lazy_bound: LazyBound::LastEvaluated,
            ..SelectionConfig::default()
        };

        let mut g1 = test_graph();
        let a = greedy_measurements(&mut g1, &candidates, 2, &eager, &mut rng()).unwrap();
        let mut g2 = test_graph();
        let b = greedy_measurements(&mut g2, &candidates, 2, &lazy, &mut rng()).unwrap();

        assert_eq!(a.selected, b.selected);
    }

    #[test]
    fn greedy_rejects_budget_beyond_candidates() {
        let mut g = test_graph();
        let config = SelectionConfig::default();
        assert!(matches!(
            greedy_measurements(&mut g, &[NodeId(3)], 2, &config, &mut rng()),
            Err(GraphError::BudgetExceedsCandidates {
                budget: 2,
                candidates: 1
            })
        ));
    }

    #[test]
    fn greedy_restores_graph_coloring() {
        let mut g = test_graph();
        let before = g.coloring();
        let config = SelectionConfig::default();

        greedy_measurements(&mut g, &[NodeId(3), NodeId(4)], 2, &config, &mut rng()).unwrap();
        assert_eq!(g.coloring(), before);
    }

    // ============================================================================
    // random_measurements
    // ============================================================================

    #[test]
    fn random_with_zero_budget_reports_initial_state() {
        let mut g = test_graph();
        let config = SelectionConfig::default();

        let outcome =
            random_measurements(&mut g, &[NodeId(3), NodeId(4)], 0, &config, &mut rng()).unwrap();

        assert!(outcome.selected.is_empty());
        // Certain from initialization: the two roots and node 6.
        assert_eq!(outcome.efficiencies, vec![3.0]);
    }

    #[test]
    fn random_selects_budget_nodes_and_traces_each_step() {
        let mut g = test_graph();
        let config = SelectionConfig::default();
        let candidates = [NodeId(3), NodeId(4), NodeId(5)];

        let outcome =
            random_measurements(&mut g, &candidates, 2, &config, &mut rng()).unwrap();

        assert_eq!(outcome.selected.len(), 2);
        assert_eq!(outcome.efficiencies.len(), 3);
        for node in &outcome.selected {
            assert!(candidates.contains(node));
        }
    }

    #[test]
    fn random_rejects_budget_beyond_candidates() {
        let mut g = test_graph();
        let config = SelectionConfig::default();
        assert!(random_measurements(&mut g, &[NodeId(3)], 5, &config, &mut rng()).is_err());
    }
}
