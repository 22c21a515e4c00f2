//! Property tests for distribution invariants and coloring determinism.

use proptest::prelude::*;
use routecast::metrics::probabilistic_catchment;
use routecast::{NodeId, NodeQuery, RoutingGraph, DISTRIBUTION_EPSILON};

/// Builds an acyclic graph from arbitrary ordered pairs: every edge points
/// from a lower id to a higher id, so the result is a DAG by construction.
fn dag_from_pairs(pairs: &[(u32, u32)]) -> Option<RoutingGraph> {
    let mut graph = RoutingGraph::new();
    for &(a, b) in pairs {
        if a == b {
            continue;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        graph.add_edge(NodeId(lo), NodeId(hi), None);
    }
    if graph.node_count() == 0 {
        return None;
    }
    Some(graph)
}

/// Every node without predecessors acts as a root.
fn roots_of(graph: &RoutingGraph) -> Vec<NodeId> {
    graph
        .nodes()
        .into_iter()
        .filter(|node| graph.predecessors(*node).is_empty())
        .collect()
}

proptest! {
    #[test]
    fn coloring_keeps_every_distribution_normalized(
        pairs in prop::collection::vec((0u32..12, 0u32..12), 1..40)
    ) {
        let Some(mut graph) = dag_from_pairs(&pairs) else { return Ok(()); };
        let roots = roots_of(&graph);
        graph.set_probabilistic_coloring(&roots).unwrap();

        for node in graph.list_nodes(NodeQuery::colored(), None).unwrap() {
            let sum = graph.color(node).unwrap().sum();
            prop_assert!((sum - 1.0).abs() <= DISTRIBUTION_EPSILON,
                "node {:?} sums to {}", node, sum);
        }
    }

    #[test]
    fn probabilistic_mass_matches_colored_node_count(
        pairs in prop::collection::vec((0u32..12, 0u32..12), 1..40)
    ) {
        let Some(mut graph) = dag_from_pairs(&pairs) else { return Ok(()); };
        let roots = roots_of(&graph);
        graph.set_probabilistic_coloring(&roots).unwrap();

        let catchment = probabilistic_catchment(&graph, false, None).unwrap();
        let mass: f64 = catchment.values().sum();
        let colored = graph.count_nodes(NodeQuery::colored(), None).unwrap() as f64;
        prop_assert!((mass - colored).abs() < 1e-6,
            "mass {} vs {} colored nodes", mass, colored);
    }

    #[test]
    fn certain_count_never_exceeds_node_count(
        pairs in prop::collection::vec((0u32..12, 0u32..12), 1..40)
    ) {
        let Some(mut graph) = dag_from_pairs(&pairs) else { return Ok(()); };
        let roots = roots_of(&graph);
        graph.set_probabilistic_coloring(&roots).unwrap();
        prop_assert!(graph.certain_node_count() <= graph.node_count());
    }

    #[test]
    fn forcing_an_observed_color_never_contradicts(
        pairs in prop::collection::vec((0u32..10, 0u32..10), 1..30),
        pick in 0usize..64
    ) {
        let Some(mut graph) = dag_from_pairs(&pairs) else { return Ok(()); };
        let roots = roots_of(&graph);
        graph.set_probabilistic_coloring(&roots).unwrap();

        // Force some node to a color it already holds with positive
        // probability; the cascade must succeed and only grow certainty.
        let nodes = graph.nodes();
        let node = nodes[pick % nodes.len()];
        let Ok(color) = graph.color(node) else { return Ok(()); };
        let Some((root, _)) = color.iter().find(|(_, p)| *p > 0.0) else { return Ok(()); };

        let before = graph.certain_node_count();
        graph.propagate_certain_color(node, root).unwrap();
        prop_assert!(graph.certain_node_count() >= before);
        prop_assert_eq!(graph.certain_color(node).unwrap(), root);
    }
}
