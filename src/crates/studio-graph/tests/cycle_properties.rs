//! Property tests for dependency cycle detection
//!
//! Two invariants: no acyclic graph is ever rejected, and every graph with
//! an introduced back edge is flagged with a path that names the
//! participating ids.

use proptest::prelude::*;
use serde_json::json;
use studio_graph::{detect_cycle, WorkflowStep};

/// Build task steps where step i may only depend on steps < i (acyclic by
/// construction)
fn forward_dag(edges: &[(usize, usize)], count: usize) -> Vec<WorkflowStep> {
    let steps: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            let deps: Vec<String> = edges
                .iter()
                .filter(|(to, _)| *to == i)
                .map(|(_, from)| format!("s{from}"))
                .collect();
            json!({
                "type": "task",
                "id": format!("s{i}"),
                "role": "developer",
                "task": "t",
                "deps": deps
            })
        })
        .collect();
    serde_json::from_value(json!(steps)).unwrap()
}

proptest! {
    #[test]
    fn acyclic_graphs_are_never_rejected(
        count in 1usize..12,
        raw_edges in prop::collection::vec((0usize..12, 0usize..12), 0..30),
    ) {
        // Keep only forward edges (dep index < step index)
        let edges: Vec<(usize, usize)> = raw_edges
            .into_iter()
            .filter(|(to, from)| from < to && *to < count)
            .collect();

        let steps = forward_dag(&edges, count);
        prop_assert!(detect_cycle(&steps).is_none());
    }

    #[test]
    fn introduced_back_edge_is_always_flagged(
        count in 2usize..10,
        chain_len in 2usize..10,
    ) {
        let chain_len = chain_len.min(count);

        // A dependency chain s0 <- s1 <- ... <- s{chain_len-1}
        let mut edges: Vec<(usize, usize)> = (1..chain_len).map(|i| (i, i - 1)).collect();
        // Close the cycle: s0 depends on the end of the chain
        edges.push((0, chain_len - 1));

        let steps = forward_dag(&edges, count);
        let cycle = detect_cycle(&steps);
        prop_assert!(cycle.is_some());

        let cycle = cycle.unwrap();
        // The reported path closes on itself and stays within the chain
        prop_assert_eq!(cycle.first(), cycle.last());
        for id in &cycle {
            let index: usize = id.trim_start_matches('s').parse().unwrap();
            prop_assert!(index < chain_len);
        }
    }
}
