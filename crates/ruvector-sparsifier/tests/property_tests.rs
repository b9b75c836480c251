//! Property-based tests using proptest
//!
//! Random small connected graphs, generated from a seed so that failures
//! shrink to a reproducible instance.

use proptest::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::Rng;
use ruvector_sparsifier::prelude::*;
use ruvector_sparsifier::subset::masks_by_popcount;
use ruvector_sparsifier::{CutSparsifierBuilder, MimickingNetworkBuilder};

const TOL: f64 = 1e-7;

/// Connected graph on `n` vertices with `k` terminals
///
/// A random spanning tree keeps it connected; `extra` further edges are
/// added between random pairs (parallel edges merge on load).
fn random_instance(n: usize, k: usize, extra: usize, seed: u64) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut edges = Vec::with_capacity(n - 1 + extra);
    for v in 1..n {
        let u = rng.gen_range(0..v);
        edges.push((u as u64, v as u64, rng.gen_range(1..=5) as f64));
    }
    for _ in 0..extra {
        let u = rng.gen_range(0..n);
        let v = rng.gen_range(0..n);
        if u != v {
            edges.push((u as u64, v as u64, rng.gen_range(1..=5) as f64));
        }
    }
    let mut ids: Vec<u64> = (0..n as u64).collect();
    ids.shuffle(&mut rng);
    let terminals: Vec<u64> = ids.into_iter().take(k).collect();
    load_graph(0..n as u64, edges, terminals).unwrap()
}

fn instance_strategy() -> impl Strategy<Value = Graph> {
    (4usize..9, 0usize..8, any::<u64>()).prop_flat_map(|(n, extra, seed)| {
        (2usize..=n.min(5)).prop_map(move |k| random_instance(n, k, extra, seed))
    })
}

fn config() -> SparsifierConfig {
    SparsifierConfig::default().with_parallel(false)
}

fn original_cuts(graph: &Graph) -> Vec<(u64, f64)> {
    let engine = MinCutEngine::default();
    masks_by_popcount(graph.terminals().len())
        .into_iter()
        .map(|mask| {
            let value = engine.min_cut_separating_subset(graph, mask).unwrap().value();
            (mask, value)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // Property: the mimicking network reproduces every terminal subset cut
    #[test]
    fn test_mimic_is_exact(graph in instance_strategy()) {
        let engine = MinCutEngine::default();
        let mimic = build_sparsifier(SparsifierKind::Mimic, &graph, &config()).unwrap();
        for (mask, original) in original_cuts(&graph) {
            let sparse = mimic.min_cut(&engine, mask).unwrap().value();
            prop_assert!(
                (original - sparse).abs() < TOL,
                "mask {:#b}: {} vs {}", mask, original, sparse
            );
        }
        let k = graph.terminals().len();
        prop_assert!(mimic.num_vertices() >= k);
        prop_assert!(mimic.num_vertices() <= graph.num_vertices());
        prop_assert_eq!(mimic.num_vertices(), k + mimic.steiner_vertices());
        if mimic.steiner_vertices() == 0 {
            prop_assert!(mimic.num_edges() <= MimickingNetworkBuilder::terminal_edge_bound(k));
        } else {
            prop_assert!(mimic.num_edges() <= graph.num_edges());
        }
    }

    // Property: the cut-tree flow sparsifier is exact on every terminal pair
    #[test]
    fn test_flow_pairwise_exact(graph in instance_strategy()) {
        let engine = MinCutEngine::default();
        let flow = build_sparsifier(SparsifierKind::Flow, &graph, &config()).unwrap();
        let terminals = graph.terminals().as_slice().to_vec();
        prop_assert_eq!(flow.num_vertices(), terminals.len());
        prop_assert!(flow.num_edges() < terminals.len());
        for i in 0..terminals.len() {
            for j in (i + 1)..terminals.len() {
                let original = engine.min_cut_between(&graph, terminals[i], terminals[j]).unwrap().value();
                let sparse = flow.pair_cut(&engine, i, j).unwrap().value();
                prop_assert!((original - sparse).abs() < TOL, "pair ({}, {})", i, j);
            }
        }
    }

    // Property: 0-extension cuts never under-estimate and the quotient stays connected
    #[test]
    fn test_cut_sparsifier_upper_bounds(graph in instance_strategy()) {
        let engine = MinCutEngine::default();
        let cut = build_sparsifier(SparsifierKind::Cut, &graph, &config()).unwrap();
        prop_assert_eq!(cut.num_vertices(), graph.terminals().len());
        prop_assert!(cut.graph().is_connected());
        prop_assert!(cut.synthetic_edges().iter().all(|e| !e.inserted));

        let map = cut.vertex_map().unwrap();
        for (pos, t) in graph.terminals().iter().enumerate() {
            prop_assert_eq!(map[t], pos);
        }
        for (mask, original) in original_cuts(&graph) {
            let sparse = cut.min_cut(&engine, mask).unwrap().value();
            prop_assert!(sparse >= original - TOL, "mask {:#b}: {} < {}", mask, sparse, original);
        }
    }

    // Property: every terminal pair stays within the documented 0-extension bound
    #[test]
    fn test_cut_sparsifier_pairs_within_bound(graph in instance_strategy()) {
        let config = config();
        let cut = build_sparsifier(SparsifierKind::Cut, &graph, &config).unwrap();
        let report = Evaluator::new(&graph, &config)
            .evaluate(&cut, SubsetSelection::All)
            .unwrap();
        let k = graph.terminals().len();
        let bound = CutSparsifierBuilder::distortion_bound(k);
        prop_assert_eq!(report.distortion_bound, Some(bound));
        prop_assert_eq!(report.pairwise.pairs, k * (k - 1) / 2);
        prop_assert!(
            report.within_bound(),
            "pairwise distortion {} above bound {}", report.pairwise.max_distortion, bound
        );
    }

    // Property: rebuilding from the same snapshot and seed gives the same network
    #[test]
    fn test_builds_are_deterministic(graph in instance_strategy(), seed in any::<u64>()) {
        let config = config().with_seed(seed);
        for kind in SparsifierKind::ALL {
            let first = build_sparsifier(kind, &graph, &config).unwrap();
            let second = build_sparsifier(kind, &graph, &config).unwrap();
            prop_assert_eq!(first.graph().vertex_ids(), second.graph().vertex_ids());
            prop_assert_eq!(first.graph().edges(), second.graph().edges());
        }
    }

    // Property: parallel and sequential comparisons agree
    #[test]
    fn test_parallel_matches_sequential(graph in instance_strategy()) {
        let sequential = compare(&graph, &SparsifierKind::ALL, &config()).unwrap();
        let parallel = compare(&graph, &SparsifierKind::ALL, &config().with_parallel(true)).unwrap();
        for kind in SparsifierKind::ALL {
            let (a, b) = (sequential.report(kind).unwrap(), parallel.report(kind).unwrap());
            prop_assert_eq!(a.edge_count, b.edge_count);
            prop_assert!((a.max_distortion - b.max_distortion).abs() < TOL);
        }
        prop_assert_eq!(sequential.best_tradeoff(), parallel.best_tradeoff());
    }

    // Property: inserting capacity never lowers a terminal cut
    #[test]
    fn test_insert_is_monotone(graph in instance_strategy(), extra in 1u32..5) {
        let terminals = graph.terminals().as_slice().to_vec();
        let (u, v) = (graph.vertex_id(terminals[0]), graph.vertex_id(terminals[1]));
        let next = apply_update(&graph, &EdgeUpdate::insert(u, v, extra as f64)).unwrap();
        prop_assert_eq!(next.version(), graph.version() + 1);
        let before = original_cuts(&graph);
        let after = original_cuts(&next);
        for ((mask, b), (_, a)) in before.iter().zip(&after) {
            prop_assert!(*a >= *b - TOL, "mask {:#b}", mask);
        }
    }
}
