//! End-to-end scenarios for the three sparsifier strategies

use ruvector_sparsifier::prelude::*;
use ruvector_sparsifier::{FlowMethod, SubsetMask};

const TOL: f64 = 1e-9;

/// s=0, a=1, b=2, t=3
fn diamond() -> Graph {
    load_graph(
        [0, 1, 2, 3],
        [(0, 1, 2.0), (0, 2, 2.0), (1, 3, 2.0), (2, 3, 2.0), (1, 2, 1.0)],
        [0, 3],
    )
    .unwrap()
}

/// A=1 B=2 C=3 D=4 E=5, terminals A and E
fn path_with_shortcut() -> Graph {
    load_graph(
        [1, 2, 3, 4, 5],
        [(1, 2, 3.0), (2, 3, 3.0), (3, 4, 3.0), (4, 5, 3.0), (1, 4, 1.0)],
        [1, 5],
    )
    .unwrap()
}

fn original_cut(graph: &Graph, mask: SubsetMask) -> f64 {
    MinCutEngine::default()
        .min_cut_separating_subset(graph, mask)
        .unwrap()
        .value()
}

#[test]
fn test_diamond_min_cut() {
    let g = diamond();
    let cut = MinCutEngine::default().min_cut_between(&g, 0, 3).unwrap();
    assert!((cut.value() - 4.0).abs() < TOL);
    assert!(cut.contains(0));
    assert!(!cut.contains(3));
}

#[test]
fn test_diamond_every_kind() {
    let g = diamond();
    let config = SparsifierConfig::default();
    let engine = MinCutEngine::default();

    for kind in SparsifierKind::ALL {
        let result = build_sparsifier(kind, &g, &config).unwrap();
        assert_eq!(result.kind(), kind);
        assert_eq!(result.num_vertices(), 2, "{kind}");
        assert_eq!(result.num_edges(), 1, "{kind}");
        assert_eq!(result.terminal_image(), &[0, 1]);
        assert_eq!(result.graph().vertex_ids(), &[0, 3]);
        let cut = result.pair_cut(&engine, 0, 1).unwrap();
        assert!((cut.value() - 4.0).abs() < TOL, "{kind}");
        assert!(result.synthetic_edges().iter().all(|e| !e.inserted));
    }
}

#[test]
fn test_diamond_comparison() {
    let g = diamond();
    let report = compare(&g, &SparsifierKind::ALL, &SparsifierConfig::default()).unwrap();
    assert_eq!(report.num_vertices, 4);
    assert_eq!(report.num_edges, 5);
    assert_eq!(report.num_terminals, 2);

    let mimic = report.report(SparsifierKind::Mimic).unwrap();
    assert_eq!(mimic.samples, 2);
    assert!(mimic.max_distortion < TOL);
    assert!((mimic.compression_ratio - 0.2).abs() < TOL);
    assert_eq!(mimic.pairwise.pairs, 1);

    let cut = report.report(SparsifierKind::Cut).unwrap();
    assert_eq!(cut.distortion_bound, Some(1.0));
    assert!(cut.within_bound());
}

#[test]
fn test_dynamic_scenario() {
    let dynamic = DynamicSparsifier::new(
        path_with_shortcut(),
        SparsifierKind::ALL,
        SparsifierConfig::default(),
    )
    .unwrap();
    let engine = MinCutEngine::default();

    // A | B..E is the bottleneck: 3
    assert!((original_cut(&dynamic.snapshot(), 0b01) - 3.0).abs() < TOL);

    let v1 = dynamic.apply(&EdgeUpdate::insert(4, 5, 5.0)).unwrap();
    assert_eq!(v1.version(), 1);
    let v2 = dynamic.apply(&EdgeUpdate::delete(3, 4)).unwrap();
    assert_eq!(v2.version(), 2);
    assert_eq!(v2.num_edges(), 4);

    // after the delete only the shortcut A-D joins the two halves
    assert!((original_cut(&v2, 0b01) - 1.0).abs() < TOL);
    for kind in SparsifierKind::ALL {
        let result = dynamic.sparsifier(kind).unwrap();
        assert_eq!(result.metadata().source_version, 2);
        let value = result.pair_cut(&engine, 0, 1).unwrap().value();
        assert!((value - 1.0).abs() < TOL, "{kind}: {value}");
    }

    let report = dynamic.compare();
    assert_eq!(report.version, 2);
    for kind in SparsifierKind::ALL {
        assert!(report.report(kind).unwrap().max_distortion < TOL, "{kind}");
    }
}

#[test]
fn test_dynamic_concurrent_readers() {
    use std::sync::Arc;
    use std::thread;

    let dynamic = Arc::new(
        DynamicSparsifier::new(path_with_shortcut(), [SparsifierKind::Flow], SparsifierConfig::default())
            .unwrap(),
    );
    let snapshot = dynamic.snapshot();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let dynamic = Arc::clone(&dynamic);
            thread::spawn(move || {
                for _ in 0..10 {
                    let graph = dynamic.snapshot();
                    let flow = dynamic.sparsifier(SparsifierKind::Flow).unwrap();
                    assert!(flow.metadata().source_version <= 2);
                    assert!(graph.version() <= 2);
                }
            })
        })
        .collect();

    dynamic.apply(&EdgeUpdate::insert(4, 5, 5.0)).unwrap();
    dynamic.apply(&EdgeUpdate::delete(3, 4)).unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(snapshot.version(), 0);
    assert_eq!(dynamic.version(), 2);
}

#[test]
fn test_sampled_flow_is_reproducible() {
    let g = path_with_shortcut();
    let config = SparsifierConfig::default()
        .with_seed(7)
        .with_flow_method(FlowMethod::SampledTrees {
            samples: Some(4),
            jitter: 0.5,
        });
    let first = compare(&g, &[SparsifierKind::Flow], &config).unwrap();
    let second = compare(&g, &[SparsifierKind::Flow], &config).unwrap();
    let (a, b) = (
        first.report(SparsifierKind::Flow).unwrap(),
        second.report(SparsifierKind::Flow).unwrap(),
    );
    assert_eq!(a.vertex_count, 2);
    assert_eq!(a.edge_count, b.edge_count);
    assert_eq!(a.max_distortion, b.max_distortion);
    assert!(a.max_distortion.is_finite());
}

#[test]
fn test_disconnected_terminals() {
    let g = load_graph(
        [0, 1, 2, 3],
        [(0, 1, 2.0), (2, 3, 2.0)],
        [0, 2],
    )
    .unwrap();
    let report = compare(&g, &SparsifierKind::ALL, &SparsifierConfig::default()).unwrap();
    for kind in SparsifierKind::ALL {
        let r = report.report(kind).unwrap();
        assert_eq!(r.max_distortion, 0.0, "{kind}");
    }

    let cut = build_sparsifier(SparsifierKind::Cut, &g, &SparsifierConfig::default()).unwrap();
    assert_eq!(cut.synthetic_edges().len(), 1);
    assert!(!cut.synthetic_edges()[0].inserted);
}

#[test]
fn test_large_terminal_set_sampled() {
    // 14 terminals on a ring: 2^14 - 2 masks exceed the exhaustive limit
    let n = 14u64;
    let edges: Vec<_> = (0..n).map(|i| (i, (i + 1) % n, 1.0 + (i % 3) as f64)).collect();
    let g = load_graph(0..n, edges, 0..n).unwrap();
    let config = SparsifierConfig::default().with_sampling(1000, 64);
    let report = compare(&g, &[SparsifierKind::Flow, SparsifierKind::Mimic], &config).unwrap();
    assert!(matches!(report.selection, SubsetSelection::Sampled { .. }));
    let flow = report.report(SparsifierKind::Flow).unwrap();
    assert!(flow.samples <= 64);
    assert!(flow.samples > 0);
    assert!(report.report(SparsifierKind::Mimic).is_some());
}

#[test]
fn test_malformed_inputs() {
    assert!(matches!(
        load_graph([0, 1], [(0, 1, 0.0)], [0, 1]),
        Err(SparsifyError::MalformedGraph(_))
    ));
    assert!(matches!(
        load_graph([0, 1], [(0, 0, 1.0)], [0, 1]),
        Err(SparsifyError::MalformedGraph(_))
    ));
    assert!(matches!(
        load_graph([0, 1], [(0, 1, 1.0)], [0]),
        Err(SparsifyError::MalformedGraph(_))
    ));
    assert!(matches!(
        load_graph([0, 1], [(0, 2, 1.0)], [0, 1]),
        Err(SparsifyError::MalformedGraph(_))
    ));
}
