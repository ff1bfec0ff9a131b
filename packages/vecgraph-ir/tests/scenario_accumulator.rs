//! Simple accumulator: `sum += a[i] * b[i]` inside a counted loop.

use vecgraph_ir::features::anchor::AnchorFinder;
use vecgraph_ir::features::compute_graph::{
    ComputeEdgeKind, ComputeGraph, ComputeGraphBuilder, ComputeNodeKind,
};
use vecgraph_ir::features::cpg::CpgContext;
use vecgraph_ir::frontend::parser::parse_translation_unit;
use vecgraph_ir::shared::models::OpCode;

const SOURCE: &str = "\
float dot(const float *a, const float *b, int n) {
    float sum = 0.0f;
    for (int i = 0; i < n; ++i) {
        sum += a[i] * b[i];
    }
    return sum;
}
";

fn build() -> (CpgContext, ComputeGraph) {
    let tu = parse_translation_unit(SOURCE, "dot.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let finder = AnchorFinder::new(&ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    assert!(!anchors.is_empty());
    let anchor = anchors[0].clone();
    assert_eq!(anchor.source_line, 4);
    assert_eq!(anchor.score, 230);

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_anchor(&anchor);
    (ctx, graph)
}

#[test]
fn anchor_node_is_unique_and_marked() {
    let (_, graph) = build();
    let anchors: Vec<_> = graph
        .nodes()
        .filter(|n| n.property("is_anchor") == "true")
        .collect();
    assert_eq!(anchors.len(), 1);
    let anchor = anchors[0];
    assert_eq!(anchor.kind, ComputeNodeKind::BinaryOp);
    assert_eq!(anchor.op_code, OpCode::Add, "`+=` folds to Add");
    assert_eq!(anchor.source_line, 4);
}

#[test]
fn expected_nodes_exist() {
    let (_, graph) = build();
    assert!(graph
        .nodes()
        .any(|n| n.kind == ComputeNodeKind::Loop && n.name == "for"));
    assert!(graph
        .nodes()
        .any(|n| n.kind == ComputeNodeKind::ArrayAccess && n.name == "a[i]"));
    assert!(graph
        .nodes()
        .any(|n| n.kind == ComputeNodeKind::ArrayAccess && n.name == "b[i]"));
    assert!(graph
        .nodes()
        .any(|n| n.kind == ComputeNodeKind::BinaryOp && n.op_code == OpCode::Mul));
    // The accumulator initializer from line 2 gets pulled in backward.
    assert!(graph
        .nodes()
        .any(|n| n.name == "sum" && n.source_line == 2));
}

#[test]
fn multiplication_feeds_the_accumulation() {
    let (_, graph) = build();
    let mul = graph
        .nodes()
        .find(|n| n.op_code == OpCode::Mul)
        .expect("mul node");
    let anchor = graph
        .nodes()
        .find(|n| n.property("is_anchor") == "true")
        .unwrap();
    assert!(graph.outgoing_edges(mul.id).iter().any(|e| {
        e.target_id == anchor.id && e.kind == ComputeEdgeKind::DataFlow && e.label == "rhs"
    }));
}

#[test]
fn loop_wiring_is_present() {
    let (_, graph) = build();
    let loop_node = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::Loop)
        .expect("loop node");
    let anchor = graph
        .nodes()
        .find(|n| n.property("is_anchor") == "true")
        .unwrap();

    // Loop -> anchor control edge labelled loop_body.
    assert!(graph.outgoing_edges(loop_node.id).iter().any(|e| {
        e.target_id == anchor.id && e.kind == ComputeEdgeKind::Control && e.label == "loop_body"
    }));

    // Loop -> loop-variable DataFlow edge(s).
    let loop_var_targets: Vec<_> = graph
        .outgoing_edges(loop_node.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::DataFlow && e.label == "i")
        .collect();
    assert!(!loop_var_targets.is_empty());
    for edge in loop_var_targets {
        assert_eq!(graph.node(edge.target_id).unwrap().name, "i");
    }
}

#[test]
fn accumulator_has_loop_carried_back_edge() {
    let (_, graph) = build();
    assert!(graph
        .edges()
        .any(|e| e.kind == ComputeEdgeKind::LoopCarried && e.label.contains("sum")));
}

#[test]
fn loop_context_references_live_loop_node() {
    let (_, graph) = build();
    let loop_node = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::Loop)
        .unwrap();
    for node in graph.nodes() {
        if node.loop_context_id != 0 {
            assert_eq!(node.loop_context_id, loop_node.id);
            assert!(graph.node(node.loop_context_id).is_some());
            assert!(
                node.source_line >= 3 && node.source_line <= 5,
                "node {} at line {} outside the loop body range",
                node.id,
                node.source_line
            );
        }
    }
}

#[test]
fn topological_sort_is_a_valid_permutation() {
    let (_, graph) = build();
    let order = graph.topological_sort();
    assert_eq!(order.len(), graph.node_count());
    let mut sorted: Vec<u64> = order.clone();
    sorted.sort();
    assert_eq!(sorted, graph.node_ids());

    // Acyclic stretches respect the order: the multiplication precedes the
    // accumulation it feeds.
    let pos: std::collections::BTreeMap<u64, usize> =
        order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
    let mul = graph.nodes().find(|n| n.op_code == OpCode::Mul).unwrap();
    let anchor = graph
        .nodes()
        .find(|n| n.property("is_anchor") == "true")
        .unwrap();
    assert!(pos[&mul.id] < pos[&anchor.id]);
}
