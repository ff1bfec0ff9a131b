//! Interprocedural inline: a call inside a loop pulls the callee body into
//! the caller's graph with parameter wiring, return edges and inherited
//! loop context.

use vecgraph_ir::features::anchor::AnchorFinder;
use vecgraph_ir::features::compute_graph::{
    ComputeEdgeKind, ComputeGraph, ComputeGraphBuilder, ComputeNodeKind,
};
use vecgraph_ir::features::cpg::CpgContext;
use vecgraph_ir::frontend::parser::parse_translation_unit;
use vecgraph_ir::shared::models::OpCode;

const SOURCE: &str = "\
int square(int x) {
    return x * x;
}
void apply(int *out, const int *a, int n) {
    for (int i = 0; i < n; ++i) {
        out[i] = square(a[i]);
    }
}
";

fn build() -> (CpgContext, ComputeGraph) {
    let tu = parse_translation_unit(SOURCE, "square.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let finder = AnchorFinder::new(&ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    let anchor = anchors
        .iter()
        .find(|a| a.source_line == 6)
        .expect("the assignment in the loop is an anchor")
        .clone();

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_anchor(&anchor);
    (ctx, graph)
}

fn call_node(graph: &ComputeGraph) -> &vecgraph_ir::features::compute_graph::ComputeNode {
    graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::Call && n.name == "square")
        .expect("call node for square")
}

#[test]
fn call_is_marked_analyzed() {
    let (_, graph) = build();
    let call = call_node(&graph);
    assert_eq!(call.property("callee_analyzed"), "true");
    assert_eq!(call.property("callee_name"), "square");
    assert!(!call.property("return_node").is_empty());
}

#[test]
fn formal_parameter_receives_the_argument() {
    let (_, graph) = build();
    let call = call_node(&graph);
    let formal = graph
        .nodes()
        .find(|n| {
            n.kind == ComputeNodeKind::Parameter
                && n.property("is_formal_param") == "true"
                && n.name == "x"
        })
        .expect("formal parameter node");
    assert_eq!(formal.property("call_site_id"), call.id.to_string());

    let incoming: Vec<_> = graph
        .incoming_edges(formal.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::Call)
        .collect();
    assert!(!incoming.is_empty(), "a Call edge feeds the formal");
    // The argument subtree is the caller's a[i].
    assert!(incoming
        .iter()
        .any(|e| graph.node(e.source_id).unwrap().name == "a[i]"));
}

#[test]
fn return_edge_connects_multiplication_to_call() {
    let (_, graph) = build();
    let call = call_node(&graph);
    let returns: Vec<_> = graph
        .incoming_edges(call.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::Return && e.label == "return")
        .collect();
    assert_eq!(returns.len(), 1);
    let source = graph.node(returns[0].source_id).unwrap();
    assert_eq!(source.kind, ComputeNodeKind::BinaryOp);
    assert_eq!(source.op_code, OpCode::Mul);
}

#[test]
fn inlined_nodes_inherit_loop_context() {
    let (_, graph) = build();
    let loop_node = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::Loop)
        .expect("loop node");

    let formal = graph
        .nodes()
        .find(|n| n.property("is_formal_param") == "true")
        .unwrap();
    assert_eq!(formal.loop_context_id, loop_node.id);
    assert_eq!(formal.loop_context_var, "i");

    // The callee's multiplication carries the caller's loop context too.
    let mul = graph
        .nodes()
        .find(|n| n.op_code == OpCode::Mul && n.source_line == 2)
        .expect("inlined x * x");
    assert_eq!(mul.loop_context_id, loop_node.id);
    assert_eq!(mul.property("call_site_id"), call_node(&graph).id.to_string());
}

#[test]
fn recursion_is_cut_off_silently() {
    let src = "\
int spin(int x) {
    return spin(x - 1) + 1;
}
void drive(int *out, int n) {
    for (int i = 0; i < n; ++i) {
        out[i] = spin(i) + i;
    }
}
";
    let tu = parse_translation_unit(src, "spin.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let finder = AnchorFinder::new(&ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    let anchor = anchors
        .iter()
        .find(|a| a.source_line == 6)
        .expect("anchor in drive")
        .clone();

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_anchor(&anchor);
    // The builder terminates and produces a graph; the self-recursive call
    // inside spin is not expanded a second time.
    assert!(!graph.is_empty());
}
