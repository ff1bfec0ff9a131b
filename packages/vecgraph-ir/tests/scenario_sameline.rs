//! Same-line sequence: `len++; if (ref[len] == 0) ...` — the preceding
//! statement must be built before the anchor, and the subscript depends on
//! the incremented value.

use vecgraph_ir::features::anchor::AnchorFinder;
use vecgraph_ir::features::compute_graph::{
    ComputeEdgeKind, ComputeGraph, ComputeGraphBuilder, ComputeNodeKind,
};
use vecgraph_ir::features::cpg::CpgContext;
use vecgraph_ir::frontend::parser::parse_translation_unit;
use vecgraph_ir::shared::models::OpCode;

const SOURCE: &str = "\
void mark(const int *ref, int *out, int k, int len) {
    len++; if (ref[len] == 0) out[k] = 1;
}
";

fn build() -> (CpgContext, ComputeGraph) {
    let tu = parse_translation_unit(SOURCE, "mark.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let finder = AnchorFinder::new(&ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    let anchor = anchors
        .iter()
        .find(|a| a.op_code == OpCode::Eq)
        .expect("the comparison inside the if condition is an anchor")
        .clone();

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_anchor(&anchor);
    (ctx, graph)
}

#[test]
fn increment_is_built_before_the_branch() {
    let (_, graph) = build();
    let increment = graph
        .nodes()
        .find(|n| n.property("is_increment") == "true" && n.property("increment_var") == "len")
        .expect("len++ node");
    assert_eq!(increment.name, "len+=1");
    assert_eq!(increment.property("original_form"), "post_inc");

    let branch = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::Branch)
        .expect("if branch node");
    assert!(
        increment.id < branch.id,
        "the preceding-statements pass must create len++ (n{}) before the if (n{})",
        increment.id,
        branch.id
    );
}

#[test]
fn subscript_depends_on_the_increment() {
    let (_, graph) = build();
    let increment = graph
        .nodes()
        .find(|n| n.property("is_increment") == "true" && n.property("increment_var") == "len")
        .unwrap();

    // The post-increment value flows into the `len` read used by ref[len].
    let fed: Vec<_> = graph
        .outgoing_edges(increment.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::DataFlow && e.label == "len")
        .collect();
    assert!(
        !fed.is_empty(),
        "expected a DataFlow edge labelled `len` out of len++"
    );
    for edge in fed {
        assert_eq!(graph.node(edge.target_id).unwrap().name, "len");
    }
}

#[test]
fn branch_condition_is_wired() {
    let (_, graph) = build();
    let branch = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::Branch)
        .unwrap();
    let condition_sources: Vec<_> = graph
        .incoming_edges(branch.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::Control && e.label == "condition")
        .collect();
    assert_eq!(condition_sources.len(), 1);
    let cond = graph.node(condition_sources[0].source_id).unwrap();
    assert_eq!(cond.kind, ComputeNodeKind::CompareOp);
    assert_eq!(cond.op_code, OpCode::Eq);
}
