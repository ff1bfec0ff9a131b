//! Graph-set maintenance over real built graphs: dedup idempotence, score
//! ordering, overlap merging, and the loop-initializer pruning invariant.

use vecgraph_ir::features::anchor::AnchorFinder;
use vecgraph_ir::features::compute_graph::{
    ComputeEdgeKind, ComputeGraphBuilder, ComputeGraphSet, ComputeNodeKind,
};
use vecgraph_ir::features::cpg::CpgContext;
use vecgraph_ir::frontend::parser::parse_translation_unit;

fn analyzed(src: &str) -> CpgContext {
    let tu = parse_translation_unit(src, "set_test.c").unwrap();
    CpgContext::build_full(tu)
}

fn build_all(ctx: &CpgContext) -> ComputeGraphSet {
    let finder = AnchorFinder::new(ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    let mut builder = ComputeGraphBuilder::new(ctx);
    let mut set = ComputeGraphSet::new();
    for anchor in &anchors {
        let graph = builder.build_from_anchor(anchor);
        if !graph.is_empty() {
            set.add_graph(graph);
        }
    }
    set
}

const TWO_KERNELS: &str = "\
void add(int *c, const int *a, const int *b, int n) {
    for (int i = 0; i < n; ++i) {
        c[i] = a[i] + b[i];
    }
}
void shift(int *c, const int *a, int n) {
    for (int i = 0; i < n; ++i) {
        c[i] = a[i] << 2;
    }
}
";

#[test]
fn deduplicate_is_idempotent_on_built_graphs() {
    let ctx = analyzed(TWO_KERNELS);
    let mut set = build_all(&ctx);
    set.deduplicate();
    let first: Vec<String> = set.graphs().iter().map(|g| g.name().to_string()).collect();
    set.deduplicate();
    let second: Vec<String> = set.graphs().iter().map(|g| g.name().to_string()).collect();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn sort_by_score_orders_descending() {
    let ctx = analyzed(TWO_KERNELS);
    let mut set = build_all(&ctx);
    set.deduplicate();
    set.sort_by_score();
    let scores: Vec<i64> = set.graphs().iter().map(|g| g.score()).collect();
    for window in scores.windows(2) {
        assert!(window[0] >= window[1], "scores must descend: {scores:?}");
    }
}

#[test]
fn graphs_from_one_loop_merge_by_overlap() {
    // Two anchors over the same statements end up in one merged graph.
    let src = "\
void both(int *c, const int *a, int n) {
    int base = n * 4;
    for (int i = 0; i < n; ++i) {
        c[i] = a[i] * base;
    }
}
";
    let ctx = analyzed(src);
    let mut set = build_all(&ctx);
    let before = set.len();
    set.deduplicate();
    set.merge_overlapping();
    assert!(set.len() <= before);
    // No two surviving graphs share a statement.
    let graphs = set.graphs();
    for i in 0..graphs.len() {
        for j in (i + 1)..graphs.len() {
            assert!(!vecgraph_ir::features::compute_graph::graphs_overlap(
                &graphs[i], &graphs[j]
            ));
        }
    }
}

#[test]
fn loop_initializer_feeds_only_the_loop() {
    // The while-loop variable is initialized one statement earlier in the
    // same scope, so the initializer node lands in the graph and must be
    // rewired to feed the Loop node exclusively.
    let src = "\
void countup(int *a, int n) {
    int i = 0;
    while (i < n)
        i = i + 2;
    a[0] = n * 3;
}
";
    let ctx = analyzed(src);
    let finder = AnchorFinder::new(&ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    let anchor = anchors
        .iter()
        .find(|a| a.source_line == 4)
        .expect("i = i + 2 is the in-loop anchor")
        .clone();

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_anchor(&anchor);

    let init = graph
        .nodes()
        .find(|n| n.property("is_loop_var_init") == "true")
        .expect("the external initializer is in the graph");
    assert_eq!(init.name, "i");

    let loop_node = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::Loop)
        .expect("loop node");

    let outgoing: Vec<_> = graph
        .outgoing_edges(init.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::DataFlow)
        .collect();
    assert_eq!(
        outgoing.len(),
        1,
        "the initializer keeps exactly one outgoing DataFlow edge"
    );
    assert_eq!(outgoing[0].target_id, loop_node.id);
    assert_eq!(outgoing[0].label, "init:i");
}
