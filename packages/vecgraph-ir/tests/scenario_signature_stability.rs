//! Canonical-signature stability: two full rebuilds from identical source
//! produce identical signatures and identical DOT output.

use vecgraph_ir::features::anchor::AnchorFinder;
use vecgraph_ir::features::compute_graph::{ComputeGraph, ComputeGraphBuilder};
use vecgraph_ir::features::cpg::CpgContext;
use vecgraph_ir::features::viz;
use vecgraph_ir::frontend::parser::parse_translation_unit;

const SOURCE: &str = "\
void saxpy(float *y, const float *x, float a, int n) {
    for (int i = 0; i < n; ++i) {
        y[i] = a * x[i] + y[i];
    }
}
";

fn build_once() -> (CpgContext, ComputeGraph) {
    let tu = parse_translation_unit(SOURCE, "saxpy.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let finder = AnchorFinder::new(&ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_anchor(&anchors[0]);
    (ctx, graph)
}

#[test]
fn rebuild_preserves_canonical_signature() {
    let (_, first) = build_once();
    let (_, second) = build_once();
    assert_eq!(first.canonical_signature(), second.canonical_signature());
    assert!(first.is_isomorphic_to(&second));
}

#[test]
fn rebuild_preserves_dot_output() {
    let (ctx1, first) = build_once();
    let (ctx2, second) = build_once();
    assert_eq!(
        viz::compute_graph_to_dot(&first, &ctx1),
        viz::compute_graph_to_dot(&second, &ctx2)
    );
    assert_eq!(
        viz::compute_graph_to_dot_enhanced(&first, &ctx1),
        viz::compute_graph_to_dot_enhanced(&second, &ctx2)
    );
}

#[test]
fn node_ids_are_dense_and_start_at_one() {
    let (_, graph) = build_once();
    let ids = graph.node_ids();
    assert_eq!(ids[0], 1);
    for window in ids.windows(2) {
        assert_eq!(window[1], window[0] + 1, "node ids must be dense");
    }
}

#[test]
fn different_kernels_have_different_signatures() {
    let other_src = "\
void scale(float *y, float a, int n) {
    for (int i = 0; i < n; ++i) {
        y[i] = y[i] * a;
    }
}
";
    let (_, saxpy) = build_once();

    let tu = parse_translation_unit(other_src, "scale.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let finder = AnchorFinder::new(&ctx);
    let anchors = finder.filter_and_rank_anchors(&finder.find_all_anchors());
    let mut builder = ComputeGraphBuilder::new(&ctx);
    let scale = builder.build_from_anchor(&anchors[0]);

    assert_ne!(saxpy.canonical_signature(), scale.canonical_signature());
}
