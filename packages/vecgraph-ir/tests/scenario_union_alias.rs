//! Union aliasing: sibling members of one union instance are connected by
//! Memory edges, directed from the writing member to the reading one.

use vecgraph_ir::features::compute_graph::{
    ComputeEdgeKind, ComputeGraph, ComputeGraphBuilder, ComputeNodeKind,
};
use vecgraph_ir::features::cpg::CpgContext;
use vecgraph_ir::frontend::ast::StmtKind;
use vecgraph_ir::frontend::parser::parse_translation_unit;

const SOURCE: &str = "\
float reinterpret(void) {
    union U { int i; float f; } u;
    u.i = 0x3f800000;
    float v = u.f;
    return v;
}
";

fn build() -> (CpgContext, ComputeGraph) {
    let tu = parse_translation_unit(SOURCE, "reinterpret.c").unwrap();
    let ctx = CpgContext::build_full(tu);

    // Seed from the declaration reading the aliased member.
    let func = ctx.tu().find_function("reinterpret").unwrap();
    let body = ctx.tu().func(func).body.unwrap();
    let decl = ctx
        .tu()
        .collect_stmts(body)
        .into_iter()
        .find(|&s| {
            matches!(ctx.tu().stmt(s).kind, StmtKind::Decl { .. })
                && ctx.tu().text(s).contains("u.f")
        })
        .expect("float v = u.f");

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_expr(decl);
    (ctx, graph)
}

#[test]
fn both_members_are_union_marked() {
    let (_, graph) = build();
    let read = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::MemberAccess && n.name == "u.f")
        .expect("u.f node");
    let write = graph
        .nodes()
        .find(|n| n.kind == ComputeNodeKind::MemberAccess && n.name == "u.i")
        .expect("u.i node");

    for node in [read, write] {
        assert_eq!(node.property("is_union_member"), "true");
        assert_eq!(node.property("union_var"), "u");
    }
    assert_eq!(write.property("is_assign_target"), "true");
}

#[test]
fn memory_edge_is_directed_write_to_read() {
    let (_, graph) = build();
    let read = graph
        .nodes()
        .find(|n| n.name == "u.f")
        .unwrap();
    let write = graph
        .nodes()
        .find(|n| n.name == "u.i")
        .unwrap();

    let alias_edges: Vec<_> = graph
        .edges()
        .filter(|e| e.kind == ComputeEdgeKind::Memory)
        .collect();
    assert_eq!(alias_edges.len(), 1, "exactly one alias edge per pair");
    let edge = alias_edges[0];
    assert_eq!(edge.source_id, write.id, "the writer is the source");
    assert_eq!(edge.target_id, read.id);
    assert_eq!(edge.label, "union(i->f)");
}

#[test]
fn sibling_write_feeds_the_read_through_dataflow() {
    let (_, graph) = build();
    let read = graph.nodes().find(|n| n.name == "u.f").unwrap();
    let incoming = graph.incoming_edges(read.id);
    assert!(
        incoming
            .iter()
            .any(|e| e.kind == ComputeEdgeKind::DataFlow && e.label == "u.i -> f"),
        "the sibling-member assignment reaches the read"
    );
}

#[test]
fn plain_struct_members_get_no_alias_edges() {
    let src = "\
float pick(void) {
    struct P { int i; float f; } p;
    p.i = 1;
    float v = p.f;
    return v;
}
";
    let tu = parse_translation_unit(src, "pick.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let func = ctx.tu().find_function("pick").unwrap();
    let body = ctx.tu().func(func).body.unwrap();
    let decl = ctx
        .tu()
        .collect_stmts(body)
        .into_iter()
        .find(|&s| {
            matches!(ctx.tu().stmt(s).kind, StmtKind::Decl { .. })
                && ctx.tu().text(s).contains("p.f")
        })
        .unwrap();

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_expr(decl);
    assert!(graph
        .edges()
        .all(|e| e.kind != ComputeEdgeKind::Memory));
}
