//! Kill filtering: only the lexically last preceding definition of a
//! variable feeds a use; overwritten definitions are dropped.

use vecgraph_ir::features::compute_graph::{ComputeEdgeKind, ComputeGraphBuilder};
use vecgraph_ir::features::cpg::CpgContext;
use vecgraph_ir::frontend::ast::StmtKind;
use vecgraph_ir::frontend::parser::parse_translation_unit;

const SOURCE: &str = "\
int compute(void) {
    int x = 1;
    x = 2;
    int y = x + 1;
    return y;
}
";

#[test]
fn killed_definition_does_not_reach_the_use() {
    let tu = parse_translation_unit(SOURCE, "kill.c").unwrap();
    let ctx = CpgContext::build_full(tu);

    let func = ctx.tu().find_function("compute").unwrap();
    let body = ctx.tu().func(func).body.unwrap();
    let y_decl = ctx
        .tu()
        .collect_stmts(body)
        .into_iter()
        .find(|&s| {
            matches!(ctx.tu().stmt(s).kind, StmtKind::Decl { .. })
                && ctx.tu().text(s).contains("int y")
        })
        .expect("int y = x + 1");

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_expr(y_decl);

    // The x read feeding y's initializer.
    let x_read = graph
        .nodes()
        .find(|n| n.name == "x" && n.source_line == 4)
        .expect("x read at line 4");

    let sources: Vec<u32> = graph
        .incoming_edges(x_read.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::DataFlow)
        .map(|e| graph.node(e.source_id).unwrap().source_line)
        .collect();

    assert!(
        sources.contains(&3),
        "the surviving definition x = 2 (line 3) must feed the use, got {sources:?}"
    );
    assert!(
        !sources.contains(&2),
        "the killed definition int x = 1 (line 2) must not feed the use"
    );
}

#[test]
fn unkilled_definition_still_flows() {
    let src = "\
int keep(void) {
    int x = 1;
    int y = x + 1;
    return y;
}
";
    let tu = parse_translation_unit(src, "keep.c").unwrap();
    let ctx = CpgContext::build_full(tu);
    let func = ctx.tu().find_function("keep").unwrap();
    let body = ctx.tu().func(func).body.unwrap();
    let y_decl = ctx
        .tu()
        .collect_stmts(body)
        .into_iter()
        .find(|&s| {
            matches!(ctx.tu().stmt(s).kind, StmtKind::Decl { .. })
                && ctx.tu().text(s).contains("int y")
        })
        .unwrap();

    let mut builder = ComputeGraphBuilder::new(&ctx);
    let graph = builder.build_from_expr(y_decl);
    let x_read = graph
        .nodes()
        .find(|n| n.name == "x" && n.source_line == 3)
        .unwrap();
    let sources: Vec<u32> = graph
        .incoming_edges(x_read.id)
        .into_iter()
        .filter(|e| e.kind == ComputeEdgeKind::DataFlow)
        .map(|e| graph.node(e.source_id).unwrap().source_line)
        .collect();
    assert!(sources.contains(&2), "the only definition reaches the use");
}
