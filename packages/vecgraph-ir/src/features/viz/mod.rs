//! Graphviz export for compute graphs, ICFG, PDG and the combined CPG.
//!
//! Node identifiers are `n<id>`, so two renders of the same graph are
//! byte-identical when the underlying AST is identical.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::features::compute_graph::{
    ComputeEdge, ComputeEdgeKind, ComputeGraph, ComputeGraphSet, ComputeNode, ComputeNodeKind,
};
use crate::features::cpg::{CpgContext, DepKind, IcfgEdgeKind, IcfgNodeKind};
use crate::frontend::ast::FuncId;
use crate::shared::models::OpCode;

const FUNC_COLOR_PALETTE: &[&str] = &[
    "#cce5ff", "#d4edda", "#fff3cd", "#f8d7da", "#e2e3e5", "#d1ecf1", "#ffeeba", "#c3e6cb",
];

/// Escape a string for use inside a DOT record label.
pub fn escape_dot(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => out.push('\''),
            '\\' => out.push('/'),
            '\n' => out.push(' '),
            '\r' => {}
            '<' => out.push_str("\\<"),
            '>' => out.push_str("\\>"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '|' => out.push_str("\\|"),
            _ => out.push(ch),
        }
    }
    out
}

fn func_name(cpg: &CpgContext, func: Option<FuncId>) -> String {
    func.map(|f| cpg.tu().func(f).name.clone())
        .unwrap_or_else(|| "?".to_string())
}

// ----------------------------------------------------------------
// Compute graph, detailed renderer (the default export)
// ----------------------------------------------------------------

pub fn compute_graph_to_dot(graph: &ComputeGraph, cpg: &CpgContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph ComputeGraph {{");
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(out, "  splines=true;");
    let _ = writeln!(out, "  nodesep=0.3;");
    let _ = writeln!(out, "  ranksep=0.5;");

    let mut label = escape_dot(graph.name());
    if graph.property("is_template") == "true" {
        label.push_str(" [TEMPLATE]");
    }
    let _ = writeln!(
        out,
        "  graph [fontname=\"Helvetica\", fontsize=14, label=\"{}\\nNodes: {}, Edges: {}\", labelloc=t];",
        label,
        graph.node_count(),
        graph.edge_count()
    );
    let _ = writeln!(out, "  node [shape=record, fontname=\"Courier\", fontsize=9];");
    let _ = writeln!(out, "  edge [fontname=\"Helvetica\", fontsize=8];");
    let _ = writeln!(out);

    // One fill color per owning function.
    let mut func_colors: BTreeMap<FuncId, &str> = BTreeMap::new();
    for node in graph.nodes() {
        if let Some(func) = node.containing_func {
            let idx = func_colors.len() % FUNC_COLOR_PALETTE.len();
            func_colors.entry(func).or_insert(FUNC_COLOR_PALETTE[idx]);
        }
    }

    let _ = writeln!(out, "  // Legend");
    let _ = writeln!(out, "  subgraph cluster_legend {{");
    let _ = writeln!(out, "    label=\"Functions\";");
    let _ = writeln!(out, "    style=dashed;");
    let _ = writeln!(out, "    fontsize=10;");
    for (idx, (func, color)) in func_colors.iter().enumerate() {
        let _ = writeln!(
            out,
            "    legend_{idx} [label=\"{}\", fillcolor=\"{color}\", style=filled];",
            escape_dot(&cpg.tu().func(*func).name)
        );
    }
    let _ = writeln!(out, "  }}");
    let _ = writeln!(out);

    let _ = writeln!(out, "  // Nodes");
    for node in graph.nodes() {
        write_detailed_node(&mut out, node, cpg, &func_colors);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  // Edges");
    for edge in graph.edges() {
        let _ = writeln!(
            out,
            "  n{} -> n{} [{}];",
            edge.source_id,
            edge.target_id,
            detailed_edge_style(edge)
        );
    }

    let _ = writeln!(out, "}}");
    out
}

fn write_detailed_node(
    out: &mut String,
    node: &ComputeNode,
    cpg: &CpgContext,
    func_colors: &BTreeMap<FuncId, &str>,
) {
    let mut label = format!("[{}] {}", node.id, node.kind.as_str());

    label.push_str(" | ");
    if !node.name.is_empty() {
        label.push_str(&format!("name: {}", escape_dot(&node.name)));
    }
    if let Some(value) = &node.const_value {
        label.push_str(&format!(" val={}", value.render()));
    }

    if node.op_code != OpCode::Unknown {
        label.push_str(&format!(" | op: {}", escape_dot(node.op_code.as_str())));
    }
    label.push_str(&format!(
        " | type: {}",
        escape_dot(&node.data_type.to_string_compact())
    ));
    label.push_str(&format!(
        " | func: {}",
        escape_dot(&func_name(cpg, node.containing_func))
    ));
    if node.source_line > 0 {
        label.push_str(&format!(" | line: {}", node.source_line));
    }
    if !node.source_text.is_empty() {
        let mut text = node.source_text.clone();
        if text.len() > 30 {
            text = format!("{}...", text.chars().take(27).collect::<String>());
        }
        label.push_str(&format!(" | code: {}", escape_dot(&text)));
    }

    let mut flags = String::new();
    if node.property("is_anchor") == "true" {
        flags.push_str("ANCHOR ");
    }
    if node.property("is_loop_carried") == "true" {
        flags.push_str("LOOP ");
    }
    if node.property("callee_analyzed") == "true" {
        flags.push_str("EXPANDED ");
    }
    if node.property("is_formal_param") == "true" {
        flags.push_str("FORMAL ");
    }
    if !flags.is_empty() {
        label.push_str(&format!(" | [{flags}]"));
    }

    let call_site = node.property("call_site_id");
    if !call_site.is_empty() {
        label.push_str(&format!(" | ▶ CALL_SITE[{call_site}]"));
        let callee = node.property("callee_name");
        if !callee.is_empty() {
            label.push_str(&format!(" from {}", escape_dot(callee)));
        }
    }

    if node.loop_context_id != 0 {
        label.push_str(&format!(" | ★ IN LOOP[{}]", node.loop_context_id));
        if !node.loop_context_var.is_empty() {
            label.push_str(&format!(" var={}", escape_dot(&node.loop_context_var)));
        }
        if node.loop_context_line > 0 {
            label.push_str(&format!(" @L{}", node.loop_context_line));
        }
    }

    let branch_label = node.property("branch_label");
    if !branch_label.is_empty() {
        label.push_str(&format!(" | ◆ BRANCH: {}", escape_dot(branch_label)));
    } else if node.branch_context_id != 0 {
        label.push_str(&format!(" | ◆ BRANCH[{}]", node.branch_context_id));
    }

    let fill = node
        .containing_func
        .and_then(|f| func_colors.get(&f).copied())
        .unwrap_or("#f0f0f0");

    let mut attrs = format!("label=\"{{{label}}}\", style=filled, fillcolor=\"{fill}\"");
    if node.property("is_anchor") == "true" {
        attrs.push_str(", penwidth=3, color=red");
    } else if node.property("callee_analyzed") == "true" {
        attrs.push_str(", penwidth=2, color=blue");
    }

    let _ = writeln!(out, "  n{} [{attrs}];", node.id);
}

fn detailed_edge_style(edge: &ComputeEdge) -> String {
    let mut type_label = edge.kind.as_str().to_string();
    if !edge.label.is_empty() {
        type_label.push_str(": ");
        type_label.push_str(&edge.label);
    }
    let mut style = format!("label=\"{}\"", escape_dot(&type_label));
    match edge.kind {
        ComputeEdgeKind::DataFlow => style.push_str(", color=\"#0066cc\", penwidth=1.5"),
        ComputeEdgeKind::Control => {
            if edge.label.starts_with("cfg") {
                style.push_str(", color=\"#00cc00\", style=dashed, penwidth=1.0");
            } else {
                style.push_str(", color=\"#cc0000\", style=dashed, penwidth=1.0");
            }
        }
        ComputeEdgeKind::LoopCarried => {
            style.push_str(", color=brown, style=dashed, penwidth=2, constraint=false")
        }
        ComputeEdgeKind::Return => {
            style.push_str(", color=orange, style=bold, penwidth=2, arrowhead=diamond")
        }
        ComputeEdgeKind::Call => style.push_str(", color=\"#006600\", style=bold, penwidth=2"),
        ComputeEdgeKind::Memory => style.push_str(", color=\"#660066\", style=dotted, penwidth=1.5"),
    }
    style
}

// ----------------------------------------------------------------
// Compute graph, enhanced renderer (clustered layout)
// ----------------------------------------------------------------

pub fn compute_graph_to_dot_enhanced(graph: &ComputeGraph, cpg: &CpgContext) -> String {
    compute_graph_to_dot_enhanced_impl(graph, Some(cpg))
}

/// Enhanced renderer for graphs without a backing translation unit (the
/// BF16 demo); function names are omitted.
pub fn compute_graph_to_dot_standalone(graph: &ComputeGraph) -> String {
    compute_graph_to_dot_enhanced_impl(graph, None)
}

fn compute_graph_to_dot_enhanced_impl(graph: &ComputeGraph, cpg: Option<&CpgContext>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph ComputeGraph {{");
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(out, "  compound=true;");

    let mut label = format!("ComputeGraph: {}", escape_dot(graph.name()));
    if graph.property("is_template") == "true" {
        label.push_str(" [TEMPLATE]");
    }
    let _ = writeln!(
        out,
        "  graph [fontname=\"Helvetica\", fontsize=14, label=\"{}\\nNodes: {}, Edges: {}\\nLoop Depth: {}\", labelloc=t, style=filled, fillcolor=white];",
        label,
        graph.node_count(),
        graph.edge_count(),
        graph.property("loop_depth")
    );
    let _ = writeln!(out, "  node [shape=record, fontname=\"Courier\", fontsize=9];");
    let _ = writeln!(out, "  edge [fontname=\"Helvetica\", fontsize=8];");
    let _ = writeln!(out);

    let input_kinds = [ComputeNodeKind::Parameter, ComputeNodeKind::Constant];
    let compute_kinds = [
        ComputeNodeKind::BinaryOp,
        ComputeNodeKind::UnaryOp,
        ComputeNodeKind::Call,
        ComputeNodeKind::Cast,
    ];
    let memory_kinds = [
        ComputeNodeKind::Load,
        ComputeNodeKind::Store,
        ComputeNodeKind::ArrayAccess,
    ];

    write_cluster(&mut out, graph, cpg, "inputs", "Inputs", "gray", &input_kinds);
    write_cluster(
        &mut out,
        graph,
        cpg,
        "compute",
        "Computation",
        "green",
        &compute_kinds,
    );
    write_cluster(&mut out, graph, cpg, "memory", "Memory", "purple", &memory_kinds);

    let _ = writeln!(out, "  // Other nodes");
    for node in graph.nodes() {
        let handled = input_kinds.contains(&node.kind)
            || compute_kinds.contains(&node.kind)
            || memory_kinds.contains(&node.kind);
        if !handled {
            write_enhanced_node(&mut out, node, cpg);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  // Edges");
    for edge in graph.edges() {
        let _ = writeln!(
            out,
            "  n{} -> n{} [{}];",
            edge.source_id,
            edge.target_id,
            enhanced_edge_style(edge)
        );
    }
    let _ = writeln!(out, "}}");
    out
}

fn write_cluster(
    out: &mut String,
    graph: &ComputeGraph,
    cpg: Option<&CpgContext>,
    id: &str,
    label: &str,
    color: &str,
    kinds: &[ComputeNodeKind],
) {
    let members: Vec<&ComputeNode> =
        graph.nodes().filter(|n| kinds.contains(&n.kind)).collect();
    if members.is_empty() {
        return;
    }
    let _ = writeln!(out, "  subgraph cluster_{id} {{");
    let _ = writeln!(out, "    label=\"{label}\";");
    let _ = writeln!(out, "    style=rounded;");
    let _ = writeln!(out, "    color={color};");
    for node in members {
        write_enhanced_node(out, node, cpg);
    }
    let _ = writeln!(out, "  }}");
    let _ = writeln!(out);
}

fn write_enhanced_node(out: &mut String, node: &ComputeNode, cpg: Option<&CpgContext>) {
    let mut label = format!("[{}] {}", node.id, node.kind.as_str());
    if !node.name.is_empty() {
        label.push_str(&format!(": {}", escape_dot(&node.name)));
    }
    if node.op_code != OpCode::Unknown {
        label.push_str(&format!(" | op: {}", escape_dot(node.op_code.as_str())));
    }
    label.push_str(&format!(
        " | type: {}",
        escape_dot(&node.data_type.to_string_compact())
    ));
    if let (Some(func), Some(cpg)) = (node.containing_func, cpg) {
        label.push_str(&format!(
            " | func: {}",
            escape_dot(&cpg.tu().func(func).name)
        ));
    }
    if node.source_line > 0 {
        label.push_str(&format!(" | line: {}", node.source_line));
    }
    let call_site = node.property("call_site_id");
    if !call_site.is_empty() {
        label.push_str(&format!(" | ▶ CALL[{call_site}]"));
    }
    if node.loop_context_id != 0 {
        label.push_str(&format!(" | ★ LOOP[{}]", node.loop_context_id));
        if !node.loop_context_var.is_empty() {
            label.push_str(&format!(" var={}", escape_dot(&node.loop_context_var)));
        }
        if node.loop_context_line > 0 {
            label.push_str(&format!(" @L{}", node.loop_context_line));
        }
    }
    if node.branch_context_id != 0 {
        label.push_str(&format!(" | ◆ BRANCH[{}]", node.branch_context_id));
        if !node.branch_type.is_empty() {
            label.push_str(&format!(" {}", node.branch_type));
        }
        if node.branch_context_line > 0 {
            label.push_str(&format!(" @L{}", node.branch_context_line));
        }
    }

    let mut attrs = format!(
        "label=\"{{{label}}}\", style=filled, fillcolor={}",
        node_fill_color(node.kind)
    );
    if node.property("is_anchor") == "true" {
        attrs.push_str(", penwidth=3, color=red");
    }
    if node.property("callee_analyzed") == "true" {
        attrs.push_str(", penwidth=2, color=blue");
    }
    if node.loop_context_id != 0 && !call_site.is_empty() {
        attrs.push_str(", peripheries=2");
    }
    let _ = writeln!(out, "    n{} [{attrs}];", node.id);
}

fn node_fill_color(kind: ComputeNodeKind) -> &'static str {
    match kind {
        ComputeNodeKind::Constant => "lightgray",
        ComputeNodeKind::Variable => "lightblue",
        ComputeNodeKind::Parameter => "lightyellow",
        ComputeNodeKind::BinaryOp => "lightgreen",
        ComputeNodeKind::UnaryOp => "lightgreen",
        ComputeNodeKind::CompareOp => "palegreen",
        ComputeNodeKind::Load | ComputeNodeKind::Store => "plum",
        ComputeNodeKind::ArrayAccess => "orchid",
        ComputeNodeKind::MemberAccess => "thistle",
        ComputeNodeKind::Phi => "khaki",
        ComputeNodeKind::Select => "khaki",
        ComputeNodeKind::LoopInduction => "orange",
        ComputeNodeKind::Loop => "salmon",
        ComputeNodeKind::Branch => "lightpink",
        ComputeNodeKind::Call => "wheat",
        ComputeNodeKind::IntrinsicCall => "gold",
        ComputeNodeKind::Cast => "lightgray",
        ComputeNodeKind::Return => "lightcoral",
        ComputeNodeKind::Unknown => "white",
    }
}

fn enhanced_edge_style(edge: &ComputeEdge) -> String {
    let mut style = match edge.kind {
        ComputeEdgeKind::DataFlow => "color=blue, penwidth=1.5".to_string(),
        ComputeEdgeKind::Control => {
            if edge.label.starts_with("cfg") {
                "color=\"#00cc00\", style=dashed, penwidth=1.5".to_string()
            } else {
                "color=red, style=dashed, penwidth=1.5".to_string()
            }
        }
        ComputeEdgeKind::Memory => "color=purple, style=dotted, penwidth=1.5".to_string(),
        ComputeEdgeKind::Call => "color=\"#008800\", style=bold, penwidth=2".to_string(),
        ComputeEdgeKind::Return => {
            "color=orange, style=bold, penwidth=2, arrowhead=diamond".to_string()
        }
        ComputeEdgeKind::LoopCarried => {
            "color=brown, style=dashed, penwidth=2, constraint=false".to_string()
        }
    };
    if !edge.label.is_empty() {
        style.push_str(&format!(", label=\"{}\"", escape_dot(&edge.label)));
    }
    style
}

// ----------------------------------------------------------------
// ICFG / PDG / CPG renderers
// ----------------------------------------------------------------

fn icfg_node_color(kind: IcfgNodeKind) -> &'static str {
    match kind {
        IcfgNodeKind::Entry => "palegreen",
        IcfgNodeKind::Exit => "lightcoral",
        IcfgNodeKind::Statement => "lightblue",
        IcfgNodeKind::CallSite => "wheat",
        IcfgNodeKind::ReturnSite => "khaki",
        IcfgNodeKind::FormalIn | IcfgNodeKind::FormalOut => "lightyellow",
        IcfgNodeKind::ActualIn | IcfgNodeKind::ActualOut => "thistle",
    }
}

fn icfg_edge_attrs(kind: IcfgEdgeKind) -> &'static str {
    match kind {
        IcfgEdgeKind::Intraprocedural | IcfgEdgeKind::Unconditional => "color=black",
        IcfgEdgeKind::True => "color=\"#00aa00\", label=\"true\"",
        IcfgEdgeKind::False => "color=\"#cc0000\", label=\"false\"",
        IcfgEdgeKind::Call => "color=\"#006600\", style=bold, label=\"call\"",
        IcfgEdgeKind::Return => "color=orange, style=bold, label=\"return\"",
        IcfgEdgeKind::ParamIn => "color=blue, style=dashed, label=\"param_in\"",
        IcfgEdgeKind::ParamOut => "color=blue, style=dashed, label=\"param_out\"",
    }
}

/// ICFG of one function, including the parameter-passing nodes attached to
/// its call sites.
pub fn icfg_to_dot(cpg: &CpgContext, func: FuncId) -> String {
    let name = cpg.tu().func(func).name.clone();
    let mut out = String::new();
    let _ = writeln!(out, "digraph ICFG {{");
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(
        out,
        "  graph [label=\"ICFG: {}\", labelloc=t, fontsize=14];",
        escape_dot(&name)
    );
    let _ = writeln!(out, "  node [shape=box, fontname=\"Courier\", fontsize=9];");

    let members: Vec<_> = cpg.icfg_nodes().filter(|n| n.func == func).collect();
    for node in &members {
        let text = node
            .stmt
            .map(|s| cpg.tu().text(s).to_string())
            .unwrap_or_default();
        let mut label = format!("[{}] {}", node.id.0, node.kind.as_str());
        if let Some(index) = node.param_index {
            label.push_str(&format!(" #{index}"));
            if !node.param_name.is_empty() {
                label.push_str(&format!(" {}", escape_dot(&node.param_name)));
            }
        }
        if !text.is_empty() {
            label.push_str(&format!("\\n{}", escape_dot(&text)));
        }
        let _ = writeln!(
            out,
            "  n{} [label=\"{label}\", style=filled, fillcolor={}];",
            node.id.0,
            icfg_node_color(node.kind)
        );
    }

    for node in &members {
        for &(succ, kind) in &node.successors {
            let _ = writeln!(
                out,
                "  n{} -> n{} [{}];",
                node.id.0,
                succ.0,
                icfg_edge_attrs(kind)
            );
        }
    }
    let _ = writeln!(out, "}}");
    out
}

/// PDG of one function: data deps solid (Flow blue / Anti orange / Output
/// gray), control deps red dashed with the branch value.
pub fn pdg_to_dot(cpg: &CpgContext, func: FuncId) -> String {
    let name = cpg.tu().func(func).name.clone();
    let mut out = String::new();
    let _ = writeln!(out, "digraph PDG {{");
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(
        out,
        "  graph [label=\"PDG: {}\", labelloc=t, fontsize=14];",
        escape_dot(&name)
    );
    let _ = writeln!(out, "  node [shape=box, fontname=\"Courier\", fontsize=9];");

    let mut nodes: Vec<_> = cpg.pdg_nodes().filter(|n| n.func == func).collect();
    nodes.sort_by_key(|n| n.stmt);

    let mut declared: std::collections::BTreeSet<crate::frontend::ast::StmtId> =
        std::collections::BTreeSet::new();
    let mut declare = |out: &mut String, stmt: crate::frontend::ast::StmtId| {
        if declared.insert(stmt) {
            let _ = writeln!(
                out,
                "  s{} [label=\"L{}: {}\"];",
                stmt.0,
                cpg.tu().line(stmt),
                escape_dot(cpg.tu().text(stmt))
            );
        }
    };

    for node in &nodes {
        declare(&mut out, node.stmt);
        for dep in &node.data_deps {
            declare(&mut out, dep.source_stmt);
        }
        for dep in &node.control_deps {
            declare(&mut out, dep.control_stmt);
        }
    }

    for node in &nodes {
        for dep in &node.data_deps {
            let (color, tag) = match dep.kind {
                DepKind::Flow => ("blue", ""),
                DepKind::Anti => ("orange", " (anti)"),
                DepKind::Output => ("gray", " (output)"),
            };
            let _ = writeln!(
                out,
                "  s{} -> s{} [color={color}, label=\"{}{}\"];",
                dep.source_stmt.0,
                dep.sink_stmt.0,
                escape_dot(&dep.var_name),
                tag
            );
        }
        for dep in &node.control_deps {
            let _ = writeln!(
                out,
                "  s{} -> s{} [color=red, style=dashed, label=\"{}\"];",
                dep.control_stmt.0, dep.dependent_stmt.0, dep.branch_value
            );
        }
    }
    let _ = writeln!(out, "}}");
    out
}

/// Combined view: ICFG skeleton plus data/control dependency overlays.
pub fn cpg_to_dot(cpg: &CpgContext, func: FuncId) -> String {
    let name = cpg.tu().func(func).name.clone();
    let mut out = String::new();
    let _ = writeln!(out, "digraph CPG {{");
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(
        out,
        "  graph [label=\"CPG: {}\", labelloc=t, fontsize=14];",
        escape_dot(&name)
    );
    let _ = writeln!(out, "  node [shape=box, fontname=\"Courier\", fontsize=9];");

    let members: Vec<_> = cpg.icfg_nodes().filter(|n| n.func == func).collect();
    for node in &members {
        let text = node
            .stmt
            .map(|s| cpg.tu().text(s).to_string())
            .unwrap_or_else(|| node.kind.as_str().to_string());
        let _ = writeln!(
            out,
            "  n{} [label=\"{}\", style=filled, fillcolor={}];",
            node.id.0,
            escape_dot(&text),
            icfg_node_color(node.kind)
        );
    }
    for node in &members {
        for &(succ, kind) in &node.successors {
            let _ = writeln!(
                out,
                "  n{} -> n{} [{}];",
                node.id.0,
                succ.0,
                icfg_edge_attrs(kind)
            );
        }
    }

    // Dependency overlays between statements with ICFG nodes.
    for pdg in cpg.pdg_nodes().filter(|n| n.func == func) {
        for dep in &pdg.data_deps {
            if dep.kind != DepKind::Flow {
                continue;
            }
            let (Some(src), Some(sink)) = (
                cpg.icfg_node_of_stmt(dep.source_stmt),
                cpg.icfg_node_of_stmt(dep.sink_stmt),
            ) else {
                continue;
            };
            let _ = writeln!(
                out,
                "  n{} -> n{} [color=blue, constraint=false, label=\"{}\"];",
                src.0,
                sink.0,
                escape_dot(&dep.var_name)
            );
        }
        for dep in &pdg.control_deps {
            let (Some(src), Some(sink)) = (
                cpg.icfg_node_of_stmt(dep.control_stmt),
                cpg.icfg_node_of_stmt(dep.dependent_stmt),
            ) else {
                continue;
            };
            let _ = writeln!(
                out,
                "  n{} -> n{} [color=red, style=dashed, constraint=false];",
                src.0, sink.0
            );
        }
    }
    let _ = writeln!(out, "}}");
    out
}

// ----------------------------------------------------------------
// File output
// ----------------------------------------------------------------

pub fn write_dot_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Export every graph of a set as `cg_<idx>_<name>.dot` under `output_dir`.
pub fn export_all_dot_files(
    set: &ComputeGraphSet,
    cpg: &CpgContext,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let mut written = Vec::new();
    for (idx, graph) in set.graphs().iter().enumerate() {
        let path = output_dir.join(format!("cg_{idx}_{}.dot", graph.name()));
        write_dot_file(&path, &compute_graph_to_dot(graph, cpg))?;
        written.push(path);
    }
    Ok(written)
}

/// Enhanced (clustered) variant of `export_all_dot_files`.
pub fn export_all_dot_files_enhanced(
    set: &ComputeGraphSet,
    cpg: &CpgContext,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let mut written = Vec::new();
    for (idx, graph) in set.graphs().iter().enumerate() {
        let path = output_dir.join(format!("cg_enhanced_{idx}_{}.dot", graph.name()));
        write_dot_file(&path, &compute_graph_to_dot_enhanced(graph, cpg))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_translation_unit;

    fn analyzed(src: &str) -> CpgContext {
        let tu = parse_translation_unit(src, "viz_test.c").unwrap();
        CpgContext::build_full(tu)
    }

    #[test]
    fn test_escape_dot() {
        assert_eq!(escape_dot("a < b"), "a \\< b");
        assert_eq!(escape_dot("x | y"), "x \\| y");
        assert_eq!(escape_dot("\"quoted\""), "'quoted'");
    }

    #[test]
    fn test_icfg_dot_contains_nodes_and_edges() {
        let ctx = analyzed("int f(int x) { if (x > 0) { x = 1; } return x; }");
        let func = ctx.tu().find_function("f").unwrap();
        let dot = icfg_to_dot(&ctx, func);
        assert!(dot.starts_with("digraph ICFG {"));
        assert!(dot.contains("Entry"));
        assert!(dot.contains("label=\"true\""));
        assert!(dot.contains("label=\"false\""));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_pdg_dot_contains_flow_edge() {
        let ctx = analyzed("int f(void) { int a = 1; int b = a; return b; }");
        let func = ctx.tu().find_function("f").unwrap();
        let dot = pdg_to_dot(&ctx, func);
        assert!(dot.contains("color=blue"));
        assert!(dot.contains("label=\"a\""));
    }

    #[test]
    fn test_dot_output_is_reproducible() {
        let src = "int f(void) { int a = 1; int b = a + 2; return b; }";
        let ctx1 = analyzed(src);
        let ctx2 = analyzed(src);
        let f1 = ctx1.tu().find_function("f").unwrap();
        let f2 = ctx2.tu().find_function("f").unwrap();
        assert_eq!(pdg_to_dot(&ctx1, f1), pdg_to_dot(&ctx2, f2));
        assert_eq!(icfg_to_dot(&ctx1, f1), icfg_to_dot(&ctx2, f2));
    }
}
