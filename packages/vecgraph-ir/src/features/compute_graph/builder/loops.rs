//! Containing-loop discovery and loop wiring: the Loop container node, the
//! loop-variable edges, and the external initializer hookup.

use crate::frontend::ast::{StmtId, StmtKind};

use super::super::domain::{ComputeEdgeKind, ComputeNodeKind, NodeId, INVALID_NODE};
use super::ComputeGraphBuilder;

/// Everything known about the anchor's innermost enclosing loop
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    pub loop_node_id: NodeId,
    pub loop_stmt: Option<StmtId>,
    pub init_stmt: Option<StmtId>,
    pub init_node_id: NodeId,
    pub body_start_line: u32,
    pub body_end_line: u32,
    pub loop_var_name: String,
    pub anchor_node_id: NodeId,
}

/// Body line range recovered for an already-built loop node, where the
/// brace range is no longer at hand.
const REUSED_LOOP_BODY_SPAN: u32 = 100;

impl ComputeGraphBuilder<'_> {
    /// Walk AST parents to the first enclosing `for`/`while`/`do` and build
    /// (or reuse) its Loop node, recording variable and body-range info.
    pub(super) fn build_containing_loop_node(&mut self, stmt: StmtId) -> LoopInfo {
        let mut info = LoopInfo::default();
        let tu = self.cpg.tu();

        let mut loop_stmt = None;
        let mut cursor = tu.parent(stmt);
        while let Some(parent) = cursor {
            if matches!(
                tu.stmt(parent).kind,
                StmtKind::For { .. } | StmtKind::While { .. } | StmtKind::DoWhile { .. }
            ) {
                loop_stmt = Some(parent);
                break;
            }
            cursor = tu.parent(parent);
        }
        let Some(loop_stmt) = loop_stmt else {
            return info;
        };

        // Reuse a loop node built earlier (outer anchor, hoisting).
        if let Some(&existing) = self.processed_stmts.get(&loop_stmt) {
            info.loop_node_id = existing;
            info.loop_stmt = Some(loop_stmt);
            info.loop_var_name = self.extract_loop_var(loop_stmt);
            if let Some(node) = self.graph.node(existing) {
                info.body_start_line = node.source_line;
                info.body_end_line = node.source_line + REUSED_LOOP_BODY_SPAN;
            }
            return info;
        }

        info.loop_node_id = self.build_expression_tree(loop_stmt, 0);
        info.loop_stmt = Some(loop_stmt);
        info.loop_var_name = self.extract_loop_var(loop_stmt);

        let tu = self.cpg.tu();
        if let StmtKind::For { init, body, .. } = tu.stmt(loop_stmt).kind {
            if let Some(init) = init {
                info.init_stmt = Some(init);
                if let Some(&init_node) = self.processed_stmts.get(&init) {
                    info.init_node_id = init_node;
                }
            }
            let (start, end) = self.loop_body_range(body);
            info.body_start_line = start;
            info.body_end_line = end;
        } else if let StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } =
            tu.stmt(loop_stmt).kind
        {
            let (start, end) = self.loop_body_range(body);
            info.body_start_line = start;
            info.body_end_line = end;
        }

        info
    }

    /// Brace-range lines for a compound body, the statement's own line
    /// otherwise.
    fn loop_body_range(&self, body: StmtId) -> (u32, u32) {
        let tu = self.cpg.tu();
        let span = tu.stmt(body).span;
        match &tu.stmt(body).kind {
            StmtKind::Compound { stmts } => {
                let mut start = span.start_line;
                let mut end = span.end_line;
                if start == 0 || end == 0 {
                    if let Some(&first) = stmts.first() {
                        start = tu.line(first);
                        end = stmts
                            .iter()
                            .map(|&s| tu.end_line(s))
                            .max()
                            .unwrap_or(start);
                    }
                }
                (start, end)
            }
            _ => (span.start_line, span.start_line),
        }
    }

    pub(super) fn extract_loop_var(&self, loop_stmt: StmtId) -> String {
        let tu = self.cpg.tu();
        match &tu.stmt(loop_stmt).kind {
            StmtKind::For { inc, cond, .. } => {
                if let Some(inc) = inc {
                    if let Some(name) = self.loop_var_from_increment(*inc) {
                        return name;
                    }
                }
                cond.and_then(|c| self.loop_var_from_condition(c))
                    .unwrap_or_default()
            }
            StmtKind::While { cond, .. } | StmtKind::DoWhile { cond, .. } => self
                .loop_var_from_condition(*cond)
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// `++i`, `i++`, `i += k`, `i = i + k`
    fn loop_var_from_increment(&self, inc: StmtId) -> Option<String> {
        let tu = self.cpg.tu();
        let inc = tu.skip_parens(inc);
        match &tu.stmt(inc).kind {
            StmtKind::Unary { op, .. } if op.is_inc_dec() => tu
                .inc_dec_target(inc)
                .map(|v| tu.var(v).name.clone()),
            StmtKind::Binary { op, .. } if op.is_assignment() => tu
                .assignment_target(inc)
                .map(|v| tu.var(v).name.clone()),
            _ => None,
        }
    }

    /// The first DeclRef of a comparison (`i < n`, `n > i`).
    fn loop_var_from_condition(&self, cond: StmtId) -> Option<String> {
        let tu = self.cpg.tu();
        let cond = tu.skip_parens(cond);
        let StmtKind::Binary { op, lhs, rhs } = tu.stmt(cond).kind else {
            return None;
        };
        if !op.is_comparison() {
            return None;
        }
        if let StmtKind::DeclRef { var } = tu.stmt(tu.skip_parens(lhs)).kind {
            return Some(tu.var(var).name.clone());
        }
        if let StmtKind::DeclRef { var } = tu.stmt(tu.skip_parens(rhs)).kind {
            return Some(tu.var(var).name.clone());
        }
        None
    }

    // ------------------------------------------------------------
    // Loop wiring (build phase 7)
    // ------------------------------------------------------------

    pub(super) fn connect_loop_to_body(&mut self, info: &LoopInfo) {
        if info.loop_node_id == INVALID_NODE || info.anchor_node_id == INVALID_NODE {
            return;
        }
        self.connect_nodes(
            info.loop_node_id,
            info.anchor_node_id,
            ComputeEdgeKind::Control,
            "loop_body",
        );
    }

    /// Stamp the loop context onto every node in the body range and connect
    /// loop-variable nodes to the Loop node.
    pub(super) fn connect_loop_variables_to_loop_node(&mut self, info: &LoopInfo) {
        if info.loop_node_id == INVALID_NODE {
            return;
        }
        let loop_line = self
            .graph
            .node(info.loop_node_id)
            .map(|n| n.source_line)
            .unwrap_or(0);

        let candidates: Vec<(NodeId, bool)> = self
            .graph
            .nodes()
            .filter(|n| n.id != info.loop_node_id)
            .filter(|n| {
                let in_range = info.body_start_line > 0
                    && info.body_end_line > 0
                    && n.source_line >= info.body_start_line
                    && n.source_line <= info.body_end_line;
                in_range || n.loop_context_id == info.loop_node_id
            })
            .map(|n| {
                let is_loop_var = !info.loop_var_name.is_empty()
                    && matches!(
                        n.kind,
                        ComputeNodeKind::Variable | ComputeNodeKind::Parameter
                    )
                    && n.name == info.loop_var_name;
                (n.id, is_loop_var)
            })
            .collect();

        for (id, is_loop_var) in candidates {
            if let Some(node) = self.graph.node_mut(id) {
                node.loop_context_id = info.loop_node_id;
                node.loop_context_var = info.loop_var_name.clone();
                node.loop_context_line = loop_line;
            }
            if is_loop_var {
                let has_loop_edge = self
                    .graph
                    .incoming_edges(id)
                    .iter()
                    .any(|e| e.source_id == info.loop_node_id);
                if !has_loop_edge {
                    self.connect_nodes(
                        info.loop_node_id,
                        id,
                        ComputeEdgeKind::DataFlow,
                        &info.loop_var_name,
                    );
                }
            }
        }
    }

    /// Find the external initializer of the loop variable (the latest
    /// Variable node of that name before the loop line), wire it into the
    /// Loop node and prune its other outgoing DataFlow edges: the
    /// initializer feeds the loop only.
    pub(super) fn connect_loop_var_init_to_loop(&mut self, info: &LoopInfo) {
        if info.loop_node_id == INVALID_NODE || info.loop_var_name.is_empty() {
            return;
        }
        let Some(loop_node) = self.graph.node(info.loop_node_id) else {
            return;
        };
        let loop_line = loop_node.source_line;

        let mut init_node = INVALID_NODE;
        let mut init_line = 0;
        for node in self.graph.nodes() {
            if node.id == info.loop_node_id {
                continue;
            }
            if node.kind == ComputeNodeKind::Variable
                && node.name == info.loop_var_name
                && node.source_line > 0
                && node.source_line < loop_line
                && node.source_line > init_line
            {
                init_line = node.source_line;
                init_node = node.id;
            }
        }
        if init_node == INVALID_NODE {
            return;
        }

        let has_init_edge = self
            .graph
            .outgoing_edges(init_node)
            .iter()
            .any(|e| e.target_id == info.loop_node_id);
        if !has_init_edge {
            let label = format!("init:{}", info.loop_var_name);
            self.connect_nodes(init_node, info.loop_node_id, ComputeEdgeKind::DataFlow, &label);
        }

        let doomed: Vec<u64> = self
            .graph
            .outgoing_edges(init_node)
            .iter()
            .filter(|e| e.target_id != info.loop_node_id && e.kind == ComputeEdgeKind::DataFlow)
            .map(|e| e.id)
            .collect();
        for edge in doomed {
            self.graph.remove_edge(edge);
        }

        if let Some(node) = self.graph.node_mut(init_node) {
            node.set_property("is_loop_var_init", "true");
            node.set_property("loop_node_id", info.loop_node_id.to_string());
        }
    }
}
