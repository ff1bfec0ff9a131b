//! Branch lowering: `if` and `switch` container nodes, body lowering with
//! an immutable branch-info token, and context stamping.

use crate::frontend::ast::{StmtId, StmtKind};

use super::super::domain::{ComputeEdgeKind, ComputeNodeKind, NodeId, INVALID_NODE};
use super::ComputeGraphBuilder;

/// Context of one branch arm, passed by value through body lowering
#[derive(Debug, Clone, Default)]
pub(super) struct BranchInfo {
    pub branch_node_id: NodeId,
    pub branch_stmt: Option<StmtId>,
    /// "THEN", "ELSE", "CASE <v>" or "DEFAULT"
    pub branch_type: String,
    pub branch_line: u32,
    pub body_start_line: u32,
    pub body_end_line: u32,
}

impl ComputeGraphBuilder<'_> {
    pub(super) fn build_if_branch(&mut self, if_stmt: StmtId, depth: u32) -> NodeId {
        if depth >= self.limits.max_backward_depth {
            return INVALID_NODE;
        }
        if let Some(&cached) = self.processed_stmts.get(&if_stmt) {
            return cached;
        }

        let StmtKind::If {
            cond,
            then_body,
            else_body,
        } = self.cpg.tu().stmt(if_stmt).kind.clone()
        else {
            return INVALID_NODE;
        };

        let branch_id = self.graph.create_node(ComputeNodeKind::Branch);
        {
            let tu = self.cpg.tu();
            let line = tu.line(if_stmt);
            let cond_text = tu.text(cond).to_string();
            let func = tu.containing_function(if_stmt);
            if let Some(node) = self.graph.node_mut(branch_id) {
                node.name = "if".to_string();
                node.ast_stmt = Some(if_stmt);
                node.source_line = line;
                node.source_text = format!("if ({cond_text})");
                node.containing_func = func;
                if self.loop_info.loop_node_id != INVALID_NODE {
                    node.loop_context_id = self.loop_info.loop_node_id;
                    node.loop_context_var = self.loop_info.loop_var_name.clone();
                    node.loop_context_line = self.loop_info.body_start_line;
                }
            }
        }
        self.graph.index_stmt(if_stmt, branch_id);
        self.processed_stmts.insert(if_stmt, branch_id);

        let cond_id = self.build_expression_tree(cond, depth + 1);
        self.connect_nodes(cond_id, branch_id, ComputeEdgeKind::Control, "condition");

        let branch_line = self.cpg.tu().line(if_stmt);

        // THEN arm: body lowered under its own info, then stamped at once so
        // a later ELSE pass cannot overwrite the labels.
        let then_info = BranchInfo {
            branch_node_id: branch_id,
            branch_stmt: Some(if_stmt),
            branch_type: "THEN".to_string(),
            branch_line,
            body_start_line: self.cpg.tu().line(then_body),
            body_end_line: self.cpg.tu().end_line(then_body),
        };
        let then_id = self.build_branch_body(then_body, depth + 1, &then_info);
        if then_id != INVALID_NODE {
            self.connect_nodes(branch_id, then_id, ComputeEdgeKind::Control, "then");
        }
        self.mark_nodes_in_branch(&then_info);

        if let Some(else_body) = else_body {
            let else_info = BranchInfo {
                branch_node_id: branch_id,
                branch_stmt: Some(if_stmt),
                branch_type: "ELSE".to_string(),
                branch_line,
                body_start_line: self.cpg.tu().line(else_body),
                body_end_line: self.cpg.tu().end_line(else_body),
            };
            let else_id = self.build_branch_body(else_body, depth + 1, &else_info);
            if else_id != INVALID_NODE {
                self.connect_nodes(branch_id, else_id, ComputeEdgeKind::Control, "else");
            }
            self.mark_nodes_in_branch(&else_info);
        }

        branch_id
    }

    /// Lower one branch arm; returns the first body node. Bare
    /// `break`/`continue`/`return` bodies are not descended into.
    fn build_branch_body(&mut self, body: StmtId, depth: u32, _info: &BranchInfo) -> NodeId {
        if depth >= self.limits.max_backward_depth {
            return INVALID_NODE;
        }
        if matches!(
            self.cpg.tu().stmt(body).kind,
            StmtKind::Break | StmtKind::Continue | StmtKind::Return { .. }
        ) {
            return INVALID_NODE;
        }
        if let Some(&cached) = self.processed_stmts.get(&body) {
            return cached;
        }

        if let StmtKind::Compound { stmts } = self.cpg.tu().stmt(body).kind.clone() {
            let mut body_id = INVALID_NODE;
            for stmt in stmts {
                if self.processed_stmts.contains_key(&stmt) {
                    continue;
                }
                let stmt_id = self.build_expression_tree(stmt, depth);
                if stmt_id != INVALID_NODE && body_id == INVALID_NODE {
                    body_id = stmt_id;
                }
            }
            body_id
        } else {
            self.build_expression_tree(body, depth)
        }
    }

    /// Stamp `branchContextId`/`branchType` and the `branch_label` property
    /// onto every node inside the arm's line range.
    pub(super) fn mark_nodes_in_branch(&mut self, info: &BranchInfo) {
        if info.branch_node_id == INVALID_NODE || info.branch_type.is_empty() {
            return;
        }
        if info.body_start_line == 0 || info.body_end_line == 0 {
            return;
        }

        let labelled = info.branch_type == "THEN"
            || info.branch_type == "ELSE"
            || info.branch_type == "DEFAULT"
            || info.branch_type.starts_with("CASE");
        if !labelled {
            return;
        }

        let in_branch: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|n| n.id != info.branch_node_id)
            .filter(|n| {
                n.source_line >= info.body_start_line && n.source_line <= info.body_end_line
            })
            .map(|n| n.id)
            .collect();

        for id in in_branch {
            if let Some(node) = self.graph.node_mut(id) {
                node.branch_context_id = info.branch_node_id;
                node.branch_type = info.branch_type.clone();
                node.branch_context_line = info.branch_line;
                node.set_property("branch_label", info.branch_type.clone());
            }
        }
    }

    // ------------------------------------------------------------
    // switch
    // ------------------------------------------------------------

    pub(super) fn build_switch_branch(&mut self, switch_stmt: StmtId, depth: u32) -> NodeId {
        if depth >= self.limits.max_backward_depth {
            return INVALID_NODE;
        }
        if let Some(&cached) = self.processed_stmts.get(&switch_stmt) {
            return cached;
        }

        let StmtKind::Switch { cond, body } = self.cpg.tu().stmt(switch_stmt).kind.clone() else {
            return INVALID_NODE;
        };

        let switch_id = self.graph.create_node(ComputeNodeKind::Branch);
        {
            let tu = self.cpg.tu();
            let line = tu.line(switch_stmt);
            let cond_text = tu.text(cond).to_string();
            let func = tu.containing_function(switch_stmt);
            if let Some(node) = self.graph.node_mut(switch_id) {
                node.name = "switch".to_string();
                node.ast_stmt = Some(switch_stmt);
                node.source_line = line;
                node.source_text = format!("switch ({cond_text})");
                node.containing_func = func;
                node.set_property("branch_type", "switch");
            }
        }
        self.graph.index_stmt(switch_stmt, switch_id);
        self.processed_stmts.insert(switch_stmt, switch_id);

        let cond_id = self.build_expression_tree(cond, depth + 1);
        self.connect_nodes(cond_id, switch_id, ComputeEdgeKind::Control, "condition");

        if let StmtKind::Compound { stmts } = self.cpg.tu().stmt(body).kind.clone() {
            self.process_switch_body(&stmts, switch_id, body, depth);
        } else {
            self.build_expression_tree(body, depth + 1);
        }

        switch_id
    }

    /// Walk the switch body; a label flips the current branch tag, each
    /// following statement is lowered and immediately stamped with it.
    fn process_switch_body(
        &mut self,
        stmts: &[StmtId],
        switch_id: NodeId,
        body: StmtId,
        depth: u32,
    ) {
        let branch_line = self.cpg.tu().line(body);
        let mut current_label = String::new();

        for &stmt in stmts {
            if let StmtKind::Case { value } = &self.cpg.tu().stmt(stmt).kind {
                current_label = match value {
                    Some(v) => format!("CASE {v}"),
                    None => "DEFAULT".to_string(),
                };
                continue;
            }
            if self.processed_stmts.contains_key(&stmt) {
                continue;
            }

            self.build_expression_tree(stmt, depth + 1);

            if !current_label.is_empty() {
                let line = self.cpg.tu().line(stmt);
                let info = BranchInfo {
                    branch_node_id: switch_id,
                    branch_stmt: None,
                    branch_type: current_label.clone(),
                    branch_line,
                    body_start_line: line,
                    body_end_line: line,
                };
                self.mark_nodes_in_branch(&info);
            }
        }
    }
}
