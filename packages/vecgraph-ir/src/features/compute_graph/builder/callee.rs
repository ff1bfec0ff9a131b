//! Interprocedural inlining: lowering a callee body into the caller's graph
//! with parameter wiring, return-value edges and inherited loop context.

use tracing::debug;

use crate::frontend::ast::{FuncId, StmtId, StmtKind, VarId};

use super::super::domain::{ComputeEdgeKind, ComputeNodeKind, NodeId, INVALID_NODE};
use super::ComputeGraphBuilder;

/// Loop context inherited by an inlined callee sub-graph
#[derive(Debug, Clone, Default)]
struct InheritedContext {
    loop_id: NodeId,
    loop_var: String,
    loop_line: u32,
}

impl ComputeGraphBuilder<'_> {
    /// Gate for callee analysis from a lowered call expression.
    pub(super) fn process_callee_analysis(&mut self, call_expr: StmtId, call_node_id: NodeId) {
        if !self.enable_interprocedural || self.call_depth >= self.limits.max_call_depth {
            return;
        }
        let StmtKind::Call { callee, .. } = &self.cpg.tu().stmt(call_expr).kind else {
            return;
        };
        let Some(callee) = *callee else {
            return;
        };

        if self.cpg.tu().is_intrinsic_function(callee) {
            if let Some(node) = self.graph.node_mut(call_node_id) {
                node.kind = ComputeNodeKind::IntrinsicCall;
                node.set_property("is_intrinsic", "true");
            }
            return;
        }
        if !self.cpg.tu().func(callee).has_body() {
            return;
        }
        if self.call_stack.contains(&callee) {
            // Recursive call chain: silent cutoff.
            return;
        }

        self.call_stack.insert(callee);
        self.call_depth += 1;
        self.analyze_callee_body(callee, call_node_id, call_expr);
        self.call_depth -= 1;
        self.call_stack.remove(&callee);
    }

    fn analyze_callee_body(&mut self, callee: FuncId, call_node_id: NodeId, call_expr: StmtId) {
        let callee_name = self.cpg.tu().func(callee).name.clone();
        debug!(callee = %callee_name, "inlining callee body");

        if let Some(node) = self.graph.node_mut(call_node_id) {
            node.set_property("callee_analyzed", "true");
            node.set_property("callee_name", callee_name);
        }

        let inherited = self.inherit_loop_context(call_node_id);

        // The callee may have been lowered for another call site; clear its
        // cached statements so this instance re-lowers with fresh context.
        self.clear_callee_stmts(callee);

        let param_nodes = self.create_param_nodes_for_callee(callee, call_expr, call_node_id, &inherited);
        self.register_param_refs_in_callee(callee, &param_nodes);
        self.process_callee_body_stmts(callee, call_node_id, &inherited);
        self.propagate_context_to_callee_nodes(callee, call_node_id, &inherited);
    }

    /// Context for the inlined sub-graph: the call node's own loop context,
    /// or the anchor's loop when the call sits inside its body range.
    fn inherit_loop_context(&self, call_node_id: NodeId) -> InheritedContext {
        let Some(call_node) = self.graph.node(call_node_id) else {
            return InheritedContext::default();
        };
        if call_node.loop_context_id != INVALID_NODE {
            return InheritedContext {
                loop_id: call_node.loop_context_id,
                loop_var: call_node.loop_context_var.clone(),
                loop_line: call_node.loop_context_line,
            };
        }
        if self.loop_info.loop_node_id == INVALID_NODE {
            return InheritedContext::default();
        }
        let call_line = call_node.source_line;
        let in_loop = call_line >= self.loop_info.body_start_line
            && call_line <= self.loop_info.body_end_line;
        if !in_loop {
            return InheritedContext::default();
        }
        InheritedContext {
            loop_id: self.loop_info.loop_node_id,
            loop_var: self.loop_info.loop_var_name.clone(),
            loop_line: self
                .graph
                .node(self.loop_info.loop_node_id)
                .map(|n| n.source_line)
                .unwrap_or(0),
        }
    }

    fn clear_callee_stmts(&mut self, callee: FuncId) {
        let Some(body) = self.cpg.tu().func(callee).body else {
            return;
        };
        for stmt in self.cpg.tu().collect_stmts(body) {
            self.processed_stmts.remove(&stmt);
        }
    }

    fn apply_inherited_context(&mut self, node_id: NodeId, inherited: &InheritedContext) {
        if node_id == INVALID_NODE || inherited.loop_id == INVALID_NODE {
            return;
        }
        if let Some(node) = self.graph.node_mut(node_id) {
            node.loop_context_id = inherited.loop_id;
            node.loop_context_var = inherited.loop_var.clone();
            node.loop_context_line = inherited.loop_line;
            node.set_property("in_loop_context", "true");
        }
    }

    /// One fresh Parameter node per matched actual/formal pair, fed by the
    /// lowered argument through a Call edge.
    fn create_param_nodes_for_callee(
        &mut self,
        callee: FuncId,
        call_expr: StmtId,
        call_node_id: NodeId,
        inherited: &InheritedContext,
    ) -> Vec<(VarId, NodeId)> {
        let args = match &self.cpg.tu().stmt(call_expr).kind {
            StmtKind::Call { args, .. } => args.clone(),
            _ => return Vec::new(),
        };
        let params = self.cpg.tu().func(callee).params.clone();
        let count = args.len().min(params.len());
        let mut param_nodes = Vec::with_capacity(count);

        for i in 0..count {
            let param = params[i];
            let info = self.cpg.tu().var(param).clone();

            let param_node = self.graph.create_node(ComputeNodeKind::Parameter);
            if let Some(node) = self.graph.node_mut(param_node) {
                node.name = info.name;
                node.data_type = info.data_type;
                node.ast_decl = Some(param);
                node.containing_func = Some(callee);
                node.set_property("is_formal_param", "true");
                node.set_property("call_site_id", call_node_id.to_string());
            }
            self.apply_inherited_context(param_node, inherited);
            param_nodes.push((param, param_node));

            let arg = self.cpg.tu().skip_parens(args[i]);
            let arg_id = self.build_expression_tree(arg, 0);
            if arg_id != INVALID_NODE {
                let label = format!("param_{i}");
                self.connect_nodes(arg_id, param_node, ComputeEdgeKind::Call, &label);
            }
        }
        param_nodes
    }

    /// Pre-register every reference to a formal inside the callee body so
    /// later lowering reuses the parameter node.
    fn register_param_refs_in_callee(&mut self, callee: FuncId, param_nodes: &[(VarId, NodeId)]) {
        let Some(body) = self.cpg.tu().func(callee).body else {
            return;
        };
        for var_ref in self.cpg.tu().collect_var_refs(body) {
            let StmtKind::DeclRef { var } = self.cpg.tu().stmt(var_ref).kind else {
                continue;
            };
            if let Some(&(_, node_id)) = param_nodes.iter().find(|(p, _)| *p == var) {
                self.processed_stmts.insert(var_ref, node_id);
            }
        }
    }

    /// Lower every declaration, assignment and return of the callee body,
    /// stamping ownership, call-site id and inherited loop context.
    fn process_callee_body_stmts(
        &mut self,
        callee: FuncId,
        call_node_id: NodeId,
        inherited: &InheritedContext,
    ) {
        let Some(body) = self.cpg.tu().func(callee).body else {
            return;
        };

        let mut declarations: Vec<StmtId> = Vec::new();
        let mut assignments: Vec<StmtId> = Vec::new();
        let mut returns: Vec<StmtId> = Vec::new();
        for stmt in self.cpg.tu().collect_stmts(body) {
            match &self.cpg.tu().stmt(stmt).kind {
                StmtKind::Decl { .. } => declarations.push(stmt),
                StmtKind::Binary { op, .. } if op.is_assignment() => assignments.push(stmt),
                StmtKind::Return { .. } => returns.push(stmt),
                _ => {}
            }
        }

        for stmt in declarations.into_iter().chain(assignments) {
            let node_id = self.build_expression_tree(stmt, 0);
            if node_id == INVALID_NODE {
                continue;
            }
            if let Some(node) = self.graph.node_mut(node_id) {
                node.containing_func = Some(callee);
                node.set_property("call_site_id", call_node_id.to_string());
            }
            self.apply_inherited_context(node_id, inherited);
        }

        self.process_callee_returns(&returns, callee, call_node_id, inherited);
    }

    fn process_callee_returns(
        &mut self,
        returns: &[StmtId],
        callee: FuncId,
        call_node_id: NodeId,
        inherited: &InheritedContext,
    ) {
        let mut has_explicit_return = false;
        let mut return_nodes: Vec<NodeId> = Vec::new();

        for &ret in returns {
            let StmtKind::Return { value: Some(value) } = self.cpg.tu().stmt(ret).kind else {
                continue;
            };
            has_explicit_return = true;

            let value = self.cpg.tu().skip_parens(value);
            let ret_node = self.build_expression_tree(value, 0);
            if ret_node == INVALID_NODE {
                continue;
            }
            return_nodes.push(ret_node);
            if let Some(node) = self.graph.node_mut(ret_node) {
                node.containing_func = Some(callee);
                node.set_property("call_site_id", call_node_id.to_string());
                node.set_property("is_return_value", "true");
            }
            self.apply_inherited_context(ret_node, inherited);

            self.connect_nodes(ret_node, call_node_id, ComputeEdgeKind::Return, "return");
            if let Some(call_node) = self.graph.node_mut(call_node_id) {
                call_node.set_property("return_node", ret_node.to_string());
            }
        }

        if !has_explicit_return && !self.cpg.tu().func(callee).returns_void() {
            let implicit = self.find_implicit_return_value(callee, call_node_id);
            if implicit != INVALID_NODE {
                debug!(node = implicit, "using implicit return value");
                self.connect_nodes(
                    implicit,
                    call_node_id,
                    ComputeEdgeKind::Return,
                    "implicit_return",
                );
                return_nodes.push(implicit);
                if let Some(node) = self.graph.node_mut(implicit) {
                    node.set_property("is_return_value", "true");
                }
                if let Some(call_node) = self.graph.node_mut(call_node_id) {
                    call_node.set_property("return_node", implicit.to_string());
                    call_node.set_property("implicit_return", "true");
                }
            }
        }

        // A return-value node with no inputs has not been tied into its
        // operands yet; run one backward pass on its statement.
        for ret_node in return_nodes {
            let has_incoming = self
                .graph
                .node(ret_node)
                .map(|n| !n.input_nodes.is_empty())
                .unwrap_or(true);
            if has_incoming {
                continue;
            }
            let stmt = self
                .processed_stmts
                .iter()
                .find(|(_, &id)| id == ret_node)
                .map(|(&s, _)| s);
            if let Some(stmt) = stmt {
                self.trace_all_definitions_backward(stmt, 1);
            }
        }
    }

    /// Implicit return: the trailing expression of the body, else a
    /// callee-owned union MemberAccess at this call site.
    fn find_implicit_return_value(&self, callee: FuncId, call_node_id: NodeId) -> NodeId {
        let tu = self.cpg.tu();
        if let Some(body) = tu.func(callee).body {
            if let StmtKind::Compound { stmts } = &tu.stmt(body).kind {
                if let Some(&last) = stmts.last() {
                    if let Some(&node) = self.processed_stmts.get(&last) {
                        return node;
                    }
                }
            }
        }

        let call_site = call_node_id.to_string();
        for node in self.graph.nodes() {
            if node.containing_func != Some(callee) {
                continue;
            }
            if node.property("call_site_id") != call_site {
                continue;
            }
            if node.kind == ComputeNodeKind::MemberAccess
                && node.property_is("is_union_member", "true")
            {
                return node.id;
            }
        }
        INVALID_NODE
    }

    /// Re-stamp every callee-body node: nodes created through deeper
    /// recursion may have missed the initial stamping.
    fn propagate_context_to_callee_nodes(
        &mut self,
        callee: FuncId,
        call_node_id: NodeId,
        inherited: &InheritedContext,
    ) {
        let Some(body) = self.cpg.tu().func(callee).body else {
            return;
        };
        let call_site = call_node_id.to_string();

        for stmt in self.cpg.tu().collect_stmts(body) {
            let Some(&node_id) = self.processed_stmts.get(&stmt) else {
                continue;
            };
            let Some(node) = self.graph.node_mut(node_id) else {
                continue;
            };
            if node.containing_func.is_none() {
                node.containing_func = Some(callee);
            }
            if node.property("call_site_id").is_empty() {
                node.set_property("call_site_id", call_site.clone());
            }
            if inherited.loop_id != INVALID_NODE && node.loop_context_id == INVALID_NODE {
                node.loop_context_id = inherited.loop_id;
                node.loop_context_var = inherited.loop_var.clone();
                node.loop_context_line = inherited.loop_line;
                node.set_property("in_loop_context", "true");
            }
        }
    }
}
