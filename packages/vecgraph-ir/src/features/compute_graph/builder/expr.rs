//! Expression lowering: the statement-shape to node-kind table and the
//! per-shape child wiring.

use crate::frontend::ast::{BinOp, StmtId, StmtKind, UnOp};
use crate::shared::models::{DataTypeInfo, OpCode};

use super::super::domain::{ComputeEdgeKind, ComputeNodeKind, ConstValue, NodeId, INVALID_NODE};
use super::ComputeGraphBuilder;

impl ComputeGraphBuilder<'_> {
    /// Lower a statement into the graph, returning its node id (0 on a
    /// depth-cap hit). Re-entry through `processed_stmts` returns the
    /// cached node.
    pub(crate) fn build_expression_tree(&mut self, stmt: StmtId, depth: u32) -> NodeId {
        if depth > self.limits.max_expr_depth {
            return INVALID_NODE;
        }

        // Purely structural wrappers vanish: no node is created.
        if let StmtKind::Paren { inner } = self.cpg.tu().stmt(stmt).kind {
            return self.build_expression_tree(inner, depth);
        }

        if let Some(&cached) = self.processed_stmts.get(&stmt) {
            return cached;
        }

        // Control-flow hoist: an unprocessed enclosing if/switch/loop is
        // lowered first so container nodes precede their contents.
        if let Some(enclosing) = self.find_enclosing_control_flow(stmt) {
            self.build_expression_tree(enclosing, depth);
            if let Some(&cached) = self.processed_stmts.get(&stmt) {
                return cached;
            }
        }

        match self.cpg.tu().stmt(stmt).kind.clone() {
            StmtKind::If { .. } => return self.build_if_branch(stmt, depth),
            StmtKind::Switch { .. } => return self.build_switch_branch(stmt, depth),
            _ => {}
        }

        let node_id = self.create_node_from_stmt(stmt);
        if node_id == INVALID_NODE {
            return INVALID_NODE;
        }

        self.apply_loop_context(node_id, stmt);
        self.process_statement_children(stmt, node_id, depth);
        node_id
    }

    /// Nearest unprocessed enclosing control-flow statement, stopping at the
    /// function boundary and at already-processed parents.
    fn find_enclosing_control_flow(&self, stmt: StmtId) -> Option<StmtId> {
        let tu = self.cpg.tu();
        let mut cursor = tu.parent(stmt);
        while let Some(parent) = cursor {
            if self.processed_stmts.contains_key(&parent) {
                return None;
            }
            if matches!(
                tu.stmt(parent).kind,
                StmtKind::If { .. }
                    | StmtKind::Switch { .. }
                    | StmtKind::For { .. }
                    | StmtKind::While { .. }
                    | StmtKind::DoWhile { .. }
            ) {
                return Some(parent);
            }
            cursor = tu.parent(parent);
        }
        None
    }

    /// Stamp the loop context from an already-processed enclosing loop.
    pub(super) fn apply_loop_context(&mut self, node_id: NodeId, stmt: StmtId) {
        let already_set = self
            .graph
            .node(node_id)
            .map(|n| n.loop_context_id != INVALID_NODE)
            .unwrap_or(true);
        if already_set {
            return;
        }

        let tu = self.cpg.tu();
        let mut cursor = tu.parent(stmt);
        while let Some(parent) = cursor {
            let is_loop = matches!(
                tu.stmt(parent).kind,
                StmtKind::For { .. } | StmtKind::While { .. } | StmtKind::DoWhile { .. }
            );
            if is_loop {
                if let Some(&loop_id) = self.processed_stmts.get(&parent) {
                    let loop_line = self
                        .graph
                        .node(loop_id)
                        .map(|n| n.source_line)
                        .unwrap_or(0);
                    if let Some(node) = self.graph.node_mut(node_id) {
                        node.loop_context_id = loop_id;
                        node.loop_context_line = loop_line;
                        node.set_property("loop_context", format!("IN LOOP[{loop_id}]"));
                    }
                    return;
                }
            }
            cursor = tu.parent(parent);
        }
    }

    // ------------------------------------------------------------
    // Node creation (the shape table)
    // ------------------------------------------------------------

    pub(super) fn create_node_from_stmt(&mut self, stmt: StmtId) -> NodeId {
        if let Some(&cached) = self.processed_stmts.get(&stmt) {
            return cached;
        }

        let kind = self.cpg.tu().stmt(stmt).kind.clone();
        let node_id = match kind {
            StmtKind::Binary { op, lhs, rhs } => self.create_binary_op_node(stmt, op, lhs, rhs),
            StmtKind::Unary { op, operand } => self.create_unary_op_node(op, operand),
            StmtKind::DeclRef { var } => {
                let info = self.cpg.tu().var(var).clone();
                let id = if info.is_param {
                    self.graph.create_node(ComputeNodeKind::Parameter)
                } else {
                    self.graph.create_node(ComputeNodeKind::Variable)
                };
                if let Some(node) = self.graph.node_mut(id) {
                    node.name = info.name;
                    node.data_type = info.data_type;
                    node.ast_decl = Some(var);
                }
                id
            }
            StmtKind::IntLiteral { value } => {
                let id = self.graph.create_node(ComputeNodeKind::Constant);
                if let Some(node) = self.graph.node_mut(id) {
                    node.const_value = Some(ConstValue::Int(value));
                    node.name = value.to_string();
                    node.data_type = DataTypeInfo::from_type_name("int");
                }
                id
            }
            StmtKind::FloatLiteral { value } => {
                let id = self.graph.create_node(ComputeNodeKind::Constant);
                if let Some(node) = self.graph.node_mut(id) {
                    node.const_value = Some(ConstValue::Float(value));
                    node.name = format!("{value}");
                    node.data_type = DataTypeInfo::from_type_name("double");
                }
                id
            }
            StmtKind::Decl { ref decls } => {
                let id = self.graph.create_node(ComputeNodeKind::Variable);
                if let Some(&(var, _)) = decls.first() {
                    let info = self.cpg.tu().var(var).clone();
                    if let Some(node) = self.graph.node_mut(id) {
                        node.name = info.name;
                        node.data_type = info.data_type;
                        node.ast_decl = Some(var);
                    }
                }
                id
            }
            StmtKind::ArraySubscript { base, index } => {
                self.create_array_access_node(base, index)
            }
            StmtKind::Member {
                base: _,
                ref field,
                arrow,
            } => {
                let id = self.graph.create_node(ComputeNodeKind::MemberAccess);
                let base_text = self.member_base_name(stmt);
                if let Some(node) = self.graph.node_mut(id) {
                    let sep = if arrow { "->" } else { "." };
                    node.name = format!("{base_text}{sep}{field}");
                }
                id
            }
            StmtKind::Call {
                callee,
                ref callee_name,
                ..
            } => {
                let id = self.graph.create_node(ComputeNodeKind::Call);
                let return_type = callee
                    .map(|c| self.cpg.tu().func(c).return_type.clone())
                    .unwrap_or_default();
                if let Some(node) = self.graph.node_mut(id) {
                    node.name = if callee_name.is_empty() {
                        "call".to_string()
                    } else {
                        callee_name.clone()
                    };
                    node.data_type = return_type;
                }
                id
            }
            StmtKind::Conditional { .. } => {
                let id = self.graph.create_node(ComputeNodeKind::Select);
                if let Some(node) = self.graph.node_mut(id) {
                    node.name = "select".to_string();
                }
                id
            }
            StmtKind::Return { .. } => {
                let id = self.graph.create_node(ComputeNodeKind::Return);
                if let Some(node) = self.graph.node_mut(id) {
                    node.name = "return".to_string();
                }
                id
            }
            StmtKind::For { .. } => self.create_loop_node("for"),
            StmtKind::While { .. } => self.create_loop_node("while"),
            StmtKind::DoWhile { .. } => self.create_loop_node("do_while"),
            StmtKind::If { .. } | StmtKind::Switch { .. } => {
                // Normally routed through the branch builders.
                let id = self.graph.create_node(ComputeNodeKind::Branch);
                if let Some(node) = self.graph.node_mut(id) {
                    node.name = "branch".to_string();
                }
                id
            }
            StmtKind::Cast { ref target, .. } => {
                let id = self.graph.create_node(ComputeNodeKind::Cast);
                if let Some(node) = self.graph.node_mut(id) {
                    node.name = "cast".to_string();
                    node.data_type = DataTypeInfo::from_type_name(target);
                    node.set_property("cast_type", target.clone());
                }
                id
            }
            StmtKind::Paren { .. } => INVALID_NODE,
            other => {
                let id = self.graph.create_node(ComputeNodeKind::Unknown);
                if let Some(node) = self.graph.node_mut(id) {
                    node.name = match other {
                        StmtKind::Compound { .. } => "compound".to_string(),
                        StmtKind::Case { .. } => "case".to_string(),
                        StmtKind::Break => "break".to_string(),
                        StmtKind::Continue => "continue".to_string(),
                        StmtKind::Unknown { description } => description,
                        _ => "stmt".to_string(),
                    };
                }
                id
            }
        };

        if node_id == INVALID_NODE {
            return INVALID_NODE;
        }

        let tu = self.cpg.tu();
        let text = tu.text(stmt).to_string();
        let line = tu.line(stmt);
        let func = tu.containing_function(stmt);
        if let Some(node) = self.graph.node_mut(node_id) {
            node.ast_stmt = Some(stmt);
            node.source_text = text;
            node.source_line = line;
            node.containing_func = func;
        }
        self.graph.index_stmt(stmt, node_id);
        self.processed_stmts.insert(stmt, node_id);
        node_id
    }

    fn create_loop_node(&mut self, loop_type: &str) -> NodeId {
        let id = self.graph.create_node(ComputeNodeKind::Loop);
        if let Some(node) = self.graph.node_mut(id) {
            node.name = loop_type.to_string();
            node.set_property("loop_type", loop_type);
        }
        id
    }

    fn create_binary_op_node(
        &mut self,
        _stmt: StmtId,
        op: BinOp,
        lhs: StmtId,
        rhs: StmtId,
    ) -> NodeId {
        let op_code = crate::features::anchor::op_code_of(op);
        let kind = if op_code.is_comparison() {
            ComputeNodeKind::CompareOp
        } else {
            ComputeNodeKind::BinaryOp
        };
        let id = self.graph.create_node(kind);
        if let Some(node) = self.graph.node_mut(id) {
            node.op_code = op_code;
            node.name = op_code.as_str().to_string();
        }

        // Increment normalization: `x += k`, `x -= k`, `x = x ± k`.
        if !self.detect_compound_assign_increment(id, op, lhs, rhs) {
            self.detect_assignment_increment(id, op, lhs, rhs);
        }
        id
    }

    /// `x += k` / `x -= k` with a DeclRef LHS and an integer literal RHS.
    fn detect_compound_assign_increment(
        &mut self,
        node_id: NodeId,
        op: BinOp,
        lhs: StmtId,
        rhs: StmtId,
    ) -> bool {
        if !matches!(op, BinOp::AddAssign | BinOp::SubAssign) {
            return false;
        }
        let tu = self.cpg.tu();
        let StmtKind::DeclRef { var } = tu.stmt(tu.skip_parens(lhs)).kind else {
            return false;
        };
        let StmtKind::IntLiteral { value } = tu.stmt(tu.skip_parens(rhs)).kind else {
            return false;
        };
        let step = if op == BinOp::SubAssign { -value } else { value };
        let var_name = tu.var(var).name.clone();
        self.mark_increment(node_id, &var_name, step);
        true
    }

    /// `x = x + k` / `x = x - k` normalized to the compound form.
    fn detect_assignment_increment(
        &mut self,
        node_id: NodeId,
        op: BinOp,
        lhs: StmtId,
        rhs: StmtId,
    ) -> bool {
        if op != BinOp::Assign {
            return false;
        }
        let tu = self.cpg.tu();
        let StmtKind::DeclRef { var: lhs_var } = tu.stmt(tu.skip_parens(lhs)).kind else {
            return false;
        };
        let StmtKind::Binary {
            op: rhs_op,
            lhs: rhs_lhs,
            rhs: rhs_rhs,
        } = tu.stmt(tu.skip_parens(rhs)).kind
        else {
            return false;
        };
        if !matches!(rhs_op, BinOp::Add | BinOp::Sub) {
            return false;
        }
        let StmtKind::DeclRef { var: rhs_var } = tu.stmt(tu.skip_parens(rhs_lhs)).kind else {
            return false;
        };
        let StmtKind::IntLiteral { value } = tu.stmt(tu.skip_parens(rhs_rhs)).kind else {
            return false;
        };
        if rhs_var != lhs_var {
            return false;
        }
        let step = if rhs_op == BinOp::Sub { -value } else { value };
        let var_name = tu.var(lhs_var).name.clone();
        self.mark_increment(node_id, &var_name, step);
        true
    }

    fn mark_increment(&mut self, node_id: NodeId, var_name: &str, step: i64) {
        if let Some(node) = self.graph.node_mut(node_id) {
            node.set_property("is_increment", "true");
            node.set_property("increment_var", var_name);
            node.set_property("increment_step", step.to_string());
            let sign = if step >= 0 { "+=" } else { "-=" };
            node.name = format!("{var_name}{sign}{}", step.abs());
        }
    }

    fn create_unary_op_node(&mut self, op: UnOp, operand: StmtId) -> NodeId {
        let tu = self.cpg.tu();
        if op.is_inc_dec() {
            // `++`/`--` is represented as the normalized increment BinaryOp.
            let id = self.graph.create_node(ComputeNodeKind::BinaryOp);
            let var_name = match tu.stmt(tu.skip_parens(operand)).kind {
                StmtKind::DeclRef { var } => tu.var(var).name.clone(),
                _ => String::new(),
            };
            let is_increment = op.is_increment();
            let original_form = match op {
                UnOp::PostInc => "post_inc",
                UnOp::PreInc => "pre_inc",
                UnOp::PostDec => "post_dec",
                _ => "pre_dec",
            };
            if let Some(node) = self.graph.node_mut(id) {
                node.op_code = if is_increment { OpCode::Add } else { OpCode::Sub };
                node.name = format!("{var_name}{}1", if is_increment { "+=" } else { "-=" });
                node.set_property("is_increment", "true");
                node.set_property("increment_var", var_name);
                node.set_property("increment_step", if is_increment { "1" } else { "-1" });
                node.set_property("original_form", original_form);
            }
            return id;
        }

        let id = self.graph.create_node(ComputeNodeKind::UnaryOp);
        let op_code = match op {
            UnOp::Neg => OpCode::Neg,
            UnOp::Not => OpCode::Not,
            UnOp::BitNot => OpCode::BitNot,
            _ => OpCode::Unknown,
        };
        if let Some(node) = self.graph.node_mut(id) {
            node.op_code = op_code;
            node.name = op_code.as_str().to_string();
        }
        id
    }

    fn create_array_access_node(&mut self, base: StmtId, index: StmtId) -> NodeId {
        let tu = self.cpg.tu();
        let base_name = match tu.stmt(tu.skip_parens(base)).kind {
            StmtKind::DeclRef { var } => tu.var(var).name.clone(),
            _ => String::new(),
        };
        let index_name = match tu.stmt(tu.skip_parens(index)).kind {
            StmtKind::DeclRef { var } => tu.var(var).name.clone(),
            StmtKind::IntLiteral { value } => value.to_string(),
            _ => String::new(),
        };
        let element_type = match tu.stmt(tu.skip_parens(base)).kind {
            StmtKind::DeclRef { var } => {
                let spelled = tu.var(var).type_name.replace(['*', '['], " ");
                DataTypeInfo::from_type_name(spelled.trim_end_matches([' ', ']']))
            }
            _ => DataTypeInfo::default(),
        };

        let id = self.graph.create_node(ComputeNodeKind::ArrayAccess);
        if let Some(node) = self.graph.node_mut(id) {
            node.name = if base_name.is_empty() {
                "[]".to_string()
            } else {
                let idx = if index_name.is_empty() {
                    "?"
                } else {
                    index_name.as_str()
                };
                format!("{base_name}[{idx}]")
            };
            node.data_type = element_type;
        }
        id
    }

    fn member_base_name(&self, member: StmtId) -> String {
        let tu = self.cpg.tu();
        let StmtKind::Member { base, .. } = tu.stmt(member).kind else {
            return String::new();
        };
        match tu.stmt(tu.skip_parens(base)).kind {
            StmtKind::DeclRef { var } => tu.var(var).name.clone(),
            _ => tu.text(tu.skip_parens(base)).to_string(),
        }
    }

    // ------------------------------------------------------------
    // Child wiring
    // ------------------------------------------------------------

    pub(super) fn process_statement_children(&mut self, stmt: StmtId, node_id: NodeId, depth: u32) {
        match self.cpg.tu().stmt(stmt).kind.clone() {
            StmtKind::Binary { op, lhs, rhs } => {
                if op.is_compound_assignment() {
                    self.wire_compound_assignment(node_id, lhs, rhs, depth);
                } else if op == BinOp::Assign {
                    self.wire_assignment(node_id, lhs, rhs, depth);
                } else {
                    self.wire_plain_binary(node_id, lhs, rhs, depth);
                }
            }
            StmtKind::Unary { operand, .. } => {
                let operand_id = self.build_expression_tree(operand, depth + 1);
                self.connect_nodes(operand_id, node_id, ComputeEdgeKind::DataFlow, "operand");
            }
            StmtKind::ArraySubscript { base, index } => {
                let base_id = self.build_expression_tree(base, depth + 1);
                self.connect_nodes(base_id, node_id, ComputeEdgeKind::DataFlow, "base");
                let index_id = self.build_expression_tree(index, depth + 1);
                self.connect_nodes(index_id, node_id, ComputeEdgeKind::DataFlow, "index");
            }
            StmtKind::Call { args, .. } => {
                for (i, arg) in args.iter().enumerate() {
                    let arg_id = self.build_expression_tree(*arg, depth + 1);
                    let label = format!("arg{i}");
                    self.connect_nodes(arg_id, node_id, ComputeEdgeKind::DataFlow, &label);
                }
                self.process_callee_analysis(stmt, node_id);
            }
            StmtKind::Cast { operand, .. } => {
                let operand_id = self.build_expression_tree(operand, depth + 1);
                self.connect_nodes(operand_id, node_id, ComputeEdgeKind::DataFlow, "cast");
            }
            StmtKind::Member { .. } => {
                self.process_member_expr(stmt, node_id, depth);
            }
            StmtKind::For { init, cond, inc, .. } => {
                if let Some(init) = init {
                    let init_id = self.build_expression_tree(init, depth + 1);
                    self.connect_nodes(init_id, node_id, ComputeEdgeKind::Control, "init");
                }
                if let Some(cond) = cond {
                    let cond_id = self.build_expression_tree(cond, depth + 1);
                    self.connect_nodes(cond_id, node_id, ComputeEdgeKind::Control, "condition");
                }
                if let Some(inc) = inc {
                    let inc_id = self.build_expression_tree(inc, depth + 1);
                    self.connect_nodes(inc_id, node_id, ComputeEdgeKind::Control, "increment");
                }
            }
            StmtKind::While { cond, .. } | StmtKind::DoWhile { cond, .. } => {
                let cond_id = self.build_expression_tree(cond, depth + 1);
                self.connect_nodes(cond_id, node_id, ComputeEdgeKind::Control, "condition");
            }
            StmtKind::Conditional {
                cond,
                then_value,
                else_value,
            } => {
                let cond_id = self.build_expression_tree(cond, depth + 1);
                self.connect_nodes(cond_id, node_id, ComputeEdgeKind::Control, "condition");
                let then_id = self.build_expression_tree(then_value, depth + 1);
                self.connect_nodes(then_id, node_id, ComputeEdgeKind::DataFlow, "true_val");
                let else_id = self.build_expression_tree(else_value, depth + 1);
                self.connect_nodes(else_id, node_id, ComputeEdgeKind::DataFlow, "false_val");
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    let value_id = self.build_expression_tree(value, depth + 1);
                    self.connect_nodes(value_id, node_id, ComputeEdgeKind::DataFlow, "child");
                }
            }
            StmtKind::Decl { decls } => {
                for (_, init) in decls {
                    if let Some(init) = init {
                        let init_id = self.build_expression_tree(init, depth + 1);
                        self.connect_nodes(init_id, node_id, ComputeEdgeKind::DataFlow, "init");
                    }
                }
            }
            StmtKind::DeclRef { .. }
            | StmtKind::IntLiteral { .. }
            | StmtKind::FloatLiteral { .. }
            | StmtKind::Case { .. }
            | StmtKind::Break
            | StmtKind::Continue => {}
            other => {
                // Generic fallback: every child feeds the node.
                let children = match other {
                    StmtKind::Compound { stmts } => stmts,
                    _ => self.cpg.tu().children(stmt),
                };
                for child in children {
                    let child_id = self.build_expression_tree(child, depth + 1);
                    self.connect_nodes(child_id, node_id, ComputeEdgeKind::DataFlow, "child");
                }
            }
        }
    }

    /// `x op= rhs`: the LHS is read and written.
    fn wire_compound_assignment(&mut self, node_id: NodeId, lhs: StmtId, rhs: StmtId, depth: u32) {
        if let Some(node) = self.graph.node_mut(node_id) {
            node.set_property("is_compound_assign", "true");
        }
        let lhs_id = self.build_expression_tree(lhs, depth + 1);
        if lhs_id != INVALID_NODE {
            self.connect_nodes(lhs_id, node_id, ComputeEdgeKind::DataFlow, "lhs_read");
            self.connect_nodes(node_id, lhs_id, ComputeEdgeKind::DataFlow, "assign_to");
            if let Some(lhs_node) = self.graph.node_mut(lhs_id) {
                lhs_node.set_property("is_assign_target", "true");
                lhs_node.set_property("is_read_write", "true");
            }
            self.re_alias_union_member(lhs_id);
        }
        let rhs_id = self.build_expression_tree(rhs, depth + 1);
        self.connect_nodes(rhs_id, node_id, ComputeEdgeKind::DataFlow, "rhs");
    }

    /// `x = rhs`: the RHS is lowered first, the LHS is write-only.
    fn wire_assignment(&mut self, node_id: NodeId, lhs: StmtId, rhs: StmtId, depth: u32) {
        let rhs_id = self.build_expression_tree(rhs, depth + 1);
        self.connect_nodes(rhs_id, node_id, ComputeEdgeKind::DataFlow, "rhs");

        let lhs_id = self.build_expression_tree(lhs, depth + 1);
        if lhs_id != INVALID_NODE {
            self.connect_nodes(node_id, lhs_id, ComputeEdgeKind::DataFlow, "assign_to");
            if let Some(lhs_node) = self.graph.node_mut(lhs_id) {
                lhs_node.set_property("is_assign_target", "true");
            }
            self.re_alias_union_member(lhs_id);
        }
    }

    fn wire_plain_binary(&mut self, node_id: NodeId, lhs: StmtId, rhs: StmtId, depth: u32) {
        let lhs_id = self.build_expression_tree(lhs, depth + 1);
        self.connect_nodes(lhs_id, node_id, ComputeEdgeKind::DataFlow, "lhs");
        let rhs_id = self.build_expression_tree(rhs, depth + 1);
        self.connect_nodes(rhs_id, node_id, ComputeEdgeKind::DataFlow, "rhs");
    }

    // ------------------------------------------------------------
    // Member access and union aliasing
    // ------------------------------------------------------------

    fn process_member_expr(&mut self, stmt: StmtId, node_id: NodeId, depth: u32) {
        let tu = self.cpg.tu();
        let StmtKind::Member { base, field, .. } = tu.stmt(stmt).kind.clone() else {
            return;
        };
        let base_stmt = tu.skip_parens(base);
        let base_id = self.build_expression_tree(base_stmt, depth + 1);
        if base_id == INVALID_NODE {
            return;
        }

        let union_record = match self.cpg.tu().stmt(base_stmt).kind {
            StmtKind::DeclRef { var } => self
                .cpg
                .tu()
                .var(var)
                .record
                .filter(|&r| self.cpg.tu().record(r).is_union),
            _ => None,
        };

        if union_record.is_some() {
            self.handle_union_member_access(base_id, node_id, &field, base_stmt);
        } else {
            self.connect_nodes(base_id, node_id, ComputeEdgeKind::DataFlow, "base");
        }
    }

    fn handle_union_member_access(
        &mut self,
        base_id: NodeId,
        node_id: NodeId,
        field: &str,
        base_stmt: StmtId,
    ) {
        let union_var_name = {
            let from_node = self
                .graph
                .node(base_id)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            if !from_node.is_empty() {
                from_node
            } else {
                match self.cpg.tu().stmt(base_stmt).kind {
                    StmtKind::DeclRef { var } => self.cpg.tu().var(var).name.clone(),
                    _ => String::new(),
                }
            }
        };
        let base_call_site = self
            .graph
            .node(base_id)
            .filter(|n| n.has_property("call_site_id"))
            .map(|n| n.property("call_site_id").to_string());

        if let Some(node) = self.graph.node_mut(node_id) {
            node.set_property("is_union_member", "true");
            node.set_property("union_base_id", base_id.to_string());
            if !union_var_name.is_empty() {
                node.set_property("union_var", union_var_name.clone());
                node.name = format!("{union_var_name}.{field}");
            }
            if let Some(call_site) = base_call_site {
                node.set_property("call_site_id", call_site);
            }
        }

        self.connect_union_aliases(node_id, field);
        self.connect_nodes(base_id, node_id, ComputeEdgeKind::DataFlow, "union_member");
    }

    /// Memory edges between sibling members of the same union instance.
    /// Directed write->read when one side is an assignment target; a
    /// lower-id tiebreaker gives undirected pairs exactly one edge.
    pub(super) fn connect_union_aliases(&mut self, current_id: NodeId, current_field: &str) {
        let Some(current) = self.graph.node(current_id) else {
            return;
        };
        let current_union_var = current.property("union_var").to_string();
        let current_call_site = current.property("call_site_id").to_string();
        let current_func = current.containing_func;
        let current_writes = current.property_is("is_assign_target", "true");
        if current_union_var.is_empty() {
            return;
        }

        struct Sibling {
            id: NodeId,
            field: String,
            writes: bool,
        }

        let mut siblings: Vec<Sibling> = Vec::new();
        for node in self.graph.nodes() {
            if node.id == current_id || !node.property_is("is_union_member", "true") {
                continue;
            }
            if node.property("union_var") != current_union_var {
                continue;
            }
            let other_call_site = node.property("call_site_id");
            // Same inlined instance only: both call sites match, or neither
            // is inlined and the owning functions agree.
            if !current_call_site.is_empty() && !other_call_site.is_empty() {
                if current_call_site != other_call_site {
                    continue;
                }
            } else if !current_call_site.is_empty() || !other_call_site.is_empty() {
                continue;
            } else if current_func != node.containing_func {
                continue;
            }

            let other_field = node
                .name
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string();
            if other_field == current_field {
                continue;
            }
            siblings.push(Sibling {
                id: node.id,
                field: other_field,
                writes: node.property_is("is_assign_target", "true"),
            });
        }

        for sibling in siblings {
            if current_writes && !sibling.writes {
                self.drop_undirected_alias(current_id, sibling.id);
                let label = format!("union({current_field}->{})", sibling.field);
                self.connect_nodes(current_id, sibling.id, ComputeEdgeKind::Memory, &label);
            } else if !current_writes && sibling.writes {
                self.drop_undirected_alias(current_id, sibling.id);
                let label = format!("union({}->{current_field})", sibling.field);
                self.connect_nodes(sibling.id, current_id, ComputeEdgeKind::Memory, &label);
            } else if sibling.id < current_id {
                let label = format!("union({}<->{current_field})", sibling.field);
                self.connect_nodes(sibling.id, current_id, ComputeEdgeKind::Memory, &label);
            }
        }
    }

    /// A write direction learned after the fact supersedes an undirected
    /// alias edge between the same pair.
    fn drop_undirected_alias(&mut self, a: NodeId, b: NodeId) {
        let doomed: Vec<u64> = self
            .graph
            .edges()
            .filter(|e| {
                e.kind == ComputeEdgeKind::Memory
                    && e.label.contains("<->")
                    && ((e.source_id == a && e.target_id == b)
                        || (e.source_id == b && e.target_id == a))
            })
            .map(|e| e.id)
            .collect();
        for edge in doomed {
            self.graph.remove_edge(edge);
        }
    }

    /// Re-run alias wiring for a union-member node once its write/read role
    /// is known (set by the enclosing assignment after the member lowers).
    pub(super) fn re_alias_union_member(&mut self, node_id: NodeId) {
        let field = match self.graph.node(node_id) {
            Some(node) if node.property_is("is_union_member", "true") => node
                .name
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string(),
            _ => return,
        };
        if !field.is_empty() {
            self.connect_union_aliases(node_id, &field);
        }
    }
}
