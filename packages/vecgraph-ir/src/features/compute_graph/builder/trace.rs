//! Backward definition tracing and forward use tracing.
//!
//! Backward: for every variable reference in a statement, connect the
//! reaching definitions (kill-filtered, nearest-first) and classify
//! loop-carried dependences. Forward: for every variable a statement
//! defines, connect later uses that the definition actually reaches.

use rustc_hash::FxHashSet;

use crate::frontend::ast::{FuncId, StmtId, StmtKind, VarId};

use super::super::domain::{ComputeEdgeKind, ComputeNodeKind, NodeId, INVALID_NODE};
use super::ComputeGraphBuilder;

impl ComputeGraphBuilder<'_> {
    /// Source position used for before/after decisions; the column keeps
    /// same-line statement sequences ordered.
    fn pos(&self, stmt: StmtId) -> (u32, u32) {
        (self.cpg.tu().line(stmt), self.cpg.tu().column(stmt))
    }

    // ------------------------------------------------------------
    // Backward trace
    // ------------------------------------------------------------

    pub(super) fn process_backward(&mut self, stmt: StmtId, depth: u32) {
        if depth >= self.limits.max_backward_depth {
            return;
        }

        let tu = self.cpg.tu();
        let var_refs: Vec<(StmtId, NodeId)> = tu
            .collect_var_refs(stmt)
            .into_iter()
            .map(|r| {
                (
                    r,
                    self.processed_stmts.get(&r).copied().unwrap_or(INVALID_NODE),
                )
            })
            .collect();

        let mut traced_vars: FxHashSet<VarId> = FxHashSet::default();
        let mut traced_var_nodes: FxHashSet<(String, NodeId)> = FxHashSet::default();

        for (var_ref, var_node_id) in var_refs {
            self.process_single_variable_reference(
                var_ref,
                var_node_id,
                stmt,
                &mut traced_vars,
                &mut traced_var_nodes,
                depth,
            );
        }

        // Union member references feed from every sibling-member write.
        let member_refs = self.cpg.tu().collect_member_refs(stmt);
        for member_ref in member_refs {
            let Some(&member_node) = self.processed_stmts.get(&member_ref) else {
                continue;
            };
            if self.union_base_of(member_ref).is_some() {
                self.trace_union_member_definitions(member_ref, member_node, depth);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_single_variable_reference(
        &mut self,
        var_ref: StmtId,
        var_node_id: NodeId,
        use_stmt: StmtId,
        traced_vars: &mut FxHashSet<VarId>,
        traced_var_nodes: &mut FxHashSet<(String, NodeId)>,
        depth: u32,
    ) {
        let tu = self.cpg.tu();
        let StmtKind::DeclRef { var } = tu.stmt(var_ref).kind else {
            return;
        };
        let var_name = tu.var(var).name.clone();
        let current_line = tu.line(use_stmt);

        // The loop variable is wired by the loop pass exclusively.
        if self.is_loop_variable(&var_name, current_line) {
            return;
        }

        if traced_vars.insert(var) {
            if self.cpg.tu().var(var).is_param && var_node_id != INVALID_NODE {
                self.trace_parameter_to_call_sites(var, var_node_id, depth);
            }
            let modifications = self.find_variable_modifications(var, use_stmt);
            for modification in modifications {
                self.process_variable_modification(
                    modification,
                    &var_name,
                    var_node_id,
                    use_stmt,
                    depth,
                );
            }
        }

        if var_node_id == INVALID_NODE {
            return;
        }
        if !traced_var_nodes.insert((var_name.clone(), var_node_id)) {
            return;
        }

        // Reaching-definition backbone with a linear-scan fallback.
        let budget = self.limits.max_backward_depth.saturating_sub(depth);
        let mut defs = self
            .cpg
            .trace_variable_definitions_interprocedural(var_ref, budget);
        if defs.is_empty() {
            defs = self.find_definitions_in_function(&var_name, use_stmt);
        }

        let filtered = self.filter_killed_definitions(&defs, use_stmt, &var_name);
        let (nearest, loop_carried) =
            self.find_nearest_definitions(&filtered, &var_name, use_stmt);

        if let Some(def) = nearest {
            self.process_definition_node(
                def,
                &var_name,
                var_node_id,
                ComputeEdgeKind::DataFlow,
                depth,
            );
        }
        if let Some(def) = loop_carried {
            if Some(def) != nearest {
                self.process_definition_node(
                    def,
                    &var_name,
                    var_node_id,
                    ComputeEdgeKind::LoopCarried,
                    depth,
                );
            }
        }
    }

    /// The use is the loop variable inside the loop's own scope (header or
    /// body range).
    pub(super) fn is_loop_variable(&self, var_name: &str, current_line: u32) -> bool {
        if self.loop_info.loop_var_name.is_empty() || var_name != self.loop_info.loop_var_name {
            return false;
        }
        let loop_line = self
            .graph
            .node(self.loop_info.loop_node_id)
            .map(|n| n.source_line)
            .unwrap_or(0);
        (loop_line > 0 && current_line == loop_line)
            || (current_line >= self.loop_info.body_start_line
                && current_line <= self.loop_info.body_end_line)
    }

    /// All statements in the containing function that write `var`.
    fn find_variable_modifications(&self, var: VarId, use_stmt: StmtId) -> Vec<StmtId> {
        let tu = self.cpg.tu();
        let Some(func) = tu.containing_function(use_stmt) else {
            return Vec::new();
        };
        let Some(body) = tu.func(func).body else {
            return Vec::new();
        };
        tu.collect_stmts(body)
            .into_iter()
            .filter(|&s| {
                tu.assignment_target(s) == Some(var) || tu.inc_dec_target(s) == Some(var)
            })
            .collect()
    }

    /// The definition is inside the current loop body at or after the use
    /// line: it reaches the use only around the back edge.
    fn is_loop_carried_dependency(&self, mod_line: u32, current_line: u32) -> bool {
        if self.loop_info.loop_node_id == INVALID_NODE {
            return false;
        }
        mod_line >= self.loop_info.body_start_line
            && mod_line <= self.loop_info.body_end_line
            && mod_line >= current_line
    }

    fn process_variable_modification(
        &mut self,
        mod_stmt: StmtId,
        var_name: &str,
        var_node_id: NodeId,
        use_stmt: StmtId,
        depth: u32,
    ) {
        if mod_stmt == use_stmt {
            return;
        }

        let was_cached = self.processed_stmts.contains_key(&mod_stmt);
        let mut mod_node = match self.processed_stmts.get(&mod_stmt) {
            Some(&id) => id,
            None => self.build_expression_tree(mod_stmt, depth + 1),
        };
        if mod_node == INVALID_NODE {
            mod_node = self.create_definition_node(mod_stmt, var_name);
        }
        if mod_node == INVALID_NODE {
            return;
        }

        let mod_line = self.cpg.tu().line(mod_stmt);
        let current_line = self.cpg.tu().line(use_stmt);

        // Prefer the concrete LHS/operand variable node over the whole
        // modification expression.
        let target_node = match self.variable_node_of_modification(mod_stmt) {
            Some(id) => id,
            None => mod_node,
        };

        if self.is_loop_carried_dependency(mod_line, current_line) {
            let label = format!("{var_name} (next iter)");
            self.connect_nodes(mod_node, var_node_id, ComputeEdgeKind::LoopCarried, &label);
        } else if self.pos(mod_stmt) < self.pos(use_stmt) {
            self.connect_nodes(target_node, var_node_id, ComputeEdgeKind::DataFlow, var_name);
        }

        if !was_cached {
            self.schedule_backward(mod_stmt, depth + 1);
        }
        self.schedule_forward(mod_stmt, depth + 1);
    }

    fn variable_node_of_modification(&self, mod_stmt: StmtId) -> Option<NodeId> {
        let tu = self.cpg.tu();
        let target_ref = match &tu.stmt(mod_stmt).kind {
            StmtKind::Unary { op, operand } if op.is_inc_dec() => Some(tu.skip_parens(*operand)),
            StmtKind::Binary { op, lhs, .. } if op.is_assignment() => {
                Some(tu.skip_parens(*lhs))
            }
            _ => None,
        }?;
        self.processed_stmts.get(&target_ref).copied()
    }

    /// Linear AST scan fallback when the reaching tables return nothing.
    fn find_definitions_in_function(&self, var_name: &str, stmt: StmtId) -> Vec<StmtId> {
        let tu = self.cpg.tu();
        let Some(func) = tu.containing_function(stmt) else {
            return Vec::new();
        };
        let Some(body) = tu.func(func).body else {
            return Vec::new();
        };
        tu.collect_stmts(body)
            .into_iter()
            .filter(|&s| tu.stmt_defines_variable(s, var_name))
            .collect()
    }

    /// Drop any definition for which a later-line definition of the same
    /// variable exists before the use; only the trailing window of
    /// candidates is checked.
    pub(super) fn filter_killed_definitions(
        &self,
        defs: &[StmtId],
        use_stmt: StmtId,
        var_name: &str,
    ) -> Vec<StmtId> {
        const MAX_DEFS_TO_CHECK: usize = 10;

        if defs.len() <= 1 {
            return defs.to_vec();
        }
        let use_pos = self.pos(use_stmt);

        // Defs at or after the use survive untouched: they are the
        // loop-carried candidates, not killable by anything before the use.
        let mut seen: FxHashSet<StmtId> = FxHashSet::default();
        let mut candidates: Vec<((u32, u32), StmtId)> = Vec::new();
        let mut surviving_later: Vec<StmtId> = Vec::new();
        for &def in defs {
            if !seen.insert(def) {
                continue;
            }
            let pos = self.pos(def);
            if pos < use_pos {
                candidates.push((pos, def));
            } else {
                surviving_later.push(def);
            }
        }
        if candidates.is_empty() {
            return surviving_later;
        }
        candidates.sort();

        let start = candidates.len().saturating_sub(MAX_DEFS_TO_CHECK);
        let mut result = Vec::new();
        for i in start..candidates.len() {
            let (_, def) = candidates[i];
            let killed = candidates[i + 1..].iter().any(|&(_, later)| {
                self.cpg.defined_vars_cached(later).contains(var_name)
            });
            if !killed {
                result.push(def);
            }
        }
        result.extend(surviving_later);
        result
    }

    /// Nearest-def rule: the largest def position strictly before the use,
    /// plus the largest in-loop def line at or after the use (loop-carried).
    fn find_nearest_definitions(
        &self,
        defs: &[StmtId],
        var_name: &str,
        use_stmt: StmtId,
    ) -> (Option<StmtId>, Option<StmtId>) {
        let tu = self.cpg.tu();
        let in_loop = self.loop_info.loop_node_id != INVALID_NODE;
        let use_pos = self.pos(use_stmt);

        let mut nearest: Option<((u32, u32), StmtId)> = None;
        let mut loop_carried: Option<(u32, StmtId)> = None;

        for &def in defs {
            if !tu.stmt_defines_variable(def, var_name) {
                continue;
            }
            let def_pos = self.pos(def);
            let def_line = def_pos.0;
            if def_pos < use_pos {
                if nearest.map(|(pos, _)| def_pos > pos).unwrap_or(true) {
                    nearest = Some((def_pos, def));
                }
            } else if in_loop
                && def_line >= self.loop_info.body_start_line
                && def_line <= self.loop_info.body_end_line
                && loop_carried
                    .map(|(line, _)| def_line > line)
                    .unwrap_or(true)
            {
                loop_carried = Some((def_line, def));
            }
        }

        (nearest.map(|(_, d)| d), loop_carried.map(|(_, d)| d))
    }

    fn process_definition_node(
        &mut self,
        def_stmt: StmtId,
        var_name: &str,
        var_node_id: NodeId,
        edge_kind: ComputeEdgeKind,
        depth: u32,
    ) {
        let was_cached = self.processed_stmts.contains_key(&def_stmt);
        let mut def_node = match self.processed_stmts.get(&def_stmt) {
            Some(&id) => id,
            None => self.build_expression_tree(def_stmt, depth + 1),
        };
        if def_node == INVALID_NODE {
            def_node = self.create_definition_node(def_stmt, var_name);
        }
        if def_node == INVALID_NODE {
            return;
        }

        let label = if edge_kind == ComputeEdgeKind::LoopCarried {
            format!("{var_name} (next iter)")
        } else {
            var_name.to_string()
        };
        self.connect_nodes(def_node, var_node_id, edge_kind, &label);

        if !was_cached {
            self.schedule_backward(def_stmt, depth + 1);
        }
        self.schedule_forward(def_stmt, depth + 1);
    }

    // ------------------------------------------------------------
    // Union member tracing
    // ------------------------------------------------------------

    pub(super) fn union_base_of(&self, member_ref: StmtId) -> Option<VarId> {
        let tu = self.cpg.tu();
        let StmtKind::Member { base, .. } = tu.stmt(member_ref).kind else {
            return None;
        };
        let StmtKind::DeclRef { var } = tu.stmt(tu.skip_parens(base)).kind else {
            return None;
        };
        let record = tu.var(var).record?;
        tu.record(record).is_union.then_some(var)
    }

    /// Every assignment (and the declaration) writing any member of the
    /// same union base variable feeds the current member read.
    fn trace_union_member_definitions(
        &mut self,
        member_ref: StmtId,
        member_node: NodeId,
        depth: u32,
    ) {
        if depth >= self.limits.max_backward_depth {
            return;
        }
        let Some(base_var) = self.union_base_of(member_ref) else {
            return;
        };
        let tu = self.cpg.tu();
        let base_name = tu.var(base_var).name.clone();
        let current_member = match &tu.stmt(member_ref).kind {
            StmtKind::Member { field, .. } => field.clone(),
            _ => return,
        };
        let Some(func) = tu.containing_function(member_ref) else {
            return;
        };
        let Some(body) = tu.func(func).body else {
            return;
        };

        // Assignments whose LHS is a member of the same base variable.
        let mut member_defs: Vec<(StmtId, String)> = Vec::new();
        let mut decl_defs: Vec<StmtId> = Vec::new();
        for s in tu.collect_stmts(body) {
            match &tu.stmt(s).kind {
                StmtKind::Binary { op, lhs, .. } if op.is_assignment() => {
                    let lhs = tu.skip_parens(*lhs);
                    if let StmtKind::Member { base, field, .. } = &tu.stmt(lhs).kind {
                        if let StmtKind::DeclRef { var } = tu.stmt(tu.skip_parens(*base)).kind {
                            if var == base_var {
                                member_defs.push((s, field.clone()));
                            }
                        }
                    }
                }
                StmtKind::Decl { decls } => {
                    if decls.iter().any(|(v, _)| *v == base_var) {
                        decl_defs.push(s);
                    }
                }
                _ => {}
            }
        }

        for (def_stmt, def_field) in member_defs {
            let def_node = match self.processed_stmts.get(&def_stmt) {
                Some(&id) => id,
                None => self.build_expression_tree(def_stmt, depth + 1),
            };
            if def_node == INVALID_NODE {
                continue;
            }
            let label = format!("{base_name}.{def_field} -> {current_member}");
            self.connect_nodes(def_node, member_node, ComputeEdgeKind::DataFlow, &label);
            if let Some(node) = self.graph.node_mut(def_node) {
                node.set_property("union_alias_source", "true");
            }
        }

        for decl_stmt in decl_defs {
            let decl_node = match self.processed_stmts.get(&decl_stmt) {
                Some(&id) => id,
                None => self.build_expression_tree(decl_stmt, depth + 1),
            };
            if decl_node != INVALID_NODE {
                self.connect_nodes(decl_node, member_node, ComputeEdgeKind::DataFlow, &base_name);
            }
        }
    }

    // ------------------------------------------------------------
    // Parameter promotion
    // ------------------------------------------------------------

    /// Connect every Parameter/Variable node backed by a formal parameter to
    /// the actual arguments at its call sites.
    pub(super) fn trace_all_parameters_to_call_sites(&mut self) {
        let mut params_to_trace: Vec<(VarId, NodeId)> = Vec::new();

        // Pass 1: graph nodes carrying a parameter declaration.
        for node in self.graph.nodes() {
            if !matches!(
                node.kind,
                ComputeNodeKind::Parameter | ComputeNodeKind::Variable
            ) {
                continue;
            }
            if node.property_is("traced_to_callsite", "true") {
                continue;
            }
            let param = node
                .ast_decl
                .filter(|&d| self.cpg.tu().var(d).is_param)
                .or_else(|| self.param_decl_of_node(node.id));
            if let Some(param) = param {
                if !params_to_trace.iter().any(|(p, _)| *p == param) {
                    params_to_trace.push((param, node.id));
                }
            }
        }

        // Pass 2: processed parameter references not yet collected.
        for (&stmt, &node_id) in &self.processed_stmts {
            let StmtKind::DeclRef { var } = self.cpg.tu().stmt(stmt).kind else {
                continue;
            };
            if !self.cpg.tu().var(var).is_param {
                continue;
            }
            let traced = self
                .graph
                .node(node_id)
                .map(|n| n.property_is("traced_to_callsite", "true"))
                .unwrap_or(true);
            if traced {
                continue;
            }
            if !params_to_trace.iter().any(|(p, _)| *p == var) {
                params_to_trace.push((var, node_id));
            }
        }

        for (param, node_id) in params_to_trace {
            if let Some(node) = self.graph.node_mut(node_id) {
                node.set_property("traced_to_callsite", "true");
            }
            self.trace_parameter_to_call_sites(param, node_id, 0);
        }
    }

    fn param_decl_of_node(&self, node_id: NodeId) -> Option<VarId> {
        for (&stmt, &id) in &self.processed_stmts {
            if id != node_id {
                continue;
            }
            if let StmtKind::DeclRef { var } = self.cpg.tu().stmt(stmt).kind {
                if self.cpg.tu().var(var).is_param {
                    return Some(var);
                }
            }
        }
        None
    }

    /// Connect the actual-argument subtree at every call site already in the
    /// graph to a formal-parameter node (restricted by `call_site_id` for
    /// inlined instances).
    pub(super) fn trace_parameter_to_call_sites(
        &mut self,
        param: VarId,
        param_node_id: NodeId,
        depth: u32,
    ) {
        if depth >= self.limits.max_backward_depth {
            return;
        }
        let tu = self.cpg.tu();
        let Some(func) = tu.var(param).func else {
            return;
        };
        if tu.is_intrinsic_function(func) {
            return;
        }
        let param_index = tu.var(param).param_index.unwrap_or(0);
        let param_name = tu.var(param).name.clone();

        let expected_call_site = match self.graph.node(param_node_id) {
            Some(node) => node.property("call_site_id").to_string(),
            None => return,
        };

        for call in self.cpg.calls_to(func) {
            let args = match &self.cpg.tu().stmt(call).kind {
                StmtKind::Call { args, .. } => args.clone(),
                _ => continue,
            };
            if param_index >= args.len() {
                continue;
            }
            let Some(&call_node) = self.processed_stmts.get(&call) else {
                continue;
            };
            if !expected_call_site.is_empty() && expected_call_site != call_node.to_string() {
                continue;
            }

            let arg = self.cpg.tu().skip_parens(args[param_index]);
            let caller = self.cpg.tu().containing_function(call);
            let arg_id = self.build_expression_tree(arg, 0);
            if arg_id == INVALID_NODE {
                continue;
            }
            if let Some(node) = self.graph.node_mut(arg_id) {
                node.containing_func = caller;
            }
            self.connect_nodes(arg_id, param_node_id, ComputeEdgeKind::Call, &param_name);
            if let Some(caller) = caller {
                self.trace_argument_to_definition(arg, arg_id, caller);
            }
        }
    }

    /// Connect the declaration of every variable referenced by an actual
    /// argument to the argument node, in the caller's scope.
    pub(super) fn trace_argument_to_definition(
        &mut self,
        arg: StmtId,
        arg_node_id: NodeId,
        caller: FuncId,
    ) {
        let tu = self.cpg.tu();
        let mut decls: Vec<(StmtId, String)> = Vec::new();
        for var_ref in tu.collect_var_refs(arg) {
            let StmtKind::DeclRef { var } = tu.stmt(var_ref).kind else {
                continue;
            };
            let info = tu.var(var);
            if let Some(decl_stmt) = info.decl_stmt {
                decls.push((decl_stmt, info.name.clone()));
            }
        }
        for (decl_stmt, var_name) in decls {
            let decl_node = self.build_expression_tree(decl_stmt, 0);
            if decl_node == INVALID_NODE {
                continue;
            }
            if let Some(node) = self.graph.node_mut(decl_node) {
                node.containing_func = Some(caller);
            }
            self.connect_nodes(decl_node, arg_node_id, ComputeEdgeKind::DataFlow, &var_name);
        }
    }

    // ------------------------------------------------------------
    // Forward trace
    // ------------------------------------------------------------

    pub(super) fn process_forward(&mut self, stmt: StmtId, depth: u32) {
        if depth >= self.limits.max_forward_depth {
            return;
        }
        if !self.forward_traced.insert(stmt) {
            return;
        }

        let defined = self.cpg.tu().defined_var_decls(stmt);
        if defined.is_empty() {
            return;
        }

        self.ensure_control_flow_built(stmt, depth);

        let src_node = match self.processed_stmts.get(&stmt) {
            Some(&id) => id,
            None => self.build_expression_tree(stmt, depth),
        };
        if src_node == INVALID_NODE {
            return;
        }

        let def_line = self.cpg.tu().line(stmt);
        for var in defined {
            let var_name = self.cpg.tu().var(var).name.clone();
            let Some(func) = self.cpg.tu().containing_function(stmt) else {
                continue;
            };
            let uses = self.find_variable_uses(var, func);
            for use_ref in uses {
                self.process_single_use(use_ref, src_node, &var_name, stmt, def_line, depth);
            }
        }
    }

    /// Every reference to `var` inside the function body.
    fn find_variable_uses(&self, var: VarId, func: FuncId) -> Vec<StmtId> {
        let tu = self.cpg.tu();
        let Some(body) = tu.func(func).body else {
            return Vec::new();
        };
        tu.collect_var_refs(body)
            .into_iter()
            .filter(|&r| matches!(tu.stmt(r).kind, StmtKind::DeclRef { var: v } if v == var))
            .collect()
    }

    fn should_skip_use(
        &self,
        use_stmt: StmtId,
        def_stmt: StmtId,
        var_name: &str,
        _use_line: u32,
        _def_line: u32,
    ) -> bool {
        let backward_use = self.pos(use_stmt) < self.pos(def_stmt);
        let in_loop = self.loop_info.loop_node_id != INVALID_NODE;
        if backward_use && !in_loop {
            return true;
        }
        if use_stmt == def_stmt {
            return true;
        }
        self.is_definition_killed_before_use(def_stmt, use_stmt, var_name)
    }

    /// An intermediate assignment of the same variable between the def and
    /// the use makes this def dead at the use.
    fn is_definition_killed_before_use(
        &self,
        def_stmt: StmtId,
        use_stmt: StmtId,
        var_name: &str,
    ) -> bool {
        let def_pos = self.pos(def_stmt);
        let use_pos = self.pos(use_stmt);
        if use_pos <= def_pos {
            return true;
        }

        let defs = self.cpg.definitions_reaching(use_stmt, var_name);
        if defs.is_empty() {
            return self.check_intermediate_definitions(def_stmt, use_stmt, var_name);
        }
        if !defs.contains(&def_stmt) {
            return true;
        }
        if defs.len() > 1 {
            for &other in &defs {
                if other == def_stmt {
                    continue;
                }
                let other_pos = self.pos(other);
                if other_pos > def_pos && other_pos <= use_pos {
                    return true;
                }
            }
        }
        false
    }

    fn check_intermediate_definitions(
        &self,
        def_stmt: StmtId,
        use_stmt: StmtId,
        var_name: &str,
    ) -> bool {
        let tu = self.cpg.tu();
        let def_pos = self.pos(def_stmt);
        let use_pos = self.pos(use_stmt);
        let Some(func) = tu.containing_function(def_stmt) else {
            return false;
        };
        let Some(body) = tu.func(func).body else {
            return false;
        };
        tu.collect_stmts(body).into_iter().any(|s| {
            let pos = self.pos(s);
            pos > def_pos && pos < use_pos && tu.stmt_defines_variable(s, var_name)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn process_single_use(
        &mut self,
        use_stmt: StmtId,
        src_node: NodeId,
        var_name: &str,
        def_stmt: StmtId,
        def_line: u32,
        depth: u32,
    ) {
        let use_line = self.cpg.tu().line(use_stmt);
        if self.should_skip_use(use_stmt, def_stmt, var_name, use_line, def_line) {
            return;
        }

        self.ensure_control_flow_built(use_stmt, depth);
        self.process_return_stmt_use(use_stmt, depth);

        let use_node = match self.processed_stmts.get(&use_stmt) {
            Some(&id) => id,
            None => self.build_expression_tree(use_stmt, depth + 1),
        };
        if use_node == INVALID_NODE {
            return;
        }

        self.connect_nodes(src_node, use_node, ComputeEdgeKind::DataFlow, var_name);
        self.check_and_trace_increment_decrement(use_stmt, depth);
    }

    /// A use that is the value of a return statement pulls the return node
    /// into the graph.
    fn process_return_stmt_use(&mut self, use_stmt: StmtId, depth: u32) {
        let tu = self.cpg.tu();
        let mut cursor = tu.parent(use_stmt);
        while let Some(parent) = cursor {
            match &tu.stmt(parent).kind {
                StmtKind::Paren { .. } => cursor = tu.parent(parent),
                StmtKind::Return { .. } => {
                    self.build_expression_tree(parent, depth + 1);
                    return;
                }
                _ => return,
            }
        }
    }

    /// A use that is the operand of `++`/`--` keeps propagating through the
    /// rewritten value.
    fn check_and_trace_increment_decrement(&mut self, use_stmt: StmtId, depth: u32) {
        let tu = self.cpg.tu();
        let mut cursor = tu.parent(use_stmt);
        while let Some(parent) = cursor {
            match &tu.stmt(parent).kind {
                StmtKind::Paren { .. } => cursor = tu.parent(parent),
                StmtKind::Unary { op, .. } if op.is_inc_dec() => {
                    self.schedule_forward(parent, depth + 1);
                    return;
                }
                _ => return,
            }
        }
    }

    /// Lower an enclosing `if` (branch container) before wiring uses inside
    /// it; loops and the function boundary stop the walk.
    fn ensure_control_flow_built(&mut self, stmt: StmtId, depth: u32) {
        let tu = self.cpg.tu();
        let mut cursor = tu.parent(stmt);
        while let Some(parent) = cursor {
            match &tu.stmt(parent).kind {
                StmtKind::If { .. } => {
                    self.build_expression_tree(parent, depth);
                    return;
                }
                StmtKind::For { .. } | StmtKind::While { .. } | StmtKind::DoWhile { .. } => {
                    return;
                }
                _ => cursor = tu.parent(parent),
            }
        }
    }
}
