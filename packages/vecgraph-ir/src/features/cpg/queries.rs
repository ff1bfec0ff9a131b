//! Query layer over the ICFG and PDG: def/use lookups, path queries, and
//! intra/interprocedural variable traces.
//!
//! All traversals are explicit worklists with visited sets and depth caps;
//! a query on a statement unknown to the analysis returns empty.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::FxHashSet;

use crate::frontend::ast::{FuncId, StmtId, StmtKind};

use super::context::CpgContext;
use super::domain::{CallContext, IcfgNodeId};

/// One backward-trace scheduling record
#[derive(Debug, Clone)]
struct BackwardItem {
    stmt: StmtId,
    var: String,
    depth: u32,
}

/// One forward-trace scheduling record
#[derive(Debug, Clone)]
struct ForwardItem {
    stmt: StmtId,
    var: String,
    func: FuncId,
    depth: u32,
}

impl CpgContext {
    // ------------------------------------------------------------
    // Basic lookups
    // ------------------------------------------------------------

    /// Variable names referenced inside an expression.
    pub fn extract_variables(&self, expr: StmtId) -> BTreeSet<String> {
        self.tu().collect_var_names(expr)
    }

    /// The statement element enclosing an expression (the granularity the
    /// dataflow tables are keyed on).
    pub fn containing_element(&self, expr: StmtId) -> Option<StmtId> {
        let func = self.tu().containing_function(expr)?;
        let info = self.reaching_info(func)?;
        let mut cursor = Some(expr);
        while let Some(stmt) = cursor {
            if info.reaching.contains_key(&stmt) {
                return Some(stmt);
            }
            cursor = self.tu().parent(stmt);
        }
        None
    }

    /// Actual argument at a call site for a parameter index.
    pub fn argument_at_call_site(&self, call: StmtId, param_index: usize) -> Option<StmtId> {
        match &self.tu().stmt(call).kind {
            StmtKind::Call { args, .. } => args.get(param_index).copied(),
            _ => None,
        }
    }

    /// Statements in `param`'s function that reference the parameter.
    pub fn parameter_usages(&self, param: crate::frontend::ast::VarId) -> Vec<StmtId> {
        let Some(func) = self.tu().var(param).func else {
            return Vec::new();
        };
        let Some(body) = self.tu().func(func).body else {
            return Vec::new();
        };
        self.tu()
            .collect_var_refs(body)
            .into_iter()
            .filter(|&s| matches!(self.tu().stmt(s).kind, StmtKind::DeclRef { var } if var == param))
            .collect()
    }

    // ------------------------------------------------------------
    // Path queries
    // ------------------------------------------------------------

    /// Worklist over the PDG: does data defined at `source` flow to `sink`?
    pub fn has_data_flow_path(&self, source: StmtId, sink: StmtId, var_name: &str) -> bool {
        if source == sink {
            return true;
        }
        let mut visited: FxHashSet<StmtId> = FxHashSet::default();
        let mut worklist: VecDeque<StmtId> = VecDeque::new();

        for var in self.defined_vars_cached(source) {
            if !var_name.is_empty() && var != var_name {
                continue;
            }
            for use_stmt in self.uses_of_definition(source, &var) {
                if visited.insert(use_stmt) {
                    worklist.push_back(use_stmt);
                }
            }
        }

        while let Some(current) = worklist.pop_front() {
            if current == sink {
                return true;
            }
            for var in self.defined_vars_cached(current) {
                for use_stmt in self.uses_of_definition(current, &var) {
                    if visited.insert(use_stmt) {
                        worklist.push_back(use_stmt);
                    }
                }
            }
        }
        false
    }

    /// BFS over ICFG successors.
    pub fn has_control_flow_path(&self, source: StmtId, sink: StmtId) -> bool {
        let Some(start) = self.icfg_node_of_stmt(source) else {
            return false;
        };
        let Some(goal) = self.icfg_node_of_stmt(sink) else {
            return false;
        };
        let mut visited: FxHashSet<IcfgNodeId> = FxHashSet::from_iter([start]);
        let mut worklist: VecDeque<IcfgNodeId> = VecDeque::from([start]);
        while let Some(current) = worklist.pop_front() {
            if current == goal {
                return true;
            }
            for &(succ, _) in &self.icfg_node(current).successors {
                if visited.insert(succ) {
                    worklist.push_back(succ);
                }
            }
        }
        false
    }

    /// DFS enumerating simple ICFG paths up to `max_depth`.
    pub fn find_all_paths(
        &self,
        source: IcfgNodeId,
        sink: IcfgNodeId,
        max_depth: usize,
    ) -> Vec<Vec<IcfgNodeId>> {
        let mut all_paths = Vec::new();
        let mut current_path = Vec::new();
        let mut visited: FxHashSet<IcfgNodeId> = FxHashSet::default();
        self.find_paths_dfs(
            source,
            sink,
            0,
            max_depth,
            &mut current_path,
            &mut visited,
            &mut all_paths,
        );
        all_paths
    }

    #[allow(clippy::too_many_arguments)]
    fn find_paths_dfs(
        &self,
        node: IcfgNodeId,
        sink: IcfgNodeId,
        depth: usize,
        max_depth: usize,
        current_path: &mut Vec<IcfgNodeId>,
        visited: &mut FxHashSet<IcfgNodeId>,
        all_paths: &mut Vec<Vec<IcfgNodeId>>,
    ) {
        if depth > max_depth || visited.contains(&node) {
            return;
        }
        visited.insert(node);
        current_path.push(node);

        if node == sink {
            all_paths.push(current_path.clone());
        } else {
            for &(succ, _) in &self.icfg_node(node).successors {
                self.find_paths_dfs(
                    succ,
                    sink,
                    depth + 1,
                    max_depth,
                    current_path,
                    visited,
                    all_paths,
                );
            }
        }

        current_path.pop();
        visited.remove(&node);
    }

    // ------------------------------------------------------------
    // Backward traces
    // ------------------------------------------------------------

    /// Intraprocedural backward trace: all definitions transitively feeding
    /// the variables of `expr`, up to `max_depth`.
    pub fn trace_variable_definitions(&self, expr: StmtId, max_depth: u32) -> Vec<StmtId> {
        self.trace_definitions_impl(expr, max_depth, false)
    }

    /// As above, but a use of a formal parameter continues into the actual
    /// arguments at every known call site of the parameter's function.
    pub fn trace_variable_definitions_interprocedural(
        &self,
        expr: StmtId,
        max_depth: u32,
    ) -> Vec<StmtId> {
        self.trace_definitions_impl(expr, max_depth, true)
    }

    fn trace_definitions_impl(
        &self,
        expr: StmtId,
        max_depth: u32,
        interprocedural: bool,
    ) -> Vec<StmtId> {
        let mut result = Vec::new();
        let mut visited: FxHashSet<StmtId> = FxHashSet::default();
        let mut worklist: VecDeque<BackwardItem> = VecDeque::new();

        let seed_stmt = self.containing_element(expr).unwrap_or(expr);
        for var in self.extract_variables(expr) {
            worklist.push_back(BackwardItem {
                stmt: seed_stmt,
                var,
                depth: 0,
            });
        }

        while let Some(item) = worklist.pop_front() {
            if item.depth >= max_depth {
                continue;
            }

            for def in self.definitions_reaching(item.stmt, &item.var) {
                if visited.insert(def) {
                    result.push(def);
                    for used in self.used_vars_cached(def) {
                        worklist.push_back(BackwardItem {
                            stmt: def,
                            var: used,
                            depth: item.depth + 1,
                        });
                    }
                }
            }

            if interprocedural {
                self.enqueue_parameter_sources(&item, &mut worklist, &mut visited, &mut result);
            }
        }

        result
    }

    /// When `item.stmt` directly references a formal parameter named
    /// `item.var`, continue the trace at the actual argument of every call
    /// site of that function.
    fn enqueue_parameter_sources(
        &self,
        item: &BackwardItem,
        worklist: &mut VecDeque<BackwardItem>,
        visited: &mut FxHashSet<StmtId>,
        result: &mut Vec<StmtId>,
    ) {
        let Some(func) = self.tu().containing_function(item.stmt) else {
            return;
        };
        let param = self.tu().func(func).params.iter().copied().find(|&p| {
            let info = self.tu().var(p);
            info.name == item.var
        });
        let Some(param) = param else {
            return;
        };
        let param_index = self.tu().var(param).param_index.unwrap_or(0);

        for call in self.calls_to(func) {
            let Some(arg) = self.argument_at_call_site(call, param_index) else {
                continue;
            };
            let arg = self.tu().skip_parens(arg);
            let caller_element = self.containing_element(arg).unwrap_or(arg);
            if visited.insert(caller_element) {
                result.push(caller_element);
            }
            for var in self.extract_variables(arg) {
                worklist.push_back(BackwardItem {
                    stmt: caller_element,
                    var,
                    depth: item.depth + 1,
                });
            }
        }
    }

    // ------------------------------------------------------------
    // Forward trace
    // ------------------------------------------------------------

    /// Forward interprocedural trace: all statements transitively reached by
    /// the value defined at `def_stmt` for `var_name`.
    pub fn trace_variable_uses_interprocedural(
        &self,
        def_stmt: StmtId,
        var_name: &str,
        max_depth: u32,
    ) -> Vec<StmtId> {
        let mut result = Vec::new();
        let mut visited: FxHashSet<StmtId> = FxHashSet::default();
        let mut worklist: VecDeque<ForwardItem> = VecDeque::new();

        let Some(func) = self.tu().containing_function(def_stmt) else {
            return result;
        };
        let seeds: Vec<String> = if var_name.is_empty() {
            self.defined_vars_cached(def_stmt).into_iter().collect()
        } else {
            vec![var_name.to_string()]
        };
        for var in seeds {
            worklist.push_back(ForwardItem {
                stmt: def_stmt,
                var,
                func,
                depth: 0,
            });
        }

        while let Some(item) = worklist.pop_front() {
            if item.depth >= max_depth {
                continue;
            }
            for use_stmt in self.local_uses(&item) {
                if !visited.insert(use_stmt) {
                    continue;
                }
                result.push(use_stmt);
                self.continue_forward(use_stmt, &item, &mut worklist);
            }
        }

        result
    }

    /// Flow-dependency sinks of `item.stmt` on `item.var`, with a scan
    /// fallback for statements outside the PDG tables.
    fn local_uses(&self, item: &ForwardItem) -> Vec<StmtId> {
        let mut uses: Vec<StmtId> = self
            .uses_of_definition(item.stmt, &item.var)
            .into_iter()
            .collect();
        if uses.is_empty() {
            if let Some(body) = self.tu().func(item.func).body {
                let def_line = self.tu().line(item.stmt);
                for stmt in self.tu().collect_stmts(body) {
                    if self.tu().line(stmt) > def_line
                        && self.tu().used_vars(stmt).contains(&item.var)
                        && self.containing_element(stmt) == Some(stmt)
                    {
                        uses.push(stmt);
                    }
                }
            }
        }
        uses
    }

    fn continue_forward(
        &self,
        use_stmt: StmtId,
        item: &ForwardItem,
        worklist: &mut VecDeque<ForwardItem>,
    ) {
        let depth = item.depth + 1;
        match &self.tu().stmt(use_stmt).kind {
            // Call site whose argument carries the variable: continue with
            // the callee's formal parameter.
            StmtKind::Call { callee, args, .. } => {
                let Some(callee) = *callee else { return };
                for (index, &arg) in args.iter().enumerate() {
                    if !self.tu().collect_var_names(arg).contains(&item.var) {
                        continue;
                    }
                    let Some(&param) = self.tu().func(callee).params.get(index) else {
                        continue;
                    };
                    let param_name = self.tu().var(param).name.clone();
                    let Some(body) = self.tu().func(callee).body else {
                        continue;
                    };
                    worklist.push_back(ForwardItem {
                        stmt: body,
                        var: param_name,
                        func: callee,
                        depth,
                    });
                }
            }
            // Assignment to another variable: keep tracing the new name.
            StmtKind::Binary { op, .. } if op.is_assignment() => {
                if let Some(target) = self.tu().assignment_target(use_stmt) {
                    worklist.push_back(ForwardItem {
                        stmt: use_stmt,
                        var: self.tu().var(target).name.clone(),
                        func: item.func,
                        depth,
                    });
                }
            }
            // Declaration initialized from the variable: continue with the
            // fresh name.
            StmtKind::Decl { decls } => {
                for (var, init) in decls {
                    let init_uses = init
                        .map(|i| self.tu().collect_var_names(i).contains(&item.var))
                        .unwrap_or(false);
                    if init_uses {
                        worklist.push_back(ForwardItem {
                            stmt: use_stmt,
                            var: self.tu().var(*var).name.clone(),
                            func: item.func,
                            depth,
                        });
                    }
                }
            }
            // Increment/decrement: same variable continues.
            StmtKind::Unary { op, .. } if op.is_inc_dec() => {
                worklist.push_back(ForwardItem {
                    stmt: use_stmt,
                    var: item.var.clone(),
                    func: item.func,
                    depth,
                });
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------
    // Context-sensitive call graph traversal
    // ------------------------------------------------------------

    /// DFS over call sites with an append-only call-expression stack.
    pub fn traverse_call_graph_context_sensitive<F>(
        &self,
        entry: FuncId,
        visitor: &mut F,
        max_depth: usize,
    ) where
        F: FnMut(FuncId, &CallContext),
    {
        let context = CallContext::default();
        self.traverse_call_graph_dfs(entry, &context, 0, max_depth, visitor);
    }

    fn traverse_call_graph_dfs<F>(
        &self,
        func: FuncId,
        context: &CallContext,
        depth: usize,
        max_depth: usize,
        visitor: &mut F,
    ) where
        F: FnMut(FuncId, &CallContext),
    {
        visitor(func, context);
        if depth >= max_depth {
            return;
        }
        for &call in self.call_sites_in(func) {
            let Some(target) = self.call_target(call) else {
                continue;
            };
            if !self.tu().func(target).has_body() {
                continue;
            }
            // The growing stack bounds recursion together with max_depth.
            if context.call_stack.contains(&call) {
                continue;
            }
            let next = context.push(call);
            self.traverse_call_graph_dfs(target, &next, depth + 1, max_depth, visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_translation_unit;

    fn context_for(src: &str) -> CpgContext {
        let tu = parse_translation_unit(src, "query_test.c").unwrap();
        CpgContext::build_full(tu)
    }

    fn stmt_containing(ctx: &CpgContext, func: &str, needle: &str) -> StmtId {
        let f = ctx.tu().find_function(func).unwrap();
        let body = ctx.tu().func(f).body.unwrap();
        ctx.tu()
            .collect_stmts(body)
            .into_iter()
            .filter(|&s| ctx.tu().text(s).contains(needle))
            .min_by_key(|&s| ctx.tu().text(s).len())
            .unwrap_or_else(|| panic!("no stmt matching {needle:?}"))
    }

    #[test]
    fn test_data_flow_path() {
        let src = "\
int f(void) {
    int a = 1;
    int b = a + 1;
    int c = b + 1;
    return c;
}
";
        let ctx = context_for(src);
        let a = stmt_containing(&ctx, "f", "int a = 1");
        let c = stmt_containing(&ctx, "f", "int c = b + 1");
        assert!(ctx.has_data_flow_path(a, c, ""));
        assert!(ctx.has_data_flow_path(a, c, "a"));
        assert!(!ctx.has_data_flow_path(c, a, ""));
    }

    #[test]
    fn test_control_flow_path() {
        let src = "\
int f(int x) {
    int y = 0;
    if (x > 0) {
        y = 1;
    }
    return y;
}
";
        let ctx = context_for(src);
        let decl = stmt_containing(&ctx, "f", "int y = 0");
        let ret = stmt_containing(&ctx, "f", "return y");
        assert!(ctx.has_control_flow_path(decl, ret));
        assert!(!ctx.has_control_flow_path(ret, decl));
    }

    #[test]
    fn test_find_all_paths_respects_depth() {
        let src = "\
int f(int x) {
    if (x > 0) {
        x = 1;
    } else {
        x = 2;
    }
    return x;
}
";
        let ctx = context_for(src);
        let func = ctx.tu().find_function("f").unwrap();
        let entry = ctx.function_entry(func).unwrap();
        let exit = ctx.function_exit(func).unwrap();
        let paths = ctx.find_all_paths(entry, exit, 50);
        assert_eq!(paths.len(), 2, "one path per branch");
        for path in &paths {
            assert_eq!(path.first(), Some(&entry));
            assert_eq!(path.last(), Some(&exit));
        }
        assert!(ctx.find_all_paths(entry, exit, 1).is_empty());
    }

    #[test]
    fn test_trace_definitions_transitive() {
        let src = "\
int f(void) {
    int a = 1;
    int b = a + 2;
    int c = b * 3;
    return c;
}
";
        let ctx = context_for(src);
        let c_init = stmt_containing(&ctx, "f", "int c = b * 3");
        let defs = ctx.trace_variable_definitions(c_init, 10);
        let lines: BTreeSet<u32> = defs.iter().map(|&d| ctx.tu().line(d)).collect();
        assert!(lines.contains(&3), "b's def is found");
        assert!(lines.contains(&2), "a's def is found transitively");
    }

    #[test]
    fn test_trace_definitions_interprocedural_reaches_caller() {
        let src = "\
int scale(int v) {
    int doubled = v * 2;
    return doubled;
}
int f(void) {
    int seed = 21;
    return scale(seed);
}
";
        let ctx = context_for(src);
        let doubled = stmt_containing(&ctx, "scale", "int doubled");
        let defs = ctx.trace_variable_definitions_interprocedural(doubled, 10);
        let seed_line = 6;
        assert!(
            defs.iter().any(|&d| ctx.tu().line(d) == seed_line),
            "the caller's seed definition is reached through the parameter"
        );
    }

    #[test]
    fn test_trace_uses_forward_through_rename() {
        let src = "\
int f(void) {
    int a = 1;
    int b = a;
    int c = b + 1;
    return c;
}
";
        let ctx = context_for(src);
        let a = stmt_containing(&ctx, "f", "int a = 1");
        let uses = ctx.trace_variable_uses_interprocedural(a, "a", 10);
        let lines: BTreeSet<u32> = uses.iter().map(|&u| ctx.tu().line(u)).collect();
        assert!(lines.contains(&3));
        assert!(lines.contains(&4), "rename `b` is followed");
    }

    #[test]
    fn test_call_graph_traversal_context() {
        let src = "\
int leaf(int x) { return x + 1; }
int mid(int x) { return leaf(x) * 2; }
int top(int x) { return mid(x); }
";
        let ctx = context_for(src);
        let top = ctx.tu().find_function("top").unwrap();
        let mut seen: Vec<(String, usize)> = Vec::new();
        ctx.traverse_call_graph_context_sensitive(top, &mut |func, context| {
            seen.push((ctx.tu().func(func).name.clone(), context.depth()));
        }, 10);
        assert_eq!(
            seen,
            vec![
                ("top".to_string(), 0),
                ("mid".to_string(), 1),
                ("leaf".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_unknown_statement_queries_are_empty() {
        let src = "int f(void) { return 0; }";
        let ctx = context_for(src);
        let ret = stmt_containing(&ctx, "f", "return 0");
        assert!(ctx.definitions_reaching(ret, "nope").is_empty());
        assert!(ctx.uses_of_definition(ret, "nope").is_empty());
        assert!(ctx.trace_variable_definitions(ret, 5).is_empty());
    }
}
