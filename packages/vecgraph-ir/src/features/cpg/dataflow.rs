//! Dataflow fixed points: reaching definitions, post-dominators, and the
//! data/control dependencies derived from them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rustc_hash::FxHashMap;

use crate::frontend::ast::{FuncId, StmtId, StmtKind};
use crate::frontend::cfg::{BlockId, Cfg};

use super::context::{CpgContext, DefsMap, ReachingDefsInfo};
use super::domain::{ControlDependency, DataDependency, DepKind, PdgNode};

/// Fixed-point iteration cap; convergence is expected far earlier.
const MAX_ITERATIONS: usize = 100;

impl CpgContext {
    // ------------------------------------------------------------
    // Reaching definitions
    // ------------------------------------------------------------

    pub fn compute_reaching_definitions(&mut self, func: FuncId) {
        if !self.cfgs.contains_key(&func) {
            self.build_icfg(func);
        }
        let Some(cfg) = self.cfgs.get(&func) else {
            return;
        };
        let cfg = cfg.clone();

        let mut info = ReachingDefsInfo::default();
        for stmt in cfg.all_elements() {
            info.definitions.insert(stmt, self.tu().defined_vars(stmt));
            info.uses.insert(stmt, self.tu().used_vars(stmt));
        }

        self.iterate_reaching_defs(&cfg, &mut info);
        self.reaching.insert(func, info);
    }

    fn iterate_reaching_defs(&self, cfg: &Cfg, info: &mut ReachingDefsInfo) {
        let rpo = cfg.reverse_postorder();
        let mut block_out: FxHashMap<BlockId, DefsMap> = FxHashMap::default();

        for _ in 0..MAX_ITERATIONS {
            let mut changed = false;
            for &block in &rpo {
                // IN(b) = union of OUT(pred)
                let mut current: DefsMap = BTreeMap::new();
                for &pred in &cfg.block(block).preds {
                    if let Some(pred_out) = block_out.get(&pred) {
                        for (var, defs) in pred_out {
                            current
                                .entry(var.clone())
                                .or_default()
                                .extend(defs.iter().copied());
                        }
                    }
                }

                // Kill/gen per statement, recording the program point first.
                for &stmt in &cfg.block(block).elements {
                    info.reaching.insert(stmt, current.clone());
                    if let Some(defs) = info.definitions.get(&stmt) {
                        for var in defs {
                            let entry = current.entry(var.clone()).or_default();
                            entry.clear();
                            entry.insert(stmt);
                        }
                    }
                }

                if block_out.get(&block) != Some(&current) {
                    block_out.insert(block, current);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    // ------------------------------------------------------------
    // PDG construction
    // ------------------------------------------------------------

    pub fn build_pdg(&mut self, func: FuncId) {
        self.compute_data_dependencies(func);
        self.compute_control_dependencies(func);
    }

    fn ensure_pdg_node(&mut self, stmt: StmtId, func: FuncId) {
        self.pdg_nodes
            .entry(stmt)
            .or_insert_with(|| PdgNode::new(stmt, func));
    }

    fn compute_data_dependencies(&mut self, func: FuncId) {
        let Some(info) = self.reaching.get(&func) else {
            return;
        };

        // Flow deps: every reaching def of every used variable.
        let mut flow: Vec<(StmtId, DataDependency)> = Vec::new();
        let mut stmts: Vec<StmtId> = info.uses.keys().copied().collect();
        stmts.sort();
        for &stmt in &stmts {
            let Some(used) = info.uses.get(&stmt) else {
                continue;
            };
            for var in used {
                if let Some(defs) = info.reaching.get(&stmt).and_then(|m| m.get(var)) {
                    for &def in defs {
                        flow.push((
                            stmt,
                            DataDependency {
                                source_stmt: def,
                                sink_stmt: stmt,
                                var_name: var.clone(),
                                kind: DepKind::Flow,
                            },
                        ));
                    }
                }
            }
        }

        // Output deps: a definition killed by a later definition it reaches.
        let mut def_stmts: Vec<StmtId> = info.definitions.keys().copied().collect();
        def_stmts.sort();
        for &stmt in &def_stmts {
            let Some(defined) = info.definitions.get(&stmt) else {
                continue;
            };
            for var in defined {
                if let Some(prior) = info.reaching.get(&stmt).and_then(|m| m.get(var)) {
                    for &def in prior {
                        if def != stmt {
                            flow.push((
                                stmt,
                                DataDependency {
                                    source_stmt: def,
                                    sink_stmt: stmt,
                                    var_name: var.clone(),
                                    kind: DepKind::Output,
                                },
                            ));
                        }
                    }
                }
            }
        }

        // Anti deps: a read whose reaching def is overwritten downstream.
        for &def_stmt in &def_stmts {
            let Some(defined) = info.definitions.get(&def_stmt) else {
                continue;
            };
            for var in defined {
                let reaching_here: BTreeSet<StmtId> = info
                    .reaching
                    .get(&def_stmt)
                    .and_then(|m| m.get(var))
                    .cloned()
                    .unwrap_or_default();
                if reaching_here.is_empty() {
                    continue;
                }
                for &use_stmt in &stmts {
                    if use_stmt == def_stmt {
                        continue;
                    }
                    let Some(used) = info.uses.get(&use_stmt) else {
                        continue;
                    };
                    if !used.contains(var) {
                        continue;
                    }
                    let overlap = info
                        .reaching
                        .get(&use_stmt)
                        .and_then(|m| m.get(var))
                        .map(|defs| !defs.is_disjoint(&reaching_here))
                        .unwrap_or(false);
                    if overlap {
                        flow.push((
                            def_stmt,
                            DataDependency {
                                source_stmt: use_stmt,
                                sink_stmt: def_stmt,
                                var_name: var.clone(),
                                kind: DepKind::Anti,
                            },
                        ));
                    }
                }
            }
        }

        for (stmt, dep) in flow {
            self.ensure_pdg_node(stmt, func);
            if let Some(node) = self.pdg_nodes.get_mut(&stmt) {
                if !node.data_deps.contains(&dep) {
                    node.data_deps.push(dep);
                }
            }
        }
    }

    // ------------------------------------------------------------
    // Post-dominators and control dependencies
    // ------------------------------------------------------------

    /// `PD(exit) = {exit}`; every other block starts at the full set and is
    /// refined by `PD(b) = {b} ∪ ⋂ PD(succ)` until a fixed point.
    pub fn compute_post_dominators(&self, func: FuncId) -> FxHashMap<BlockId, BTreeSet<BlockId>> {
        let mut post_dom: FxHashMap<BlockId, BTreeSet<BlockId>> = FxHashMap::default();
        let Some(cfg) = self.cfgs.get(&func) else {
            return post_dom;
        };

        let all_blocks: BTreeSet<BlockId> = cfg.block_ids().collect();
        for block in cfg.block_ids() {
            if block == cfg.exit {
                post_dom.insert(block, BTreeSet::from([block]));
            } else {
                post_dom.insert(block, all_blocks.clone());
            }
        }

        for _ in 0..MAX_ITERATIONS {
            let mut changed = false;
            for block in cfg.block_ids() {
                if block == cfg.exit {
                    continue;
                }
                let mut new_set: Option<BTreeSet<BlockId>> = None;
                for &succ in &cfg.block(block).succs {
                    let succ_set = &post_dom[&succ];
                    new_set = Some(match new_set {
                        None => succ_set.clone(),
                        Some(acc) => acc.intersection(succ_set).copied().collect(),
                    });
                }
                let mut new_set = new_set.unwrap_or_default();
                new_set.insert(block);
                if post_dom[&block] != new_set {
                    post_dom.insert(block, new_set);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        post_dom
    }

    fn compute_control_dependencies(&mut self, func: FuncId) {
        let post_dom = self.compute_post_dominators(func);
        let Some(cfg) = self.cfgs.get(&func) else {
            return;
        };
        let cfg = cfg.clone();

        for block in cfg.block_ids() {
            let Some(term) = cfg.block(block).terminator else {
                continue;
            };
            if !matches!(
                self.tu().stmt(term).kind,
                StmtKind::If { .. } | StmtKind::While { .. }
            ) {
                continue;
            }

            for (succ_index, &succ) in cfg.block(block).succs.iter().enumerate() {
                let branch_value = succ_index == 0;
                self.process_control_branch(&cfg, block, term, succ, branch_value, &post_dom, func);
            }
        }
    }

    /// Worklist from the branch successor over blocks not post-dominated by
    /// the branching block; every statement in a visited block becomes
    /// control-dependent on the terminator.
    #[allow(clippy::too_many_arguments)]
    fn process_control_branch(
        &mut self,
        cfg: &Cfg,
        branch_block: BlockId,
        term: StmtId,
        succ: BlockId,
        branch_value: bool,
        post_dom: &FxHashMap<BlockId, BTreeSet<BlockId>>,
        func: FuncId,
    ) {
        let mut visited: BTreeSet<BlockId> = BTreeSet::from([succ]);
        let mut worklist: VecDeque<BlockId> = VecDeque::from([succ]);

        while let Some(current) = worklist.pop_front() {
            let dominated = post_dom
                .get(&current)
                .map(|set| set.contains(&branch_block))
                .unwrap_or(false);
            if dominated {
                continue;
            }

            for &stmt in &cfg.block(current).elements {
                self.ensure_pdg_node(stmt, func);
                let dep = ControlDependency {
                    control_stmt: term,
                    dependent_stmt: stmt,
                    branch_value,
                };
                if let Some(node) = self.pdg_nodes.get_mut(&stmt) {
                    if !node.control_deps.contains(&dep) {
                        node.control_deps.push(dep);
                    }
                }
            }

            for &next in &cfg.block(current).succs {
                if visited.insert(next) {
                    worklist.push_back(next);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_translation_unit;

    fn context_for(src: &str) -> CpgContext {
        let tu = parse_translation_unit(src, "dataflow_test.c").unwrap();
        CpgContext::build_full(tu)
    }

    fn stmt_on_line(ctx: &CpgContext, func: &str, line: u32, needle: &str) -> StmtId {
        let f = ctx.tu().find_function(func).unwrap();
        let body = ctx.tu().func(f).body.unwrap();
        ctx.tu()
            .collect_stmts(body)
            .into_iter()
            .find(|&s| ctx.tu().line(s) == line && ctx.tu().text(s).contains(needle))
            .unwrap_or_else(|| panic!("no stmt on line {line} matching {needle:?}"))
    }

    #[test]
    fn test_kill_keeps_only_latest_definition() {
        let src = "\
int f(void) {
    int x = 1;
    x = 2;
    int y = x + 1;
    return y;
}
";
        let ctx = context_for(src);
        let use_stmt = stmt_on_line(&ctx, "f", 4, "int y");
        let defs = ctx.definitions_reaching(use_stmt, "x");
        assert_eq!(defs.len(), 1);
        let def = *defs.iter().next().unwrap();
        assert_eq!(ctx.tu().line(def), 3, "the L2 def must be killed");
    }

    #[test]
    fn test_loop_merges_definitions() {
        let src = "\
int f(int n) {
    int s = 0;
    for (int i = 0; i < n; ++i) {
        s = s + i;
    }
    return s;
}
";
        let ctx = context_for(src);
        let use_stmt = stmt_on_line(&ctx, "f", 4, "s = s + i");
        // Both the init and the loop body assignment reach the use.
        let defs = ctx.definitions_reaching(use_stmt, "s");
        assert_eq!(defs.len(), 2);
    }

    #[test]
    fn test_flow_dependency_recorded() {
        let src = "\
int f(void) {
    int x = 1;
    int y = x + 2;
    return y;
}
";
        let ctx = context_for(src);
        let def = stmt_on_line(&ctx, "f", 2, "int x");
        let use_stmt = stmt_on_line(&ctx, "f", 3, "int y");
        let deps = ctx.data_dependencies(use_stmt);
        assert!(deps
            .iter()
            .any(|d| d.kind == DepKind::Flow && d.source_stmt == def && d.var_name == "x"));
        assert!(ctx.uses_of_definition(def, "x").contains(&use_stmt));
    }

    #[test]
    fn test_output_dependency_recorded() {
        let src = "\
void f(void) {
    int x = 1;
    x = 2;
}
";
        let ctx = context_for(src);
        let second = stmt_on_line(&ctx, "f", 3, "x = 2");
        let deps = ctx.data_dependencies(second);
        assert!(deps.iter().any(|d| d.kind == DepKind::Output));
    }

    #[test]
    fn test_anti_dependency_recorded() {
        let src = "\
int f(void) {
    int x = 1;
    int y = x;
    x = 2;
    return y;
}
";
        let ctx = context_for(src);
        let redef = stmt_on_line(&ctx, "f", 4, "x = 2");
        let deps = ctx.data_dependencies(redef);
        assert!(deps
            .iter()
            .any(|d| d.kind == DepKind::Anti && d.var_name == "x"));
    }

    #[test]
    fn test_exit_post_dominates_all() {
        let src = "int f(int x) { if (x) { x = 1; } return x; }";
        let ctx = context_for(src);
        let func = ctx.tu().find_function("f").unwrap();
        let post_dom = ctx.compute_post_dominators(func);
        let cfg = ctx.cfg(func).unwrap();
        for block in cfg.block_ids() {
            let dominated = cfg.postorder().contains(&block);
            if dominated {
                assert!(
                    post_dom[&block].contains(&cfg.exit),
                    "{} should be post-dominated by exit",
                    block
                );
            }
        }
        assert_eq!(post_dom[&cfg.exit], BTreeSet::from([cfg.exit]));
    }

    #[test]
    fn test_control_dependency_on_branch() {
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
        let assign = stmt_on_line(&ctx, "f", 4, "y = 1");
        let deps = ctx.control_dependencies(assign);
        assert_eq!(deps.len(), 1);
        assert!(deps[0].branch_value, "then-branch carries branch_value=true");
        // The join is reachable from both successors and post-dominated by
        // neither, so the return carries a dep per branch value.
        let ret = stmt_on_line(&ctx, "f", 6, "return y");
        let ret_deps = ctx.control_dependencies(ret);
        assert!(ret_deps.iter().any(|d| d.branch_value));
        assert!(ret_deps.iter().any(|d| !d.branch_value));
    }

    #[test]
    fn test_while_body_post_dominated_by_header() {
        let src = "\
int f(int n) {
    int s = 0;
    while (n > 0) {
        s = s + n;
        n = n - 1;
    }
    return s;
}
";
        let ctx = context_for(src);
        // The loop body is post-dominated by the loop header, so the branch
        // worklist stops there and emits nothing for it.
        let body_stmt = stmt_on_line(&ctx, "f", 4, "s = s + n");
        assert!(ctx.control_dependencies(body_stmt).is_empty());
        // The block after the loop sits on the exit (false) branch only.
        let ret = stmt_on_line(&ctx, "f", 7, "return s");
        let deps = ctx.control_dependencies(ret);
        assert!(!deps.is_empty());
        assert!(deps.iter().all(|d| !d.branch_value));
    }
}
