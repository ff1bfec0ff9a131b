//! `CpgContext`: owner of the ICFG, the PDG and the dataflow tables for one
//! translation unit.
//!
//! The context owns the parsed `TranslationUnit`; every consumer reaches the
//! AST through it, so statement/function ids stay valid for the lifetime of
//! the analysis.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use tracing::info;

use crate::frontend::ast::{FuncId, StmtId, TranslationUnit};
use crate::frontend::cfg::Cfg;

use super::domain::{
    ControlDependency, DataDependency, IcfgEdgeKind, IcfgNode, IcfgNodeId, IcfgNodeKind, PdgNode,
};

/// Per-statement reaching definition map: variable name -> defining statements
pub type DefsMap = BTreeMap<String, BTreeSet<StmtId>>;

/// Reaching-definition analysis result for one function
#[derive(Debug, Clone, Default)]
pub struct ReachingDefsInfo {
    /// Reaching defs at each statement's program point (before the statement)
    pub reaching: FxHashMap<StmtId, DefsMap>,
    /// GEN set per statement
    pub definitions: FxHashMap<StmtId, BTreeSet<String>>,
    /// USE set per statement
    pub uses: FxHashMap<StmtId, BTreeSet<String>>,
}

#[derive(Debug)]
pub struct CpgContext {
    tu: TranslationUnit,

    // ICFG
    pub(super) icfg_nodes: Vec<IcfgNode>,
    pub(super) stmt_to_icfg: FxHashMap<StmtId, IcfgNodeId>,
    pub(super) func_entries: FxHashMap<FuncId, IcfgNodeId>,
    pub(super) func_exits: FxHashMap<FuncId, IcfgNodeId>,
    pub(super) cfgs: FxHashMap<FuncId, Cfg>,

    // PDG
    pub(super) pdg_nodes: FxHashMap<StmtId, PdgNode>,
    pub(super) reaching: FxHashMap<FuncId, ReachingDefsInfo>,

    // Call graph
    pub(super) call_sites_in: FxHashMap<FuncId, Vec<StmtId>>,
    pub(super) call_targets: FxHashMap<StmtId, FuncId>,
}

impl CpgContext {
    pub fn new(tu: TranslationUnit) -> Self {
        Self {
            tu,
            icfg_nodes: Vec::new(),
            stmt_to_icfg: FxHashMap::default(),
            func_entries: FxHashMap::default(),
            func_exits: FxHashMap::default(),
            cfgs: FxHashMap::default(),
            pdg_nodes: FxHashMap::default(),
            reaching: FxHashMap::default(),
            call_sites_in: FxHashMap::default(),
            call_targets: FxHashMap::default(),
        }
    }

    /// Build everything for a translation unit: global ICFG, then reaching
    /// definitions and PDG per user function.
    pub fn build_full(tu: TranslationUnit) -> Self {
        let mut ctx = Self::new(tu);
        ctx.build_icfg_for_translation_unit();
        let funcs: Vec<FuncId> = ctx.tu.user_functions().map(|f| f.id).collect();
        for func in funcs {
            ctx.compute_reaching_definitions(func);
            ctx.build_pdg(func);
        }
        ctx
    }

    pub fn tu(&self) -> &TranslationUnit {
        &self.tu
    }

    // ------------------------------------------------------------
    // ICFG accessors
    // ------------------------------------------------------------

    pub fn icfg_node(&self, id: IcfgNodeId) -> &IcfgNode {
        &self.icfg_nodes[id.index()]
    }

    pub(super) fn icfg_node_mut(&mut self, id: IcfgNodeId) -> &mut IcfgNode {
        &mut self.icfg_nodes[id.index()]
    }

    pub fn icfg_nodes(&self) -> impl Iterator<Item = &IcfgNode> {
        self.icfg_nodes.iter()
    }

    pub fn icfg_node_of_stmt(&self, stmt: StmtId) -> Option<IcfgNodeId> {
        self.stmt_to_icfg.get(&stmt).copied()
    }

    pub fn function_entry(&self, func: FuncId) -> Option<IcfgNodeId> {
        self.func_entries.get(&func).copied()
    }

    pub fn function_exit(&self, func: FuncId) -> Option<IcfgNodeId> {
        self.func_exits.get(&func).copied()
    }

    pub fn successors_with_edge_kind(&self, id: IcfgNodeId) -> &[(IcfgNodeId, IcfgEdgeKind)] {
        &self.icfg_node(id).successors
    }

    pub fn cfg(&self, func: FuncId) -> Option<&Cfg> {
        self.cfgs.get(&func)
    }

    // ------------------------------------------------------------
    // PDG accessors
    // ------------------------------------------------------------

    pub fn pdg_node(&self, stmt: StmtId) -> Option<&PdgNode> {
        self.pdg_nodes.get(&stmt)
    }

    pub fn pdg_nodes(&self) -> impl Iterator<Item = &PdgNode> {
        self.pdg_nodes.values()
    }

    pub fn data_dependencies(&self, stmt: StmtId) -> Vec<DataDependency> {
        self.pdg_nodes
            .get(&stmt)
            .map(|n| n.data_deps.clone())
            .unwrap_or_default()
    }

    pub fn control_dependencies(&self, stmt: StmtId) -> Vec<ControlDependency> {
        self.pdg_nodes
            .get(&stmt)
            .map(|n| n.control_deps.clone())
            .unwrap_or_default()
    }

    pub fn reaching_info(&self, func: FuncId) -> Option<&ReachingDefsInfo> {
        self.reaching.get(&func)
    }

    /// Definitions of `var_name` reaching `use_stmt`. Empty for unknown
    /// statements, never an error.
    pub fn definitions_reaching(&self, use_stmt: StmtId, var_name: &str) -> BTreeSet<StmtId> {
        let Some(func) = self.tu.containing_function(use_stmt) else {
            return BTreeSet::new();
        };
        let Some(info) = self.reaching.get(&func) else {
            return BTreeSet::new();
        };
        // The table is keyed by statement elements; resolve sub-expressions
        // to their enclosing element first.
        let mut cursor = Some(use_stmt);
        while let Some(stmt) = cursor {
            if let Some(defs) = info.reaching.get(&stmt) {
                return defs.get(var_name).cloned().unwrap_or_default();
            }
            cursor = self.tu.parent(stmt);
        }
        BTreeSet::new()
    }

    /// Statements with a Flow dependency from `def_stmt` on `var_name`.
    pub fn uses_of_definition(&self, def_stmt: StmtId, var_name: &str) -> BTreeSet<StmtId> {
        let mut out = BTreeSet::new();
        for node in self.pdg_nodes.values() {
            for dep in &node.data_deps {
                if dep.kind == super::domain::DepKind::Flow
                    && dep.source_stmt == def_stmt
                    && (var_name.is_empty() || dep.var_name == var_name)
                {
                    out.insert(dep.sink_stmt);
                }
            }
        }
        out
    }

    /// GEN set of a statement, from the dataflow tables when available.
    pub fn defined_vars_cached(&self, stmt: StmtId) -> BTreeSet<String> {
        if let Some(func) = self.tu.containing_function(stmt) {
            if let Some(info) = self.reaching.get(&func) {
                if let Some(defs) = info.definitions.get(&stmt) {
                    return defs.clone();
                }
            }
        }
        self.tu.defined_vars(stmt)
    }

    /// USE set of a statement, from the dataflow tables when available.
    pub fn used_vars_cached(&self, stmt: StmtId) -> BTreeSet<String> {
        if let Some(func) = self.tu.containing_function(stmt) {
            if let Some(info) = self.reaching.get(&func) {
                if let Some(uses) = info.uses.get(&stmt) {
                    return uses.clone();
                }
            }
        }
        self.tu.used_vars(stmt)
    }

    // ------------------------------------------------------------
    // Call graph accessors
    // ------------------------------------------------------------

    /// Call expressions contained in `func`, in source order.
    pub fn call_sites_in(&self, func: FuncId) -> &[StmtId] {
        self.call_sites_in
            .get(&func)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn call_target(&self, call: StmtId) -> Option<FuncId> {
        self.call_targets.get(&call).copied()
    }

    /// All call sites targeting `func`, ordered by statement id.
    pub fn calls_to(&self, func: FuncId) -> Vec<StmtId> {
        let mut calls: Vec<StmtId> = self
            .call_targets
            .iter()
            .filter(|(_, &target)| target == func)
            .map(|(&call, _)| call)
            .collect();
        calls.sort();
        calls
    }

    // ------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------

    pub fn statistics(&self) -> CpgStatistics {
        let mut data_deps = 0usize;
        let mut control_deps = 0usize;
        for node in self.pdg_nodes.values() {
            data_deps += node.data_deps.len();
            control_deps += node.control_deps.len();
        }
        CpgStatistics {
            functions: self.func_entries.len(),
            icfg_nodes: self.icfg_nodes.len(),
            icfg_edges: self
                .icfg_nodes
                .iter()
                .map(|n| n.successors.len())
                .sum(),
            pdg_nodes: self.pdg_nodes.len(),
            data_deps,
            control_deps,
            call_sites: self.call_targets.len(),
        }
    }

    pub fn print_statistics(&self) {
        let stats = self.statistics();
        info!(
            functions = stats.functions,
            icfg_nodes = stats.icfg_nodes,
            icfg_edges = stats.icfg_edges,
            pdg_nodes = stats.pdg_nodes,
            data_deps = stats.data_deps,
            control_deps = stats.control_deps,
            call_sites = stats.call_sites,
            "CPG statistics"
        );
    }

    pub(super) fn create_icfg_node(&mut self, kind: IcfgNodeKind, func: FuncId) -> IcfgNodeId {
        let id = IcfgNodeId(self.icfg_nodes.len() as u32);
        self.icfg_nodes.push(IcfgNode::new(id, kind, func));
        id
    }

    pub(super) fn add_icfg_edge(&mut self, from: IcfgNodeId, to: IcfgNodeId, kind: IcfgEdgeKind) {
        self.icfg_nodes[from.index()].successors.push((to, kind));
        self.icfg_nodes[to.index()].predecessors.push((from, kind));
    }
}

/// Summary counters for the driver's statistics block
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CpgStatistics {
    pub functions: usize,
    pub icfg_nodes: usize,
    pub icfg_edges: usize,
    pub pdg_nodes: usize,
    pub data_deps: usize,
    pub control_deps: usize,
    pub call_sites: usize,
}
