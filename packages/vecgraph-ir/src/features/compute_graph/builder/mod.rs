//! Compute-graph builder: grows a typed dataflow/control graph outward from
//! an anchor expression.
//!
//! Construction phases per anchor:
//! 1. preceding statements in the anchor's scope (textual order)
//! 2. the containing loop node
//! 3. anchor expression lowering
//! 4. backward definition trace
//! 5. forward use trace
//! 6. parameter-to-call-site promotion
//! 7. loop wiring (body, loop variable, external initializer)
//! 8. control-flow edges from the ICFG

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::features::anchor::AnchorPoint;
use crate::features::cpg::{CpgContext, IcfgEdgeKind};
use crate::frontend::ast::{FuncId, StmtId, StmtKind};

use super::domain::{ComputeEdgeKind, ComputeNodeKind, NodeId, INVALID_NODE};
use super::graph::ComputeGraph;

mod branch;
mod callee;
mod expr;
mod loops;
mod trace;

pub use loops::LoopInfo;

/// Non-negotiable depth caps: every trace reads its bound from here, so a
/// builder cannot be constructed without them.
#[derive(Debug, Clone, Copy)]
pub struct TraceLimits {
    pub max_expr_depth: u32,
    pub max_backward_depth: u32,
    pub max_forward_depth: u32,
    pub max_call_depth: u32,
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self {
            max_expr_depth: 20,
            max_backward_depth: 10,
            max_forward_depth: 5,
            max_call_depth: 3,
        }
    }
}

/// One deferred trace step; backward/forward tracing runs on an explicit
/// work queue instead of mutual recursion.
#[derive(Debug, Clone, Copy)]
enum TraceTask {
    Backward { stmt: StmtId, depth: u32 },
    Forward { stmt: StmtId, depth: u32 },
}

pub struct ComputeGraphBuilder<'c> {
    pub(super) cpg: &'c CpgContext,
    pub(super) limits: TraceLimits,
    pub(super) enable_interprocedural: bool,

    pub(super) graph: ComputeGraph,
    /// Lowered statements; also the re-entry guard for expression lowering
    pub(super) processed_stmts: BTreeMap<StmtId, NodeId>,
    pub(super) forward_traced: FxHashSet<StmtId>,
    /// Functions currently being inlined (recursion guard)
    pub(super) call_stack: FxHashSet<FuncId>,
    pub(super) call_depth: u32,
    pub(super) loop_info: LoopInfo,

    trace_queue: VecDeque<TraceTask>,
    draining: bool,
}

impl<'c> ComputeGraphBuilder<'c> {
    pub fn new(cpg: &'c CpgContext) -> Self {
        Self::with_limits(cpg, TraceLimits::default())
    }

    pub fn with_limits(cpg: &'c CpgContext, limits: TraceLimits) -> Self {
        Self {
            cpg,
            limits,
            enable_interprocedural: true,
            graph: ComputeGraph::new(""),
            processed_stmts: BTreeMap::new(),
            forward_traced: FxHashSet::default(),
            call_stack: FxHashSet::default(),
            call_depth: 0,
            loop_info: LoopInfo::default(),
            trace_queue: VecDeque::new(),
            draining: false,
        }
    }

    pub fn set_enable_interprocedural(&mut self, enable: bool) {
        self.enable_interprocedural = enable;
    }

    pub fn limits(&self) -> TraceLimits {
        self.limits
    }

    fn reset(&mut self, name: String) {
        self.graph = ComputeGraph::new(name);
        self.processed_stmts.clear();
        self.forward_traced.clear();
        self.call_stack.clear();
        self.call_depth = 0;
        self.loop_info = LoopInfo::default();
        self.trace_queue.clear();
        self.draining = false;
    }

    // ------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------

    /// Build the compute graph seeded at an anchor.
    pub fn build_from_anchor(&mut self, anchor: &AnchorPoint) -> ComputeGraph {
        let func_name = self.cpg.tu().func(anchor.func).name.clone();
        self.reset(format!("{}_L{}", func_name, anchor.source_line));

        self.graph.set_property("anchor_func", func_name);
        self.graph
            .set_property("anchor_line", anchor.source_line.to_string());
        self.graph
            .set_property("anchor_code", anchor.source_text.clone());
        self.graph
            .set_property("loop_depth", anchor.loop_depth.to_string());

        debug!(
            line = anchor.source_line,
            code = %anchor.source_text,
            "building compute graph from anchor"
        );

        // Same-line statements preceding the anchor must exist first.
        self.ensure_preceding_statements_built(anchor.stmt);

        if anchor.loop_depth > 0 {
            self.loop_info = self.build_containing_loop_node(anchor.stmt);
        }

        let anchor_node = self.build_expression_tree(anchor.stmt, 0);
        if let Some(node) = self.graph.node_mut(anchor_node) {
            node.set_property("is_anchor", "true");
            node.loop_depth = anchor.loop_depth;
            node.containing_func = Some(anchor.func);
        }
        self.loop_info.anchor_node_id = anchor_node;

        self.trace_all_definitions_backward(anchor.stmt, 0);
        self.trace_all_uses_forward(anchor.stmt, 0);
        self.trace_all_parameters_to_call_sites();

        if self.loop_info.loop_node_id != INVALID_NODE {
            let info = self.loop_info.clone();
            self.connect_loop_to_body(&info);
            self.connect_loop_variables_to_loop_node(&info);
            self.connect_loop_var_init_to_loop(&info);
        }

        self.add_cfg_edges();

        self.graph.set_property("score", anchor.score.to_string());
        std::mem::replace(&mut self.graph, ComputeGraph::new(""))
    }

    /// Build a compute graph from an arbitrary expression.
    pub fn build_from_expr(&mut self, expr: StmtId) -> ComputeGraph {
        let line = self.cpg.tu().line(expr);
        self.reset(format!("expr_L{line}"));
        self.graph.set_property("anchor_line", line.to_string());

        self.build_expression_tree(expr, 0);
        self.trace_all_definitions_backward(expr, 0);
        self.trace_all_uses_forward(expr, 0);
        self.add_cfg_edges();

        std::mem::replace(&mut self.graph, ComputeGraph::new(""))
    }

    // ------------------------------------------------------------
    // Phase 1: preceding statements
    // ------------------------------------------------------------

    /// Build, in `(line, column)` order, every statement of the innermost
    /// enclosing compound that precedes the anchor. This makes same-line
    /// sequences like `len++; if (ref[len] ...)` lower in textual order.
    pub(super) fn ensure_preceding_statements_built(&mut self, target: StmtId) {
        let tu = self.cpg.tu();
        let Some((compound, direct_child)) = tu.enclosing_compound(target) else {
            return;
        };
        let StmtKind::Compound { stmts } = tu.stmt(compound).kind.clone() else {
            return;
        };

        let mut sorted: Vec<(u32, u32, StmtId)> = stmts
            .iter()
            .map(|&s| (tu.line(s), tu.column(s), s))
            .collect();
        sorted.sort();

        let target_pos = (tu.line(direct_child), tu.column(direct_child));
        for (line, col, stmt) in sorted {
            if stmt == direct_child {
                break;
            }
            if (line, col) < target_pos && !self.processed_stmts.contains_key(&stmt) {
                self.build_expression_tree(stmt, 0);
            }
        }
    }

    // ------------------------------------------------------------
    // Phase 8: control-flow edges
    // ------------------------------------------------------------

    /// Mirror ICFG successor edges between statements that both appear in
    /// the graph, labelled per edge kind.
    pub(super) fn add_cfg_edges(&mut self) {
        let pairs: Vec<(NodeId, StmtId)> = self
            .graph
            .nodes()
            .filter_map(|n| n.ast_stmt.map(|s| (n.id, s)))
            .collect();

        for (node_id, stmt) in pairs {
            let Some(icfg_id) = self.cpg.icfg_node_of_stmt(stmt) else {
                continue;
            };
            let successors = self.cpg.icfg_node(icfg_id).successors.clone();
            for (succ, edge_kind) in successors {
                let Some(succ_stmt) = self.cpg.icfg_node(succ).stmt else {
                    continue;
                };
                let Some(&succ_node) = self.processed_stmts.get(&succ_stmt) else {
                    continue;
                };
                let label = cfg_edge_label(edge_kind);
                self.connect_nodes(node_id, succ_node, ComputeEdgeKind::Control, label);
            }
        }
    }

    // ------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------

    /// Add an edge unless it already exists with identical endpoints, kind
    /// and label; self-edges and invalid endpoints are dropped.
    pub(super) fn connect_nodes(
        &mut self,
        from: NodeId,
        to: NodeId,
        kind: ComputeEdgeKind,
        label: &str,
    ) {
        if from == to || from == INVALID_NODE || to == INVALID_NODE {
            return;
        }
        let duplicate = self
            .graph
            .outgoing_edges(from)
            .iter()
            .any(|e| e.target_id == to && e.kind == kind && e.label == label);
        if duplicate {
            return;
        }
        self.graph.add_edge(from, to, kind, label);
    }

    /// Synthetic definition node used when a definition statement cannot be
    /// lowered through the expression path.
    pub(super) fn create_definition_node(&mut self, def_stmt: StmtId, var_name: &str) -> NodeId {
        if let Some(&existing) = self.processed_stmts.get(&def_stmt) {
            return existing;
        }
        let id = self.graph.create_node(ComputeNodeKind::Variable);
        let tu = self.cpg.tu();
        let text = tu.text(def_stmt).to_string();
        let line = tu.line(def_stmt);
        let func = tu.containing_function(def_stmt);
        if let Some(node) = self.graph.node_mut(id) {
            node.name = var_name.to_string();
            node.ast_stmt = Some(def_stmt);
            node.source_text = text;
            node.source_line = line;
            node.containing_func = func;
        }
        self.graph.index_stmt(def_stmt, id);
        self.processed_stmts.insert(def_stmt, id);
        id
    }

    // ------------------------------------------------------------
    // Trace scheduling
    // ------------------------------------------------------------

    pub(super) fn trace_all_definitions_backward(&mut self, stmt: StmtId, depth: u32) {
        self.trace_queue.push_back(TraceTask::Backward { stmt, depth });
        self.drain_trace_queue();
    }

    pub(super) fn trace_all_uses_forward(&mut self, stmt: StmtId, depth: u32) {
        self.trace_queue.push_back(TraceTask::Forward { stmt, depth });
        self.drain_trace_queue();
    }

    pub(super) fn schedule_backward(&mut self, stmt: StmtId, depth: u32) {
        self.trace_queue.push_back(TraceTask::Backward { stmt, depth });
    }

    pub(super) fn schedule_forward(&mut self, stmt: StmtId, depth: u32) {
        self.trace_queue.push_back(TraceTask::Forward { stmt, depth });
    }

    fn drain_trace_queue(&mut self) {
        if self.draining {
            // Re-entrant call from inside a running drain: the active loop
            // will pick the new task up.
            return;
        }
        self.draining = true;
        while let Some(task) = self.trace_queue.pop_front() {
            match task {
                TraceTask::Backward { stmt, depth } => self.process_backward(stmt, depth),
                TraceTask::Forward { stmt, depth } => self.process_forward(stmt, depth),
            }
        }
        self.draining = false;
    }
}

/// Map ICFG edge kinds to compute-graph control labels.
fn cfg_edge_label(kind: IcfgEdgeKind) -> &'static str {
    match kind {
        IcfgEdgeKind::Intraprocedural | IcfgEdgeKind::Unconditional => "cfg",
        IcfgEdgeKind::True => "cfg_true",
        IcfgEdgeKind::False => "cfg_false",
        IcfgEdgeKind::Call => "cfg_call",
        IcfgEdgeKind::Return => "cfg_return",
        IcfgEdgeKind::ParamIn => "cfg_param_in",
        IcfgEdgeKind::ParamOut => "cfg_param_out",
    }
}
