//! ICFG and PDG data model.

use serde::{Deserialize, Serialize};

use crate::frontend::ast::{FuncId, StmtId};
use crate::frontend::cfg::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IcfgNodeId(pub u32);

impl IcfgNodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for IcfgNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// ICFG node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IcfgNodeKind {
    Entry,
    Exit,
    Statement,
    CallSite,
    ReturnSite,
    FormalIn,
    FormalOut,
    ActualIn,
    ActualOut,
}

impl IcfgNodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IcfgNodeKind::Entry => "Entry",
            IcfgNodeKind::Exit => "Exit",
            IcfgNodeKind::Statement => "Statement",
            IcfgNodeKind::CallSite => "CallSite",
            IcfgNodeKind::ReturnSite => "ReturnSite",
            IcfgNodeKind::FormalIn => "FormalIn",
            IcfgNodeKind::FormalOut => "FormalOut",
            IcfgNodeKind::ActualIn => "ActualIn",
            IcfgNodeKind::ActualOut => "ActualOut",
        }
    }
}

/// ICFG edge kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IcfgEdgeKind {
    Intraprocedural,
    Call,
    Return,
    ParamIn,
    ParamOut,
    True,
    False,
    Unconditional,
}

impl IcfgEdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IcfgEdgeKind::Intraprocedural => "intra",
            IcfgEdgeKind::Call => "call",
            IcfgEdgeKind::Return => "return",
            IcfgEdgeKind::ParamIn => "param_in",
            IcfgEdgeKind::ParamOut => "param_out",
            IcfgEdgeKind::True => "true",
            IcfgEdgeKind::False => "false",
            IcfgEdgeKind::Unconditional => "uncond",
        }
    }
}

/// ICFG node. Successor/predecessor lists are mirrored: every `(m, k)` in
/// `successors` of `n` has `(n, k)` in `predecessors` of `m`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcfgNode {
    pub id: IcfgNodeId,
    pub kind: IcfgNodeKind,
    pub stmt: Option<StmtId>,
    pub func: FuncId,
    pub block: Option<BlockId>,
    pub call_expr: Option<StmtId>,
    pub callee: Option<FuncId>,
    pub param_index: Option<usize>,
    pub param_name: String,
    pub successors: Vec<(IcfgNodeId, IcfgEdgeKind)>,
    pub predecessors: Vec<(IcfgNodeId, IcfgEdgeKind)>,
}

impl IcfgNode {
    pub fn new(id: IcfgNodeId, kind: IcfgNodeKind, func: FuncId) -> Self {
        Self {
            id,
            kind,
            stmt: None,
            func,
            block: None,
            call_expr: None,
            callee: None,
            param_index: None,
            param_name: String::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }
}

/// Data dependency kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepKind {
    /// RAW
    Flow,
    /// WAR
    Anti,
    /// WAW
    Output,
}

/// Data dependency between two statements on one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDependency {
    pub source_stmt: StmtId,
    pub sink_stmt: StmtId,
    pub var_name: String,
    pub kind: DepKind,
}

/// Control dependency: `dependent_stmt` executes only when `control_stmt`
/// takes the branch with value `branch_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDependency {
    pub control_stmt: StmtId,
    pub dependent_stmt: StmtId,
    pub branch_value: bool,
}

/// Per-statement PDG node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdgNode {
    pub stmt: StmtId,
    pub func: FuncId,
    pub data_deps: Vec<DataDependency>,
    pub control_deps: Vec<ControlDependency>,
}

impl PdgNode {
    pub fn new(stmt: StmtId, func: FuncId) -> Self {
        Self {
            stmt,
            func,
            data_deps: Vec::new(),
            control_deps: Vec::new(),
        }
    }
}

/// Call-site stack used by context-sensitive call graph traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallContext {
    pub call_stack: Vec<StmtId>,
}

impl CallContext {
    pub fn push(&self, call: StmtId) -> CallContext {
        let mut next = self.clone();
        next.call_stack.push(call);
        next
    }

    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn render(&self) -> String {
        let frames: Vec<String> = self.call_stack.iter().map(|c| c.to_string()).collect();
        format!("[{}]", frames.join(" -> "))
    }
}
