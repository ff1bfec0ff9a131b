//! Compute-graph node and edge model.
//!
//! Node ids are dense `u64`s starting at 1; 0 is the reserved invalid id.
//! Adjacency is kept as id lists, so nodes never own each other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frontend::ast::{FuncId, StmtId, VarId};
use crate::shared::models::{DataTypeInfo, OpCode};

pub type NodeId = u64;
pub type EdgeId = u64;

/// The invalid/absent node id
pub const INVALID_NODE: NodeId = 0;

/// Compute node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComputeNodeKind {
    Constant,
    Variable,
    Parameter,
    BinaryOp,
    UnaryOp,
    CompareOp,
    Load,
    Store,
    ArrayAccess,
    MemberAccess,
    Phi,
    Select,
    LoopInduction,
    Loop,
    Branch,
    Call,
    IntrinsicCall,
    Cast,
    Return,
    Unknown,
}

impl ComputeNodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeNodeKind::Constant => "Const",
            ComputeNodeKind::Variable => "Var",
            ComputeNodeKind::Parameter => "Param",
            ComputeNodeKind::BinaryOp => "BinOp",
            ComputeNodeKind::UnaryOp => "UnaryOp",
            ComputeNodeKind::CompareOp => "CmpOp",
            ComputeNodeKind::Load => "Load",
            ComputeNodeKind::Store => "Store",
            ComputeNodeKind::ArrayAccess => "ArrayAccess",
            ComputeNodeKind::MemberAccess => "MemberAccess",
            ComputeNodeKind::Phi => "Phi",
            ComputeNodeKind::Select => "Select",
            ComputeNodeKind::LoopInduction => "LoopInd",
            ComputeNodeKind::Loop => "Loop",
            ComputeNodeKind::Branch => "Branch",
            ComputeNodeKind::Call => "Call",
            ComputeNodeKind::IntrinsicCall => "Intrinsic",
            ComputeNodeKind::Cast => "Cast",
            ComputeNodeKind::Return => "Return",
            ComputeNodeKind::Unknown => "Unknown",
        }
    }

    /// Stable integer tag used by canonical signatures
    pub fn tag(self) -> u32 {
        match self {
            ComputeNodeKind::Constant => 0,
            ComputeNodeKind::Variable => 1,
            ComputeNodeKind::Parameter => 2,
            ComputeNodeKind::BinaryOp => 3,
            ComputeNodeKind::UnaryOp => 4,
            ComputeNodeKind::CompareOp => 5,
            ComputeNodeKind::Load => 6,
            ComputeNodeKind::Store => 7,
            ComputeNodeKind::ArrayAccess => 8,
            ComputeNodeKind::MemberAccess => 9,
            ComputeNodeKind::Phi => 10,
            ComputeNodeKind::Select => 11,
            ComputeNodeKind::LoopInduction => 12,
            ComputeNodeKind::Loop => 13,
            ComputeNodeKind::Branch => 14,
            ComputeNodeKind::Call => 15,
            ComputeNodeKind::IntrinsicCall => 16,
            ComputeNodeKind::Cast => 17,
            ComputeNodeKind::Return => 18,
            ComputeNodeKind::Unknown => 19,
        }
    }
}

/// Compute edge kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComputeEdgeKind {
    DataFlow,
    Control,
    Memory,
    Call,
    Return,
    LoopCarried,
}

impl ComputeEdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeEdgeKind::DataFlow => "DataFlow",
            ComputeEdgeKind::Control => "Control",
            ComputeEdgeKind::Memory => "Memory",
            ComputeEdgeKind::Call => "Call",
            ComputeEdgeKind::Return => "Return",
            ComputeEdgeKind::LoopCarried => "LoopCarried",
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            ComputeEdgeKind::DataFlow => 0,
            ComputeEdgeKind::Control => 1,
            ComputeEdgeKind::Memory => 2,
            ComputeEdgeKind::Call => 3,
            ComputeEdgeKind::Return => 4,
            ComputeEdgeKind::LoopCarried => 5,
        }
    }
}

/// Constant payload of a `Constant` node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
}

impl ConstValue {
    pub fn render(&self) -> String {
        match self {
            ConstValue::Int(v) => v.to_string(),
            ConstValue::Float(v) => format!("{v:.6}"),
        }
    }
}

/// One compute-graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeNode {
    pub id: NodeId,
    pub kind: ComputeNodeKind,
    pub name: String,
    pub data_type: DataTypeInfo,

    // AST anchors
    pub ast_stmt: Option<StmtId>,
    pub ast_decl: Option<VarId>,
    pub containing_func: Option<FuncId>,

    pub op_code: OpCode,
    pub const_value: Option<ConstValue>,

    pub properties: BTreeMap<String, String>,

    // Adjacency mirrors, maintained by the graph
    pub input_nodes: Vec<NodeId>,
    pub output_nodes: Vec<NodeId>,

    pub loop_depth: u32,
    pub is_loop_invariant: bool,

    // Loop context: 0 = not inside a loop
    pub loop_context_id: NodeId,
    pub loop_context_var: String,
    pub loop_context_line: u32,

    // Branch context: 0 = not inside a branch
    pub branch_context_id: NodeId,
    pub branch_type: String,
    pub branch_context_line: u32,

    pub source_text: String,
    pub source_line: u32,
}

impl ComputeNode {
    pub fn new(kind: ComputeNodeKind, id: NodeId) -> Self {
        Self {
            id,
            kind,
            name: String::new(),
            data_type: DataTypeInfo::default(),
            ast_stmt: None,
            ast_decl: None,
            containing_func: None,
            op_code: OpCode::Unknown,
            const_value: None,
            properties: BTreeMap::new(),
            input_nodes: Vec::new(),
            output_nodes: Vec::new(),
            loop_depth: 0,
            is_loop_invariant: false,
            loop_context_id: INVALID_NODE,
            loop_context_var: String::new(),
            loop_context_line: 0,
            branch_context_id: INVALID_NODE,
            branch_type: String::new(),
            branch_context_line: 0,
            source_text: String::new(),
            source_line: 0,
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> &str {
        self.properties.get(key).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn property_is(&self, key: &str, value: &str) -> bool {
        self.property(key) == value
    }

    pub fn label(&self) -> String {
        let mut label = format!("{}", self.kind.as_str());
        if !self.name.is_empty() {
            label.push_str(": ");
            label.push_str(&self.name);
        }
        if self.op_code != OpCode::Unknown {
            label.push_str(&format!(" [{}]", self.op_code));
        }
        label
    }

    pub fn is_operation_node(&self) -> bool {
        matches!(
            self.kind,
            ComputeNodeKind::BinaryOp | ComputeNodeKind::UnaryOp | ComputeNodeKind::CompareOp
        )
    }

    pub fn is_memory_node(&self) -> bool {
        matches!(
            self.kind,
            ComputeNodeKind::Load | ComputeNodeKind::Store | ComputeNodeKind::ArrayAccess
        )
    }

    pub fn is_vectorizable(&self) -> bool {
        match self.kind {
            ComputeNodeKind::BinaryOp | ComputeNodeKind::CompareOp => true,
            ComputeNodeKind::Load
            | ComputeNodeKind::Store
            | ComputeNodeKind::ArrayAccess => true,
            ComputeNodeKind::Call | ComputeNodeKind::IntrinsicCall => {
                self.has_property("vectorizable")
            }
            _ => false,
        }
    }
}

/// One compute-graph edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeEdge {
    pub id: EdgeId,
    pub kind: ComputeEdgeKind,
    pub source_id: NodeId,
    pub target_id: NodeId,
    /// Variable name or slot tag (`lhs`, `rhs`, `arg0`, `init`, ...)
    pub label: String,
    pub weight: i32,
    pub properties: BTreeMap<String, String>,
}

impl ComputeEdge {
    pub fn new(id: EdgeId, kind: ComputeEdgeKind, source_id: NodeId, target_id: NodeId) -> Self {
        Self {
            id,
            kind,
            source_id,
            target_id,
            label: String::new(),
            weight: 1,
            properties: BTreeMap::new(),
        }
    }

    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            self.kind.as_str().to_string()
        } else {
            format!("{}: {}", self.kind.as_str(), self.label)
        }
    }
}
