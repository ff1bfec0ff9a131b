//! The compute graph: the vectorization-oriented IR built outward from
//! anchor expressions, its builder, set manager and pattern matcher.

pub mod bf16_demo;
mod builder;
mod domain;
mod graph;
mod graph_set;
mod pattern;

pub use builder::{ComputeGraphBuilder, LoopInfo, TraceLimits};
pub use domain::{
    ComputeEdge, ComputeEdgeKind, ComputeNode, ComputeNodeKind, ConstValue, EdgeId, NodeId,
    INVALID_NODE,
};
pub use graph::{graphs_overlap, ComputeGraph, ComputeGraphDto};
pub use graph_set::{merge_graphs, ComputeGraphSet};
pub use pattern::{
    register_stock_patterns, BindingsMap, PatternMatcher, PatternNode, RewritePattern,
};
