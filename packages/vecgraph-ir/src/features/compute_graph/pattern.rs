//! Rewrite-pattern registry and subgraph matcher.
//!
//! A match binds each pattern node's capture id to a live node id such that
//! kinds and opcodes agree and all bindings are simultaneously consistent.

use std::collections::BTreeMap;

use crate::shared::models::OpCode;

use super::domain::{ComputeNodeKind, NodeId};
use super::graph::ComputeGraph;

/// One node of a pattern. `Unknown` kind/opcode act as wildcards.
#[derive(Debug, Clone)]
pub struct PatternNode {
    pub kind: ComputeNodeKind,
    pub op_code: OpCode,
    pub constraint: String,
    /// Capture id referenced by the rewrite, -1 = no capture
    pub capture_id: i32,
    pub input_pattern_ids: Vec<i32>,
}

impl PatternNode {
    pub fn new(kind: ComputeNodeKind, op_code: OpCode, capture_id: i32) -> Self {
        Self {
            kind,
            op_code,
            constraint: String::new(),
            capture_id,
            input_pattern_ids: Vec::new(),
        }
    }
}

/// Bindings of capture ids to node ids
pub type BindingsMap = BTreeMap<i32, NodeId>;

/// A named source pattern with its replacement skeleton
#[derive(Debug, Clone)]
pub struct RewritePattern {
    pub name: String,
    pub pattern: Vec<PatternNode>,
    pub replacement: Vec<PatternNode>,
}

#[derive(Debug, Default)]
pub struct PatternMatcher {
    patterns: BTreeMap<String, RewritePattern>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pattern(&mut self, pattern: RewritePattern) {
        self.patterns.insert(pattern.name.clone(), pattern);
    }

    pub fn registered_patterns(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    /// Back-tracking search from the first pattern node against every graph
    /// node; returns one bindings map per match.
    pub fn find_matches(&self, graph: &ComputeGraph, pattern_name: &str) -> Vec<BindingsMap> {
        let mut all_matches = Vec::new();
        let Some(rewrite) = self.patterns.get(pattern_name) else {
            return all_matches;
        };
        let Some(first) = rewrite.pattern.first() else {
            return all_matches;
        };

        for node in graph.nodes() {
            let mut bindings = BindingsMap::new();
            if !Self::match_node(graph, node.id, first, &mut bindings) {
                continue;
            }

            let mut full_match = true;
            for pattern_node in rewrite.pattern.iter().skip(1) {
                let matched = if let Some(&bound) = bindings.get(&pattern_node.capture_id) {
                    graph
                        .node(bound)
                        .map(|n| n.kind == pattern_node.kind)
                        .unwrap_or(false)
                } else {
                    graph
                        .nodes()
                        .any(|candidate| {
                            Self::match_node(graph, candidate.id, pattern_node, &mut bindings)
                        })
                };
                if !matched {
                    full_match = false;
                    break;
                }
            }

            if full_match {
                all_matches.push(bindings);
            }
        }

        all_matches
    }

    fn match_node(
        graph: &ComputeGraph,
        node_id: NodeId,
        pattern_node: &PatternNode,
        bindings: &mut BindingsMap,
    ) -> bool {
        let Some(node) = graph.node(node_id) else {
            return false;
        };
        if pattern_node.kind != ComputeNodeKind::Unknown && node.kind != pattern_node.kind {
            return false;
        }
        if pattern_node.op_code != OpCode::Unknown && node.op_code != pattern_node.op_code {
            return false;
        }
        if pattern_node.capture_id >= 0 {
            if let Some(&bound) = bindings.get(&pattern_node.capture_id) {
                return bound == node_id;
            }
            bindings.insert(pattern_node.capture_id, node_id);
        }
        true
    }

    /// Apply a rewrite for a previous match. The current rules only clone
    /// the graph; actual node substitution is up to the downstream
    /// vectorizer consuming the replacement skeleton.
    pub fn apply_rewrite(
        &self,
        graph: &ComputeGraph,
        pattern_name: &str,
        _bindings: &BindingsMap,
    ) -> Option<ComputeGraph> {
        self.patterns.get(pattern_name)?;
        let mut result = graph.clone_graph();
        result.set_name(format!("{}_rewritten", graph.name()));
        Some(result)
    }
}

/// The stock vectorization probe patterns exercised by `--test-patterns`.
pub fn register_stock_patterns(matcher: &mut PatternMatcher) {
    matcher.register_pattern(RewritePattern {
        name: "scalar_add".to_string(),
        pattern: vec![PatternNode::new(
            ComputeNodeKind::BinaryOp,
            OpCode::Add,
            0,
        )],
        replacement: Vec::new(),
    });
    matcher.register_pattern(RewritePattern {
        name: "scalar_mul".to_string(),
        pattern: vec![PatternNode::new(
            ComputeNodeKind::BinaryOp,
            OpCode::Mul,
            0,
        )],
        replacement: Vec::new(),
    });
    matcher.register_pattern(RewritePattern {
        name: "array_access".to_string(),
        pattern: vec![PatternNode::new(
            ComputeNodeKind::ArrayAccess,
            OpCode::Unknown,
            0,
        )],
        replacement: Vec::new(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_graph::domain::ComputeEdgeKind;

    fn mul_add_graph() -> ComputeGraph {
        let mut g = ComputeGraph::new("mul_add");
        let a = g.create_node(ComputeNodeKind::ArrayAccess);
        let b = g.create_node(ComputeNodeKind::ArrayAccess);
        let mul = g.create_node(ComputeNodeKind::BinaryOp);
        g.node_mut(mul).unwrap().op_code = OpCode::Mul;
        let add = g.create_node(ComputeNodeKind::BinaryOp);
        g.node_mut(add).unwrap().op_code = OpCode::Add;
        g.add_edge(a, mul, ComputeEdgeKind::DataFlow, "lhs");
        g.add_edge(b, mul, ComputeEdgeKind::DataFlow, "rhs");
        g.add_edge(mul, add, ComputeEdgeKind::DataFlow, "rhs");
        g
    }

    #[test]
    fn test_find_scalar_mul() {
        let mut matcher = PatternMatcher::new();
        register_stock_patterns(&mut matcher);
        let graph = mul_add_graph();
        let matches = matcher.find_matches(&graph, "scalar_mul");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].get(&0), Some(&3));
    }

    #[test]
    fn test_find_array_accesses() {
        let mut matcher = PatternMatcher::new();
        register_stock_patterns(&mut matcher);
        let graph = mul_add_graph();
        let matches = matcher.find_matches(&graph, "array_access");
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_unknown_pattern_matches_nothing() {
        let matcher = PatternMatcher::new();
        let graph = mul_add_graph();
        assert!(matcher.find_matches(&graph, "missing").is_empty());
    }

    #[test]
    fn test_registered_pattern_names() {
        let mut matcher = PatternMatcher::new();
        register_stock_patterns(&mut matcher);
        assert_eq!(
            matcher.registered_patterns(),
            vec!["array_access", "scalar_add", "scalar_mul"]
        );
    }

    #[test]
    fn test_apply_rewrite_returns_clone() {
        let mut matcher = PatternMatcher::new();
        register_stock_patterns(&mut matcher);
        let graph = mul_add_graph();
        let matches = matcher.find_matches(&graph, "scalar_mul");
        let rewritten = matcher
            .apply_rewrite(&graph, "scalar_mul", &matches[0])
            .unwrap();
        assert_eq!(rewritten.node_count(), graph.node_count());
        assert!(rewritten.name().ends_with("_rewritten"));
    }
}
