//! The compute graph container: node/edge arenas keyed by dense ids,
//! adjacency, indexes, traversal, merge/subgraph operations, and the
//! canonical signature used for isomorphism checks.

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::frontend::ast::StmtId;

use super::domain::{ComputeEdge, ComputeEdgeKind, ComputeNode, ComputeNodeKind, EdgeId, NodeId};

#[derive(Debug, Clone, Default)]
pub struct ComputeGraph {
    name: String,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
    nodes: BTreeMap<NodeId, ComputeNode>,
    edges: BTreeMap<EdgeId, ComputeEdge>,
    stmt_to_node: FxHashMap<StmtId, NodeId>,
    in_edges: FxHashMap<NodeId, Vec<EdgeId>>,
    out_edges: FxHashMap<NodeId, Vec<EdgeId>>,
    properties: BTreeMap<String, String>,
}

impl ComputeGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_node_id: 1, // 0 is the invalid id
            next_edge_id: 0,
            ..Default::default()
        }
    }

    // ------------------------------------------------------------
    // Node operations
    // ------------------------------------------------------------

    pub fn create_node(&mut self, kind: ComputeNodeKind) -> NodeId {
        if self.next_node_id == 0 {
            self.next_node_id = 1;
        }
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.nodes.insert(id, ComputeNode::new(kind, id));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&ComputeNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ComputeNode> {
        self.nodes.get_mut(&id)
    }

    /// Register the statement index for a node (set together with `ast_stmt`).
    pub fn index_stmt(&mut self, stmt: StmtId, id: NodeId) {
        self.stmt_to_node.insert(stmt, id);
    }

    pub fn find_node_by_stmt(&self, stmt: StmtId) -> Option<NodeId> {
        self.stmt_to_node.get(&stmt).copied()
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.name == name)
            .map(|n| n.id)
    }

    pub fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let stmt = node.ast_stmt;

        let doomed: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.source_id == id || e.target_id == id)
            .map(|e| e.id)
            .collect();
        for edge in doomed {
            self.remove_edge(edge);
        }

        if let Some(stmt) = stmt {
            self.stmt_to_node.remove(&stmt);
        }
        self.nodes.remove(&id);
    }

    // ------------------------------------------------------------
    // Edge operations
    // ------------------------------------------------------------

    pub fn add_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        kind: ComputeEdgeKind,
        label: impl Into<String>,
    ) -> EdgeId {
        let id = self.next_edge_id;
        self.next_edge_id += 1;

        let mut edge = ComputeEdge::new(id, kind, source, target);
        edge.label = label.into();
        self.edges.insert(id, edge);

        self.out_edges.entry(source).or_default().push(id);
        self.in_edges.entry(target).or_default().push(id);
        if let Some(node) = self.nodes.get_mut(&source) {
            node.output_nodes.push(target);
        }
        if let Some(node) = self.nodes.get_mut(&target) {
            node.input_nodes.push(source);
        }
        id
    }

    pub fn edge(&self, id: EdgeId) -> Option<&ComputeEdge> {
        self.edges.get(&id)
    }

    pub fn remove_edge(&mut self, id: EdgeId) {
        let Some(edge) = self.edges.remove(&id) else {
            return;
        };
        if let Some(out) = self.out_edges.get_mut(&edge.source_id) {
            out.retain(|&e| e != id);
        }
        if let Some(inc) = self.in_edges.get_mut(&edge.target_id) {
            inc.retain(|&e| e != id);
        }
        if let Some(node) = self.nodes.get_mut(&edge.source_id) {
            if let Some(pos) = node.output_nodes.iter().position(|&n| n == edge.target_id) {
                node.output_nodes.remove(pos);
            }
        }
        if let Some(node) = self.nodes.get_mut(&edge.target_id) {
            if let Some(pos) = node.input_nodes.iter().position(|&n| n == edge.source_id) {
                node.input_nodes.remove(pos);
            }
        }
    }

    pub fn incoming_edges(&self, id: NodeId) -> Vec<&ComputeEdge> {
        self.in_edges
            .get(&id)
            .map(|ids| ids.iter().filter_map(|e| self.edges.get(e)).collect())
            .unwrap_or_default()
    }

    pub fn outgoing_edges(&self, id: NodeId) -> Vec<&ComputeEdge> {
        self.out_edges
            .get(&id)
            .map(|ids| ids.iter().filter_map(|e| self.edges.get(e)).collect())
            .unwrap_or_default()
    }

    pub fn has_edge(&self, source: NodeId, target: NodeId, kind: ComputeEdgeKind) -> bool {
        self.outgoing_edges(source)
            .iter()
            .any(|e| e.target_id == target && e.kind == kind)
    }

    // ------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------

    pub fn nodes(&self) -> impl Iterator<Item = &ComputeNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &ComputeEdge> {
        self.edges.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes with no inputs
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.input_nodes.is_empty())
            .map(|n| n.id)
            .collect()
    }

    /// Nodes with no outputs
    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.output_nodes.is_empty())
            .map(|n| n.id)
            .collect()
    }

    /// Kahn topological order over the input/output mirrors. Nodes trapped
    /// in cycles (LoopCarried back-edges) are appended afterwards in id
    /// order, so the result is always a permutation of the node set.
    pub fn topological_sort(&self) -> Vec<NodeId> {
        let mut in_degree: BTreeMap<NodeId, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            in_degree.insert(node.id, node.input_nodes.len());
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(node) = self.nodes.get(&id) {
                for &out in &node.output_nodes {
                    if let Some(deg) = in_degree.get_mut(&out) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            queue.push_back(out);
                            // Guard against re-enqueueing through parallel edges
                            *deg = usize::MAX;
                        }
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            for &id in self.nodes.keys() {
                if !order.contains(&id) {
                    order.push(id);
                }
            }
        }
        order
    }

    // ------------------------------------------------------------
    // Graph-level properties
    // ------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
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

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Numeric score assigned by the anchor finder
    pub fn score(&self) -> i64 {
        self.property("score").parse().unwrap_or(0)
    }

    // ------------------------------------------------------------
    // Whole-graph operations
    // ------------------------------------------------------------

    /// Copy every node of `other` into `self` with fresh ids, all fields
    /// carried over, then remap and copy the edges.
    pub fn merge(&mut self, other: &ComputeGraph) {
        let mut id_mapping: BTreeMap<NodeId, NodeId> = BTreeMap::new();

        for node in other.nodes.values() {
            let new_id = self.create_node(node.kind);
            if let Some(fresh) = self.nodes.get_mut(&new_id) {
                *fresh = node.clone();
                fresh.id = new_id;
                fresh.input_nodes.clear();
                fresh.output_nodes.clear();
            }
            if let Some(stmt) = node.ast_stmt {
                self.stmt_to_node.entry(stmt).or_insert(new_id);
            }
            id_mapping.insert(node.id, new_id);
        }

        for edge in other.edges.values() {
            let (Some(&src), Some(&tgt)) = (
                id_mapping.get(&edge.source_id),
                id_mapping.get(&edge.target_id),
            ) else {
                continue;
            };
            let new_edge = self.add_edge(src, tgt, edge.kind, edge.label.clone());
            if let Some(e) = self.edges.get_mut(&new_edge) {
                e.weight = edge.weight;
                e.properties = edge.properties.clone();
            }
        }
    }

    /// Extract the induced subgraph over `node_ids`, carrying every node
    /// field and all edges with both ends inside the set.
    pub fn extract_subgraph(&self, node_ids: &std::collections::BTreeSet<NodeId>) -> ComputeGraph {
        let mut sub = ComputeGraph::new(format!("{}_sub", self.name));
        let mut id_mapping: BTreeMap<NodeId, NodeId> = BTreeMap::new();

        for &id in node_ids {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let new_id = sub.create_node(node.kind);
            if let Some(fresh) = sub.nodes.get_mut(&new_id) {
                *fresh = node.clone();
                fresh.id = new_id;
                fresh.input_nodes.clear();
                fresh.output_nodes.clear();
            }
            if let Some(stmt) = node.ast_stmt {
                sub.stmt_to_node.insert(stmt, new_id);
            }
            id_mapping.insert(id, new_id);
        }

        for edge in self.edges.values() {
            let (Some(&src), Some(&tgt)) = (
                id_mapping.get(&edge.source_id),
                id_mapping.get(&edge.target_id),
            ) else {
                continue;
            };
            let new_edge = sub.add_edge(src, tgt, edge.kind, edge.label.clone());
            if let Some(e) = sub.edges.get_mut(&new_edge) {
                e.properties = edge.properties.clone();
            }
        }

        sub
    }

    pub fn clone_graph(&self) -> ComputeGraph {
        let all: std::collections::BTreeSet<NodeId> = self.nodes.keys().copied().collect();
        let mut cloned = self.extract_subgraph(&all);
        cloned.name = format!("{}_clone", self.name);
        cloned.properties = self.properties.clone();
        cloned
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.stmt_to_node.clear();
        self.in_edges.clear();
        self.out_edges.clear();
        self.next_node_id = 1;
        self.next_edge_id = 0;
    }

    // ------------------------------------------------------------
    // Canonicalization
    // ------------------------------------------------------------

    /// Topological `(kind, opcode)` sequence, then the edge list: the
    /// signature two isomorphic builds share.
    pub fn canonical_signature(&self) -> String {
        let mut signature = String::new();
        for id in self.topological_sort() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            signature.push_str(&node.kind.tag().to_string());
            if node.op_code != crate::shared::models::OpCode::Unknown {
                signature.push(':');
                signature.push_str(node.op_code.as_str());
            }
            signature.push(';');
        }
        signature.push('|');
        for edge in self.edges.values() {
            signature.push_str(&format!(
                "{}->{}:{};",
                edge.source_id,
                edge.target_id,
                edge.kind.tag()
            ));
        }
        signature
    }

    pub fn is_isomorphic_to(&self, other: &ComputeGraph) -> bool {
        self.canonical_signature() == other.canonical_signature()
    }

    // ------------------------------------------------------------
    // Dumps
    // ------------------------------------------------------------

    /// One-line summary plus a node-kind histogram.
    pub fn summary(&self) -> String {
        let mut kind_count: BTreeMap<&'static str, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            *kind_count.entry(node.kind.as_str()).or_default() += 1;
        }
        let kinds: Vec<String> = kind_count
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect();
        format!(
            "Graph '{}': {} nodes, {} edges [{}]",
            self.name,
            self.nodes.len(),
            self.edges.len(),
            kinds.join(" ")
        )
    }

    /// Full node and edge dump for verbose output.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(out, "========== ComputeGraph: {} ==========", self.name);
        let _ = writeln!(
            out,
            "Nodes: {}, Edges: {}",
            self.nodes.len(),
            self.edges.len()
        );
        for node in self.nodes.values() {
            let _ = writeln!(
                out,
                "[Node {}] {} type={} L{}",
                node.id,
                node.label(),
                node.data_type,
                node.source_line
            );
            if !node.source_text.is_empty() {
                let _ = writeln!(out, "  code: {}", node.source_text);
            }
        }
        for edge in self.edges.values() {
            let _ = writeln!(
                out,
                "[Edge {}] n{} -> n{} ({})",
                edge.id,
                edge.source_id,
                edge.target_id,
                edge.display_label()
            );
        }
        out
    }
}

/// Serializable DTO mirror of `ComputeGraph`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeGraphDto {
    pub name: String,
    pub nodes: Vec<ComputeNode>,
    pub edges: Vec<ComputeEdge>,
    pub properties: BTreeMap<String, String>,
}

impl Serialize for ComputeGraph {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let dto = ComputeGraphDto {
            name: self.name.clone(),
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
            properties: self.properties.clone(),
        };
        dto.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ComputeGraph {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let dto = ComputeGraphDto::deserialize(deserializer)?;
        let mut graph = ComputeGraph::new(dto.name);
        graph.properties = dto.properties;
        for node in dto.nodes {
            let id = node.id;
            let mut node = node;
            node.input_nodes.clear();
            node.output_nodes.clear();
            if let Some(stmt) = node.ast_stmt {
                graph.stmt_to_node.insert(stmt, id);
            }
            graph.nodes.insert(id, node);
            graph.next_node_id = graph.next_node_id.max(id + 1);
        }
        for edge in dto.edges {
            graph.add_edge(edge.source_id, edge.target_id, edge.kind, edge.label);
        }
        Ok(graph)
    }
}

/// Overlap test used by the set manager: two graphs overlap when they share
/// an AST statement.
pub fn graphs_overlap(a: &ComputeGraph, b: &ComputeGraph) -> bool {
    let stmts: std::collections::BTreeSet<StmtId> =
        a.nodes().filter_map(|n| n.ast_stmt).collect();
    if stmts.is_empty() {
        return false;
    }
    b.nodes()
        .filter_map(|n| n.ast_stmt)
        .any(|s| stmts.contains(&s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::OpCode;

    fn diamond() -> ComputeGraph {
        // a -> mul, b -> mul, mul -> acc
        let mut g = ComputeGraph::new("diamond");
        let a = g.create_node(ComputeNodeKind::ArrayAccess);
        let b = g.create_node(ComputeNodeKind::ArrayAccess);
        let mul = g.create_node(ComputeNodeKind::BinaryOp);
        g.node_mut(mul).unwrap().op_code = OpCode::Mul;
        let acc = g.create_node(ComputeNodeKind::BinaryOp);
        g.node_mut(acc).unwrap().op_code = OpCode::Add;
        g.add_edge(a, mul, ComputeEdgeKind::DataFlow, "lhs");
        g.add_edge(b, mul, ComputeEdgeKind::DataFlow, "rhs");
        g.add_edge(mul, acc, ComputeEdgeKind::DataFlow, "rhs");
        g
    }

    #[test]
    fn test_node_ids_start_at_one() {
        let mut g = ComputeGraph::new("ids");
        let first = g.create_node(ComputeNodeKind::Variable);
        assert_eq!(first, 1);
        let second = g.create_node(ComputeNodeKind::Variable);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_adjacency_mirrors() {
        let g = diamond();
        let mul = 3;
        let node = g.node(mul).unwrap();
        assert_eq!(node.input_nodes.len(), 2);
        assert_eq!(node.output_nodes.len(), 1);
        assert_eq!(g.incoming_edges(mul).len(), 2);
        assert_eq!(g.outgoing_edges(mul).len(), 1);
    }

    #[test]
    fn test_topological_sort_is_permutation() {
        let g = diamond();
        let order = g.topological_sort();
        assert_eq!(order.len(), g.node_count());
        // Every edge's source precedes its target.
        let pos: BTreeMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        for edge in g.edges() {
            assert!(pos[&edge.source_id] < pos[&edge.target_id]);
        }
    }

    #[test]
    fn test_topological_sort_survives_cycles() {
        let mut g = diamond();
        // LoopCarried back-edge closing a cycle
        g.add_edge(4, 3, ComputeEdgeKind::LoopCarried, "sum (next iter)");
        let order = g.topological_sort();
        assert_eq!(order.len(), g.node_count());
    }

    #[test]
    fn test_remove_edge_updates_mirrors() {
        let mut g = diamond();
        let edge = g
            .outgoing_edges(1)
            .first()
            .map(|e| e.id)
            .expect("edge from node 1");
        g.remove_edge(edge);
        assert!(g.node(1).unwrap().output_nodes.is_empty());
        assert_eq!(g.node(3).unwrap().input_nodes.len(), 1);
    }

    #[test]
    fn test_roots_and_leaves() {
        let g = diamond();
        let roots = g.root_nodes();
        assert_eq!(roots, vec![1, 2]);
        assert_eq!(g.leaf_nodes(), vec![4]);
    }

    #[test]
    fn test_canonical_signature_stable() {
        let a = diamond();
        let b = diamond();
        assert_eq!(a.canonical_signature(), b.canonical_signature());
        assert!(a.is_isomorphic_to(&b));
    }

    #[test]
    fn test_signature_distinguishes_opcode() {
        let a = diamond();
        let mut b = diamond();
        b.node_mut(3).unwrap().op_code = OpCode::Div;
        assert!(!a.is_isomorphic_to(&b));
    }

    #[test]
    fn test_merge_carries_all_fields() {
        let mut a = ComputeGraph::new("a");
        let n = a.create_node(ComputeNodeKind::Variable);
        {
            let node = a.node_mut(n).unwrap();
            node.name = "sum".to_string();
            node.loop_context_id = 7;
            node.loop_context_var = "i".to_string();
            node.branch_type = "THEN".to_string();
            node.set_property("is_anchor", "true");
        }

        let mut b = ComputeGraph::new("b");
        b.merge(&a);
        let merged = b.nodes().next().unwrap();
        assert_eq!(merged.name, "sum");
        assert_eq!(merged.loop_context_id, 7);
        assert_eq!(merged.loop_context_var, "i");
        assert_eq!(merged.branch_type, "THEN");
        assert!(merged.property_is("is_anchor", "true"));
    }

    #[test]
    fn test_extract_subgraph_keeps_internal_edges() {
        let g = diamond();
        let ids: std::collections::BTreeSet<NodeId> = [1, 3, 4].into_iter().collect();
        let sub = g.extract_subgraph(&ids);
        assert_eq!(sub.node_count(), 3);
        // a->mul and mul->acc survive, b->mul is dropped.
        assert_eq!(sub.edge_count(), 2);
    }

    #[test]
    fn test_serde_round_trip_preserves_signature() {
        let g = diamond();
        let json = serde_json::to_string(&g).unwrap();
        let back: ComputeGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(g.canonical_signature(), back.canonical_signature());
    }
}
