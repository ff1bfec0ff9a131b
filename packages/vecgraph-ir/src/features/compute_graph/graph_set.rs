//! The compute-graph set manager: de-duplication, overlap merging, score
//! ordering, and batch export support.

use std::collections::BTreeSet;

use tracing::debug;

use super::graph::{graphs_overlap, ComputeGraph};

/// Merge two graphs into a fresh one: `g1` copied verbatim, then `g2` nodes
/// reusing any node that shares the same AST statement, all fields carried.
pub fn merge_graphs(g1: &ComputeGraph, g2: &ComputeGraph) -> ComputeGraph {
    let mut merged = ComputeGraph::new(format!("{}+{}", g1.name(), g2.name()));
    for (key, value) in g1.properties() {
        merged.set_property(key.clone(), value.clone());
    }
    merged.merge(g1);

    // g2 nodes: reuse by shared AST statement, else copy with all fields.
    let mut id_mapping: std::collections::BTreeMap<u64, u64> = std::collections::BTreeMap::new();
    for node in g2.nodes() {
        let existing = node.ast_stmt.and_then(|s| merged.find_node_by_stmt(s));
        let target = match existing {
            Some(id) => id,
            None => {
                let id = merged.create_node(node.kind);
                if let Some(fresh) = merged.node_mut(id) {
                    *fresh = node.clone();
                    fresh.id = id;
                    fresh.input_nodes.clear();
                    fresh.output_nodes.clear();
                }
                if let Some(stmt) = node.ast_stmt {
                    merged.index_stmt(stmt, id);
                }
                id
            }
        };
        id_mapping.insert(node.id, target);
    }

    for edge in g2.edges() {
        let (Some(&src), Some(&tgt)) = (
            id_mapping.get(&edge.source_id),
            id_mapping.get(&edge.target_id),
        ) else {
            continue;
        };
        if merged.has_edge(src, tgt, edge.kind) {
            continue;
        }
        merged.add_edge(src, tgt, edge.kind, edge.label.clone());
    }

    merged
}

/// Ordered collection of built graphs with set-level maintenance.
#[derive(Debug, Default)]
pub struct ComputeGraphSet {
    graphs: Vec<ComputeGraph>,
}

impl ComputeGraphSet {
    pub fn new() -> Self {
        Self { graphs: Vec::new() }
    }

    pub fn add_graph(&mut self, graph: ComputeGraph) {
        self.graphs.push(graph);
    }

    pub fn remove_graph(&mut self, name: &str) {
        self.graphs.retain(|g| g.name() != name);
    }

    pub fn graph(&self, name: &str) -> Option<&ComputeGraph> {
        self.graphs.iter().find(|g| g.name() == name)
    }

    pub fn graphs(&self) -> &[ComputeGraph] {
        &self.graphs
    }

    pub fn graphs_mut(&mut self) -> &mut Vec<ComputeGraph> {
        &mut self.graphs
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn clear(&mut self) {
        self.graphs.clear();
    }

    /// Two-level first-wins dedup: anchor position, then canonical
    /// signature. Idempotent.
    pub fn deduplicate(&mut self) {
        let mut seen_anchors: BTreeSet<String> = BTreeSet::new();
        let mut seen_signatures: BTreeSet<String> = BTreeSet::new();
        let mut unique = Vec::with_capacity(self.graphs.len());

        for graph in self.graphs.drain(..) {
            let anchor_key = format!(
                "{}:{}",
                graph.property("anchor_func"),
                graph.property("anchor_line")
            );
            if !seen_anchors.insert(anchor_key) {
                continue;
            }
            let signature = graph.canonical_signature();
            if !seen_signatures.insert(signature) {
                continue;
            }
            unique.push(graph);
        }

        self.graphs = unique;
    }

    /// While any two graphs share an AST statement, replace them with their
    /// merge.
    pub fn merge_overlapping(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            'outer: for i in 0..self.graphs.len() {
                for j in (i + 1)..self.graphs.len() {
                    if graphs_overlap(&self.graphs[i], &self.graphs[j]) {
                        debug!(
                            left = self.graphs[i].name(),
                            right = self.graphs[j].name(),
                            "merging overlapping graphs"
                        );
                        let merged = merge_graphs(&self.graphs[i], &self.graphs[j]);
                        self.graphs[i] = merged;
                        self.graphs.remove(j);
                        changed = true;
                        break 'outer;
                    }
                }
            }
        }
    }

    /// Sort by the numeric `score` property, descending.
    pub fn sort_by_score(&mut self) {
        self.graphs.sort_by_key(|g| std::cmp::Reverse(g.score()));
    }

    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(out, "========== ComputeGraphSet ==========");
        let _ = writeln!(out, "Total graphs: {}", self.graphs.len());
        for (idx, graph) in self.graphs.iter().enumerate() {
            let _ = writeln!(out, "[{idx}] {}", graph.summary());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_graph::domain::{ComputeEdgeKind, ComputeNodeKind};
    use crate::frontend::ast::StmtId;
    use crate::shared::models::OpCode;

    fn graph_with_anchor(name: &str, func: &str, line: u32, op: OpCode) -> ComputeGraph {
        let mut g = ComputeGraph::new(name);
        g.set_property("anchor_func", func);
        g.set_property("anchor_line", line.to_string());
        let a = g.create_node(ComputeNodeKind::Variable);
        let b = g.create_node(ComputeNodeKind::BinaryOp);
        g.node_mut(b).unwrap().op_code = op;
        g.add_edge(a, b, ComputeEdgeKind::DataFlow, "x");
        g
    }

    #[test]
    fn test_deduplicate_by_anchor_position() {
        let mut set = ComputeGraphSet::new();
        set.add_graph(graph_with_anchor("g0", "f", 3, OpCode::Add));
        set.add_graph(graph_with_anchor("g1", "f", 3, OpCode::Mul));
        set.deduplicate();
        assert_eq!(set.len(), 1);
        assert_eq!(set.graphs()[0].name(), "g0", "first wins");
    }

    #[test]
    fn test_deduplicate_by_signature() {
        let mut set = ComputeGraphSet::new();
        set.add_graph(graph_with_anchor("g0", "f", 3, OpCode::Add));
        set.add_graph(graph_with_anchor("g1", "g", 9, OpCode::Add));
        set.deduplicate();
        assert_eq!(set.len(), 1, "isomorphic graphs collapse");
    }

    #[test]
    fn test_deduplicate_is_idempotent() {
        let mut set = ComputeGraphSet::new();
        set.add_graph(graph_with_anchor("g0", "f", 3, OpCode::Add));
        set.add_graph(graph_with_anchor("g1", "f", 9, OpCode::Mul));
        set.deduplicate();
        let after_first: Vec<String> =
            set.graphs().iter().map(|g| g.name().to_string()).collect();
        set.deduplicate();
        let after_second: Vec<String> =
            set.graphs().iter().map(|g| g.name().to_string()).collect();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_sort_by_score_descending() {
        let mut set = ComputeGraphSet::new();
        let mut low = graph_with_anchor("low", "f", 1, OpCode::Add);
        low.set_property("score", "60");
        let mut high = graph_with_anchor("high", "f", 2, OpCode::Mul);
        high.set_property("score", "230");
        set.add_graph(low);
        set.add_graph(high);
        set.sort_by_score();
        assert_eq!(set.graphs()[0].name(), "high");
    }

    fn graph_over_stmts(name: &str, stmts: &[u32]) -> ComputeGraph {
        let mut g = ComputeGraph::new(name);
        let mut prev = None;
        for &s in stmts {
            let id = g.create_node(ComputeNodeKind::Variable);
            {
                let node = g.node_mut(id).unwrap();
                node.ast_stmt = Some(StmtId(s));
                node.name = format!("v{s}");
            }
            g.index_stmt(StmtId(s), id);
            if let Some(p) = prev {
                g.add_edge(p, id, ComputeEdgeKind::DataFlow, "v");
            }
            prev = Some(id);
        }
        g
    }

    #[test]
    fn test_merge_overlapping_collapses_shared_stmts() {
        let mut set = ComputeGraphSet::new();
        set.add_graph(graph_over_stmts("a", &[1, 2]));
        set.add_graph(graph_over_stmts("b", &[2, 3]));
        set.add_graph(graph_over_stmts("c", &[10, 11]));
        set.merge_overlapping();
        assert_eq!(set.len(), 2);
        let merged = &set.graphs()[0];
        // The shared statement appears once in the merged graph.
        assert_eq!(merged.node_count(), 3);
    }

    #[test]
    fn test_merge_associativity_up_to_isomorphism() {
        let a = graph_over_stmts("a", &[1, 2]);
        let b = graph_over_stmts("b", &[2, 3]);
        let c = graph_over_stmts("c", &[3, 4]);
        let left = merge_graphs(&merge_graphs(&a, &b), &c);
        let right = merge_graphs(&a, &merge_graphs(&b, &c));
        assert_eq!(left.canonical_signature(), right.canonical_signature());
    }

    #[test]
    fn test_merge_skips_duplicate_edges() {
        let a = graph_over_stmts("a", &[1, 2]);
        let b = graph_over_stmts("b", &[1, 2]);
        let merged = merge_graphs(&a, &b);
        assert_eq!(merged.node_count(), 2);
        assert_eq!(merged.edge_count(), 1);
    }
}
