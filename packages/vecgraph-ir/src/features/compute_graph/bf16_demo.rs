//! Manually constructed BF16 dot-product graph (`--bf16-demo`).
//!
//! Models the loop body of
//! `for (i = 0; i < n; ++i) sumf += to_fp32(x[i]) * to_fp32(y[i]);`
//! including the loop-carried accumulator cycle. This is the only producer
//! of `LoopInduction` nodes.

use crate::shared::models::{BaseType, DataTypeInfo, OpCode};

use super::domain::{ComputeEdgeKind, ComputeNodeKind};
use super::graph::ComputeGraph;

pub fn build_bf16_dot_product_demo() -> ComputeGraph {
    let mut graph = ComputeGraph::new("bf16_dot_product_loop_body");
    graph.set_property("anchor_func", "bf16_dot_product");
    graph.set_property("anchor_line", "0");
    graph.set_property("loop_depth", "1");
    graph.set_property("score", "310");

    let induction = graph.create_node(ComputeNodeKind::LoopInduction);
    {
        let node = graph.node_mut(induction).unwrap();
        node.name = "i".to_string();
        node.loop_depth = 1;
        node.set_property("init", "0");
        node.set_property("step", "1");
        node.set_property("bound", "n");
    }

    let x_i = graph.create_node(ComputeNodeKind::ArrayAccess);
    {
        let node = graph.node_mut(x_i).unwrap();
        node.name = "x[i]".to_string();
        node.loop_depth = 1;
        node.data_type = DataTypeInfo::scalar(BaseType::Int16, 16, true);
        node.set_property("array_name", "x");
        node.set_property("element_type", "bf16");
    }

    let y_i = graph.create_node(ComputeNodeKind::ArrayAccess);
    {
        let node = graph.node_mut(y_i).unwrap();
        node.name = "y[i]".to_string();
        node.loop_depth = 1;
        node.data_type = DataTypeInfo::scalar(BaseType::Int16, 16, true);
        node.set_property("array_name", "y");
    }

    let conv_x = graph.create_node(ComputeNodeKind::Call);
    {
        let node = graph.node_mut(conv_x).unwrap();
        node.name = "bf16_to_fp32_x".to_string();
        node.loop_depth = 1;
        node.data_type = DataTypeInfo::scalar(BaseType::Float, 32, true);
        node.set_property("callee", "bf16_to_fp32");
        node.set_property("is_type_conversion", "true");
    }

    let conv_y = graph.create_node(ComputeNodeKind::Call);
    {
        let node = graph.node_mut(conv_y).unwrap();
        node.name = "bf16_to_fp32_y".to_string();
        node.loop_depth = 1;
        node.data_type = DataTypeInfo::scalar(BaseType::Float, 32, true);
        node.set_property("callee", "bf16_to_fp32");
    }

    let mul = graph.create_node(ComputeNodeKind::BinaryOp);
    {
        let node = graph.node_mut(mul).unwrap();
        node.name = "multiply".to_string();
        node.op_code = OpCode::Mul;
        node.loop_depth = 1;
        node.data_type = DataTypeInfo::scalar(BaseType::Float, 32, true);
    }

    let sumf_in = graph.create_node(ComputeNodeKind::Variable);
    {
        let node = graph.node_mut(sumf_in).unwrap();
        node.name = "sumf_in".to_string();
        node.loop_depth = 1;
        node.data_type = DataTypeInfo::scalar(BaseType::Double, 64, true);
        node.set_property("is_accumulator", "true");
        node.set_property("loop_carried", "true");
    }

    let acc = graph.create_node(ComputeNodeKind::BinaryOp);
    {
        let node = graph.node_mut(acc).unwrap();
        node.name = "accumulate".to_string();
        node.op_code = OpCode::Add;
        node.loop_depth = 1;
        node.data_type = DataTypeInfo::scalar(BaseType::Double, 64, true);
        node.set_property("is_reduction", "true");
        node.set_property("reduction_op", "sum");
    }

    let store = graph.create_node(ComputeNodeKind::Store);
    {
        let node = graph.node_mut(store).unwrap();
        node.name = "store_sumf".to_string();
        node.loop_depth = 1;
    }

    graph.add_edge(induction, x_i, ComputeEdgeKind::DataFlow, "i");
    graph.add_edge(induction, y_i, ComputeEdgeKind::DataFlow, "i");
    graph.add_edge(x_i, conv_x, ComputeEdgeKind::DataFlow, "x[i]");
    graph.add_edge(y_i, conv_y, ComputeEdgeKind::DataFlow, "y[i]");
    graph.add_edge(conv_x, mul, ComputeEdgeKind::DataFlow, "fp32_x");
    graph.add_edge(conv_y, mul, ComputeEdgeKind::DataFlow, "fp32_y");
    graph.add_edge(mul, acc, ComputeEdgeKind::DataFlow, "product");
    graph.add_edge(sumf_in, acc, ComputeEdgeKind::LoopCarried, "sumf");
    graph.add_edge(acc, store, ComputeEdgeKind::DataFlow, "sumf_new");
    graph.add_edge(store, sumf_in, ComputeEdgeKind::LoopCarried, "sumf");

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_graph_shape() {
        let graph = build_bf16_dot_product_demo();
        assert_eq!(graph.node_count(), 9);
        assert_eq!(graph.edge_count(), 10);
        assert_eq!(
            graph
                .nodes()
                .filter(|n| n.kind == ComputeNodeKind::LoopInduction)
                .count(),
            1
        );
        assert_eq!(
            graph
                .edges()
                .filter(|e| e.kind == ComputeEdgeKind::LoopCarried)
                .count(),
            2
        );
    }

    #[test]
    fn test_demo_topological_sort_covers_cycle() {
        let graph = build_bf16_dot_product_demo();
        // The accumulator cycle cannot be topologically ordered, but the
        // sort must still return every node.
        assert_eq!(graph.topological_sort().len(), graph.node_count());
    }

    #[test]
    fn test_demo_is_deterministic() {
        let a = build_bf16_dot_product_demo();
        let b = build_bf16_dot_product_demo();
        assert_eq!(a.canonical_signature(), b.canonical_signature());
    }
}
