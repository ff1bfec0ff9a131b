pub mod anchor;
pub mod compute_graph;
pub mod cpg;
pub mod viz;
