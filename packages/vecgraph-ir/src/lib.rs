//! # vecgraph-ir
//!
//! Static analysis of C translation units for auto-vectorization. The crate
//! builds three interconnected program representations:
//!
//! - an **ICFG** spanning all user functions, with call/return and
//!   parameter-passing edges between procedures,
//! - per-function **PDG** information (reaching definitions, post-dominance,
//!   data and control dependencies) with a query layer on top,
//! - **compute graphs**: compact vectorization-oriented IR grown outward
//!   from anchor expressions found inside loops, spanning procedure
//!   boundaries with loop and branch scopes kept as container nodes.
//!
//! The typical flow is [`pipeline::analyze_source`], which parses, builds
//! the [`features::cpg::CpgContext`], discovers anchors, runs the
//! [`features::compute_graph::ComputeGraphBuilder`] per anchor, and
//! maintains the resulting [`features::compute_graph::ComputeGraphSet`].

pub mod errors;
pub mod features;
pub mod frontend;
pub mod pipeline;
pub mod shared;

pub use errors::{Result, VecgraphError};
