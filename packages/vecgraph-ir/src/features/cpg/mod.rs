//! The code property graph: ICFG construction, dataflow fixed points,
//! program dependence info, and the query layer over all of it.

mod context;
mod dataflow;
mod domain;
mod icfg_builder;
mod queries;

pub use context::{CpgContext, CpgStatistics, DefsMap, ReachingDefsInfo};
pub use domain::{
    CallContext, ControlDependency, DataDependency, DepKind, IcfgEdgeKind, IcfgNode, IcfgNodeId,
    IcfgNodeKind, PdgNode,
};
