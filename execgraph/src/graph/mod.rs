//! Execution graph reconstruction for visualisation.
//!
//! Records are flat rows linked by `parent_id` / `previous_id`; the builder
//! turns them into vertices plus an adjacency map distinguishing structural
//! containment from temporal sequence.

mod builder;
mod cache;
mod model;

pub use builder::{
    build_graph, build_graph_with_config, extend_graph, extend_graph_with_config, GraphBuilder,
};
pub use cache::{record_set_version, GraphCache};
pub use model::{EdgeSet, Graph, VertexView};
