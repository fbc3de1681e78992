//! Visualization graph projection

mod assembler;
mod edge;
mod node;


pub use assembler::{assemble, GraphAssembler, GraphMetadata, GraphSources, VisualizationGraph};
pub use edge::{EdgeOrigin, GraphEdge};
pub use node::GraphNode;
