// Graph module for the composer
//
// Dependency-graph view of ONNX graphs, used to analyse the merged model
// before it is written (node/edge counts, connectivity, ordering).

pub mod ir;

// Re-exports for convenience
pub use ir::{GraphNode, GraphStatistics, NodeId, TensorEdge, TensorGraph};
