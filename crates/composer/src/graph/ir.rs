// Tensor dependency graph
//
// Graph view of an ONNX GraphProto using petgraph. Each ONNX node becomes a
// graph node, each tensor flowing from a producer to a consumer becomes an edge.
// Used to analyse merged models (statistics, connectivity, ordering).

use crate::proto::{GraphProto, NodeProto};
use anyhow::{anyhow, Result};
use petgraph::algo::{connected_components, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

/// Node identifier in the graph (petgraph NodeIndex)
pub type NodeId = NodeIndex;

/// A node in the dependency graph
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Original ONNX node name (may be empty)
    pub name: String,
    /// Operation type (e.g., "BertTokenizer", "MatMul")
    pub op_type: String,
    /// Operator domain ("" for default ONNX)
    pub domain: String,
    /// Input tensor names
    pub input_names: Vec<String>,
    /// Output tensor names
    pub output_names: Vec<String>,
}

impl GraphNode {
    /// Create from ONNX NodeProto
    pub fn from_onnx_node(node: &NodeProto) -> Self {
        Self {
            name: node.name.clone(),
            op_type: node.op_type.clone(),
            domain: node.domain.clone(),
            input_names: node.input.clone(),
            output_names: node.output.clone(),
        }
    }
}

/// Tensor carried by an edge
#[derive(Debug, Clone)]
pub struct TensorEdge {
    /// Tensor name
    pub tensor: String,
    /// Which output slot on the producer
    pub output_slot: u8,
    /// Which input slot on the consumer
    pub input_slot: u8,
}

/// Dependency graph over the nodes of one ONNX graph
pub struct TensorGraph {
    graph: DiGraph<GraphNode, TensorEdge>,

    /// Tensor name to producer mapping: name → (node_id, output_slot)
    tensor_producers: FxHashMap<String, (NodeId, u8)>,
}

/// Summary numbers for a graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub connected_components: usize,
}

impl TensorGraph {
    /// Build from an ONNX GraphProto
    ///
    /// Only top-level nodes are represented; subgraph bodies stay inside their
    /// owning node.
    pub fn from_onnx(onnx_graph: &GraphProto) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut tensor_producers = FxHashMap::default();

        for onnx_node in &onnx_graph.node {
            let node = GraphNode::from_onnx_node(onnx_node);
            let node_id = graph.add_node(node);

            for (slot, output) in onnx_node.output.iter().enumerate() {
                if output.is_empty() {
                    continue;
                }
                let slot = u8::try_from(slot)
                    .map_err(|_| anyhow!("Node '{}' has too many outputs", onnx_node.name))?;
                tensor_producers.insert(output.clone(), (node_id, slot));
            }
        }

        // Collect edge information first to avoid borrowing graph twice
        let mut edge_info = Vec::new();
        for node_id in graph.node_indices() {
            let node: &GraphNode = &graph[node_id];
            for (input_slot, input) in node.input_names.iter().enumerate() {
                if input.is_empty() {
                    continue;
                }
                if let Some(&(source, output_slot)) = tensor_producers.get(input) {
                    let input_slot = u8::try_from(input_slot)
                        .map_err(|_| anyhow!("Node '{}' has too many inputs", node.name))?;
                    edge_info.push((
                        source,
                        node_id,
                        TensorEdge {
                            tensor: input.clone(),
                            output_slot,
                            input_slot,
                        },
                    ));
                }
            }
        }

        for (source, target, edge) in edge_info {
            graph.add_edge(source, target, edge);
        }

        Ok(Self {
            graph,
            tensor_producers,
        })
    }

    /// Get node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&GraphNode> {
        self.graph.node_weight(node_id)
    }

    /// Node producing the named tensor, if any
    pub fn producer_of(&self, tensor: &str) -> Option<&GraphNode> {
        self.tensor_producers
            .get(tensor)
            .and_then(|&(id, _)| self.node(id))
    }

    /// Number of weakly connected node groups
    ///
    /// A spliced pipeline yields 1; two models bundled side by side yield 2 or more.
    pub fn connected_components(&self) -> usize {
        connected_components(&self.graph)
    }

    /// Node ids in dependency order
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        toposort(&self.graph, None).map_err(|cycle| {
            let name = self
                .node(cycle.node_id())
                .map(|n| n.name.clone())
                .unwrap_or_default();
            anyhow!("Graph contains a cycle through node '{}'", name)
        })
    }

    /// Graph statistics
    pub fn statistics(&self) -> GraphStatistics {
        GraphStatistics {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            connected_components: self.connected_components(),
        }
    }
}
