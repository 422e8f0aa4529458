//! Structural model checker
//!
//! Validates the invariants an ONNX runtime relies on when loading a model:
//! versioning, opset imports, SSA naming, topological order and typed
//! top-level inputs/outputs. Operator schemas are not checked, so custom
//! domains pass as long as they are imported.

use crate::proto::attribute_proto::AttributeType;
use crate::proto::tensor_proto::DataLocation;
use crate::proto::{GraphProto, ModelProto, NodeProto, TensorProto, ValueInfoProto};
use crate::{ComposerError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Component, Path};

/// Newest IR version this checker understands
pub const MAX_IR_VERSION: i64 = 10;

/// IR version that introduced `opset_import`
const IR_VERSION_OPSET_IMPORT: i64 = 3;

/// IR version from which initializers need not be graph inputs
const IR_VERSION_FREE_INITIALIZERS: i64 = 4;

fn invalid(msg: impl Into<String>) -> ComposerError {
    ComposerError::InvalidModel(msg.into())
}

/// Check a model; the first violation found is returned as an error
pub fn check_model(model: &ModelProto) -> Result<()> {
    if model.ir_version < 1 {
        return Err(invalid("The model does not have an ir_version set properly"));
    }
    if model.ir_version > MAX_IR_VERSION {
        return Err(invalid(format!(
            "Model ir_version {} is higher than the checker's ({})",
            model.ir_version, MAX_IR_VERSION
        )));
    }

    let mut opsets: FxHashMap<&str, i64> = FxHashMap::default();
    for opset in &model.opset_import {
        let domain = if opset.domain == "ai.onnx" {
            ""
        } else {
            opset.domain.as_str()
        };
        if opsets.insert(domain, opset.version).is_some() {
            return Err(invalid(format!(
                "Model has duplicate opset_import for domain '{}'",
                opset.domain
            )));
        }
    }
    if model.ir_version >= IR_VERSION_OPSET_IMPORT && opsets.is_empty() {
        return Err(invalid(
            "Model with IR version >= 3 must specify opset_import for ONNX",
        ));
    }

    check_unique_keys(
        model.metadata_props.iter().map(|e| e.key.as_str()),
        "model metadata_props",
    )?;

    for func in &model.functions {
        if func.name.is_empty() {
            return Err(invalid("Model-local function with empty name"));
        }
    }

    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| invalid("Model has no graph"))?;

    let local_functions: FxHashSet<(&str, &str)> = model
        .functions
        .iter()
        .map(|f| (f.domain.as_str(), f.name.as_str()))
        .collect();

    let ctx = CheckContext {
        ir_version: model.ir_version,
        opsets: &opsets,
        local_functions: &local_functions,
    };
    let outer = FxHashSet::default();
    ctx.check_graph(graph, &outer, true)
}

/// Check that external-data tensors point inside the model directory
pub fn check_external_data(model: &ModelProto) -> Result<()> {
    if let Some(graph) = model.graph.as_ref() {
        check_graph_external_data(graph)?;
    }
    Ok(())
}

fn check_graph_external_data(graph: &GraphProto) -> Result<()> {
    for tensor in &graph.initializer {
        check_tensor_location(tensor)?;
    }
    for sparse in &graph.sparse_initializer {
        for tensor in sparse.values.iter().chain(sparse.indices.iter()) {
            check_tensor_location(tensor)?;
        }
    }
    for node in &graph.node {
        for attr in &node.attribute {
            if let Some(t) = attr.t.as_ref() {
                check_tensor_location(t)?;
            }
            for t in &attr.tensors {
                check_tensor_location(t)?;
            }
            for g in attr.g.iter().chain(attr.graphs.iter()) {
                check_graph_external_data(g)?;
            }
        }
    }
    Ok(())
}

fn check_tensor_location(tensor: &TensorProto) -> Result<()> {
    if tensor.data_location() != DataLocation::External {
        return Ok(());
    }

    let location = tensor
        .external_data
        .iter()
        .find(|e| e.key == "location")
        .map(|e| e.value.as_str())
        .ok_or_else(|| {
            invalid(format!(
                "Tensor '{}' stores data externally but has no 'location'",
                tensor.name
            ))
        })?;

    let path = Path::new(location);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if location.is_empty() || escapes {
        return Err(invalid(format!(
            "External data location '{}' of tensor '{}' must be relative to the model directory",
            location, tensor.name
        )));
    }

    Ok(())
}

fn check_unique_keys<'a>(keys: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = FxHashSet::default();
    for key in keys {
        if !seen.insert(key) {
            return Err(invalid(format!("Duplicate key '{}' in {}", key, what)));
        }
    }
    Ok(())
}

struct CheckContext<'a> {
    ir_version: i64,
    opsets: &'a FxHashMap<&'a str, i64>,
    local_functions: &'a FxHashSet<(&'a str, &'a str)>,
}

impl CheckContext<'_> {
    fn check_graph(
        &self,
        graph: &GraphProto,
        outer: &FxHashSet<String>,
        top_level: bool,
    ) -> Result<()> {
        if graph.name.is_empty() {
            return Err(invalid("Field 'name' of graph is required to be non-empty"));
        }

        // Names visible inside this graph: enclosing scopes plus local definitions
        let mut scope: FxHashSet<String> = outer.clone();
        let define = |name: &str, what: &str, scope: &mut FxHashSet<String>| -> Result<()> {
            if !scope.insert(name.to_string()) {
                return Err(invalid(format!(
                    "Graph '{}' must be in single static assignment (SSA) form, however '{}' has been used as {} multiple times",
                    graph.name, name, what
                )));
            }
            Ok(())
        };

        for input in &graph.input {
            self.check_value_info(input, "input", &graph.name, top_level)?;
            define(&input.name, "graph input name", &mut scope)?;
        }

        for init in &graph.initializer {
            if init.name.is_empty() {
                return Err(invalid(format!(
                    "Graph '{}' has an initializer without a name",
                    graph.name
                )));
            }
            if self.ir_version < IR_VERSION_FREE_INITIALIZERS {
                if !graph.input.iter().any(|i| i.name == init.name) {
                    return Err(invalid(format!(
                        "Initializer '{}' is not a graph input (required before IR version 4)",
                        init.name
                    )));
                }
            } else if !graph.input.iter().any(|i| i.name == init.name) {
                define(&init.name, "initializer name", &mut scope)?;
            }
        }

        for sparse in &graph.sparse_initializer {
            let name = sparse
                .values
                .as_ref()
                .map(|v| v.name.as_str())
                .unwrap_or("");
            if name.is_empty() {
                return Err(invalid(format!(
                    "Graph '{}' has a sparse initializer without a name",
                    graph.name
                )));
            }
            define(name, "initializer name", &mut scope)?;
        }

        for vi in &graph.value_info {
            if vi.name.is_empty() {
                return Err(invalid(format!(
                    "Graph '{}' has a value_info without a name",
                    graph.name
                )));
            }
        }

        for (index, node) in graph.node.iter().enumerate() {
            self.check_node(node, index, graph, &scope)?;
            for output in node.output.iter().filter(|o| !o.is_empty()) {
                define(output, "output names", &mut scope)?;
            }
        }

        for output in &graph.output {
            self.check_value_info(output, "output", &graph.name, top_level)?;
            if !scope.contains(&output.name) {
                return Err(invalid(format!(
                    "Graph output '{}' of graph '{}' is not produced by any node, input or initializer",
                    output.name, graph.name
                )));
            }
        }

        check_unique_keys(
            graph.metadata_props.iter().map(|e| e.key.as_str()),
            "graph metadata_props",
        )?;

        Ok(())
    }

    fn check_value_info(
        &self,
        value: &ValueInfoProto,
        kind: &str,
        graph: &str,
        top_level: bool,
    ) -> Result<()> {
        if value.name.is_empty() {
            return Err(invalid(format!(
                "Graph '{}' has an {} without a name",
                graph, kind
            )));
        }
        if top_level && value.r#type.as_ref().and_then(|t| t.value.as_ref()).is_none() {
            return Err(invalid(format!(
                "Field 'type' of {} '{}' is required but missing",
                kind, value.name
            )));
        }
        Ok(())
    }

    fn check_node(
        &self,
        node: &NodeProto,
        index: usize,
        graph: &GraphProto,
        scope: &FxHashSet<String>,
    ) -> Result<()> {
        let label = if node.name.is_empty() {
            format!("#{} ({})", index, node.op_type)
        } else {
            node.name.clone()
        };

        if node.op_type.is_empty() {
            return Err(invalid(format!("Node {} has an empty op_type", label)));
        }

        let domain = if node.domain == "ai.onnx" {
            ""
        } else {
            node.domain.as_str()
        };
        let is_local_function = self
            .local_functions
            .contains(&(node.domain.as_str(), node.op_type.as_str()));
        if self.ir_version >= IR_VERSION_OPSET_IMPORT
            && !self.opsets.contains_key(domain)
            && !is_local_function
        {
            return Err(invalid(format!(
                "No opset import for domain '{}' used by node {}",
                node.domain, label
            )));
        }

        for input in node.input.iter().filter(|i| !i.is_empty()) {
            if !scope.contains(input) {
                return Err(invalid(format!(
                    "Nodes in graph '{}' must be topologically sorted, however input '{}' of node {} is not output of any previous nodes",
                    graph.name, input, label
                )));
            }
        }

        let mut attr_names = FxHashSet::default();
        for attr in &node.attribute {
            if attr.name.is_empty() {
                return Err(invalid(format!("Node {} has an attribute without a name", label)));
            }
            if !attr_names.insert(attr.name.as_str()) {
                return Err(invalid(format!(
                    "Node {} has duplicate attribute '{}'",
                    label, attr.name
                )));
            }

            match attr.r#type() {
                AttributeType::Graph => {
                    let g = attr.g.as_ref().ok_or_else(|| {
                        invalid(format!(
                            "Attribute '{}' of node {} is GRAPH but has no graph",
                            attr.name, label
                        ))
                    })?;
                    self.check_graph(g, scope, false)?;
                }
                AttributeType::Graphs => {
                    for g in &attr.graphs {
                        self.check_graph(g, scope, false)?;
                    }
                }
                _ => {
                    if let Some(g) = attr.g.as_ref() {
                        self.check_graph(g, scope, false)?;
                    }
                }
            }
        }

        Ok(())
    }
}
