//! Synthetic ONNX fixtures for the composer integration tests
//!
//! Models are built in memory with [`OnnxGraphBuilder`] and written to
//! temporary directories, so no real model files are needed.

#![allow(dead_code)]

use sentinel_onnx_composer::proto::attribute_proto::AttributeType;
use sentinel_onnx_composer::proto::tensor_proto::DataType;
use sentinel_onnx_composer::proto::{
    AttributeProto, Dim, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    ValueInfoProto,
};
use sentinel_onnx_composer::{PreprocessingGenerator, PreprocessingOptions, Result};
use std::fs;
use std::path::Path;

/// Builder for test graphs
///
/// # Example
///
/// ```ignore
/// let model = OnnxGraphBuilder::new("base")
///     .add_input("x", &[Dim::Fixed(3)], DataType::Float)
///     .add_node("Relu", &["x"], &["y"])
///     .add_output("y", &[Dim::Fixed(3)], DataType::Float)
///     .build_model(8);
/// ```
pub struct OnnxGraphBuilder {
    name: String,
    nodes: Vec<NodeProto>,
    inputs: Vec<ValueInfoProto>,
    outputs: Vec<ValueInfoProto>,
    initializers: Vec<TensorProto>,
    opsets: Vec<OperatorSetIdProto>,
    current_attributes: Vec<AttributeProto>,
    current_domain: String,
}

impl OnnxGraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            initializers: Vec::new(),
            opsets: vec![OperatorSetIdProto {
                domain: String::new(),
                version: 14,
            }],
            current_attributes: Vec::new(),
            current_domain: String::new(),
        }
    }

    /// Add input tensor specification
    pub fn add_input(mut self, name: &str, shape: &[Dim], dtype: DataType) -> Self {
        self.inputs.push(ValueInfoProto::tensor(name, dtype, shape));
        self
    }

    /// Add output tensor specification
    pub fn add_output(mut self, name: &str, shape: &[Dim], dtype: DataType) -> Self {
        self.outputs.push(ValueInfoProto::tensor(name, dtype, shape));
        self
    }

    /// Add a float initializer filled with `value`
    pub fn add_initializer(mut self, name: &str, dims: &[i64], value: f32) -> Self {
        let count: i64 = dims.iter().product();
        self.initializers.push(TensorProto {
            name: name.to_string(),
            dims: dims.to_vec(),
            data_type: DataType::Float as i32,
            float_data: vec![value; count as usize],
            ..Default::default()
        });
        self
    }

    /// Add integer attribute to next node
    pub fn add_int_attribute(mut self, name: &str, value: i64) -> Self {
        self.current_attributes.push(AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Int as i32,
            i: value,
            ..Default::default()
        });
        self
    }

    /// Put the next node in a custom domain
    pub fn in_domain(mut self, domain: &str) -> Self {
        self.current_domain = domain.to_string();
        self
    }

    /// Add operator node
    pub fn add_node(mut self, op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        let node = NodeProto {
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            name: format!("{}_{}_{}", self.name, op_type.to_lowercase(), self.nodes.len()),
            op_type: op_type.to_string(),
            domain: std::mem::take(&mut self.current_domain),
            attribute: std::mem::take(&mut self.current_attributes),
            ..Default::default()
        };
        self.nodes.push(node);
        self
    }

    /// Declare an opset import (replaces an existing entry for the domain)
    pub fn opset(mut self, domain: &str, version: i64) -> Self {
        self.opsets.retain(|o| o.domain != domain);
        self.opsets.push(OperatorSetIdProto {
            domain: domain.to_string(),
            version,
        });
        self
    }

    pub fn build(self) -> GraphProto {
        GraphProto {
            name: self.name,
            node: self.nodes,
            input: self.inputs,
            output: self.outputs,
            initializer: self.initializers,
            ..Default::default()
        }
    }

    pub fn build_model(self, ir_version: i64) -> ModelProto {
        let opset_import = self.opsets.clone();
        ModelProto {
            ir_version,
            opset_import,
            producer_name: "fixture".to_string(),
            graph: Some(self.build()),
            ..Default::default()
        }
    }
}

fn batch_seq() -> [Dim; 2] {
    [Dim::symbolic("batch_size"), Dim::symbolic("sequence_length")]
}

/// MiniLM-shaped base model: ids, mask and type ids in, one embedding out
pub fn minilm_base() -> OnnxGraphBuilder {
    OnnxGraphBuilder::new("minilm")
        .add_input("input_ids", &batch_seq(), DataType::Int64)
        .add_input("attention_mask", &batch_seq(), DataType::Int64)
        .add_input("token_type_ids", &batch_seq(), DataType::Int64)
        .add_initializer("word_embeddings", &[8, 4], 0.1)
        .add_initializer("token_type_embeddings", &[2, 4], 0.2)
        .add_node("Gather", &["word_embeddings", "input_ids"], &["word_emb"])
        .add_node("Gather", &["token_type_embeddings", "token_type_ids"], &["type_emb"])
        .add_node("Add", &["word_emb", "type_emb"], &["hidden"])
        .add_int_attribute("to", DataType::Float as i64)
        .add_node("Cast", &["attention_mask"], &["mask_f"])
        .add_node("Unsqueeze", &["mask_f", "mask_axes"], &["mask_3d"])
        .add_node("Mul", &["hidden", "mask_3d"], &["masked"])
        .add_int_attribute("keepdims", 0)
        .add_node("ReduceMean", &["masked", "pool_axes"], &["sentence_embedding"])
        .add_output(
            "sentence_embedding",
            &[Dim::symbolic("batch_size"), Dim::Fixed(4)],
            DataType::Float,
        )
}

/// Base model with the axes constants the MiniLM fixture references
pub fn minilm_model(ir_version: i64) -> ModelProto {
    with_axes(minilm_base()).build_model(ir_version)
}

pub fn with_axes(builder: OnnxGraphBuilder) -> OnnxGraphBuilder {
    builder
        .add_initializer("mask_axes", &[1], 2.0)
        .add_initializer("pool_axes", &[1], 1.0)
}

/// Tokenizer directory shaped like sentence-transformers/all-MiniLM-L6-v2
pub fn write_tokenizer_dir(dir: &Path, class: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("tokenizer_config.json"),
        format!(
            r#"{{
                "tokenizer_class": "{}",
                "do_lower_case": true,
                "model_max_length": 512,
                "unk_token": "[UNK]",
                "sep_token": "[SEP]",
                "pad_token": "[PAD]",
                "cls_token": "[CLS]",
                "mask_token": "[MASK]"
            }}"#,
            class
        ),
    )
    .unwrap();
    fs::write(
        dir.join("vocab.txt"),
        "[PAD]\n[unused0]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nthe\nquick\nfox\n##es\n",
    )
    .unwrap();
}

/// Generator returning a fixed model (or none)
pub struct StaticGenerator(pub Option<ModelProto>);

impl PreprocessingGenerator for StaticGenerator {
    fn generate(&self, _options: &PreprocessingOptions) -> Result<Option<ModelProto>> {
        Ok(self.0.clone())
    }
}
