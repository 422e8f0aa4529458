// WordPiece preprocessing graph
//
// Emits a single BertTokenizer node from the onnxruntime-extensions custom op
// library. The vocabulary and the tokenization options travel as node
// attributes so the resulting model is self-contained.
//
// The op takes a 1-D string tensor and emits 1-D int64 tensors holding the
// encoded sequence; it never pads, so only longest-sequence padding can be
// expressed.

use super::source::TokenizerFiles;
use super::{Padding, PreprocessingOptions};
use crate::proto::tensor_proto::DataType;
use crate::proto::{
    AttributeProto, Dim, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, ValueInfoProto,
};
use crate::{ComposerError, Result};

/// Custom operator domain of onnxruntime-extensions
pub const CONTRIB_DOMAIN: &str = "ai.onnx.contrib";

/// Opset version of [`CONTRIB_DOMAIN`]
pub const CONTRIB_OPSET_VERSION: i64 = 1;

/// IR version stamped on generated preprocessing models
pub const PREPROCESSING_IR_VERSION: i64 = 8;

const TEXT_INPUT: &str = "text";
const BATCH_DIM: &str = "batch_size";
const SEQUENCE_DIM: &str = "sequence_length";

/// Tokenizer families that have a graph form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    Bert,
    DistilBert,
}

impl TokenizerKind {
    /// Map a HuggingFace tokenizer class name
    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "BertTokenizer" | "BertTokenizerFast" => Some(TokenizerKind::Bert),
            "DistilBertTokenizer" | "DistilBertTokenizerFast" => Some(TokenizerKind::DistilBert),
            _ => None,
        }
    }

    /// Output tensor names in declaration order
    pub fn output_names(self) -> &'static [&'static str] {
        match self {
            TokenizerKind::Bert => &["input_ids", "token_type_ids", "attention_mask"],
            TokenizerKind::DistilBert => &["input_ids", "attention_mask"],
        }
    }

    fn graph_name(self) -> &'static str {
        match self {
            TokenizerKind::Bert => "BertTokenizer_preprocessing",
            TokenizerKind::DistilBert => "DistilBertTokenizer_preprocessing",
        }
    }
}

/// Build the preprocessing model
pub fn build_model(
    kind: TokenizerKind,
    files: &TokenizerFiles,
    options: &PreprocessingOptions,
) -> Result<ModelProto> {
    let special = files.special_tokens();
    for token in [&special.unk, &special.sep, &special.cls, &special.pad] {
        if !files.contains(token) {
            return Err(ComposerError::InvalidTokenizer(format!(
                "special token '{}' is not in the vocabulary",
                token
            )));
        }
    }

    let max_length = i64::try_from(options.max_length).map_err(|_| {
        ComposerError::InvalidTokenizer(format!("max_length {} is too large", options.max_length))
    })?;

    if options.padding != Padding::Longest {
        return Err(ComposerError::UnsupportedTokenizer(format!(
            "{:?} padding cannot be expressed by the BertTokenizer op",
            options.padding
        )));
    }

    let config = &files.config;
    let strip_accents = config.strip_accents.unwrap_or(config.do_lower_case);

    let mut attribute = vec![
        AttributeProto::string("vocab_file", &files.vocab.join("\n")),
        AttributeProto::int("do_lower_case", i64::from(config.do_lower_case)),
        AttributeProto::int("strip_accents", i64::from(strip_accents)),
        AttributeProto::int(
            "tokenize_chinese_chars",
            i64::from(config.tokenize_chinese_chars),
        ),
        AttributeProto::string("unk_token", &special.unk),
        AttributeProto::string("sep_token", &special.sep),
        AttributeProto::string("pad_token", &special.pad),
        AttributeProto::string("cls_token", &special.cls),
        AttributeProto::string("mask_token", &special.mask),
        AttributeProto::string("suffix_indicator", "##"),
    ];
    if options.truncation {
        attribute.push(AttributeProto::int("max_length", max_length));
        attribute.push(AttributeProto::string(
            "truncation_strategy_name",
            "longest_first",
        ));
    }

    let outputs = kind.output_names();

    let graph = GraphProto {
        name: kind.graph_name().to_string(),
        node: vec![NodeProto {
            name: "BertTokenizer".to_string(),
            op_type: "BertTokenizer".to_string(),
            domain: CONTRIB_DOMAIN.to_string(),
            input: vec![TEXT_INPUT.to_string()],
            output: outputs.iter().map(|s| s.to_string()).collect(),
            attribute,
            ..Default::default()
        }],
        input: vec![ValueInfoProto::tensor(
            TEXT_INPUT,
            DataType::String,
            &[Dim::symbolic(BATCH_DIM)],
        )],
        output: outputs
            .iter()
            .map(|name| {
                ValueInfoProto::tensor(*name, DataType::Int64, &[Dim::symbolic(SEQUENCE_DIM)])
            })
            .collect(),
        ..Default::default()
    };

    tracing::info!(
        "Generated {} preprocessing graph (max_length={}, padding={:?}, truncation={})",
        kind.graph_name(),
        options.max_length,
        options.padding,
        options.truncation
    );

    Ok(ModelProto {
        ir_version: PREPROCESSING_IR_VERSION,
        opset_import: vec![OperatorSetIdProto {
            domain: CONTRIB_DOMAIN.to_string(),
            version: CONTRIB_OPSET_VERSION,
        }],
        producer_name: "sentinel-onnx".to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        graph: Some(graph),
        ..Default::default()
    })
}
