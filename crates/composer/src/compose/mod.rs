//! Bake pipeline
//!
//! generate → load → reconcile → map → merge → check → analyse → persist.
//! Every step before persist is pure with respect to the output path, so any
//! failure leaves an existing output file untouched.

pub mod io_map;
pub mod merge;
pub mod version;

pub use io_map::{match_by_name, resolve_connections, Connection};
pub use merge::{add_prefix, merge_graphs, merge_models, MergeOptions, PRODUCER_NAME};
pub use version::{reconcile, VersionPolicy, VersionReconciliation};

use crate::checker::{check_external_data, check_model};
use crate::config::ResolvedConfig;
use crate::graph::{GraphStatistics, TensorGraph};
use crate::model_io::{load_model, save_model};
use crate::proto::{GraphProto, ModelProto};
use crate::tokenizer::PreprocessingGenerator;
use crate::{ComposerError, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// In-memory result of composing two models
#[derive(Debug, Clone)]
pub struct Composition {
    pub model: ModelProto,
    pub connections: Vec<Connection>,
    pub version: VersionReconciliation,
    pub statistics: GraphStatistics,
}

/// What a bake run produced
#[derive(Debug, Clone)]
pub struct ComposeReport {
    pub output: PathBuf,
    pub bytes_written: u64,
    /// External input names of the merged graph
    pub inputs: Vec<String>,
    /// External output names of the merged graph
    pub outputs: Vec<String>,
    pub connections: Vec<Connection>,
    pub version: VersionReconciliation,
    pub statistics: GraphStatistics,
}

/// Runs the bake pipeline for one configuration
pub struct Composer {
    config: ResolvedConfig,
}

fn graph_of<'a>(model: &'a ModelProto, which: &str) -> Result<&'a GraphProto> {
    model
        .graph
        .as_ref()
        .ok_or_else(|| ComposerError::InvalidModel(format!("{} model has no graph", which)))
}

impl Composer {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Generate, merge, validate and write the merged model
    pub fn run(&self, generator: &dyn PreprocessingGenerator) -> Result<ComposeReport> {
        info!("Generating preprocessing graph for {}", self.config.tokenizer);
        let preprocessing = generator
            .generate(&self.config.options)?
            .ok_or_else(|| ComposerError::UnsupportedTokenizer(self.config.tokenizer.clone()))?;

        info!("Loading base model {}", self.config.input.display());
        let base = load_model(&self.config.input)?;

        let composition = self.compose(&preprocessing, base)?;

        let bytes_written = save_model(&composition.model, &self.config.output)?;
        info!(
            "✓ Wrote {} ({} bytes)",
            self.config.output.display(),
            bytes_written
        );

        let graph = graph_of(&composition.model, "merged")?;
        Ok(ComposeReport {
            output: self.config.output.clone(),
            bytes_written,
            inputs: graph.input.iter().map(|i| i.name.clone()).collect(),
            outputs: graph.output.iter().map(|o| o.name.clone()).collect(),
            connections: composition.connections,
            version: composition.version,
            statistics: composition.statistics,
        })
    }

    /// Everything between loading and persisting; no file I/O
    pub fn compose(&self, preprocessing: &ModelProto, mut base: ModelProto) -> Result<Composition> {
        let version = reconcile(
            preprocessing,
            &mut base,
            self.config.version_policy,
            self.config.max_ir_gap,
        )?;

        let connections = resolve_connections(
            &self.config.connections,
            graph_of(preprocessing, "preprocessing")?,
            graph_of(&base, "base")?,
        )?;
        info!("Connecting {} tensor(s)", connections.len());

        let options = MergeOptions {
            prefix_preprocessing: self.config.prefix_preprocessing.clone(),
            prefix_base: self.config.prefix_base.clone(),
            graph_name: self.config.graph_name.clone(),
        };
        let model = merge_models(preprocessing, &base, &connections, &options)?;

        check_model(&model)?;
        check_external_data(&model)?;

        let graph = TensorGraph::from_onnx(graph_of(&model, "merged")?)?;
        graph.topological_sort()?;
        let prefix = self.config.prefix_preprocessing.as_deref().unwrap_or("");
        for conn in &connections {
            match graph.producer_of(&format!("{}{}", prefix, conn.from)) {
                Some(node) => debug!("{} produced by {} ({})", conn, node.name, node.op_type),
                None => debug!("{} passes a graph input straight through", conn),
            }
        }
        let statistics = graph.statistics();
        if statistics.connected_components > 1 {
            warn!(
                "Merged graph has {} disconnected components; the preprocessing graph may not feed the model",
                statistics.connected_components
            );
        }
        info!(
            "Merged graph: {} nodes, {} edges",
            statistics.total_nodes, statistics.total_edges
        );

        Ok(Composition {
            model,
            connections,
            version,
            statistics,
        })
    }
}
