//! Sentinel ONNX CLI
//!
//! Bakes a tokenizer preprocessing graph into a sentence-embedding model and
//! offers a few helpers to inspect and validate the result.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use sentinel_onnx::checker::check_external_data;
use sentinel_onnx::downloader::DEFAULT_RETRIES;
use sentinel_onnx::{
    check_model, fetch_tokenizer, load_model, parse_hf_model_spec, CliOverrides, Composer,
    ComposerConfig, Connection, FetchOptions, HfPreprocessingGenerator, Padding, ResolvedConfig,
    TensorGraph, VersionPolicy,
};
use std::path::{Path, PathBuf};
use std::process;

/// Sentinel ONNX - bake a tokenizer into a sentence-embedding model
#[derive(Parser, Debug)]
#[command(name = "sentinel-onnx")]
#[command(version)]
#[command(about = "Bake a tokenizer preprocessing graph into an ONNX embedding model", long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge the tokenizer graph into the base model and write the result
    ///
    /// Steps:
    /// 1. Generate the preprocessing graph from the tokenizer
    /// 2. Load the base model and reconcile IR versions
    /// 3. Connect tokenizer outputs to model inputs (by name or --connect)
    /// 4. Merge, validate and write next to the base model
    Bake(BakeArgs),

    /// Print a model's versions, opsets and external inputs/outputs
    Inspect(InspectArgs),

    /// Run the structural checker on a model
    Check(CheckArgs),

    /// Download tokenizer files from HuggingFace Hub into the local cache
    Fetch(FetchArgs),
}

#[derive(Parser, Debug)]
struct BakeArgs {
    /// Base ONNX model (default: engine/model/model_quint8_avx2.onnx)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output path (default: sentinel-minilm-with-tokenizer.onnx next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Tokenizer: HuggingFace repo ("owner/repo[@revision]") or local directory
    #[arg(short, long)]
    tokenizer: Option<String>,

    /// Force the tokenizer class (e.g. "BertTokenizer")
    #[arg(long = "tokenizer-class")]
    tokenizer_class: Option<String>,

    /// Hub revision (default: main)
    #[arg(long)]
    revision: Option<String>,

    /// Tokenizer cache directory
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// Maximum sequence length (default: 128)
    #[arg(long = "max-length")]
    max_length: Option<usize>,

    /// Padding: "longest" (per batch) or "max_length"
    #[arg(long)]
    padding: Option<Padding>,

    /// Do not truncate sequences longer than max-length
    #[arg(long = "no-truncation")]
    no_truncation: bool,

    /// Explicit connection "FROM=TO" (tokenizer output = model input); repeatable
    #[arg(long = "connect", value_name = "FROM=TO")]
    connect: Vec<Connection>,

    /// IR version handling: "relabel" (default) or "strict"
    #[arg(long = "version-policy")]
    version_policy: Option<VersionPolicy>,

    /// Use only cached tokenizer files
    #[arg(long)]
    offline: bool,

    /// Path to config file (TOML format)
    ///
    /// If not specified, searches for config in:
    /// 1. ./sentinel-onnx.toml
    /// 2. ./.sentinel-onnx.toml
    /// 3. ~/.config/sentinel/onnx-composer.toml
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// ONNX model file
    model: PathBuf,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// ONNX model file
    model: PathBuf,
}

#[derive(Parser, Debug)]
struct FetchArgs {
    /// HuggingFace repository ("owner/repo[@revision]")
    #[arg(default_value = sentinel_onnx::config::DEFAULT_TOKENIZER)]
    tokenizer: String,

    /// Cache directory
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// Only verify the cache; never download
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let result = match cli.command {
        Commands::Bake(args) => run_bake(args, cli.verbose).await,
        Commands::Inspect(args) => run_inspect(args),
        Commands::Check(args) => run_check(args),
        Commands::Fetch(args) => run_fetch(args, cli.verbose).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ComposerConfig> {
    match path {
        Some(path) => ComposerConfig::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display())),
        None => Ok(ComposerConfig::find_and_load()?.unwrap_or_default()),
    }
}

/// Local tokenizer directory, fetching into the cache when given a repo id
async fn resolve_tokenizer(config: &ResolvedConfig, verbose: bool) -> anyhow::Result<PathBuf> {
    let local = Path::new(&config.tokenizer);
    if local.is_dir() {
        tracing::debug!("Using local tokenizer directory {}", local.display());
        return Ok(local.to_path_buf());
    }

    let (repo_id, revision) = parse_hf_model_spec(&config.tokenizer)
        .with_context(|| format!("Invalid tokenizer specification: {}", config.tokenizer))?;
    let options = FetchOptions {
        revision: revision.unwrap_or_else(|| config.revision.clone()),
        cache_dir: config.cache_dir.clone(),
        offline: config.offline,
        retries: DEFAULT_RETRIES,
        verbose,
    };
    fetch_tokenizer(&repo_id, &options).await
}

async fn run_bake(args: BakeArgs, verbose: bool) -> anyhow::Result<()> {
    let file_config = load_config(args.config.as_deref())?;

    let config = file_config.merge_with_cli(CliOverrides {
        input: args.input,
        output: args.output,
        tokenizer: args.tokenizer,
        tokenizer_class: args.tokenizer_class,
        max_length: args.max_length,
        padding: args.padding,
        truncation: args.no_truncation.then_some(false),
        revision: args.revision,
        cache_dir: args.cache_dir,
        offline: args.offline.then_some(true),
        version_policy: args.version_policy,
        connections: args.connect,
    });

    if verbose {
        println!("Input:     {}", config.input.display());
        println!("Output:    {}", config.output.display());
        println!("Tokenizer: {}", config.tokenizer);
        println!();
    }

    let tokenizer_dir = resolve_tokenizer(&config, verbose).await?;
    let generator = HfPreprocessingGenerator::from_dir(&tokenizer_dir)
        .with_context(|| format!("Failed to read tokenizer from {}", tokenizer_dir.display()))?
        .with_class(config.tokenizer_class.clone())
        .with_source(config.tokenizer.clone());

    let report = Composer::new(config).run(&generator)?;

    println!("{}", "✓ Tokenizer baked into model".green().bold());
    if report.version.relabeled {
        println!(
            "  IR version relabelled {} -> {}",
            report.version.base_before, report.version.preprocessing
        );
    }
    for conn in &report.connections {
        println!("  {}", conn);
    }
    println!("Saved: {}", report.output.display());
    println!("Inputs : {:?}", report.inputs);
    println!("Outputs: {:?}", report.outputs);

    Ok(())
}

fn run_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let model = load_model(&args.model)?;
    let graph = model
        .graph
        .as_ref()
        .context("Model has no graph")?;

    println!("{}", args.model.display().to_string().bold());
    println!("  IR version: {}", model.ir_version);
    if !model.producer_name.is_empty() {
        println!("  Producer:   {} {}", model.producer_name, model.producer_version);
    }
    println!("  Graph:      {}", graph.name);
    println!("  Opsets:");
    for opset in &model.opset_import {
        let domain = if opset.domain.is_empty() {
            "ai.onnx"
        } else {
            opset.domain.as_str()
        };
        println!("    {} v{}", domain, opset.version);
    }

    println!("  Inputs:");
    for input in &graph.input {
        println!("    {} : {}", input.name.cyan(), input.type_string());
    }
    println!("  Outputs:");
    for output in &graph.output {
        println!("    {} : {}", output.name.cyan(), output.type_string());
    }

    let stats = TensorGraph::from_onnx(graph)?.statistics();
    println!(
        "  Nodes: {}, edges: {}, initializers: {}, components: {}",
        stats.total_nodes,
        stats.total_edges,
        graph.initializer.len(),
        stats.connected_components
    );

    Ok(())
}

fn run_check(args: CheckArgs) -> anyhow::Result<()> {
    let model = load_model(&args.model)?;
    check_model(&model)?;
    check_external_data(&model)?;
    println!("{} {} is valid", "✓".green(), args.model.display());
    Ok(())
}

async fn run_fetch(args: FetchArgs, verbose: bool) -> anyhow::Result<()> {
    let (repo_id, revision) = parse_hf_model_spec(&args.tokenizer)
        .with_context(|| format!("Invalid tokenizer specification: {}", args.tokenizer))?;

    let mut options = FetchOptions {
        cache_dir: args.cache_dir,
        offline: args.offline,
        verbose,
        ..Default::default()
    };
    if let Some(revision) = revision {
        options.revision = revision;
    }

    let dir = fetch_tokenizer(&repo_id, &options).await?;
    println!("{} Tokenizer files in {}", "✓".green(), dir.display());
    Ok(())
}
