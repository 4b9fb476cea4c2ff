//! Command-line interface for whosaid.
//!
//! Offline corpus preparation (`clean`, `chunk`, `index`) and query-time
//! attribution (`predict`, `repl`), plus image lookup and config display.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::adapters::{first_available, ImageProvider, LocalGallery, WikiImageProvider, DEFAULT_MAX_IMAGES};
use crate::attribution::{Attributor, QueryError, ScoringEngine, WeightingMethod};
use crate::config::{self, ChunkingConfig, ConfigError, ResolvedConfig};
use crate::corpus::{
    build_documents, read_cleaned, read_documents, read_raw_transcript, write_cleaned,
    write_documents, ChunkStrategy, CharacterNormalizer, DialoguePreprocessor, StrategyKind,
};
use crate::domain::{AttributionResult, CanonicalCharacter};
use crate::index::{IndexContext, LexicalIndex};

/// whosaid - Guess which character said a line
#[derive(Parser, Debug)]
#[command(name = "whosaid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clean a raw transcript into the attributed corpus
    Clean {
        /// Raw transcript CSV (defaults to <data>/raw/1_10_seasons_tbbt.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Cleaned corpus CSV (defaults to <data>/processed/dialogues.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Group the cleaned corpus into retrievable documents
    Chunk {
        /// Cleaned corpus CSV
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Documents JSONL (defaults to <data>/processed/documents.jsonl)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// chunked, contextual or line
        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Lines per chunk (chunked)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Lines shared by consecutive chunks (chunked)
        #[arg(long)]
        overlap: Option<usize>,

        /// Context lines on each side (contextual)
        #[arg(long)]
        window_size: Option<usize>,
    },

    /// Build the lexical index from documents
    Index {
        /// Documents JSONL
        #[arg(short, long)]
        documents: Option<PathBuf>,

        /// Index directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Attribute one line of dialogue
    Predict {
        /// The line to attribute
        query: String,

        #[command(flatten)]
        options: QueryOptions,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Attach character images to the result
        #[arg(long)]
        images: bool,
    },

    /// Attribute lines interactively ("exit" quits)
    Repl {
        #[command(flatten)]
        options: QueryOptions,
    },

    /// List images for a character
    Images {
        /// Character name (e.g. "Sheldon", "Mary Cooper")
        character: String,

        /// Maximum number of images
        #[arg(short, long, default_value_t = DEFAULT_MAX_IMAGES)]
        max: usize,

        /// Skip the local gallery and query the wiki
        #[arg(long)]
        remote: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Per-invocation overrides of the retrieval settings
#[derive(clap::Args, Debug, Clone, Default)]
pub struct QueryOptions {
    /// Weighting method (e.g. reciprocal_rank_fusion, voting, mmr)
    #[arg(short, long)]
    pub method: Option<WeightingMethod>,

    /// Neighbors to retrieve
    #[arg(short)]
    pub k: Option<usize>,

    /// Minimum confidence for a prediction, in [0, 1]
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Index directory
    #[arg(long)]
    pub index: Option<PathBuf>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Clean { input, output } => clean(cfg, input, output).await,
            Commands::Chunk {
                input,
                output,
                strategy,
                chunk_size,
                overlap,
                window_size,
            } => {
                let strategy =
                    chunk_strategy(cfg.chunking, strategy, chunk_size, overlap, window_size)?;
                chunk(cfg, input, output, strategy).await
            }
            Commands::Index { documents, output } => build_index(cfg, documents, output).await,
            Commands::Predict {
                query,
                options,
                json,
                images,
            } => predict(cfg, &query, &options, json, images).await,
            Commands::Repl { options } => repl(cfg, &options).await,
            Commands::Images {
                character,
                max,
                remote,
            } => show_images(cfg, &character, max, remote).await,
            Commands::Config => show_config(cfg),
        }
    }
}

/// Resolve chunking flags on top of the configured strategy
pub fn chunk_strategy(
    base: ChunkStrategy,
    kind: Option<StrategyKind>,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
    window_size: Option<usize>,
) -> Result<ChunkStrategy, ConfigError> {
    let defaults = ChunkingConfig::default();
    let (base_size, base_overlap) = match base {
        ChunkStrategy::Chunked {
            chunk_size,
            overlap,
        } => (chunk_size, overlap),
        _ => (defaults.chunk_size, defaults.overlap),
    };
    let base_window = match base {
        ChunkStrategy::Contextual { window_size } => window_size,
        _ => defaults.window_size,
    };

    let strategy = match kind.unwrap_or_else(|| base.kind()) {
        StrategyKind::Chunked => ChunkStrategy::Chunked {
            chunk_size: chunk_size.unwrap_or(base_size),
            overlap: overlap.unwrap_or(base_overlap),
        },
        StrategyKind::Contextual => ChunkStrategy::contextual(window_size.unwrap_or(base_window)),
        StrategyKind::Line => ChunkStrategy::Line,
    };
    strategy.validate()?;
    Ok(strategy)
}

async fn clean(cfg: &ResolvedConfig, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| cfg.raw_transcript_path());
    let output = output.unwrap_or_else(|| cfg.cleaned_path());

    let rows = read_raw_transcript(&input)?;
    let preprocessor = DialoguePreprocessor::new(CharacterNormalizer::builtin());
    let (lines, report) = preprocessor.clean(rows);
    write_cleaned(&output, &lines)?;

    println!("Cleaned {} rows -> {}", report.total_rows, output.display());
    println!("  Kept:            {}", report.kept);
    println!("  Scene markers:   {}", report.scene_markers);
    println!("  Unknown speaker: {}", report.unknown_speaker);
    println!("  Empty text:      {}", report.empty_text);
    println!("  Low information: {}", report.low_information);

    Ok(())
}

async fn chunk(
    cfg: &ResolvedConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    strategy: ChunkStrategy,
) -> Result<()> {
    let input = input.unwrap_or_else(|| cfg.cleaned_path());
    let output = output.unwrap_or_else(|| cfg.documents_path());

    let lines = read_cleaned(&input)?;
    let documents = build_documents(&lines, strategy);
    write_documents(&output, &documents)?;

    info!(strategy = %strategy.kind(), lines = lines.len(), documents = documents.len(), "Chunked corpus");
    println!(
        "Built {} {} documents from {} lines -> {}",
        documents.len(),
        strategy.kind(),
        lines.len(),
        output.display()
    );

    Ok(())
}

async fn build_index(
    cfg: &ResolvedConfig,
    documents: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let documents_path = documents.unwrap_or_else(|| cfg.documents_path());
    let output = output.unwrap_or_else(|| cfg.index_dir.clone());

    let documents = read_documents(&documents_path)?;
    if documents.is_empty() {
        anyhow::bail!("No documents in {}", documents_path.display());
    }

    let (manifest, dir) = tokio::task::spawn_blocking(move || {
        let index = LexicalIndex::build(documents);
        index.save(&output).map(|manifest| (manifest, output))
    })
    .await??;

    println!(
        "Indexed {} documents -> {}",
        manifest.document_count,
        dir.display()
    );
    println!("  Digest: {}", manifest.documents_sha256);

    Ok(())
}

/// Attributor over the configured index with per-invocation overrides
pub fn build_attributor(cfg: &ResolvedConfig, options: &QueryOptions) -> Result<Attributor> {
    let index_dir = options
        .index
        .clone()
        .unwrap_or_else(|| cfg.index_dir.clone());
    let method = options.method.unwrap_or(cfg.retrieval.method);
    let scorer = ScoringEngine::new(method, cfg.retrieval.params.clone());

    let attributor = Attributor::new(Arc::new(IndexContext::lexical(index_dir)), scorer)
        .with_catchphrases(cfg.catchphrase_matcher()?)
        .with_k(options.k.unwrap_or(cfg.retrieval.k))
        .with_min_confidence(options.min_confidence.unwrap_or(cfg.retrieval.min_confidence))?;

    Ok(attributor)
}

/// Result plus optional images, as printed by `predict --json`
#[derive(Debug, Serialize)]
struct PredictOutput<'a> {
    #[serde(flatten)]
    result: &'a AttributionResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

async fn predict(
    cfg: &ResolvedConfig,
    query: &str,
    options: &QueryOptions,
    json: bool,
    with_images: bool,
) -> Result<()> {
    let attributor = build_attributor(cfg, options)?;
    let result = attributor.attribute(query, None).await?;

    let images = match (with_images, result.prediction) {
        (true, Some(character)) => {
            first_available(&image_providers(cfg, false)?, character, DEFAULT_MAX_IMAGES).await
        }
        _ => Vec::new(),
    };

    if json {
        let output = PredictOutput {
            result: &result,
            images,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_result(&result);
        if !images.is_empty() {
            println!("Images:");
            for image in &images {
                println!("  {}", image);
            }
        }
    }

    Ok(())
}

async fn repl(cfg: &ResolvedConfig, options: &QueryOptions) -> Result<()> {
    let attributor = build_attributor(cfg, options)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!(
        "whosaid ({}, k={}). Type a line of dialogue, or \"exit\" to quit.",
        attributor.method(),
        attributor.k()
    );

    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        match attributor.attribute(line, None).await {
            Ok(result) => print_result(&result),
            Err(e) if e.downcast_ref::<QueryError>().is_some() => eprintln!("{}", e),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    Ok(())
}

fn print_result(result: &AttributionResult) {
    match result.prediction {
        Some(character) => println!(
            "Prediction: {} (confidence {:.3}, {})",
            character, result.confidence, result.method
        ),
        None => println!(
            "Prediction: none (confidence {:.3}, {})",
            result.confidence, result.method
        ),
    }
    if let Some(reason) = &result.reason {
        println!("Reason: {}", reason);
    }

    if !result.scores.is_empty() {
        println!("Scores:");
        for entry in &result.scores {
            println!("  {:<20} {:.3}", entry.character.as_str(), entry.score);
        }
    }

    if !result.evidence.is_empty() {
        println!("Evidence:");
        for entry in &result.evidence {
            match entry.distance {
                Some(distance) => {
                    println!("  [{}] ({:.3}) {}", entry.character, distance, entry.text)
                }
                None => println!("  [{}] {}", entry.character, entry.text),
            }
        }
    }
}

fn image_providers(cfg: &ResolvedConfig, remote_only: bool) -> Result<Vec<Box<dyn ImageProvider>>> {
    let mut providers: Vec<Box<dyn ImageProvider>> = Vec::new();
    if !remote_only {
        providers.push(Box::new(LocalGallery::new(cfg.gallery_dir())));
    }
    providers.push(Box::new(WikiImageProvider::new()?));
    Ok(providers)
}

/// Canonical name first, then any known transcript label
fn parse_character(name: &str) -> Result<CanonicalCharacter> {
    name.parse::<CanonicalCharacter>()
        .ok()
        .or_else(|| CharacterNormalizer::builtin().normalize(name))
        .with_context(|| format!("Unknown character: {}", name))
}

async fn show_images(cfg: &ResolvedConfig, name: &str, max: usize, remote: bool) -> Result<()> {
    let character = parse_character(name)?;
    let images = first_available(&image_providers(cfg, remote)?, character, max).await;

    if images.is_empty() {
        println!("No images found for {}", character);
    } else {
        for image in images {
            println!("{}", image);
        }
    }

    Ok(())
}

fn display_or_none(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let retrieval = &cfg.retrieval;
    let params = &retrieval.params;

    println!("whosaid configuration");
    println!();
    println!("Config file: {}", display_or_none(cfg.config_file.as_deref()));
    println!();
    println!("Paths:");
    println!("  Data:        {}", cfg.data_dir.display());
    println!("  Raw:         {}", cfg.raw_transcript_path().display());
    println!("  Cleaned:     {}", cfg.cleaned_path().display());
    println!("  Documents:   {}", cfg.documents_path().display());
    println!("  Index:       {}", cfg.index_dir.display());
    println!("  Gallery:     {}", cfg.gallery_dir().display());
    println!();
    println!("Retrieval:");
    println!("  k:                  {}", retrieval.k);
    println!("  Method:             {}", retrieval.method);
    println!("  Min confidence:     {}", retrieval.min_confidence);
    println!("  RRF K:              {}", params.rrf_k);
    println!("  Epsilon:            {}", params.epsilon);
    println!("  Vote k:             {}", params.vote_k);
    println!("  MMR lambda / k:     {} / {}", params.mmr_lambda, params.mmr_k);
    match params.short_query_boost {
        Some(boost) => println!(
            "  Short-query boost:  x{} (<= {} tokens)",
            boost, params.short_query_tokens
        ),
        None => println!("  Short-query boost:  off"),
    }
    println!();
    println!("Chunking: {:?}", cfg.chunking);
    println!("Catchphrases:");
    for rule in cfg.catchphrase_matcher()?.rules() {
        println!("  {:<24} {} ({})", rule.phrase, rule.character, rule.confidence);
    }

    Ok(())
}
