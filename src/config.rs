//! Configuration for whosaid.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI per invocation)
//! 2. Environment variables (WHOSAID_DATA, WHOSAID_INDEX)
//! 3. Config file (.whosaid/config.yaml)
//! 4. Defaults (./data, ./data/index, ./assets)
//!
//! Config file discovery:
//! - Searches current directory and parents for .whosaid/config.yaml
//! - Paths in the config file are relative to the project root (the parent
//!   of .whosaid/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::attribution::{
    check_threshold, CatchphraseMatcher, CatchphraseRule, ScoringParams, WeightingMethod,
    DEFAULT_K, DEFAULT_MIN_CONFIDENCE,
};
use crate::corpus::{ChunkStrategy, StrategyKind};
use crate::domain::CanonicalCharacter;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const CONFIG_DIR: &str = ".whosaid";
pub const CONFIG_FILE: &str = "config.yaml";

/// Invalid setup: fails before any query is served
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown weighting method '{name}' (expected one of: {expected})")]
    UnknownMethod { name: String, expected: String },

    #[error("Unknown chunking strategy '{name}' (expected chunked, contextual or line)")]
    UnknownStrategy { name: String },

    #[error("Chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap { chunk_size: usize, overlap: usize },

    #[error("Chunk size must be at least 1")]
    EmptyChunk,

    #[error("{name} is out of range: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("Invalid catchphrase '{phrase}': {reason}")]
    InvalidCatchphrase { phrase: String, reason: String },

    #[error("Label '{label}' is banned but listed as a variant of {character}")]
    BannedAlias {
        label: String,
        character: CanonicalCharacter,
    },

    #[error("Label '{label}' maps to both {first} and {second}")]
    ConflictingAlias {
        label: String,
        first: CanonicalCharacter,
        second: CanonicalCharacter,
    },
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Extra rules checked after the built-in catchphrases
    #[serde(default)]
    pub catchphrases: Vec<CatchphraseRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data directory (raw and processed corpora)
    pub data: Option<String>,
    /// Index directory
    pub index: Option<String>,
    /// Static assets (character galleries)
    pub assets: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_top_k")]
    pub vote_k: usize,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f64,
    #[serde(default = "default_top_k")]
    pub mmr_k: usize,
    /// `null` disables the boost
    #[serde(default = "default_short_query_boost")]
    pub short_query_boost: Option<f64>,
    #[serde(default = "default_short_query_tokens")]
    pub short_query_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            method: default_method(),
            min_confidence: default_min_confidence(),
            epsilon: default_epsilon(),
            rrf_k: default_rrf_k(),
            vote_k: default_top_k(),
            mmr_lambda: default_mmr_lambda(),
            mmr_k: default_top_k(),
            short_query_boost: default_short_query_boost(),
            short_query_tokens: default_short_query_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            window_size: default_window_size(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_k() -> usize {
    DEFAULT_K
}

fn default_method() -> String {
    WeightingMethod::ReciprocalRankFusion.as_str().to_string()
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_epsilon() -> f64 {
    ScoringParams::default().epsilon
}

fn default_rrf_k() -> f64 {
    ScoringParams::default().rrf_k
}

fn default_top_k() -> usize {
    10
}

fn default_mmr_lambda() -> f64 {
    0.5
}

fn default_short_query_boost() -> Option<f64> {
    Some(1.5)
}

fn default_short_query_tokens() -> usize {
    3
}

fn default_strategy() -> String {
    StrategyKind::Chunked.as_str().to_string()
}

fn default_chunk_size() -> usize {
    15
}

fn default_overlap() -> usize {
    5
}

fn default_window_size() -> usize {
    5
}

/// Validated retrieval settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub k: usize,
    pub method: WeightingMethod,
    pub min_confidence: f64,
    pub params: ScoringParams,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            method: WeightingMethod::ReciprocalRankFusion,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            params: ScoringParams::default(),
        }
    }
}

impl RetrievalConfig {
    /// Parse the method name and range-check every parameter
    pub fn resolve(&self) -> Result<RetrievalSettings, ConfigError> {
        let method: WeightingMethod = self.method.parse()?;

        for (name, value) in [
            ("retrieval.k", self.k),
            ("retrieval.vote_k", self.vote_k),
            ("retrieval.mmr_k", self.mmr_k),
        ] {
            if value == 0 {
                return Err(ConfigError::OutOfRange { name, value: 0.0 });
            }
        }
        check_threshold(self.min_confidence).map_err(|_| ConfigError::OutOfRange {
            name: "retrieval.min_confidence",
            value: self.min_confidence,
        })?;
        if !(self.epsilon > 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "retrieval.epsilon",
                value: self.epsilon,
            });
        }
        if !(self.rrf_k > 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "retrieval.rrf_k",
                value: self.rrf_k,
            });
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(ConfigError::OutOfRange {
                name: "retrieval.mmr_lambda",
                value: self.mmr_lambda,
            });
        }
        if let Some(boost) = self.short_query_boost {
            if !(boost > 0.0) {
                return Err(ConfigError::OutOfRange {
                    name: "retrieval.short_query_boost",
                    value: boost,
                });
            }
        }

        Ok(RetrievalSettings {
            k: self.k,
            method,
            min_confidence: self.min_confidence,
            params: ScoringParams {
                epsilon: self.epsilon,
                rrf_k: self.rrf_k,
                vote_k: self.vote_k,
                mmr_lambda: self.mmr_lambda,
                mmr_k: self.mmr_k,
                short_query_boost: self.short_query_boost,
                short_query_tokens: self.short_query_tokens,
            },
        })
    }
}

impl ChunkingConfig {
    pub fn resolve(&self) -> Result<ChunkStrategy, ConfigError> {
        match self.strategy.parse::<StrategyKind>()? {
            StrategyKind::Chunked => ChunkStrategy::chunked(self.chunk_size, self.overlap),
            StrategyKind::Contextual => Ok(ChunkStrategy::contextual(self.window_size)),
            StrategyKind::Line => Ok(ChunkStrategy::Line),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Data directory (raw/ and processed/ live here)
    pub data_dir: PathBuf,
    /// Index directory
    pub index_dir: PathBuf,
    /// Assets directory
    pub assets_dir: PathBuf,
    pub retrieval: RetrievalSettings,
    pub chunking: ChunkStrategy,
    /// Extra catchphrase rules from the config file
    pub catchphrases: Vec<CatchphraseRule>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Raw transcript CSV
    pub fn raw_transcript_path(&self) -> PathBuf {
        self.data_dir.join("raw").join("1_10_seasons_tbbt.csv")
    }

    /// Cleaned corpus CSV
    pub fn cleaned_path(&self) -> PathBuf {
        self.data_dir.join("processed").join("dialogues.csv")
    }

    /// Chunker output
    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("processed").join("documents.jsonl")
    }

    /// Per-character image galleries
    pub fn gallery_dir(&self) -> PathBuf {
        self.assets_dir.join("characters")
    }

    /// Built-in catchphrases followed by the configured extras
    pub fn catchphrase_matcher(&self) -> Result<CatchphraseMatcher, ConfigError> {
        CatchphraseMatcher::with_extra(self.catchphrases.clone())
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Environment overrides
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    data: Option<PathBuf>,
    index: Option<PathBuf>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            data: std::env::var_os("WHOSAID_DATA").map(PathBuf::from),
            index: std::env::var_os("WHOSAID_INDEX").map(PathBuf::from),
        }
    }
}

/// Resolve a parsed file (or defaults) into validated settings
fn resolve(
    file: ConfigFile,
    base_dir: &Path,
    config_file: Option<PathBuf>,
    env: EnvOverrides,
) -> Result<ResolvedConfig> {
    let data_dir = env.data.unwrap_or_else(|| {
        resolve_path(base_dir, file.paths.data.as_deref().unwrap_or("data"))
    });

    let index_dir = match (env.index, &file.paths.index) {
        (Some(dir), _) => dir,
        (None, Some(dir)) => resolve_path(base_dir, dir),
        (None, None) => data_dir.join("index"),
    };

    let assets_dir = resolve_path(base_dir, file.paths.assets.as_deref().unwrap_or("assets"));

    let retrieval = file.retrieval.resolve().context("Invalid retrieval settings")?;
    let chunking = file.chunking.resolve().context("Invalid chunking settings")?;

    // Validate extra rules now rather than on first query
    CatchphraseMatcher::with_extra(file.catchphrases.clone())
        .context("Invalid catchphrase rules")?;

    Ok(ResolvedConfig {
        data_dir,
        index_dir,
        assets_dir,
        retrieval,
        chunking,
        catchphrases: file.catchphrases,
        config_file,
    })
}

/// Load configuration from all sources, searching upward from `start`
fn load_config_from(start: &Path, env: EnvOverrides) -> Result<ResolvedConfig> {
    match find_config_file(start) {
        Some(config_path) => {
            let file = load_config_file(&config_path)?;

            // Base directory is the parent of .whosaid/
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."))
                .to_path_buf();

            resolve(file, &base_dir, Some(config_path), env)
        }
        None => resolve(ConfigFile::default(), start, None, env),
    }
}

fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd, EnvOverrides::from_env())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, yaml: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", yaml).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load_config_from(temp.path(), EnvOverrides::default()).unwrap();

        assert!(config.config_file.is_none());
        assert!(config.data_dir.ends_with("data"));
        assert_eq!(config.index_dir, config.data_dir.join("index"));
        assert_eq!(config.retrieval, RetrievalSettings::default());
        assert_eq!(config.retrieval.k, 20);
        assert_eq!(
            config.chunking,
            ChunkStrategy::Chunked {
                chunk_size: 15,
                overlap: 5
            }
        );
        assert!(config.catchphrases.is_empty());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1.0"
paths:
  data: corpus
  index: build/index
retrieval:
  k: 8
  method: voting
  min_confidence: 0.4
  short_query_boost: null
chunking:
  strategy: contextual
  window_size: 2
catchphrases:
  - phrase: "hallelujah"
    character: Mary Cooper
    confidence: 0.8
"#,
        );

        let file = load_config_file(&path).unwrap();
        assert_eq!(file.retrieval.k, 8);
        assert_eq!(file.retrieval.short_query_boost, None);
        assert_eq!(file.retrieval.rrf_k, 60.0);
        assert_eq!(file.chunking.chunk_size, 15);

        let nested = temp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        let config = load_config_from(&nested, EnvOverrides::default()).unwrap();

        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
        assert!(config.data_dir.ends_with("corpus"));
        assert!(config.index_dir.ends_with("build/index"));
        assert_eq!(config.retrieval.method, WeightingMethod::Voting);
        assert_eq!(config.retrieval.min_confidence, 0.4);
        assert_eq!(config.retrieval.params.short_query_boost, None);
        assert_eq!(config.chunking, ChunkStrategy::Contextual { window_size: 2 });

        let matcher = config.catchphrase_matcher().unwrap();
        let rule = matcher.find("Well, HALLELUJAH!").unwrap();
        assert_eq!(rule.character, CanonicalCharacter::MaryCooper);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "paths:\n  data: corpus\n  index: idx\n");

        let env = EnvOverrides {
            data: Some(PathBuf::from("/srv/whosaid/data")),
            index: Some(PathBuf::from("/srv/whosaid/index")),
        };
        let config = load_config_from(temp.path(), env).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/whosaid/data"));
        assert_eq!(config.index_dir, PathBuf::from("/srv/whosaid/index"));
    }

    #[test]
    fn test_unknown_method_fails_at_load() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "retrieval:\n  method: nearest_guess\n");

        let err = load_config_from(temp.path(), EnvOverrides::default()).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(config_err, ConfigError::UnknownMethod { .. }));
    }

    #[test]
    fn test_invalid_chunking_fails_at_load() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "chunking:\n  chunk_size: 4\n  overlap: 4\n");

        let err = load_config_from(temp.path(), EnvOverrides::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidOverlap {
                chunk_size: 4,
                overlap: 4
            })
        ));
    }

    #[test]
    fn test_retrieval_ranges() {
        let bad_threshold = RetrievalConfig {
            min_confidence: 1.2,
            ..Default::default()
        };
        assert!(matches!(
            bad_threshold.resolve(),
            Err(ConfigError::OutOfRange {
                name: "retrieval.min_confidence",
                ..
            })
        ));

        let zero_k = RetrievalConfig {
            k: 0,
            ..Default::default()
        };
        assert!(zero_k.resolve().is_err());

        let zero_vote_k = RetrievalConfig {
            method: "voting".to_string(),
            vote_k: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_vote_k.resolve(),
            Err(ConfigError::OutOfRange {
                name: "retrieval.vote_k",
                ..
            })
        ));

        let zero_mmr_k = RetrievalConfig {
            method: "mmr".to_string(),
            mmr_k: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_mmr_k.resolve(),
            Err(ConfigError::OutOfRange {
                name: "retrieval.mmr_k",
                ..
            })
        ));

        let bad_boost = RetrievalConfig {
            short_query_boost: Some(0.0),
            ..Default::default()
        };
        assert!(bad_boost.resolve().is_err());
    }

    #[test]
    fn test_invalid_catchphrase_fails_at_load() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            "catchphrases:\n  - phrase: \"Bazinga\"\n    character: Sheldon\n    confidence: 0.9\n",
        );
        assert!(load_config_from(temp.path(), EnvOverrides::default()).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_derived_paths() {
        let config = ResolvedConfig {
            data_dir: PathBuf::from("/p/data"),
            index_dir: PathBuf::from("/p/data/index"),
            assets_dir: PathBuf::from("/p/assets"),
            retrieval: RetrievalSettings::default(),
            chunking: ChunkStrategy::Line,
            catchphrases: Vec::new(),
            config_file: None,
        };
        assert_eq!(
            config.cleaned_path(),
            PathBuf::from("/p/data/processed/dialogues.csv")
        );
        assert_eq!(
            config.documents_path(),
            PathBuf::from("/p/data/processed/documents.jsonl")
        );
        assert_eq!(config.gallery_dir(), PathBuf::from("/p/assets/characters"));
    }
}
