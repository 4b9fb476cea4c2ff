//! Brute-force TF-IDF index.
//!
//! Reference [`NeighborIndex`] with no model to download: documents are
//! bag-of-words TF-IDF vectors, distance is `1 - cosine` in [0, 1]. Documents
//! sharing no terms with the query are never returned.
//!
//! On disk an index is a directory holding `documents.jsonl` and
//! `manifest.json`. The manifest records a digest of the documents file,
//! checked on load to catch documents edited after the build.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::NeighborIndex;
use crate::corpus::transcript::write_atomic;
use crate::corpus::{read_documents, word_tokens, write_documents};
use crate::domain::{Document, RetrievedNeighbor};

pub const DOCUMENTS_FILE: &str = "documents.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;

/// Build metadata saved next to the documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub document_count: usize,
    /// "sha256:<hex>" of documents.jsonl
    pub documents_sha256: String,
    pub built_at: DateTime<Utc>,
}

/// L2-normalized sparse term vector
#[derive(Debug, Clone, Default)]
struct TermVector(HashMap<String, f64>);

impl TermVector {
    fn dot(&self, other: &TermVector) -> f64 {
        let (small, large) = if self.0.len() <= other.0.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .0
            .iter()
            .filter_map(|(term, w)| large.0.get(term).map(|v| w * v))
            .sum()
    }
}

/// In-memory TF-IDF index
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    documents: Vec<Document>,
    vectors: Vec<TermVector>,
    idf: HashMap<String, f64>,
}

impl LexicalIndex {
    /// Index a document sequence
    pub fn build(documents: Vec<Document>) -> Self {
        let term_counts: Vec<HashMap<String, usize>> = documents
            .iter()
            .map(|doc| term_counts(&doc.text))
            .collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for counts in &term_counts {
            for term in counts.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n = documents.len() as f64;
        let idf: HashMap<String, f64> = doc_freq
            .into_iter()
            .map(|(term, df)| (term.to_string(), ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0))
            .collect();

        let vectors = term_counts
            .iter()
            .map(|counts| weigh(counts, &idf))
            .collect();

        info!(documents = documents.len(), terms = idf.len(), "Lexical index built");

        Self {
            documents,
            vectors,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Up to `k` nearest documents, ascending by distance (ties keep
    /// document order)
    pub fn search(&self, text: &str, k: usize) -> Vec<RetrievedNeighbor> {
        let query = weigh(&term_counts(text), &self.idf);
        if query.0.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .enumerate()
            .filter_map(|(i, vector)| {
                let similarity = query.dot(vector);
                (similarity > 0.0).then(|| (i, (1.0 - similarity).clamp(0.0, 1.0)))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(k);

        debug!(query = text, hits = hits.len(), "Lexical search");

        hits.into_iter()
            .map(|(i, distance)| RetrievedNeighbor::new(self.documents[i].clone(), distance))
            .collect()
    }

    /// Save documents and manifest into `dir`
    pub fn save(&self, dir: &Path) -> Result<IndexManifest> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        let documents_path = dir.join(DOCUMENTS_FILE);
        write_documents(&documents_path, &self.documents)?;

        let manifest = IndexManifest {
            version: MANIFEST_VERSION,
            document_count: self.documents.len(),
            documents_sha256: file_digest(&documents_path)?,
            built_at: Utc::now(),
        };

        write_atomic(&dir.join(MANIFEST_FILE), |file| {
            serde_json::to_writer_pretty(file, &manifest)?;
            Ok(())
        })?;

        info!(dir = %dir.display(), documents = manifest.document_count, "Index saved");
        Ok(manifest)
    }

    /// Load an index saved with [`LexicalIndex::save`]
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = Self::read_manifest(dir)?;

        if manifest.version != MANIFEST_VERSION {
            anyhow::bail!(
                "Unsupported index version {} in {} (expected {})",
                manifest.version,
                dir.display(),
                MANIFEST_VERSION
            );
        }

        let documents_path = dir.join(DOCUMENTS_FILE);
        let digest = file_digest(&documents_path)?;
        if digest != manifest.documents_sha256 {
            anyhow::bail!(
                "Index documents in {} changed since the index was built; rebuild it",
                dir.display()
            );
        }

        let documents = read_documents(&documents_path)?;
        if documents.len() != manifest.document_count {
            anyhow::bail!(
                "Index manifest lists {} documents but {} were found",
                manifest.document_count,
                documents.len()
            );
        }

        Ok(Self::build(documents))
    }

    pub fn read_manifest(dir: &Path) -> Result<IndexManifest> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read index manifest: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse index manifest: {}", path.display()))
    }
}

#[async_trait]
impl NeighborIndex for LexicalIndex {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedNeighbor>> {
        Ok(self.search(text, k))
    }
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in word_tokens(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn weigh(counts: &HashMap<String, usize>, idf: &HashMap<String, f64>) -> TermVector {
    let mut weights: HashMap<String, f64> = counts
        .iter()
        .filter_map(|(term, &count)| idf.get(term).map(|w| (term.clone(), count as f64 * w)))
        .collect();

    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in weights.values_mut() {
            *w /= norm;
        }
    }

    TermVector(weights)
}

fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CanonicalCharacter, ChunkLayout};
    use tempfile::TempDir;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(
                "That is my spot on the couch",
                CanonicalCharacter::Sheldon,
                ChunkLayout::Line,
            ),
            Document::new(
                "I work at the Cheesecake Factory",
                CanonicalCharacter::Penny,
                ChunkLayout::Line,
            ),
            Document::new(
                "I am an astronaut and an engineer",
                CanonicalCharacter::Howard,
                ChunkLayout::Line,
            ),
        ]
    }

    #[test]
    fn test_search_ranks_by_overlap() {
        let index = LexicalIndex::build(corpus());
        let hits = index.search("you are sitting in my spot", 5);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.character(), Some(CanonicalCharacter::Sheldon));
        assert!(hits[0].distance > 0.0 && hits[0].distance < 1.0);
    }

    #[test]
    fn test_search_respects_k_and_order() {
        let index = LexicalIndex::build(corpus());
        let hits = index.search("the cheesecake factory couch", 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.character(), Some(CanonicalCharacter::Penny));

        let hits = index.search("the cheesecake factory couch", 10);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_identical_text_is_distance_zero() {
        let index = LexicalIndex::build(corpus());
        let hits = index.search("I am an astronaut and an engineer", 1);
        assert!(hits[0].distance.abs() < 1e-9);
    }

    #[test]
    fn test_no_overlap_returns_nothing() {
        let index = LexicalIndex::build(corpus());
        assert!(index.search("zebra", 5).is_empty());
        assert!(index.search("", 5).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        let index = LexicalIndex::build(corpus());

        let manifest = index.save(&dir).unwrap();
        assert_eq!(manifest.document_count, 3);
        assert!(manifest.documents_sha256.starts_with("sha256:"));

        let loaded = LexicalIndex::load(&dir).unwrap();
        assert_eq!(loaded.documents(), index.documents());
        assert_eq!(LexicalIndex::read_manifest(&dir).unwrap(), manifest);
    }

    #[test]
    fn test_load_detects_edited_documents() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        LexicalIndex::build(corpus()).save(&dir).unwrap();

        let path = dir.join(DOCUMENTS_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content = content.replace("couch", "sofa");
        std::fs::write(&path, content).unwrap();

        let err = LexicalIndex::load(&dir).unwrap_err();
        assert!(err.to_string().contains("changed"));
    }

    #[test]
    fn test_load_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(LexicalIndex::load(&temp.path().join("nope")).is_err());
    }
}
