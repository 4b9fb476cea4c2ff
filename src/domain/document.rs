//! Corpus and retrieval data types.

use serde::{Deserialize, Serialize};

use super::character::CanonicalCharacter;

/// A cleaned, attributed line of dialogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub character: CanonicalCharacter,
    /// Non-empty text with stage directions removed
    pub text: String,
}

impl DialogueLine {
    pub fn new(character: CanonicalCharacter, text: impl Into<String>) -> Self {
        Self {
            character,
            text: text.into(),
        }
    }
}

/// How a document was assembled from its lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkLayout {
    /// Contiguous window of lines
    Chunked { num_lines: usize, start_idx: usize },
    /// One line embedded in its surrounding context
    Contextual { main_line: String, context_size: usize },
    /// A single line on its own
    Line,
}

/// Document metadata
///
/// `character` stays a plain string: documents come back from an external
/// index, which may hold labels that are no longer part of the cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub character: String,
    #[serde(flatten)]
    pub layout: ChunkLayout,
}

/// A retrievable text unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, character: CanonicalCharacter, layout: ChunkLayout) -> Self {
        Self {
            text: text.into(),
            metadata: DocumentMetadata {
                character: character.as_str().to_string(),
                layout,
            },
        }
    }

    /// The document's character, if it belongs to the cast
    pub fn character(&self) -> Option<CanonicalCharacter> {
        self.metadata.character.parse().ok()
    }
}

/// A document returned for a query with its distance (smaller is closer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedNeighbor {
    pub document: Document,
    pub distance: f64,
}

impl RetrievedNeighbor {
    pub fn new(document: Document, distance: f64) -> Self {
        Self { document, distance }
    }
}
