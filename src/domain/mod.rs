//! Domain types for character attribution.
//!
//! This module contains the core data structures:
//! - Character: the closed cast vocabulary
//! - Document: cleaned lines, documents, retrieved neighbors
//! - Result: attribution output

pub mod character;
pub mod document;
pub mod result;

// Re-export commonly used types
pub use character::{CanonicalCharacter, UnknownCharacter, MAIN_CHARACTERS, RELATIVES};
pub use document::{ChunkLayout, DialogueLine, Document, DocumentMetadata, RetrievedNeighbor};
pub use result::{AttributionResult, EvidenceEntry, ScoreEntry};
