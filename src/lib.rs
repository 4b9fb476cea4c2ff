//! whosaid - Character attribution for show dialogue
//!
//! Guesses which character spoke a line by retrieving similar lines from a
//! transcript corpus and weighting the speakers of the nearest neighbors.
//!
//! # Pipeline
//!
//! Offline, a raw transcript is cleaned (speaker labels normalized to the
//! closed cast, annotations stripped, filler lines dropped) and grouped into
//! per-character documents that are handed to a nearest-neighbor index.
//!
//! At query time a literal catchphrase check runs first; otherwise the index
//! is searched, neighbors are weighted per character and the top character
//! is reported with its share of the total score as confidence.
//!
//! # Modules
//!
//! - `domain`: Data structures (CanonicalCharacter, Document, AttributionResult)
//! - `corpus`: Label normalization, cleaning, chunking, file formats
//! - `attribution`: Catchphrases, scoring, decision, the Attributor
//! - `index`: NeighborIndex boundary, lazy IndexContext, LexicalIndex
//! - `adapters`: Character image providers
//! - `config`: Config file and environment resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! whosaid clean && whosaid chunk && whosaid index
//! whosaid predict "I'm not crazy, my mother had me tested."
//! ```

pub mod adapters;
pub mod attribution;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod index;

// Re-export main types at crate root for convenience
pub use attribution::{Attributor, QueryError, ScoringEngine, ScoringParams, WeightingMethod};
pub use config::ConfigError;
pub use domain::{AttributionResult, CanonicalCharacter, Document, RetrievedNeighbor};
pub use index::{IndexContext, NeighborIndex};
