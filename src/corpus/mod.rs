//! Corpus preparation: transcript rows in, retrievable documents out.
//!
//! - `normalizer`: raw speaker labels -> canonical characters
//! - `preprocess`: text cleaning, low-information filter, cleaning pipeline
//! - `chunker`: per-character windowing into documents
//! - `transcript`: CSV and JSONL file formats

pub mod chunker;
pub mod normalizer;
pub mod preprocess;
pub mod transcript;

pub use chunker::{build_documents, ChunkStrategy, StrategyKind};
pub use normalizer::CharacterNormalizer;
pub use preprocess::{
    clean_text, is_low_information, word_tokens, CleaningReport, DialoguePreprocessor,
    RejectReason,
};
pub use transcript::{
    read_cleaned, read_documents, read_raw_transcript, write_cleaned, write_documents, RawRow,
};
