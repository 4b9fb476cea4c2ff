//! Transcript and document file formats.
//!
//! - Raw transcript: CSV with a speaker column (`person_scene` or `character`)
//!   and a text column (`dialogue` or `text`). Other columns are ignored.
//! - Cleaned corpus: CSV with `character,text` headers.
//! - Documents: JSONL, one [`Document`] per line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::domain::{DialogueLine, Document};

/// One unvalidated transcript row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default, alias = "person_scene")]
    pub character: Option<String>,
    #[serde(default, alias = "dialogue")]
    pub text: Option<String>,
}

/// Read a raw transcript CSV
pub fn read_raw_transcript(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open transcript: {}", path.display()))?;

    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.with_context(|| format!("Malformed transcript row {} in {}", i + 1, path.display()))
        })
        .collect()
}

/// Read a cleaned corpus CSV
pub fn read_cleaned(path: &Path) -> Result<Vec<DialogueLine>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open cleaned corpus: {}", path.display()))?;

    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.with_context(|| format!("Malformed corpus row {} in {}", i + 1, path.display()))
        })
        .collect()
}

/// Write a cleaned corpus CSV atomically
pub fn write_cleaned(path: &Path, lines: &[DialogueLine]) -> Result<()> {
    write_atomic(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        for line in lines {
            writer.serialize(line)?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Read documents from JSONL
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open documents: {}", path.display()))?;

    let mut documents = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document: Document = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse document on line {}", i + 1))?;
        documents.push(document);
    }

    Ok(documents)
}

/// Write documents as JSONL atomically
pub fn write_documents(path: &Path, documents: &[Document]) -> Result<()> {
    write_atomic(path, |file| {
        let mut writer = BufWriter::new(file);
        for document in documents {
            serde_json::to_writer(&mut writer, document)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Write through a temp file in the target directory, then rename into place
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    write(temp.as_file_mut())?;
    temp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
