//! Nearest-neighbor index boundary.
//!
//! The attribution engine only sees [`NeighborIndex`]: given a query and a
//! count `k`, return up to `k` documents with distances, closest first. How
//! documents are embedded and stored belongs to the implementation.
//!
//! Indexes are expensive to open, so [`IndexContext`] loads one lazily on
//! first use and shares it for the life of the process.

pub mod lexical;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

use crate::domain::RetrievedNeighbor;

pub use lexical::{IndexManifest, LexicalIndex};

/// A searchable document index
#[async_trait]
pub trait NeighborIndex: Send + Sync {
    /// Human-readable index name
    fn name(&self) -> &str;

    /// Up to `k` neighbors of `text`, ascending by distance
    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedNeighbor>>;
}

/// Opens an index
#[async_trait]
pub trait IndexLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn NeighborIndex>>;
}

/// Loads a [`LexicalIndex`] saved in a directory
#[derive(Debug, Clone)]
pub struct LexicalIndexLoader {
    pub dir: PathBuf,
}

#[async_trait]
impl IndexLoader for LexicalIndexLoader {
    async fn load(&self) -> Result<Arc<dyn NeighborIndex>> {
        let dir = self.dir.clone();
        let index = tokio::task::spawn_blocking(move || LexicalIndex::load(&dir)).await??;
        Ok(Arc::new(index))
    }
}

/// Process-wide index handle with at-most-once initialization
///
/// Concurrent first callers wait on a single load. A failed load leaves the
/// context empty, so the next caller tries again.
pub struct IndexContext {
    loader: Box<dyn IndexLoader>,
    index: OnceCell<Arc<dyn NeighborIndex>>,
}

impl fmt::Debug for IndexContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexContext")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl IndexContext {
    /// Context that loads lazily through `loader`
    pub fn new(loader: impl IndexLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            index: OnceCell::new(),
        }
    }

    /// Context backed by a lexical index directory
    pub fn lexical(dir: impl Into<PathBuf>) -> Self {
        Self::new(LexicalIndexLoader { dir: dir.into() })
    }

    /// Context around an index that is already open
    pub fn preloaded(index: Arc<dyn NeighborIndex>) -> Self {
        Self {
            loader: Box::new(Preloaded(index.clone())),
            index: OnceCell::new_with(Some(index)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.index.initialized()
    }

    /// The shared index, loading it on first use
    #[instrument(skip(self))]
    pub async fn index(&self) -> Result<Arc<dyn NeighborIndex>> {
        let index = self
            .index
            .get_or_try_init(|| async {
                let index = self.loader.load().await?;
                info!(index = index.name(), "Index loaded");
                Ok::<_, anyhow::Error>(index)
            })
            .await?;
        Ok(index.clone())
    }
}

struct Preloaded(Arc<dyn NeighborIndex>);

#[async_trait]
impl IndexLoader for Preloaded {
    async fn load(&self) -> Result<Arc<dyn NeighborIndex>> {
        Ok(self.0.clone())
    }
}
