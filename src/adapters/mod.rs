//! Adapter interfaces for external systems.
//!
//! Character images are the only outside collaborator: the attribution
//! engine never depends on them, the CLI attaches them to a result.

pub mod images;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::domain::CanonicalCharacter;

pub use images::{extract_image_urls, LocalGallery, WikiImageProvider};

/// Default number of images per character
pub const DEFAULT_MAX_IMAGES: usize = 6;

/// Fetches pictures of a character
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Up to `max` image locations, best first
    async fn images(&self, character: CanonicalCharacter, max: usize) -> Result<Vec<String>>;
}

/// Images from the first provider that has any
///
/// A failing provider is logged and skipped.
pub async fn first_available(
    providers: &[Box<dyn ImageProvider>],
    character: CanonicalCharacter,
    max: usize,
) -> Vec<String> {
    for provider in providers {
        match provider.images(character, max).await {
            Ok(images) if !images.is_empty() => return images,
            Ok(_) => {}
            Err(e) => warn!(provider = provider.name(), error = %e, "Image provider failed"),
        }
    }
    Vec::new()
}
