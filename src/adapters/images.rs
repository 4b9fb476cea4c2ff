//! Character image providers.
//!
//! `LocalGallery` serves curated files from `assets/characters/<slug>/`.
//! `WikiImageProvider` scrapes the character's fandom wiki page.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::ImageProvider;
use crate::domain::CanonicalCharacter;

pub const WIKI_BASE_URL: &str = "https://bigbangtheory.fandom.com";
const WIKI_TIMEOUT: Duration = Duration::from_secs(8);

static JSON_LD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid json-ld regex")
});

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid meta regex"));

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img regex"));

static CONTAINER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(/?)(div|table|figure)\b[^>]*>").expect("valid container regex")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});

static IMAGE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp)(?:\?|$)").expect("valid extension regex")
});

/// Curated images on disk
#[derive(Debug, Clone)]
pub struct LocalGallery {
    root: PathBuf,
}

impl LocalGallery {
    /// Gallery rooted at a directory holding one folder per character slug
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn character_dir(&self, character: CanonicalCharacter) -> PathBuf {
        self.root.join(character.slug())
    }
}

#[async_trait]
impl ImageProvider for LocalGallery {
    fn name(&self) -> &str {
        "gallery"
    }

    async fn images(&self, character: CanonicalCharacter, max: usize) -> Result<Vec<String>> {
        let dir = self.character_dir(character);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to read gallery: {}", dir.display()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        Ok(files
            .into_iter()
            .take(max)
            .map(|path| path.display().to_string())
            .collect())
    }
}

/// Images scraped from the character's wiki page
#[derive(Debug, Clone)]
pub struct WikiImageProvider {
    base_url: String,
    client: reqwest::Client,
}

impl WikiImageProvider {
    pub fn new() -> Result<Self> {
        Self::with_base_url(WIKI_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WIKI_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Wiki page for a character ("Mary Cooper" -> /wiki/Mary_Cooper)
    pub fn page_url(&self, character: CanonicalCharacter) -> String {
        format!("{}/wiki/{}", self.base_url, character.as_str().replace(' ', "_"))
    }
}

#[async_trait]
impl ImageProvider for WikiImageProvider {
    fn name(&self) -> &str {
        "wiki"
    }

    async fn images(&self, character: CanonicalCharacter, max: usize) -> Result<Vec<String>> {
        let url = self.page_url(character);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Wiki page unavailable");
            return Ok(Vec::new());
        }

        let html = response
            .text()
            .await
            .with_context(|| format!("Failed to read {}", url))?;

        let images = extract_image_urls(&html, &self.base_url, max);
        debug!(character = %character, found = images.len(), "Wiki images extracted");
        Ok(images)
    }
}

/// Image URLs in a wiki page, in preference order, de-duplicated, at most
/// `max`
///
/// JSON-LD `image`/`thumbnailUrl` (and `mainEntity`/`about` images) come
/// first, then `og:image`, then `<img>` tags inside the article body
/// (`.mw-parser-output`, `.article-table`, `figure`). Thumbnail URLs also
/// yield the original image they were scaled from.
pub fn extract_image_urls(html: &str, base_url: &str, max: usize) -> Vec<String> {
    let mut found = Vec::new();

    for script in JSON_LD.captures_iter(html) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&script[1]) {
            json_ld_images(&value, &mut found);
        }
    }

    for tag in META_TAG.find_iter(html) {
        let attrs = attributes(tag.as_str());
        if attr(&attrs, "property") == Some("og:image") {
            if let Some(content) = attr(&attrs, "content").filter(|c| !c.is_empty()) {
                found.push(content.to_string());
            }
        }
    }

    let tags = content_spans(html)
        .into_iter()
        .flat_map(|(start, end)| IMG_TAG.find_iter(&html[start..end]));
    for tag in tags {
        let attrs = attributes(tag.as_str());
        let srcset = attr(&attrs, "srcset").unwrap_or_default();

        let src = attr(&attrs, "data-src")
            .filter(|s| !s.is_empty())
            .or_else(|| attr(&attrs, "src").filter(|s| !s.is_empty()))
            .or_else(|| srcset_urls(srcset).next());
        let Some(src) = src else {
            continue;
        };
        let src = absolutize(src, base_url);

        if let Some(original) = original_from_thumb(&src) {
            found.push(original);
        }
        if is_image_url(&src) {
            found.push(src);
        }
        for candidate in srcset_urls(srcset) {
            let candidate = absolutize(candidate, base_url);
            if is_image_url(&candidate) {
                found.push(candidate);
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    found
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .take(max)
        .collect()
}

/// Byte ranges of the content containers, outermost only, in page order
///
/// An unclosed container runs to the end of the page.
fn content_spans(html: &str) -> Vec<(usize, usize)> {
    let mut open: Vec<(String, usize, bool)> = Vec::new();
    let mut spans = Vec::new();

    for caps in CONTAINER_TAG.captures_iter(html) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let name = name.as_str().to_lowercase();

        if caps.get(1).is_some_and(|slash| !slash.as_str().is_empty()) {
            while let Some((tag, start, is_content)) = open.pop() {
                if is_content {
                    spans.push((start, whole.end()));
                }
                if tag == name {
                    break;
                }
            }
        } else {
            let is_content = is_content_container(&name, whole.as_str());
            open.push((name, whole.start(), is_content));
        }
    }
    spans.extend(
        open.into_iter()
            .filter(|(_, _, is_content)| *is_content)
            .map(|(_, start, _)| (start, html.len())),
    );

    spans.sort_unstable();
    let mut outer: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        match outer.last() {
            Some(&(_, last_end)) if start < last_end => {}
            _ => outer.push((start, end)),
        }
    }
    outer
}

fn is_content_container(name: &str, tag: &str) -> bool {
    if name == "figure" {
        return true;
    }
    let attrs = attributes(tag);
    let classes = attr(&attrs, "class").unwrap_or_default();
    classes.split_whitespace().any(|class| match name {
        "div" => class == "mw-parser-output",
        "table" => class == "article-table",
        _ => false,
    })
}

fn json_ld_images(value: &serde_json::Value, out: &mut Vec<String>) {
    for key in ["image", "thumbnailUrl"] {
        if let Some(url) = value.get(key).and_then(|v| v.as_str()) {
            if !url.is_empty() {
                out.push(url.to_string());
            }
        }
    }

    let nested = value.get("mainEntity").or_else(|| value.get("about"));
    if let Some(url) = nested.and_then(|v| v.get("image")).and_then(|v| v.as_str()) {
        if !url.is_empty() {
            out.push(url.to_string());
        }
    }
}

fn attributes(tag: &str) -> Vec<(String, &str)> {
    ATTRIBUTE
        .captures_iter(tag)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((name, value))
        })
        .collect()
}

fn attr<'a>(attrs: &[(String, &'a str)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
}

fn srcset_urls(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|part| part.split_whitespace().next())
}

fn absolutize(url: &str, base_url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else if url.starts_with('/') {
        format!("{}{}", base_url, url)
    } else {
        url.to_string()
    }
}

/// ".../images/thumb/a/ab/Name.png/200px-Name.png" -> ".../images/200px-Name.png"
///
/// Keeps the last path segment, which is how fandom thumbnails are laid out.
fn original_from_thumb(url: &str) -> Option<String> {
    let (prefix, tail) = url.split_once("/thumb/")?;
    let filename = tail.rsplit('/').next()?.split('?').next()?;
    if filename.is_empty() {
        return None;
    }
    Some(absolutize(&format!("{}/{}", prefix, filename), ""))
}

fn is_image_url(url: &str) -> bool {
    IMAGE_EXTENSION.is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAGE: &str = r#"
<html><head>
<meta property="og:image" content="https://static.example.org/sheldon_og.jpg">
<script type="application/ld+json">
{"@type": "Article", "image": "https://static.example.org/sheldon_ld.png",
 "mainEntity": {"image": "https://static.example.org/sheldon_entity.webp"}}
</script>
</head><body>
<div class="mw-parser-output">
  <img data-src="//static.example.org/images/thumb/a/ab/Sheldon.png/200px-Sheldon.png" src="data:image/gif;base64,R0lGOD">
  <img src="/images/Spot.jpg?cb=1" srcset="/images/Spot_2x.jpg 2x, https://static.example.org/sheldon_og.jpg 3x">
  <img src="/images/logo.svg">
  <img alt="no source">
</div>
</body></html>
"#;

    #[test]
    fn test_extract_image_urls_order_and_dedupe() {
        let urls = extract_image_urls(PAGE, "https://wiki.example.org", 20);
        assert_eq!(
            urls,
            vec![
                "https://static.example.org/sheldon_ld.png",
                "https://static.example.org/sheldon_entity.webp",
                "https://static.example.org/sheldon_og.jpg",
                "https://static.example.org/images/200px-Sheldon.png",
                "https://static.example.org/images/thumb/a/ab/Sheldon.png/200px-Sheldon.png",
                "https://wiki.example.org/images/Spot.jpg?cb=1",
                "https://wiki.example.org/images/Spot_2x.jpg",
            ]
        );
    }

    #[test]
    fn test_extract_image_urls_ignores_page_chrome() {
        let page = r#"
<div class="wiki-header"><img src="/images/Site_logo.png"></div>
<div class="page-content">
  <div class="mw-parser-output">
    <div class="gallery"><img src="/images/Penny_gallery.jpg"></div>
    <table class="wikitable article-table"><tr><td><img src="/images/Penny_table.jpg"></td></tr></table>
  </div>
  <figure><img src="/images/Penny_figure.jpg"></figure>
</div>
<div class="comments"><img src="/images/User_avatar.png"></div>
"#;
        let urls = extract_image_urls(page, "https://wiki.example.org", 10);
        assert_eq!(
            urls,
            vec![
                "https://wiki.example.org/images/Penny_gallery.jpg",
                "https://wiki.example.org/images/Penny_table.jpg",
                "https://wiki.example.org/images/Penny_figure.jpg",
            ]
        );
    }

    #[test]
    fn test_extract_image_urls_respects_max() {
        let urls = extract_image_urls(PAGE, "https://wiki.example.org", 2);
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_extract_from_page_without_images() {
        assert!(extract_image_urls("<p>No pictures</p>", WIKI_BASE_URL, 6).is_empty());
    }

    #[test]
    fn test_page_url() {
        let wiki = WikiImageProvider::with_base_url("https://wiki.example.org/").unwrap();
        assert_eq!(
            wiki.page_url(CanonicalCharacter::MaryCooper),
            "https://wiki.example.org/wiki/Mary_Cooper"
        );
    }

    #[tokio::test]
    async fn test_local_gallery_sorted_files() {
        let temp = TempDir::new().unwrap();
        let gallery = LocalGallery::new(temp.path());
        let dir = gallery.character_dir(CanonicalCharacter::Penny);
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("b.jpg"), b"b").unwrap();
        std::fs::write(dir.join("a.png"), b"a").unwrap();

        let images = gallery.images(CanonicalCharacter::Penny, 6).await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].ends_with("a.png"));
        assert!(images[1].ends_with("b.jpg"));

        let capped = gallery.images(CanonicalCharacter::Penny, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_local_gallery_missing_character() {
        let temp = TempDir::new().unwrap();
        let gallery = LocalGallery::new(temp.path());
        let images = gallery.images(CanonicalCharacter::Stuart, 6).await.unwrap();
        assert!(images.is_empty());
    }
}
