//! Asset resolution.
//!
//! Downloads every input a scene references into the job's work directory.
//! Only the background is mandatory: a failed soundtrack or glyph degrades
//! the render and is reported as a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use reelsmith_common::config::GlyphConfig;
use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_scene_model::SceneDescription;

use crate::probe::MediaProber;
use crate::workdir::{ScratchFiles, WorkDir};

/// Copies a referenced asset to a local path.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch `source` (URL or local path) into `dest`.
    async fn fetch(&self, source: &str, dest: &Path) -> ReelResult<()>;
}

/// Fetches a rasterized glyph for an emoji sequence.
#[async_trait]
pub trait GlyphProvider: Send + Sync {
    async fn fetch_glyph(&self, emoji: &str, dest: &Path) -> ReelResult<()>;
}

/// HTTP(S) downloads via reqwest; `file://` URLs and bare paths by copy.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str, dest: &Path) -> ReelResult<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReelError::asset_fetch(url, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ReelError::asset_fetch(
                url,
                format!("server answered {}", response.status()),
            ));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ReelError::asset_fetch(url, e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(ReelError::asset_fetch(url, "empty response body"));
        }
        tracing::debug!(url, bytes = written, dest = %dest.display(), "Downloaded asset");
        Ok(())
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, source: &str, dest: &Path) -> ReelResult<()> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.download(source, dest).await;
        }

        let local = Path::new(source.strip_prefix("file://").unwrap_or(source));
        if !local.exists() {
            return Err(ReelError::FileNotFound {
                path: local.to_path_buf(),
            });
        }
        tokio::fs::copy(local, dest).await?;
        Ok(())
    }
}

/// Glyph images addressed by hyphen-joined lowercase hex code points,
/// the naming scheme Twemoji uses.
pub struct TwemojiProvider {
    fetcher: Arc<dyn AssetFetcher>,
    base_url: String,
    strip_fallback: bool,
}

impl TwemojiProvider {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, config: &GlyphConfig) -> Self {
        Self {
            fetcher,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            strip_fallback: config.strip_variation_selector_fallback,
        }
    }

    pub fn glyph_url(&self, code: &str) -> String {
        format!("{}/{code}.png", self.base_url)
    }
}

#[async_trait]
impl GlyphProvider for TwemojiProvider {
    async fn fetch_glyph(&self, emoji: &str, dest: &Path) -> ReelResult<()> {
        let code = glyph_code(emoji);
        let err = match self.fetcher.fetch(&self.glyph_url(&code), dest).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let stripped = glyph_code_without_variation_selectors(emoji);
        if !self.strip_fallback || stripped == code || stripped.is_empty() {
            return Err(err);
        }
        tracing::debug!(code = %code, fallback = %stripped, "Retrying glyph without variation selectors");
        self.fetcher.fetch(&self.glyph_url(&stripped), dest).await
    }
}

/// `"❤️"` → `"2764-fe0f"`.
pub fn glyph_code(emoji: &str) -> String {
    emoji
        .chars()
        .map(|c| format!("{:x}", c as u32))
        .collect::<Vec<_>>()
        .join("-")
}

/// Like [`glyph_code`] but without U+FE0F, which the provider omits for
/// most single-character emoji.
pub fn glyph_code_without_variation_selectors(emoji: &str) -> String {
    let stripped: String = emoji.chars().filter(|c| *c != '\u{fe0f}').collect();
    glyph_code(&stripped)
}

/// File extension for a downloaded asset, taken from the source's path.
pub fn source_extension(source: &str, fallback: &str) -> String {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => fallback.to_string(),
    }
}

/// A fetched media asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub path: PathBuf,
    /// Probed duration; `None` for stills or when probing failed.
    pub probed_secs: Option<f64>,
}

/// A fetched glyph, keyed by the emoji element it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGlyph {
    pub element_index: usize,
    pub path: PathBuf,
}

/// Everything available for composition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAssets {
    pub background: ResolvedMedia,
    pub audio: Option<ResolvedMedia>,
    /// In scene order; failed glyphs are absent.
    pub glyphs: Vec<ResolvedGlyph>,
    /// Human-readable notes about dropped assets.
    pub warnings: Vec<String>,
}

impl ResolvedAssets {
    pub fn glyph_for(&self, element_index: usize) -> Option<&ResolvedGlyph> {
        self.glyphs.iter().find(|g| g.element_index == element_index)
    }
}

/// Fetches and probes the assets of one scene.
pub struct AssetResolver<'a> {
    work_dir: &'a WorkDir,
    fetcher: &'a dyn AssetFetcher,
    glyphs: &'a dyn GlyphProvider,
    prober: &'a dyn MediaProber,
}

impl<'a> AssetResolver<'a> {
    pub fn new(
        work_dir: &'a WorkDir,
        fetcher: &'a dyn AssetFetcher,
        glyphs: &'a dyn GlyphProvider,
        prober: &'a dyn MediaProber,
    ) -> Self {
        Self {
            work_dir,
            fetcher,
            glyphs,
            prober,
        }
    }

    /// Resolve every asset, registering each destination with `scratch`
    /// before it is written so partial downloads are cleaned up too.
    pub async fn resolve(
        &self,
        scene: &SceneDescription,
        scratch: &mut ScratchFiles,
    ) -> ReelResult<ResolvedAssets> {
        let job_id = scene.job_id.as_str();
        self.work_dir.ensure().await?;

        let background = self.resolve_background(scene, scratch).await?;
        let mut warnings = Vec::new();

        let audio = match scene.audio.as_deref() {
            Some(source) => {
                let dest = self
                    .work_dir
                    .audio_path(job_id, &source_extension(source, "mp3"));
                scratch.register(&dest);
                match self.fetcher.fetch(source, &dest).await {
                    Ok(()) => Some(ResolvedMedia {
                        probed_secs: self.prober.duration_secs(&dest).await,
                        path: dest,
                    }),
                    Err(e) => {
                        tracing::warn!(job_id, asset = "audio", error = %e, "Continuing without audio");
                        warnings.push(format!("audio dropped: {e}"));
                        None
                    }
                }
            }
            None => None,
        };

        let mut glyphs = Vec::with_capacity(scene.emoji_elements.len());
        for (index, element) in scene.emoji_elements.iter().enumerate() {
            let dest = self.work_dir.glyph_path(job_id, index);
            scratch.register(&dest);
            match self.glyphs.fetch_glyph(&element.emoji, &dest).await {
                Ok(()) => glyphs.push(ResolvedGlyph {
                    element_index: index,
                    path: dest,
                }),
                Err(e) => {
                    tracing::warn!(
                        job_id,
                        asset = "glyph",
                        index,
                        code = %glyph_code(&element.emoji),
                        error = %e,
                        "Dropping emoji overlay"
                    );
                    warnings.push(format!("emoji {index} dropped: {e}"));
                }
            }
        }

        tracing::info!(
            job_id,
            audio = audio.is_some(),
            glyphs = glyphs.len(),
            dropped = warnings.len(),
            "Assets resolved"
        );

        Ok(ResolvedAssets {
            background,
            audio,
            glyphs,
            warnings,
        })
    }

    async fn resolve_background(
        &self,
        scene: &SceneDescription,
        scratch: &mut ScratchFiles,
    ) -> ReelResult<ResolvedMedia> {
        let source = scene.background.reference();
        let fallback = if scene.background.is_video() { "mp4" } else { "png" };
        let dest = self
            .work_dir
            .background_path(&scene.job_id, &source_extension(source, fallback));
        scratch.register(&dest);

        self.fetcher.fetch(source, &dest).await.map_err(|e| match e {
            ReelError::AssetFetch { .. } => e,
            other => ReelError::asset_fetch("background", other.to_string()),
        })?;

        let probed_secs = if scene.background.is_video() {
            let secs = self.prober.duration_secs(&dest).await;
            if secs.is_none() {
                tracing::warn!(job_id = %scene.job_id, "Could not probe background duration, assuming target length");
            }
            secs
        } else {
            None
        };

        Ok(ResolvedMedia {
            path: dest,
            probed_secs,
        })
    }
}
