//! End-to-end render orchestration.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use reelsmith_common::config::AppConfig;
use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_scene_model::{RenderOutcome, RenderRequest, SceneDescription, SceneError};

use crate::assets::{
    source_extension, AssetFetcher, AssetResolver, GlyphProvider, HttpFetcher, ResolvedAssets,
    ResolvedGlyph, ResolvedMedia, TwemojiProvider,
};
use crate::duration::{reconcile, DurationPlan};
use crate::executor::{
    build_invocation, install_remediation, EncoderInvocation, FfmpegBackend, ProgressCallback,
    RenderBackend,
};
use crate::filter_graph::{FilterGraph, FilterGraphBuilder};
use crate::probe::{FfprobeProber, MediaProber};
use crate::publish::{release_intermediates, HttpObjectStore, ObjectStore, ResultPublisher};
use crate::workdir::{ScratchFiles, WorkDir};

/// Map scene-model errors into the shared taxonomy.
///
/// Background shape problems are configuration errors; the rest are
/// scene contract violations.
pub fn scene_error(err: SceneError) -> ReelError {
    if err.is_background_conflict() {
        ReelError::config(err.to_string())
    } else {
        ReelError::scene(err.to_string())
    }
}

/// Everything a dry run produces.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub duration: DurationPlan,
    pub graph: FilterGraph,
    pub invocation: EncoderInvocation,
}

/// Renders scenes with a fixed set of collaborators.
pub struct SceneRenderer {
    config: AppConfig,
    work_dir: WorkDir,
    backend: Arc<dyn RenderBackend>,
    prober: Arc<dyn MediaProber>,
    fetcher: Arc<dyn AssetFetcher>,
    glyphs: Arc<dyn GlyphProvider>,
    store: Option<Arc<dyn ObjectStore>>,
    cancel: Option<CancellationToken>,
}

/// Builder for [`SceneRenderer`]. Anything not injected is created from
/// the configuration.
pub struct SceneRendererBuilder {
    config: AppConfig,
    work_dir: Option<WorkDir>,
    backend: Option<Arc<dyn RenderBackend>>,
    prober: Option<Arc<dyn MediaProber>>,
    fetcher: Option<Arc<dyn AssetFetcher>>,
    glyphs: Option<Arc<dyn GlyphProvider>>,
    store: Option<Arc<dyn ObjectStore>>,
    cancel: Option<CancellationToken>,
}

impl SceneRendererBuilder {
    pub fn work_dir(mut self, work_dir: WorkDir) -> Self {
        self.work_dir = Some(work_dir);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn RenderBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn prober(mut self, prober: Arc<dyn MediaProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn glyphs(mut self, glyphs: Arc<dyn GlyphProvider>) -> Self {
        self.glyphs = Some(glyphs);
        self
    }

    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Token checked right before the encoder starts.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> SceneRenderer {
        let config = self.config;

        let discovered = (self.backend.is_none() || self.prober.is_none())
            .then(|| FfmpegBackend::discover(&config.encoder));
        let prober = self.prober.unwrap_or_else(|| {
            let ffprobe = discovered
                .as_ref()
                .map(|ffmpeg| ffmpeg.ffprobe_path(&config.encoder))
                .unwrap_or_else(|| PathBuf::from("ffprobe"));
            let library_path = discovered
                .as_ref()
                .and_then(|ffmpeg| ffmpeg.library_path().map(String::from));
            Arc::new(FfprobeProber::new(ffprobe).with_library_path(library_path))
                as Arc<dyn MediaProber>
        });
        let backend = match (self.backend, discovered) {
            (Some(backend), _) => backend,
            (None, Some(ffmpeg)) => Arc::new(ffmpeg) as Arc<dyn RenderBackend>,
            (None, None) => Arc::new(FfmpegBackend::discover(&config.encoder)) as Arc<dyn RenderBackend>,
        };

        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new()) as Arc<dyn AssetFetcher>);
        let glyphs = self.glyphs.unwrap_or_else(|| {
            Arc::new(TwemojiProvider::new(fetcher.clone(), &config.glyphs)) as Arc<dyn GlyphProvider>
        });
        let store = self.store.or_else(|| {
            config
                .storage
                .clone()
                .map(|storage| Arc::new(HttpObjectStore::new(storage)) as Arc<dyn ObjectStore>)
        });

        SceneRenderer {
            work_dir: self
                .work_dir
                .unwrap_or_else(|| WorkDir::new(config.work_dir.clone())),
            config,
            backend,
            prober,
            fetcher,
            glyphs,
            store,
            cancel: self.cancel,
        }
    }
}

impl SceneRenderer {
    pub fn builder(config: AppConfig) -> SceneRendererBuilder {
        SceneRendererBuilder {
            config,
            work_dir: None,
            backend: None,
            prober: None,
            fetcher: None,
            glyphs: None,
            store: None,
            cancel: None,
        }
    }

    /// A renderer wired to the real encoder, network and storage.
    pub fn from_config(config: AppConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn work_dir(&self) -> &WorkDir {
        &self.work_dir
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Convert a dashboard request and render it.
    pub async fn render_request(
        &self,
        request: RenderRequest,
        job_id: &str,
        progress: Option<ProgressCallback>,
    ) -> ReelResult<RenderOutcome> {
        let scene = request.into_scene(job_id).map_err(scene_error)?;
        self.render(&scene, progress).await
    }

    /// Render one scene.
    ///
    /// Intermediates are removed whether the job succeeds or fails. The
    /// output survives only a successful encode.
    pub async fn render(
        &self,
        scene: &SceneDescription,
        progress: Option<ProgressCallback>,
    ) -> ReelResult<RenderOutcome> {
        scene.validate().map_err(scene_error)?;
        if !self.backend.is_available() {
            tracing::error!(job_id = %scene.job_id, backend = self.backend.name(), "Encoder unavailable");
            return Err(ReelError::config(install_remediation()));
        }

        let started = std::time::Instant::now();
        tracing::info!(
            job_id = %scene.job_id,
            background = scene.background.reference(),
            texts = scene.text_elements.len(),
            emoji = scene.emoji_elements.len(),
            target_secs = scene.target_duration_secs,
            "Starting render"
        );

        let mut scratch = ScratchFiles::new(scene.job_id.clone());
        let result = self.run(scene, &mut scratch, progress).await;
        release_intermediates(&mut scratch, &scene.job_id).await;

        match &result {
            Ok(outcome) => tracing::info!(
                job_id = %scene.job_id,
                video_url = %outcome.video_url,
                duration = outcome.duration,
                warnings = outcome.warnings.len(),
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Render finished"
            ),
            Err(e) => tracing::error!(job_id = %scene.job_id, error = %e, "Render failed"),
        }
        result
    }

    async fn run(
        &self,
        scene: &SceneDescription,
        scratch: &mut ScratchFiles,
        progress: Option<ProgressCallback>,
    ) -> ReelResult<RenderOutcome> {
        let job_id = scene.job_id.as_str();
        let resolver = AssetResolver::new(
            &self.work_dir,
            self.fetcher.as_ref(),
            self.glyphs.as_ref(),
            self.prober.as_ref(),
        );
        let assets = resolver.resolve(scene, scratch).await?;

        let duration = reconcile(
            &scene.background,
            assets.background.probed_secs,
            assets.audio.as_ref().map(|audio| audio.probed_secs),
            scene.target_duration_secs,
        );
        let background_audio = if assets.audio.is_none() && scene.background.is_video() {
            let embedded = self
                .prober
                .has_audio_stream(&assets.background.path)
                .await;
            tracing::debug!(job_id, embedded_audio = ?embedded, "No soundtrack, checked background audio");
            // Unknown still maps the optional stream.
            embedded.unwrap_or(true)
        } else {
            false
        };

        let graph = FilterGraphBuilder::new(scene, &assets, &duration, &self.config.fonts).build();
        let output = self.work_dir.output_path(job_id);
        let invocation = build_invocation(
            &assets,
            &graph,
            &duration,
            &self.config.encoder,
            background_audio,
            &output,
        );
        tracing::debug!(
            job_id,
            filter_len = graph.render().len(),
            overlays = graph.overlay_count(),
            background = ?duration.background,
            audio = ?duration.audio,
            "Filtergraph assembled"
        );

        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            tracing::info!(job_id, "Cancelled before encoding");
            return Err(ReelError::Cancelled);
        }

        scratch.register(&output);
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.render(&invocation, progress))
            .await
            .map_err(|e| ReelError::render(format!("Encoder task failed: {e}")))??;
        scratch.keep(&output);

        let store = self.store.as_deref();
        let published = ResultPublisher::new(
            self.prober.as_ref(),
            store,
            &self.config.local_url_prefix,
        )
        .publish(job_id, &output, scene.target_duration_secs)
        .await;

        let mut warnings = assets.warnings;
        warnings.extend(published.warning.map(|w| w.to_string()));
        Ok(RenderOutcome {
            video_url: published.video_url,
            file_path: published.file_path,
            duration: published.duration_secs,
            warnings,
        })
    }

    /// Dry run with this renderer's work dir and configuration.
    pub fn plan(&self, scene: &SceneDescription) -> ReelResult<RenderPlan> {
        plan_render(scene, &self.work_dir, &self.config)
    }
}

/// Dry run: plan a render as if every asset resolved and matched the
/// target length. Touches neither the network nor the encoder, and needs no
/// [`SceneRenderer`].
pub fn plan_render(
    scene: &SceneDescription,
    work_dir: &WorkDir,
    config: &AppConfig,
) -> ReelResult<RenderPlan> {
    scene.validate().map_err(scene_error)?;
    let job_id = scene.job_id.as_str();
    let fallback = if scene.background.is_video() { "mp4" } else { "png" };

    let assets = ResolvedAssets {
        background: ResolvedMedia {
            path: work_dir.background_path(
                job_id,
                &source_extension(scene.background.reference(), fallback),
            ),
            probed_secs: None,
        },
        audio: scene.audio.as_deref().map(|source| ResolvedMedia {
            path: work_dir.audio_path(job_id, &source_extension(source, "mp3")),
            probed_secs: None,
        }),
        glyphs: (0..scene.emoji_elements.len())
            .map(|index| ResolvedGlyph {
                element_index: index,
                path: work_dir.glyph_path(job_id, index),
            })
            .collect(),
        warnings: vec![],
    };

    let duration = reconcile(
        &scene.background,
        None,
        assets.audio.as_ref().map(|_| None),
        scene.target_duration_secs,
    );
    let graph = FilterGraphBuilder::new(scene, &assets, &duration, &config.fonts).build();
    let invocation = build_invocation(
        &assets,
        &graph,
        &duration,
        &config.encoder,
        assets.audio.is_none() && scene.background.is_video(),
        &work_dir.output_path(job_id),
    );
    Ok(RenderPlan {
        duration,
        graph,
        invocation,
    })
}
