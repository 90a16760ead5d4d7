//! Reelsmith Render Engine
//!
//! Turns a declarative [`SceneDescription`](reelsmith_scene_model::SceneDescription)
//! into a duration-exact 720x1280 H.264/AAC clip by driving a single ffmpeg
//! process, then publishes the result.
//!
//! # Pipeline Architecture
//!
//! ```text
//! background ──┐
//! audio ───────┼── AssetResolver ── probe ── DurationReconciler
//! glyphs ──────┘   (job WorkDir)                   │
//!                                                  ▼
//! animation kinds ── AnimationExpressionCompiler ─▶ FilterGraphBuilder
//!                                                  │
//!                                                  ▼
//!                                           RenderExecutor (ffmpeg)
//!                                                  │
//!                                                  ▼
//!                                   ResultPublisher ── ObjectStore
//!                                                  │
//!                                                  ▼
//!                                          final_<job>.mp4 / URL
//! ```
//!
//! Intermediates are removed on every exit path. Only the background is
//! mandatory; missing audio or glyphs degrade the render with a warning.

pub mod animation;
pub mod assets;
pub mod duration;
pub mod escape;
pub mod executor;
pub mod filter_graph;
pub mod pipeline;
pub mod probe;
pub mod publish;
pub mod workdir;

pub use assets::{AssetFetcher, GlyphProvider, HttpFetcher, TwemojiProvider};
pub use executor::{
    EncoderInvocation, FfmpegBackend, ProgressCallback, RenderBackend, RenderProgress,
    RenderStage,
};
pub use pipeline::{plan_render, scene_error, RenderPlan, SceneRenderer, SceneRendererBuilder};
pub use probe::{FfprobeProber, MediaProber};
pub use publish::{HttpObjectStore, ObjectStore, PublishWarning};
pub use workdir::{ScratchFiles, WorkDir};
