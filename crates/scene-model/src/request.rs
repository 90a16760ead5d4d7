//! Wire formats exchanged with the dashboard.
//!
//! The dashboard posts backgrounds as two optional fields and expects a
//! camelCase result. These types translate between that shape and
//! [`SceneDescription`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::canvas::DEFAULT_TARGET_DURATION_SECS;
use crate::scene::{
    BackgroundSource, EmojiElement, ImageEffect, SceneDescription, SceneError, TextElement,
};

/// A render request as posted by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[serde(default)]
    pub background_video_url: Option<String>,

    #[serde(default)]
    pub background_image_url: Option<String>,

    #[serde(default)]
    pub image_effect: ImageEffect,

    #[serde(default)]
    pub text_elements: Vec<TextElement>,

    #[serde(default)]
    pub emoji_elements: Vec<EmojiElement>,

    #[serde(default)]
    pub audio_url: Option<String>,

    #[serde(default = "default_duration")]
    pub duration: f64,
}

fn default_duration() -> f64 {
    DEFAULT_TARGET_DURATION_SECS
}

impl RenderRequest {
    /// Build the scene for one job.
    pub fn into_scene(self, job_id: impl Into<String>) -> Result<SceneDescription, SceneError> {
        let background =
            BackgroundSource::from_optional(self.background_video_url, self.background_image_url)?;
        let scene = SceneDescription {
            background,
            image_effect: self.image_effect,
            text_elements: self.text_elements,
            emoji_elements: self.emoji_elements,
            audio: self.audio_url.filter(|a| !a.trim().is_empty()),
            target_duration_secs: self.duration,
            job_id: job_id.into(),
        };
        scene.validate()?;
        Ok(scene)
    }
}

/// What a finished render reports back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutcome {
    /// Public URL when uploaded, otherwise the local URL.
    pub video_url: String,

    /// Where the encoder wrote the file. Removed after a confirmed upload.
    pub file_path: PathBuf,

    /// Measured output duration in seconds.
    pub duration: f64,

    /// Degradations that did not fail the job (e.g. a failed upload).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
