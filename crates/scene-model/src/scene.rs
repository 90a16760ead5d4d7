//! Scene descriptions: the declarative input for one render job.

use serde::{Deserialize, Serialize};

use crate::canvas::{self, MAX_TARGET_DURATION_SECS};
use crate::color::ColorSpec;

/// Everything the engine needs to synthesize one clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    /// The base layer.
    pub background: BackgroundSource,

    /// Ken Burns motion for image backgrounds. Ignored for video.
    #[serde(default)]
    pub image_effect: ImageEffect,

    /// Text layers, drawn in order (later covers earlier).
    #[serde(default)]
    pub text_elements: Vec<TextElement>,

    /// Emoji overlays, composited in order after all text.
    #[serde(default)]
    pub emoji_elements: Vec<EmojiElement>,

    /// Soundtrack path or URL.
    #[serde(default)]
    pub audio: Option<String>,

    /// Exact output duration in seconds.
    pub target_duration_secs: f64,

    /// Unique per render; namespaces every temp file of the job.
    pub job_id: String,
}

/// Background media. Exactly one variant exists by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundSource {
    /// A video file path or URL; looped or trimmed to the target.
    Video(String),
    /// A still image path or URL; held for the whole clip.
    Image(String),
}

/// Camera motion over a still background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ImageEffect {
    #[default]
    None,
    ZoomIn,
    ZoomInOut,
    PanRightLeft,
}

/// A text layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub text: String,

    /// Outer top-left of the padded box.
    pub x: i32,
    pub y: i32,

    pub font_size: u32,

    pub color: ColorSpec,

    /// Box fill behind the text. No box is drawn when absent.
    #[serde(default)]
    pub background_color: Option<ColorSpec>,

    #[serde(default = "default_box_padding")]
    pub box_padding: u32,

    #[serde(default)]
    pub font_weight: FontWeight,

    /// Advisory width; text is never re-wrapped to fit it.
    #[serde(default, alias = "width")]
    pub max_width: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Normal,
    #[default]
    Bold,
}

/// An emoji overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiElement {
    /// Unicode code-point sequence, e.g. "😂" or "❤️".
    pub emoji: String,

    pub x: i32,
    pub y: i32,

    /// Rendered edge length in pixels (glyphs are square).
    pub size: u32,

    #[serde(default)]
    pub animation: AnimationKind,
}

/// Time-parameterized motion applied to an emoji overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnimationKind {
    #[default]
    None,
    Pulse,
    Rotate,
    Bounce,
    Fade,
}

fn default_box_padding() -> u32 {
    10
}

impl BackgroundSource {
    /// Convert the optional dual-field shape into a variant.
    ///
    /// Supplying both or neither is a caller contract violation.
    pub fn from_optional(video: Option<String>, image: Option<String>) -> Result<Self, SceneError> {
        let video = video.filter(|v| !v.trim().is_empty());
        let image = image.filter(|v| !v.trim().is_empty());
        match (video, image) {
            (Some(video), None) => Ok(Self::Video(video)),
            (None, Some(image)) => Ok(Self::Image(image)),
            (Some(_), Some(_)) => Err(SceneError::ConflictingBackground),
            (None, None) => Err(SceneError::MissingBackground),
        }
    }

    /// The path or URL of the source.
    pub fn reference(&self) -> &str {
        match self {
            Self::Video(reference) | Self::Image(reference) => reference,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }
}

impl TextElement {
    /// Convenience constructor with dashboard defaults.
    pub fn new(text: impl Into<String>, x: i32, y: i32, font_size: u32, color: ColorSpec) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_size,
            color,
            background_color: None,
            box_padding: default_box_padding(),
            font_weight: FontWeight::default(),
            max_width: None,
        }
    }
}

impl EmojiElement {
    pub fn new(emoji: impl Into<String>, x: i32, y: i32, size: u32) -> Self {
        Self {
            emoji: emoji.into(),
            x,
            y,
            size,
            animation: AnimationKind::None,
        }
    }

    pub fn with_animation(mut self, animation: AnimationKind) -> Self {
        self.animation = animation;
        self
    }
}

impl SceneDescription {
    /// Create a scene with no layers.
    pub fn new(
        background: BackgroundSource,
        target_duration_secs: f64,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            background,
            image_effect: ImageEffect::None,
            text_elements: vec![],
            emoji_elements: vec![],
            audio: None,
            target_duration_secs,
            job_id: job_id.into(),
        }
    }

    /// Check every invariant the engine relies on.
    pub fn validate(&self) -> Result<(), SceneError> {
        validate_job_id(&self.job_id)?;

        let d = self.target_duration_secs;
        if !d.is_finite() || d <= 0.0 || d > MAX_TARGET_DURATION_SECS {
            return Err(SceneError::invalid(format!(
                "target duration must be within (0, {MAX_TARGET_DURATION_SECS}] seconds, got {d}"
            )));
        }

        if self.background.reference().trim().is_empty() {
            return Err(SceneError::MissingBackground);
        }

        for (i, te) in self.text_elements.iter().enumerate() {
            if !canvas::contains_point(te.x, te.y) {
                return Err(SceneError::invalid(format!(
                    "text element {i} anchor ({}, {}) is off the canvas",
                    te.x, te.y
                )));
            }
            if te.font_size == 0 {
                return Err(SceneError::invalid(format!(
                    "text element {i} has zero font size"
                )));
            }
        }

        for (i, ee) in self.emoji_elements.iter().enumerate() {
            if !canvas::contains_point(ee.x, ee.y) {
                return Err(SceneError::invalid(format!(
                    "emoji element {i} anchor ({}, {}) is off the canvas",
                    ee.x, ee.y
                )));
            }
            if ee.size == 0 {
                return Err(SceneError::invalid(format!("emoji element {i} has zero size")));
            }
            if ee.emoji.trim().is_empty() {
                return Err(SceneError::invalid(format!("emoji element {i} is empty")));
            }
        }

        Ok(())
    }
}

/// Job ids end up in file names, so only a filename-safe alphabet is allowed.
pub fn validate_job_id(job_id: &str) -> Result<(), SceneError> {
    if job_id.is_empty()
        || !job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SceneError::InvalidJobId {
            job_id: job_id.to_string(),
        });
    }
    Ok(())
}

/// Errors that can occur when building or validating scenes.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("Both a background video and a background image were supplied")]
    ConflictingBackground,

    #[error("Either a background video or a background image is required")]
    MissingBackground,

    #[error("Invalid colour `{spec}`: {reason}")]
    InvalidColor { spec: String, reason: String },

    #[error("Invalid job id `{job_id}`: use letters, digits, '-' or '_'")]
    InvalidJobId { job_id: String },

    #[error("Invalid scene: {message}")]
    Invalid { message: String },
}

impl SceneError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid {
            message: msg.into(),
        }
    }

    /// Background shape problems are configuration errors, not bad layers.
    pub fn is_background_conflict(&self) -> bool {
        matches!(self, Self::ConflictingBackground | Self::MissingBackground)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black() -> ColorSpec {
        "black@1".parse().unwrap()
    }

    #[test]
    fn test_background_from_optional() {
        assert_eq!(
            BackgroundSource::from_optional(Some("bg.mp4".into()), None).unwrap(),
            BackgroundSource::Video("bg.mp4".into())
        );
        assert_eq!(
            BackgroundSource::from_optional(None, Some("bg.png".into())).unwrap(),
            BackgroundSource::Image("bg.png".into())
        );
    }

    #[test]
    fn test_background_both_or_neither_is_rejected() {
        let both = BackgroundSource::from_optional(Some("a.mp4".into()), Some("b.png".into()));
        assert!(matches!(both, Err(SceneError::ConflictingBackground)));

        let neither = BackgroundSource::from_optional(None, Some("  ".into()));
        assert!(matches!(neither, Err(SceneError::MissingBackground)));
    }

    #[test]
    fn test_background_serde_is_tagged() {
        let bg: BackgroundSource = serde_json::from_str(r#"{"video":"bg.mp4"}"#).unwrap();
        assert!(bg.is_video());
        let both = serde_json::from_str::<BackgroundSource>(r#"{"video":"a","image":"b"}"#);
        assert!(both.is_err());
    }

    #[test]
    fn test_text_element_defaults() {
        let te: TextElement = serde_json::from_str(
            r#"{"text":"Hello","x":100,"y":200,"fontSize":30,"color":"black@1"}"#,
        )
        .unwrap();
        assert_eq!(te.box_padding, 10);
        assert_eq!(te.font_weight, FontWeight::Bold);
        assert!(te.background_color.is_none());
    }

    #[test]
    fn test_validate_accepts_reference_scene() {
        let mut scene = SceneDescription::new(BackgroundSource::Video("bg.mp4".into()), 10.0, "abc");
        scene
            .text_elements
            .push(TextElement::new("Hello", 100, 200, 30, black()));
        scene.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_durations() {
        for d in [0.0, -1.0, f64::NAN, MAX_TARGET_DURATION_SECS + 1.0] {
            let scene = SceneDescription::new(BackgroundSource::Video("bg.mp4".into()), d, "abc");
            assert!(scene.validate().is_err(), "duration {d} should be rejected");
        }
    }

    #[test]
    fn test_validate_rejects_path_like_job_ids() {
        for id in ["", "../x", "a/b", "job id"] {
            assert!(matches!(
                validate_job_id(id),
                Err(SceneError::InvalidJobId { .. })
            ));
        }
        assert!(validate_job_id("9f86d081-abc_1").is_ok());
    }

    #[test]
    fn test_validate_rejects_off_canvas_emoji() {
        let mut scene = SceneDescription::new(BackgroundSource::Image("bg.png".into()), 5.0, "j1");
        scene.emoji_elements.push(EmojiElement::new("😂", 800, 10, 64));
        assert!(scene.validate().is_err());
    }

    #[test]
    fn test_conflict_classification() {
        assert!(SceneError::ConflictingBackground.is_background_conflict());
        assert!(!SceneError::invalid("x").is_background_conflict());
    }
}
