//! Filtergraph synthesis.
//!
//! Layers are chained strictly in this order:
//!
//! ```text
//! [0:v] ── scale/letterbox (or Ken Burns) ──▶ [base]
//!   ──▶ drawtext per text element, input order ──▶ [t0] … [tN]
//!   ──▶ overlay per resolved glyph, input order ──▶ [o0] … [oK]
//!   ──▶ trim=duration=D ──▶ [v]
//! [1+K:a] ── aloop / atrim ──▶ [a]
//! ```
//!
//! Input 0 is the background, inputs `1..=K` are the resolved glyphs in
//! scene order and the soundtrack, when present, is input `K + 1`. Dropped
//! glyphs leave no gap in that numbering.

use std::path::PathBuf;

use reelsmith_common::config::FontConfig;
use reelsmith_scene_model::{
    FontWeight, ImageEffect, SceneDescription, TextElement, CANVAS_HEIGHT, CANVAS_WIDTH,
    OUTPUT_FPS,
};

use crate::animation::{self, format_number, Motion};
use crate::assets::ResolvedAssets;
use crate::duration::{audio_loop_buffer_samples, AudioPlan, DurationPlan};
use crate::escape::{escape_option_value, flatten_lines};

/// Output label of the composed video chain.
pub const VIDEO_OUT: &str = "[v]";

/// Output label of the reconciled soundtrack.
pub const AUDIO_OUT: &str = "[a]";

/// Average glyph advance as a fraction of the font size.
const CHAR_WIDTH_FACTOR: f64 = 0.6;

/// Extra leading as a fraction of the font size (1.2 line height).
const LINE_SPACING_FACTOR: f64 = 0.2;

/// A complete filtergraph plus the extra inputs it references.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    chains: Vec<String>,
    /// Glyph images, one encoder input each, starting at input 1.
    pub glyph_inputs: Vec<PathBuf>,
    /// Encoder input index of the soundtrack.
    pub audio_input: Option<usize>,
}

impl FilterGraph {
    /// The `-filter_complex` argument.
    pub fn render(&self) -> String {
        self.chains.join(";")
    }

    pub fn chains(&self) -> &[String] {
        &self.chains
    }

    pub fn overlay_count(&self) -> usize {
        self.glyph_inputs.len()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_input.is_some()
    }
}

/// Builds the filtergraph for one scene.
pub struct FilterGraphBuilder<'a> {
    scene: &'a SceneDescription,
    assets: &'a ResolvedAssets,
    plan: &'a DurationPlan,
    fonts: &'a FontConfig,
}

impl<'a> FilterGraphBuilder<'a> {
    pub fn new(
        scene: &'a SceneDescription,
        assets: &'a ResolvedAssets,
        plan: &'a DurationPlan,
        fonts: &'a FontConfig,
    ) -> Self {
        Self {
            scene,
            assets,
            plan,
            fonts,
        }
    }

    pub fn build(&self) -> FilterGraph {
        let mut chains = vec![self.base_layer()];
        let mut current = "[base]".to_string();

        for (i, element) in self.scene.text_elements.iter().enumerate() {
            warn_if_overflowing(&self.scene.job_id, i, element);
            let next = format!("[t{i}]");
            chains.push(format!("{current}{}{next}", self.drawtext(element)));
            current = next;
        }

        let mut glyph_inputs = Vec::with_capacity(self.assets.glyphs.len());
        for (slot, glyph) in self.assets.glyphs.iter().enumerate() {
            let Some(element) = self.scene.emoji_elements.get(glyph.element_index) else {
                continue;
            };
            let input = 1 + glyph_inputs.len();
            let motion = animation::compile(element.animation, element.x as f64, element.y as f64);
            let glyph_label = format!("[g{slot}]");
            let next = format!("[o{slot}]");

            chains.push(format!(
                "[{input}:v]{}{glyph_label}",
                glyph_prep(element.size, &motion)
            ));
            chains.push(format!("{current}{glyph_label}{}{next}", overlay(&motion)));
            glyph_inputs.push(glyph.path.clone());
            current = next;
        }

        let duration = format_number(self.plan.target_secs);
        chains.push(format!(
            "{current}trim=duration={duration},setpts=PTS-STARTPTS{VIDEO_OUT}"
        ));

        let audio_input = self.plan.audio.map(|audio_plan| {
            let input = 1 + glyph_inputs.len();
            chains.push(audio_chain(input, audio_plan, &duration));
            input
        });

        FilterGraph {
            chains,
            glyph_inputs,
            audio_input,
        }
    }

    fn base_layer(&self) -> String {
        let (w, h) = (CANVAS_WIDTH, CANVAS_HEIGHT);
        let letterbox = |w: u32, h: u32| {
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1"
            )
        };

        let effect = self.scene.image_effect;
        if self.scene.background.is_video() || effect == ImageEffect::None {
            if self.scene.background.is_video() && effect != ImageEffect::None {
                tracing::debug!(job_id = %self.scene.job_id, ?effect, "Image effect ignored for video background");
            }
            return format!("[0:v]{},fps={OUTPUT_FPS}[base]", letterbox(w, h));
        }

        // Oversample so the zoom does not upscale a canvas-sized frame.
        let frames = (self.plan.target_secs * OUTPUT_FPS as f64).round().max(1.0) as u64;
        format!(
            "[0:v]{},{}[base]",
            letterbox(w * 2, h * 2),
            ken_burns(effect, frames)
        )
    }

    fn drawtext(&self, element: &TextElement) -> String {
        let pad = element.box_padding as i64;
        let mut filter = format!(
            "drawtext=text={}:expansion=none:{}:fontcolor={}:fontsize={}:x={}:y={}",
            escape_option_value(&flatten_lines(&element.text)),
            self.font_option(element.font_weight),
            element.color,
            element.font_size,
            element.x as i64 + pad,
            element.y as i64 + pad,
        );
        if let Some(background) = &element.background_color {
            filter.push_str(&format!(":box=1:boxcolor={background}:boxborderw={pad}"));
        }
        filter.push_str(&format!(":line_spacing={}", line_spacing(element.font_size)));
        filter
    }

    fn font_option(&self, weight: FontWeight) -> String {
        let (file, family) = match weight {
            FontWeight::Bold => (&self.fonts.bold_file, &self.fonts.bold_family),
            FontWeight::Normal => (&self.fonts.regular_file, &self.fonts.regular_family),
        };
        match file {
            Some(path) => format!(
                "fontfile={}",
                escape_option_value(&path.to_string_lossy())
            ),
            None => format!("font={}", escape_option_value(family)),
        }
    }
}

fn ken_burns(effect: ImageEffect, frames: u64) -> String {
    let (w, h) = (CANVAS_WIDTH, CANVAS_HEIGHT);
    let centered_x = "iw/2-(iw/zoom/2)";
    let centered_y = "ih/2-(ih/zoom/2)";
    let (zoom, x) = match effect {
        ImageEffect::ZoomIn => ("min(1+0.0015*on,1.3)".to_string(), centered_x.to_string()),
        ImageEffect::ZoomInOut => (
            format!("1.15+0.15*sin(2*PI*on/{frames})"),
            centered_x.to_string(),
        ),
        ImageEffect::PanRightLeft => (
            "1.2".to_string(),
            format!("{centered_x}+80*sin(2*PI*on/{frames})"),
        ),
        ImageEffect::None => ("1".to_string(), centered_x.to_string()),
    };
    format!("zoompan=z='{zoom}':x='{x}':y='{centered_y}':d=1:s={w}x{h}:fps={OUTPUT_FPS}")
}

fn glyph_prep(size: u32, motion: &Motion) -> String {
    let mut filter = String::from("format=rgba,");
    if motion.scale.is_time_varying() {
        filter.push_str(&format!(
            "scale=w='{size}*({scale})':h='{size}*({scale})':eval=frame",
            scale = motion.scale
        ));
    } else {
        filter.push_str(&format!("scale={size}:{size}"));
    }
    // geq evaluates per frame and names time `T`.
    if motion.opacity.is_time_varying() {
        filter.push_str(&format!(
            ",geq=r='r(X,Y)':g='g(X,Y)':b='b(X,Y)':a='alpha(X,Y)*({})'",
            motion.opacity.with_time_var("T")
        ));
    }
    filter
}

fn overlay(motion: &Motion) -> String {
    if motion.x.is_time_varying() || motion.y.is_time_varying() {
        format!("overlay=x='{}':y='{}':eval=frame", motion.x, motion.y)
    } else {
        format!("overlay=x={}:y={}", motion.x, motion.y)
    }
}

fn audio_chain(input: usize, plan: AudioPlan, duration: &str) -> String {
    match plan {
        AudioPlan::Loop { loops } => format!(
            "[{input}:a]aloop=loop={loops}:size={},asetpts=N/SR/TB,atrim=duration={duration}{AUDIO_OUT}",
            audio_loop_buffer_samples()
        ),
        AudioPlan::Trim => format!(
            "[{input}:a]atrim=duration={duration},asetpts=PTS-STARTPTS{AUDIO_OUT}"
        ),
    }
}

/// drawtext `line_spacing` for a font size.
pub fn line_spacing(font_size: u32) -> u32 {
    (font_size as f64 * LINE_SPACING_FACTOR).floor() as u32
}

/// Rough rendered width of a single-line string.
pub fn estimated_text_width(text: &str, font_size: u32) -> f64 {
    text.chars().count() as f64 * font_size as f64 * CHAR_WIDTH_FACTOR
}

/// Whether the flattened text is expected to exceed its advisory width.
pub fn overflows_max_width(element: &TextElement) -> bool {
    element.max_width.is_some_and(|max| {
        estimated_text_width(&flatten_lines(&element.text), element.font_size) > max as f64
    })
}

fn warn_if_overflowing(job_id: &str, index: usize, element: &TextElement) {
    if overflows_max_width(element) {
        tracing::warn!(
            job_id,
            index,
            max_width = ?element.max_width,
            "Text is wider than its box and will not be re-wrapped"
        );
    }
}
