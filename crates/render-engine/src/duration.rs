//! Loop-versus-trim decisions.
//!
//! The plan only decides *how* each source reaches the target. The exact
//! length itself is enforced by the final trim in the filter graph and by
//! `-t` on the output, so loop arithmetic never has to be exact.

use reelsmith_scene_model::{BackgroundSource, MAX_TARGET_DURATION_SECS};

/// Highest audio sample rate the loop buffer is sized for.
pub const MAX_AUDIO_SAMPLE_RATE: u64 = 192_000;

/// How the background reaches the target duration.
///
/// Video inputs are stream-looped whichever video variant is chosen, so a
/// probe that overestimates the source still yields a full-length clip.
/// The variant records what the probe saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundPlan {
    /// Shorter video: repeat the input stream forever, then trim.
    LoopThenTrim,
    /// Video probed at least as long as the target (or not probed).
    Trim,
    /// Still image held as an endless frame sequence, then trimmed.
    StillFrame,
}

/// How the soundtrack reaches the target duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPlan {
    /// Shorter audio: repeat `loops` extra times and reset timestamps.
    Loop { loops: u32 },
    /// Audio at least as long as the target: cut at the target.
    Trim,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationPlan {
    pub background: BackgroundPlan,
    /// `None` when no soundtrack resolved.
    pub audio: Option<AudioPlan>,
    pub target_secs: f64,
}

impl DurationPlan {
    pub fn loops_background(&self) -> bool {
        matches!(self.background, BackgroundPlan::LoopThenTrim)
    }
}

/// Sample count bound for `aloop`, large enough to hold any source shorter
/// than the longest supported target at any supported sample rate.
pub fn audio_loop_buffer_samples() -> u64 {
    (MAX_TARGET_DURATION_SECS as u64) * MAX_AUDIO_SAMPLE_RATE
}

/// Length used for planning. A failed or nonsensical probe counts as
/// exactly the target, which selects a plain trim.
pub fn effective_length(probed_secs: Option<f64>, target_secs: f64) -> f64 {
    match probed_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => secs,
        _ => target_secs,
    }
}

/// Build the plan.
///
/// `audio_secs` is `None` when there is no soundtrack and `Some(None)` when
/// the soundtrack resolved but could not be probed.
pub fn reconcile(
    background: &BackgroundSource,
    background_secs: Option<f64>,
    audio_secs: Option<Option<f64>>,
    target_secs: f64,
) -> DurationPlan {
    let background = match background {
        BackgroundSource::Image(_) => BackgroundPlan::StillFrame,
        BackgroundSource::Video(_) => {
            let length = effective_length(background_secs, target_secs);
            if length < target_secs {
                BackgroundPlan::LoopThenTrim
            } else {
                BackgroundPlan::Trim
            }
        }
    };

    let audio = audio_secs.map(|probed| {
        let length = effective_length(probed, target_secs);
        if length < target_secs {
            let loops = (target_secs / length).ceil().min(u32::MAX as f64) as u32;
            AudioPlan::Loop { loops }
        } else {
            AudioPlan::Trim
        }
    });

    DurationPlan {
        background,
        audio,
        target_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn video() -> BackgroundSource {
        BackgroundSource::Video("bg.mp4".into())
    }

    #[test]
    fn test_short_video_loops() {
        let plan = reconcile(&video(), Some(3.0), None, 10.0);
        assert_eq!(plan.background, BackgroundPlan::LoopThenTrim);
        assert!(plan.audio.is_none());
        assert!(plan.loops_background());
    }

    #[test]
    fn test_long_or_equal_video_trims() {
        assert_eq!(
            reconcile(&video(), Some(30.0), None, 10.0).background,
            BackgroundPlan::Trim
        );
        assert_eq!(
            reconcile(&video(), Some(10.0), None, 10.0).background,
            BackgroundPlan::Trim
        );
    }

    #[test]
    fn test_image_is_still_frame_regardless_of_length() {
        let image = BackgroundSource::Image("bg.png".into());
        assert_eq!(
            reconcile(&image, Some(0.04), None, 10.0).background,
            BackgroundPlan::StillFrame
        );
    }

    #[test]
    fn test_unknown_length_assumes_target() {
        for probed in [None, Some(0.0), Some(-2.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let plan = reconcile(&video(), probed, Some(probed), 10.0);
            assert_eq!(plan.background, BackgroundPlan::Trim);
            assert_eq!(plan.audio, Some(AudioPlan::Trim));
        }
    }

    #[test]
    fn test_short_audio_loop_count() {
        let plan = reconcile(&video(), Some(20.0), Some(Some(3.0)), 10.0);
        assert_eq!(plan.audio, Some(AudioPlan::Loop { loops: 4 }));
    }

    #[test]
    fn test_loop_buffer_covers_longest_target() {
        assert_eq!(audio_loop_buffer_samples(), 600 * 192_000);
    }

    proptest! {
        #[test]
        fn prop_looping_covers_the_target(audio in 0.01f64..600.0, target in 0.1f64..600.0) {
            let plan = reconcile(&video(), Some(audio), Some(Some(audio)), target);
            match plan.audio {
                // aloop plays the source `loops + 1` times.
                Some(AudioPlan::Loop { loops }) => {
                    prop_assert!(audio < target);
                    prop_assert!(audio * (loops as f64 + 1.0) >= target);
                }
                Some(AudioPlan::Trim) => prop_assert!(audio >= target),
                None => prop_assert!(false, "audio plan missing"),
            }
            prop_assert_eq!(plan.loops_background(), audio < target);
        }
    }
}
