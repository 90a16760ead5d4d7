//! The fixed output canvas and encode contract.
//!
//! Downstream consumers (the uploader in particular) expect exactly this
//! container/codec combination, so none of it is configurable per job.

/// Canvas width in pixels.
pub const CANVAS_WIDTH: u32 = 720;

/// Canvas height in pixels.
pub const CANVAS_HEIGHT: u32 = 1280;

/// Output frame rate.
pub const OUTPUT_FPS: u32 = 25;

/// AAC audio bitrate in kbps.
pub const AUDIO_BITRATE_KBPS: u32 = 128;

/// Target duration used when a request omits one.
pub const DEFAULT_TARGET_DURATION_SECS: f64 = 10.0;

/// Longest clip the engine accepts. Loop bounds are derived from it.
pub const MAX_TARGET_DURATION_SECS: f64 = 600.0;

/// Duration of one output frame in seconds.
pub fn frame_interval_secs() -> f64 {
    1.0 / OUTPUT_FPS as f64
}

/// Whether a point lies on the canvas (edges inclusive).
pub fn contains_point(x: i32, y: i32) -> bool {
    (0..=CANVAS_WIDTH as i32).contains(&x) && (0..=CANVAS_HEIGHT as i32).contains(&y)
}
