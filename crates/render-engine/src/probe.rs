//! Media probing.
//!
//! Probing is best effort: every failure is reported as "unknown" and the
//! caller falls back to a safe assumption instead of aborting.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// Reads container-level facts about a media file.
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Container duration in seconds, or `None` when it cannot be read.
    async fn duration_secs(&self, path: &Path) -> Option<f64>;

    /// Whether the file carries at least one audio stream, or `None` when
    /// that cannot be determined.
    async fn has_audio_stream(&self, path: &Path) -> Option<bool>;
}

/// [`MediaProber`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
    library_path: Option<String>,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            library_path: None,
        }
    }

    /// `LD_LIBRARY_PATH` value for the child process.
    pub fn with_library_path(mut self, library_path: Option<String>) -> Self {
        self.library_path = library_path;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, args: &[&str], path: &Path) -> Option<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(library_path) = &self.library_path {
            cmd.env("LD_LIBRARY_PATH", library_path);
        }

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(binary = %self.binary.display(), error = %e, "Failed to run ffprobe");
                return None;
            }
        };
        if !output.status.success() {
            tracing::debug!(path = %path.display(), status = %output.status, "ffprobe reported an error");
            return None;
        }
        String::from_utf8(output.stdout).ok()
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn duration_secs(&self, path: &Path) -> Option<f64> {
        let raw = self
            .run(
                &[
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ],
                path,
            )
            .await?;
        parse_duration_output(&raw)
    }

    async fn has_audio_stream(&self, path: &Path) -> Option<bool> {
        self.run(
            &[
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index",
                "-of",
                "csv=p=0",
            ],
            path,
        )
        .await
        .map(|raw| parse_stream_listing(&raw))
    }
}

/// Parse ffprobe's bare `format=duration` output.
///
/// Still images report `N/A`; corrupt files report nothing. Both are `None`,
/// as is any non-positive value.
pub fn parse_duration_output(raw: &str) -> Option<f64> {
    let secs = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Whether a `csv=p=0` stream listing names any stream.
pub fn parse_stream_listing(raw: &str) -> bool {
    raw.lines().any(|line| !line.trim().is_empty())
}
