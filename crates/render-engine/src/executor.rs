//! Encoder invocation.
//!
//! Assembles the single ffmpeg command a job needs and runs it, reporting
//! best-effort progress parsed from `-progress pipe:1`.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use reelsmith_common::config::EncoderConfig;
use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_scene_model::{AUDIO_BITRATE_KBPS, OUTPUT_FPS};

use crate::animation::format_number;
use crate::assets::ResolvedAssets;
use crate::duration::{BackgroundPlan, DurationPlan};
use crate::filter_graph::{FilterGraph, AUDIO_OUT, VIDEO_OUT};

/// Lines of encoder stderr kept on a [`ReelError::Render`].
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Progress callback for rendering.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send>;

/// Render progress report.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: RenderStage,
}

/// Stages of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
}

/// A fully assembled encoder command.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderInvocation {
    /// Arguments after the binary name.
    pub args: Vec<String>,
    pub output_path: PathBuf,
    pub target_secs: f64,
    pub total_frames: u64,
}

/// Trait for render backends.
pub trait RenderBackend: Send + Sync {
    /// Run the encoder to completion. Blocking.
    fn render(
        &self,
        invocation: &EncoderInvocation,
        progress: Option<ProgressCallback>,
    ) -> ReelResult<()>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Assemble the encoder arguments.
///
/// `background_audio` maps the background's own sound when the graph has
/// no soundtrack; it is ignored otherwise.
pub fn build_invocation(
    assets: &ResolvedAssets,
    graph: &FilterGraph,
    plan: &DurationPlan,
    encoder: &EncoderConfig,
    background_audio: bool,
    output_path: &Path,
) -> EncoderInvocation {
    let fps = OUTPUT_FPS.to_string();
    let crf = encoder.crf.to_string();
    let audio_bitrate = format!("{AUDIO_BITRATE_KBPS}k");
    let duration = format_number(plan.target_secs);
    let still_input = ["-loop", "1", "-framerate", fps.as_str()];

    let mut args = strings(&["-hide_banner", "-nostats", "-y"]);
    match plan.background {
        BackgroundPlan::LoopThenTrim | BackgroundPlan::Trim => {
            args.extend(strings(&["-stream_loop", "-1"]))
        }
        BackgroundPlan::StillFrame => args.extend(strings(&still_input)),
    }
    push_input(&mut args, &assets.background.path);

    for glyph in &graph.glyph_inputs {
        args.extend(strings(&still_input));
        push_input(&mut args, glyph);
    }

    if graph.has_audio() {
        if let Some(audio) = &assets.audio {
            push_input(&mut args, &audio.path);
        }
    }

    args.extend(["-filter_complex".to_string(), graph.render()]);
    args.extend(strings(&["-map", VIDEO_OUT]));
    if graph.has_audio() {
        args.extend(strings(&["-map", AUDIO_OUT]));
    } else if background_audio {
        args.extend(strings(&["-map", "0:a?"]));
    }

    args.extend(strings(&[
        "-c:v",
        "libx264",
        "-preset",
        encoder.preset.as_str(),
        "-crf",
        crf.as_str(),
        "-pix_fmt",
        "yuv420p",
        "-r",
        fps.as_str(),
        "-c:a",
        "aac",
        "-b:a",
        audio_bitrate.as_str(),
        "-t",
        duration.as_str(),
        "-movflags",
        "+faststart",
        "-progress",
        "pipe:1",
    ]));
    args.push(output_path.to_string_lossy().into_owned());

    EncoderInvocation {
        args,
        output_path: output_path.to_path_buf(),
        target_secs: plan.target_secs,
        total_frames: (plan.target_secs * OUTPUT_FPS as f64).round() as u64,
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn push_input(args: &mut Vec<String>, path: &Path) {
    args.push("-i".into());
    args.push(path.to_string_lossy().into_owned());
}

/// Shown whenever no usable ffmpeg is found.
pub fn install_remediation() -> &'static str {
    "ffmpeg was not found. Install it with `brew install ffmpeg` (macOS), \
     `sudo apt-get install ffmpeg` (Debian/Ubuntu) or from https://ffmpeg.org/download.html, \
     or list its location under encoder.ffmpeg_candidates in the config"
}

/// ffmpeg subprocess backend.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: Option<PathBuf>,
    library_path: Option<String>,
}

impl FfmpegBackend {
    /// Resolve the binary: `PATH` first, then the configured candidates.
    pub fn discover(config: &EncoderConfig) -> Self {
        let binary = locate_ffmpeg(config);
        match &binary {
            Some(path) => tracing::debug!(binary = %path.display(), "Resolved ffmpeg"),
            None => tracing::debug!(candidates = config.ffmpeg_candidates.len(), "No ffmpeg found"),
        }
        Self {
            binary,
            library_path: child_library_path(&config.extra_library_paths),
        }
    }

    /// Use an explicit binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
            library_path: None,
        }
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    pub fn library_path(&self) -> Option<&str> {
        self.library_path.as_deref()
    }

    /// ffprobe to pair with this ffmpeg: the configured one, else the
    /// sibling of the resolved binary, else whatever `PATH` has.
    pub fn ffprobe_path(&self, config: &EncoderConfig) -> PathBuf {
        if let Some(explicit) = &config.ffprobe {
            return explicit.clone();
        }
        self.binary
            .as_deref()
            .and_then(Path::parent)
            .map(|dir| dir.join("ffprobe"))
            .filter(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from("ffprobe"))
    }

    fn command(&self) -> ReelResult<Command> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| ReelError::config(install_remediation()))?;
        let mut cmd = Command::new(binary);
        if let Some(library_path) = &self.library_path {
            cmd.env("LD_LIBRARY_PATH", library_path);
        }
        Ok(cmd)
    }
}

impl RenderBackend for FfmpegBackend {
    fn render(
        &self,
        invocation: &EncoderInvocation,
        progress: Option<ProgressCallback>,
    ) -> ReelResult<()> {
        tracing::debug!(args = ?invocation.args, "Running ffmpeg");
        let mut cmd = self.command()?;
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = std::time::Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| ReelError::render(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            args_len = invocation.args.len(),
            total_frames = invocation.total_frames,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::render("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::render("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        if let Some(cb) = &progress {
            cb(RenderProgress {
                progress: 0.0,
                frames_rendered: 0,
                total_frames: invocation.total_frames,
                eta_secs: 0.0,
                stage: RenderStage::Preparing,
            });
        }

        let read_result = read_progress(
            BufReader::new(stdout),
            progress.as_ref(),
            invocation,
            start,
        );

        if let Err(e) = read_result {
            // Stop ffmpeg before anything cleans up its output.
            if let Err(kill_err) = child.kill() {
                tracing::warn!(error = %kill_err, "Failed to kill ffmpeg");
            }
            let _ = child.wait();
            let stderr_output = join_stderr(stderr_task);
            return Err(ReelError::render_with_diagnostics(
                format!("Failed reading ffmpeg progress: {e}"),
                diagnostic_tail(&stderr_output),
            ));
        }

        let status = child
            .wait()
            .map_err(|e| ReelError::render(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = join_stderr(stderr_task);

        if !status.success() {
            tracing::error!(%status, elapsed_secs = start.elapsed().as_secs_f64(), "ffmpeg failed");
            return Err(ReelError::render_with_diagnostics(
                format!("ffmpeg exited with {status}"),
                diagnostic_tail(&stderr_output),
            ));
        }

        if let Some(cb) = &progress {
            cb(RenderProgress {
                progress: 1.0,
                frames_rendered: invocation.total_frames,
                total_frames: invocation.total_frames,
                eta_secs: 0.0,
                stage: RenderStage::Complete,
            });
        }

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            output = %invocation.output_path.display(),
            "ffmpeg finished"
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Forward `-progress` blocks to the callback until ffmpeg closes stdout.
fn read_progress(
    mut reader: impl BufRead,
    progress: Option<&ProgressCallback>,
    invocation: &EncoderInvocation,
    start: std::time::Instant,
) -> std::io::Result<()> {
    let mut line = String::new();
    let mut state = ProgressState::default();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }

        if let Some((key, value)) = line.trim().split_once('=') {
            state.update(key, value);
            if key == "progress" {
                if let Some(cb) = progress {
                    cb(progress_report(
                        &state,
                        invocation.total_frames,
                        invocation.target_secs,
                        start.elapsed().as_secs_f64(),
                    ));
                }
            }
        }
    }
}

fn join_stderr(task: std::thread::JoinHandle<String>) -> String {
    task.join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
}

fn locate_ffmpeg(config: &EncoderConfig) -> Option<PathBuf> {
    which("ffmpeg")
        .into_iter()
        .chain(config.ffmpeg_candidates.iter().cloned())
        .find(|candidate| runs_version(candidate))
}

fn which(binary: &str) -> Option<PathBuf> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} 2>/dev/null"))
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?;
    let path = path.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

fn runs_version(binary: &Path) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// `LD_LIBRARY_PATH` for encoder children: extra directories that exist,
/// followed by the inherited value. `None` leaves the environment alone.
fn child_library_path(extra: &[PathBuf]) -> Option<String> {
    let mut parts: Vec<String> = extra
        .iter()
        .filter(|dir| dir.is_dir())
        .map(|dir| dir.to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    if let Ok(inherited) = std::env::var("LD_LIBRARY_PATH") {
        parts.extend(inherited.split(':').filter(|p| !p.is_empty()).map(String::from));
    }
    let mut seen = std::collections::HashSet::new();
    parts.retain(|p| seen.insert(p.clone()));
    Some(parts.join(":"))
}

fn diagnostic_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[start..].join("\n")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

fn progress_report(
    state: &ProgressState,
    total_frames: u64,
    expected_duration_secs: f64,
    elapsed_secs: f64,
) -> RenderProgress {
    let progress = if expected_duration_secs <= 0.0 {
        0.0
    } else {
        (state.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    };

    let frames_rendered = (progress * total_frames as f64).round() as u64;
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    RenderProgress {
        progress: if state.complete { 1.0 } else { progress },
        frames_rendered,
        total_frames,
        eta_secs,
        stage: if state.complete {
            RenderStage::Finalizing
        } else {
            RenderStage::Rendering
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ResolvedGlyph, ResolvedMedia};
    use crate::duration::reconcile;
    use crate::filter_graph::FilterGraphBuilder;
    use reelsmith_common::config::FontConfig;
    use reelsmith_scene_model::{BackgroundSource, EmojiElement, SceneDescription};

    fn invocation(background: BackgroundSource, audio: bool, glyphs: usize) -> EncoderInvocation {
        let mut scene = SceneDescription::new(background, 10.0, "abc");
        for i in 0..glyphs {
            scene
                .emoji_elements
                .push(EmojiElement::new("😂", 10 * i as i32, 10, 64));
        }
        let assets = ResolvedAssets {
            background: ResolvedMedia {
                path: "/w/temp_bg_abc.mp4".into(),
                probed_secs: Some(3.0),
            },
            audio: audio.then(|| ResolvedMedia {
                path: "/w/temp_audio_abc.mp3".into(),
                probed_secs: Some(30.0),
            }),
            glyphs: (0..glyphs)
                .map(|i| ResolvedGlyph {
                    element_index: i,
                    path: format!("/w/emoji_abc_{i}.png").into(),
                })
                .collect(),
            warnings: vec![],
        };
        let plan = reconcile(
            &scene.background,
            assets.background.probed_secs,
            assets.audio.as_ref().map(|a| a.probed_secs),
            10.0,
        );
        let graph = FilterGraphBuilder::new(&scene, &assets, &plan, &FontConfig::default()).build();
        build_invocation(
            &assets,
            &graph,
            &plan,
            &EncoderConfig::default(),
            !audio,
            Path::new("/w/final_abc.mp4"),
        )
    }

    fn window<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.iter()
            .enumerate()
            .filter(|(_, a)| *a == flag)
            .filter_map(|(i, _)| args.get(i + 1).map(String::as_str))
            .collect()
    }

    #[test]
    fn test_short_video_loops_at_stream_level() {
        let inv = invocation(BackgroundSource::Video("bg.mp4".into()), false, 0);
        let joined = inv.args.join(" ");
        assert!(joined.contains("-stream_loop -1 -i /w/temp_bg_abc.mp4"));
        assert_eq!(window(&inv.args, "-map"), vec!["[v]", "0:a?"]);
        assert_eq!(window(&inv.args, "-t"), vec!["10"]);
        assert_eq!(inv.total_frames, 250);
        assert_eq!(inv.args.last().map(String::as_str), Some("/w/final_abc.mp4"));
    }

    #[test]
    fn test_video_is_looped_even_when_long_enough() {
        let scene = SceneDescription::new(BackgroundSource::Video("bg.mp4".into()), 10.0, "abc");
        let assets = ResolvedAssets {
            background: ResolvedMedia {
                path: "/w/temp_bg_abc.mp4".into(),
                probed_secs: None,
            },
            audio: None,
            glyphs: vec![],
            warnings: vec![],
        };
        let plan = reconcile(&scene.background, None, None, 10.0);
        assert_eq!(plan.background, BackgroundPlan::Trim);
        let graph = FilterGraphBuilder::new(&scene, &assets, &plan, &FontConfig::default()).build();
        let inv = build_invocation(
            &assets,
            &graph,
            &plan,
            &EncoderConfig::default(),
            false,
            Path::new("/w/final_abc.mp4"),
        );
        assert_eq!(window(&inv.args, "-map"), vec!["[v]"]);
        assert!(inv
            .args
            .join(" ")
            .contains("-stream_loop -1 -i /w/temp_bg_abc.mp4"));
        assert!(graph.render().contains("trim=duration=10,setpts=PTS-STARTPTS[v]"));
    }

    #[test]
    fn test_output_contract() {
        let inv = invocation(BackgroundSource::Video("bg.mp4".into()), true, 0);
        assert_eq!(window(&inv.args, "-c:v"), vec!["libx264"]);
        assert_eq!(window(&inv.args, "-c:a"), vec!["aac"]);
        assert_eq!(window(&inv.args, "-b:a"), vec!["128k"]);
        assert_eq!(window(&inv.args, "-r"), vec!["25"]);
        assert_eq!(window(&inv.args, "-pix_fmt"), vec!["yuv420p"]);
        assert_eq!(window(&inv.args, "-preset"), vec!["medium"]);
        assert_eq!(window(&inv.args, "-crf"), vec!["23"]);
    }

    #[test]
    fn test_inputs_follow_graph_numbering() {
        let inv = invocation(BackgroundSource::Image("bg.png".into()), true, 2);
        assert_eq!(
            window(&inv.args, "-i"),
            vec![
                "/w/temp_bg_abc.mp4",
                "/w/emoji_abc_0.png",
                "/w/emoji_abc_1.png",
                "/w/temp_audio_abc.mp3"
            ]
        );
        assert_eq!(window(&inv.args, "-loop"), vec!["1", "1", "1"]);
        assert_eq!(window(&inv.args, "-map"), vec!["[v]", "[a]"]);
        let graph = window(&inv.args, "-filter_complex")[0];
        assert!(graph.contains("[3:a]atrim=duration=10"));
    }

    #[test]
    fn test_progress_report_clamps_and_estimates() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "5000000");
        let report = progress_report(&state, 250, 10.0, 2.0);
        assert!((report.progress - 0.5).abs() < 1e-9);
        assert_eq!(report.frames_rendered, 125);
        assert!((report.eta_secs - 2.0).abs() < 1e-9);
        assert_eq!(report.stage, RenderStage::Rendering);

        state.update("out_time_ms", "99000000");
        state.update("progress", "end");
        let report = progress_report(&state, 250, 10.0, 4.0);
        assert!((report.progress - 1.0).abs() < 1e-9);
        assert_eq!(report.stage, RenderStage::Finalizing);
    }

    fn shell_invocation(script: &str) -> EncoderInvocation {
        EncoderInvocation {
            args: vec!["-c".into(), script.into()],
            output_path: PathBuf::from("/nonexistent/final_abc.mp4"),
            target_secs: 10.0,
            total_frames: 250,
        }
    }

    #[test]
    fn test_read_progress_reports_each_block() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p.stage));
        let input = "frame=10\nout_time_us=5000000\nprogress=continue\nout_time_us=10000000\nprogress=end\n";

        read_progress(
            std::io::Cursor::new(input),
            Some(&cb),
            &shell_invocation(""),
            std::time::Instant::now(),
        )
        .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![RenderStage::Rendering, RenderStage::Finalizing]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_progress_stops_the_encoder() {
        // Invalid UTF-8 on stdout, then a process that outlives the test if left running.
        let backend = FfmpegBackend::with_binary("sh");
        let inv = shell_invocation("echo 'bad output' >&2; printf '\\377\\376\\n'; exec sleep 30");

        let start = std::time::Instant::now();
        let err = backend.render(&inv, None).unwrap_err();

        assert!(start.elapsed().as_secs() < 20);
        assert!(matches!(err, ReelError::Render { .. }));
        assert!(err.to_string().contains("Failed reading ffmpeg progress"));
        assert_eq!(err.diagnostics(), Some("bad output"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let backend = FfmpegBackend::with_binary("sh");
        let inv = shell_invocation("echo 'Invalid filter' >&2; exit 1");

        let err = backend.render(&inv, None).unwrap_err();
        assert!(err.to_string().contains("ffmpeg exited with"));
        assert_eq!(err.diagnostics(), Some("Invalid filter"));
    }

    #[test]
    fn test_diagnostic_tail_keeps_last_lines() {
        let stderr: String = (0..100).map(|i| format!("line {i}\n")).collect();
        let tail = diagnostic_tail(&stderr);
        assert_eq!(tail.lines().count(), DIAGNOSTIC_TAIL_LINES);
        assert!(tail.ends_with("line 99"));
    }

    #[test]
    fn test_missing_binary_is_a_config_error() {
        let backend = FfmpegBackend {
            binary: None,
            library_path: None,
        };
        assert!(!backend.is_available());
        let inv = invocation(BackgroundSource::Video("bg.mp4".into()), false, 0);
        let err = backend.render(&inv, None).unwrap_err();
        assert!(matches!(err, ReelError::Config { .. }));
        assert!(err.to_string().contains("apt-get install ffmpeg"));
    }

    #[test]
    fn test_library_path_skips_missing_dirs() {
        assert_eq!(child_library_path(&[]), None);
        assert_eq!(
            child_library_path(&[PathBuf::from("/nonexistent/reelsmith/lib")]),
            None
        );
        let dir = tempfile::tempdir().unwrap();
        let value = child_library_path(&[dir.path().to_path_buf()]).unwrap();
        assert!(value.starts_with(&*dir.path().to_string_lossy()));
    }
}
