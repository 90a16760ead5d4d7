//! Check encoder and storage setup.

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::executor::install_remediation;
use reelsmith_render_engine::{FfmpegBackend, RenderBackend};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    println!("Reelsmith System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = FfmpegBackend::discover(&config.encoder);
    let encoder_ok = ffmpeg.is_available();
    match ffmpeg.binary() {
        Some(binary) => println!("[OK] ffmpeg: {}", binary.display()),
        None => println!("[FAIL] ffmpeg: not found\n       {}", install_remediation()),
    }
    if let Some(path) = ffmpeg.library_path() {
        println!("     library path: {path}");
    }

    let ffprobe = ffmpeg.ffprobe_path(&config.encoder);
    let mut cmd = tokio::process::Command::new(&ffprobe);
    cmd.arg("-version");
    if let Some(path) = ffmpeg.library_path() {
        cmd.env("LD_LIBRARY_PATH", path);
    }
    let version = cmd.output().await;
    match version {
        Ok(out) if out.status.success() => println!("[OK] ffprobe: {}", ffprobe.display()),
        _ => println!(
            "[WARN] ffprobe: {} did not run; durations will fall back to the target",
            ffprobe.display()
        ),
    }

    println!("[OK] Work dir: {}", config.work_dir.display());
    match &config.storage {
        Some(storage) => println!(
            "[OK] Storage: {} (public: {})",
            storage.upload_base_url, storage.public_base_url
        ),
        None => println!(
            "[WARN] Storage: not configured; renders are served from {}",
            config.local_url_prefix
        ),
    }

    println!();
    if encoder_ok {
        println!("Encoder is available. Reelsmith is ready.");
    } else {
        println!("The encoder is missing. See above for fixes.");
    }
    Ok(())
}
