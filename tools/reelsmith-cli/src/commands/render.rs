//! Render one request.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::{ProgressCallback, RenderProgress, SceneRenderer};

use super::read_request;

/// Timestamp job id; only uses the filename-safe alphabet.
pub fn default_job_id() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string()
}

pub async fn run(
    mut config: AppConfig,
    request: PathBuf,
    job_id: Option<String>,
    work_dir: Option<PathBuf>,
    output_json: Option<PathBuf>,
) -> anyhow::Result<()> {
    let request = read_request(&request)?;
    let job_id = job_id.unwrap_or_else(default_job_id);
    if let Some(dir) = work_dir {
        config.work_dir = dir;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling render");
            on_signal.cancel();
        }
    });

    let renderer = SceneRenderer::builder(config).cancel_token(cancel).build();

    eprintln!("Rendering job {job_id} with {}", renderer.backend_name());
    eprintln!("  Work dir: {}", renderer.work_dir().root().display());

    let progress_cb: ProgressCallback = Box::new(|p: RenderProgress| {
        eprint!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.frames_rendered,
            p.total_frames,
            p.eta_secs,
        );
    });

    let outcome = match renderer
        .render_request(request, &job_id, Some(progress_cb))
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("\nRender failed: {e}");
            if let Some(diagnostics) = e.diagnostics() {
                eprintln!("{diagnostics}");
            }
            return Err(e.into());
        }
    };

    eprintln!("\nRender complete: {}", outcome.video_url);
    for warning in &outcome.warnings {
        eprintln!("  [WARN] {warning}");
    }

    let json = serde_json::to_string_pretty(&outcome)?;
    if let Some(path) = output_json {
        std::fs::write(&path, &json)?;
    }
    println!("{json}");
    Ok(())
}
