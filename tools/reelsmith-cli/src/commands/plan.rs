//! Print the render plan for a request.

use std::path::PathBuf;

use reelsmith_common::config::AppConfig;
use reelsmith_render_engine::{plan_render, scene_error, WorkDir};

use super::read_request;

pub fn run(config: AppConfig, request: PathBuf, job_id: String) -> anyhow::Result<()> {
    let scene = read_request(&request)?
        .into_scene(job_id)
        .map_err(scene_error)?;
    let work_dir = WorkDir::new(config.work_dir.clone());
    let plan = plan_render(&scene, &work_dir, &config)?;

    println!("Job: {}", scene.job_id);
    println!("  Target duration: {}s", plan.duration.target_secs);
    println!("  Background: {:?}", plan.duration.background);
    match &plan.duration.audio {
        Some(audio) => println!("  Audio: {audio:?}"),
        None => println!("  Audio: from background (if any)"),
    }
    println!("  Overlays: {}", plan.graph.overlay_count());
    println!();
    println!("Filtergraph:");
    for chain in plan.graph.chains() {
        println!("  {chain}");
    }
    println!();
    println!("Encoder arguments:");
    println!("  {}", plan.invocation.args.join(" "));
    Ok(())
}
