use std::path::{Path, PathBuf};

use colored::*;
use tokio::sync::watch;

use crate::config::RenderConfig;
use crate::error::RenderResult;
use crate::manifest::ProjectManifest;
use crate::pipeline::{self, PipelineOutcome};

/// CLI entry point for `reelcraft render`: loads config and manifest, runs
/// the pipeline to completion, and prints a one-line summary.
pub async fn run(
    manifest_path: &Path,
    config_path: Option<&Path>,
    run_dir: PathBuf,
    workers: Option<usize>,
) -> RenderResult<()> {
    let config = match config_path {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };
    let manifest = ProjectManifest::load(manifest_path)?;
    let worker_count = workers.unwrap_or_else(pipeline::default_worker_count);

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let ctrl_c_tx = _cancel_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(true);
        }
    });

    let PipelineOutcome {
        final_path,
        scene_count,
        total_duration_secs,
    } = pipeline::run(&config, &manifest, run_dir, worker_count, cancel_rx).await?;

    eprintln!(
        "{} {} scenes, {:.1}s total → {}",
        "done:".green().bold(),
        scene_count,
        total_duration_secs,
        final_path.display()
    );
    Ok(())
}
