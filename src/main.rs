mod cli;
mod commands;
mod concat;
mod config;
mod error;
mod filtergraph;
mod geometry;
mod manifest;
mod mixer;
mod model;
mod overlay;
mod pipeline;
mod scene_render;
mod subprocess;
mod subtitle;
mod timeline;

use clap::Parser;
use cli::Cli;
use colored::*;
use error::RenderResult;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        if let Some(hint) = e.hint() {
            eprintln!("{} {}", "hint:".yellow().bold(), hint);
        }
        std::process::exit(1);
    }
}

/// Console + rolling-file sinks, gated on `RUST_LOG` so a plain invocation
/// stays quiet. The file appender rotates daily under `./logs/`; its guard is
/// leaked since this is a short-lived CLI process with one subscriber for
/// the whole run.
fn init_tracing() {
    if std::env::var("RUST_LOG").is_err() {
        return;
    }
    let file_appender = tracing_appender::rolling::daily("logs", "reelcraft.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    Box::leak(Box::new(guard));
    let writer = std::io::stderr.and(non_blocking);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init();
}

async fn run(cli: Cli) -> RenderResult<()> {
    match cli.command {
        cli::Command::Render {
            manifest,
            config,
            run_dir,
            workers,
        } => commands::render::run(&manifest, config.as_deref(), run_dir, workers).await,
    }
}
