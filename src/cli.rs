use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "reelcraft",
    about = "Deterministic script-driven long-form video renderer",
    version,
    after_help = "\x1b[1mExample:\x1b[0m
  reelcraft render manifest.json --run-dir ./out"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a project manifest to a final MP4.
    Render {
        /// Path to the project manifest (.json, .yml, or .yaml).
        manifest: PathBuf,

        /// Path to a renderer.toml config file; defaults are used if omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Per-run working directory for scene/overlay/subtitle intermediates
        /// and the final MP4.
        #[arg(long, default_value = "./render-run")]
        run_dir: PathBuf,

        /// Maximum number of scenes to render in parallel (default: available CPU cores).
        #[arg(long)]
        workers: Option<usize>,
    },
}
