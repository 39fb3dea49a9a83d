//! dropview: a drag-and-drop viewer for images, glTF models, zip archives
//! and videos.

mod app;
mod assets;
mod config;
mod render;
mod scene;
mod ui;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dropview")]
#[command(about = "Drop an image, glTF model, video or zip archive to view it", long_about = None)]
struct Cli {
    /// Viewer config JSON (defaults to ./dropview.json when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// File to open instead of fetching the sample skybox
    file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = match config::ViewerConfig::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(1);
        }
    };

    app::run(config, cli.file);
}
