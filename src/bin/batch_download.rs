//! Batch download binary: every profile of a list file, one after another.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use ig_downloader::commands;
use ig_downloader::config::{Config, DownloadOptions, CONFIG_FILE};
use ig_downloader::logging::{self, LogSettings};

#[derive(Parser)]
#[command(name = "batch_download")]
#[command(about = "Download all Instagram profiles listed in a file")]
struct Cli {
    /// Profile list, one username or url per line
    file: PathBuf,

    /// Seconds to wait between profiles
    #[arg(short, long)]
    delay: Option<u64>,

    /// Download every content category
    #[arg(long)]
    all: bool,

    /// Do not write failed_profiles.txt
    #[arg(long)]
    no_save_failed: bool,

    #[arg(short, long, env = "IG_CONFIG", default_value = CONFIG_FILE)]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&LogSettings::from_env(), false);

    let config = Config::load(&cli.config_file);
    let options = if cli.all {
        DownloadOptions::all()
    } else {
        DownloadOptions::from_config(&config)
    };

    let report =
        commands::batch_run(&config, &cli.file, cli.delay, options, !cli.no_save_failed).await?;
    if report.stats.completed == 0 && report.stats.failed > 0 {
        anyhow::bail!("no profile could be downloaded");
    }
    Ok(())
}
