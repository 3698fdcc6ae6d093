//! Session initialization binary: log in once and save the session.

use clap::Parser;
use std::path::PathBuf;

use ig_downloader::commands;
use ig_downloader::config::{Config, CONFIG_FILE};
use ig_downloader::logging::{self, LogSettings};

#[derive(Parser)]
#[command(name = "login")]
#[command(about = "Log in to Instagram and save the session")]
struct Cli {
    /// Instagram username (prompted when missing)
    #[arg(short, long, env = "INSTAGRAM_USERNAME")]
    username: Option<String>,

    /// Import cookies from a browser export instead of using a password
    #[arg(long)]
    cookies: Option<PathBuf>,

    #[arg(short, long, env = "IG_CONFIG", default_value = CONFIG_FILE)]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&LogSettings::from_env(), false);

    let config = Config::load(&cli.config_file);
    match cli.cookies {
        Some(file) => commands::import_cookies(&config, file, cli.username.as_deref())?,
        None => commands::login_run(&config, cli.username.as_deref()).await?,
    };
    Ok(())
}
