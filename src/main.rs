//! Instagram downloader CLI - main entry point
//!
//! Without a subcommand the interactive menu starts.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use ig_downloader::config::{Config, DownloadOptions, CONFIG_FILE};
use ig_downloader::logging::{self, LogSettings};
use ig_downloader::utils::print_header;
use ig_downloader::{commands, metrics};
use tracing::warn;

#[derive(Parser)]
#[command(name = "ig_downloader")]
#[command(about = "Download posts, stories, highlights, tagged posts and IGTV of Instagram profiles", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// YAML configuration file
    #[arg(short, long, env = "IG_CONFIG", default_value = CONFIG_FILE, global = true)]
    config_file: PathBuf,

    /// Print info-level logs to the console
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Profile to download; shorthand for `download <PROFILE>`
    profile: Option<String>,

    #[command(flatten)]
    categories: CategoryFlags,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Clone, Default)]
struct CategoryFlags {
    /// Download posts (default when no category is chosen)
    #[arg(long)]
    posts: bool,

    /// Download current stories (requires login)
    #[arg(long)]
    stories: bool,

    /// Download story highlights
    #[arg(long)]
    highlights: bool,

    /// Download posts the profile is tagged in
    #[arg(long)]
    tagged: bool,

    /// Download IGTV videos
    #[arg(long)]
    igtv: bool,

    /// Download everything
    #[arg(long)]
    all: bool,
}

impl CategoryFlags {
    fn options(&self, fallback: DownloadOptions) -> DownloadOptions {
        commands::select_options(
            self.posts,
            self.stories,
            self.highlights,
            self.tagged,
            self.igtv,
            self.all,
            fallback,
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download a single profile (username, @username or profile url)
    Download {
        profile: String,

        #[command(flatten)]
        categories: CategoryFlags,
    },

    /// Log in with username and password and save the session
    Login {
        /// Instagram username (prompted when missing)
        #[arg(short, long, env = "INSTAGRAM_USERNAME")]
        username: Option<String>,
    },

    /// Log in with cookies exported from a logged-in browser
    ImportCookies {
        /// JSON cookie export
        file: PathBuf,

        /// Username, when the export has no ds_user cookie
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Remove the saved session
    Logout,

    /// Download every profile listed in a file
    Batch {
        /// Profile list, one per line
        #[arg(required_unless_present = "create_example")]
        file: Option<PathBuf>,

        /// Seconds to wait between profiles (default: batch_delay)
        #[arg(short, long)]
        delay: Option<u64>,

        /// Do not write failed_profiles.txt
        #[arg(long, default_value_t = false)]
        no_save_failed: bool,

        /// Write config/profiles.example.txt and exit
        #[arg(long, default_value_t = false)]
        create_example: bool,

        #[command(flatten)]
        categories: CategoryFlags,
    },

    /// Show the effective configuration
    Config {
        /// Also write it to the configuration file
        #[arg(long, default_value_t = false)]
        save: bool,
    },

    /// Numbered menu (default)
    Interactive,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Download { .. } => "download",
            Commands::Login { .. } => "login",
            Commands::ImportCookies { .. } => "import_cookies",
            Commands::Logout => "logout",
            Commands::Batch { .. } => "batch",
            Commands::Config { .. } => "config",
            Commands::Interactive => "interactive",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Some(path) = logging::init(&LogSettings::from_env(), cli.verbose) {
        tracing::debug!("Logging to {}", path.display());
    }

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    print_header(
        &format!("📸 Instagram Downloader v{}", env!("CARGO_PKG_VERSION")),
        '=',
    );

    let config = Config::load(&cli.config_file);
    let command = match (cli.command, cli.profile) {
        (Some(command), _) => command,
        (None, Some(profile)) => Commands::Download {
            profile,
            categories: cli.categories,
        },
        (None, None) => Commands::Interactive,
    };

    let command_name = command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(config, command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(config: Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Download {
            profile,
            categories,
        } => {
            let options = categories.options(DownloadOptions::posts_only());
            let stats = commands::download_run(&config, &profile, options).await?;
            if !stats.success && !stats.interrupted {
                anyhow::bail!(
                    "download of {} failed: {}",
                    stats.username,
                    stats.first_error().unwrap_or("unknown error")
                );
            }
        }
        Commands::Login { username } => {
            commands::login_run(&config, username.as_deref()).await?;
        }
        Commands::ImportCookies { file, username } => {
            commands::import_cookies(&config, &file, username.as_deref())?;
        }
        Commands::Logout => {
            commands::logout(&config)?;
        }
        Commands::Batch {
            file,
            delay,
            no_save_failed,
            create_example,
            categories,
        } => {
            if create_example {
                ig_downloader::batch::create_example_profiles_file(None)?;
                return Ok(());
            }
            let Some(file) = file else {
                anyhow::bail!("a profile list file is required");
            };
            let options = categories.options(DownloadOptions::from_config(&config));
            commands::batch_run(&config, &file, delay, options, !no_save_failed).await?;
        }
        Commands::Config { save } => {
            commands::config_run(&config, save)?;
        }
        Commands::Interactive => {
            commands::interactive_run(config).await?;
        }
    }

    Ok(())
}
