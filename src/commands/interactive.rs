//! Numbered menu over the other commands.

use std::io;
use std::path::PathBuf;

use tracing::{error, info};

use crate::auth::{AuthManager, Prompter, StdinPrompter};
use crate::batch::create_example_profiles_file;
use crate::config::{Config, DownloadOptions};
use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::session::SessionLock;
use crate::utils::print_separator;

use super::{batch, download, login, restore_session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Exit,
    Download,
    ImportCookies,
    Login,
    DownloadLoggedIn,
    Batch,
    Settings,
    Logout,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "0" => Some(MenuChoice::Exit),
            "1" => Some(MenuChoice::Download),
            "2" => Some(MenuChoice::ImportCookies),
            "3" => Some(MenuChoice::Login),
            "4" => Some(MenuChoice::DownloadLoggedIn),
            "5" => Some(MenuChoice::Batch),
            "6" => Some(MenuChoice::Settings),
            "7" => Some(MenuChoice::Logout),
            _ => None,
        }
    }
}

/// `t`/`tak` are accepted alongside `y`/`yes`. Anything unrecognised keeps
/// `default`.
pub fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "t" | "tak" | "1" | "true" => true,
        "n" | "no" | "nie" | "0" | "false" => false,
        _ => default,
    }
}

/// Presets of the "what to download" submenu; `5` (custom) returns `None`.
pub fn preset_options(choice: &str) -> Option<DownloadOptions> {
    match choice.trim() {
        "1" => Some(DownloadOptions::posts_only()),
        "2" => Some(DownloadOptions {
            stories: true,
            ..DownloadOptions::posts_only()
        }),
        "3" => Some(DownloadOptions {
            highlights: true,
            ..DownloadOptions::posts_only()
        }),
        "4" => Some(DownloadOptions::all()),
        _ => None,
    }
}

pub struct Interactive {
    config: Config,
    auth: AuthManager,
    prompter: Box<dyn Prompter>,
    interrupt: Interrupt,
}

/// Run the menu on stdin, holding the session lock until it exits. Ctrl-C
/// stops a running download; at a prompt it ends the program.
pub async fn run(config: Config) -> Result<()> {
    let _lock = SessionLock::acquire(&config.session_dir)?;
    let mut auth = AuthManager::from_config(&config)?;
    restore_session(&mut auth);
    Interactive::new(config, auth, StdinPrompter)
        .with_interrupt(Interrupt::ctrl_c())
        .run()
        .await
}

impl Interactive {
    pub fn new<P: Prompter + 'static>(config: Config, auth: AuthManager, prompter: P) -> Self {
        Self {
            config,
            auth,
            prompter: Box::new(prompter),
            interrupt: Interrupt::default(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Show the menu until the user exits or input ends.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.print_menu();
            let answer = match self.ask("\nChoose an option (0-7): ") {
                Ok(answer) => answer,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            let Some(choice) = MenuChoice::parse(&answer) else {
                println!("\n❌ Unknown option");
                continue;
            };
            if choice == MenuChoice::Exit {
                break;
            }

            match self.handle(choice).await {
                Ok(()) => {}
                Err(Error::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    error!("Menu action failed: {}", e);
                    println!("\n❌ {}", e);
                }
            }
        }

        println!("\n👋 Bye!");
        Ok(())
    }

    fn print_menu(&self) {
        println!();
        print_separator('=', Some(60));
        println!("{:^60}", "MAIN MENU");
        print_separator('=', Some(60));
        match self.auth.username().filter(|_| self.auth.is_logged_in()) {
            Some(user) => println!("🔓 Logged in as @{}", user),
            None => println!("🔒 Not logged in"),
        }
        println!("1. Download a profile");
        println!("2. Log in with browser cookies 🌐 (recommended)");
        println!("3. Log in (username/password)");
        println!("4. Download a profile (choose content, logged in)");
        println!("5. Batch download from a file");
        println!("6. Settings");
        println!("7. Log out");
        println!("0. Exit");
    }

    fn ask(&mut self, label: &str) -> io::Result<String> {
        self.prompter.ask(label, false).map(|s| s.trim().to_string())
    }

    async fn handle(&mut self, choice: MenuChoice) -> Result<()> {
        match choice {
            MenuChoice::Exit => Ok(()),
            MenuChoice::Download => {
                let target = self.ask("\n📥 Username or profile url: ")?;
                if target.is_empty() {
                    return Ok(());
                }
                let options = DownloadOptions::from_config(&self.config);
                download::download_with(&self.config, &self.auth, &self.interrupt, &target, options)
                    .await?;
                Ok(())
            }
            MenuChoice::ImportCookies => {
                let path = self.ask("\n🍪 Path to the cookie export (JSON): ")?;
                let username = self.ask("📧 Username (optional, Enter to skip): ")?;
                let username = Some(username.as_str()).filter(|u| !u.is_empty());
                self.auth.login_with_cookies(PathBuf::from(path), username)?;
                Ok(())
            }
            MenuChoice::Login => {
                login::login_with(&mut self.auth, None).await?;
                Ok(())
            }
            MenuChoice::DownloadLoggedIn => {
                if !self.auth.is_logged_in() {
                    println!("\n⚠️  Log in first (option 2 or 3)");
                    return Ok(());
                }
                let target = self.ask("\n📥 Username or profile url: ")?;
                if target.is_empty() {
                    return Ok(());
                }
                let options = self.ask_options()?;
                download::download_with(&self.config, &self.auth, &self.interrupt, &target, options)
                    .await?;
                Ok(())
            }
            MenuChoice::Batch => {
                let file = self.ask("\n📄 Path to the profile list: ")?;
                if file.is_empty() {
                    create_example_profiles_file(None)?;
                    return Ok(());
                }
                let delay = self.ask(&format!(
                    "⏱️  Delay between profiles in seconds (default {}): ",
                    self.config.batch_delay
                ))?;
                let delay = delay.parse::<u64>().ok();
                let options = DownloadOptions::from_config(&self.config);
                batch::run_with(
                    &self.config,
                    &self.auth,
                    &self.interrupt,
                    &PathBuf::from(file),
                    delay,
                    options,
                    true,
                )
                .await?;
                Ok(())
            }
            MenuChoice::Settings => self.configure(),
            MenuChoice::Logout => {
                self.auth.logout()?;
                println!("\n👋 Logged out");
                Ok(())
            }
        }
    }

    fn ask_options(&mut self) -> Result<DownloadOptions> {
        println!("\n📦 What to download?");
        println!("1. Posts only");
        println!("2. Posts + stories");
        println!("3. Posts + highlights");
        println!("4. Everything (posts, stories, highlights, tagged, IGTV)");
        println!("5. Custom");

        let choice = self.ask("\nChoose (1-5): ")?;
        if let Some(options) = preset_options(&choice) {
            return Ok(options);
        }
        if choice != "5" {
            println!("Unknown choice, downloading posts only");
            return Ok(DownloadOptions::posts_only());
        }

        let mut yes = |label: &str| -> Result<bool> { Ok(parse_yes_no(&self.ask(label)?, false)) };
        Ok(DownloadOptions {
            posts: yes("Posts? (y/n): ")?,
            stories: yes("Stories? (y/n): ")?,
            highlights: yes("Highlights? (y/n): ")?,
            tagged: yes("Tagged posts? (y/n): ")?,
            igtv: yes("IGTV? (y/n): ")?,
        })
    }

    /// Settings submenu. Empty answers keep the current values.
    fn configure(&mut self) -> Result<()> {
        println!();
        print_separator('=', Some(60));
        println!("{:^60}", "SETTINGS");
        print_separator('=', Some(60));

        let sleep = self.ask(&format!(
            "Delay between requests in seconds (current {}): ",
            self.config.sleep_time
        ))?;
        if !sleep.is_empty() {
            match sleep.parse::<f64>() {
                Ok(value) if value >= 0.0 => self.config.sleep_time = value,
                _ => println!("⚠️  Not a valid number, keeping {}", self.config.sleep_time),
            }
        }

        println!("\nMedia options:");
        let current = self.config.download_videos;
        self.config.download_videos =
            parse_yes_no(&self.ask(&format!("Download videos? (y/n, now {}): ", yn(current)))?, current);
        let current = self.config.download_comments;
        self.config.download_comments =
            parse_yes_no(&self.ask(&format!("Download comments? (y/n, now {}): ", yn(current)))?, current);
        let current = self.config.download_geotags;
        self.config.download_geotags =
            parse_yes_no(&self.ask(&format!("Keep geotags? (y/n, now {}): ", yn(current)))?, current);

        if parse_yes_no(&self.ask("\n💾 Save to the config file? (y/n): ")?, false) {
            let path = self.config.save_to_file(None)?;
            println!("💾 Saved to {}", path.display());
        }
        info!("Settings updated");
        println!("\n✅ Settings updated");
        Ok(())
    }
}

fn yn(value: bool) -> &'static str {
    if value {
        "y"
    } else {
        "n"
    }
}
