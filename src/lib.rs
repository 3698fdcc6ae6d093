//! Instagram media downloader library
//!
//! This library provides tools to:
//! - Download posts, stories, highlights, tagged posts and IGTV of a profile
//! - Log in with a password (incl. 2FA) or browser cookies, and keep the
//!   session encrypted on disk
//! - Pace requests with an adaptive rate limiter
//! - Download many profiles from a list file
//! - Expose Prometheus metrics

pub mod auth;
pub mod batch;
pub mod config;
pub mod crypto;
pub mod downloader;
pub mod error;
pub mod instagram;
pub mod interrupt;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod session;
pub mod utils;

// Re-export common types
pub use auth::AuthManager;
pub use batch::{BatchDownloader, BatchReport, BatchStats};
pub use config::{Config, DownloadOptions};
pub use downloader::{DownloadStats, Downloader};
pub use error::{Error, Result};
pub use instagram::{InstagramClient, MediaSource};
pub use interrupt::Interrupt;
pub use session::{SessionLock, SessionStore};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
