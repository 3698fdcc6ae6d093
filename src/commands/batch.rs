//! Batch download from a profile list file.

use std::path::Path;

use crate::auth::AuthManager;
use crate::batch::{BatchDownloader, BatchReport};
use crate::config::{Config, DownloadOptions};
use crate::downloader::Downloader;
use crate::error::Result;
use crate::interrupt::Interrupt;
use crate::session::SessionLock;

use super::restore_session;

/// Download every profile listed in `file`. `delay` overrides the
/// configured pause between profiles. The session lock is held for the
/// whole batch.
pub async fn run<P: AsRef<Path>>(
    config: &Config,
    file: P,
    delay: Option<u64>,
    options: DownloadOptions,
    save_failed: bool,
) -> Result<BatchReport> {
    let _lock = SessionLock::acquire(&config.session_dir)?;
    let mut auth = AuthManager::from_config(config)?;
    restore_session(&mut auth);
    let interrupt = Interrupt::ctrl_c();
    run_with(config, &auth, &interrupt, file.as_ref(), delay, options, save_failed).await
}

pub(crate) async fn run_with(
    config: &Config,
    auth: &AuthManager,
    interrupt: &Interrupt,
    file: &Path,
    delay: Option<u64>,
    options: DownloadOptions,
    save_failed: bool,
) -> Result<BatchReport> {
    let downloader = Downloader::new(config, auth.client())?.with_interrupt(interrupt.clone());
    let mut batch = BatchDownloader::new(downloader, delay.unwrap_or(config.batch_delay));
    batch.download_from_file(file, &options, save_failed).await
}
