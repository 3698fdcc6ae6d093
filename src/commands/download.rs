//! Quick download of a single profile.

use crate::auth::AuthManager;
use crate::config::{Config, DownloadOptions};
use crate::downloader::{DownloadStats, Downloader};
use crate::error::Result;
use crate::interrupt::Interrupt;
use crate::session::SessionLock;

use super::restore_session;

/// Category selection from CLI flags. `--all` wins; with no flag at all
/// `fallback` is used.
pub fn select_options(
    posts: bool,
    stories: bool,
    highlights: bool,
    tagged: bool,
    igtv: bool,
    all: bool,
    fallback: DownloadOptions,
) -> DownloadOptions {
    if all {
        return DownloadOptions::all();
    }
    let picked = DownloadOptions {
        posts,
        stories,
        highlights,
        tagged,
        igtv,
    };
    if picked.any() {
        picked
    } else {
        fallback
    }
}

/// Download `target` with whatever session is saved. The session lock is
/// held until the download ends.
pub async fn run(config: &Config, target: &str, options: DownloadOptions) -> Result<DownloadStats> {
    let _lock = SessionLock::acquire(&config.session_dir)?;
    let mut auth = AuthManager::from_config(config)?;
    restore_session(&mut auth);
    download_with(config, &auth, &Interrupt::ctrl_c(), target, options).await
}

pub(crate) async fn download_with(
    config: &Config,
    auth: &AuthManager,
    interrupt: &Interrupt,
    target: &str,
    options: DownloadOptions,
) -> Result<DownloadStats> {
    let mut downloader = Downloader::new(config, auth.client())?.with_interrupt(interrupt.clone());
    Ok(downloader.download_profile(target, &options).await)
}
