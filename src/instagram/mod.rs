//! Instagram web API access
//!
//! [`MediaSource`] is the seam the downloader talks to; [`InstagramClient`]
//! is the HTTP implementation.

pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod models;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{load_browser_cookies, InstagramClient, DEFAULT_BASE_URL};
pub use models::{Comment, Highlight, Location, MediaResource, Post, Profile, StoryItem};

/// Read access to a user's media.
///
/// Feeds are walked page by page inside the implementation and returned
/// whole.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Whether requests carry an authenticated session.
    fn is_logged_in(&self) -> bool;

    async fn profile(&self, username: &str) -> Result<Profile>;

    async fn posts(&self, profile: &Profile) -> Result<Vec<Post>>;

    async fn tagged_posts(&self, profile: &Profile) -> Result<Vec<Post>>;

    async fn igtv_posts(&self, profile: &Profile) -> Result<Vec<Post>>;

    /// Currently visible stories. Requires a login.
    async fn stories(&self, profile: &Profile) -> Result<Vec<StoryItem>>;

    async fn highlights(&self, profile: &Profile) -> Result<Vec<Highlight>>;

    async fn highlight_items(&self, highlight: &Highlight) -> Result<Vec<StoryItem>>;

    async fn comments(&self, post: &Post) -> Result<Vec<Comment>>;

    /// Download a media file (absolute CDN url).
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// Download a media file straight into `dest`, returning its size.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let bytes = self.fetch_bytes(url).await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
