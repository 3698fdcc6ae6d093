//! Profile downloads: posts, stories, highlights, tagged posts and IGTV.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DownloadOptions};
use crate::error::{Error, Result};
use crate::instagram::{MediaResource, MediaSource, Post, Profile, StoryItem};
use crate::interrupt::Interrupt;
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::utils::{
    ensure_directory, extract_username_from_url, filename_timestamp, format_file_size,
    print_separator, safe_filename,
};

/// Rate-limit errors in a row before a category is abandoned.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

const BIO_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Posts,
    Stories,
    Highlights,
    Tagged,
    Igtv,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Posts,
        Category::Stories,
        Category::Highlights,
        Category::Tagged,
        Category::Igtv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Posts => "posts",
            Category::Stories => "stories",
            Category::Highlights => "highlights",
            Category::Tagged => "tagged",
            Category::Igtv => "igtv",
        }
    }

    /// Suffix of the per-category directory, appended to the username.
    pub fn dir_suffix(&self) -> &'static str {
        match self {
            Category::Posts => "",
            Category::Stories => "_stories",
            Category::Highlights => "_highlights",
            Category::Tagged => "_tagged",
            Category::Igtv => "_igtv",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Category::Posts => "📸",
            Category::Stories => "📱",
            Category::Highlights => "⭐",
            Category::Tagged => "🏷️",
            Category::Igtv => "📺",
        }
    }

    fn enabled(&self, options: &DownloadOptions) -> bool {
        match self {
            Category::Posts => options.posts,
            Category::Stories => options.stories,
            Category::Highlights => options.highlights,
            Category::Tagged => options.tagged,
            Category::Igtv => options.igtv,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub posts: usize,
    pub stories: usize,
    pub highlights: usize,
    pub tagged: usize,
    pub igtv: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::Posts => self.posts,
            Category::Stories => self.stories,
            Category::Highlights => self.highlights,
            Category::Tagged => self.tagged,
            Category::Igtv => self.igtv,
        }
    }

    fn add(&mut self, category: Category, count: usize) {
        let slot = match category {
            Category::Posts => &mut self.posts,
            Category::Stories => &mut self.stories,
            Category::Highlights => &mut self.highlights,
            Category::Tagged => &mut self.tagged,
            Category::Igtv => &mut self.igtv,
        };
        *slot += count;
    }

    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// Outcome of one profile download.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadStats {
    pub username: String,
    /// The profile was resolved and every enabled category was attempted.
    pub success: bool,
    pub downloaded: CategoryCounts,
    pub errors: Vec<String>,
    pub interrupted: bool,
}

impl DownloadStats {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            ..Default::default()
        }
    }

    pub fn total(&self) -> usize {
        self.downloaded.total()
    }

    /// First recorded error, used in batch summaries.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// What is saved next to the media files.
#[derive(Debug, Clone)]
struct SaveSettings {
    videos: bool,
    thumbnails: bool,
    geotags: bool,
    comments: bool,
    metadata: bool,
}

impl SaveSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            videos: config.download_videos,
            thumbnails: config.download_thumbnails,
            geotags: config.download_geotags,
            comments: config.download_comments,
            metadata: config.save_metadata,
        }
    }
}

enum MediaItem {
    Post(Post),
    Story(StoryItem),
}

impl MediaItem {
    fn label(&self) -> &str {
        match self {
            MediaItem::Post(post) => &post.shortcode,
            MediaItem::Story(item) => &item.id,
        }
    }
}

pub struct Downloader {
    source: Arc<dyn MediaSource>,
    rate_limiter: RateLimiter,
    download_dir: PathBuf,
    settings: SaveSettings,
    interrupt: Interrupt,
}

impl Downloader {
    pub fn new(config: &Config, source: Arc<dyn MediaSource>) -> Result<Self> {
        let download_dir = ensure_directory(&config.download_dir)?;
        Ok(Self {
            source,
            rate_limiter: RateLimiter::new(
                config.sleep_time,
                config.min_sleep_time,
                config.max_sleep_time,
            ),
            download_dir,
            settings: SaveSettings::from_config(config),
            interrupt: Interrupt::default(),
        })
    }

    /// Stop downloads when `interrupt` fires.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn rate_limiter_mut(&mut self) -> &mut RateLimiter {
        &mut self.rate_limiter
    }

    /// Directory a category of `username` is saved into.
    pub fn category_dir(&self, username: &str, category: Category) -> PathBuf {
        self.download_dir
            .join(format!("{}{}", username, category.dir_suffix()))
    }

    /// Download everything `options` enables for `target` (a username or a
    /// profile url). A fired interrupt stops the download and marks it
    /// interrupted.
    pub async fn download_profile(
        &mut self,
        target: &str,
        options: &DownloadOptions,
    ) -> DownloadStats {
        let username = match extract_username_from_url(target) {
            Ok(username) => username,
            Err(e) => {
                println!("❌ {}", e);
                let mut stats = DownloadStats::new(target.trim());
                stats.errors.push(e.to_string());
                return stats;
            }
        };

        let mut stats = DownloadStats::new(&username);
        println!("\n📥 Downloading profile: @{}", username);
        if !self.source.is_logged_in() {
            println!("⚠️  Not logged in: private profiles and stories are unavailable");
        }

        let interrupt = self.interrupt.clone();
        let cancelled = tokio::select! {
            _ = self.run(&username, options, &mut stats) => false,
            _ = interrupt.wait() => true,
        };
        if cancelled {
            println!("\n⚠️  Download interrupted by user");
            stats.interrupted = true;
        }

        if stats.interrupted {
            warn!(username = %username, "Download interrupted");
        } else if stats.success {
            print_summary(&stats);
        }
        stats
    }

    async fn run(&mut self, username: &str, options: &DownloadOptions, stats: &mut DownloadStats) {
        let profile = match self.source.profile(username).await {
            Ok(profile) => profile,
            Err(Error::Interrupted) => {
                stats.interrupted = true;
                return;
            }
            Err(e) => {
                let message = match &e {
                    Error::ProfileNotFound(_) => format!("Profile @{} does not exist", username),
                    Error::ConnectionError(_) => {
                        format!("{} (check your network connection)", e)
                    }
                    _ => e.to_string(),
                };
                error!(username = %username, "Profile lookup failed: {}", e);
                println!("❌ {}", message);
                if e.is_rate_limit() {
                    metrics::record_rate_limit_hit();
                }
                stats.errors.push(message);
                return;
            }
        };

        display_profile_info(&profile);
        if profile.is_private && !self.source.is_logged_in() {
            println!("🔒 Private profile: log in as a follower to see its media");
        }

        for category in Category::ALL {
            if !category.enabled(options) {
                continue;
            }
            match self.download_category(category, &profile).await {
                Ok(count) => stats.downloaded.add(category, count),
                Err(Error::Interrupted) => {
                    stats.interrupted = true;
                    return;
                }
                Err(e) => {
                    error!(username = %username, %category, "Download failed: {}", e);
                    println!("❌ Failed to download {}: {}", category, e);
                    if e.is_rate_limit() {
                        metrics::record_rate_limit_hit();
                    }
                    stats.errors.push(format!("{}: {}", category, e));
                }
            }
        }

        stats.success = true;
    }

    async fn download_category(&mut self, category: Category, profile: &Profile) -> Result<usize> {
        let target = ensure_directory(self.category_dir(&profile.username, category))?;
        println!("\n{} Downloading {}...", category.icon(), category);

        let items: Vec<MediaItem> = match category {
            Category::Posts => wrap_posts(self.source.posts(profile).await?),
            Category::Tagged => wrap_posts(self.source.tagged_posts(profile).await?),
            Category::Igtv => wrap_posts(self.source.igtv_posts(profile).await?),
            Category::Stories => {
                if !self.source.is_logged_in() {
                    println!("⚠️  Stories require a login, skipping");
                    return Ok(0);
                }
                wrap_stories(self.source.stories(profile).await?)
            }
            Category::Highlights => {
                let mut items = Vec::new();
                for highlight in self.source.highlights(profile).await? {
                    match self.source.highlight_items(&highlight).await {
                        Ok(found) => {
                            debug!(title = %highlight.title, "{} highlight items", found.len());
                            items.extend(wrap_stories(found));
                        }
                        Err(Error::Interrupted) => return Err(Error::Interrupted),
                        Err(e) => warn!(title = %highlight.title, "Skipping highlight: {}", e),
                    }
                }
                items
            }
        };

        if items.is_empty() {
            println!("   Nothing to download");
            return Ok(0);
        }

        let count = self.download_items(category, &items, &target).await?;
        println!("✅ {}: {}/{} saved to {}", category, count, items.len(), target.display());
        Ok(count)
    }

    async fn download_items(
        &mut self,
        category: Category,
        items: &[MediaItem],
        target: &Path,
    ) -> Result<usize> {
        let total = items.len();
        let mut count = 0;
        let mut consecutive_errors = 0;

        for (idx, item) in items.iter().enumerate() {
            let outcome = match item {
                MediaItem::Post(post) => self.save_post(post, target).await,
                MediaItem::Story(story) => self.save_story_item(story, target).await,
            };

            match outcome {
                Ok(()) => {
                    count += 1;
                    consecutive_errors = 0;
                    metrics::record_media_downloaded(category.name());
                    self.rate_limiter.on_success();
                    self.rate_limiter.wait("Delay between items").await;
                }
                Err(Error::Interrupted) => return Err(Error::Interrupted),
                Err(e) if e.is_not_found() => {
                    debug!(item = item.label(), "Item no longer available, skipped");
                }
                Err(e) if e.is_rate_limit() => {
                    consecutive_errors += 1;
                    metrics::record_rate_limit_hit();
                    self.rate_limiter.on_error(true);
                    warn!(item = item.label(), "Rate limited: {}", e);

                    if e.is_forbidden() {
                        println!("🚫 Instagram blocked the requests (403). Try again later or log in.");
                        break;
                    }
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        println!(
                            "🛑 {} errors in a row, stopping {}",
                            consecutive_errors, category
                        );
                        break;
                    }
                    println!(
                        "⏳ Rate limited, waiting {:.0}s...",
                        self.rate_limiter.effective_delay().as_secs_f64()
                    );
                    self.rate_limiter.wait("Backoff").await;
                }
                Err(e) => {
                    error!(item = item.label(), "Failed to save: {}", e);
                    println!("⚠️  Skipped {}: {}", item.label(), e);
                    self.rate_limiter.on_error(false);
                }
            }

            if (idx + 1) % 10 == 0 {
                info!(%category, "Progress {}/{}", idx + 1, total);
            }
        }

        Ok(count)
    }

    async fn save_post(&self, post: &Post, target: &Path) -> Result<()> {
        if post.resources.is_empty() {
            return Err(Error::NotFound(format!("post {} has no media", post.shortcode)));
        }

        let stem = format!(
            "{}_{}",
            filename_timestamp(&post.taken_at),
            safe_filename(&post.shortcode, 64)
        );
        let numbered = post.resources.len() > 1;
        for (idx, resource) in post.resources.iter().enumerate() {
            let name = if numbered {
                format!("{}_{}", stem, idx + 1)
            } else {
                stem.clone()
            };
            self.save_resource(resource, target, &name).await?;
        }

        if self.settings.metadata {
            write_json(
                &target.join(format!("{}.json", stem)),
                &post.metadata(self.settings.geotags),
            )?;
        }

        if self.settings.comments && post.comment_count > 0 {
            let comments = self.source.comments(post).await?;
            write_json(&target.join(format!("{}_comments.json", stem)), &comments)?;
        }
        Ok(())
    }

    async fn save_story_item(&self, item: &StoryItem, target: &Path) -> Result<()> {
        let name = format!(
            "{}_{}",
            filename_timestamp(&item.taken_at),
            safe_filename(&item.id, 64)
        );
        self.save_resource(&item.resource, target, &name).await
    }

    async fn save_resource(&self, resource: &MediaResource, target: &Path, name: &str) -> Result<()> {
        if !resource.is_video {
            self.save_url(&resource.url, &target.join(format!("{}.jpg", name)))
                .await?;
            return Ok(());
        }

        if self.settings.videos {
            self.save_url(&resource.url, &target.join(format!("{}.mp4", name)))
                .await?;
        }
        if self.settings.thumbnails {
            if let Some(thumb) = &resource.thumbnail_url {
                self.save_url(thumb, &target.join(format!("{}.jpg", name)))
                    .await?;
            }
        }
        Ok(())
    }

    /// Fetch `url` into `path` unless the file already exists.
    async fn save_url(&self, url: &str, path: &Path) -> Result<bool> {
        if path.exists() {
            debug!(path = %path.display(), "Already downloaded");
            return Ok(false);
        }

        let mut partial = path.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        let size = match self.source.download(url, &partial).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, path)?;
        debug!(path = %path.display(), size = %format_file_size(size), "Saved");
        Ok(true)
    }
}

fn wrap_posts(posts: Vec<Post>) -> Vec<MediaItem> {
    posts.into_iter().map(MediaItem::Post).collect()
}

fn wrap_stories(items: Vec<StoryItem>) -> Vec<MediaItem> {
    items.into_iter().map(MediaItem::Story).collect()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// `1234567` -> `1 234 567`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

fn bio_preview(bio: &str) -> String {
    if bio.chars().count() > BIO_PREVIEW_CHARS {
        let head: String = bio.chars().take(BIO_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        bio.to_string()
    }
}

pub fn display_profile_info(profile: &Profile) {
    print_separator('=', Some(60));
    if profile.full_name.is_empty() {
        println!("👤 @{}", profile.username);
    } else {
        println!("👤 {} (@{})", profile.full_name, profile.username);
    }
    println!("📊 Posts: {}", group_thousands(profile.media_count));
    println!("👥 Followers: {}", group_thousands(profile.followers));
    println!("➡️  Following: {}", group_thousands(profile.following));
    if profile.is_verified {
        println!("✔️  Verified");
    }
    if profile.is_private {
        println!("🔒 Private");
    }
    if !profile.biography.is_empty() {
        println!("📝 {}", bio_preview(&profile.biography));
    }
    if let Some(url) = &profile.external_url {
        println!("🔗 {}", url);
    }
    print_separator('=', Some(60));
}

fn print_summary(stats: &DownloadStats) {
    println!("\n✨ Finished @{}: {} items", stats.username, stats.total());
    for category in Category::ALL {
        let count = stats.downloaded.get(category);
        if count > 0 {
            println!("   {} {}: {}", category.icon(), category, count);
        }
    }
    if !stats.errors.is_empty() {
        println!("   ⚠️  Errors: {}", stats.errors.len());
    }
}
