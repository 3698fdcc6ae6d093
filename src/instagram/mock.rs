//! In-memory [`MediaSource`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::models::{TYPENAME_IMAGE, TYPENAME_SIDECAR, TYPENAME_VIDEO};
use super::{Comment, Highlight, MediaResource, MediaSource, Post, Profile, StoryItem};
use crate::error::{Error, Result};

#[derive(Default)]
pub(crate) struct MockSource {
    pub logged_in: bool,
    pub profiles: HashMap<String, Profile>,
    pub posts: Vec<Post>,
    pub tagged: Vec<Post>,
    pub igtv: Vec<Post>,
    pub stories: Vec<StoryItem>,
    pub highlights: Vec<(Highlight, Vec<StoryItem>)>,
    pub comments: Vec<Comment>,
    /// Errors handed out, in order, by `fetch_bytes` for a url.
    pub failures: Mutex<HashMap<String, VecDeque<Error>>>,
    /// Error returned by `profile` for a username instead of a lookup.
    pub profile_errors: Mutex<HashMap<String, Error>>,
    pub fetched: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn with_profile(mut self, username: &str) -> Self {
        self.profiles.insert(username.to_string(), profile(username));
        self
    }

    pub fn fail(&self, url: &str, error: Error) {
        self.failures
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn fail_profile(&self, username: &str, error: Error) {
        self.profile_errors
            .lock()
            .unwrap()
            .insert(username.to_string(), error);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

pub(crate) fn profile(username: &str) -> Profile {
    Profile {
        id: format!("id-{}", username),
        username: username.to_string(),
        full_name: format!("{} full name", username),
        biography: "x".repeat(150),
        followers: 1_234_567,
        following: 10,
        media_count: 3,
        is_private: false,
        is_verified: true,
        external_url: None,
    }
}

pub(crate) fn image(url: &str) -> MediaResource {
    MediaResource {
        url: url.to_string(),
        is_video: false,
        thumbnail_url: None,
    }
}

pub(crate) fn video(url: &str, thumb: &str) -> MediaResource {
    MediaResource {
        url: url.to_string(),
        is_video: true,
        thumbnail_url: Some(thumb.to_string()),
    }
}

pub(crate) fn post(shortcode: &str, taken_at: i64, resources: Vec<MediaResource>) -> Post {
    let typename = match resources.as_slice() {
        [single] if single.is_video => TYPENAME_VIDEO,
        [_] | [] => TYPENAME_IMAGE,
        _ => TYPENAME_SIDECAR,
    };
    Post {
        id: format!("pk-{}", shortcode),
        shortcode: shortcode.to_string(),
        taken_at: Utc.timestamp_opt(taken_at, 0).unwrap(),
        caption: Some(format!("caption of {}", shortcode)),
        typename: typename.to_string(),
        owner: "owner".to_string(),
        resources,
        location: None,
        like_count: 1,
        comment_count: 1,
    }
}

pub(crate) fn story(id: &str, taken_at: i64, resource: MediaResource) -> StoryItem {
    StoryItem {
        id: id.to_string(),
        taken_at: Utc.timestamp_opt(taken_at, 0).unwrap(),
        owner: "owner".to_string(),
        resource,
    }
}

#[async_trait]
impl MediaSource for MockSource {
    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    async fn profile(&self, username: &str) -> Result<Profile> {
        if let Some(err) = self.profile_errors.lock().unwrap().remove(username) {
            return Err(err);
        }
        self.profiles
            .get(username)
            .cloned()
            .ok_or_else(|| Error::ProfileNotFound(username.to_string()))
    }

    async fn posts(&self, _profile: &Profile) -> Result<Vec<Post>> {
        Ok(self.posts.clone())
    }

    async fn tagged_posts(&self, _profile: &Profile) -> Result<Vec<Post>> {
        Ok(self.tagged.clone())
    }

    async fn igtv_posts(&self, _profile: &Profile) -> Result<Vec<Post>> {
        Ok(self.igtv.clone())
    }

    async fn stories(&self, _profile: &Profile) -> Result<Vec<StoryItem>> {
        Ok(self.stories.clone())
    }

    async fn highlights(&self, _profile: &Profile) -> Result<Vec<Highlight>> {
        Ok(self.highlights.iter().map(|(h, _)| h.clone()).collect())
    }

    async fn highlight_items(&self, highlight: &Highlight) -> Result<Vec<StoryItem>> {
        Ok(self
            .highlights
            .iter()
            .find(|(h, _)| h.id == highlight.id)
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }

    async fn comments(&self, _post: &Post) -> Result<Vec<Comment>> {
        Ok(self.comments.clone())
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(format!("bytes of {}", url).into_bytes())
    }
}
