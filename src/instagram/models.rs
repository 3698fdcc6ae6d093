//! Typed models for the web API and the raw payloads they are decoded from.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub biography: String,
    pub followers: u64,
    pub following: u64,
    pub media_count: u64,
    pub is_private: bool,
    pub is_verified: bool,
    pub external_url: Option<String>,
}

/// One downloadable file of a post or story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaResource {
    pub url: String,
    pub is_video: bool,
    /// Still image for videos.
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub shortcode: String,
    pub taken_at: DateTime<Utc>,
    pub caption: Option<String>,
    /// `GraphImage`, `GraphVideo` or `GraphSidecar`.
    pub typename: String,
    pub owner: String,
    pub resources: Vec<MediaResource>,
    pub location: Option<Location>,
    pub like_count: u64,
    pub comment_count: u64,
}

impl Post {
    pub fn is_video(&self) -> bool {
        self.typename == TYPENAME_VIDEO
    }

    /// Metadata written next to the media. The location is dropped unless
    /// `with_location` is set.
    pub fn metadata(&self, with_location: bool) -> Value {
        let mut meta = serde_json::json!({
            "id": self.id,
            "shortcode": self.shortcode,
            "typename": self.typename,
            "owner": self.owner,
            "taken_at": self.taken_at.to_rfc3339(),
            "taken_at_timestamp": self.taken_at.timestamp(),
            "caption": self.caption,
            "like_count": self.like_count,
            "comment_count": self.comment_count,
            "resources": self.resources,
        });
        if with_location {
            meta["location"] = serde_json::to_value(&self.location).unwrap_or(Value::Null);
        }
        meta
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryItem {
    pub id: String,
    pub taken_at: DateTime<Utc>,
    pub owner: String,
    pub resource: MediaResource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    /// Reel id, e.g. `highlight:17890000000000000`.
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub owner: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
}

pub const TYPENAME_IMAGE: &str = "GraphImage";
pub const TYPENAME_VIDEO: &str = "GraphVideo";
pub const TYPENAME_SIDECAR: &str = "GraphSidecar";

// ---------------------------------------------------------------------------
// Raw payloads
// ---------------------------------------------------------------------------

/// Ids arrive as numbers or strings depending on the endpoint.
fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn unix_to_utc(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EdgeCount {
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default)]
    pub edge_followed_by: EdgeCount,
    #[serde(default)]
    pub edge_follow: EdgeCount,
    #[serde(default)]
    pub edge_owner_to_timeline_media: EdgeCount,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub external_url: Option<String>,
}

impl From<RawProfile> for Profile {
    fn from(raw: RawProfile) -> Self {
        Self {
            id: raw.id,
            username: raw.username,
            full_name: raw.full_name.unwrap_or_default(),
            biography: raw.biography.unwrap_or_default(),
            followers: raw.edge_followed_by.count,
            following: raw.edge_follow.count,
            media_count: raw.edge_owner_to_timeline_media.count,
            is_private: raw.is_private,
            is_verified: raw.is_verified,
            external_url: raw.external_url.filter(|u| !u.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileEnvelope {
    pub data: Option<ProfileData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileData {
    pub user: Option<RawProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawUser {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawCaption {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCandidate {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawImageVersions {
    #[serde(default)]
    pub candidates: Vec<RawCandidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLocation {
    #[serde(default, deserialize_with = "string_or_number")]
    pub pk: String,
    #[serde(default)]
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// One entry of a feed, reel or carousel.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMedia {
    #[serde(deserialize_with = "string_or_number")]
    pub pk: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub taken_at: i64,
    #[serde(default)]
    pub media_type: u8,
    #[serde(default)]
    pub caption: Option<RawCaption>,
    #[serde(default)]
    pub image_versions2: Option<RawImageVersions>,
    #[serde(default)]
    pub video_versions: Option<Vec<RawCandidate>>,
    #[serde(default)]
    pub carousel_media: Option<Vec<RawMedia>>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub user: Option<RawUser>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
}

impl RawMedia {
    fn image_url(&self) -> Option<String> {
        self.image_versions2
            .as_ref()
            .and_then(|v| v.candidates.first())
            .map(|c| c.url.clone())
    }

    fn video_url(&self) -> Option<String> {
        self.video_versions
            .as_ref()
            .and_then(|v| v.first())
            .map(|c| c.url.clone())
    }

    fn resource(&self) -> Option<MediaResource> {
        match (self.video_url(), self.image_url()) {
            (Some(video), thumb) => Some(MediaResource {
                url: video,
                is_video: true,
                thumbnail_url: thumb,
            }),
            (None, Some(image)) => Some(MediaResource {
                url: image,
                is_video: false,
                thumbnail_url: None,
            }),
            (None, None) => None,
        }
    }

    fn owner(&self) -> String {
        self.user
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    pub fn into_post(self) -> Post {
        let typename = match self.media_type {
            2 => TYPENAME_VIDEO,
            8 => TYPENAME_SIDECAR,
            _ => TYPENAME_IMAGE,
        };
        let resources = match &self.carousel_media {
            Some(children) => children.iter().filter_map(RawMedia::resource).collect(),
            None => self.resource().into_iter().collect(),
        };
        let owner = self.owner();

        Post {
            shortcode: self.code.clone().unwrap_or_else(|| self.pk.clone()),
            id: self.pk,
            taken_at: unix_to_utc(self.taken_at),
            caption: self.caption.map(|c| c.text).filter(|t| !t.is_empty()),
            typename: typename.to_string(),
            owner,
            resources,
            location: self.location.map(|l| Location {
                id: l.pk,
                name: l.name,
                lat: l.lat,
                lng: l.lng,
            }),
            like_count: self.like_count,
            comment_count: self.comment_count,
        }
    }

    pub fn into_story_item(self) -> Option<StoryItem> {
        let resource = self.resource()?;
        Some(StoryItem {
            owner: self.owner(),
            id: self.pk,
            taken_at: unix_to_utc(self.taken_at),
            resource,
        })
    }
}

/// Paginated feed page (`/feed/user/`, `/usertags/`, `/igtv/channel/`).
#[derive(Debug, Deserialize)]
pub(crate) struct FeedPage {
    #[serde(default)]
    pub items: Vec<RawMedia>,
    #[serde(default)]
    pub more_available: bool,
    #[serde(default, alias = "max_id")]
    pub next_max_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawReel {
    #[serde(default)]
    pub items: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReelsEnvelope {
    #[serde(default)]
    pub reels: std::collections::HashMap<String, RawReel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHighlight {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HighlightTray {
    #[serde(default)]
    pub tray: Vec<RawHighlight>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawComment {
    #[serde(deserialize_with = "string_or_number")]
    pub pk: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub comment_like_count: u64,
    #[serde(default)]
    pub user: Option<RawUser>,
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Self {
            id: raw.pk,
            owner: raw.user.map(|u| u.username).unwrap_or_default(),
            text: raw.text,
            created_at: unix_to_utc(raw.created_at),
            like_count: raw.comment_like_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentsPage {
    #[serde(default)]
    pub comments: Vec<RawComment>,
    #[serde(default)]
    pub next_min_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carousel_becomes_sidecar_with_all_resources() {
        let raw: RawMedia = serde_json::from_value(serde_json::json!({
            "pk": 3100000000000000001u64,
            "code": "Cxyz",
            "taken_at": 1700000000,
            "media_type": 8,
            "caption": {"text": "hello"},
            "user": {"username": "natgeo"},
            "carousel_media": [
                {"pk": "1", "media_type": 1,
                 "image_versions2": {"candidates": [{"url": "https://cdn/a.jpg"}]}},
                {"pk": "2", "media_type": 2,
                 "image_versions2": {"candidates": [{"url": "https://cdn/b.jpg"}]},
                 "video_versions": [{"url": "https://cdn/b.mp4"}]}
            ]
        }))
        .unwrap();

        let post = raw.into_post();
        assert_eq!(post.id, "3100000000000000001");
        assert_eq!(post.shortcode, "Cxyz");
        assert_eq!(post.typename, TYPENAME_SIDECAR);
        assert_eq!(post.owner, "natgeo");
        assert_eq!(post.caption.as_deref(), Some("hello"));
        assert_eq!(post.resources.len(), 2);
        assert!(post.resources[1].is_video);
        assert_eq!(
            post.resources[1].thumbnail_url.as_deref(),
            Some("https://cdn/b.jpg")
        );
        assert_eq!(post.taken_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn empty_caption_is_none() {
        let raw: RawMedia = serde_json::from_value(serde_json::json!({
            "pk": "9", "code": "A", "media_type": 1, "caption": {"text": ""},
            "image_versions2": {"candidates": [{"url": "u"}]}
        }))
        .unwrap();
        assert!(raw.into_post().caption.is_none());
    }

    #[test]
    fn metadata_hides_location_unless_requested() {
        let raw: RawMedia = serde_json::from_value(serde_json::json!({
            "pk": "9", "code": "A", "media_type": 1,
            "image_versions2": {"candidates": [{"url": "u"}]},
            "location": {"pk": 42, "name": "Kraków", "lat": 50.06, "lng": 19.94}
        }))
        .unwrap();
        let post = raw.into_post();

        assert!(post.metadata(false).get("location").is_none());
        let with = post.metadata(true);
        assert_eq!(with["location"]["name"], "Kraków");
        assert_eq!(with["location"]["id"], "42");
    }

    #[test]
    fn story_without_media_is_dropped() {
        let raw: RawMedia =
            serde_json::from_value(serde_json::json!({"pk": "1", "media_type": 1})).unwrap();
        assert!(raw.into_story_item().is_none());
    }

    #[test]
    fn profile_counts_come_from_edges() {
        let raw: RawProfile = serde_json::from_value(serde_json::json!({
            "id": "787132",
            "username": "natgeo",
            "full_name": "National Geographic",
            "biography": null,
            "edge_followed_by": {"count": 280000000},
            "edge_follow": {"count": 150},
            "edge_owner_to_timeline_media": {"count": 30000},
            "is_verified": true,
            "external_url": ""
        }))
        .unwrap();
        let profile = Profile::from(raw);
        assert_eq!(profile.followers, 280_000_000);
        assert_eq!(profile.media_count, 30_000);
        assert!(profile.biography.is_empty());
        assert!(profile.external_url.is_none());
        assert!(profile.is_verified && !profile.is_private);
    }
}
