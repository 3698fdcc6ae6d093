//! HTTP client for the Instagram web API.

use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, REFERER, SET_COOKIE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::models::{
    CommentsPage, FeedPage, HighlightTray, ProfileEnvelope, ReelsEnvelope, RawMedia,
};
use super::{Comment, Highlight, MediaSource, Post, Profile, StoryItem};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::rate_limit::calculate_rate_limit_delay;
use crate::session::SessionData;
use crate::utils::truncate_string;

pub const DEFAULT_BASE_URL: &str = "https://www.instagram.com";
const WEB_APP_ID: &str = "936619743392459";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const LOGIN_PATH: &str = "/api/v1/web/accounts/login/ajax/";
const TWO_FACTOR_PATH: &str = "/api/v1/web/accounts/login/ajax/two_factor/";
const PAGE_SIZE: &str = "12";
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_RETRY_DELAY: f64 = 60.0;

struct Reply {
    status: StatusCode,
    cookies: Vec<(String, String)>,
    body: Bytes,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::ApiError(format!(
                "unexpected response ({}): {}",
                e,
                truncate_string(&self.text(), 120, "...")
            ))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FailBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    require_login: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    user: bool,
    #[serde(default)]
    two_factor_required: bool,
    #[serde(default)]
    two_factor_info: Option<TwoFactorInfo>,
    #[serde(default)]
    checkpoint_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TwoFactorInfo {
    #[serde(default)]
    two_factor_identifier: String,
}

/// Turn a status and body into an error, or `None` when the reply is usable.
fn classify(status: StatusCode, body: &[u8]) -> Option<Error> {
    let fail: FailBody = if body.first() == Some(&b'{') {
        serde_json::from_slice(body).unwrap_or_default()
    } else {
        FailBody::default()
    };
    let message = fail.message.clone().unwrap_or_default();
    let lower = message.to_lowercase();

    if fail.require_login || lower.contains("login_required") {
        return Some(Error::LoginRequired(if message.is_empty() {
            "login required".into()
        } else {
            message
        }));
    }
    if lower.contains("checkpoint_required") || lower.contains("challenge_required") {
        return Some(Error::LoginRequired(format!(
            "{}: confirm the login in the Instagram app",
            message
        )));
    }
    if lower.contains("please wait") {
        return Some(Error::RateLimited(message));
    }

    let snippet = || truncate_string(&String::from_utf8_lossy(body), 200, "...");
    match status.as_u16() {
        200..=299 if fail.status.as_deref() == Some("fail") => Some(Error::ApiError(message)),
        200..=299 => None,
        401 => Some(Error::LoginRequired(snippet())),
        403 => Some(Error::Forbidden(snippet())),
        404 => Some(Error::NotFound(snippet())),
        429 => Some(Error::RateLimited(snippet())),
        500..=599 => Some(Error::ConnectionError(format!(
            "HTTP {}: {}",
            status.as_u16(),
            snippet()
        ))),
        _ => Some(Error::ApiError(format!(
            "HTTP {}: {}",
            status.as_u16(),
            snippet()
        ))),
    }
}

fn parse_set_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Client of the web API. The session (cookies) sits behind a lock so the
/// client can be shared as `Arc<dyn MediaSource>` and still be logged in
/// later.
#[derive(Debug)]
pub struct InstagramClient {
    http: Client,
    base_url: String,
    max_attempts: u32,
    retry_delay: Duration,
    backoff_multiplier: f64,
    session: RwLock<SessionData>,
}

impl InstagramClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url =
            std::env::var("INSTAGRAM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(config, base_url)
    }

    /// Create client with custom base url (primarily for tests).
    pub fn with_base_url<S: Into<String>>(config: &Config, base_url: S) -> Result<Self> {
        let timeout = Duration::from_secs_f64(config.request_timeout.max(1.0));
        let http = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::ConnectionError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff_multiplier: config.rate_limit_backoff_multiplier.max(1.0),
            session: RwLock::new(SessionData::default()),
        })
    }

    /// Base delay between retries of failed connections.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> SessionData {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_session(&self, session: SessionData) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn clear_session(&self) {
        self.set_session(SessionData::default());
    }

    fn absorb_cookies(&self, cookies: &[(String, String)]) {
        if cookies.is_empty() {
            return;
        }
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in cookies {
            if value.is_empty() {
                session.cookies.remove(name);
            } else {
                session.set_cookie(name.as_str(), value.as_str());
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn is_api_url(&self, url: &str) -> bool {
        url.starts_with(&self.base_url)
    }

    fn headers(&self, with_session: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        if !with_session {
            return headers;
        }

        headers.insert("X-IG-App-ID", HeaderValue::from_static(WEB_APP_ID));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", self.base_url)) {
            headers.insert(REFERER, referer);
        }

        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        if !session.cookies.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&session.cookie_header()) {
                headers.insert(COOKIE, value);
            }
        }
        if let Some(token) = session.csrf_token() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert("X-CSRFToken", value);
            }
        }
        headers
    }

    async fn execute_once(&self, request: RequestBuilder, with_session: bool) -> Result<Reply> {
        let response = request.headers(self.headers(with_session)).send().await?;
        let status = response.status();
        let cookies = parse_set_cookies(response.headers());
        let body = response.bytes().await?;

        if status.is_server_error() {
            return Err(Error::ConnectionError(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_string(&String::from_utf8_lossy(&body), 200, "...")
            )));
        }
        Ok(Reply {
            status,
            cookies,
            body,
        })
    }

    async fn pause_before_retry(&self, err: &Error, attempt: u32) {
        let delay = calculate_rate_limit_delay(
            attempt - 1,
            self.retry_delay.as_secs_f64(),
            self.backoff_multiplier,
            MAX_RETRY_DELAY,
        );
        warn!(
            "{} (attempt {}/{}), retrying in {:.1}s",
            err, attempt, self.max_attempts, delay
        );
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }

    /// Send with retries on connection errors and 5xx responses.
    async fn execute<F>(&self, build: F, with_session: bool) -> Result<Reply>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            match self.execute_once(build(), with_session).await {
                Err(e @ Error::ConnectionError(_)) if attempt < self.max_attempts => {
                    self.pause_before_retry(&e, attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// One streamed GET of `url` into `dest`. Server errors and broken
    /// bodies come back as `ConnectionError`.
    async fn download_once(&self, url: &str, dest: &Path, with_session: bool) -> Result<u64> {
        let response = self
            .http
            .get(url)
            .headers(self.headers(with_session))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(classify(status, &body).unwrap_or_else(|| {
                Error::ApiError(format!("HTTP {} for {}", status.as_u16(), url))
            }));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                Error::ConnectionError(format!("download of {} broke off: {}", url, e))
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Send, then turn error statuses into typed errors.
    async fn fetch<F>(&self, build: F, with_session: bool) -> Result<Reply>
    where
        F: Fn() -> RequestBuilder,
    {
        let reply = self.execute(build, with_session).await?;
        if with_session {
            self.absorb_cookies(&reply.cookies);
        }
        match classify(reply.status, &reply.body) {
            Some(err) => Err(err),
            None => Ok(reply),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        debug!("GET {} {:?}", path, query);
        self.fetch(|| self.http.get(&url).query(query), true)
            .await?
            .json()
    }

    /// Walk a `max_id`-paginated feed to the end.
    async fn collect_feed(&self, path: &str, extra: &[(&str, &str)]) -> Result<Vec<Post>> {
        let mut posts = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("count", PAGE_SIZE)];
            query.extend_from_slice(extra);
            if let Some(c) = cursor.as_deref() {
                query.push(("max_id", c));
            }

            let page: FeedPage = self.get_json(path, &query).await?;
            posts.extend(page.items.into_iter().map(RawMedia::into_post));

            match page.next_max_id {
                Some(next) if page.more_available && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!("{}: {} items", path, posts.len());
        Ok(posts)
    }

    async fn reel_items(&self, reel_id: &str) -> Result<Vec<StoryItem>> {
        let envelope: ReelsEnvelope = self
            .get_json("/api/v1/feed/reels_media/", &[("reel_ids", reel_id)])
            .await?;
        Ok(envelope
            .reels
            .into_iter()
            .filter(|(id, _)| id == reel_id)
            .flat_map(|(_, reel)| reel.items)
            .filter_map(RawMedia::into_story_item)
            .collect())
    }

    /// Log in with a password. Returns the new session on success;
    /// [`Error::TwoFactorRequired`] means [`Self::two_factor_login`] must
    /// follow.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData> {
        self.set_session(SessionData {
            username: Some(username.to_string()),
            ..Default::default()
        });

        // The login page hands out the csrftoken cookie.
        let login_page = self.url("/accounts/login/");
        let reply = self
            .execute(|| self.http.get(&login_page), true)
            .await?;
        self.absorb_cookies(&reply.cookies);

        let form = [
            ("username", username.to_string()),
            (
                "enc_password",
                format!("#PWD_INSTAGRAM_BROWSER:0:{}:{}", Utc::now().timestamp(), password),
            ),
            ("queryParams", "{}".to_string()),
            ("optIntoOneTap", "false".to_string()),
        ];
        let url = self.url(LOGIN_PATH);
        let reply = self
            .execute(|| self.http.post(&url).form(&form), true)
            .await?;
        self.finish_login(username, reply)
    }

    /// Complete a login that asked for a two-factor code.
    pub async fn two_factor_login(
        &self,
        username: &str,
        identifier: &str,
        code: &str,
    ) -> Result<SessionData> {
        let form = [
            ("username", username),
            ("verificationCode", code.trim()),
            ("identifier", identifier),
            ("queryParams", "{}"),
        ];
        let url = self.url(TWO_FACTOR_PATH);
        let reply = self
            .execute(|| self.http.post(&url).form(&form), true)
            .await?;
        self.finish_login(username, reply)
    }

    fn finish_login(&self, username: &str, reply: Reply) -> Result<SessionData> {
        self.absorb_cookies(&reply.cookies);

        if reply.status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("too many login attempts".into()));
        }

        let response: LoginResponse = serde_json::from_slice(&reply.body).map_err(|_| {
            Error::ApiError(format!(
                "login failed with HTTP {}: {}",
                reply.status.as_u16(),
                truncate_string(&reply.text(), 120, "...")
            ))
        })?;
        let message = response.message.clone().unwrap_or_default();

        if response.two_factor_required {
            let identifier = response
                .two_factor_info
                .map(|info| info.two_factor_identifier)
                .unwrap_or_default();
            info!("Two-factor authentication required for {}", username);
            return Err(Error::TwoFactorRequired { identifier });
        }
        if response.checkpoint_url.is_some() || message.contains("checkpoint_required") {
            return Err(Error::LoginRequired(
                "checkpoint required: confirm the login in the Instagram app and try again".into(),
            ));
        }
        if message.to_lowercase().contains("please wait") {
            return Err(Error::RateLimited(message));
        }

        if response.authenticated {
            let mut session = self.session();
            session.username = Some(username.to_string());
            if !session.is_authenticated() {
                return Err(Error::ApiError(
                    "login reported success but no sessionid cookie was set".into(),
                ));
            }
            self.set_session(session.clone());
            info!("Logged in as {}", username);
            return Ok(session);
        }

        if !reply.status.is_success() && !message.is_empty() {
            return Err(Error::BadCredentials(message));
        }
        if response.user {
            Err(Error::BadCredentials(format!("wrong password for {}", username)))
        } else {
            Err(Error::BadCredentials(format!("user {} does not exist", username)))
        }
    }
}

#[async_trait]
impl MediaSource for InstagramClient {
    fn is_logged_in(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_authenticated()
    }

    async fn profile(&self, username: &str) -> Result<Profile> {
        let envelope: ProfileEnvelope = self
            .get_json("/api/v1/users/web_profile_info/", &[("username", username)])
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::ProfileNotFound(username.to_string()),
                other => other,
            })?;

        envelope
            .data
            .and_then(|d| d.user)
            .map(Profile::from)
            .ok_or_else(|| Error::ProfileNotFound(username.to_string()))
    }

    async fn posts(&self, profile: &Profile) -> Result<Vec<Post>> {
        self.collect_feed(&format!("/api/v1/feed/user/{}/", profile.id), &[])
            .await
    }

    async fn tagged_posts(&self, profile: &Profile) -> Result<Vec<Post>> {
        self.collect_feed(&format!("/api/v1/usertags/{}/feed/", profile.id), &[])
            .await
    }

    async fn igtv_posts(&self, profile: &Profile) -> Result<Vec<Post>> {
        let channel = format!("user_{}", profile.id);
        self.collect_feed("/api/v1/igtv/channel/", &[("id", channel.as_str())])
            .await
    }

    async fn stories(&self, profile: &Profile) -> Result<Vec<StoryItem>> {
        if !self.is_logged_in() {
            return Err(Error::LoginRequired("stories are only visible when logged in".into()));
        }
        self.reel_items(&profile.id).await
    }

    async fn highlights(&self, profile: &Profile) -> Result<Vec<Highlight>> {
        let tray: HighlightTray = self
            .get_json(
                &format!("/api/v1/highlights/{}/highlights_tray/", profile.id),
                &[],
            )
            .await?;
        Ok(tray
            .tray
            .into_iter()
            .map(|h| Highlight {
                id: h.id,
                title: h.title,
            })
            .collect())
    }

    async fn highlight_items(&self, highlight: &Highlight) -> Result<Vec<StoryItem>> {
        self.reel_items(&highlight.id).await
    }

    async fn comments(&self, post: &Post) -> Result<Vec<Comment>> {
        let path = format!("/api/v1/media/{}/comments/", post.id);
        let mut comments = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("can_support_threading", "true")];
            if let Some(c) = cursor.as_deref() {
                query.push(("min_id", c));
            }
            let page: CommentsPage = self.get_json(&path, &query).await?;
            comments.extend(page.comments.into_iter().map(Comment::from));

            match page.next_min_id {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(comments)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let with_session = self.is_api_url(url);
        let reply = self.fetch(|| self.http.get(url), with_session).await?;
        Ok(reply.body.to_vec())
    }

    /// Streams the body into `dest` chunk by chunk, restarting from scratch
    /// on connection errors.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let with_session = self.is_api_url(url);
        let mut attempt = 1;
        loop {
            match self.download_once(url, dest, with_session).await {
                Ok(written) => {
                    debug!(url, bytes = written, attempt, "Downloaded");
                    return Ok(written);
                }
                Err(e @ Error::ConnectionError(_)) if attempt < self.max_attempts => {
                    self.pause_before_retry(&e, attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BrowserCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
}

/// Read a browser cookie export (`[{"name", "value", "domain"}, ...]`).
/// Cookies of other domains are ignored; `ds_user` becomes the username.
pub fn load_browser_cookies<P: AsRef<Path>>(path: P) -> Result<SessionData> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidArgument(format!("cannot read {}: {}", path.display(), e))
    })?;
    let cookies: Vec<BrowserCookie> = serde_json::from_str(&content).map_err(|e| {
        Error::InvalidArgument(format!("{} is not a cookie export: {}", path.display(), e))
    })?;

    let mut session = SessionData::default();
    for cookie in cookies {
        let on_instagram = cookie
            .domain
            .as_deref()
            .map(|d| d.trim_start_matches('.'))
            .map_or(true, |d| d == "instagram.com" || d.ends_with(".instagram.com"));
        if !on_instagram {
            continue;
        }
        if cookie.name == "ds_user" && !cookie.value.is_empty() {
            session.username = Some(cookie.value.clone());
        }
        session.set_cookie(cookie.name, cookie.value);
    }

    debug!("Imported {} cookies from {}", session.cookies.len(), path.display());
    Ok(session)
}
