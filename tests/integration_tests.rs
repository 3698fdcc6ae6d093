//! Integration tests for the ig_downloader library
//!
//! These tests drive the public API against a mocked Instagram web API.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use ig_downloader::{
    auth::AuthManager,
    batch::BatchDownloader,
    config::{Config, DownloadOptions},
    downloader::{Category, Downloader},
    error::Error,
    instagram::{InstagramClient, MediaSource},
    session::SessionStore,
    utils::{extract_username_from_url, format_file_size},
};

// ============================================================================
// Helpers
// ============================================================================

fn config(tmp: &TempDir) -> Config {
    Config {
        download_dir: tmp.path().join("downloads"),
        session_dir: tmp.path().join("sessions"),
        config_path: tmp.path().join("config.yml"),
        sleep_time: 0.0,
        min_sleep_time: 0.0,
        max_sleep_time: 0.0,
        max_attempts: 1,
        request_timeout: 5.0,
        ..Config::default()
    }
}

fn client(config: &Config, server: &MockServer) -> Arc<InstagramClient> {
    Arc::new(
        InstagramClient::with_base_url(config, server.base_url())
            .expect("client")
            .with_retry_delay(Duration::from_millis(1)),
    )
}

fn mock_profile(server: &MockServer, username: &str, id: &str) {
    let username = username.to_string();
    let id = id.to_string();
    server.mock(move |when, then| {
        when.method(GET)
            .path("/api/v1/users/web_profile_info/")
            .query_param("username", username.as_str());
        then.status(200).json_body(json!({
            "data": {"user": {
                "id": id,
                "username": username,
                "full_name": "Test Profile",
                "biography": "bio",
                "edge_followed_by": {"count": 1200},
                "edge_follow": {"count": 3},
                "edge_owner_to_timeline_media": {"count": 2}
            }}
        }));
    });
}

fn mock_feed(server: &MockServer, id: &str, codes: &[&str]) {
    let items: Vec<_> = codes
        .iter()
        .map(|code| {
            json!({
                "pk": format!("pk-{}", code),
                "code": code,
                "taken_at": 1700000000,
                "media_type": 1,
                "image_versions2": {"candidates": [{"url": server.url(format!("/cdn/{}.jpg", code))}]}
            })
        })
        .collect();
    let path = format!("/api/v1/feed/user/{}/", id);
    server.mock(move |when, then| {
        when.method(GET).path(path.as_str());
        then.status(200)
            .json_body(json!({"items": items, "more_available": false}));
    });
}

fn mock_cdn(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path_prefix("/cdn/");
        then.status(200).body(vec![0xff, 0xd8, 0xff, 0xe0]);
    });
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Downloader
// ============================================================================

#[tokio::test]
async fn test_download_profile_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let server = MockServer::start_async().await;
    mock_profile(&server, "natgeo", "787132");
    mock_feed(&server, "787132", &["AAA", "BBB"]);
    mock_cdn(&server);

    let mut downloader = Downloader::new(&cfg, client(&cfg, &server)).unwrap();
    let stats = downloader
        .download_profile("https://www.instagram.com/natgeo/", &DownloadOptions::posts_only())
        .await;

    assert!(stats.success, "errors: {:?}", stats.errors);
    assert_eq!(stats.downloaded.posts, 2);
    let dir = downloader.category_dir("natgeo", Category::Posts);
    assert_eq!(
        file_names(&dir),
        vec![
            "2023-11-14_22-13-20_UTC_AAA.jpg",
            "2023-11-14_22-13-20_UTC_AAA.json",
            "2023-11-14_22-13-20_UTC_BBB.jpg",
            "2023-11-14_22-13-20_UTC_BBB.json",
        ]
    );
    assert_eq!(
        fs::read(dir.join("2023-11-14_22-13-20_UTC_AAA.jpg")).unwrap(),
        vec![0xff, 0xd8, 0xff, 0xe0]
    );
}

#[tokio::test]
async fn test_second_run_resumes_without_refetching_media() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let server = MockServer::start_async().await;
    mock_profile(&server, "natgeo", "787132");
    mock_feed(&server, "787132", &["AAA"]);
    let cdn = server.mock(|when, then| {
        when.method(GET).path("/cdn/AAA.jpg");
        then.status(200).body("jpeg");
    });

    let mut downloader = Downloader::new(&cfg, client(&cfg, &server)).unwrap();
    downloader
        .download_profile("natgeo", &DownloadOptions::posts_only())
        .await;
    downloader
        .download_profile("natgeo", &DownloadOptions::posts_only())
        .await;

    cdn.assert_calls(1);
}

#[tokio::test]
async fn test_unknown_profile_is_reported() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/users/web_profile_info/");
        then.status(404).body("{}");
    });

    let mut downloader = Downloader::new(&cfg, client(&cfg, &server)).unwrap();
    let stats = downloader
        .download_profile("ghost", &DownloadOptions::all())
        .await;

    assert!(!stats.success);
    assert_eq!(stats.total(), 0);
    assert!(stats.errors[0].contains("ghost"));
}

#[tokio::test]
async fn test_blocked_media_stops_the_category() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let server = MockServer::start_async().await;
    mock_profile(&server, "natgeo", "787132");
    mock_feed(&server, "787132", &["AAA", "BBB", "CCC"]);
    let blocked = server.mock(|when, then| {
        when.method(GET).path_prefix("/cdn/");
        then.status(403).body("blocked");
    });

    let mut downloader = Downloader::new(&cfg, client(&cfg, &server)).unwrap();
    let stats = downloader
        .download_profile("natgeo", &DownloadOptions::posts_only())
        .await;

    assert_eq!(stats.downloaded.posts, 0);
    blocked.assert_calls(1);
    assert_eq!(downloader.rate_limiter().error_count(), 1);
}

// ============================================================================
// Batch
// ============================================================================

#[tokio::test]
async fn test_batch_from_file_records_failures() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let server = MockServer::start_async().await;
    mock_profile(&server, "natgeo", "787132");
    mock_feed(&server, "787132", &["AAA"]);
    mock_cdn(&server);
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/users/web_profile_info/")
            .query_param("username", "ghost");
        then.status(404).body("{}");
    });

    let list = tmp.path().join("profiles.txt");
    fs::write(&list, "# test list\n@natgeo\n\nghost\nnot a valid name\n").unwrap();
    let failed_file = tmp.path().join("failed_profiles.txt");

    let downloader = Downloader::new(&cfg, client(&cfg, &server)).unwrap();
    let mut batch = BatchDownloader::new(downloader, 0).with_failed_file(&failed_file);
    let report = batch
        .download_from_file(&list, &DownloadOptions::posts_only(), true)
        .await
        .unwrap();

    assert_eq!(report.stats.total, 2);
    assert_eq!(report.stats.completed, 1);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.failed[0].0, "ghost");
    let saved = fs::read_to_string(&failed_file).unwrap();
    assert!(saved.lines().any(|line| line == "ghost"));
}

// ============================================================================
// Auth and sessions
// ============================================================================

#[tokio::test]
async fn test_imported_cookies_authenticate_requests() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let server = MockServer::start_async().await;
    let authed = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/users/web_profile_info/")
            .header("x-csrftoken", "tok")
            .header_exists("cookie");
        then.status(200).json_body(json!({
            "data": {"user": {"id": "1", "username": "natgeo"}}
        }));
    });

    let cookies = tmp.path().join("cookies.json");
    fs::write(
        &cookies,
        json!([
            {"domain": ".instagram.com", "name": "sessionid", "value": "1%3Aabc"},
            {"domain": ".instagram.com", "name": "csrftoken", "value": "tok"},
            {"domain": ".instagram.com", "name": "ds_user", "value": "me"},
            {"domain": ".example.com", "name": "tracker", "value": "x"}
        ])
        .to_string(),
    )
    .unwrap();

    let store = SessionStore::new(&cfg.session_dir, true).unwrap();
    let mut auth = AuthManager::new(client(&cfg, &server), store);
    assert_eq!(auth.login_with_cookies(&cookies, None).unwrap(), "me");
    assert!(auth.is_logged_in());

    // A fresh manager restores the saved session from disk.
    let store = SessionStore::new(&cfg.session_dir, true).unwrap();
    let mut restored = AuthManager::new(client(&cfg, &server), store);
    assert!(restored.load_session(None));
    assert_eq!(restored.username(), Some("me"));

    let profile = restored.client().profile("natgeo").await.unwrap();
    assert_eq!(profile.id, "1");
    authed.assert_calls(1);

    restored.logout().unwrap();
    assert!(!restored.client().is_logged_in());
    let store = SessionStore::new(&cfg.session_dir, true).unwrap();
    assert!(store.metadata().is_none());
}

#[test]
fn test_cookie_export_without_session_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    let cookies = tmp.path().join("cookies.json");
    fs::write(
        &cookies,
        json!([{"domain": ".instagram.com", "name": "csrftoken", "value": "tok"}]).to_string(),
    )
    .unwrap();

    let client = Arc::new(InstagramClient::with_base_url(&cfg, "http://127.0.0.1:9").unwrap());
    let store = SessionStore::new(&cfg.session_dir, true).unwrap();
    let mut auth = AuthManager::new(client, store);

    assert!(matches!(
        auth.login_with_cookies(&cookies, Some("me")),
        Err(Error::LoginRequired(_))
    ));
    assert!(!auth.is_logged_in());
}

// ============================================================================
// Config and utils
// ============================================================================

#[test]
fn test_config_round_trips_through_yaml() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(&tmp);
    cfg.download_stories = true;
    cfg.batch_delay = 15;

    let path = cfg.save_to_file(None).unwrap();
    let loaded = Config::load_from_file(&path).unwrap();

    assert!(loaded.download_stories);
    assert_eq!(loaded.batch_delay, 15);
    assert_eq!(loaded.download_dir, cfg.download_dir);
    assert_eq!(DownloadOptions::from_config(&loaded).stories, true);
}

#[test]
fn test_username_forms() {
    for input in [
        "natgeo",
        "@natgeo",
        "https://www.instagram.com/natgeo/",
        "instagram.com/natgeo/tagged/",
        "  NatGeo  ",
    ] {
        assert_eq!(extract_username_from_url(input).unwrap(), "natgeo", "{}", input);
    }
    assert!(extract_username_from_url("https://facebook.com/natgeo").is_err());
    assert!(extract_username_from_url(".natgeo").is_err());
}

#[test]
fn test_error_variants_display() {
    let errors = vec![
        Error::InvalidUsername("x".into()),
        Error::ProfileNotFound("ghost".into()),
        Error::LoginRequired("stories".into()),
        Error::RateLimited("wait".into()),
        Error::Forbidden("blocked".into()),
        Error::SessionLocked,
        Error::Interrupted,
    ];
    for err in errors {
        assert!(!err.to_string().is_empty());
    }
    assert!(Error::Forbidden("x".into()).is_rate_limit());
    assert!(Error::ProfileNotFound("x".into()).is_not_found());
}

#[test]
fn test_file_sizes_are_human_readable() {
    assert_eq!(format_file_size(512), "512.0 B");
    assert_eq!(format_file_size(2048), "2.0 KB");
}
