//! Tests for config.rs — defaults, file loading, path templates.

use pretty_assertions::assert_eq;
use quire_client::config::with_id;
use quire_client::{ClientConfig, ClientError, Endpoints};
use std::io::Write;
use std::time::Duration;

// ── Defaults ────────────────────────────────────────────────────

#[test]
fn client_config_default() {
    let cfg = ClientConfig::default();
    assert_eq!(cfg.base_url, "http://127.0.0.1:1234");
    assert_eq!(cfg.timeout(), Duration::from_secs(30));
    assert_eq!(cfg.store.ttl_secs, 300);
    assert!(cfg.validate().is_ok());
}

#[test]
fn endpoint_defaults_match_the_api() {
    let endpoints = Endpoints::default();
    assert_eq!(endpoints.login, "/api/connect/auth/login");
    assert_eq!(endpoints.all_articles, "/api/article/post/all");
    assert_eq!(endpoints.follow, "/api/article/user/follow/{id}");
    assert_eq!(endpoints.unfollow, "/api/article/user/unfollow/{id}");
    assert_eq!(
        endpoints.mark_notification_read,
        "/api/article/user/notifications/{id}/mark-as-read"
    );
    assert_eq!(endpoints.join_community, "/api/article/community/join/{id}");
    assert_eq!(endpoints.sign_up, "/api/signup");
    assert_eq!(endpoints.create_article, "/api/articles");
    assert_eq!(endpoints.community_post, "/api/article/community/add");
    assert_eq!(endpoints.author, "/api/article/user/author/{id}");
}

#[test]
fn with_id_percent_encodes() {
    assert_eq!(with_id("/a/{id}", "66e5c5e6"), "/a/66e5c5e6");
    assert_eq!(with_id("/a/{id}/b", "x y/z"), "/a/x%20y%2Fz/b");
    assert_eq!(with_id("/no-placeholder", "1"), "/no-placeholder");
}

// ── Validation ──────────────────────────────────────────────────

#[test]
fn rejects_non_http_base_url() {
    let cfg = ClientConfig {
        base_url: "ftp://example.com".to_string(),
        ..Default::default()
    };
    assert!(matches!(cfg.validate(), Err(ClientError::Config(_))));
}

#[test]
fn rejects_zero_timeout() {
    let cfg = ClientConfig {
        timeout_secs: 0,
        ..Default::default()
    };
    assert!(matches!(cfg.validate(), Err(ClientError::Config(_))));
}

// ── File loading ────────────────────────────────────────────────

#[test]
fn load_partial_file_fills_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"base_url": "https://article-back.onrender.com",
            "endpoints": {{"login": "https://connect.example.com/api/connect/auth/login"}},
            "store": {{"ttl_secs": 60}}}}"#
    )
    .unwrap();

    let cfg = ClientConfig::load(file.path()).unwrap();
    assert_eq!(cfg.base_url, "https://article-back.onrender.com");
    assert_eq!(cfg.endpoints.login, "https://connect.example.com/api/connect/auth/login");
    assert_eq!(cfg.endpoints.profile, "/api/article/user/profile");
    assert_eq!(cfg.store.ttl_secs, 60);
    assert_eq!(cfg.store.debounce_ms, 300);
    assert_eq!(cfg.timeout_secs, 30);
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ClientConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));
}

#[test]
fn load_malformed_file_is_serialization_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();
    let err = ClientConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ClientError::Serialization(_)));
}

#[test]
fn load_validates() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"base_url": "localhost:1234"}}"#).unwrap();
    let err = ClientConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));
}
