//! Tests for api.rs — endpoint catalog, cached reads, optimistic writes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pretty_assertions::assert_eq;
use quire_client::api::collections;
use quire_client::{ArticleDraft, BlogApi, ClientConfig, ClientError, Credentials, SignUp};
use quire_store::{EntryState, FetchCause, MutationOutcome, SessionStatus, StoreEvent, TransportError};
use quire_types::EntityKey;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token() -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    let payload = URL_SAFE_NO_PAD.encode(json!({"id": "u1", "exp": exp}).to_string());
    format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig")
}

async fn setup() -> (MockServer, BlogApi) {
    let server = MockServer::start().await;
    let config = ClientConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let api = BlogApi::connect(&config).unwrap();
    (server, api)
}

async fn signed_in() -> (MockServer, BlogApi, String) {
    let (server, api) = setup().await;
    let token = token();
    Mock::given(method("POST"))
        .and(path("/api/connect/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": token})))
        .mount(&server)
        .await;
    api.login(&Credentials::new("ada@example.com", "pw")).await.unwrap();
    (server, api, token)
}

async fn mount_get(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer, user: Value) {
    mount_get(server, "/api/article/user/profile", json!({ "user": user })).await;
}

// ── Session ─────────────────────────────────────────────────────

#[tokio::test]
async fn login_starts_session_from_token() {
    let (server, api) = setup().await;
    let token = token();
    Mock::given(method("POST"))
        .and(path("/api/connect/auth/login"))
        .and(body_json(json!({"email": "ada@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": token})))
        .expect(1)
        .mount(&server)
        .await;

    let session = api
        .login(&Credentials::new("ada@example.com", "pw"))
        .await
        .unwrap();

    assert_eq!(session.token, token);
    assert!(session.expires_at > chrono::Utc::now());
    assert_eq!(api.store().session().status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn rejected_login_keeps_anonymous() {
    let (server, api) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/connect/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})))
        .mount(&server)
        .await;

    let err = api
        .login(&Credentials::new("ada@example.com", "wrong"))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(api.store().session().status(), SessionStatus::Anonymous);
}

#[tokio::test]
async fn login_response_without_token_is_invalid() {
    let (server, api) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/connect/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .mount(&server)
        .await;

    let err = api
        .login(&Credentials::new("ada@example.com", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidToken(_)));
}

#[tokio::test]
async fn sign_up_sends_capitalized_names_and_starts_session() {
    let (server, api) = setup().await;
    let token = token();
    Mock::given(method("POST"))
        .and(path("/api/signup"))
        .and(body_json(json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "password": "pw",
            "confirmPassword": "pw"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"token": token})))
        .expect(1)
        .mount(&server)
        .await;

    let session = api
        .sign_up(&SignUp::new("ada", "lovelace", "ada@example.com", "pw"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.token, token);
    assert_eq!(api.store().session().status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn sign_up_without_token_leaves_session_alone() {
    let (server, api) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/signup"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "Account created"})))
        .mount(&server)
        .await;

    let session = api
        .sign_up(&SignUp::new("Ada", "Lovelace", "ada@example.com", "pw"))
        .await
        .unwrap();
    assert_eq!(session, None);
    assert_eq!(api.store().session().status(), SessionStatus::Anonymous);
}

#[tokio::test]
async fn mismatched_sign_up_is_rejected_locally() {
    let (server, api) = setup().await;

    let form = SignUp::new("Ada", "Lovelace", "ada@example.com", "pw").with_confirmation("typo");
    let err = api.sign_up(&form).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidForm(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn sign_up_debug_hides_the_password() {
    let form = SignUp::new("Ada", "Lovelace", "ada@example.com", "hunter2");
    let shown = format!("{form:?}");
    assert!(!shown.contains("hunter2"));
    assert!(shown.contains("Lovelace"));
}

#[tokio::test]
async fn authenticated_reads_carry_the_token() {
    let (server, api, token) = signed_in().await;
    Mock::given(method("GET"))
        .and(path("/api/article/user/profile"))
        .and(header("Authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"_id": "u1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let profile = api.profile().await.unwrap();
    assert_eq!(profile["_id"], "u1");
    assert_eq!(api.store().cache().get(&EntityKey::me()).unwrap().value, profile);
}

// ── Reads ───────────────────────────────────────────────────────

#[tokio::test]
async fn articles_fill_the_collection_and_entities() {
    let (server, api) = setup().await;
    mount_get(
        &server,
        "/api/article/post/all",
        json!({"allArticles": [
            {"_id": "1", "title": "Learning Rust", "description": "ownership"},
            {"_id": "2", "title": "Sourdough", "description": "bread"},
        ]}),
    )
    .await;

    let entries = api.articles().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        api.store().cache().get(&EntityKey::article("2")).unwrap().value["title"],
        "Sourdough"
    );

    let results = api.store().search().filter(&collections::all_articles(), "rust");
    let titles: Vec<_> = results.iter().map(|e| e.value["title"].clone()).collect();
    assert_eq!(titles, vec![json!("Learning Rust")]);
}

#[tokio::test]
async fn fresh_articles_are_served_from_cache() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/article/post/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"allArticles": [
            {"_id": "1", "title": "A"}
        ]})))
        .expect(1)
        .mount(&server)
        .await;

    api.articles().await.unwrap();
    let again = api.articles().await.unwrap();
    assert_eq!(again.len(), 1);
}

#[tokio::test]
async fn missing_list_field_is_empty() {
    let (server, api) = setup().await;
    mount_get(&server, "/api/article/post/all", json!({})).await;
    assert!(api.articles().await.unwrap().is_empty());
}

#[tokio::test]
async fn article_without_envelope_field_is_a_fetch_error() {
    let (server, api) = setup().await;
    mount_get(&server, "/api/article/post/single/9", json!({"message": "gone"})).await;

    let err = api.article("9").await.unwrap_err();
    match err {
        ClientError::Fetch(e) => assert!(matches!(e.cause, FetchCause::Transport(TransportError::Decode(_)))),
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert!(!api.store().cache().contains(&EntityKey::article("9")));
}

#[tokio::test]
async fn malformed_article_is_rejected_at_the_boundary() {
    let (server, api) = setup().await;
    mount_get(&server, "/api/article/post/single/1", json!({"article": {"_id": "1"}})).await;

    let err = api.article("1").await.unwrap_err();
    assert!(matches!(err, ClientError::Fetch(ref e) if matches!(e.cause, FetchCause::Shape(_))));
}

#[tokio::test]
async fn unauthorized_profile_read() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/article/user/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
        .mount(&server)
        .await;

    let err = api.profile().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn related_articles_join_categories() {
    let (server, api) = setup().await;
    mount_get(
        &server,
        "/api/article/post/related/Tech,Food",
        json!({"posts": [{"_id": "7", "title": "Cooking with Rust"}]}),
    )
    .await;

    let categories = vec!["Tech".to_string(), "Food".to_string()];
    let posts = api.related_articles(&categories).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert!(
        api.store()
            .cache()
            .collection(&collections::related_articles(&categories))
            .is_some()
    );
}

#[tokio::test]
async fn author_and_community_posts() {
    let (server, api) = setup().await;
    mount_get(
        &server,
        "/api/article/post/article/u7",
        json!({"posts": [{"_id": "1", "title": "A"}]}),
    )
    .await;
    mount_get(
        &server,
        "/api/article/community/posts/c1",
        json!({"posts": [{"_id": "1", "title": "A"}, {"_id": "2", "title": "B"}]}),
    )
    .await;

    assert_eq!(api.articles_by_author("u7").await.unwrap().len(), 1);
    assert_eq!(api.community_posts("c1").await.unwrap().len(), 2);
    // Both collections reference the same entity.
    assert_eq!(api.store().cache().len(), 2);
}

#[tokio::test]
async fn author_shares_the_user_entry() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/article/user/author/u7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"user": {"_id": "u7", "firstName": "Grace"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let author = api.author("u7").await.unwrap();
    assert_eq!(author["firstName"], "Grace");
    // Served from `user:u7` without another request.
    assert_eq!(api.user("u7").await.unwrap(), author);
}

// ── Profile lists ───────────────────────────────────────────────

#[tokio::test]
async fn mutations_need_a_session() {
    let (server, api) = setup().await;

    let err = api.bookmark("a1").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn bookmark_is_visible_immediately_and_commits() {
    let (server, api, _) = signed_in().await;
    mount_profile(&server, json!({"_id": "u1", "bookMarks": []})).await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/bookmark/a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Bookmarked"})))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(api.is_bookmarked("a1"), None);
    let handle = api.bookmark("a1").await.unwrap();
    assert_eq!(api.is_bookmarked("a1"), Some(true));

    assert_eq!(handle.settled().await.unwrap(), MutationOutcome::Committed);
    assert_eq!(api.is_bookmarked("a1"), Some(true));
    assert_eq!(
        api.store().cache().get(&EntityKey::me()).unwrap().value["bookMarks"],
        json!(["a1"])
    );
}

#[tokio::test]
async fn rejected_bookmark_rolls_back_and_reports() {
    let (server, api, _) = signed_in().await;
    let mut events = api.store().subscribe_events();
    mount_profile(&server, json!({"_id": "u1", "bookMarks": ["a0"]})).await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/bookmark/a1"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
        .mount(&server)
        .await;

    let handle = api.bookmark("a1").await.unwrap();
    let outcome = handle.settled().await.unwrap();

    let MutationOutcome::RolledBack(failed) = outcome else {
        panic!("expected rollback");
    };
    assert_eq!(
        failed.cause,
        TransportError::Status {
            status: 500,
            message: Some("boom".to_string()),
        }
    );
    assert_eq!(api.is_bookmarked("a1"), Some(false));
    assert_eq!(api.is_bookmarked("a0"), Some(true));
    assert_eq!(
        api.store().cache().get(&EntityKey::me()).unwrap().state,
        EntryState::Stale
    );
    assert_eq!(events.recv().await.unwrap(), StoreEvent::MutationFailed(failed));
}

#[tokio::test]
async fn refused_bookmark_behind_a_committed_one_is_reconciled_by_the_next_read() {
    let (server, api, _) = signed_in().await;
    Mock::given(method("GET"))
        .and(path("/api/article/user/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"_id": "u1", "bookMarks": []}})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_profile(&server, json!({"_id": "u1", "bookMarks": ["a2"]})).await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/bookmark/a1"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"message": "boom"}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/bookmark/a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Bookmarked"})))
        .mount(&server)
        .await;

    let first = api.bookmark("a1").await.unwrap();
    let second = api.bookmark("a2").await.unwrap();
    assert_eq!(second.settled().await.unwrap(), MutationOutcome::Committed);
    assert!(matches!(first.settled().await.unwrap(), MutationOutcome::RolledBack(_)));

    // The committed list was computed while a1 was still optimistic.
    let me = api.store().cache().get(&EntityKey::me()).unwrap();
    assert_eq!(me.value["bookMarks"], json!(["a1", "a2"]));
    assert_eq!(me.state, EntryState::Stale);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = api.store().cache().subscribe(EntityKey::me(), move |entry| {
        let _ = tx.send(entry.clone());
    });
    api.profile().await.unwrap();
    let refreshed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let entry = rx.recv().await.unwrap();
            if entry.state == EntryState::Fresh {
                return entry;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(refreshed.value["bookMarks"], json!(["a2"]));
    assert_eq!(api.is_bookmarked("a1"), Some(false));
}

#[tokio::test]
async fn library_is_a_separate_list() {
    let (server, api, _) = signed_in().await;
    mount_profile(&server, json!({"_id": "u1", "bookMarks": [], "library": []})).await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/library/a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let handle = api.add_to_library("a1").await.unwrap();
    assert_eq!(handle.settled().await.unwrap(), MutationOutcome::Committed);
    assert_eq!(api.is_in_library("a1"), Some(true));
    assert_eq!(api.is_bookmarked("a1"), Some(false));
}

#[tokio::test]
async fn follow_then_unfollow() {
    let (server, api, _) = signed_in().await;
    mount_profile(&server, json!({"_id": "u1", "following": [{"_id": "u3"}]})).await;
    mount_get(&server, "/api/article/user/user/u2", json!({"user": {"_id": "u2", "followers": []}})).await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/follow/u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Followed"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/unfollow/u3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Unfollowed"})))
        .expect(1)
        .mount(&server)
        .await;

    api.user("u2").await.unwrap();
    let follow = api.follow("u2").await.unwrap();
    assert_eq!(api.is_following("u2"), Some(true));
    assert_eq!(follow.settled().await.unwrap(), MutationOutcome::Committed);
    // The followed user's follower list is refetched on next read.
    assert_eq!(
        api.store().cache().get(&EntityKey::user("u2")).unwrap().state,
        EntryState::Stale
    );

    let unfollow = api.unfollow("u3").await.unwrap();
    assert_eq!(api.is_following("u3"), Some(false));
    assert_eq!(unfollow.settled().await.unwrap(), MutationOutcome::Committed);
    assert_eq!(
        api.store().cache().get(&EntityKey::me()).unwrap().value["following"],
        json!(["u2"])
    );
}

// ── Notifications ───────────────────────────────────────────────

async fn with_notifications(server: &MockServer, api: &BlogApi) {
    mount_get(
        server,
        "/api/article/user/notifications",
        json!({"notifications": [
            {"_id": "n1", "message": "Ada followed you", "read": false},
            {"_id": "n2", "message": "New comment", "read": false},
        ]}),
    )
    .await;
    assert_eq!(api.notifications().await.unwrap().len(), 2);
}

#[tokio::test]
async fn mark_read_patches_the_cached_notification() {
    let (server, api, _) = signed_in().await;
    with_notifications(&server, &api).await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/notifications/n1/mark-as-read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let handle = api.mark_notification_read("n1").unwrap();
    let key = EntityKey::notification("n1");
    assert_eq!(api.store().cache().get(&key).unwrap().value["read"], true);
    assert_eq!(handle.settled().await.unwrap(), MutationOutcome::Committed);
    assert_eq!(api.store().cache().get(&key).unwrap().value["read"], true);
}

#[tokio::test]
async fn mark_read_on_uncached_notification_has_no_local_state() {
    let (server, api, _) = signed_in().await;
    Mock::given(method("POST"))
        .and(path("/api/article/user/notifications/n9/mark-as-read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let handle = api.mark_notification_read("n9").unwrap();
    assert_eq!(handle.settled().await.unwrap(), MutationOutcome::Committed);
    assert!(!api.store().cache().contains(&EntityKey::notification("n9")));
}

#[tokio::test]
async fn delete_notification_evicts_on_success() {
    let (server, api, _) = signed_in().await;
    with_notifications(&server, &api).await;
    Mock::given(method("DELETE"))
        .and(path("/api/article/user/notifications/n1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Deleted"})))
        .mount(&server)
        .await;

    let outcome = api.delete_notification("n1").await.unwrap();
    assert_eq!(outcome, MutationOutcome::Committed);
    assert!(api.store().cache().get(&EntityKey::notification("n1")).is_none());
    assert_eq!(
        api.store()
            .cache()
            .collection(&collections::notifications())
            .unwrap()
            .members,
        vec![EntityKey::notification("n2")]
    );
}

#[tokio::test]
async fn failed_delete_restores_the_notification() {
    let (server, api, _) = signed_in().await;
    with_notifications(&server, &api).await;
    Mock::given(method("DELETE"))
        .and(path("/api/article/user/notifications/n1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not found"})))
        .mount(&server)
        .await;

    let outcome = api.delete_notification("n1").await.unwrap();
    assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
    let entry = api.store().cache().get(&EntityKey::notification("n1")).unwrap();
    assert!(entry.value.get("deleted").is_none());
    assert_eq!(entry.value["message"], "Ada followed you");
}

// ── Communities and comments ────────────────────────────────────

#[tokio::test]
async fn join_community_adds_membership() {
    let (server, api, _) = signed_in().await;
    mount_profile(&server, json!({"_id": "u1"})).await;
    mount_get(
        &server,
        "/api/article/community/single/c1",
        json!({"community": {"_id": "c1", "name": "Rustaceans", "members": [{"userId": "u9"}]}}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/article/community/join/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Joined"})))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(api.has_joined("c1"), None);
    let handle = api.join_community("c1").await.unwrap();
    assert_eq!(api.has_joined("c1"), Some(true));
    assert_eq!(handle.settled().await.unwrap(), MutationOutcome::Committed);

    let members = api.store().cache().get(&EntityKey::community("c1")).unwrap().value["members"].clone();
    assert_eq!(members, json!([{"userId": "u9"}, {"userId": "u1"}]));
}

#[tokio::test]
async fn refused_join_marks_the_community_stale() {
    let (server, api, _) = signed_in().await;
    mount_profile(&server, json!({"_id": "u1"})).await;
    mount_get(
        &server,
        "/api/article/community/single/c1",
        json!({"community": {"_id": "c1", "name": "Rustaceans", "members": []}}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/article/community/join/c1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "Private"})))
        .mount(&server)
        .await;

    let handle = api.join_community("c1").await.unwrap();
    assert!(matches!(handle.settled().await.unwrap(), MutationOutcome::RolledBack(_)));

    let community = api.store().cache().get(&EntityKey::community("c1")).unwrap();
    assert_eq!(community.value["members"], json!([]));
    assert_eq!(community.state, EntryState::Stale);
    assert_eq!(api.has_joined("c1"), Some(false));
}

#[tokio::test]
async fn comment_shows_placeholder_then_caches_server_comment() {
    let (server, api, _) = signed_in().await;
    mount_get(
        &server,
        "/api/article/post/single/1",
        json!({"article": {"_id": "1", "title": "A", "comments": []}}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/api/article/post/comment/1"))
        .and(body_json(json!({"text": "Nice read"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"comment": {"_id": "k1", "text": "Nice read"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let handle = api.comment("1", "Nice read").await.unwrap();
    let article = api.store().cache().get(&EntityKey::article("1")).unwrap();
    assert_eq!(article.value["comments"], json!([{"text": "Nice read", "pending": true}]));

    assert_eq!(handle.settled().await.unwrap(), MutationOutcome::Committed);
    assert_eq!(
        api.store().cache().get(&EntityKey::comment("k1")).unwrap().value["text"],
        "Nice read"
    );
    assert_eq!(
        api.store().cache().get(&EntityKey::article("1")).unwrap().state,
        EntryState::Stale
    );
}

#[tokio::test]
async fn logout_invalidates_profile() {
    let (server, api, _) = signed_in().await;
    mount_profile(&server, json!({"_id": "u1"})).await;
    api.profile().await.unwrap();

    api.logout();
    assert_eq!(api.store().session().status(), SessionStatus::Anonymous);
    assert_eq!(
        api.store().cache().get(&EntityKey::me()).unwrap().state,
        EntryState::Stale
    );
}

// ── Publishing ──────────────────────────────────────────────────

async fn with_article_lists(server: &MockServer, api: &BlogApi) {
    mount_profile(server, json!({"_id": "u1"})).await;
    mount_get(server, "/api/article/post/all", json!({"allArticles": [{"_id": "1", "title": "A"}]})).await;
    mount_get(server, "/api/article/user/myArticles", json!({"posts": []})).await;
    mount_get(server, "/api/article/post/article/u1", json!({"posts": []})).await;
    api.profile().await.unwrap();
    api.articles().await.unwrap();
    api.my_articles().await.unwrap();
    api.articles_by_author("u1").await.unwrap();
}

fn collection_state(api: &BlogApi, key: &quire_types::CollectionKey) -> EntryState {
    api.store().cache().collection(key).unwrap().state
}

#[tokio::test]
async fn create_article_caches_it_and_marks_lists_stale() {
    let (server, api, _) = signed_in().await;
    with_article_lists(&server, &api).await;
    Mock::given(method("POST"))
        .and(path("/api/articles"))
        .and(body_json(json!({
            "title": "Ownership",
            "description": "Borrowing explained",
            "content": "...",
            "categories": ["Rust"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "article": {"_id": "9", "title": "Ownership", "categories": ["Rust"]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let draft = ArticleDraft::new("Ownership", "Borrowing explained", "...").with_category("Rust");
    let created = api.create_article(&draft).await.unwrap().unwrap();

    assert_eq!(created.key, EntityKey::article("9"));
    assert_eq!(created.state, EntryState::Fresh);
    assert_eq!(api.store().cache().get(&EntityKey::article("9")).unwrap().value["title"], "Ownership");
    assert_eq!(collection_state(&api, &collections::all_articles()), EntryState::Stale);
    assert_eq!(collection_state(&api, &collections::my_articles()), EntryState::Stale);
    assert_eq!(collection_state(&api, &collections::articles_by_author("u1")), EntryState::Stale);
}

#[tokio::test]
async fn community_post_carries_the_community_and_marks_its_posts_stale() {
    let (server, api, _) = signed_in().await;
    with_article_lists(&server, &api).await;
    mount_get(&server, "/api/article/community/posts/c1", json!({"posts": []})).await;
    mount_get(&server, "/api/article/community/posts/c2", json!({"posts": []})).await;
    api.community_posts("c1").await.unwrap();
    api.community_posts("c2").await.unwrap();
    Mock::given(method("POST"))
        .and(path("/api/article/community/add"))
        .and(body_json(json!({
            "communityId": "c1",
            "title": "Meetup",
            "description": "Friday",
            "content": "Bring snacks",
            "image": "https://img.example.com/m.png"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "post": {"_id": "p1", "title": "Meetup"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let draft = ArticleDraft::new("Meetup", "Friday", "Bring snacks").with_image("https://img.example.com/m.png");
    let created = api.post_to_community("c1", &draft).await.unwrap().unwrap();

    assert_eq!(created.key, EntityKey::article("p1"));
    assert_eq!(collection_state(&api, &collections::community_posts("c1")), EntryState::Stale);
    assert_eq!(collection_state(&api, &collections::community_posts("c2")), EntryState::Fresh);
    assert_eq!(collection_state(&api, &collections::all_articles()), EntryState::Stale);
    assert_eq!(collection_state(&api, &collections::my_articles()), EntryState::Stale);
}

#[tokio::test]
async fn publish_response_without_article_still_marks_lists_stale() {
    let (server, api, _) = signed_in().await;
    with_article_lists(&server, &api).await;
    Mock::given(method("POST"))
        .and(path("/api/articles"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "Created"})))
        .mount(&server)
        .await;

    let created = api
        .create_article(&ArticleDraft::new("T", "D", "C"))
        .await
        .unwrap();
    assert_eq!(created, None);
    assert_eq!(collection_state(&api, &collections::all_articles()), EntryState::Stale);
}

#[tokio::test]
async fn refused_publish_changes_nothing() {
    let (server, api, _) = signed_in().await;
    with_article_lists(&server, &api).await;
    Mock::given(method("POST"))
        .and(path("/api/articles"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "Title taken"})))
        .mount(&server)
        .await;

    let err = api
        .create_article(&ArticleDraft::new("T", "D", "C"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(collection_state(&api, &collections::all_articles()), EntryState::Fresh);
}

#[tokio::test]
async fn publishing_needs_a_session_and_a_title() {
    let (server, api) = setup().await;

    let err = api
        .create_article(&ArticleDraft::new("T", "D", "C"))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let err = api
        .create_article(&ArticleDraft::new("  ", "D", "C"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidForm(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
