//! Client configuration: where the API lives and how its paths look.

use quire_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Placeholder substituted with a (percent-encoded) id in endpoint paths.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Configuration for [`BlogApi`](crate::BlogApi) and its transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every relative endpoint path is joined to.
    pub base_url: String,
    /// Per-request timeout (in seconds).
    pub timeout_secs: u64,
    /// Endpoint paths.
    pub endpoints: Endpoints,
    /// Settings of the resource store the client feeds.
    pub store: StoreConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            timeout_secs: 30,
            endpoints: Endpoints::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Rejects configurations no request could succeed with.
    pub fn validate(&self) -> ClientResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Paths of the blogging API. Paths are relative to `base_url` unless they
/// are absolute URLs; `{id}` is replaced per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub sign_up: String,
    pub all_articles: String,
    pub article: String,
    pub related_articles: String,
    pub articles_by_author: String,
    pub my_articles: String,
    pub profile: String,
    pub user: String,
    pub notifications: String,
    pub bookmark: String,
    pub library: String,
    pub follow: String,
    pub unfollow: String,
    pub mark_notification_read: String,
    pub delete_notification: String,
    pub community: String,
    pub community_posts: String,
    pub join_community: String,
    pub comment: String,
    pub create_article: String,
    pub community_post: String,
    pub author: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/api/connect/auth/login".to_string(),
            sign_up: "/api/signup".to_string(),
            all_articles: "/api/article/post/all".to_string(),
            article: "/api/article/post/single/{id}".to_string(),
            related_articles: "/api/article/post/related/{id}".to_string(),
            articles_by_author: "/api/article/post/article/{id}".to_string(),
            my_articles: "/api/article/user/myArticles".to_string(),
            profile: "/api/article/user/profile".to_string(),
            user: "/api/article/user/user/{id}".to_string(),
            notifications: "/api/article/user/notifications".to_string(),
            bookmark: "/api/article/user/bookmark/{id}".to_string(),
            library: "/api/article/user/library/{id}".to_string(),
            follow: "/api/article/user/follow/{id}".to_string(),
            unfollow: "/api/article/user/unfollow/{id}".to_string(),
            mark_notification_read: "/api/article/user/notifications/{id}/mark-as-read".to_string(),
            delete_notification: "/api/article/user/notifications/{id}".to_string(),
            community: "/api/article/community/single/{id}".to_string(),
            community_posts: "/api/article/community/posts/{id}".to_string(),
            join_community: "/api/article/community/join/{id}".to_string(),
            comment: "/api/article/post/comment/{id}".to_string(),
            create_article: "/api/articles".to_string(),
            community_post: "/api/article/community/add".to_string(),
            author: "/api/article/user/author/{id}".to_string(),
        }
    }
}

/// Substitutes the percent-encoded `id` into `template`.
pub fn with_id(template: &str, id: &str) -> String {
    template.replace(ID_PLACEHOLDER, &urlencoding::encode(id))
}
