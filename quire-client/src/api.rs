//! The blogging API on top of the resource store.
//!
//! Reads go through the [`QueryExecutor`](quire_store::QueryExecutor), so
//! concurrent views share one request and cached data is served while it
//! revalidates. Writes go through the
//! [`OptimisticMutator`](quire_store::OptimisticMutator): the cache shows the
//! result at once and is rolled back if the server refuses.
//!
//! The signed-in profile carries the user's `bookMarks`, `library` and
//! `following` lists, so bookmarking, saving and following patch `user:me`.
//!
//! Publishing is not optimistic: a new article has no id until the server
//! assigns one.

use futures::future::{BoxFuture, FutureExt};
use quire_model::{Community, EntityShape, Patch, entity_id, validate_shape};
use quire_store::{
    CacheEntry, EntityCache, HttpClient, HttpRequest, InverseError, MutationHandle, MutationOutcome, QueryKey,
    ResourceStore, Session, StoreError, TransportError,
};
use quire_types::{CollectionKey, EntityKey, ResourceType};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{Credentials, SignUp, decode_session};
use crate::config::{ClientConfig, Endpoints, ID_PLACEHOLDER, with_id};
use crate::draft::{ArticleDraft, CommunityPost};
use crate::error::{ClientError, ClientResult};
use crate::http::ReqwestClient;

type Call = BoxFuture<'static, Result<Option<Value>, TransportError>>;
type Load = BoxFuture<'static, Result<Value, TransportError>>;

/// Collection keys the API fills.
pub mod collections {
    use quire_types::CollectionKey;

    pub fn all_articles() -> CollectionKey {
        CollectionKey::public("articles:all")
    }

    pub fn related_articles(categories: &[String]) -> CollectionKey {
        CollectionKey::public(format!("articles:related:{}", categories.join(",")))
    }

    pub fn articles_by_author(user_id: &str) -> CollectionKey {
        CollectionKey::public(format!("articles:author:{user_id}"))
    }

    pub fn my_articles() -> CollectionKey {
        CollectionKey::user_scoped("articles:mine")
    }

    pub fn notifications() -> CollectionKey {
        CollectionKey::user_scoped("notifications:me")
    }

    pub fn community_posts(community_id: &str) -> CollectionKey {
        CollectionKey::public(format!("community:{community_id}:posts"))
    }
}

/// Typed access to every endpoint of the blogging API.
#[derive(Clone)]
pub struct BlogApi {
    store: ResourceStore,
    http: Arc<dyn HttpClient>,
    endpoints: Arc<Endpoints>,
}

impl std::fmt::Debug for BlogApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlogApi")
            .field("store", &self.store)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl BlogApi {
    pub fn new(store: ResourceStore, http: Arc<dyn HttpClient>, endpoints: Endpoints) -> Self {
        Self {
            store,
            http,
            endpoints: Arc::new(endpoints),
        }
    }

    /// Builds a store from `config.store` and a [`ReqwestClient`] bound to
    /// its session.
    pub fn connect(config: &ClientConfig) -> ClientResult<Self> {
        Self::with_store(ResourceStore::new(config.store.clone()), config)
    }

    /// Like [`connect`](Self::connect), on a caller-built store.
    pub fn with_store(store: ResourceStore, config: &ClientConfig) -> ClientResult<Self> {
        let http = ReqwestClient::new(config)?.with_session(store.session().clone());
        Ok(Self::new(store, Arc::new(http), config.endpoints.clone()))
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // ── Session ─────────────────────────────────────────────────

    /// Exchanges credentials for a token and starts the session.
    pub async fn login(&self, credentials: &Credentials) -> ClientResult<Session> {
        let request =
            HttpRequest::post(self.endpoints.login.clone()).with_body(serde_json::to_value(credentials)?);
        let response = self.http.request(request).await?;
        let token = response
            .get("accessToken")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::InvalidToken("login response has no accessToken".to_string()))?;

        let session = decode_session(token)?;
        self.store.session().login(session.clone());
        info!(email = %credentials.email, "Logged in");
        Ok(session)
    }

    /// Registers an account. If the response carries a readable token the
    /// session starts as after [`login`](Self::login).
    pub async fn sign_up(&self, form: &SignUp) -> ClientResult<Option<Session>> {
        form.validate()?;
        let request =
            HttpRequest::post(self.endpoints.sign_up.clone()).with_body(serde_json::to_value(form)?);
        let response = self.http.request(request).await?;
        let token = ["token", "accessToken"]
            .iter()
            .find_map(|field| response.get(*field).and_then(Value::as_str));
        let Some(token) = token else {
            info!(email = %form.email, "Signed up");
            return Ok(None);
        };

        let session = decode_session(token)?;
        self.store.session().login(session.clone());
        info!(email = %form.email, "Signed up and logged in");
        Ok(Some(session))
    }

    pub fn logout(&self) {
        self.store.session().logout();
    }

    // ── Reads ───────────────────────────────────────────────────

    pub async fn articles(&self) -> ClientResult<Vec<CacheEntry>> {
        let path = self.endpoints.all_articles.clone();
        self.list(collections::all_articles(), ResourceType::Article, path, "allArticles")
            .await
    }

    pub async fn article(&self, id: &str) -> ClientResult<Value> {
        let path = with_id(&self.endpoints.article, id);
        self.one(EntityKey::article(id), path, "article").await
    }

    /// Articles sharing any of `categories`.
    pub async fn related_articles(&self, categories: &[String]) -> ClientResult<Vec<CacheEntry>> {
        let joined = categories
            .iter()
            .map(|c| urlencoding::encode(c).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let path = self.endpoints.related_articles.replace(ID_PLACEHOLDER, &joined);
        self.list(collections::related_articles(categories), ResourceType::Article, path, "posts")
            .await
    }

    pub async fn articles_by_author(&self, user_id: &str) -> ClientResult<Vec<CacheEntry>> {
        let path = with_id(&self.endpoints.articles_by_author, user_id);
        self.list(collections::articles_by_author(user_id), ResourceType::Article, path, "posts")
            .await
    }

    pub async fn my_articles(&self) -> ClientResult<Vec<CacheEntry>> {
        let path = self.endpoints.my_articles.clone();
        self.list(collections::my_articles(), ResourceType::Article, path, "posts")
            .await
    }

    /// The signed-in user's profile, cached as `user:me`.
    pub async fn profile(&self) -> ClientResult<Value> {
        let path = self.endpoints.profile.clone();
        self.one(EntityKey::me(), path, "user").await
    }

    pub async fn user(&self, id: &str) -> ClientResult<Value> {
        let path = with_id(&self.endpoints.user, id);
        self.one(EntityKey::user(id), path, "user").await
    }

    /// An article's author. Cached under the same key as [`user`](Self::user).
    pub async fn author(&self, id: &str) -> ClientResult<Value> {
        let path = with_id(&self.endpoints.author, id);
        self.one(EntityKey::user(id), path, "user").await
    }

    pub async fn notifications(&self) -> ClientResult<Vec<CacheEntry>> {
        let path = self.endpoints.notifications.clone();
        self.list(collections::notifications(), ResourceType::Notification, path, "notifications")
            .await
    }

    pub async fn community(&self, id: &str) -> ClientResult<Value> {
        let path = with_id(&self.endpoints.community, id);
        self.one(EntityKey::community(id), path, "community").await
    }

    pub async fn community_posts(&self, id: &str) -> ClientResult<Vec<CacheEntry>> {
        let path = with_id(&self.endpoints.community_posts, id);
        self.list(collections::community_posts(id), ResourceType::Article, path, "posts")
            .await
    }

    async fn one(&self, key: EntityKey, path: String, field: &'static str) -> ClientResult<Value> {
        let loader = self.loader(path, move |body| unwrap_entity(body, field));
        Ok(self.store.query().fetch(key, loader).await?)
    }

    async fn list(
        &self,
        key: CollectionKey,
        resource: ResourceType,
        path: String,
        field: &'static str,
    ) -> ClientResult<Vec<CacheEntry>> {
        let loader = self.loader(path, move |body| unwrap_list(body, field));
        Ok(self.store.query().fetch_collection(key, resource, loader).await?)
    }

    fn loader<U>(&self, path: String, unwrap: U) -> impl Fn() -> Load + Send + Sync + 'static
    where
        U: Fn(Value) -> Result<Value, TransportError> + Copy + Send + Sync + 'static,
    {
        let http = Arc::clone(&self.http);
        move || {
            let http = Arc::clone(&http);
            let request = HttpRequest::get(path.clone());
            async move { unwrap(http.request(request).await?) }.boxed()
        }
    }

    // ── Cached state ────────────────────────────────────────────

    /// Whether the cached profile lists `article_id` among its bookmarks.
    /// `None` until the profile has been fetched.
    pub fn is_bookmarked(&self, article_id: &str) -> Option<bool> {
        self.profile_lists("bookMarks", article_id)
    }

    pub fn is_in_library(&self, article_id: &str) -> Option<bool> {
        self.profile_lists("library", article_id)
    }

    pub fn is_following(&self, user_id: &str) -> Option<bool> {
        self.profile_lists("following", user_id)
    }

    /// Whether the signed-in user is a member of the cached community.
    pub fn has_joined(&self, community_id: &str) -> Option<bool> {
        let me = self.store.cache().get(&EntityKey::me())?;
        let me = entity_id(ResourceType::User, &me.value).ok()?;
        let community = self.store.cache().get(&EntityKey::community(community_id))?;
        let community = Community::from_value(&community.value).ok()?;
        Some(community.has_member(&me))
    }

    fn profile_lists(&self, field: &str, id: &str) -> Option<bool> {
        let me = self.store.cache().get(&EntityKey::me())?;
        Some(list_contains(&me.value[field], id))
    }

    // ── Writes ──────────────────────────────────────────────────

    pub async fn bookmark(&self, article_id: &str) -> ClientResult<MutationHandle> {
        let path = with_id(&self.endpoints.bookmark, article_id);
        self.update_profile_list("bookMarks", article_id, true, path, Vec::new())
            .await
    }

    pub async fn add_to_library(&self, article_id: &str) -> ClientResult<MutationHandle> {
        let path = with_id(&self.endpoints.library, article_id);
        self.update_profile_list("library", article_id, true, path, Vec::new())
            .await
    }

    /// Follows `user_id`. Their profile is revalidated once the server agrees.
    pub async fn follow(&self, user_id: &str) -> ClientResult<MutationHandle> {
        let path = with_id(&self.endpoints.follow, user_id);
        let stale = vec![QueryKey::Entity(EntityKey::user(user_id))];
        self.update_profile_list("following", user_id, true, path, stale)
            .await
    }

    pub async fn unfollow(&self, user_id: &str) -> ClientResult<MutationHandle> {
        let path = with_id(&self.endpoints.unfollow, user_id);
        let stale = vec![QueryKey::Entity(EntityKey::user(user_id))];
        self.update_profile_list("following", user_id, false, path, stale)
            .await
    }

    pub fn mark_notification_read(&self, id: &str) -> ClientResult<MutationHandle> {
        let path = with_id(&self.endpoints.mark_notification_read, id);
        let call = self.call(HttpRequest::post(path), Vec::new(), None);
        self.submit(EntityKey::notification(id), Patch::new().set("read", true), call)
    }

    /// Hides the notification at once and evicts it when the server confirms
    /// the delete. Waits for the outcome.
    pub async fn delete_notification(&self, id: &str) -> ClientResult<MutationOutcome> {
        let key = EntityKey::notification(id);
        let path = with_id(&self.endpoints.delete_notification, id);
        let call = self.call(HttpRequest::delete(path), Vec::new(), None);
        let handle = self.submit(key.clone(), Patch::new().set("deleted", true), call)?;

        let outcome = handle.settled().await?;
        if matches!(outcome, MutationOutcome::Committed) {
            self.store.cache().remove(&key);
        }
        Ok(outcome)
    }

    /// Adds the signed-in user to the community's members. A refused join
    /// marks the community stale.
    pub async fn join_community(&self, id: &str) -> ClientResult<MutationHandle> {
        self.store.session().require_valid()?;
        let me = entity_id(ResourceType::User, &self.profile().await?)?;
        let community = self.community(id).await?;

        let mut members = community["members"].as_array().cloned().unwrap_or_default();
        let joined = members
            .iter()
            .any(|m| m.get("userId").and_then(Value::as_str) == Some(me.as_str()));
        if !joined {
            members.push(json!({ "userId": me }));
        }

        let key = EntityKey::community(id);
        let path = with_id(&self.endpoints.join_community, id);
        let call = self.call(HttpRequest::post(path), Vec::new(), Some(key.clone()));
        let patch = Patch::new().set("members", Value::Array(members));
        Ok(self.store.mutator().mutate_computed(key, patch, call)?)
    }

    /// Posts a comment. A placeholder is appended to the article's comments
    /// immediately; on success the server's comment is cached and the
    /// article is marked stale so the next read replaces the placeholder.
    pub async fn comment(&self, article_id: &str, text: &str) -> ClientResult<MutationHandle> {
        self.store.session().require_valid()?;
        let article = self.article(article_id).await?;

        let mut comments = article["comments"].as_array().cloned().unwrap_or_default();
        comments.push(json!({ "text": text, "pending": true }));
        let patch = Patch::new().set("comments", Value::Array(comments));

        let key = EntityKey::article(article_id);
        let request = HttpRequest::post(with_id(&self.endpoints.comment, article_id))
            .with_body(json!({ "text": text }));
        let http = Arc::clone(&self.http);
        let cache = self.store.cache().clone();
        let target = key.clone();
        let call = move || -> Call {
            async move {
                let body = http.request(request).await?;
                if let Ok(comment) = unwrap_entity(body, "comment") {
                    cache_comment(&cache, comment);
                }
                cache.invalidate(&target);
                Ok::<_, TransportError>(None)
            }
            .boxed()
        };
        Ok(self.store.mutator().mutate_computed(key, patch, call)?)
    }

    // ── Publishing ──────────────────────────────────────────────

    /// Publishes an article and caches the server's copy. Every article list
    /// of the signed-in user is marked stale.
    pub async fn create_article(&self, draft: &ArticleDraft) -> ClientResult<Option<CacheEntry>> {
        draft.validate()?;
        self.store.session().require_valid()?;
        let request = HttpRequest::post(self.endpoints.create_article.clone())
            .with_body(serde_json::to_value(draft)?);
        self.publish(request, Vec::new()).await
    }

    /// Publishes an article into a community. The community's posts are
    /// marked stale along with the user's article lists.
    pub async fn post_to_community(
        &self,
        community_id: &str,
        draft: &ArticleDraft,
    ) -> ClientResult<Option<CacheEntry>> {
        draft.validate()?;
        self.store.session().require_valid()?;
        let body = CommunityPost { community_id, draft };
        let request = HttpRequest::post(self.endpoints.community_post.clone())
            .with_body(serde_json::to_value(&body)?);
        self.publish(request, vec![collections::community_posts(community_id)])
            .await
    }

    async fn publish(&self, request: HttpRequest, mut stale: Vec<CollectionKey>) -> ClientResult<Option<CacheEntry>> {
        let body = self.http.request(request).await?;
        let cache = self.store.cache();
        let created = created_article(body).map(|(id, article)| cache.put(EntityKey::article(id), article));
        if created.is_none() {
            debug!("Publish response carries no article");
        }

        stale.extend([collections::all_articles(), collections::my_articles()]);
        let me = cache
            .get(&EntityKey::me())
            .and_then(|me| entity_id(ResourceType::User, &me.value).ok());
        if let Some(me) = me {
            stale.push(collections::articles_by_author(&me));
        }
        for key in &stale {
            cache.invalidate_collection(key);
        }
        Ok(created)
    }

    async fn update_profile_list(
        &self,
        field: &'static str,
        id: &str,
        present: bool,
        path: String,
        stale: Vec<QueryKey>,
    ) -> ClientResult<MutationHandle> {
        self.store.session().require_valid()?;
        let profile = self.profile().await?;
        let list = with_membership(&profile[field], id, present);

        let call = self.call(HttpRequest::post(path), stale, Some(EntityKey::me()));
        let patch = Patch::new().set(field, list);
        Ok(self
            .store
            .mutator()
            .mutate_computed(EntityKey::me(), patch, call)?)
    }

    /// Optimistic write with an inverse computed from the cache. An uncached
    /// key is sent with an explicit inverse and no local state.
    fn submit<C>(&self, key: EntityKey, patch: Patch, call: C) -> ClientResult<MutationHandle>
    where
        C: FnOnce() -> Call + Clone + Send + 'static,
    {
        let mutator = self.store.mutator();
        match mutator.mutate_computed(key.clone(), patch.clone(), call.clone()) {
            Err(StoreError::InverseComputation {
                reason: InverseError::NotCached,
                ..
            }) => {
                debug!(key = %key, "Target not cached; sending without local state");
                let inverse = patch
                    .fields()
                    .fold(Patch::new(), |inverse, field| inverse.remove(field));
                Ok(mutator.mutate(key, patch, inverse, call)?)
            }
            other => Ok(other?),
        }
    }

    /// A network call that discards the response body. On success `stale`
    /// is marked for revalidation. On failure `reconcile` is, so the next
    /// read replaces a rolled-back value that was built from an older read.
    fn call(
        &self,
        request: HttpRequest,
        stale: Vec<QueryKey>,
        reconcile: Option<EntityKey>,
    ) -> impl FnOnce() -> Call + Clone + Send + 'static {
        let http = Arc::clone(&self.http);
        let cache = self.store.cache().clone();
        move || -> Call {
            async move {
                if let Err(e) = http.request(request).await {
                    if let Some(key) = &reconcile {
                        cache.invalidate(key);
                    }
                    return Err(e);
                }
                for key in &stale {
                    match key {
                        QueryKey::Entity(key) => cache.invalidate(key),
                        QueryKey::Collection(key) => cache.invalidate_collection(key),
                    }
                }
                Ok::<_, TransportError>(None)
            }
            .boxed()
        }
    }
}

fn cache_comment(cache: &EntityCache, comment: Value) {
    if validate_shape(ResourceType::Comment, &comment).is_err() {
        return;
    }
    if let Ok(id) = entity_id(ResourceType::Comment, &comment) {
        cache.put(EntityKey::comment(id), comment);
    }
}

/// The article in a publish response, with its id. Servers answer with
/// either an `article` or a `post` field.
fn created_article(body: Value) -> Option<(String, Value)> {
    ["article", "post"].iter().find_map(|field| {
        let article = unwrap_entity(body.clone(), field).ok()?;
        validate_shape(ResourceType::Article, &article).ok()?;
        let id = entity_id(ResourceType::Article, &article).ok()?;
        Some((id, article))
    })
}

/// Takes `field` out of a response object.
pub fn unwrap_entity(body: Value, field: &str) -> Result<Value, TransportError> {
    match body {
        Value::Object(mut obj) => obj
            .remove(field)
            .filter(|value| !value.is_null())
            .ok_or_else(|| TransportError::Decode(format!("response has no `{field}`"))),
        _ => Err(TransportError::Decode("response is not a JSON object".to_string())),
    }
}

/// Takes list `field` out of a response object. A missing or null list is
/// empty.
pub fn unwrap_list(body: Value, field: &str) -> Result<Value, TransportError> {
    match body {
        Value::Object(mut obj) => match obj.remove(field) {
            None | Some(Value::Null) => Ok(Value::Array(Vec::new())),
            Some(list) => Ok(list),
        },
        _ => Err(TransportError::Decode("response is not a JSON object".to_string())),
    }
}

/// List entries are either ids or populated objects with an `_id`.
fn refers_to(item: &Value, id: &str) -> bool {
    item.as_str() == Some(id) || item.get("_id").and_then(Value::as_str) == Some(id)
}

fn list_contains(list: &Value, id: &str) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|item| refers_to(item, id)))
}

/// `list` with `id` added (`present`) or removed.
fn with_membership(list: &Value, id: &str, present: bool) -> Value {
    let mut items = list.as_array().cloned().unwrap_or_default();
    if present {
        if !items.iter().any(|item| refers_to(item, id)) {
            items.push(Value::String(id.to_string()));
        }
    } else {
        items.retain(|item| !refers_to(item, id));
    }
    Value::Array(items)
}
