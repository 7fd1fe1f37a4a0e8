//! HTTP client for the Quire resource store.
//!
//! Connects a [`quire_store::ResourceStore`] to the blogging API:
//! - [`ReqwestClient`]: the `reqwest` implementation of
//!   [`quire_store::HttpClient`], attaching the bearer token of the store's
//!   session
//! - [`decode_session`]: reads the `exp` claim of a compact JWT
//! - [`BlogApi`]: every endpoint of the API as cached reads and optimistic
//!   writes
//! - [`ClientConfig`]: base URL, timeout and endpoint paths
//! - [`ArticleDraft`], [`SignUp`]: forms that create resources

pub mod api;
pub mod auth;
pub mod config;
pub mod draft;
pub mod error;
pub mod http;

pub use api::BlogApi;
pub use auth::{Credentials, SignUp, decode_session};
pub use config::{ClientConfig, Endpoints};
pub use draft::ArticleDraft;
pub use error::{ClientError, ClientResult};
pub use http::ReqwestClient;
