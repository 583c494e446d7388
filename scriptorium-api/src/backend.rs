//! The backend contract consumed by the editor.
//!
//! Persistence, authentication and file storage belong to a hosted service.
//! The editor only needs the handful of operations below; any transport
//! (REST, RPC, SQL through a client library) can sit behind the trait.

use crate::post::{NewPost, Post, PostFilter, PostOrder, PostUpdate, Section};
use async_trait::async_trait;
use thiserror::Error;

/// Result type returned by [`PostBackend`] operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Failures reported by a backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The service could not be reached
    #[error("network error: {0}")]
    Network(String),

    /// The service refused the write (unique key, foreign key, ...)
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The caller is not allowed to perform the operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The referenced record does not exist
    #[error("record not found: {0}")]
    NotFound(String),

    /// Anything the service reported that fits no other bucket
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Abstract operations against the hosted backend.
#[async_trait]
pub trait PostBackend: Send + Sync {
    /// Read a single post. Missing ids yield `Ok(None)`.
    async fn fetch_post(&self, id: &str) -> BackendResult<Option<Post>>;

    /// Insert a post; the server assigns id and timestamps.
    async fn insert_post(&self, post: NewPost) -> BackendResult<Post>;

    /// Update the columns set in `update` on the post with `id`.
    async fn update_post(&self, id: &str, update: PostUpdate) -> BackendResult<()>;

    /// Delete a post. Deleting an id that does not exist succeeds.
    async fn delete_post(&self, id: &str) -> BackendResult<()>;

    /// List posts matching `filter`, sorted by `order`, at most `limit` rows.
    async fn list_posts(
        &self,
        filter: PostFilter,
        order: PostOrder,
        limit: usize,
    ) -> BackendResult<Vec<Post>>;

    /// All sections, used to populate the category selector.
    async fn fetch_sections(&self) -> BackendResult<Vec<Section>>;

    /// Store an image and return its public url.
    async fn upload_image(&self, bytes: Vec<u8>) -> BackendResult<String>;
}
