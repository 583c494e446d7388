//! In-process [`PostBackend`] implementation.
//!
//! Keeps posts, sections and uploaded images in memory. Besides serving the
//! command-line front end and tests, it can simulate an outage and an
//! artificial latency, and it counts the calls it receives.

use async_trait::async_trait;
use chrono::Utc;
use scriptorium_api::{
    BackendError, BackendResult, NewPost, Post, PostBackend, PostFilter, PostOrder, PostUpdate,
    Section,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub fetches: usize,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub lists: usize,
    pub section_fetches: usize,
    pub uploads: usize,
}

impl CallStats {
    /// Calls that would have written to the backend.
    pub fn writes(&self) -> usize {
        self.inserts + self.updates + self.deletes + self.uploads
    }

    pub fn total(&self) -> usize {
        self.writes() + self.fetches + self.lists + self.section_fetches
    }
}

#[derive(Debug, Default)]
struct State {
    posts: HashMap<String, Post>,
    sections: Vec<Section>,
    images: HashMap<String, usize>,
    stats: CallStats,
}

/// Backend holding everything in memory.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::MemoryBackend;
/// use scriptorium_api::{NewPost, PostBackend, PostContent};
///
/// # tokio_test::block_on(async {
/// let backend = MemoryBackend::new();
/// let post = backend
///     .insert_post(NewPost::draft("Hello", "hello", PostContent::new("<p>Hi</p>")))
///     .await?;
/// assert!(backend.fetch_post(&post.id).await?.is_some());
/// assert_eq!(backend.stats().inserts, 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    available: AtomicBool,
    next_id: AtomicU64,
    latency_ms: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// A backend pre-populated with sections.
    pub fn with_sections(sections: Vec<Section>) -> Self {
        let backend = Self::new();
        if let Ok(mut state) = backend.state.lock() {
            state.sections = sections;
        }
        backend
    }

    /// Toggle a simulated outage. While unavailable every call fails with a
    /// network error, still counted in the statistics.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn stats(&self) -> CallStats {
        self.state.lock().map(|s| s.stats).unwrap_or_default()
    }

    /// Store a post directly, bypassing statistics.
    pub fn seed_post(&self, post: Post) {
        if let Ok(mut state) = self.state.lock() {
            state.posts.insert(post.id.clone(), post);
        }
    }

    /// All stored posts, bypassing statistics.
    pub fn posts(&self) -> Vec<Post> {
        self.state
            .lock()
            .map(|s| s.posts.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Size in bytes of an uploaded image.
    pub fn image_size(&self, url: &str) -> Option<usize> {
        self.state.lock().ok()?.images.get(url).copied()
    }

    /// Count the call, apply latency and fail when the backend is down.
    async fn enter(&self, record: impl FnOnce(&mut CallStats)) -> BackendResult<()> {
        self.with_state(|state| record(&mut state.stats))?;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if !self.is_available() {
            return Err(BackendError::network("backend unavailable"));
        }
        Ok(())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> BackendResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BackendError::Other("backend state poisoned".to_string()))?;
        Ok(f(&mut *state))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostBackend for MemoryBackend {
    async fn fetch_post(&self, id: &str) -> BackendResult<Option<Post>> {
        self.enter(|s| s.fetches += 1).await?;
        self.with_state(|state| state.posts.get(id).cloned())
    }

    async fn insert_post(&self, post: NewPost) -> BackendResult<Post> {
        self.enter(|s| s.inserts += 1).await?;
        if post.title.trim().is_empty() {
            return Err(BackendError::Constraint("title must not be empty".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let stored = post.into_post(id.clone(), Utc::now());
        debug!("Inserted post {} ({})", id, stored.slug);
        self.with_state(|state| {
            state.posts.insert(id, stored.clone());
        })?;
        Ok(stored)
    }

    async fn update_post(&self, id: &str, update: PostUpdate) -> BackendResult<()> {
        self.enter(|s| s.updates += 1).await?;
        self.with_state(|state| match state.posts.get_mut(id) {
            Some(post) => {
                update.apply_to(post, Utc::now());
                Ok(())
            }
            None => Err(BackendError::NotFound(format!("post {}", id))),
        })?
    }

    async fn delete_post(&self, id: &str) -> BackendResult<()> {
        self.enter(|s| s.deletes += 1).await?;
        self.with_state(|state| {
            state.posts.remove(id);
        })
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        order: PostOrder,
        limit: usize,
    ) -> BackendResult<Vec<Post>> {
        self.enter(|s| s.lists += 1).await?;
        let mut posts = self.with_state(|state| {
            state
                .posts
                .values()
                .filter(|post| filter.matches(post))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        order.sort(&mut posts);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn fetch_sections(&self) -> BackendResult<Vec<Section>> {
        self.enter(|s| s.section_fetches += 1).await?;
        self.with_state(|state| state.sections.clone())
    }

    async fn upload_image(&self, bytes: Vec<u8>) -> BackendResult<String> {
        self.enter(|s| s.uploads += 1).await?;
        let url = format!("memory://images/{}.img", uuid::Uuid::new_v4());
        self.with_state(|state| {
            state.images.insert(url.clone(), bytes.len());
        })?;
        Ok(url)
    }
}
