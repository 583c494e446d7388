//! # Drafts, search and pagination
//!
//! The draft list merges the posts stored on the backend with the local
//! fallback mirror. Server entries win when both sides know the same id;
//! local entries cover drafts that never made it to the server. Search spans
//! published posts on the server, section titles and the local drafts.

use crate::store::LocalDraftStore;
use crate::text;
use crate::events::EventBus;
use crate::Result;
use chrono::{DateTime, Utc};
use scriptorium_api::event::META_POST_ID;
use scriptorium_api::{Event, EventType, Post, PostBackend, PostFilter, PostOrder, Section};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on posts fetched for one user's draft list.
const LIST_LIMIT: usize = 500;

/// Characters shown in a draft preview.
pub const PREVIEW_LENGTH: usize = 150;

/// Publication state of a listed draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    #[default]
    Draft,
    Published,
}

impl DraftStatus {
    pub fn from_published(is_published: bool) -> Self {
        if is_published {
            Self::Published
        } else {
            Self::Draft
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized entry of the draft list, also the local mirror record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: String,
    pub title: String,
    /// Plain text of the body
    pub content: String,
    pub last_modified: DateTime<Utc>,
    pub word_count: usize,
    pub status: DraftStatus,
}

impl Draft {
    /// A draft stamped now, with the word count taken from `content`.
    pub fn new<I, T, C>(id: I, title: T, content: C, status: DraftStatus) -> Self
    where
        I: Into<String>,
        T: Into<String>,
        C: Into<String>,
    {
        let content = content.into();
        Self {
            id: id.into(),
            title: title.into(),
            word_count: content.split_whitespace().count(),
            content,
            last_modified: Utc::now(),
            status,
        }
    }

    /// Normalize a server post.
    pub fn from_post(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            content: text::plain_text(&post.content.html),
            last_modified: post.updated_at,
            word_count: text::word_count(&post.content.html),
            status: DraftStatus::from_published(post.is_published),
        }
    }

    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = at;
        self
    }

    /// Title for display; blank titles read "Untitled Draft".
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled Draft"
        } else {
            &self.title
        }
    }

    /// Leading characters of the body for list previews.
    pub fn preview(&self) -> String {
        text::excerpt(&self.content, PREVIEW_LENGTH)
    }

    /// Coarse age of the draft: "Just now", "5h ago", "3d ago".
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::drafts::{Draft, DraftStatus};
    ///
    /// let now = chrono::Utc::now();
    /// let draft = Draft::new("1", "t", "", DraftStatus::Draft)
    ///     .with_last_modified(now - chrono::Duration::hours(30));
    /// assert_eq!(draft.time_ago(now), "1d ago");
    /// ```
    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        let hours = (now - self.last_modified).num_hours();
        if hours < 1 {
            "Just now".to_string()
        } else if hours < 24 {
            format!("{}h ago", hours)
        } else {
            format!("{}d ago", hours / 24)
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.content.to_lowercase().contains(needle)
    }
}

/// Merge server and local drafts.
///
/// Local entries whose id the server already returned are dropped; the
/// result is sorted by last modification, newest first.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::drafts::{merge_drafts, Draft, DraftStatus};
///
/// let server = vec![Draft::new("1", "Server copy", "", DraftStatus::Published)];
/// let local = vec![
///     Draft::new("1", "Stale local copy", "", DraftStatus::Draft),
///     Draft::new("temp-5", "Offline draft", "", DraftStatus::Draft),
/// ];
/// let merged = merge_drafts(server, local);
/// assert_eq!(merged.len(), 2);
/// assert!(merged.iter().any(|d| d.title == "Server copy"));
/// ```
pub fn merge_drafts(server: Vec<Draft>, local: Vec<Draft>) -> Vec<Draft> {
    let known: HashSet<String> = server.iter().map(|d| d.id.clone()).collect();
    let mut merged = server;
    merged.extend(local.into_iter().filter(|d| !known.contains(&d.id)));
    merged.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    merged
}

/// Combined search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Published posts on the server, newest first
    pub posts: Vec<Post>,
    /// Sections whose title matches
    pub sections: Vec<Section>,
    /// Local drafts matching the query
    pub drafts: Vec<Draft>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.sections.is_empty() && self.drafts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.posts.len() + self.sections.len() + self.drafts.len()
    }
}

/// The draft list and search service.
///
/// Works without a backend (local mirror only) or with one.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::drafts::{Draft, DraftLibrary, DraftStatus};
/// use scriptorium_core::store::LocalDraftStore;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let store = Arc::new(LocalDraftStore::in_memory());
/// store.upsert_draft(Draft::new("temp-1", "Vespers", "evening prayer", DraftStatus::Draft))?;
///
/// let library = DraftLibrary::new(None, store);
/// let drafts = library.list_drafts(None).await?;
/// assert_eq!(drafts[0].title, "Vespers");
///
/// library.delete_draft("temp-1").await?;
/// assert!(library.list_drafts(None).await?.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct DraftLibrary {
    backend: Option<Arc<dyn PostBackend>>,
    store: Arc<LocalDraftStore>,
    events: Option<Arc<EventBus>>,
    search_limit: usize,
}

impl DraftLibrary {
    pub fn new(backend: Option<Arc<dyn PostBackend>>, store: Arc<LocalDraftStore>) -> Self {
        Self {
            backend,
            store,
            events: None,
            search_limit: 20,
        }
    }

    /// Report deletions on `events`.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Maximum number of published posts a search returns.
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn store(&self) -> &Arc<LocalDraftStore> {
        &self.store
    }

    /// Drafts of `user_id`, server and local merged.
    ///
    /// Without a user or a backend only the local mirror is listed. When the
    /// server call fails the local entries are still returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local store cannot be read.
    pub async fn list_drafts(&self, user_id: Option<&str>) -> Result<Vec<Draft>> {
        let local = self.store.drafts()?;

        let server = match (&self.backend, user_id) {
            (Some(backend), Some(user_id)) => {
                match backend
                    .list_posts(
                        PostFilter::for_user(user_id),
                        PostOrder::UpdatedDesc,
                        LIST_LIMIT,
                    )
                    .await
                {
                    Ok(posts) => posts.iter().map(Draft::from_post).collect(),
                    Err(e) => {
                        warn!("Failed to list server drafts, showing local copies: {}", e);
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        let merged = merge_drafts(server, local);
        debug!("Listed {} drafts", merged.len());
        Ok(merged)
    }

    /// Delete a draft on the server and in the local mirror.
    ///
    /// The server delete is best effort: a failure is logged and the local
    /// entry is removed anyway. Deleting an unknown id succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local store cannot be written.
    pub async fn delete_draft(&self, id: &str) -> Result<()> {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.delete_post(id).await {
                warn!("Server delete of {} failed, removing local copy only: {}", id, e);
            }
        }

        let removed = self.store.remove_draft(id)?;
        info!("Deleted draft {} (local entry removed: {})", id, removed);

        if let Some(events) = &self.events {
            let event = Event::new(EventType::PostDeleted, "Draft deleted").with(META_POST_ID, id);
            if let Err(e) = events.emit(event).await {
                warn!("Failed to emit event: {}", e);
            }
        }
        Ok(())
    }

    /// Search published posts, sections and local drafts.
    ///
    /// Matching is a case-insensitive substring test. A blank query yields
    /// empty results without contacting the backend. Server failures leave
    /// the server parts empty.
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::default());
        }

        let needle = query.to_lowercase();
        let mut results = SearchResults {
            drafts: self.search_local(&needle)?,
            ..SearchResults::default()
        };

        if let Some(backend) = &self.backend {
            let filter = PostFilter::published().with_text(query);
            let (posts, sections) = futures::join!(
                backend.list_posts(filter, PostOrder::CreatedDesc, self.search_limit),
                backend.fetch_sections()
            );

            match posts {
                Ok(posts) => results.posts = posts,
                Err(e) => warn!("Post search failed: {}", e),
            }
            match sections {
                Ok(sections) => {
                    results.sections = sections
                        .into_iter()
                        .filter(|s| s.title.to_lowercase().contains(&needle))
                        .collect();
                    results.sections.sort_by(|a, b| a.title.cmp(&b.title));
                }
                Err(e) => warn!("Section search failed: {}", e),
            }
        }

        debug!("Search '{}' matched {} entries", query, results.total());
        Ok(results)
    }

    fn search_local(&self, needle: &str) -> Result<Vec<Draft>> {
        let mut drafts: Vec<Draft> = self
            .store
            .drafts()?
            .into_iter()
            .filter(|d| d.matches(needle))
            .collect();
        drafts.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(drafts)
    }
}

/// Page cursor over a list of known length.
///
/// Pages are 1-based and every move is clamped to `[1, total_pages]`.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::drafts::Paginator;
///
/// let mut pages = Paginator::new(25, 10);
/// assert_eq!(pages.total_pages(), 3);
///
/// pages.go_to(99);
/// assert_eq!(pages.current_page(), 3);
/// assert_eq!(pages.range(), 20..25);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    total_items: usize,
    per_page: usize,
    current: usize,
}

impl Paginator {
    /// A paginator positioned on the first page.
    ///
    /// A zero page size is treated as one item per page.
    pub fn new(total_items: usize, per_page: usize) -> Self {
        Self {
            total_items,
            per_page: per_page.max(1),
            current: 1,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.per_page)
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    /// Move to `page`, clamped to the valid range.
    pub fn go_to(&mut self, page: usize) {
        self.current = page.min(self.total_pages()).max(1);
    }

    pub fn next(&mut self) {
        self.go_to(self.current + 1);
    }

    pub fn prev(&mut self) {
        self.go_to(self.current.saturating_sub(1));
    }

    pub fn can_go_next(&self) -> bool {
        self.current < self.total_pages()
    }

    pub fn can_go_prev(&self) -> bool {
        self.current > 1
    }

    /// Index range of the items on the current page.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = ((self.current - 1) * self.per_page).min(self.total_items);
        let end = (start + self.per_page).min(self.total_items);
        start..end
    }

    /// The items of the current page.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> Result<&'a [T]> {
        if items.len() != self.total_items {
            return Err(crate::error!(
                "Paginator sized for {} items, got {}",
                self.total_items,
                items.len()
            ));
        }
        Ok(&items[self.range()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use chrono::Duration;
    use scriptorium_api::{NewPost, PostContent};

    fn at(hours_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::hours(hours_ago)
    }

    #[test]
    fn test_draft_serialization_keys() {
        let draft = Draft::new("1", "Title", "three little words", DraftStatus::Published);
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["wordCount"], 3);
        assert_eq!(json["status"], "published");
        assert!(json.get("lastModified").is_some());
    }

    #[test]
    fn test_merge_server_precedence_and_order() {
        let server = vec![
            Draft::new("1", "Server one", "", DraftStatus::Draft).with_last_modified(at(5)),
            Draft::new("2", "Server two", "", DraftStatus::Published).with_last_modified(at(1)),
        ];
        let local = vec![
            Draft::new("1", "Local one", "", DraftStatus::Draft).with_last_modified(at(0)),
            Draft::new("temp-3", "Local only", "", DraftStatus::Draft).with_last_modified(at(3)),
        ];

        let merged = merge_drafts(server, local);
        let titles: Vec<_> = merged.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Server two", "Local only", "Server one"]);
    }

    #[test]
    fn test_merge_idempotent() {
        let server = vec![Draft::new("1", "S", "", DraftStatus::Draft).with_last_modified(at(2))];
        let local = vec![Draft::new("2", "L", "", DraftStatus::Draft).with_last_modified(at(1))];

        let once = merge_drafts(server.clone(), local.clone());
        let twice = merge_drafts(once.clone(), local);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_display_helpers() {
        let now = Utc::now();
        let draft = Draft::new("1", "   ", "body", DraftStatus::Draft);
        assert_eq!(draft.display_title(), "Untitled Draft");
        assert_eq!(draft.time_ago(now), "Just now");
        assert_eq!(draft.clone().with_last_modified(now - Duration::hours(5)).time_ago(now), "5h ago");

        let long = Draft::new("2", "t", "x".repeat(400), DraftStatus::Draft);
        assert_eq!(long.preview().chars().count(), PREVIEW_LENGTH);
    }

    #[tokio::test]
    async fn test_list_drafts_falls_back_to_local() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(LocalDraftStore::in_memory());
        store
            .upsert_draft(Draft::new("temp-1", "Offline", "", DraftStatus::Draft))
            .unwrap();

        backend.set_available(false);
        let library = DraftLibrary::new(Some(backend.clone() as Arc<dyn PostBackend>), store);
        let drafts = library.list_drafts(Some("u1")).await.unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(backend.stats().lists, 1);
    }

    #[tokio::test]
    async fn test_list_drafts_merges_server_posts() {
        let backend = Arc::new(MemoryBackend::new());
        let mut new = NewPost::draft("On Server", "on-server", PostContent::new("<p>a b</p>"));
        new.user_id = Some("u1".into());
        let stored = backend.insert_post(new).await.unwrap();

        let store = Arc::new(LocalDraftStore::in_memory());
        store
            .upsert_draft(Draft::new(stored.id.clone(), "Stale", "", DraftStatus::Draft))
            .unwrap();

        let library = DraftLibrary::new(Some(backend as Arc<dyn PostBackend>), store);
        let drafts = library.list_drafts(Some("u1")).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "On Server");
        assert_eq!(drafts[0].word_count, 2);
    }

    #[tokio::test]
    async fn test_delete_is_best_effort_and_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(LocalDraftStore::in_memory());
        store
            .upsert_draft(Draft::new("7", "Doomed", "", DraftStatus::Draft))
            .unwrap();

        backend.set_available(false);
        let library = DraftLibrary::new(Some(backend as Arc<dyn PostBackend>), store.clone());

        library.delete_draft("7").await.unwrap();
        library.delete_draft("7").await.unwrap();
        assert!(store.drafts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_event() {
        let store = Arc::new(LocalDraftStore::in_memory());
        store
            .upsert_draft(Draft::new("temp-3", "Ember", "", DraftStatus::Draft))
            .unwrap();
        let bus = EventBus::immediate();
        let log = crate::events::EventLog::new();
        bus.subscribe_all(log.handler(), 0).await.unwrap();

        let library = DraftLibrary::new(None, store).with_events(Arc::new(bus));
        library.delete_draft("temp-3").await.unwrap();

        let deleted = log.of_type(EventType::PostDeleted);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].get_metadata(META_POST_ID), Some("temp-3"));
    }

    #[tokio::test]
    async fn test_search() {
        let backend = Arc::new(MemoryBackend::with_sections(vec![Section {
            id: "s1".into(),
            title: "Psalms".into(),
            slug: "psalms".into(),
            position: 0,
        }]));
        let mut published = NewPost::draft("Psalm of Ascent", "psalm", PostContent::new("<p>hills</p>"));
        published.is_published = true;
        backend.insert_post(published).await.unwrap();
        backend
            .insert_post(NewPost::draft("Psalm draft", "psalm-draft", PostContent::new("")))
            .await
            .unwrap();

        let store = Arc::new(LocalDraftStore::in_memory());
        store
            .upsert_draft(Draft::new("temp-1", "Notes", "a new psalm", DraftStatus::Draft))
            .unwrap();

        let library = DraftLibrary::new(Some(backend as Arc<dyn PostBackend>), store);
        let results = library.search("PSALM").await.unwrap();

        assert_eq!(results.posts.len(), 1);
        assert_eq!(results.posts[0].title, "Psalm of Ascent");
        assert_eq!(results.sections.len(), 1);
        assert_eq!(results.drafts.len(), 1);
        assert!(library.search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_limit() {
        let backend = Arc::new(MemoryBackend::new());
        for i in 0..5 {
            let mut post = NewPost::draft(format!("Hymn {}", i), "hymn", PostContent::new(""));
            post.is_published = true;
            backend.insert_post(post).await.unwrap();
        }

        let library = DraftLibrary::new(
            Some(backend as Arc<dyn PostBackend>),
            Arc::new(LocalDraftStore::in_memory()),
        )
        .with_search_limit(3);
        assert_eq!(library.search("hymn").await.unwrap().posts.len(), 3);
    }

    #[test]
    fn test_paginator_clamps() {
        let mut pages = Paginator::new(25, 10);
        assert_eq!(pages.current_page(), 1);
        assert!(!pages.can_go_prev());

        pages.prev();
        assert_eq!(pages.current_page(), 1);

        pages.next();
        pages.next();
        pages.next();
        assert_eq!(pages.current_page(), 3);
        assert!(!pages.can_go_next());
        assert_eq!(pages.range(), 20..25);

        pages.go_to(0);
        assert_eq!(pages.current_page(), 1);
        assert_eq!(pages.range(), 0..10);
    }

    #[test]
    fn test_paginator_empty_and_slice() {
        let mut pages = Paginator::new(0, 10);
        assert_eq!(pages.total_pages(), 0);
        pages.go_to(4);
        assert_eq!(pages.current_page(), 1);
        assert_eq!(pages.range(), 0..0);

        let items: Vec<u32> = (0..12).collect();
        let mut pages = Paginator::new(items.len(), 5);
        pages.go_to(3);
        assert_eq!(pages.slice(&items).unwrap(), &[10, 11]);
        assert!(pages.slice(&items[..3]).is_err());
    }
}
