//! # Auto-save controller
//!
//! Edits restart a debounce timer; when it fires the latest title and content
//! are persisted. All saves of one editor session, automatic or manual, go
//! through a single-flight queue so a fresh post is inserted exactly once and
//! every later save updates it by id.
//!
//! Every attempt is also mirrored into the local draft store, keyed by the
//! post id or, before one is known, by a temporary `temp-<millis>` id that is
//! replaced once the server assigns the real one.

use chrono::{DateTime, Local, Utc};
use scriptorium_api::event::{META_EDIT_PATH, META_POST_ID};
use scriptorium_api::{
    Event, EventType, NewPost, PostBackend, PostContent, PostFilter, PostId, PostOrder, PostUpdate,
};
use scriptorium_core::drafts::{Draft, DraftStatus};
use scriptorium_core::text::{derive_slug, plain_text};
use scriptorium_core::{Config, Error, EventBus, LocalDraftStore, Result, Session};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Trailing-edge timer: every [`schedule`](Debouncer::schedule) replaces the
/// previous one, so only the last call within the window fires.
///
/// Dropping the debouncer cancels a timer that has not fired yet.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            handle: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` once `delay` has passed without another schedule.
    ///
    /// Must be called within a tokio runtime.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    /// Cancel the waiting timer. Returns whether one was waiting.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What a save persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavePayload {
    pub title: String,
    pub content: PostContent,
    /// Selected section; falls back to the category inside the content
    pub section_id: Option<String>,
    pub cover_image_url: Option<String>,
}

impl SavePayload {
    pub fn new<S: Into<String>>(title: S, content: PostContent) -> Self {
        Self {
            title: title.into(),
            content,
            section_id: None,
            cover_image_url: None,
        }
    }

    pub fn with_section<S: Into<String>>(mut self, section_id: S) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    /// Section written with the post.
    pub fn section(&self) -> Option<String> {
        self.section_id
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.content.category.clone().filter(|s| !s.is_empty()))
    }

    fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

/// Why a save did not reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingTitle,
    Unchanged,
}

/// Result of a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Skipped(SkipReason),
    /// The post was inserted and received this id
    Created(PostId),
    Updated(PostId),
    /// Another queued save persisted this payload or a newer one
    Coalesced,
}

impl SaveOutcome {
    pub fn post_id(&self) -> Option<&str> {
        match self {
            Self::Created(id) | Self::Updated(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Save indicator shown next to the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saving,
    Saved(DateTime<Utc>),
    Draft,
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saving => f.write_str("Saving..."),
            Self::Saved(at) => write!(f, "Saved {}", at.with_timezone(&Local).format("%H:%M:%S")),
            Self::Draft => f.write_str("Draft"),
        }
    }
}

#[derive(Debug)]
struct SaveState {
    post_id: Option<PostId>,
    temp_id: Option<String>,
    is_published: bool,
    /// Title and content supplied when the editor was opened
    initial: (String, PostContent),
    /// Latest payload waiting for the flight slot
    pending: Option<SavePayload>,
    saving: bool,
    last_saved: Option<DateTime<Utc>>,
    debouncer: Debouncer,
}

struct Shared {
    backend: Arc<dyn PostBackend>,
    store: Arc<LocalDraftStore>,
    events: Arc<EventBus>,
    session: Session,
    config: Arc<Config>,
    state: Mutex<SaveState>,
    flight: tokio::sync::Mutex<()>,
}

/// Debounced, serialized persistence of one editor session.
///
/// Cloning yields a handle to the same session.
///
/// # Example
///
/// ```rust
/// use scriptorium_api::{PostBackend, PostContent};
/// use scriptorium_core::{Config, EventBus, LocalDraftStore, MemoryBackend, Session};
/// use scriptorium_editor::autosave::{AutoSaveController, SaveOutcome, SavePayload};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let backend = Arc::new(MemoryBackend::new());
/// let saver = AutoSaveController::new(
///     backend.clone(),
///     Arc::new(LocalDraftStore::in_memory()),
///     Arc::new(EventBus::immediate()),
///     Session::signed_in("u1", "Scribe"),
///     Arc::new(Config::default()),
/// );
///
/// let payload = SavePayload::new("Vespers", PostContent::new("<p>Evening</p>"));
/// assert!(matches!(saver.save(payload).await?, SaveOutcome::Created(_)));
/// assert!(saver.post_id().is_some());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone)]
pub struct AutoSaveController {
    inner: Arc<Shared>,
}

impl fmt::Debug for AutoSaveController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoSaveController")
            .field("post_id", &self.post_id())
            .field("saving", &self.is_saving())
            .finish()
    }
}

impl AutoSaveController {
    pub fn new(
        backend: Arc<dyn PostBackend>,
        store: Arc<LocalDraftStore>,
        events: Arc<EventBus>,
        session: Session,
        config: Arc<Config>,
    ) -> Self {
        let state = SaveState {
            post_id: None,
            temp_id: None,
            is_published: false,
            initial: (String::new(), PostContent::default()),
            pending: None,
            saving: false,
            last_saved: None,
            debouncer: Debouncer::new(config.editor.autosave_debounce()),
        };
        Self {
            inner: Arc::new(Shared {
                backend,
                store,
                events,
                session,
                config,
                state: Mutex::new(state),
                flight: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Bind the session to an existing post.
    pub fn set_post_id(&self, id: Option<PostId>) {
        if let Ok(mut state) = self.state() {
            state.post_id = id;
        }
    }

    /// Record the values the editor was opened with. Debounced saves of
    /// identical values are skipped.
    pub fn set_initial<S: Into<String>>(&self, title: S, content: PostContent) {
        if let Ok(mut state) = self.state() {
            state.initial = (title.into(), content);
        }
    }

    pub fn set_published(&self, is_published: bool) {
        if let Ok(mut state) = self.state() {
            state.is_published = is_published;
        }
    }

    pub fn post_id(&self) -> Option<PostId> {
        self.state().ok().and_then(|s| s.post_id.clone())
    }

    pub fn is_saving(&self) -> bool {
        self.state().map(|s| s.saving).unwrap_or(false)
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.state().ok().and_then(|s| s.last_saved)
    }

    pub fn save_status(&self) -> SaveStatus {
        match self.state() {
            Ok(state) if state.saving => SaveStatus::Saving,
            Ok(state) => state.last_saved.map_or(SaveStatus::Draft, SaveStatus::Saved),
            Err(_) => SaveStatus::Draft,
        }
    }

    /// Whether a failed payload is waiting to be retried.
    pub fn has_pending(&self) -> bool {
        self.state().map(|s| s.pending.is_some()).unwrap_or(false)
    }

    /// Whether a debounce timer is waiting to fire.
    pub fn is_scheduled(&self) -> bool {
        self.state()
            .map(|s| s.debouncer.is_pending())
            .unwrap_or(false)
    }

    /// Note an edit of the title or content.
    ///
    /// Restarts the debounce timer. Without a title nothing is scheduled and
    /// a waiting timer is cancelled.
    pub fn content_changed(&self, payload: SavePayload) {
        let Ok(mut state) = self.state() else { return };
        if !payload.has_title() {
            state.debouncer.cancel();
            return;
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.inner);
        state.debouncer.schedule(move || {
            let Some(inner) = weak.upgrade() else { return };
            let controller = AutoSaveController { inner };
            // The save runs in its own task so a later edit cannot abort it.
            tokio::spawn(async move {
                if let Err(e) = controller.autosave(payload).await {
                    debug!("Auto-save failed: {}", e);
                }
            });
        });
    }

    /// Cancel a waiting debounce timer. In-flight saves continue.
    pub fn cancel(&self) -> bool {
        self.state()
            .map(|mut s| s.debouncer.cancel())
            .unwrap_or(false)
    }

    async fn autosave(&self, payload: SavePayload) -> Result<SaveOutcome> {
        let unchanged = self
            .state()
            .map(|s| s.initial.0 == payload.title && s.initial.1 == payload.content)?;
        if unchanged {
            debug!("Skipping auto-save of unchanged post");
            return Ok(SaveOutcome::Skipped(SkipReason::Unchanged));
        }
        self.save(payload).await
    }

    /// Persist `payload` now.
    ///
    /// Waits for any save already in flight. If a newer payload is deposited
    /// meanwhile, only that one is written and this call reports
    /// [`SaveOutcome::Coalesced`].
    pub async fn save(&self, payload: SavePayload) -> Result<SaveOutcome> {
        if !payload.has_title() {
            return Ok(SaveOutcome::Skipped(SkipReason::MissingTitle));
        }
        self.state()?.pending = Some(payload);
        self.flush().await
    }

    /// Persist the waiting payload, if any.
    pub async fn flush(&self) -> Result<SaveOutcome> {
        let _flight = self.inner.flight.lock().await;
        let Some(payload) = self.take_pending()? else {
            return Ok(SaveOutcome::Coalesced);
        };

        self.state()?.saving = true;
        let result = self.persist(&payload).await;
        {
            let mut state = self.state()?;
            state.saving = false;
            match &result {
                Ok(_) => state.last_saved = Some(Utc::now()),
                Err(_) => {
                    if state.pending.is_none() {
                        state.pending = Some(payload.clone());
                    }
                }
            }
        }

        self.mirror(&payload).await;

        match result {
            Ok(outcome) => {
                let id = outcome.post_id().unwrap_or_default().to_string();
                info!("Saved post {}", id);
                self.notify(Event::new(EventType::PostSaved, "Saved").with(META_POST_ID, id))
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Save failed: {}", e);
                let mut event = Event::new(
                    EventType::SaveFailed,
                    format!("Save failed: {}", e.user_message()),
                );
                if let Some(id) = self.post_id() {
                    event = event.with(META_POST_ID, id);
                }
                self.notify(event).await;
                Err(e)
            }
        }
    }

    /// Write a partial update of the bound post, bounded by the network
    /// timeout.
    pub async fn update_post(&self, id: &str, update: PostUpdate) -> Result<()> {
        self.bounded(self.inner.backend.update_post(id, update)).await
    }

    async fn persist(&self, payload: &SavePayload) -> Result<SaveOutcome> {
        let slug = derive_slug(&payload.title);
        let section = payload.section();

        let mut id = self.post_id();
        if id.is_none() && self.inner.config.editor.reuse_matching_draft {
            id = self.find_matching_draft(payload, section.as_deref()).await?;
            if let Some(found) = &id {
                debug!("Reusing draft {} with the same title", found);
                self.assign_identity(found.clone()).await;
            }
        }

        if let Some(id) = id {
            let update = PostUpdate {
                title: Some(payload.title.clone()),
                slug: Some(slug),
                content: Some(payload.content.clone()),
                section_id: section,
                cover_image_url: payload.cover_image_url.clone(),
                ..PostUpdate::default()
            };
            self.update_post(&id, update).await?;
            return Ok(SaveOutcome::Updated(id));
        }

        let post = NewPost {
            title: payload.title.clone(),
            slug,
            content: payload.content.clone(),
            section_id: section,
            user_id: self.inner.session.user_id().map(str::to_string),
            cover_image_url: payload.cover_image_url.clone(),
            excerpt: None,
            is_published: false,
        };
        let created = self.bounded(self.inner.backend.insert_post(post)).await?;
        self.notify(
            Event::new(EventType::PostCreated, "Draft created").with(META_POST_ID, &created.id),
        )
        .await;
        self.assign_identity(created.id.clone()).await;
        Ok(SaveOutcome::Created(created.id))
    }

    async fn find_matching_draft(
        &self,
        payload: &SavePayload,
        section: Option<&str>,
    ) -> Result<Option<PostId>> {
        let Some(user_id) = self.inner.session.user_id() else {
            return Ok(None);
        };
        let mut filter = PostFilter::for_user(user_id)
            .with_title(payload.title.clone())
            .with_published(false);
        if let Some(section) = section {
            filter = filter.with_section(section);
        }
        let posts = self
            .bounded(
                self.inner
                    .backend
                    .list_posts(filter, PostOrder::UpdatedDesc, 1),
            )
            .await?;
        Ok(posts.into_iter().next().map(|p| p.id))
    }

    async fn assign_identity(&self, id: PostId) {
        if let Ok(mut state) = self.state() {
            state.post_id = Some(id.clone());
        }
        let edit_path = self.inner.config.edit_path(&id);
        info!("Post identity assigned: {}", edit_path);
        self.notify(
            Event::new(EventType::IdentityAssigned, "Post identity assigned")
                .with(META_POST_ID, id)
                .with(META_EDIT_PATH, edit_path),
        )
        .await;
    }

    /// Mirror the payload into the local store. Failures only log.
    async fn mirror(&self, payload: &SavePayload) {
        let (key, replaced, status) = {
            let Ok(mut state) = self.state() else { return };
            let status = DraftStatus::from_published(state.is_published);
            match state.post_id.clone() {
                Some(id) => (id, state.temp_id.take(), status),
                None => {
                    let temp = state
                        .temp_id
                        .get_or_insert_with(|| format!("temp-{}", Utc::now().timestamp_millis()))
                        .clone();
                    (temp, None, status)
                }
            }
        };

        let draft = Draft::new(
            key.clone(),
            payload.title.clone(),
            plain_text(&payload.content.html),
            status,
        );
        let result = match &replaced {
            Some(previous) => self.inner.store.replace_draft(previous, draft),
            None => self.inner.store.upsert_draft(draft),
        };
        match result {
            Ok(()) => {
                debug!("Mirrored draft {} locally", key);
                self.notify(
                    Event::new(EventType::DraftMirrored, "Draft saved locally")
                        .with(META_POST_ID, key),
                )
                .await;
            }
            Err(e) => warn!("Failed to mirror draft {}: {}", key, e),
        }
    }

    async fn notify(&self, event: Event) {
        if let Err(e) = self.inner.events.emit(event).await {
            warn!("Failed to emit event: {}", e);
        }
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = scriptorium_api::BackendResult<T>>,
    {
        let limit = self.inner.config.advanced.network_timeout();
        Ok(tokio::time::timeout(limit, request).await??)
    }

    fn take_pending(&self) -> Result<Option<SavePayload>> {
        Ok(self.state()?.pending.take())
    }

    fn state(&self) -> Result<MutexGuard<'_, SaveState>> {
        self.inner
            .state
            .lock()
            .map_err(|_| Error::generic("auto-save state poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::{EventLog, MemoryBackend};

    fn controller(backend: Arc<MemoryBackend>) -> (AutoSaveController, Arc<LocalDraftStore>) {
        let store = Arc::new(LocalDraftStore::in_memory());
        let saver = AutoSaveController::new(
            backend,
            store.clone(),
            Arc::new(EventBus::immediate()),
            Session::signed_in("u1", "Scribe"),
            Arc::new(Config::default()),
        );
        (saver, store)
    }

    fn payload(title: &str, html: &str) -> SavePayload {
        SavePayload::new(title, PostContent::new(html))
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_only_last_fires() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut debouncer = Debouncer::new(Duration::from_millis(100));

        for i in 0..3 {
            let fired = fired.clone();
            debouncer.schedule(move || fired.lock().unwrap().push(i));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(debouncer.is_pending());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*fired.lock().unwrap(), vec![2]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_debouncer_cancels() {
        let fired = Arc::new(Mutex::new(false));
        {
            let mut debouncer = Debouncer::new(Duration::from_millis(10));
            let fired = fired.clone();
            debouncer.schedule(move || *fired.lock().unwrap() = true);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn test_payload_section_falls_back_to_category() {
        let p = SavePayload::new("t", PostContent::new("").with_category("hymns"));
        assert_eq!(p.section().as_deref(), Some("hymns"));
        assert_eq!(p.with_section("psalms").section().as_deref(), Some("psalms"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SaveStatus::Saving.to_string(), "Saving...");
        assert_eq!(SaveStatus::Draft.to_string(), "Draft");
        assert!(SaveStatus::Saved(Utc::now()).to_string().starts_with("Saved "));
    }

    #[tokio::test]
    async fn test_missing_title_is_skipped() {
        let backend = Arc::new(MemoryBackend::new());
        let (saver, store) = controller(backend.clone());

        let outcome = saver.save(payload("   ", "<p>body</p>")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped(SkipReason::MissingTitle));
        assert_eq!(backend.stats().total(), 0);
        assert!(store.drafts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_save_inserts_then_updates() {
        let backend = Arc::new(MemoryBackend::new());
        let (saver, _) = controller(backend.clone());

        let first = saver.save(payload("Prime", "<p>a</p>")).await.unwrap();
        let SaveOutcome::Created(id) = first else {
            panic!("expected an insert, got {:?}", first);
        };
        let second = saver.save(payload("Prime", "<p>ab</p>")).await.unwrap();
        assert_eq!(second, SaveOutcome::Updated(id.clone()));

        let stored = backend.fetch_post(&id).await.unwrap().unwrap();
        assert_eq!(stored.content.html, "<p>ab</p>");
        assert_eq!(stored.slug, "prime");
        assert_eq!(stored.user_id.as_deref(), Some("u1"));
        assert_eq!(backend.stats().inserts, 1);
        assert!(saver.last_saved().is_some());
        assert!(matches!(saver.save_status(), SaveStatus::Saved(_)));
    }

    #[tokio::test]
    async fn test_reuses_matching_unpublished_draft() {
        let backend = Arc::new(MemoryBackend::new());
        let mut existing = NewPost::draft("Terce", "terce", PostContent::new("<p>old</p>"));
        existing.user_id = Some("u1".to_string());
        let existing = backend.insert_post(existing).await.unwrap();

        let (saver, _) = controller(backend.clone());
        let outcome = saver.save(payload("Terce", "<p>new</p>")).await.unwrap();

        assert_eq!(outcome, SaveOutcome::Updated(existing.id.clone()));
        assert_eq!(saver.post_id(), Some(existing.id));
        assert_eq!(backend.stats().inserts, 1);
    }

    #[tokio::test]
    async fn test_identity_event_carries_edit_path() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(LocalDraftStore::in_memory());
        let bus = EventBus::immediate();
        let log = EventLog::new();
        bus.subscribe_all(log.handler(), 0).await.unwrap();

        let saver = AutoSaveController::new(
            backend,
            store,
            Arc::new(bus),
            Session::anonymous(),
            Arc::new(Config::default()),
        );
        let outcome = saver.save(payload("Sext", "<p>noon</p>")).await.unwrap();
        let id = outcome.post_id().unwrap().to_string();

        let assigned = log.of_type(EventType::IdentityAssigned);
        assert_eq!(assigned.len(), 1);
        assert_eq!(
            assigned[0].get_metadata(META_EDIT_PATH),
            Some(format!("/admin/posts/{}", id).as_str())
        );
        assert_eq!(log.count(EventType::PostCreated), 1);
        assert_eq!(log.count(EventType::PostSaved), 1);

        let mirrored = log.of_type(EventType::DraftMirrored);
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].get_metadata(META_POST_ID), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_failure_keeps_payload_and_mirrors_under_temp_id() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);
        let (saver, store) = controller(backend.clone());

        let err = saver.save(payload("None", "<p>nine</p>")).await.unwrap_err();
        assert!(err.is_persistence());
        assert!(saver.has_pending());
        assert!(saver.post_id().is_none());

        let drafts = store.drafts().unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].id.starts_with("temp-"));
        assert_eq!(drafts[0].content, "nine");

        backend.set_available(true);
        let outcome = saver.flush().await.unwrap();
        let id = outcome.post_id().unwrap().to_string();

        let drafts = store.drafts().unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, id);
        assert!(!saver.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_persistence_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_latency(Duration::from_secs(60));
        let (saver, _) = controller(backend);

        let err = saver.save(payload("Slow", "<p>x</p>")).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(!saver.is_saving());
    }
}
