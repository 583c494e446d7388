//! # Scriptorium Editor
//!
//! The post editor: a structured rich-text document with named formatting
//! commands, an editable surface bound to the post's HTML, debounced
//! auto-save with a single-flight queue, and the publish workflow.
//!
//! [`PostEditor`] ties these together. It owns the title, content, category,
//! cover image, excerpt and publish flag of one post, feeds every edit into
//! the auto-save controller and reports outcomes through the event bus.
//!
//! ## Example
//!
//! ```rust
//! use scriptorium_core::{Config, EventBus, LocalDraftStore, MemoryBackend, Session};
//! use scriptorium_editor::PostEditor;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mut editor = PostEditor::new(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(LocalDraftStore::in_memory()),
//!     Arc::new(EventBus::immediate()),
//!     Session::signed_in("u1", "Scribe"),
//!     Arc::new(Config::default()),
//! );
//! editor.mount();
//! editor.set_title("Matins").await;
//! editor.type_text("In the beginning").await?;
//! assert_eq!(editor.word_count(), 3);
//!
//! editor.save().await?;
//! assert!(editor.post_id().is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod autosave;
pub mod cover;
pub mod document;
pub mod format;
pub mod html;
pub mod stats;
pub mod surface;

pub use autosave::{AutoSaveController, SaveOutcome, SavePayload, SaveStatus, SkipReason};
pub use document::{DocPosition, RichDocument, Selection};
pub use format::{ActiveFormats, FormatCommand};
pub use stats::WritingStats;
pub use surface::{ContentSurface, SurfaceEvent};

use chrono::{DateTime, Utc};
use scriptorium_api::event::{META_FIELD, META_POST_ID};
use scriptorium_api::{Event, EventType, Post, PostBackend, PostContent, PostId, PostUpdate, Section};
use scriptorium_core::{text, Config, Error, EventBus, LocalDraftStore, Result, Session};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type PublishCallback = Box<dyn FnMut(bool) + Send>;

/// Editing session of one post.
pub struct PostEditor {
    config: Arc<Config>,
    backend: Arc<dyn PostBackend>,
    events: Arc<EventBus>,
    session: Session,
    autosave: AutoSaveController,
    surface: ContentSurface,
    stats: WritingStats,
    title: String,
    content: PostContent,
    category: Option<String>,
    cover_image_url: Option<String>,
    excerpt: Option<String>,
    is_published: bool,
    sections: Vec<Section>,
    on_publish: Option<PublishCallback>,
}

impl PostEditor {
    /// An editor for a new, unsaved post.
    pub fn new(
        backend: Arc<dyn PostBackend>,
        store: Arc<LocalDraftStore>,
        events: Arc<EventBus>,
        session: Session,
        config: Arc<Config>,
    ) -> Self {
        let autosave = AutoSaveController::new(
            backend.clone(),
            store,
            events.clone(),
            session.clone(),
            config.clone(),
        );
        Self {
            surface: ContentSurface::from_config(&config.editor),
            stats: WritingStats::with_words_per_minute(config.editor.words_per_minute),
            config,
            backend,
            events,
            session,
            autosave,
            title: String::new(),
            content: PostContent::default(),
            category: None,
            cover_image_url: None,
            excerpt: None,
            is_published: false,
            sections: Vec::new(),
            on_publish: None,
        }
    }

    /// Register a callback invoked with the new state after each successful
    /// publish toggle.
    pub fn on_publish<F: FnMut(bool) + Send + 'static>(&mut self, callback: F) {
        self.on_publish = Some(Box::new(callback));
    }

    /// Seed the editor with a stored post.
    pub fn load_post(&mut self, post: Post) {
        self.category = post.effective_section().map(str::to_string);
        self.title = post.title;
        self.content = post.content;
        if self.content.category.is_none() {
            self.content.category = self.category.clone();
        }
        self.cover_image_url = post.cover_image_url;
        self.excerpt = post.excerpt;
        self.is_published = post.is_published;

        self.surface.load_html(&self.content.html);
        self.stats.rebase(&self.content.html);
        self.autosave.set_post_id(Some(post.id));
        self.autosave
            .set_initial(self.title.clone(), self.content.clone());
        self.autosave.set_published(self.is_published);
    }

    /// Load the post with `id` together with the section list.
    pub async fn open(&mut self, id: &str) -> Result<()> {
        let limit = self.config.advanced.network_timeout();
        let (post, sections) = tokio::time::timeout(limit, async {
            futures::try_join!(self.backend.fetch_post(id), self.backend.fetch_sections())
        })
        .await??;

        let post = post.ok_or_else(|| Error::not_found(format!("post {}", id)))?;
        info!("Opened post {} ({})", post.id, post.title);
        self.sections = sorted_sections(sections);
        self.load_post(post);
        Ok(())
    }

    /// Attach the surface; it claims focus when the post has no content.
    pub fn mount(&mut self) -> bool {
        self.surface.mount()
    }

    /// Stop the pending auto-save timer. In-flight saves finish.
    pub fn shutdown(&mut self) {
        if self.autosave.cancel() {
            debug!("Cancelled pending auto-save");
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &PostContent {
        &self.content
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn cover_image_url(&self) -> Option<&str> {
        self.cover_image_url.as_deref()
    }

    pub fn excerpt(&self) -> Option<&str> {
        self.excerpt.as_deref()
    }

    pub fn is_published(&self) -> bool {
        self.is_published
    }

    pub fn post_id(&self) -> Option<PostId> {
        self.autosave.post_id()
    }

    pub fn surface(&self) -> &ContentSurface {
        &self.surface
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn word_count(&self) -> usize {
        text::word_count(&self.content.html)
    }

    pub fn stats(&self) -> &WritingStats {
        &self.stats
    }

    pub fn is_saving(&self) -> bool {
        self.autosave.is_saving()
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.autosave.last_saved()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.autosave.save_status()
    }

    pub async fn set_title<S: Into<String>>(&mut self, title: S) {
        let title = title.into();
        if title == self.title {
            return;
        }
        self.title = title;
        self.notify(Event::new(EventType::TitleChanged, self.title.clone()))
            .await;
        self.autosave.content_changed(self.payload());
    }

    /// Select the section; the copy inside the content follows.
    pub async fn set_category(&mut self, category: Option<String>) {
        let category = category.filter(|c| !c.trim().is_empty());
        if category == self.category {
            return;
        }
        self.category = category;
        self.content.category = self.category.clone();
        self.autosave.content_changed(self.payload());
    }

    pub fn set_excerpt(&mut self, excerpt: Option<String>) {
        self.excerpt = excerpt.filter(|e| !e.trim().is_empty());
    }

    pub fn set_cover_image_url(&mut self, url: Option<String>) {
        self.cover_image_url = url;
    }

    pub fn focus(&mut self) {
        self.surface.focus();
    }

    pub fn blur(&mut self) {
        self.surface.blur();
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<()> {
        self.surface.set_selection(selection)
    }

    /// Forward a surface event; see [`ContentSurface::handle_event`].
    pub fn handle_surface_event(&mut self, event: SurfaceEvent, now: Instant) {
        self.surface.handle_event(event, now);
    }

    /// Refresh the active formats once the settle delay has passed.
    pub fn poll_formats(&mut self, now: Instant) -> bool {
        self.surface.poll(now)
    }

    pub fn active_formats(&self) -> &ActiveFormats {
        self.surface.active_formats()
    }

    pub async fn type_text(&mut self, text: &str) -> Result<()> {
        let html = self.surface.type_text(text)?;
        self.content_edited(html).await;
        Ok(())
    }

    pub async fn press_enter(&mut self) -> Result<()> {
        let html = self.surface.press_enter()?;
        self.content_edited(html).await;
        Ok(())
    }

    pub async fn backspace(&mut self) -> Result<()> {
        let html = self.surface.backspace()?;
        self.content_edited(html).await;
        Ok(())
    }

    /// Paste clipboard HTML as plain text.
    pub async fn paste(&mut self, html: &str) -> Result<()> {
        let html = self.surface.paste_html(html)?;
        self.content_edited(html).await;
        Ok(())
    }

    pub async fn apply_format(&mut self, command: &FormatCommand) -> Result<()> {
        let html = self.surface.apply_format(command)?;
        self.content_edited(html).await;
        Ok(())
    }

    /// Ask for a URL and link the selection to it.
    ///
    /// Nothing happens when the prompt is dismissed or answered with
    /// blanks. Returns whether a link was applied.
    pub async fn insert_link<F>(&mut self, prompt: F) -> Result<bool>
    where
        F: FnOnce() -> Option<String>,
    {
        match prompt().map(|url| url.trim().to_string()) {
            Some(url) if !url.is_empty() => {
                self.apply_format(&FormatCommand::CreateLink(url)).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn undo(&mut self) -> bool {
        match self.surface.undo() {
            Some(html) => {
                self.content_edited(html).await;
                true
            }
            None => false,
        }
    }

    pub async fn redo(&mut self) -> bool {
        match self.surface.redo() {
            Some(html) => {
                self.content_edited(html).await;
                true
            }
            None => false,
        }
    }

    /// Take in content changed outside the editor.
    ///
    /// Ignored while the surface has focus. The selected section wins over
    /// the incoming `content.category`, which is only adopted when no section
    /// is selected. No auto-save is scheduled. Returns whether anything
    /// changed.
    pub fn sync_content(&mut self, content: PostContent) -> bool {
        if self.surface.is_focused() {
            return false;
        }

        let adopted = match content.category.filter(|c| !c.trim().is_empty()) {
            Some(category) if self.category.is_none() => {
                self.category = Some(category);
                self.content.category = self.category.clone();
                true
            }
            _ => false,
        };

        if !self.surface.sync_external(&content.html) {
            return adopted;
        }
        self.content.html = self.surface.html().to_string();
        self.stats.rebase(&self.content.html);
        true
    }

    /// Values a save would persist right now.
    pub fn payload(&self) -> SavePayload {
        SavePayload {
            title: self.title.clone(),
            content: self.content.clone(),
            section_id: self.category.clone(),
            cover_image_url: self.cover_image_url.clone(),
        }
    }

    /// Save now, through the same queue as auto-save.
    pub async fn save(&self) -> Result<SaveOutcome> {
        self.autosave.save(self.payload()).await
    }

    /// Publish or unpublish the post.
    ///
    /// Requires a title and a category; otherwise a `ValidationFailed` event
    /// is emitted and nothing is sent to the backend. The post is saved first,
    /// then its publish flag, section and excerpt are updated. Returns the new
    /// publish state.
    pub async fn toggle_publish(&mut self) -> Result<bool> {
        if let Err(e) = self.validate_for_publish() {
            self.report_invalid(&e).await;
            return Err(e);
        }

        self.save().await?;
        let id = self
            .post_id()
            .ok_or_else(|| Error::generic("post has no id after saving"))?;

        let published = !self.is_published;
        let excerpt = self
            .excerpt
            .clone()
            .unwrap_or_else(|| text::excerpt(&self.content.html, self.config.editor.excerpt_length));
        let update = PostUpdate {
            is_published: Some(published),
            section_id: self.category.clone(),
            excerpt: Some(excerpt),
            ..PostUpdate::default()
        };

        if let Err(e) = self.autosave.update_post(&id, update).await {
            warn!("Failed to change publish state of {}: {}", id, e);
            self.notify(
                Event::new(
                    EventType::SaveFailed,
                    format!("Failed to publish post: {}", e.user_message()),
                )
                .with(META_POST_ID, id),
            )
            .await;
            return Err(e);
        }

        self.is_published = published;
        self.autosave.set_published(published);
        if let Some(callback) = self.on_publish.as_mut() {
            callback(published);
        }

        let event = if published {
            Event::new(EventType::PostPublished, "Post published successfully!")
        } else {
            Event::new(EventType::PostUnpublished, "Post unpublished")
        };
        info!("Post {} published: {}", id, published);
        self.notify(event.with(META_POST_ID, id)).await;
        Ok(published)
    }

    /// Fetch the selectable sections, ordered by position.
    pub async fn load_sections(&mut self) -> Result<&[Section]> {
        let limit = self.config.advanced.network_timeout();
        let sections = tokio::time::timeout(limit, self.backend.fetch_sections()).await??;
        self.sections = sorted_sections(sections);
        Ok(&self.sections)
    }

    /// Upload a cover image and use it for this post.
    ///
    /// The image must fit the configured size limit, carry a known image
    /// signature and come from a signed-in session; otherwise a
    /// `ValidationFailed` event is emitted and nothing is uploaded.
    pub async fn upload_cover_image(&mut self, bytes: Vec<u8>) -> Result<String> {
        let media_type = match cover::validate_cover(&bytes, &self.config.editor, &self.session) {
            Ok(media_type) => media_type,
            Err(e) => {
                self.report_invalid(&e).await;
                return Err(e);
            }
        };

        let limit = self.config.advanced.network_timeout();
        let size = bytes.len();
        let url = tokio::time::timeout(limit, self.backend.upload_image(bytes)).await??;
        debug!("Uploaded cover image ({}, {} bytes) to {}", media_type, size, url);
        self.cover_image_url = Some(url.clone());
        self.notify(Event::new(EventType::CoverImageUploaded, url.clone()))
            .await;
        Ok(url)
    }

    fn validate_for_publish(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation(
                "title",
                "Please add a title before publishing",
            ));
        }
        if self.category.is_none() {
            return Err(Error::validation(
                "category",
                "Please select a category before publishing",
            ));
        }
        Ok(())
    }

    /// Record new surface HTML. Edits that leave the HTML as it was, such as
    /// a mark toggled on a collapsed caret, neither notify nor touch the
    /// auto-save timer.
    async fn content_edited(&mut self, html: String) {
        if html == self.content.html {
            return;
        }
        self.content.html = html;
        self.stats.update(&self.content.html);
        self.notify(Event::new(
            EventType::ContentChanged,
            format!("{} words", self.stats.word_count()),
        ))
        .await;
        self.autosave.content_changed(self.payload());
    }

    async fn report_invalid(&self, error: &Error) {
        let field = match error {
            Error::Validation { field, .. } => field.clone(),
            _ => String::new(),
        };
        self.notify(
            Event::new(EventType::ValidationFailed, error.user_message()).with(META_FIELD, field),
        )
        .await;
    }

    async fn notify(&self, event: Event) {
        if let Err(e) = self.events.emit(event).await {
            warn!("Failed to emit event: {}", e);
        }
    }
}

impl Drop for PostEditor {
    fn drop(&mut self) {
        self.autosave.cancel();
    }
}

fn sorted_sections(mut sections: Vec<Section>) -> Vec<Section> {
    sections.sort_by_key(|s| s.position);
    sections
}
