//! The editable content surface.
//!
//! Owns the structured document behind `content.html`, the selection, the
//! marks pending for the next typed text, and the active-format set. Every
//! mutation re-serializes the document and returns the new HTML so the caller
//! can feed it into auto-save.

use crate::document::{DocPosition, Marks, RichDocument, Selection};
use crate::format::{self, ActiveFormats, FormatCommand};
use crate::html::{from_html, to_html};
use scriptorium_core::config::EditorConfig;
use scriptorium_core::text::is_blank;
use scriptorium_core::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Surface events that schedule an active-format refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    SelectionChange,
    MouseUp,
    KeyUp,
    Input,
}

/// Defers format detection until the surface has settled.
#[derive(Debug, Clone)]
struct FormatTracker {
    delay: Duration,
    deadline: Option<Instant>,
}

impl FormatTracker {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    document: RichDocument,
    selection: Option<Selection>,
}

/// Editable region bound to the post's HTML.
///
/// # Example
///
/// ```rust
/// use scriptorium_editor::surface::ContentSurface;
/// use scriptorium_editor::format::FormatCommand;
///
/// let mut surface = ContentSurface::default();
/// assert!(surface.mount());
/// assert!(surface.show_placeholder());
///
/// surface.type_text("Hello")?;
/// surface.apply_named("formatBlock", Some("h1"))?;
/// assert_eq!(surface.html(), "<h1>Hello</h1>");
/// assert!(surface.active_formats().contains("h1"));
/// # Ok::<(), scriptorium_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ContentSurface {
    document: RichDocument,
    selection: Option<Selection>,
    pending: Option<Marks>,
    focused: bool,
    html: String,
    placeholder: String,
    active: ActiveFormats,
    tracker: FormatTracker,
    undo_history: Vec<Snapshot>,
    redo_history: Vec<Snapshot>,
    max_undo_history: usize,
}

impl ContentSurface {
    pub fn new<S: Into<String>>(placeholder: S, format_refresh: Duration) -> Self {
        Self {
            document: RichDocument::new(),
            selection: None,
            pending: None,
            focused: false,
            html: String::new(),
            placeholder: placeholder.into(),
            active: ActiveFormats::new(),
            tracker: FormatTracker::new(format_refresh),
            undo_history: Vec::new(),
            redo_history: Vec::new(),
            max_undo_history: 100,
        }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.placeholder.clone(), config.format_refresh())
    }

    /// Replace the content without touching focus, clearing history.
    pub fn load_html(&mut self, html: &str) {
        self.document = from_html(html);
        self.html = to_html(&self.document);
        self.selection = None;
        self.pending = None;
        self.undo_history.clear();
        self.redo_history.clear();
        self.refresh_formats();
    }

    /// Attach the surface. Claims focus when there is no content yet.
    pub fn mount(&mut self) -> bool {
        if is_blank(&self.html) {
            self.focus();
        }
        self.focused
    }

    pub fn focus(&mut self) {
        self.focused = true;
        if self.selection.is_none() {
            self.selection = Some(Selection::caret(self.document.end_position()));
        }
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn document(&self) -> &RichDocument {
        &self.document
    }

    /// Live plain text of the document, blocks joined by newlines.
    pub fn plain_text(&self) -> String {
        self.document.plain_text()
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Whether to show the placeholder.
    ///
    /// Both the serialized HTML and the live text must be empty, so markup
    /// holding only empty tags does not flicker the placeholder.
    pub fn show_placeholder(&self) -> bool {
        is_blank(&self.html) && self.document.plain_text().trim().is_empty()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Caret position: the selection head, or the end of the document.
    pub fn caret(&self) -> DocPosition {
        self.selection
            .map(|s| s.head)
            .unwrap_or_else(|| self.document.end_position())
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<()> {
        self.document.check_selection(&selection)?;
        self.selection = Some(selection);
        self.pending = None;
        Ok(())
    }

    pub fn set_caret(&mut self, position: DocPosition) -> Result<()> {
        self.set_selection(Selection::caret(position))
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
        self.pending = None;
    }

    /// Marks the next typed text will carry, if a toggle set them.
    pub fn pending_marks(&self) -> Option<&Marks> {
        self.pending.as_ref()
    }

    /// Insert typed text at the caret, replacing any selected range.
    ///
    /// Newlines start new blocks. Returns the new HTML.
    pub fn type_text(&mut self, text: &str) -> Result<String> {
        self.record();
        let caret = self.collapse_selection()?;
        let marks = match self.pending.take() {
            Some(marks) => marks,
            None => self
                .document
                .block(caret.block)
                .map(|b| b.marks_at(caret.offset))
                .unwrap_or_default(),
        };
        let caret = self.document.insert_text(caret, text, marks)?;
        Ok(self.commit(caret))
    }

    pub fn press_enter(&mut self) -> Result<String> {
        self.record();
        let caret = self.collapse_selection()?;
        let caret = self.document.split_block(caret)?;
        Ok(self.commit(caret))
    }

    pub fn backspace(&mut self) -> Result<String> {
        self.record();
        let caret = match self.selection {
            Some(selection) if !selection.is_collapsed() => self.collapse_selection()?,
            _ => {
                let caret = self.caret();
                self.document.delete_backward(caret)?
            }
        };
        Ok(self.commit(caret))
    }

    /// Paste text without formatting.
    pub fn paste_plain(&mut self, text: &str) -> Result<String> {
        self.record();
        let caret = self.collapse_selection()?;
        self.pending = None;
        let caret = self.document.insert_text(caret, text, Marks::plain())?;
        Ok(self.commit(caret))
    }

    /// Paste HTML, keeping only its text and block breaks.
    pub fn paste_html(&mut self, html: &str) -> Result<String> {
        let text = from_html(html).plain_text();
        self.paste_plain(&text)
    }

    /// Apply a formatting command at the selection, or at the end of the
    /// document when nothing is selected. Returns the new HTML.
    pub fn apply_format(&mut self, command: &FormatCommand) -> Result<String> {
        let selection = self
            .selection
            .unwrap_or_else(|| Selection::caret(self.document.end_position()));
        self.document.check_selection(&selection)?;

        let before = self.snapshot();
        let after = format::apply(&mut self.document, selection, command, &mut self.pending)?;
        if self.document != before.document {
            self.push_history(before);
        }
        self.selection = Some(after);
        self.html = to_html(&self.document);
        self.refresh_formats();
        Ok(self.html.clone())
    }

    /// [`apply_format`](Self::apply_format) by command name.
    pub fn apply_named(&mut self, name: &str, value: Option<&str>) -> Result<String> {
        let command = FormatCommand::parse(name, value)?;
        self.apply_format(&command)
    }

    /// Take in HTML changed outside the surface.
    ///
    /// Ignored while the surface has focus. Otherwise the document is
    /// replaced and the caret restored to the same block and offset, clamped
    /// to the new content. Returns whether the document was replaced.
    pub fn sync_external(&mut self, html: &str) -> bool {
        if self.focused || html == self.html {
            return false;
        }

        let cursor = self.selection.map(|s| s.head);
        self.document = from_html(html);
        self.html = to_html(&self.document);
        self.selection = cursor.map(|c| Selection::caret(self.document.clamp(c)));
        self.pending = None;
        self.undo_history.clear();
        self.redo_history.clear();
        self.refresh_formats();
        debug!("Resynchronized surface, caret at {:?}", self.selection);
        true
    }

    pub fn active_formats(&self) -> &ActiveFormats {
        &self.active
    }

    /// Note a surface event; formats are refreshed once the settle delay has
    /// passed, see [`poll`](Self::poll).
    pub fn handle_event(&mut self, event: SurfaceEvent, now: Instant) {
        debug!("Surface event {:?}", event);
        self.tracker.schedule(now);
    }

    /// Refresh the active formats if a scheduled refresh is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.tracker.take_due(now) {
            self.refresh_formats();
            true
        } else {
            false
        }
    }

    /// Recompute the active formats now.
    pub fn refresh_formats(&mut self) {
        self.active = match self.selection {
            Some(selection) => {
                format::active_formats(&self.document, &selection, self.pending.as_ref())
            }
            None => ActiveFormats::new(),
        };
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_history.is_empty()
    }

    /// Revert the last edit. Returns the restored HTML.
    pub fn undo(&mut self) -> Option<String> {
        let previous = self.undo_history.pop()?;
        let current = self.snapshot();
        self.redo_history.push(current);
        Some(self.restore(previous))
    }

    /// Reapply the last undone edit. Returns the restored HTML.
    pub fn redo(&mut self) -> Option<String> {
        let next = self.redo_history.pop()?;
        let current = self.snapshot();
        self.undo_history.push(current);
        Some(self.restore(next))
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            document: self.document.clone(),
            selection: self.selection,
        }
    }

    fn record(&mut self) {
        let snapshot = self.snapshot();
        self.push_history(snapshot);
    }

    fn push_history(&mut self, snapshot: Snapshot) {
        self.undo_history.push(snapshot);
        if self.undo_history.len() > self.max_undo_history {
            self.undo_history.remove(0);
        }
        self.redo_history.clear();
    }

    fn restore(&mut self, snapshot: Snapshot) -> String {
        self.document = snapshot.document;
        self.selection = snapshot.selection;
        self.pending = None;
        self.html = to_html(&self.document);
        self.refresh_formats();
        self.html.clone()
    }

    /// Delete the selected range, if any, and return the caret.
    fn collapse_selection(&mut self) -> Result<DocPosition> {
        match self.selection {
            Some(selection) if !selection.is_collapsed() => {
                self.pending = None;
                self.document.delete_range(selection.anchor, selection.head)
            }
            Some(selection) => {
                self.document.check(selection.head)?;
                Ok(selection.head)
            }
            None => Ok(self.document.end_position()),
        }
    }

    fn commit(&mut self, caret: DocPosition) -> String {
        self.selection = Some(Selection::caret(caret));
        self.html = to_html(&self.document);
        self.html.clone()
    }
}

impl Default for ContentSurface {
    fn default() -> Self {
        Self::from_config(&EditorConfig::default())
    }
}
