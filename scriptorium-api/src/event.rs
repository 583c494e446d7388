//! Editor events and transient notifications.
//!
//! Everything the editor wants to tell the outside world (a save failed, a
//! post was published, an id was assigned) travels as an [`Event`]. The
//! user-visible message lives in [`Event::data`]; structured details such as
//! the post id or the edit path go into the metadata map.
//!
//! # Example
//!
//! ```rust
//! use scriptorium_api::{Event, EventHandler, EventType};
//!
//! struct Toaster;
//!
//! impl EventHandler for Toaster {
//!     fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
//!         if event.event_type().is_notice() {
//!             println!("{}", event.data());
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Metadata key holding the post id an event refers to.
pub const META_POST_ID: &str = "post_id";
/// Metadata key holding the edit path announced when an id is assigned.
pub const META_EDIT_PATH: &str = "edit_path";
/// Metadata key holding the offending field of a validation failure.
pub const META_FIELD: &str = "field";

/// Receives events dispatched by the event bus.
pub trait EventHandler: Send + Sync {
    /// Handle an incoming event.
    ///
    /// # Errors
    ///
    /// A returned error is logged by the bus and does not stop the other
    /// handlers from running.
    fn handle(&mut self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: FnMut(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// Something that happened in an editing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    event_type: EventType,
    /// Human readable message
    data: String,
    metadata: HashMap<String, String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event {
    /// Create a new event with the specified type and message.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_api::{Event, EventType};
    ///
    /// let event = Event::new(EventType::PostSaved, "Draft saved");
    /// assert_eq!(event.data(), "Draft saved");
    /// ```
    pub fn new<S: Into<String>>(event_type: EventType, data: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            data: data.into(),
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Builder-style variant of [`set_metadata`](Self::set_metadata).
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_api::{Event, EventType, event::META_POST_ID};
    ///
    /// let event = Event::new(EventType::PostCreated, "Created").with(META_POST_ID, "42");
    /// assert_eq!(event.get_metadata(META_POST_ID), Some("42"));
    /// ```
    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.set_metadata(key, value);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.timestamp
    }

    /// Add or update a metadata entry.
    pub fn set_metadata<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Get a specific metadata value.
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }
}

/// Types of events emitted while editing posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // Editing
    /// The body of the post changed
    ContentChanged,
    /// The title of the post changed
    TitleChanged,
    /// The set of active formats at the caret changed
    FormatsChanged,

    // Persistence
    /// A new post record was inserted
    PostCreated,
    /// The session received its server identity
    IdentityAssigned,
    /// A save completed
    PostSaved,
    /// A save failed; the edits are kept
    SaveFailed,
    /// The local fallback mirror was written
    DraftMirrored,
    /// A post or draft was deleted
    PostDeleted,
    /// A cover image finished uploading
    CoverImageUploaded,

    // Publishing
    /// The post became visible to readers
    PostPublished,
    /// The post went back to draft
    PostUnpublished,

    /// An operation was refused before reaching the backend
    ValidationFailed,
}

impl EventType {
    /// Get a human-readable description of the event type.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_api::EventType;
    ///
    /// assert_eq!(EventType::SaveFailed.description(), "Save failed");
    /// ```
    pub fn description(&self) -> &'static str {
        match self {
            EventType::ContentChanged => "Post content was changed",
            EventType::TitleChanged => "Post title was changed",
            EventType::FormatsChanged => "Active formats changed",
            EventType::PostCreated => "Post was created",
            EventType::IdentityAssigned => "Post identity was assigned",
            EventType::PostSaved => "Post was saved",
            EventType::SaveFailed => "Save failed",
            EventType::DraftMirrored => "Draft mirrored locally",
            EventType::PostDeleted => "Post was deleted",
            EventType::CoverImageUploaded => "Cover image was uploaded",
            EventType::PostPublished => "Post was published",
            EventType::PostUnpublished => "Post was unpublished",
            EventType::ValidationFailed => "Validation failed",
        }
    }

    /// Whether this event should be shown to the user as a transient notice.
    pub fn is_notice(&self) -> bool {
        matches!(
            self,
            EventType::SaveFailed
                | EventType::ValidationFailed
                | EventType::PostPublished
                | EventType::PostUnpublished
                | EventType::PostDeleted
        )
    }

    /// Get all available event types.
    pub fn all() -> Vec<EventType> {
        vec![
            EventType::ContentChanged,
            EventType::TitleChanged,
            EventType::FormatsChanged,
            EventType::PostCreated,
            EventType::IdentityAssigned,
            EventType::PostSaved,
            EventType::SaveFailed,
            EventType::DraftMirrored,
            EventType::PostDeleted,
            EventType::CoverImageUploaded,
            EventType::PostPublished,
            EventType::PostUnpublished,
            EventType::ValidationFailed,
        ]
    }
}
