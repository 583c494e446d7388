//! # Scriptorium API
//!
//! Shared vocabulary between the Scriptorium editor, its core services and
//! whatever backend stores the posts. It defines:
//!
//! - the post and section records exchanged with the backend,
//! - the [`PostBackend`] trait the editor persists through,
//! - the [`Event`] type used for transient notifications.
//!
//! ## Example
//!
//! ```rust
//! use scriptorium_api::{NewPost, PostContent, PostFilter};
//!
//! let post = NewPost::draft("Hello", "hello", PostContent::new("<p>Hi</p>"))
//!     .into_post("1".to_string(), chrono::Utc::now());
//! assert!(PostFilter::default().with_text("hi").matches(&post));
//! ```

pub mod backend;
pub mod event;
pub mod post;

pub use backend::{BackendError, BackendResult, PostBackend};
pub use event::{Event, EventHandler, EventType};
pub use post::{NewPost, Post, PostContent, PostFilter, PostId, PostOrder, PostUpdate, Section};
