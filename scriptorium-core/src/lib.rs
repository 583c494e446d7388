//! # Scriptorium Core
//!
//! Shared services behind the Scriptorium post editor: configuration, error
//! handling, the event bus for transient notices, the author session, the
//! local fallback store, the draft list with search and pagination, and an
//! in-process backend.
//!
//! ## Example
//!
//! ```rust
//! use scriptorium_core::{Config, DraftLibrary, LocalDraftStore};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = Config::default();
//! let store = Arc::new(LocalDraftStore::in_memory());
//! let library = DraftLibrary::new(None, store).with_search_limit(config.drafts.search_limit);
//! assert!(library.list_drafts(None).await?.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod config;
pub mod drafts;
pub mod error;
pub mod events;
pub mod memory;
pub mod session;
pub mod store;
pub mod text;

pub use config::Config;
pub use drafts::{Draft, DraftLibrary, DraftStatus, Paginator, SearchResults};
pub use error::{Error, Result};
pub use events::{EventBus, EventLog};
pub use memory::MemoryBackend;
pub use scriptorium_api::event::{Event, EventType};
pub use session::Session;
pub use store::LocalDraftStore;

/// Initialize tracing for the application.
///
/// # Example
///
/// ```rust
/// scriptorium_core::init_tracing();
/// tracing::info!("Editor started");
/// ```
pub fn init_tracing() {
    // A global subscriber may already be installed by the embedding program.
    let _ = tracing_subscriber::fmt::try_init();
}

/// Initialize tracing filtered at `level`, unless `RUST_LOG` says otherwise.
///
/// # Example
///
/// ```rust
/// scriptorium_core::init_tracing_with_level("debug");
/// ```
pub fn init_tracing_with_level(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
