use scriptorium_api::{NewPost, PostBackend, PostContent};
use scriptorium_core::drafts::{Draft, DraftLibrary, DraftStatus, Paginator};
use scriptorium_core::{Config, LocalDraftStore, MemoryBackend};
use std::sync::Arc;

// This integration test runs the draft list against a file-backed local
// store and an in-memory backend: drafts mirrored while offline survive a
// reopen of the store, merge with the server's posts once it is back, and
// deleting them clears both sides.

#[tokio::test]
async fn offline_drafts_survive_reopen_and_merge_with_server() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.drafts.store_path = dir.path().join("local_store.json");
    config.drafts.page_size = 2;

    {
        let store = LocalDraftStore::open(&config.drafts.store_path).unwrap();
        store
            .upsert_draft(Draft::new("temp-1", "Written offline", "on the train", DraftStatus::Draft))
            .unwrap();
    }

    let backend = Arc::new(MemoryBackend::new());
    for title in ["Matins", "Lauds"] {
        let mut post = NewPost::draft(title, title.to_lowercase(), PostContent::new("<p>chant</p>"));
        post.user_id = Some("monk".to_string());
        backend.insert_post(post).await.unwrap();
    }

    let store = Arc::new(LocalDraftStore::open(&config.drafts.store_path).unwrap());
    let library = DraftLibrary::new(Some(backend.clone() as Arc<dyn PostBackend>), store.clone())
        .with_search_limit(config.drafts.search_limit);

    let drafts = library.list_drafts(Some("monk")).await.unwrap();
    assert_eq!(drafts.len(), 3);
    assert!(drafts.iter().any(|d| d.id == "temp-1"));

    let mut pages = Paginator::new(drafts.len(), config.drafts.page_size);
    assert_eq!(pages.total_pages(), 2);
    pages.next();
    assert_eq!(pages.slice(&drafts).unwrap().len(), 1);

    let server_id = drafts
        .iter()
        .find(|d| d.title == "Matins")
        .map(|d| d.id.clone())
        .unwrap();
    library.delete_draft(&server_id).await.unwrap();
    library.delete_draft("temp-1").await.unwrap();

    let remaining = library.list_drafts(Some("monk")).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title, "Lauds");
    assert!(backend.fetch_post(&server_id).await.unwrap().is_none());

    let reopened = LocalDraftStore::open(&config.drafts.store_path).unwrap();
    assert!(reopened.drafts().unwrap().is_empty());
}

#[tokio::test]
async fn search_survives_backend_outage() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_available(false);

    let store = Arc::new(LocalDraftStore::in_memory());
    store
        .upsert_draft(Draft::new("temp-2", "Compline", "night office", DraftStatus::Draft))
        .unwrap();

    let library = DraftLibrary::new(Some(backend as Arc<dyn PostBackend>), store);
    let results = library.search("night").await.unwrap();

    assert!(results.posts.is_empty());
    assert_eq!(results.drafts.len(), 1);
}
