use scriptorium_api::event::{META_EDIT_PATH, META_FIELD};
use scriptorium_api::{EventType, NewPost, PostBackend, PostContent};
use scriptorium_core::{Config, EventBus, EventLog, LocalDraftStore, MemoryBackend, Session};
use scriptorium_editor::{FormatCommand, PostEditor, SaveOutcome, SaveStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// These tests drive a whole editing session against the in-memory backend on
// a paused clock, so the 2 s auto-save window elapses instantly.

struct Harness {
    editor: PostEditor,
    backend: Arc<MemoryBackend>,
    store: Arc<LocalDraftStore>,
    log: EventLog,
}

async fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(LocalDraftStore::in_memory());
    let bus = EventBus::immediate();
    let log = EventLog::new();
    bus.subscribe_all(log.handler(), 0).await.unwrap();

    let editor = PostEditor::new(
        backend.clone(),
        store.clone(),
        Arc::new(bus),
        Session::signed_in("u1", "Scribe"),
        Arc::new(Config::default()),
    );
    Harness {
        editor,
        backend,
        store,
        log,
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_collapse_into_one_save() {
    let Harness {
        mut editor,
        backend,
        ..
    } = harness().await;
    assert!(editor.mount());
    editor.set_title("Lauds").await;

    for word in ["Praise ", "the ", "dawn"] {
        editor.type_text(word).await.unwrap();
        advance(500).await;
    }

    // Last edit happened 500 ms ago; the window is 2 s.
    advance(1400).await;
    assert_eq!(backend.stats().writes(), 0);

    advance(200).await;
    assert_eq!(backend.stats().inserts, 1);
    assert_eq!(backend.stats().writes(), 1);

    let posts = backend.posts();
    let stored = &posts[0];
    assert_eq!(stored.content.html, "<p>Praise the dawn</p>");
    assert_eq!(stored.slug, "lauds");
}

#[tokio::test(start_paused = true)]
async fn nothing_is_saved_without_a_title() {
    let Harness {
        mut editor,
        backend,
        store,
        ..
    } = harness().await;
    editor.mount();
    editor.type_text("Words with no name").await.unwrap();
    advance(5_000).await;

    editor.set_title("Briefly").await;
    editor.set_title("   ").await;
    editor.type_text(" still").await.unwrap();
    advance(5_000).await;

    assert_eq!(backend.stats().total(), 0);
    assert!(store.drafts().unwrap().is_empty());
    assert_eq!(editor.save_status(), SaveStatus::Draft);
}

#[tokio::test(start_paused = true)]
async fn identity_is_stable_after_first_insert() {
    let Harness {
        mut editor,
        backend,
        log,
        ..
    } = harness().await;
    editor.mount();
    editor.set_title("Terce").await;
    editor.type_text("Third hour").await.unwrap();
    advance(2_100).await;

    let id = editor.post_id().expect("first save assigns an id");
    editor.type_text(" prayer").await.unwrap();
    advance(2_100).await;
    editor.set_title("Terce, revised").await;
    advance(2_100).await;

    assert_eq!(editor.post_id(), Some(id.clone()));
    assert_eq!(backend.stats().inserts, 1);
    assert_eq!(backend.stats().updates, 2);

    let stored = backend.fetch_post(&id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Terce, revised");
    assert_eq!(stored.slug, "terce-revised");
    assert_eq!(stored.content.html, "<p>Third hour prayer</p>");

    let assigned = log.of_type(EventType::IdentityAssigned);
    assert_eq!(assigned.len(), 1);
    assert_eq!(
        assigned[0].get_metadata(META_EDIT_PATH),
        Some(format!("/admin/posts/{}", id).as_str())
    );
    assert!(matches!(editor.save_status(), SaveStatus::Saved(_)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_saves_insert_once() {
    let Harness {
        mut editor,
        backend,
        ..
    } = harness().await;
    backend.set_latency(Duration::from_millis(50));
    editor.set_title("Sext").await;
    editor.type_text("Noon").await.unwrap();

    let (first, second) = tokio::join!(editor.save(), editor.save());
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(backend.stats().inserts, 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, SaveOutcome::Created(_)))
            .count(),
        1
    );
    assert_eq!(backend.posts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn publish_requires_title_and_category() {
    let Harness {
        mut editor,
        backend,
        log,
        ..
    } = harness().await;

    let err = editor.toggle_publish().await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(
        log.messages(EventType::ValidationFailed),
        vec!["Please add a title before publishing"]
    );

    editor.set_title("Nones").await;
    editor.type_text("Ninth hour").await.unwrap();
    let err = editor.toggle_publish().await.unwrap_err();
    assert_eq!(err.user_message(), "Please select a category before publishing");
    let failures = log.of_type(EventType::ValidationFailed);
    assert_eq!(failures[1].get_metadata(META_FIELD), Some("category"));

    assert_eq!(backend.stats().total(), 0);
    assert!(!editor.is_published());
}

#[tokio::test(start_paused = true)]
async fn publish_flips_state_and_persists_excerpt() {
    let Harness {
        mut editor,
        backend,
        log,
        ..
    } = harness().await;
    let notified = Arc::new(AtomicBool::new(false));
    let flag = notified.clone();
    editor.on_publish(move |published| flag.store(published, Ordering::SeqCst));

    editor.set_title("Vespers").await;
    editor.type_text(&"evening ".repeat(40)).await.unwrap();
    editor.set_category(Some("hours".to_string())).await;

    assert!(editor.toggle_publish().await.unwrap());
    assert!(editor.is_published());
    assert!(notified.load(Ordering::SeqCst));

    let id = editor.post_id().unwrap();
    let stored = backend.fetch_post(&id).await.unwrap().unwrap();
    assert!(stored.is_published);
    assert_eq!(stored.section_id.as_deref(), Some("hours"));
    assert_eq!(stored.content.category.as_deref(), Some("hours"));
    let excerpt = stored.excerpt.unwrap();
    assert!(excerpt.chars().count() <= 200);
    assert!(excerpt.starts_with("evening evening"));
    assert_eq!(
        log.messages(EventType::PostPublished),
        vec!["Post published successfully!"]
    );

    editor.set_excerpt(Some("At dusk".to_string()));
    assert!(!editor.toggle_publish().await.unwrap());
    let stored = backend.fetch_post(&id).await.unwrap().unwrap();
    assert!(!stored.is_published);
    assert_eq!(stored.excerpt.as_deref(), Some("At dusk"));
    assert_eq!(log.messages(EventType::PostUnpublished), vec!["Post unpublished"]);
    assert!(!notified.load(Ordering::SeqCst));
    assert_eq!(backend.stats().inserts, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_save_is_mirrored_and_retried() {
    let Harness {
        mut editor,
        backend,
        store,
        log,
    } = harness().await;
    backend.set_available(false);

    editor.set_title("Compline").await;
    editor.type_text("Night").await.unwrap();
    advance(2_100).await;

    assert_eq!(
        log.messages(EventType::SaveFailed),
        vec!["Save failed: network error: backend unavailable"]
    );
    assert_eq!(editor.content().html, "<p>Night</p>");
    assert!(editor.post_id().is_none());
    let drafts = store.drafts().unwrap();
    assert_eq!(drafts.len(), 1);
    assert!(drafts[0].id.starts_with("temp-"));

    backend.set_available(true);
    editor.type_text(" prayer").await.unwrap();
    advance(2_100).await;

    let id = editor.post_id().expect("retry assigns an id");
    assert_eq!(backend.stats().inserts, 1);
    let drafts = store.drafts().unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].id, id);
    assert_eq!(drafts[0].content, "Night prayer");
    assert_eq!(drafts[0].word_count, 2);
}

#[tokio::test(start_paused = true)]
async fn opened_post_updates_in_place_and_skips_unchanged() {
    let Harness {
        mut editor,
        backend,
        ..
    } = harness().await;
    let mut seed = NewPost::draft("Matins", "matins", PostContent::new("<p>Old text</p>"));
    seed.user_id = Some("u1".to_string());
    seed.section_id = Some("hours".to_string());
    let seeded = backend.insert_post(seed).await.unwrap();

    editor.open(&seeded.id).await.unwrap();
    assert_eq!(editor.title(), "Matins");
    assert_eq!(editor.category(), Some("hours"));
    assert_eq!(editor.surface().html(), "<p>Old text</p>");
    assert!(!editor.mount());

    // Edits that end where they started are not written.
    editor.focus();
    editor.type_text(" x").await.unwrap();
    editor.backspace().await.unwrap();
    editor.backspace().await.unwrap();
    advance(2_100).await;
    assert_eq!(backend.stats().updates, 0);

    editor.type_text(", new text").await.unwrap();
    advance(2_100).await;
    assert_eq!(backend.stats().inserts, 1);
    assert_eq!(backend.stats().updates, 1);
    let stored = backend.fetch_post(&seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.content.html, "<p>Old text, new text</p>");
}

#[tokio::test(start_paused = true)]
async fn external_content_does_not_schedule_a_save() {
    let Harness {
        mut editor,
        backend,
        ..
    } = harness().await;
    editor.set_title("Prime").await;
    editor.shutdown();

    assert!(editor.sync_content(PostContent::new("<p>From elsewhere</p>")));
    assert_eq!(editor.content().html, "<p>From elsewhere</p>");
    assert_eq!(editor.word_count(), 2);
    advance(5_000).await;
    assert_eq!(backend.stats().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_editor_cancels_the_timer() {
    let Harness {
        mut editor,
        backend,
        ..
    } = harness().await;
    editor.set_title("Unfinished").await;
    editor.type_text("Gone").await.unwrap();
    drop(editor);

    advance(5_000).await;
    assert_eq!(backend.stats().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn formatting_that_changes_nothing_leaves_the_timer_alone() {
    let Harness {
        mut editor,
        backend,
        log,
        ..
    } = harness().await;
    editor.mount();
    editor.set_title("Lauds").await;
    editor.type_text("dawn").await.unwrap();
    advance(1_500).await;

    // Bold on a collapsed caret only arms the next typed text.
    let before = editor.content().html.clone();
    let changes = log.count(EventType::ContentChanged);
    editor.apply_format(&FormatCommand::Bold).await.unwrap();
    assert_eq!(editor.content().html, before);
    assert_eq!(log.count(EventType::ContentChanged), changes);

    advance(600).await;
    assert_eq!(backend.stats().writes(), 1);

    editor.apply_format(&FormatCommand::Italic).await.unwrap();
    advance(3_000).await;
    assert_eq!(backend.stats().writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn opened_words_are_not_counted_as_written() {
    let Harness {
        mut editor,
        backend,
        ..
    } = harness().await;
    let seed = NewPost::draft(
        "Prime",
        "prime",
        PostContent::new("<p>one two three four five</p>"),
    );
    let seeded = backend.insert_post(seed).await.unwrap();

    editor.open(&seeded.id).await.unwrap();
    assert_eq!(editor.stats().word_count(), 5);
    assert_eq!(editor.stats().session_words(), 0);

    editor.focus();
    editor.type_text(" six seven").await.unwrap();
    assert_eq!(editor.stats().word_count(), 7);
    assert_eq!(editor.stats().session_words(), 2);

    editor.blur();
    editor.sync_content(PostContent::new("<p>rewritten elsewhere</p>"));
    assert_eq!(editor.stats().word_count(), 2);
    assert_eq!(editor.stats().session_words(), 2);
}
