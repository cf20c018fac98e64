use serde_json::json;
use std::sync::Arc;

use picturewrite::auth::AdminSessions;
use picturewrite::blob_store::MemoryBlobStore;
use picturewrite::db_pool::create_in_memory_pool;
use picturewrite::errors::GalleryError;
use picturewrite::handlers_gallery::{AlbumListItem, AlbumView};
use picturewrite::local_store::LocalStores;
use picturewrite::models::{AlbumDraft, AppSettings, ShareSummary};
use picturewrite::pending_store::PendingFile;
use picturewrite::photo_sort::SortOrder;
use picturewrite::presets::WatermarkPreset;
use picturewrite::state::{AppState, AppStateBuilder};
use picturewrite::watermark::{WatermarkCompositor, WatermarkStyle};

const ORIGIN: &str = "https://pics.example";

async fn app() -> (Arc<AppState>, Arc<MemoryBlobStore>) {
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = AppStateBuilder {
        db_pool: create_in_memory_pool().await.unwrap(),
        blobs: blobs.clone(),
        local_stores: LocalStores::in_memory(),
        compositor: WatermarkCompositor::without_font(),
        sessions: AdminSessions::new(Some("juno@example.com"), Some("hunter2")),
        public_origin: ORIGIN.to_string(),
        default_subtitle: "Picturewrite by Juno.".to_string(),
        max_upload_bytes: 1024 * 1024,
    }
    .build()
    .unwrap();
    (state, blobs)
}

/// Logs in, stages `count` files in the session and publishes them as an album.
async fn publish(state: &AppState, title: &str, password: Option<&str>, count: u8) -> ShareSummary {
    let token = state.sessions.login("juno@example.com", "hunter2").unwrap();
    let session = state.sessions.session(&token).unwrap();
    let mut pending = session.pending.lock().await;
    pending
        .add((0..count).map(|i| PendingFile::new(vec![i], &format!("{}_{}.jpg", title, i), "image/jpeg")))
        .unwrap();

    let draft = AlbumDraft {
        title: title.to_string(),
        is_secret: password.is_some(),
        password: password.map(str::to_string),
    };
    state
        .orchestrator
        .upload_new_album(&draft, &mut pending, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_visitor_sees_public_albums_only() {
    let (state, _) = app().await;
    let public = publish(&state, "Beach", None, 2).await;
    let secret = publish(&state, "Family", Some("0420"), 1).await;

    let listed: Vec<AlbumListItem> = state
        .albums
        .list_public()
        .await
        .unwrap()
        .iter()
        .map(AlbumListItem::from)
        .collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, public.id);
    assert_eq!(listed[0].photo_count, 2);
    assert!(listed[0].cover_url.as_deref().unwrap().ends_with("_Beach_0.jpg"));

    let album = state.albums.require(&secret.id).await.unwrap();
    let locked = AlbumView::build(&album, None, SortOrder::Stored, None, |_, _| false);
    assert!(locked.locked);
    assert!(locked.photos.is_empty());

    let unlocked_id = state.albums.find_by_code("0420").await.unwrap().unwrap();
    let unlocked = AlbumView::build(&album, Some("0420"), SortOrder::Random, None, |_, _| false);
    assert_eq!(unlocked_id, secret.id);
    assert_eq!(unlocked.photos.len(), 1);
}

#[tokio::test]
async fn test_likes_are_tracked_per_browser() {
    let (state, _) = app().await;
    let summary = publish(&state, "Party", None, 2).await;
    let album = state.albums.require(&summary.id).await.unwrap();
    let photo_id = album.photos[1].id.clone();

    let alice = state.local_stores.for_client("alice").unwrap();
    let bob = state.local_stores.for_client("bob").unwrap();

    state.likes.like(alice.as_ref(), &summary.id, &photo_id, 0).await.unwrap();
    let again = state.likes.like(alice.as_ref(), &summary.id, &photo_id, 1).await;
    assert!(matches!(again, Err(GalleryError::AlreadyLiked)));
    let outcome = state.likes.like(bob.as_ref(), &summary.id, &photo_id, 1).await.unwrap();
    assert_eq!(outcome.stored_likes, 2);

    let album = state.albums.require(&summary.id).await.unwrap();
    let view = AlbumView::build(
        &album,
        None,
        SortOrder::Popular,
        Some(alice.as_ref()),
        |store, id| state.likes.has_liked(store, &summary.id, id),
    );
    assert_eq!(view.photos[0].photo.id, photo_id);
    assert_eq!(view.photos[0].photo.likes, 2);
    assert!(view.photos[0].liked);
    assert!(!view.photos[1].liked);
}

#[tokio::test]
async fn test_admin_deletes_photo_then_album() {
    let (state, blobs) = app().await;
    let summary = publish(&state, "Cleanup", None, 3).await;
    let album = state.albums.require(&summary.id).await.unwrap();
    assert_eq!(blobs.paths().len(), 3);

    let remaining = state
        .albums
        .delete_photo(&summary.id, &album.photos[1].id)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].id, album.photos[0].id);
    assert_eq!(remaining[1].id, album.photos[2].id);
    assert_eq!(blobs.paths().len(), 2);

    state.albums.delete_album(&summary.id).await.unwrap();
    assert!(blobs.paths().is_empty());
    assert!(state.albums.get(&summary.id).await.unwrap().is_none());

    // A second delete of the same album is not an error.
    state.albums.delete_album(&summary.id).await.unwrap();
}

#[tokio::test]
async fn test_share_summary_for_existing_album() {
    let (state, _) = app().await;
    let summary = publish(&state, "Wedding", Some("ring"), 1).await;

    let album = state.albums.require(&summary.id).await.unwrap();
    let again = ShareSummary::for_album(&state.public_origin, &album);

    assert_eq!(again, summary);
    assert!(again.share_text().ends_with("\nCode: ring"));
}

#[tokio::test]
async fn test_settings_and_presets_round_trip_through_state() {
    let (state, _) = app().await;

    assert_eq!(state.settings.get().await.unwrap().subtitle, "Picturewrite by Juno.");
    state
        .settings
        .save(&AppSettings {
            subtitle: "Summer".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(state.settings.get().await.unwrap().subtitle, "Summer");

    let style = WatermarkStyle {
        text: "© Juno".to_string(),
        color_hex: "#f0c".to_string(),
        font_size_px: 32.0,
        opacity: 0.6,
    };
    {
        let mut book = state.presets.lock().await;
        book.add(WatermarkPreset::from_style("Pink", &style)).unwrap();
    }

    let admin_store = state.local_stores.admin().unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&admin_store.get("wmPresets").unwrap()).unwrap();
    assert_eq!(raw[0]["name"], json!("Pink"));

    let applied = state.presets.lock().await.apply(0).unwrap();
    assert_eq!(applied, style);
}

#[tokio::test]
async fn test_logout_drops_pending_batch() {
    let (state, blobs) = app().await;
    let token = state.sessions.login("juno@example.com", "hunter2").unwrap();
    let session = state.sessions.session(&token).unwrap();
    session
        .pending
        .lock()
        .await
        .add(vec![PendingFile::new(vec![1u8], "a.jpg", "image/jpeg")])
        .unwrap();

    state.sessions.logout(&token);

    assert!(state.sessions.session(&token).is_none());
    assert!(blobs.paths().is_empty());

    let fresh = state.sessions.login("juno@example.com", "hunter2").unwrap();
    let session = state.sessions.session(&fresh).unwrap();
    assert!(session.pending.lock().await.is_empty());
}
