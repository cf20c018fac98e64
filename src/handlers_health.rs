use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use warp::{reject, Filter, Rejection, Reply};

use crate::errors::GalleryResult;
use crate::state::AppState;
use crate::warp_helpers::{with_state, RemoteError, SharedState};

/// What `/ready` reports once the document store answers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub albums: usize,
    pub secret_albums: usize,
    pub photos: usize,
    pub watermarking: bool,
    pub admin_sessions: usize,
}

pub async fn readiness(state: &AppState) -> GalleryResult<Readiness> {
    let albums = state.albums.list_all().await?;
    Ok(Readiness {
        albums: albums.len(),
        secret_albums: albums.iter().filter(|a| a.is_secret).count(),
        photos: albums.iter().map(|a| a.photos.len()).sum(),
        watermarking: state.orchestrator.watermarking_available(),
        admin_sessions: state.sessions.active_count(),
    })
}

pub async fn health_check() -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn ready_check(state: SharedState) -> Result<impl Reply, Rejection> {
    match readiness(&state).await {
        Ok(gallery) => Ok(warp::reply::json(&json!({
            "status": "ready",
            "gallery": gallery,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))),
        Err(e) => {
            log::error!("Album store unavailable: {}", e);
            Err(reject::custom(RemoteError {
                message: "Album store unavailable".to_string(),
            }))
        }
    }
}

pub fn build_health_routes(
    state: SharedState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let health = warp::path("health").and(warp::get()).and_then(health_check);

    let ready = warp::path("ready")
        .and(warp::get())
        .and(with_state(state))
        .and_then(ready_check);

    health.or(ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AdminSessions;
    use crate::blob_store::MemoryBlobStore;
    use crate::db_pool::create_in_memory_pool;
    use crate::local_store::LocalStores;
    use crate::models::{AlbumDraft, Photo};
    use crate::state::AppStateBuilder;
    use crate::watermark::WatermarkCompositor;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_readiness_counts_albums_and_photos() {
        let state = AppStateBuilder {
            db_pool: create_in_memory_pool().await.unwrap(),
            blobs: Arc::new(MemoryBlobStore::new()),
            local_stores: LocalStores::in_memory(),
            compositor: WatermarkCompositor::without_font(),
            sessions: AdminSessions::new(Some("juno@example.com"), Some("pw")),
            public_origin: "http://h".to_string(),
            default_subtitle: "sub".to_string(),
            max_upload_bytes: 1024,
        }
        .build()
        .unwrap();

        let open = AlbumDraft {
            title: "Open".to_string(),
            ..AlbumDraft::default()
        };
        let secret = AlbumDraft {
            title: "Family".to_string(),
            is_secret: true,
            password: Some("0420".to_string()),
        };
        let photos = vec![
            Photo::new("http://h/blobs/1.jpg".to_string()),
            Photo::new("http://h/blobs/2.jpg".to_string()),
        ];
        state.albums.create(&open, &photos).await.unwrap();
        state.albums.create(&secret, &photos[..1]).await.unwrap();
        state.sessions.login("juno@example.com", "pw").unwrap();

        let ready = readiness(&state).await.unwrap();

        assert_eq!(ready.albums, 2);
        assert_eq!(ready.secret_albums, 1);
        assert_eq!(ready.photos, 3);
        assert!(!ready.watermarking);
        assert_eq!(ready.admin_sessions, 1);
    }
}
