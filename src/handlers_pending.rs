use bytes::Buf;
use futures_util::TryStreamExt;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

use crate::auth::AdminSession;
use crate::errors::GalleryError;
use crate::pending_store::{PendingFile, PendingStore, PendingSummary};
use crate::upload_orchestrator::WatermarkRequest;
use crate::watermark::Anchor;
use crate::warp_helpers::{gallery_rejection, with_admin, with_state, SharedState, ValidationError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingListing {
    pub items: Vec<PendingSummary>,
    pub active_index: usize,
    pub total_bytes: usize,
}

impl From<&PendingStore> for PendingListing {
    fn from(store: &PendingStore) -> Self {
        Self {
            items: store.summaries(),
            active_index: store.active_index(),
            total_bytes: store.total_bytes(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub index: usize,
}

fn missing_entry(index: usize) -> Rejection {
    gallery_rejection(GalleryError::not_found(format!("No pending file at {}", index)))
}

pub async fn list_pending(session: Arc<AdminSession>) -> Result<impl Reply, Rejection> {
    let pending = session.pending.lock().await;
    Ok(warp::reply::json(&PendingListing::from(&*pending)))
}

/// Reads every file part of the form. Parts without a file name are skipped.
async fn read_files(form: warp::multipart::FormData) -> Result<Vec<PendingFile>, Rejection> {
    let parts: Vec<warp::multipart::Part> = form.try_collect().await.map_err(|e| {
        log::error!("Failed to read upload form: {}", e);
        warp::reject::custom(ValidationError {
            message: "Malformed upload form".to_string(),
        })
    })?;

    let mut files = Vec::with_capacity(parts.len());
    for part in parts {
        let Some(name) = part.filename().map(str::to_string) else {
            continue;
        };
        let mime_type = part
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = part
            .stream()
            .try_fold(Vec::new(), |mut acc, buf| async move {
                acc.extend_from_slice(buf.chunk());
                Ok(acc)
            })
            .await
            .map_err(|e| {
                log::error!("Failed to read '{}': {}", name, e);
                warp::reject::custom(ValidationError {
                    message: format!("Could not read '{}'", name),
                })
            })?;
        files.push(PendingFile::new(data, &name, &mime_type));
    }
    Ok(files)
}

pub async fn add_pending(
    form: warp::multipart::FormData,
    session: Arc<AdminSession>,
) -> Result<impl Reply, Rejection> {
    let files = read_files(form).await?;
    let mut pending = session.pending.lock().await;
    let added = pending.add(files).map_err(gallery_rejection)?;
    log::info!("Added {} files to the pending batch", added);
    Ok(warp::reply::json(&PendingListing::from(&*pending)))
}

pub async fn clear_pending(session: Arc<AdminSession>) -> Result<impl Reply, Rejection> {
    let mut pending = session.pending.lock().await;
    pending.clear();
    Ok(warp::reply::json(&PendingListing::from(&*pending)))
}

pub async fn remove_pending(index: usize, session: Arc<AdminSession>) -> Result<impl Reply, Rejection> {
    let mut pending = session.pending.lock().await;
    if pending.remove_at(index).is_none() {
        debug!("Pending entry {} already gone, nothing removed", index);
    }
    Ok(warp::reply::json(&PendingListing::from(&*pending)))
}

pub async fn set_anchor(
    index: usize,
    anchor: Anchor,
    session: Arc<AdminSession>,
) -> Result<impl Reply, Rejection> {
    let mut pending = session.pending.lock().await;
    if !pending.set_anchor(index, anchor) {
        return Err(missing_entry(index));
    }
    Ok(warp::reply::json(&PendingListing::from(&*pending)))
}

pub async fn set_active(body: ActiveRequest, session: Arc<AdminSession>) -> Result<impl Reply, Rejection> {
    let mut pending = session.pending.lock().await;
    pending.set_active(body.index);
    Ok(warp::reply::json(&json!({ "activeIndex": pending.active_index() })))
}

pub async fn get_pending_file(index: usize, session: Arc<AdminSession>) -> Result<impl Reply, Rejection> {
    let pending = session.pending.lock().await;
    let entry = pending.get(index).ok_or_else(|| missing_entry(index))?;
    Ok(warp::reply::with_header(
        entry.file.raw_bytes.to_vec(),
        "content-type",
        entry.file.mime_type.clone(),
    ))
}

pub async fn preview_pending(
    index: usize,
    watermark: WatermarkRequest,
    session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let entry = {
        let pending = session.pending.lock().await;
        pending.get(index).cloned().ok_or_else(|| missing_entry(index))?
    };

    let composited = state
        .orchestrator
        .preview(&entry, &watermark)
        .await
        .map_err(gallery_rejection)?;

    Ok(warp::reply::with_header(
        composited.bytes.to_vec(),
        "content-type",
        composited.mime_type,
    ))
}

pub fn build_pending_routes(
    state: SharedState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = warp::path!("api" / "admin" / "pending")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and_then(list_pending);

    let add = warp::path!("api" / "admin" / "pending")
        .and(warp::post())
        .and(warp::multipart::form().max_length(state.max_upload_bytes))
        .and(with_admin(state.clone()))
        .and_then(add_pending);

    let clear = warp::path!("api" / "admin" / "pending")
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and_then(clear_pending);

    let active = warp::path!("api" / "admin" / "pending" / "active")
        .and(warp::put())
        .and(warp::body::json::<ActiveRequest>())
        .and(with_admin(state.clone()))
        .and_then(set_active);

    let remove = warp::path!("api" / "admin" / "pending" / usize)
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and_then(remove_pending);

    let anchor = warp::path!("api" / "admin" / "pending" / usize / "anchor")
        .and(warp::put())
        .and(warp::body::json::<Anchor>())
        .and(with_admin(state.clone()))
        .and_then(set_anchor);

    let file = warp::path!("api" / "admin" / "pending" / usize / "file")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and_then(get_pending_file);

    let preview = warp::path!("api" / "admin" / "pending" / usize / "preview")
        .and(warp::post())
        .and(warp::body::json::<WatermarkRequest>())
        .and(with_admin(state.clone()))
        .and(with_state(state))
        .and_then(preview_pending);

    list.or(add)
        .or(clear)
        .or(active)
        .or(remove)
        .or(anchor)
        .or(file)
        .or(preview)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_reflects_store() {
        let mut store = PendingStore::new();
        store
            .add(vec![
                PendingFile::new(vec![0u8; 10], "a.jpg", "image/jpeg"),
                PendingFile::new(vec![0u8; 5], "b.png", "image/png"),
            ])
            .unwrap();
        store.set_active(1);

        let listing = PendingListing::from(&store);

        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.active_index, 1);
        assert_eq!(listing.total_bytes, 15);
        assert_eq!(listing.items[1].name, "b.png");
    }

    #[tokio::test]
    async fn test_removing_missing_entry_keeps_listing() {
        let session = Arc::new(AdminSession::default());
        session
            .pending
            .lock()
            .await
            .add(vec![PendingFile::new(vec![1u8], "a.jpg", "image/jpeg")])
            .unwrap();

        let reply = remove_pending(7, session.clone()).await.unwrap();

        assert_eq!(reply.into_response().status(), warp::http::StatusCode::OK);
        assert_eq!(session.pending.lock().await.len(), 1);
    }
}
