use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

use crate::errors::GalleryError;
use crate::local_store::{LocalStore, LocalStores};
use crate::models::{Album, Photo};
use crate::photo_sort::{sort_for_display, SortOrder};
use crate::warp_helpers::{
    content_type_for, gallery_rejection, with_client_store, with_state, SharedState,
};

#[derive(Debug, Deserialize)]
pub struct AlbumQuery {
    pub code: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LikeRequest {
    /// Count the visitor currently sees.
    #[serde(default)]
    pub displayed: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumListItem {
    pub id: String,
    pub title: String,
    pub photo_count: usize,
    pub cover_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Album> for AlbumListItem {
    fn from(album: &Album) -> Self {
        Self {
            id: album.id.clone(),
            title: album.title.clone(),
            photo_count: album.photos.len(),
            cover_url: album.photos.first().map(|p| p.url.clone()),
            created_at: album.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoView {
    #[serde(flatten)]
    pub photo: Photo,
    pub liked: bool,
}

/// What a visitor gets for an album. Never carries the password.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumView {
    pub id: String,
    pub title: String,
    pub is_secret: bool,
    pub locked: bool,
    pub sort: SortOrder,
    pub photos: Vec<PhotoView>,
    pub created_at: Option<DateTime<Utc>>,
}

impl AlbumView {
    pub fn build(
        album: &Album,
        code: Option<&str>,
        order: SortOrder,
        local: Option<&dyn LocalStore>,
        has_liked: impl Fn(&dyn LocalStore, &str) -> bool,
    ) -> Self {
        let locked = !album.is_unlocked_by(code);
        let photos = if locked {
            Vec::new()
        } else {
            sort_for_display(&album.photos, order, album.is_secret)
                .into_iter()
                .map(|photo| {
                    let liked = local.is_some_and(|store| has_liked(store, &photo.id));
                    PhotoView { photo, liked }
                })
                .collect()
        };

        Self {
            id: album.id.clone(),
            title: album.title.clone(),
            is_secret: album.is_secret,
            locked,
            sort: if album.is_secret { SortOrder::Stored } else { order },
            photos,
            created_at: album.created_at,
        }
    }
}

/// Download file name: `{title}_{n}.jpg`, restricted to header-safe characters.
pub fn download_file_name(title: &str, position: usize) -> String {
    let safe: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.trim().is_empty() { "album" } else { safe.trim() };
    format!("{}_{}.jpg", safe, position)
}

/// Local store for read-only views. A missing or unusable client id just
/// means an anonymous visitor.
pub fn visitor_store(stores: &LocalStores, client_id: Option<&str>) -> Option<Arc<dyn LocalStore>> {
    let id = client_id.map(str::trim).filter(|id| !id.is_empty())?;
    match stores.for_client(id) {
        Ok(store) => Some(store),
        Err(e) => {
            debug!("Ignoring client id for album view: {}", e);
            None
        }
    }
}

pub async fn get_settings(state: SharedState) -> Result<impl Reply, Rejection> {
    let settings = state.settings.get().await.map_err(gallery_rejection)?;
    Ok(warp::reply::json(&settings))
}

pub async fn list_public_albums(state: SharedState) -> Result<impl Reply, Rejection> {
    let albums = state.albums.list_public().await.map_err(gallery_rejection)?;
    let items: Vec<AlbumListItem> = albums.iter().map(AlbumListItem::from).collect();
    Ok(warp::reply::json(&items))
}

pub async fn unlock_album(body: UnlockRequest, state: SharedState) -> Result<impl Reply, Rejection> {
    match state.albums.find_by_code(&body.code).await {
        Ok(Some(id)) => Ok(warp::reply::json(&json!({ "id": id }))),
        Ok(None) => Err(gallery_rejection(GalleryError::not_found(
            "That code does not exist",
        ))),
        Err(e) => Err(gallery_rejection(e)),
    }
}

pub async fn get_album(
    album_id: String,
    query: AlbumQuery,
    client_id: Option<String>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let order = match query.sort.as_deref() {
        None | Some("") => SortOrder::default(),
        Some(raw) => raw.parse::<SortOrder>().map_err(|_| {
            gallery_rejection(GalleryError::validation(format!("Unknown sort order '{}'", raw)))
        })?,
    };

    let album = state
        .albums
        .require(&album_id)
        .await
        .map_err(gallery_rejection)?;

    let local = visitor_store(&state.local_stores, client_id.as_deref());

    let view = AlbumView::build(
        &album,
        query.code.as_deref(),
        order,
        local.as_deref(),
        |store, photo_id| state.likes.has_liked(store, &album.id, photo_id),
    );
    Ok(warp::reply::json(&view))
}

pub async fn like_photo(
    album_id: String,
    photo_id: String,
    body: LikeRequest,
    local: Arc<dyn LocalStore>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let displayed = match body.displayed {
        Some(count) => count,
        None => {
            let album = state
                .albums
                .require(&album_id)
                .await
                .map_err(gallery_rejection)?;
            album
                .photos
                .iter()
                .find(|p| p.id == photo_id)
                .map(|p| p.likes)
                .unwrap_or_default()
        }
    };

    let outcome = state
        .likes
        .like(local.as_ref(), &album_id, &photo_id, displayed)
        .await
        .map_err(gallery_rejection)?;
    Ok(warp::reply::json(&outcome))
}

pub async fn download_photo(
    album_id: String,
    photo_id: String,
    query: DownloadQuery,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let album = state
        .albums
        .require(&album_id)
        .await
        .map_err(gallery_rejection)?;
    if !album.is_unlocked_by(query.code.as_deref()) {
        return Err(gallery_rejection(GalleryError::not_found(format!(
            "Photo {} not found",
            photo_id
        ))));
    }

    let (position, photo) = album
        .photos
        .iter()
        .enumerate()
        .find(|(_, p)| p.id == photo_id)
        .ok_or_else(|| gallery_rejection(GalleryError::not_found(format!("Photo {} not found", photo_id))))?;

    let blobs = state.albums.blobs();
    let path = blobs.path_for_url(&photo.url).ok_or_else(|| {
        gallery_rejection(GalleryError::not_found("Photo file is not stored here"))
    })?;
    let bytes = blobs
        .get(&path)
        .await
        .map_err(gallery_rejection)?
        .ok_or_else(|| gallery_rejection(GalleryError::not_found("Photo file is missing")))?;

    let reply = warp::reply::with_header(bytes.to_vec(), "content-type", content_type_for(&path));
    let reply = warp::reply::with_header(
        reply,
        "content-disposition",
        format!(
            "attachment; filename=\"{}\"",
            download_file_name(&album.title, position + 1)
        ),
    );
    Ok(reply)
}

pub async fn get_blob(tail: warp::path::Tail, state: SharedState) -> Result<impl Reply, Rejection> {
    let path = tail.as_str();
    match state.albums.blobs().get(path).await {
        Ok(Some(bytes)) => {
            let reply = warp::reply::with_header(bytes.to_vec(), "content-type", content_type_for(path));
            Ok(warp::reply::with_header(
                reply,
                "cache-control",
                "public, max-age=31536000",
            ))
        }
        Ok(None) => Err(warp::reject::not_found()),
        Err(GalleryError::Validation(_)) => Err(warp::reject::not_found()),
        Err(e) => Err(gallery_rejection(e)),
    }
}

pub fn build_gallery_routes(
    state: SharedState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let settings = warp::path!("api" / "settings")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_settings);

    let albums = warp::path!("api" / "albums")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_public_albums);

    let unlock = warp::path!("api" / "albums" / "unlock")
        .and(warp::post())
        .and(warp::body::json::<UnlockRequest>())
        .and(with_state(state.clone()))
        .and_then(unlock_album);

    let album = warp::path!("api" / "albums" / String)
        .and(warp::get())
        .and(warp::query::<AlbumQuery>())
        .and(warp::header::optional::<String>("x-client-id"))
        .and(with_state(state.clone()))
        .and_then(get_album);

    let like = warp::path!("api" / "albums" / String / "photos" / String / "like")
        .and(warp::post())
        .and(warp::body::json::<LikeRequest>())
        .and(with_client_store(state.clone()))
        .and(with_state(state.clone()))
        .and_then(like_photo);

    let download = warp::path!("api" / "albums" / String / "photos" / String / "download")
        .and(warp::get())
        .and(warp::query::<DownloadQuery>())
        .and(with_state(state.clone()))
        .and_then(download_photo);

    let blobs = warp::path("blobs")
        .and(warp::path::tail())
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_blob);

    settings
        .or(albums)
        .or(unlock)
        .or(album)
        .or(like)
        .or(download)
        .or(blobs)
}
