use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

use crate::auth::AdminSession;
use crate::models::{Album, AlbumDraft, AppSettings, Photo, ShareSummary};
use crate::upload_orchestrator::WatermarkRequest;
use crate::warp_helpers::{bearer_token, gallery_rejection, with_admin, with_state, SharedState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlbumRequest {
    #[serde(flatten)]
    pub draft: AlbumDraft,
    #[serde(default)]
    pub watermark: Option<WatermarkRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppendPhotosRequest {
    #[serde(default)]
    pub watermark: Option<WatermarkRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    #[serde(flatten)]
    pub summary: ShareSummary,
    pub share_text: String,
}

impl From<ShareSummary> for ShareResponse {
    fn from(summary: ShareSummary) -> Self {
        let share_text = summary.share_text();
        Self {
            summary,
            share_text,
        }
    }
}

/// Admin view of an album, password included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAlbumItem {
    pub id: String,
    pub title: String,
    pub is_secret: bool,
    pub password: Option<String>,
    pub photos: Vec<Photo>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Album> for AdminAlbumItem {
    fn from(album: Album) -> Self {
        Self {
            id: album.id,
            title: album.title,
            is_secret: album.is_secret,
            password: album.password,
            photos: album.photos,
            created_at: album.created_at,
        }
    }
}

pub async fn login(body: LoginRequest, state: SharedState) -> Result<impl Reply, Rejection> {
    let token = state
        .sessions
        .login(&body.email, &body.password)
        .map_err(gallery_rejection)?;
    Ok(warp::reply::json(&json!({ "token": token })))
}

pub async fn logout(token: String, state: SharedState) -> Result<impl Reply, Rejection> {
    state.sessions.logout(&token);
    Ok(warp::reply::json(&json!({ "success": true })))
}

pub async fn list_albums(_session: Arc<AdminSession>, state: SharedState) -> Result<impl Reply, Rejection> {
    let albums = state.albums.list_all().await.map_err(gallery_rejection)?;
    let items: Vec<AdminAlbumItem> = albums.into_iter().map(AdminAlbumItem::from).collect();
    Ok(warp::reply::json(&items))
}

pub async fn create_album(
    body: CreateAlbumRequest,
    session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let mut pending = session.pending.lock().await;
    let summary = state
        .orchestrator
        .upload_new_album(&body.draft, &mut pending, body.watermark.as_ref())
        .await
        .map_err(gallery_rejection)?;

    Ok(warp::reply::with_status(
        warp::reply::json(&ShareResponse::from(summary)),
        warp::http::StatusCode::CREATED,
    ))
}

pub async fn append_photos(
    album_id: String,
    body: AppendPhotosRequest,
    session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let mut pending = session.pending.lock().await;
    let photos = state
        .orchestrator
        .append_to_album(&album_id, &mut pending, body.watermark.as_ref())
        .await
        .map_err(gallery_rejection)?;
    Ok(warp::reply::json(&photos))
}

pub async fn delete_album(
    album_id: String,
    _session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    state
        .albums
        .delete_album(&album_id)
        .await
        .map_err(gallery_rejection)?;
    Ok(warp::reply::json(&json!({ "success": true })))
}

pub async fn delete_photo(
    album_id: String,
    photo_id: String,
    _session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let remaining = state
        .albums
        .delete_photo(&album_id, &photo_id)
        .await
        .map_err(gallery_rejection)?;
    Ok(warp::reply::json(&remaining))
}

pub async fn share_album(
    album_id: String,
    _session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let album = state
        .albums
        .require(&album_id)
        .await
        .map_err(gallery_rejection)?;
    let summary = ShareSummary::for_album(&state.public_origin, &album);
    Ok(warp::reply::json(&ShareResponse::from(summary)))
}

pub async fn save_settings(
    body: AppSettings,
    _session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    state.settings.save(&body).await.map_err(gallery_rejection)?;
    let settings = state.settings.get().await.map_err(gallery_rejection)?;
    Ok(warp::reply::json(&settings))
}

pub fn build_admin_routes(
    state: SharedState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let login = warp::path!("api" / "admin" / "login")
        .and(warp::post())
        .and(warp::body::json::<LoginRequest>())
        .and(with_state(state.clone()))
        .and_then(login);

    let logout = warp::path!("api" / "admin" / "logout")
        .and(warp::post())
        .and(bearer_token())
        .and(with_state(state.clone()))
        .and_then(logout);

    let albums = warp::path!("api" / "admin" / "albums")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(list_albums);

    let create = warp::path!("api" / "admin" / "albums")
        .and(warp::post())
        .and(warp::body::json::<CreateAlbumRequest>())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(create_album);

    let append = warp::path!("api" / "admin" / "albums" / String / "photos")
        .and(warp::post())
        .and(warp::body::json::<AppendPhotosRequest>())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(append_photos);

    let remove_album = warp::path!("api" / "admin" / "albums" / String)
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_album);

    let remove_photo = warp::path!("api" / "admin" / "albums" / String / "photos" / String)
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_photo);

    let share = warp::path!("api" / "admin" / "albums" / String / "share")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(share_album);

    let settings = warp::path!("api" / "admin" / "settings")
        .and(warp::put())
        .and(warp::body::json::<AppSettings>())
        .and(with_admin(state.clone()))
        .and(with_state(state))
        .and_then(save_settings);

    login
        .or(logout)
        .or(albums)
        .or(create)
        .or(append)
        .or(remove_album)
        .or(remove_photo)
        .or(share)
        .or(settings)
}
