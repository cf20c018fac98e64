use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

use crate::auth::AdminSession;
use crate::presets::WatermarkPreset;
use crate::warp_helpers::{gallery_rejection, with_admin, with_state, SharedState};

pub async fn list_presets(_session: Arc<AdminSession>, state: SharedState) -> Result<impl Reply, Rejection> {
    let book = state.presets.lock().await;
    Ok(warp::reply::json(&book.list()))
}

pub async fn add_preset(
    preset: WatermarkPreset,
    _session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let mut book = state.presets.lock().await;
    book.add(preset).map_err(gallery_rejection)?;
    Ok(warp::reply::json(&book.list()))
}

pub async fn apply_preset(
    index: usize,
    _session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let book = state.presets.lock().await;
    let style = book.apply(index).map_err(gallery_rejection)?;
    Ok(warp::reply::json(&style))
}

pub async fn delete_preset(
    index: usize,
    _session: Arc<AdminSession>,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let mut book = state.presets.lock().await;
    book.delete(index).map_err(gallery_rejection)?;
    Ok(warp::reply::json(&book.list()))
}

pub fn build_preset_routes(
    state: SharedState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = warp::path!("api" / "admin" / "presets")
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(list_presets);

    let add = warp::path!("api" / "admin" / "presets")
        .and(warp::post())
        .and(warp::body::json::<WatermarkPreset>())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(add_preset);

    let apply = warp::path!("api" / "admin" / "presets" / usize)
        .and(warp::get())
        .and(with_admin(state.clone()))
        .and(with_state(state.clone()))
        .and_then(apply_preset);

    let delete = warp::path!("api" / "admin" / "presets" / usize)
        .and(warp::delete())
        .and(with_admin(state.clone()))
        .and(with_state(state))
        .and_then(delete_preset);

    list.or(add).or(apply).or(delete)
}
