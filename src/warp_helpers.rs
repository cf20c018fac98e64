use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

use warp::{reject, Filter, Rejection, Reply};

use crate::auth::AdminSession;
use crate::errors::GalleryError;
use crate::local_store::LocalStore;
use crate::state::AppState;

pub type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct RemoteError {
    pub message: String,
}

impl reject::Reject for RemoteError {}

#[derive(Debug)]
pub struct NotFoundError {
    pub message: String,
}

impl reject::Reject for NotFoundError {}

#[derive(Debug)]
pub struct ValidationError {
    pub message: String,
}

impl reject::Reject for ValidationError {}

#[derive(Debug)]
pub struct UnauthorizedError {
    pub message: String,
}

impl reject::Reject for UnauthorizedError {}

#[derive(Debug)]
pub struct ConflictError {
    pub message: String,
}

impl reject::Reject for ConflictError {}

/// Maps a service error to the rejection `handle_rejection` knows how to render.
pub fn gallery_rejection(err: GalleryError) -> Rejection {
    let message = err.to_string();
    match err {
        GalleryError::Validation(_) | GalleryError::Decode(_) => {
            reject::custom(ValidationError { message })
        }
        GalleryError::NotFound(_) => reject::custom(NotFoundError { message }),
        GalleryError::Auth => reject::custom(UnauthorizedError { message }),
        GalleryError::AlreadyLiked => reject::custom(ConflictError { message }),
        GalleryError::Remote(_) => {
            log::error!("{}", message);
            reject::custom(RemoteError { message })
        }
    }
}

pub fn with_state(state: SharedState) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token() -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(|header: Option<String>| async move {
        header
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                reject::custom(UnauthorizedError {
                    message: "Admin login required".to_string(),
                })
            })
    })
}

pub fn with_admin(
    state: SharedState,
) -> impl Filter<Extract = (Arc<AdminSession>,), Error = Rejection> + Clone {
    bearer_token()
        .and(with_state(state))
        .and_then(|token: String, state: SharedState| async move {
            state.sessions.session(&token).ok_or_else(|| {
                reject::custom(UnauthorizedError {
                    message: "Session expired, please log in again".to_string(),
                })
            })
        })
}

/// Local store of the visitor's browser, keyed by the `x-client-id` header.
pub fn with_client_store(
    state: SharedState,
) -> impl Filter<Extract = (Arc<dyn LocalStore>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-client-id")
        .and(with_state(state))
        .and_then(|client_id: Option<String>, state: SharedState| async move {
            let client_id = client_id.ok_or_else(|| {
                reject::custom(ValidationError {
                    message: "Missing x-client-id header".to_string(),
                })
            })?;
            state
                .local_stores
                .for_client(client_id.trim())
                .map_err(gallery_rejection)
        })
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;
    let timestamp = chrono::Utc::now().to_rfc3339();

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(remote_error) = err.find::<RemoteError>() {
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = remote_error.message.clone();
    } else if let Some(not_found) = err.find::<NotFoundError>() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = not_found.message.clone();
    } else if let Some(validation_error) = err.find::<ValidationError>() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = validation_error.message.clone();
    } else if let Some(unauthorized) = err.find::<UnauthorizedError>() {
        code = warp::http::StatusCode::UNAUTHORIZED;
        message = unauthorized.message.clone();
    } else if let Some(conflict) = err.find::<ConflictError>() {
        code = warp::http::StatusCode::CONFLICT;
        message = conflict.message.clone();
    } else if let Some(body_error) = err.find::<warp::filters::body::BodyDeserializeError>() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = body_error.to_string();
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = "Invalid query string".to_string();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = warp::http::StatusCode::PAYLOAD_TOO_LARGE;
        message = "Payload too large".to_string();
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        code = warp::http::StatusCode::UNSUPPORTED_MEDIA_TYPE;
        message = "Unsupported media type".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
        message = "Method not allowed".to_string();
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal server error".to_string();
    }

    let error_response = ErrorResponse {
        error: message,
        code: code.as_u16(),
        timestamp,
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&error_response),
        code,
    ))
}

pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization", "x-client-id"])
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
}

pub fn content_type_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("albums/1_0_a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("albums/1_0_a.webp"), "image/webp");
        assert_eq!(content_type_for("albums/noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_gallery_errors_map_to_status_codes() {
        let cases = [
            (GalleryError::validation("bad"), 400),
            (GalleryError::Decode("x".to_string()), 400),
            (GalleryError::Auth, 401),
            (GalleryError::not_found("gone"), 404),
            (GalleryError::AlreadyLiked, 409),
            (GalleryError::remote("down"), 500),
        ];
        for (err, status) in cases {
            let reply = handle_rejection(gallery_rejection(err)).await.unwrap();
            assert_eq!(reply.into_response().status().as_u16(), status);
        }
    }
}
