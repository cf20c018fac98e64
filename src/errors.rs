use std::fmt;

/// Failure categories surfaced to the admin and to visitors.
#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Image could not be decoded: {0}")]
    Decode(String),
    #[error("Login failed: check your credentials")]
    Auth,
    #[error("Photo already liked")]
    AlreadyLiked,
    #[error("Remote operation failed: {0}")]
    Remote(String),
}

pub type GalleryResult<T> = Result<T, GalleryError>;

impl GalleryError {
    pub fn validation(message: impl fmt::Display) -> Self {
        Self::Validation(message.to_string())
    }

    pub fn not_found(message: impl fmt::Display) -> Self {
        Self::NotFound(message.to_string())
    }

    pub fn remote(message: impl fmt::Display) -> Self {
        Self::Remote(message.to_string())
    }
}

impl From<sqlx::Error> for GalleryError {
    fn from(e: sqlx::Error) -> Self {
        Self::Remote(format!("document store: {}", e))
    }
}

impl From<std::io::Error> for GalleryError {
    fn from(e: std::io::Error) -> Self {
        Self::Remote(format!("io: {}", e))
    }
}

impl From<serde_json::Error> for GalleryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Remote(format!("malformed document: {}", e))
    }
}

impl From<tokio::task::JoinError> for GalleryError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Remote(format!("background task failed: {}", e))
    }
}
