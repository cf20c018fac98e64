use log::{info, warn};
use serde::Serialize;

use crate::albums::AlbumRepository;
use crate::errors::{GalleryError, GalleryResult};
use crate::local_store::LocalStore;

pub fn like_marker_key(album_id: &str, photo_id: &str) -> String {
    format!("liked_{}_{}", album_id, photo_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    /// Count shown right away, before the store answers.
    pub displayed_likes: u64,
    /// Count written to the album document.
    pub stored_likes: u64,
}

/// Per-browser guarded like counter.
///
/// The local marker only stops the same browser from liking twice. The
/// remote increment is read-increment-write, so concurrent likes from
/// different browsers can under-count.
#[derive(Clone)]
pub struct LikeCounter {
    albums: AlbumRepository,
}

impl LikeCounter {
    pub fn new(albums: AlbumRepository) -> Self {
        Self { albums }
    }

    pub fn has_liked(&self, local: &dyn LocalStore, album_id: &str, photo_id: &str) -> bool {
        local.get(&like_marker_key(album_id, photo_id)).is_some()
    }

    pub async fn like(
        &self,
        local: &dyn LocalStore,
        album_id: &str,
        photo_id: &str,
        displayed: u64,
    ) -> GalleryResult<LikeOutcome> {
        let key = like_marker_key(album_id, photo_id);
        if local.get(&key).is_some() {
            return Err(GalleryError::AlreadyLiked);
        }

        let displayed_likes = displayed + 1;
        local.set(&key, "true")?;

        let mut stored_likes = 0;
        let result = self
            .albums
            .update_photo_list(album_id, |mut photos| {
                let photo = photos
                    .iter_mut()
                    .find(|p| p.id == photo_id)
                    .ok_or_else(|| GalleryError::not_found(format!("Photo {} not found", photo_id)))?;
                photo.likes += 1;
                stored_likes = photo.likes;
                Ok(photos)
            })
            .await;

        if let Err(e) = result {
            warn!("Like on {}/{} failed: {}", album_id, photo_id, e);
            local.remove(&key)?;
            return Err(e);
        }

        info!("Photo {} in album {} now has {} likes", photo_id, album_id, stored_likes);
        Ok(LikeOutcome {
            displayed_likes,
            stored_likes,
        })
    }
}
