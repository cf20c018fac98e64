use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::blob_store::BlobStore;
use crate::doc_store::{DocumentStore, FieldFilter, OrderBy, CREATED_AT_FIELD};
use crate::errors::{GalleryError, GalleryResult};
use crate::models::{Album, AlbumDocument, AlbumDraft, Photo, StoredPhoto, ALBUMS_COLLECTION};

/// Album documents plus the blobs their photo lists point at.
///
/// Stored photo lists are normalized here and nowhere else.
#[derive(Clone)]
pub struct AlbumRepository {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

fn photos_value(photos: &[Photo]) -> GalleryResult<Value> {
    let stored: Vec<StoredPhoto> = photos.iter().cloned().map(StoredPhoto::from).collect();
    Ok(serde_json::to_value(stored)?)
}

fn parse_album(id: String, value: Value) -> GalleryResult<Album> {
    let doc: AlbumDocument = serde_json::from_value(value)?;
    Ok(Album::from_document(id, doc))
}

impl AlbumRepository {
    pub fn new(docs: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { docs, blobs }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Writes a new album document. The password is only kept for secret albums.
    pub async fn create(&self, draft: &AlbumDraft, photos: &[Photo]) -> GalleryResult<String> {
        let doc = json!({
            "title": draft.title.trim(),
            "isSecret": draft.is_secret,
            "password": draft.effective_password(),
            "photos": photos_value(photos)?,
        });
        self.docs.create(ALBUMS_COLLECTION, doc).await
    }

    pub async fn get(&self, id: &str) -> GalleryResult<Option<Album>> {
        match self.docs.get(ALBUMS_COLLECTION, id).await? {
            Some(value) => Ok(Some(parse_album(id.to_string(), value)?)),
            None => Ok(None),
        }
    }

    pub async fn require(&self, id: &str) -> GalleryResult<Album> {
        self.get(id)
            .await?
            .ok_or_else(|| GalleryError::not_found(format!("Album {} not found", id)))
    }

    /// Every album, newest first.
    pub async fn list_all(&self) -> GalleryResult<Vec<Album>> {
        self.list(&[]).await
    }

    /// Albums shown in the open gallery, newest first.
    pub async fn list_public(&self) -> GalleryResult<Vec<Album>> {
        self.list(&[FieldFilter::eq("isSecret", false)]).await
    }

    async fn list(&self, filters: &[FieldFilter]) -> GalleryResult<Vec<Album>> {
        self.docs
            .query(ALBUMS_COLLECTION, filters, Some(&OrderBy::desc(CREATED_AT_FIELD)))
            .await?
            .into_iter()
            .map(|(id, value)| parse_album(id, value))
            .collect()
    }

    /// Album id unlocked by a shared code, if any.
    pub async fn find_by_code(&self, code: &str) -> GalleryResult<Option<String>> {
        let code = code.trim();
        if code.is_empty() {
            return Err(GalleryError::validation("Code is required"));
        }
        let matches = self
            .docs
            .query(ALBUMS_COLLECTION, &[FieldFilter::eq("password", code)], None)
            .await?;
        Ok(matches.into_iter().next().map(|(id, _)| id))
    }

    /// Read-modify-write of an album's photo list.
    ///
    /// Re-reads the document right before writing; concurrent writers can
    /// still lose updates. All photo list mutations go through here.
    pub async fn update_photo_list<F>(&self, album_id: &str, mutator: F) -> GalleryResult<Vec<Photo>>
    where
        F: FnOnce(Vec<Photo>) -> GalleryResult<Vec<Photo>> + Send,
    {
        let album = self.require(album_id).await?;
        let photos = mutator(album.photos)?;

        self.docs
            .update(
                ALBUMS_COLLECTION,
                album_id,
                json!({ "photos": photos_value(&photos)? }),
                true,
            )
            .await?;

        Ok(photos)
    }

    /// Removes every blob of the album, then the document itself.
    pub async fn delete_album(&self, album_id: &str) -> GalleryResult<()> {
        let Some(album) = self.get(album_id).await? else {
            warn!("Album {} already deleted", album_id);
            return Ok(());
        };

        for photo in &album.photos {
            self.delete_blob_for(photo).await?;
        }
        self.docs.delete(ALBUMS_COLLECTION, album_id).await?;

        info!(
            "Deleted album {} ({} photos)",
            album_id,
            album.photos.len()
        );
        Ok(())
    }

    /// Removes one photo's blob and drops it from the album's photo list.
    pub async fn delete_photo(&self, album_id: &str, photo_id: &str) -> GalleryResult<Vec<Photo>> {
        let album = self.require(album_id).await?;
        let photo = album
            .photos
            .iter()
            .find(|p| p.id == photo_id)
            .ok_or_else(|| GalleryError::not_found(format!("Photo {} not found", photo_id)))?;

        self.delete_blob_for(photo).await?;

        let remaining = self
            .update_photo_list(album_id, |photos| {
                Ok(photos.into_iter().filter(|p| p.id != photo_id).collect())
            })
            .await?;

        info!("Deleted photo {} from album {}", photo_id, album_id);
        Ok(remaining)
    }

    async fn delete_blob_for(&self, photo: &Photo) -> GalleryResult<()> {
        match self.blobs.path_for_url(&photo.url) {
            Some(path) => self.blobs.delete(&path).await,
            None => {
                warn!("Photo url {} is not in the blob store, skipping", photo.url);
                Ok(())
            }
        }
    }
}
