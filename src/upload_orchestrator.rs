use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

use crate::albums::AlbumRepository;
use crate::errors::{GalleryError, GalleryResult};
use crate::models::{AlbumDraft, Photo, ShareSummary};
use crate::pending_store::{PendingEntry, PendingStore};
use crate::watermark::{
    preview_scale, Anchor, CompositedFile, WatermarkCompositor, WatermarkSpec, WatermarkStyle,
};

static UPLOAD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Watermark settings sent along with an upload.
///
/// A shared `anchor` places the text identically on every photo; without it
/// each pending entry's own anchor is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkRequest {
    #[serde(flatten)]
    pub style: WatermarkStyle,
    pub preview_width: f32,
    #[serde(default)]
    pub anchor: Option<Anchor>,
}

impl WatermarkRequest {
    pub fn validate(&self) -> GalleryResult<()> {
        self.style.validate()?;
        preview_scale(1, self.preview_width)?;
        Ok(())
    }

    pub fn spec_for(&self, entry: &PendingEntry) -> WatermarkSpec {
        self.style.with_anchor(self.anchor.unwrap_or(entry.anchor))
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "photo.jpg".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Blob path for a new upload: upload time, a process-wide sequence number
/// and the original name, so concurrent uploads never collide.
pub fn upload_path(original_name: &str) -> String {
    format!(
        "albums/{}_{}_{}",
        Utc::now().timestamp_millis(),
        UPLOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        sanitize_file_name(original_name)
    )
}

/// Turns a pending batch into stored photos and commits them to an album.
#[derive(Clone)]
pub struct UploadOrchestrator {
    albums: AlbumRepository,
    compositor: WatermarkCompositor,
    public_origin: String,
}

impl UploadOrchestrator {
    pub fn new(albums: AlbumRepository, compositor: WatermarkCompositor, public_origin: &str) -> Self {
        Self {
            albums,
            compositor,
            public_origin: public_origin.to_string(),
        }
    }

    /// Whether watermarked uploads can succeed, i.e. a font is loaded.
    pub fn watermarking_available(&self) -> bool {
        self.compositor.has_font()
    }

    pub async fn upload_new_album(
        &self,
        draft: &AlbumDraft,
        pending: &mut PendingStore,
        watermark: Option<&WatermarkRequest>,
    ) -> GalleryResult<ShareSummary> {
        let title = draft.title.trim();
        if title.is_empty() || pending.is_empty() {
            return Err(GalleryError::validation("Title and photos are required"));
        }
        let has_password = draft
            .password
            .as_deref()
            .is_some_and(|pw| !pw.trim().is_empty());
        if draft.is_secret && !has_password {
            return Err(GalleryError::validation("Secret albums need a password"));
        }
        if let Some(request) = watermark {
            request.validate()?;
        }

        let photos = self.process_batch(pending.entries(), watermark).await?;

        let draft = AlbumDraft {
            title: title.to_string(),
            ..draft.clone()
        };
        let id = match self.albums.create(&draft, &photos).await {
            Ok(id) => id,
            Err(e) => {
                report_orphans(&photos);
                return Err(e);
            }
        };

        info!("Created album {} '{}' with {} photos", id, title, photos.len());
        pending.clear();

        Ok(ShareSummary::new(
            &self.public_origin,
            &id,
            title,
            draft.effective_password().as_deref(),
        ))
    }

    pub async fn append_to_album(
        &self,
        album_id: &str,
        pending: &mut PendingStore,
        watermark: Option<&WatermarkRequest>,
    ) -> GalleryResult<Vec<Photo>> {
        if album_id.trim().is_empty() {
            return Err(GalleryError::validation("Target album is required"));
        }
        if pending.is_empty() {
            return Err(GalleryError::validation("Select photos to add"));
        }
        if let Some(request) = watermark {
            request.validate()?;
        }
        self.albums.require(album_id).await?;

        let new_photos = self.process_batch(pending.entries(), watermark).await?;
        let added = new_photos.len();

        let result = self
            .albums
            .update_photo_list(album_id, {
                let new_photos = new_photos.clone();
                move |mut photos| {
                    photos.extend(new_photos);
                    Ok(photos)
                }
            })
            .await;
        let photos = match result {
            Ok(photos) => photos,
            Err(e) => {
                report_orphans(&new_photos);
                return Err(e);
            }
        };

        info!("Appended {} photos to album {}", added, album_id);
        pending.clear();
        Ok(photos)
    }

    /// Composite of a single pending entry, for checking placement before upload.
    pub async fn preview(
        &self,
        entry: &PendingEntry,
        watermark: &WatermarkRequest,
    ) -> GalleryResult<CompositedFile> {
        watermark.validate()?;
        let compositor = self.compositor.clone();
        let file = entry.file.clone();
        let spec = watermark.spec_for(entry);
        let preview_width = watermark.preview_width;

        tokio::task::spawn_blocking(move || compositor.composite(&file, Some(&spec), preview_width))
            .await?
    }

    /// Composites and uploads every entry concurrently; results come back in
    /// batch order no matter which upload finishes first.
    async fn process_batch(
        &self,
        entries: &[PendingEntry],
        watermark: Option<&WatermarkRequest>,
    ) -> GalleryResult<Vec<Photo>> {
        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            let spec = watermark.map(|w| w.spec_for(entry));
            let preview_width = watermark.map_or(0.0, |w| w.preview_width);
            let compositor = self.compositor.clone();
            let blobs = self.albums.blobs().clone();
            let file = entry.file.clone();

            handles.push(tokio::spawn(async move {
                let composited = tokio::task::spawn_blocking(move || {
                    compositor.composite(&file, spec.as_ref(), preview_width)
                })
                .await??;

                let path = upload_path(&composited.name);
                blobs
                    .put(&path, composited.bytes, &composited.mime_type)
                    .await?;
                Ok::<_, GalleryError>(blobs.public_url(&path))
            }));
        }

        join_in_order(handles).await.map_err(|failure| {
            report_orphans(&failure.orphans);
            failure.error
        })
    }
}

/// First error of a batch plus every blob that still got uploaded.
struct BatchFailure {
    error: GalleryError,
    orphans: Vec<Photo>,
}

/// Awaits upload tasks in batch order. On the first failure the remaining
/// tasks are aborted, then drained so uploads that had already finished are
/// reported as orphans too.
async fn join_in_order(handles: Vec<JoinHandle<GalleryResult<String>>>) -> Result<Vec<Photo>, BatchFailure> {
    let mut photos = Vec::with_capacity(handles.len());
    let mut handles = handles.into_iter();
    while let Some(handle) = handles.next() {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(url) => photos.push(Photo::new(url)),
            Err(error) => {
                let rest: Vec<_> = handles.collect();
                for handle in &rest {
                    handle.abort();
                }
                // A running composite is detached, not stopped; its task is
                // cancelled before the blob put.
                for handle in rest {
                    if let Ok(Ok(url)) = handle.await {
                        photos.push(Photo::new(url));
                    }
                }
                return Err(BatchFailure {
                    error,
                    orphans: photos,
                });
            }
        }
    }
    Ok(photos)
}

fn report_orphans(photos: &[Photo]) {
    if photos.is_empty() {
        return;
    }
    let urls: Vec<&str> = photos.iter().map(|p| p.url.as_str()).collect();
    warn!(
        "Upload aborted, {} uploaded blobs are left orphaned: {:?}",
        urls.len(),
        urls
    );
}
