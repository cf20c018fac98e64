use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use picturewrite::albums::AlbumRepository;
use picturewrite::blob_store::{BlobStore, MemoryBlobStore};
use picturewrite::db_pool::create_in_memory_pool;
use picturewrite::doc_store::{DocumentStore, SqliteDocumentStore};
use picturewrite::errors::{GalleryError, GalleryResult};
use picturewrite::models::{AlbumDraft, ALBUMS_COLLECTION};
use picturewrite::pending_store::{PendingFile, PendingStore};
use picturewrite::upload_orchestrator::{UploadOrchestrator, WatermarkRequest};
use picturewrite::watermark::{Anchor, WatermarkCompositor, WatermarkStyle};

const ORIGIN: &str = "https://pics.example";
const FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

/// Memory blob store whose writes finish in reverse order of their index byte.
struct SlowBlobStore {
    inner: MemoryBlobStore,
    finished: Mutex<Vec<u8>>,
}

impl SlowBlobStore {
    fn new() -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            finished: Mutex::new(Vec::new()),
        }
    }

    fn finished(&self) -> Vec<u8> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for SlowBlobStore {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> GalleryResult<()> {
        let index = bytes.first().copied().unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(20 * (5 - index as u64))).await;
        self.inner.put(path, bytes, content_type).await?;
        self.finished.lock().unwrap().push(index);
        Ok(())
    }

    async fn get(&self, path: &str) -> GalleryResult<Option<Bytes>> {
        self.inner.get(path).await
    }

    async fn delete(&self, path: &str) -> GalleryResult<()> {
        self.inner.delete(path).await
    }

    fn public_url(&self, path: &str) -> String {
        self.inner.public_url(path)
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        self.inner.path_for_url(url)
    }
}

struct Fixture {
    docs: Arc<dyn DocumentStore>,
    albums: AlbumRepository,
    orchestrator: UploadOrchestrator,
}

async fn fixture(blobs: Arc<dyn BlobStore>, compositor: WatermarkCompositor) -> Fixture {
    let pool = create_in_memory_pool().await.unwrap();
    let docs: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool));
    let albums = AlbumRepository::new(docs.clone(), blobs);
    let orchestrator = UploadOrchestrator::new(albums.clone(), compositor, ORIGIN);
    Fixture {
        docs,
        albums,
        orchestrator,
    }
}

fn pending_with(count: u8) -> PendingStore {
    let mut pending = PendingStore::new();
    pending
        .add((0..count).map(|i| PendingFile::new(vec![i, 0xAA], &format!("f{}.jpg", i), "image/jpeg")))
        .unwrap();
    pending
}

fn draft(title: &str, is_secret: bool, password: Option<&str>) -> AlbumDraft {
    AlbumDraft {
        title: title.to_string(),
        is_secret,
        password: password.map(str::to_string),
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 90, 160]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[tokio::test]
async fn test_batch_order_survives_out_of_order_uploads() {
    let blobs = Arc::new(SlowBlobStore::new());
    let fx = fixture(blobs.clone(), WatermarkCompositor::without_font()).await;
    let mut pending = pending_with(5);

    let summary = fx
        .orchestrator
        .upload_new_album(&draft("Order", false, None), &mut pending, None)
        .await
        .unwrap();

    assert_ne!(blobs.finished(), vec![0, 1, 2, 3, 4]);

    let album = fx.albums.require(&summary.id).await.unwrap();
    let mut first_bytes = Vec::new();
    for photo in &album.photos {
        let path = blobs.path_for_url(&photo.url).unwrap();
        first_bytes.push(blobs.get(&path).await.unwrap().unwrap()[0]);
    }
    assert_eq!(first_bytes, vec![0, 1, 2, 3, 4]);
    assert!(album.photos.iter().all(|p| p.url.contains("_f")));
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_append_keeps_existing_photos_first() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let fx = fixture(blobs.clone(), WatermarkCompositor::without_font()).await;

    let mut pending = pending_with(3);
    let summary = fx
        .orchestrator
        .upload_new_album(&draft("Trip", false, None), &mut pending, None)
        .await
        .unwrap();
    let before = fx.albums.require(&summary.id).await.unwrap().photos;

    pending
        .add(vec![
            PendingFile::new(vec![7u8], "d.jpg", "image/jpeg"),
            PendingFile::new(vec![8u8], "e.jpg", "image/jpeg"),
        ])
        .unwrap();
    let photos = fx
        .orchestrator
        .append_to_album(&summary.id, &mut pending, None)
        .await
        .unwrap();

    assert_eq!(photos.len(), 5);
    assert_eq!(&photos[..3], &before[..]);
    assert!(photos[3].url.ends_with("_d.jpg"));
    assert!(photos[4].url.ends_with("_e.jpg"));
    assert_eq!(blobs.paths().len(), 5);
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_public_album_never_stores_password() {
    let fx = fixture(Arc::new(MemoryBlobStore::new()), WatermarkCompositor::without_font()).await;
    let mut pending = pending_with(1);

    let summary = fx
        .orchestrator
        .upload_new_album(&draft("Open", false, Some("ignored")), &mut pending, None)
        .await
        .unwrap();

    let raw = fx.docs.get(ALBUMS_COLLECTION, &summary.id).await.unwrap().unwrap();
    assert!(raw["password"].is_null());
    assert_eq!(raw["isSecret"], false);
    assert_eq!(summary.password, None);
    assert_eq!(summary.share_url, format!("{}/album/{}", ORIGIN, summary.id));
}

#[tokio::test]
async fn test_secret_album_share_text_carries_code() {
    let fx = fixture(Arc::new(MemoryBlobStore::new()), WatermarkCompositor::without_font()).await;
    let mut pending = pending_with(2);

    let summary = fx
        .orchestrator
        .upload_new_album(&draft("  Family  ", true, Some("0420")), &mut pending, None)
        .await
        .unwrap();

    assert_eq!(summary.title, "Family");
    assert_eq!(
        summary.share_text(),
        format!(
            "[Picturewrite] Photos arrived!\nLink: {}/album/{}?code=0420\nCode: 0420",
            ORIGIN, summary.id
        )
    );
    assert_eq!(
        fx.albums.find_by_code("0420").await.unwrap(),
        Some(summary.id.clone())
    );
}

#[tokio::test]
async fn test_padded_password_still_opens_by_code() {
    let fx = fixture(Arc::new(MemoryBlobStore::new()), WatermarkCompositor::without_font()).await;
    let mut pending = pending_with(1);

    let summary = fx
        .orchestrator
        .upload_new_album(&draft("Family", true, Some("0420 ")), &mut pending, None)
        .await
        .unwrap();

    let raw = fx.docs.get(ALBUMS_COLLECTION, &summary.id).await.unwrap().unwrap();
    assert_eq!(raw["password"], "0420");
    assert_eq!(summary.password.as_deref(), Some("0420"));
    assert_eq!(
        fx.albums.find_by_code("0420").await.unwrap(),
        Some(summary.id.clone())
    );
    assert_eq!(
        fx.albums.find_by_code(" 0420 ").await.unwrap(),
        Some(summary.id.clone())
    );
}

#[tokio::test]
async fn test_validation_failures_have_no_side_effects() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let fx = fixture(blobs.clone(), WatermarkCompositor::without_font()).await;

    let mut empty = PendingStore::new();
    let result = fx
        .orchestrator
        .upload_new_album(&draft("Trip", false, None), &mut empty, None)
        .await;
    assert!(matches!(result, Err(GalleryError::Validation(_))));

    let mut pending = pending_with(2);
    let result = fx
        .orchestrator
        .upload_new_album(&draft(" ", false, None), &mut pending, None)
        .await;
    assert!(matches!(result, Err(GalleryError::Validation(_))));

    let result = fx
        .orchestrator
        .upload_new_album(&draft("Secret", true, Some("  ")), &mut pending, None)
        .await;
    assert!(matches!(result, Err(GalleryError::Validation(_))));

    let bad_watermark = WatermarkRequest {
        style: WatermarkStyle {
            font_size_px: 5.0,
            ..WatermarkStyle::default()
        },
        preview_width: 600.0,
        anchor: None,
    };
    let result = fx
        .orchestrator
        .upload_new_album(&draft("Trip", false, None), &mut pending, Some(&bad_watermark))
        .await;
    assert!(matches!(result, Err(GalleryError::Validation(_))));

    let result = fx
        .orchestrator
        .append_to_album("missing", &mut pending, None)
        .await;
    assert!(matches!(result, Err(GalleryError::NotFound(_))));

    assert!(blobs.paths().is_empty());
    assert!(fx.albums.list_all().await.unwrap().is_empty());
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn test_disabled_watermark_uploads_original_bytes() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let fx = fixture(blobs.clone(), WatermarkCompositor::without_font()).await;
    let original = png_bytes(8, 8);
    let mut pending = PendingStore::new();
    pending
        .add(vec![PendingFile::new(original.clone(), "raw.png", "image/png")])
        .unwrap();

    let summary = fx
        .orchestrator
        .upload_new_album(&draft("Raw", false, None), &mut pending, None)
        .await
        .unwrap();

    let album = fx.albums.require(&summary.id).await.unwrap();
    let path = blobs.path_for_url(&album.photos[0].url).unwrap();
    assert_eq!(blobs.get(&path).await.unwrap().unwrap().to_vec(), original);
    assert_eq!(blobs.content_type(&path).as_deref(), Some("image/png"));
}

#[tokio::test]
async fn test_undecodable_file_fails_whole_batch() {
    if !Path::new(FONT_PATH).exists() {
        eprintln!("Skipping test: font not found at {}", FONT_PATH);
        return;
    }

    let blobs = Arc::new(MemoryBlobStore::new());
    let fx = fixture(blobs.clone(), WatermarkCompositor::load(Path::new(FONT_PATH))).await;
    let mut pending = PendingStore::new();
    pending
        .add(vec![
            PendingFile::new(png_bytes(64, 32), "ok.png", "image/png"),
            PendingFile::new(vec![1u8, 2, 3], "broken.jpg", "image/jpeg"),
        ])
        .unwrap();
    let watermark = WatermarkRequest {
        style: WatermarkStyle::default(),
        preview_width: 32.0,
        anchor: Some(Anchor { x: 2.0, y: 2.0 }),
    };

    let result = fx
        .orchestrator
        .upload_new_album(&draft("Broken", false, None), &mut pending, Some(&watermark))
        .await;

    assert!(matches!(result, Err(GalleryError::Decode(_))));
    assert!(fx.albums.list_all().await.unwrap().is_empty());
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn test_watermarked_upload_is_jpeg_with_same_dimensions() {
    if !Path::new(FONT_PATH).exists() {
        eprintln!("Skipping test: font not found at {}", FONT_PATH);
        return;
    }

    let blobs = Arc::new(MemoryBlobStore::new());
    let fx = fixture(blobs.clone(), WatermarkCompositor::load(Path::new(FONT_PATH))).await;
    let mut pending = PendingStore::new();
    pending
        .add(vec![PendingFile::new(png_bytes(240, 120), "wide.png", "image/png")])
        .unwrap();
    pending.set_anchor(0, Anchor { x: 10.0, y: 10.0 });
    let watermark = WatermarkRequest {
        style: WatermarkStyle {
            text: "Juno".to_string(),
            ..WatermarkStyle::default()
        },
        preview_width: 120.0,
        anchor: None,
    };

    let summary = fx
        .orchestrator
        .upload_new_album(&draft("Marked", false, None), &mut pending, Some(&watermark))
        .await
        .unwrap();

    let album = fx.albums.require(&summary.id).await.unwrap();
    let path = blobs.path_for_url(&album.photos[0].url).unwrap();
    assert!(path.ends_with("_wide.png"));
    assert_eq!(blobs.content_type(&path).as_deref(), Some("image/jpeg"));

    let stored = blobs.get(&path).await.unwrap().unwrap();
    assert_eq!(image::guess_format(&stored).unwrap(), image::ImageFormat::Jpeg);
    let decoded = image::load_from_memory(&stored).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (240, 120));
}
