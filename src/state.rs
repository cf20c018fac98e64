use std::sync::Arc;
use tokio::sync::Mutex;

use crate::albums::AlbumRepository;
use crate::auth::AdminSessions;
use crate::blob_store::BlobStore;
use crate::db_pool::DbPool;
use crate::doc_store::{DocumentStore, SqliteDocumentStore};
use crate::errors::GalleryResult;
use crate::likes::LikeCounter;
use crate::local_store::LocalStores;
use crate::presets::PresetBook;
use crate::settings::SettingsRepository;
use crate::upload_orchestrator::UploadOrchestrator;
use crate::watermark::WatermarkCompositor;

/// Everything a request handler may need, shared behind one `Arc`.
pub struct AppState {
    pub db_pool: DbPool,
    pub albums: AlbumRepository,
    pub settings: SettingsRepository,
    pub orchestrator: UploadOrchestrator,
    pub likes: LikeCounter,
    pub local_stores: LocalStores,
    pub sessions: AdminSessions,
    pub presets: Mutex<PresetBook>,
    pub public_origin: String,
    pub max_upload_bytes: u64,
}

pub struct AppStateBuilder {
    pub db_pool: DbPool,
    pub blobs: Arc<dyn BlobStore>,
    pub local_stores: LocalStores,
    pub compositor: WatermarkCompositor,
    pub sessions: AdminSessions,
    pub public_origin: String,
    pub default_subtitle: String,
    pub max_upload_bytes: u64,
}

impl AppStateBuilder {
    pub fn build(self) -> GalleryResult<Arc<AppState>> {
        let docs: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(self.db_pool.clone()));
        let albums = AlbumRepository::new(docs.clone(), self.blobs);
        let presets = PresetBook::load(self.local_stores.admin()?);

        Ok(Arc::new(AppState {
            db_pool: self.db_pool,
            settings: SettingsRepository::new(docs, &self.default_subtitle),
            orchestrator: UploadOrchestrator::new(
                albums.clone(),
                self.compositor,
                &self.public_origin,
            ),
            likes: LikeCounter::new(albums.clone()),
            albums,
            local_stores: self.local_stores,
            sessions: self.sessions,
            presets: Mutex::new(presets),
            public_origin: self.public_origin,
            max_upload_bytes: self.max_upload_bytes,
        }))
    }
}
