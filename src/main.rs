use log::{error, info};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warp::Filter;

use picturewrite::auth::AdminSessions;
use picturewrite::blob_store::{BlobStore, FsBlobStore};
use picturewrite::config::Config;
use picturewrite::db_pool;
use picturewrite::handlers_admin::build_admin_routes;
use picturewrite::handlers_gallery::build_gallery_routes;
use picturewrite::handlers_health::build_health_routes;
use picturewrite::handlers_pending::build_pending_routes;
use picturewrite::handlers_presets::build_preset_routes;
use picturewrite::local_store::LocalStores;
use picturewrite::state::{AppState, AppStateBuilder};
use picturewrite::warp_helpers::{cors, handle_rejection};
use picturewrite::watermark::WatermarkCompositor;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from_env()?;
    let port = config.port;

    info!("Starting Picturewrite server on Port {}", port);
    info!("Data path: {}", config.storage.data_path);
    info!("Database: {}", config.storage.db_path);
    info!("Blobs: {}", config.storage.blob_path);
    info!("Public origin: {}", config.public_origin);

    if !is_port_available(&config.host, port) {
        error!(
            "Port {} is already in use. Please stop any existing Picturewrite instances or use a different port.",
            port
        );
        error!(
            "You can check what's using the port with: lsof -i :{}",
            port
        );
        anyhow::bail!("Port {} is already in use", port);
    }

    let state = initialize_services(&config).await?;

    let routes = build_health_routes(state.clone())
        .or(build_gallery_routes(state.clone()))
        .or(build_admin_routes(state.clone()))
        .or(build_pending_routes(state.clone()))
        .or(build_preset_routes(state))
        .with(cors())
        .with(warp::log("picturewrite"))
        .recover(handle_rejection);

    let addr: std::net::IpAddr = config.host.parse()?;
    info!(
        "Server started successfully, listening on http://{}:{}",
        addr, port
    );

    warp::serve(routes).run((addr, port)).await;

    Ok(())
}

fn is_port_available(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

async fn initialize_services(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_pool = db_pool::create_db_pool(&config.storage.db_path).await?;
    info!("Database initialized successfully");

    let blob_root = PathBuf::from(&config.storage.blob_path);
    tokio::fs::create_dir_all(&blob_root).await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
        blob_root,
        &format!("{}/blobs", config.public_origin),
    ));

    let local_root = PathBuf::from(&config.storage.local_store_path);
    tokio::fs::create_dir_all(&local_root).await?;

    let compositor = WatermarkCompositor::load(Path::new(&config.font_path));

    let state = AppStateBuilder {
        db_pool,
        blobs,
        local_stores: LocalStores::on_disk(local_root),
        compositor,
        sessions: AdminSessions::new(config.admin.email.as_deref(), config.admin.password.as_deref()),
        public_origin: config.public_origin.clone(),
        default_subtitle: config.default_subtitle.clone(),
        max_upload_bytes: config.max_upload_bytes(),
    }
    .build()?;

    Ok(state)
}
