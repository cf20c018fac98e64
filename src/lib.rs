pub mod albums;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod db_pool;
pub mod db_schema;
pub mod doc_store;
pub mod errors;
pub mod handlers_admin;
pub mod handlers_gallery;
pub mod handlers_health;
pub mod handlers_pending;
pub mod handlers_presets;
pub mod likes;
pub mod local_store;
pub mod models;
pub mod pending_store;
pub mod photo_sort;
pub mod presets;
pub mod settings;
pub mod state;
pub mod upload_orchestrator;
pub mod warp_helpers;
pub mod watermark;
