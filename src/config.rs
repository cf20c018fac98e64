use anyhow::Context;
use std::env;

use crate::models::DEFAULT_SUBTITLE;

const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_path: String,
    pub db_path: String,
    pub blob_path: String,
    pub local_store_path: String,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub public_origin: String,
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    pub font_path: String,
    pub max_upload_mb: u64,
    pub default_subtitle: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = var_or("PICTUREWRITE_PORT", "18480")
            .parse()
            .context("PICTUREWRITE_PORT must be a port number")?;
        let data_path = var_or("PICTUREWRITE_DATA_PATH", "./data");

        Ok(Config {
            port,
            host: var_or("PICTUREWRITE_HOST", "0.0.0.0"),
            public_origin: var_or("PICTUREWRITE_PUBLIC_ORIGIN", &format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
            storage: StorageConfig {
                db_path: var_or(
                    "PICTUREWRITE_DB_PATH",
                    &format!("{}/database/picturewrite.db", data_path),
                ),
                blob_path: var_or("PICTUREWRITE_BLOB_PATH", &format!("{}/blobs", data_path)),
                local_store_path: var_or(
                    "PICTUREWRITE_LOCAL_STORE_PATH",
                    &format!("{}/local", data_path),
                ),
                data_path,
            },
            admin: AdminConfig {
                email: non_empty_var("PICTUREWRITE_ADMIN_EMAIL"),
                password: non_empty_var("PICTUREWRITE_ADMIN_PASSWORD"),
            },
            font_path: var_or("PICTUREWRITE_FONT_PATH", DEFAULT_FONT_PATH),
            max_upload_mb: var_or("PICTUREWRITE_MAX_UPLOAD_MB", "50")
                .parse()
                .context("PICTUREWRITE_MAX_UPLOAD_MB must be a number")?,
            default_subtitle: var_or("PICTUREWRITE_DEFAULT_SUBTITLE", DEFAULT_SUBTITLE),
        })
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}
