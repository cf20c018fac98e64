use log::info;
use serde_json::json;
use std::sync::Arc;

use crate::doc_store::DocumentStore;
use crate::errors::{GalleryError, GalleryResult};
use crate::models::{AppSettings, GENERAL_SETTINGS_ID, SETTINGS_COLLECTION};

#[derive(Clone)]
pub struct SettingsRepository {
    docs: Arc<dyn DocumentStore>,
    default_subtitle: String,
}

impl SettingsRepository {
    pub fn new(docs: Arc<dyn DocumentStore>, default_subtitle: &str) -> Self {
        Self {
            docs,
            default_subtitle: default_subtitle.to_string(),
        }
    }

    pub async fn get(&self) -> GalleryResult<AppSettings> {
        let subtitle = self
            .docs
            .get(SETTINGS_COLLECTION, GENERAL_SETTINGS_ID)
            .await?
            .and_then(|doc| doc.get("subtitle")?.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.default_subtitle.clone());

        Ok(AppSettings { subtitle })
    }

    pub async fn save(&self, settings: &AppSettings) -> GalleryResult<()> {
        let subtitle = settings.subtitle.trim();
        if subtitle.is_empty() {
            return Err(GalleryError::validation("Subtitle must not be empty"));
        }
        self.docs
            .update(
                SETTINGS_COLLECTION,
                GENERAL_SETTINGS_ID,
                json!({ "subtitle": subtitle }),
                true,
            )
            .await?;
        info!("Updated site subtitle");
        Ok(())
    }
}
