use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{GalleryError, GalleryResult};
use crate::local_store::LocalStore;
use crate::watermark::WatermarkStyle;

pub const PRESETS_KEY: &str = "wmPresets";

/// Named watermark style. Position is per photo and never part of a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkPreset {
    pub name: String,
    pub text: String,
    #[serde(alias = "color")]
    pub color_hex: String,
    #[serde(alias = "size")]
    pub font_size_px: f32,
    pub opacity: f32,
}

impl WatermarkPreset {
    pub fn from_style(name: &str, style: &WatermarkStyle) -> Self {
        Self {
            name: name.trim().to_string(),
            text: style.text.clone(),
            color_hex: style.color_hex.clone(),
            font_size_px: style.font_size_px,
            opacity: style.opacity,
        }
    }

    pub fn style(&self) -> WatermarkStyle {
        WatermarkStyle {
            text: self.text.clone(),
            color_hex: self.color_hex.clone(),
            font_size_px: self.font_size_px,
            opacity: self.opacity,
        }
    }
}

/// The admin's preset list, loaded once and written back on every change.
///
/// Another tab holding its own `PresetBook` will not see these changes
/// until it reloads.
pub struct PresetBook {
    store: Arc<dyn LocalStore>,
    presets: Vec<WatermarkPreset>,
}

impl PresetBook {
    pub fn load(store: Arc<dyn LocalStore>) -> Self {
        let presets = match store.get(PRESETS_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable watermark presets: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self { store, presets }
    }

    pub fn list(&self) -> &[WatermarkPreset] {
        &self.presets
    }

    pub fn add(&mut self, preset: WatermarkPreset) -> GalleryResult<()> {
        if preset.name.trim().is_empty() {
            return Err(GalleryError::validation("Preset name is required"));
        }
        preset.style().validate()?;

        info!("Saving watermark preset '{}'", preset.name);
        self.presets.push(preset);
        self.persist()
    }

    pub fn delete(&mut self, index: usize) -> GalleryResult<WatermarkPreset> {
        if index >= self.presets.len() {
            return Err(GalleryError::not_found(format!("Preset {} not found", index)));
        }
        let removed = self.presets.remove(index);
        self.persist()?;
        Ok(removed)
    }

    pub fn apply(&self, index: usize) -> GalleryResult<WatermarkStyle> {
        self.presets
            .get(index)
            .map(WatermarkPreset::style)
            .ok_or_else(|| GalleryError::not_found(format!("Preset {} not found", index)))
    }

    fn persist(&self) -> GalleryResult<()> {
        self.store
            .set(PRESETS_KEY, &serde_json::to_string(&self.presets)?)
    }
}
