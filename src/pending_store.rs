use bytes::Bytes;
use serde::Serialize;

use crate::errors::{GalleryError, GalleryResult};
use crate::watermark::Anchor;

/// An image the admin selected but has not uploaded yet.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub raw_bytes: Bytes,
    pub original_name: String,
    pub mime_type: String,
}

impl PendingFile {
    pub fn new(raw_bytes: impl Into<Bytes>, original_name: &str, mime_type: &str) -> Self {
        Self {
            raw_bytes: raw_bytes.into(),
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
        }
    }
}

/// A pending file together with the position of its watermark overlay.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub file: PendingFile,
    pub anchor: Anchor,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub index: usize,
    pub name: String,
    pub mime_type: String,
    pub size: usize,
    pub anchor: Anchor,
    pub active: bool,
}

/// Ordered batch of files waiting for upload, one per admin session.
#[derive(Debug, Default)]
pub struct PendingStore {
    entries: Vec<PendingEntry>,
    active: usize,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends files after the existing ones, each with a zero anchor.
    pub fn add(&mut self, files: impl IntoIterator<Item = PendingFile>) -> GalleryResult<usize> {
        let files: Vec<PendingFile> = files.into_iter().collect();
        if let Some(bad) = files.iter().find(|f| !f.mime_type.starts_with("image/")) {
            return Err(GalleryError::validation(format!(
                "'{}' is not an image ({})",
                bad.original_name, bad.mime_type
            )));
        }

        let added = files.len();
        self.entries.extend(files.into_iter().map(|file| PendingEntry {
            file,
            anchor: Anchor::default(),
        }));
        Ok(added)
    }

    /// Removes one entry. Out-of-range indices are ignored.
    pub fn remove_at(&mut self, index: usize) -> Option<PendingFile> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);

        if index == self.active {
            self.active = 0;
        } else if self.active >= self.entries.len() {
            self.active = self.entries.len().saturating_sub(1);
        }

        Some(removed.file)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.active = 0;
    }

    pub fn set_anchor(&mut self, index: usize, anchor: Anchor) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) => {
                entry.anchor = anchor;
                true
            }
            None => false,
        }
    }

    pub fn set_active(&mut self, index: usize) {
        self.active = index.min(self.entries.len().saturating_sub(1));
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn entries(&self) -> &[PendingEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PendingEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.file.raw_bytes.len()).sum()
    }

    pub fn summaries(&self) -> Vec<PendingSummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| PendingSummary {
                index,
                name: entry.file.original_name.clone(),
                mime_type: entry.file.mime_type.clone(),
                size: entry.file.raw_bytes.len(),
                anchor: entry.anchor,
                active: index == self.active,
            })
            .collect()
    }
}
