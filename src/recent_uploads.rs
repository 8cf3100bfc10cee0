//! Bounded list of the most recent upload URLs.
//!
//! Entries are unique and ordered most-recent-first. Adding a URL that is
//! already present does not move it to the front. The list is persisted as a
//! JSON array under [`RECENT_UPLOADS_KEY`] on every add and loaded lazily on
//! first access.
//!
//! `add` rewrites the whole record from the in-memory copy. Two processes
//! sharing the same storage file would overwrite each other's additions.

use crate::error::StorageError;
use crate::storage::KeyValueStore;

pub const RECENT_UPLOADS_KEY: &str = "last_uploads";
pub const CAPACITY: usize = 3;

pub struct RecentUploadsStore {
    storage: Box<dyn KeyValueStore>,
    entries: Option<Vec<String>>,
}

impl RecentUploadsStore {
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            entries: None,
        }
    }

    fn load(storage: &dyn KeyValueStore) -> Vec<String> {
        let raw = match storage.get(RECENT_UPLOADS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read recent uploads");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(mut entries) => {
                // Repair records written by hand or by older builds.
                let mut seen = Vec::with_capacity(CAPACITY);
                entries.retain(|url| {
                    if seen.contains(url) {
                        false
                    } else {
                        seen.push(url.clone());
                        true
                    }
                });
                entries.truncate(CAPACITY);
                entries
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed recent uploads record");
                Vec::new()
            }
        }
    }

    fn entries_mut(&mut self) -> &mut Vec<String> {
        let storage = &self.storage;
        self.entries
            .get_or_insert_with(|| Self::load(storage.as_ref()))
    }

    pub fn list(&mut self) -> &[String] {
        self.entries_mut()
    }

    /// The entries if they have been loaded, without touching storage.
    pub fn loaded(&self) -> &[String] {
        self.entries.as_deref().unwrap_or_default()
    }

    pub fn latest(&mut self) -> Option<&str> {
        self.list().first().map(String::as_str)
    }

    /// Returns `Ok(false)` when the URL was already present.
    ///
    /// A storage error is a warning: the in-memory list has already been
    /// updated and is not rolled back.
    pub fn add(&mut self, url: &str) -> Result<bool, StorageError> {
        let entries = self.entries_mut();
        if entries.iter().any(|e| e == url) {
            return Ok(false);
        }

        entries.insert(0, url.to_string());
        entries.truncate(CAPACITY);

        let record = serde_json::to_string(&*entries)?;
        self.storage.set(RECENT_UPLOADS_KEY, &record)?;
        tracing::debug!(url, "Added recent upload");
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.entries = Some(Vec::new());
        self.storage.remove(RECENT_UPLOADS_KEY)
    }
}
