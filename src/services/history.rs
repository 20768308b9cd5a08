//! Local log of past colorizations.
//!
//! The whole list lives under a single key and is rewritten on every
//! mutation. It is capped at [`MAX_HISTORY_ENTRIES`], newest first; the
//! oldest entries fall off the end. Unreadable persisted data is treated as
//! an empty history rather than an error.

use std::sync::Arc;

use chrono::{Local, NaiveDate, TimeZone};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::models::history::HistoryEntry;
use crate::services::kv::{KeyValueStore, KvError};

/// Storage key holding the serialized history.
pub const HISTORY_KEY: &str = "colorization_history";

pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Entries that share a calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    /// e.g. "Apr 22, 2025"
    pub label: String,
    pub entries: Vec<HistoryEntry>,
}

pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    /// `None` until the first access loads from `store`.
    cache: Mutex<Option<Vec<HistoryEntry>>>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    /// All entries, newest first.
    pub async fn all(&self) -> Vec<HistoryEntry> {
        let mut cache = self.cache.lock().await;
        self.loaded(&mut cache).await.clone()
    }

    pub async fn len(&self) -> usize {
        let mut cache = self.cache.lock().await;
        self.loaded(&mut cache).await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert `entry` at the front, trim to the cap, then persist.
    pub async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut cache = self.cache.lock().await;
        let mut entries = self.loaded(&mut cache).await.clone();

        entries.insert(0, entry);
        entries.truncate(MAX_HISTORY_ENTRIES);

        self.commit(&mut cache, entries).await
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub async fn remove(&self, id: Uuid) -> Result<bool, HistoryError> {
        let mut cache = self.cache.lock().await;
        let mut entries = self.loaded(&mut cache).await.clone();

        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }

        self.commit(&mut cache, entries).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<(), HistoryError> {
        let mut cache = self.cache.lock().await;
        self.commit(&mut cache, Vec::new()).await
    }

    /// Entries grouped by local calendar day, newest day first.
    pub async fn grouped_by_day(&self) -> Vec<DayGroup> {
        self.grouped_by_day_in(&Local).await
    }

    pub async fn grouped_by_day_in<Tz: TimeZone>(&self, tz: &Tz) -> Vec<DayGroup>
    where
        Tz::Offset: std::fmt::Display,
    {
        let entries = self.all().await;
        group_by_day(entries, tz)
    }

    async fn loaded<'a>(&self, cache: &'a mut Option<Vec<HistoryEntry>>) -> &'a mut Vec<HistoryEntry> {
        if cache.is_none() {
            *cache = Some(self.load().await);
        }
        cache.get_or_insert_with(Vec::new)
    }

    async fn load(&self) -> Vec<HistoryEntry> {
        let bytes = match self.store.get(HISTORY_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read history, starting empty");
                return Vec::new();
            }
        };

        match decode_entries(&bytes) {
            Ok(mut entries) => {
                entries.truncate(MAX_HISTORY_ENTRIES);
                tracing::debug!(count = entries.len(), "Loaded history");
                entries
            }
            Err(e) => {
                tracing::warn!(error = %e, "History is corrupted, starting empty");
                Vec::new()
            }
        }
    }

    /// Persist `entries`; the cache only changes once the write succeeded.
    async fn commit(
        &self,
        cache: &mut Option<Vec<HistoryEntry>>,
        entries: Vec<HistoryEntry>,
    ) -> Result<(), HistoryError> {
        self.persist(&entries).await?;
        *cache = Some(entries);
        Ok(())
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let bytes = serde_json::to_vec(entries).map_err(HistoryError::Serialize)?;
        self.store.set(HISTORY_KEY, &bytes).await?;
        tracing::debug!(count = entries.len(), bytes = bytes.len(), "History saved");
        Ok(())
    }
}

/// Decode a persisted history blob.
pub fn decode_entries(bytes: &[u8]) -> Result<Vec<HistoryEntry>, HistoryError> {
    serde_json::from_slice(bytes).map_err(HistoryError::StorageCorrupt)
}

fn group_by_day<Tz: TimeZone>(entries: Vec<HistoryEntry>, tz: &Tz) -> Vec<DayGroup>
where
    Tz::Offset: std::fmt::Display,
{
    let mut days: Vec<(NaiveDate, DayGroup)> = Vec::new();

    for entry in entries {
        let day = entry.timestamp.with_timezone(tz).date_naive();
        match days.iter_mut().find(|(d, _)| *d == day) {
            Some((_, group)) => group.entries.push(entry),
            None => {
                let label = entry.day_label_in(tz);
                days.push((
                    day,
                    DayGroup {
                        label,
                        entries: vec![entry],
                    },
                ));
            }
        }
    }

    days.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, group) in days.iter_mut() {
        group.entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
    days.into_iter().map(|(_, group)| group).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Persisted history is corrupted: {0}")]
    StorageCorrupt(#[source] serde_json::Error),

    #[error("Failed to serialize history: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] KvError),
}

impl HistoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HistoryError::StorageCorrupt(_) => ErrorKind::StorageCorrupt,
            HistoryError::Serialize(_) | HistoryError::Storage(_) => ErrorKind::LocalIo,
        }
    }
}
