//! Play and queue event aggregation, per folder and across folders.
//!
//! Folder-record updates are serialized per folder id and global-history
//! updates are serialized on the singleton, so two play events never lose
//! each other's increments.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::identity::derive_folder_id;
use super::state::{save_state, PlaybackState};
use crate::error::{AppError, AppResult};
use crate::models::{
    now_ms, track_names, AudioFile, FolderRecord, GlobalHistoryRecord, GlobalTrackEntry,
};
use crate::store::{Collection, LocalStore, SINGLETON_KEY};

/// Both records after a play event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOutcome {
    pub folder: FolderRecord,
    pub history: GlobalHistoryRecord,
}

/// Records play and queue events into the local store.
#[derive(Debug)]
pub struct HistoryAggregator {
    store: Arc<LocalStore>,
    folder_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    history_lock: AsyncMutex<()>,
}

impl HistoryAggregator {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            folder_locks: Mutex::new(HashMap::new()),
            history_lock: AsyncMutex::new(()),
        }
    }

    /// The store the aggregator writes through.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    async fn lock_folder(&self, folder_id: &str) -> FolderGuard<'_> {
        let lock = self
            .folder_locks
            .lock()
            .entry(folder_id.to_string())
            .or_default()
            .clone();

        FolderGuard {
            locks: &self.folder_locks,
            folder_id: folder_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Count a completed play of `files[track_index]`.
    ///
    /// The folder record is created if needed and written immediately, then
    /// the global history entry is updated.
    pub async fn record_play(
        &self,
        folder_name: &str,
        files: &[AudioFile],
        track_index: usize,
        play_time_secs: f64,
    ) -> AppResult<PlayOutcome> {
        let track = files
            .get(track_index)
            .ok_or_else(|| AppError::track_not_found(track_index))?;
        let folder_id = derive_folder_id(folder_name, &track_names(files));
        let play_time = if play_time_secs.is_finite() {
            play_time_secs.max(0.0)
        } else {
            0.0
        };
        let now = now_ms();

        let folder = {
            let _guard = self.lock_folder(&folder_id).await;

            let mut record = self
                .store
                .get::<FolderRecord>(Collection::Folders, &folder_id)
                .await?
                .unwrap_or_else(|| FolderRecord::fresh(&folder_id, folder_name, files.len()));

            let stats = record.stats_mut(&track.name);
            stats.play_count += 1;
            stats.last_played = Some(now);
            record.push_recently_played(&track.name);

            self.store.put(Collection::Folders, &folder_id, &record).await?;
            record
        };

        let history = {
            let _guard = self.history_lock.lock().await;

            let mut history = self
                .store
                .get::<GlobalHistoryRecord>(Collection::History, SINGLETON_KEY)
                .await?
                .unwrap_or_default();

            let entry = history
                .tracks
                .entry(GlobalHistoryRecord::entry_key(&folder_id, &track.name))
                .or_insert_with(|| GlobalTrackEntry {
                    track_name: track.name.clone(),
                    folder_id: folder_id.clone(),
                    folder_name: folder_name.to_string(),
                    play_count: 0,
                    total_play_time: 0.0,
                    last_played: now,
                });
            entry.play_count += 1;
            entry.total_play_time += play_time;
            entry.last_played = now;
            history.total_plays += 1;
            history.last_updated = now;

            self.store.put(Collection::History, SINGLETON_KEY, &history).await?;
            history
        };

        tracing::info!(
            folder_id = %folder_id,
            track = %track.name,
            play_time,
            total_plays = history.total_plays,
            "Recorded play"
        );

        Ok(PlayOutcome { folder, history })
    }

    /// Save playback state under the same per-folder lock as play and queue
    /// events, so a delayed save never drops their counters.
    pub async fn save_state(
        &self,
        folder_name: &str,
        files: &[AudioFile],
        playback: &PlaybackState,
    ) -> AppResult<FolderRecord> {
        let folder_id = derive_folder_id(folder_name, &track_names(files));
        let _guard = self.lock_folder(&folder_id).await;

        save_state(&self.store, folder_name, files, playback).await
    }

    /// Count an enqueue of `files[track_index]`.
    ///
    /// Returns `None` without writing anything when the folder has no record
    /// yet.
    pub async fn record_queue(
        &self,
        folder_name: &str,
        files: &[AudioFile],
        track_index: usize,
    ) -> AppResult<Option<FolderRecord>> {
        let track = files
            .get(track_index)
            .ok_or_else(|| AppError::track_not_found(track_index))?;
        let folder_id = derive_folder_id(folder_name, &track_names(files));
        let _guard = self.lock_folder(&folder_id).await;

        let Some(mut record) = self
            .store
            .get::<FolderRecord>(Collection::Folders, &folder_id)
            .await?
        else {
            tracing::debug!(folder_id = %folder_id, "Queue event for unknown folder ignored");
            return Ok(None);
        };

        record.stats_mut(&track.name).queue_count += 1;
        self.store.put(Collection::Folders, &folder_id, &record).await?;

        tracing::debug!(folder_id = %folder_id, track = %track.name, "Recorded queue");
        Ok(Some(record))
    }

    /// Write an accepted import through to the store. Global history, when
    /// present, replaces the stored history wholesale.
    ///
    /// Holds the folder's lock and the history lock, so a concurrent play
    /// event cannot write back a history read before the import.
    pub async fn adopt_import(
        &self,
        record: &FolderRecord,
        global_history: Option<&GlobalHistoryRecord>,
    ) -> AppResult<()> {
        let _guard = self.lock_folder(&record.folder_id).await;

        if let Some(history) = global_history {
            let _history = self.history_lock.lock().await;
            replace_history(&self.store, history).await?;
        }
        self.store
            .put(Collection::Folders, &record.folder_id, record)
            .await
    }
}

/// The global history, or an empty one if nothing has been played yet.
pub async fn load_history(store: &LocalStore) -> AppResult<GlobalHistoryRecord> {
    Ok(store
        .get(Collection::History, SINGLETON_KEY)
        .await?
        .unwrap_or_default())
}

/// Replace the global history wholesale. Callers hold the history lock.
async fn replace_history(store: &LocalStore, history: &GlobalHistoryRecord) -> AppResult<()> {
    store.put(Collection::History, SINGLETON_KEY, history).await?;
    tracing::info!(
        entries = history.tracks.len(),
        total_plays = history.total_plays,
        "Replaced global history"
    );
    Ok(())
}

/// Holds one folder's lock. Dropping it releases the lock and forgets the
/// folder's entry once nobody else holds or awaits it.
struct FolderGuard<'a> {
    locks: &'a Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    folder_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FolderGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        self.guard.take();
        if locks
            .get(&self.folder_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.folder_id);
        }
    }
}
