//! The single open folder and its live playback state.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::error::{AppError, AppResult, OptionExt};
use crate::library::FolderScan;
use crate::models::{AudioFile, FolderRecord, GlobalSettingsRecord, TrackStats};
use crate::persistence::reconcile::{apply_record, imported_record};
use crate::persistence::settings::{load_settings, remember_folder};
use crate::persistence::{
    export_document, import_document, reconcile, ExportDocument, HistoryAggregator,
    PlayOutcome, PlaybackState, SaveScheduler, StateSource,
};
use crate::store::LocalStore;

/// Partial update of the live playback state.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    #[validate(range(min = -1, message = "Index must be -1 or a track index"))]
    pub current_index: Option<i64>,
    #[validate(range(min = 0.0, message = "Time cannot be negative"))]
    pub current_time: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0, message = "Volume must be between 0 and 1"))]
    pub volume: Option<f64>,
    pub is_shuffle: Option<bool>,
    pub is_repeat: Option<bool>,
}

/// What clients see of the open folder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub folder_id: String,
    pub folder_name: String,
    pub source: StateSource,
    pub tracks: Vec<AudioFile>,
    pub playback: PlaybackState,
    pub track_stats: HashMap<String, TrackStats>,
}

#[derive(Debug, Clone)]
struct OpenFolder {
    folder_name: String,
    folder_id: String,
    files: Vec<AudioFile>,
    playback: PlaybackState,
    track_stats: HashMap<String, TrackStats>,
    source: StateSource,
}

impl OpenFolder {
    fn view(&self) -> SessionView {
        SessionView {
            folder_id: self.folder_id.clone(),
            folder_name: self.folder_name.clone(),
            source: self.source,
            tracks: self.files.clone(),
            playback: self.playback.clone(),
            track_stats: self.track_stats.clone(),
        }
    }

    fn track(&self, index: usize) -> AppResult<&AudioFile> {
        self.files
            .get(index)
            .ok_or_else(|| AppError::track_not_found(index))
    }
}

/// Owns the open folder, the save scheduler and the history aggregator.
#[derive(Debug)]
pub struct Session {
    store: Arc<LocalStore>,
    history: Arc<HistoryAggregator>,
    scheduler: SaveScheduler,
    open: Mutex<Option<OpenFolder>>,
}

impl Session {
    pub fn new(store: Arc<LocalStore>, save_debounce: Duration) -> Self {
        Self {
            history: Arc::new(HistoryAggregator::new(store.clone())),
            scheduler: SaveScheduler::new(save_debounce),
            store,
            open: Mutex::new(None),
        }
    }

    /// Replace the open folder with a freshly scanned one.
    ///
    /// Any pending save for the previous folder is discarded.
    pub async fn open(&self, folder_name: &str, scan: FolderScan) -> SessionView {
        self.scheduler.cancel();

        let default_volume = match load_settings(&self.store).await {
            Ok(settings) => settings.default_volume,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load settings, using built-in defaults");
                GlobalSettingsRecord::default().default_volume
            }
        };
        let defaults = PlaybackState::initial(scan.files.len(), default_volume);

        let reconciled = reconcile(
            &self.history,
            folder_name,
            scan.files,
            scan.export_document.as_deref(),
            &defaults,
        )
        .await;

        if let Err(e) = remember_folder(&self.store, &reconciled.folder_id, folder_name).await {
            tracing::warn!(error = %e, "Could not update recent folders");
        }

        let folder = OpenFolder {
            folder_name: folder_name.to_string(),
            folder_id: reconciled.folder_id,
            files: reconciled.files,
            playback: reconciled.playback,
            track_stats: reconciled.track_stats,
            source: reconciled.source,
        };
        let view = folder.view();

        // Changes to the previous folder may have re-armed the scheduler meanwhile.
        self.scheduler.cancel();
        *self.open.lock() = Some(folder);

        view
    }

    /// Close the open folder without saving pending changes.
    pub fn close(&self) {
        if self.scheduler.cancel() {
            tracing::debug!("Discarding pending save");
        }
        if let Some(folder) = self.open.lock().take() {
            tracing::info!(folder_id = %folder.folder_id, "Closed folder");
        }
    }

    pub fn view(&self) -> AppResult<SessionView> {
        self.open
            .lock()
            .as_ref()
            .map(OpenFolder::view)
            .ok_or_else(AppError::no_open_folder)
    }

    /// Apply a state change and schedule a debounced save.
    pub fn update_state(&self, update: StateUpdate) -> AppResult<SessionView> {
        let view = {
            let mut open = self.open.lock();
            let folder = open.as_mut().ok_or_else(AppError::no_open_folder)?;

            if let Some(index) = update.current_index {
                if index < -1 || index >= folder.files.len() as i64 {
                    return Err(AppError::Validation(format!(
                        "Index {} is out of range for {} tracks",
                        index,
                        folder.files.len()
                    )));
                }
                folder.playback.current_index = index;
            }
            if let Some(time) = update.current_time {
                folder.playback.current_time = time;
            }
            if let Some(volume) = update.volume {
                folder.playback.volume = volume;
            }
            if let Some(shuffle) = update.is_shuffle {
                folder.playback.is_shuffle = shuffle;
            }
            if let Some(repeat) = update.is_repeat {
                folder.playback.is_repeat = repeat;
            }
            folder.view()
        };

        self.schedule_save();
        Ok(view)
    }

    /// Flip the liked flag of a track. Returns the new value.
    pub fn toggle_like(&self, index: usize) -> AppResult<bool> {
        let liked = {
            let mut open = self.open.lock();
            let folder = open.as_mut().ok_or_else(AppError::no_open_folder)?;
            let file = folder
                .files
                .get_mut(index)
                .ok_or_else(|| AppError::track_not_found(index))?;
            file.liked = !file.liked;
            file.liked
        };

        self.schedule_save();
        Ok(liked)
    }

    fn schedule_save(&self) {
        let Some((folder_name, files, playback)) = self
            .open
            .lock()
            .as_ref()
            .map(|f| (f.folder_name.clone(), f.files.clone(), f.playback.clone()))
        else {
            return;
        };

        let history = self.history.clone();
        self.scheduler.schedule(move || async move {
            history
                .save_state(&folder_name, &files, &playback)
                .await
                .map(|_| ())
        });
    }

    /// Count a completed play and refresh the open folder's stats.
    pub async fn record_play(&self, index: usize, play_time_secs: f64) -> AppResult<PlayOutcome> {
        let (folder_name, files) = self.snapshot()?;
        let outcome = self
            .history
            .record_play(&folder_name, &files, index, play_time_secs)
            .await?;
        self.refresh_stats(&outcome.folder);
        Ok(outcome)
    }

    /// Count an enqueue. `None` when the folder has never been played from.
    pub async fn record_queue(&self, index: usize) -> AppResult<Option<FolderRecord>> {
        let (folder_name, files) = self.snapshot()?;
        let record = self.history.record_queue(&folder_name, &files, index).await?;
        if let Some(record) = &record {
            self.refresh_stats(record);
        }
        Ok(record)
    }

    /// Path of a track in the open folder.
    pub fn track_path(&self, index: usize) -> AppResult<PathBuf> {
        let open = self.open.lock();
        let folder = open.as_ref().ok_or_else(AppError::no_open_folder)?;
        Ok(folder.track(index)?.src.clone())
    }

    /// Export the open folder together with the global history.
    ///
    /// A pending debounced save is written first, so the document reflects
    /// the live likes and position.
    pub async fn export(&self) -> AppResult<ExportDocument> {
        let (folder_name, files, playback) = {
            let open = self.open.lock();
            let folder = open.as_ref().ok_or_else(AppError::no_open_folder)?;
            (
                folder.folder_name.clone(),
                folder.files.clone(),
                folder.playback.clone(),
            )
        };

        if self.scheduler.cancel() {
            self.history
                .save_state(&folder_name, &files, &playback)
                .await?;
        }

        export_document(&self.store, &files, &folder_name, &playback).await
    }

    /// Import a document into the open folder.
    ///
    /// A rejected document changes nothing. An accepted one replaces the
    /// folder's state and the global history, and supersedes any pending save.
    pub async fn import(&self, json_text: &str) -> AppResult<SessionView> {
        let (folder_name, folder_id, files, playback) = {
            let open = self.open.lock();
            let folder = open.as_ref().ok_or_else(AppError::no_open_folder)?;
            (
                folder.folder_name.clone(),
                folder.folder_id.clone(),
                folder.files.clone(),
                folder.playback.clone(),
            )
        };

        let imported = import_document(json_text, &files)?;
        let record = imported_record(&imported, &folder_id, &folder_name);
        self.scheduler.cancel();
        self.history
            .adopt_import(&record, imported.global_history.as_ref())
            .await?;

        let mut open = self.open.lock();
        let folder = open
            .as_mut()
            .filter(|f| f.folder_id == folder_id)
            .ok_or_not_found("Folder was closed during import")?;
        let (files, playback) = apply_record(std::mem::take(&mut folder.files), &record, &playback);
        folder.files = files;
        folder.playback = playback;
        folder.track_stats = record.track_stats.clone();
        folder.source = StateSource::Imported;

        tracing::info!(folder_id = %folder_id, "Imported folder data");
        Ok(folder.view())
    }

    fn snapshot(&self) -> AppResult<(String, Vec<AudioFile>)> {
        let open = self.open.lock();
        let folder = open.as_ref().ok_or_else(AppError::no_open_folder)?;
        Ok((folder.folder_name.clone(), folder.files.clone()))
    }

    fn refresh_stats(&self, record: &FolderRecord) {
        if let Some(folder) = self
            .open
            .lock()
            .as_mut()
            .filter(|f| f.folder_id == record.folder_id)
        {
            folder.track_stats = record.track_stats.clone();
        }
    }
}
