//! Decide the starting playback state for a freshly scanned folder.
//!
//! Sources in priority order: an export document shipped inside the folder,
//! the stored folder record, then defaults.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::history::HistoryAggregator;
use super::identity::derive_folder_id;
use super::state::PlaybackState;
use super::transfer::{import_document, ImportedState};
use crate::models::{now_ms, track_names, AudioFile, FolderRecord, TrackStats};
use crate::store::Collection;

/// Where the reconciled state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StateSource {
    Imported,
    Stored,
    Fresh,
}

/// The authoritative in-memory state for an opened folder.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub folder_id: String,
    pub files: Vec<AudioFile>,
    pub playback: PlaybackState,
    pub track_stats: HashMap<String, TrackStats>,
    pub source: StateSource,
}

/// Reconcile a scan with whatever was remembered about the folder.
///
/// Never fails: an unreadable export document or an unavailable store is
/// logged and the next source is tried.
pub async fn reconcile(
    history: &HistoryAggregator,
    folder_name: &str,
    files: Vec<AudioFile>,
    export_text: Option<&str>,
    defaults: &PlaybackState,
) -> Reconciled {
    let folder_id = derive_folder_id(folder_name, &track_names(&files));

    if let Some(text) = export_text {
        match import_document(text, &files) {
            Ok(imported) => {
                let record = imported_record(&imported, &folder_id, folder_name);
                if let Err(e) = history
                    .adopt_import(&record, imported.global_history.as_ref())
                    .await
                {
                    tracing::warn!(folder_id = %folder_id, error = %e, "Could not store imported folder data");
                }
                tracing::info!(folder_id = %folder_id, "Restored folder from export document");
                return build(folder_id, files, &record, defaults, StateSource::Imported);
            }
            Err(e) => {
                tracing::warn!(folder_id = %folder_id, error = %e, "Ignoring export document in folder");
            }
        }
    }

    match history
        .store()
        .get::<FolderRecord>(Collection::Folders, &folder_id)
        .await
    {
        Ok(Some(record)) => {
            tracing::info!(folder_id = %folder_id, "Restored folder from local store");
            return build(folder_id, files, &record, defaults, StateSource::Stored);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(folder_id = %folder_id, error = %e, "Could not read stored folder state");
        }
    }

    tracing::info!(folder_id = %folder_id, tracks = files.len(), "Opened new folder");
    let playback = PlaybackState {
        current_index: if files.is_empty() { -1 } else { 0 },
        current_time: 0.0,
        ..defaults.clone()
    };
    let files = files
        .into_iter()
        .map(|file| AudioFile {
            liked: false,
            ..file
        })
        .collect();

    Reconciled {
        folder_id,
        files,
        playback,
        track_stats: HashMap::new(),
        source: StateSource::Fresh,
    }
}

/// The folder record an accepted import becomes under the current identity.
pub fn imported_record(imported: &ImportedState, folder_id: &str, folder_name: &str) -> FolderRecord {
    FolderRecord {
        folder_id: folder_id.to_string(),
        folder_name: folder_name.to_string(),
        last_opened: now_ms(),
        ..imported.folder_data.clone()
    }
}

/// Apply a record to the scanned files.
pub fn apply_record(
    files: Vec<AudioFile>,
    record: &FolderRecord,
    defaults: &PlaybackState,
) -> (Vec<AudioFile>, PlaybackState) {
    let favorites: HashSet<&str> = record.favorites.iter().map(String::as_str).collect();
    let files: Vec<AudioFile> = files
        .into_iter()
        .map(|file| AudioFile {
            liked: favorites.contains(file.name.as_str()),
            ..file
        })
        .collect();

    let len = files.len() as i64;
    let restored = record.last_played_track_index >= 0 && record.last_played_track_index < len;
    let (current_index, current_time) = if restored {
        let position = record.last_played_position;
        let position = if position.is_finite() && position >= 0.0 {
            position
        } else {
            0.0
        };
        (record.last_played_track_index, position)
    } else {
        (if len > 0 { 0 } else { -1 }, 0.0)
    };

    let volume = record
        .volume
        .filter(|v| (0.0..=1.0).contains(v))
        .unwrap_or(defaults.volume);

    let playback = PlaybackState {
        current_index,
        current_time,
        volume,
        is_shuffle: record.is_shuffle.unwrap_or(defaults.is_shuffle),
        is_repeat: record.is_repeat.unwrap_or(defaults.is_repeat),
    };

    (files, playback)
}

fn build(
    folder_id: String,
    files: Vec<AudioFile>,
    record: &FolderRecord,
    defaults: &PlaybackState,
    source: StateSource,
) -> Reconciled {
    let (files, playback) = apply_record(files, record, defaults);
    Reconciled {
        folder_id,
        files,
        playback,
        track_stats: record.track_stats.clone(),
        source,
    }
}
