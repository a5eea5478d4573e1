//! Portable export documents: one folder's record plus global history.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::identity::derive_folder_id;
use super::state::{liked_names, PlaybackState};
use crate::error::{AppError, AppResult};
use crate::models::{
    now_ms, track_names, AudioFile, CustomPlaylist, FolderRecord, GlobalHistoryRecord, TrackStats,
    RECENTLY_PLAYED_LIMIT,
};
use crate::store::{Collection, LocalStore, SINGLETON_KEY};

/// Format version written into every export.
pub const EXPORT_VERSION: &str = "1.0.0";

/// The document written by export and read back by import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: i64,
    pub folder_data: FolderRecord,
    pub global_history: GlobalHistoryRecord,
}

/// A validated import, already pruned against the current scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedState {
    pub folder_data: FolderRecord,
    pub global_history: Option<GlobalHistoryRecord>,
}

/// Build an export of the open folder.
///
/// Stored stats, recently played and playlists are merged with the live
/// state. Favorites come from the stored record when one exists, otherwise
/// from the live liked flags.
pub async fn export_document(
    store: &LocalStore,
    files: &[AudioFile],
    folder_name: &str,
    playback: &PlaybackState,
) -> AppResult<ExportDocument> {
    let folder_id = derive_folder_id(folder_name, &track_names(files));
    let existing: Option<FolderRecord> = store.get(Collection::Folders, &folder_id).await?;
    let global_history: GlobalHistoryRecord = store
        .get(Collection::History, SINGLETON_KEY)
        .await?
        .unwrap_or_default();

    let now = now_ms();
    let favorites = match &existing {
        Some(record) => record.favorites.clone(),
        None => liked_names(files),
    };
    let base = existing.unwrap_or_else(|| FolderRecord::fresh(&folder_id, folder_name, files.len()));

    let folder_data = FolderRecord {
        folder_id: folder_id.clone(),
        folder_name: folder_name.to_string(),
        last_opened: now,
        last_played_track_index: playback.current_index,
        last_played_position: playback.current_time,
        last_played_timestamp: now,
        favorites,
        volume: Some(playback.volume),
        is_shuffle: Some(playback.is_shuffle),
        is_repeat: Some(playback.is_repeat),
        ..base
    };

    tracing::info!(
        folder_id = %folder_id,
        tracks = folder_data.track_stats.len(),
        total_plays = global_history.total_plays,
        "Exported folder data"
    );

    Ok(ExportDocument {
        version: EXPORT_VERSION.to_string(),
        exported_at: now,
        folder_data,
        global_history,
    })
}

/// Parse and validate an export document against the current scan.
///
/// The whole document is rejected when it is not JSON or lacks `version` or
/// `folderData`. Individual malformed fields fall back to defaults. Favorites
/// and stats naming tracks that are no longer present are dropped, and the
/// saved index is clamped into the current track list.
pub fn import_document(json_text: &str, current_files: &[AudioFile]) -> AppResult<ImportedState> {
    let document: Value = serde_json::from_str(json_text)
        .map_err(|e| AppError::InvalidDocument(format!("not valid JSON: {}", e)))?;

    let document = document
        .as_object()
        .ok_or_else(|| AppError::InvalidDocument("expected a JSON object".to_string()))?;

    match document.get("version") {
        Some(Value::String(_)) => {}
        Some(_) => {
            return Err(AppError::InvalidDocument(
                "version must be a string".to_string(),
            ))
        }
        None => return Err(AppError::InvalidDocument("missing version".to_string())),
    }

    let folder_data = document
        .get("folderData")
        .ok_or_else(|| AppError::InvalidDocument("missing folderData".to_string()))?
        .as_object()
        .ok_or_else(|| AppError::InvalidDocument("folderData must be an object".to_string()))?;

    let present: HashSet<&str> = current_files.iter().map(|f| f.name.as_str()).collect();

    let mut folder = folder_record_lenient(folder_data);
    folder.favorites.retain(|name| present.contains(name.as_str()));
    folder.track_stats.retain(|name, _| present.contains(name.as_str()));

    let len = current_files.len() as i64;
    if folder.last_played_track_index < 0 || folder.last_played_track_index >= len {
        folder.last_played_track_index = if len > 0 { 0 } else { -1 };
        folder.last_played_position = 0.0;
    }

    let global_history = match document.get("globalHistory") {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<GlobalHistoryRecord>(value.clone()) {
            Ok(history) => Some(history),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed globalHistory in import");
                None
            }
        },
    };

    Ok(ImportedState {
        folder_data: folder,
        global_history,
    })
}

/// Read a folder record field by field, keeping defaults for anything absent
/// or malformed.
fn folder_record_lenient(data: &Map<String, Value>) -> FolderRecord {
    let mut record = FolderRecord::default();

    if let Some(v) = field(data, "folderId") {
        record.folder_id = v;
    }
    if let Some(v) = field(data, "folderName") {
        record.folder_name = v;
    }
    if let Some(v) = field(data, "lastOpened") {
        record.last_opened = v;
    }
    if let Some(v) = field(data, "lastPlayedTrackIndex") {
        record.last_played_track_index = v;
    }
    if let Some(v) = field::<f64>(data, "lastPlayedPosition") {
        if v.is_finite() && v >= 0.0 {
            record.last_played_position = v;
        }
    }
    if let Some(v) = field(data, "lastPlayedTimestamp") {
        record.last_played_timestamp = v;
    }
    record.volume = field::<f64>(data, "volume").filter(|v| (0.0..=1.0).contains(v));
    record.is_shuffle = field(data, "isShuffle");
    record.is_repeat = field(data, "isRepeat");

    let mut favorites = string_list(data, "favorites");
    let mut seen = HashSet::new();
    favorites.retain(|name| seen.insert(name.clone()));
    record.favorites = favorites;

    let mut recently_played = string_list(data, "recentlyPlayed");
    recently_played.truncate(RECENTLY_PLAYED_LIMIT);
    record.recently_played = recently_played;

    if let Some(playlists) = data.get("customPlaylists").and_then(Value::as_array) {
        record.custom_playlists = playlists
            .iter()
            .filter_map(|p| serde_json::from_value::<CustomPlaylist>(p.clone()).ok())
            .collect();
    }

    if let Some(stats) = data.get("trackStats").and_then(Value::as_object) {
        for (name, value) in stats {
            match serde_json::from_value::<TrackStats>(value.clone()) {
                Ok(entry) => {
                    record.track_stats.insert(name.clone(), entry);
                }
                Err(e) => tracing::warn!(track = %name, error = %e, "Dropping malformed track stats"),
            }
        }
    }

    record
}

/// A present, well-typed field. Malformed values are logged and treated as
/// absent.
fn field<T: DeserializeOwned>(data: &Map<String, Value>, name: &str) -> Option<T> {
    let value = data.get(name)?;
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(field = name, error = %e, "Ignoring malformed field in import");
            None
        }
    }
}

/// The string entries of an array field; other entries are skipped.
fn string_list(data: &Map<String, Value>, name: &str) -> Vec<String> {
    data.get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GlobalTrackEntry;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn files(names: &[&str]) -> Vec<AudioFile> {
        names
            .iter()
            .map(|name| AudioFile::new(*name, PathBuf::from(format!("{}.flac", name))))
            .collect()
    }

    #[test]
    fn test_rejects_invalid_json() {
        let result = import_document("{not json", &files(&["A"]));
        assert!(matches!(result, Err(AppError::InvalidDocument(_))));
    }

    #[test]
    fn test_rejects_missing_version() {
        let text = json!({ "folderData": {} }).to_string();
        assert!(matches!(
            import_document(&text, &files(&["A"])),
            Err(AppError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_rejects_missing_folder_data() {
        let text = json!({ "version": "1.0.0", "globalHistory": {} }).to_string();
        assert!(matches!(
            import_document(&text, &files(&["A"])),
            Err(AppError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_prunes_stale_tracks_and_clamps_index() {
        let text = json!({
            "version": "1.0.0",
            "exportedAt": 1,
            "folderData": {
                "folderId": "folder_x",
                "folderName": "Album",
                "lastPlayedTrackIndex": 5,
                "lastPlayedPosition": 33.0,
                "favorites": ["A", "C"],
                "trackStats": {
                    "A": { "trackName": "A", "playCount": 2, "queueCount": 0, "lastPlayed": 10 },
                    "C": { "trackName": "C", "playCount": 9, "queueCount": 1, "lastPlayed": 11 }
                }
            }
        })
        .to_string();

        let imported = import_document(&text, &files(&["A", "B"])).unwrap();

        assert_eq!(imported.folder_data.favorites, vec!["A"]);
        assert!(imported.folder_data.track_stats.contains_key("A"));
        assert!(!imported.folder_data.track_stats.contains_key("C"));
        assert_eq!(imported.folder_data.last_played_track_index, 0);
        assert_eq!(imported.folder_data.last_played_position, 0.0);
        assert!(imported.global_history.is_none());
    }

    #[test]
    fn test_malformed_fields_fall_back() {
        let text = json!({
            "version": "1.0.0",
            "folderData": {
                "lastPlayedTrackIndex": "two",
                "volume": 7,
                "isShuffle": "yes",
                "favorites": ["A", 3, "A", null],
                "customPlaylists": [{ "name": "Mix", "tracks": ["A"], "createdAt": 5 }, 17],
                "trackStats": { "A": { "trackName": "A", "playCount": "lots" } }
            },
            "globalHistory": "not an object"
        })
        .to_string();

        let imported = import_document(&text, &files(&["A", "B"])).unwrap();
        let folder = imported.folder_data;

        assert_eq!(folder.last_played_track_index, 0);
        assert_eq!(folder.volume, None);
        assert_eq!(folder.is_shuffle, None);
        assert_eq!(folder.favorites, vec!["A"]);
        assert_eq!(folder.custom_playlists.len(), 1);
        assert!(folder.track_stats.is_empty());
        assert!(imported.global_history.is_none());
    }

    #[test]
    fn test_global_history_passes_through() {
        let text = json!({
            "version": "1.0.0",
            "folderData": {},
            "globalHistory": {
                "tracks": {
                    "folder_other_Z": {
                        "trackName": "Z", "folderId": "folder_other", "folderName": "Other",
                        "playCount": 4, "totalPlayTime": 800.0, "lastPlayed": 3
                    }
                },
                "totalPlays": 4,
                "lastUpdated": 3
            }
        })
        .to_string();

        let imported = import_document(&text, &files(&["A"])).unwrap();
        let history = imported.global_history.unwrap();

        assert_eq!(history.total_plays, 4);
        assert_eq!(history.tracks["folder_other_Z"].play_count, 4);
    }

    #[tokio::test]
    async fn test_export_without_stored_record_uses_live_likes() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());
        let mut files = files(&["A", "B"]);
        files[0].liked = true;

        let document = export_document(&store, &files, "Album", &PlaybackState::initial(2, 0.5))
            .await
            .unwrap();

        assert_eq!(document.version, EXPORT_VERSION);
        assert_eq!(document.folder_data.favorites, vec!["A"]);
        assert_eq!(document.folder_data.volume, Some(0.5));
        assert_eq!(document.global_history, GlobalHistoryRecord::default());
    }

    #[tokio::test]
    async fn test_export_prefers_stored_favorites_and_keeps_stats() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());
        let files = files(&["A", "B"]);
        let folder_id = derive_folder_id("Album", &["A", "B"]);

        let mut stored = FolderRecord::fresh(&folder_id, "Album", 2);
        stored.favorites = vec!["B".to_string()];
        stored.stats_mut("B").play_count = 6;
        stored.custom_playlists.push(CustomPlaylist {
            name: "Mix".to_string(),
            tracks: vec!["B".to_string()],
            created_at: 1,
        });
        store.put(Collection::Folders, &folder_id, &stored).await.unwrap();

        let mut history = GlobalHistoryRecord::default();
        history.tracks.insert(
            GlobalHistoryRecord::entry_key(&folder_id, "B"),
            GlobalTrackEntry {
                track_name: "B".to_string(),
                folder_id: folder_id.clone(),
                folder_name: "Album".to_string(),
                play_count: 6,
                total_play_time: 600.0,
                last_played: 1,
            },
        );
        history.total_plays = 6;
        store.put(Collection::History, SINGLETON_KEY, &history).await.unwrap();

        let playback = PlaybackState {
            current_index: 1,
            current_time: 12.0,
            volume: 0.9,
            is_shuffle: false,
            is_repeat: true,
        };
        let document = export_document(&store, &files, "Album", &playback).await.unwrap();

        assert_eq!(document.folder_data.favorites, vec!["B"]);
        assert_eq!(document.folder_data.track_stats["B"].play_count, 6);
        assert_eq!(document.folder_data.custom_playlists.len(), 1);
        assert_eq!(document.folder_data.last_played_track_index, 1);
        assert_eq!(document.folder_data.is_repeat, Some(true));
        assert_eq!(document.global_history.total_plays, 6);
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());
        let folder_id = derive_folder_id("Album", &["A", "B"]);
        let mut stored = FolderRecord::fresh(&folder_id, "Album", 2);
        stored.favorites = vec!["A".to_string()];
        stored.stats_mut("A").play_count = 2;
        stored.stats_mut("B").queue_count = 1;
        store.put(Collection::Folders, &folder_id, &stored).await.unwrap();

        let exported_files = files(&["A", "B"]);
        let playback = PlaybackState {
            current_index: 1,
            ..PlaybackState::initial(2, 1.0)
        };
        let document = export_document(&store, &exported_files, "Album", &playback)
            .await
            .unwrap();
        let text = serde_json::to_string(&document).unwrap();

        let rescanned = files(&["B", "A"]);
        let imported = import_document(&text, &rescanned).unwrap();

        assert_eq!(imported.folder_data.favorites, document.folder_data.favorites);
        assert_eq!(imported.folder_data.track_stats, document.folder_data.track_stats);
        assert_eq!(imported.folder_data.last_played_track_index, 1);
        assert_eq!(
            imported.global_history.unwrap().total_plays,
            document.global_history.total_plays
        );
    }
}
