//! Live playback state and its write-back to the folder record.

use serde::{Deserialize, Serialize};

use super::identity::derive_folder_id;
use crate::error::AppResult;
use crate::models::{now_ms, track_names, AudioFile, FolderRecord};
use crate::store::{Collection, LocalStore};

/// Player state that changes continuously while a folder is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Index into the scanned track list, `-1` when the folder is empty.
    pub current_index: i64,
    /// Seconds into the current track.
    pub current_time: f64,
    pub volume: f64,
    pub is_shuffle: bool,
    pub is_repeat: bool,
}

impl PlaybackState {
    /// Starting state for a folder with nothing remembered.
    pub fn initial(track_count: usize, volume: f64) -> Self {
        Self {
            current_index: if track_count > 0 { 0 } else { -1 },
            current_time: 0.0,
            volume,
            is_shuffle: false,
            is_repeat: false,
        }
    }
}

/// Favorites as currently shown: liked files, first occurrence of each name.
pub fn liked_names(files: &[AudioFile]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for file in files.iter().filter(|f| f.liked) {
        if !names.contains(&file.name) {
            names.push(file.name.clone());
        }
    }
    names
}

/// Write the live state into the folder's record.
///
/// Fields the live state does not carry (stats, recently played, playlists)
/// are kept from the stored record.
pub async fn save_state(
    store: &LocalStore,
    folder_name: &str,
    files: &[AudioFile],
    playback: &PlaybackState,
) -> AppResult<FolderRecord> {
    let folder_id = derive_folder_id(folder_name, &track_names(files));
    let now = now_ms();

    let mut record = store
        .get::<FolderRecord>(Collection::Folders, &folder_id)
        .await?
        .unwrap_or_else(|| FolderRecord::fresh(&folder_id, folder_name, files.len()));

    record.folder_name = folder_name.to_string();
    record.last_opened = now;
    record.last_played_track_index = playback.current_index;
    record.last_played_position = playback.current_time;
    record.last_played_timestamp = now;
    record.favorites = liked_names(files);
    record.volume = Some(playback.volume);
    record.is_shuffle = Some(playback.is_shuffle);
    record.is_repeat = Some(playback.is_repeat);

    store.put(Collection::Folders, &folder_id, &record).await?;

    tracing::debug!(
        folder_id = %folder_id,
        index = playback.current_index,
        position = playback.current_time,
        "Saved playback state"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackStats;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn files(names: &[&str]) -> Vec<AudioFile> {
        names
            .iter()
            .map(|name| AudioFile::new(*name, PathBuf::from(format!("{}.mp3", name))))
            .collect()
    }

    #[test]
    fn test_liked_names_unique() {
        let mut files = files(&["A", "B", "A"]);
        files[0].liked = true;
        files[2].liked = true;

        assert_eq!(liked_names(&files), vec!["A"]);
    }

    #[tokio::test]
    async fn test_save_creates_record() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());
        let mut files = files(&["A", "B"]);
        files[1].liked = true;
        let playback = PlaybackState {
            current_index: 1,
            current_time: 42.5,
            volume: 0.4,
            is_shuffle: true,
            is_repeat: false,
        };

        let record = save_state(&store, "Album", &files, &playback).await.unwrap();

        assert_eq!(record.folder_id, derive_folder_id("Album", &["A", "B"]));
        assert_eq!(record.favorites, vec!["B"]);
        assert_eq!(record.last_played_track_index, 1);
        assert_eq!(record.last_played_position, 42.5);
        assert_eq!(record.volume, Some(0.4));
        assert_eq!(record.is_shuffle, Some(true));
    }

    #[tokio::test]
    async fn test_save_preserves_stats_and_recent() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());
        let files = files(&["A", "B"]);
        let folder_id = derive_folder_id("Album", &["A", "B"]);

        let mut existing = FolderRecord::fresh(&folder_id, "Album", 2);
        existing.track_stats.insert(
            "A".to_string(),
            TrackStats {
                play_count: 3,
                ..TrackStats::new("A")
            },
        );
        existing.push_recently_played("A");
        existing.favorites = vec!["A".to_string()];
        store.put(Collection::Folders, &folder_id, &existing).await.unwrap();

        let record = save_state(&store, "Album", &files, &PlaybackState::initial(2, 1.0))
            .await
            .unwrap();

        assert_eq!(record.track_stats["A"].play_count, 3);
        assert_eq!(record.recently_played, vec!["A"]);
        // Favorites follow the live liked flags.
        assert!(record.favorites.is_empty());
    }
}
