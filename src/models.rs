//! Persistent records and the ephemeral scan model.
//!
//! Field names serialize in camelCase so stored records and export documents
//! share one wire shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::session::Session;
use crate::store::LocalStore;

/// Maximum length of `FolderRecord::recently_played`.
pub const RECENTLY_PLAYED_LIMIT: usize = 50;

/// Maximum length of `GlobalSettingsRecord::recent_folders`.
pub const RECENT_FOLDERS_LIMIT: usize = 10;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Directory under which folders are opened.
    pub music_root: PathBuf,
    pub store: Arc<LocalStore>,
    pub session: Arc<Session>,
}

/// Current wall-clock time as integer milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Per-track counters scoped to one folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStats {
    pub track_name: String,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub queue_count: u64,
    #[serde(default)]
    pub last_played: Option<i64>,
}

impl TrackStats {
    pub fn new(track_name: impl Into<String>) -> Self {
        Self {
            track_name: track_name.into(),
            play_count: 0,
            queue_count: 0,
            last_played: None,
        }
    }
}

/// A named, ordered list of track names. Carried through storage and export
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPlaylist {
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
}

/// Everything remembered about one folder identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderRecord {
    pub folder_id: String,
    pub folder_name: String,
    pub last_opened: i64,
    pub last_played_track_index: i64,
    pub last_played_position: f64,
    pub last_played_timestamp: i64,
    /// Liked track display names, unique.
    pub favorites: Vec<String>,
    /// `None` until a save records the live value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_shuffle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_repeat: Option<bool>,
    pub custom_playlists: Vec<CustomPlaylist>,
    /// Most recent first, deduplicated, capped at [`RECENTLY_PLAYED_LIMIT`].
    pub recently_played: Vec<String>,
    pub track_stats: HashMap<String, TrackStats>,
}

impl Default for FolderRecord {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            folder_name: String::new(),
            last_opened: 0,
            last_played_track_index: -1,
            last_played_position: 0.0,
            last_played_timestamp: 0,
            favorites: Vec::new(),
            volume: None,
            is_shuffle: None,
            is_repeat: None,
            custom_playlists: Vec::new(),
            recently_played: Vec::new(),
            track_stats: HashMap::new(),
        }
    }
}

impl FolderRecord {
    /// A never-seen folder: no favorites, no stats, positioned on the first
    /// track if there is one.
    pub fn fresh(folder_id: &str, folder_name: &str, track_count: usize) -> Self {
        Self {
            folder_id: folder_id.to_string(),
            folder_name: folder_name.to_string(),
            last_opened: now_ms(),
            last_played_track_index: if track_count > 0 { 0 } else { -1 },
            ..Self::default()
        }
    }

    /// Move `track_name` to the front of the recently played list.
    pub fn push_recently_played(&mut self, track_name: &str) {
        self.recently_played.retain(|name| name != track_name);
        self.recently_played.insert(0, track_name.to_string());
        self.recently_played.truncate(RECENTLY_PLAYED_LIMIT);
    }

    /// Stats entry for `track_name`, created on first use.
    pub fn stats_mut(&mut self, track_name: &str) -> &mut TrackStats {
        self.track_stats
            .entry(track_name.to_string())
            .or_insert_with(|| TrackStats::new(track_name))
    }
}

/// One track's aggregate across every folder it was played from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTrackEntry {
    pub track_name: String,
    pub folder_id: String,
    pub folder_name: String,
    #[serde(default)]
    pub play_count: u64,
    /// Seconds.
    #[serde(default)]
    pub total_play_time: f64,
    #[serde(default)]
    pub last_played: i64,
}

/// Play history across all folders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalHistoryRecord {
    /// Keyed by [`GlobalHistoryRecord::entry_key`].
    pub tracks: HashMap<String, GlobalTrackEntry>,
    pub total_plays: u64,
    pub last_updated: i64,
}

impl GlobalHistoryRecord {
    /// Composite key of a track within a folder.
    pub fn entry_key(folder_id: &str, track_name: &str) -> String {
        format!("{}_{}", folder_id, track_name)
    }
}

/// A folder in the recent-folders list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFolder {
    pub folder_id: String,
    pub folder_name: String,
    pub last_opened: i64,
}

/// User preferences shared by all folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettingsRecord {
    pub theme: String,
    pub default_volume: f64,
    /// Most recent first, deduplicated by folder id, capped at
    /// [`RECENT_FOLDERS_LIMIT`].
    pub recent_folders: Vec<RecentFolder>,
}

impl Default for GlobalSettingsRecord {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            default_volume: 0.7,
            recent_folders: Vec::new(),
        }
    }
}

impl GlobalSettingsRecord {
    /// Record that a folder was just opened.
    pub fn push_recent_folder(&mut self, folder: RecentFolder) {
        self.recent_folders
            .retain(|existing| existing.folder_id != folder.folder_id);
        self.recent_folders.insert(0, folder);
        self.recent_folders.truncate(RECENT_FOLDERS_LIMIT);
    }
}

/// A track found by the latest folder scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFile {
    /// Unique within one scan only.
    pub id: Uuid,
    /// File name without extension. This is the track's identity within its
    /// folder.
    pub name: String,
    #[serde(skip)]
    pub src: PathBuf,
    pub liked: bool,
}

impl AudioFile {
    pub fn new(name: impl Into<String>, src: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            src,
            liked: false,
        }
    }
}

/// Track names of a scan, in scan order.
pub fn track_names(files: &[AudioFile]) -> Vec<String> {
    files.iter().map(|f| f.name.clone()).collect()
}
