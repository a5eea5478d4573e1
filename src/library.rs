//! Folder scanning: the audio files of one folder plus an optional export
//! document shipped alongside them.

use std::fs;
use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::models::AudioFile;

/// File name of an export document that is picked up automatically when a
/// folder is opened.
pub const EXPORT_FILENAME: &str = "folio-export.json";

/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "wma", "opus", "aiff", "ape",
];

/// Result of scanning a folder.
#[derive(Debug)]
pub struct FolderScan {
    /// Audio files sorted by file name.
    pub files: Vec<AudioFile>,
    /// Contents of [`EXPORT_FILENAME`], if the folder has one.
    pub export_document: Option<String>,
}

/// Validate a folder name relative to the music root.
///
/// Returns an error if the name could escape the root.
pub fn sanitize_folder_name(name: &str) -> AppResult<&str> {
    let name = name.trim();

    if name.is_empty() {
        return Err(AppError::BadRequest("Folder name cannot be empty".to_string()));
    }

    if name.contains("..") || name.contains('/') || name.contains('\\') {
        tracing::warn!(folder = %name, "Path traversal attempt blocked");
        return Err(AppError::path_traversal());
    }

    // Reject absolute paths (Windows drive letters)
    if name.chars().nth(1) == Some(':') {
        return Err(AppError::path_traversal());
    }

    Ok(name)
}

/// Check if a file has a supported audio extension.
fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Display name of a track: the file name without its extension.
fn display_name(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Scan one folder, non-recursively.
pub fn scan_folder(folder: &Path) -> AppResult<FolderScan> {
    if !folder.is_dir() {
        return Err(AppError::NotFound(format!(
            "Folder not found: {}",
            folder.display()
        )));
    }

    let mut paths: Vec<_> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_audio_file(path))
        .collect();
    paths.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));

    let files: Vec<AudioFile> = paths
        .into_iter()
        .filter_map(|path| display_name(&path).map(|name| AudioFile::new(name, path)))
        .collect();

    let export_path = folder.join(EXPORT_FILENAME);
    let export_document = if export_path.is_file() {
        match fs::read_to_string(&export_path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(path = %export_path.display(), error = %e, "Could not read export document");
                None
            }
        }
    } else {
        None
    };

    tracing::debug!(
        folder = %folder.display(),
        tracks = files.len(),
        has_export = export_document.is_some(),
        "Scanned folder"
    );

    Ok(FolderScan {
        files,
        export_document,
    })
}
