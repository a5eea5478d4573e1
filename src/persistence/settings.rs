//! Global settings and the recent-folders list.

use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::models::{now_ms, GlobalSettingsRecord, RecentFolder};
use crate::store::{Collection, LocalStore, SINGLETON_KEY};

/// Partial settings update. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[validate(length(min = 1, max = 32, message = "Theme must be 1-32 characters"))]
    pub theme: Option<String>,
    #[validate(range(min = 0.0, max = 1.0, message = "Default volume must be between 0 and 1"))]
    pub default_volume: Option<f64>,
}

/// Stored settings, or defaults if none were ever saved.
pub async fn load_settings(store: &LocalStore) -> AppResult<GlobalSettingsRecord> {
    Ok(store
        .get(Collection::Settings, SINGLETON_KEY)
        .await?
        .unwrap_or_default())
}

/// Apply a validated update and persist it.
pub async fn update_settings(
    store: &LocalStore,
    update: SettingsUpdate,
) -> AppResult<GlobalSettingsRecord> {
    let mut settings = load_settings(store).await?;
    if let Some(theme) = update.theme {
        settings.theme = theme;
    }
    if let Some(volume) = update.default_volume {
        settings.default_volume = volume;
    }

    store.put(Collection::Settings, SINGLETON_KEY, &settings).await?;
    tracing::info!(theme = %settings.theme, default_volume = settings.default_volume, "Updated settings");
    Ok(settings)
}

/// Put a folder at the front of the recent-folders list.
pub async fn remember_folder(
    store: &LocalStore,
    folder_id: &str,
    folder_name: &str,
) -> AppResult<GlobalSettingsRecord> {
    let mut settings = load_settings(store).await?;
    settings.push_recent_folder(RecentFolder {
        folder_id: folder_id.to_string(),
        folder_name: folder_name.to_string(),
        last_opened: now_ms(),
    });

    store.put(Collection::Settings, SINGLETON_KEY, &settings).await?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RECENT_FOLDERS_LIMIT;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_defaults_when_absent() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());

        let settings = load_settings(&store).await.unwrap();

        assert_eq!(settings, GlobalSettingsRecord::default());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());

        update_settings(
            &store,
            SettingsUpdate {
                theme: Some("light".to_string()),
                default_volume: None,
            },
        )
        .await
        .unwrap();
        let settings = update_settings(
            &store,
            SettingsUpdate {
                theme: None,
                default_volume: Some(0.3),
            },
        )
        .await
        .unwrap();

        assert_eq!(settings.theme, "light");
        assert_eq!(settings.default_volume, 0.3);
        assert_eq!(load_settings(&store).await.unwrap(), settings);
    }

    #[test]
    fn test_update_validation() {
        let update = SettingsUpdate {
            theme: Some(String::new()),
            default_volume: Some(1.5),
        };
        let errors = update.validate().unwrap_err();

        assert!(errors.field_errors().contains_key("theme"));
        assert!(errors.field_errors().contains_key("default_volume"));
    }

    #[tokio::test]
    async fn test_remember_folder_caps_and_moves_to_front() {
        let dir = tempdir().unwrap();
        let store = LocalStore::json(dir.path());

        for i in 0..15 {
            remember_folder(&store, &format!("folder_{}", i), &format!("F{}", i))
                .await
                .unwrap();
        }
        let settings = remember_folder(&store, "folder_7", "F7").await.unwrap();

        assert_eq!(settings.recent_folders.len(), RECENT_FOLDERS_LIMIT);
        assert_eq!(settings.recent_folders[0].folder_id, "folder_7");
        assert_eq!(settings.recent_folders[1].folder_id, "folder_14");
    }
}
