//! Stored folders, global history and settings.

use actix_web::{delete, get, put, web, HttpResponse};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{AppState, FolderRecord};
use crate::persistence::history::load_history;
use crate::persistence::settings::{load_settings, update_settings, SettingsUpdate};
use crate::store::Collection;

/// List every remembered folder, most recently opened first.
///
/// GET /api/folders
#[get("/api/folders")]
pub async fn list_folders(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let mut folders: Vec<FolderRecord> = data.store.get_all(Collection::Folders).await?;
    folders.sort_by(|a, b| b.last_opened.cmp(&a.last_opened));

    Ok(HttpResponse::Ok().json(folders))
}

/// Forget a folder.
///
/// DELETE /api/folders/{id}
#[delete("/api/folders/{id}")]
pub async fn delete_folder(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let folder_id = path.into_inner();

    if !data.store.delete(Collection::Folders, &folder_id).await? {
        return Err(AppError::NotFound(format!("Folder not found: {}", folder_id)));
    }

    tracing::info!(folder_id = %folder_id, "Deleted folder record");
    Ok(HttpResponse::NoContent().finish())
}

/// Cross-folder play history.
///
/// GET /api/history
#[get("/api/history")]
pub async fn get_history(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(load_history(&data.store).await?))
}

/// GET /api/settings
#[get("/api/settings")]
pub async fn get_settings(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(load_settings(&data.store).await?))
}

/// Update theme and default volume.
///
/// PUT /api/settings
#[put("/api/settings")]
pub async fn put_settings(
    data: web::Data<AppState>,
    body: web::Json<SettingsUpdate>,
) -> AppResult<HttpResponse> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let settings = update_settings(&data.store, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(settings))
}

/// Erase all stored data. The open folder is closed first so no pending
/// save can write into the emptied store.
///
/// DELETE /api/data
#[delete("/api/data")]
pub async fn clear_data(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    data.session.close();
    data.store.clear().await?;

    tracing::warn!("Cleared all stored data");
    Ok(HttpResponse::NoContent().finish())
}

/// Configure library routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_folders)
        .service(delete_folder)
        .service(get_history)
        .service(get_settings)
        .service(put_settings)
        .service(clear_data);
}
