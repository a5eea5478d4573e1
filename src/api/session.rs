//! Open-folder session endpoints.

use actix_files::NamedFile;
use actix_web::{delete, get, http::header, post, put, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::library::{sanitize_folder_name, scan_folder, EXPORT_FILENAME};
use crate::models::AppState;
use crate::session::StateUpdate;

/// Largest accepted import document.
const IMPORT_LIMIT_BYTES: usize = 8 * 1024 * 1024;

/// Request body for opening a folder.
#[derive(Debug, Deserialize, Validate)]
pub struct OpenFolderRequest {
    /// Folder name relative to the music root.
    #[validate(length(min = 1, max = 255, message = "Folder must be 1-255 characters"))]
    pub folder: String,
}

/// Request body for a completed play.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    /// Seconds listened.
    #[validate(range(min = 0.0, message = "Play time cannot be negative"))]
    pub play_time: f64,
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation(e.to_string())
}

/// Open a folder: scan it and restore its remembered state.
///
/// POST /api/session/open
#[post("/open")]
pub async fn open_folder(
    data: web::Data<AppState>,
    body: web::Json<OpenFolderRequest>,
) -> AppResult<HttpResponse> {
    body.validate().map_err(validation_error)?;
    let folder_name = sanitize_folder_name(&body.folder)?.to_string();

    let path = data.music_root.join(&folder_name);
    let scan = web::block(move || scan_folder(&path))
        .await
        .map_err(|e| AppError::Internal(format!("Scan task failed: {}", e)))??;

    let view = data.session.open(&folder_name, scan).await;

    tracing::info!(
        folder = %folder_name,
        folder_id = %view.folder_id,
        tracks = view.tracks.len(),
        "Opened folder"
    );

    Ok(HttpResponse::Ok().json(view))
}

/// Current playback state of the open folder.
///
/// GET /api/session
#[get("")]
pub async fn get_session(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(data.session.view()?))
}

/// Close the open folder. Pending saves are discarded.
///
/// DELETE /api/session
#[delete("")]
pub async fn close_session(data: web::Data<AppState>) -> HttpResponse {
    data.session.close();
    HttpResponse::NoContent().finish()
}

/// Update index, position, volume, shuffle or repeat.
///
/// PUT /api/session/state
///
/// The change is saved after input has been quiet for the debounce delay.
#[put("/state")]
pub async fn update_state(
    data: web::Data<AppState>,
    body: web::Json<StateUpdate>,
) -> AppResult<HttpResponse> {
    body.validate().map_err(validation_error)?;
    let view = data.session.update_state(body.into_inner())?;
    Ok(HttpResponse::Accepted().json(view))
}

/// Toggle the liked flag of a track.
///
/// POST /api/session/tracks/{index}/like
#[post("/tracks/{index}/like")]
pub async fn toggle_like(
    data: web::Data<AppState>,
    path: web::Path<usize>,
) -> AppResult<HttpResponse> {
    let liked = data.session.toggle_like(path.into_inner())?;
    Ok(HttpResponse::Accepted().json(serde_json::json!({ "liked": liked })))
}

/// Record a completed play.
///
/// POST /api/session/tracks/{index}/play
#[post("/tracks/{index}/play")]
pub async fn record_play(
    data: web::Data<AppState>,
    path: web::Path<usize>,
    body: web::Json<PlayRequest>,
) -> AppResult<HttpResponse> {
    body.validate().map_err(validation_error)?;
    let outcome = data
        .session
        .record_play(path.into_inner(), body.play_time)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Record that a track was added to the queue.
///
/// POST /api/session/tracks/{index}/queue
///
/// Returns 204 when the folder has no history yet.
#[post("/tracks/{index}/queue")]
pub async fn record_queue(
    data: web::Data<AppState>,
    path: web::Path<usize>,
) -> AppResult<HttpResponse> {
    match data.session.record_queue(path.into_inner()).await? {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

/// Stream a track of the open folder.
///
/// GET /api/session/tracks/{index}/stream
///
/// Supports range requests for seeking.
#[get("/tracks/{index}/stream")]
pub async fn stream_track(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<usize>,
) -> AppResult<HttpResponse> {
    let index = path.into_inner();
    let file_path = data.session.track_path(index)?;

    if !file_path.exists() {
        return Err(AppError::track_not_found(index));
    }

    let file = NamedFile::open(&file_path)?;
    Ok(file.into_response(&req))
}

/// Download the open folder's data with the global history.
///
/// GET /api/session/export
#[get("/export")]
pub async fn export(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let document = data.session.export().await?;

    Ok(HttpResponse::Ok()
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
        ))
        .json(document))
}

/// Import an export document into the open folder.
///
/// POST /api/session/import
///
/// The body is the document text. A rejected document leaves everything as
/// it was and answers 400.
#[post("/import")]
pub async fn import(data: web::Data<AppState>, body: String) -> AppResult<HttpResponse> {
    let view = data.session.import(&body).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Configure session routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/session")
            .app_data(web::PayloadConfig::new(IMPORT_LIMIT_BYTES))
            .service(open_folder)
            .service(get_session)
            .service(close_session)
            .service(update_state)
            .service(toggle_like)
            .service(record_play)
            .service(record_queue)
            .service(stream_track)
            .service(export)
            .service(import),
    );
}
