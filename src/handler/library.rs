//! Videos and platform accounts the streams draw on.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use restream_core::{destination::Platform, model::Video};
use restream_db::platform::PlatformCreate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::AppState,
    handler::{ApiError, ApiJsonResult},
};

pub fn video_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_videos).post(register_video))
        .route("/{id}/delete", post(delete_video))
}

pub fn platform_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_platforms).post(create_platform))
        .route("/destinations", get(platform_destinations))
        .route("/{id}/delete", post(delete_platform))
}

#[derive(Debug, Deserialize)]
struct VideoRegister {
    filename: String,
    #[serde(default)]
    original_name: String,
}

async fn list_videos(State(state): State<AppState>) -> ApiJsonResult<Vec<Video>> {
    let conn = state.db.connect()?;
    Ok(Json(restream_db::video::query_all(&conn).await?))
}

/// Registers a file already present in the upload directory.
async fn register_video(
    State(state): State<AppState>,
    Json(req): Json<VideoRegister>,
) -> ApiJsonResult<Video> {
    let filename = req.filename.trim();
    let plain = std::path::Path::new(filename)
        .file_name()
        .is_some_and(|name| name == filename);
    if !plain {
        return Err(ApiError::bad_request("filename must not contain a path"));
    }

    let metadata = tokio::fs::metadata(state.upload_dir.join(filename))
        .await
        .map_err(|_| ApiError::not_found(format!("{} is not in the upload directory", filename)))?;

    let original_name = match req.original_name.trim() {
        "" => filename,
        name => name,
    };
    let conn = state.db.connect()?;
    let video = restream_db::video::insert(filename, original_name, metadata.len(), &conn).await?;
    Ok(Json(video))
}

async fn delete_video(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiJsonResult<bool> {
    let conn = state.db.connect()?;
    Ok(Json(restream_db::video::delete(id, &conn).await?))
}

async fn list_platforms(State(state): State<AppState>) -> ApiJsonResult<Vec<Platform>> {
    let conn = state.db.connect()?;
    Ok(Json(restream_db::platform::query_all(&conn).await?))
}

async fn create_platform(
    State(state): State<AppState>,
    Json(req): Json<PlatformCreate>,
) -> ApiJsonResult<Platform> {
    let conn = state.db.connect()?;
    let platform = restream_db::platform::insert(&req, &conn)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(platform))
}

async fn platform_destinations(State(state): State<AppState>) -> ApiJsonResult<Vec<String>> {
    let conn = state.db.connect()?;
    Ok(Json(restream_db::platform::enabled_destinations(&conn).await?))
}

async fn delete_platform(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiJsonResult<bool> {
    let conn = state.db.connect()?;
    Ok(Json(restream_db::platform::delete(id, &conn).await?))
}
