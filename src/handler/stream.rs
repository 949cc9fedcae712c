use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use restream_core::{
    model::{CreateStream, SaveProgram, StreamDefinition, StreamProgram, UpdateStream},
    service::StreamStats,
};
use uuid::Uuid;

use crate::{api::AppState, handler::ApiJsonResult};

pub fn stream_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_streams).post(create_stream))
        .route("/{id}", get(get_stream).post(update_stream))
        .route("/{id}/delete", post(delete_stream))
        .route("/{id}/start", post(start_stream))
        .route("/{id}/stop", post(stop_stream))
        .route("/{id}/stats", get(stream_stats))
        .route("/{id}/program", get(get_program).post(save_program))
}

async fn list_streams(State(state): State<AppState>) -> ApiJsonResult<Vec<StreamDefinition>> {
    Ok(Json(state.service.list_streams().await?))
}

async fn create_stream(
    State(state): State<AppState>,
    Json(req): Json<CreateStream>,
) -> ApiJsonResult<StreamDefinition> {
    Ok(Json(state.service.create_stream(req).await?))
}

async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiJsonResult<StreamDefinition> {
    Ok(Json(state.service.get_stream(id).await?))
}

async fn update_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStream>,
) -> ApiJsonResult<StreamDefinition> {
    Ok(Json(state.service.update_stream(id, req).await?))
}

async fn delete_stream(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiJsonResult<bool> {
    state.service.delete_stream(id).await?;
    Ok(Json(true))
}

async fn start_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiJsonResult<StreamStats> {
    state.service.start_stream(id).await?;
    Ok(Json(state.service.stream_stats(id).await))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiJsonResult<StreamStats> {
    state.service.stop_stream(id).await?;
    Ok(Json(state.service.stream_stats(id).await))
}

async fn stream_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiJsonResult<StreamStats> {
    Ok(Json(state.service.stream_stats(id).await))
}

async fn get_program(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiJsonResult<StreamProgram> {
    Ok(Json(state.service.get_program(id).await?))
}

async fn save_program(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveProgram>,
) -> ApiJsonResult<StreamProgram> {
    Ok(Json(state.service.save_program(id, req).await?))
}
