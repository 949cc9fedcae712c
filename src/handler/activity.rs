use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use restream_core::activity::{ActivityEntry, LogLevel, Page};
use serde::Deserialize;

use crate::{api::AppState, handler::ApiJsonResult};

pub fn activity_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_activity))
        .route("/page", get(page_activity))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    limit: usize,
    /// Only entries of this level; free-form names are normalized.
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: usize,
    #[serde(default)]
    per_page: usize,
}

async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiJsonResult<Vec<ActivityEntry>> {
    let mut entries = state.activity.list(query.limit);
    if let Some(level) = query.level.as_deref() {
        let level = LogLevel::normalize(level);
        entries.retain(|e| e.level == level);
    }
    Ok(Json(entries))
}

async fn page_activity(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiJsonResult<Page<ActivityEntry>> {
    Ok(Json(state.activity.page(query.page, query.per_page)))
}
