use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use restream_core::{PipelineError, ServiceError};
use serde_json::json;

pub mod activity;
pub mod events;
pub mod library;
pub mod stream;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ApiJsonResult<T> = ApiResult<Json<T>>;

pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: anyhow::anyhow!(message.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("ApiError: {:?}", self.error);
        } else {
            log::debug!("ApiError: {}", self.error);
        }
        (
            self.status,
            Json(json!({ "error": format!("{:#}", self.error) })),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        Self {
            status: status_for(&error),
            error,
        }
    }
}

fn status_for(error: &anyhow::Error) -> StatusCode {
    if let Some(e) = error.downcast_ref::<ServiceError>() {
        return match e {
            ServiceError::StreamNotFound => StatusCode::NOT_FOUND,
            ServiceError::ProgramEmpty | ServiceError::InvalidProgram(_) => StatusCode::BAD_REQUEST,
            ServiceError::Pipeline(p) => pipeline_status(p),
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
    }
    if let Some(e) = error.downcast_ref::<PipelineError>() {
        return pipeline_status(e);
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

fn pipeline_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::AlreadyRunning(_) => StatusCode::CONFLICT,
        PipelineError::MediaNotFound { .. } | PipelineError::Command(_) => StatusCode::BAD_REQUEST,
        PipelineError::ReloadStart(inner) | PipelineError::ReloadStop(inner) => {
            pipeline_status(inner)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApiError::from(ServiceError::StreamNotFound).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ServiceError::Pipeline(PipelineError::AlreadyRunning(id))).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ServiceError::InvalidProgram("empty")).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PipelineError::ReloadStart(Box::new(
                PipelineError::AlreadyRunning(id)
            )))
            .status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(PipelineError::VacateTimeout(id)).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
