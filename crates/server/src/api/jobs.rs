//! Job API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use listgrab_core::{ControllerError, DownloadRequest, JobState};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Response for a started job
#[derive(Debug, Serialize)]
pub struct StartJobResponse {
    pub job_id: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
    /// The job holding the slot, on 409 from `POST /jobs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

type ErrorReply = (StatusCode, Json<JobErrorResponse>);

fn error_reply(status: StatusCode, error: impl Into<String>) -> ErrorReply {
    (
        status,
        Json(JobErrorResponse {
            error: error.into(),
            job_id: None,
        }),
    )
}

impl From<ControllerError> for JobErrorResponse {
    fn from(err: ControllerError) -> Self {
        let job_id = match &err {
            ControllerError::AlreadyRunning { job_id } => Some(job_id.clone()),
            _ => None,
        };
        Self {
            error: err.to_string(),
            job_id,
        }
    }
}

fn controller_error(err: ControllerError) -> ErrorReply {
    let status = match err {
        ControllerError::AlreadyRunning { .. } | ControllerError::NotRunning(_) => {
            StatusCode::CONFLICT
        }
        ControllerError::NotFound(_) => StatusCode::NOT_FOUND,
        ControllerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(JobErrorResponse::from(err)))
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a download job
pub async fn start_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DownloadRequest>,
) -> Result<(StatusCode, Json<StartJobResponse>), ErrorReply> {
    let job_id = state
        .controller()
        .start(request)
        .await
        .map_err(controller_error)?;

    Ok((StatusCode::CREATED, Json(StartJobResponse { job_id })))
}

/// Get the latest job, running or not
pub async fn current_job(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobState>, ErrorReply> {
    state
        .controller()
        .current()
        .await
        .map(Json)
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "No job has been started"))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobState>, ErrorReply> {
    state
        .controller()
        .status(&id)
        .await
        .map(Json)
        .map_err(controller_error)
}

/// Cancel a running job. Answers once the job stopped or the grace period ran out.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobState>, ErrorReply> {
    let controller = state.controller();
    controller.cancel(&id).await.map_err(controller_error)?;
    info!("Cancel request for job {} handled", id);

    controller.status(&id).await.map(Json).map_err(controller_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_error_status() {
        let (status, Json(body)) = controller_error(ControllerError::AlreadyRunning {
            job_id: "abc".to_string(),
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.job_id.as_deref(), Some("abc"));

        let (status, _) = controller_error(ControllerError::NotRunning("abc".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, Json(body)) = controller_error(ControllerError::NotFound("abc".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.job_id.is_none());

        let (status, _) =
            controller_error(ControllerError::InvalidRequest("bad url".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
