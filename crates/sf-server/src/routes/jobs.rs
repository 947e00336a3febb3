//! Video job routes: create, status, result and download.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use sf_core::config::RenderConfig;
use sf_core::events::EventPayload;
use sf_core::{
    CameraMotion, Error, ErrorCode, JobId, JobStatus, MAX_SEED, MAX_VIDEO_DURATION_SECS,
    MIN_VIDEO_DURATION_SECS,
};
use sf_db::queries::{job_records, tasks};
use sf_db::{JobRecord, NewVideoJob, RetryPolicy};
use sf_pipeline::{plan_durations, SegmentBounds, VideoJobRequest};
use sf_storage::public_url;

use crate::context::AppContext;
use crate::error::AppError;
use crate::worker::GENERATE_VIDEO_TASK;

use super::parse_job_id;

const MAX_STYLE_CHARS: usize = 64;

fn default_bgm() -> bool {
    true
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateJobRequest {
    pub upload_job_id: JobId,
    pub duration_seconds: u32,
    pub style: String,
    #[serde(default = "default_bgm")]
    pub bgm_enabled: bool,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default)]
    pub camera_motion: Option<CameraMotion>,
    #[serde(default)]
    pub subject_lock: Option<bool>,
}

impl CreateJobRequest {
    /// Reject anything the planner would refuse once the job is running.
    fn validate(&self, render: &RenderConfig) -> sf_core::Result<()> {
        if !(MIN_VIDEO_DURATION_SECS..=MAX_VIDEO_DURATION_SECS).contains(&self.duration_seconds) {
            return Err(Error::Validation(format!(
                "duration_seconds must be between {MIN_VIDEO_DURATION_SECS} and {MAX_VIDEO_DURATION_SECS}"
            )));
        }
        let style_len = self.style.chars().count();
        if style_len == 0 || style_len > MAX_STYLE_CHARS {
            return Err(Error::Validation(format!(
                "style must be 1 to {MAX_STYLE_CHARS} characters"
            )));
        }
        if matches!(self.seed, Some(seed) if !(1..=MAX_SEED).contains(&seed)) {
            return Err(Error::Validation(format!(
                "seed must be between 1 and {MAX_SEED}"
            )));
        }
        plan_durations(self.duration_seconds, SegmentBounds::from_config(render))?;
        Ok(())
    }

    fn to_params(&self) -> NewVideoJob {
        NewVideoJob {
            duration_seconds: self.duration_seconds,
            style: self.style.clone(),
            bgm_enabled: self.bgm_enabled,
            seed: self.seed,
            camera_motion: self.camera_motion,
            subject_lock: self.subject_lock,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl From<&JobRecord> for JobStatusResponse {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id,
            status: record.status,
            progress: record.progress,
            error_code: record.error_code,
            error_message: record.error_message.clone(),
            retryable: record.retryable,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResultResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result_object: String,
    pub result_url: String,
}

/// POST /api/jobs
#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Video job queued", body = CreateJobResponse),
        (status = 400, description = "Invalid parameters"),
        (status = 404, description = "Upload job not found")
    )
)]
pub async fn create_job(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate(&ctx.config.render)?;

    let conn = sf_db::get_conn(&ctx.db)?;
    let record = job_records::create_video_job(&conn, req.upload_job_id, &req.to_params())?;

    let payload = serde_json::to_value(VideoJobRequest::from_record(&record)?)
        .map_err(|e| Error::Internal(format!("failed to encode task payload: {e}")))?;
    let policy = RetryPolicy {
        max_retries: ctx.config.worker.max_retries,
        backoff_secs: ctx.config.worker.backoff_secs.clone(),
    };
    tasks::enqueue(
        &conn,
        GENERATE_VIDEO_TASK,
        record.id,
        &payload,
        ctx.config.render.job_timeout_secs,
        &policy,
    )?;

    tracing::info!(
        job_id = %record.id,
        upload_job_id = %req.upload_job_id,
        duration_seconds = req.duration_seconds,
        "video job queued"
    );
    ctx.event_bus.broadcast(EventPayload::JobQueued {
        job_id: record.id,
        duration_seconds: req.duration_seconds,
    });

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: record.id,
            status: record.status,
        }),
    ))
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job_id = parse_job_id(&id)?;
    let conn = sf_db::get_conn(&ctx.db)?;
    let record = job_records::require_job(&conn, job_id)?;
    Ok(Json(JobStatusResponse::from(&record)))
}

/// Load a job and return its result key, or 409 unless it succeeded.
fn require_result(ctx: &AppContext, id: &str) -> sf_core::Result<(JobRecord, String)> {
    let job_id = parse_job_id(id)?;
    let conn = sf_db::get_conn(&ctx.db)?;
    let record = job_records::require_job(&conn, job_id)?;

    if record.status != JobStatus::Succeeded {
        return Err(Error::Conflict(format!(
            "job {job_id} is {}, not succeeded",
            record.status
        )));
    }
    let key = record
        .result_object
        .clone()
        .ok_or_else(|| Error::Internal(format!("result not found for job {job_id}")))?;
    Ok((record, key))
}

/// GET /api/jobs/{id}/result
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/result",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Result location", body = JobResultResponse),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job has not succeeded")
    )
)]
pub async fn get_result(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResultResponse>, AppError> {
    let (record, key) = require_result(&ctx, &id)?;
    let storage = &ctx.config.storage;
    Ok(Json(JobResultResponse {
        job_id: record.id,
        status: record.status,
        result_url: public_url(&storage.public_base_url, &storage.bucket, &key),
        result_object: key,
    }))
}

/// GET /api/jobs/{id}/download
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/download",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Rendered MP4", content_type = "video/mp4"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job has not succeeded")
    )
)]
pub async fn download_result(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (record, key) = require_result(&ctx, &id)?;
    let data = ctx.blobs.get(ctx.bucket(), &key).await?;

    let disposition = format!("attachment; filename=\"{}.mp4\"", record.id);
    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_LENGTH, data.len().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(data),
    )
        .into_response())
}
