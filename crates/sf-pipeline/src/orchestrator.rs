//! Job orchestrator: drives one video job attempt through its lifecycle.
//!
//! ```text
//! queued ──▶ running ──▶ succeeded
//!               │
//!               └──────▶ failed (SEGMENT_TIMEOUT, retryable)
//!                        failed (VIDEO_GENERATION_FAILED)
//! ```
//!
//! Every attempt starts from scratch in a fresh workspace. The orchestrator
//! records the outcome on the job and hands failures back to the caller,
//! which owns the retry decision.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sf_av::{ToolRegistry, ToolRunner, Workspace};
use sf_core::config::RenderConfig;
use sf_core::events::{EventBus, EventPayload};
use sf_core::{CameraMotion, Error, JobId, JobKind, JobStatus, PipelineStage, Result};
use sf_db::queries::job_records;
use sf_db::{get_conn, DbPool, JobRecord, JobUpdate};
use sf_storage::{result_key, BlobStore};

use crate::context::{checkpoint, ProgressSender, StageTracker};
use crate::failure::classify_failure;
use crate::pipeline::{RenderOutcome, RenderPipeline};
use crate::planner::{build_plan, validate_duration, PlanOptions};

/// Handles the orchestrator needs, built once at start-up.
#[derive(Clone)]
pub struct OrchestratorServices {
    pub pool: DbPool,
    pub blobs: Arc<dyn BlobStore>,
    pub tools: Arc<ToolRegistry>,
    pub runner: Arc<dyn ToolRunner>,
    pub render: RenderConfig,
    pub bucket: String,
    pub events: Option<Arc<EventBus>>,
}

impl OrchestratorServices {
    fn emit(&self, payload: EventPayload) {
        if let Some(events) = &self.events {
            events.broadcast(payload);
        }
    }
}

/// Everything needed to run one video job. Also the payload of a
/// `generate_video` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoJobRequest {
    pub job_id: JobId,
    pub source_object: String,
    pub duration_seconds: u32,
    pub style: String,
    /// Accepted and stored; rendered videos carry no audio track.
    pub bgm_enabled: bool,
    pub seed: Option<u32>,
    pub camera_motion: Option<CameraMotion>,
    pub subject_lock: Option<bool>,
}

impl VideoJobRequest {
    /// Build a request from a stored video job.
    pub fn from_record(record: &JobRecord) -> Result<Self> {
        if record.kind != JobKind::Video {
            return Err(Error::Validation(format!(
                "job {} is a {} job, not a video job",
                record.id, record.kind
            )));
        }
        let duration_seconds = record.duration_seconds.ok_or_else(|| {
            Error::Internal(format!("video job {} has no duration_seconds", record.id))
        })?;
        Ok(Self {
            job_id: record.id,
            source_object: record.source_object.clone(),
            duration_seconds,
            style: record.style.clone().unwrap_or_default(),
            bgm_enabled: record.bgm_enabled.unwrap_or(true),
            seed: record.seed,
            camera_motion: record.camera_motion,
            subject_lock: record.subject_lock,
        })
    }
}

/// Result of a successful attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoJobOutcome {
    pub job_id: JobId,
    pub result_object: String,
    pub duration_sec: f64,
    pub segment_count: u32,
    pub seed: u32,
    pub trimmed: bool,
}

pub struct JobOrchestrator {
    services: OrchestratorServices,
    pipeline: RenderPipeline,
}

impl JobOrchestrator {
    pub fn new(services: OrchestratorServices) -> Self {
        let pipeline = RenderPipeline::new(
            services.runner.clone(),
            services.tools.clone(),
            &services.render,
        );
        Self { services, pipeline }
    }

    /// Run one attempt of a video job and record its outcome.
    ///
    /// The job is marked `running` first (clearing any previous outcome),
    /// then the whole pipeline runs under the job-level timeout. On failure
    /// the classified error is stored on the job and the original error is
    /// returned; use [`classify_failure`] on it to decide whether to retry.
    pub async fn execute_video_job(&self, request: VideoJobRequest) -> Result<VideoJobOutcome> {
        let job_id = request.job_id;
        let attempt = self.mark_running(job_id)?;
        tracing::info!(
            job_id = %job_id,
            attempt,
            duration_seconds = request.duration_seconds,
            "video job started"
        );

        let progress = self.progress_sender(job_id);
        let stage = StageTracker::new();
        let budget = self.services.render.job_timeout();

        let result = match tokio::time::timeout(budget, self.run(&request, &progress, &stage)).await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::JobTimeout {
                stage: stage.current(),
                timeout: budget,
            }),
        };

        match result.and_then(|outcome| self.record_success(&outcome).map(|()| outcome)) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.record_failure(job_id, &err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request: &VideoJobRequest,
        progress: &ProgressSender,
        stage: &StageTracker,
    ) -> Result<VideoJobOutcome> {
        let services = &self.services;
        validate_duration(request.duration_seconds)?;

        stage.enter(PipelineStage::Fetch);
        let workspace = Workspace::new(
            services.render.scratch_dir.as_deref(),
            &format!("job-{}", request.job_id),
        )?;
        let extension = Path::new(&request.source_object)
            .extension()
            .and_then(|e| e.to_str());
        let image = workspace.source_path(extension);
        services
            .blobs
            .get_to_file(&services.bucket, &request.source_object, &image)
            .await?;
        progress.send(checkpoint::FETCHED, PipelineStage::Fetch);

        stage.enter(PipelineStage::Plan);
        let plan = build_plan(
            request.duration_seconds,
            self.pipeline.bounds(),
            PlanOptions {
                seed: request.seed,
                camera_motion: request.camera_motion,
                subject_lock: request.subject_lock,
            },
        )?;
        tracing::info!(
            job_id = %request.job_id,
            segments = ?plan.durations(),
            seed = plan.seed,
            "segment plan built"
        );
        progress.send(checkpoint::PLANNED, PipelineStage::Plan);

        let RenderOutcome {
            output,
            segment_count,
            enforcement,
        } = self
            .pipeline
            .run(&image, &plan, &request.style, &workspace, progress, stage)
            .await?;

        stage.enter(PipelineStage::Upload);
        let key = result_key(request.job_id);
        services
            .blobs
            .put_file(&services.bucket, &key, &output, "video/mp4")
            .await?;
        progress.send(checkpoint::UPLOADED, PipelineStage::Upload);

        Ok(VideoJobOutcome {
            job_id: request.job_id,
            result_object: key,
            duration_sec: enforcement.final_duration(),
            segment_count: segment_count as u32,
            seed: plan.seed,
            trimmed: enforcement.was_trimmed(),
        })
    }

    /// `queued -> running`. Returns the attempt number.
    fn mark_running(&self, job_id: JobId) -> Result<u32> {
        let conn = get_conn(&self.services.pool)?;
        let record = job_records::require_job(&conn, job_id)?;
        let attempt = record.attempts + 1;
        job_records::update_job(
            &conn,
            job_id,
            JobUpdate::new()
                .status(JobStatus::Running)
                .progress(checkpoint::RUNNING)
                .attempts(attempt)
                .clear_failure()
                .clear_result(),
        )?;
        self.services.emit(EventPayload::JobStarted { job_id, attempt });
        Ok(attempt)
    }

    fn progress_sender(&self, job_id: JobId) -> ProgressSender {
        let pool = self.services.pool.clone();
        let events = self.services.events.clone();
        ProgressSender::new(move |progress, stage| {
            let write = get_conn(&pool).and_then(|conn| {
                job_records::update_job(&conn, job_id, JobUpdate::new().progress(progress))
            });
            if let Err(e) = write {
                tracing::warn!(job_id = %job_id, "failed to record progress {progress}: {e}");
            }
            tracing::debug!(job_id = %job_id, progress, %stage, "job progress");
            if let Some(events) = &events {
                events.broadcast(EventPayload::JobProgress {
                    job_id,
                    progress,
                    stage,
                });
            }
        })
    }

    /// `running -> succeeded`.
    fn record_success(&self, outcome: &VideoJobOutcome) -> Result<()> {
        let conn = get_conn(&self.services.pool)?;
        job_records::update_job(
            &conn,
            outcome.job_id,
            JobUpdate::new()
                .status(JobStatus::Succeeded)
                .progress(checkpoint::DONE)
                .result(&outcome.result_object, outcome.duration_sec)
                .segment_count(outcome.segment_count)
                .clear_failure(),
        )?;
        tracing::info!(
            job_id = %outcome.job_id,
            duration_sec = outcome.duration_sec,
            segments = outcome.segment_count,
            "video job succeeded"
        );
        self.services.emit(EventPayload::JobSucceeded {
            job_id: outcome.job_id,
            result_object: outcome.result_object.clone(),
            duration_sec: outcome.duration_sec,
        });
        Ok(())
    }

    /// `running -> failed`. A failure to record is logged; the caller still
    /// receives the original error.
    fn record_failure(&self, job_id: JobId, err: &Error) {
        let class = classify_failure(err);
        let message = err.to_string();
        tracing::error!(
            job_id = %job_id,
            error_code = %class.code,
            retryable = class.retryable,
            "video job failed: {message}"
        );

        let write = get_conn(&self.services.pool).and_then(|conn| {
            job_records::update_job(
                &conn,
                job_id,
                JobUpdate::new()
                    .status(JobStatus::Failed)
                    .progress(checkpoint::DONE)
                    .failure(class.code, &message, class.retryable)
                    .clear_result(),
            )
        });
        if let Err(e) = write {
            tracing::error!(job_id = %job_id, "failed to record job failure: {e}");
        }

        self.services.emit(EventPayload::JobFailed {
            job_id,
            error_code: class.code,
            retryable: class.retryable,
            message,
        });
    }
}
