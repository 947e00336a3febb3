//! Background worker pool.
//!
//! Each worker slot polls the task queue, leases the oldest due
//! `generate_video` task, hands it to the [`JobOrchestrator`], and settles
//! the task afterwards: completed, re-queued with backoff when the failure is
//! retryable and the policy allows, or failed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sf_core::events::EventPayload;
use sf_db::queries::tasks;
use sf_db::Task;
use sf_pipeline::{classify_failure, JobOrchestrator, VideoJobRequest};

use crate::context::AppContext;

/// Task name for video generation.
pub const GENERATE_VIDEO_TASK: &str = "generate_video";

/// Run `worker.concurrency` worker slots until the token is cancelled.
pub async fn run_workers(ctx: AppContext, cancel: CancellationToken) {
    // A lease younger than one full job plus its upload may still be live.
    let stale_after = ctx.config.render.job_timeout() + ctx.config.render.assembly_timeout();
    match sf_db::get_conn(&ctx.db).and_then(|conn| tasks::reset_orphaned(&conn, stale_after)) {
        Ok(_) => {}
        Err(e) => tracing::error!("Failed to re-queue orphaned tasks: {e}"),
    }

    let orchestrator = Arc::new(JobOrchestrator::new(ctx.orchestrator_services()));
    let slots = ctx.config.worker.concurrency.max(1);
    tracing::info!(slots, "Worker pool started");

    let handles: Vec<_> = (0..slots)
        .map(|slot| {
            let ctx = ctx.clone();
            let orchestrator = orchestrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_worker(ctx, orchestrator, format!("worker-{slot}"), cancel).await;
            })
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Worker task panicked: {e}");
        }
    }

    tracing::info!("Worker pool stopped");
}

async fn run_worker(
    ctx: AppContext,
    orchestrator: Arc<JobOrchestrator>,
    worker: String,
    cancel: CancellationToken,
) {
    let poll = Duration::from_millis(ctx.config.worker.poll_interval_ms);
    tracing::debug!(worker = %worker, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match process_next(&ctx, &orchestrator, &worker).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => tracing::error!(worker = %worker, "Worker error: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::debug!(worker = %worker, "Worker stopped");
}

/// Lease and run the next due task.
///
/// Returns `Ok(true)` if a task was processed (whatever its outcome),
/// `Ok(false)` if the queue had nothing due.
pub async fn process_next(
    ctx: &AppContext,
    orchestrator: &JobOrchestrator,
    worker: &str,
) -> sf_core::Result<bool> {
    let task = {
        let conn = sf_db::get_conn(&ctx.db)?;
        tasks::dequeue_next(&conn, worker)?
    };
    let Some(task) = task else {
        return Ok(false);
    };

    if task.task_name != GENERATE_VIDEO_TASK {
        tracing::warn!(task_id = %task.id, name = %task.task_name, "Unknown task");
        let conn = sf_db::get_conn(&ctx.db)?;
        tasks::fail(&conn, task.id, &format!("unknown task: {}", task.task_name))?;
        return Ok(true);
    }

    let request: VideoJobRequest = match serde_json::from_value(task.payload.clone()) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(task_id = %task.id, job_id = %task.job_id, "Bad task payload: {e}");
            let conn = sf_db::get_conn(&ctx.db)?;
            tasks::fail(&conn, task.id, &format!("invalid payload: {e}"))?;
            return Ok(true);
        }
    };

    tracing::info!(
        worker,
        task_id = %task.id,
        job_id = %task.job_id,
        attempt = task.retry_count + 1,
        "Processing video job"
    );

    match orchestrator.execute_video_job(request).await {
        Ok(outcome) => {
            let conn = sf_db::get_conn(&ctx.db)?;
            tasks::complete(&conn, task.id)?;
            tracing::info!(
                job_id = %outcome.job_id,
                segments = outcome.segment_count,
                duration_sec = outcome.duration_sec,
                "Video job completed"
            );
        }
        Err(e) => settle_failure(ctx, &task, &e)?,
    }

    Ok(true)
}

fn settle_failure(ctx: &AppContext, task: &Task, error: &sf_core::Error) -> sf_core::Result<()> {
    let class = classify_failure(error);
    let message = error.to_string();
    let conn = sf_db::get_conn(&ctx.db)?;

    if class.retryable && task.can_retry() {
        let retry = task.retry_count + 1;
        let delay = task.policy.delay_for(retry);
        if tasks::schedule_retry(&conn, task.id, &message, delay)? {
            tracing::info!(
                job_id = %task.job_id,
                retry,
                backoff_secs = delay.as_secs(),
                "Scheduling retry"
            );
            ctx.event_bus.broadcast(EventPayload::JobRetryScheduled {
                job_id: task.job_id,
                retry,
                delay_secs: delay.as_secs(),
            });
            return Ok(());
        }
    }

    tracing::warn!(job_id = %task.job_id, code = %class.code, "Video job failed permanently");
    tasks::fail(&conn, task.id, &message)?;
    Ok(())
}
