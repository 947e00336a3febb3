//! Task queue operations.
//!
//! A task asks a worker to run a named job handler. Workers lease tasks with
//! an atomic `UPDATE ... RETURNING` so each task is executed by one worker
//! at a time.

use chrono::Utc;
use rusqlite::Connection;
use sf_core::{Error, JobId, Result, TaskId};

use crate::models::{now_ts, RetryPolicy, Task};

const COLS: &str = "id, task_name, job_id, payload, status, retry_count, max_retries,
    backoff_secs, timeout_secs, scheduled_for, locked_by, locked_at, last_error,
    created_at, updated_at";

/// Add a task to the queue.
pub fn enqueue(
    conn: &Connection,
    task_name: &str,
    job_id: JobId,
    payload: &serde_json::Value,
    timeout_secs: u64,
    policy: &RetryPolicy,
) -> Result<Task> {
    let id = TaskId::new();
    let now = now_ts();
    let payload_text = payload.to_string();
    let backoff = serde_json::to_string(&policy.backoff_secs)
        .map_err(|e| Error::Internal(format!("failed to encode backoff: {e}")))?;

    conn.execute(
        "INSERT INTO tasks (id, task_name, job_id, payload, status, max_retries,
             backoff_secs, timeout_secs, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'queued', ?5, ?6, ?7, ?8, ?8)",
        rusqlite::params![
            id.to_string(),
            task_name,
            job_id.to_string(),
            payload_text,
            policy.max_retries,
            backoff,
            timeout_secs as i64,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tracing::debug!(task_id = %id, %job_id, task_name, "task enqueued");

    Ok(Task {
        id,
        task_name: task_name.to_string(),
        job_id,
        payload: payload.clone(),
        status: "queued".to_string(),
        retry_count: 0,
        policy: policy.clone(),
        timeout_secs,
        scheduled_for: None,
        locked_by: None,
        locked_at: None,
        last_error: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Get a task by ID.
pub fn get_task(conn: &Connection, id: TaskId) -> Result<Option<Task>> {
    let q = format!("SELECT {COLS} FROM tasks WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Task::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// All tasks for a job, oldest first.
pub fn list_for_job(conn: &Connection, job_id: JobId) -> Result<Vec<Task>> {
    let q = format!("SELECT {COLS} FROM tasks WHERE job_id = ?1 ORDER BY created_at ASC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([job_id.to_string()], Task::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Atomically lease the oldest due task.
///
/// Sets `status='running'`, `locked_by` and `locked_at`. Tasks whose
/// `scheduled_for` lies in the future are skipped.
pub fn dequeue_next(conn: &Connection, worker: &str) -> Result<Option<Task>> {
    let now = now_ts();

    let q = format!(
        "UPDATE tasks SET status='running', locked_by=?1, locked_at=?2, updated_at=?2
         WHERE id = (
             SELECT id FROM tasks
             WHERE status='queued' AND (scheduled_for IS NULL OR scheduled_for <= ?2)
             ORDER BY COALESCE(scheduled_for, created_at) ASC, created_at ASC
             LIMIT 1
         )
         RETURNING {COLS}"
    );

    match conn.query_row(&q, rusqlite::params![worker, &now], Task::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Mark a task as completed and release its lease.
pub fn complete(conn: &Connection, id: TaskId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE tasks SET status='completed', last_error=NULL, locked_by=NULL,
                locked_at=NULL, updated_at=?1
             WHERE id=?2",
            rusqlite::params![now_ts(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a task as permanently failed.
pub fn fail(conn: &Connection, id: TaskId, error: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE tasks SET status='failed', last_error=?1, locked_by=NULL,
                locked_at=NULL, updated_at=?2
             WHERE id=?3",
            rusqlite::params![error, now_ts(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Put a task back in the queue after `delay`, consuming one retry.
///
/// Returns `false` (and changes nothing) once the retry budget is spent.
pub fn schedule_retry(
    conn: &Connection,
    id: TaskId,
    error: &str,
    delay: std::time::Duration,
) -> Result<bool> {
    let due = Utc::now()
        + chrono::Duration::from_std(delay)
            .map_err(|e| Error::Internal(format!("retry delay out of range: {e}")))?;
    let due = due.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let n = conn
        .execute(
            "UPDATE tasks SET status='queued', last_error=?1, scheduled_for=?2,
                locked_by=NULL, locked_at=NULL, retry_count=retry_count+1, updated_at=?3
             WHERE id=?4 AND retry_count < max_retries",
            rusqlite::params![error, due, now_ts(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Return tasks left `running` by a dead process to the queue.
///
/// Only leases taken more than `stale_after` ago are reclaimed; a younger
/// lease may still belong to a live worker in another process.
pub fn reset_orphaned(conn: &Connection, stale_after: std::time::Duration) -> Result<usize> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(stale_after)
            .map_err(|e| Error::Internal(format!("lease age out of range: {e}")))?;
    let cutoff = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let n = conn
        .execute(
            "UPDATE tasks SET status='queued', locked_by=NULL, locked_at=NULL, updated_at=?1
             WHERE status='running' AND (locked_at IS NULL OR locked_at < ?2)",
            rusqlite::params![now_ts(), cutoff],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if n > 0 {
        tracing::warn!("Re-queued {n} orphaned task(s)");
    }
    Ok(n)
}
