//! Job record store: a merge-on-write `field -> text` mapping per job.

use rusqlite::{params, Connection};
use sf_core::{Error, JobId, JobKind, Result};

use crate::models::{field, now_ts, JobFields, JobRecord, JobUpdate, NewVideoJob};

/// Merge `fields` into the job's mapping. Fields not named are kept;
/// `updated_at` is refreshed on every write.
pub fn set_fields(conn: &Connection, id: JobId, fields: &JobFields) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO job_fields (job_id, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(job_id, field) DO UPDATE SET value = excluded.value",
            )
            .map_err(|e| Error::database(e.to_string()))?;

        let job_id = id.to_string();
        for (name, value) in fields {
            if name == field::UPDATED_AT {
                continue;
            }
            stmt.execute(params![job_id, name, value])
                .map_err(|e| Error::database(e.to_string()))?;
        }
        stmt.execute(params![job_id, field::UPDATED_AT, now_ts()])
            .map_err(|e| Error::database(e.to_string()))?;
    }
    tx.commit().map_err(|e| Error::database(e.to_string()))
}

/// Read the full mapping of a job, or `None` if it has never been written.
pub fn get_fields(conn: &Connection, id: JobId) -> Result<Option<JobFields>> {
    let mut stmt = conn
        .prepare_cached("SELECT field, value FROM job_fields WHERE job_id = ?1")
        .map_err(|e| Error::database(e.to_string()))?;
    let fields: JobFields = stmt
        .query_map([id.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok((!fields.is_empty()).then_some(fields))
}

/// Typed point read.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<JobRecord>> {
    get_fields(conn, id)?
        .map(|fields| JobRecord::from_fields(&fields))
        .transpose()
}

/// Typed point read that treats a missing job as [`Error::NotFound`].
pub fn require_job(conn: &Connection, id: JobId) -> Result<JobRecord> {
    get_job(conn, id)?.ok_or_else(|| Error::not_found("job", id))
}

/// Write a complete record.
pub fn insert_job(conn: &Connection, record: &JobRecord) -> Result<()> {
    set_fields(conn, record.id, &record.to_fields())
}

/// Apply a partial update.
pub fn update_job(conn: &Connection, id: JobId, update: JobUpdate) -> Result<()> {
    set_fields(conn, id, &update.into_fields())
}

/// Create the record for a stored upload.
pub fn create_upload_job(
    conn: &Connection,
    id: JobId,
    source_object: &str,
    content_type: Option<&str>,
) -> Result<JobRecord> {
    let record = JobRecord::new_upload(
        id,
        source_object.to_string(),
        content_type.map(String::from),
    );
    insert_job(conn, &record)?;
    Ok(record)
}

/// Create a queued video job reading from an existing upload job.
///
/// Fails with [`Error::NotFound`] if `upload_job_id` is missing or is not an
/// upload job. The upload's source object is copied into the new record.
pub fn create_video_job(
    conn: &Connection,
    upload_job_id: JobId,
    params: &NewVideoJob,
) -> Result<JobRecord> {
    let upload = match get_job(conn, upload_job_id)? {
        Some(rec) if rec.kind == JobKind::Upload => rec,
        _ => return Err(Error::not_found("upload job", upload_job_id)),
    };

    let record = JobRecord::new_video(JobId::new(), &upload, params);
    insert_job(conn, &record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use sf_core::{ErrorCode, JobStatus};

    fn video_params() -> NewVideoJob {
        NewVideoJob {
            duration_seconds: 10,
            style: "cinematic".into(),
            bgm_enabled: true,
            seed: None,
            camera_motion: None,
            subject_lock: None,
        }
    }

    #[test]
    fn set_merges_fields() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let id = JobId::new();

        let mut first = JobFields::new();
        first.insert("status".into(), "queued".into());
        first.insert("style".into(), "noir".into());
        set_fields(&conn, id, &first).unwrap();

        let mut second = JobFields::new();
        second.insert("status".into(), "running".into());
        set_fields(&conn, id, &second).unwrap();

        let stored = get_fields(&conn, id).unwrap().unwrap();
        assert_eq!(stored["status"], "running");
        assert_eq!(stored["style"], "noir");
        assert!(!stored["updated_at"].is_empty());
    }

    #[test]
    fn get_missing_is_none() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(get_job(&conn, JobId::new()).unwrap().is_none());
        assert!(matches!(
            require_job(&conn, JobId::new()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn create_upload_then_video() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let upload_id = JobId::new();
        create_upload_job(&conn, upload_id, "uploads/u_cat.png", Some("image/png")).unwrap();
        let upload = require_job(&conn, upload_id).unwrap();
        assert_eq!(upload.status, JobStatus::Uploaded);
        assert_eq!(upload.content_type.as_deref(), Some("image/png"));

        let video = create_video_job(&conn, upload_id, &video_params()).unwrap();
        let stored = require_job(&conn, video.id).unwrap();
        assert_eq!(stored.kind, JobKind::Video);
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.source_object, "uploads/u_cat.png");
        assert_eq!(stored.source_upload_job_id, Some(upload_id));
        assert_eq!(stored.bgm_enabled, Some(true));

        // The upload record is untouched.
        let upload_after = require_job(&conn, upload_id).unwrap();
        assert_eq!(upload_after.to_fields(), upload.to_fields());
    }

    #[test]
    fn video_from_missing_or_non_upload_is_not_found() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let err = create_video_job(&conn, JobId::new(), &video_params()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let upload_id = JobId::new();
        create_upload_job(&conn, upload_id, "uploads/u_x.png", None).unwrap();
        let video = create_video_job(&conn, upload_id, &video_params()).unwrap();
        let err = create_video_job(&conn, video.id, &video_params()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn update_clears_and_sets() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let upload_id = JobId::new();
        create_upload_job(&conn, upload_id, "uploads/u.png", None).unwrap();
        let video = create_video_job(&conn, upload_id, &video_params()).unwrap();

        update_job(
            &conn,
            video.id,
            JobUpdate::new()
                .status(JobStatus::Failed)
                .progress(100)
                .failure(ErrorCode::SegmentTimeout, "Segment 0 timed out", true),
        )
        .unwrap();
        let failed = require_job(&conn, video.id).unwrap();
        assert_eq!(failed.error_code, Some(ErrorCode::SegmentTimeout));
        assert_eq!(failed.retryable, Some(true));

        update_job(
            &conn,
            video.id,
            JobUpdate::new()
                .status(JobStatus::Succeeded)
                .clear_failure()
                .result("results/v.mp4", 10.0),
        )
        .unwrap();
        let done = require_job(&conn, video.id).unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert!(done.error_code.is_none());
        assert!(done.error_message.is_none());
        assert!(done.retryable.is_none());
        assert_eq!(done.result_object.as_deref(), Some("results/v.mp4"));
        assert_eq!(done.result_duration_sec, Some(10.0));
    }
}
