//! Typed views over stored rows.
//!
//! [`JobRecord`] owns the field set of the flat job record store and the
//! conversion to and from its `field -> text` form. [`JobUpdate`] builds a
//! partial (merge) write. [`Task`] maps a row of the `tasks` queue table.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sf_core::{CameraMotion, Error, ErrorCode, JobId, JobKind, JobStatus, Result, TaskId};
use uuid::Uuid;

/// The raw stored form of a job: field name to text value.
pub type JobFields = BTreeMap<String, String>;

/// Field names of the job record store.
pub mod field {
    pub const ID: &str = "id";
    pub const KIND: &str = "type";
    pub const STATUS: &str = "status";
    pub const PROGRESS: &str = "progress";
    pub const SOURCE_UPLOAD_JOB_ID: &str = "source_upload_job_id";
    pub const SOURCE_OBJECT: &str = "source_object";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const DURATION_SECONDS: &str = "duration_seconds";
    pub const STYLE: &str = "style";
    pub const BGM_ENABLED: &str = "bgm_enabled";
    pub const SEED: &str = "seed";
    pub const CAMERA_MOTION: &str = "camera_motion";
    pub const SUBJECT_LOCK: &str = "subject_lock";
    pub const RESULT_OBJECT: &str = "result_object";
    pub const RESULT_DURATION_SEC: &str = "result_duration_sec";
    pub const SEGMENT_COUNT: &str = "segment_count";
    pub const ERROR_CODE: &str = "error_code";
    pub const ERROR_MESSAGE: &str = "error_message";
    pub const RETRYABLE: &str = "retryable";
    pub const ATTEMPTS: &str = "attempts";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Current time in the fixed-width RFC 3339 form used for every stored
/// timestamp, so text comparison orders correctly.
pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from(uuid))
}

fn corrupt(id: &str, name: &str, value: &str) -> Error {
    Error::Internal(format!("job {id}: malformed field {name}={value:?}"))
}

/// A present, non-empty field value.
fn opt<'a>(fields: &'a JobFields, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn parse_opt<T: std::str::FromStr>(fields: &JobFields, id: &str, name: &str) -> Result<Option<T>> {
    match opt(fields, name) {
        Some(v) => v.parse().map(Some).map_err(|_| corrupt(id, name, v)),
        None => Ok(None),
    }
}

fn parse_req<T: std::str::FromStr>(fields: &JobFields, id: &str, name: &str) -> Result<T> {
    parse_opt(fields, id, name)?
        .ok_or_else(|| Error::Internal(format!("job {id}: missing field {name}")))
}

fn text_opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn format_secs(v: f64) -> String {
    format!("{v:.3}")
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// A job as stored in the job record store.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub source_upload_job_id: Option<JobId>,
    pub source_object: String,
    pub content_type: Option<String>,
    pub duration_seconds: Option<u32>,
    pub style: Option<String>,
    pub bgm_enabled: Option<bool>,
    pub seed: Option<u32>,
    pub camera_motion: Option<CameraMotion>,
    pub subject_lock: Option<bool>,
    pub result_object: Option<String>,
    pub result_duration_sec: Option<f64>,
    pub segment_count: Option<u32>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub retryable: Option<bool>,
    pub attempts: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters of a new video job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideoJob {
    pub duration_seconds: u32,
    pub style: String,
    pub bgm_enabled: bool,
    pub seed: Option<u32>,
    pub camera_motion: Option<CameraMotion>,
    pub subject_lock: Option<bool>,
}

impl JobRecord {
    /// A freshly stored upload: `uploaded`, progress 100.
    pub fn new_upload(id: JobId, source_object: String, content_type: Option<String>) -> Self {
        let now = now_ts();
        Self {
            id,
            kind: JobKind::Upload,
            status: JobStatus::Uploaded,
            progress: 100,
            source_upload_job_id: None,
            source_object,
            content_type,
            duration_seconds: None,
            style: None,
            bgm_enabled: None,
            seed: None,
            camera_motion: None,
            subject_lock: None,
            result_object: None,
            result_duration_sec: None,
            segment_count: None,
            error_code: None,
            error_message: None,
            retryable: None,
            attempts: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// A queued video job reading from `upload`.
    pub fn new_video(id: JobId, upload: &JobRecord, params: &NewVideoJob) -> Self {
        let now = now_ts();
        Self {
            id,
            kind: JobKind::Video,
            status: JobStatus::Queued,
            progress: 0,
            source_upload_job_id: Some(upload.id),
            source_object: upload.source_object.clone(),
            content_type: None,
            duration_seconds: Some(params.duration_seconds),
            style: Some(params.style.clone()),
            bgm_enabled: Some(params.bgm_enabled),
            seed: params.seed,
            camera_motion: params.camera_motion,
            subject_lock: params.subject_lock,
            result_object: None,
            result_duration_sec: None,
            segment_count: None,
            error_code: None,
            error_message: None,
            retryable: None,
            attempts: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Full stored form. Absent optionals become empty strings.
    pub fn to_fields(&self) -> JobFields {
        let pairs = [
            (field::ID, self.id.to_string()),
            (field::KIND, self.kind.to_string()),
            (field::STATUS, self.status.to_string()),
            (field::PROGRESS, self.progress.to_string()),
            (field::SOURCE_UPLOAD_JOB_ID, text_opt(&self.source_upload_job_id)),
            (field::SOURCE_OBJECT, self.source_object.clone()),
            (field::CONTENT_TYPE, text_opt(&self.content_type)),
            (field::DURATION_SECONDS, text_opt(&self.duration_seconds)),
            (field::STYLE, text_opt(&self.style)),
            (field::BGM_ENABLED, text_opt(&self.bgm_enabled)),
            (field::SEED, text_opt(&self.seed)),
            (field::CAMERA_MOTION, text_opt(&self.camera_motion)),
            (field::SUBJECT_LOCK, text_opt(&self.subject_lock)),
            (field::RESULT_OBJECT, text_opt(&self.result_object)),
            (
                field::RESULT_DURATION_SEC,
                self.result_duration_sec.map(format_secs).unwrap_or_default(),
            ),
            (field::SEGMENT_COUNT, text_opt(&self.segment_count)),
            (field::ERROR_CODE, text_opt(&self.error_code)),
            (field::ERROR_MESSAGE, text_opt(&self.error_message)),
            (field::RETRYABLE, text_opt(&self.retryable)),
            (field::ATTEMPTS, self.attempts.to_string()),
            (field::CREATED_AT, self.created_at.clone()),
            (field::UPDATED_AT, self.updated_at.clone()),
        ];
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Rebuild a record from its stored form.
    pub fn from_fields(fields: &JobFields) -> Result<Self> {
        let id_text = opt(fields, field::ID).unwrap_or("?").to_string();
        let id = &id_text;
        Ok(Self {
            id: parse_req(fields, id, field::ID)?,
            kind: parse_req(fields, id, field::KIND)?,
            status: parse_req(fields, id, field::STATUS)?,
            progress: parse_opt(fields, id, field::PROGRESS)?.unwrap_or(0),
            source_upload_job_id: parse_opt(fields, id, field::SOURCE_UPLOAD_JOB_ID)?,
            source_object: opt(fields, field::SOURCE_OBJECT).unwrap_or_default().to_string(),
            content_type: opt(fields, field::CONTENT_TYPE).map(String::from),
            duration_seconds: parse_opt(fields, id, field::DURATION_SECONDS)?,
            style: opt(fields, field::STYLE).map(String::from),
            bgm_enabled: parse_opt(fields, id, field::BGM_ENABLED)?,
            seed: parse_opt(fields, id, field::SEED)?,
            camera_motion: parse_opt(fields, id, field::CAMERA_MOTION)?,
            subject_lock: parse_opt(fields, id, field::SUBJECT_LOCK)?,
            result_object: opt(fields, field::RESULT_OBJECT).map(String::from),
            result_duration_sec: parse_opt(fields, id, field::RESULT_DURATION_SEC)?,
            segment_count: parse_opt(fields, id, field::SEGMENT_COUNT)?,
            error_code: parse_opt(fields, id, field::ERROR_CODE)?,
            error_message: opt(fields, field::ERROR_MESSAGE).map(String::from),
            retryable: parse_opt(fields, id, field::RETRYABLE)?,
            attempts: parse_opt(fields, id, field::ATTEMPTS)?.unwrap_or(0),
            created_at: opt(fields, field::CREATED_AT).unwrap_or_default().to_string(),
            updated_at: opt(fields, field::UPDATED_AT).unwrap_or_default().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// A partial write to a job record. Only the touched fields are merged;
/// clearing a field writes an empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    fields: JobFields,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(mut self, name: &str, value: String) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn status(self, status: JobStatus) -> Self {
        self.put(field::STATUS, status.to_string())
    }

    pub fn progress(self, progress: u8) -> Self {
        self.put(field::PROGRESS, progress.min(100).to_string())
    }

    pub fn attempts(self, attempts: u32) -> Self {
        self.put(field::ATTEMPTS, attempts.to_string())
    }

    pub fn segment_count(self, count: u32) -> Self {
        self.put(field::SEGMENT_COUNT, count.to_string())
    }

    /// Record the delivered output.
    pub fn result(self, object: &str, duration_sec: f64) -> Self {
        self.put(field::RESULT_OBJECT, object.to_string())
            .put(field::RESULT_DURATION_SEC, format_secs(duration_sec))
    }

    pub fn clear_result(self) -> Self {
        self.put(field::RESULT_OBJECT, String::new())
            .put(field::RESULT_DURATION_SEC, String::new())
    }

    /// Record a failure classification.
    pub fn failure(self, code: ErrorCode, message: &str, retryable: bool) -> Self {
        self.put(field::ERROR_CODE, code.to_string())
            .put(field::ERROR_MESSAGE, message.to_string())
            .put(field::RETRYABLE, retryable.to_string())
    }

    pub fn clear_failure(self) -> Self {
        self.put(field::ERROR_CODE, String::new())
            .put(field::ERROR_MESSAGE, String::new())
            .put(field::RETRYABLE, String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> JobFields {
        self.fields
    }
}

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

/// Retry policy attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before retry N is `backoff_secs[N-1]`; the last entry repeats.
    pub backoff_secs: Vec<u64>,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let idx = retry.saturating_sub(1) as usize;
        let secs = self
            .backoff_secs
            .get(idx)
            .or_else(|| self.backoff_secs.last())
            .copied()
            .unwrap_or(0);
        Duration::from_secs(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_secs: vec![2, 4, 8],
        }
    }
}

/// One row of the `tasks` table.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub task_name: String,
    pub job_id: JobId,
    pub payload: serde_json::Value,
    /// `queued`, `running`, `completed` or `failed`.
    pub status: String,
    pub retry_count: u32,
    pub policy: RetryPolicy,
    pub timeout_secs: u64,
    pub scheduled_for: Option<String>,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let payload: String = row.get(3)?;
        let backoff: String = row.get(7)?;
        let json_err = |idx: usize, e: serde_json::Error| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        };
        Ok(Self {
            id: parse_id(row, 0)?,
            task_name: row.get(1)?,
            job_id: parse_id(row, 2)?,
            payload: serde_json::from_str(&payload).map_err(|e| json_err(3, e))?,
            status: row.get(4)?,
            retry_count: row.get(5)?,
            policy: RetryPolicy {
                max_retries: row.get(6)?,
                backoff_secs: serde_json::from_str(&backoff).map_err(|e| json_err(7, e))?,
            },
            timeout_secs: row.get::<_, i64>(8)?.max(0) as u64,
            scheduled_for: row.get(9)?,
            locked_by: row.get(10)?,
            locked_at: row.get(11)?,
            last_error: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    /// Whether another retry is allowed by the policy.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.policy.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> JobRecord {
        JobRecord::new_upload(
            JobId::new(),
            "uploads/x_cat.png".into(),
            Some("image/png".into()),
        )
    }

    #[test]
    fn upload_record_defaults() {
        let rec = upload();
        assert_eq!(rec.kind, JobKind::Upload);
        assert_eq!(rec.status, JobStatus::Uploaded);
        assert_eq!(rec.progress, 100);
    }

    #[test]
    fn video_record_copies_source() {
        let up = upload();
        let params = NewVideoJob {
            duration_seconds: 130,
            style: "cinematic".into(),
            bgm_enabled: true,
            seed: Some(7),
            camera_motion: Some(CameraMotion::Static),
            subject_lock: None,
        };
        let rec = JobRecord::new_video(JobId::new(), &up, &params);
        assert_eq!(rec.status, JobStatus::Queued);
        assert_eq!(rec.source_object, up.source_object);
        assert_eq!(rec.source_upload_job_id, Some(up.id));
        assert_eq!(rec.duration_seconds, Some(130));
    }

    #[test]
    fn fields_roundtrip() {
        let mut rec = upload();
        rec.result_duration_sec = Some(130.0333);
        rec.error_code = Some(ErrorCode::SegmentTimeout);
        rec.retryable = Some(true);
        rec.camera_motion = Some(CameraMotion::SlowPullOut);

        let fields = rec.to_fields();
        assert_eq!(fields[field::KIND], "upload");
        assert_eq!(fields[field::STYLE], "");
        assert_eq!(fields[field::RESULT_DURATION_SEC], "130.033");
        assert_eq!(fields[field::ERROR_CODE], "SEGMENT_TIMEOUT");

        let back = JobRecord::from_fields(&fields).unwrap();
        assert_eq!(back.id, rec.id);
        assert_eq!(back.style, None);
        assert_eq!(back.camera_motion, Some(CameraMotion::SlowPullOut));
        assert_eq!(back.result_duration_sec, Some(130.033));
        assert_eq!(back.retryable, Some(true));
    }

    #[test]
    fn empty_string_means_absent() {
        let mut fields = upload().to_fields();
        fields.insert(field::ERROR_CODE.into(), String::new());
        fields.insert(field::RESULT_OBJECT.into(), String::new());
        let rec = JobRecord::from_fields(&fields).unwrap();
        assert!(rec.error_code.is_none());
        assert!(rec.result_object.is_none());
    }

    #[test]
    fn malformed_field_is_error() {
        let mut fields = upload().to_fields();
        fields.insert(field::STATUS.into(), "exploded".into());
        assert!(JobRecord::from_fields(&fields).is_err());
    }

    #[test]
    fn update_builder_clears_with_empty_strings() {
        let fields = JobUpdate::new()
            .status(JobStatus::Running)
            .progress(10)
            .clear_failure()
            .clear_result()
            .into_fields();
        assert_eq!(fields[field::STATUS], "running");
        assert_eq!(fields[field::PROGRESS], "10");
        assert_eq!(fields[field::ERROR_CODE], "");
        assert_eq!(fields[field::RETRYABLE], "");
        assert_eq!(fields[field::RESULT_OBJECT], "");
        assert!(!fields.contains_key(field::ATTEMPTS));
    }

    #[test]
    fn progress_is_capped() {
        let fields = JobUpdate::new().progress(250).into_fields();
        assert_eq!(fields[field::PROGRESS], "100");
    }

    #[test]
    fn retry_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(9), Duration::from_secs(8));

        let none = RetryPolicy {
            max_retries: 1,
            backoff_secs: vec![],
        };
        assert_eq!(none.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let ts = now_ts();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }
}
