//! Image upload handler.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use sf_core::events::EventPayload;
use sf_core::{Error, JobId};
use sf_storage::upload_key;

use crate::context::AppContext;
use crate::error::AppError;

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub job_id: JobId,
}

/// POST /api/uploads
///
/// Stores the multipart `file` field and records an upload job for it.
#[utoipa::path(
    post,
    path = "/api/uploads",
    request_body(content_type = "multipart/form-data", description = "Image in a `file` field"),
    responses(
        (status = 201, description = "Upload stored", body = UploadResponse),
        (status = 400, description = "Missing or empty file")
    )
)]
pub async fn create_upload(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::Validation(format!("Failed to read upload: {e}")))?;
        if data.is_empty() {
            return Err(Error::Validation("Uploaded file is empty".into()).into());
        }

        let job_id = JobId::new();
        let key = upload_key(job_id, &filename);
        ctx.blobs
            .put(ctx.bucket(), &key, data, &content_type)
            .await?;

        let conn = sf_db::get_conn(&ctx.db)?;
        sf_db::queries::job_records::create_upload_job(&conn, job_id, &key, Some(&content_type))?;

        tracing::info!(job_id = %job_id, object = %key, "upload stored");
        ctx.event_bus.broadcast(EventPayload::UploadStored {
            job_id,
            object: key,
        });

        return Ok((StatusCode::CREATED, Json(UploadResponse { job_id })));
    }

    Err(Error::Validation("Multipart field `file` is required".into()).into())
}
