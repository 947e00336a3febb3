//! Object key builders.

use sf_core::JobId;

/// Key for an uploaded source image: `uploads/{job_id}_{filename}`.
///
/// Directory components are stripped from `filename` and characters outside
/// `[A-Za-z0-9._-]` are replaced with `_`.
pub fn upload_key(job_id: JobId, filename: &str) -> String {
    format!("uploads/{job_id}_{}", sanitize_filename(filename))
}

/// Key for a rendered video: `results/{job_id}.mp4`.
pub fn result_key(job_id: JobId) -> String {
    format!("results/{job_id}.mp4")
}

/// Client-facing URL of an object: `{base}/{bucket}/{key}`.
pub fn public_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{base}/{bucket}/{key}")
}

fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
