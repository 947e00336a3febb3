//! Route handlers for the HTTP API.

pub mod admin;
pub mod events;
pub mod health;
pub mod jobs;
pub mod uploads;

use sf_core::JobId;

/// Parse a job ID path segment, rejecting malformed IDs with a 400.
pub(crate) fn parse_job_id(raw: &str) -> sf_core::Result<JobId> {
    raw.parse()
        .map_err(|_| sf_core::Error::Validation(format!("Invalid job ID: {raw}")))
}
