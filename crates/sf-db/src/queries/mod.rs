//! Database query modules.

pub mod job_records;
pub mod tasks;
