//! sf-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, the typed job record schema, the job record store
//! and the task queue.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use models::{JobFields, JobRecord, JobUpdate, NewVideoJob, RetryPolicy, Task};
pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
