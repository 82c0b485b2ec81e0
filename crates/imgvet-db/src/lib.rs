//! Imgvet Database Library
//!
//! Postgres-backed implementations of the status and job store contracts.
//! Status writes serialize per corrId with row locks; job claims use
//! FOR UPDATE SKIP LOCKED so concurrent workers never double-process.

pub mod jobs;
pub mod status;

pub use jobs::{PgJobStore, NEW_JOB_CHANNEL};
pub use status::PgStatusStore;
