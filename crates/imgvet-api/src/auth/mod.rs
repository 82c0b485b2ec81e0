//! Bearer authentication for the ingest surface.
//!
//! A single master API key protects /ingest. Comparison is constant-time and
//! repeated failures from one client IP are throttled.

pub mod middleware;

pub use middleware::{auth_middleware, AuthFailureLimiter, AuthState};
