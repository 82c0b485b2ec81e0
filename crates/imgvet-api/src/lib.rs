//! imgvet API server.
//!
//! HTTP surface (ingest and status polling) plus the in-process pipeline:
//! the worker pool dispatches scan and analyze jobs through [`state::AppState`].

pub mod api_doc;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod stages;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use setup::{build_state, initialize_app};
pub use state::AppState;
