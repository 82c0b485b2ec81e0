//! Job execution error types
//!
//! This module provides error types specifically for stage job execution,
//! allowing a stage to indicate whether an error is recoverable (should be
//! redelivered) or unrecoverable (terminal; the queue must not retry).
//! Every quarantine outcome is unrecoverable: the artifact has already been
//! moved and the status record is terminal.

use std::fmt;

/// Job execution error that can be either recoverable or unrecoverable
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    /// Create a new unrecoverable job error
    ///
    /// Unrecoverable errors fail the job immediately without retrying.
    /// Use this for quarantine outcomes and invalid payloads that will not
    /// change on redelivery.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Create a new recoverable job error
    ///
    /// Recoverable errors are redelivered according to the job's retry
    /// policy. Use this for transient store/queue/network failures.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    /// Check if this error is recoverable (should be retried)
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Get the inner error
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Consume self and return the inner error
    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Default conversion from anyhow::Error creates a recoverable error
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Extension trait for Result to easily create unrecoverable job errors
pub trait JobResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::unrecoverable(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecoverable_error() {
        let err = JobError::unrecoverable(anyhow::anyhow!("quarantined: virus"));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("virus"));
    }

    #[test]
    fn recoverable_error() {
        let err = JobError::recoverable(anyhow::anyhow!("storage timeout"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn from_anyhow_defaults_to_recoverable() {
        let err: JobError = anyhow::anyhow!("some error").into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn result_ext_marks_unrecoverable() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("bad payload"));
        let job_result = result.unrecoverable();
        assert!(!job_result.unwrap_err().is_recoverable());
    }
}
