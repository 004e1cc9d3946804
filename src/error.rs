//! Error types for the harness
//!
//! Transient non-convergence is not an error; the poller reports it as a
//! normal outcome (see [`crate::poll::PollOutcome`]). The variants here cover
//! the failures that must stop a run: a required external command exiting
//! non-zero, a convergence check that stayed unmet after its full retry
//! budget, and DNS batch failures.

use thiserror::Error;

/// Harness result type
pub type Result<T> = std::result::Result<T, Error>;

/// Harness errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command failed: {command}: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("{check} did not converge; last observed: {observed}")]
    Convergence { check: String, observed: String },

    #[error("dns error: {0}")]
    Dns(String),
}

impl Error {
    pub fn command_failed(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::CommandFailed {
            command: command.into(),
            detail: detail.into(),
        }
    }

    pub fn convergence(check: impl Into<String>, observed: impl Into<String>) -> Self {
        Error::Convergence {
            check: check.into(),
            observed: observed.into(),
        }
    }

    pub fn dns(message: impl Into<String>) -> Self {
        Error::Dns(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display_includes_command_and_detail() {
        let err = Error::command_failed("kubectl create -f rbac.yaml", "connection refused");
        assert!(err.to_string().contains("kubectl create -f rbac.yaml"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_convergence_display_includes_last_observed() {
        let err = Error::convergence("ssl certificate count", "Some(3)");
        assert!(err.to_string().contains("ssl certificate count"));
        assert!(err.to_string().contains("Some(3)"));
    }
}
