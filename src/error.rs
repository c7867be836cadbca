//! Error taxonomy for the generation pipeline.
//!
//! Every failure a caller can observe is a [`CognateError`] variant, so the
//! backend chain can decide retry behavior by matching on the variant instead
//! of sniffing error strings. Exit codes follow UNIX conventions:
//!
//! - 1: general/unexpected errors
//! - 2: usage errors (bad CLI arguments)
//! - 3: configuration errors
//! - 4: backend/network errors
//! - 5: safety refusal (dangerous command rejected)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CognateError {
    /// Instruction was empty after trimming. Rejected before any generation.
    #[error("instruction is empty")]
    EmptyInstruction,

    /// No backend in the chain could even be attempted (missing credentials,
    /// unknown names).
    #[error("no available backend: {0}")]
    NoAvailableBackend(String),

    /// 401/403 from a backend. Never retried.
    #[error("authentication failed ({status}): {body}")]
    AuthFailure { status: u16, body: String },

    /// 429 after all retries are exhausted.
    #[error("rate limited ({status}): {body}")]
    RateLimited { status: u16, body: String },

    /// 408/504 from a backend.
    #[error("request timed out ({status}): {body}")]
    TimeoutFailure { status: u16, body: String },

    /// Transport-level failure (connection reset, DNS, local timeout).
    #[error("network error: {0}")]
    NetworkFailure(String),

    /// Any other non-2xx status.
    #[error("backend error ({status}): {body}")]
    ApiFailure { status: u16, body: String },

    /// 2xx response whose body did not contain a usable message.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// Response text reduced to nothing after extraction.
    #[error("backend returned an empty response")]
    EmptyResponse,

    /// A configured danger pattern failed to compile. The safety gate treats
    /// every command as dangerous while this condition holds; this variant
    /// only exists for reporting, never as a crash.
    #[error("invalid safety configuration: {0}")]
    InvalidSecurityConfig(String),

    /// The operator refused the command. A normal terminal outcome, carried
    /// as an error variant only so the reporting boundary can pick exit
    /// code 5.
    #[error("command rejected by user")]
    UserAbort,

    /// Interrupt signal observed at a pipeline boundary.
    #[error("interrupted")]
    Interrupted,

    /// Configuration file problems (unreadable, bad TOML).
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for unexpected failures.
    #[error("{0}")]
    General(#[from] anyhow::Error),
}

impl CognateError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CognateError::EmptyInstruction => 2,
            CognateError::Config(_) => 3,
            CognateError::NoAvailableBackend(_)
            | CognateError::AuthFailure { .. }
            | CognateError::RateLimited { .. }
            | CognateError::TimeoutFailure { .. }
            | CognateError::NetworkFailure(_)
            | CognateError::ApiFailure { .. }
            | CognateError::MalformedResponse(_)
            | CognateError::EmptyResponse => 4,
            CognateError::UserAbort => 5,
            CognateError::Interrupted => 130,
            CognateError::InvalidSecurityConfig(_) | CognateError::General(_) => 1,
        }
    }

    /// Whether the backend chain should fall through to the next backend
    /// after seeing this failure. Everything except a user refusal or an
    /// interrupt is worth another backend's attempt.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            CognateError::AuthFailure { .. }
                | CognateError::RateLimited { .. }
                | CognateError::TimeoutFailure { .. }
                | CognateError::NetworkFailure(_)
                | CognateError::ApiFailure { .. }
                | CognateError::MalformedResponse(_)
                | CognateError::NoAvailableBackend(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CognateError::EmptyInstruction.exit_code(), 2);
        assert_eq!(CognateError::Config("bad toml".into()).exit_code(), 3);
        assert_eq!(
            CognateError::AuthFailure {
                status: 401,
                body: String::new()
            }
            .exit_code(),
            4
        );
        assert_eq!(CognateError::UserAbort.exit_code(), 5);
        assert_eq!(
            CognateError::General(anyhow::anyhow!("boom")).exit_code(),
            1
        );
    }

    #[test]
    fn test_backend_failures_fall_through() {
        assert!(CognateError::NetworkFailure("reset".into()).is_backend_failure());
        assert!(CognateError::RateLimited {
            status: 429,
            body: String::new()
        }
        .is_backend_failure());
        assert!(!CognateError::UserAbort.is_backend_failure());
        assert!(!CognateError::EmptyInstruction.is_backend_failure());
    }

    #[test]
    fn test_display_includes_status() {
        let err = CognateError::ApiFailure {
            status: 503,
            body: "unavailable".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("unavailable"));
    }
}
