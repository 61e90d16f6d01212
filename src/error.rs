use crate::transport::TransportError;

/// Errors that stop a scan before it produces a result.
///
/// Unanswered or unparseable replies are not errors; they fold into a
/// `Filtered` verdict instead.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot start scan: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid port {0}: ports must be in 1-65535")]
    InvalidPort(u16),

    #[error("invalid port specification: {0}")]
    InvalidPortSpec(String),

    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
}

impl ScanError {
    /// True when the scan could not start because raw sockets are off limits.
    pub fn is_privilege_error(&self) -> bool {
        matches!(self, ScanError::Transport(TransportError::PermissionDenied))
    }
}
