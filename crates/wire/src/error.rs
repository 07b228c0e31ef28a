use std::io;

/// Errors produced by the byte I/O stream.
///
/// Grounded in the five-kind error taxonomy for transport-level failures:
/// framing errors and I/O errors are both fatal to the connection, but are
/// kept as distinct variants so callers can log (and test) them separately.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The underlying transport failed (TCP reset, syscall failure, TLS fault).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer performed a clean shutdown before the expected bytes arrived.
    #[error("peer closed the connection")]
    PeerClosed,

    /// A received value violates the framing contract (bad magic, enum
    /// value out of range, length that cannot be satisfied).
    #[error("framing error: {reason}")]
    Framing {
        /// Human-readable description of the violation.
        reason: String,
    },
}

impl WireError {
    pub fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
