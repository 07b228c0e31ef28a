use sfap_protocol::AccessResult;

/// Errors raised while canonicalizing a host path.
///
/// Every sandbox operation that can fail surfaces an [`AccessResult`], not a
/// raw filesystem error — this type exists only to carry the underlying
/// I/O failure (if any) for logging, via [`SandboxError::result`].
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("access denied")]
    AccessDenied,

    #[error("path resolves outside the sandbox root")]
    OutsideRoot,

    #[error("I/O error while resolving path: {0}")]
    Io(#[from] std::io::Error),

    /// Construction-only: the supplied root was not an absolute, existing
    /// directory. Never produced mid-session, so it has no [`AccessResult`]
    /// mapping.
    #[error("root {0:?} must be an absolute, existing directory")]
    InvalidRoot(std::path::PathBuf),
}

impl SandboxError {
    /// Classifies this error as the [`AccessResult`] to send on the wire.
    #[must_use]
    pub fn result(&self) -> AccessResult {
        match self {
            Self::AccessDenied | Self::Io(_) | Self::InvalidRoot(_) => AccessResult::AccessDenied,
            Self::OutsideRoot => AccessResult::OutsideRoot,
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
