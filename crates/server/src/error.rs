/// Errors that can escape a command handler and terminate the session,
/// folded into the same fatal-kind treatment as a framing or I/O error.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Wire(#[from] sfap_wire::WireError),

    /// The handler required an authenticated sandbox but none was present —
    /// only reachable if a command middleware allows a vanilla command
    /// through without a user, which the default middleware never does.
    #[error("session has no active filesystem")]
    NoFilesystem,
}

/// Errors that can occur constructing or running a [`crate::Server`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("user name must not be empty")]
    EmptyUsername,
}
