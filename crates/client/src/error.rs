use sfap_protocol::{AccessResult, AuthResult, CommandResult};

/// Errors a [`crate::Client`] call can fail with.
///
/// Mirrors the exception taxonomy of the original client: a denied command
/// result, a denied/invalid path operation, or a transport failure, each
/// kept as a distinct variant rather than a single opaque error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Wire(#[from] sfap_wire::WireError),

    #[error("command denied by the server's command middleware")]
    AccessDenied,

    #[error("command is temporarily unavailable")]
    Unavailable,

    #[error("command is permanently disabled by server configuration")]
    Disabled,

    #[error("command is not supported by this server")]
    Unsupported,

    #[error("an exception occurred in the command's middleware layer")]
    MiddlewareError,

    #[error("command does not exist in the server's command registry")]
    UnknownCommand,

    #[error("credentials were rejected: {0:?}")]
    AuthDenied(AuthResult),

    #[error("path operation failed: {0:?}")]
    AccessFailed(AccessResult),
}

impl ClientError {
    /// Converts a non-`Ok` [`CommandResult`] into the matching error
    /// variant. Callers never construct this from `CommandResult::Ok`.
    #[must_use]
    pub fn from_command_result(result: CommandResult) -> Self {
        match result {
            CommandResult::Ok => unreachable!("Ok is not an error"),
            CommandResult::AccessDenied => Self::AccessDenied,
            CommandResult::Unavailable => Self::Unavailable,
            CommandResult::Disabled => Self::Disabled,
            CommandResult::Unsupported => Self::Unsupported,
            CommandResult::MiddlewareError => Self::MiddlewareError,
            CommandResult::Unknown => Self::UnknownCommand,
        }
    }
}
