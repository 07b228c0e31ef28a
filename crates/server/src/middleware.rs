use std::path::PathBuf;

use sfap_protocol::{AuthResult, CommandResult};

/// Credentials presented by a client on `AUTH`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Outcome of a successful auth middleware call.
pub struct AuthGrant {
    pub username: String,
    pub root: PathBuf,
    pub home: Option<String>,
}

/// Auth middleware contract: `(credentials) -> (AuthResult, grant?)`.
///
/// Must be callable from many session threads concurrently and must not
/// block indefinitely on server-global state. Pure with respect to session
/// state — it never sees a `Session`.
pub type AuthMiddleware = Box<dyn Fn(&Credentials) -> (AuthResult, Option<AuthGrant>) + Send + Sync>;

/// Command middleware contract: `(id, user?) -> CommandResult`.
///
/// Side-effect free with respect to session state: it does not read or
/// write descriptors, sandbox, or stream.
pub type CommandMiddleware = Box<dyn Fn(u16, Option<&str>) -> CommandResult + Send + Sync>;

/// Accepts any credentials; root is the server process's current working
/// directory, no explicit home.
#[must_use]
pub fn default_auth_middleware() -> AuthMiddleware {
    Box::new(|credentials: &Credentials| {
        let Ok(root) = std::env::current_dir() else {
            return (AuthResult::MiddlewareError, None);
        };

        (
            AuthResult::Ok,
            Some(AuthGrant {
                username: credentials.username.clone(),
                root,
                home: None,
            }),
        )
    })
}

/// Allows a command iff the session has an authenticated user.
#[must_use]
pub fn default_command_middleware() -> CommandMiddleware {
    Box::new(|_id, user| {
        if user.is_some() {
            CommandResult::Ok
        } else {
            CommandResult::AccessDenied
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_auth_middleware_accepts_any_credentials() {
        let middleware = default_auth_middleware();
        let creds = Credentials {
            username: "u".to_string(),
            password: "p".to_string(),
        };

        let (result, grant) = middleware(&creds);
        assert_eq!(result, AuthResult::Ok);
        assert_eq!(grant.unwrap().username, "u");
    }

    #[test]
    fn default_command_middleware_requires_user() {
        let middleware = default_command_middleware();

        assert_eq!(middleware(0x10, None), CommandResult::AccessDenied);
        assert_eq!(middleware(0x10, Some("u")), CommandResult::Ok);
    }
}
