#![deny(unsafe_code)]

//! Session state machine, command dispatcher, and TCP server for SFAP.
//!
//! # Overview
//! [`Server`] owns a listener, an acceptor thread, and a reaper thread.
//! Each accepted connection becomes a [`Session`] running its own worker
//! thread, which reads magic-gated command requests off the wire and
//! dispatches them through a [`CommandMiddleware`] into the handlers
//! registered in a [`sfap_protocol::CommandRegistry`].
//!
//! # Design
//! `Session` holds only a non-owning `Arc` back-reference into the
//! server's shared state (the registry, both middlewares, the info table,
//! session limits) rather than an owning handle to [`Server`] itself, so
//! the two types never form a reference cycle.
//!
//! # See also
//! [`commands::vanilla_commands`] for the default `cd`/`pwd`/`home`/`ls`/
//! `open`/`close` handler set new servers are configured with.

mod commands;
mod error;
mod middleware;
mod server;
mod session;
mod shared;

pub use commands::vanilla_commands;
pub use error::{HandlerError, ServerError};
pub use middleware::{
    default_auth_middleware, default_command_middleware, AuthGrant, AuthMiddleware, CommandMiddleware, Credentials,
};
pub use server::{AcceptTransform, Server, ServerConfig};
pub use session::{CommandHandler, Session, State};
