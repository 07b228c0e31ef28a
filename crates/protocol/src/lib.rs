#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Wire constants, command/result enums, and the thread-safe command
//! registry.
//!
//! # Overview
//! This crate has no I/O of its own; it is the shared vocabulary between
//! `sfap-server` and `sfap-client`: the [`Command`] table and
//! always-allowed set, the three result enums ([`CommandResult`],
//! [`AuthResult`], [`AccessResult`]) and [`FileType`], and
//! [`CommandRegistry`], the generic id-to-handler map both sides build on.
//!
//! # See also
//! `sfap-wire` for the byte-level primitives these enums are encoded with.

mod command;
pub mod open_mode;
mod registry;
mod result;

pub use command::{is_always_allowed, Command};
pub use registry::{CommandRegistry, RegistryError};
pub use result::{AccessResult, AuthResult, CommandResult, FileType};
