#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Virtual filesystem sandbox: path rewriting between a virtual namespace
//! and a host root.
//!
//! # Overview
//! [`Sandbox`] holds `(root, home, cwd)` and translates between the
//! user-facing virtual namespace (rooted at `/`, with `~` aliasing `home`)
//! and real host paths, enforcing that no resolved path escapes `root`.
//!
//! # Invariants
//! - `root` is always absolute and canonical.
//! - `check_access` never follows a symlink out of `root`: canonicalization
//!   happens before the containment check, so a symlink whose target lies
//!   outside `root` fails `OUTSIDE_ROOT` even though the link itself lives
//!   inside it.
//! - `to_system` and `to_virtual` are inverse on any host path for which
//!   `check_access` succeeds.
//!
//! # Errors
//! Translation failures are reported as [`sfap_protocol::AccessResult`] at
//! the sandbox boundary; see [`SandboxError`] for the richer internal error
//! used before that classification.

mod error;
mod path_util;
mod sandbox;

pub use error::{Result, SandboxError};
pub use sandbox::Sandbox;
