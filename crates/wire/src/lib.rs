#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Blocking byte I/O stream with typed big-endian wire primitives.
//!
//! # Overview
//! This crate provides [`Stream`], the one logical bidirectional byte
//! stream every SFAP connection is built on top of — either a raw TCP
//! socket or a TLS-wrapped one. It is the lowest layer of the protocol
//! stack: everything above it (command framing, the session loop, the
//! client) reads and writes through this type alone.
//!
//! # Design
//! Sends and receives are independently serialized by separate locks, so
//! one thread can block reading a reply while another thread writes a
//! request on the same connection. TLS is modeled as an opaque collaborator
//! behind the `tls` feature: this crate never constructs a TLS context,
//! loads a certificate, or negotiates a handshake — it only consumes
//! something that already implements `Read + Write`.
//!
//! # Invariants
//! - `recv_raw(n)` either returns exactly `n` bytes or fails; it never
//!   returns a short read.
//! - Sent/received byte counters are monotonically increasing.
//! - Integers are big-endian on the wire in both directions.
//!
//! # Errors
//! All fallible operations return [`WireError`], classifying failures as
//! I/O errors, peer-closed, or framing violations.
//!
//! # See also
//! `sfap-protocol` for the command/result enums layered on top of these
//! primitives.

mod error;
mod primitives;
mod stream;

pub use error::{Result, WireError};
pub use primitives::WireEnum;
pub use stream::Stream;

#[cfg(feature = "tls")]
pub use stream::SecureChannel;

/// The magic value ("SFAP" ASCII, big-endian) prefixing every command
/// request.
pub const SYNC_WATCHDOG: u32 = 0x5346_4150;
