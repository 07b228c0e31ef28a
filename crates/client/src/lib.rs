#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Blocking client for connecting to and interacting with an SFAP server.
//!
//! # Overview
//! [`Client`] owns one [`sfap_wire::Stream`] and issues command requests
//! over it one turn at a time: send the sync magic, send the command id,
//! read the [`sfap_protocol::CommandResult`], and — only on `Ok` — read or
//! write whatever the command's own wire format specifies.
//!
//! # Design
//! `cwd`/`home` are cached client-side after every `AUTH` or mutating
//! call; [`Client::pwd`]/[`Client::home`] only round-trip to the server
//! when explicitly asked to bypass the cache.
//!
//! # Errors
//! Every fallible method returns [`ClientError`], which distinguishes a
//! denied command result, a denied/invalid path operation, and transport
//! failure so callers can match on the specific cause.

mod error;

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

pub use error::ClientError;
use sfap_protocol::{AccessResult, AuthResult, Command, CommandResult, FileType};
use sfap_wire::{Stream, SYNC_WATCHDOG};

/// Credentials presented on [`Client::authorize`].
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One entry of an `LS` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_type: FileType,
    pub path: String,
    pub size: u64,
}

#[derive(Default)]
struct Cache {
    cwd: String,
    home: String,
}

/// A connection to an SFAP server plus the client-side cache built up over
/// its lifetime (authorized username, cached cwd/home).
///
/// Holds its own [`Stream`], never a reference into a [`sfap_server`]-side
/// type — client and server share only the `sfap-wire`/`sfap-protocol`
/// vocabulary, never Rust types.
pub struct Client {
    stream: Stream,
    address: SocketAddr,
    credentials: Option<Credentials>,
    username: Option<String>,
    cache: Cache,
}

impl Client {
    /// Connects to `addr` without attempting authorization.
    ///
    /// # Errors
    /// Returns [`ClientError::Wire`] if the connection cannot be
    /// established.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let address = addr
            .to_socket_addrs()
            .map_err(sfap_wire::WireError::from)?
            .next()
            .ok_or_else(|| sfap_wire::WireError::framing("address resolved to no candidates"))?;

        let tcp = match TcpStream::connect(address) {
            Ok(tcp) => tcp,
            Err(err) => {
                tracing::warn!(peer = %address, error = %err, "failed to connect");
                return Err(sfap_wire::WireError::from(err).into());
            }
        };
        let stream = Stream::from_tcp(tcp)?;

        tracing::info!(peer = %address, "connected");

        Ok(Self {
            stream,
            address,
            credentials: None,
            username: None,
            cache: Cache::default(),
        })
    }

    /// Connects to `addr` and immediately authorizes with `credentials`.
    ///
    /// # Errors
    /// Returns [`ClientError::Wire`] if the connection cannot be
    /// established, or [`ClientError::AuthDenied`] if authorization fails.
    pub fn connect_with_credentials(addr: impl ToSocketAddrs, credentials: &Credentials) -> Result<Self, ClientError> {
        let mut client = Self::connect(addr)?;
        client.authorize(credentials)?;
        Ok(client)
    }

    /// Opens a second connection to the same address, re-authenticating
    /// with the same cached credentials (if any). Useful for running
    /// parallel descriptor operations against one session's filesystem.
    ///
    /// # Errors
    /// Returns [`ClientError::Wire`] if the new connection cannot be
    /// established, or [`ClientError::AuthDenied`] if re-authorization
    /// fails.
    pub fn try_clone(&self) -> Result<Self, ClientError> {
        match &self.credentials {
            Some(credentials) => Self::connect_with_credentials(self.address, credentials),
            None => Self::connect(self.address),
        }
    }

    /// Sends a `NONE` request; a no-op that exercises the connection.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails or is denied.
    pub fn noop(&self) -> Result<(), ClientError> {
        self.request_command(Command::None)
    }

    /// Sends `BYE`, ending the session. The underlying stream is not
    /// dropped — the caller may still read the server's shutdown-side
    /// effects via further reads, but no further requests should be sent.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails.
    pub fn close(&self) -> Result<(), ClientError> {
        self.request_command(Command::Bye)
    }

    /// Authorizes the connection with `credentials`, caching the
    /// authorized username, home, and cwd on success.
    ///
    /// # Errors
    /// Returns [`ClientError::AuthDenied`] if the server rejects the
    /// credentials, or [`ClientError::Wire`] on transport failure.
    pub fn authorize(&mut self, credentials: &Credentials) -> Result<(), ClientError> {
        self.request_command(Command::Auth)?;

        self.stream.send_string(&credentials.username)?;
        self.stream.send_string(&credentials.password)?;

        let result = self.stream.recv_enum::<AuthResult>()?;
        if result != AuthResult::Ok {
            tracing::warn!(user = %credentials.username, result = ?result, "authorization denied");
            return Err(ClientError::AuthDenied(result));
        }

        self.username = Some(self.stream.recv_string()?);
        self.cache.home = self.stream.recv_path()?;
        self.cache.cwd = self.stream.recv_path()?;
        self.credentials = Some(credentials.clone());

        tracing::info!(user = %credentials.username, "authenticated");

        Ok(())
    }

    /// Clears the server-side session state and the local cache.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails.
    pub fn clear(&mut self) -> Result<(), ClientError> {
        self.request_command(Command::Clear)?;
        self.username = None;
        self.credentials = None;
        self.cache = Cache::default();
        Ok(())
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.username.is_some()
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.stream.is_secure()
    }

    /// Fetches the server's full `id -> name` command table.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails.
    pub fn server_commands(&self) -> Result<Vec<(u16, String)>, ClientError> {
        self.request_command(Command::Commands)?;

        let count = self.stream.recv_u16()?;
        let mut table = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = self.stream.recv_u16()?;
            let name = self.stream.recv_string()?;
            table.push((id, name));
        }

        Ok(table)
    }

    /// Fetches the server's `SERVER_INFO` key/value table.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails.
    pub fn server_info(&self) -> Result<Vec<(String, String)>, ClientError> {
        self.request_command(Command::ServerInfo)?;

        let count = self.stream.recv_u16()?;
        let mut table = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = self.stream.recv_string()?;
            let value = self.stream.recv_string()?;
            table.push((key, value));
        }

        Ok(table)
    }

    /// Fetches the session's currently open descriptor ids.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails.
    pub fn descriptors(&self) -> Result<Vec<u32>, ClientError> {
        self.request_command(Command::Descriptors)?;

        let count = self.stream.recv_u32()?;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(self.stream.recv_u32()?);
        }

        Ok(ids)
    }

    /// Changes the session's working directory, updating the local cwd
    /// cache on success.
    ///
    /// # Errors
    /// Returns [`ClientError::AccessFailed`] if the server denies the
    /// change, or [`ClientError`] on transport failure.
    pub fn cd(&mut self, path: &str) -> Result<String, ClientError> {
        self.request_command(Command::Cd)?;
        self.stream.send_path(path)?;

        let result = self.stream.recv_enum::<AccessResult>()?;
        if result != AccessResult::Ok {
            return Err(ClientError::AccessFailed(result));
        }

        self.cache.cwd = self.stream.recv_path()?;
        Ok(self.cache.cwd.clone())
    }

    /// Returns the working directory, optionally bypassing the cache to
    /// force a live `PWD` round trip.
    ///
    /// # Errors
    /// Returns [`ClientError`] if a live query is requested and fails.
    pub fn pwd(&mut self, use_cache: bool) -> Result<String, ClientError> {
        if !use_cache {
            self.request_command(Command::Pwd)?;
            self.cache.cwd = self.stream.recv_path()?;
        }
        Ok(self.cache.cwd.clone())
    }

    /// Returns the home directory, optionally bypassing the cache to force
    /// a live `HOME` round trip.
    ///
    /// # Errors
    /// Returns [`ClientError`] if a live query is requested and fails.
    pub fn home(&mut self, use_cache: bool) -> Result<String, ClientError> {
        if !use_cache {
            self.request_command(Command::Home)?;
            self.cache.home = self.stream.recv_path()?;
        }
        Ok(self.cache.home.clone())
    }

    /// Lists the contents of `path` on the remote server.
    ///
    /// # Errors
    /// Returns [`ClientError::AccessFailed`] if the server denies the
    /// listing, or [`ClientError`] on transport failure.
    pub fn ls(&self, path: &str) -> Result<Vec<FileInfo>, ClientError> {
        self.request_command(Command::Ls)?;
        self.stream.send_path(path)?;

        let result = self.stream.recv_enum::<AccessResult>()?;
        if result != AccessResult::Ok {
            return Err(ClientError::AccessFailed(result));
        }

        let count = self.stream.recv_u32()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let file_type = self.stream.recv_enum::<FileType>()?;
            let path = self.stream.recv_path()?;
            let size = self.stream.recv_u64()?;
            entries.push(FileInfo { file_type, path, size });
        }

        Ok(entries)
    }

    /// Opens a remote file descriptor, per the `mode` bits in
    /// [`sfap_protocol::open_mode`].
    ///
    /// # Errors
    /// Returns [`ClientError::AccessFailed`] if the server denies the
    /// open, or [`ClientError`] on transport failure.
    pub fn open_descriptor(&self, path: &str, mode: u32) -> Result<u32, ClientError> {
        self.request_command(Command::Open)?;
        self.stream.send_path(path)?;
        self.stream.send_u32(mode)?;

        let result = self.stream.recv_enum::<AccessResult>()?;
        if result != AccessResult::Ok {
            return Err(ClientError::AccessFailed(result));
        }

        Ok(self.stream.recv_u32()?)
    }

    /// Closes a remote file descriptor.
    ///
    /// # Errors
    /// Returns [`ClientError`] if the request fails.
    pub fn close_descriptor(&self, descriptor: u32) -> Result<(), ClientError> {
        self.request_command(Command::Close)?;
        self.stream.send_u32(descriptor)?;
        Ok(())
    }

    fn request_command(&self, command: Command) -> Result<(), ClientError> {
        self.stream.send_u32(SYNC_WATCHDOG)?;
        self.stream.send_u16(command.id())?;

        let result = self.stream.recv_enum::<CommandResult>()?;
        if result == CommandResult::Ok {
            Ok(())
        } else {
            Err(ClientError::from_command_result(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn spawn_echo_server() -> (std::net::SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let server_stream = Stream::from_tcp(socket).unwrap();

            let magic = server_stream.recv_u32().unwrap();
            assert_eq!(magic, SYNC_WATCHDOG);
            let command_id = server_stream.recv_u16().unwrap();
            assert_eq!(command_id, Command::None.id());
            server_stream.send_enum(CommandResult::Ok).unwrap();
        });

        (addr, handle)
    }

    #[test]
    fn noop_round_trips_ok() {
        let (addr, handle) = spawn_echo_server();
        let client = Client::connect(addr).unwrap();

        client.noop().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn request_command_surfaces_denied_result() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let server_stream = Stream::from_tcp(socket).unwrap();
            let _ = server_stream.recv_u32().unwrap();
            let _ = server_stream.recv_u16().unwrap();
            server_stream.send_enum(CommandResult::AccessDenied).unwrap();
        });

        let client = Client::connect(addr).unwrap();
        let err = client.noop().unwrap_err();
        assert!(matches!(err, ClientError::AccessDenied));
        handle.join().unwrap();
    }

    #[test]
    fn open_mode_read_bit_is_distinct_from_write() {
        assert_ne!(sfap_protocol::open_mode::READ, sfap_protocol::open_mode::WRITE);
    }
}
