use std::collections::HashMap;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use socket2::Socket;

use sfap_protocol::CommandRegistry;
use sfap_wire::Stream;

use crate::commands::vanilla_commands;
use crate::error::ServerError;
use crate::middleware::{default_auth_middleware, default_command_middleware, AuthMiddleware, CommandMiddleware};
use crate::session::{CommandHandler, Session};
use crate::shared::Shared;

const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Transforms a freshly accepted `TcpStream` into the byte stream the
/// session loop speaks — `Stream::from_tcp` by default, or a TLS-terminating
/// closure supplied by the embedder. The core never constructs a TLS
/// context itself (`spec.md` §1, §4.11, §6.5); it only consumes the result.
pub type AcceptTransform = Arc<dyn Fn(TcpStream) -> sfap_wire::Result<Stream> + Send + Sync>;

/// Programmatic configuration for [`Server::bind`], per the "explicit
/// configuration struct with two callable fields" design note in
/// `spec.md` §4.5/§9.
pub struct ServerConfig {
    pub registry: CommandRegistry<CommandHandler>,
    pub auth_middleware: AuthMiddleware,
    pub command_middleware: CommandMiddleware,
    pub info_table: HashMap<String, String>,
    pub accept_transform: AcceptTransform,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            registry: vanilla_commands(),
            auth_middleware: default_auth_middleware(),
            command_middleware: default_command_middleware(),
            info_table: HashMap::new(),
            accept_transform: Arc::new(Stream::from_tcp),
        }
    }
}

struct ReaperSignal {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

/// Owns the listening socket, the session table, middleware callbacks, and
/// the info table. Runs an acceptor thread and a reaper thread for the
/// lifetime of the server (`spec.md` §4.6).
pub struct Server {
    shared: Arc<Shared>,
    listener_socket: Socket,
    running: Arc<AtomicBool>,
    reaper_signal: Arc<ReaperSignal>,
    acceptor_thread: Mutex<Option<JoinHandle<()>>>,
    reaper_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Binds a listener at `addr` and starts the acceptor and reaper
    /// threads.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub fn bind(addr: impl ToSocketAddrs, config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).map_err(ServerError::Bind)?;
        let listener_socket = Socket::from(listener.try_clone().map_err(ServerError::Bind)?);

        let mut info_table = config.info_table;
        info_table.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

        let shared = Arc::new(Shared {
            registry: config.registry,
            auth_middleware: RwLock::new(config.auth_middleware),
            command_middleware: RwLock::new(config.command_middleware),
            info_table: RwLock::new(info_table),
            users_limit: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            finished_count: AtomicU64::new(0),
            next_id: AtomicU32::new(0),
        });

        let running = Arc::new(AtomicBool::new(true));
        let reaper_signal = Arc::new(ReaperSignal {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        });

        let acceptor_thread = {
            let shared = shared.clone();
            let running = running.clone();
            let transform = config.accept_transform;
            let listener = listener;
            std::thread::spawn(move || acceptor_loop(&listener, &shared, &running, &transform))
        };

        let reaper_thread = {
            let shared = shared.clone();
            let running = running.clone();
            let signal = reaper_signal.clone();
            std::thread::spawn(move || reaper_loop(&shared, &running, &signal))
        };

        Ok(Self {
            shared,
            listener_socket,
            running,
            reaper_signal,
            acceptor_thread: Mutex::new(Some(acceptor_thread)),
            reaper_thread: Mutex::new(Some(reaper_thread)),
        })
    }

    /// Replaces the server's info table, always restoring the mandatory
    /// `"version"` key (`spec.md` §3.6).
    pub fn set_info_table(&self, mut table: HashMap<String, String>) {
        table.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        *self.shared.info_table.write().expect("info table lock poisoned") = table;
    }

    pub fn set_auth_middleware(&self, middleware: AuthMiddleware) {
        *self.shared.auth_middleware.write().expect("auth middleware lock poisoned") = middleware;
    }

    pub fn set_command_middleware(&self, middleware: CommandMiddleware) {
        *self.shared.command_middleware.write().expect("command middleware lock poisoned") = middleware;
    }

    /// Sets (or, passing `None`, clears) the maximum number of concurrent
    /// sessions `user` may hold.
    ///
    /// # Errors
    /// Returns [`ServerError::EmptyUsername`] if `user` is empty.
    pub fn set_user_sessions_limit(&self, user: &str, limit: Option<usize>) -> Result<(), ServerError> {
        if user.is_empty() {
            return Err(ServerError::EmptyUsername);
        }

        let mut limits = self.shared.users_limit.write().expect("limits lock poisoned");
        match limit {
            Some(limit) => {
                limits.insert(user.to_string(), limit);
            }
            None => {
                limits.remove(user);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.sessions.read().expect("sessions lock poisoned").len()
    }

    #[must_use]
    pub fn finished_session_count(&self) -> u64 {
        self.shared.finished_count.load(Ordering::Relaxed)
    }

    /// Total sessions ever accepted: currently live plus reaped
    /// (`spec.md` §8 invariant 6).
    #[must_use]
    pub fn all_sessions_count(&self) -> u64 {
        self.finished_session_count() + self.session_count() as u64
    }

    #[must_use]
    pub fn user_session_count(&self, user: &str) -> usize {
        self.shared.user_session_count(user)
    }

    /// The address the listener is actually bound to (useful when binding
    /// to port 0).
    ///
    /// # Errors
    /// Propagates any I/O failure reading the socket's local address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener_socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| std::io::Error::other("bound socket is not an internet address"))
    }

    /// Closes the listener and wakes the reaper; in-flight sessions keep
    /// running until [`Server::close`] or they finish on their own.
    pub fn stop_accepting(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.listener_socket.shutdown(std::net::Shutdown::Both);
        self.notify_reaper();
    }

    fn notify_reaper(&self) {
        *self.reaper_signal.mutex.lock().expect("reaper mutex poisoned") = true;
        self.reaper_signal.condvar.notify_all();
    }

    /// Stops accepting, joins the acceptor and reaper threads, then closes
    /// every remaining session (`clean = false`, per `spec.md` §4.6).
    pub fn close(&self) {
        self.stop_accepting();

        let acceptor_thread = self.acceptor_thread.lock().expect("acceptor thread slot poisoned").take();
        if let Some(handle) = acceptor_thread {
            let _ = handle.join();
        }
        let reaper_thread = self.reaper_thread.lock().expect("reaper thread slot poisoned").take();
        if let Some(handle) = reaper_thread {
            let _ = handle.join();
        }

        let sessions: Vec<_> = self.shared.sessions.write().expect("sessions lock poisoned").drain().collect();
        for (_, session) in sessions {
            session.close(false);
        }
    }

    /// Blocks until the acceptor and reaper threads exit (e.g. after
    /// another thread calls [`Server::close`]).
    pub fn hang_on(&self) {
        loop {
            let acceptor_done = self.acceptor_thread.lock().expect("acceptor thread slot poisoned").is_none();
            let reaper_done = self.reaper_thread.lock().expect("reaper thread slot poisoned").is_none();
            if acceptor_done && reaper_done {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

fn acceptor_loop(listener: &TcpListener, shared: &Arc<Shared>, running: &AtomicBool, transform: &AcceptTransform) {
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((socket, peer)) => {
                let id = shared.next_id.fetch_add(1, Ordering::AcqRel) + 1;

                let stream = match transform(socket) {
                    Ok(stream) => stream,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to establish session stream");
                        continue;
                    }
                };

                tracing::info!(session = id, peer = %peer, "accepted connection");

                let session = Session::spawn(stream, shared.clone(), id);
                shared.sessions.write().expect("sessions lock poisoned").insert(id, session);
            }
            Err(err) if !running.load(Ordering::Acquire) => {
                let _ = err;
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "error in acceptor loop");
            }
        }
    }
}

fn reaper_loop(shared: &Arc<Shared>, running: &AtomicBool, signal: &ReaperSignal) {
    let mut guard = signal.mutex.lock().expect("reaper mutex poisoned");

    while running.load(Ordering::Acquire) {
        let (next_guard, _timeout) = signal
            .condvar
            .wait_timeout_while(guard, REAP_INTERVAL, |woken| !*woken && running.load(Ordering::Acquire))
            .expect("reaper mutex poisoned");
        guard = next_guard;
        *guard = false;

        if !running.load(Ordering::Acquire) {
            break;
        }

        let finished: Vec<u32> = shared
            .sessions
            .read()
            .expect("sessions lock poisoned")
            .iter()
            .filter(|(_, session)| session.is_finished())
            .map(|(id, _)| *id)
            .collect();

        if finished.is_empty() {
            continue;
        }

        let mut sessions = shared.sessions.write().expect("sessions lock poisoned");
        for id in &finished {
            if let Some(session) = sessions.remove(id) {
                session.close(false);
            }
        }
        drop(sessions);

        shared.finished_count.fetch_add(finished.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream as StdTcpStream;

    fn test_root() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn bind_accepts_connection_and_reports_session_count() {
        let server = Server::bind("127.0.0.1:0", ServerConfig::default()).unwrap();
        let addr = server.listener_socket.local_addr().unwrap().as_socket().unwrap();

        let _client = StdTcpStream::connect(addr).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(server.session_count(), 1);
        assert_eq!(server.all_sessions_count(), 1);
    }

    #[test]
    fn bad_magic_gets_reaped_within_one_cycle() {
        let server = Server::bind("127.0.0.1:0", ServerConfig::default()).unwrap();
        let addr = server.listener_socket.local_addr().unwrap().as_socket().unwrap();

        let mut client = StdTcpStream::connect(addr).unwrap();
        client.write_all(&[0, 0, 0, 0, 0, 0]).unwrap();
        let mut buf = [0u8; 1];
        let _ = client.read(&mut buf);
        drop(client);

        std::thread::sleep(Duration::from_millis(1300));

        assert_eq!(server.session_count(), 0);
        assert_eq!(server.finished_session_count(), 1);
    }

    #[test]
    fn user_session_limit_is_tracked() {
        let dir = test_root();
        let _ = dir;
        let server = Server::bind("127.0.0.1:0", ServerConfig::default()).unwrap();
        server.set_user_sessions_limit("alice", Some(2)).unwrap();
        assert_eq!(server.user_session_count("alice"), 0);
    }
}
