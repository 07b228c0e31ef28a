use std::collections::HashMap;
use std::fs::File;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use sfap_protocol::{is_always_allowed, AccessResult, AuthResult, Command, CommandResult};
use sfap_vfs::Sandbox;
use sfap_wire::{Stream, WireError, SYNC_WATCHDOG};

use crate::error::HandlerError;
use crate::middleware::Credentials;
use crate::shared::Shared;

/// A command handler's signature: read/write the session's own stream,
/// acting on the session's sandbox and descriptor table.
///
/// Invoked only while the session is in [`State::Processing`].
pub type CommandHandler = Arc<dyn Fn(&Session, &Stream) -> Result<(), HandlerError> + Send + Sync>;

/// Observable state of a [`Session`]'s worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Idle, blocked reading the next command request.
    Waiting = 0,
    /// Currently executing a command.
    Processing = 1,
}

/// Per-connection state machine: owns the byte stream, the sandbox (once
/// authenticated), the descriptor table, and the worker thread running the
/// command loop.
///
/// Holds only a non-owning [`Arc`] back into the server's shared state
/// (registry, middlewares, info table, limits) rather than an owning
/// reference to the [`crate::Server`] itself, so `Session` and `Server`
/// never own each other cyclically.
pub struct Session {
    id: u32,
    stream: Stream,
    shared: Arc<Shared>,
    finished: AtomicBool,
    state: AtomicU8,
    user: RwLock<Option<String>>,
    sandbox: RwLock<Option<Sandbox>>,
    descriptors: RwLock<HashMap<u32, File>>,
    next_descriptor: AtomicU32,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Constructs a session and launches its worker thread, returning a
    /// shared handle the caller (the acceptor) stores in the session table.
    pub(crate) fn spawn(stream: Stream, shared: Arc<Shared>, id: u32) -> Arc<Self> {
        let session = Arc::new(Self {
            id,
            stream,
            shared,
            finished: AtomicBool::new(false),
            state: AtomicU8::new(State::Waiting as u8),
            user: RwLock::new(None),
            sandbox: RwLock::new(None),
            descriptors: RwLock::new(HashMap::new()),
            next_descriptor: AtomicU32::new(0),
            thread: Mutex::new(None),
        });

        let worker = session.clone();
        let handle = std::thread::spawn(move || worker.command_loop());
        *session.thread.lock().expect("thread slot poisoned") = Some(handle);

        session
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    #[must_use]
    pub fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            0 => State::Waiting,
            _ => State::Processing,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn user(&self) -> Option<String> {
        self.user.read().expect("user lock poisoned").clone()
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<u32> {
        self.descriptors
            .read()
            .expect("descriptors lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Runs a closure with read access to the sandbox, if authenticated.
    pub fn with_sandbox<T>(&self, f: impl FnOnce(&Sandbox) -> T) -> Result<T, HandlerError> {
        let guard = self.sandbox.read().expect("sandbox lock poisoned");
        guard.as_ref().map(f).ok_or(HandlerError::NoFilesystem)
    }

    /// Runs a closure with mutable access to the sandbox (`cd`/`set_home`
    /// need `&mut Sandbox`), if authenticated.
    pub fn with_sandbox_mut<T>(&self, f: impl FnOnce(&mut Sandbox) -> T) -> Result<T, HandlerError> {
        let mut guard = self.sandbox.write().expect("sandbox lock poisoned");
        guard.as_mut().map(f).ok_or(HandlerError::NoFilesystem)
    }

    /// Registers an open file and returns its new descriptor id.
    ///
    /// Descriptors are monotonic within a session's lifetime and are never
    /// reused, even after [`Session::close_descriptor`].
    pub fn add_descriptor(&self, file: File) -> u32 {
        let id = self.next_descriptor.fetch_add(1, Ordering::AcqRel) + 1;
        self.descriptors.write().expect("descriptors lock poisoned").insert(id, file);
        id
    }

    pub fn with_descriptor_mut<T>(&self, descriptor: u32, f: impl FnOnce(&mut File) -> T) -> Option<T> {
        self.descriptors
            .write()
            .expect("descriptors lock poisoned")
            .get_mut(&descriptor)
            .map(f)
    }

    pub fn close_descriptor(&self, descriptor: u32) {
        self.descriptors.write().expect("descriptors lock poisoned").remove(&descriptor);
    }

    /// Sets `finished` and, per the session's cancellation discipline,
    /// either wakes a blocked reader (`clean` while `WAITING`, or
    /// `!clean`) or lets the in-flight turn finish on its own.
    pub fn close(&self, clean: bool) {
        self.finished.store(true, Ordering::Release);

        if !clean || self.state() == State::Waiting {
            self.stream.close();
        }

        let handle = self.thread.lock().expect("thread slot poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn command_loop(self: Arc<Self>) {
        loop {
            if self.finished.load(Ordering::Acquire) {
                break;
            }

            self.state.store(State::Waiting as u8, Ordering::Release);

            let Ok(magic) = self.stream.recv_u32() else { break };

            if magic != SYNC_WATCHDOG {
                tracing::warn!(session = self.id, "desynchronization detected, closing session");
                break;
            }

            let Ok(command_id) = self.stream.recv_u16() else { break };

            self.state.store(State::Processing as u8, Ordering::Release);

            if let Err(err) = self.dispatch(command_id) {
                tracing::warn!(session = self.id, command_id, error = %err, "turn failed, closing session");
                break;
            }
        }

        self.finished.store(true, Ordering::Release);
    }

    fn dispatch(&self, command_id: u16) -> Result<(), WireError> {
        if is_always_allowed(command_id) {
            self.stream.send_enum(CommandResult::Ok)?;
            return self.run_builtin(command_id);
        }

        if !self.shared.registry.exists(command_id) {
            self.stream.send_enum(CommandResult::Unknown)?;
            return Ok(());
        }

        let user = self.user();
        let middleware = self.shared.command_middleware.read().expect("command middleware lock poisoned");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (middleware)(command_id, user.as_deref())))
            .unwrap_or(CommandResult::MiddlewareError);
        drop(middleware);

        self.stream.send_enum(result)?;

        if result == CommandResult::Ok {
            let handler = self
                .shared
                .registry
                .get(command_id)
                .map_err(|e| WireError::framing(e.to_string()))?;
            if let Err(err) = handler(self, &self.stream) {
                return Err(match err {
                    HandlerError::Wire(wire) => wire,
                    HandlerError::NoFilesystem => {
                        WireError::framing("handler ran without an authenticated filesystem")
                    }
                });
            }
        }

        Ok(())
    }

    fn run_builtin(&self, command_id: u16) -> Result<(), WireError> {
        let Some(command) = Command::from_id(command_id) else {
            return Err(WireError::framing(format!("unknown always-allowed id {command_id}")));
        };

        match command {
            Command::None => Ok(()),
            Command::Bye => {
                self.finished.store(true, Ordering::Release);
                Ok(())
            }
            Command::ServerInfo => self.handle_server_info(),
            Command::Commands => self.handle_commands(),
            Command::Descriptors => self.handle_descriptors(),
            Command::Auth => self.handle_auth(),
            Command::Clear => {
                self.handle_clear();
                Ok(())
            }
            _ => Err(WireError::framing(format!("{command_id} is not always-allowed"))),
        }
    }

    fn handle_server_info(&self) -> Result<(), WireError> {
        let table = self.shared.info_table.read().expect("info table lock poisoned").clone();

        self.stream.send_u16(table.len() as u16)?;
        for (key, value) in &table {
            self.stream.send_string(key)?;
            self.stream.send_string(value)?;
        }

        Ok(())
    }

    fn handle_commands(&self) -> Result<(), WireError> {
        let list = self.shared.registry.command_list();

        self.stream.send_u16(list.len() as u16)?;
        for (id, name) in list {
            self.stream.send_u16(id)?;
            self.stream.send_string(&name)?;
        }

        Ok(())
    }

    fn handle_descriptors(&self) -> Result<(), WireError> {
        let ids = self.descriptors();

        self.stream.send_u32(ids.len() as u32)?;
        for id in ids {
            self.stream.send_u32(id)?;
        }

        Ok(())
    }

    fn handle_auth(&self) -> Result<(), WireError> {
        let username = self.stream.recv_string()?;
        let password = self.stream.recv_string()?;
        let credentials = Credentials { username, password };

        {
            let limits = self.shared.users_limit.read().expect("limits lock poisoned");
            if let Some(&limit) = limits.get(&credentials.username)
                && self.shared.user_session_count(&credentials.username) >= limit
            {
                self.stream.send_enum(AuthResult::UserLimitReached)?;
                return Ok(());
            }
        }

        let middleware = self.shared.auth_middleware.read().expect("auth middleware lock poisoned");
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (middleware)(&credentials)));
        drop(middleware);

        let Ok((auth_result, grant)) = outcome else {
            self.stream.send_enum(AuthResult::MiddlewareError)?;
            return Ok(());
        };

        let Some(grant) = grant.filter(|_| auth_result == AuthResult::Ok) else {
            self.stream.send_enum(auth_result)?;
            return Ok(());
        };

        if grant.username.is_empty() || !grant.root.is_absolute() || !grant.root.is_dir() {
            self.stream.send_enum(AuthResult::MiddlewareError)?;
            return Ok(());
        }

        let Ok(mut sandbox) = Sandbox::new(&grant.root) else {
            self.stream.send_enum(AuthResult::MiddlewareError)?;
            return Ok(());
        };

        if let Some(home) = &grant.home
            && (sandbox.set_home(home) != AccessResult::Ok || sandbox.cd("~") != AccessResult::Ok)
        {
            self.stream.send_enum(AuthResult::MiddlewareError)?;
            return Ok(());
        }

        {
            let had_user = self.user.read().expect("user lock poisoned").is_some();
            if had_user {
                self.descriptors.write().expect("descriptors lock poisoned").clear();
            }
        }

        *self.user.write().expect("user lock poisoned") = Some(grant.username.clone());
        let home = sandbox.home().to_string();
        let cwd = sandbox.cwd().to_string();
        *self.sandbox.write().expect("sandbox lock poisoned") = Some(sandbox);

        tracing::info!(session = self.id, user = %grant.username, "authenticated");

        self.stream.send_enum(AuthResult::Ok)?;
        self.stream.send_string(&grant.username)?;
        self.stream.send_path(&home)?;
        self.stream.send_path(&cwd)?;

        Ok(())
    }

    fn handle_clear(&self) {
        self.descriptors.write().expect("descriptors lock poisoned").clear();
        *self.user.write().expect("user lock poisoned") = None;
        *self.sandbox.write().expect("sandbox lock poisoned") = None;
    }
}
