use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64};
use std::sync::{Arc, RwLock};

use sfap_protocol::CommandRegistry;

use crate::middleware::{AuthMiddleware, CommandMiddleware};
use crate::session::{CommandHandler, Session};

/// The server-owned state every [`Session`] needs a read-only window into:
/// the command registry, both middlewares, the info table, and the per-user
/// session limits, plus the session table and reaper bookkeeping itself.
///
/// `Session` holds only an `Arc<Shared>` back-reference rather than an
/// owning handle to [`crate::Server`], so the two types never own each
/// other cyclically (per the spec's design note on cyclic ownership).
pub(crate) struct Shared {
    pub(crate) registry: CommandRegistry<CommandHandler>,
    pub(crate) auth_middleware: RwLock<AuthMiddleware>,
    pub(crate) command_middleware: RwLock<CommandMiddleware>,
    pub(crate) info_table: RwLock<HashMap<String, String>>,
    pub(crate) users_limit: RwLock<HashMap<String, usize>>,
    pub(crate) sessions: RwLock<HashMap<u32, Arc<Session>>>,
    pub(crate) finished_count: AtomicU64,
    pub(crate) next_id: AtomicU32,
}

impl Shared {
    pub(crate) fn user_session_count(&self, user: &str) -> usize {
        self.sessions
            .read()
            .expect("sessions lock poisoned")
            .values()
            .filter(|session| session.user().as_deref() == Some(user))
            .count()
    }
}
