//! Server session management.
//!
//! Handles per-client session state including:
//! - Session identity (session id, user id, group id, display name)
//! - The session table and its user index
//! - Per-session write serialization
//!
//! A session id is assigned monotonically from 1 and never reused within a
//! server lifetime. User and group ids arrive later, via the `CONNECT:`
//! handshake; until then a session carries identity (0, 0) and is reachable
//! only by broadcast.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::transport::{Frame, TransportResult, send_frame};

/// Write handle a session owns. Boxed so the table can be exercised with
/// in-memory streams as well as TCP write halves.
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One live connection, as the server sees it.
///
/// Identity fields are atomics so routing can read them without touching
/// the session-table mutex; all writes go through [`SessionManager`] so the
/// user index stays consistent. The write half sits behind its own async
/// mutex: every send to this session, from its own loop or from fan-out,
/// serializes there.
pub struct Session {
    id: u64,
    user_id: AtomicU32,
    group_id: AtomicU32,
    name: Mutex<Option<String>>,
    alive: AtomicBool,
    writer: tokio::sync::Mutex<SessionWriter>,
}

impl Session {
    fn new(id: u64, writer: SessionWriter) -> Self {
        Self {
            id,
            user_id: AtomicU32::new(0),
            group_id: AtomicU32::new(0),
            name: Mutex::new(Some(format!("Client-{id}"))),
            alive: AtomicBool::new(true),
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    /// Server-assigned session id, unique for the server lifetime.
    pub fn session_id(&self) -> u64 {
        self.id
    }

    /// Current user id (0 until the handshake lands).
    pub fn user_id(&self) -> u32 {
        self.user_id.load(Ordering::SeqCst)
    }

    /// Current group id (0 until the handshake lands).
    pub fn group_id(&self) -> u32 {
        self.group_id.load(Ordering::SeqCst)
    }

    /// Display name; defaults to `Client-<session id>`.
    pub fn name(&self) -> Option<String> {
        lock(&self.name).clone()
    }

    /// Replace the display name.
    pub fn set_name(&self, name: Option<String>) {
        *lock(&self.name) = name;
    }

    /// False once the session has been destroyed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send one frame to this session, holding its write lock for the
    /// duration so concurrent fan-outs never interleave bytes.
    pub async fn send(&self, frame: &Frame) -> TransportResult<()> {
        let mut writer = self.writer.lock().await;
        send_frame(&mut *writer, frame).await
    }

    /// Shut down the write half. Idempotent; shutdown errors from an
    /// already-gone peer are ignored.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn set_identity_fields(&self, user_id: u32, group_id: u32) {
        self.user_id.store(user_id, Ordering::SeqCst);
        self.group_id.store(group_id, Ordering::SeqCst);
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id())
            .field("group_id", &self.group_id())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Tables {
    by_session: HashMap<u64, Arc<Session>>,
    by_user: HashMap<u32, HashSet<u64>>,
    next_session_id: u64,
}

/// The session table: every live connection exactly once, plus a secondary
/// user-id index for user-targeted routing.
///
/// Both maps and the id counter live under ONE mutex. Mutations and
/// consistent reads take it; snapshots copy `Arc`s out under the lock and
/// deliver after release, so no send ever happens while the table is held.
pub struct SessionManager {
    tables: Mutex<Tables>,
}

impl SessionManager {
    /// Create an empty table. Ids start at 1.
    pub fn new() -> Self {
        Self { tables: Mutex::new(Tables::default()) }
    }

    /// Register a new connection with identity (0, 0).
    pub fn create(&self, writer: SessionWriter) -> Arc<Session> {
        let mut tables = lock(&self.tables);
        tables.next_session_id += 1;
        let id = tables.next_session_id;
        let session = Arc::new(Session::new(id, writer));
        tables.by_session.insert(id, Arc::clone(&session));
        debug!(session_id = id, "session created");
        session
    }

    /// Rewrite a session's identity, keeping the user index consistent.
    ///
    /// The old user id (if non-zero) is unregistered and its index entry
    /// pruned when empty; the new user id (if non-zero) is registered. Both
    /// happen under the table lock, so a concurrent snapshot sees either the
    /// old identity or the new one, never half of each.
    ///
    /// Returns false when the session id is unknown (already destroyed).
    pub fn set_identity(&self, session_id: u64, user_id: u32, group_id: u32) -> bool {
        let mut tables = lock(&self.tables);
        let Some(session) = tables.by_session.get(&session_id).cloned() else {
            return false;
        };

        let old_user = session.user_id();
        if old_user != 0 {
            unregister_user(&mut tables, old_user, session_id);
        }
        session.set_identity_fields(user_id, group_id);
        if user_id != 0 {
            tables.by_user.entry(user_id).or_default().insert(session_id);
        }
        debug!(session_id, user_id, group_id, "session identity updated");
        true
    }

    /// Remove a session from both tables and mark it dead. Idempotent.
    ///
    /// Returns the removed session so the caller can close its writer
    /// outside the table lock.
    pub fn destroy(&self, session_id: u64) -> Option<Arc<Session>> {
        let mut tables = lock(&self.tables);
        let session = tables.by_session.remove(&session_id)?;
        let user_id = session.user_id();
        if user_id != 0 {
            unregister_user(&mut tables, user_id, session_id);
        }
        session.mark_dead();
        debug!(session_id, "session destroyed");
        Some(session)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        lock(&self.tables).by_session.len()
    }

    /// True when no session is connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out every live session.
    pub fn snapshot_all(&self) -> Vec<Arc<Session>> {
        lock(&self.tables).by_session.values().cloned().collect()
    }

    /// Copy out every session registered under `user_id`.
    pub fn snapshot_user(&self, user_id: u32) -> Vec<Arc<Session>> {
        let tables = lock(&self.tables);
        let Some(ids) = tables.by_user.get(&user_id) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| tables.by_session.get(id).cloned()).collect()
    }

    /// Copy out every session currently in `group_id`.
    pub fn snapshot_group(&self, group_id: u32) -> Vec<Arc<Session>> {
        lock(&self.tables)
            .by_session
            .values()
            .filter(|s| s.group_id() == group_id)
            .cloned()
            .collect()
    }

    /// Copy out sessions matching both ids.
    pub fn snapshot_user_group(&self, user_id: u32, group_id: u32) -> Vec<Arc<Session>> {
        self.snapshot_user(user_id)
            .into_iter()
            .filter(|s| s.group_id() == group_id)
            .collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").field("sessions", &self.len()).finish()
    }
}

fn unregister_user(tables: &mut Tables, user_id: u32, session_id: u64) {
    if let Some(ids) = tables.by_user.get_mut(&user_id) {
        ids.remove(&session_id);
        if ids.is_empty() {
            tables.by_user.remove(&user_id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
