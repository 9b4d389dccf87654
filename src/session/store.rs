// ABOUTME: Session store — bounded per-session turn history shared by all request handlers.
// ABOUTME: Evicts oldest turns first, orders same-session writes with append tickets, snapshots to disk.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::session::persistence::{self, Snapshot};
use crate::session::turn::Turn;

#[derive(Default)]
struct History {
    /// Conversational window, at most `max_turns` long.
    window: VecDeque<Turn>,
    /// Retained transcript for the snapshot, at most `retention` long.
    transcript: VecDeque<Turn>,
}

/// One conversation. Created lazily, never deleted while the process runs.
pub struct Session {
    history: Mutex<History>,
    /// Completion signal of the most recently reserved append ticket.
    tail: Mutex<Option<oneshot::Receiver<Handoff>>>,
    max_turns: usize,
    retention: usize,
}

impl Session {
    fn new(max_turns: usize, retention: usize) -> Self {
        Self {
            history: Mutex::new(History::default()),
            tail: Mutex::new(None),
            max_turns,
            retention,
        }
    }

    /// Current conversational window, oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.history.lock().window.iter().cloned().collect()
    }

    /// Retained transcript, oldest first.
    pub fn transcript(&self) -> Vec<Turn> {
        self.history.lock().transcript.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append turns under a single lock so no partial write is ever visible.
    fn push_all(&self, turns: impl IntoIterator<Item = Turn>) {
        let mut history = self.history.lock();
        for turn in turns {
            history.window.push_back(turn.clone());
            history.transcript.push_back(turn);
        }
        while history.window.len() > self.max_turns {
            history.window.pop_front();
        }
        while history.transcript.len() > self.retention {
            history.transcript.pop_front();
        }
    }

    fn replace(&self, turns: Vec<Turn>) {
        let mut history = self.history.lock();
        let transcript: VecDeque<Turn> = turns
            .into_iter()
            .rev()
            .take(self.retention)
            .rev()
            .collect();
        let skip = transcript.len().saturating_sub(self.max_turns);
        history.window = transcript.iter().skip(skip).cloned().collect();
        history.transcript = transcript;
    }
}

/// Sent by a ticket when it finishes. A ticket dropped before its own turn carries
/// its still-pending predecessor so the successor keeps waiting on it.
struct Handoff(Option<oneshot::Receiver<Handoff>>);

/// A reserved position in a session's write order.
///
/// Tickets commit in the order they were reserved. Dropping an uncommitted ticket
/// passes its place in line to the next one.
pub struct AppendTicket {
    session: Arc<Session>,
    predecessor: Option<oneshot::Receiver<Handoff>>,
    done: Option<oneshot::Sender<Handoff>>,
}

impl AppendTicket {
    /// Wait for every earlier ticket on this session, then append `turns` atomically.
    pub async fn commit(mut self, turns: impl IntoIterator<Item = Turn>) {
        self.wait_for_predecessors().await;
        self.session.push_all(turns);
        if let Some(done) = self.done.take() {
            let _ = done.send(Handoff(None));
        }
    }

    /// Awaits in place so a cancelled commit still holds the pending receiver for `Drop`.
    async fn wait_for_predecessors(&mut self) {
        while let Some(predecessor) = self.predecessor.as_mut() {
            // A closed channel means the earlier ticket is gone with nothing to forward.
            self.predecessor = predecessor.await.ok().and_then(|handoff| handoff.0);
        }
    }
}

impl Drop for AppendTicket {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(Handoff(self.predecessor.take()));
        }
    }
}

/// Mapping from session key to bounded turn history.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_turns: usize,
    retention: usize,
    snapshot_path: Option<PathBuf>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl SessionStore {
    /// Create an in-memory store. `retention` is raised to `max_turns` if smaller.
    pub fn new(max_turns: usize, retention: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
            retention: retention.max(max_turns),
            snapshot_path: None,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Persist to `path` on every [`flush`](Self::flush).
    pub fn with_snapshot_path(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Return the session for `key`, creating an empty one on first reference.
    pub fn get_or_create(&self, key: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().get(key) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Session::new(self.max_turns, self.retention)));
        Arc::clone(session)
    }

    /// Append one turn, evicting the oldest turns beyond the cap.
    pub fn append_turn(&self, key: &str, turn: Turn) {
        self.get_or_create(key).push_all([turn]);
    }

    /// Reserve the next write slot for `key`. Must be called when the request starts.
    pub fn reserve(&self, key: &str) -> AppendTicket {
        let session = self.get_or_create(key);
        let (done, signal) = oneshot::channel();
        let predecessor = session.tail.lock().replace(signal);
        AppendTicket {
            session,
            predecessor,
            done: Some(done),
        }
    }

    /// The last `n` turns for `key` (capped at `max_turns`), oldest first. Never mutates.
    pub fn window(&self, key: &str, n: usize) -> Vec<Turn> {
        let sessions = self.sessions.read();
        let Some(session) = sessions.get(key) else {
            return Vec::new();
        };
        let history = session.history.lock();
        let n = n.min(self.max_turns);
        let skip = history.window.len().saturating_sub(n);
        history.window.iter().skip(skip).cloned().collect()
    }

    /// Full conversational window for `key`.
    pub fn history(&self, key: &str) -> Vec<Turn> {
        self.window(key, self.max_turns)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Total turns across every session's window.
    pub fn message_count(&self) -> usize {
        self.sessions.read().values().map(|s| s.len()).sum()
    }

    /// Serialize every session's retained transcript.
    pub fn snapshot(&self) -> Snapshot {
        let sessions = self.sessions.read();
        Snapshot {
            sessions: sessions
                .iter()
                .map(|(key, session)| (key.clone(), session.transcript()))
                .collect(),
        }
    }

    /// Replace the store's contents with `snapshot`, applying both caps.
    pub fn restore(&self, snapshot: Snapshot) {
        let mut sessions = self.sessions.write();
        sessions.clear();
        for (key, turns) in snapshot.sessions {
            let session = Session::new(self.max_turns, self.retention);
            session.replace(turns);
            sessions.insert(key, Arc::new(session));
        }
    }

    /// Restore from serialized JSON. Corrupt data leaves the store empty.
    pub fn restore_json(&self, data: &str) {
        match serde_json::from_str::<Snapshot>(data) {
            Ok(snapshot) => self.restore(snapshot),
            Err(e) => {
                warn!(error = %e, "session snapshot is corrupt, starting empty");
                self.restore(Snapshot::default());
            }
        }
    }

    /// Restore from the configured snapshot file. Missing or unreadable files start empty.
    pub fn load(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        match persistence::load_snapshot_from(path) {
            Ok(Some(snapshot)) => {
                debug!(
                    sessions = snapshot.sessions.len(),
                    path = %path.display(),
                    "restored sessions"
                );
                self.restore(snapshot);
            }
            Ok(None) => self.restore(Snapshot::default()),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "failed to load session snapshot, starting empty"
                );
                self.restore(Snapshot::default());
            }
        }
    }

    /// Write the snapshot file, if one is configured.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.snapshot();
        tokio::task::spawn_blocking(move || persistence::save_snapshot_to(&path, &snapshot))
            .await??;
        Ok(())
    }
}
