//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-identity editing sessions.

use speaking_coach_core::{
    domain::Scope,
    ports::{RecordStore, ScriptGenerationService, TextToSpeechService},
    session::StudySession,
    speech::Voice,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// How the speech channel synthesizes audio.
#[derive(Clone, Debug)]
pub struct SpeechSettings {
    pub rate: f32,
    /// Offered to the playback controller's voice selection, in preference order.
    pub voices: Vec<Voice>,
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub generator: Arc<dyn ScriptGenerationService>,
    pub tts_adapter: Arc<dyn TextToSpeechService>,
    pub speech: SpeechSettings,
    pub sessions: SessionRegistry,
}

//=========================================================================================
// SessionRegistry
//=========================================================================================

pub type SharedSession = Arc<Mutex<StudySession>>;

/// Sessions untouched for this long are dropped.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
/// Past this many sessions the least recently used idle ones are dropped.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

struct SessionEntry {
    session: SharedSession,
    last_used: Instant,
}

impl SessionEntry {
    /// Someone outside the registry still holds the session, e.g. a pending
    /// generation.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

/// One `StudySession` per scope, created on first use. In local mode there is
/// only `Scope::Local`. Sessions nobody holds are evicted once idle past the
/// timeout, or least recently used first when the registry grows past its cap.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Scope, SessionEntry>>>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE_TIMEOUT, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    pub async fn session_for(&self, scope: &Scope) -> SharedSession {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        self.evict(&mut sessions, scope, now);

        let entry = sessions.entry(scope.clone()).or_insert_with(|| {
            info!(scope = ?scope, "Opening a new editing session.");
            SessionEntry {
                session: Arc::new(Mutex::new(StudySession::new(scope.clone()))),
                last_used: now,
            }
        });
        entry.last_used = now;
        entry.session.clone()
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn evict(&self, sessions: &mut HashMap<Scope, SessionEntry>, keep: &Scope, now: Instant) {
        let before = sessions.len();
        sessions.retain(|scope, entry| {
            scope == keep
                || entry.in_use()
                || now.duration_since(entry.last_used) < self.idle_timeout
        });

        // Room for the session about to be opened.
        let limit = if sessions.contains_key(keep) {
            self.max_sessions
        } else {
            self.max_sessions - 1
        };
        if sessions.len() > limit {
            let mut idle: Vec<(Instant, Scope)> = sessions
                .iter()
                .filter(|(scope, entry)| *scope != keep && !entry.in_use())
                .map(|(scope, entry)| (entry.last_used, Scope::clone(scope)))
                .collect();
            idle.sort_by_key(|(last_used, _)| *last_used);
            let excess = sessions.len() - limit;
            for (_, scope) in idle.into_iter().take(excess) {
                sessions.remove(&scope);
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle editing sessions.");
        }
    }
}
