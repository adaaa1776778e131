//! In-memory session store keyed by an opaque cookie token.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Session state carried between requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Logged-in staff user.
    pub user_id: Option<String>,
    /// Tenant of the logged-in user.
    pub tenant_id: Option<String>,
    /// Tenant remembered for anonymous help-center / livechat visitors.
    pub chat_tenant: Option<String>,
}

struct Slot {
    session: Session,
    touched: Instant,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a session and return its token.
    pub fn create(&self, session: Session) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        if let Ok(mut map) = self.sessions.lock() {
            map.insert(token.clone(), Slot { session, touched: Instant::now() });
        }
        token
    }

    /// Fetch a live session, refreshing its idle timer. Expired sessions are removed.
    pub fn get(&self, token: &str) -> Option<Session> {
        let mut map = self.sessions.lock().ok()?;
        let expired = map.get(token)?.touched.elapsed() > self.ttl;
        if expired {
            map.remove(token);
            return None;
        }
        let slot = map.get_mut(token)?;
        slot.touched = Instant::now();
        Some(slot.session.clone())
    }

    /// Replace the state of an existing session. Returns false if it no longer exists.
    pub fn update(&self, token: &str, session: Session) -> bool {
        match self.sessions.lock() {
            Ok(mut map) => match map.get_mut(token) {
                Some(slot) => {
                    slot.session = session;
                    slot.touched = Instant::now();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn destroy(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .map(|mut map| map.remove(token).is_some())
            .unwrap_or(false)
    }

    /// Drop every session idle for longer than the TTL.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut map) = self.sessions.lock() else {
            return 0;
        };
        let before = map.len();
        let ttl = self.ttl;
        map.retain(|_, slot| slot.touched.elapsed() <= ttl);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(12 * 3600))
    }
}
