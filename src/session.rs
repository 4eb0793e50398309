//! Per-browser session state.
//!
//! A session holds the uploaded workbook and the reading table of the sheet
//! currently selected. Uploading a new file replaces both wholesale.

use crate::loader::{LoadError, Workbook};
use crate::reading::ReadingTable;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "dashboard_session";

/// Live sessions kept before the one closest to expiry is evicted.
pub const MAX_SESSIONS: usize = 1024;

/// Outcome of loading one sheet, shared with the requests that render it
pub type SheetLoad = Arc<Result<ReadingTable, LoadError>>;

#[derive(Debug)]
struct Session {
    workbook: Option<Workbook>,
    /// Sheet name and its load outcome
    loaded: Option<(String, SheetLoad)>,
    expires_at: SystemTime,
}

/// In-memory map of live sessions
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
    limit: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_limit(ttl, MAX_SESSIONS)
    }

    /// Store holding at most `limit` sessions
    pub fn with_limit(ttl: Duration, limit: usize) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            limit: limit.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Start an empty session and return its id
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            workbook: None,
            loaded: None,
            expires_at: SystemTime::now() + self.ttl,
        };
        let mut sessions = self.write();
        purge_expired(&mut sessions);
        while sessions.len() >= self.limit {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, s)| s.expires_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            log::debug!("evicting session {}", oldest);
            sessions.remove(&oldest);
        }
        sessions.insert(id.clone(), session);
        id
    }

    /// Whether `id` names a live session; extends its lifetime if so
    pub fn touch(&self, id: &str) -> bool {
        let mut sessions = self.write();
        match sessions.get_mut(id) {
            Some(session) if session.expires_at > SystemTime::now() => {
                session.expires_at = SystemTime::now() + self.ttl;
                true
            }
            Some(_) => {
                sessions.remove(id);
                false
            }
            None => false,
        }
    }

    /// Replace the session's workbook, dropping any loaded table
    ///
    /// Expired sessions are purged first, so their workbooks are released on
    /// every upload and not only when a new session starts.
    pub fn set_workbook(&self, id: &str, workbook: Workbook) -> bool {
        let mut sessions = self.write();
        purge_expired(&mut sessions);
        match sessions.get_mut(id) {
            Some(session) => {
                session.workbook = Some(workbook);
                session.loaded = None;
                true
            }
            None => false,
        }
    }

    pub fn workbook(&self, id: &str) -> Option<Workbook> {
        self.read().get(id).and_then(|s| s.workbook.clone())
    }

    /// Reading table of `sheet`, loading it if another sheet (or none) is cached
    ///
    /// Returns `None` when the session has no workbook.
    pub fn sheet(&self, id: &str, sheet: &str) -> Option<SheetLoad> {
        {
            let sessions = self.read();
            let session = sessions.get(id)?;
            if let Some((name, load)) = &session.loaded {
                if name == sheet {
                    return Some(Arc::clone(load));
                }
            }
        }

        // Parse outside the lock; the workbook is shared, not copied
        let workbook = self.workbook(id)?;
        let load: SheetLoad = Arc::new(workbook.load_sheet(sheet));
        if let Err(e) = load.as_ref() {
            log::warn!("sheet '{}' of {} unusable: {}", sheet, workbook.file_name, e);
        }

        if let Some(session) = self.write().get_mut(id) {
            // A newer upload wins over this load
            if session
                .workbook
                .as_ref()
                .is_some_and(|w| w.same_upload(&workbook))
            {
                session.loaded = Some((sheet.to_string(), Arc::clone(&load)));
            }
        }
        Some(load)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn purge_expired(sessions: &mut HashMap<String, Session>) {
    let now = SystemTime::now();
    let before = sessions.len();
    sessions.retain(|_, s| s.expires_at > now);
    if sessions.len() < before {
        log::debug!("purged {} expired sessions", before - sessions.len());
    }
}
