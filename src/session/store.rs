//! In-memory registry of active and invalidated OIDC sessions.
//!
//! Four indices (subject, sid, issuer, invalidated) sit behind one
//! `RwLock`. Every mutation takes the write guard for its whole duration,
//! so a reader never sees a session present in one index and missing from
//! another.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::info::SessionInfo;

/// Sessions of one subject, bucketed by `sid` (`""` = no sid).
#[derive(Debug, Default)]
struct SubjectSessions {
    by_sid: HashMap<String, Vec<SessionInfo>>,
}

impl SubjectSessions {
    fn insert(&mut self, session: SessionInfo) -> bool {
        let bucket = self.by_sid.entry(session.sid().to_string()).or_default();
        if !bucket.contains(&session) {
            bucket.push(session);
        }
        true
    }

    fn remove_sid(&mut self, sid: &str) -> Vec<SessionInfo> {
        self.by_sid.remove(sid).unwrap_or_default()
    }

    fn contains(&self, session: &SessionInfo) -> bool {
        self.by_sid
            .get(session.sid())
            .is_some_and(|bucket| bucket.contains(session))
    }

    fn remove(&mut self, session: &SessionInfo) -> Option<SessionInfo> {
        let bucket = self.by_sid.get_mut(session.sid())?;
        let pos = bucket.iter().position(|s| s == session)?;
        let removed = bucket.remove(pos);
        if bucket.is_empty() {
            self.by_sid.remove(session.sid());
        }
        Some(removed)
    }

    /// Newest remaining session carrying `sid`.
    fn latest_with_sid(&self, sid: &str) -> Option<&SessionInfo> {
        self.by_sid.get(sid).and_then(|bucket| bucket.last())
    }

    fn remove_session_id(&mut self, session_id: &str) -> Option<SessionInfo> {
        let (sid, pos) = self.by_sid.iter().find_map(|(sid, bucket)| {
            bucket
                .iter()
                .position(|s| s.session_id() == session_id)
                .map(|pos| (sid.clone(), pos))
        })?;

        let bucket = self.by_sid.get_mut(&sid)?;
        let removed = bucket.remove(pos);
        if bucket.is_empty() {
            self.by_sid.remove(&sid);
        }
        Some(removed)
    }

    fn drain(&mut self) -> Vec<SessionInfo> {
        self.by_sid.drain().flat_map(|(_, bucket)| bucket).collect()
    }

    fn sessions(&self) -> impl Iterator<Item = &SessionInfo> {
        self.by_sid.values().flatten()
    }

    fn is_empty(&self) -> bool {
        self.by_sid.is_empty()
    }
}

#[derive(Debug, Default)]
struct Indices {
    invalidated: HashSet<SessionInfo>,
    by_subject: HashMap<String, SubjectSessions>,
    by_sid: HashMap<String, SessionInfo>,
    by_issuer: HashMap<String, HashSet<SessionInfo>>,
}

impl Indices {
    /// Drop `removed` (already taken out of the subject index) from the sid
    /// and issuer indices and mark them invalidated. A sid entry that named a
    /// removed session moves to another active session with the same sid.
    ///
    /// Returns whether the invalidated set changed.
    fn retire(&mut self, removed: Vec<SessionInfo>) -> bool {
        let mut changed = false;
        for session in removed {
            let sid = session.sid();
            if !sid.is_empty() && self.by_sid.get(sid) == Some(&session) {
                match self.active_with_sid(session.sub(), sid) {
                    Some(next) => {
                        self.by_sid.insert(sid.to_string(), next);
                    }
                    None => {
                        self.by_sid.remove(sid);
                    }
                }
            }

            if let Some(bucket) = self.by_issuer.get_mut(session.iss())
                && bucket.remove(&session)
                && bucket.is_empty()
            {
                self.by_issuer.remove(session.iss());
            }

            changed |= self.invalidated.insert(session);
        }
        changed
    }

    /// An active session carrying `sid`, preferring the subject `sub`.
    fn active_with_sid(&self, sub: &str, sid: &str) -> Option<SessionInfo> {
        self.by_subject
            .get(sub)
            .and_then(|s| s.latest_with_sid(sid))
            .or_else(|| self.by_subject.values().find_map(|s| s.latest_with_sid(sid)))
            .cloned()
    }

    fn prune_subject(&mut self, sub: &str) {
        if self.by_subject.get(sub).is_some_and(SubjectSessions::is_empty) {
            self.by_subject.remove(sub);
        }
    }

    fn invalidate_sid_under_subject(&mut self, sub: &str, sid: &str) -> bool {
        let Some(sessions) = self.by_subject.get_mut(sub) else {
            return false;
        };
        let removed = sessions.remove_sid(sid);
        if removed.is_empty() {
            return false;
        }
        self.prune_subject(sub);
        self.retire(removed)
    }
}

/// Where a session stands in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Invalidated,
    /// Never inserted, or evicted after invalidation.
    Unknown,
}

/// Sessions of one client configuration at one issuer, narrowed by subject
/// and/or sid. With neither set it selects nothing.
#[derive(Debug, Clone, Copy)]
pub struct SessionSelector<'a> {
    pub config_id: &'a str,
    pub iss: &'a str,
    pub sub: Option<&'a str>,
    pub sid: Option<&'a str>,
}

impl SessionSelector<'_> {
    fn matches(&self, session: &SessionInfo) -> bool {
        if self.sub.is_none() && self.sid.is_none() {
            return false;
        }
        session.config_id() == self.config_id
            && session.iss() == self.iss
            && self.sub.is_none_or(|sub| session.sub() == sub)
            && self.sid.is_none_or(|sid| session.sid() == sid)
    }
}

/// Process-wide session registry.
///
/// Construct once at startup and share through `Arc`; separate instances
/// never share state.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<Indices>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly authenticated session.
    ///
    /// Returns `false` without touching any index when the subject is empty.
    pub fn insert(&self, session: SessionInfo) -> bool {
        if session.sub().is_empty() {
            return false;
        }

        let mut idx = self.inner.write();
        if !session.sid().is_empty() {
            idx.by_sid
                .insert(session.sid().to_string(), session.clone());
        }
        idx.by_issuer
            .entry(session.iss().to_string())
            .or_default()
            .insert(session.clone());
        idx.by_subject
            .entry(session.sub().to_string())
            .or_default()
            .insert(session)
    }

    /// Invalidate the session(s) of `sub` carrying `sid`.
    ///
    /// Returns `false` when nothing matched or every match was already
    /// invalidated.
    pub fn invalidate_by_sid_under_subject(&self, sub: &str, sid: &str) -> bool {
        if sub.is_empty() {
            return false;
        }
        self.inner.write().invalidate_sid_under_subject(sub, sid)
    }

    /// Invalidate the session of `sub` with the given encoded session id.
    pub fn invalidate_by_session_id_under_subject(&self, sub: &str, session_id: &str) -> bool {
        if sub.is_empty() {
            return false;
        }

        let mut idx = self.inner.write();
        let Some(sessions) = idx.by_subject.get_mut(sub) else {
            return false;
        };
        let Some(removed) = sessions.remove_session_id(session_id) else {
            return false;
        };
        idx.prune_subject(sub);
        idx.retire(vec![removed])
    }

    /// Invalidate every active session of `sub`.
    pub fn invalidate_all_for_subject(&self, sub: &str) -> bool {
        if sub.is_empty() {
            return false;
        }

        let mut idx = self.inner.write();
        let Some(mut sessions) = idx.by_subject.remove(sub) else {
            return false;
        };
        let removed = sessions.drain();
        if removed.is_empty() {
            return false;
        }
        idx.retire(removed)
    }

    /// Invalidate every active session the selector matches. Candidates
    /// come from the selector's issuer bucket, so sessions of other issuers
    /// or client configurations are never touched.
    pub fn invalidate_selected(&self, selector: &SessionSelector<'_>) -> bool {
        let mut idx = self.inner.write();
        let candidates: Vec<SessionInfo> = idx
            .by_issuer
            .get(selector.iss)
            .map(|bucket| bucket.iter().filter(|s| selector.matches(s)).cloned().collect())
            .unwrap_or_default();

        let mut removed = Vec::with_capacity(candidates.len());
        for session in candidates {
            if let Some(sessions) = idx.by_subject.get_mut(session.sub())
                && let Some(taken) = sessions.remove(&session)
            {
                removed.push(taken);
                idx.prune_subject(session.sub());
            }
        }
        if removed.is_empty() {
            return false;
        }
        idx.retire(removed)
    }

    pub fn is_invalidated(&self, session: &SessionInfo) -> bool {
        self.inner.read().invalidated.contains(session)
    }

    /// Active, invalidated, or unknown, read under one guard.
    pub fn status(&self, session: &SessionInfo) -> SessionStatus {
        let idx = self.inner.read();
        if idx.invalidated.contains(session) {
            SessionStatus::Invalidated
        } else if idx
            .by_subject
            .get(session.sub())
            .is_some_and(|s| s.contains(session))
        {
            SessionStatus::Active
        } else {
            SessionStatus::Unknown
        }
    }

    /// Forget an invalidated session. Returns whether it was present.
    pub fn remove_from_invalidated(&self, session: &SessionInfo) -> bool {
        self.inner.write().invalidated.remove(session)
    }

    /// Drop invalidated sessions whose millisecond timestamp is older than
    /// `cutoff_millis`. Timestamps that do not parse as integers are kept.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_invalidated_before(&self, cutoff_millis: u64) -> usize {
        let mut idx = self.inner.write();
        let before = idx.invalidated.len();
        idx.invalidated.retain(|s| {
            s.timestamp()
                .parse::<u64>()
                .ok()
                .is_none_or(|ts| ts >= cutoff_millis)
        });
        before - idx.invalidated.len()
    }

    /// Copy of the issuer index, for bulk scans per issuer.
    pub fn issuer_index_snapshot(&self) -> HashMap<String, HashSet<SessionInfo>> {
        self.inner.read().by_issuer.clone()
    }

    /// Number of active (not invalidated) sessions.
    pub fn active_count(&self) -> usize {
        self.inner
            .read()
            .by_subject
            .values()
            .map(|s| s.sessions().count())
            .sum()
    }

    pub fn invalidated_count(&self) -> usize {
        self.inner.read().invalidated.len()
    }

    #[cfg(test)]
    fn find_by_sid(&self, sid: &str) -> Option<SessionInfo> {
        self.inner.read().by_sid.get(sid).cloned()
    }

    #[cfg(test)]
    fn sessions_for_subject(&self, sub: &str) -> Vec<SessionInfo> {
        self.inner
            .read()
            .by_subject
            .get(sub)
            .map(|s| s.sessions().cloned().collect())
            .unwrap_or_default()
    }

    /// Check that every active session appears in each index it belongs to
    /// and that no index references a session missing from the others.
    #[cfg(test)]
    fn assert_consistent(&self) {
        let idx = self.inner.read();
        let active: HashSet<&SessionInfo> =
            idx.by_subject.values().flat_map(|s| s.sessions()).collect();

        for session in &active {
            let in_issuer = idx
                .by_issuer
                .get(session.iss())
                .is_some_and(|b| b.contains(*session));
            assert!(in_issuer, "active session missing from issuer index");
            assert!(!idx.invalidated.contains(*session), "active session marked invalidated");
            if !session.sid().is_empty() {
                assert!(
                    idx.by_sid.contains_key(session.sid()),
                    "active session unreachable through sid index"
                );
            }
        }
        for bucket in idx.by_issuer.values() {
            for session in bucket {
                assert!(active.contains(session), "issuer index holds inactive session");
            }
        }
        for session in idx.by_sid.values() {
            assert!(active.contains(session), "sid index holds inactive session");
        }
    }
}
