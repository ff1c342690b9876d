//! Table of live call sessions keyed by Call-ID
//!
//! The table is plain data. It is owned by the coordinator and only touched
//! while the coordinator lock is held, so it needs no interior locking.

use std::collections::HashMap;

use crate::call::{CallId, CallSession, CallState, CallStats};

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<CallId, CallSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, returning the entry it replaced (if any)
    pub fn insert(&mut self, session: CallSession) -> Option<CallSession> {
        self.sessions.insert(session.call_id.clone(), session)
    }

    pub fn get(&self, call_id: &CallId) -> Option<&CallSession> {
        self.sessions.get(call_id)
    }

    pub fn get_mut(&mut self, call_id: &CallId) -> Option<&mut CallSession> {
        self.sessions.get_mut(call_id)
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.sessions.contains_key(call_id)
    }

    pub fn remove(&mut self, call_id: &CallId) -> Option<CallSession> {
        self.sessions.remove(call_id)
    }

    /// Remove a session only if it already reached `Terminated`
    ///
    /// Live sessions stay in place; dismissing them is a presentation bug, not a hangup.
    pub fn remove_if_terminated(&mut self, call_id: &CallId) -> Option<CallSession> {
        match self.sessions.get(call_id) {
            Some(session) if session.is_terminated() => self.sessions.remove(call_id),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallSession> {
        self.sessions.values()
    }

    pub fn stats(&self) -> CallStats {
        let mut stats = CallStats { total_sessions: self.sessions.len(), ..CallStats::default() };
        for session in self.sessions.values() {
            match session.state {
                CallState::Ringing => stats.ringing_calls += 1,
                CallState::Connected => stats.connected_calls += 1,
                CallState::Terminated => stats.terminated_awaiting_dismissal += 1,
                CallState::Idle => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallDirection, CallEvent};

    fn session(id: &str) -> CallSession {
        CallSession::new(CallId::from(id), "peer", CallDirection::Incoming)
    }

    #[test]
    fn test_insert_replaces_colliding_id() {
        let mut table = SessionTable::new();
        assert!(table.insert(session("abc123")).is_none());

        let mut newer = session("abc123");
        newer.peer_address = "Bob".to_string();
        let replaced = table.insert(newer).unwrap();

        assert_eq!(replaced.peer_address, "peer");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&CallId::from("abc123")).unwrap().peer_address, "Bob");
    }

    #[test]
    fn test_remove_if_terminated_keeps_live_sessions() {
        let mut table = SessionTable::new();
        table.insert(session("a"));
        table.insert(session("b"));

        assert!(table.remove_if_terminated(&CallId::from("a")).is_none());
        assert!(table.contains(&CallId::from("a")));

        table.get_mut(&CallId::from("b")).unwrap().handle_event(CallEvent::RemoteHangup);
        assert!(table.remove_if_terminated(&CallId::from("b")).is_some());
        assert!(!table.contains(&CallId::from("b")));
        assert!(table.remove_if_terminated(&CallId::from("missing")).is_none());
    }

    #[test]
    fn test_stats_by_state() {
        let mut table = SessionTable::new();
        table.insert(session("idle"));
        table.insert(session("ringing"));
        table.insert(session("connected"));
        table.insert(session("ended"));

        table.get_mut(&CallId::from("ringing")).unwrap().handle_event(CallEvent::Ringing);
        table.get_mut(&CallId::from("connected")).unwrap().handle_event(CallEvent::LocalPickup);
        table.get_mut(&CallId::from("ended")).unwrap().handle_event(CallEvent::LocalHangup);

        let stats = table.stats();
        assert_eq!(stats.total_sessions, 4);
        assert_eq!(stats.ringing_calls, 1);
        assert_eq!(stats.connected_calls, 1);
        assert_eq!(stats.terminated_awaiting_dismissal, 1);
    }
}
