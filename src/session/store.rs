// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use tracing::debug;

use crate::session::session::Session;

/// Active secure sessions keyed by local session id.
///
/// Single-writer: only the orchestrator mutates the table. Exceeding the
/// capacity evicts the least-recently-active session.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<u16, Session>,
    capacity: usize,
    next_id: u16,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    /// Pick an unused nonzero local session id.
    pub fn allocate_id(&mut self) -> u16 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if id != 0 && !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    /// Insert a session; returns the id of an evicted session when the
    /// capacity was exceeded.
    pub fn insert(&mut self, session: Session) -> Option<u16> {
        let mut evicted = None;
        if self.sessions.len() >= self.capacity
            && !self.sessions.contains_key(&session.local_session_id)
        {
            if let Some(oldest) = self
                .sessions
                .values()
                .min_by_key(|s| s.last_active_ms)
                .map(|s| s.local_session_id)
            {
                debug!(session_id = oldest, "evicting least recently active session");
                self.sessions.remove(&oldest);
                evicted = Some(oldest);
            }
        }
        self.sessions.insert(session.local_session_id, session);
        evicted
    }

    pub fn get(&self, id: u16) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: u16) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Ids of sessions idle since before `cutoff_ms`.
    pub fn idle_since(&self, cutoff_ms: u64) -> Vec<u16> {
        self.sessions
            .values()
            .filter(|s| s.last_active_ms < cutoff_ms)
            .map(|s| s.local_session_id)
            .collect()
    }

    /// Ids of sessions bound to a fabric (used when the fabric is removed).
    pub fn bound_to_fabric(&self, fabric_index: u8) -> Vec<u16> {
        self.sessions
            .values()
            .filter(|s| s.fabric_index == Some(fabric_index))
            .map(|s| s.local_session_id)
            .collect()
    }
}
