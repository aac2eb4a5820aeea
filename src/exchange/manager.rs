// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use tracing::trace;

use crate::errors::CoreError;

/// Which side opened the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeRole {
    Initiator,
    Responder,
}

/// A live request/response conversation.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub id: u16,
    pub role: ExchangeRole,
    pub protocol_id: u16,
    pub opened_at_ms: u64,
    /// Deadline of an open timed-interaction window, when armed.
    pub timed_deadline_ms: Option<u64>,
}

type ExchangeKey = (u16, u16); // (local session id, exchange id)

/// Tracks exchanges per session: id allocation for locally initiated
/// ones, adoption of peer ids for responder-role ones, and the
/// timed-interaction windows hanging off them.
#[derive(Debug, Default)]
pub struct ExchangeManager {
    exchanges: HashMap<ExchangeKey, Exchange>,
    next_initiator_id: u16,
}

impl ExchangeManager {
    pub fn new() -> Self {
        Self { exchanges: HashMap::new(), next_initiator_id: 1 }
    }

    /// Allocate an id for an exchange this node initiates (subscription
    /// reports). Ids start at 1 and skip ones still in use on the
    /// session.
    pub fn allocate_initiator(&mut self, session_id: u16, protocol_id: u16, now_ms: u64) -> u16 {
        loop {
            let id = self.next_initiator_id;
            self.next_initiator_id = self.next_initiator_id.checked_add(1).unwrap_or(1);
            if !self.exchanges.contains_key(&(session_id, id)) {
                self.exchanges.insert(
                    (session_id, id),
                    Exchange {
                        id,
                        role: ExchangeRole::Initiator,
                        protocol_id,
                        opened_at_ms: now_ms,
                        timed_deadline_ms: None,
                    },
                );
                return id;
            }
        }
    }

    /// Adopt the peer's exchange id for an incoming request. Reuses the
    /// existing record when the exchange is already open (later messages
    /// of a multi-step flow).
    pub fn open_responder(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        protocol_id: u16,
        now_ms: u64,
    ) -> &mut Exchange {
        self.exchanges
            .entry((session_id, exchange_id))
            .or_insert_with(|| {
                trace!(session_id, exchange_id, protocol_id, "responder exchange opened");
                Exchange {
                    id: exchange_id,
                    role: ExchangeRole::Responder,
                    protocol_id,
                    opened_at_ms: now_ms,
                    timed_deadline_ms: None,
                }
            })
    }

    pub fn get(&self, session_id: u16, exchange_id: u16) -> Option<&Exchange> {
        self.exchanges.get(&(session_id, exchange_id))
    }

    /// Arm a timed-interaction window on the exchange.
    pub fn open_timed_window(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        timeout_ms: u64,
        now_ms: u64,
    ) {
        if let Some(ex) = self.exchanges.get_mut(&(session_id, exchange_id)) {
            ex.timed_deadline_ms = Some(now_ms.saturating_add(timeout_ms));
        }
    }

    /// Validate a Write/Invoke against the exchange's timed window.
    ///
    /// `timed_flag` is the interaction's own `timed_request` marker: set,
    /// it demands a previously opened window; a window that exists but
    /// already expired fails either way. The window is one-shot.
    pub fn consume_timed_window(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        timed_flag: bool,
        now_ms: u64,
    ) -> Result<(), CoreError> {
        let ex = self.exchanges.get_mut(&(session_id, exchange_id));
        let deadline = ex.as_ref().and_then(|e| e.timed_deadline_ms);
        match deadline {
            Some(deadline) => {
                if let Some(ex) = ex {
                    ex.timed_deadline_ms = None;
                }
                if now_ms > deadline {
                    return Err(CoreError::Timeout);
                }
                Ok(())
            },
            None if timed_flag => Err(CoreError::NeedsTimedInteraction),
            None => Ok(()),
        }
    }

    pub fn close(&mut self, session_id: u16, exchange_id: u16) {
        self.exchanges.remove(&(session_id, exchange_id));
    }

    pub fn drop_session(&mut self, session_id: u16) {
        self.exchanges.retain(|(s, _), _| *s != session_id);
    }
}
