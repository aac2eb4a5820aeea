// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Message Reliability Protocol: per-exchange retransmission with
//! exponential backoff, and the ack bookkeeping that goes with it.
//!
//! Every reliable frame stays in the pending map until the matching ack
//! (piggybacked or standalone) arrives or the transmission budget runs
//! out. Timers are armed by the shell from `ScheduleMrp` actions; a
//! firing timer is routed back here and either re-emits the frame or
//! gives up.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, warn};

pub const RETRY_INTERVAL_IDLE_MS: u64 = 500;
pub const RETRY_INTERVAL_ACTIVE_MS: u64 = 300;
pub const BACKOFF_BASE: f64 = 1.6;
pub const BACKOFF_JITTER: f64 = 0.25;
pub const BACKOFF_MARGIN: f64 = 1.1;
/// One original transmission plus four retries.
pub const MAX_TRANSMISSIONS: u32 = 5;

/// Interval before the `attempt`-th retransmission:
/// `interval * margin * base^attempt * uniform(1, 1 + jitter)`.
pub fn retransmit_interval_ms(base_interval_ms: u64, attempt: u32) -> u64 {
    let jitter = 1.0 + BACKOFF_JITTER * rand::random::<f64>();
    let scaled =
        base_interval_ms as f64 * BACKOFF_MARGIN * BACKOFF_BASE.powi(attempt as i32) * jitter;
    scaled as u64
}

/// A reliable frame awaiting its ack.
#[derive(Debug, Clone)]
pub struct PendingTransmit {
    pub frame: Bytes,
    pub attempt: u32,
    /// Message counter the frame was sealed with (the peer acks it).
    pub counter: u32,
    /// Set when the frame carries a subscription report; give-up then
    /// tears the subscription down.
    pub subscription_id: Option<u32>,
}

/// What a fired retransmit timer resolves to.
#[derive(Debug)]
pub enum RetransmitOutcome {
    /// Re-emit the frame and re-arm with the given delay.
    Resend { frame: Bytes, next_attempt: u32, delay_ms: u64 },
    /// Transmission budget exhausted; entry evicted.
    GiveUp { subscription_id: Option<u32> },
    /// The entry was already acked or superseded; ignore the timer.
    Stale,
}

type ExchangeKey = (u16, u16); // (local session id, exchange id)

/// Reliable-send and ack state across all sessions.
#[derive(Debug, Default)]
pub struct ReliableChannel {
    pending: HashMap<ExchangeKey, PendingTransmit>,
    /// Received reliable counters that still owe the peer an ack.
    acks_due: HashMap<ExchangeKey, u32>,
}

impl ReliableChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly sent reliable frame.
    pub fn record_send(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        frame: impl Into<Bytes>,
        counter: u32,
        subscription_id: Option<u32>,
    ) {
        self.pending.insert(
            (session_id, exchange_id),
            PendingTransmit {
                frame: frame.into(),
                attempt: 0,
                counter,
                subscription_id,
            },
        );
    }

    /// Peer acked `counter` on the exchange; clears the matching entry.
    pub fn on_ack(&mut self, session_id: u16, exchange_id: u16, counter: u32) -> bool {
        let key = (session_id, exchange_id);
        match self.pending.get(&key) {
            Some(p) if p.counter == counter => {
                self.pending.remove(&key);
                debug!(session_id, exchange_id, counter, "ack cleared pending transmit");
                true
            },
            Some(p) => {
                debug!(
                    session_id,
                    exchange_id,
                    got = counter,
                    want = p.counter,
                    "ack for stale counter ignored"
                );
                false
            },
            None => false,
        }
    }

    /// A retransmit timer fired for `(session, exchange)` at `attempt`.
    pub fn on_timer(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        attempt: u32,
        base_interval_ms: u64,
    ) -> RetransmitOutcome {
        let key = (session_id, exchange_id);
        let Some(pending) = self.pending.get_mut(&key) else {
            return RetransmitOutcome::Stale;
        };
        if pending.attempt != attempt {
            return RetransmitOutcome::Stale;
        }
        if pending.attempt + 1 >= MAX_TRANSMISSIONS {
            let evicted = self.pending.remove(&key);
            warn!(session_id, exchange_id, "reliable transmission gave up");
            return RetransmitOutcome::GiveUp {
                subscription_id: evicted.and_then(|p| p.subscription_id),
            };
        }
        pending.attempt += 1;
        RetransmitOutcome::Resend {
            frame: pending.frame.clone(),
            next_attempt: pending.attempt,
            delay_ms: retransmit_interval_ms(base_interval_ms, pending.attempt),
        }
    }

    pub fn has_pending(&self, session_id: u16, exchange_id: u16) -> bool {
        self.pending.contains_key(&(session_id, exchange_id))
    }

    /// Note that a received reliable message owes the peer an ack.
    pub fn note_ack_due(&mut self, session_id: u16, exchange_id: u16, counter: u32) {
        self.acks_due.insert((session_id, exchange_id), counter);
    }

    /// Consume the due ack for piggybacking on an outgoing message.
    pub fn take_ack_due(&mut self, session_id: u16, exchange_id: u16) -> Option<u32> {
        self.acks_due.remove(&(session_id, exchange_id))
    }

    /// Drop all state owned by a closing session.
    pub fn drop_session(&mut self, session_id: u16) -> Vec<Option<u32>> {
        let keys: Vec<ExchangeKey> = self
            .pending
            .keys()
            .filter(|(s, _)| *s == session_id)
            .copied()
            .collect();
        let mut subs = Vec::new();
        for key in keys {
            if let Some(p) = self.pending.remove(&key) {
                subs.push(p.subscription_id);
            }
        }
        self.acks_due.retain(|(s, _), _| *s != session_id);
        subs
    }
}
