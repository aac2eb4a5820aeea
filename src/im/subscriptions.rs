// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Subscription bookkeeping: path sets, interval gates, change
//! detection.
//!
//! The manager never builds reports itself; the orchestrator asks which
//! subscriptions are due, produces a hypothetical report against current
//! cluster state, and feeds it back through [`SubscriptionManager::evaluate`]
//! to learn whether anything must actually be sent.

use std::collections::HashMap;

use tracing::debug;

use crate::models::im::{AttributePath, AttributeReport, EventPath};

/// Where a subscription is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// Priming report sent, waiting for the subscriber's StatusResponse.
    Priming,
    /// SubscribeResponse sent; periodic reporting is live.
    Active,
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: u32,
    pub session_id: u16,
    pub attribute_paths: Vec<AttributePath>,
    pub event_paths: Vec<EventPath>,
    pub min_interval_s: u16,
    pub max_interval_s: u16,
    pub fabric_filtered: bool,
    pub phase: SubscriptionPhase,
    pub last_report_at_ms: u64,
    pub last_sent_at_ms: Option<u64>,
    /// Snapshot of the last attribute reports sent (or primed).
    pub last_reported: Vec<AttributeReport>,
}

/// What a due subscription should do this tick.
#[derive(Debug, PartialEq)]
pub enum TickOutcome {
    /// Nothing changed: bump `last_report_at` only.
    Unchanged,
    /// Changed and the min-interval gate is open: send.
    Send,
    /// Changed but throttled; re-evaluate next tick.
    Throttled,
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    subscriptions: HashMap<u32, Subscription>,
    /// Per-session monotonic id allocation, starting at 1.
    next_id: HashMap<u16, u32>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self, session_id: u16) -> u32 {
        let next = self.next_id.entry(session_id).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }

    pub fn get(&self, id: u32) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Subscription> {
        self.subscriptions.remove(&id)
    }

    /// Activate the priming subscription of a session, if any.
    pub fn activate_priming(&mut self, session_id: u16) -> Option<u32> {
        let sub = self
            .subscriptions
            .values_mut()
            .find(|s| s.session_id == session_id && s.phase == SubscriptionPhase::Priming)?;
        sub.phase = SubscriptionPhase::Active;
        debug!(subscription_id = sub.id, session_id, "subscription activated");
        Some(sub.id)
    }

    /// Active subscriptions whose max interval elapsed.
    pub fn due(&self, now_ms: u64) -> Vec<u32> {
        self.subscriptions
            .values()
            .filter(|s| s.phase == SubscriptionPhase::Active)
            .filter(|s| now_ms.saturating_sub(s.last_report_at_ms) >= s.max_interval_s as u64 * 1000)
            .map(|s| s.id)
            .collect()
    }

    /// Decide what a due subscription does with the freshly built
    /// hypothetical report, and update its clocks accordingly.
    pub fn evaluate(
        &mut self,
        id: u32,
        hypothetical: &[AttributeReport],
        now_ms: u64,
    ) -> Option<TickOutcome> {
        let sub = self.subscriptions.get_mut(&id)?;
        if *hypothetical == sub.last_reported {
            sub.last_report_at_ms = now_ms;
            return Some(TickOutcome::Unchanged);
        }
        let gate_open = match sub.last_sent_at_ms {
            None => true,
            Some(sent) => now_ms.saturating_sub(sent) >= sub.min_interval_s as u64 * 1000,
        };
        if !gate_open {
            return Some(TickOutcome::Throttled);
        }
        sub.last_reported = hypothetical.to_vec();
        sub.last_report_at_ms = now_ms;
        sub.last_sent_at_ms = Some(now_ms);
        Some(TickOutcome::Send)
    }

    /// Drop every subscription owned by a closing session.
    pub fn drop_session(&mut self, session_id: u16) -> Vec<u32> {
        let ids: Vec<u32> = self
            .subscriptions
            .values()
            .filter(|s| s.session_id == session_id)
            .map(|s| s.id)
            .collect();
        for id in &ids {
            self.subscriptions.remove(id);
        }
        self.next_id.remove(&session_id);
        ids
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
