// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bounded, prioritized event log with monotonic numbering.
//!
//! On overflow the oldest record of the lowest priority present is
//! evicted, so critical events survive debug chatter.

use std::collections::VecDeque;

use crate::{
    clusters::framework::EventPriority,
    models::im::EventPath,
    tlv::TlvValue,
};

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub number: u64,
    pub endpoint: u16,
    pub cluster: u32,
    pub event_id: u32,
    pub priority: EventPriority,
    pub system_timestamp_us: u64,
    pub data: TlvValue,
}

#[derive(Debug)]
pub struct EventStore {
    records: VecDeque<EventRecord>,
    capacity: usize,
    next_number: u64,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_number: 0,
        }
    }

    /// Append a record; returns its event number.
    pub fn append(
        &mut self,
        endpoint: u16,
        cluster: u32,
        event_id: u32,
        priority: EventPriority,
        system_timestamp_us: u64,
        data: TlvValue,
    ) -> u64 {
        if self.records.len() >= self.capacity {
            self.evict_one();
        }
        let number = self.next_number;
        self.next_number += 1;
        self.records.push_back(EventRecord {
            number,
            endpoint,
            cluster,
            event_id,
            priority,
            system_timestamp_us,
            data,
        });
        number
    }

    fn evict_one(&mut self) {
        let lowest = match self.records.iter().map(|r| r.priority).min() {
            Some(p) => p,
            None => return,
        };
        if let Some(pos) = self.records.iter().position(|r| r.priority == lowest) {
            self.records.remove(pos);
        }
    }

    /// Records matching any of the paths, numbered at or above
    /// `event_min`, in order.
    pub fn read(&self, paths: &[EventPath], event_min: u64) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| r.number >= event_min)
            .filter(|r| paths.iter().any(|p| Self::matches(p, r)))
            .collect()
    }

    fn matches(path: &EventPath, record: &EventRecord) -> bool {
        path.endpoint.is_none_or(|e| e == record.endpoint)
            && path.cluster.is_none_or(|c| c == record.cluster)
            && path.event.is_none_or(|ev| ev == record.event_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
