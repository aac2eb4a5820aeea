// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Declarative cluster definitions and per-instance state.
//!
//! A cluster declares its attributes, commands and events once; every
//! instance then owns a value map plus a data version that increments on
//! any mutation. The framework injects the global attributes
//! (FeatureMap, AttributeList, AcceptedCommandList, GeneratedCommandList,
//! EventList) at instantiation so clusters never list them by hand.

use std::collections::HashMap;

use crate::tlv::TlvValue;

pub type ClusterId = u32;
pub type AttributeId = u32;
pub type CommandId = u32;
pub type EventId = u32;

pub const GLOBAL_ATTR_GENERATED_COMMANDS: AttributeId = 0xFFF8;
pub const GLOBAL_ATTR_ACCEPTED_COMMANDS: AttributeId = 0xFFF9;
pub const GLOBAL_ATTR_EVENT_LIST: AttributeId = 0xFFFA;
pub const GLOBAL_ATTR_ATTRIBUTE_LIST: AttributeId = 0xFFFB;
pub const GLOBAL_ATTR_FEATURE_MAP: AttributeId = 0xFFFC;

/// FabricIndex member tag inside fabric-scoped list entries.
pub const FABRIC_INDEX_FIELD: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum EventPriority {
    Debug = 0,
    Info = 1,
    Critical = 2,
}

impl EventPriority {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Critical,
            _ => return None,
        })
    }
}

/// Value bounds checked before a write lands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeConstraint {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub enum_values: Option<Vec<u64>>,
}

impl AttributeConstraint {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn range(min: i64, max: i64) -> Self {
        Self { min: Some(min), max: Some(max), enum_values: None }
    }

    pub fn enumerated(values: &[u64]) -> Self {
        Self { min: None, max: None, enum_values: Some(values.to_vec()) }
    }

    /// Whether `value` satisfies the constraint. Non-numeric values pass
    /// range checks untouched (length limits are the handler's concern).
    pub fn allows(&self, value: &TlvValue) -> bool {
        if let Some(allowed) = &self.enum_values {
            return match value.as_u64() {
                Some(v) => allowed.contains(&v),
                None => false,
            };
        }
        let as_num = match value {
            TlvValue::UnsignedInt(v) => i64::try_from(*v).ok(),
            TlvValue::SignedInt(v) => Some(*v),
            _ => None,
        };
        match as_num {
            Some(n) => {
                self.min.is_none_or(|min| n >= min) && self.max.is_none_or(|max| n <= max)
            },
            None => self.min.is_none() && self.max.is_none(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub id: AttributeId,
    pub default: TlvValue,
    pub writable: bool,
    pub fabric_scoped: bool,
    pub constraint: AttributeConstraint,
}

#[derive(Debug, Clone)]
pub struct CommandDef {
    pub id: CommandId,
    /// Declared parameter names; the positional index doubles as the
    /// context tag of the field on the wire.
    pub params: Vec<&'static str>,
    pub response_id: Option<CommandId>,
}

impl CommandDef {
    /// Fetch a named parameter out of decoded command fields.
    pub fn param<'v>(&self, fields: &'v TlvValue, name: &str) -> Option<&'v TlvValue> {
        let idx = self.params.iter().position(|p| *p == name)?;
        fields.field(idx as u8)
    }
}

#[derive(Debug, Clone)]
pub struct EventDef {
    pub id: EventId,
    pub priority: EventPriority,
}

/// Everything a cluster declares at definition time.
#[derive(Debug, Clone)]
pub struct ClusterDef {
    pub id: ClusterId,
    pub attributes: Vec<AttributeDef>,
    pub commands: Vec<CommandDef>,
    pub events: Vec<EventDef>,
}

impl ClusterDef {
    pub fn new(id: ClusterId) -> Self {
        Self { id, attributes: Vec::new(), commands: Vec::new(), events: Vec::new() }
    }

    pub fn attribute(
        mut self,
        id: AttributeId,
        default: TlvValue,
        writable: bool,
    ) -> Self {
        self.attributes.push(AttributeDef {
            id,
            default,
            writable,
            fabric_scoped: false,
            constraint: AttributeConstraint::none(),
        });
        self
    }

    pub fn attribute_constrained(
        mut self,
        id: AttributeId,
        default: TlvValue,
        constraint: AttributeConstraint,
    ) -> Self {
        self.attributes.push(AttributeDef {
            id,
            default,
            writable: true,
            fabric_scoped: false,
            constraint,
        });
        self
    }

    pub fn attribute_fabric_scoped(mut self, id: AttributeId, default: TlvValue) -> Self {
        self.attributes.push(AttributeDef {
            id,
            default,
            writable: true,
            fabric_scoped: true,
            constraint: AttributeConstraint::none(),
        });
        self
    }

    pub fn command(mut self, id: CommandId, params: &[&'static str]) -> Self {
        self.commands.push(CommandDef { id, params: params.to_vec(), response_id: None });
        self
    }

    pub fn command_with_response(
        mut self,
        id: CommandId,
        params: &[&'static str],
        response_id: CommandId,
    ) -> Self {
        self.commands.push(CommandDef {
            id,
            params: params.to_vec(),
            response_id: Some(response_id),
        });
        self
    }

    pub fn event(mut self, id: EventId, priority: EventPriority) -> Self {
        self.events.push(EventDef { id, priority });
        self
    }

    pub fn find_attribute(&self, id: AttributeId) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn find_command(&self, id: CommandId) -> Option<&CommandDef> {
        self.commands.iter().find(|c| c.id == id)
    }

    pub fn find_event(&self, id: EventId) -> Option<&EventDef> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Every readable attribute id, globals included, ascending.
    pub fn attribute_ids(&self) -> Vec<AttributeId> {
        let mut ids: Vec<AttributeId> = self.attributes.iter().map(|a| a.id).collect();
        ids.extend_from_slice(&[
            GLOBAL_ATTR_GENERATED_COMMANDS,
            GLOBAL_ATTR_ACCEPTED_COMMANDS,
            GLOBAL_ATTR_EVENT_LIST,
            GLOBAL_ATTR_ATTRIBUTE_LIST,
            GLOBAL_ATTR_FEATURE_MAP,
        ]);
        ids.sort_unstable();
        ids
    }
}

/// Mutable state of one cluster instance.
#[derive(Debug, Clone)]
pub struct ClusterState {
    values: HashMap<AttributeId, TlvValue>,
    data_version: u32,
}

impl ClusterState {
    /// Instantiate from a definition: defaults plus computed globals.
    pub fn instantiate(def: &ClusterDef) -> Self {
        let mut values = HashMap::new();
        for attr in &def.attributes {
            values.insert(attr.id, attr.default.clone());
        }

        let accepted: Vec<TlvValue> = def
            .commands
            .iter()
            .map(|c| TlvValue::UnsignedInt(c.id as u64))
            .collect();
        let mut generated: Vec<u64> = def
            .commands
            .iter()
            .filter_map(|c| c.response_id.map(|r| r as u64))
            .collect();
        generated.sort_unstable();
        generated.dedup();
        let events: Vec<TlvValue> = def
            .events
            .iter()
            .map(|e| TlvValue::UnsignedInt(e.id as u64))
            .collect();
        let attr_list: Vec<TlvValue> = def
            .attribute_ids()
            .into_iter()
            .map(|id| TlvValue::UnsignedInt(id as u64))
            .collect();

        values.insert(GLOBAL_ATTR_FEATURE_MAP, TlvValue::UnsignedInt(0));
        values.insert(GLOBAL_ATTR_ACCEPTED_COMMANDS, TlvValue::Array(accepted));
        values.insert(
            GLOBAL_ATTR_GENERATED_COMMANDS,
            TlvValue::Array(generated.into_iter().map(TlvValue::UnsignedInt).collect()),
        );
        values.insert(GLOBAL_ATTR_EVENT_LIST, TlvValue::Array(events));
        values.insert(GLOBAL_ATTR_ATTRIBUTE_LIST, TlvValue::Array(attr_list));

        Self { values, data_version: 0 }
    }

    pub fn data_version(&self) -> u32 {
        self.data_version
    }

    pub fn get(&self, id: AttributeId) -> Option<&TlvValue> {
        self.values.get(&id)
    }

    /// Replace a value and bump the data version.
    pub fn set(&mut self, id: AttributeId, value: TlvValue) {
        self.values.insert(id, value);
        self.data_version = self.data_version.wrapping_add(1);
    }
}
