// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Interaction-model envelope codec.
//!
//! Each request/response opcode maps onto one struct here. Paths ride
//! as TLV lists (endpoint/cluster/attribute each under its own context
//! tag, omitted when wildcarded); envelopes are anonymous structs.

use crate::{
    errors::CoreError,
    tlv::{TlvValue, decode, encode},
};

/// Interaction-model status codes carried per path.
pub mod status {
    pub const SUCCESS: u16 = 0x00;
    pub const FAILURE: u16 = 0x01;
    pub const UNSUPPORTED_EVENT: u16 = 0x7B;
    pub const UNSUPPORTED_ACCESS: u16 = 0x7E;
    pub const UNSUPPORTED_ENDPOINT: u16 = 0x7F;
    pub const UNSUPPORTED_COMMAND: u16 = 0x81;
    pub const UNSUPPORTED_ATTRIBUTE: u16 = 0x86;
    pub const CONSTRAINT_ERROR: u16 = 0x87;
    pub const UNSUPPORTED_WRITE: u16 = 0x88;
    pub const TIMEOUT: u16 = 0x94;
    pub const UNSUPPORTED_CLUSTER: u16 = 0xC3;
    pub const NEEDS_TIMED_INTERACTION: u16 = 0xC6;
}

/// Map a core error onto the status code reported for a path.
pub fn status_for(err: &CoreError) -> u16 {
    match err {
        CoreError::UnsupportedEndpoint => status::UNSUPPORTED_ENDPOINT,
        CoreError::UnsupportedCluster => status::UNSUPPORTED_CLUSTER,
        CoreError::UnsupportedAttribute => status::UNSUPPORTED_ATTRIBUTE,
        CoreError::UnsupportedCommand => status::UNSUPPORTED_COMMAND,
        CoreError::UnsupportedWrite => status::UNSUPPORTED_WRITE,
        CoreError::UnsupportedAccess => status::UNSUPPORTED_ACCESS,
        CoreError::ConstraintError => status::CONSTRAINT_ERROR,
        CoreError::NeedsTimedInteraction => status::NEEDS_TIMED_INTERACTION,
        CoreError::Timeout => status::TIMEOUT,
        _ => status::FAILURE,
    }
}

const PATH_TAG_ENDPOINT: u8 = 2;
const PATH_TAG_CLUSTER: u8 = 3;
const PATH_TAG_ATTRIBUTE: u8 = 4;

/// Attribute path; `None` fields are wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributePath {
    pub endpoint: Option<u16>,
    pub cluster: Option<u32>,
    pub attribute: Option<u32>,
}

impl AttributePath {
    pub fn concrete(endpoint: u16, cluster: u32, attribute: u32) -> Self {
        Self {
            endpoint: Some(endpoint),
            cluster: Some(cluster),
            attribute: Some(attribute),
        }
    }

    pub fn wildcard() -> Self {
        Self { endpoint: None, cluster: None, attribute: None }
    }

    pub fn is_concrete(&self) -> bool {
        self.endpoint.is_some() && self.cluster.is_some() && self.attribute.is_some()
    }

    fn to_tlv(self) -> TlvValue {
        let mut items = Vec::new();
        if let Some(e) = self.endpoint {
            items.push((Some(PATH_TAG_ENDPOINT), TlvValue::UnsignedInt(e as u64)));
        }
        if let Some(c) = self.cluster {
            items.push((Some(PATH_TAG_CLUSTER), TlvValue::UnsignedInt(c as u64)));
        }
        if let Some(a) = self.attribute {
            items.push((Some(PATH_TAG_ATTRIBUTE), TlvValue::UnsignedInt(a as u64)));
        }
        TlvValue::List(items)
    }

    fn from_tlv(v: &TlvValue) -> Result<Self, CoreError> {
        let items = match v {
            TlvValue::List(items) => items.as_slice(),
            _ => return Err(CoreError::InvalidTag),
        };
        let mut path = Self::wildcard();
        for (tag, item) in items {
            match (tag, item.as_u64()) {
                (Some(PATH_TAG_ENDPOINT), Some(v)) => path.endpoint = Some(v as u16),
                (Some(PATH_TAG_CLUSTER), Some(v)) => path.cluster = Some(v as u32),
                (Some(PATH_TAG_ATTRIBUTE), Some(v)) => path.attribute = Some(v as u32),
                _ => {},
            }
        }
        Ok(path)
    }
}

const EVENT_TAG_ENDPOINT: u8 = 1;
const EVENT_TAG_CLUSTER: u8 = 2;
const EVENT_TAG_EVENT: u8 = 3;

/// Event path; `None` fields are wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventPath {
    pub endpoint: Option<u16>,
    pub cluster: Option<u32>,
    pub event: Option<u32>,
}

impl EventPath {
    pub fn wildcard() -> Self {
        Self { endpoint: None, cluster: None, event: None }
    }

    fn to_tlv(self) -> TlvValue {
        let mut items = Vec::new();
        if let Some(e) = self.endpoint {
            items.push((Some(EVENT_TAG_ENDPOINT), TlvValue::UnsignedInt(e as u64)));
        }
        if let Some(c) = self.cluster {
            items.push((Some(EVENT_TAG_CLUSTER), TlvValue::UnsignedInt(c as u64)));
        }
        if let Some(ev) = self.event {
            items.push((Some(EVENT_TAG_EVENT), TlvValue::UnsignedInt(ev as u64)));
        }
        TlvValue::List(items)
    }

    fn from_tlv(v: &TlvValue) -> Result<Self, CoreError> {
        let items = match v {
            TlvValue::List(items) => items.as_slice(),
            _ => return Err(CoreError::InvalidTag),
        };
        let mut path = Self::wildcard();
        for (tag, item) in items {
            match (tag, item.as_u64()) {
                (Some(EVENT_TAG_ENDPOINT), Some(v)) => path.endpoint = Some(v as u16),
                (Some(EVENT_TAG_CLUSTER), Some(v)) => path.cluster = Some(v as u32),
                (Some(EVENT_TAG_EVENT), Some(v)) => path.event = Some(v as u32),
                _ => {},
            }
        }
        Ok(path)
    }
}

/// Command path: concrete for every accepted invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandPath {
    pub endpoint: Option<u16>,
    pub cluster: Option<u32>,
    pub command: Option<u32>,
}

impl CommandPath {
    pub fn concrete(endpoint: u16, cluster: u32, command: u32) -> Self {
        Self { endpoint: Some(endpoint), cluster: Some(cluster), command: Some(command) }
    }

    pub fn is_concrete(&self) -> bool {
        self.endpoint.is_some() && self.cluster.is_some() && self.command.is_some()
    }

    fn to_tlv(self) -> TlvValue {
        let mut items = Vec::new();
        if let Some(e) = self.endpoint {
            items.push((Some(0), TlvValue::UnsignedInt(e as u64)));
        }
        if let Some(c) = self.cluster {
            items.push((Some(1), TlvValue::UnsignedInt(c as u64)));
        }
        if let Some(cmd) = self.command {
            items.push((Some(2), TlvValue::UnsignedInt(cmd as u64)));
        }
        TlvValue::List(items)
    }

    fn from_tlv(v: &TlvValue) -> Result<Self, CoreError> {
        let items = match v {
            TlvValue::List(items) => items.as_slice(),
            _ => return Err(CoreError::InvalidTag),
        };
        let mut path = Self { endpoint: None, cluster: None, command: None };
        for (tag, item) in items {
            match (tag, item.as_u64()) {
                (Some(0), Some(v)) => path.endpoint = Some(v as u16),
                (Some(1), Some(v)) => path.cluster = Some(v as u32),
                (Some(2), Some(v)) => path.command = Some(v as u32),
                _ => {},
            }
        }
        Ok(path)
    }
}

/// Skip a cluster's attribute reports when the peer already holds this
/// data version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataVersionFilter {
    pub endpoint: u16,
    pub cluster: u32,
    pub version: u32,
}

impl DataVersionFilter {
    fn to_tlv(self) -> TlvValue {
        TlvValue::Struct(vec![
            (
                0,
                TlvValue::List(vec![
                    (Some(1), TlvValue::UnsignedInt(self.endpoint as u64)),
                    (Some(2), TlvValue::UnsignedInt(self.cluster as u64)),
                ]),
            ),
            (1, TlvValue::UnsignedInt(self.version as u64)),
        ])
    }

    fn from_tlv(v: &TlvValue) -> Result<Self, CoreError> {
        let endpoint = v.get(&[0, 1]).and_then(TlvValue::as_u64).ok_or(CoreError::InvalidTag)?;
        let cluster = v.get(&[0, 2]).and_then(TlvValue::as_u64).ok_or(CoreError::InvalidTag)?;
        let version = v.field(1).and_then(TlvValue::as_u64).ok_or(CoreError::InvalidTag)?;
        Ok(Self {
            endpoint: endpoint as u16,
            cluster: cluster as u32,
            version: version as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRequest {
    pub attribute_paths: Vec<AttributePath>,
    pub event_paths: Vec<EventPath>,
    pub event_min: Option<u64>,
    pub fabric_filtered: bool,
    pub version_filters: Vec<DataVersionFilter>,
}

impl ReadRequest {
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.to_tlv())
    }

    fn to_tlv(&self) -> TlvValue {
        let mut fields = Vec::new();
        if !self.attribute_paths.is_empty() {
            fields.push((
                0,
                TlvValue::Array(
                    self.attribute_paths.iter().map(|p| p.to_tlv()).collect(),
                ),
            ));
        }
        if !self.event_paths.is_empty() {
            fields.push((
                1,
                TlvValue::Array(self.event_paths.iter().map(|p| p.to_tlv()).collect()),
            ));
        }
        if let Some(min) = self.event_min {
            fields.push((
                2,
                TlvValue::Array(vec![TlvValue::Struct(vec![(
                    1,
                    TlvValue::UnsignedInt(min),
                )])]),
            ));
        }
        fields.push((3, TlvValue::Bool(self.fabric_filtered)));
        if !self.version_filters.is_empty() {
            fields.push((
                4,
                TlvValue::Array(
                    self.version_filters.iter().map(|f| f.to_tlv()).collect(),
                ),
            ));
        }
        TlvValue::Struct(fields)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        Self::from_tlv(&decode(raw)?)
    }

    fn from_tlv(root: &TlvValue) -> Result<Self, CoreError> {
        let mut req = Self::default();
        if let Some(paths) = root.field(0).and_then(TlvValue::as_array) {
            for p in paths {
                req.attribute_paths.push(AttributePath::from_tlv(p)?);
            }
        }
        if let Some(paths) = root.field(1).and_then(TlvValue::as_array) {
            for p in paths {
                req.event_paths.push(EventPath::from_tlv(p)?);
            }
        }
        if let Some(filters) = root.field(2).and_then(TlvValue::as_array) {
            req.event_min = filters
                .first()
                .and_then(|f| f.field(1))
                .and_then(TlvValue::as_u64);
        }
        req.fabric_filtered = root.field(3).and_then(TlvValue::as_bool).unwrap_or(false);
        if let Some(filters) = root.field(4).and_then(TlvValue::as_array) {
            for f in filters {
                req.version_filters.push(DataVersionFilter::from_tlv(f)?);
            }
        }
        Ok(req)
    }
}

/// One entry of a ReportData: attribute data or a per-path status.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeReport {
    Data { path: AttributePath, version: u32, value: TlvValue },
    Status { path: AttributePath, status: u16 },
}

/// One reported event record.
#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    pub endpoint: u16,
    pub cluster: u32,
    pub event: u32,
    pub number: u64,
    pub priority: u8,
    pub system_timestamp_us: u64,
    pub data: TlvValue,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportData {
    pub subscription_id: Option<u32>,
    pub attribute_reports: Vec<AttributeReport>,
    pub event_reports: Vec<EventReport>,
    pub suppress_response: bool,
}

impl ReportData {
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = Vec::new();
        if let Some(id) = self.subscription_id {
            fields.push((0, TlvValue::UnsignedInt(id as u64)));
        }
        if !self.attribute_reports.is_empty() {
            let reports = self
                .attribute_reports
                .iter()
                .map(|r| match r {
                    AttributeReport::Data { path, version, value } => {
                        TlvValue::Struct(vec![(
                            1,
                            TlvValue::Struct(vec![
                                (0, TlvValue::UnsignedInt(*version as u64)),
                                (1, path.to_tlv()),
                                (2, value.clone()),
                            ]),
                        )])
                    },
                    AttributeReport::Status { path, status } => TlvValue::Struct(vec![(
                        0,
                        TlvValue::Struct(vec![
                            (0, path.to_tlv()),
                            (
                                1,
                                TlvValue::Struct(vec![(
                                    0,
                                    TlvValue::UnsignedInt(*status as u64),
                                )]),
                            ),
                        ]),
                    )]),
                })
                .collect();
            fields.push((1, TlvValue::Array(reports)));
        }
        if !self.event_reports.is_empty() {
            let reports = self
                .event_reports
                .iter()
                .map(|e| {
                    TlvValue::Struct(vec![(
                        1,
                        TlvValue::Struct(vec![
                            (
                                0,
                                TlvValue::List(vec![
                                    (
                                        Some(EVENT_TAG_ENDPOINT),
                                        TlvValue::UnsignedInt(e.endpoint as u64),
                                    ),
                                    (
                                        Some(EVENT_TAG_CLUSTER),
                                        TlvValue::UnsignedInt(e.cluster as u64),
                                    ),
                                    (
                                        Some(EVENT_TAG_EVENT),
                                        TlvValue::UnsignedInt(e.event as u64),
                                    ),
                                ]),
                            ),
                            (1, TlvValue::UnsignedInt(e.number)),
                            (2, TlvValue::UnsignedInt(e.priority as u64)),
                            (4, TlvValue::UnsignedInt(e.system_timestamp_us)),
                            (7, e.data.clone()),
                        ]),
                    )])
                })
                .collect();
            fields.push((2, TlvValue::Array(reports)));
        }
        fields.push((4, TlvValue::Bool(self.suppress_response)));
        encode(&TlvValue::Struct(fields))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        let mut report = Self {
            subscription_id: root.field(0).and_then(TlvValue::as_u64).map(|v| v as u32),
            suppress_response: root.field(4).and_then(TlvValue::as_bool).unwrap_or(false),
            ..Self::default()
        };
        if let Some(reports) = root.field(1).and_then(TlvValue::as_array) {
            for r in reports {
                if let Some(data) = r.field(1) {
                    let path = AttributePath::from_tlv(
                        data.field(1).ok_or(CoreError::InvalidTag)?,
                    )?;
                    let version = data
                        .field(0)
                        .and_then(TlvValue::as_u64)
                        .ok_or(CoreError::InvalidTag)? as u32;
                    let value =
                        data.field(2).cloned().ok_or(CoreError::InvalidTag)?;
                    report
                        .attribute_reports
                        .push(AttributeReport::Data { path, version, value });
                } else if let Some(st) = r.field(0) {
                    let path = AttributePath::from_tlv(
                        st.field(0).ok_or(CoreError::InvalidTag)?,
                    )?;
                    let status = st
                        .get(&[1, 0])
                        .and_then(TlvValue::as_u64)
                        .ok_or(CoreError::InvalidTag)? as u16;
                    report.attribute_reports.push(AttributeReport::Status { path, status });
                } else {
                    return Err(CoreError::InvalidTag);
                }
            }
        }
        if let Some(reports) = root.field(2).and_then(TlvValue::as_array) {
            for r in reports {
                let data = r.field(1).ok_or(CoreError::InvalidTag)?;
                let path = data.field(0).ok_or(CoreError::InvalidTag)?;
                report.event_reports.push(EventReport {
                    endpoint: path
                        .get(&[EVENT_TAG_ENDPOINT])
                        .and_then(TlvValue::as_u64)
                        .ok_or(CoreError::InvalidTag)? as u16,
                    cluster: path
                        .get(&[EVENT_TAG_CLUSTER])
                        .and_then(TlvValue::as_u64)
                        .ok_or(CoreError::InvalidTag)? as u32,
                    event: path
                        .get(&[EVENT_TAG_EVENT])
                        .and_then(TlvValue::as_u64)
                        .ok_or(CoreError::InvalidTag)? as u32,
                    number: data
                        .field(1)
                        .and_then(TlvValue::as_u64)
                        .ok_or(CoreError::InvalidTag)?,
                    priority: data.field(2).and_then(TlvValue::as_u64).unwrap_or(0) as u8,
                    system_timestamp_us: data
                        .field(4)
                        .and_then(TlvValue::as_u64)
                        .unwrap_or(0),
                    data: data.field(7).cloned().unwrap_or(TlvValue::Null),
                });
            }
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteRequest {
    pub suppress_response: bool,
    pub timed_request: bool,
    pub writes: Vec<(AttributePath, TlvValue)>,
}

impl WriteRequest {
    pub fn encode(&self) -> Vec<u8> {
        let writes = self
            .writes
            .iter()
            .map(|(path, value)| {
                TlvValue::Struct(vec![(1, path.to_tlv()), (2, value.clone())])
            })
            .collect();
        encode(&TlvValue::Struct(vec![
            (0, TlvValue::Bool(self.suppress_response)),
            (1, TlvValue::Bool(self.timed_request)),
            (2, TlvValue::Array(writes)),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        let mut req = Self {
            suppress_response: root.field(0).and_then(TlvValue::as_bool).unwrap_or(false),
            timed_request: root.field(1).and_then(TlvValue::as_bool).unwrap_or(false),
            ..Self::default()
        };
        if let Some(writes) = root.field(2).and_then(TlvValue::as_array) {
            for w in writes {
                let path =
                    AttributePath::from_tlv(w.field(1).ok_or(CoreError::InvalidTag)?)?;
                let value = w.field(2).cloned().ok_or(CoreError::InvalidTag)?;
                req.writes.push((path, value));
            }
        }
        Ok(req)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteResponse {
    pub statuses: Vec<(AttributePath, u16)>,
}

impl WriteResponse {
    pub fn encode(&self) -> Vec<u8> {
        let statuses = self
            .statuses
            .iter()
            .map(|(path, status)| {
                TlvValue::Struct(vec![
                    (0, path.to_tlv()),
                    (1, TlvValue::Struct(vec![(0, TlvValue::UnsignedInt(*status as u64))])),
                ])
            })
            .collect();
        encode(&TlvValue::Struct(vec![(0, TlvValue::Array(statuses))]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        let mut rsp = Self::default();
        if let Some(statuses) = root.field(0).and_then(TlvValue::as_array) {
            for s in statuses {
                let path =
                    AttributePath::from_tlv(s.field(0).ok_or(CoreError::InvalidTag)?)?;
                let status = s
                    .get(&[1, 0])
                    .and_then(TlvValue::as_u64)
                    .ok_or(CoreError::InvalidTag)? as u16;
                rsp.statuses.push((path, status));
            }
        }
        Ok(rsp)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvokeRequest {
    pub suppress_response: bool,
    pub timed_request: bool,
    pub invokes: Vec<(CommandPath, Option<TlvValue>)>,
}

impl InvokeRequest {
    pub fn encode(&self) -> Vec<u8> {
        let invokes = self
            .invokes
            .iter()
            .map(|(path, fields)| {
                let mut entry = vec![(0, path.to_tlv())];
                if let Some(fields) = fields {
                    entry.push((1, fields.clone()));
                }
                TlvValue::Struct(entry)
            })
            .collect();
        encode(&TlvValue::Struct(vec![
            (0, TlvValue::Bool(self.suppress_response)),
            (1, TlvValue::Bool(self.timed_request)),
            (2, TlvValue::Array(invokes)),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        let mut req = Self {
            suppress_response: root.field(0).and_then(TlvValue::as_bool).unwrap_or(false),
            timed_request: root.field(1).and_then(TlvValue::as_bool).unwrap_or(false),
            ..Self::default()
        };
        if let Some(invokes) = root.field(2).and_then(TlvValue::as_array) {
            for inv in invokes {
                let path =
                    CommandPath::from_tlv(inv.field(0).ok_or(CoreError::InvalidTag)?)?;
                req.invokes.push((path, inv.field(1).cloned()));
            }
        }
        Ok(req)
    }
}

/// One entry of an InvokeResponse.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeResponseEntry {
    Command { path: CommandPath, fields: Option<TlvValue> },
    Status { path: CommandPath, status: u16 },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvokeResponse {
    pub suppress_response: bool,
    pub responses: Vec<InvokeResponseEntry>,
}

impl InvokeResponse {
    pub fn encode(&self) -> Vec<u8> {
        let responses = self
            .responses
            .iter()
            .map(|r| match r {
                InvokeResponseEntry::Command { path, fields } => {
                    let mut entry = vec![(0, path.to_tlv())];
                    if let Some(fields) = fields {
                        entry.push((1, fields.clone()));
                    }
                    TlvValue::Struct(vec![(0, TlvValue::Struct(entry))])
                },
                InvokeResponseEntry::Status { path, status } => TlvValue::Struct(vec![(
                    1,
                    TlvValue::Struct(vec![
                        (0, path.to_tlv()),
                        (
                            1,
                            TlvValue::Struct(vec![(0, TlvValue::UnsignedInt(*status as u64))]),
                        ),
                    ]),
                )]),
            })
            .collect();
        encode(&TlvValue::Struct(vec![
            (0, TlvValue::Bool(self.suppress_response)),
            (1, TlvValue::Array(responses)),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        let mut rsp = Self {
            suppress_response: root.field(0).and_then(TlvValue::as_bool).unwrap_or(false),
            ..Self::default()
        };
        if let Some(responses) = root.field(1).and_then(TlvValue::as_array) {
            for r in responses {
                if let Some(cmd) = r.field(0) {
                    let path =
                        CommandPath::from_tlv(cmd.field(0).ok_or(CoreError::InvalidTag)?)?;
                    rsp.responses.push(InvokeResponseEntry::Command {
                        path,
                        fields: cmd.field(1).cloned(),
                    });
                } else if let Some(st) = r.field(1) {
                    let path =
                        CommandPath::from_tlv(st.field(0).ok_or(CoreError::InvalidTag)?)?;
                    let status = st
                        .get(&[1, 0])
                        .and_then(TlvValue::as_u64)
                        .ok_or(CoreError::InvalidTag)? as u16;
                    rsp.responses.push(InvokeResponseEntry::Status { path, status });
                } else {
                    return Err(CoreError::InvalidTag);
                }
            }
        }
        Ok(rsp)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscribeRequest {
    pub keep_subscriptions: bool,
    pub min_interval_s: u16,
    pub max_interval_s: u16,
    pub attribute_paths: Vec<AttributePath>,
    pub event_paths: Vec<EventPath>,
    pub fabric_filtered: bool,
    pub version_filters: Vec<DataVersionFilter>,
}

impl SubscribeRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = vec![
            (0, TlvValue::Bool(self.keep_subscriptions)),
            (1, TlvValue::UnsignedInt(self.min_interval_s as u64)),
            (2, TlvValue::UnsignedInt(self.max_interval_s as u64)),
        ];
        if !self.attribute_paths.is_empty() {
            fields.push((
                3,
                TlvValue::Array(
                    self.attribute_paths.iter().map(|p| p.to_tlv()).collect(),
                ),
            ));
        }
        if !self.event_paths.is_empty() {
            fields.push((
                4,
                TlvValue::Array(self.event_paths.iter().map(|p| p.to_tlv()).collect()),
            ));
        }
        fields.push((7, TlvValue::Bool(self.fabric_filtered)));
        if !self.version_filters.is_empty() {
            fields.push((
                8,
                TlvValue::Array(
                    self.version_filters.iter().map(|f| f.to_tlv()).collect(),
                ),
            ));
        }
        encode(&TlvValue::Struct(fields))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        let mut req = Self {
            keep_subscriptions: root.field(0).and_then(TlvValue::as_bool).unwrap_or(false),
            min_interval_s: root
                .field(1)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
            max_interval_s: root
                .field(2)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
            fabric_filtered: root.field(7).and_then(TlvValue::as_bool).unwrap_or(false),
            ..Self::default()
        };
        if let Some(paths) = root.field(3).and_then(TlvValue::as_array) {
            for p in paths {
                req.attribute_paths.push(AttributePath::from_tlv(p)?);
            }
        }
        if let Some(paths) = root.field(4).and_then(TlvValue::as_array) {
            for p in paths {
                req.event_paths.push(EventPath::from_tlv(p)?);
            }
        }
        if let Some(filters) = root.field(8).and_then(TlvValue::as_array) {
            for f in filters {
                req.version_filters.push(DataVersionFilter::from_tlv(f)?);
            }
        }
        Ok(req)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeResponse {
    pub subscription_id: u32,
    pub max_interval_s: u16,
}

impl SubscribeResponse {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![
            (0, TlvValue::UnsignedInt(self.subscription_id as u64)),
            (2, TlvValue::UnsignedInt(self.max_interval_s as u64)),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            subscription_id: root
                .field(0)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u32,
            max_interval_s: root
                .field(2)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: u16,
}

impl StatusResponse {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![(0, TlvValue::UnsignedInt(self.status as u64))]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            status: root
                .field(0)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedRequest {
    pub timeout_ms: u16,
}

impl TimedRequest {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![(0, TlvValue::UnsignedInt(self.timeout_ms as u64))]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            timeout_ms: root
                .field(0)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
        })
    }
}
