// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The interaction-model router: resolve paths, enforce access control,
//! run the operation against cluster state, shape the response envelope.

use tracing::debug;

use crate::{
    clusters::{
        ClusterHandler, ClusterInstance, CommandContext, CommandOutcome,
        CommissioningState, NodeServices, Registry, access_control,
    },
    im::{
        acl::{self, Privilege, Subject},
        events::EventStore,
        path::{self, Resolution},
    },
    models::im::{
        AttributePath, AttributeReport, CommandPath, EventReport, InvokeRequest,
        InvokeResponse, InvokeResponseEntry, ReadRequest, ReportData, SubscribeRequest,
        WriteRequest, WriteResponse, status, status_for,
    },
    session::FabricTable,
    tlv::TlvValue,
};

/// Endpoint hosting the infrastructure clusters (ACL lives here).
pub const ROOT_ENDPOINT: u16 = 0;

/// Mutable node state the router operates on.
pub struct RouterDeps<'a> {
    pub registry: &'a mut Registry,
    pub fabrics: &'a mut FabricTable,
    pub events: &'a mut EventStore,
    pub commissioning: &'a mut CommissioningState,
}

/// Per-request identity and clocks.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo {
    pub subject: Subject,
    pub local_session_id: u16,
    pub attestation_challenge: [u8; 16],
    pub now_ms: u64,
    pub now_us: u64,
}

/// Mutations an invoke performed outside cluster state.
#[derive(Debug, Default)]
pub struct InvokeSideEffects {
    pub removed_fabrics: Vec<u8>,
    pub session_fabric_binding: Option<u8>,
}

pub fn handle_read(
    deps: &mut RouterDeps<'_>,
    info: &RequestInfo,
    req: &ReadRequest,
) -> ReportData {
    let mut report = ReportData::default();

    for request_path in &req.attribute_paths {
        for resolution in path::expand(deps.registry, request_path) {
            match resolution {
                Resolution::Unresolved { path, error } => {
                    report.attribute_reports.push(AttributeReport::Status {
                        path,
                        status: status_for(&error),
                    });
                },
                Resolution::Concrete(p) => {
                    if let Some(entry) = read_one(deps, info, &p, &req.version_filters) {
                        report.attribute_reports.push(entry);
                    }
                },
            }
        }
    }

    let event_min = req.event_min.unwrap_or(0);
    for event_path in &req.event_paths {
        for record in deps.events.read(std::slice::from_ref(event_path), event_min) {
            let allowed = acl::check_access(
                deps.registry,
                ROOT_ENDPOINT,
                &info.subject,
                Privilege::View,
                record.endpoint,
                record.cluster,
            );
            if !allowed {
                continue;
            }
            report.event_reports.push(EventReport {
                endpoint: record.endpoint,
                cluster: record.cluster,
                event: record.event_id,
                number: record.number,
                priority: record.priority as u8,
                system_timestamp_us: record.system_timestamp_us,
                data: record.data.clone(),
            });
        }
    }

    report
}

/// Read one resolved attribute. `None` means the whole (endpoint,
/// cluster) was suppressed by a data-version filter.
fn read_one(
    deps: &RouterDeps<'_>,
    info: &RequestInfo,
    p: &AttributePath,
    filters: &[crate::models::im::DataVersionFilter],
) -> Option<AttributeReport> {
    let (endpoint, cluster, attribute) = (p.endpoint?, p.cluster?, p.attribute?);
    let instance = deps.registry.instance(endpoint, cluster)?;
    let version = instance.state.data_version();

    if filters
        .iter()
        .any(|f| f.endpoint == endpoint && f.cluster == cluster && f.version == version)
    {
        return None;
    }

    let allowed = acl::check_access(
        deps.registry,
        ROOT_ENDPOINT,
        &info.subject,
        Privilege::View,
        endpoint,
        cluster,
    );
    if !allowed {
        return Some(AttributeReport::Status {
            path: *p,
            status: status::UNSUPPORTED_ACCESS,
        });
    }

    let Some(value) = instance.state.get(attribute) else {
        return Some(AttributeReport::Status {
            path: *p,
            status: status::UNSUPPORTED_ATTRIBUTE,
        });
    };

    let fabric_scoped = instance
        .def
        .find_attribute(attribute)
        .map(|a| a.fabric_scoped)
        .unwrap_or(false);
    let value = if fabric_scoped {
        filter_fabric_entries(value, info.subject.fabric_index)
    } else {
        value.clone()
    };

    Some(AttributeReport::Data { path: *p, version, value })
}

/// Keep only list entries stamped with the requester's fabric index.
fn filter_fabric_entries(value: &TlvValue, fabric_index: Option<u8>) -> TlvValue {
    let TlvValue::Array(entries) = value else {
        return value.clone();
    };
    let Some(fabric_index) = fabric_index else {
        return TlvValue::Array(Vec::new());
    };
    TlvValue::Array(
        entries
            .iter()
            .filter(|e| {
                e.field(crate::clusters::framework::FABRIC_INDEX_FIELD)
                    .and_then(TlvValue::as_u64)
                    .is_some_and(|f| f == fabric_index as u64)
            })
            .cloned()
            .collect(),
    )
}

pub fn handle_write(
    deps: &mut RouterDeps<'_>,
    info: &RequestInfo,
    req: &WriteRequest,
) -> WriteResponse {
    let mut response = WriteResponse::default();
    for (p, value) in &req.writes {
        let status = write_one(deps, info, p, value);
        response.statuses.push((*p, status));
    }
    response
}

fn write_one(
    deps: &mut RouterDeps<'_>,
    info: &RequestInfo,
    p: &AttributePath,
    value: &TlvValue,
) -> u16 {
    if !p.is_concrete() {
        return status_for(&path::wildcard_error(p));
    }
    let (endpoint, cluster, attribute) = match (p.endpoint, p.cluster, p.attribute) {
        (Some(e), Some(c), Some(a)) => (e, c, a),
        _ => return status::FAILURE,
    };

    if !deps.registry.has_endpoint(endpoint) {
        return status::UNSUPPORTED_ENDPOINT;
    }
    let Some(instance) = deps.registry.instance(endpoint, cluster) else {
        return status::UNSUPPORTED_CLUSTER;
    };
    let Some(attr_def) = instance.def.find_attribute(attribute) else {
        // globals exist but are never writable
        if instance.def.attribute_ids().contains(&attribute) {
            return status::UNSUPPORTED_WRITE;
        }
        return status::UNSUPPORTED_ATTRIBUTE;
    };

    // writes into the ACL demand administer, everything else operate
    let needed = if cluster == access_control::CLUSTER_ID {
        Privilege::Administer
    } else {
        Privilege::Operate
    };
    let allowed = acl::check_access(
        deps.registry,
        ROOT_ENDPOINT,
        &info.subject,
        needed,
        endpoint,
        cluster,
    );
    if !allowed {
        return status::UNSUPPORTED_ACCESS;
    }

    if !attr_def.writable {
        return status::UNSUPPORTED_WRITE;
    }
    if !attr_def.constraint.allows(value) {
        return status::CONSTRAINT_ERROR;
    }

    let fabric_scoped = attr_def.fabric_scoped;
    let new_value = if fabric_scoped {
        let Some(instance) = deps.registry.instance(endpoint, cluster) else {
            return status::UNSUPPORTED_CLUSTER;
        };
        let current = instance.state.get(attribute).cloned().unwrap_or(TlvValue::Array(Vec::new()));
        merge_fabric_entries(&current, value, info.subject.fabric_index)
    } else {
        value.clone()
    };

    let Some(instance) = deps.registry.instance_mut(endpoint, cluster) else {
        return status::UNSUPPORTED_CLUSTER;
    };
    instance.state.set(attribute, new_value);
    debug!(endpoint, cluster, attribute, "attribute written");
    status::SUCCESS
}

/// Replace the requester's entries in a fabric-scoped list, leaving
/// other fabrics' entries untouched. New entries are stamped with the
/// writer's fabric index.
fn merge_fabric_entries(
    current: &TlvValue,
    incoming: &TlvValue,
    fabric_index: Option<u8>,
) -> TlvValue {
    let fabric_index = fabric_index.unwrap_or(0) as u64;
    let mut merged: Vec<TlvValue> = match current {
        TlvValue::Array(entries) => entries
            .iter()
            .filter(|e| {
                e.field(crate::clusters::framework::FABRIC_INDEX_FIELD)
                    .and_then(TlvValue::as_u64)
                    .is_some_and(|f| f != fabric_index)
            })
            .cloned()
            .collect(),
        _ => Vec::new(),
    };
    if let TlvValue::Array(entries) = incoming {
        for entry in entries {
            merged.push(stamp_fabric_index(entry, fabric_index));
        }
    }
    TlvValue::Array(merged)
}

fn stamp_fabric_index(entry: &TlvValue, fabric_index: u64) -> TlvValue {
    let TlvValue::Struct(fields) = entry else {
        return entry.clone();
    };
    let mut fields: Vec<(u8, TlvValue)> = fields
        .iter()
        .filter(|(t, _)| *t != crate::clusters::framework::FABRIC_INDEX_FIELD)
        .cloned()
        .collect();
    fields.push((
        crate::clusters::framework::FABRIC_INDEX_FIELD,
        TlvValue::UnsignedInt(fabric_index),
    ));
    TlvValue::Struct(fields)
}

pub fn handle_invoke(
    deps: &mut RouterDeps<'_>,
    info: &RequestInfo,
    req: &InvokeRequest,
) -> (InvokeResponse, InvokeSideEffects) {
    let mut response = InvokeResponse {
        suppress_response: req.suppress_response,
        ..InvokeResponse::default()
    };
    let mut services = NodeServices {
        fabrics: &mut *deps.fabrics,
        events: &mut *deps.events,
        commissioning: &mut *deps.commissioning,
        removed_fabrics: Vec::new(),
        session_fabric_binding: None,
    };

    for (p, fields) in &req.invokes {
        let entry = invoke_one(deps.registry, &mut services, info, p, fields.as_ref());
        response.responses.push(entry);
    }

    let effects = InvokeSideEffects {
        removed_fabrics: services.removed_fabrics,
        session_fabric_binding: services.session_fabric_binding,
    };
    (response, effects)
}

fn invoke_one(
    registry: &mut Registry,
    services: &mut NodeServices<'_>,
    info: &RequestInfo,
    p: &CommandPath,
    fields: Option<&TlvValue>,
) -> InvokeResponseEntry {
    let status_entry =
        |status: u16| InvokeResponseEntry::Status { path: *p, status };

    let (endpoint, cluster, command) = match (p.endpoint, p.cluster, p.command) {
        (Some(e), Some(c), Some(cmd)) => (e, c, cmd),
        (None, _, _) => return status_entry(status::UNSUPPORTED_ENDPOINT),
        (_, None, _) => return status_entry(status::UNSUPPORTED_CLUSTER),
        _ => return status_entry(status::UNSUPPORTED_COMMAND),
    };

    if !registry.has_endpoint(endpoint) {
        return status_entry(status::UNSUPPORTED_ENDPOINT);
    }
    if registry.instance(endpoint, cluster).is_none() {
        return status_entry(status::UNSUPPORTED_CLUSTER);
    }
    let allowed = acl::check_access(
        registry,
        ROOT_ENDPOINT,
        &info.subject,
        Privilege::Operate,
        endpoint,
        cluster,
    );
    if !allowed {
        return status_entry(status::UNSUPPORTED_ACCESS);
    }

    let Some(instance) = registry.instance_mut(endpoint, cluster) else {
        return status_entry(status::UNSUPPORTED_CLUSTER);
    };
    let ClusterInstance { def, state, handler } = instance;
    let Some(command_def) = def.find_command(command) else {
        return status_entry(status::UNSUPPORTED_COMMAND);
    };

    let empty = TlvValue::Struct(Vec::new());
    let fields = fields.unwrap_or(&empty);
    let mut ctx = CommandContext {
        endpoint,
        fabric_index: info.subject.fabric_index,
        peer_node_id: info.subject.node_id,
        local_session_id: info.local_session_id,
        attestation_challenge: info.attestation_challenge,
        now_ms: info.now_ms,
        now_us: info.now_us,
        services,
    };
    match handler.handle_command(&mut ctx, state, command_def, fields) {
        CommandOutcome::Success => status_entry(status::SUCCESS),
        CommandOutcome::Status(code) => status_entry(code),
        CommandOutcome::Response(response_fields) => {
            let response_command = command_def.response_id.unwrap_or(command);
            InvokeResponseEntry::Command {
                path: CommandPath::concrete(endpoint, cluster, response_command),
                fields: Some(response_fields),
            }
        },
    }
}

/// Phase-one subscribe: run the subscribed read and stamp the priming
/// report with the allocated subscription id.
pub fn handle_subscribe_priming(
    deps: &mut RouterDeps<'_>,
    info: &RequestInfo,
    req: &SubscribeRequest,
    subscription_id: u32,
) -> ReportData {
    let read = ReadRequest {
        attribute_paths: req.attribute_paths.clone(),
        event_paths: req.event_paths.clone(),
        event_min: None,
        fabric_filtered: req.fabric_filtered,
        version_filters: req.version_filters.clone(),
    };
    let mut report = handle_read(deps, info, &read);
    report.subscription_id = Some(subscription_id);
    report
}
