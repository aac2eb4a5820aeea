// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Access-control evaluation.
//!
//! Entries live in the AccessControl cluster's fabric-scoped ACL
//! attribute on the root endpoint; evaluation reads them straight out of
//! cluster state, so ACL writes take effect on the next frame. PASE
//! sessions are the commissioning channel and carry implicit administer
//! rights; everything else must match an entry.

use crate::{
    clusters::{Registry, access_control, framework::FABRIC_INDEX_FIELD},
    session::AuthMode,
    tlv::TlvValue,
};

/// Privilege levels, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Privilege {
    View = 1,
    Operate = 3,
    Manage = 4,
    Administer = 5,
}

/// Entry auth-mode discriminants on the wire.
const AUTH_MODE_CASE: u64 = 2;
const AUTH_MODE_GROUP: u64 = 3;

/// Who is asking.
#[derive(Debug, Clone, Copy)]
pub struct Subject {
    pub node_id: u64,
    pub fabric_index: Option<u8>,
    pub auth_mode: AuthMode,
}

/// Evaluate `(subject, privilege, endpoint, cluster)` against the ACL.
pub fn check_access(
    registry: &Registry,
    root_endpoint: u16,
    subject: &Subject,
    privilege: Privilege,
    endpoint: u16,
    cluster: u32,
) -> bool {
    // the passcode-verified commissioning channel is implicitly admin
    if subject.auth_mode == AuthMode::Pase {
        return true;
    }
    let Some(fabric_index) = subject.fabric_index else {
        return false;
    };

    let Some(acl_cluster) = registry.instance(root_endpoint, access_control::CLUSTER_ID)
    else {
        return false;
    };
    let Some(entries) = acl_cluster
        .state
        .get(access_control::ATTR_ACL)
        .and_then(TlvValue::as_array)
    else {
        return false;
    };

    entries.iter().any(|entry| {
        entry_matches(entry, subject, fabric_index, privilege, endpoint, cluster)
    })
}

fn entry_matches(
    entry: &TlvValue,
    subject: &Subject,
    fabric_index: u8,
    privilege: Privilege,
    endpoint: u16,
    cluster: u32,
) -> bool {
    // fabric-scoped: entries of other fabrics never apply
    let entry_fabric = entry
        .field(FABRIC_INDEX_FIELD)
        .and_then(TlvValue::as_u64)
        .unwrap_or(0) as u8;
    if entry_fabric != fabric_index {
        return false;
    }

    let entry_privilege = entry
        .field(access_control::FIELD_PRIVILEGE)
        .and_then(TlvValue::as_u64)
        .unwrap_or(0);
    if entry_privilege < privilege as u8 as u64 {
        return false;
    }

    let entry_auth = entry
        .field(access_control::FIELD_AUTH_MODE)
        .and_then(TlvValue::as_u64)
        .unwrap_or(AUTH_MODE_CASE);
    let wanted_auth = match subject.auth_mode {
        AuthMode::Case => AUTH_MODE_CASE,
        AuthMode::Group => AUTH_MODE_GROUP,
        AuthMode::Pase => return false,
    };
    if entry_auth != wanted_auth {
        return false;
    }

    // null subjects = any node on the fabric
    let subjects_ok = match entry.field(access_control::FIELD_SUBJECTS) {
        None | Some(TlvValue::Null) => true,
        Some(TlvValue::Array(subjects)) => subjects
            .iter()
            .filter_map(TlvValue::as_u64)
            .any(|s| s == subject.node_id),
        Some(_) => false,
    };
    if !subjects_ok {
        return false;
    }

    // null targets = the whole node
    match entry.field(access_control::FIELD_TARGETS) {
        None | Some(TlvValue::Null) => true,
        Some(TlvValue::Array(targets)) => targets.iter().any(|t| {
            let ep_ok = t
                .field(access_control::TARGET_ENDPOINT)
                .and_then(TlvValue::as_u64)
                .is_none_or(|e| e == endpoint as u64);
            let cl_ok = t
                .field(access_control::TARGET_CLUSTER)
                .and_then(TlvValue::as_u64)
                .is_none_or(|c| c == cluster as u64);
            ep_ok && cl_ok
        }),
        Some(_) => false,
    }
}

/// Build an ACL entry value the way the cluster stores it.
pub fn make_entry(
    privilege: Privilege,
    subjects: Option<Vec<u64>>,
    targets: Option<Vec<(Option<u16>, Option<u32>)>>,
    fabric_index: u8,
) -> TlvValue {
    let mut fields = vec![
        (
            access_control::FIELD_PRIVILEGE,
            TlvValue::UnsignedInt(privilege as u8 as u64),
        ),
        (access_control::FIELD_AUTH_MODE, TlvValue::UnsignedInt(AUTH_MODE_CASE)),
    ];
    fields.push((
        access_control::FIELD_SUBJECTS,
        match subjects {
            Some(s) => {
                TlvValue::Array(s.into_iter().map(TlvValue::UnsignedInt).collect())
            },
            None => TlvValue::Null,
        },
    ));
    fields.push((
        access_control::FIELD_TARGETS,
        match targets {
            Some(t) => TlvValue::Array(
                t.into_iter()
                    .map(|(ep, cl)| {
                        let mut target = Vec::new();
                        if let Some(cl) = cl {
                            target.push((
                                access_control::TARGET_CLUSTER,
                                TlvValue::UnsignedInt(cl as u64),
                            ));
                        }
                        if let Some(ep) = ep {
                            target.push((
                                access_control::TARGET_ENDPOINT,
                                TlvValue::UnsignedInt(ep as u64),
                            ));
                        }
                        TlvValue::Struct(target)
                    })
                    .collect(),
            ),
            None => TlvValue::Null,
        },
    ));
    fields.push((FABRIC_INDEX_FIELD, TlvValue::UnsignedInt(fabric_index as u64)));
    TlvValue::Struct(fields)
}
