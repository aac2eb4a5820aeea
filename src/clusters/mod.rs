// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The cluster layer: framework, registry and the built-in cluster set.
//!
//! Every endpoint hosts an ordered set of cluster instances; each
//! instance pairs its declaration with a value map and a command
//! handler. One logical writer (the interaction-model router) owns the
//! registry, so instances need no interior locking.

pub mod access_control;
pub mod administrator_commissioning;
pub mod basic_information;
pub mod descriptor;
pub mod framework;
pub mod general_commissioning;
pub mod group_key_management;
pub mod identify;
pub mod level_control;
pub mod network_commissioning;
pub mod on_off;
pub mod operational_credentials;

use std::collections::BTreeMap;

use enum_dispatch::enum_dispatch;

use crate::{
    clusters::framework::{
        ClusterDef, ClusterId, ClusterState, CommandDef, EventPriority,
    },
    im::events::EventStore,
    models::im::status,
    session::FabricTable,
    tlv::TlvValue,
};

/// What a command handler resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Plain success status in the invoke response.
    Success,
    /// A command response struct; the reported command id becomes the
    /// declared response id.
    Response(TlvValue),
    /// An error status for the path.
    Status(u16),
}

/// Mutable node facilities a command handler may touch.
///
/// Handlers run under the router's single-writer discipline; anything
/// they change here is picked up by the orchestrator after the invoke
/// completes (closed sessions, session→fabric binding).
pub struct NodeServices<'a> {
    pub fabrics: &'a mut FabricTable,
    pub events: &'a mut EventStore,
    pub commissioning: &'a mut CommissioningState,
    /// Fabric indices removed during this invoke; their sessions die.
    pub removed_fabrics: Vec<u8>,
    /// Set when AddNOC binds the current (PASE) session to a fabric.
    pub session_fabric_binding: Option<u8>,
}

/// Transient commissioning-window state shared by the root clusters.
#[derive(Default)]
pub struct CommissioningState {
    pub failsafe_deadline_ms: Option<u64>,
    pub breadcrumb: u64,
    /// Root certificate staged by AddTrustedRootCertificate until AddNOC.
    pub pending_root_cert: Option<Vec<u8>>,
    /// Operational keypair minted by CSRRequest, consumed by AddNOC.
    pub pending_operational_key: Option<p256::ecdsa::SigningKey>,
}

impl std::fmt::Debug for CommissioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommissioningState")
            .field("failsafe_deadline_ms", &self.failsafe_deadline_ms)
            .field("breadcrumb", &self.breadcrumb)
            .field("has_pending_root", &self.pending_root_cert.is_some())
            .field("has_pending_key", &self.pending_operational_key.is_some())
            .finish()
    }
}

/// Per-invoke context handed to a handler.
pub struct CommandContext<'a, 'b> {
    pub endpoint: u16,
    pub fabric_index: Option<u8>,
    pub peer_node_id: u64,
    pub local_session_id: u16,
    pub attestation_challenge: [u8; 16],
    pub now_ms: u64,
    pub now_us: u64,
    pub services: &'a mut NodeServices<'b>,
}

impl CommandContext<'_, '_> {
    /// Record an event; the caller supplies the declaring cluster's id
    /// and the event definition's priority.
    pub fn emit_event(
        &mut self,
        cluster: ClusterId,
        event_id: u32,
        priority: EventPriority,
        data: TlvValue,
    ) -> u64 {
        self.services.events.append(
            self.endpoint,
            cluster,
            event_id,
            priority,
            self.now_us,
            data,
        )
    }
}

/// Command dispatch seam implemented per cluster.
#[enum_dispatch]
pub trait ClusterHandler {
    fn handle_command(
        &mut self,
        ctx: &mut CommandContext<'_, '_>,
        state: &mut ClusterState,
        command: &CommandDef,
        fields: &TlvValue,
    ) -> CommandOutcome;
}

/// Handler for clusters that accept no commands.
#[derive(Debug, Default)]
pub struct NoCommands;

impl ClusterHandler for NoCommands {
    fn handle_command(
        &mut self,
        _ctx: &mut CommandContext<'_, '_>,
        _state: &mut ClusterState,
        _command: &CommandDef,
        _fields: &TlvValue,
    ) -> CommandOutcome {
        CommandOutcome::Status(status::UNSUPPORTED_COMMAND)
    }
}

/// Tagged union of the built-in handler set; the registry dispatches
/// commands through it without a heap indirection.
#[enum_dispatch(ClusterHandler)]
pub enum BuiltinHandler {
    NoCommands(NoCommands),
    Identify(identify::Handler),
    OnOff(on_off::Handler),
    LevelControl(level_control::Handler),
    GeneralCommissioning(general_commissioning::Handler),
    OperationalCredentials(operational_credentials::Handler),
    GroupKeyManagement(group_key_management::Handler),
    AdministratorCommissioning(administrator_commissioning::Handler),
}

/// One instantiated cluster on one endpoint.
pub struct ClusterInstance {
    pub def: ClusterDef,
    pub state: ClusterState,
    pub handler: BuiltinHandler,
}

impl std::fmt::Debug for ClusterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterInstance")
            .field("cluster_id", &format_args!("0x{:04x}", self.def.id))
            .field("data_version", &self.state.data_version())
            .finish_non_exhaustive()
    }
}

/// The node's endpoint → cluster registry.
#[derive(Debug, Default)]
pub struct Registry {
    endpoints: BTreeMap<u16, BTreeMap<ClusterId, ClusterInstance>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cluster(
        &mut self,
        endpoint: u16,
        def: ClusterDef,
        handler: BuiltinHandler,
    ) {
        let state = ClusterState::instantiate(&def);
        self.endpoints
            .entry(endpoint)
            .or_default()
            .insert(def.id, ClusterInstance { def, state, handler });
    }

    pub fn endpoint_ids(&self) -> Vec<u16> {
        self.endpoints.keys().copied().collect()
    }

    pub fn has_endpoint(&self, endpoint: u16) -> bool {
        self.endpoints.contains_key(&endpoint)
    }

    pub fn cluster_ids(&self, endpoint: u16) -> Vec<ClusterId> {
        self.endpoints
            .get(&endpoint)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn instance(&self, endpoint: u16, cluster: ClusterId) -> Option<&ClusterInstance> {
        self.endpoints.get(&endpoint)?.get(&cluster)
    }

    pub fn instance_mut(
        &mut self,
        endpoint: u16,
        cluster: ClusterId,
    ) -> Option<&mut ClusterInstance> {
        self.endpoints.get_mut(&endpoint)?.get_mut(&cluster)
    }
}
