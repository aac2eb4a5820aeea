// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The message orchestrator: one frame in, an action list out.
//!
//! `handle_frame` is the single entry point for every received datagram;
//! `handle_mrp_timer` and `handle_tick` are the two time-driven inputs.
//! All three are pure of I/O: the shell performs the returned actions.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::{
    clusters::{CommissioningState, Registry},
    errors::CoreError,
    exchange::{
        ExchangeManager, ReliableChannel, RETRY_INTERVAL_ACTIVE_MS,
        RETRY_INTERVAL_IDLE_MS, mrp::{RetransmitOutcome, retransmit_interval_ms},
    },
    im::{
        acl::Subject,
        events::EventStore,
        router::{self, RequestInfo, RouterDeps},
        subscriptions::{Subscription, SubscriptionManager, SubscriptionPhase, TickOutcome},
    },
    models::{
        im::{
            InvokeRequest, ReadRequest, ReportData, StatusResponse, SubscribeRequest,
            SubscribeResponse, TimedRequest, WriteRequest, status, status_for,
        },
        message::{Message, MessageHeader, ProtocolHeader, SessionKind},
        opcode::{
            ImOpcode, Opcode, PROTOCOL_INTERACTION_MODEL, SecureChannelOpcode,
        },
        status_report::{SC_CODE_CLOSE_SESSION, StatusReport},
    },
    node::actions::Action,
    session::{AuthMode, FabricTable, ReplayWindow, SessionStore},
    state_machine::{
        CaseResponder, HandshakeOutput, PaseResponder, pase::PaseConfig,
    },
};

pub const DEFAULT_SESSION_CAPACITY: usize = 16;
/// Sessions idle longer than this are swept on the periodic tick.
pub const SESSION_IDLE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// The node's entire protocol state.
pub struct NodeState {
    pub registry: Registry,
    pub fabrics: FabricTable,
    pub sessions: SessionStore,
    pub exchanges: ExchangeManager,
    pub reliable: ReliableChannel,
    pub subscriptions: SubscriptionManager,
    pub events: EventStore,
    pub commissioning: CommissioningState,
    pase: PaseResponder,
    case: CaseResponder,
    /// Session id reserved for the PASE handshake in flight.
    pase_pending_session: Option<u16>,
    unsecured_counter: u32,
    group_replay: HashMap<(u8, u64), ReplayWindow>,
}

impl NodeState {
    pub fn new(registry: Registry, pase_config: PaseConfig) -> Self {
        Self {
            registry,
            fabrics: FabricTable::new(),
            sessions: SessionStore::new(DEFAULT_SESSION_CAPACITY),
            exchanges: ExchangeManager::new(),
            reliable: ReliableChannel::new(),
            subscriptions: SubscriptionManager::new(),
            events: EventStore::default(),
            commissioning: CommissioningState::default(),
            pase: PaseResponder::new(pase_config),
            case: CaseResponder::new(),
            pase_pending_session: None,
            unsecured_counter: 0,
            group_replay: HashMap::new(),
        }
    }

    /// Snapshot the fabric table for whatever persistence the shell has.
    pub fn export_fabrics(&self) -> Vec<crate::session::FabricSnapshot> {
        self.fabrics.export()
    }

    /// Restore fabrics saved by [`NodeState::export_fabrics`].
    pub fn import_fabrics(
        &mut self,
        snapshots: Vec<crate::session::FabricSnapshot>,
    ) -> Result<(), crate::session::fabric::FabricError> {
        self.fabrics.import(snapshots)
    }

    /// Log the boot event into the event store (BasicInformation
    /// StartUp); called once by the shell after construction.
    pub fn record_startup(&mut self, now_us: u64) {
        self.events.append(
            0,
            crate::clusters::basic_information::CLUSTER_ID,
            crate::clusters::basic_information::EVENT_START_UP,
            crate::clusters::framework::EventPriority::Critical,
            now_us,
            crate::tlv::TlvValue::Struct(vec![(
                0,
                crate::tlv::TlvValue::UnsignedInt(1), // software version
            )]),
        );
    }

    /// Route one received frame. `now_ms`/`now_us` come from the shell's
    /// monotonic clock.
    pub fn handle_frame(&mut self, raw: &[u8], now_ms: u64, now_us: u64) -> Vec<Action> {
        let mut actions = Vec::new();
        let (header, header_len) = match MessageHeader::decode(raw) {
            Ok(v) => v,
            Err(e) => {
                actions.push(Action::Error(e));
                return actions;
            },
        };

        match header.session_kind() {
            SessionKind::Unencrypted => {
                self.handle_plaintext(raw, now_ms, &mut actions);
            },
            SessionKind::Unicast => {
                self.handle_secure(raw, header, header_len, now_ms, now_us, &mut actions);
            },
            SessionKind::Group => {
                self.handle_group(raw, header, header_len, now_ms, now_us, &mut actions);
            },
        }
        actions
    }

    // ------------------------------------------------------------------
    // plaintext (session id 0): session establishment
    // ------------------------------------------------------------------

    fn handle_plaintext(&mut self, raw: &[u8], now_ms: u64, actions: &mut Vec<Action>) {
        let msg = match Message::decode_plaintext(raw) {
            Ok(m) => m,
            Err(e) => {
                actions.push(Action::Error(e));
                return;
            },
        };
        let exchange_id = msg.protocol.exchange_id;
        if let Some(ack) = msg.protocol.ack_counter {
            self.reliable.on_ack(0, exchange_id, ack);
        }
        let opcode = match msg.protocol.known_opcode() {
            Ok(op) => op,
            Err(e) => {
                actions.push(Action::Error(e));
                return;
            },
        };
        if msg.protocol.needs_ack {
            self.reliable.note_ack_due(0, exchange_id, msg.header.counter);
        }

        let sc = match opcode {
            Opcode::SecureChannel(sc) => sc,
            Opcode::Im(_) => {
                actions.push(Action::Error(CoreError::UnsupportedProtocol(
                    PROTOCOL_INTERACTION_MODEL,
                )));
                return;
            },
        };

        match sc {
            SecureChannelOpcode::StandaloneAck => {
                // counter already cleared above; nothing to answer
            },
            SecureChannelOpcode::PbkdfParamRequest
            | SecureChannelOpcode::Pake1
            | SecureChannelOpcode::Pake3 => {
                if sc == SecureChannelOpcode::PbkdfParamRequest {
                    self.pase_pending_session = Some(self.sessions.allocate_id());
                }
                let reserved = match self.pase_pending_session {
                    Some(id) => id,
                    None => {
                        actions.push(Action::Error(CoreError::Failure));
                        return;
                    },
                };
                match self.pase.handle(sc, &msg.payload, reserved, now_ms) {
                    Ok(output) => {
                        self.finish_handshake(output, exchange_id, true, actions);
                    },
                    Err(e) => actions.push(Action::Error(e)),
                }
            },
            SecureChannelOpcode::CaseSigma1 => {
                let reserved = self.sessions.allocate_id();
                match self.case.on_sigma1(&self.fabrics, &msg.payload, reserved) {
                    Ok(output) => {
                        self.finish_handshake(output, exchange_id, false, actions);
                    },
                    Err(e) => actions.push(Action::Error(e)),
                }
            },
            SecureChannelOpcode::CaseSigma3 => {
                match self.case.on_sigma3(&msg.payload, now_ms) {
                    Ok(output) => {
                        self.finish_handshake(output, exchange_id, false, actions);
                    },
                    Err(e) => actions.push(Action::Error(e)),
                }
            },
            SecureChannelOpcode::CaseSigma2Resume => {
                // resumption state is never stored; ask for a full handshake
                self.send_unsecured(
                    exchange_id,
                    SecureChannelOpcode::StatusReport,
                    StatusReport::session_establishment_failed().encode(),
                    false,
                    actions,
                );
            },
            SecureChannelOpcode::StatusReport => {
                trace!("plaintext status report ignored");
            },
            _ => actions.push(Action::Error(CoreError::UnknownOpcode(sc as u8))),
        }
    }

    fn finish_handshake(
        &mut self,
        output: HandshakeOutput,
        exchange_id: u16,
        pase: bool,
        actions: &mut Vec<Action>,
    ) {
        match output {
            HandshakeOutput::Reply { opcode, payload } => {
                self.send_unsecured(exchange_id, opcode, payload, true, actions);
            },
            HandshakeOutput::Complete { opcode, payload, session } => {
                let session_id = session.local_session_id;
                self.send_unsecured(exchange_id, opcode, payload, false, actions);
                if let Some(evicted) = self.sessions.insert(*session) {
                    self.drop_session_state(evicted);
                    actions.push(Action::SessionClosed(evicted));
                }
                if pase {
                    self.pase_pending_session = None;
                }
                actions.push(Action::SessionEstablished(session_id));
            },
            HandshakeOutput::Failed { opcode, payload, error } => {
                self.send_unsecured(exchange_id, opcode, payload, false, actions);
                actions.push(Action::Error(error));
            },
        }
    }

    fn next_unsecured_counter(&mut self) -> u32 {
        self.unsecured_counter = self.unsecured_counter.wrapping_add(1);
        self.unsecured_counter
    }

    fn send_unsecured(
        &mut self,
        exchange_id: u16,
        opcode: SecureChannelOpcode,
        payload: Vec<u8>,
        needs_ack: bool,
        actions: &mut Vec<Action>,
    ) {
        let counter = self.next_unsecured_counter();
        let ack_counter = self.reliable.take_ack_due(0, exchange_id);
        let msg = Message {
            header: MessageHeader { counter, ..MessageHeader::default() },
            protocol: ProtocolHeader {
                initiator: false,
                needs_ack,
                ack_counter,
                vendor_id: None,
                opcode: opcode as u8,
                exchange_id,
                protocol_id: crate::models::opcode::PROTOCOL_SECURE_CHANNEL,
            },
            payload,
        };
        let frame = Bytes::from(msg.encode_plaintext());
        if needs_ack {
            self.reliable.record_send(0, exchange_id, frame.clone(), counter, None);
            actions.push(Action::ScheduleMrp {
                session_id: 0,
                exchange_id,
                attempt: 0,
                timeout_ms: retransmit_interval_ms(RETRY_INTERVAL_IDLE_MS, 0),
            });
        }
        actions.push(Action::Send(frame));
    }

    // ------------------------------------------------------------------
    // secure unicast
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn handle_secure(
        &mut self,
        raw: &[u8],
        header: MessageHeader,
        header_len: usize,
        now_ms: u64,
        now_us: u64,
        actions: &mut Vec<Action>,
    ) {
        let session_id = header.session_id;
        let Some(session) = self.sessions.get_mut(session_id) else {
            actions.push(Action::Error(CoreError::UnknownSession(session_id)));
            return;
        };
        let key = *session.decrypt_key();
        let msg = match Message::decode_encrypted(raw, header, header_len, &key) {
            Ok(m) => m,
            Err(e) => {
                actions.push(Action::Error(e));
                return;
            },
        };
        if let Err(e) = session.replay.accept(msg.header.counter) {
            actions.push(Action::Error(e));
            return;
        }
        session.touch(now_ms);

        let subject = Subject {
            node_id: session.peer_node_id,
            fabric_index: session.fabric_index,
            auth_mode: session.auth_mode,
        };
        let challenge = *session.attestation_challenge();

        let exchange_id = msg.protocol.exchange_id;
        if let Some(ack) = msg.protocol.ack_counter {
            self.reliable.on_ack(session_id, exchange_id, ack);
        }
        let opcode = match msg.protocol.known_opcode() {
            Ok(op) => op,
            Err(e) => {
                actions.push(Action::Error(e));
                return;
            },
        };
        if msg.protocol.needs_ack {
            self.reliable.note_ack_due(session_id, exchange_id, msg.header.counter);
        }

        match opcode {
            Opcode::SecureChannel(SecureChannelOpcode::StandaloneAck) => {
                self.exchanges.close(session_id, exchange_id);
            },
            Opcode::SecureChannel(SecureChannelOpcode::StatusReport) => {
                if let Ok(report) = StatusReport::decode(&msg.payload)
                    && report.protocol_code == SC_CODE_CLOSE_SESSION
                {
                    debug!(session_id, "peer closed session");
                    self.close_session(session_id, actions);
                    return;
                }
            },
            Opcode::SecureChannel(other) => {
                actions.push(Action::Error(CoreError::UnknownOpcode(other as u8)));
            },
            Opcode::Im(im) => {
                self.handle_im(
                    session_id,
                    exchange_id,
                    im,
                    &msg.payload,
                    subject,
                    challenge,
                    now_ms,
                    now_us,
                    actions,
                );
            },
        }

        self.flush_standalone_ack(session_id, exchange_id, actions);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_im(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        opcode: ImOpcode,
        payload: &[u8],
        subject: Subject,
        challenge: [u8; 16],
        now_ms: u64,
        now_us: u64,
        actions: &mut Vec<Action>,
    ) {
        self.exchanges
            .open_responder(session_id, exchange_id, PROTOCOL_INTERACTION_MODEL, now_ms);
        let info = RequestInfo {
            subject,
            local_session_id: session_id,
            attestation_challenge: challenge,
            now_ms,
            now_us,
        };

        match opcode {
            ImOpcode::ReadRequest => {
                let req = match ReadRequest::decode(payload) {
                    Ok(r) => r,
                    Err(e) => return actions.push(Action::Error(e)),
                };
                let mut deps = RouterDeps {
                    registry: &mut self.registry,
                    fabrics: &mut self.fabrics,
                    events: &mut self.events,
                    commissioning: &mut self.commissioning,
                };
                let mut report = router::handle_read(&mut deps, &info, &req);
                // single-chunk report: no StatusResponse expected back
                report.suppress_response = true;
                self.send_secure(
                    session_id,
                    exchange_id,
                    Opcode::Im(ImOpcode::ReportData),
                    report.encode(),
                    true,
                    false,
                    None,
                    actions,
                );
                self.exchanges.close(session_id, exchange_id);
            },
            ImOpcode::WriteRequest => {
                let req = match WriteRequest::decode(payload) {
                    Ok(r) => r,
                    Err(e) => return actions.push(Action::Error(e)),
                };
                if let Err(e) = self.exchanges.consume_timed_window(
                    session_id,
                    exchange_id,
                    req.timed_request,
                    now_ms,
                ) {
                    let reply = StatusResponse { status: status_for(&e) };
                    self.send_secure(
                        session_id,
                        exchange_id,
                        Opcode::Im(ImOpcode::StatusResponse),
                        reply.encode(),
                        true,
                        false,
                        None,
                        actions,
                    );
                    return;
                }
                let mut deps = RouterDeps {
                    registry: &mut self.registry,
                    fabrics: &mut self.fabrics,
                    events: &mut self.events,
                    commissioning: &mut self.commissioning,
                };
                let response = router::handle_write(&mut deps, &info, &req);
                if !req.suppress_response {
                    self.send_secure(
                        session_id,
                        exchange_id,
                        Opcode::Im(ImOpcode::WriteResponse),
                        response.encode(),
                        true,
                        false,
                        None,
                        actions,
                    );
                }
                self.exchanges.close(session_id, exchange_id);
            },
            ImOpcode::InvokeRequest => {
                let req = match InvokeRequest::decode(payload) {
                    Ok(r) => r,
                    Err(e) => return actions.push(Action::Error(e)),
                };
                if let Err(e) = self.exchanges.consume_timed_window(
                    session_id,
                    exchange_id,
                    req.timed_request,
                    now_ms,
                ) {
                    let reply = StatusResponse { status: status_for(&e) };
                    self.send_secure(
                        session_id,
                        exchange_id,
                        Opcode::Im(ImOpcode::StatusResponse),
                        reply.encode(),
                        true,
                        false,
                        None,
                        actions,
                    );
                    return;
                }
                let mut deps = RouterDeps {
                    registry: &mut self.registry,
                    fabrics: &mut self.fabrics,
                    events: &mut self.events,
                    commissioning: &mut self.commissioning,
                };
                let (response, effects) = router::handle_invoke(&mut deps, &info, &req);
                if let Some(fabric_index) = effects.session_fabric_binding
                    && let Some(session) = self.sessions.get_mut(session_id)
                {
                    session.fabric_index = Some(fabric_index);
                }
                if !req.suppress_response {
                    self.send_secure(
                        session_id,
                        exchange_id,
                        Opcode::Im(ImOpcode::InvokeResponse),
                        response.encode(),
                        true,
                        false,
                        None,
                        actions,
                    );
                }
                self.exchanges.close(session_id, exchange_id);
                for fabric_index in effects.removed_fabrics {
                    for sid in self.sessions.bound_to_fabric(fabric_index) {
                        self.close_session(sid, actions);
                    }
                }
            },
            ImOpcode::TimedRequest => {
                let req = match TimedRequest::decode(payload) {
                    Ok(r) => r,
                    Err(e) => return actions.push(Action::Error(e)),
                };
                self.exchanges.open_timed_window(
                    session_id,
                    exchange_id,
                    req.timeout_ms as u64,
                    now_ms,
                );
                let reply = StatusResponse { status: status::SUCCESS };
                self.send_secure(
                    session_id,
                    exchange_id,
                    Opcode::Im(ImOpcode::StatusResponse),
                    reply.encode(),
                    true,
                    false,
                    None,
                    actions,
                );
            },
            ImOpcode::SubscribeRequest => {
                let req = match SubscribeRequest::decode(payload) {
                    Ok(r) => r,
                    Err(e) => return actions.push(Action::Error(e)),
                };
                let subscription_id = self.subscriptions.allocate_id(session_id);
                let mut deps = RouterDeps {
                    registry: &mut self.registry,
                    fabrics: &mut self.fabrics,
                    events: &mut self.events,
                    commissioning: &mut self.commissioning,
                };
                let report = router::handle_subscribe_priming(
                    &mut deps,
                    &info,
                    &req,
                    subscription_id,
                );
                self.subscriptions.insert(Subscription {
                    id: subscription_id,
                    session_id,
                    attribute_paths: req.attribute_paths.clone(),
                    event_paths: req.event_paths.clone(),
                    min_interval_s: req.min_interval_s,
                    max_interval_s: req.max_interval_s,
                    fabric_filtered: req.fabric_filtered,
                    phase: SubscriptionPhase::Priming,
                    last_report_at_ms: now_ms,
                    last_sent_at_ms: Some(now_ms),
                    last_reported: report.attribute_reports.clone(),
                });
                debug!(subscription_id, session_id, "subscription primed");
                self.send_secure(
                    session_id,
                    exchange_id,
                    Opcode::Im(ImOpcode::ReportData),
                    report.encode(),
                    true,
                    false,
                    None,
                    actions,
                );
            },
            ImOpcode::StatusResponse => {
                // phase two of subscribe: the peer acked the priming report
                if let Some(subscription_id) = self.subscriptions.activate_priming(session_id) {
                    let max_interval_s = self
                        .subscriptions
                        .get(subscription_id)
                        .map(|s| s.max_interval_s)
                        .unwrap_or(0);
                    let reply = SubscribeResponse { subscription_id, max_interval_s };
                    self.send_secure(
                        session_id,
                        exchange_id,
                        Opcode::Im(ImOpcode::SubscribeResponse),
                        reply.encode(),
                        true,
                        false,
                        None,
                        actions,
                    );
                    self.exchanges.close(session_id, exchange_id);
                } else {
                    // a report ack on some other exchange; nothing to reply
                    self.exchanges.close(session_id, exchange_id);
                }
            },
            ImOpcode::ReportData
            | ImOpcode::WriteResponse
            | ImOpcode::InvokeResponse
            | ImOpcode::SubscribeResponse => {
                // response opcodes we never solicit here; the standalone
                // ack flush answers them
                trace!(?opcode, "unsolicited response opcode ignored");
            },
        }
    }

    // ------------------------------------------------------------------
    // group receive
    // ------------------------------------------------------------------

    fn handle_group(
        &mut self,
        raw: &[u8],
        header: MessageHeader,
        header_len: usize,
        now_ms: u64,
        now_us: u64,
        actions: &mut Vec<Action>,
    ) {
        let Some(source_node) = header.source_node_id else {
            actions.push(Action::Error(CoreError::TruncatedInput));
            return;
        };

        // try every fabric's operational group key
        let mut decrypted = None;
        for fabric in self.fabrics.iter() {
            let key = fabric.ipk();
            if let Ok(msg) =
                Message::decode_encrypted(raw, header.clone(), header_len, &key)
            {
                decrypted = Some((fabric.index, msg));
                break;
            }
        }
        let Some((fabric_index, msg)) = decrypted else {
            actions.push(Action::Error(CoreError::AuthenticationFailed));
            return;
        };

        let window = self
            .group_replay
            .entry((fabric_index, source_node))
            .or_default();
        if let Err(e) = window.accept(msg.header.counter) {
            actions.push(Action::Error(e));
            return;
        }

        let opcode = match msg.protocol.known_opcode() {
            Ok(Opcode::Im(im)) => im,
            Ok(_) => {
                actions.push(Action::Error(CoreError::UnknownOpcode(msg.protocol.opcode)));
                return;
            },
            Err(e) => {
                actions.push(Action::Error(e));
                return;
            },
        };

        let info = RequestInfo {
            subject: Subject {
                node_id: source_node,
                fabric_index: Some(fabric_index),
                auth_mode: AuthMode::Group,
            },
            local_session_id: 0,
            attestation_challenge: [0; 16],
            now_ms,
            now_us,
        };
        let mut deps = RouterDeps {
            registry: &mut self.registry,
            fabrics: &mut self.fabrics,
            events: &mut self.events,
            commissioning: &mut self.commissioning,
        };

        // group traffic never earns a reply, whatever the envelope says
        match opcode {
            ImOpcode::WriteRequest => {
                if let Ok(req) = WriteRequest::decode(&msg.payload) {
                    router::handle_write(&mut deps, &info, &req);
                }
            },
            ImOpcode::InvokeRequest => {
                if let Ok(req) = InvokeRequest::decode(&msg.payload) {
                    router::handle_invoke(&mut deps, &info, &req);
                }
            },
            other => {
                trace!(?other, "group frame with non-mutating opcode dropped");
            },
        }
    }

    // ------------------------------------------------------------------
    // timers
    // ------------------------------------------------------------------

    /// A retransmit timer armed by `ScheduleMrp` fired.
    pub fn handle_mrp_timer(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        attempt: u32,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let base = if session_id == 0 {
            RETRY_INTERVAL_IDLE_MS
        } else {
            RETRY_INTERVAL_ACTIVE_MS
        };
        match self.reliable.on_timer(session_id, exchange_id, attempt, base) {
            RetransmitOutcome::Resend { frame, next_attempt, delay_ms } => {
                actions.push(Action::Send(frame));
                actions.push(Action::ScheduleMrp {
                    session_id,
                    exchange_id,
                    attempt: next_attempt,
                    timeout_ms: delay_ms,
                });
            },
            RetransmitOutcome::GiveUp { subscription_id } => {
                if let Some(id) = subscription_id {
                    warn!(subscription_id = id, "report undeliverable, dropping subscription");
                    self.subscriptions.remove(id);
                }
                self.exchanges.close(session_id, exchange_id);
                actions.push(Action::Error(CoreError::Timeout));
            },
            RetransmitOutcome::Stale => {},
        }
        actions
    }

    /// Once-a-second housekeeping: subscription reports and idle sweep.
    pub fn handle_tick(&mut self, now_ms: u64, now_us: u64) -> Vec<Action> {
        let mut actions = Vec::new();

        for subscription_id in self.subscriptions.due(now_ms) {
            self.tick_subscription(subscription_id, now_ms, now_us, &mut actions);
        }

        for session_id in self
            .sessions
            .idle_since(now_ms.saturating_sub(SESSION_IDLE_TIMEOUT_MS))
        {
            debug!(session_id, "closing idle session");
            self.close_session(session_id, &mut actions);
        }
        actions
    }

    fn tick_subscription(
        &mut self,
        subscription_id: u32,
        now_ms: u64,
        now_us: u64,
        actions: &mut Vec<Action>,
    ) {
        let Some(sub) = self.subscriptions.get(subscription_id) else {
            return;
        };
        let session_id = sub.session_id;
        let read = ReadRequest {
            attribute_paths: sub.attribute_paths.clone(),
            event_paths: Vec::new(),
            event_min: None,
            fabric_filtered: sub.fabric_filtered,
            version_filters: Vec::new(),
        };
        let Some(session) = self.sessions.get(session_id) else {
            self.subscriptions.remove(subscription_id);
            return;
        };
        let info = RequestInfo {
            subject: Subject {
                node_id: session.peer_node_id,
                fabric_index: session.fabric_index,
                auth_mode: session.auth_mode,
            },
            local_session_id: session_id,
            attestation_challenge: *session.attestation_challenge(),
            now_ms,
            now_us,
        };
        let mut deps = RouterDeps {
            registry: &mut self.registry,
            fabrics: &mut self.fabrics,
            events: &mut self.events,
            commissioning: &mut self.commissioning,
        };
        let hypothetical = router::handle_read(&mut deps, &info, &read);

        match self
            .subscriptions
            .evaluate(subscription_id, &hypothetical.attribute_reports, now_ms)
        {
            Some(TickOutcome::Send) => {
                let exchange_id = self.exchanges.allocate_initiator(
                    session_id,
                    PROTOCOL_INTERACTION_MODEL,
                    now_ms,
                );
                let report = ReportData {
                    subscription_id: Some(subscription_id),
                    attribute_reports: hypothetical.attribute_reports,
                    event_reports: hypothetical.event_reports,
                    suppress_response: true,
                };
                self.send_secure(
                    session_id,
                    exchange_id,
                    Opcode::Im(ImOpcode::ReportData),
                    report.encode(),
                    true,
                    true,
                    Some(subscription_id),
                    actions,
                );
            },
            Some(TickOutcome::Unchanged) | Some(TickOutcome::Throttled) | None => {},
        }
    }

    // ------------------------------------------------------------------
    // shared send/cleanup helpers
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn send_secure(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        opcode: Opcode,
        payload: Vec<u8>,
        needs_ack: bool,
        initiator: bool,
        subscription_id: Option<u32>,
        actions: &mut Vec<Action>,
    ) {
        let ack_counter = self.reliable.take_ack_due(session_id, exchange_id);
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        let counter = session.next_counter();
        let key = *session.encrypt_key();
        let msg = Message {
            header: MessageHeader {
                session_id: session.peer_session_id,
                counter,
                ..MessageHeader::default()
            },
            protocol: ProtocolHeader {
                initiator,
                needs_ack,
                ack_counter,
                vendor_id: None,
                opcode: opcode.raw(),
                exchange_id,
                protocol_id: opcode.protocol_id(),
            },
            payload,
        };
        let frame = Bytes::from(msg.encode_encrypted(&key));
        if needs_ack {
            self.reliable
                .record_send(session_id, exchange_id, frame.clone(), counter, subscription_id);
            actions.push(Action::ScheduleMrp {
                session_id,
                exchange_id,
                attempt: 0,
                timeout_ms: retransmit_interval_ms(RETRY_INTERVAL_ACTIVE_MS, 0),
            });
        }
        actions.push(Action::Send(frame));
    }

    /// If the incoming reliable message produced no reply to piggyback
    /// on, answer it with a standalone ack.
    fn flush_standalone_ack(
        &mut self,
        session_id: u16,
        exchange_id: u16,
        actions: &mut Vec<Action>,
    ) {
        let Some(ack_counter) = self.reliable.take_ack_due(session_id, exchange_id) else {
            return;
        };
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        let counter = session.next_counter();
        let key = *session.encrypt_key();
        let msg = Message {
            header: MessageHeader {
                session_id: session.peer_session_id,
                counter,
                ..MessageHeader::default()
            },
            protocol: ProtocolHeader {
                initiator: false,
                needs_ack: false,
                ack_counter: Some(ack_counter),
                vendor_id: None,
                opcode: SecureChannelOpcode::StandaloneAck as u8,
                exchange_id,
                protocol_id: crate::models::opcode::PROTOCOL_SECURE_CHANNEL,
            },
            payload: Vec::new(),
        };
        actions.push(Action::Send(Bytes::from(msg.encode_encrypted(&key))));
    }

    /// Tear down one session and everything hanging off it.
    pub fn close_session(&mut self, session_id: u16, actions: &mut Vec<Action>) {
        if self.sessions.remove(session_id).is_some() {
            self.drop_session_state(session_id);
            actions.push(Action::SessionClosed(session_id));
        }
    }

    fn drop_session_state(&mut self, session_id: u16) {
        self.reliable.drop_session(session_id);
        self.exchanges.drop_session(session_id);
        for subscription_id in self.subscriptions.drop_session(session_id) {
            debug!(subscription_id, session_id, "subscription dropped with session");
        }
    }
}
