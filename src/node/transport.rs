// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The async shell around the orchestrator.
//!
//! One task owns the select loop: datagrams in, action batches out.
//! Retransmit timers are spawned tasks that sleep and feed the resulting
//! actions back through the batch channel, so the state machine itself
//! never waits on anything. TCP peers get the 4-byte length framing and
//! no MRP timers (the stream is already reliable).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::{Mutex, mpsc},
    time::{Instant, interval, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::NetworkConfig,
    node::{actions::Action, orchestrator::NodeState},
};

const MAX_DATAGRAM: usize = 1280;

struct Batch {
    actions: Vec<Action>,
    origin: Option<SocketAddr>,
}

/// Shared shell state.
pub struct Shell {
    state: Mutex<NodeState>,
    socket: UdpSocket,
    /// Last known transport address per local session id.
    session_addrs: DashMap<u16, SocketAddr>,
    batches: mpsc::Sender<Batch>,
    started: Instant,
    cancel: CancellationToken,
}

impl Shell {
    /// Bind the operational UDP socket and run the node until cancelled.
    pub async fn run(
        state: NodeState,
        network: &NetworkConfig,
        cancel: CancellationToken,
    ) -> Result<()> {
        let bind = format!("{}:{}", network.bind_address, network.udp_port);
        let socket = UdpSocket::bind(&bind)
            .await
            .with_context(|| format!("failed to bind UDP {bind}"))?;
        info!(addr = %bind, "matter node listening");

        let (batches_tx, mut batches_rx) = mpsc::channel::<Batch>(64);
        let shell = Arc::new(Shell {
            state: Mutex::new(state),
            socket,
            session_addrs: DashMap::new(),
            batches: batches_tx,
            started: Instant::now(),
            cancel: cancel.clone(),
        });

        if network.tcp_enabled {
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind TCP {bind}"))?;
            tokio::spawn(Arc::clone(&shell).accept_tcp(listener));
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    break;
                },
                received = shell.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            let (now_ms, now_us) = shell.now();
                            let actions = {
                                let mut state = shell.state.lock().await;
                                state.handle_frame(&buf[..len], now_ms, now_us)
                            };
                            shell.perform(actions, Some(peer)).await;
                        },
                        Err(e) => warn!("udp receive failed: {e}"),
                    }
                },
                Some(batch) = batches_rx.recv() => {
                    shell.perform(batch.actions, batch.origin).await;
                },
                _ = ticker.tick() => {
                    let (now_ms, now_us) = shell.now();
                    let actions = {
                        let mut state = shell.state.lock().await;
                        state.handle_tick(now_ms, now_us)
                    };
                    shell.perform(actions, None).await;
                },
            }
        }
        Ok(())
    }

    fn now(&self) -> (u64, u64) {
        let elapsed = self.started.elapsed();
        (elapsed.as_millis() as u64, elapsed.as_micros() as u64)
    }

    /// Carry out one action batch. `origin` is the peer the triggering
    /// frame came from; timer-driven batches route by session address.
    async fn perform(self: &Arc<Self>, actions: Vec<Action>, origin: Option<SocketAddr>) {
        let mut route_session: Option<u16> = None;
        for action in actions {
            match action {
                Action::ScheduleMrp { session_id, exchange_id, attempt, timeout_ms } => {
                    route_session = Some(session_id);
                    if let Some(addr) = origin {
                        self.session_addrs.insert(session_id, addr);
                    }
                    self.arm_mrp_timer(session_id, exchange_id, attempt, timeout_ms);
                },
                Action::Send(frame) => {
                    let target = origin.or_else(|| {
                        route_session
                            .and_then(|sid| self.session_addrs.get(&sid).map(|a| *a))
                    });
                    match target {
                        Some(addr) => {
                            if let Err(e) = self.socket.send_to(&frame, addr).await {
                                warn!("udp send to {addr} failed: {e}");
                            }
                        },
                        None => debug!("dropping frame with no routable peer"),
                    }
                },
                Action::SessionEstablished(session_id) => {
                    if let Some(addr) = origin {
                        self.session_addrs.insert(session_id, addr);
                    }
                    info!(session_id, "session established");
                },
                Action::SessionClosed(session_id) => {
                    self.session_addrs.remove(&session_id);
                    info!(session_id, "session closed");
                },
                Action::Error(e) => {
                    debug!(error = %e, "frame dropped");
                },
            }
        }
    }

    fn arm_mrp_timer(
        self: &Arc<Self>,
        session_id: u16,
        exchange_id: u16,
        attempt: u32,
        timeout_ms: u64,
    ) {
        let shell = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = shell.cancel.cancelled() => {},
                _ = sleep(Duration::from_millis(timeout_ms)) => {
                    let actions = {
                        let mut state = shell.state.lock().await;
                        state.handle_mrp_timer(session_id, exchange_id, attempt)
                    };
                    if actions.is_empty() {
                        return;
                    }
                    let origin = shell.session_addrs.get(&session_id).map(|a| *a);
                    if shell
                        .batches
                        .send(Batch { actions, origin })
                        .await
                        .is_err()
                    {
                        debug!("shell stopped before retransmit could be delivered");
                    }
                },
            }
        });
    }

    async fn accept_tcp(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "tcp peer connected");
                            tokio::spawn(Arc::clone(&self).serve_tcp(stream, peer));
                        },
                        Err(e) => warn!("tcp accept failed: {e}"),
                    }
                },
            }
        }
    }

    /// Length-framed stream service: 4-byte big-endian size per frame.
    async fn serve_tcp(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) {
        loop {
            let len = match stream.read_u32().await {
                Ok(len) => len as usize,
                Err(_) => break,
            };
            if len > 64 * 1024 {
                warn!(%peer, "oversized tcp frame, closing");
                break;
            }
            let mut frame = vec![0u8; len];
            if stream.read_exact(&mut frame).await.is_err() {
                break;
            }
            let (now_ms, now_us) = self.now();
            let actions = {
                let mut state = self.state.lock().await;
                state.handle_frame(&frame, now_ms, now_us)
            };
            for action in actions {
                match action {
                    Action::Send(reply) => {
                        if stream.write_u32(reply.len() as u32).await.is_err()
                            || stream.write_all(&reply).await.is_err()
                        {
                            return;
                        }
                    },
                    // the stream is reliable; MRP timers stay unarmed
                    Action::ScheduleMrp { .. } => {},
                    Action::SessionEstablished(session_id) => {
                        info!(session_id, %peer, "session established over tcp");
                    },
                    Action::SessionClosed(session_id) => {
                        self.session_addrs.remove(&session_id);
                    },
                    Action::Error(e) => debug!(error = %e, "tcp frame dropped"),
                }
            }
        }
        debug!(%peer, "tcp peer disconnected");
    }
}
