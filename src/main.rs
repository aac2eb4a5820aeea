// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use matter_node_rs::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    node::{build_node, mdns, transport::Shell},
    pairing::OnboardingPayload,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = init_logger("config/logger.yaml")?;

    let cfg = resolve_config_path("config/node.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load node config")?;

    let payload = OnboardingPayload::new(
        cfg.device.vendor_id,
        cfg.device.product_id,
        cfg.device.discriminator,
        cfg.device.passcode,
        0,
        2,
    );
    info!(qr = %payload.qr_code(), manual = %payload.manual_code(), "onboarding codes");

    let advertisement = mdns::commissionable(
        cfg.device.discriminator,
        cfg.device.vendor_id,
        cfg.device.product_id,
        0x0100,
    );
    info!(
        service = advertisement.service,
        instance = %advertisement.instance,
        "advertise this via the platform DNS-SD responder"
    );

    let mut state = build_node(&cfg)?;
    state.record_startup(0);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    Shell::run(state, &cfg.network, cancel).await
}
