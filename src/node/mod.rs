// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Node assembly and the outer shell.

pub mod actions;
pub mod mdns;
pub mod orchestrator;
pub mod transport;

pub use actions::Action;
pub use orchestrator::NodeState;

use anyhow::Result;

use crate::{
    cfg::config::Config,
    clusters::{
        NoCommands, Registry, access_control, administrator_commissioning,
        basic_information, descriptor, general_commissioning, group_key_management,
        identify, level_control, network_commissioning, on_off,
        operational_credentials,
    },
    state_machine::pase::PaseConfig,
};

/// Endpoint hosting the application cluster(s).
pub const APPLICATION_ENDPOINT: u16 = 1;

/// Assemble the standard endpoint layout: infrastructure on endpoint 0,
/// an OnOff light on endpoint 1.
pub fn build_registry(cfg: &Config) -> Registry {
    let mut registry = Registry::new();

    let root_servers = [
        descriptor::CLUSTER_ID,
        basic_information::CLUSTER_ID,
        general_commissioning::CLUSTER_ID,
        operational_credentials::CLUSTER_ID,
        access_control::CLUSTER_ID,
        network_commissioning::CLUSTER_ID,
        group_key_management::CLUSTER_ID,
        administrator_commissioning::CLUSTER_ID,
    ];
    registry.add_cluster(
        0,
        descriptor::definition(
            descriptor::DEVICE_TYPE_ROOT_NODE,
            &root_servers,
            &[APPLICATION_ENDPOINT],
        ),
        NoCommands.into(),
    );
    registry.add_cluster(
        0,
        basic_information::definition(&basic_information::DeviceIdentity {
            vendor_name: cfg.device.vendor_name.clone(),
            vendor_id: cfg.device.vendor_id,
            product_name: cfg.device.product_name.clone(),
            product_id: cfg.device.product_id,
            serial_number: cfg.device.serial_number.clone(),
            unique_id: format!("{:08X}", cfg.device.discriminator),
        }),
        NoCommands.into(),
    );
    registry.add_cluster(
        0,
        general_commissioning::definition(),
        general_commissioning::Handler.into(),
    );
    registry.add_cluster(
        0,
        operational_credentials::definition(),
        operational_credentials::Handler::default().into(),
    );
    registry.add_cluster(0, access_control::definition(), NoCommands.into());
    registry.add_cluster(0, network_commissioning::definition(), NoCommands.into());
    registry.add_cluster(
        0,
        group_key_management::definition(),
        group_key_management::Handler.into(),
    );
    registry.add_cluster(
        0,
        administrator_commissioning::definition(),
        administrator_commissioning::Handler.into(),
    );

    let app_servers = [
        descriptor::CLUSTER_ID,
        identify::CLUSTER_ID,
        on_off::CLUSTER_ID,
        level_control::CLUSTER_ID,
    ];
    registry.add_cluster(
        APPLICATION_ENDPOINT,
        descriptor::definition(descriptor::DEVICE_TYPE_ON_OFF_LIGHT, &app_servers, &[]),
        NoCommands.into(),
    );
    registry.add_cluster(
        APPLICATION_ENDPOINT,
        identify::definition(),
        identify::Handler.into(),
    );
    registry.add_cluster(
        APPLICATION_ENDPOINT,
        on_off::definition(),
        on_off::Handler.into(),
    );
    registry.add_cluster(
        APPLICATION_ENDPOINT,
        level_control::definition(),
        level_control::Handler.into(),
    );

    registry
}

/// Build the complete protocol state for one node from its config.
pub fn build_node(cfg: &Config) -> Result<NodeState> {
    let registry = build_registry(cfg);
    let pase = PaseConfig {
        passcode: cfg.device.passcode,
        salt: cfg.pase.salt_bytes()?,
        iterations: cfg.pase.iterations,
    };
    Ok(NodeState::new(registry, pase))
}
