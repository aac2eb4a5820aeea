// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Node configuration loaded from YAML.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Commissioning identity and the onboarding secret.
    pub device: DeviceConfig,
    /// PASE PBKDF parameters advertised to commissioners.
    pub pase: PaseSettings,
    /// Transport parameters that never travel over the wire.
    pub network: NetworkConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "VendorId")]
    pub vendor_id: u16,
    #[serde(rename = "ProductId")]
    pub product_id: u16,
    #[serde(rename = "VendorName", default = "default_vendor_name")]
    pub vendor_name: String,
    #[serde(rename = "ProductName", default = "default_product_name")]
    pub product_name: String,
    /// 12-bit value broadcast in commissionable advertisements.
    #[serde(rename = "Discriminator")]
    pub discriminator: u16,
    /// 27-bit onboarding passcode.
    #[serde(rename = "Passcode")]
    pub passcode: u32,
    #[serde(rename = "SerialNumber", default)]
    pub serial_number: String,
}

fn default_vendor_name() -> String {
    "matter-node-rs".to_string()
}

fn default_product_name() -> String {
    "matter-noded".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PaseSettings {
    #[serde(rename = "Iterations", default = "default_iterations")]
    pub iterations: u32,
    /// Hex salt; generated fresh at startup when absent.
    #[serde(rename = "Salt", default)]
    pub salt: String,
}

fn default_iterations() -> u32 {
    1000
}

impl PaseSettings {
    /// Decode the configured salt or mint a random 32-byte one.
    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        if self.salt.is_empty() {
            let mut salt = vec![0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut salt);
            return Ok(salt);
        }
        let salt = hex::decode(&self.salt).context("PASE salt must be hex")?;
        ensure!(
            (16..=32).contains(&salt.len()),
            "PASE salt must be 16..=32 bytes, got {}",
            salt.len()
        );
        Ok(salt)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NetworkConfig {
    #[serde(rename = "UdpPort", default = "default_port")]
    pub udp_port: u16,
    #[serde(rename = "TcpEnabled", default)]
    pub tcp_enabled: bool,
    #[serde(rename = "BindAddress", default = "default_bind")]
    pub bind_address: String,
}

fn default_port() -> u16 {
    5540
}

fn default_bind() -> String {
    "[::]".to_string()
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed to read config file {:?}", path.as_ref())
        })?;
        let cfg: Config =
            serde_yaml::from_str(&content).context("failed to parse node config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.device.discriminator < (1 << 12),
            "discriminator must fit 12 bits"
        );
        ensure!(self.device.passcode < (1 << 27), "passcode must fit 27 bits");
        ensure!(
            self.pase.iterations >= 1000,
            "PBKDF iteration count below the allowed minimum"
        );
        Ok(())
    }
}
