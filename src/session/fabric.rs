// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The fabric table: one entry per Matter deployment this node joined.
//!
//! A fabric is identified by its root CA public key and fabric id; the
//! commissioning flow (OperationalCredentials cluster) is the only
//! writer. CASE routes an incoming Σ1 by recomputing each candidate
//! fabric's destination id.

use p256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::kdf;

pub const MAX_FABRICS: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FabricError {
    #[error("fabric table is full")]
    TableFull,
    #[error("no fabric at index {0}")]
    UnknownIndex(u8),
    #[error("malformed key material")]
    BadKeyMaterial,
}

/// One commissioned fabric.
pub struct Fabric {
    pub index: u8,
    pub fabric_id: u64,
    /// Operational node id this node answers to on the fabric.
    pub node_id: u64,
    /// Root CA public key, uncompressed SEC1 (65 bytes).
    pub root_public_key: Vec<u8>,
    pub noc: Vec<u8>,
    pub icac: Option<Vec<u8>>,
    operational_key: SigningKey,
    ipk_epoch_key: Zeroizing<[u8; 16]>,
    pub label: String,
}

impl std::fmt::Debug for Fabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fabric")
            .field("index", &self.index)
            .field("fabric_id", &format_args!("0x{:016x}", self.fabric_id))
            .field("node_id", &format_args!("0x{:016x}", self.node_id))
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Fabric {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u8,
        fabric_id: u64,
        node_id: u64,
        root_public_key: Vec<u8>,
        noc: Vec<u8>,
        icac: Option<Vec<u8>>,
        operational_key: SigningKey,
        ipk_epoch_key: [u8; 16],
    ) -> Self {
        Self {
            index,
            fabric_id,
            node_id,
            root_public_key,
            noc,
            icac,
            operational_key,
            ipk_epoch_key: Zeroizing::new(ipk_epoch_key),
            label: String::new(),
        }
    }

    pub fn operational_key(&self) -> &SigningKey {
        &self.operational_key
    }

    /// `HKDF(salt = root_public_key[1..], ikm = fabric_id BE8,
    /// "CompressedFabric", 8)`.
    pub fn compressed_fabric_id(&self) -> [u8; 8] {
        let salt = self.root_public_key.get(1..).unwrap_or_default();
        let okm = kdf::hkdf_sha256(
            salt,
            &self.fabric_id.to_be_bytes(),
            b"CompressedFabric",
            8,
        );
        let mut out = [0u8; 8];
        out.copy_from_slice(&okm);
        out
    }

    /// Operational identity-protection key for the current epoch:
    /// `HKDF(salt = compressed_fabric_id, ikm = epoch key,
    /// "GroupKey v1.0", 16)`. Doubles as the group receive key.
    pub fn ipk(&self) -> Zeroizing<[u8; 16]> {
        let okm = kdf::hkdf_sha256(
            &self.compressed_fabric_id(),
            self.ipk_epoch_key.as_slice(),
            b"GroupKey v1.0",
            16,
        );
        let mut out = Zeroizing::new([0u8; 16]);
        out.copy_from_slice(&okm);
        out
    }

    /// Replace the IPK epoch key (GroupKeyManagement KeySetWrite).
    pub fn set_ipk_epoch_key(&mut self, key: [u8; 16]) {
        self.ipk_epoch_key = Zeroizing::new(key);
    }

    /// The destination id a CASE initiator would compute for this
    /// fabric: `HMAC(IPK, random ∥ root_pub ∥ fabric_id LE ∥ node_id LE)`.
    pub fn destination_id(&self, initiator_random: &[u8]) -> [u8; 32] {
        kdf::hmac_sha256_multi(
            self.ipk().as_slice(),
            &[
                initiator_random,
                &self.root_public_key,
                &self.fabric_id.to_le_bytes(),
                &self.node_id.to_le_bytes(),
            ],
        )
    }
}

/// Serializable snapshot of one fabric (the persistence seam; key
/// material is hex so the shell can store it wherever it likes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricSnapshot {
    pub index: u8,
    pub fabric_id: u64,
    pub node_id: u64,
    pub root_public_key: String,
    pub noc: String,
    pub icac: Option<String>,
    pub operational_key: String,
    pub ipk_epoch_key: String,
    pub label: String,
}

/// The node's fabric set. Read-mostly; mutated only by commissioning
/// cluster commands.
#[derive(Debug, Default)]
pub struct FabricTable {
    fabrics: Vec<Fabric>,
    next_index: u8,
}

impl FabricTable {
    pub fn new() -> Self {
        Self { fabrics: Vec::new(), next_index: 1 }
    }

    pub fn len(&self) -> usize {
        self.fabrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fabrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fabric> {
        self.fabrics.iter()
    }

    pub fn get(&self, index: u8) -> Option<&Fabric> {
        self.fabrics.iter().find(|f| f.index == index)
    }

    pub fn get_mut(&mut self, index: u8) -> Option<&mut Fabric> {
        self.fabrics.iter_mut().find(|f| f.index == index)
    }

    /// Reserve the next fabric index without inserting yet.
    pub fn peek_next_index(&self) -> u8 {
        self.next_index
    }

    pub fn add(&mut self, fabric: Fabric) -> Result<u8, FabricError> {
        if self.fabrics.len() >= MAX_FABRICS {
            return Err(FabricError::TableFull);
        }
        let index = fabric.index;
        self.next_index = self.next_index.checked_add(1).unwrap_or(1);
        self.fabrics.push(fabric);
        Ok(index)
    }

    pub fn remove(&mut self, index: u8) -> Result<Fabric, FabricError> {
        let pos = self
            .fabrics
            .iter()
            .position(|f| f.index == index)
            .ok_or(FabricError::UnknownIndex(index))?;
        Ok(self.fabrics.remove(pos))
    }

    pub fn export(&self) -> Vec<FabricSnapshot> {
        self.fabrics
            .iter()
            .map(|f| FabricSnapshot {
                index: f.index,
                fabric_id: f.fabric_id,
                node_id: f.node_id,
                root_public_key: hex::encode(&f.root_public_key),
                noc: hex::encode(&f.noc),
                icac: f.icac.as_deref().map(hex::encode),
                operational_key: hex::encode(f.operational_key.to_bytes()),
                ipk_epoch_key: hex::encode(f.ipk_epoch_key.as_slice()),
                label: f.label.clone(),
            })
            .collect()
    }

    pub fn import(&mut self, snapshots: Vec<FabricSnapshot>) -> Result<(), FabricError> {
        for snap in snapshots {
            let key_bytes =
                hex::decode(&snap.operational_key).map_err(|_| FabricError::BadKeyMaterial)?;
            let operational_key = SigningKey::from_slice(&key_bytes)
                .map_err(|_| FabricError::BadKeyMaterial)?;
            let epoch_raw =
                hex::decode(&snap.ipk_epoch_key).map_err(|_| FabricError::BadKeyMaterial)?;
            let epoch: [u8; 16] =
                epoch_raw.try_into().map_err(|_| FabricError::BadKeyMaterial)?;
            let mut fabric = Fabric::new(
                snap.index,
                snap.fabric_id,
                snap.node_id,
                hex::decode(&snap.root_public_key).map_err(|_| FabricError::BadKeyMaterial)?,
                hex::decode(&snap.noc).map_err(|_| FabricError::BadKeyMaterial)?,
                match &snap.icac {
                    Some(h) => {
                        Some(hex::decode(h).map_err(|_| FabricError::BadKeyMaterial)?)
                    },
                    None => None,
                },
                operational_key,
                epoch,
            );
            fabric.label = snap.label;
            self.next_index = self.next_index.max(fabric.index.saturating_add(1));
            self.add(fabric)?;
        }
        Ok(())
    }
}
