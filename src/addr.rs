// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh node addressing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a mesh hardware address in bytes.
pub const ADDR_LEN: usize = 6;

/// Fixed 6-byte hardware identifier of a mesh node.
///
/// Compared only by exact byte equality and used as an opaque map key; the
/// gateway never interprets the bytes. Displays in the conventional
/// colon-separated form (`AA:BB:CC:DD:EE:01`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress([u8; ADDR_LEN]);

/// Address parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("expected {ADDR_LEN} colon-separated octets, got {0}")]
    WrongLength(usize),

    #[error("invalid hex octet: {0}")]
    InvalidOctet(String),
}

impl NodeAddress {
    /// Create an address from raw octets.
    pub const fn new(octets: [u8; ADDR_LEN]) -> Self {
        Self(octets)
    }

    /// Create an address from a byte slice. Returns `None` unless the slice
    /// is exactly [`ADDR_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; ADDR_LEN] = bytes.try_into().ok()?;
        Some(Self(octets))
    }

    /// The raw octets.
    pub const fn octets(&self) -> [u8; ADDR_LEN] {
        self.0
    }

    /// The address as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for NodeAddress {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != ADDR_LEN {
            return Err(AddrParseError::WrongLength(parts.len()));
        }

        let mut octets = [0u8; ADDR_LEN];
        for (i, part) in parts.iter().enumerate() {
            octets[i] = u8::from_str_radix(part, 16)
                .map_err(|_| AddrParseError::InvalidOctet((*part).to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
