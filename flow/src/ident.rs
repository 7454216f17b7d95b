// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Switch, port, host and tenant identities.

use std::fmt::Display;
use std::str::FromStr;

/// Errors which can occur when parsing one of the identities in this module.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    #[error("Invalid node identifier '{0}': expected openflow:<dpid>")]
    InvalidNode(String),
    #[error("Invalid switch port '{0}': expected openflow:<dpid>:<port>")]
    InvalidPort(String),
    #[error("Invalid MAC address '{0}'")]
    InvalidMac(String),
    #[error("Invalid VLAN id {0}: must be at most 4094")]
    InvalidVlan(u16),
    #[error("Invalid tenant name '{0}'")]
    InvalidTenant(String),
}

/// A switch, identified by its OpenFlow datapath id.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(any(feature = "bolero", test), derive(bolero::TypeGenerator))]
pub struct NodeId(pub u64);

impl NodeId {
    const PREFIX: &'static str = "openflow:";

    #[must_use]
    pub fn dpid(self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for NodeId {
    type Err = IdentError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .strip_prefix(Self::PREFIX)
            .and_then(|dpid| dpid.parse::<u64>().ok())
            .map(NodeId)
            .ok_or_else(|| IdentError::InvalidNode(input.to_string()))
    }
}

/// A physical port number on a switch.
pub type PortNumber = u32;

/// A port on a given switch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchPort {
    pub node: NodeId,
    pub port: PortNumber,
}

impl SwitchPort {
    #[must_use]
    pub fn new(node: NodeId, port: PortNumber) -> Self {
        Self { node, port }
    }
}

impl Display for SwitchPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

impl FromStr for SwitchPort {
    type Err = IdentError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let bad = || IdentError::InvalidPort(input.to_string());
        let (node, port) = input.rsplit_once(':').ok_or_else(bad)?;
        let node = NodeId::from_str(node).map_err(|_| bad())?;
        let port = port.parse::<PortNumber>().map_err(|_| bad())?;
        Ok(SwitchPort { node, port })
    }
}

/// A MAC address.
#[must_use]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Returns true iff the least significant bit of the first octet is one.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &MacAddr::ZERO
    }

    /// A legal source address is neither zero nor multicast.
    #[must_use]
    pub fn is_valid_src(&self) -> bool {
        !self.is_zero() && !self.is_multicast()
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(value: [u8; 6]) -> Self {
        MacAddr(value)
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = IdentError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = input.split(':');
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| IdentError::InvalidMac(input.to_string()))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| IdentError::InvalidMac(input.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(IdentError::InvalidMac(input.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

/// A VLAN id as matched on a switch; zero means untagged.
pub type VlanId = u16;

/// The largest VLAN id accepted in a match or a rewrite.
pub const MAX_VLAN_ID: VlanId = 4094;

/// A layer-2 host: a MAC address seen on a VLAN.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct L2Host {
    pub mac: MacAddr,
    pub vlan: VlanId,
}

impl L2Host {
    /// Create a new [`L2Host`].
    ///
    /// # Errors
    ///
    /// Returns an error if `vlan` is out of range.
    pub fn new(mac: MacAddr, vlan: VlanId) -> Result<Self, IdentError> {
        if vlan > MAX_VLAN_ID {
            return Err(IdentError::InvalidVlan(vlan));
        }
        Ok(Self { mac, vlan })
    }
}

impl Display for L2Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.mac, self.vlan)
    }
}

/// Name of a virtual tenant network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantName(String);

impl TenantName {
    const MAX_LEN: usize = 31;

    /// Create a new [`TenantName`].
    ///
    /// A tenant name is 1 to 31 characters long, starts with an alphanumeric character and
    /// contains only alphanumerics and underscores.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` does not follow the rules above.
    pub fn new(name: &str) -> Result<Self, IdentError> {
        let mut chars = name.chars();
        let valid = name.len() <= Self::MAX_LEN
            && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(IdentError::InvalidTenant(name.to_string()));
        }
        Ok(Self(name.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantName {
    type Err = IdentError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        TenantName::new(input)
    }
}

impl Display for TenantName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
