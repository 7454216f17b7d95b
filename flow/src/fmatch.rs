// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow match conditions.

use std::fmt::{Display, Write};
use std::net::Ipv4Addr;

use crate::ident::{IdentError, L2Host, MAX_VLAN_ID, MacAddr, PortNumber, VlanId};

/// Ethernet type of IPv4, required by any IPv4 or L4 field in a match.
pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// The condition a switch rule matches packets against.
///
/// A field set to `None` is a wildcard.  `vlan == Some(0)` matches untagged frames only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub in_port: Option<PortNumber>,
    pub vlan: Option<VlanId>,
    pub dl_src: Option<MacAddr>,
    pub dl_dst: Option<MacAddr>,
    pub ether_type: Option<u16>,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub ip_proto: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

impl FlowMatch {
    /// The catch-all match.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_in_port(mut self, port: PortNumber) -> Self {
        self.in_port = Some(port);
        self
    }

    #[must_use]
    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = Some(vlan);
        self
    }

    #[must_use]
    pub fn with_dl_src(mut self, mac: MacAddr) -> Self {
        self.dl_src = Some(mac);
        self
    }

    #[must_use]
    pub fn with_dl_dst(mut self, mac: MacAddr) -> Self {
        self.dl_dst = Some(mac);
        self
    }

    #[must_use]
    pub fn with_ipv4(mut self, src: Option<Ipv4Addr>, dst: Option<Ipv4Addr>) -> Self {
        self.ether_type = Some(ETH_TYPE_IPV4);
        self.ipv4_src = src;
        self.ipv4_dst = dst;
        self
    }

    #[must_use]
    pub fn with_l4(mut self, proto: u8, src: Option<u16>, dst: Option<u16>) -> Self {
        self.ether_type = Some(ETH_TYPE_IPV4);
        self.ip_proto = Some(proto);
        self.tp_src = src;
        self.tp_dst = dst;
        self
    }

    /// Tell if every field is a wildcard.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Check the match for inconsistent fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the VLAN id is out of range, or if IPv4 or L4 fields are specified
    /// without the IPv4 ether type.
    pub fn validate(&self) -> Result<(), MatchError> {
        if let Some(vlan) = self.vlan
            && vlan > MAX_VLAN_ID
        {
            return Err(MatchError::Ident(IdentError::InvalidVlan(vlan)));
        }
        let needs_ipv4 = self.ipv4_src.is_some()
            || self.ipv4_dst.is_some()
            || self.ip_proto.is_some()
            || self.tp_src.is_some()
            || self.tp_dst.is_some();
        if needs_ipv4 && self.ether_type != Some(ETH_TYPE_IPV4) {
            return Err(MatchError::MissingPrerequisite("IPv4 ether type"));
        }
        if (self.tp_src.is_some() || self.tp_dst.is_some()) && self.ip_proto.is_none() {
            return Err(MatchError::MissingPrerequisite("IP protocol"));
        }
        Ok(())
    }

    /// The source host of packets matched by this condition, if one can be determined.
    ///
    /// A host is only determined when the source MAC is a legal unicast address; an absent VLAN
    /// field is taken as untagged.
    #[must_use]
    pub fn source_host(&self) -> Option<L2Host> {
        let mac = self.dl_src.filter(MacAddr::is_valid_src)?;
        L2Host::new(mac, self.vlan.unwrap_or(0)).ok()
    }

    /// The key used to index data flows by match condition.
    ///
    /// It renders every field except the ingress port, so that flows entering the network through
    /// different ports under the same condition share one key.
    #[must_use]
    pub fn condition_key(&self) -> String {
        let mut key = String::new();
        self.write_fields(&mut key, false);
        if key.is_empty() {
            key.push('*');
        }
        key
    }

    fn write_fields(&self, out: &mut String, with_port: bool) {
        let mut field = |name: &str, value: &dyn Display| {
            if !out.is_empty() {
                out.push(',');
            }
            // writing to a String cannot fail
            let _ = write!(out, "{name}={value}");
        };
        if with_port && let Some(port) = self.in_port {
            field("in_port", &port);
        }
        if let Some(vlan) = self.vlan {
            field("vlan", &vlan);
        }
        if let Some(mac) = self.dl_src {
            field("dl_src", &mac);
        }
        if let Some(mac) = self.dl_dst {
            field("dl_dst", &mac);
        }
        if let Some(ether_type) = self.ether_type {
            field("dl_type", &format_args!("{ether_type:#06x}"));
        }
        if let Some(ip) = self.ipv4_src {
            field("nw_src", &ip);
        }
        if let Some(ip) = self.ipv4_dst {
            field("nw_dst", &ip);
        }
        if let Some(proto) = self.ip_proto {
            field("nw_proto", &proto);
        }
        if let Some(port) = self.tp_src {
            field("tp_src", &port);
        }
        if let Some(port) = self.tp_dst {
            field("tp_dst", &port);
        }
    }
}

impl Display for FlowMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut text = String::new();
        self.write_fields(&mut text, true);
        if text.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{text}")
        }
    }
}

/// Errors found when validating a [`FlowMatch`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Ident(#[from] IdentError),
    #[error("Match field requires {0}")]
    MissingPrerequisite(&'static str),
}
