//! Core type definitions with strong typing and validation

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// Macvlan operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacvlanMode {
    /// Endpoints on the same uplink talk to each other directly
    #[default]
    Bridge,
    /// No traffic between endpoints on the same uplink
    Private,
    /// All traffic is sent out through the uplink
    Vepa,
    /// Single endpoint owns the uplink
    Passthru,
}

impl MacvlanMode {
    /// Parse a mode from configuration; an empty string selects the default
    ///
    /// # Errors
    /// Returns error if the mode is not one of bridge, private, vepa, passthru
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "" | "bridge" => Ok(Self::Bridge),
            "private" => Ok(Self::Private),
            "vepa" => Ok(Self::Vepa),
            "passthru" => Ok(Self::Passthru),
            other => Err(Error::InvalidConfig {
                message: format!("unknown macvlan mode: {other:?}"),
            }),
        }
    }

    /// Mode name as written in configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Private => "private",
            Self::Vepa => "vepa",
            Self::Passthru => "passthru",
        }
    }
}

impl fmt::Display for MacvlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacvlanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Create from raw octets
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Create from a netlink attribute payload
    ///
    /// # Errors
    /// Returns error if the slice is not exactly six bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let octets: [u8; 6] = bytes.try_into().map_err(|_| Error::InvalidConfig {
            message: format!("hardware address must be 6 bytes, got {}", bytes.len()),
        })?;
        Ok(Self(octets))
    }

    /// Raw octets
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidConfig {
            message: format!("invalid MAC address {s:?}"),
        };

        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// Identity of the pod asking for a network attachment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadIdentity {
    /// Pod namespace
    pub namespace: String,
    /// Pod name
    pub name: String,
    /// Sandbox (infra) container ID, when the runtime supplies one
    pub infra_container_id: Option<String>,
}

impl WorkloadIdentity {
    /// Create a new identity
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            infra_container_id: None,
        }
    }

    /// Attach the infra container ID
    #[must_use]
    pub fn with_infra_container_id(mut self, id: impl Into<String>) -> Self {
        self.infra_container_id = Some(id.into());
        self
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Answer from the external allocator
///
/// Field names follow the allocator's wire format; the capitalised aliases
/// are what older allocator deployments emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    /// Network the address was taken from
    #[serde(alias = "AppNet")]
    pub app_net: String,

    /// Addresses already leased in that network
    #[serde(default, alias = "UseIpList")]
    pub use_ip_list: Vec<String>,

    /// Address assigned to the workload
    #[serde(alias = "IPAddress")]
    pub ip_address: Ipv4Addr,

    /// Default gateway for the workload
    #[serde(alias = "GateWay")]
    pub gateway: Ipv4Addr,

    /// VLAN carrying the network on the uplink
    #[serde(alias = "VlanId", deserialize_with = "deserialize_vlan_id")]
    pub vlan_id: u16,

    /// Prefix length of the network
    #[serde(default = "default_prefix_length")]
    pub prefix_length: u8,
}

impl AllocationResult {
    /// Name of the VLAN sub-interface carrying this allocation
    #[must_use]
    pub fn vlan_uplink(&self, uplink: &str) -> String {
        format!("{uplink}.{}", self.vlan_id)
    }
}

const fn default_prefix_length() -> u8 {
    24
}

/// The allocator emits VLAN IDs both as JSON strings and as numbers
fn deserialize_vlan_id<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    let id = match Raw::deserialize(deserializer)? {
        Raw::Number(id) => id,
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom)?,
    };

    if !(1..=4094).contains(&id) {
        return Err(serde::de::Error::custom(format!(
            "VLAN ID {id} out of range 1-4094"
        )));
    }

    Ok(id)
}

/// Kernel-confirmed identity of a provisioned interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// Interface name inside the namespace
    pub name: String,
    /// Hardware address as re-read from the kernel
    pub mac: MacAddr,
    /// Path of the namespace the interface lives in
    pub sandbox: PathBuf,
}
