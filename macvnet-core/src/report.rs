//! CNI result, error and version documents

use serde::Serialize;
use std::io::Write;
use std::net::Ipv4Addr;

use crate::{AllocationResult, Error, InterfaceDescriptor, Result};

/// CNI spec versions this plugin can report results in
pub const SUPPORTED_VERSIONS: &[&str] = &["0.3.0", "0.3.1", "0.4.0", "1.0.0", "1.1.0"];

/// Successful ADD result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CniResult {
    /// Version of the result format
    pub cni_version: String,
    /// Interfaces created
    pub interfaces: Vec<Interface>,
    /// Addresses assigned
    pub ips: Vec<IpConfig>,
    /// Routes installed
    pub routes: Vec<Route>,
    /// DNS settings (none are managed)
    pub dns: Dns,
}

/// Interface entry in a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    /// Interface name
    pub name: String,
    /// Hardware address
    pub mac: String,
    /// Namespace path
    pub sandbox: String,
}

/// Address entry in a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpConfig {
    /// Address family, only emitted for pre-1.0 results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Address in CIDR notation
    pub address: String,
    /// Gateway
    pub gateway: Ipv4Addr,
    /// Index into `interfaces`
    pub interface: usize,
}

/// Route entry in a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Destination in CIDR notation
    pub dst: String,
    /// Next hop
    pub gw: Ipv4Addr,
}

/// Empty DNS block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dns {}

impl CniResult {
    /// Build the result for one attachment
    ///
    /// Addresses come from the allocator's answer only.
    #[must_use]
    pub fn new(
        cni_version: &str,
        interface: &InterfaceDescriptor,
        allocation: &AllocationResult,
    ) -> Self {
        let version = is_legacy(cni_version).then(|| "4".to_string());

        Self {
            cni_version: cni_version.to_string(),
            interfaces: vec![Interface {
                name: interface.name.clone(),
                mac: interface.mac.to_string(),
                sandbox: interface.sandbox.display().to_string(),
            }],
            ips: vec![IpConfig {
                version,
                address: format!("{}/{}", allocation.ip_address, allocation.prefix_length),
                gateway: allocation.gateway,
                interface: 0,
            }],
            routes: vec![Route {
                dst: "0.0.0.0/0".to_string(),
                gw: allocation.gateway,
            }],
            dns: Dns::default(),
        }
    }

    /// Write the result as JSON
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        write_json(writer, self)
    }
}

/// Failure document written on non-zero exit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CniError {
    /// Version of the error format
    pub cni_version: String,
    /// Error code
    pub code: u32,
    /// Short message
    pub msg: String,
    /// Longer details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CniError {
    /// Build the document for an error
    #[must_use]
    pub fn new(cni_version: &str, error: &Error) -> Self {
        Self {
            cni_version: cni_version.to_string(),
            code: error.cni_code(),
            msg: error.to_string(),
            details: None,
        }
    }

    /// Attach details
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Write the document as JSON
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        write_json(writer, self)
    }
}

/// Answer to the VERSION command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Version of the document
    pub cni_version: String,
    /// Versions this plugin supports
    pub supported_versions: Vec<String>,
}

impl VersionInfo {
    /// Versions supported by this build
    #[must_use]
    pub fn current() -> Self {
        Self {
            cni_version: "1.1.0".to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Write the document as JSON
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        write_json(writer, self)
    }
}

/// Check that a configuration's version can be answered
///
/// # Errors
/// Returns error for versions outside [`SUPPORTED_VERSIONS`]
pub fn ensure_supported(cni_version: &str) -> Result<()> {
    if SUPPORTED_VERSIONS.contains(&cni_version) {
        Ok(())
    } else {
        Err(Error::InvalidConfig {
            message: format!("unsupported cniVersion {cni_version:?}"),
        })
    }
}

fn is_legacy(cni_version: &str) -> bool {
    cni_version.starts_with("0.")
}

fn write_json<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value).map_err(std::io::Error::from)?;
    writeln!(writer)?;
    Ok(())
}
