//! Network configuration read from the plugin's stdin

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Error, MacAddr, MacvlanMode, Result, WorkloadIdentity};

/// CNI version assumed when the configuration omits one
pub const DEFAULT_CNI_VERSION: &str = "0.3.1";

/// Annotation listing the networks a pod may be attached to
pub const DEFAULT_NETWORKS_ANNOTATION: &str = "app_net";

/// Network configuration as passed by the container runtime
///
/// ```json
/// {
///   "cniVersion": "0.4.0",
///   "name": "vlan-net",
///   "type": "macvnet",
///   "master": "",
///   "mode": "bridge",
///   "mtu": 0,
///   "allocator": {
///     "metadataUrl": "https://10.96.0.1",
///     "allocatorUrl": "http://127.0.0.1:7080"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetConf {
    /// CNI spec version of this configuration
    #[serde(default = "default_cni_version")]
    pub cni_version: String,

    /// Network name
    #[serde(default)]
    pub name: String,

    /// Plugin type
    #[serde(rename = "type", default)]
    pub plugin_type: String,

    /// Uplink interface; empty means "use the default-route interface"
    #[serde(default)]
    pub master: String,

    /// Macvlan mode; empty means bridge
    #[serde(default)]
    pub mode: String,

    /// Interface MTU; 0 inherits the uplink's
    #[serde(default)]
    pub mtu: i64,

    /// Hardware address override; empty lets the kernel pick
    #[serde(default)]
    pub mac: String,

    /// Pod metadata and allocator endpoints
    #[serde(default)]
    pub allocator: Option<AllocatorConfig>,

    /// Result of the previous plugin in the chain (CHECK/DEL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_result: Option<serde_json::Value>,
}

fn default_cni_version() -> String {
    DEFAULT_CNI_VERSION.to_string()
}

impl NetConf {
    /// Parse the configuration payload
    ///
    /// # Errors
    /// Returns error if the payload is not valid configuration JSON
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidConfig {
            message: format!("failed to load netconf: {e}"),
        })
    }

    /// Configured uplink, if any
    #[must_use]
    pub fn master(&self) -> Option<&str> {
        let master = self.master.trim();
        (!master.is_empty()).then_some(master)
    }

    /// Configured macvlan mode
    ///
    /// # Errors
    /// Returns error for modes outside bridge, private, vepa, passthru
    pub fn macvlan_mode(&self) -> Result<MacvlanMode> {
        MacvlanMode::parse(self.mode.trim())
    }

    /// Configured hardware address override
    ///
    /// # Errors
    /// Returns error if the address does not parse
    pub fn hardware_addr(&self) -> Result<Option<MacAddr>> {
        let mac = self.mac.trim();
        if mac.is_empty() {
            return Ok(None);
        }
        mac.parse().map(Some).map_err(|_| Error::InvalidConfig {
            message: format!("invalid args {mac} for MAC addr"),
        })
    }

    /// Check the configured MTU against an uplink's MTU
    ///
    /// # Errors
    /// Returns error unless `0 <= mtu <= uplink_mtu`
    pub fn validate_mtu(&self, uplink: &str, uplink_mtu: u32) -> Result<u32> {
        match u32::try_from(self.mtu) {
            Ok(mtu) if mtu <= uplink_mtu => Ok(mtu),
            _ => Err(Error::InvalidConfig {
                message: format!(
                    "invalid MTU {}, must be [0, master {uplink} MTU({uplink_mtu})]",
                    self.mtu
                ),
            }),
        }
    }

    /// Allocator endpoints
    ///
    /// # Errors
    /// Returns error if the configuration has no `allocator` section
    pub fn require_allocator(&self) -> Result<&AllocatorConfig> {
        self.allocator.as_ref().ok_or_else(|| Error::InvalidConfig {
            message: "the allocator section is required".to_string(),
        })
    }

    /// Hardware address recorded for `ifname` in `prevResult`
    #[must_use]
    pub fn prev_result_mac(&self, ifname: &str) -> Option<MacAddr> {
        self.prev_result
            .as_ref()?
            .get("interfaces")?
            .as_array()?
            .iter()
            .find(|iface| iface.get("name").and_then(|n| n.as_str()) == Some(ifname))?
            .get("mac")?
            .as_str()?
            .parse()
            .ok()
    }
}

/// Where the pod metadata service and the allocator live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatorConfig {
    /// Base URL of the pod metadata API
    pub metadata_url: String,

    /// Base URL of the IP/VLAN allocator
    pub allocator_url: String,

    /// Bearer token file for the metadata API
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Pod annotation holding the candidate networks
    #[serde(default = "default_networks_annotation")]
    pub networks_annotation: String,
}

fn default_networks_annotation() -> String {
    DEFAULT_NETWORKS_ANNOTATION.to_string()
}

/// Everything the link provisioner needs for one attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentConfig {
    /// Uplink the macvlan is parented to
    pub uplink: String,
    /// Macvlan mode
    pub mode: MacvlanMode,
    /// MTU; 0 inherits the uplink's
    pub mtu: u32,
    /// Hardware address override
    pub mac: Option<MacAddr>,
    /// Pod the attachment is for
    pub workload: WorkloadIdentity,
}

impl AttachmentConfig {
    /// Create a new attachment configuration with default mode and MTU
    #[must_use]
    pub fn new(uplink: impl Into<String>, workload: WorkloadIdentity) -> Self {
        Self {
            uplink: uplink.into(),
            mode: MacvlanMode::default(),
            mtu: 0,
            mac: None,
            workload,
        }
    }

    /// Set the macvlan mode
    #[must_use]
    pub fn with_mode(mut self, mode: MacvlanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the MTU
    #[must_use]
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the hardware address override
    #[must_use]
    pub fn with_mac(mut self, mac: Option<MacAddr>) -> Self {
        self.mac = mac;
        self
    }

    /// Replace the uplink (e.g. with its VLAN sub-interface)
    #[must_use]
    pub fn with_uplink(mut self, uplink: impl Into<String>) -> Self {
        self.uplink = uplink.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let conf = NetConf::from_slice(br#"{"name":"net","type":"macvnet"}"#).unwrap();
        assert_eq!(conf.cni_version, DEFAULT_CNI_VERSION);
        assert!(conf.master().is_none());
        assert_eq!(conf.macvlan_mode().unwrap(), MacvlanMode::Bridge);
        assert!(conf.hardware_addr().unwrap().is_none());
        assert!(conf.require_allocator().is_err());
    }

    #[test]
    fn test_full_config() {
        let conf = NetConf::from_slice(
            br#"{
                "cniVersion": "0.4.0",
                "name": "vlan-net",
                "type": "macvnet",
                "master": "bond0",
                "mode": "private",
                "mtu": 1400,
                "mac": "02:00:00:00:00:01",
                "allocator": {
                    "metadataUrl": "https://10.96.0.1",
                    "allocatorUrl": "http://127.0.0.1:7080"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(conf.master(), Some("bond0"));
        assert_eq!(conf.macvlan_mode().unwrap(), MacvlanMode::Private);
        assert_eq!(conf.validate_mtu("bond0", 1500).unwrap(), 1400);
        assert_eq!(
            conf.hardware_addr().unwrap(),
            Some(MacAddr::new([2, 0, 0, 0, 0, 1]))
        );

        let allocator = conf.require_allocator().unwrap();
        assert_eq!(allocator.networks_annotation, DEFAULT_NETWORKS_ANNOTATION);
        assert!(allocator.token_file.is_none());
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            NetConf::from_slice(b"{not json"),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_mtu_bounds() {
        let mut conf = NetConf::from_slice(b"{}").unwrap();

        for (mtu, ok) in [(0, true), (1500, true), (1501, false), (9000, false), (-1, false)] {
            conf.mtu = mtu;
            assert_eq!(conf.validate_mtu("eth0", 1500).is_ok(), ok, "mtu {mtu}");
        }
    }

    #[test]
    fn test_bad_mac() {
        let conf = NetConf::from_slice(br#"{"mac":"not-a-mac"}"#).unwrap();
        assert!(conf.hardware_addr().is_err());
    }

    #[test]
    fn test_prev_result_mac() {
        let conf = NetConf::from_slice(
            br#"{
                "prevResult": {
                    "interfaces": [
                        {"name": "lo"},
                        {"name": "eth0", "mac": "0e:69:d6:07:a9:33", "sandbox": "/proc/1/ns/net"}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            conf.prev_result_mac("eth0").map(|m| m.to_string()).as_deref(),
            Some("0e:69:d6:07:a9:33")
        );
        assert!(conf.prev_result_mac("eth1").is_none());
    }
}
