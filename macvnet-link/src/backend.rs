//! Link backend trait for pluggable implementations

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::Path;

use macvnet_core::{AllocationResult, MacAddr, MacvlanMode, Result};
use macvnet_netns::NamespaceHandle;

/// Trait for kernel link backends
///
/// This allows for different implementations:
/// - [`NetlinkBackend`](crate::NetlinkBackend) - rtnetlink against the kernel
/// - [`MockLinkBackend`](crate::MockLinkBackend) - in-memory links and namespaces
///
/// Host operations run in the caller's namespace. Operations taking a
/// namespace run inside it.
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// Namespace handle this backend works with
    type Namespace: NamespaceHandle;

    /// Open the namespace at `path`, `None` if it no longer exists
    async fn open_namespace(&self, path: &Path) -> Result<Option<Self::Namespace>>;

    /// Name of the interface owning the IPv4 default route
    ///
    /// # Errors
    /// Returns a resolution error if there is no default route
    async fn default_route_interface(&self) -> Result<String>;

    /// Index of a host link
    ///
    /// # Errors
    /// Returns a resolution error if the link does not exist
    async fn link_index(&self, name: &str) -> Result<u32>;

    /// MTU of a host link
    ///
    /// # Errors
    /// Returns a resolution error if the link does not exist
    async fn link_mtu(&self, name: &str) -> Result<u32>;

    /// Create a macvlan, administratively down, directly inside `netns`
    async fn create_macvlan(&self, request: &MacvlanRequest, netns: &Self::Namespace)
    -> Result<()>;

    /// Rename a link inside `netns`
    async fn rename_link(&self, netns: &Self::Namespace, from: &str, to: &str) -> Result<()>;

    /// Hardware address of a link inside `netns`, as the kernel reports it
    async fn hardware_addr(&self, netns: &Self::Namespace, name: &str) -> Result<MacAddr>;

    /// Bring a link up inside `netns`, add its address and a default route
    async fn configure_address(
        &self,
        netns: &Self::Namespace,
        name: &str,
        address: &InterfaceAddress,
    ) -> Result<()>;

    /// Delete a link inside `netns`
    ///
    /// Returns `false` if there was no such link.
    ///
    /// # Errors
    /// Returns a teardown error for anything other than "not found"
    async fn delete_link(&self, netns: &Self::Namespace, name: &str) -> Result<bool>;
}

/// Parameters of one macvlan creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacvlanRequest {
    /// Name the link is created with
    pub name: String,
    /// Index of the parent link on the host
    pub parent_index: u32,
    /// Macvlan mode
    pub mode: MacvlanMode,
    /// MTU; 0 inherits the parent's
    pub mtu: u32,
    /// Hardware address override
    pub mac: Option<MacAddr>,
}

/// Layer 3 settings applied to an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// Address assigned to the interface
    pub address: Ipv4Addr,
    /// Prefix length of the address
    pub prefix_length: u8,
    /// Next hop of the default route
    pub gateway: Ipv4Addr,
}

impl From<&AllocationResult> for InterfaceAddress {
    fn from(allocation: &AllocationResult) -> Self {
        Self {
            address: allocation.ip_address,
            prefix_length: allocation.prefix_length,
            gateway: allocation.gateway,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_allocation() {
        let allocation = AllocationResult {
            app_net: "app-a".to_string(),
            use_ip_list: Vec::new(),
            ip_address: Ipv4Addr::new(10, 0, 1, 5),
            gateway: Ipv4Addr::new(10, 0, 1, 1),
            vlan_id: 42,
            prefix_length: 26,
        };

        let address = InterfaceAddress::from(&allocation);
        assert_eq!(address.address, Ipv4Addr::new(10, 0, 1, 5));
        assert_eq!(address.prefix_length, 26);
        assert_eq!(address.gateway, Ipv4Addr::new(10, 0, 1, 1));
    }
}
