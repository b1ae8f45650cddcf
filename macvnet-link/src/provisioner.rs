//! Macvlan provisioning with internal rollback
//!
//! A new macvlan is created under a random temporary name, directly inside
//! the target namespace, and only then renamed to the requested name. The
//! requested name (often `eth0`) usually also exists on the host, so creating
//! it there first would collide.

use tracing::{debug, info, warn};

use macvnet_core::{AttachmentConfig, InterfaceDescriptor, Result};
use macvnet_netns::NamespaceHandle;

use crate::backend::{LinkBackend, MacvlanRequest};

/// Prefix of temporary link names
pub const TEMP_NAME_PREFIX: &str = "mv";

/// Creates and removes macvlan interfaces through a [`LinkBackend`]
#[derive(Debug, Clone)]
pub struct Provisioner<B> {
    backend: B,
}

impl<B: LinkBackend> Provisioner<B> {
    /// Create a provisioner over `backend`
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The backend this provisioner drives
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Create a macvlan on `config.uplink` named `if_name` inside `netns`
    ///
    /// The returned descriptor carries the hardware address read back from
    /// the kernel after the rename. If the rename or the read-back fails,
    /// the link is deleted again before the error is returned.
    pub async fn create(
        &self,
        config: &AttachmentConfig,
        if_name: &str,
        netns: &B::Namespace,
    ) -> Result<InterfaceDescriptor> {
        let parent_index = self.backend.link_index(&config.uplink).await?;

        let request = MacvlanRequest {
            name: temp_name(),
            parent_index,
            mode: config.mode,
            mtu: config.mtu,
            mac: config.mac,
        };

        debug!(
            uplink = %config.uplink,
            parent_index,
            temp_name = %request.name,
            mode = %config.mode,
            mtu = config.mtu,
            "Creating macvlan"
        );

        self.backend.create_macvlan(&request, netns).await?;

        if let Err(err) = self.backend.rename_link(netns, &request.name, if_name).await {
            self.discard(netns, &request.name).await;
            return Err(err);
        }

        let mac = match self.backend.hardware_addr(netns, if_name).await {
            Ok(mac) => mac,
            Err(err) => {
                self.discard(netns, if_name).await;
                return Err(err);
            }
        };

        info!(
            link = if_name,
            %mac,
            uplink = %config.uplink,
            netns = %netns.path().display(),
            "Provisioned macvlan"
        );

        Ok(InterfaceDescriptor {
            name: if_name.to_string(),
            mac,
            sandbox: netns.path().to_path_buf(),
        })
    }

    /// Delete `if_name` inside `netns`
    ///
    /// Returns whether the link existed. A missing link is not an error.
    pub async fn delete(&self, netns: &B::Namespace, if_name: &str) -> Result<bool> {
        let existed = self.backend.delete_link(netns, if_name).await?;

        if existed {
            info!(link = if_name, netns = %netns.path().display(), "Deleted macvlan");
        } else {
            debug!(link = if_name, netns = %netns.path().display(), "Link already gone");
        }

        Ok(existed)
    }

    async fn discard(&self, netns: &B::Namespace, name: &str) {
        match self.backend.delete_link(netns, name).await {
            Ok(_) => debug!(link = name, "Discarded partially provisioned link"),
            Err(e) => warn!(
                link = name,
                error = %e,
                "Failed to discard partially provisioned link"
            ),
        }
    }
}

/// Random temporary link name: `mv` followed by 8 hex digits
#[must_use]
pub fn temp_name() -> String {
    format!("{TEMP_NAME_PREFIX}{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LinkFault, MockLinkBackend, MockNamespace};
    use macvnet_core::{Error, MacAddr, MacvlanMode, WorkloadIdentity};
    use std::path::Path;

    const NETNS: &str = "/proc/4242/ns/net";

    async fn setup() -> (Provisioner<MockLinkBackend>, MockNamespace) {
        let backend = MockLinkBackend::new();
        backend.add_host_link("eth0", 1500).await;
        backend.add_host_link("eth0.42", 1500).await;
        backend.add_namespace(NETNS).await;

        let netns = backend
            .open_namespace(Path::new(NETNS))
            .await
            .unwrap()
            .unwrap();
        (Provisioner::new(backend), netns)
    }

    fn config() -> AttachmentConfig {
        AttachmentConfig::new("eth0.42", WorkloadIdentity::new("default", "web"))
    }

    #[test]
    fn test_temp_name_format() {
        let name = temp_name();
        assert_eq!(name.len(), 10);
        assert!(name.starts_with(TEMP_NAME_PREFIX));
        assert!(name[2..].chars().all(|c| c.is_ascii_hexdigit()));
        // Must fit IFNAMSIZ
        assert!(name.len() < 16);
    }

    #[tokio::test]
    async fn test_create_renames_into_place() {
        let (provisioner, netns) = setup().await;

        let iface = provisioner
            .create(&config().with_mode(MacvlanMode::Private), "eth0", &netns)
            .await
            .unwrap();

        assert_eq!(iface.name, "eth0");
        assert_eq!(iface.sandbox, Path::new(NETNS));
        assert_eq!(
            provisioner.backend().links_in(Path::new(NETNS)).await,
            vec!["eth0"]
        );

        let created = provisioner.backend().created().await;
        assert_eq!(created.len(), 1);
        assert!(created[0].name.starts_with(TEMP_NAME_PREFIX));
        assert_eq!(created[0].mode, MacvlanMode::Private);

        let link = provisioner
            .backend()
            .link_in(Path::new(NETNS), "eth0")
            .await
            .unwrap();
        assert_eq!(link.mac, iface.mac);
    }

    #[tokio::test]
    async fn test_create_reports_kernel_mac() {
        let (provisioner, netns) = setup().await;
        let kernel = MacAddr::new([0x0e, 0x69, 0xd6, 0x07, 0xa9, 0x33]);
        provisioner.backend().set_kernel_mac(kernel).await;

        let requested = MacAddr::new([0x02, 0, 0, 0, 0, 0x01]);
        let iface = provisioner
            .create(&config().with_mac(Some(requested)), "net1", &netns)
            .await
            .unwrap();

        assert_eq!(iface.mac, kernel);
    }

    #[tokio::test]
    async fn test_rename_failure_removes_temp_link() {
        let (provisioner, netns) = setup().await;
        provisioner.backend().fail_on(LinkFault::Rename).await;

        let err = provisioner
            .create(&config(), "eth0", &netns)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provisioning { .. }));
        assert!(provisioner.backend().links_in(Path::new(NETNS)).await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_collision_removes_temp_link() {
        let (provisioner, netns) = setup().await;
        let existing = MacAddr::new([0x02, 0, 0, 0, 0, 0x99]);
        provisioner
            .backend()
            .insert_link(Path::new(NETNS), "eth0", existing)
            .await;

        assert!(provisioner.create(&config(), "eth0", &netns).await.is_err());

        // Only the pre-existing link is left, untouched
        let links = provisioner.backend().links_in(Path::new(NETNS)).await;
        assert_eq!(links, vec!["eth0"]);
        let link = provisioner
            .backend()
            .link_in(Path::new(NETNS), "eth0")
            .await
            .unwrap();
        assert_eq!(link.mac, existing);
    }

    #[tokio::test]
    async fn test_read_back_failure_removes_link() {
        let (provisioner, netns) = setup().await;
        provisioner.backend().fail_on(LinkFault::HardwareAddr).await;

        assert!(provisioner.create(&config(), "eth0", &netns).await.is_err());
        assert!(provisioner.backend().links_in(Path::new(NETNS)).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_uplink_creates_nothing() {
        let (provisioner, netns) = setup().await;

        let err = provisioner
            .create(&config().with_uplink("eth0.7"), "eth0", &netns)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Resolution { .. }));
        assert!(provisioner.backend().created().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (provisioner, netns) = setup().await;
        provisioner.create(&config(), "eth0", &netns).await.unwrap();

        assert!(provisioner.delete(&netns, "eth0").await.unwrap());
        assert!(!provisioner.delete(&netns, "eth0").await.unwrap());
    }
}
