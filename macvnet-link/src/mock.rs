//! In-memory link backend for tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use macvnet_core::{Error, MacAddr, MacvlanMode, Result};
use macvnet_netns::NamespaceHandle;

use crate::backend::{InterfaceAddress, LinkBackend, MacvlanRequest};

/// Backend operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkFault {
    /// Macvlan creation
    Create,
    /// Rename inside the namespace
    Rename,
    /// Hardware address read-back
    HardwareAddr,
    /// Address and route setup
    Configure,
    /// Link deletion
    Delete,
}

/// Namespace handle of the mock backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockNamespace {
    path: PathBuf,
}

impl NamespaceHandle for MockNamespace {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// Link as the mock kernel holds it inside a namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
    /// Hardware address
    pub mac: MacAddr,
    /// MTU
    pub mtu: u32,
    /// Macvlan mode it was created with
    pub mode: MacvlanMode,
    /// Administrative state
    pub up: bool,
    /// Address and default route, once configured
    pub address: Option<InterfaceAddress>,
}

/// Mock backend for testing (doesn't touch the kernel)
///
/// Holds host links, namespaces and the links inside them. Individual
/// operations can be made to fail with [`MockLinkBackend::fail_on`].
///
/// # Example
/// ```
/// use macvnet_link::{LinkBackend, MockLinkBackend};
///
/// # async fn example() -> macvnet_core::Result<()> {
/// let backend = MockLinkBackend::new();
/// backend.add_host_link("eth0", 1500).await;
/// backend.set_default_route("eth0").await;
///
/// assert_eq!(backend.default_route_interface().await?, "eth0");
/// assert_eq!(backend.link_mtu("eth0").await?, 1500);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockLinkBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    host_links: HashMap<String, HostLink>,
    default_route: Option<String>,
    namespaces: HashMap<PathBuf, BTreeMap<String, MockLink>>,
    faults: HashSet<LinkFault>,
    kernel_mac: Option<MacAddr>,
    created: Vec<MacvlanRequest>,
    next_index: u32,
    call_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct HostLink {
    index: u32,
    mtu: u32,
}

impl MockState {
    fn links_mut(&mut self, netns: &MockNamespace) -> Result<&mut BTreeMap<String, MockLink>> {
        self.namespaces
            .get_mut(&netns.path)
            .ok_or_else(|| Error::Namespace {
                message: format!("netns {} is gone", netns.path.display()),
            })
    }

    fn check(&self, fault: LinkFault, operation: &str, resource: &str) -> Result<()> {
        if !self.faults.contains(&fault) {
            return Ok(());
        }

        let cause = "injected failure";
        Err(match fault {
            LinkFault::Delete => Error::teardown(operation, resource, cause),
            _ => Error::provisioning(operation, resource, cause),
        })
    }
}

impl MockLinkBackend {
    /// Create a new mock backend with no links and no namespaces
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_index: 2,
                ..MockState::default()
            })),
        }
    }

    /// Add a host link
    pub async fn add_host_link(&self, name: &str, mtu: u32) {
        let mut state = self.state.lock().await;
        let index = state.next_index;
        state.next_index += 1;
        state
            .host_links
            .insert(name.to_string(), HostLink { index, mtu });
    }

    /// Point the IPv4 default route at a host link
    pub async fn set_default_route(&self, name: &str) {
        self.state.lock().await.default_route = Some(name.to_string());
    }

    /// Create an empty namespace at `path`
    pub async fn add_namespace(&self, path: impl Into<PathBuf>) {
        self.state
            .lock()
            .await
            .namespaces
            .entry(path.into())
            .or_default();
    }

    /// Remove the namespace at `path` and everything in it
    pub async fn remove_namespace(&self, path: &Path) {
        self.state.lock().await.namespaces.remove(path);
    }

    /// Put a link into a namespace directly (for testing)
    pub async fn insert_link(&self, path: &Path, name: &str, mac: MacAddr) {
        let mut state = self.state.lock().await;
        if let Some(links) = state.namespaces.get_mut(path) {
            links.insert(
                name.to_string(),
                MockLink {
                    mac,
                    mtu: 1500,
                    mode: MacvlanMode::default(),
                    up: false,
                    address: None,
                },
            );
        }
    }

    /// Make an operation fail until [`MockLinkBackend::clear_faults`]
    pub async fn fail_on(&self, fault: LinkFault) {
        self.state.lock().await.faults.insert(fault);
    }

    /// Stop injecting failures
    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Hardware address the mock kernel assigns, whatever was requested
    pub async fn set_kernel_mac(&self, mac: MacAddr) {
        self.state.lock().await.kernel_mac = Some(mac);
    }

    /// Get the number of backend calls made (for testing)
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.call_count
    }

    /// Creation requests received so far
    pub async fn created(&self) -> Vec<MacvlanRequest> {
        self.state.lock().await.created.clone()
    }

    /// Names of the links inside a namespace
    pub async fn links_in(&self, path: &Path) -> Vec<String> {
        self.state
            .lock()
            .await
            .namespaces
            .get(path)
            .map(|links| links.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// A link inside a namespace
    pub async fn link_in(&self, path: &Path, name: &str) -> Option<MockLink> {
        self.state
            .lock()
            .await
            .namespaces
            .get(path)?
            .get(name)
            .cloned()
    }
}

impl Default for MockLinkBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockLinkBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLinkBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkBackend for MockLinkBackend {
    type Namespace = MockNamespace;

    async fn open_namespace(&self, path: &Path) -> Result<Option<MockNamespace>> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        Ok(state.namespaces.contains_key(path).then(|| MockNamespace {
            path: path.to_path_buf(),
        }))
    }

    async fn default_route_interface(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        state
            .default_route
            .clone()
            .ok_or_else(|| Error::resolution("default route", "no IPv4 default route found"))
    }

    async fn link_index(&self, name: &str) -> Result<u32> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        state
            .host_links
            .get(name)
            .map(|link| link.index)
            .ok_or_else(|| Error::resolution(name, "no such interface"))
    }

    async fn link_mtu(&self, name: &str) -> Result<u32> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        state
            .host_links
            .get(name)
            .map(|link| link.mtu)
            .ok_or_else(|| Error::resolution(name, "no such interface"))
    }

    async fn create_macvlan(
        &self,
        request: &MacvlanRequest,
        netns: &MockNamespace,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        state.check(LinkFault::Create, "create macvlan", &request.name)?;

        let parent = state
            .host_links
            .values()
            .find(|link| link.index == request.parent_index)
            .copied()
            .ok_or_else(|| {
                Error::provisioning("create macvlan", &request.name, "parent link not found")
            })?;

        let index = state.next_index;
        state.next_index += 1;
        let mac = state
            .kernel_mac
            .or(request.mac)
            .unwrap_or_else(|| MacAddr::new(generated_mac(index)));

        let links = state.links_mut(netns)?;
        if links.contains_key(&request.name) {
            return Err(Error::provisioning(
                "create macvlan",
                &request.name,
                "file exists",
            ));
        }

        links.insert(
            request.name.clone(),
            MockLink {
                mac,
                mtu: if request.mtu == 0 { parent.mtu } else { request.mtu },
                mode: request.mode,
                up: false,
                address: None,
            },
        );
        state.created.push(request.clone());

        tracing::debug!(link = %request.name, %mac, "Mock: Created macvlan");

        Ok(())
    }

    async fn rename_link(&self, netns: &MockNamespace, from: &str, to: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        state.check(LinkFault::Rename, &format!("rename to {to}"), from)?;

        let links = state.links_mut(netns)?;
        if links.contains_key(to) {
            return Err(Error::provisioning(
                format!("rename to {to}"),
                from,
                "file exists",
            ));
        }
        let link = links
            .remove(from)
            .ok_or_else(|| Error::provisioning(format!("rename to {to}"), from, "no such device"))?;
        links.insert(to.to_string(), link);

        tracing::debug!(from, to, "Mock: Renamed link");

        Ok(())
    }

    async fn hardware_addr(&self, netns: &MockNamespace, name: &str) -> Result<MacAddr> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        state.check(LinkFault::HardwareAddr, "read back", name)?;

        state
            .links_mut(netns)?
            .get(name)
            .map(|link| link.mac)
            .ok_or_else(|| Error::provisioning("read back", name, "no such device"))
    }

    async fn configure_address(
        &self,
        netns: &MockNamespace,
        name: &str,
        address: &InterfaceAddress,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        state.check(LinkFault::Configure, "configure", name)?;

        let link = state
            .links_mut(netns)?
            .get_mut(name)
            .ok_or_else(|| Error::provisioning("configure", name, "no such device"))?;
        link.up = true;
        link.address = Some(*address);

        tracing::debug!(
            link = name,
            address = %address.address,
            gateway = %address.gateway,
            "Mock: Configured link"
        );

        Ok(())
    }

    async fn delete_link(&self, netns: &MockNamespace, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        state.check(LinkFault::Delete, "delete", name)?;

        let existed = state.links_mut(netns)?.remove(name).is_some();

        tracing::debug!(link = name, existed, "Mock: Deleted link");

        Ok(existed)
    }
}

fn generated_mac(index: u32) -> [u8; 6] {
    let [a, b, c, d] = index.to_be_bytes();
    [0x02, 0x00, a, b, c, d]
}
