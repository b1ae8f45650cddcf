//! Attach, detach and check sequencing
//!
//! The orchestrator drives the allocator and the link provisioner and owns
//! the compensation rules between them:
//!
//! - a lease obtained during attach is released again if anything after the
//!   allocation fails
//! - an interface that made it into the namespace is deleted again if
//!   configuring it fails
//! - detach releases the lease first and then removes the interface, and
//!   treats everything that is already gone as done

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use macvnet_core::{
    AllocationResult, AttachmentConfig, CniArgs, CniResult, Error, MacAddr, MacvlanMode, NetConf,
    Result, WorkloadIdentity,
};
use macvnet_ipam::AllocatorClient;
use macvnet_link::{InterfaceAddress, LinkBackend, Provisioner};

/// Runtime parameters of one plugin invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Container ID (`CNI_CONTAINERID`)
    pub container_id: String,
    /// Network namespace path (`CNI_NETNS`)
    pub netns: Option<PathBuf>,
    /// Interface name inside the namespace (`CNI_IFNAME`)
    pub if_name: String,
    /// Raw `CNI_ARGS`
    pub args: String,
}

impl Invocation {
    /// Create an invocation for `if_name` with no namespace and no arguments
    #[must_use]
    pub fn new(if_name: impl Into<String>) -> Self {
        Self {
            if_name: if_name.into(),
            ..Self::default()
        }
    }

    /// Set the container ID
    #[must_use]
    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = container_id.into();
        self
    }

    /// Set the namespace path
    #[must_use]
    pub fn with_netns(mut self, netns: impl Into<PathBuf>) -> Self {
        self.netns = Some(netns.into());
        self
    }

    /// Set the raw `CNI_ARGS`
    #[must_use]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    fn require_netns(&self) -> Result<&Path> {
        self.netns.as_deref().ok_or_else(|| Error::InvalidArgs {
            message: "CNI_NETNS is required".to_string(),
        })
    }

    fn require_if_name(&self) -> Result<&str> {
        if self.if_name.is_empty() {
            return Err(Error::InvalidArgs {
                message: "CNI_IFNAME is required".to_string(),
            });
        }
        Ok(&self.if_name)
    }
}

/// Settings validated before anything is allocated
struct Plan<'a> {
    netns: &'a Path,
    if_name: &'a str,
    uplink: String,
    mode: MacvlanMode,
    mac: Option<MacAddr>,
    workload: WorkloadIdentity,
}

/// Sequences attachments over a link backend and an allocator
///
/// # Example
/// ```
/// use macvnet_cli::{Invocation, Orchestrator};
/// use macvnet_ipam::MockAllocator;
/// use macvnet_link::MockLinkBackend;
///
/// # async fn example() -> macvnet_core::Result<()> {
/// let orchestrator = Orchestrator::new(MockLinkBackend::new(), Some(MockAllocator::new()));
///
/// // Nothing to remove and no pod to release for
/// orchestrator.detach(&Invocation::new("eth0")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator<L, A> {
    provisioner: Provisioner<L>,
    allocator: Option<A>,
}

impl<L: LinkBackend, A: AllocatorClient> Orchestrator<L, A> {
    /// Create an orchestrator
    ///
    /// Without an allocator, attach fails and detach skips the release.
    #[must_use]
    pub const fn new(links: L, allocator: Option<A>) -> Self {
        Self {
            provisioner: Provisioner::new(links),
            allocator,
        }
    }

    fn links(&self) -> &L {
        self.provisioner.backend()
    }

    fn require_allocator(&self) -> Result<&A> {
        self.allocator.as_ref().ok_or_else(|| Error::InvalidConfig {
            message: "the allocator section is required".to_string(),
        })
    }

    /// Attach a macvlan to the container described by `invocation`
    ///
    /// Configuration problems are reported before the allocator is asked for
    /// anything. Once a lease exists, every later failure hands it back.
    pub async fn attach(&self, conf: &NetConf, invocation: &Invocation) -> Result<CniResult> {
        let plan = self.plan(conf, invocation).await?;
        let allocator = self.require_allocator()?;

        info!(
            container_id = %invocation.container_id,
            pod = %plan.workload,
            netns = %plan.netns.display(),
            if_name = plan.if_name,
            "Attaching"
        );

        // The configured MTU has to fit the base uplink before any lease is taken
        let base_mtu = self.links().link_mtu(&plan.uplink).await?;
        conf.validate_mtu(&plan.uplink, base_mtu)?;

        let networks = allocator.lookup_pod_networks(&plan.workload).await?;
        if networks.is_empty() {
            return Err(Error::allocation(
                "lookup",
                plan.workload.to_string(),
                "pod lists no candidate networks",
            ));
        }

        let allocation = allocator.allocate(&plan.workload, &networks).await?;

        match self.attach_allocated(conf, &plan, &allocation).await {
            Ok(result) => {
                info!(
                    pod = %plan.workload,
                    if_name = plan.if_name,
                    address = %allocation.ip_address,
                    vlan = allocation.vlan_id,
                    "Attached"
                );
                Ok(result)
            }
            Err(err) => {
                if let Err(release) = allocator.release(&plan.workload).await {
                    error!(
                        pod = %plan.workload,
                        error = %release,
                        "Failed to release lease after failed attach"
                    );
                }
                Err(err)
            }
        }
    }

    async fn plan<'a>(&self, conf: &NetConf, invocation: &'a Invocation) -> Result<Plan<'a>> {
        let mode = conf.macvlan_mode()?;
        let mac = conf.hardware_addr()?;

        let uplink = match conf.master() {
            Some(master) => master.to_string(),
            None => self.links().default_route_interface().await?,
        };

        let workload = CniArgs::parse(&invocation.args)?.require_workload()?;

        Ok(Plan {
            netns: invocation.require_netns()?,
            if_name: invocation.require_if_name()?,
            uplink,
            mode,
            mac,
            workload,
        })
    }

    async fn attach_allocated(
        &self,
        conf: &NetConf,
        plan: &Plan<'_>,
        allocation: &AllocationResult,
    ) -> Result<CniResult> {
        let vlan_uplink = allocation.vlan_uplink(&plan.uplink);
        let vlan_mtu = self.links().link_mtu(&vlan_uplink).await?;
        let mtu = conf.validate_mtu(&vlan_uplink, vlan_mtu)?;

        let netns = self
            .links()
            .open_namespace(plan.netns)
            .await?
            .ok_or_else(|| Error::Namespace {
                message: format!("netns {} does not exist", plan.netns.display()),
            })?;

        let config = AttachmentConfig::new(vlan_uplink, plan.workload.clone())
            .with_mode(plan.mode)
            .with_mtu(mtu)
            .with_mac(plan.mac);

        let interface = self
            .provisioner
            .create(&config, plan.if_name, &netns)
            .await?;

        let address = InterfaceAddress::from(allocation);
        if let Err(err) = self
            .links()
            .configure_address(&netns, &interface.name, &address)
            .await
        {
            match self.provisioner.delete(&netns, &interface.name).await {
                Ok(_) => debug!(if_name = %interface.name, "Rolled back interface"),
                Err(cleanup) => error!(
                    if_name = %interface.name,
                    error = %cleanup,
                    "Failed to roll back interface"
                ),
            }
            return Err(err);
        }

        Ok(CniResult::new(&conf.cni_version, &interface, allocation))
    }

    /// Detach the interface named in `invocation`
    ///
    /// The lease is released before the namespace is touched. Missing
    /// identity, namespace or interface count as already detached. If the
    /// release failed, that error is returned once the interface cleanup has
    /// been attempted.
    pub async fn detach(&self, invocation: &Invocation) -> Result<()> {
        info!(
            container_id = %invocation.container_id,
            netns = ?invocation.netns,
            if_name = %invocation.if_name,
            "Detaching"
        );

        let released = self.release(invocation).await;
        let removed = self.remove_interface(invocation).await;

        match (released, removed) {
            (Ok(()), removed) => removed,
            (Err(release), Ok(())) => Err(release),
            (Err(release), Err(teardown)) => {
                error!(error = %teardown, "Failed to remove interface");
                Err(release)
            }
        }
    }

    async fn release(&self, invocation: &Invocation) -> Result<()> {
        let workload = match CniArgs::parse(&invocation.args) {
            Ok(args) => args.workload(),
            Err(e) => {
                warn!(error = %e, "Unparseable CNI_ARGS, skipping release");
                return Ok(());
            }
        };

        let Some(workload) = workload else {
            warn!("No pod identity in CNI_ARGS, skipping release");
            return Ok(());
        };

        let Some(allocator) = &self.allocator else {
            warn!(pod = %workload, "No allocator configured, skipping release");
            return Ok(());
        };

        allocator.release(&workload).await
    }

    async fn remove_interface(&self, invocation: &Invocation) -> Result<()> {
        let Some(path) = invocation.netns.as_deref() else {
            debug!("No namespace, nothing to remove");
            return Ok(());
        };

        let Some(netns) = self.links().open_namespace(path).await? else {
            debug!(netns = %path.display(), "Namespace already gone");
            return Ok(());
        };

        self.provisioner
            .delete(&netns, invocation.require_if_name()?)
            .await
            .map(|_| ())
    }

    /// Confirm the interface named in `invocation` is still in place
    ///
    /// When `prevResult` records a hardware address for the interface, the
    /// live address has to match it.
    pub async fn check(&self, conf: &NetConf, invocation: &Invocation) -> Result<()> {
        let path = invocation.require_netns()?;
        let if_name = invocation.require_if_name()?;

        let netns = self
            .links()
            .open_namespace(path)
            .await?
            .ok_or_else(|| Error::Namespace {
                message: format!("netns {} does not exist", path.display()),
            })?;

        let mac = self.links().hardware_addr(&netns, if_name).await?;

        if let Some(expected) = conf.prev_result_mac(if_name) {
            if expected != mac {
                return Err(Error::provisioning(
                    "check",
                    if_name,
                    format!("hardware address {mac} does not match recorded {expected}"),
                ));
            }
        }

        debug!(if_name, %mac, "Interface checked");
        Ok(())
    }
}
