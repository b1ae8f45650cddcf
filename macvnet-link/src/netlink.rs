//! Link backend on rtnetlink
//!
//! Host queries share one netlink connection opened in the caller's
//! namespace. Every operation inside a target namespace runs through
//! [`NetNs::run`] and opens its own connection there, since a netlink socket
//! belongs to the namespace it was created in.

use async_trait::async_trait;
use futures::TryStreamExt;
use netlink_packet_route::link::nlas::Nla;
use netlink_packet_route::route::{NextHopBuffer, Nla as RouteNla};
use netlink_packet_route::{
    IFF_UP, LinkMessage, MACVLAN_MODE_BRIDGE, MACVLAN_MODE_PASSTHRU, MACVLAN_MODE_PRIVATE,
    MACVLAN_MODE_VEPA, RT_TABLE_MAIN, RouteMessage,
};
use rtnetlink::{Handle, IpVersion};
use std::net::IpAddr;
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;
use tracing::{debug, trace};

use macvnet_core::{Error, MacAddr, MacvlanMode, Result};
use macvnet_netns::NetNs;

use crate::backend::{InterfaceAddress, LinkBackend, MacvlanRequest};

type NetlinkResult<T> = std::result::Result<T, rtnetlink::Error>;

/// Production backend talking rtnetlink to the kernel
///
/// # Example
/// ```no_run
/// use macvnet_link::{LinkBackend, NetlinkBackend};
///
/// # async fn example() -> macvnet_core::Result<()> {
/// let backend = NetlinkBackend::connect()?;
/// let uplink = backend.default_route_interface().await?;
/// println!("{uplink} MTU {}", backend.link_mtu(&uplink).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NetlinkBackend {
    handle: Handle,
}

impl NetlinkBackend {
    /// Open a netlink connection in the caller's namespace
    ///
    /// Must be called from within a tokio runtime, which drives the
    /// connection.
    pub fn connect() -> Result<Self> {
        Ok(Self {
            handle: spawn_connection()?,
        })
    }

    async fn host_link(&self, name: &str) -> Result<LinkMessage> {
        find_link(&self.handle, name)
            .await
            .map_err(|e| Error::resolution(name, e))?
            .ok_or_else(|| Error::resolution(name, "no such interface"))
    }
}

impl std::fmt::Debug for NetlinkBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetlinkBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkBackend for NetlinkBackend {
    type Namespace = NetNs;

    async fn open_namespace(&self, path: &Path) -> Result<Option<NetNs>> {
        NetNs::try_open(path)
    }

    async fn default_route_interface(&self) -> Result<String> {
        let mut routes = self.handle.route().get(IpVersion::V4).execute();

        while let Some(route) = routes
            .try_next()
            .await
            .map_err(|e| Error::resolution("default route", e))?
        {
            if route.header.destination_prefix_length != 0 || route.header.table != RT_TABLE_MAIN {
                continue;
            }

            let Some(index) = route_oif(&route) else {
                continue;
            };

            let link = self
                .handle
                .link()
                .get()
                .match_index(index)
                .execute()
                .try_next()
                .await
                .map_err(|e| Error::resolution("default route", e))?
                .ok_or_else(|| {
                    Error::resolution("default route", format!("link {index} vanished"))
                })?;

            let name = link_name(&link).ok_or_else(|| {
                Error::resolution("default route", format!("link {index} has no name"))
            })?;

            debug!(uplink = name, "Resolved default route interface");
            return Ok(name.to_string());
        }

        Err(Error::resolution(
            "default route",
            "no IPv4 default route found",
        ))
    }

    async fn link_index(&self, name: &str) -> Result<u32> {
        Ok(self.host_link(name).await?.header.index)
    }

    async fn link_mtu(&self, name: &str) -> Result<u32> {
        let link = self.host_link(name).await?;
        link_mtu(&link).ok_or_else(|| Error::resolution(name, "kernel reported no MTU"))
    }

    async fn create_macvlan(&self, request: &MacvlanRequest, netns: &NetNs) -> Result<()> {
        let mut add = self.handle.link().add().macvlan(
            request.name.clone(),
            request.parent_index,
            kernel_mode(request.mode),
        );

        // The rename that follows needs the link down
        let message = add.message_mut();
        message.header.flags &= !IFF_UP;
        message.header.change_mask &= !IFF_UP;
        if request.mtu > 0 {
            message.nlas.push(Nla::Mtu(request.mtu));
        }
        if let Some(mac) = request.mac {
            message.nlas.push(Nla::Address(mac.octets().to_vec()));
        }
        message.nlas.push(Nla::NetNsFd(netns.as_fd().as_raw_fd()));

        add.execute()
            .await
            .map_err(|e| Error::provisioning("create macvlan", &request.name, e))?;

        trace!(
            link = %request.name,
            netns = %netns.path().display(),
            "Created macvlan"
        );
        Ok(())
    }

    async fn rename_link(&self, netns: &NetNs, from: &str, to: &str) -> Result<()> {
        let (from, to) = (from.to_string(), to.to_string());

        netns
            .run(move || async move {
                let handle = spawn_connection()?;
                let index = namespace_link(&handle, &from, "rename").await?.header.index;

                handle
                    .link()
                    .set(index)
                    .name(to.clone())
                    .execute()
                    .await
                    .map_err(|e| Error::provisioning(format!("rename to {to}"), &from, e))
            })
            .await
    }

    async fn hardware_addr(&self, netns: &NetNs, name: &str) -> Result<MacAddr> {
        let name = name.to_string();

        netns
            .run(move || async move {
                let handle = spawn_connection()?;
                let link = namespace_link(&handle, &name, "read back").await?;
                read_back_mac(&name, &link)
            })
            .await
    }

    async fn configure_address(
        &self,
        netns: &NetNs,
        name: &str,
        address: &InterfaceAddress,
    ) -> Result<()> {
        let name = name.to_string();
        let address = *address;

        netns
            .run(move || async move {
                let handle = spawn_connection()?;
                let index = namespace_link(&handle, &name, "configure").await?.header.index;

                handle
                    .link()
                    .set(index)
                    .up()
                    .execute()
                    .await
                    .map_err(|e| Error::provisioning("bring up", &name, e))?;

                handle
                    .address()
                    .add(index, IpAddr::V4(address.address), address.prefix_length)
                    .execute()
                    .await
                    .map_err(|e| {
                        Error::provisioning(
                            format!(
                                "add address {}/{} to",
                                address.address, address.prefix_length
                            ),
                            &name,
                            e,
                        )
                    })?;

                handle
                    .route()
                    .add()
                    .v4()
                    .gateway(address.gateway)
                    .output_interface(index)
                    .execute()
                    .await
                    .map_err(|e| {
                        Error::provisioning(
                            format!("add default route via {} on", address.gateway),
                            &name,
                            e,
                        )
                    })
            })
            .await
    }

    async fn delete_link(&self, netns: &NetNs, name: &str) -> Result<bool> {
        let name = name.to_string();

        netns
            .run(move || async move {
                let handle = spawn_connection()?;
                let Some(link) = find_link(&handle, &name)
                    .await
                    .map_err(|e| Error::teardown("look up", &name, e))?
                else {
                    return Ok(false);
                };

                match handle.link().del(link.header.index).execute().await {
                    Ok(()) => Ok(true),
                    Err(e) if is_not_found(&e) => Ok(false),
                    Err(e) => Err(Error::teardown("delete", &name, e)),
                }
            })
            .await
    }
}

fn spawn_connection() -> Result<Handle> {
    let (connection, handle, _) = rtnetlink::new_connection()?;
    tokio::spawn(connection);
    Ok(handle)
}

async fn find_link(handle: &Handle, name: &str) -> NetlinkResult<Option<LinkMessage>> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();

    match links.try_next().await {
        Ok(link) => Ok(link),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn namespace_link(handle: &Handle, name: &str, operation: &str) -> Result<LinkMessage> {
    find_link(handle, name)
        .await
        .map_err(|e| Error::provisioning(operation, name, e))?
        .ok_or_else(|| Error::provisioning(operation, name, "no such interface in namespace"))
}

fn is_not_found(err: &rtnetlink::Error) -> bool {
    matches!(err, rtnetlink::Error::NetlinkError(msg) if msg.raw_code().abs() == libc::ENODEV)
}

fn link_name(link: &LinkMessage) -> Option<&str> {
    link.nlas.iter().find_map(|nla| match nla {
        Nla::IfName(name) => Some(name.as_str()),
        _ => None,
    })
}

fn link_mtu(link: &LinkMessage) -> Option<u32> {
    link.nlas.iter().find_map(|nla| match nla {
        Nla::Mtu(mtu) => Some(*mtu),
        _ => None,
    })
}

fn link_address(link: &LinkMessage) -> Option<&[u8]> {
    link.nlas.iter().find_map(|nla| match nla {
        Nla::Address(octets) => Some(octets.as_slice()),
        _ => None,
    })
}

const fn kernel_mode(mode: MacvlanMode) -> u32 {
    match mode {
        MacvlanMode::Bridge => MACVLAN_MODE_BRIDGE,
        MacvlanMode::Private => MACVLAN_MODE_PRIVATE,
        MacvlanMode::Vepa => MACVLAN_MODE_VEPA,
        MacvlanMode::Passthru => MACVLAN_MODE_PASSTHRU,
    }
}

/// Output interface of a route, from `RTA_OIF` or the first multipath hop
fn route_oif(route: &RouteMessage) -> Option<u32> {
    route.nlas.iter().find_map(|nla| match nla {
        RouteNla::Oif(index) => Some(*index),
        RouteNla::MultiPath(hops) => NextHopBuffer::new_checked(hops.as_slice())
            .ok()
            .map(|hop| hop.interface_id()),
        _ => None,
    })
}

fn read_back_mac(name: &str, link: &LinkMessage) -> Result<MacAddr> {
    let octets = link_address(link).ok_or_else(|| {
        Error::provisioning("read back", name, "kernel reported no hardware address")
    })?;
    MacAddr::from_slice(octets).map_err(|e| Error::provisioning("read back", name, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_mode_values() {
        assert_eq!(kernel_mode(MacvlanMode::Private), 1);
        assert_eq!(kernel_mode(MacvlanMode::Vepa), 2);
        assert_eq!(kernel_mode(MacvlanMode::Bridge), 4);
        assert_eq!(kernel_mode(MacvlanMode::Passthru), 8);
    }

    #[test]
    fn test_link_attributes() {
        let mut link = LinkMessage::default();
        link.header.index = 7;
        link.nlas.push(Nla::IfName("eth0".to_string()));
        link.nlas.push(Nla::Mtu(1500));
        link.nlas.push(Nla::Address(vec![0x0e, 0x69, 0xd6, 0x07, 0xa9, 0x33]));

        assert_eq!(link_name(&link), Some("eth0"));
        assert_eq!(link_mtu(&link), Some(1500));
        assert_eq!(
            MacAddr::from_slice(link_address(&link).unwrap()).unwrap().to_string(),
            "0e:69:d6:07:a9:33"
        );
    }

    #[test]
    fn test_attributes_missing() {
        let link = LinkMessage::default();
        assert!(link_name(&link).is_none());
        assert!(link_mtu(&link).is_none());
        assert!(link_address(&link).is_none());
    }

    #[test]
    fn test_read_back_bad_length() {
        let mut link = LinkMessage::default();
        link.nlas.push(Nla::Address(vec![0x0e, 0x69, 0xd6, 0x07]));

        let err = read_back_mac("eth0", &link).unwrap_err();
        assert!(matches!(err, Error::Provisioning { .. }));
        assert_eq!(err.cni_code(), 102);

        let err = read_back_mac("eth0", &LinkMessage::default()).unwrap_err();
        assert!(matches!(err, Error::Provisioning { .. }));
    }

    #[test]
    fn test_route_output_interface() {
        let mut route = RouteMessage::default();
        assert!(route_oif(&route).is_none());

        route.nlas.push(RouteNla::Oif(2));
        assert_eq!(route_oif(&route), Some(2));
    }

    #[test]
    fn test_multipath_route_output_interface() {
        // rtnexthop: len, flags, hops, ifindex
        let mut hop = Vec::new();
        hop.extend_from_slice(&8u16.to_ne_bytes());
        hop.extend_from_slice(&[0, 0]);
        hop.extend_from_slice(&3u32.to_ne_bytes());

        let mut route = RouteMessage::default();
        route.nlas.push(RouteNla::MultiPath(hop));
        assert_eq!(route_oif(&route), Some(3));

        let mut truncated = RouteMessage::default();
        truncated.nlas.push(RouteNla::MultiPath(vec![8, 0]));
        assert!(route_oif(&truncated).is_none());
    }

    #[tokio::test]
    #[ignore] // Requires a netlink socket
    async fn test_resolve_loopback() {
        let backend = NetlinkBackend::connect().unwrap();
        assert_eq!(backend.link_index("lo").await.unwrap(), 1);
        assert!(backend.link_mtu("lo").await.unwrap() > 0);
        assert!(matches!(
            backend.link_index("macvnet-missing0").await,
            Err(Error::Resolution { .. })
        ));
    }
}
