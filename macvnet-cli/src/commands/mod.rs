//! CNI command handlers

use anyhow::{Context, Result};
use std::io::Write;

use macvnet_core::config::DEFAULT_CNI_VERSION;
use macvnet_core::{AllocatorConfig, CniResult, VersionInfo};
use macvnet_ipam::HttpAllocator;
use macvnet_link::NetlinkBackend;

use crate::cli::{Cli, CniCommand};
use crate::orchestrator::Orchestrator;

pub mod add;
pub mod check;
pub mod del;
pub mod version;

/// What a successful command prints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// ADD result
    Attached(CniResult),
    /// VERSION answer
    Version(VersionInfo),
    /// DEL and CHECK print nothing
    Empty,
}

impl Reply {
    /// Write the reply to stdout (or anything else)
    pub fn write_to<W: Write>(&self, writer: W) -> macvnet_core::Result<()> {
        match self {
            Self::Attached(result) => result.write_to(writer),
            Self::Version(info) => info.write_to(writer),
            Self::Empty => Ok(()),
        }
    }
}

/// Dispatch command to appropriate handler
///
/// `config` is the network configuration read from stdin.
pub async fn dispatch(cli: &Cli, config: &[u8]) -> Result<Reply> {
    let invocation = cli.invocation();

    match cli.command {
        CniCommand::Add => add::execute(&invocation, config).await.map(Reply::Attached),
        CniCommand::Del => del::execute(&invocation, config).await.map(|()| Reply::Empty),
        CniCommand::Check => check::execute(&invocation, config).await.map(|()| Reply::Empty),
        CniCommand::Version => Ok(Reply::Version(version::execute())),
    }
}

/// Orchestrator over the kernel and the HTTP allocator
fn connect(allocator: Option<&AllocatorConfig>) -> Result<Orchestrator<NetlinkBackend, HttpAllocator>> {
    let links = NetlinkBackend::connect().context("failed to open netlink connection")?;
    let allocator = allocator.map(HttpAllocator::new).transpose()?;
    Ok(Orchestrator::new(links, allocator))
}

/// `cniVersion` of a configuration payload, for error documents
///
/// Falls back to the default when the payload does not parse.
#[must_use]
pub fn config_version(config: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(config)
        .ok()
        .and_then(|value| value.get("cniVersion")?.as_str().map(ToString::to_string))
        .unwrap_or_else(|| DEFAULT_CNI_VERSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_version() {
        assert_eq!(config_version(br#"{"cniVersion":"1.0.0"}"#), "1.0.0");
        assert_eq!(config_version(b"{}"), DEFAULT_CNI_VERSION);
        assert_eq!(config_version(b"not json"), DEFAULT_CNI_VERSION);
    }

    #[tokio::test]
    async fn test_dispatch_version() {
        let cli = <Cli as clap::Parser>::try_parse_from(["macvnet", "--command", "VERSION"]).unwrap();

        let reply = dispatch(&cli, b"").await.unwrap();
        assert_eq!(reply, Reply::Version(VersionInfo::current()));

        let mut out = Vec::new();
        reply.write_to(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("supportedVersions"));
    }

    #[tokio::test]
    async fn test_dispatch_add_rejects_bad_config() {
        let cli = <Cli as clap::Parser>::try_parse_from([
            "macvnet",
            "--command",
            "ADD",
            "--netns",
            "/var/run/netns/test",
        ])
        .unwrap();

        let err = dispatch(&cli, b"{not json").await.unwrap_err();
        let typed = err.downcast_ref::<macvnet_core::Error>().unwrap();
        assert_eq!(typed.cni_code(), 7);
    }

    #[test]
    fn test_empty_reply_writes_nothing() {
        let mut out = Vec::new();
        Reply::Empty.write_to(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
