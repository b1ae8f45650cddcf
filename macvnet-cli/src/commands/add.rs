//! ADD command

use anyhow::Result;

use macvnet_core::report::ensure_supported;
use macvnet_core::{CniResult, NetConf};

use crate::orchestrator::Invocation;

/// Attach an interface and return the CNI result
pub async fn execute(invocation: &Invocation, config: &[u8]) -> Result<CniResult> {
    let conf = NetConf::from_slice(config)?;
    ensure_supported(&conf.cni_version)?;
    let allocator = conf.require_allocator()?;

    let orchestrator = super::connect(Some(allocator))?;
    Ok(orchestrator.attach(&conf, invocation).await?)
}
