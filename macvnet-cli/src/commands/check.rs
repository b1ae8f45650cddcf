//! CHECK command

use anyhow::Result;

use macvnet_core::NetConf;
use macvnet_core::report::ensure_supported;

use crate::orchestrator::Invocation;

/// Verify that a previous ADD is still in place
pub async fn execute(invocation: &Invocation, config: &[u8]) -> Result<()> {
    let conf = NetConf::from_slice(config)?;
    ensure_supported(&conf.cni_version)?;

    let orchestrator = super::connect(None)?;
    Ok(orchestrator.check(&conf, invocation).await?)
}
