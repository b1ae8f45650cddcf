//! DEL command

use anyhow::Result;
use tracing::warn;

use macvnet_core::NetConf;

use crate::orchestrator::Invocation;

/// Detach an interface and release its lease
///
/// The configuration is read best-effort: without it there is nothing to
/// release, but the interface is still removed.
pub async fn execute(invocation: &Invocation, config: &[u8]) -> Result<()> {
    let allocator = match NetConf::from_slice(config) {
        Ok(conf) => conf.allocator,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable network configuration");
            None
        }
    };

    let orchestrator = super::connect(allocator.as_ref())?;
    Ok(orchestrator.detach(invocation).await?)
}
