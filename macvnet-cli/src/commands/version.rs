//! VERSION command

use macvnet_core::VersionInfo;

/// Versions this plugin can speak
#[must_use]
pub fn execute() -> VersionInfo {
    VersionInfo::current()
}
