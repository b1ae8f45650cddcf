//! CLI argument definitions
//!
//! A container runtime passes everything through `CNI_*` environment
//! variables; the flags exist for running the plugin by hand.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::orchestrator::Invocation;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "macvnet")]
#[command(about = "Macvlan CNI plugin with external IP/VLAN allocation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// CNI operation
    #[arg(long, env = "CNI_COMMAND", value_enum, ignore_case = true)]
    pub command: CniCommand,

    /// Container ID
    #[arg(long, env = "CNI_CONTAINERID", default_value = "")]
    pub container_id: String,

    /// Path of the container's network namespace
    #[arg(long, env = "CNI_NETNS")]
    pub netns: Option<String>,

    /// Interface name to create inside the namespace
    #[arg(long, env = "CNI_IFNAME", default_value = "eth0")]
    pub ifname: String,

    /// Extra arguments (`KEY=VALUE;...`)
    #[arg(long = "cni-args", env = "CNI_ARGS", default_value = "")]
    pub args: String,

    /// Plugin search path
    #[arg(long = "cni-path", env = "CNI_PATH")]
    pub path: Option<String>,
}

/// CNI operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CniCommand {
    /// Attach an interface
    Add,
    /// Detach an interface
    Del,
    /// Verify an attachment
    Check,
    /// Report supported versions
    Version,
}

impl Cli {
    /// Runtime parameters for the orchestrator
    #[must_use]
    pub fn invocation(&self) -> Invocation {
        Invocation {
            container_id: self.container_id.clone(),
            // Runtimes may export an empty CNI_NETNS on DEL
            netns: self
                .netns
                .as_deref()
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            if_name: self.ifname.clone(),
            args: self.args.clone(),
        }
    }
}
