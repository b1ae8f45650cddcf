//! macvnet CNI plugin
//!
//! The binary reads the CNI environment and the network configuration, hands
//! them to a command handler and prints the result. The [`Orchestrator`]
//! underneath is generic over its link backend and allocator so that the
//! attach and detach rules can be exercised without a kernel or a network.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cli;
pub mod commands;
pub mod orchestrator;

pub use cli::{Cli, CniCommand};
pub use commands::{Reply, dispatch};
pub use orchestrator::{Invocation, Orchestrator};
