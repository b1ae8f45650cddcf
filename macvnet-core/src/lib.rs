//! macvnet core - shared types for the macvlan CNI plugin
//!
//! This crate holds everything the other crates agree on: the error type,
//! the network configuration read from stdin, the `CNI_ARGS` parser and the
//! CNI result encoding.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod args;
pub mod config;
pub mod error;
pub mod report;
pub mod types;

pub use args::CniArgs;
pub use config::{AllocatorConfig, AttachmentConfig, NetConf};
pub use error::{Error, Result};
pub use report::{CniError, CniResult, VersionInfo};
pub use types::{AllocationResult, InterfaceDescriptor, MacAddr, MacvlanMode, WorkloadIdentity};
