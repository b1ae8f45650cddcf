//! Macvlan link provisioning with pluggable backends
//!
//! This crate creates macvlan interfaces on a host uplink directly inside a
//! target network namespace, names them without colliding with anything
//! already there and tears them down again. Kernel access goes through the
//! [`LinkBackend`] trait, with a netlink implementation for production and an
//! in-memory one for tests.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod mock;
pub mod netlink;
pub mod provisioner;

pub use backend::{InterfaceAddress, LinkBackend, MacvlanRequest};
pub use mock::{LinkFault, MockLinkBackend, MockNamespace};
pub use netlink::NetlinkBackend;
pub use provisioner::Provisioner;

// Re-export commonly used types
pub use macvnet_core::{AttachmentConfig, InterfaceDescriptor, MacAddr, MacvlanMode};
