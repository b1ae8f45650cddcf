//! Allocator client for macvnet
//!
//! Addresses, gateways and VLAN ids are owned by an external allocator.
//! This crate asks the pod metadata service which networks a pod may join,
//! asks the allocator for a lease in one of them and hands the lease back on
//! teardown. [`HttpAllocator`] talks to the real services, [`MockAllocator`]
//! stands in for them in tests.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod client;
pub mod http;
pub mod mock;
pub mod pod;

pub use client::AllocatorClient;
pub use http::HttpAllocator;
pub use mock::{AllocatorFault, MockAllocator};
pub use pod::{Pod, candidate_networks};

// Re-export commonly used types
pub use macvnet_core::{AllocationResult, AllocatorConfig, WorkloadIdentity};
