//! Allocator client trait

use async_trait::async_trait;

use macvnet_core::{AllocationResult, Result, WorkloadIdentity};

/// Trait for allocator clients
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait AllocatorClient: Send + Sync {
    /// Networks the workload may be attached to, in order of preference
    ///
    /// # Errors
    /// Returns an allocation error if the metadata service cannot be queried
    async fn lookup_pod_networks(&self, workload: &WorkloadIdentity) -> Result<Vec<String>>;

    /// Lease an address for the workload in one of `networks`
    ///
    /// Not idempotent: every successful call is a new lease.
    ///
    /// # Errors
    /// Returns an allocation error if the allocator refuses or fails
    async fn allocate(
        &self,
        workload: &WorkloadIdentity,
        networks: &[String],
    ) -> Result<AllocationResult>;

    /// Hand the workload's lease back
    ///
    /// Releasing a lease the allocator does not know about is not an error.
    ///
    /// # Errors
    /// Returns an allocation error if the allocator fails
    async fn release(&self, workload: &WorkloadIdentity) -> Result<()>;
}
