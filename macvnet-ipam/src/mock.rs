//! In-memory allocator for tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use macvnet_core::{AllocationResult, Error, Result, WorkloadIdentity};

use crate::client::AllocatorClient;

/// Allocator call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorFault {
    /// Pod metadata lookup
    Lookup,
    /// Lease allocation
    Allocate,
    /// Lease release
    Release,
}

/// Mock allocator for testing (no network)
///
/// Every lookup answers with the configured networks and every allocation
/// hands out the configured result, recording a lease for the workload.
///
/// # Example
/// ```
/// use macvnet_ipam::{AllocatorClient, MockAllocator};
/// use macvnet_core::WorkloadIdentity;
///
/// # async fn example() -> macvnet_core::Result<()> {
/// let allocator = MockAllocator::new();
/// allocator.set_pod_networks(vec!["app-a".to_string()]).await;
///
/// let pod = WorkloadIdentity::new("default", "web");
/// assert_eq!(allocator.lookup_pod_networks(&pod).await?, vec!["app-a"]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockAllocator {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    pod_networks: Vec<String>,
    allocation: Option<AllocationResult>,
    leases: HashMap<String, AllocationResult>,
    faults: HashSet<AllocatorFault>,
    lookup_count: usize,
    allocate_count: usize,
    release_count: usize,
}

impl MockAllocator {
    /// Create a new mock allocator with no networks and nothing to hand out
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Networks every lookup answers with
    pub async fn set_pod_networks(&self, networks: Vec<String>) {
        self.state.lock().await.pod_networks = networks;
    }

    /// Result every allocation hands out
    pub async fn set_allocation(&self, allocation: AllocationResult) {
        self.state.lock().await.allocation = Some(allocation);
    }

    /// Make a call fail
    pub async fn fail_on(&self, fault: AllocatorFault) {
        self.state.lock().await.faults.insert(fault);
    }

    /// Number of lookups made (for testing)
    pub async fn lookup_count(&self) -> usize {
        self.state.lock().await.lookup_count
    }

    /// Number of allocations made (for testing)
    pub async fn allocate_count(&self) -> usize {
        self.state.lock().await.allocate_count
    }

    /// Number of releases made (for testing)
    pub async fn release_count(&self) -> usize {
        self.state.lock().await.release_count
    }

    /// Whether the workload holds a lease
    pub async fn is_leased(&self, workload: &WorkloadIdentity) -> bool {
        self.state
            .lock()
            .await
            .leases
            .contains_key(&workload.to_string())
    }
}

impl Default for MockAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAllocator").finish_non_exhaustive()
    }
}

fn injected(operation: &str, workload: &WorkloadIdentity) -> Error {
    Error::allocation(operation, workload.to_string(), "503 Service Unavailable")
}

#[async_trait]
impl AllocatorClient for MockAllocator {
    async fn lookup_pod_networks(&self, workload: &WorkloadIdentity) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        state.lookup_count += 1;

        if state.faults.contains(&AllocatorFault::Lookup) {
            return Err(injected("lookup", workload));
        }

        Ok(state.pod_networks.clone())
    }

    async fn allocate(
        &self,
        workload: &WorkloadIdentity,
        networks: &[String],
    ) -> Result<AllocationResult> {
        let mut state = self.state.lock().await;
        state.allocate_count += 1;

        if state.faults.contains(&AllocatorFault::Allocate) {
            return Err(injected("allocate", workload));
        }

        let allocation = state
            .allocation
            .clone()
            .filter(|allocation| networks.contains(&allocation.app_net))
            .ok_or_else(|| {
                Error::allocation(
                    "allocate",
                    workload.to_string(),
                    format!("no free address in {networks:?}"),
                )
            })?;

        state
            .leases
            .insert(workload.to_string(), allocation.clone());

        tracing::debug!(
            pod = %workload,
            address = %allocation.ip_address,
            "Mock: Allocated address"
        );

        Ok(allocation)
    }

    async fn release(&self, workload: &WorkloadIdentity) -> Result<()> {
        let mut state = self.state.lock().await;
        state.release_count += 1;

        if state.faults.contains(&AllocatorFault::Release) {
            return Err(injected("release", workload));
        }

        let released = state.leases.remove(&workload.to_string()).is_some();
        tracing::debug!(pod = %workload, released, "Mock: Released allocation");

        Ok(())
    }
}
