use crate::proxmox::Proxmox;
use pvedeploy_common::prelude::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lowest VMID Proxmox accepts for guests.
pub const FIRST_VM_ID: u32 = 100;

/// Returns the smallest id `>= FIRST_VM_ID` that is not in `ids`.
///
pub fn lowest_free_id(ids: &[u32]) -> u32 {
    let mut ids = ids.to_vec();
    ids.sort_unstable();

    let mut lowest = FIRST_VM_ID;
    for id in ids {
        if id < lowest {
            continue;
        }
        if id > lowest {
            break;
        }
        lowest += 1;
    }

    lowest
}

/// VMID granted to a caller.
///
/// Holds the node's allocation lock until dropped, the caller keeps it alive
/// until the create request that uses the id has returned.
///
#[derive(Debug)]
pub struct Reservation {
    pub id: u32,
    _guard: OwnedMutexGuard<()>,
}

/// Hands out free VMIDs per node.
///
/// Allocation reads the node's VM list and picks the lowest gap, which is
/// not transactional against the hypervisor. Callers sharing one allocator
/// are serialized per node, other processes can still race.
///
pub struct IdAllocator {
    proxmox: Arc<dyn Proxmox + Send + Sync>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdAllocator {
    pub fn new(proxmox: Arc<dyn Proxmox + Send + Sync>) -> Self {
        Self {
            proxmox,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Computes the next free VMID on `node`.
    ///
    /// Fails if the node cannot be listed, never falls back to a default id.
    ///
    pub async fn next_free_id(&self, node: &str) -> Result<u32> {
        let ids: Vec<u32> = self
            .proxmox
            .list_vms(node)
            .await?
            .into_iter()
            .map(|vm| vm.vmid)
            .collect();
        let id = lowest_free_id(&ids);
        tracing::debug!(target: "allocator", node, used = ids.len(), id, "Next free VMID");

        Ok(id)
    }

    /// Takes the node lock and computes the next free VMID under it.
    ///
    pub async fn reserve(&self, node: &str) -> Result<Reservation> {
        let lock = self.node_lock(node);
        let guard = lock.lock_owned().await;
        let id = self.next_free_id(node).await?;

        Ok(Reservation { id, _guard: guard })
    }

    fn node_lock(&self, node: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(node.to_owned())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
