pub mod controller;
pub mod record;

// -----------------------------------------------------------------------------

use crate::allocator::IdAllocator;
use crate::config::Polling;
use crate::host::{Confirm, Guest, KeyGenerator};
use crate::image::BootImage;
use crate::machine::record::{LifecycleState, VmDefinition};
use crate::proxmox::Proxmox;
use crate::store::RecordStore;
use async_trait::async_trait;
use pvedeploy_common::prelude::Result;
use serde::Serialize;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

/// A machine that can be brought into existence and removed again.
///
#[async_trait]
pub trait Provisionable {
    /// Creates the VM unless it already exists, then starts it.
    async fn create(&mut self, definition: &VmDefinition) -> Result<()>;

    /// Destroys the VM. Returns `false` if the operator declined.
    async fn destroy(&mut self) -> Result<bool>;

    /// Reconciles the record with what the hypervisor reports.
    async fn check(&mut self) -> Result<CheckReport>;
}

#[async_trait]
pub trait Startable {
    async fn start(&mut self) -> Result<()>;
}

#[async_trait]
pub trait Stoppable {
    async fn stop(&mut self, mode: StopMode) -> Result<()>;
}

/// How a VM is brought down.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// ACPI shutdown, the guest OS powers off by itself.
    Graceful,
    /// Immediate power off.
    Forceful,
}

/// Outcome of a check. `None` means it could not be determined.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub exists: Option<bool>,
    pub is_up: Option<bool>,
    pub is_reachable: Option<bool>,
    pub state: LifecycleState,
}

/// Everything a controller needs besides its own record.
///
/// Shared by all machines of a deployment, the allocator in particular has to
/// be shared for its per-node lock to mean anything.
///
#[derive(Clone)]
pub struct MachineContext {
    pub proxmox: Arc<dyn Proxmox + Send + Sync>,
    pub allocator: Arc<IdAllocator>,
    pub store: Arc<dyn RecordStore + Send + Sync>,
    pub confirm: Arc<dyn Confirm + Send + Sync>,
    pub keys: Arc<dyn KeyGenerator + Send + Sync>,
    pub guest: Arc<dyn Guest + Send + Sync>,
    pub boot_image: Option<BootImage>,
    pub polling: Polling,
    pub key_dir: PathBuf,
}

impl Debug for MachineContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineContext")
            .field("Proxmox", &"Arc<dyn Proxmox>")
            .field("BootImage", &self.boot_image)
            .field("Polling", &self.polling)
            .field("KeyDir", &self.key_dir)
            .finish()
    }
}
