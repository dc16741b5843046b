pub mod client;
pub mod types;

// -----------------------------------------------------------------------------

use crate::proxmox::types::*;
use async_trait::async_trait;
use pvedeploy_common::prelude::Result;

/// Operations of the Proxmox VE HTTP API consumed by the backend.
///
/// Every method maps to exactly one HTTP request. A non-200 answer comes back
/// as `Error::Proxmox`, a transport failure as `Error::Reqwest` and an
/// undecodable body as `Error::Protocol`.
///
#[async_trait]
pub trait Proxmox {
    async fn list_vms(&self, node: &str) -> Result<Vec<VmSummary>>;
    async fn vm_status(&self, vm: &VmRef) -> Result<String>;
    async fn start(&self, vm: &VmRef) -> Result<Option<UniqueProcessId>>;
    async fn shutdown(&self, vm: &VmRef) -> Result<Option<UniqueProcessId>>;
    async fn stop(&self, vm: &VmRef) -> Result<Option<UniqueProcessId>>;
    async fn create(&self, node: &str, params: &CreateVm) -> Result<Option<UniqueProcessId>>;
    async fn delete(&self, vm: &VmRef, params: &DeleteVm) -> Result<Option<UniqueProcessId>>;
    async fn storage_content(&self, node: &str, storage: &str) -> Result<Vec<StorageContent>>;
    async fn download_url(
        &self,
        node: &str,
        storage: &str,
        params: &DownloadUrl,
    ) -> Result<Option<UniqueProcessId>>;
    async fn task_status(&self, task: &TaskRef) -> Result<TaskStatus>;
    async fn agent_interfaces(&self, vm: &VmRef) -> Result<Vec<NetworkInterface>>;
}
