use crate::proxmox::Proxmox;
use crate::proxmox::types::{TaskRef, TaskStatus, VmRef};
use derive_more::Display;
use pvedeploy_common::prelude::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Power status of a VM, normalized from what the status endpoint reports.
///
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum StatusKind {
    #[display("running")]
    Running,
    #[display("stopped")]
    Stopped,
    #[display("nonexistent")]
    Nonexistent,
    #[display("unrecognized ({_0})")]
    Unrecognized(String),
}

/// How often and for how long a wait loop polls.
///
/// `timeout = None` waits forever.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl WaitPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// Returns an error once `start` is older than the timeout.
    ///
    pub fn check_deadline(&self, start: Instant) -> Result<()> {
        let elapsed = start.elapsed();
        match self.timeout {
            Some(timeout) if elapsed > timeout => Err(Error::Timeout(elapsed.as_secs_f32())),
            _ => Ok(()),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Some(Duration::from_secs(600)))
    }
}

/// Queries the current power status of a VM.
///
/// Any non-200 answer means `Nonexistent`: Proxmox reports an unknown VMID
/// with an error status, and this cannot be told apart from other refusals
/// here. Transport and protocol failures are returned as errors.
///
pub async fn poll_status(
    proxmox_client: &Arc<dyn Proxmox + Send + Sync>,
    vm: &VmRef,
) -> Result<StatusKind> {
    let status = match proxmox_client.vm_status(vm).await {
        Ok(status) => status,
        Err(error) if error.is_rejection() => {
            tracing::debug!(target: "poller", %vm, %error, "Status endpoint refused, assuming nonexistent");
            return Ok(StatusKind::Nonexistent);
        }
        Err(error) => return Err(error),
    };

    Ok(match status.as_str() {
        "running" => StatusKind::Running,
        "stopped" => StatusKind::Stopped,
        _ => {
            tracing::error!(target: "poller", %vm, %status, "Invalid proxmox response: expected running or stopped");
            StatusKind::Unrecognized(status)
        }
    })
}

/// Returns `true` if the node lists its VMs and `vm` is not among them.
///
/// A failed listing proves nothing and yields `false`.
///
pub async fn confirm_absent(proxmox_client: &Arc<dyn Proxmox + Send + Sync>, vm: &VmRef) -> bool {
    match proxmox_client.list_vms(&vm.node).await {
        Ok(vms) => !vms.iter().any(|summary| summary.vmid == vm.id),
        Err(error) => {
            tracing::warn!(target: "poller", %vm, %error, "Could not list VMs to confirm absence");
            false
        }
    }
}

/// Polls a VM until it reports `target`.
///
/// Unrecognized statuses and refused status queries keep the loop going. A
/// VM that is confirmed gone while waiting is an error, as it can never
/// reach the target.
///
#[tracing::instrument(level = "info", target = "poller", skip(proxmox_client, policy), fields(%vm, %target))]
pub async fn wait_until(
    proxmox_client: &Arc<dyn Proxmox + Send + Sync>,
    vm: &VmRef,
    target: StatusKind,
    policy: &WaitPolicy,
) -> Result<()> {
    let start = Instant::now();

    loop {
        let status = poll_status(proxmox_client, vm).await?;
        tracing::debug!(target: "poller", %status, "[{}]", status);

        if status == target {
            return Ok(());
        }
        // The status endpoint also refuses transiently, only the listing
        // tells that the VM is really gone.
        if status == StatusKind::Nonexistent && confirm_absent(proxmox_client, vm).await {
            return Err(Error::NotFound(format!("VM {} vanished while waiting", vm)));
        }

        if let Err(error) = policy.check_deadline(start) {
            // Stuck in a status the backend has no name for.
            if let StatusKind::Unrecognized(status) = status {
                return Err(Error::Unrecognized(status));
            }
            return Err(error);
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Polls a Proxmox task until it is complete.
///
#[tracing::instrument(level = "debug", target = "poller", skip(proxmox_client, policy), fields(node = %task.node))]
pub async fn wait_for_task(
    proxmox_client: &Arc<dyn Proxmox + Send + Sync>,
    task: &TaskRef,
    policy: &WaitPolicy,
) -> Result<()> {
    let start = Instant::now();

    loop {
        match proxmox_client.task_status(task).await? {
            TaskStatus::Pending => {}
            TaskStatus::Completed => return Ok(()),
            TaskStatus::Failed(error) => return Err(Error::Any(error)),
        }

        policy.check_deadline(start)?;
        tokio::time::sleep(policy.interval).await;
    }
}
