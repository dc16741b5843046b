use crate::image;
use crate::machine::record::{LifecycleState, VmDefinition, VmRecord};
use crate::machine::{CheckReport, MachineContext, Provisionable, Startable, StopMode, Stoppable};
use crate::poller::{self, StatusKind, WaitPolicy};
use crate::proxmox::types::{CreateVm, DeleteVm, TaskRef, UniqueProcessId, VmRef};
use crate::ssh;
use async_trait::async_trait;
use pvedeploy_common::prelude::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;

/// Lifecycle controller of one Proxmox VM.
///
/// Owns the machine's record and writes it back to the store after every
/// change. Fields derived from a hypervisor call are only recorded once that
/// call succeeded. Operations on one machine must not run concurrently.
///
#[derive(Debug)]
pub struct ProxmoxMachine {
    record: VmRecord,
    context: MachineContext,
    key_file: Option<PathBuf>,
    ssh_pinged: bool,
}

impl ProxmoxMachine {
    pub fn new(record: VmRecord, context: MachineContext) -> Self {
        Self {
            record,
            context,
            key_file: None,
            ssh_pinged: false,
        }
    }

    /// Loads the machine's record from the store, or starts an empty one.
    ///
    pub async fn open(name: &str, context: MachineContext) -> Result<Self> {
        let record = context
            .store
            .load(name)
            .await?
            .unwrap_or_else(|| VmRecord::new(name));

        Ok(Self::new(record, context))
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &VmRecord {
        &self.record
    }

    pub fn vm_id(&self) -> Option<u32> {
        self.record.vm_id
    }

    pub fn private_address(&self) -> Option<&str> {
        self.record.private_address.as_deref()
    }

    pub fn state(&self) -> LifecycleState {
        self.record.state
    }

    /// Whether the last start or check reached the guest over SSH.
    ///
    pub fn ssh_pinged(&self) -> bool {
        self.ssh_pinged
    }

    /// Host name to use for SSH.
    ///
    pub fn ssh_name(&self) -> Option<&str> {
        self.private_address()
    }

    /// How `self` reaches another Proxmox machine.
    ///
    pub fn address_to<'a>(&self, other: &'a ProxmoxMachine) -> Option<&'a str> {
        other.private_address()
    }

    /// NixOS fragment authorizing the client key, once the key exists.
    ///
    pub fn physical_spec(&self) -> Option<Value> {
        self.record
            .client_key_pair
            .as_ref()
            .map(|pair| ssh::physical_spec(&pair.public_key))
    }

    /// Writes the client private key to disk once per session.
    ///
    pub async fn private_key_file(&mut self) -> Result<PathBuf> {
        if let Some(path) = &self.key_file {
            return Ok(path.clone());
        }

        let pair = self
            .record
            .client_key_pair
            .as_ref()
            .ok_or_else(|| Error::NotReady(format!("client key of '{}'", self.record.name)))?;
        let path = ssh::write_private_key(&self.context.key_dir, &self.record.name, &pair.private_key).await?;
        self.key_file = Some(path.clone());

        Ok(path)
    }

    pub async fn ssh_flags(&mut self) -> Result<Vec<String>> {
        let key_file = self.private_key_file().await?;
        Ok(ssh::ssh_flags(&key_file))
    }

    // -------------------------------------------------------------------------

    async fn persist(&self) -> Result<()> {
        self.context.store.save(&self.record).await
    }

    fn vm_ref(&self) -> Result<VmRef> {
        self.record
            .vm_ref()
            .ok_or_else(|| Error::NotReady(format!("VM of '{}' was not created", self.record.name)))
    }

    async fn wait_for_task(&self, node: &str, upid: Option<UniqueProcessId>) -> Result<()> {
        match upid {
            Some(upid) => {
                let task = TaskRef::new(node, &upid);
                poller::wait_for_task(&self.context.proxmox, &task, &self.context.polling.task).await
            }
            None => Ok(()),
        }
    }

    /// Clears everything tied to a VM that no longer exists, in one update.
    ///
    async fn forget_vm(&mut self) -> Result<()> {
        self.record.clear_vm();
        self.ssh_pinged = false;
        if let Some(key_file) = self.key_file.take() {
            tokio::fs::remove_file(key_file).await.ok();
        }
        self.persist().await
    }

    async fn mark_stopped(&mut self) -> Result<()> {
        self.record.state = LifecycleState::Stopped;
        self.persist().await?;
        self.ssh_pinged = false;
        self.context.guest.reset_connection(&self.record.name);
        Ok(())
    }

    /// Issues a shutdown or a stop and waits until the VM reports stopped.
    ///
    async fn halt(&mut self, vm: &VmRef, mode: StopMode, policy: &WaitPolicy) -> Result<()> {
        let proxmox = &self.context.proxmox;
        let issued = match mode {
            StopMode::Graceful => {
                tracing::info!(target: "machine", %vm, "Shutting down...");
                proxmox.shutdown(vm).await
            }
            StopMode::Forceful => {
                tracing::info!(target: "machine", %vm, "Stopping...");
                proxmox.stop(vm).await
            }
        };
        if let Err(error) = issued {
            tracing::error!(target: "machine", %vm, %error, "Could not stop VM");
            return Err(error);
        }

        self.record.state = LifecycleState::Stopping;
        self.persist().await?;

        poller::wait_until(&self.context.proxmox, vm, StatusKind::Stopped, policy).await?;
        self.mark_stopped().await
    }

    /// Shuts the VM down, pulling the plug if it does not comply in time.
    ///
    async fn force_stop(&mut self, vm: &VmRef) -> Result<()> {
        let status_policy = self.context.polling.status;
        let grace = WaitPolicy::new(status_policy.interval, Some(self.context.polling.shutdown_grace));

        match self.halt(vm, StopMode::Graceful, &grace).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(target: "machine", %vm, %error, "Graceful shutdown failed, stopping VM");
                self.halt(vm, StopMode::Forceful, &status_policy).await
            }
        }
    }
}

#[async_trait]
impl Provisionable for ProxmoxMachine {
    #[tracing::instrument(level = "info", target = "machine", skip_all, fields(name = %self.record.name))]
    async fn create(&mut self, definition: &VmDefinition) -> Result<()> {
        if let Some(vm_id) = self.record.vm_id {
            tracing::debug!(target: "machine", vm_id, "VM already exists");
            return Ok(());
        }

        if self.record.client_key_pair.is_none() {
            let pair = self.context.keys.generate(&self.record.name)?;
            self.record.client_key_pair = Some(pair);
            self.persist().await?;
        }

        let node = definition.node.as_str();
        if let Some(boot_image) = &self.context.boot_image {
            image::ensure_image(&self.context.proxmox, node, boot_image, &self.context.polling.image).await?;
        }

        let reservation = self.context.allocator.reserve(node).await?;
        tracing::info!(target: "machine", node, vm_id = reservation.id, "Creating VM...");

        let params = CreateVm::new(definition, reservation.id);
        let upid = match self.context.proxmox.create(node, &params).await {
            Ok(upid) => upid,
            Err(error) => {
                tracing::error!(target: "machine", %error, "Failed to create VM");
                return Err(error);
            }
        };

        self.record.vm_id = Some(reservation.id);
        self.record.node_name = Some(node.to_owned());
        self.persist().await?;
        drop(reservation);

        self.wait_for_task(node, upid).await?;
        self.start().await
    }

    #[tracing::instrument(level = "info", target = "machine", skip_all, fields(name = %self.record.name))]
    async fn destroy(&mut self) -> Result<bool> {
        let Some(vm) = self.record.vm_ref() else {
            return Ok(true);
        };

        let question = format!("are you sure you want to destroy Proxmox VM ‘{}’?", self.record.name);
        if !self.context.confirm.confirm(&question).await? {
            tracing::warn!(target: "machine", %vm, "Destroy declined");
            return Ok(false);
        }

        tracing::info!(target: "machine", %vm, "Destroying VM...");

        match poller::poll_status(&self.context.proxmox, &vm).await? {
            StatusKind::Nonexistent => {
                if !poller::confirm_absent(&self.context.proxmox, &vm).await {
                    return Err(Error::NotReady(format!("status of VM {} is unavailable", vm)));
                }
                tracing::info!(target: "machine", %vm, "VM does not exist");
                self.forget_vm().await?;
                return Ok(true);
            }
            StatusKind::Stopped => self.mark_stopped().await?,
            StatusKind::Running | StatusKind::Unrecognized(_) => self.force_stop(&vm).await?,
        }

        let upid = match self.context.proxmox.delete(&vm, &DeleteVm::default()).await {
            Ok(upid) => upid,
            Err(error) => {
                tracing::error!(target: "machine", %vm, %error, "Could not delete VM");
                return Err(error);
            }
        };
        self.wait_for_task(&vm.node, upid).await?;

        self.forget_vm().await?;
        tracing::info!(target: "machine", %vm, "VM destroyed");

        Ok(true)
    }

    #[tracing::instrument(level = "info", target = "machine", skip_all, fields(name = %self.record.name))]
    async fn check(&mut self) -> Result<CheckReport> {
        let Some(vm) = self.record.vm_ref() else {
            tracing::info!(target: "machine", "VM does not exist");
            return Ok(CheckReport {
                exists: Some(false),
                state: self.record.state,
                ..Default::default()
            });
        };

        let status = match poller::poll_status(&self.context.proxmox, &vm).await {
            Ok(status) => Some(status),
            Err(error) => {
                tracing::warn!(target: "machine", %vm, %error, "Could not query VM status");
                None
            }
        };

        let mut report = CheckReport::default();
        match status {
            Some(StatusKind::Stopped) => {
                self.record.state = LifecycleState::Stopped;
                report.exists = Some(true);
                report.is_up = Some(false);
            }
            Some(StatusKind::Running) => {
                // A running VM invalidates a recorded stop.
                if matches!(self.record.state, LifecycleState::Stopped | LifecycleState::Stopping) {
                    self.record.state = LifecycleState::Unknown;
                }
                let reachable = match self.record.private_address.as_deref() {
                    Some(address) => self.context.guest.is_reachable(address).await?,
                    None => false,
                };
                self.ssh_pinged = reachable;
                report.exists = Some(true);
                report.is_up = Some(true);
                report.is_reachable = Some(reachable);
            }
            Some(StatusKind::Nonexistent) if poller::confirm_absent(&self.context.proxmox, &vm).await => {
                tracing::warn!(target: "machine", %vm, "VM is gone, forgetting it");
                self.forget_vm().await?;
                report.exists = Some(false);
                report.state = self.record.state;
                return Ok(report);
            }
            Some(StatusKind::Unrecognized(status)) => {
                tracing::error!(target: "machine", %vm, %status, "Unrecognized VM status");
                self.record.state = LifecycleState::Unknown;
                report.exists = Some(true);
            }
            Some(StatusKind::Nonexistent) | None => {
                self.record.state = LifecycleState::Unknown;
            }
        }

        self.persist().await?;
        report.state = self.record.state;

        Ok(report)
    }
}

#[async_trait]
impl Startable for ProxmoxMachine {
    #[tracing::instrument(level = "info", target = "machine", skip_all, fields(name = %self.record.name))]
    async fn start(&mut self) -> Result<()> {
        let vm = self.vm_ref()?;
        if poller::poll_status(&self.context.proxmox, &vm).await? == StatusKind::Running {
            tracing::debug!(target: "machine", %vm, "VM already running");
            return Ok(());
        }

        tracing::info!(target: "machine", %vm, "Starting...");
        let previous_address = self.record.private_address.clone();

        if let Err(error) = self.context.proxmox.start(&vm).await {
            tracing::error!(target: "machine", %vm, %error, "Could not start VM");
            return Err(error);
        }
        self.record.state = LifecycleState::Starting;
        self.persist().await?;

        self.ssh_pinged = false;
        let Some(address) = self.context.guest.wait_for_address(&vm).await? else {
            tracing::warn!(target: "machine", %vm, "Guest address unknown, not waiting for SSH");
            return Ok(());
        };
        self.record.private_address = Some(address.clone());
        self.persist().await?;

        if previous_address.as_ref().is_some_and(|previous| *previous != address) {
            tracing::warn!(
                target: "machine",
                previous = ?previous_address,
                current = %address,
                "IP address has changed, you may need to redeploy"
            );
        }

        self.context.guest.wait_for_ssh(&address).await?;
        self.ssh_pinged = true;

        Ok(())
    }
}

#[async_trait]
impl Stoppable for ProxmoxMachine {
    #[tracing::instrument(level = "info", target = "machine", skip_all, fields(name = %self.record.name, ?mode))]
    async fn stop(&mut self, mode: StopMode) -> Result<()> {
        if self.record.state == LifecycleState::Stopped {
            tracing::debug!(target: "machine", "VM already stopped");
            return Ok(());
        }

        let vm = self.vm_ref()?;
        match poller::poll_status(&self.context.proxmox, &vm).await? {
            StatusKind::Stopped => return self.mark_stopped().await,
            StatusKind::Nonexistent if poller::confirm_absent(&self.context.proxmox, &vm).await => {
                return Err(Error::NotFound(format!("VM {}", vm)));
            }
            StatusKind::Nonexistent => {
                return Err(Error::NotReady(format!("status of VM {} is unavailable", vm)));
            }
            StatusKind::Running | StatusKind::Unrecognized(_) => {}
        }

        let policy = self.context.polling.status;
        self.halt(&vm, mode, &policy).await
    }
}
