use crate::proxmox::types::VmRef;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{Debug, Formatter};

/// Orchestration-level phase of a machine.
///
/// Loosely follows the hypervisor's power status, but only the controller
/// moves a record from one phase to another.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleState {
    #[default]
    Unknown,
    Starting,
    Stopping,
    Stopped,
    Missing,
}

/// SSH key pair injected into the guest's authorized keys.
///
/// Generated once per record and never rotated.
///
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyPair {
    #[serde(serialize_with = "expose")]
    pub private_key: SecretString,
    pub public_key: String,
}

impl Debug for KeyPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .finish()
    }
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Durable per-machine state.
///
/// # Fields
///
/// * `name`: Name of the declared machine.
/// * `vm_id`: Assigned VMID, `None` while the VM does not exist on the node.
/// * `node_name`: Node the VM was created on.
/// * `private_address`: Last known guest address.
/// * `client_key_pair`: Key pair whose public half is trusted by the guest.
/// * `state`: Lifecycle phase.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    pub name: String,
    #[serde(default)]
    pub vm_id: Option<u32>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub private_address: Option<String>,
    #[serde(default)]
    pub client_key_pair: Option<KeyPair>,
    #[serde(default)]
    pub state: LifecycleState,
}

impl VmRecord {
    /// Creates an empty record for a freshly declared machine.
    ///
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            vm_id: None,
            node_name: None,
            private_address: None,
            client_key_pair: None,
            state: LifecycleState::Unknown,
        }
    }

    /// Returns the VM reference if the VM was created.
    ///
    pub fn vm_ref(&self) -> Option<VmRef> {
        match (&self.node_name, self.vm_id) {
            (Some(node), Some(id)) => Some(VmRef::new(node, id)),
            _ => None,
        }
    }

    /// Forgets everything tied to the VM on the hypervisor.
    ///
    /// The key pair belongs to the record, not to the VM, and survives.
    ///
    pub fn clear_vm(&mut self) {
        self.vm_id = None;
        self.private_address = None;
        self.state = LifecycleState::Missing;
    }
}

/// Desired shape of a machine, as declared by the deployment.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDefinition {
    pub name: String,
    pub node: String,
    pub cores: u32,
    pub sockets: u32,
    pub memory: u32,
    pub net0: String,
    pub scsi0: String,
    pub scsihw: String,
    pub ide2: Option<String>,
}
