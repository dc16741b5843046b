use crate::machine::record::VmDefinition;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Envelope of every Proxmox API response.
///
/// Proxmox wraps its payload in a JSON object with a single `data` field.
/// The field may be `null`, e.g. when a listing has nothing to report.
///
/// # Example JSON
///
/// ```json
/// { "data": [ ... ] }
/// ```
///
#[derive(Deserialize)]
pub struct Response<T> {
    pub data: Option<T>,
}

/// Type-safe representation of a Proxmox Unique Process ID (`UPID`).
///
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct UniqueProcessId(String);

impl UniqueProcessId {
    /// Percent-encode the UPID to make it safe for use in a URL path.
    ///
    /// For example, characters like `:` and `@` will be encoded to
    /// `%3A` and `%40` respectively.
    ///
    pub fn encoded(&self) -> String {
        utf8_percent_encode(&self.0, NON_ALPHANUMERIC).to_string()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for UniqueProcessId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// -----------------------------------------------------------------------------

/// Entry of the `GET /nodes/{node}/qemu` listing.
///
#[derive(Debug, Clone, Deserialize)]
pub struct VmSummary {
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of `GET /nodes/{node}/qemu/{vmid}/status/current`.
///
/// The status is kept as a raw string, anything besides `running` and
/// `stopped` has to be reported rather than mapped to a known state.
///
#[derive(Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

/// Power status of a process as reported by the task endpoint.
///
#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stopped,
    Running,
}

/// High-level status of a long-running asynchronous task in Proxmox.
///
#[derive(Debug, PartialEq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed(String),
}

/// Raw response from the Proxmox task status endpoint.
///
/// # Fields
///
/// * `status`: Whether the task is still running.
/// * `exit_status`: Exit status of the task, present once the task has
///   stopped. Typically, `"OK"` on success.
///
#[derive(Deserialize)]
pub struct TaskResponse {
    pub status: Status,
    #[serde(rename = "exitstatus")]
    pub exit_status: Option<String>,
}

/// Entry of a storage content listing.
///
#[derive(Debug, Clone, Deserialize)]
pub struct StorageContent {
    pub volid: String,
}

/// Network interface reported by the QEMU guest agent.
///
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<IpAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpAddress {
    #[serde(rename = "ip-address")]
    pub address: String,
    #[serde(rename = "ip-address-type")]
    pub kind: String,
}

/// Payload of `GET /nodes/{node}/qemu/{vmid}/agent/network-get-interfaces`.
///
#[derive(Deserialize)]
pub struct AgentInterfaces {
    #[serde(default)]
    pub result: Vec<NetworkInterface>,
}

// -----------------------------------------------------------------------------

/// Reference to a specific virtual machine on a Proxmox node.
///
/// # Fields
///
/// * `node`: Name of the Proxmox node where the VM is located (e.g., "pve").
/// * `id`: Unique integer ID of the virtual machine (VMID).
///
#[derive(Debug, Clone, PartialEq)]
pub struct VmRef {
    pub node: String,
    pub id: u32,
}

impl VmRef {
    pub fn new(node: &str, id: u32) -> Self {
        Self {
            node: node.to_owned(),
            id,
        }
    }
}

impl Display for VmRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.node, self.id)
    }
}

/// Reference to a specific asynchronous task on a Proxmox node.
///
#[derive(Debug, Clone)]
pub struct TaskRef {
    pub node: String,
    pub upid: UniqueProcessId,
}

impl TaskRef {
    pub fn new(node: &str, upid: &UniqueProcessId) -> Self {
        Self {
            node: node.to_owned(),
            upid: upid.clone(),
        }
    }
}

// -----------------------------------------------------------------------------

/// Form parameters of `POST /nodes/{node}/qemu`.
///
/// The VM is created powered off (`start = 0`) with the guest agent enabled,
/// the controller starts it separately.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateVm {
    pub vmid: u32,
    pub name: String,
    pub agent: u8,
    pub ostype: &'static str,
    pub cores: u32,
    pub sockets: u32,
    pub memory: u32,
    pub net0: String,
    pub scsi0: String,
    pub scsihw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ide2: Option<String>,
    pub start: u8,
}

impl CreateVm {
    pub fn new(definition: &VmDefinition, vmid: u32) -> Self {
        Self {
            vmid,
            name: definition.name.clone(),
            agent: 1,
            ostype: "l26",
            cores: definition.cores,
            sockets: definition.sockets,
            memory: definition.memory,
            net0: definition.net0.clone(),
            scsi0: definition.scsi0.clone(),
            scsihw: definition.scsihw.clone(),
            ide2: definition.ide2.clone(),
            start: 0,
        }
    }
}

/// Query parameters of `DELETE /nodes/{node}/qemu/{vmid}`.
///
#[derive(Debug, Clone, Serialize)]
pub struct DeleteVm {
    pub purge: u8,
    #[serde(rename = "destroy-unreferenced-disks")]
    pub destroy_unreferenced_disks: u8,
}

impl Default for DeleteVm {
    fn default() -> Self {
        Self {
            purge: 1,
            destroy_unreferenced_disks: 1,
        }
    }
}

/// Form parameters of `POST /nodes/{node}/storage/{storage}/download-url`.
///
#[derive(Debug, Clone, Serialize)]
pub struct DownloadUrl {
    pub url: String,
    pub filename: String,
    pub content: &'static str,
}

impl DownloadUrl {
    pub fn iso(url: &str, filename: &str) -> Self {
        Self {
            url: url.to_owned(),
            filename: filename.to_owned(),
            content: "iso",
        }
    }
}
