use crate::poller::WaitPolicy;
use crate::proxmox::Proxmox;
use crate::proxmox::types::{DownloadUrl, TaskRef, TaskStatus};
use pvedeploy_common::prelude::{Error, Result};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_STORAGE: &str = "local";
pub const DEFAULT_ISO_URL: &str =
    "https://nixops-proxmox.s3.us-west-2.amazonaws.com/nixos-21.05.3896.b0274abf850-x86_64-linux.iso";
pub const DEFAULT_ISO_FILENAME: &str = "nixos-21.05.3896.b0274abf850-x86_64-linux.iso";

/// Installer ISO that has to be present on a node before VMs boot from it.
///
#[derive(Debug, Clone, PartialEq)]
pub struct BootImage {
    pub storage: String,
    pub url: String,
    pub filename: String,
}

impl BootImage {
    /// Volume id under which Proxmox lists the image once downloaded.
    ///
    pub fn volid(&self) -> String {
        format!("{}:iso/{}", self.storage, self.filename)
    }
}

impl Default for BootImage {
    fn default() -> Self {
        Self {
            storage: DEFAULT_STORAGE.to_owned(),
            url: DEFAULT_ISO_URL.to_owned(),
            filename: DEFAULT_ISO_FILENAME.to_owned(),
        }
    }
}

/// Returns whether the node's storage already lists the image.
///
/// A refused listing counts as "not there yet".
///
pub async fn has_image(
    proxmox_client: &Arc<dyn Proxmox + Send + Sync>,
    node: &str,
    image: &BootImage,
) -> Result<bool> {
    let content = match proxmox_client.storage_content(node, &image.storage).await {
        Ok(content) => content,
        Err(error) if error.is_rejection() => {
            tracing::debug!(target: "image", node, %error, "Storage listing refused");
            return Ok(false);
        }
        Err(error) => return Err(error),
    };

    let volid = image.volid();
    Ok(content.iter().any(|entry| entry.volid == volid))
}

/// Makes sure the boot image exists on `node`, downloading it if missing.
///
/// The node fetches the image itself. At most one download request is
/// issued, afterwards the storage is polled until the image shows up. A
/// failed download task ends the wait early.
///
#[tracing::instrument(level = "info", target = "image", skip(proxmox_client, image, policy), fields(volid = %image.volid()))]
pub async fn ensure_image(
    proxmox_client: &Arc<dyn Proxmox + Send + Sync>,
    node: &str,
    image: &BootImage,
    policy: &WaitPolicy,
) -> Result<()> {
    let start = Instant::now();
    let mut downloading = false;
    let mut download_task: Option<TaskRef> = None;

    loop {
        if has_image(proxmox_client, node, image).await? {
            tracing::debug!(target: "image", "Boot image present");
            return Ok(());
        }

        if !downloading {
            tracing::info!(target: "image", "ISO not found, uploading to Proxmox node...");
            let params = DownloadUrl::iso(&image.url, &image.filename);
            let upid = proxmox_client
                .download_url(node, &image.storage, &params)
                .await?;
            download_task = upid.map(|upid| TaskRef::new(node, &upid));
            downloading = true;
        } else if let Some(task) = &download_task {
            if let TaskStatus::Failed(exit_status) = proxmox_client.task_status(task).await? {
                tracing::error!(target: "image", %exit_status, "Download task failed");
                return Err(Error::Any(format!("download of {} failed: {}", image.url, exit_status)));
            }
        }

        policy.check_deadline(start)?;
        tokio::time::sleep(policy.interval).await;
    }
}
