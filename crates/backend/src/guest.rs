use crate::host::Guest;
use crate::poller::WaitPolicy;
use crate::proxmox::Proxmox;
use crate::proxmox::types::{NetworkInterface, VmRef};
use async_trait::async_trait;
use pvedeploy_common::prelude::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

const SSH_PORT: u16 = 22;
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Picks the first non-loopback IPv4 address reported by the guest agent.
///
pub fn first_private_ipv4(interfaces: &[NetworkInterface]) -> Option<String> {
    interfaces
        .iter()
        .flat_map(|interface| interface.ip_addresses.iter())
        .filter(|address| address.kind == "ipv4")
        .filter_map(|address| address.address.parse::<Ipv4Addr>().ok())
        .find(|address| !address.is_loopback() && !address.is_link_local())
        .map(|address| address.to_string())
}

/// Finds guests through the QEMU guest agent and probes them over TCP.
///
/// The agent only answers once the guest OS has booted and started it, so
/// refusals from the agent endpoint are retried until the deadline.
///
pub struct AgentGuest {
    proxmox: Arc<dyn Proxmox + Send + Sync>,
    policy: WaitPolicy,
    ssh_port: u16,
}

impl AgentGuest {
    pub fn new(proxmox: Arc<dyn Proxmox + Send + Sync>, policy: WaitPolicy) -> Self {
        Self {
            proxmox,
            policy,
            ssh_port: SSH_PORT,
        }
    }

    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    async fn probe(&self, address: &str) -> bool {
        let Ok(ip) = address.parse::<IpAddr>() else {
            return false;
        };
        let connect = TcpStream::connect((ip, self.ssh_port));
        matches!(tokio::time::timeout(PROBE_TIMEOUT, connect).await, Ok(Ok(_)))
    }
}

#[async_trait]
impl Guest for AgentGuest {
    #[tracing::instrument(level = "info", target = "machine", skip(self), fields(%vm))]
    async fn wait_for_address(&self, vm: &VmRef) -> Result<Option<String>> {
        let start = Instant::now();

        loop {
            match self.proxmox.agent_interfaces(vm).await {
                Ok(interfaces) => {
                    if let Some(address) = first_private_ipv4(&interfaces) {
                        tracing::info!(target: "machine", %address, "Guest address found");
                        return Ok(Some(address));
                    }
                }
                Err(error) if error.is_rejection() => {
                    tracing::debug!(target: "machine", %error, "Guest agent not answering yet");
                }
                Err(error) => return Err(error),
            }

            if self.policy.check_deadline(start).is_err() {
                tracing::warn!(target: "machine", "No guest address reported");
                return Ok(None);
            }
            tokio::time::sleep(self.policy.interval).await;
        }
    }

    #[tracing::instrument(level = "info", target = "machine", skip(self))]
    async fn wait_for_ssh(&self, address: &str) -> Result<()> {
        let start = Instant::now();

        loop {
            if self.probe(address).await {
                return Ok(());
            }
            tracing::debug!(target: "machine", address, "SSH not reachable yet");

            self.policy.check_deadline(start).map_err(|error| match error {
                Error::Timeout(_) => Error::NotReady(format!("SSH on {}:{}", address, self.ssh_port)),
                error => error,
            })?;
            tokio::time::sleep(self.policy.interval).await;
        }
    }

    async fn is_reachable(&self, address: &str) -> Result<bool> {
        Ok(self.probe(address).await)
    }
}
