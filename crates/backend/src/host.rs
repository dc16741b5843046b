//! Collaborators the controller calls out to.
//!
//! The host framework provides these: asking the operator, generating keys,
//! finding and reaching the guest. Default implementations live in
//! [`crate::prompt`], [`crate::keys`] and [`crate::guest`].

use crate::machine::record::KeyPair;
use crate::proxmox::types::VmRef;
use async_trait::async_trait;
use pvedeploy_common::prelude::Result;

/// Asks the operator to confirm a destructive action.
///
#[async_trait]
pub trait Confirm {
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Generates the client key pair of a machine.
///
pub trait KeyGenerator {
    fn generate(&self, comment: &str) -> Result<KeyPair>;
}

/// Access to a guest once its VM is powered on.
///
#[async_trait]
pub trait Guest {
    /// Waits until the guest has a network address, `None` if none showed up.
    async fn wait_for_address(&self, vm: &VmRef) -> Result<Option<String>>;

    /// Waits until the guest accepts SSH connections.
    async fn wait_for_ssh(&self, address: &str) -> Result<()>;

    /// Single reachability probe, no waiting.
    async fn is_reachable(&self, address: &str) -> Result<bool>;

    /// Drops any cached management connection to the machine.
    fn reset_connection(&self, _machine: &str) {}
}
