pub mod allocator;
pub mod cli;
pub mod config;
pub mod guest;
pub mod host;
pub mod image;
pub mod keys;
pub mod machine;
pub mod poller;
pub mod prompt;
pub mod proxmox;
pub mod ssh;
pub mod store;

pub mod prelude {
    pub use pvedeploy_common::prelude::{Error, ProxmoxError, Result};

    pub use crate::machine::controller::ProxmoxMachine;
    pub use crate::machine::record::{LifecycleState, VmDefinition, VmRecord};
    pub use crate::machine::{CheckReport, MachineContext, Provisionable, Startable, StopMode, Stoppable};
    pub use crate::proxmox::Proxmox;
}
