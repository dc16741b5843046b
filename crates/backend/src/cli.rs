use crate::machine::record::VmDefinition;
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(
    name = "pvedeploy",
    version = "0.1.0",
    about = "Provisions and controls NixOS virtual machines on a Proxmox node"
)]
pub struct Cli {
    #[arg(short, long, help = "Credentials profile", env = "PVEDEPLOY_PROFILE", default_value = "default")]
    pub profile: String,
    #[arg(long, help = "Path of the credentials file [default: ~/.proxmox/credentials]", env = "PVEDEPLOY_CREDENTIALS")]
    pub credentials: Option<PathBuf>,
    #[arg(long, help = "Directory of machine records [default: ~/.proxmox/machines]", env = "PVEDEPLOY_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Log more, repeat for even more")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Creates the VM if it does not exist yet and starts it.
    Create(CreateArgs),
    /// Starts the VM.
    Start { name: String },
    /// Shuts the VM down.
    Stop {
        name: String,
        #[arg(long, help("Power off immediately instead of an ACPI shutdown"))]
        force: bool,
    },
    /// Stops and deletes the VM with its disks.
    Destroy {
        name: String,
        #[arg(short, long, help("Do not ask for confirmation"))]
        yes: bool,
    },
    /// Compares the record with what the node reports.
    Check { name: String },
    /// Prints the record and the SSH flags to reach the machine.
    Show { name: String },
}

#[derive(Debug, clap::Args)]
pub struct CreateArgs {
    pub name: String,
    #[arg(long, help = "Target node, falls back to NODE of the profile")]
    pub node: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub cores: u32,
    #[arg(long, default_value_t = 1)]
    pub sockets: u32,
    #[arg(long, help = "Memory in MiB", default_value_t = 2048)]
    pub memory: u32,
    #[arg(long, default_value = "virtio,bridge=vmbr0")]
    pub net0: String,
    #[arg(long, help = "System disk, e.g. local-lvm:16")]
    pub scsi0: String,
    #[arg(long, default_value = "virtio-scsi-pci")]
    pub scsihw: String,
    #[arg(long, help = "CD-ROM drive, defaults to the boot image when one is ensured")]
    pub ide2: Option<String>,
}

impl CreateArgs {
    /// Builds the machine definition, `node` is the resolved target node.
    ///
    pub fn into_definition(self, node: String) -> VmDefinition {
        VmDefinition {
            name: self.name,
            node,
            cores: self.cores,
            sockets: self.sockets,
            memory: self.memory,
            net0: self.net0,
            scsi0: self.scsi0,
            scsihw: self.scsihw,
            ide2: self.ide2,
        }
    }
}
