use clap::Parser;
use pvedeploy_backend::allocator::IdAllocator;
use pvedeploy_backend::cli::{Cli, Command};
use pvedeploy_backend::config::{self, Config};
use pvedeploy_backend::guest::AgentGuest;
use pvedeploy_backend::host::Confirm;
use pvedeploy_backend::keys::Ed25519KeyGenerator;
use pvedeploy_backend::prelude::*;
use pvedeploy_backend::prompt::{AssumeYes, StdinConfirm};
use pvedeploy_backend::proxmox::client::ProxmoxClient;
use pvedeploy_backend::store::{JsonFileStore, RecordStore};
use pvedeploy_common::telemetry;
use std::sync::Arc;

/// The main entry point of the deployment tool.
///
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging.
    let subscriber = telemetry::get_subscriber(telemetry::level_from_verbosity(cli.verbose), std::io::stderr);
    telemetry::init_subscriber(subscriber)?;

    let credentials = match cli.credentials {
        Some(path) => path,
        None => config::default_credentials_path()?,
    };
    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => config::default_state_dir()?,
    };
    let config = Config::load(&credentials, &cli.profile)?;

    let proxmox: Arc<dyn Proxmox + Send + Sync> = Arc::new(ProxmoxClient::new(
        config.proxmox.url.clone(),
        config.proxmox.api_token.clone(),
    )?);
    let store = Arc::new(JsonFileStore::new(&state_dir));
    let confirm: Arc<dyn Confirm + Send + Sync> = match &cli.command {
        Command::Destroy { yes: true, .. } => Arc::new(AssumeYes),
        _ => Arc::new(StdinConfirm),
    };
    let context = MachineContext {
        allocator: Arc::new(IdAllocator::new(proxmox.clone())),
        store: store.clone(),
        confirm,
        keys: Arc::new(Ed25519KeyGenerator),
        guest: Arc::new(AgentGuest::new(proxmox.clone(), config.polling.guest)),
        boot_image: config.boot_image.clone(),
        polling: config.polling.clone(),
        key_dir: state_dir.join("keys"),
        proxmox,
    };

    match cli.command {
        Command::Create(args) => {
            let node = args
                .node
                .clone()
                .or_else(|| config.node.clone())
                .ok_or_else(|| Error::NotFound("target node, pass --node or set NODE".to_owned()))?;
            let mut definition = args.into_definition(node);
            if definition.ide2.is_none() {
                definition.ide2 = config
                    .boot_image
                    .as_ref()
                    .map(|image| format!("{},media=cdrom", image.volid()));
            }

            let mut machine = ProxmoxMachine::open(&definition.name, context).await?;
            machine.create(&definition).await?;
            print_record(&mut machine).await?;
        }
        Command::Start { name } => {
            let mut machine = ProxmoxMachine::open(&name, context).await?;
            machine.start().await?;
            print_record(&mut machine).await?;
        }
        Command::Stop { name, force } => {
            let mode = if force { StopMode::Forceful } else { StopMode::Graceful };
            let mut machine = ProxmoxMachine::open(&name, context).await?;
            machine.stop(mode).await?;
        }
        Command::Destroy { name, .. } => {
            let mut machine = ProxmoxMachine::open(&name, context).await?;
            if machine.destroy().await? {
                store.remove(&name).await?;
                tracing::info!(target: "machine", %name, "Record removed");
            }
        }
        Command::Check { name } => {
            let mut machine = ProxmoxMachine::open(&name, context).await?;
            let report = machine.check().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Show { name } => {
            let mut machine = ProxmoxMachine::open(&name, context).await?;
            print_record(&mut machine).await?;
        }
    }

    Ok(())
}

/// Prints what a host framework needs to reach the machine.
///
async fn print_record(machine: &mut ProxmoxMachine) -> Result<()> {
    let has_key = machine.record().client_key_pair.is_some();
    let ssh_flags = match has_key {
        true => Some(machine.ssh_flags().await?),
        false => None,
    };
    let summary = serde_json::json!({
        "name": machine.name(),
        "vm_id": machine.vm_id(),
        "node": machine.record().node_name,
        "address": machine.ssh_name(),
        "state": machine.state(),
        "ssh_flags": ssh_flags,
        "physical_spec": machine.physical_spec(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
