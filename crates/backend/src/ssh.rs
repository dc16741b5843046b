use crate::store::write_owner_only;
use pvedeploy_common::prelude::Result;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// Extra `ssh` arguments to reach a machine with its client key.
///
/// New host keys are accepted on first contact, the guest is freshly
/// installed and has no known host key yet.
///
pub fn ssh_flags(key_file: &Path) -> Vec<String> {
    vec![
        "-o".to_owned(),
        "StrictHostKeyChecking=accept-new".to_owned(),
        "-i".to_owned(),
        key_file.display().to_string(),
    ]
}

/// NixOS configuration fragment that trusts the client key for `root`.
///
pub fn physical_spec(public_key: &str) -> Value {
    json!({
        "users": {
            "extraUsers": {
                "root": {
                    "openssh": {
                        "authorizedKeys": {
                            "keys": [public_key]
                        }
                    }
                }
            }
        }
    })
}

/// Writes a private key to `<dir>/id-<machine>` readable by the owner only.
///
pub async fn write_private_key(dir: &Path, machine: &str, key: &SecretString) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(format!("id-{}", machine));
    write_owner_only(path.clone(), key.expose_secret().as_bytes().to_vec()).await?;

    Ok(path)
}
