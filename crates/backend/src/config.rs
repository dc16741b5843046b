use crate::image::BootImage;
use crate::poller::WaitPolicy;
use pvedeploy_common::prelude::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PROFILE: &str = "default";

/// Resolved configuration of one deployment session.
///
#[derive(Debug)]
pub struct Config {
    pub proxmox: ProxmoxEnv,
    pub node: Option<String>,
    pub boot_image: Option<BootImage>,
    pub polling: Polling,
}

/// All settings required to talk to Proxmox.
///
#[derive(Debug, Clone)]
pub struct ProxmoxEnv {
    pub url: String,
    pub api_token: SecretString,
}

/// Timing of every wait loop the controller runs.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Polling {
    /// Power status waits (stop, shutdown).
    pub status: WaitPolicy,
    /// Boot image download.
    pub image: WaitPolicy,
    /// Proxmox tasks (create, delete).
    pub task: WaitPolicy,
    /// Guest address and SSH readiness.
    pub guest: WaitPolicy,
    /// How long a destroy waits for a graceful shutdown before pulling the plug.
    pub shutdown_grace: Duration,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            status: WaitPolicy::default(),
            image: WaitPolicy::new(Duration::from_secs(5), Some(Duration::from_secs(3600))),
            task: WaitPolicy::new(Duration::from_secs(1), Some(Duration::from_secs(300))),
            guest: WaitPolicy::new(Duration::from_secs(2), Some(Duration::from_secs(300))),
            shutdown_grace: Duration::from_secs(60),
        }
    }
}

/// One section of the credentials file.
///
/// Keys are accepted in the upper-case spelling of the credentials file and
/// in the lower-case spelling environment overrides produce.
///
#[derive(Debug, Default, Deserialize)]
struct Profile {
    #[serde(alias = "URL")]
    url: Option<String>,
    #[serde(alias = "API_TOKEN")]
    api_token: Option<SecretString>,
    #[serde(alias = "NODE")]
    node: Option<String>,
    #[serde(alias = "STORAGE")]
    storage: Option<String>,
    #[serde(alias = "ISO_URL")]
    iso_url: Option<String>,
    #[serde(alias = "ISO_FILENAME")]
    iso_filename: Option<String>,
    #[serde(alias = "ENSURE_ISO")]
    ensure_iso: Option<bool>,
    #[serde(alias = "POLL_INTERVAL")]
    poll_interval: Option<u64>,
    #[serde(alias = "STOP_TIMEOUT")]
    stop_timeout: Option<u64>,
    #[serde(alias = "IMAGE_TIMEOUT")]
    image_timeout: Option<u64>,
}

impl Profile {
    /// Fills every missing key from `fallback`.
    ///
    fn or(self, fallback: Profile) -> Profile {
        Profile {
            url: self.url.or(fallback.url),
            api_token: self.api_token.or(fallback.api_token),
            node: self.node.or(fallback.node),
            storage: self.storage.or(fallback.storage),
            iso_url: self.iso_url.or(fallback.iso_url),
            iso_filename: self.iso_filename.or(fallback.iso_filename),
            ensure_iso: self.ensure_iso.or(fallback.ensure_iso),
            poll_interval: self.poll_interval.or(fallback.poll_interval),
            stop_timeout: self.stop_timeout.or(fallback.stop_timeout),
            image_timeout: self.image_timeout.or(fallback.image_timeout),
        }
    }
}

impl Config {
    /// Loads the configuration from the credentials file and the environment.
    ///
    /// Environment variables `PROXMOX_<PROFILE>__<KEY>` override the file,
    /// a `.env` file is read first if there is one.
    ///
    /// # Arguments
    ///
    /// * `credentials`: Path of the INI credentials file.
    /// * `profile`: Section to use, missing keys fall back to `[default]`.
    ///
    pub fn load(credentials: &Path, profile: &str) -> Result<Self> {
        if let Err(error) = dotenv::dotenv() {
            tracing::debug!(target: "config", %error, "No .env loaded.");
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::from(credentials)
                    .format(config::FileFormat::Ini)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("PROXMOX")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config = Self::from_settings(settings, profile)?;
        tracing::info!(target: "config", ?config, "Configuration loaded.");

        Ok(config)
    }

    fn from_settings(settings: config::Config, profile: &str) -> Result<Self> {
        let mut sections = settings.try_deserialize::<HashMap<String, config::Value>>()?;
        let mut take = |name: &str| -> Result<Profile> {
            let value = sections
                .remove(name)
                .or_else(|| sections.remove(&name.to_lowercase()));
            Ok(value.map(|value| value.try_deserialize()).transpose()?.unwrap_or_default())
        };

        let selected = take(profile)?;
        let fallback = if profile == DEFAULT_PROFILE {
            Profile::default()
        } else {
            take(DEFAULT_PROFILE)?
        };

        Self::from_profile(selected.or(fallback), profile)
    }

    fn from_profile(profile: Profile, name: &str) -> Result<Self> {
        let url = profile
            .url
            .ok_or_else(|| Error::NotFound(format!("URL in credentials profile '{}'", name)))?;
        let api_token = profile
            .api_token
            .ok_or_else(|| Error::NotFound(format!("API_TOKEN in credentials profile '{}'", name)))?;

        let boot_image = profile.ensure_iso.unwrap_or(true).then(|| {
            let default = BootImage::default();
            BootImage {
                storage: profile.storage.unwrap_or(default.storage),
                url: profile.iso_url.unwrap_or(default.url),
                filename: profile.iso_filename.unwrap_or(default.filename),
            }
        });

        let mut polling = Polling::default();
        if let Some(seconds) = profile.poll_interval {
            polling.status.interval = Duration::from_secs(seconds);
            polling.task.interval = Duration::from_secs(seconds);
        }
        if let Some(seconds) = profile.stop_timeout {
            // Zero keeps polling until the VM stops, however long it takes.
            polling.status.timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        }
        if let Some(seconds) = profile.image_timeout {
            polling.image.timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        }

        Ok(Self {
            proxmox: ProxmoxEnv { url, api_token },
            node: profile.node,
            boot_image,
            polling,
        })
    }
}

/// Returns `$HOME/.proxmox/credentials`.
///
pub fn default_credentials_path() -> Result<PathBuf> {
    let home = std::env::var("HOME")?;
    Ok(Path::new(&home).join(".proxmox").join("credentials"))
}

/// Returns `$HOME/.proxmox/machines`, where records are kept by default.
///
pub fn default_state_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")?;
    Ok(Path::new(&home).join(".proxmox").join("machines"))
}
