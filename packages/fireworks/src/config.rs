use anyhow::{Context, Result};
use fireworks_hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / fireworks.toml / env vars)
// =============================================================================
//
//   fireworks.toml:  [hub]
//                    backlog_capacity = 50
//
//   env var:         FIREWORKS_HUB__BACKLOG_CAPACITY=50   (double underscore = nesting)

pub const CONFIG_FILE_NAME: &str = "fireworks.toml";

/// Named configuration presets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 127.0.0.1:8080, origin check off, logs to stdout
    Local,
    /// 0.0.0.0:80, origin check on, logs to a file
    Production,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub hub: HubFileConfig,
    #[serde(default)]
    pub assets: AssetsFileConfig,
}

/// Listener and HTTP surface (`[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Reject upgrades whose Origin does not match Host.
    #[serde(default)]
    pub check_origin: bool,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    /// Append logs here instead of stdout.
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            check_origin: false,
            static_dir: default_static_dir(),
            log_file: None,
        }
    }
}

/// Hub tunables (`[hub]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubFileConfig {
    #[serde(default = "default_backlog_capacity")]
    pub backlog_capacity: usize,
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
    #[serde(default = "default_idle_initial_secs")]
    pub idle_initial_secs: u64,
    #[serde(default = "default_idle_step_secs")]
    pub idle_step_secs: u64,
}

impl Default for HubFileConfig {
    fn default() -> Self {
        Self {
            backlog_capacity: default_backlog_capacity(),
            send_queue: default_send_queue(),
            idle_initial_secs: default_idle_initial_secs(),
            idle_step_secs: default_idle_step_secs(),
        }
    }
}

/// Image directory (`[assets]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetsFileConfig {
    #[serde(default = "default_assets_dir")]
    pub dir: String,
    #[serde(default = "default_asset")]
    pub default_asset: String,
}

impl Default for AssetsFileConfig {
    fn default() -> Self {
        Self {
            dir: default_assets_dir(),
            default_asset: default_asset(),
        }
    }
}

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;

fn default_static_dir() -> String {
    "static".to_string()
}
fn default_backlog_capacity() -> usize {
    HubConfig::default().backlog_capacity
}
fn default_send_queue() -> usize {
    HubConfig::default().send_queue
}
fn default_idle_initial_secs() -> u64 {
    fireworks_hub::DEFAULT_IDLE_INITIAL.as_secs()
}
fn default_idle_step_secs() -> u64 {
    fireworks_hub::DEFAULT_IDLE_STEP.as_secs()
}
fn default_assets_dir() -> String {
    "images".to_string()
}
fn default_asset() -> String {
    fireworks_hub::asset::DEFAULT_ASSET.to_string()
}

/// Build a figment that layers:
/// defaults → profile defaults → fireworks.toml → FIREWORKS_* env vars.
///
/// The CLI profile takes priority over the profile named in the file.
pub fn load_config(config_dir: &Path, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let config_file = config_dir.join(CONFIG_FILE_NAME);

    // Pass 1: peek at the profile
    let base = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(&config_file))
        .merge(Env::prefixed("FIREWORKS_").split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    // Pass 2: profile defaults sit between struct defaults and the file
    let figment = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Serialized::defaults(profile_to_file_config(profile.as_ref())))
        .merge(Toml::file(&config_file))
        .merge(Env::prefixed("FIREWORKS_").split("__"));

    // Keep the file's `profile` key from shadowing the one chosen above
    match profile {
        Some(profile) => figment.merge(Serialized::default("profile", profile)),
        None => figment,
    }
}

fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    match profile {
        Some(Profile::Local) => FileConfig {
            profile: Some(Profile::Local),
            server: ServerFileConfig {
                host: Some(DEFAULT_HOST.to_string()),
                port: Some(DEFAULT_PORT),
                check_origin: false,
                log_file: None,
                ..Default::default()
            },
            ..Default::default()
        },
        Some(Profile::Production) => FileConfig {
            profile: Some(Profile::Production),
            server: ServerFileConfig {
                host: Some("0.0.0.0".to_string()),
                port: Some(80),
                check_origin: true,
                log_file: Some("logs.txt".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
        None => FileConfig::default(),
    }
}

// =============================================================================
// Runtime config (derived from FileConfig, passed into the router)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub check_origin: bool,
    pub static_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub hub: HubConfig,
    pub idle_initial: Duration,
    pub idle_step: Duration,
    pub assets_dir: PathBuf,
    pub default_asset: String,
}

impl ServerConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        let host = fc.server.host.as_deref().unwrap_or(DEFAULT_HOST);
        let ip: IpAddr = host
            .parse()
            .with_context(|| format!("Invalid server host: {host}"))?;
        let port = fc.server.port.unwrap_or(DEFAULT_PORT);

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            check_origin: fc.server.check_origin,
            static_dir: PathBuf::from(&fc.server.static_dir),
            log_file: fc.server.log_file.as_ref().map(PathBuf::from),
            hub: HubConfig {
                backlog_capacity: fc.hub.backlog_capacity,
                send_queue: fc.hub.send_queue,
            },
            idle_initial: Duration::from_secs(fc.hub.idle_initial_secs),
            idle_step: Duration::from_secs(fc.hub.idle_step_secs),
            assets_dir: PathBuf::from(&fc.assets.dir),
            default_asset: fc.assets.default_asset.clone(),
        })
    }

    /// Apply `--host` / `--port` on top of the layered config.
    pub fn with_overrides(mut self, host: Option<&str>, port: Option<u16>) -> Result<Self> {
        if let Some(host) = host {
            let ip: IpAddr = host
                .parse()
                .with_context(|| format!("Invalid --host: {host}"))?;
            self.addr.set_ip(ip);
        }
        if let Some(port) = port {
            self.addr.set_port(port);
        }
        Ok(self)
    }
}
