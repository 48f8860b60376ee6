//! Settings shared by every process of the mesh.
//!
//! Values are layered with the `config` crate: serde defaults, then an
//! optional TOML file, then environment variables using `__` as the nesting
//! separator (e.g. `GATEWAY__RPC__DEFAULT_TIMEOUT_MS=5000`).

use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::channel::{default_channels, ChannelConfig, ChannelRegistry};
use crate::connection::ConnectionConfig;
use crate::error::Result;

/// RPC client tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Deadline applied when a call does not name its own
    pub default_timeout_ms: u64,
    /// How often the sweeper purges overdue pending calls
    pub sweep_interval_ms: u64,
}

impl RpcSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            sweep_interval_ms: 10_000,
        }
    }
}

/// Broker, channel and RPC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    pub channels: Vec<ChannelConfig>,
    pub connection: ConnectionConfig,
    pub rpc: RpcSettings,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            connection: ConnectionConfig::default(),
            rpc: RpcSettings::default(),
        }
    }
}

impl MeshSettings {
    /// Build the read-only channel registry
    pub fn channel_registry(&self) -> Result<ChannelRegistry> {
        ChannelRegistry::new(self.channels.clone())
    }
}

/// Load settings of type `T` from `file` (optional, extension inferred) and
/// the environment variables starting with `env_prefix`.
pub fn load<T: DeserializeOwned>(file: &str, env_prefix: &str) -> Result<T> {
    let settings = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(settings.try_deserialize()?)
}
