use serde::{Deserialize, Serialize};

use centermesh::settings::{self, MeshSettings};
use centermesh::Result;

use crate::router::{default_routes, RouteEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Gateway settings: `config/gateway.toml`, then `GATEWAY__*` variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub server: ServerSettings,
    #[serde(flatten)]
    pub mesh: MeshSettings,
    /// Tried in order, first match wins
    pub routes: Vec<RouteEntry>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            mesh: MeshSettings::default(),
            routes: default_routes(),
        }
    }
}

impl GatewaySettings {
    pub fn load() -> Result<Self> {
        settings::load("config/gateway", "GATEWAY")
    }
}
