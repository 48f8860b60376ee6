use serde::{Deserialize, Serialize};

use centermesh::settings::{self, MeshSettings};
use centermesh::{Result, WorkerConfig};

/// Worker settings: `config/worker.toml` (or `--config`), then `WORKER__*`
/// variables such as `WORKER__MAX_CONCURRENT_MESSAGES=20`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    #[serde(flatten)]
    pub mesh: MeshSettings,
    #[serde(flatten)]
    pub worker: WorkerConfig,
}

impl WorkerSettings {
    pub fn load(file: &str) -> Result<Self> {
        settings::load(file, "WORKER")
    }
}
