//! Runner configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How generated workflow code is launched.
///
/// `args` may contain `{entry}` (absolute path of the written entry file)
/// and `{dir}` (the session's private working directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub program: String,
    pub args: Vec<String>,
    pub entry_file: String,
    pub timeout_ms: u64,
    /// Combined stdout + stderr bytes recorded per session.
    pub max_output_bytes: usize,
    /// Events a subscriber may fall behind before it sees a gap.
    pub subscriber_buffer: usize,
    /// How long a finished session stays available to late subscribers.
    pub retention_ms: u64,
    /// Variables copied from the runner's own environment.
    pub env_allowlist: Vec<String>,
    /// Fixed variables set for every run.
    pub env: BTreeMap<String, String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            program: "bun".into(),
            args: vec!["run".into(), "{entry}".into()],
            entry_file: "main.ts".into(),
            timeout_ms: 60_000,
            max_output_bytes: 1024 * 1024,
            subscriber_buffer: 256,
            retention_ms: 300_000,
            env_allowlist: vec!["PATH".into()],
            env: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn render_args(&self, entry: &Path, dir: &Path) -> Vec<String> {
        let entry = entry.to_string_lossy();
        let dir = dir.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{entry}", &entry).replace("{dir}", &dir))
            .collect()
    }
}
