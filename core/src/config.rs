use crate::{allocation::OverRecoveryPolicy, store::DEFAULT_BUSY_TIMEOUT_MS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// What to do when a proposed split leaves an unallocated remainder.
    #[serde(default)]
    pub over_recovery: OverRecoveryPolicy,
    /// How long a writer waits on a locked database before the operation
    /// fails with a concurrency conflict.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Recorded on every audit event.
    #[serde(default = "default_operator")]
    pub operator: String,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_operator() -> String {
    "system".into()
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            over_recovery: OverRecoveryPolicy::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            operator: default_operator(),
        }
    }
}

impl DeskConfig {
    /// Load from a JSON file.
    /// In tests, use DeskConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: DeskConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid desk config {path}: {e}"))?;
        Ok(config)
    }

    /// Minimal config for tests: strict remainder handling, short lock wait.
    pub fn default_test() -> Self {
        Self {
            over_recovery: OverRecoveryPolicy::Reject,
            busy_timeout_ms: 50,
            operator: "test-operator".into(),
        }
    }
}
