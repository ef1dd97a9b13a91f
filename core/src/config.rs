use serde::{Deserialize, Serialize};

/// A complaint may be declined by deputies at most this many times before
/// an administrator has to route it by hand. Fixed policy, not tunable.
pub const MAX_REASSIGNMENTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandingConfig {
    /// Holds allowed per complaint before `HoldLimitExceeded`.
    pub hold_limit: u32,
    /// How often the ranking job recomputes deputy ranks.
    pub ranking_interval_secs: u64,
    /// Grants younger than this are never treated as orphans; an
    /// elevation may still be between its two inserts.
    pub orphan_grace_secs: u64,
    pub orphan_sweep_interval_secs: u64,
    /// Rank rows written between cancellation checks.
    pub ranking_batch_size: usize,
    /// SQLite busy timeout for every connection the engine opens.
    pub busy_timeout_ms: u64,
}

impl Default for StandingConfig {
    fn default() -> Self {
        Self {
            hold_limit:                 5,
            ranking_interval_secs:      900,
            orphan_grace_secs:          300,
            orphan_sweep_interval_secs: 3600,
            ranking_batch_size:         500,
            busy_timeout_ms:            5000,
        }
    }
}

impl StandingConfig {
    /// Load from a JSON file. Missing keys fall back to the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: StandingConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ranking_batch_size == 0 {
            anyhow::bail!("ranking_batch_size must be at least 1");
        }
        if self.ranking_interval_secs == 0 || self.orphan_sweep_interval_secs == 0 {
            anyhow::bail!("job intervals must be non-zero");
        }
        Ok(())
    }
}
