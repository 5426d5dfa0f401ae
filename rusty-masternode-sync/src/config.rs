//! Sync configuration, persisted with `confy` next to the node configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Network the node runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Mainnet,
    Testnet,
    Regtest,
}

impl NetworkKind {
    /// Maximum age of the chain tip for the node to consider itself current.
    pub fn max_tip_age_secs(self) -> u64 {
        match self {
            NetworkKind::Mainnet => 6 * 60 * 60,
            NetworkKind::Testnet | NetworkKind::Regtest => 0x7fff_ffff,
        }
    }

    /// Regtest runs the quick sync mode: no chain gating, no per-peer dedup.
    pub fn is_fast_sync(self) -> bool {
        matches!(self, NetworkKind::Regtest)
    }
}

impl Default for NetworkKind {
    fn default() -> Self {
        NetworkKind::Mainnet
    }
}

/// Configuration for masternode asset sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncParams {
    pub network: NetworkKind,
    /// Sync work runs on every Nth one-second tick; also the throttle of the
    /// blockchain sync check.
    pub tick_interval_secs: u64,
    /// A phase with no activity for this long either fails or moves on.
    pub timeout_secs: u64,
    /// Peers needed (and peers needed at our height) to call the chain synced.
    pub enough_peers: usize,
    pub failure_cooldown_secs: u64,
    /// Gap between two blockchain sync checks after which we assume the
    /// process was asleep.
    pub idle_reset_secs: u64,
    pub max_header_lag_blocks: u64,
    /// We run a masternode ourselves.
    pub masternode_mode: bool,
    pub fulfilled_request_expiry_secs: u64,
}

impl Default for SyncParams {
    fn default() -> Self {
        Self::for_network(NetworkKind::Mainnet)
    }
}

impl SyncParams {
    pub fn for_network(network: NetworkKind) -> Self {
        Self {
            network,
            tick_interval_secs: 6,
            timeout_secs: 30,
            enough_peers: 6,
            failure_cooldown_secs: 60,
            idle_reset_secs: 60 * 60,
            max_header_lag_blocks: 24 * 6,
            masternode_mode: false,
            fulfilled_request_expiry_secs: 60 * 60,
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.tick_interval_secs == 0 {
            return Err(SyncError::Config("tick_interval_secs must be positive".into()));
        }
        if self.timeout_secs < self.tick_interval_secs {
            return Err(SyncError::Config(format!(
                "timeout_secs ({}) is shorter than one tick ({})",
                self.timeout_secs, self.tick_interval_secs
            )));
        }
        if self.enough_peers == 0 {
            return Err(SyncError::Config("enough_peers must be at least 1".into()));
        }
        if self.idle_reset_secs <= self.tick_interval_secs {
            return Err(SyncError::Config(format!(
                "idle_reset_secs ({}) must exceed tick_interval_secs ({})",
                self.idle_reset_secs, self.tick_interval_secs
            )));
        }
        Ok(())
    }

    /// Load from the platform config directory, writing defaults on first run.
    pub fn load(app_name: &str, config_name: &str) -> SyncResult<Self> {
        let params: SyncParams = confy::load(app_name, config_name)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load_path(path: impl AsRef<Path>) -> SyncResult<Self> {
        let params: SyncParams = confy::load_path(path)?;
        params.validate()?;
        Ok(params)
    }

    pub fn store_path(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        confy::store_path(path, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = SyncParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.timeout_secs, 5 * params.tick_interval_secs);
        assert!(!params.network.is_fast_sync());
    }

    #[test]
    fn test_regtest_is_fast_mode() {
        let params = SyncParams::for_network(NetworkKind::Regtest);
        assert!(params.network.is_fast_sync());
        assert!(params.network.max_tip_age_secs() > NetworkKind::Mainnet.max_tip_age_secs());
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let params = SyncParams { tick_interval_secs: 0, ..SyncParams::default() };
        assert!(matches!(params.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_timeout_shorter_than_tick() {
        let params = SyncParams { timeout_secs: 3, ..SyncParams::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masternode-sync.toml");

        let params = SyncParams {
            masternode_mode: true,
            enough_peers: 3,
            ..SyncParams::for_network(NetworkKind::Testnet)
        };
        params.store_path(&path).unwrap();

        let loaded = SyncParams::load_path(&path).unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SyncParams::load_path(dir.path().join("fresh.toml")).unwrap();
        assert_eq!(loaded, SyncParams::default());
    }
}
