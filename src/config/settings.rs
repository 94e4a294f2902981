use super::ConfigError;
use launchguard_core::constants::PUMP_FUN_PROGRAM_ID;
use launchguard_ingest::StreamConfig;
use launchguard_scout::{AutopsyConfig, BundleConfig, FundingConfig};
use launchguard_stalker::RetentionConfig;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const CONFIG_PATH_ENV: &str = "LAUNCHGUARD_CONFIG";
pub const RPC_URL_ENV: &str = "LAUNCHGUARD_RPC_URL";
pub const WS_URL_ENV: &str = "LAUNCHGUARD_WS_URL";
pub const DEFAULT_CONFIG_PATH: &str = "config/launchguard.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub program: ProgramSettings,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub autopsy: AutopsyConfig,
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum spacing between RPC calls across all analysis tasks
    #[serde(default = "default_request_spacing_ms")]
    pub request_spacing_ms: u64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_http_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_request_spacing_ms() -> u64 {
    200
}

fn default_burst() -> u32 {
    1
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            commitment: default_commitment(),
            timeout_secs: default_timeout_secs(),
            request_spacing_ms: default_request_spacing_ms(),
            burst: default_burst(),
        }
    }
}

impl RpcSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig, ConfigError> {
        CommitmentConfig::from_str(&self.commitment).map_err(|_| ConfigError::InvalidValue {
            field: "rpc.commitment".to_string(),
            reason: format!("unknown commitment level {:?}", self.commitment),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSettings {
    #[serde(default = "default_target_program_id")]
    pub target_program_id: String,
}

fn default_target_program_id() -> String {
    PUMP_FUN_PROGRAM_ID.to_string()
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            target_program_id: default_target_program_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Wait between a launch notification and the block fetch
    #[serde(default = "default_propagation_delay_ms")]
    pub propagation_delay_ms: u64,
    #[serde(default = "default_block_fetch_attempts")]
    pub block_fetch_attempts: u32,
    /// How long a finished launch is remembered to ignore late duplicates
    #[serde(default = "default_tombstone_ttl_secs")]
    pub tombstone_ttl_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_propagation_delay_ms() -> u64 {
    3_000
}

fn default_block_fetch_attempts() -> u32 {
    3
}

fn default_tombstone_ttl_secs() -> u64 {
    600
}

fn default_prune_interval_secs() -> u64 {
    60
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            propagation_delay_ms: default_propagation_delay_ms(),
            block_fetch_attempts: default_block_fetch_attempts(),
            tombstone_ttl_secs: default_tombstone_ttl_secs(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

impl CoordinatorSettings {
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_millis(self.propagation_delay_ms)
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_secs)
    }

    /// Never zero; `tokio::time::interval` rejects a zero period.
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_signals_path")]
    pub signals_path: PathBuf,
    #[serde(default = "default_pending_checks_path")]
    pub pending_checks_path: PathBuf,
}

fn default_signals_path() -> PathBuf {
    PathBuf::from("data/signals.jsonl")
}

fn default_pending_checks_path() -> PathBuf {
    PathBuf::from("data/pending_checks.json")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            signals_path: default_signals_path(),
            pending_checks_path: default_pending_checks_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub default_filter: String,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_file_prefix() -> String {
    "launchguard.log".to_string()
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_prefix: default_file_prefix(),
            default_filter: default_filter(),
        }
    }
}

impl Settings {
    /// Loads from `LAUNCHGUARD_CONFIG` (or the default path), applies
    /// environment overrides and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut settings = Self::load_from_file(&path)?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults when the file does not exist.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(RPC_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.rpc.http_url = url;
        }
        if let Some(url) = lookup(WS_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.stream.primary_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_address("program.target_program_id", &self.program.target_program_id)?;
        for account in &self.bundle.tip_accounts {
            validate_address("bundle.tip_accounts", account)?;
        }
        for funder in &self.funding.excluded_funders {
            validate_address("funding.excluded_funders", funder)?;
        }

        validate_url("rpc.http_url", &self.rpc.http_url, &["http", "https"])?;
        validate_url("stream.primary_url", &self.stream.primary_url, &["ws", "wss"])?;
        for url in &self.stream.backup_urls {
            validate_url("stream.backup_urls", url, &["ws", "wss"])?;
        }

        // Blocks cannot be fetched at processed commitment.
        let commitment = self.rpc.commitment_config()?;
        if commitment.commitment == CommitmentLevel::Processed {
            return Err(invalid("rpc.commitment", "must be confirmed or finalized"));
        }

        if self.bundle.farm_threshold < 1 {
            return Err(invalid("bundle.farm_threshold", "must be at least 1"));
        }
        if self.funding.sample_size < 1 {
            return Err(invalid("funding.sample_size", "must be at least 1"));
        }
        if self.funding.history_limit < 1 {
            return Err(invalid("funding.history_limit", "must be at least 1"));
        }
        let holding = self.retention.holding_requirement;
        if !(holding > 0.0 && holding <= 1.0) {
            return Err(invalid(
                "retention.holding_requirement",
                "must be in (0, 1]",
            ));
        }
        if !(self.retention.dust_threshold >= 0.0) {
            return Err(invalid("retention.dust_threshold", "must not be negative"));
        }
        if self.retention.liveness.page_limit < 1 {
            return Err(invalid("retention.liveness.page_limit", "must be at least 1"));
        }
        if self.coordinator.block_fetch_attempts < 1 {
            return Err(invalid("coordinator.block_fetch_attempts", "must be at least 1"));
        }
        if self.rpc.burst < 1 {
            return Err(invalid("rpc.burst", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_address(field: &str, value: &str) -> Result<(), ConfigError> {
    Pubkey::from_str(value)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn validate_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field: field.to_string(),
        value: value.to_string(),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}
