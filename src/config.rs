//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::keystore::ParticipantRole;
use crate::ledger::pumpportal::{PoolType, PUMPPORTAL_LOCAL_API_URL};
use crate::ledger::sol_to_lamports;
use crate::partition::ShareRequest;

/// Default config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "cycler.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub keystore: KeystoreConfig,
    #[serde(default)]
    pub participants: ParticipantsConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub trading: TradingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Redundant ledger endpoints, all interchangeable
    #[serde(default = "default_rpc_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Trade API that builds unsigned swap transactions
    #[serde(default = "default_trade_api_url")]
    pub trade_api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Ticker, also names the state document
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Directory holding one state document per token
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    /// Mint address of an existing token; when unset the keystore mint is used
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeystoreConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Usually supplied as CYCLER_KEYSTORE__SECRET
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantsConfig {
    #[serde(default)]
    pub snipers: u32,
    #[serde(default = "default_traders")]
    pub traders: u32,
    #[serde(default)]
    pub whales: u32,
    #[serde(default)]
    pub distributors: u32,
    #[serde(default)]
    pub dev: u32,
    /// Roles that take part in swap rounds
    #[serde(default = "default_active_roles")]
    pub active: Vec<ParticipantRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    /// Sum all participant shares must reach
    #[serde(default = "default_share_total")]
    pub total: f64,
    /// Allowed relative deviation from the mean share
    #[serde(default = "default_deviation")]
    pub deviation: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seed for share generation and round choice; token symbol when empty
    #[serde(default)]
    pub seed: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    /// Cycles executed per run
    #[serde(default = "default_cycle_count")]
    pub count: u32,
    /// Participants dispatched concurrently
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    /// Chance (percent) that a cycle after the first is a pump round
    #[serde(default = "default_pump_bias_pct")]
    pub pump_bias_pct: u32,
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_buy_min_sol")]
    pub buy_min_sol: f64,
    #[serde(default = "default_buy_max_sol")]
    pub buy_max_sol: f64,
    #[serde(default = "default_sell_min_pct")]
    pub sell_min_pct: f64,
    #[serde(default = "default_sell_max_pct")]
    pub sell_max_pct: f64,
    /// SOL every participant keeps for fees
    #[serde(default = "default_min_residual_sol")]
    pub min_residual_sol: f64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default = "default_priority_fee")]
    pub priority_fee_lamports: u64,
    #[serde(default)]
    pub pool: PoolType,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: default_rpc_endpoints(),
            timeout_ms: default_timeout_ms(),
            trade_api_url: default_trade_api_url(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            store_dir: default_store_dir(),
            mint: None,
            decimals: default_decimals(),
        }
    }
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            secret: String::new(),
        }
    }
}

impl Default for ParticipantsConfig {
    fn default() -> Self {
        Self {
            snipers: 0,
            traders: default_traders(),
            whales: 0,
            distributors: 0,
            dev: 0,
            active: default_active_roles(),
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            total: default_share_total(),
            deviation: default_deviation(),
            max_attempts: default_max_attempts(),
            seed: String::new(),
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            count: default_cycle_count(),
            group_size: default_group_size(),
            pump_bias_pct: default_pump_bias_pct(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            buy_min_sol: default_buy_min_sol(),
            buy_max_sol: default_buy_max_sol(),
            sell_min_pct: default_sell_min_pct(),
            sell_max_pct: default_sell_max_pct(),
            min_residual_sol: default_min_residual_sol(),
            slippage_bps: default_slippage_bps(),
            priority_fee_lamports: default_priority_fee(),
            pool: PoolType::default(),
        }
    }
}

impl ParticipantsConfig {
    /// Configured count for a role
    pub fn count(&self, role: ParticipantRole) -> u32 {
        match role {
            ParticipantRole::Sniper => self.snipers,
            ParticipantRole::Trader => self.traders,
            ParticipantRole::Whale => self.whales,
            ParticipantRole::Distributor => self.distributors,
            ParticipantRole::Dev => self.dev,
        }
    }

    /// Active roles in canonical order, without duplicates
    pub fn active_roles(&self) -> Vec<ParticipantRole> {
        ParticipantRole::ALL
            .into_iter()
            .filter(|role| self.active.contains(role))
            .collect()
    }

    /// Total participants taking part in rounds
    pub fn active_total(&self) -> u32 {
        self.active_roles().iter().map(|role| self.count(*role)).sum()
    }
}

impl TradingConfig {
    pub fn min_residual_lamports(&self) -> u64 {
        sol_to_lamports(self.min_residual_sol)
    }
}

// Default value functions
fn default_rpc_endpoints() -> Vec<String> {
    vec![std::env::var("RPC_ENDPOINT")
        .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())]
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_trade_api_url() -> String {
    PUMPPORTAL_LOCAL_API_URL.to_string()
}

fn default_symbol() -> String {
    "TOKEN".to_string()
}

fn default_store_dir() -> String {
    "state".to_string()
}

fn default_decimals() -> u8 {
    6
}

fn default_algorithm() -> String {
    "chacha20-poly1305".to_string()
}

fn default_traders() -> u32 {
    5
}

fn default_active_roles() -> Vec<ParticipantRole> {
    vec![ParticipantRole::Trader]
}

fn default_share_total() -> f64 {
    100.0
}

fn default_deviation() -> f64 {
    0.2
}

fn default_max_attempts() -> u32 {
    10_000
}

fn default_cycle_count() -> u32 {
    10
}

fn default_group_size() -> usize {
    3
}

fn default_pump_bias_pct() -> u32 {
    60
}

fn default_delay_min_ms() -> u64 {
    2_000
}

fn default_delay_max_ms() -> u64 {
    8_000
}

fn default_buy_min_sol() -> f64 {
    0.01
}

fn default_buy_max_sol() -> f64 {
    0.05
}

fn default_sell_min_pct() -> f64 {
    20.0
}

fn default_sell_max_pct() -> f64 {
    60.0
}

fn default_min_residual_sol() -> f64 {
    0.01
}

fn default_slippage_bps() -> u32 {
    2500 // 25%
}

fn default_priority_fee() -> u64 {
    100_000
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix CYCLER_)
            .add_source(
                config::Environment::with_prefix("CYCLER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rpc.endpoints")
                    .with_list_parse_key("participants.active")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoints.is_empty() {
            anyhow::bail!("rpc.endpoints cannot be empty");
        }

        for endpoint in self.rpc.endpoints.iter().chain([&self.rpc.trade_api_url]) {
            let parsed = url::Url::parse(endpoint)
                .with_context(|| format!("Invalid endpoint URL: {}", mask_url(endpoint)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("Endpoint must use http(s): {}", mask_url(endpoint));
            }
        }

        if self.token.symbol.trim().is_empty() {
            anyhow::bail!("token.symbol cannot be empty");
        }

        if let Some(mint) = &self.token.mint {
            mint.parse::<solana_sdk::pubkey::Pubkey>()
                .with_context(|| format!("Invalid token.mint: {}", mint))?;
        }

        if self.participants.active_total() == 0 {
            anyhow::bail!("No participants in the active roles");
        }

        self.share_request()
            .validate()
            .context("Invalid partition settings")?;

        if self.cycle.group_size == 0 {
            anyhow::bail!("cycle.group_size must be at least 1");
        }

        if self.cycle.pump_bias_pct > 100 {
            anyhow::bail!("cycle.pump_bias_pct cannot exceed 100");
        }

        if self.cycle.delay_min_ms > self.cycle.delay_max_ms {
            anyhow::bail!("cycle.delay_min_ms must not exceed cycle.delay_max_ms");
        }

        if self.trading.buy_min_sol <= 0.0 || self.trading.buy_min_sol > self.trading.buy_max_sol {
            anyhow::bail!("Buy range must be positive with buy_min_sol <= buy_max_sol");
        }

        if self.trading.sell_min_pct <= 0.0
            || self.trading.sell_min_pct > self.trading.sell_max_pct
            || self.trading.sell_max_pct > 100.0
        {
            anyhow::bail!("Sell range must satisfy 0 < sell_min_pct <= sell_max_pct <= 100");
        }

        if self.trading.min_residual_sol < 0.0 {
            anyhow::bail!("min_residual_sol cannot be negative");
        }

        if self.trading.slippage_bps > 10000 {
            anyhow::bail!("slippage_bps cannot exceed 10000 (100%)");
        }

        Ok(())
    }

    /// Path of this token's state document
    pub fn store_path(&self) -> PathBuf {
        Path::new(&self.token.store_dir).join(format!("{}.json", self.token.symbol))
    }

    /// Seed for deterministic draws
    pub fn partition_seed(&self) -> &str {
        if self.partition.seed.is_empty() {
            &self.token.symbol
        } else {
            &self.partition.seed
        }
    }

    /// Share generation request for the active participants
    pub fn share_request(&self) -> ShareRequest {
        ShareRequest {
            count: self.participants.active_total() as usize,
            total_sum: self.partition.total,
            deviation: self.partition.deviation,
            max_attempts: self.partition.max_attempts,
        }
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let endpoints: Vec<String> = self.rpc.endpoints.iter().map(|e| mask_url(e)).collect();
        let active: Vec<&str> = self
            .participants
            .active_roles()
            .iter()
            .map(|r| r.as_str())
            .collect();

        format!(
            r#"Configuration:
  RPC:
    endpoints: {:?}
    timeout: {}ms
    trade_api: {}
  Token:
    symbol: {}
    state: {}
    mint: {}
  Keystore:
    algorithm: {}
    secret: {}
  Participants:
    snipers/traders/whales/distributors/dev: {}/{}/{}/{}/{}
    active: {:?}
  Partition:
    total: {}
    deviation: {}
    max_attempts: {}
  Cycle:
    count: {}
    group_size: {}
    pump_bias: {}%
    delay: {}-{}ms
  Trading:
    buy: {}-{} SOL
    sell: {}-{}%
    min_residual: {} SOL
    slippage: {}bps
    priority_fee: {} lamports
"#,
            endpoints,
            self.rpc.timeout_ms,
            mask_url(&self.rpc.trade_api_url),
            self.token.symbol,
            self.store_path().display(),
            self.token.mint.as_deref().unwrap_or("(keystore)"),
            self.keystore.algorithm,
            if self.keystore.secret.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.participants.snipers,
            self.participants.traders,
            self.participants.whales,
            self.participants.distributors,
            self.participants.dev,
            active,
            self.partition.total,
            self.partition.deviation,
            self.partition.max_attempts,
            self.cycle.count,
            self.cycle.group_size,
            self.cycle.pump_bias_pct,
            self.cycle.delay_min_ms,
            self.cycle.delay_max_ms,
            self.trading.buy_min_sol,
            self.trading.buy_max_sol,
            self.trading.sell_min_pct,
            self.trading.sell_max_pct,
            self.trading.min_residual_sol,
            self.trading.slippage_bps,
            self.trading.priority_fee_lamports,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.slippage_bps, 2500);
        assert_eq!(config.participants.active_total(), 5);
        assert_eq!(config.partition_seed(), "TOKEN");
        assert_eq!(config.store_path(), Path::new("state").join("TOKEN.json"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[rpc]
endpoints = ["https://a.example.com", "https://b.example.com?api-key=abc"]

[token]
symbol = "CYC"

[participants]
traders = 2
whales = 1
active = ["trader", "whale"]

[cycle]
group_size = 2
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rpc.endpoints.len(), 2);
        assert_eq!(config.participants.active_total(), 3);
        assert_eq!(config.share_request().count, 3);
        assert_eq!(config.cycle.group_size, 2);
        assert_eq!(config.trading.pool, PoolType::Auto);

        let display = config.masked_display();
        assert!(display.contains("b.example.com?***"));
        assert!(!display.contains("abc"));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.rpc.endpoints.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.endpoints = vec!["not a url".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cycle.group_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trading.buy_min_sol = 0.5;
        config.trading.buy_max_sol = 0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cycle.pump_bias_pct = 101;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.partition.deviation = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.partition.max_attempts = 600_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_active_roles_dedup_and_order() {
        let mut config = Config::default();
        config.participants.active = vec![
            ParticipantRole::Whale,
            ParticipantRole::Trader,
            ParticipantRole::Whale,
        ];
        assert_eq!(
            config.participants.active_roles(),
            vec![ParticipantRole::Trader, ParticipantRole::Whale]
        );
    }

    #[test]
    fn test_secret_masked() {
        let mut config = Config::default();
        config.keystore.secret = "hunter2".into();
        let display = config.masked_display();
        assert!(!display.contains("hunter2"));
        assert!(display.contains("***"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(mask_url("https://api.example.com"), "https://api.example.com");
    }
}
