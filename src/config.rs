//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::gateway::BucketConfig;
use crate::types::TransactionQuery;

/// Upstream keys used by the rate limiter
pub const UPSTREAM_HELIUS: &str = "helius";
pub const UPSTREAM_SOLANA_RPC: &str = "solana_rpc";
pub const UPSTREAM_ETHERSCAN: &str = "etherscan";
pub const UPSTREAM_DEXSCREENER: &str = "dexscreener";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub evm: EvmConfig,
    #[serde(default)]
    pub dexscreener: DexScreenerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<String, BucketConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub rpc_endpoint: String,
    #[serde(default = "default_helius_api_key")]
    pub helius_api_key: String,
    #[serde(default = "default_helius_base_url")]
    pub helius_base_url: String,
    /// Helius RPC host serving the DAS `getTokenAccounts` method
    #[serde(default = "default_das_endpoint")]
    pub das_endpoint: String,
    /// Pages of 1000 token accounts scanned per holder lookup
    #[serde(default = "default_holder_scan_pages")]
    pub holder_scan_pages: u32,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: default_rpc_endpoint(),
            helius_api_key: default_helius_api_key(),
            helius_base_url: default_helius_base_url(),
            das_endpoint: default_das_endpoint(),
            holder_scan_pages: default_holder_scan_pages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    /// Etherscan v2 multichain endpoint
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,
    #[serde(default = "default_etherscan_api_key")]
    pub api_key: String,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            explorer_url: default_explorer_url(),
            api_key: default_etherscan_api_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexScreenerConfig {
    #[serde(default = "default_dexscreener_url")]
    pub base_url: String,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        Self {
            base_url: default_dexscreener_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total time budget for retrying transient failures of one call
    #[serde(default = "default_max_retry_elapsed_ms")]
    pub max_retry_elapsed_ms: u64,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retry_elapsed_ms: default_max_retry_elapsed_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_top_traders_ttl_secs")]
    pub top_traders_ttl_secs: u64,
    #[serde(default = "default_holders_ttl_secs")]
    pub holders_ttl_secs: u64,
    #[serde(default = "default_pair_ttl_secs")]
    pub pair_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            top_traders_ttl_secs: default_top_traders_ttl_secs(),
            holders_ttl_secs: default_holders_ttl_secs(),
            pair_ttl_secs: default_pair_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Holders enriched concurrently when computing top traders
    #[serde(default = "default_trader_batch_size")]
    pub trader_batch_size: usize,
    /// Concurrent transaction fetches in drill-down paths
    #[serde(default = "default_transaction_batch_size")]
    pub transaction_batch_size: usize,
    /// Accounts per batched metadata/owner lookup
    #[serde(default = "default_account_batch_size")]
    pub account_batch_size: usize,
    #[serde(default = "default_holder_limit")]
    pub holder_limit: usize,
    #[serde(default = "default_min_common_tokens")]
    pub min_common_tokens: usize,
    #[serde(default = "default_max_common_tokens")]
    pub max_common_tokens: usize,
    #[serde(default = "default_common_trader_cap")]
    pub common_trader_cap: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trader_batch_size: default_trader_batch_size(),
            transaction_batch_size: default_transaction_batch_size(),
            account_batch_size: default_account_batch_size(),
            holder_limit: default_holder_limit(),
            min_common_tokens: default_min_common_tokens(),
            max_common_tokens: default_max_common_tokens(),
            common_trader_cap: default_common_trader_cap(),
            max_pages: default_max_pages(),
            page_size: default_page_size(),
        }
    }
}

impl AnalysisConfig {
    pub fn transaction_query(&self) -> TransactionQuery {
        TransactionQuery {
            max_pages: self.max_pages,
            page_size: self.page_size,
        }
    }
}

fn default_rpc_endpoint() -> String {
    std::env::var("SOLANA_RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_helius_api_key() -> String {
    std::env::var("HELIUS_API_KEY").unwrap_or_default()
}

fn default_helius_base_url() -> String {
    "https://api.helius.xyz".into()
}

fn default_das_endpoint() -> String {
    "https://mainnet.helius-rpc.com".into()
}

fn default_holder_scan_pages() -> u32 {
    5
}

fn default_explorer_url() -> String {
    "https://api.etherscan.io/v2/api".into()
}

fn default_etherscan_api_key() -> String {
    std::env::var("ETHERSCAN_API_KEY").unwrap_or_default()
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retry_elapsed_ms() -> u64 {
    5_000
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_rate_limits() -> HashMap<String, BucketConfig> {
    let mut limits = HashMap::new();
    limits.insert(
        UPSTREAM_HELIUS.to_string(),
        BucketConfig {
            capacity: 10.0,
            refill_per_sec: 10.0,
        },
    );
    limits.insert(
        UPSTREAM_SOLANA_RPC.to_string(),
        BucketConfig {
            capacity: 40.0,
            refill_per_sec: 40.0,
        },
    );
    limits.insert(
        UPSTREAM_ETHERSCAN.to_string(),
        BucketConfig {
            capacity: 5.0,
            refill_per_sec: 5.0,
        },
    );
    limits.insert(
        UPSTREAM_DEXSCREENER.to_string(),
        BucketConfig {
            capacity: 60.0,
            refill_per_sec: 5.0,
        },
    );
    limits
}

fn default_cache_capacity() -> usize {
    crate::gateway::DEFAULT_CACHE_CAPACITY
}

fn default_top_traders_ttl_secs() -> u64 {
    120
}

fn default_holders_ttl_secs() -> u64 {
    300
}

fn default_pair_ttl_secs() -> u64 {
    60
}

fn default_trader_batch_size() -> usize {
    5
}

fn default_transaction_batch_size() -> usize {
    8
}

fn default_account_batch_size() -> usize {
    100
}

fn default_holder_limit() -> usize {
    50
}

fn default_min_common_tokens() -> usize {
    2
}

fn default_max_common_tokens() -> usize {
    10
}

fn default_common_trader_cap() -> usize {
    100
}

fn default_max_pages() -> u32 {
    5
}

fn default_page_size() -> u32 {
    100
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix INTEL_)
            .add_source(
                config::Environment::with_prefix("INTEL")
                    .separator("__")
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
        let analysis = &self.analysis;

        if analysis.trader_batch_size == 0
            || analysis.transaction_batch_size == 0
            || analysis.account_batch_size == 0
        {
            anyhow::bail!("batch sizes must be positive");
        }

        if analysis.holder_limit == 0 || analysis.holder_limit > 1000 {
            anyhow::bail!(
                "holder_limit must be between 1 and 1000, got {}",
                analysis.holder_limit
            );
        }

        if analysis.min_common_tokens < 2
            || analysis.max_common_tokens > 10
            || analysis.min_common_tokens > analysis.max_common_tokens
        {
            anyhow::bail!(
                "common token bounds must satisfy 2 <= min <= max <= 10, got {}..={}",
                analysis.min_common_tokens,
                analysis.max_common_tokens
            );
        }

        if analysis.max_pages == 0 || analysis.page_size == 0 {
            anyhow::bail!("max_pages and page_size must be positive");
        }

        for (upstream, bucket) in &self.rate_limits {
            if bucket.capacity < 1.0 || bucket.refill_per_sec <= 0.0 {
                anyhow::bail!(
                    "rate limit for {} needs capacity >= 1 and refill_per_sec > 0",
                    upstream
                );
            }
        }

        if self.cache.capacity == 0 {
            anyhow::bail!("cache capacity must be positive");
        }

        if self.solana.helius_api_key.is_empty() {
            tracing::warn!("No Helius API key configured - Solana transaction history will be empty");
        }
        if self.evm.api_key.is_empty() {
            tracing::warn!("No Etherscan API key configured - EVM providers will return no data");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let mut limits: Vec<_> = self.rate_limits.iter().collect();
        limits.sort_by(|a, b| a.0.cmp(b.0));
        let limits = limits
            .iter()
            .map(|(k, v)| format!("    {}: capacity={} refill={}/s", k, v.capacity, v.refill_per_sec))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Configuration:
  Solana:
    rpc_endpoint: {}
    helius_api_key: {}
    das_endpoint: {} (scan {} pages)
  EVM:
    explorer_url: {}
    api_key: {}
  DexScreener:
    base_url: {}
  HTTP:
    timeout: {}ms
  Rate limits:
{}
  Cache:
    capacity: {}
    top_traders_ttl: {}s
  Analysis:
    holder_limit: {}
    batch sizes: traders={} transactions={} accounts={}
    common tokens: {}..={} (cap {})
"#,
            mask_url(&self.solana.rpc_endpoint),
            mask_secret(&self.solana.helius_api_key),
            self.solana.das_endpoint,
            self.solana.holder_scan_pages,
            mask_url(&self.evm.explorer_url),
            mask_secret(&self.evm.api_key),
            self.dexscreener.base_url,
            self.http.timeout_ms,
            limits,
            self.cache.capacity,
            self.cache.top_traders_ttl_secs,
            self.analysis.holder_limit,
            self.analysis.trader_batch_size,
            self.analysis.transaction_batch_size,
            self.analysis.account_batch_size,
            self.analysis.min_common_tokens,
            self.analysis.max_common_tokens,
            self.analysis.common_trader_cap,
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

fn mask_secret(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solana: SolanaConfig::default(),
            evm: EvmConfig::default(),
            dexscreener: DexScreenerConfig::default(),
            http: HttpConfig::default(),
            rate_limits: default_rate_limits(),
            cache: CacheConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}
