//! Shared data model
//!
//! Records produced by chain providers (transfers, holders, balances, pair data)
//! and the artifacts computed from them (tranches, histories, traders, scores).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::TokenSpec;

/// One directional movement of an asset observed in a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
    pub from_address: String,
    pub to_address: String,
    /// Token address, or the chain's native asset id (e.g. `SOL`)
    pub asset_id: String,
    /// UI amount (decimals already applied)
    pub amount: f64,
}

/// Inferred side of a tranche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// How a tranche was inferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    /// Wallet moved another asset in the same transaction
    Swap,
    /// Plain send/receive of the target asset
    Transfer,
}

/// Where the other side of a tranche came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartySource {
    pub kind: TradeKind,
    /// Other endpoint of a plain transfer
    pub counterparty: Option<String>,
    /// Asset paid (buy) or received (sell) in a swap
    pub quote_asset: Option<String>,
    pub quote_amount: Option<f64>,
}

/// One inferred buy or sell of a target asset by a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTranche {
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
    /// Always > 0
    pub amount: f64,
    pub side: TradeSide,
    pub counterparty_source: CounterpartySource,
}

impl TradeTranche {
    pub fn is_buy(&self) -> bool {
        self.side == TradeSide::Buy
    }

    /// Quote units paid/received per unit of the target asset
    pub fn implied_price(&self) -> Option<f64> {
        self.counterparty_source
            .quote_amount
            .filter(|_| self.amount > 0.0)
            .map(|quote| quote / self.amount)
    }
}

/// A wallet's tranches for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTradeHistory {
    pub asset: TokenSpec,
    pub wallet: String,
    pub total_bought: f64,
    pub total_sold: f64,
    pub current_balance: f64,
    /// Ascending by timestamp
    pub tranches: Vec<TradeTranche>,
}

impl TokenTradeHistory {
    /// Token-unit profit proxy: `sold - bought + balance`
    pub fn realized_value_proxy(&self) -> f64 {
        self.total_sold - self.total_bought + self.current_balance
    }

    pub fn buy_count(&self) -> usize {
        self.tranches.iter().filter(|t| t.is_buy()).count()
    }

    pub fn sell_count(&self) -> usize {
        self.tranches.len() - self.buy_count()
    }

    pub fn last_trade(&self) -> Option<DateTime<Utc>> {
        self.tranches.iter().map(|t| t.timestamp).max()
    }
}

/// A row from a token's current holder set, owner already resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderEntry {
    pub owner_address: String,
    pub balance: f64,
    pub percentage_of_supply: f64,
}

/// Price and liquidity for a token's main pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairData {
    pub pair_address: String,
    pub dex_id: String,
    pub price_usd: Option<f64>,
    pub price_native: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    pub volume_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub pair_created_at: Option<DateTime<Utc>>,
}

/// Token metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    /// UI units
    pub total_supply: Option<f64>,
}

/// One fungible token balance held by a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_address: String,
    pub amount: f64,
    pub decimals: Option<u8>,
}

/// Native plus fungible balances of a wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub native: f64,
    pub tokens: Vec<TokenBalance>,
}

impl WalletBalance {
    pub fn token_amount(&self, chain: crate::chain::Chain, token: &str) -> Option<f64> {
        self.tokens
            .iter()
            .find(|t| chain.same_address(&t.token_address, token))
            .map(|t| t.amount)
    }
}

/// Query options for transaction history fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionQuery {
    pub max_pages: u32,
    pub page_size: u32,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            max_pages: 5,
            page_size: 100,
        }
    }
}

/// Lifecycle status of a deployed token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Rugged,
    Dead,
    Unknown,
}

/// A token deployed by a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedToken {
    pub address: String,
    pub tx_hash: String,
    pub deployed_at: Option<DateTime<Utc>>,
    pub status: TokenStatus,
}

/// Wallet size bucket by absolute USD PNL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Shrimp,
    Crab,
    Fish,
    Dolphin,
    Whale,
}

/// Per-wallet record for one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopTrader {
    pub wallet: String,
    pub token: TokenSpec,
    pub balance: f64,
    pub percentage_of_supply: f64,
    pub holding_value_usd: Option<f64>,
    pub share_of_market_cap: Option<f64>,
    /// Sum of known stablecoin balances (assumed $1)
    pub stablecoin_holdings_usd: f64,
    pub native_balance: f64,
    pub total_bought: f64,
    pub total_sold: f64,
    pub avg_buy_amount: f64,
    pub avg_buy_amount_usd: Option<f64>,
    pub realized_pnl_in_asset: f64,
    /// Zero when the price is unknown
    pub realized_pnl_usd: f64,
    pub unrealized_pnl_in_asset: f64,
    pub unrealized_pnl_usd: Option<f64>,
    pub tier: Tier,
    pub buy_count: usize,
    pub sell_count: usize,
    pub trade_count: usize,
    pub last_trade_timestamp: Option<DateTime<Utc>>,
}

/// A wallet's position in one of the requested tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub token: TokenSpec,
    pub balance: f64,
    pub percentage_of_supply: f64,
    pub price_usd: Option<f64>,
    pub value_usd: Option<f64>,
}

/// A wallet holding two or more of the requested tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonTrader {
    pub wallet_address: String,
    pub per_token_holdings: Vec<TokenHolding>,
    pub total_value_usd: f64,
    pub token_count: usize,
}

/// Letter grade for a deployer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

/// Qualitative deployer risk from the rug ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Reputation aggregate over a wallet's deployed tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployerScore {
    pub total_tokens: usize,
    pub active: usize,
    pub rugged: usize,
    pub dead: usize,
    pub unknown: usize,
    pub rug_ratio: f64,
    pub dead_ratio: f64,
    /// 0..=100
    pub score: f64,
    pub grade: Grade,
    pub risk_level: RiskLevel,
}
