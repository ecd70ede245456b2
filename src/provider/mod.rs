//! Chain providers
//!
//! One [`ChainProvider`] per supported chain normalizes chain-specific balance,
//! holder and transfer primitives into the shared data model. Providers degrade
//! gracefully: upstream failures are logged and turned into `None` / empty
//! results, never surfaced to the analysis code.
//!
//! The [`ProviderRegistry`] is the only place that selects by chain identity.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::Chain;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::RateLimiter;
use crate::types::{
    DeployedToken, HolderEntry, PairData, TokenMetadata, TokenStatus, TransactionQuery,
    TransferEvent, WalletBalance,
};

pub mod dexscreener;
pub mod evm;
pub mod http;
pub mod solana;
#[cfg(test)]
mod test_server;

pub use dexscreener::DexScreenerClient;
pub use evm::EvmProvider;
pub use http::HttpSource;
pub use solana::SolanaProvider;

/// Liquidity below which a pair is considered abandoned
pub const DEAD_LIQUIDITY_USD: f64 = 1.0;
/// Liquidity below which a crashed pair is considered pulled
pub const RUG_LIQUIDITY_USD: f64 = 1_000.0;
/// 24h price change at or below which a low-liquidity pair counts as rugged
pub const RUG_PRICE_CHANGE_PCT: f64 = -90.0;

/// Normalized per-chain data source
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn chain(&self) -> Chain;

    /// Price and liquidity of the token's main pair
    async fn get_pair_data(&self, token: &str) -> Option<PairData>;

    async fn get_token_metadata(&self, token: &str) -> Option<TokenMetadata>;

    /// Top holders with owners resolved to controlling wallets
    async fn get_top_holders(&self, token: &str, limit: usize) -> Vec<HolderEntry>;

    /// `None` when the balance could not be fetched
    async fn get_wallet_balance(&self, wallet: &str) -> Option<WalletBalance>;

    async fn get_wallet_transactions(
        &self,
        wallet: &str,
        query: TransactionQuery,
    ) -> Vec<TransferEvent>;

    async fn get_deployed_tokens(&self, wallet: &str) -> Vec<DeployedToken>;
}

/// Classify a deployed token from its current pair.
///
/// `lookup_ok` is false when the pair lookup itself failed, in which case
/// the absence of a pair says nothing about the token.
pub fn classify_lifecycle(pair: Option<&PairData>, lookup_ok: bool) -> TokenStatus {
    let Some(pair) = pair else {
        return if lookup_ok {
            TokenStatus::Dead
        } else {
            TokenStatus::Unknown
        };
    };

    let liquidity = pair.liquidity_usd.unwrap_or(0.0);
    let volume = pair.volume_24h.unwrap_or(0.0);

    if liquidity < RUG_LIQUIDITY_USD
        && pair
            .price_change_24h
            .is_some_and(|change| change <= RUG_PRICE_CHANGE_PCT)
    {
        return TokenStatus::Rugged;
    }
    if liquidity < DEAD_LIQUIDITY_USD || volume <= 0.0 {
        return TokenStatus::Dead;
    }
    TokenStatus::Active
}

/// Fill `percentage_of_supply` from total supply when known, else relative
/// to the fetched holder set
pub fn assign_supply_percentages(holders: &mut [HolderEntry], total_supply: Option<f64>) {
    let denominator = match total_supply {
        Some(supply) if supply > 0.0 => supply,
        _ => holders.iter().map(|h| h.balance).sum(),
    };
    for holder in holders.iter_mut() {
        holder.percentage_of_supply = if denominator > 0.0 {
            holder.balance / denominator * 100.0
        } else {
            0.0
        };
    }
}

/// Collapse holder rows that resolved to the same owner, keeping the larger
/// balance, then sort by balance
pub fn merge_by_owner(chain: Chain, holders: Vec<HolderEntry>) -> Vec<HolderEntry> {
    let mut by_owner: HashMap<String, HolderEntry> = HashMap::new();
    for mut holder in holders {
        holder.owner_address = chain.normalize_address(&holder.owner_address);
        match by_owner.get(&holder.owner_address) {
            Some(existing) if existing.balance >= holder.balance => {}
            _ => {
                by_owner.insert(holder.owner_address.clone(), holder);
            }
        }
    }
    let mut merged: Vec<_> = by_owner.into_values().collect();
    merged.sort_by(|a, b| {
        b.balance
            .partial_cmp(&a.balance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

/// Chain -> provider lookup
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Chain, Arc<dyn ChainProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build providers for every configured chain
    pub fn from_config(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = HttpSource::new(limiter, config.http.clone())?;
        let dex = Arc::new(DexScreenerClient::new(
            http.clone(),
            config.dexscreener.base_url.clone(),
        ));

        let mut registry = Self::new();
        registry.register(Arc::new(SolanaProvider::new(
            http.clone(),
            dex.clone(),
            config.solana.clone(),
            config.analysis.account_batch_size,
        )));
        for chain in Chain::ALL.into_iter().filter(Chain::is_evm) {
            registry.register(Arc::new(EvmProvider::new(
                chain,
                http.clone(),
                dex.clone(),
                config.evm.clone(),
            )));
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn ChainProvider>) {
        self.providers.insert(provider.chain(), provider);
    }

    pub fn get(&self, chain: Chain) -> Result<Arc<dyn ChainProvider>> {
        self.providers
            .get(&chain)
            .cloned()
            .ok_or_else(|| Error::ProviderMissing(chain.to_string()))
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<_> = self.providers.keys().copied().collect();
        chains.sort();
        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(liquidity: f64, volume: f64, change: Option<f64>) -> PairData {
        PairData {
            liquidity_usd: Some(liquidity),
            volume_24h: Some(volume),
            price_change_24h: change,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_lifecycle() {
        assert_eq!(classify_lifecycle(None, false), TokenStatus::Unknown);
        assert_eq!(classify_lifecycle(None, true), TokenStatus::Dead);
        assert_eq!(
            classify_lifecycle(Some(&pair(50.0, 10.0, Some(-97.0))), true),
            TokenStatus::Rugged
        );
        assert_eq!(
            classify_lifecycle(Some(&pair(0.5, 10.0, Some(-10.0))), true),
            TokenStatus::Dead
        );
        assert_eq!(
            classify_lifecycle(Some(&pair(20_000.0, 0.0, None)), true),
            TokenStatus::Dead
        );
        assert_eq!(
            classify_lifecycle(Some(&pair(20_000.0, 5_000.0, Some(-95.0))), true),
            TokenStatus::Active
        );
    }

    #[test]
    fn test_supply_percentages() {
        let mut holders = vec![
            HolderEntry {
                owner_address: "a".into(),
                balance: 30.0,
                percentage_of_supply: 0.0,
            },
            HolderEntry {
                owner_address: "b".into(),
                balance: 10.0,
                percentage_of_supply: 0.0,
            },
        ];

        assign_supply_percentages(&mut holders, Some(1000.0));
        assert!((holders[0].percentage_of_supply - 3.0).abs() < 1e-9);

        assign_supply_percentages(&mut holders, None);
        assert!((holders[0].percentage_of_supply - 75.0).abs() < 1e-9);
        assert!((holders[1].percentage_of_supply - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_by_owner() {
        let holders = vec![
            HolderEntry {
                owner_address: "0xABC0000000000000000000000000000000000001".into(),
                balance: 5.0,
                percentage_of_supply: 0.0,
            },
            HolderEntry {
                owner_address: "0xabc0000000000000000000000000000000000001".into(),
                balance: 7.0,
                percentage_of_supply: 0.0,
            },
            HolderEntry {
                owner_address: "0xdef0000000000000000000000000000000000002".into(),
                balance: 9.0,
                percentage_of_supply: 0.0,
            },
        ];

        let merged = merge_by_owner(Chain::Ethereum, holders);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].balance, 9.0);
        assert_eq!(merged[1].balance, 7.0);
        assert_eq!(
            merged[1].owner_address,
            "0xabc0000000000000000000000000000000000001"
        );
    }

    #[test]
    fn test_merged_collision_keeps_larger_balance_through_intersection() {
        use crate::chain::TokenSpec;
        use crate::engine::{intersect_holders, TokenHolders};

        let owner = "0xabc0000000000000000000000000000000000001";
        let rows = vec![
            HolderEntry {
                owner_address: owner.into(),
                balance: 7.0,
                percentage_of_supply: 0.0,
            },
            HolderEntry {
                owner_address: "0xABC0000000000000000000000000000000000001".into(),
                balance: 5.0,
                percentage_of_supply: 0.0,
            },
        ];
        let other = vec![HolderEntry {
            owner_address: owner.into(),
            balance: 1.0,
            percentage_of_supply: 0.0,
        }];

        let sets = vec![
            TokenHolders {
                token: TokenSpec::new(Chain::Ethereum, "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap(),
                price_usd: Some(2.0),
                holders: merge_by_owner(Chain::Ethereum, rows),
            },
            TokenHolders {
                token: TokenSpec::new(Chain::Ethereum, "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap(),
                price_usd: None,
                holders: merge_by_owner(Chain::Ethereum, other),
            },
        ];

        let common = intersect_holders(&sets, 2, 100);
        assert_eq!(common.len(), 1);
        assert_eq!(common[0].per_token_holdings[0].balance, 7.0);
        assert_eq!(common[0].total_value_usd, 14.0);
    }
}
