//! Intelligence service
//!
//! Orchestrates providers, cache and engines for the four request types:
//! trade history, top traders, common traders and deployer scores.
//!
//! Input is validated before any upstream call. After that, upstream trouble
//! only ever shrinks the result: a failing holder yields a zeroed record, a
//! failing token yields an empty holder set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::chain::{Chain, TokenSpec};
use crate::config::Config;
use crate::engine::{
    compute_top_traders, in_batches, intersect_holders, reconstruct_trade_history,
    score_deployer, PriceContext, TokenHolders, TraderInput,
};
use crate::error::{Error, Result};
use crate::gateway::{RateLimiter, StalenessCache};
use crate::provider::{classify_lifecycle, ChainProvider, ProviderRegistry};
use crate::types::{
    CommonTrader, DeployedToken, DeployerScore, HolderEntry, PairData, TokenMetadata,
    TokenStatus, TokenTradeHistory, TopTrader, TransferEvent, WalletBalance,
};

/// Values kept in the shared staleness cache
#[derive(Debug, Clone)]
pub enum CachedValue {
    TopTraders(Vec<TopTrader>),
    Holders(Vec<HolderEntry>),
    Pair(Option<PairData>),
}

/// Deployer score together with the tokens it was computed from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerReport {
    pub chain: Chain,
    pub wallet: String,
    pub tokens: Vec<DeployedToken>,
    pub score: DeployerScore,
}

/// Metadata, main pair and lifecycle status of one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenOverview {
    pub token: TokenSpec,
    pub metadata: Option<TokenMetadata>,
    pub pair: Option<PairData>,
    pub status: TokenStatus,
}

pub struct IntelService {
    config: Config,
    registry: ProviderRegistry,
    limiter: Arc<RateLimiter>,
    cache: Arc<StalenessCache<CachedValue>>,
}

impl IntelService {
    pub fn new(
        config: Config,
        registry: ProviderRegistry,
        limiter: Arc<RateLimiter>,
        cache: Arc<StalenessCache<CachedValue>>,
    ) -> Self {
        Self {
            config,
            registry,
            limiter,
            cache,
        }
    }

    /// Wire up limiter, providers and a fresh cache from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
        let registry = ProviderRegistry::from_config(&config, limiter.clone())?;
        let cache = Arc::new(StalenessCache::new(config.cache.capacity));
        Ok(Self::new(config, registry, limiter, cache))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &StalenessCache<CachedValue> {
        &self.cache
    }

    /// Metadata and market data for one token
    pub async fn token_overview(&self, token: &TokenSpec) -> Result<TokenOverview> {
        let token = self.validate_token(token)?;
        let provider = self.registry.get(token.chain)?;

        let (metadata, pair) = tokio::join!(
            provider.get_token_metadata(&token.address),
            self.pair(provider.as_ref(), &token)
        );
        // A missing pair is not evidence of a dead token here
        let status = classify_lifecycle(pair.as_ref(), false);

        Ok(TokenOverview {
            token,
            metadata,
            pair,
            status,
        })
    }

    /// Reconstruct a wallet's buy/sell history for one token
    pub async fn trade_history(&self, wallet: &str, token: &TokenSpec) -> Result<TokenTradeHistory> {
        let token = self.validate_token(token)?;
        let wallet = token.chain.parse_address(wallet)?;
        let provider = self.registry.get(token.chain)?;

        let (transfers, balance) = self.wallet_activity(provider.as_ref(), &wallet).await;
        let current_balance = balance
            .and_then(|b| b.token_amount(token.chain, &token.address))
            .unwrap_or(0.0);

        Ok(reconstruct_trade_history(
            &wallet,
            &token,
            &transfers,
            current_balance,
        ))
    }

    /// Rank the token's top holders by realized PNL
    pub async fn top_traders(&self, token: &TokenSpec) -> Result<Vec<TopTrader>> {
        let token = self.validate_token(token)?;
        let key = format!("top_traders:{}", token.key());
        if let Some(CachedValue::TopTraders(traders)) = self.cache.get(&key) {
            debug!(token = %token, "Top traders served from cache");
            return Ok(traders);
        }

        let provider = self.registry.get(token.chain)?;
        let (holders, pair) = tokio::join!(
            self.holders(provider.as_ref(), &token),
            self.pair(provider.as_ref(), &token)
        );
        let price = PriceContext::from_pair(pair.as_ref());

        let provider_ref = provider.as_ref();
        let token_ref = &token;
        let inputs = in_batches(
            holders,
            self.config.analysis.trader_batch_size,
            |holder| self.trader_input(provider_ref, token_ref, holder),
        )
        .await;

        let traders = compute_top_traders(&inputs, &price);
        info!(
            token = %token,
            traders = traders.len(),
            priced = price.price_usd.is_some(),
            "Computed top traders"
        );

        // An empty ranking usually means the holder fetch failed upstream
        if !traders.is_empty() {
            self.cache.set(
                &key,
                CachedValue::TopTraders(traders.clone()),
                Duration::from_secs(self.config.cache.top_traders_ttl_secs),
            );
        }
        Ok(traders)
    }

    /// Wallets holding two or more of the requested tokens
    pub async fn common_traders(&self, tokens: &[TokenSpec]) -> Result<Vec<CommonTrader>> {
        let tokens = self.validate_token_set(tokens)?;
        let providers = tokens
            .iter()
            .map(|t| self.registry.get(t.chain))
            .collect::<Result<Vec<_>>>()?;

        let sets = in_batches(
            tokens.iter().zip(providers.iter()).collect(),
            self.config.analysis.trader_batch_size,
            |(token, provider)| async move {
                let (holders, pair) = tokio::join!(
                    self.holders(provider.as_ref(), token),
                    self.pair(provider.as_ref(), token)
                );
                TokenHolders {
                    token: token.clone(),
                    price_usd: PriceContext::from_pair(pair.as_ref()).price_usd,
                    holders,
                }
            },
        )
        .await;

        let common = intersect_holders(
            &sets,
            self.config.analysis.min_common_tokens,
            self.config.analysis.common_trader_cap,
        );
        info!(
            tokens = tokens.len(),
            common = common.len(),
            "Computed common traders"
        );
        Ok(common)
    }

    /// Trade history of one wallet across the requested tokens.
    ///
    /// Transfers and balances are fetched once per chain; tokens on chains
    /// whose address scheme does not fit the wallet are skipped.
    pub async fn common_trader_history(
        &self,
        wallet: &str,
        tokens: &[TokenSpec],
    ) -> Result<Vec<TokenTradeHistory>> {
        let tokens = self.validate_token_set(tokens)?;

        let mut chains: BTreeMap<Chain, String> = BTreeMap::new();
        for token in &tokens {
            if let Ok(normalized) = token.chain.parse_address(wallet) {
                chains.insert(token.chain, normalized);
            }
        }
        if chains.is_empty() {
            return Err(Error::InvalidAddress {
                chain: tokens
                    .iter()
                    .map(|t| t.chain.as_str())
                    .collect::<Vec<_>>()
                    .join("/"),
                address: wallet.to_string(),
            });
        }

        let mut requests = Vec::with_capacity(chains.len());
        for (chain, address) in chains {
            requests.push((self.registry.get(chain)?, address));
        }

        let activity = in_batches(
            requests,
            self.config.analysis.transaction_batch_size,
            |(provider, address)| async move {
                let (transfers, balance) = self.wallet_activity(provider.as_ref(), &address).await;
                (provider.chain(), address, transfers, balance)
            },
        )
        .await;

        let mut histories = Vec::new();
        for token in &tokens {
            let Some((_, address, transfers, balance)) =
                activity.iter().find(|(chain, ..)| *chain == token.chain)
            else {
                debug!(token = %token, wallet, "Wallet not valid on chain, skipping");
                continue;
            };
            let current_balance = balance
                .as_ref()
                .and_then(|b| b.token_amount(token.chain, &token.address))
                .unwrap_or(0.0);
            histories.push(reconstruct_trade_history(
                address,
                token,
                transfers,
                current_balance,
            ));
        }

        Ok(histories)
    }

    /// Score a wallet by the outcomes of the tokens it deployed
    pub async fn deployer_score(&self, chain: Chain, wallet: &str) -> Result<DeployerReport> {
        let wallet = chain.parse_address(wallet)?;
        let provider = self.registry.get(chain)?;

        let tokens = provider.get_deployed_tokens(&wallet).await;
        let score = score_deployer(&tokens);
        info!(
            %chain,
            wallet = %wallet,
            deployed = score.total_tokens,
            score = score.score,
            "Scored deployer"
        );

        Ok(DeployerReport {
            chain,
            wallet,
            tokens,
            score,
        })
    }

    // ============ Validation ============

    fn validate_token(&self, token: &TokenSpec) -> Result<TokenSpec> {
        TokenSpec::new(token.chain, &token.address)
    }

    fn validate_token_set(&self, tokens: &[TokenSpec]) -> Result<Vec<TokenSpec>> {
        let analysis = &self.config.analysis;
        if tokens.len() < analysis.min_common_tokens || tokens.len() > analysis.max_common_tokens {
            return Err(Error::InvalidTokenCount {
                min: analysis.min_common_tokens,
                max: analysis.max_common_tokens,
                got: tokens.len(),
            });
        }

        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(tokens.len());
        for token in tokens {
            let token = self.validate_token(token)?;
            if !seen.insert(token.key()) {
                return Err(Error::DuplicateToken(token.key()));
            }
            validated.push(token);
        }
        Ok(validated)
    }

    // ============ Cached Fetches ============

    async fn holders(&self, provider: &dyn ChainProvider, token: &TokenSpec) -> Vec<HolderEntry> {
        let key = format!("holders:{}", token.key());
        if let Some(CachedValue::Holders(holders)) = self.cache.get(&key) {
            return holders;
        }

        let holders = provider
            .get_top_holders(&token.address, self.config.analysis.holder_limit)
            .await;
        // Empty results are not cached so a transient failure is retried next time
        if !holders.is_empty() {
            self.cache.set(
                &key,
                CachedValue::Holders(holders.clone()),
                Duration::from_secs(self.config.cache.holders_ttl_secs),
            );
        }
        holders
    }

    async fn pair(&self, provider: &dyn ChainProvider, token: &TokenSpec) -> Option<PairData> {
        let key = format!("pair:{}", token.key());
        if let Some(CachedValue::Pair(pair)) = self.cache.get(&key) {
            return pair;
        }

        let pair = provider.get_pair_data(&token.address).await;
        if pair.is_some() {
            self.cache.set(
                &key,
                CachedValue::Pair(pair.clone()),
                Duration::from_secs(self.config.cache.pair_ttl_secs),
            );
        }
        pair
    }

    async fn wallet_activity(
        &self,
        provider: &dyn ChainProvider,
        wallet: &str,
    ) -> (Vec<TransferEvent>, Option<WalletBalance>) {
        tokio::join!(
            provider.get_wallet_transactions(wallet, self.config.analysis.transaction_query()),
            provider.get_wallet_balance(wallet)
        )
    }

    async fn trader_input(
        &self,
        provider: &dyn ChainProvider,
        token: &TokenSpec,
        holder: HolderEntry,
    ) -> TraderInput {
        let (transfers, wallet_balance) =
            self.wallet_activity(provider, &holder.owner_address).await;
        // The holder snapshot is the live balance
        let history =
            reconstruct_trade_history(&holder.owner_address, token, &transfers, holder.balance);
        TraderInput {
            holder,
            history,
            wallet_balance,
        }
    }
}
