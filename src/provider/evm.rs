//! EVM provider (Ethereum, Base, BSC) backed by the Etherscan v2 multichain API
//!
//! Holder addresses on EVM chains are already the beneficial owners, so no
//! owner-resolution step is needed. Addresses are case-folded on the way in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::Chain;
use crate::config::{EvmConfig, UPSTREAM_ETHERSCAN};
use crate::error::{Error, Result};
use crate::provider::dexscreener::DexScreenerClient;
use crate::provider::http::HttpSource;
use crate::provider::{assign_supply_percentages, classify_lifecycle, merge_by_owner, ChainProvider};
use crate::types::{
    DeployedToken, HolderEntry, PairData, TokenBalance, TokenMetadata, TransactionQuery,
    TransferEvent, WalletBalance,
};

const NATIVE_DECIMALS: i32 = 18;

pub struct EvmProvider {
    chain: Chain,
    chain_id: u64,
    http: HttpSource,
    dex: Arc<DexScreenerClient>,
    config: EvmConfig,
}

impl EvmProvider {
    pub fn new(chain: Chain, http: HttpSource, dex: Arc<DexScreenerClient>, config: EvmConfig) -> Self {
        Self {
            chain,
            chain_id: chain.evm_chain_id().unwrap_or(1),
            http,
            dex,
            config,
        }
    }

    /// Call an Etherscan `module`/`action` and decode `result`
    async fn call<T: DeserializeOwned>(
        &self,
        module: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        if self.config.api_key.is_empty() {
            return Err(Error::Config("Etherscan API key not configured".into()));
        }

        let mut query = vec![
            ("chainid", self.chain_id.to_string()),
            ("module", module.to_string()),
            ("action", action.to_string()),
            ("apikey", self.config.api_key.clone()),
        ];
        query.extend(params.iter().cloned());

        self.http
            .get_json_with(UPSTREAM_ETHERSCAN, &self.config.explorer_url, &query, |response: EtherscanResponse| {
                response.into_result(action)
            })
            .await
    }

    /// Page through an account list endpoint
    async fn paged<T: DeserializeOwned>(
        &self,
        action: &str,
        wallet: &str,
        query: TransactionQuery,
    ) -> Result<Vec<T>> {
        let mut all = Vec::new();

        for page in 1..=query.max_pages {
            let params = [
                ("address", wallet.to_string()),
                ("page", page.to_string()),
                ("offset", query.page_size.to_string()),
                ("sort", "desc".to_string()),
            ];
            let batch: Vec<T> = match self.call("account", action, &params).await {
                Ok(batch) => batch,
                Err(e) if page > 1 => {
                    warn!(chain = %self.chain, wallet, action, page, error = %e, "Page failed, keeping partial results");
                    break;
                }
                Err(e) => return Err(e),
            };
            let exhausted = (batch.len() as u32) < query.page_size;
            all.extend(batch);
            if exhausted {
                break;
            }
        }

        Ok(all)
    }

    async fn fetch_token_info(&self, token: &str) -> Result<Option<EtherscanTokenInfo>> {
        let infos: Vec<EtherscanTokenInfo> = self
            .call("token", "tokeninfo", &[("contractaddress", token.to_string())])
            .await?;
        Ok(infos.into_iter().next())
    }

    #[allow(clippy::too_many_arguments)]
    fn to_event(
        &self,
        hash: String,
        timestamp: &str,
        from: &str,
        to: &str,
        asset_id: String,
        raw: &str,
        decimals: i32,
    ) -> Option<TransferEvent> {
        let timestamp = timestamp
            .parse::<i64>()
            .ok()
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))?;
        let amount = scale(raw, decimals);
        if amount <= 0.0 {
            return None;
        }
        Some(TransferEvent {
            tx_hash: hash,
            timestamp,
            from_address: self.chain.normalize_address(from),
            to_address: self.chain.normalize_address(to),
            asset_id,
            amount,
        })
    }
}

/// Convert a raw integer string to UI units
fn scale(raw: &str, decimals: i32) -> f64 {
    raw.parse::<f64>().unwrap_or(0.0) / 10f64.powi(decimals)
}

#[async_trait]
impl ChainProvider for EvmProvider {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_pair_data(&self, token: &str) -> Option<PairData> {
        match self.dex.get_pair_data(self.chain, token).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(chain = %self.chain, token, error = %e, "Failed to fetch pair data");
                None
            }
        }
    }

    async fn get_token_metadata(&self, token: &str) -> Option<TokenMetadata> {
        match self.fetch_token_info(token).await {
            Ok(Some(info)) => {
                let decimals = info.divisor.as_deref().and_then(|d| d.parse::<u8>().ok());
                Some(TokenMetadata {
                    address: self.chain.normalize_address(token),
                    name: info.token_name,
                    symbol: info.symbol,
                    decimals,
                    total_supply: info
                        .total_supply
                        .as_deref()
                        .map(|s| scale(s, decimals.unwrap_or(18) as i32)),
                })
            }
            Ok(None) => None,
            Err(e) => {
                warn!(chain = %self.chain, token, error = %e, "Failed to fetch token info");
                // Fall back to DexScreener naming
                let base = self.dex.get_base_token(self.chain, token).await.ok().flatten()?;
                Some(TokenMetadata {
                    address: self.chain.normalize_address(token),
                    name: base.name,
                    symbol: base.symbol,
                    decimals: None,
                    total_supply: None,
                })
            }
        }
    }

    async fn get_top_holders(&self, token: &str, limit: usize) -> Vec<HolderEntry> {
        let params = [
            ("contractaddress", token.to_string()),
            ("page", "1".to_string()),
            ("offset", limit.to_string()),
        ];
        let rows: Vec<EtherscanHolder> = match self.call("token", "tokenholderlist", &params).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(chain = %self.chain, token, error = %e, "Failed to fetch token holders");
                return Vec::new();
            }
        };

        let info = self.fetch_token_info(token).await.ok().flatten();
        let decimals = info
            .as_ref()
            .and_then(|i| i.divisor.as_deref())
            .and_then(|d| d.parse::<i32>().ok())
            .unwrap_or(18);
        let supply = info
            .as_ref()
            .and_then(|i| i.total_supply.as_deref())
            .map(|s| scale(s, decimals));

        let holders = rows
            .into_iter()
            .map(|row| HolderEntry {
                owner_address: row.address,
                balance: scale(&row.quantity, decimals),
                percentage_of_supply: 0.0,
            })
            .filter(|h| h.balance > 0.0)
            .collect();

        let mut holders = merge_by_owner(self.chain, holders);
        holders.truncate(limit);
        assign_supply_percentages(&mut holders, supply);
        debug!(chain = %self.chain, token, holders = holders.len(), "Fetched EVM holders");
        holders
    }

    async fn get_wallet_balance(&self, wallet: &str) -> Option<WalletBalance> {
        let wei: String = match self.call("account", "balance", &[("address", wallet.to_string())]).await {
            Ok(wei) => wei,
            Err(e) => {
                warn!(chain = %self.chain, wallet, error = %e, "Failed to fetch native balance");
                return None;
            }
        };

        let params = [
            ("address", wallet.to_string()),
            ("page", "1".to_string()),
            ("offset", "100".to_string()),
        ];
        let tokens = match self
            .call::<Vec<EtherscanTokenBalance>>("account", "addresstokenbalance", &params)
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .map(|row| {
                    let decimals = row.divisor.parse::<i32>().unwrap_or(18);
                    TokenBalance {
                        token_address: self.chain.normalize_address(&row.token_address),
                        amount: scale(&row.quantity, decimals),
                        decimals: u8::try_from(decimals).ok(),
                    }
                })
                .filter(|b| b.amount > 0.0)
                .collect(),
            Err(e) => {
                warn!(chain = %self.chain, wallet, error = %e, "Failed to fetch token balances");
                Vec::new()
            }
        };

        Some(WalletBalance {
            native: scale(&wei, NATIVE_DECIMALS),
            tokens,
        })
    }

    async fn get_wallet_transactions(
        &self,
        wallet: &str,
        query: TransactionQuery,
    ) -> Vec<TransferEvent> {
        let native_asset = self.chain.native_asset().to_string();
        let mut events = Vec::new();

        match self.paged::<EtherscanTokenTx>("tokentx", wallet, query).await {
            Ok(rows) => events.extend(rows.into_iter().filter_map(|tx| {
                let decimals = tx.token_decimal.parse::<i32>().unwrap_or(18);
                let asset = self.chain.normalize_address(&tx.contract_address);
                self.to_event(tx.hash, &tx.time_stamp, &tx.from, &tx.to, asset, &tx.value, decimals)
            })),
            Err(e) => warn!(chain = %self.chain, wallet, error = %e, "Failed to fetch token transfers"),
        }

        for action in ["txlist", "txlistinternal"] {
            match self.paged::<EtherscanNativeTx>(action, wallet, query).await {
                Ok(rows) => events.extend(
                    rows.into_iter()
                        .filter(|tx| tx.is_error.as_deref() != Some("1"))
                        .filter_map(|tx| {
                            self.to_event(tx.hash, &tx.time_stamp, &tx.from, &tx.to, native_asset.clone(), &tx.value, NATIVE_DECIMALS)
                        }),
                ),
                Err(e) => warn!(chain = %self.chain, wallet, action, error = %e, "Failed to fetch native transfers"),
            }
        }

        debug!(chain = %self.chain, wallet, events = events.len(), "Fetched EVM transfer history");
        events
    }

    async fn get_deployed_tokens(&self, wallet: &str) -> Vec<DeployedToken> {
        let rows = match self
            .paged::<EtherscanNativeTx>("txlist", wallet, TransactionQuery::default())
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(chain = %self.chain, wallet, error = %e, "Failed to fetch deployer history");
                return Vec::new();
            }
        };

        let creations: Vec<_> = rows
            .into_iter()
            .filter(|tx| tx.to.is_empty() && self.chain.same_address(&tx.from, wallet))
            .filter_map(|tx| {
                let contract = tx.contract_address.filter(|c| !c.is_empty())?;
                let deployed_at = tx
                    .time_stamp
                    .parse::<i64>()
                    .ok()
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
                Some((self.chain.normalize_address(&contract), tx.hash, deployed_at))
            })
            .collect();

        let addresses: Vec<String> = creations.iter().map(|(c, _, _)| c.clone()).collect();
        let (pairs, lookup_ok) = match self.dex.get_pairs_batch(self.chain, &addresses).await {
            Ok(pairs) => (pairs, true),
            Err(e) => {
                warn!(chain = %self.chain, wallet, error = %e, "Failed to fetch pairs for deployed contracts");
                (HashMap::new(), false)
            }
        };

        creations
            .into_iter()
            .map(|(address, tx_hash, deployed_at)| DeployedToken {
                status: classify_lifecycle(pairs.get(&address), lookup_ok),
                address,
                tx_hash,
                deployed_at,
            })
            .collect()
    }
}

// ============ Etherscan Response Types ============

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

impl EtherscanResponse {
    fn into_result<T: DeserializeOwned>(self, action: &str) -> Result<T> {
        // "No transactions found" style responses carry status 0 with an empty array
        if self.status != "1" && !self.result.is_array() {
            let detail = self.result.as_str().unwrap_or_default().to_string();
            if detail.to_ascii_lowercase().contains("rate limit") {
                return Err(Error::RateLimited(UPSTREAM_ETHERSCAN.to_string()));
            }
            return Err(Error::rejected(
                UPSTREAM_ETHERSCAN,
                format!("{}: {} {}", action, self.message, detail),
            ));
        }
        serde_json::from_value(self.result)
            .map_err(|e| Error::Deserialization(format!("etherscan {}: {}", action, e)))
    }
}

#[derive(Debug, Deserialize)]
struct EtherscanTokenTx {
    hash: String,
    #[serde(rename = "timeStamp")]
    time_stamp: String,
    from: String,
    to: String,
    #[serde(rename = "contractAddress")]
    contract_address: String,
    value: String,
    #[serde(rename = "tokenDecimal")]
    token_decimal: String,
}

#[derive(Debug, Deserialize)]
struct EtherscanNativeTx {
    hash: String,
    #[serde(rename = "timeStamp")]
    time_stamp: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(rename = "contractAddress")]
    contract_address: Option<String>,
    #[serde(rename = "isError")]
    is_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EtherscanHolder {
    #[serde(rename = "TokenHolderAddress")]
    address: String,
    #[serde(rename = "TokenHolderQuantity")]
    quantity: String,
}

#[derive(Debug, Deserialize)]
struct EtherscanTokenBalance {
    #[serde(rename = "TokenAddress")]
    token_address: String,
    #[serde(rename = "TokenQuantity")]
    quantity: String,
    #[serde(rename = "TokenDivisor")]
    divisor: String,
}

#[derive(Debug, Deserialize)]
struct EtherscanTokenInfo {
    #[serde(rename = "tokenName")]
    token_name: Option<String>,
    symbol: Option<String>,
    divisor: Option<String>,
    #[serde(rename = "totalSupply")]
    total_supply: Option<String>,
}
