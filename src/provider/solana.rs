//! Solana provider
//!
//! Uses the standard JSON-RPC API for balances and mint info, and the
//! Helius enhanced-transactions API for parsed transfer history.
//!
//! With a Helius key, holders come from a paged DAS `getTokenAccounts` scan,
//! which already names each account's owner. Without one, holders fall back to
//! `getTokenLargestAccounts`; those rows are token accounts, not wallets, and
//! are resolved to their owning wallet with batched `getMultipleAccounts`
//! lookups before being returned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::Chain;
use crate::config::{SolanaConfig, UPSTREAM_HELIUS, UPSTREAM_SOLANA_RPC};
use crate::error::{Error, Result};
use crate::provider::dexscreener::DexScreenerClient;
use crate::provider::http::HttpSource;
use crate::provider::{assign_supply_percentages, classify_lifecycle, merge_by_owner, ChainProvider};
use crate::types::{
    DeployedToken, HolderEntry, PairData, TokenBalance, TokenMetadata, TransactionQuery,
    TransferEvent, WalletBalance,
};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
/// `getTokenLargestAccounts` never returns more than this
const MAX_LARGEST_ACCOUNTS: usize = 20;
/// Largest page the DAS `getTokenAccounts` method serves
const DAS_PAGE_LIMIT: usize = 1000;
/// Helius transaction types that create a token
const DEPLOY_TX_TYPES: &[&str] = &["CREATE", "TOKEN_MINT", "CREATE_POOL"];

pub struct SolanaProvider {
    http: HttpSource,
    dex: Arc<DexScreenerClient>,
    config: SolanaConfig,
    account_batch_size: usize,
}

impl SolanaProvider {
    pub fn new(
        http: HttpSource,
        dex: Arc<DexScreenerClient>,
        config: SolanaConfig,
        account_batch_size: usize,
    ) -> Self {
        Self {
            http,
            dex,
            config,
            account_batch_size: account_batch_size.max(1),
        }
    }

    /// Make a JSON-RPC call and unwrap its `result`
    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        self.json_rpc(UPSTREAM_SOLANA_RPC, &self.config.rpc_endpoint, method, params)
            .await
    }

    async fn json_rpc<T: DeserializeOwned>(
        &self,
        upstream: &str,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        self.http
            .post_json_with(upstream, url, &request, |response: RpcResponse<T>| {
                response.into_result(upstream, method)
            })
            .await
    }

    async fn fetch_largest_accounts(&self, mint: &str) -> Result<Vec<LargestAccount>> {
        let result: RpcValue<Vec<LargestAccount>> = self
            .rpc("getTokenLargestAccounts", serde_json::json!([mint]))
            .await?;
        Ok(result.value)
    }

    /// Holders from the largest token accounts, resolved to their owners.
    /// The RPC only reports the top 20 accounts.
    async fn largest_holders(&self, mint: &str, limit: usize) -> Vec<HolderEntry> {
        let accounts = match self.fetch_largest_accounts(mint).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(token = mint, error = %e, "Failed to fetch largest token accounts");
                return Vec::new();
            }
        };
        let accounts: Vec<_> = accounts
            .into_iter()
            .take(limit.min(MAX_LARGEST_ACCOUNTS))
            .collect();

        let addresses: Vec<String> = accounts.iter().map(|a| a.address.clone()).collect();
        let owners = self.resolve_owners(&addresses).await;

        accounts
            .iter()
            .filter_map(|account| {
                // Unresolved accounts are dropped rather than reported as wallets
                let owner = owners.get(&account.address)?;
                Some(HolderEntry {
                    owner_address: owner.clone(),
                    balance: account.ui_amount(),
                    percentage_of_supply: 0.0,
                })
            })
            .collect()
    }

    /// Holders from a paged Helius DAS `getTokenAccounts` scan. Rows carry the
    /// owner already. Results are unordered, so every scanned page is kept and
    /// ranking happens afterwards.
    async fn das_holders(&self, mint: &str, decimals: u8) -> Result<Vec<HolderEntry>> {
        let url = format!("{}/?api-key={}", self.config.das_endpoint, self.config.helius_api_key);
        let scale = 10f64.powi(decimals as i32);
        let mut holders = Vec::new();

        for page in 1..=self.config.holder_scan_pages.max(1) {
            let params = serde_json::json!({
                "mint": mint,
                "page": page,
                "limit": DAS_PAGE_LIMIT,
                "options": { "showZeroBalance": false },
            });
            let result: DasTokenAccounts = match self
                .json_rpc(UPSTREAM_HELIUS, &url, "getTokenAccounts", params)
                .await
            {
                Ok(result) => result,
                Err(e) if page > 1 => {
                    warn!(token = mint, page, error = %e, "Token account page failed, keeping partial holders");
                    break;
                }
                Err(e) => return Err(e),
            };

            let exhausted = result.token_accounts.len() < DAS_PAGE_LIMIT;
            holders.extend(
                result
                    .token_accounts
                    .into_iter()
                    .filter(|account| account.amount > 0)
                    .map(|account| HolderEntry {
                        owner_address: account.owner,
                        balance: account.amount as f64 / scale,
                        percentage_of_supply: 0.0,
                    }),
            );
            if exhausted {
                break;
            }
        }

        Ok(holders)
    }

    /// Map token accounts to their owning wallets, in batches
    async fn resolve_owners(&self, accounts: &[String]) -> HashMap<String, String> {
        let mut owners = HashMap::new();

        for chunk in accounts.chunks(self.account_batch_size) {
            let result: Result<RpcValue<Vec<Option<ParsedAccount>>>> = self
                .rpc(
                    "getMultipleAccounts",
                    serde_json::json!([chunk, { "encoding": "jsonParsed" }]),
                )
                .await;

            match result {
                Ok(result) => {
                    for (address, account) in chunk.iter().zip(result.value) {
                        if let Some(owner) = account.and_then(|a| a.data.parsed).and_then(|p| p.info.owner) {
                            owners.insert(address.clone(), owner);
                        }
                    }
                }
                Err(e) => {
                    warn!(accounts = chunk.len(), error = %e, "Owner resolution batch failed");
                }
            }
        }

        owners
    }

    async fn fetch_mint_info(&self, mint: &str) -> Result<MintInfoData> {
        let result: RpcValue<Option<ParsedAccount>> = self
            .rpc("getAccountInfo", serde_json::json!([mint, { "encoding": "jsonParsed" }]))
            .await?;

        let info = result
            .value
            .and_then(|account| account.data.parsed)
            .map(|parsed| parsed.info)
            .ok_or_else(|| Error::upstream(UPSTREAM_SOLANA_RPC, format!("mint {} not found", mint)))?;

        Ok(MintInfoData {
            decimals: info.decimals,
            supply: info.supply.and_then(|s| s.parse::<u64>().ok()),
        })
    }

    async fn fetch_token_accounts(&self, wallet: &str, program: &str) -> Result<Vec<TokenBalance>> {
        let result: RpcValue<Vec<KeyedAccount>> = self
            .rpc(
                "getTokenAccountsByOwner",
                serde_json::json!([wallet, { "programId": program }, { "encoding": "jsonParsed" }]),
            )
            .await?;

        Ok(result
            .value
            .into_iter()
            .filter_map(|keyed| {
                let info = keyed.account.data.parsed?.info;
                let amount = info.token_amount?;
                Some(TokenBalance {
                    token_address: info.mint?,
                    amount: amount.ui_amount(),
                    decimals: Some(amount.decimals),
                })
            })
            .filter(|balance| balance.amount > 0.0)
            .collect())
    }

    /// One page of Helius enhanced transactions
    async fn fetch_transactions_page(
        &self,
        wallet: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<HeliusTransaction>> {
        if self.config.helius_api_key.is_empty() {
            return Err(Error::Config("Helius API key not configured".into()));
        }

        let url = format!("{}/v0/addresses/{}/transactions", self.config.helius_base_url, wallet);
        let mut query = vec![
            ("api-key", self.config.helius_api_key.clone()),
            ("limit", limit.to_string()),
        ];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        self.http.get_json(UPSTREAM_HELIUS, &url, &query).await
    }

    /// Page through history until exhausted or `max_pages` is reached
    async fn fetch_transactions(
        &self,
        wallet: &str,
        query: TransactionQuery,
    ) -> Result<Vec<HeliusTransaction>> {
        let mut all = Vec::new();
        let mut before: Option<String> = None;

        for page in 0..query.max_pages {
            let batch = match self
                .fetch_transactions_page(wallet, query.page_size, before.as_deref())
                .await
            {
                Ok(batch) => batch,
                // Keep what earlier pages returned
                Err(e) if page > 0 => {
                    warn!(wallet, page, error = %e, "Transaction page failed, returning partial history");
                    break;
                }
                Err(e) => return Err(e),
            };

            let exhausted = (batch.len() as u32) < query.page_size;
            before = batch.last().map(|tx| tx.signature.clone());
            all.extend(batch);

            if exhausted || before.is_none() {
                break;
            }
        }

        debug!(wallet, transactions = all.len(), "Fetched Helius transaction history");
        Ok(all)
    }
}

/// Flatten Helius native and token transfers into transfer events
pub fn normalize_transactions(transactions: &[HeliusTransaction]) -> Vec<TransferEvent> {
    let mut events = Vec::new();

    for tx in transactions {
        let Some(timestamp) = tx.timestamp.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)) else {
            continue;
        };

        for transfer in tx.native_transfers.iter().flatten() {
            let (Some(from), Some(to)) = (&transfer.from_user_account, &transfer.to_user_account) else {
                continue;
            };
            if transfer.amount == 0 {
                continue;
            }
            events.push(TransferEvent {
                tx_hash: tx.signature.clone(),
                timestamp,
                from_address: from.clone(),
                to_address: to.clone(),
                asset_id: Chain::Solana.native_asset().to_string(),
                amount: transfer.amount as f64 / LAMPORTS_PER_SOL,
            });
        }

        for transfer in tx.token_transfers.iter().flatten() {
            if transfer.token_amount <= 0.0 {
                continue;
            }
            events.push(TransferEvent {
                tx_hash: tx.signature.clone(),
                timestamp,
                from_address: transfer.from_user_account.clone().unwrap_or_default(),
                to_address: transfer.to_user_account.clone().unwrap_or_default(),
                asset_id: transfer.mint.clone(),
                amount: transfer.token_amount,
            });
        }
    }

    events
}

/// Mints created in transactions paid for by `wallet`
pub fn deployed_mints(transactions: &[HeliusTransaction], wallet: &str) -> Vec<(String, String, Option<DateTime<Utc>>)> {
    let mut seen = HashSet::new();
    let mut mints = Vec::new();

    for tx in transactions {
        let is_deploy = tx
            .r#type
            .as_deref()
            .is_some_and(|t| DEPLOY_TX_TYPES.contains(&t));
        if !is_deploy || tx.fee_payer.as_deref() != Some(wallet) {
            continue;
        }
        let Some(mint) = tx
            .token_transfers
            .iter()
            .flatten()
            .map(|t| t.mint.clone())
            .next()
        else {
            continue;
        };
        if seen.insert(mint.clone()) {
            let deployed_at = tx.timestamp.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
            mints.push((mint, tx.signature.clone(), deployed_at));
        }
    }

    mints
}

#[async_trait]
impl ChainProvider for SolanaProvider {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn get_pair_data(&self, token: &str) -> Option<PairData> {
        match self.dex.get_pair_data(Chain::Solana, token).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(token, error = %e, "Failed to fetch pair data");
                None
            }
        }
    }

    async fn get_token_metadata(&self, token: &str) -> Option<TokenMetadata> {
        let mint = match self.fetch_mint_info(token).await {
            Ok(mint) => Some(mint),
            Err(e) => {
                warn!(token, error = %e, "Failed to fetch mint info");
                None
            }
        };
        let base = self.dex.get_base_token(Chain::Solana, token).await.ok().flatten();

        if mint.is_none() && base.is_none() {
            return None;
        }

        let decimals = mint.as_ref().map(|m| m.decimals);
        let total_supply = mint
            .as_ref()
            .and_then(|m| m.supply.map(|s| s as f64 / 10f64.powi(m.decimals as i32)));

        Some(TokenMetadata {
            address: token.to_string(),
            name: base.as_ref().and_then(|b| b.name.clone()),
            symbol: base.as_ref().and_then(|b| b.symbol.clone()),
            decimals,
            total_supply,
        })
    }

    async fn get_top_holders(&self, token: &str, limit: usize) -> Vec<HolderEntry> {
        let mint = match self.fetch_mint_info(token).await {
            Ok(mint) => Some(mint),
            Err(e) => {
                warn!(token, error = %e, "Failed to fetch mint info");
                None
            }
        };

        // DAS amounts are raw, so the scan needs the mint's decimals
        let holders = match &mint {
            Some(info) if !self.config.helius_api_key.is_empty() => {
                match self.das_holders(token, info.decimals).await {
                    Ok(holders) => holders,
                    Err(e) => {
                        warn!(token, error = %e, "Token account scan failed, using largest accounts");
                        self.largest_holders(token, limit).await
                    }
                }
            }
            _ => self.largest_holders(token, limit).await,
        };

        let mut holders = merge_by_owner(Chain::Solana, holders);
        holders.truncate(limit);
        let supply = mint.and_then(|m| m.supply.map(|s| s as f64 / 10f64.powi(m.decimals as i32)));
        assign_supply_percentages(&mut holders, supply);

        debug!(token, holders = holders.len(), "Resolved Solana holders");
        holders
    }

    async fn get_wallet_balance(&self, wallet: &str) -> Option<WalletBalance> {
        let lamports: RpcValue<u64> = match self.rpc("getBalance", serde_json::json!([wallet])).await {
            Ok(value) => value,
            Err(e) => {
                warn!(wallet, error = %e, "Failed to fetch SOL balance");
                return None;
            }
        };

        let mut tokens = Vec::new();
        for program in [TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID] {
            match self.fetch_token_accounts(wallet, program).await {
                Ok(balances) => tokens.extend(balances),
                Err(e) => warn!(wallet, program, error = %e, "Failed to fetch token accounts"),
            }
        }

        Some(WalletBalance {
            native: lamports.value as f64 / LAMPORTS_PER_SOL,
            tokens,
        })
    }

    async fn get_wallet_transactions(
        &self,
        wallet: &str,
        query: TransactionQuery,
    ) -> Vec<TransferEvent> {
        match self.fetch_transactions(wallet, query).await {
            Ok(transactions) => normalize_transactions(&transactions),
            Err(e) => {
                warn!(wallet, error = %e, "Failed to fetch wallet transactions");
                Vec::new()
            }
        }
    }

    async fn get_deployed_tokens(&self, wallet: &str) -> Vec<DeployedToken> {
        let transactions = match self.fetch_transactions(wallet, TransactionQuery::default()).await {
            Ok(transactions) => transactions,
            Err(e) => {
                warn!(wallet, error = %e, "Failed to fetch deployer history");
                return Vec::new();
            }
        };

        let mints = deployed_mints(&transactions, wallet);
        let addresses: Vec<String> = mints.iter().map(|(mint, _, _)| mint.clone()).collect();
        let (pairs, lookup_ok) = match self.dex.get_pairs_batch(Chain::Solana, &addresses).await {
            Ok(pairs) => (pairs, true),
            Err(e) => {
                warn!(wallet, error = %e, "Failed to fetch pairs for deployed tokens");
                (HashMap::new(), false)
            }
        };

        mints
            .into_iter()
            .map(|(mint, tx_hash, deployed_at)| DeployedToken {
                status: classify_lifecycle(pairs.get(&mint), lookup_ok),
                address: mint,
                tx_hash,
                deployed_at,
            })
            .collect()
    }
}

struct MintInfoData {
    decimals: u8,
    /// Raw base units
    supply: Option<u64>,
}

// ============ RPC Response Types ============

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl<T> RpcResponse<T> {
    fn into_result(self, upstream: &str, method: &str) -> Result<T> {
        if let Some(error) = self.error {
            let detail = format!("{} failed ({}): {}", method, error.code, error.message);
            let message = error.message.to_ascii_lowercase();
            if error.code == 429
                || error.code == -32429
                || message.contains("rate limit")
                || message.contains("too many requests")
            {
                return Err(Error::RateLimited(upstream.to_string()));
            }
            // Node unhealthy, behind, or internal failure
            if matches!(error.code, -32603 | -32005 | -32004) {
                return Err(Error::upstream(upstream, detail));
            }
            return Err(Error::rejected(upstream, detail));
        }
        self.result
            .ok_or_else(|| Error::Deserialization(format!("{} returned no result", method)))
    }
}

#[derive(Debug, Deserialize)]
struct RpcValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct DasTokenAccounts {
    #[serde(default)]
    token_accounts: Vec<DasTokenAccount>,
}

#[derive(Debug, Deserialize)]
struct DasTokenAccount {
    owner: String,
    /// Raw base units
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct LargestAccount {
    address: String,
    amount: String,
    decimals: u8,
    #[serde(rename = "uiAmount")]
    ui_amount: Option<f64>,
}

impl LargestAccount {
    fn ui_amount(&self) -> f64 {
        self.ui_amount.unwrap_or_else(|| {
            self.amount.parse::<f64>().unwrap_or(0.0) / 10f64.powi(self.decimals as i32)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    data: AccountData,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountDataRepr {
    Parsed { parsed: ParsedData },
    // Non-parsable accounts come back as [base64, encoding]
    Raw(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(from = "AccountDataRepr")]
struct AccountData {
    parsed: Option<ParsedData>,
}

impl From<AccountDataRepr> for AccountData {
    fn from(repr: AccountDataRepr) -> Self {
        match repr {
            AccountDataRepr::Parsed { parsed } => Self {
                parsed: Some(parsed),
            },
            AccountDataRepr::Raw(_) => Self { parsed: None },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    info: ParsedInfo,
}

/// Union of the token-account and mint fields we read
#[derive(Debug, Default, Deserialize)]
struct ParsedInfo {
    owner: Option<String>,
    mint: Option<String>,
    #[serde(rename = "tokenAmount")]
    token_amount: Option<UiTokenAmount>,
    #[serde(default)]
    decimals: u8,
    supply: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    amount: String,
    decimals: u8,
    #[serde(rename = "uiAmount")]
    ui_amount: Option<f64>,
}

impl UiTokenAmount {
    fn ui_amount(&self) -> f64 {
        self.ui_amount.unwrap_or_else(|| {
            self.amount.parse::<f64>().unwrap_or(0.0) / 10f64.powi(self.decimals as i32)
        })
    }
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    account: ParsedAccount,
}

// ============ Helius API Response Types ============

#[derive(Debug, Clone, Deserialize)]
pub struct HeliusTransaction {
    pub signature: String,
    #[serde(rename = "type")]
    pub r#type: Option<String>,
    pub timestamp: Option<i64>,
    #[serde(rename = "feePayer")]
    pub fee_payer: Option<String>,
    #[serde(rename = "nativeTransfers")]
    pub native_transfers: Option<Vec<NativeTransfer>>,
    #[serde(rename = "tokenTransfers")]
    pub token_transfers: Option<Vec<TokenTransfer>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeTransfer {
    #[serde(rename = "fromUserAccount")]
    pub from_user_account: Option<String>,
    #[serde(rename = "toUserAccount")]
    pub to_user_account: Option<String>,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenTransfer {
    #[serde(rename = "fromUserAccount")]
    pub from_user_account: Option<String>,
    #[serde(rename = "toUserAccount")]
    pub to_user_account: Option<String>,
    pub mint: String,
    #[serde(rename = "tokenAmount")]
    pub token_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_server::{http_source, Request, TestServer};

    const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn helius_json() -> &'static str {
        r#"[
          {"signature":"sig1","type":"SWAP","timestamp":1700000000,"feePayer":"7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
           "nativeTransfers":[{"fromUserAccount":"7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU","toUserAccount":"pool","amount":1500000000}],
           "tokenTransfers":[{"fromUserAccount":"pool","toUserAccount":"7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU","mint":"DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263","tokenAmount":1000.5}]},
          {"signature":"sig2","type":"CREATE","timestamp":1700000100,"feePayer":"7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
           "nativeTransfers":[],
           "tokenTransfers":[{"fromUserAccount":null,"toUserAccount":"curve","mint":"NewMint111","tokenAmount":1000000000.0}]},
          {"signature":"sig3","type":"TRANSFER","timestamp":null}
        ]"#
    }

    #[test]
    fn test_normalize_transactions() {
        let txs: Vec<HeliusTransaction> = serde_json::from_str(helius_json()).unwrap();
        let events = normalize_transactions(&txs);

        let sol: Vec<_> = events.iter().filter(|e| e.asset_id == "SOL").collect();
        assert_eq!(sol.len(), 1);
        assert!((sol[0].amount - 1.5).abs() < 1e-9);
        assert_eq!(sol[0].from_address, WALLET);

        let bonk: Vec<_> = events.iter().filter(|e| e.asset_id == MINT).collect();
        assert_eq!(bonk.len(), 1);
        assert_eq!(bonk[0].to_address, WALLET);
        assert_eq!(bonk[0].tx_hash, "sig1");

        // Mint events have an empty sender
        assert!(events.iter().any(|e| e.asset_id == "NewMint111" && e.from_address.is_empty()));
        // No timestamp, no events
        assert!(events.iter().all(|e| e.tx_hash != "sig3"));
    }

    #[test]
    fn test_deployed_mints() {
        let txs: Vec<HeliusTransaction> = serde_json::from_str(helius_json()).unwrap();

        let mints = deployed_mints(&txs, WALLET);
        assert_eq!(mints.len(), 1);
        assert_eq!(mints[0].0, "NewMint111");
        assert_eq!(mints[0].1, "sig2");

        assert!(deployed_mints(&txs, "someone-else").is_empty());
    }

    #[test]
    fn test_parse_owner_lookup() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":{"context":{"slot":1},"value":[
            {"data":{"parsed":{"info":{"owner":"OwnerA","mint":"M","tokenAmount":{"amount":"5000000","decimals":6,"uiAmount":5.0}},"type":"account"},"program":"spl-token","space":165},"owner":"TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"},
            null,
            {"data":["AAAA","base64"],"owner":"11111111111111111111111111111111"}
        ]}}"#;
        let response: RpcResponse<RpcValue<Vec<Option<ParsedAccount>>>> =
            serde_json::from_str(json).unwrap();
        let accounts = response.result.unwrap().value;

        assert_eq!(accounts.len(), 3);
        let first = accounts[0].as_ref().unwrap().data.parsed.as_ref().unwrap();
        assert_eq!(first.info.owner.as_deref(), Some("OwnerA"));
        assert!(accounts[1].is_none());
        assert!(accounts[2].as_ref().unwrap().data.parsed.is_none());
    }

    #[test]
    fn test_largest_account_ui_amount_fallback() {
        let account = LargestAccount {
            address: "acct".into(),
            amount: "2500000".into(),
            decimals: 6,
            ui_amount: None,
        };
        assert!((account.ui_amount() - 2.5).abs() < 1e-9);
    }

    fn provider(server: &TestServer, helius_api_key: &str, max_retry_elapsed_ms: u64) -> SolanaProvider {
        let http = http_source(max_retry_elapsed_ms);
        let dex = Arc::new(DexScreenerClient::new(http.clone(), server.url.clone()));
        SolanaProvider::new(
            http,
            dex,
            SolanaConfig {
                rpc_endpoint: server.url.clone(),
                helius_api_key: helius_api_key.into(),
                helius_base_url: server.url.clone(),
                das_endpoint: server.url.clone(),
                holder_scan_pages: 5,
            },
            2,
        )
    }

    fn rpc_result(result: serde_json::Value) -> (u16, String) {
        (200, serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
    }

    fn rpc_error(code: i64, message: &str) -> (u16, String) {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": code, "message": message },
        });
        (200, body.to_string())
    }

    fn mint_account() -> (u16, String) {
        rpc_result(serde_json::json!({ "value": {
            "data": { "parsed": { "info": { "decimals": 6, "supply": "1000000000" }, "type": "mint" }, "program": "spl-token" },
            "owner": TOKEN_PROGRAM_ID,
        }}))
    }

    fn token_account(owner: &str, ui_amount: f64) -> serde_json::Value {
        serde_json::json!({
            "data": { "parsed": { "info": { "owner": owner, "mint": MINT,
                "tokenAmount": { "amount": "0", "decimals": 6, "uiAmount": ui_amount } }, "type": "account" } },
            "owner": TOKEN_PROGRAM_ID,
        })
    }

    #[tokio::test]
    async fn test_rpc_throttle_body_is_retried() {
        let server = TestServer::start(|request: &Request| match (request.method(), request.index) {
            ("getBalance", 0) => rpc_error(-32429, "rate limited"),
            ("getBalance", _) => rpc_result(serde_json::json!({ "value": 2_000_000_000u64 })),
            _ => rpc_result(serde_json::json!({ "value": [] })),
        })
        .await;

        let balance = provider(&server, "", 2_000).get_wallet_balance(WALLET).await.unwrap();

        assert!((balance.native - 2.0).abs() < 1e-12);
        // Throttled, retried, then one account lookup per token program
        assert_eq!(server.requests(), 4);
    }

    #[tokio::test]
    async fn test_rpc_rejection_is_not_retried() {
        let server = TestServer::start(|_| rpc_error(-32602, "Invalid param: WrongSize")).await;

        assert!(provider(&server, "", 2_000).get_wallet_balance(WALLET).await.is_none());
        assert_eq!(server.requests(), 1);
    }

    #[tokio::test]
    async fn test_server_error_yields_no_holders() {
        let server = TestServer::start(|_| (500, "{}".into())).await;

        let holders = provider(&server, "", 100).get_top_holders(MINT, 50).await;

        assert!(holders.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_yields_no_metadata() {
        let server = TestServer::start(|_| (200, "{not json".into())).await;

        assert!(provider(&server, "", 100).get_token_metadata(MINT).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_owner_batch_drops_only_its_holders() {
        let server = TestServer::start(|request: &Request| match request.method() {
            "getAccountInfo" => mint_account(),
            "getTokenLargestAccounts" => rpc_result(serde_json::json!({ "value": [
                { "address": "acct1", "amount": "40000000", "decimals": 6, "uiAmount": 40.0 },
                { "address": "acct2", "amount": "30000000", "decimals": 6, "uiAmount": 30.0 },
                { "address": "acct3", "amount": "20000000", "decimals": 6, "uiAmount": 20.0 },
                { "address": "acct4", "amount": "10000000", "decimals": 6, "uiAmount": 10.0 },
            ]})),
            "getMultipleAccounts" if request.body["params"][0][0] == "acct3" => {
                rpc_error(-32602, "Invalid param")
            }
            "getMultipleAccounts" => rpc_result(serde_json::json!({ "value": [
                token_account("OwnerA", 40.0),
                token_account("OwnerB", 30.0),
            ]})),
            _ => (404, "{}".into()),
        })
        .await;

        let holders = provider(&server, "", 100).get_top_holders(MINT, 50).await;

        let owners: Vec<_> = holders.iter().map(|h| h.owner_address.as_str()).collect();
        assert_eq!(owners, vec!["OwnerA", "OwnerB"]);
        // Supply is 1000 UI units
        assert!((holders[0].percentage_of_supply - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_token_account_scan_honours_limit_past_largest_accounts() {
        let server = TestServer::start(|request: &Request| match request.method() {
            "getAccountInfo" => mint_account(),
            "getTokenAccounts" => {
                let page = request.body["params"]["page"].as_u64().unwrap_or(1) as usize;
                let rows = if page == 1 { DAS_PAGE_LIMIT } else { 30 };
                let offset = (page - 1) * DAS_PAGE_LIMIT;
                let accounts: Vec<_> = (offset..offset + rows)
                    .map(|i| serde_json::json!({
                        "address": format!("acct{}", i),
                        "mint": MINT,
                        "owner": format!("Owner{}", i % 1000),
                        "amount": (i as u64 + 1) * 1_000_000,
                    }))
                    .collect();
                rpc_result(serde_json::json!({ "page": page, "limit": DAS_PAGE_LIMIT, "token_accounts": accounts }))
            }
            _ => (404, "{}".into()),
        })
        .await;

        let holders = provider(&server, "test-key", 100).get_top_holders(MINT, 50).await;

        assert_eq!(holders.len(), 50);
        // Owner0..Owner29 hold one account on each page; the larger one wins
        assert_eq!(holders[0].owner_address, "Owner29");
        assert_eq!(holders[0].balance, 1030.0);
        assert!(holders.windows(2).all(|w| w[0].balance >= w[1].balance));
        // Mint lookup plus two scanned pages
        assert_eq!(server.requests(), 3);
    }
}
