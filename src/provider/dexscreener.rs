// DexScreener API client for price, liquidity and market-cap lookups
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::chain::Chain;
use crate::config::UPSTREAM_DEXSCREENER;
use crate::error::Result;
use crate::provider::http::HttpSource;
use crate::types::PairData;

/// Max token addresses per batched lookup
const BATCH_LIMIT: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    pub url: Option<String>,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceNative")]
    pub price_native: Option<String>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    #[serde(rename = "fdv")]
    pub fdv: Option<f64>,
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    /// Convert to the provider-neutral pair record
    pub fn to_pair_data(&self) -> PairData {
        PairData {
            pair_address: self.pair_address.clone(),
            dex_id: self.dex_id.clone(),
            price_usd: self.price_usd.as_ref().and_then(|p| p.parse::<f64>().ok()),
            price_native: self.price_native.as_ref().and_then(|p| p.parse::<f64>().ok()),
            liquidity_usd: self.liquidity.as_ref().and_then(|l| l.usd),
            market_cap: self.market_cap,
            fdv: self.fdv,
            volume_24h: self.volume.as_ref().and_then(|v| v.h24),
            price_change_24h: self.price_change.as_ref().and_then(|pc| pc.h24),
            pair_created_at: self
                .pair_created_at
                .and_then(DateTime::from_timestamp_millis),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// Pick the deepest-liquidity pair on `chain` whose base token is `token`
pub fn best_pair<'a>(chain: Chain, token: &str, pairs: &'a [DexPair]) -> Option<&'a DexPair> {
    pairs
        .iter()
        .filter(|p| p.chain_id == chain.dexscreener_id())
        .filter(|p| chain.same_address(&p.base_token.address, token))
        .max_by(|a, b| {
            a.liquidity_usd()
                .partial_cmp(&b.liquidity_usd())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

pub struct DexScreenerClient {
    http: HttpSource,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new(http: HttpSource, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Fetch the main pair for a token
    pub async fn get_pair_data(&self, chain: Chain, token: &str) -> Result<Option<PairData>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token);
        let data: TokenPairsResponse = self.http.get_json(UPSTREAM_DEXSCREENER, &url, &[]).await?;

        let pairs = data.pairs.unwrap_or_default();
        let pair = best_pair(chain, token, &pairs).map(DexPair::to_pair_data);
        debug!(%chain, token, found = pair.is_some(), "Fetched DexScreener pair");
        Ok(pair)
    }

    /// Fetch the raw pair (includes name/symbol of the base token)
    pub async fn get_base_token(&self, chain: Chain, token: &str) -> Result<Option<BaseToken>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token);
        let data: TokenPairsResponse = self.http.get_json(UPSTREAM_DEXSCREENER, &url, &[]).await?;
        let pairs = data.pairs.unwrap_or_default();
        Ok(best_pair(chain, token, &pairs).map(|p| p.base_token.clone()))
    }

    /// Batched pair lookup, keyed by normalized token address.
    /// Tokens without a pair are absent from the map.
    pub async fn get_pairs_batch(
        &self,
        chain: Chain,
        tokens: &[String],
    ) -> Result<HashMap<String, PairData>> {
        let mut result = HashMap::new();

        for chunk in tokens.chunks(BATCH_LIMIT) {
            let url = format!(
                "{}/tokens/v1/{}/{}",
                self.base_url,
                chain.dexscreener_id(),
                chunk.join(",")
            );
            let pairs: Vec<DexPair> = self.http.get_json(UPSTREAM_DEXSCREENER, &url, &[]).await?;

            for token in chunk {
                if let Some(pair) = best_pair(chain, token, &pairs) {
                    result.insert(chain.normalize_address(token), pair.to_pair_data());
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(chain: &str, base: &str, liquidity: f64, price: &str) -> DexPair {
        DexPair {
            chain_id: chain.to_string(),
            dex_id: "uniswap".to_string(),
            url: None,
            pair_address: format!("pair-{}", liquidity),
            base_token: BaseToken {
                address: base.to_string(),
                name: Some("Pepe".to_string()),
                symbol: Some("PEPE".to_string()),
            },
            price_native: None,
            price_usd: Some(price.to_string()),
            price_change: None,
            volume: None,
            liquidity: Some(Liquidity {
                usd: Some(liquidity),
                base: None,
                quote: None,
            }),
            market_cap: Some(1_000_000.0),
            fdv: None,
            pair_created_at: Some(1_700_000_000_000),
        }
    }

    #[test]
    fn test_best_pair_prefers_liquidity_on_chain() {
        let token = "0x6982508145454ce325ddbe47a25d4ec3d2311933";
        let pairs = vec![
            pair("ethereum", token, 1_000.0, "0.1"),
            pair("ethereum", &token.to_uppercase().replace("0X", "0x"), 50_000.0, "0.2"),
            pair("bsc", token, 900_000.0, "0.3"),
        ];

        let best = best_pair(Chain::Ethereum, token, &pairs).unwrap();
        assert_eq!(best.pair_address, "pair-50000");
    }

    #[test]
    fn test_pair_data_conversion() {
        let data = pair("solana", "mint", 10.0, "not-a-number").to_pair_data();
        assert_eq!(data.price_usd, None);
        assert_eq!(data.liquidity_usd, Some(10.0));
        assert!(data.pair_created_at.is_some());
    }

    #[test]
    fn test_pairs_response_deserialize() {
        let json = r#"{"pairs":[{"chainId":"solana","dexId":"raydium","pairAddress":"p1",
            "baseToken":{"address":"m1","name":"A","symbol":"A"},"priceUsd":"1.5",
            "liquidity":{"usd":1200.0},"marketCap":5000.0}]}"#;
        let response: TokenPairsResponse = serde_json::from_str(json).unwrap();
        let pairs = response.pairs.unwrap();
        let best = best_pair(Chain::Solana, "m1", &pairs).unwrap();
        assert_eq!(best.to_pair_data().price_usd, Some(1.5));
    }
}
