//! CLI command implementations

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::{Chain, TokenSpec};
use crate::config::Config;
use crate::service::IntelService;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_tokens(specs: &[String]) -> crate::error::Result<Vec<TokenSpec>> {
    specs.iter().map(|s| TokenSpec::parse(s)).collect()
}

/// Metadata, main pair and lifecycle status of a token
pub async fn token(config: &Config, token: &str) -> Result<()> {
    let token = TokenSpec::parse(token)?;
    let service = IntelService::from_config(config.clone())?;

    let overview = service.token_overview(&token).await?;
    if overview.pair.is_none() {
        warn!(token = %token, "No trading pair found");
    }
    print_json(&overview)
}

/// Reconstructed buy/sell history of a wallet for one token
pub async fn history(config: &Config, token: &str, wallet: &str) -> Result<()> {
    let token = TokenSpec::parse(token)?;
    let service = IntelService::from_config(config.clone())?;

    info!(token = %token, wallet, "Reconstructing trade history");
    let history = service.trade_history(wallet, &token).await?;
    if history.tranches.is_empty() {
        warn!(token = %token, wallet, "No trades found");
    }
    print_json(&history)
}

/// Top holders of a token ranked by realized PNL
pub async fn top_traders(config: &Config, token: &str, limit: usize) -> Result<()> {
    let token = TokenSpec::parse(token)?;
    let service = IntelService::from_config(config.clone())?;

    info!(token = %token, "Computing top traders");
    let mut traders = service.top_traders(&token).await?;
    traders.truncate(limit);
    print_json(&traders)
}

/// Wallets holding several of the given tokens, or one wallet's history across them
pub async fn common(config: &Config, tokens: &[String], wallet: Option<&str>) -> Result<()> {
    let tokens = parse_tokens(tokens)?;
    let service = IntelService::from_config(config.clone())?;

    match wallet {
        Some(wallet) => {
            info!(tokens = tokens.len(), wallet, "Fetching common-trader history");
            let histories = service.common_trader_history(wallet, &tokens).await?;
            print_json(&histories)
        }
        None => {
            info!(tokens = tokens.len(), "Computing common traders");
            let common = service.common_traders(&tokens).await?;
            print_json(&common)
        }
    }
}

/// Reputation score of a token deployer
pub async fn deployer(config: &Config, chain: &str, wallet: &str) -> Result<()> {
    let chain: Chain = chain.parse()?;
    let service = IntelService::from_config(config.clone())?;

    let report = service.deployer_score(chain, wallet).await?;
    debug!(
        chain = %report.chain,
        grade = ?report.score.grade,
        risk = ?report.score.risk_level,
        "Deployer report ready"
    );
    print_json(&report)
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
