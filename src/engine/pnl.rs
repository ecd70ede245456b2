//! PNL & tiering
//!
//! Turns a reconstructed history plus current price context into a
//! [`TopTrader`] record. All USD figures use the *current* price; there is no
//! historical price feed, so `avg_buy_amount_usd` is a proxy, not a VWAP.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::chain::TokenSpec;
use crate::types::{HolderEntry, PairData, Tier, TokenTradeHistory, TopTrader, WalletBalance};

// Tier thresholds on |realized PNL USD|
pub const WHALE_USD: f64 = 50_000.0;
pub const DOLPHIN_USD: f64 = 10_000.0;
pub const FISH_USD: f64 = 1_000.0;
pub const CRAB_USD: f64 = 100.0;

/// Current market context for a token
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceContext {
    pub price_usd: Option<f64>,
    pub market_cap: Option<f64>,
}

impl PriceContext {
    pub fn from_pair(pair: Option<&PairData>) -> Self {
        match pair {
            Some(pair) => Self {
                price_usd: pair.price_usd.filter(|p| p.is_finite() && *p > 0.0),
                market_cap: pair.market_cap.or(pair.fdv).filter(|m| *m > 0.0),
            },
            None => Self::default(),
        }
    }

    /// `amount * price` when the price is known
    pub fn value_of(&self, amount: f64) -> Option<f64> {
        self.price_usd.map(|price| amount * price)
    }
}

/// Everything needed to score one holder
#[derive(Debug, Clone)]
pub struct TraderInput {
    pub holder: HolderEntry,
    pub history: TokenTradeHistory,
    /// `None` when the balance lookup failed
    pub wallet_balance: Option<WalletBalance>,
}

/// Tier by absolute USD PNL
pub fn tier_for_pnl(pnl_usd: f64) -> Tier {
    let magnitude = pnl_usd.abs();
    if magnitude >= WHALE_USD {
        Tier::Whale
    } else if magnitude >= DOLPHIN_USD {
        Tier::Dolphin
    } else if magnitude >= FISH_USD {
        Tier::Fish
    } else if magnitude >= CRAB_USD {
        Tier::Crab
    } else {
        Tier::Shrimp
    }
}

/// Stablecoins are valued at $1
fn stablecoin_holdings(token: &TokenSpec, balance: Option<&WalletBalance>) -> f64 {
    balance
        .map(|b| {
            b.tokens
                .iter()
                .filter(|t| token.chain.is_stablecoin(&t.token_address))
                .map(|t| t.amount)
                .sum()
        })
        .unwrap_or(0.0)
}

/// Build the trader record for one holder
pub fn compute_top_trader(input: &TraderInput, price: &PriceContext) -> TopTrader {
    let history = &input.history;
    let token = &history.asset;

    let buy_count = history.buy_count();
    let sell_count = history.sell_count();
    let avg_buy_amount = if buy_count > 0 {
        history.total_bought / buy_count as f64
    } else {
        0.0
    };

    let realized_pnl_in_asset = history.realized_value_proxy();
    // Unknown price reports zero rather than unknown
    let realized_pnl_usd = price.value_of(realized_pnl_in_asset).unwrap_or(0.0);

    let balance = history.current_balance;
    let holding_value_usd = price.value_of(balance);
    let share_of_market_cap = holding_value_usd
        .zip(price.market_cap)
        .map(|(value, market_cap)| value / market_cap);

    TopTrader {
        wallet: input.holder.owner_address.clone(),
        token: token.clone(),
        balance,
        percentage_of_supply: input.holder.percentage_of_supply,
        holding_value_usd,
        share_of_market_cap,
        stablecoin_holdings_usd: stablecoin_holdings(token, input.wallet_balance.as_ref()),
        native_balance: input.wallet_balance.as_ref().map_or(0.0, |b| b.native),
        total_bought: history.total_bought,
        total_sold: history.total_sold,
        avg_buy_amount,
        avg_buy_amount_usd: price.value_of(avg_buy_amount),
        realized_pnl_in_asset,
        realized_pnl_usd,
        unrealized_pnl_in_asset: balance,
        unrealized_pnl_usd: holding_value_usd,
        tier: tier_for_pnl(realized_pnl_usd),
        buy_count,
        sell_count,
        trade_count: history.tranches.len(),
        last_trade_timestamp: history.last_trade(),
    }
}

/// Sort by realized USD PNL, then balance, both descending
pub fn rank_top_traders(traders: &mut [TopTrader]) {
    traders.sort_by(|a, b| {
        b.realized_pnl_usd
            .partial_cmp(&a.realized_pnl_usd)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.balance.partial_cmp(&a.balance).unwrap_or(Ordering::Equal))
            .then_with(|| a.wallet.cmp(&b.wallet))
    });
}

/// Score every holder and rank the result
pub fn compute_top_traders(inputs: &[TraderInput], price: &PriceContext) -> Vec<TopTrader> {
    let mut traders: Vec<TopTrader> = inputs
        .iter()
        .map(|input| compute_top_trader(input, price))
        .collect();
    rank_top_traders(&mut traders);
    traders
}
