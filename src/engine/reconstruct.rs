//! Trade reconstruction
//!
//! Turns a wallet's raw transfer history into buy/sell tranches for one target
//! asset. Nothing in the source data says "this was a trade", so the side is
//! inferred from the wallet's net signed change of the target asset within each
//! transaction:
//! - net > 0: buy of `net`
//! - net < 0: sell of `|net|`
//! - net == 0 (round trips, self transfers): no tranche
//!
//! When the wallet also moved another asset in the same transaction the tranche
//! is a swap, and the largest opposite-direction movement is recorded as its
//! quote leg (what was paid or received for it).

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::chain::TokenSpec;
use crate::types::{
    CounterpartySource, TokenTradeHistory, TradeKind, TradeSide, TradeTranche, TransferEvent,
};

/// Net changes at or below this magnitude are treated as zero
pub const DUST_THRESHOLD: f64 = 1e-12;

/// Per-transaction flows of the wallet
#[derive(Default)]
struct TxFlow {
    timestamp: Option<DateTime<Utc>>,
    target_deltas: Vec<f64>,
    other_deltas: HashMap<String, Vec<f64>>,
    counterparties: Vec<String>,
}

impl TxFlow {
    fn observe_time(&mut self, ts: DateTime<Utc>) {
        self.timestamp = Some(self.timestamp.map_or(ts, |cur| cur.min(ts)));
    }
}

/// Order-independent sum: sorting first makes the float result
/// identical under any permutation of the inputs
fn stable_sum(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.iter().sum()
}

/// Reconstruct a wallet's trade history for one asset.
///
/// `current_balance` is the live on-chain balance; when transfer history is
/// unavailable the result is an empty history carrying just that balance.
pub fn reconstruct_trade_history(
    wallet: &str,
    token: &TokenSpec,
    transfers: &[TransferEvent],
    current_balance: f64,
) -> TokenTradeHistory {
    let chain = token.chain;
    let wallet = chain.normalize_address(wallet);

    // BTreeMap keeps iteration independent of input order
    let mut flows: BTreeMap<&str, TxFlow> = BTreeMap::new();

    for event in transfers {
        if !(event.amount.is_finite() && event.amount > 0.0) {
            continue;
        }
        let incoming = chain.same_address(&event.to_address, &wallet);
        let outgoing = chain.same_address(&event.from_address, &wallet);
        if !incoming && !outgoing {
            continue;
        }

        let delta = match (incoming, outgoing) {
            (true, false) => event.amount,
            (false, true) => -event.amount,
            _ => 0.0,
        };

        let flow = flows.entry(event.tx_hash.as_str()).or_default();
        flow.observe_time(event.timestamp);

        if chain.same_address(&event.asset_id, &token.address) {
            flow.target_deltas.push(delta);
            let other_side = if incoming && !outgoing {
                &event.from_address
            } else {
                &event.to_address
            };
            if !other_side.is_empty() && !chain.same_address(other_side, &wallet) {
                flow.counterparties.push(chain.normalize_address(other_side));
            }
        } else {
            // The native asset id is a symbol, not an address
            let asset = if event.asset_id == chain.native_asset() {
                event.asset_id.clone()
            } else {
                chain.normalize_address(&event.asset_id)
            };
            flow.other_deltas.entry(asset).or_default().push(delta);
        }
    }

    let mut tranches: Vec<TradeTranche> = flows
        .into_iter()
        .filter(|(_, flow)| !flow.target_deltas.is_empty())
        .filter_map(|(tx_hash, flow)| build_tranche(tx_hash, flow))
        .collect();

    tranches.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.tx_hash.cmp(&b.tx_hash))
    });

    let buys: Vec<f64> = tranches.iter().filter(|t| t.is_buy()).map(|t| t.amount).collect();
    let sells: Vec<f64> = tranches.iter().filter(|t| !t.is_buy()).map(|t| t.amount).collect();

    let history = TokenTradeHistory {
        asset: token.clone(),
        wallet,
        total_bought: stable_sum(&buys),
        total_sold: stable_sum(&sells),
        current_balance,
        tranches,
    };

    debug!(
        wallet = %history.wallet,
        token = %token,
        tranches = history.tranches.len(),
        bought = history.total_bought,
        sold = history.total_sold,
        "Reconstructed trade history"
    );

    history
}

fn build_tranche(tx_hash: &str, mut flow: TxFlow) -> Option<TradeTranche> {
    let net = stable_sum(&flow.target_deltas);
    if net.abs() <= DUST_THRESHOLD {
        return None;
    }
    let timestamp = flow.timestamp?;
    let side = if net > 0.0 {
        TradeSide::Buy
    } else {
        TradeSide::Sell
    };

    let other_nets: Vec<(String, f64)> = flow
        .other_deltas
        .into_iter()
        .map(|(asset, deltas)| (asset, stable_sum(&deltas)))
        .filter(|(_, n)| n.abs() > DUST_THRESHOLD)
        .collect();

    let counterparty_source = if other_nets.is_empty() {
        flow.counterparties.sort();
        flow.counterparties.dedup();
        CounterpartySource {
            kind: TradeKind::Transfer,
            counterparty: flow.counterparties.into_iter().next(),
            quote_asset: None,
            quote_amount: None,
        }
    } else {
        // Buys are paid with outflows, sells are paid out as inflows
        let quote = other_nets
            .iter()
            .filter(|(_, n)| (*n < 0.0) == (side == TradeSide::Buy))
            .max_by(|a, b| {
                a.1.abs()
                    .total_cmp(&b.1.abs())
                    .then_with(|| b.0.cmp(&a.0))
            });
        CounterpartySource {
            kind: TradeKind::Swap,
            counterparty: None,
            quote_asset: quote.map(|(asset, _)| asset.clone()),
            quote_amount: quote.map(|(_, n)| n.abs()),
        }
    };

    Some(TradeTranche {
        tx_hash: tx_hash.to_string(),
        timestamp,
        amount: net.abs(),
        side,
        counterparty_source,
    })
}
