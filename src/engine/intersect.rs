//! Common-trader intersection
//!
//! Groups resolved holder records by owner across the requested tokens and
//! keeps owners that appear in two or more of them.

use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::chain::TokenSpec;
use crate::types::{CommonTrader, HolderEntry, TokenHolding};

/// Holder set of one requested token
#[derive(Debug, Clone)]
pub struct TokenHolders {
    pub token: TokenSpec,
    pub price_usd: Option<f64>,
    /// Owners already resolved by the provider
    pub holders: Vec<HolderEntry>,
}

/// Owners present in at least `min_tokens` of the holder sets, best first,
/// capped at `cap` results.
pub fn intersect_holders(sets: &[TokenHolders], min_tokens: usize, cap: usize) -> Vec<CommonTrader> {
    // owner -> token index -> best holder row
    let mut by_owner: HashMap<String, HashMap<usize, &HolderEntry>> = HashMap::new();

    for (index, set) in sets.iter().enumerate() {
        for holder in &set.holders {
            if holder.owner_address.is_empty() {
                continue;
            }
            let owner = set.token.chain.normalize_address(&holder.owner_address);
            let held = by_owner.entry(owner).or_default();
            match held.get(&index) {
                Some(existing) if existing.balance >= holder.balance => {}
                _ => {
                    held.insert(index, holder);
                }
            }
        }
    }

    let min_tokens = min_tokens.max(2);
    let mut traders: Vec<CommonTrader> = by_owner
        .into_iter()
        .filter(|(_, held)| held.len() >= min_tokens)
        .map(|(owner, held)| {
            let mut indices: Vec<usize> = held.keys().copied().collect();
            indices.sort_unstable();

            let per_token_holdings: Vec<TokenHolding> = indices
                .into_iter()
                .map(|index| {
                    let set = &sets[index];
                    let holder = held[&index];
                    TokenHolding {
                        token: set.token.clone(),
                        balance: holder.balance,
                        percentage_of_supply: holder.percentage_of_supply,
                        price_usd: set.price_usd,
                        value_usd: set.price_usd.map(|price| holder.balance * price),
                    }
                })
                .collect();

            let total_value_usd = per_token_holdings
                .iter()
                .map(|h| h.value_usd.unwrap_or(0.0))
                .sum();

            CommonTrader {
                wallet_address: owner,
                token_count: per_token_holdings.len(),
                per_token_holdings,
                total_value_usd,
            }
        })
        .collect();

    traders.sort_by(|a, b| {
        b.token_count
            .cmp(&a.token_count)
            .then_with(|| {
                b.total_value_usd
                    .partial_cmp(&a.total_value_usd)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.wallet_address.cmp(&b.wallet_address))
    });
    traders.truncate(cap);

    debug!(
        tokens = sets.len(),
        common = traders.len(),
        "Intersected holder sets"
    );

    traders
}
