//! Analysis engines
//!
//! Pure, side-effect-free computations over already-fetched, chain-normalized
//! data. Network access lives in `provider`; orchestration in `service`.

pub mod batch;
pub mod deployer;
pub mod intersect;
pub mod pnl;
pub mod reconstruct;

pub use batch::in_batches;
pub use deployer::score_deployer;
pub use intersect::{intersect_holders, TokenHolders};
pub use pnl::{compute_top_trader, compute_top_traders, rank_top_traders, tier_for_pnl, PriceContext, TraderInput};
pub use reconstruct::reconstruct_trade_history;
