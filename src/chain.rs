//! Supported chains and address handling
//!
//! Address normalization is the identity key for every cross-token join,
//! so all comparisons of wallet/token addresses go through [`Chain::normalize_address`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    static ref EVM_ADDRESS: Regex =
        Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Invalid EVM address regex");
}

/// Stablecoins counted toward a trader's stablecoin holdings
const SOLANA_STABLES: &[&str] = &[
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", // USDC
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", // USDT
];
const ETHEREUM_STABLES: &[&str] = &[
    "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", // USDC
    "0xdac17f958d2ee523a2206206994597c13d831ec7", // USDT
    "0x6b175474e89094c44da98b954eedeac495271d0f", // DAI
];
const BASE_STABLES: &[&str] = &[
    "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", // USDC
];
const BSC_STABLES: &[&str] = &[
    "0x55d398326f99059ff775485246999027b3197955", // USDT
    "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d", // USDC
];

/// The configured set of chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Ethereum,
    Base,
    Bsc,
}

impl Chain {
    pub const ALL: [Chain; 4] = [Chain::Solana, Chain::Ethereum, Chain::Base, Chain::Bsc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Bsc => "bsc",
        }
    }

    /// EVM chains use case-insensitive hex addresses
    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Solana)
    }

    /// Asset id used in transfer events for the chain's native coin
    pub fn native_asset(&self) -> &'static str {
        match self {
            Chain::Solana => "SOL",
            Chain::Ethereum | Chain::Base => "ETH",
            Chain::Bsc => "BNB",
        }
    }

    /// Chain id as used by DexScreener
    pub fn dexscreener_id(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Bsc => "bsc",
        }
    }

    /// Numeric chain id for the Etherscan v2 API
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Chain::Solana => None,
            Chain::Ethereum => Some(1),
            Chain::Base => Some(8453),
            Chain::Bsc => Some(56),
        }
    }

    /// Known stablecoin token addresses (normalized)
    pub fn stablecoins(&self) -> &'static [&'static str] {
        match self {
            Chain::Solana => SOLANA_STABLES,
            Chain::Ethereum => ETHEREUM_STABLES,
            Chain::Base => BASE_STABLES,
            Chain::Bsc => BSC_STABLES,
        }
    }

    pub fn is_stablecoin(&self, address: &str) -> bool {
        let normalized = self.normalize_address(address);
        self.stablecoins().iter().any(|s| *s == normalized)
    }

    /// Canonical form of an address: case-folded on EVM, exact on Solana
    pub fn normalize_address(&self, address: &str) -> String {
        let trimmed = address.trim();
        if self.is_evm() {
            trimmed.to_ascii_lowercase()
        } else {
            trimmed.to_string()
        }
    }

    pub fn same_address(&self, a: &str, b: &str) -> bool {
        self.normalize_address(a) == self.normalize_address(b)
    }

    /// Check that an address is well formed for this chain
    pub fn is_valid_address(&self, address: &str) -> bool {
        if self.is_evm() {
            return EVM_ADDRESS.is_match(address);
        }
        matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
    }

    /// Validate and normalize an address, rejecting malformed input
    pub fn parse_address(&self, address: &str) -> Result<String> {
        let trimmed = address.trim();
        if !self.is_valid_address(trimmed) {
            return Err(Error::InvalidAddress {
                chain: self.to_string(),
                address: address.to_string(),
            });
        }
        Ok(self.normalize_address(trimmed))
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solana" | "sol" => Ok(Chain::Solana),
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "base" => Ok(Chain::Base),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            other => Err(Error::UnsupportedChain(other.to_string())),
        }
    }
}

/// A token on a specific chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenSpec {
    pub chain: Chain,
    /// Normalized token address
    pub address: String,
}

impl TokenSpec {
    /// Create a token spec, validating and normalizing the address
    pub fn new(chain: Chain, address: &str) -> Result<Self> {
        Ok(Self {
            chain,
            address: chain.parse_address(address)?,
        })
    }

    /// Parse `<chain>:<address>`
    pub fn parse(spec: &str) -> Result<Self> {
        let (chain, address) = spec
            .split_once(':')
            .ok_or_else(|| Error::InvalidTokenSpec(spec.to_string()))?;
        Self::new(chain.parse()?, address)
    }

    /// Key used for grouping holdings across tokens
    pub fn key(&self) -> String {
        format!("{}:{}", self.chain, self.address)
    }
}

impl fmt::Display for TokenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
    const PEPE: &str = "0x6982508145454Ce325dDbE47a25d4ec3d2311933";

    #[test]
    fn test_parse_chain() {
        assert_eq!("Solana".parse::<Chain>().unwrap(), Chain::Solana);
        assert_eq!("eth".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert!(matches!(
            "tron".parse::<Chain>(),
            Err(Error::UnsupportedChain(_))
        ));
    }

    #[test]
    fn test_evm_addresses_case_fold() {
        let chain = Chain::Ethereum;
        assert!(chain.same_address(PEPE, &PEPE.to_ascii_lowercase()));
        assert_eq!(
            chain.parse_address(PEPE).unwrap(),
            "0x6982508145454ce325ddbe47a25d4ec3d2311933"
        );
        assert!(chain.parse_address("0x1234").is_err());
    }

    #[test]
    fn test_solana_addresses_exact() {
        let chain = Chain::Solana;
        assert!(chain.is_valid_address(BONK));
        assert!(!chain.same_address(BONK, &BONK.to_ascii_lowercase()));
        assert!(chain.parse_address("not-base58-0OIl").is_err());
    }

    #[test]
    fn test_token_spec_parse() {
        let spec = TokenSpec::parse(&format!("eth:{}", PEPE)).unwrap();
        assert_eq!(spec.chain, Chain::Ethereum);
        assert_eq!(spec.key(), "ethereum:0x6982508145454ce325ddbe47a25d4ec3d2311933");

        assert!(matches!(
            TokenSpec::parse(PEPE),
            Err(Error::InvalidTokenSpec(_))
        ));
    }

    #[test]
    fn test_stablecoin_lookup() {
        assert!(Chain::Ethereum.is_stablecoin("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"));
        assert!(!Chain::Ethereum.is_stablecoin(PEPE));
        assert!(Chain::Solana.is_stablecoin("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"));
    }
}
