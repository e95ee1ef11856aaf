//! Ledger client boundary
//!
//! The orchestrator only sees `Ledger`: balance reads and swap dispatch.
//! `RpcLedger` is the production implementation (Solana RPC for balances,
//! PumpPortal local API to build swaps, signed locally).
//!
//! Every method must be safe to retry on another endpoint.

pub mod pumpportal;
pub mod rpc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::fmt;

use crate::error::Result;
use crate::keystore::Participant;
use crate::pool::retry::Labeled;

pub use pumpportal::{PoolType, PumpPortalClient};
pub use rpc::RpcLedger;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    if sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// Direction of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapSide {
    Buy,
    Sell,
}

impl fmt::Display for SwapSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapSide::Buy => f.write_str("buy"),
            SwapSide::Sell => f.write_str("sell"),
        }
    }
}

/// One participant's swap
#[derive(Debug, Clone, Copy)]
pub struct SwapOrder<'a> {
    pub participant: &'a Participant,
    pub side: SwapSide,
    /// Lamports to spend for a buy, raw token units to sell
    pub amount: u64,
}

/// Settings shared by every swap in a run
#[derive(Debug, Clone)]
pub struct SwapParams {
    pub mint: Pubkey,
    pub token_decimals: u8,
    pub slippage_bps: u32,
    pub priority_fee_lamports: u64,
    pub pool: PoolType,
    /// Simulate instead of sending
    pub dry_run: bool,
}

/// A redundant ledger endpoint
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Endpoint identifier for logs
    fn endpoint(&self) -> &str;

    /// Native balance in lamports
    async fn get_balance(&self, owner: &Pubkey) -> Result<u64>;

    /// Token balance in raw units; zero when the token account does not exist
    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64>;

    /// Build, sign and submit (or simulate) a swap
    async fn dispatch_swap(&self, order: &SwapOrder<'_>, params: &SwapParams) -> Result<Signature>;
}

impl Labeled for dyn Ledger {
    fn label(&self) -> String {
        self.endpoint().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sol_conversions() {
        assert_eq!(sol_to_lamports(1.5), 1_500_000_000);
        assert_eq!(sol_to_lamports(-1.0), 0);
        assert_eq!(lamports_to_sol(250_000_000), 0.25);
    }
}
