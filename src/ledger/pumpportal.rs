//! PumpPortal local trade API client
//!
//! The local API returns an unsigned transaction for a trade; signing and
//! submission stay on our side so each participant signs with its own key.
//!
//! API Documentation: https://pumpportal.fun/trading-api/

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

use super::{lamports_to_sol, SwapOrder, SwapParams, SwapSide};

/// PumpPortal Local Transaction API endpoint (build your own tx)
pub const PUMPPORTAL_LOCAL_API_URL: &str = "https://pumpportal.fun/api/trade-local";

/// Pool type for trading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Pump,
    Raydium,
    #[serde(rename = "pump-amm")]
    PumpAmm,
    Auto,
}

impl Default for PoolType {
    fn default() -> Self {
        Self::Auto
    }
}

/// Local trade request (returns unsigned transaction)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTradeRequest {
    /// "buy" or "sell"
    pub action: SwapSide,
    /// Token mint address
    pub mint: String,
    /// Amount (SOL for buy, tokens for sell)
    pub amount: String,
    /// true if amount is in SOL
    pub denominated_in_sol: String,
    /// Slippage percentage
    pub slippage: u32,
    /// Priority fee in SOL
    pub priority_fee: f64,
    /// Public key of the trader
    pub public_key: String,
    /// Pool to use
    pub pool: PoolType,
}

impl LocalTradeRequest {
    /// Build the request for one participant's swap
    pub fn for_order(order: &SwapOrder<'_>, params: &SwapParams) -> Self {
        let (amount, denominated_in_sol) = match order.side {
            SwapSide::Buy => (lamports_to_sol(order.amount).to_string(), "true"),
            SwapSide::Sell => {
                let scale = 10f64.powi(i32::from(params.token_decimals));
                ((order.amount as f64 / scale).to_string(), "false")
            }
        };

        Self {
            action: order.side,
            mint: params.mint.to_string(),
            amount,
            denominated_in_sol: denominated_in_sol.to_string(),
            // API takes whole percent, at least 1
            slippage: (params.slippage_bps / 100).max(1),
            priority_fee: lamports_to_sol(params.priority_fee_lamports),
            public_key: order.participant.pubkey().to_string(),
            pool: params.pool,
        }
    }
}

/// Local trade response (unsigned transaction)
#[derive(Debug, Clone, Deserialize)]
pub struct LocalTradeResponse {
    /// Base64 encoded unsigned transaction
    pub transaction: Option<String>,
    /// Error message
    pub error: Option<String>,
}

/// PumpPortal trading API client
#[derive(Clone)]
pub struct PumpPortalClient {
    client: Client,
    url: String,
}

impl PumpPortalClient {
    /// Create a client for a local API endpoint
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Get the unsigned transaction for a trade (base64)
    pub async fn trade_transaction(&self, request: &LocalTradeRequest) -> Result<String> {
        debug!(
            "Requesting {} transaction for {} ({} {})",
            request.action, request.public_key, request.amount, request.mint
        );

        let response = self.client.post(&self.url).json(request).send().await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::Rpc(format!("Trade API returned {}", status)));
        }

        let local_response: LocalTradeResponse = response
            .json()
            .await
            .map_err(|e| Error::TransactionBuild(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = local_response.error {
            return Err(Error::TransactionBuild(error));
        }

        local_response
            .transaction
            .ok_or_else(|| Error::TransactionBuild("No transaction in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{Participant, ParticipantRole};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;

    fn params() -> SwapParams {
        SwapParams {
            mint: Pubkey::new_unique(),
            token_decimals: 6,
            slippage_bps: 2500,
            priority_fee_lamports: 500_000,
            pool: PoolType::Pump,
            dry_run: false,
        }
    }

    fn participant() -> Participant {
        Participant {
            role: ParticipantRole::Trader,
            index: 0,
            keypair: Keypair::new(),
        }
    }

    #[test]
    fn test_buy_request_serialization() {
        let participant = participant();
        let order = SwapOrder {
            participant: &participant,
            side: SwapSide::Buy,
            amount: 10_000_000,
        };
        let request = LocalTradeRequest::for_order(&order, &params());

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"action\":\"buy\""));
        assert!(json.contains("\"denominatedInSol\":\"true\""));
        assert!(json.contains("\"amount\":\"0.01\""));
        assert!(json.contains("\"slippage\":25"));
        assert!(json.contains("\"pool\":\"pump\""));
        assert_eq!(request.public_key, participant.pubkey().to_string());
    }

    #[test]
    fn test_sell_uses_token_units() {
        let participant = participant();
        let order = SwapOrder {
            participant: &participant,
            side: SwapSide::Sell,
            amount: 1_500_000,
        };
        let request = LocalTradeRequest::for_order(&order, &params());

        assert_eq!(request.amount, "1.5");
        assert_eq!(request.denominated_in_sol, "false");
        assert_eq!(request.priority_fee, 0.0005);
    }

    #[test]
    fn test_pool_type_names() {
        let pool: PoolType = serde_json::from_str("\"pump-amm\"").unwrap();
        assert_eq!(pool, PoolType::PumpAmm);
        assert_eq!(PoolType::default(), PoolType::Auto);
    }
}
