//! Solana RPC ledger endpoint

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use spl_associated_token_account::get_associated_token_address;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::pumpportal::{LocalTradeRequest, PumpPortalClient};
use super::{Ledger, SwapOrder, SwapParams};

/// One RPC endpoint plus the trade API used to build swaps
pub struct RpcLedger {
    endpoint: String,
    client: RpcClient,
    trader: PumpPortalClient,
    timeout: Duration,
}

impl RpcLedger {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, trader: PumpPortalClient) -> Self {
        let endpoint = endpoint.into();
        let client = RpcClient::new_with_timeout_and_commitment(
            endpoint.clone(),
            timeout,
            CommitmentConfig::confirmed(),
        );

        Self {
            endpoint,
            client,
            trader,
            timeout,
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::RpcTimeout(self.timeout.as_millis() as u64))?
    }

    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<()> {
        let result = self.client.simulate_transaction(transaction).await?;

        if let Some(err) = result.value.err {
            for log in result.value.logs.unwrap_or_default() {
                debug!("  Log: {}", log);
            }
            return Err(Error::TransactionSimulation(err.to_string()));
        }

        debug!(
            "Simulation succeeded, compute units: {:?}",
            result.value.units_consumed
        );
        Ok(())
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_balance(&self, owner: &Pubkey) -> Result<u64> {
        self.timed(async { Ok::<_, Error>(self.client.get_balance(owner).await?) })
            .await
    }

    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64> {
        let ata = get_associated_token_address(owner, mint);

        self.timed(async {
            match self.client.get_token_account_balance(&ata).await {
                Ok(balance) => balance.amount.parse::<u64>().map_err(|e| {
                    Error::Deserialization(format!("token amount {}: {}", balance.amount, e))
                }),
                // Participant never held the token
                Err(e) if e.to_string().contains("could not find account") => Ok(0),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn dispatch_swap(&self, order: &SwapOrder<'_>, params: &SwapParams) -> Result<Signature> {
        let request = LocalTradeRequest::for_order(order, params);
        let encoded = self.trader.trade_transaction(&request).await?;

        let bytes = STANDARD
            .decode(&encoded)
            .map_err(|e| Error::TransactionBuild(format!("Failed to decode transaction: {}", e)))?;
        let unsigned: VersionedTransaction = bincode::deserialize(&bytes).map_err(|e| {
            Error::TransactionBuild(format!("Failed to deserialize transaction: {}", e))
        })?;

        let transaction =
            VersionedTransaction::try_new(unsigned.message, &[&order.participant.keypair])
                .map_err(|e| Error::TransactionBuild(format!("Failed to sign: {}", e)))?;
        let signature = transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| Error::TransactionBuild("Transaction has no signatures".into()))?;

        if params.dry_run {
            info!(
                "[DRY RUN] Simulating {} for {} via {}",
                order.side,
                order.participant.label(),
                self.endpoint
            );
            self.simulate(&transaction).await?;
            return Ok(signature);
        }

        self.client
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|e| {
                warn!("Send via {} failed: {}", self.endpoint, e);
                Error::TransactionSend(e.to_string())
            })
    }
}
