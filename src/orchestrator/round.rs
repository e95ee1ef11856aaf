//! Pump and dump rounds
//!
//! A round walks the participants in groups. For each group it reads fresh
//! balances, turns the eligible participants into swap orders and dispatches
//! them concurrently. A group is always joined before the next one starts.

use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CycleConfig, TradingConfig};
use crate::error::Result;
use crate::keystore::Participant;
use crate::ledger::{lamports_to_sol, sol_to_lamports, Ledger, SwapOrder, SwapParams, SwapSide};
use crate::pool::{with_retry, EndpointPool};
use crate::random::{EntropyGenerator, RandomSource, SeededGenerator};

/// Kind of round a cycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundKind {
    Pump,
    Dump,
}

impl RoundKind {
    pub fn side(&self) -> SwapSide {
        match self {
            RoundKind::Pump => SwapSide::Buy,
            RoundKind::Dump => SwapSide::Sell,
        }
    }
}

impl fmt::Display for RoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundKind::Pump => f.pad("pump"),
            RoundKind::Dump => f.pad("dump"),
        }
    }
}

/// Round kind for a cycle
///
/// Cycle 0 always pumps. Later cycles draw from a generator keyed by the cycle
/// index, so a resumed run makes the same choices as an uninterrupted one.
pub fn choose_round(seed: &str, cycle: u32, pump_bias_pct: u32) -> RoundKind {
    if cycle == 0 {
        return RoundKind::Pump;
    }

    let mut generator = SeededGenerator::at(format!("{}:rounds", seed), u64::from(cycle));
    if generator.random_boolean(pump_bias_pct) {
        RoundKind::Pump
    } else {
        RoundKind::Dump
    }
}

/// Outcome counts for one round
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub cycle: u32,
    pub kind: RoundKind,
    /// Participants that got an order
    pub eligible: usize,
    pub succeeded: usize,
    /// Balance reads or dispatches that failed on every endpoint
    pub failed: usize,
    pub skipped: usize,
    /// Stopped between groups by cancellation
    pub interrupted: bool,
    pub signatures: Vec<Signature>,
}

impl RoundReport {
    fn new(cycle: u32, kind: RoundKind) -> Self {
        Self {
            cycle,
            kind,
            eligible: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            interrupted: false,
            signatures: Vec::new(),
        }
    }
}

/// Sleep for `delay` unless cancelled first; false when cancelled
pub(crate) async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }

    debug!("Pausing {}ms", delay.as_millis());
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Everything a round needs, borrowed from the orchestrator
pub(crate) struct RoundRunner<'r> {
    pub pool: &'r EndpointPool<Arc<dyn Ledger>>,
    pub participants: &'r [Participant],
    pub shares: &'r [f64],
    pub params: &'r SwapParams,
    pub cycle: &'r CycleConfig,
    pub trading: &'r TradingConfig,
    pub cancel: &'r CancellationToken,
}

impl<'r> RoundRunner<'r> {
    pub async fn run(&self, cycle: u32, kind: RoundKind, rng: &mut EntropyGenerator) -> RoundReport {
        let mut report = RoundReport::new(cycle, kind);
        let mut committed: HashSet<Pubkey> = HashSet::new();
        let mean_share = self.shares.iter().sum::<f64>() / self.shares.len().max(1) as f64;

        let group_size = self.cycle.group_size.max(1);
        let groups: Vec<(&'r [Participant], &'r [f64])> = self
            .participants
            .chunks(group_size)
            .zip(self.shares.chunks(group_size))
            .collect();

        info!(
            "Cycle {}: {} round over {} participants in {} groups",
            cycle,
            kind,
            self.participants.len(),
            groups.len()
        );

        for (index, (members, shares)) in groups.iter().copied().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Cycle {}: interrupted before group {}", cycle, index + 1);
                report.interrupted = true;
                break;
            }

            // Balances are read right before the group that spends them
            let fresh: Vec<(&'r Participant, f64)> = members
                .iter()
                .zip(shares.iter().copied())
                .filter(|(participant, _)| {
                    if committed.insert(participant.pubkey()) {
                        return true;
                    }
                    debug!("{} already committed this round", participant.label());
                    report.skipped += 1;
                    false
                })
                .collect();

            let balances = join_all(
                fresh
                    .iter()
                    .map(|(participant, _)| self.read_balance(participant, kind)),
            )
            .await;

            let mut orders: Vec<SwapOrder<'r>> = Vec::with_capacity(fresh.len());
            for ((participant, share), balance) in fresh.into_iter().zip(balances) {
                let balance = match balance {
                    Ok(balance) => balance,
                    Err(e) => {
                        warn!("{}: balance unavailable, skipping: {}", participant.label(), e);
                        report.failed += 1;
                        continue;
                    }
                };

                let amount = match kind {
                    RoundKind::Pump => self.buy_amount(balance, share, mean_share, rng),
                    RoundKind::Dump => self.sell_amount(balance, rng),
                };

                if amount == 0 {
                    debug!(
                        "{}: insufficient balance to {} ({})",
                        participant.label(),
                        kind.side(),
                        balance
                    );
                    report.skipped += 1;
                    continue;
                }

                orders.push(SwapOrder {
                    participant,
                    side: kind.side(),
                    amount,
                });
            }

            if orders.is_empty() {
                continue;
            }
            report.eligible += orders.len();

            let results = join_all(orders.iter().map(|order| self.dispatch(order))).await;
            for result in results {
                match result {
                    Some(signature) => {
                        report.succeeded += 1;
                        report.signatures.push(signature);
                    }
                    None => report.failed += 1,
                }
            }

            if index + 1 < groups.len() {
                let delay = rng.random_delay(self.cycle.delay_min_ms, self.cycle.delay_max_ms);
                if !pause(delay, self.cancel).await {
                    report.interrupted = true;
                    break;
                }
            }
        }

        if report.eligible == 0 && !report.interrupted {
            warn!("Cycle {}: no eligible participants, {} round skipped", cycle, kind);
            return report;
        }

        info!(
            "Cycle {}: {} round finished ({} ok, {} failed, {} skipped)",
            cycle, kind, report.succeeded, report.failed, report.skipped
        );
        report
    }

    async fn read_balance(&self, participant: &Participant, kind: RoundKind) -> Result<u64> {
        let owner = participant.pubkey();
        let owner = &owner;
        let mint = &self.params.mint;

        match kind {
            RoundKind::Pump => {
                with_retry(self.pool, "get_balance", |ledger| async move {
                    ledger.get_balance(owner).await
                })
                .await
            }
            RoundKind::Dump => {
                with_retry(self.pool, "get_token_balance", |ledger| async move {
                    ledger.get_token_balance(owner, mint).await
                })
                .await
            }
        }
    }

    /// Lamports to spend: a random base size scaled by the participant's
    /// share; 0 when it does not fit above the minimum residual
    fn buy_amount(&self, balance: u64, share: f64, mean_share: f64, rng: &mut EntropyGenerator) -> u64 {
        let base = rng.random_float(self.trading.buy_min_sol..self.trading.buy_max_sol);
        let weight = if mean_share > 0.0 { share / mean_share } else { 1.0 };
        let amount = sol_to_lamports(base * weight);

        let spendable = balance.saturating_sub(self.trading.min_residual_lamports());
        if amount > spendable {
            return 0;
        }
        amount
    }

    /// Raw token units to sell: a random fraction of the holding
    fn sell_amount(&self, balance: u64, rng: &mut EntropyGenerator) -> u64 {
        if balance == 0 {
            return 0;
        }

        let pct = rng.random_float(self.trading.sell_min_pct..self.trading.sell_max_pct);
        ((balance as f64 * pct / 100.0).floor() as u64).min(balance)
    }

    async fn dispatch(&self, order: &SwapOrder<'r>) -> Option<Signature> {
        let params = self.params;

        match with_retry(self.pool, "dispatch_swap", |ledger| async move {
            ledger.dispatch_swap(order, params).await
        })
        .await
        {
            Ok(signature) => {
                let amount = match order.side {
                    SwapSide::Buy => format!("{:.4} SOL", lamports_to_sol(order.amount)),
                    SwapSide::Sell => format!("{} units", order.amount),
                };
                info!(
                    "{} {} {}: {}",
                    order.participant.label(),
                    order.side,
                    amount,
                    signature
                );
                Some(signature)
            }
            Err(e) => {
                warn!("{} {} failed: {}", order.participant.label(), order.side, e);
                None
            }
        }
    }
}
