//! Swap orchestrator
//!
//! Drives the cycle state machine:
//!
//! ```text
//! Idle -> Loading -> Cycling -> PumpRound | DumpRound -> Paused -> Cycling -> ...
//!                                                     -> Done | Stopped | Fatal
//! ```
//!
//! Every cycle is marked started in the checkpoint store before its first
//! swap, and marked completed before the next cycle begins. Participant
//! failures are counted, never fatal. Checkpoint failures always are.

pub mod round;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::checkpoint::{CheckpointStore, KeyValueStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::keystore::{Participant, Provisioner, SecretCipher};
use crate::ledger::{Ledger, SwapParams};
use crate::partition::{generate_unique_shares, ShareRequest};
use crate::pool::EndpointPool;
use crate::random::{EntropyGenerator, SeededGenerator};

pub use round::{choose_round, RoundKind, RoundReport};

use round::{pause, RoundRunner};

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Loading,
    Cycling,
    PumpRound,
    DumpRound,
    Paused,
    Done,
    Stopped,
    Fatal,
}

/// What a run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub first_cycle: u32,
    pub cycles_completed: u32,
    pub rounds: Vec<RoundReport>,
    /// Cancelled before all requested cycles completed
    pub stopped_early: bool,
}

/// Runs pump/dump cycles for one token
pub struct SwapOrchestrator<'c, S: KeyValueStore> {
    config: &'c Config,
    pool: EndpointPool<Arc<dyn Ledger>>,
    checkpoints: CheckpointStore<S>,
    cipher: SecretCipher,
    cancel: CancellationToken,
    dry_run: bool,
    state: OrchestratorState,
    participants: Vec<Participant>,
    shares: Vec<f64>,
    params: Option<SwapParams>,
    rng: EntropyGenerator,
}

impl<'c, S: KeyValueStore> SwapOrchestrator<'c, S> {
    pub fn new(
        config: &'c Config,
        pool: EndpointPool<Arc<dyn Ledger>>,
        checkpoints: CheckpointStore<S>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            config,
            pool,
            checkpoints,
            cipher,
            cancel: CancellationToken::new(),
            dry_run: false,
            state: OrchestratorState::Idle,
            participants: Vec::new(),
            shares: Vec::new(),
            params: None,
            rng: EntropyGenerator::new(),
        }
    }

    /// Stop between groups and cycles once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Simulate swaps and keep progress in memory only
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        if dry_run {
            self.checkpoints = self.checkpoints.without_progress_writes();
        }
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn shares(&self) -> &[f64] {
        &self.shares
    }

    pub fn checkpoints(&self) -> &CheckpointStore<S> {
        &self.checkpoints
    }

    fn transition(&mut self, next: OrchestratorState) {
        debug!("State {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Import participants, the mint and shares
    pub fn load(&mut self) -> Result<()> {
        self.transition(OrchestratorState::Loading);

        let (participants, mint) = {
            let provisioner = Provisioner::new(&mut self.checkpoints, &self.cipher);

            let mut participants = Vec::new();
            for role in self.config.participants.active_roles() {
                let count = self.config.participants.count(role);
                participants.extend(provisioner.import(role, count)?);
            }

            let mint = match &self.config.token.mint {
                Some(mint) => mint
                    .parse::<Pubkey>()
                    .map_err(|e| Error::Config(format!("Invalid token mint {}: {}", mint, e)))?,
                None => provisioner.import_mint()?.pubkey(),
            };

            (participants, mint)
        };

        if participants.is_empty() {
            return Err(Error::Config("No participants in the active roles".into()));
        }

        let metadata = self.checkpoints.pool_metadata();
        match &metadata.pool_id {
            Some(pool_id) => info!(
                "Pool {} (LP mint {})",
                pool_id,
                metadata.lp_mint.as_deref().unwrap_or("unknown")
            ),
            None => debug!("No pool metadata recorded"),
        }

        let shares = match self.checkpoints.shares()? {
            Some(shares) => {
                debug!("Loaded {} persisted shares", shares.len());
                shares
            }
            None => {
                let request = ShareRequest {
                    count: participants.len(),
                    ..self.config.share_request()
                };
                let mut generator = SeededGenerator::new(self.config.partition_seed());
                let shares = generate_unique_shares(&request, &mut generator)?;

                if self.dry_run {
                    info!("[DRY RUN] Generated {} shares, not persisting", shares.len());
                } else {
                    self.checkpoints.save_shares(&shares)?;
                    info!("Generated and saved {} shares", shares.len());
                }
                shares
            }
        };

        if shares.len() != participants.len() {
            return Err(Error::MissingState(format!(
                "{} persisted shares for {} participants (regenerate with `shares --force`)",
                shares.len(),
                participants.len()
            )));
        }

        info!(
            "Loaded {} participants for mint {}",
            participants.len(),
            mint
        );

        self.params = Some(SwapParams {
            mint,
            token_decimals: self.config.token.decimals,
            slippage_bps: self.config.trading.slippage_bps,
            priority_fee_lamports: self.config.trading.priority_fee_lamports,
            pool: self.config.trading.pool,
            dry_run: self.dry_run,
        });
        self.participants = participants;
        self.shares = shares;
        Ok(())
    }

    /// Run `requested` cycles starting at the resume point
    pub async fn run(&mut self, requested: u32) -> Result<RunSummary> {
        let span = info_span!(
            "run",
            id = %Uuid::new_v4(),
            token = %self.config.token.symbol
        );

        let result = self.run_cycles(requested).instrument(span.clone()).await;

        if let Err(e) = &result {
            self.transition(OrchestratorState::Fatal);
            span.in_scope(|| error!("Run aborted: {}", e));
        }
        result
    }

    async fn run_cycles(&mut self, requested: u32) -> Result<RunSummary> {
        if self.params.is_none() {
            self.load()?;
        }
        let params = self
            .params
            .clone()
            .ok_or_else(|| Error::Internal("swap parameters not loaded".into()))?;

        let first_cycle = self.checkpoints.resume_index()?;
        let mut summary = RunSummary {
            first_cycle,
            cycles_completed: 0,
            rounds: Vec::new(),
            stopped_early: false,
        };

        info!(
            "Running {} cycles from cycle {}{}",
            requested,
            first_cycle,
            if self.dry_run { " [DRY RUN]" } else { "" }
        );
        self.transition(OrchestratorState::Cycling);

        for offset in 0..requested {
            let cycle = first_cycle.saturating_add(offset);

            if self.cancel.is_cancelled() {
                summary.stopped_early = true;
                break;
            }

            self.checkpoints.begin_cycle(cycle)?;

            let kind = choose_round(
                self.config.partition_seed(),
                cycle,
                self.config.cycle.pump_bias_pct,
            );
            self.transition(match kind {
                RoundKind::Pump => OrchestratorState::PumpRound,
                RoundKind::Dump => OrchestratorState::DumpRound,
            });

            let runner = RoundRunner {
                pool: &self.pool,
                participants: &self.participants,
                shares: &self.shares,
                params: &params,
                cycle: &self.config.cycle,
                trading: &self.config.trading,
                cancel: &self.cancel,
            };
            let report = runner.run(cycle, kind, &mut self.rng).await;
            let interrupted = report.interrupted;
            summary.rounds.push(report);

            if interrupted {
                info!("Cycle {} interrupted, it will resume on the next run", cycle);
                summary.stopped_early = true;
                break;
            }

            self.checkpoints.complete_cycle(cycle)?;
            summary.cycles_completed += 1;

            if offset + 1 < requested {
                self.transition(OrchestratorState::Paused);
                let delay = self
                    .rng
                    .random_delay(self.config.cycle.delay_min_ms, self.config.cycle.delay_max_ms);
                if !pause(delay, &self.cancel).await {
                    summary.stopped_early = true;
                    break;
                }
                self.transition(OrchestratorState::Cycling);
            }
        }

        if summary.stopped_early {
            self.transition(OrchestratorState::Stopped);
            info!(
                "Stopped after {} of {} cycles",
                summary.cycles_completed, requested
            );
        } else {
            self.transition(OrchestratorState::Done);
            info!("Completed {} cycles", summary.cycles_completed);
        }

        Ok(summary)
    }
}
