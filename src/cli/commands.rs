//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Confirm;
use solana_sdk::signature::Signer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointStore, JsonFileStore, PoolMetadata};
use crate::config::Config;
use crate::keystore::{ParticipantRole, Provisioner, RandomKeypairs, SecretCipher};
use crate::ledger::{Ledger, PumpPortalClient, RpcLedger};
use crate::orchestrator::{RunSummary, SwapOrchestrator};
use crate::partition::generate_unique_shares;
use crate::pool::EndpointPool;
use crate::random::SeededGenerator;

fn open_checkpoints(config: &Config) -> Result<CheckpointStore<JsonFileStore>> {
    let path = config.store_path();
    let store = JsonFileStore::open(&path)
        .with_context(|| format!("Failed to open state file {}", path.display()))?;
    Ok(CheckpointStore::new(store))
}

fn build_cipher(config: &Config) -> Result<SecretCipher> {
    if config.keystore.secret.is_empty() {
        anyhow::bail!("Keystore secret not set (CYCLER_KEYSTORE__SECRET)");
    }
    SecretCipher::new(&config.keystore.algorithm, &config.keystore.secret)
        .context("Failed to initialise keystore cipher")
}

fn build_pool(config: &Config) -> Result<EndpointPool<Arc<dyn Ledger>>> {
    let timeout = Duration::from_millis(config.rpc.timeout_ms);
    let trader = PumpPortalClient::new(config.rpc.trade_api_url.clone(), timeout)?;

    let ledgers: Vec<Arc<dyn Ledger>> = config
        .rpc
        .endpoints
        .iter()
        .map(|endpoint| {
            Arc::new(RpcLedger::new(endpoint.clone(), timeout, trader.clone())) as Arc<dyn Ledger>
        })
        .collect();

    Ok(EndpointPool::new(ledgers)?)
}

/// Generate or import participant and mint credentials
pub fn provision(
    config: &Config,
    force: bool,
    pool_id: Option<String>,
    lp_mint: Option<String>,
) -> Result<()> {
    let cipher = build_cipher(config)?;
    let mut checkpoints = open_checkpoints(config)?;

    let missing: u32 = {
        let provisioner = Provisioner::new(&mut checkpoints, &cipher);
        ParticipantRole::ALL
            .iter()
            .map(|role| {
                (0..config.participants.count(*role))
                    .filter(|index| !provisioner.is_provisioned(*role, *index))
                    .count() as u32
            })
            .sum()
    };

    if missing > 0 && !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Generate {} new participant keypairs in {}?",
                missing,
                config.store_path().display()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Provisioning cancelled by user");
            return Ok(());
        }
    }

    println!("\n=== PARTICIPANTS ({}) ===\n", config.token.symbol);

    let mut provisioner = Provisioner::new(&mut checkpoints, &cipher);
    for role in ParticipantRole::ALL {
        let count = config.participants.count(role);
        if count == 0 {
            continue;
        }

        let participants = provisioner
            .generate_or_import(role, count, &mut RandomKeypairs)
            .with_context(|| format!("Failed to provision {} participants", role))?;

        for participant in &participants {
            println!("  {:<16} {}", participant.label(), participant.pubkey());
        }
    }

    match &config.token.mint {
        Some(mint) => println!("\nMint (configured): {}", mint),
        None => {
            let mint = provisioner
                .generate_or_import_mint(&mut RandomKeypairs)
                .context("Failed to provision mint keypair")?;
            println!("\nMint: {}", mint.pubkey());
        }
    }

    if pool_id.is_some() || lp_mint.is_some() {
        let mut metadata = checkpoints.pool_metadata();
        if pool_id.is_some() {
            metadata.pool_id = pool_id;
        }
        if lp_mint.is_some() {
            metadata.lp_mint = lp_mint;
        }
        checkpoints
            .save_pool_metadata(&metadata)
            .context("Failed to record pool metadata")?;
        print_pool(&metadata);
    }

    Ok(())
}

/// Show persisted shares, generating them on first use
pub fn shares(config: &Config, force: bool, dry_run: bool) -> Result<()> {
    let mut checkpoints = open_checkpoints(config)?;

    if let Some(existing) = checkpoints.shares()? {
        if !force {
            println!("\n=== SHARES (persisted) ===\n");
            print_shares(&existing);
            return Ok(());
        }
        warn!("Regenerating {} persisted shares", existing.len());
    }

    let request = config.share_request();
    let mut generator = SeededGenerator::new(config.partition_seed());
    let shares = generate_unique_shares(&request, &mut generator)
        .context("Failed to generate participant shares")?;

    if dry_run {
        println!("\n=== DRY RUN ===");
        println!("Would save {} shares", shares.len());
    } else {
        checkpoints.save_shares(&shares)?;
        info!("Saved {} shares to {}", shares.len(), config.store_path().display());
    }

    println!("\n=== SHARES ===\n");
    print_shares(&shares);
    Ok(())
}

/// Run swap cycles until done or interrupted
pub async fn run(config: &Config, cycles: Option<u32>, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - swaps are simulated, progress is not saved");
    }

    let cipher = build_cipher(config)?;
    let checkpoints = open_checkpoints(config)?;
    let pool = build_pool(config)?;
    let requested = cycles.unwrap_or(config.cycle.count);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current group");
            signal.cancel();
        }
    });

    let mut orchestrator = SwapOrchestrator::new(config, pool, checkpoints, cipher)
        .with_cancellation(cancel)
        .dry_run(dry_run);

    let summary = match orchestrator.run(requested).await {
        Ok(summary) => summary,
        Err(e) if e.is_fatal() && !dry_run => {
            error!(
                "Fatal error, progress kept in {}; the next run resumes at the last checkpoint",
                config.store_path().display()
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    print_summary(&summary);
    Ok(())
}

/// Show progress and provisioning state
pub fn status(config: &Config) -> Result<()> {
    let mut checkpoints = open_checkpoints(config)?;
    let checkpoint = checkpoints.checkpoint()?;

    println!("\n=== CYCLE STATUS ({}) ===\n", config.token.symbol);
    println!("State file: {}", config.store_path().display());
    println!(
        "Last completed cycle: {}",
        checkpoint
            .last_completed
            .map_or_else(|| "none".to_string(), |c| c.to_string())
    );
    if let Some(started) = checkpoint.in_progress {
        println!("Interrupted cycle: {}", started);
    }
    println!("Next run starts at cycle: {}", checkpoint.resume_index());
    if let Some(updated_at) = checkpoint.updated_at {
        println!("Updated: {}", updated_at.to_rfc3339());
    }

    println!("\n=== PARTICIPANTS ===\n");
    if checkpoint.participant_counts.is_empty() {
        println!("None provisioned.");
    }
    for (role, count) in &checkpoint.participant_counts {
        println!(
            "  {:<12} {} provisioned (previously {}), {} configured",
            role.as_str(),
            count.current,
            count.previous,
            config.participants.count(*role)
        );
    }

    match checkpoints.shares()? {
        Some(shares) => {
            println!("\n=== SHARES ===\n");
            print_shares(&shares);
        }
        None => println!("\nShares: not generated"),
    }

    let metadata = checkpoints.pool_metadata();
    if metadata.pool_id.is_some() || metadata.lp_mint.is_some() {
        print_pool(&metadata);
    }

    // Addresses need the keystore secret
    if let Ok(cipher) = build_cipher(config) {
        let provisioner = Provisioner::new(&mut checkpoints, &cipher);
        if let Ok(mint) = provisioner.import_mint() {
            println!("\nMint: {}", mint.pubkey());
        }
    }

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

fn print_shares(shares: &[f64]) {
    for (index, share) in shares.iter().enumerate() {
        println!("  #{:<4} {:>10.2}", index, share);
    }
    println!("  Total: {:.2}", shares.iter().sum::<f64>());
}

fn print_pool(metadata: &PoolMetadata) {
    println!("\n=== POOL ===\n");
    println!("  Pool ID: {}", metadata.pool_id.as_deref().unwrap_or("-"));
    println!("  LP mint: {}", metadata.lp_mint.as_deref().unwrap_or("-"));
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== RUN SUMMARY ===\n");
    println!("First cycle: {}", summary.first_cycle);
    println!("Cycles completed: {}", summary.cycles_completed);
    for round in &summary.rounds {
        println!(
            "  cycle {:<5} {:<5} {} ok, {} failed, {} skipped{}",
            round.cycle,
            round.kind,
            round.succeeded,
            round.failed,
            round.skipped,
            if round.interrupted { " (interrupted)" } else { "" }
        );
    }
    if summary.stopped_early {
        println!("\nStopped early; the next run resumes where this one left off.");
    }
}
