//! Participant credential provisioning
//!
//! Participants are identified by `(role, index)`. Once a sealed secret exists
//! for a pair it is always imported; fresh keypairs are only generated for
//! indices that have never been persisted.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::checkpoint::{secret_key, CheckpointStore, KeyValueStore, RoleCount, KEY_MINT};
use crate::error::{Error, Result};

use super::cipher::SecretCipher;

/// Role a participant plays in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Sniper,
    Trader,
    Whale,
    Distributor,
    Dev,
}

impl ParticipantRole {
    pub const ALL: [ParticipantRole; 5] = [
        ParticipantRole::Sniper,
        ParticipantRole::Trader,
        ParticipantRole::Whale,
        ParticipantRole::Distributor,
        ParticipantRole::Dev,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Sniper => "sniper",
            ParticipantRole::Trader => "trader",
            ParticipantRole::Whale => "whale",
            ParticipantRole::Distributor => "distributor",
            ParticipantRole::Dev => "dev",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sniper" | "snipers" => Ok(ParticipantRole::Sniper),
            "trader" | "traders" => Ok(ParticipantRole::Trader),
            "whale" | "whales" => Ok(ParticipantRole::Whale),
            "distributor" | "distributors" => Ok(ParticipantRole::Distributor),
            "dev" => Ok(ParticipantRole::Dev),
            other => Err(Error::Config(format!("Unknown participant role: {}", other))),
        }
    }
}

/// An account taking part in swap rounds
#[derive(Debug)]
pub struct Participant {
    pub role: ParticipantRole,
    pub index: u32,
    pub keypair: Keypair,
}

impl Participant {
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Short name for logs, e.g. `trader-3`
    pub fn label(&self) -> String {
        format!("{}-{}", self.role, self.index)
    }
}

/// Source of fresh credentials
pub trait CredentialSource {
    fn generate(&mut self) -> Keypair;
}

/// Production source: new random keypairs
#[derive(Debug, Default)]
pub struct RandomKeypairs;

impl CredentialSource for RandomKeypairs {
    fn generate(&mut self) -> Keypair {
        Keypair::new()
    }
}

/// Imports or generates participant credentials against the checkpoint store
pub struct Provisioner<'a, S: KeyValueStore> {
    checkpoints: &'a mut CheckpointStore<S>,
    cipher: &'a SecretCipher,
}

impl<'a, S: KeyValueStore> Provisioner<'a, S> {
    pub fn new(checkpoints: &'a mut CheckpointStore<S>, cipher: &'a SecretCipher) -> Self {
        Self {
            checkpoints,
            cipher,
        }
    }

    fn open_keypair(&self, key: &str) -> Result<Option<Keypair>> {
        let Some(sealed) = self.checkpoints.sealed(key)? else {
            return Ok(None);
        };

        let bytes = self.cipher.decrypt(&sealed)?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| Error::InvalidKeypair(format!("{}: {}", key, e)))?;
        Ok(Some(keypair))
    }

    fn seal_keypair(&mut self, key: &str, keypair: &Keypair) -> Result<()> {
        let sealed = self.cipher.encrypt(&keypair.to_bytes())?;
        self.checkpoints.set_sealed(key, sealed);
        Ok(())
    }

    /// Import `count` already-provisioned participants of `role`
    ///
    /// Fails if fewer than `count` were provisioned.
    pub fn import(&self, role: ParticipantRole, count: u32) -> Result<Vec<Participant>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let stored = self.checkpoints.role_count(role)?.ok_or_else(|| {
            Error::MissingState(format!("no {} participants provisioned", role))
        })?;

        if count > stored.current {
            return Err(Error::MissingState(format!(
                "{} {} participants requested but only {} provisioned",
                count, role, stored.current
            )));
        }

        let participants = (0..count)
            .map(|index| {
                let key = secret_key(role, index);
                let keypair = self
                    .open_keypair(&key)?
                    .ok_or_else(|| Error::MissingState(format!("missing secret {}", key)))?;
                Ok(Participant {
                    role,
                    index,
                    keypair,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Imported {} {} participants", participants.len(), role);
        Ok(participants)
    }

    /// Import existing participants and generate only the missing ones
    pub fn generate_or_import(
        &mut self,
        role: ParticipantRole,
        count: u32,
        source: &mut dyn CredentialSource,
    ) -> Result<Vec<Participant>> {
        let stored = self.checkpoints.role_count(role)?.unwrap_or_default();

        let mut participants = Vec::with_capacity(count as usize);
        let mut generated = 0u32;

        for index in 0..count {
            let key = secret_key(role, index);
            let keypair = match self.open_keypair(&key)? {
                Some(existing) => existing,
                None => {
                    let fresh = source.generate();
                    self.seal_keypair(&key, &fresh)?;
                    generated += 1;
                    fresh
                }
            };
            participants.push(Participant {
                role,
                index,
                keypair,
            });
        }

        if count > stored.current {
            self.checkpoints.set_role_count(
                role,
                RoleCount {
                    previous: stored.current,
                    current: count,
                },
            );
        }

        if generated > 0 || count > stored.current {
            self.checkpoints.save()?;
        }

        info!(
            "{} {} participants ready ({} imported, {} generated)",
            count,
            role,
            count - generated,
            generated
        );
        Ok(participants)
    }

    /// Import the persisted token mint keypair
    pub fn import_mint(&self) -> Result<Keypair> {
        self.open_keypair(KEY_MINT)?
            .ok_or_else(|| Error::MissingState("no mint keypair provisioned".into()))
    }

    /// Import the mint keypair, generating and persisting it on first use
    pub fn generate_or_import_mint(&mut self, source: &mut dyn CredentialSource) -> Result<Keypair> {
        if let Some(existing) = self.open_keypair(KEY_MINT)? {
            debug!("Imported mint {}", existing.pubkey());
            return Ok(existing);
        }

        let mint = source.generate();
        self.seal_keypair(KEY_MINT, &mint)?;
        self.checkpoints.save()?;
        info!("Generated mint {}", mint.pubkey());
        Ok(mint)
    }

    /// Whether a sealed secret exists for `(role, index)`
    pub fn is_provisioned(&self, role: ParticipantRole, index: u32) -> bool {
        self.checkpoints.has_sealed(&secret_key(role, index))
    }
}
