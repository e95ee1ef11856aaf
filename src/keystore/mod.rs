//! Encrypted keystore
//!
//! Participant and mint secrets are sealed with `SecretCipher` and stored in
//! the token's state document under stable keys:
//! - `mint`
//! - `secret:<role>:<index>`
//! - `count:<role>` (`{ previous, current }`)

pub mod cipher;
pub mod participants;

pub use cipher::{SecretCipher, SEALED_TAG};
pub use participants::{
    CredentialSource, Participant, ParticipantRole, Provisioner, RandomKeypairs,
};
