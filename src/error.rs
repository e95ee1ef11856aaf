//! Error types for the cycle runner

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the cycle runner
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Endpoint pool cannot be empty")]
    EmptyPool,

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    // Partition errors
    #[error("Invalid partition request: {0}")]
    InvalidPartition(String),

    #[error("Unable to generate unique shares after {attempts} attempts")]
    PartitionExhausted { attempts: u32 },

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("{operation} failed on all {attempts} endpoints, last error: {last_error}")]
    PoolExhausted {
        operation: String,
        attempts: usize,
        last_error: String,
    },

    // Trading errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction simulation failed: {0}")]
    TransactionSimulation(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    // Keystore errors
    #[error("Unsupported cipher algorithm: {0}")]
    UnsupportedCipher(String),

    #[error("Input is not a sealed keystore value")]
    UntaggedInput,

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    // Persisted state errors
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("Missing persisted state: {0}")]
    MissingState(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable on another endpoint (transient network)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::RpcTimeout(_) | Error::TransactionSend(_)
        )
    }

    /// Check if this error must abort the whole run
    ///
    /// Covers configuration problems, exhausted share search and anything that
    /// means the persisted progress or secrets can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::EmptyPool
                | Error::InvalidPartition(_)
                | Error::PartitionExhausted { .. }
                | Error::UnsupportedCipher(_)
                | Error::UntaggedInput
                | Error::Decryption(_)
                | Error::Checkpoint(_)
                | Error::MissingState(_)
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Rpc(format!("HTTP request failed: {}", e))
    }
}
