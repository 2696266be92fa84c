//! Error types shared by the ATM, Bank, router and provisioning tools.

use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong below the command dispatchers.
///
/// Usage errors never show up here: the dispatchers answer malformed input
/// with a literal usage string before any key, card, ledger or socket is
/// touched.
#[derive(Debug, Error)]
pub enum Error {
    /// Username is not present in the ledger.
    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// Username is already present in the ledger.
    #[error("user already exists: {0}")]
    UserExists(String),

    /// Withdrawal larger than the current balance.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Balance would leave the signed 32-bit range.
    #[error("balance would overflow")]
    Overflow,

    /// Negative balance or amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(i32),

    /// AEAD tag mismatch. The sender must not be trusted.
    #[error("message failed authentication")]
    Integrity,

    /// Authentic request whose sequence number the Bank has already passed.
    #[error("stale request sequence {0}")]
    Replayed(u64),

    /// Frame does not match the wire layout.
    #[error("malformed frame: {0}")]
    Frame(&'static str),

    /// The OS random source failed.
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// Plaintext too long for a single padded CBC block.
    #[error("plaintext of {0} bytes does not fit one cipher block")]
    BlockTooLong(usize),

    /// No card file for this username.
    #[error("no card for {0}")]
    CardNotFound(String),

    /// Card file already exists and will not be overwritten.
    #[error("card already exists for {0}")]
    CardExists(String),

    /// Key file missing bytes or otherwise unusable.
    #[error("malformed key file: {0}")]
    KeyFile(String),

    /// No reply from the bank after every attempt.
    #[error("request timed out after {0} attempts")]
    Timeout(u32),

    /// Reply decrypted fine but is not a known response to the request sent.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for failures that mean the peer or the network is untrusted.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity | Error::Frame(_) | Error::Replayed(_))
    }
}
