//! Card files: one per user, holding the CBC-encrypted PIN.
//!
//! Layout of `<card_dir>/<username>.card`:
//! ```text
//! +----------------------+-----------+
//! | ENCRYPTED PIN (16B)  | IV (16B)  |
//! +----------------------+-----------+
//! ```
//! The Bank writes a card once, at user creation. The ATM only reads it.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::PathBuf,
};

use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, BLOCK_SIZE, CBC_IV_SIZE, KEY_SIZE};
use crate::error::{Error, Result};
use crate::validate_functions::validate_username;

/// Size of a card file.
pub const CARD_SIZE: usize = BLOCK_SIZE + CBC_IV_SIZE;

/// Extension appended to the username.
pub const CARD_EXTENSION: &str = "card";

/// Decoded card contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub encrypted_pin: [u8; BLOCK_SIZE],
    pub iv: [u8; CBC_IV_SIZE],
}

impl Card {
    pub fn to_bytes(&self) -> [u8; CARD_SIZE] {
        let mut bytes = [0u8; CARD_SIZE];
        bytes[..BLOCK_SIZE].copy_from_slice(&self.encrypted_pin);
        bytes[BLOCK_SIZE..].copy_from_slice(&self.iv);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CARD_SIZE {
            return None;
        }
        let mut encrypted_pin = [0u8; BLOCK_SIZE];
        let mut iv = [0u8; CBC_IV_SIZE];
        encrypted_pin.copy_from_slice(&bytes[..BLOCK_SIZE]);
        iv.copy_from_slice(&bytes[BLOCK_SIZE..]);
        Some(Self { encrypted_pin, iv })
    }
}

/// Directory of card files.
#[derive(Debug, Clone)]
pub struct CardStore {
    dir: PathBuf,
}

impl CardStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name is derived from the username only. Usernames are
    /// alphabetic, so this can never escape `dir`.
    pub fn card_path(&self, username: &str) -> Result<PathBuf> {
        if !validate_username(username) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid username for card file",
            )));
        }
        Ok(self.dir.join(format!("{}.{}", username, CARD_EXTENSION)))
    }

    /// Encrypt `pin` under a fresh IV and write the card. Never overwrites.
    pub fn create_card(&self, username: &str, pin: &str, pin_key: &[u8; KEY_SIZE]) -> Result<()> {
        let path = self.card_path(username)?;
        let iv: [u8; CBC_IV_SIZE] = crypto::random_array()?;
        let encrypted_pin = crypto::cbc_encrypt_block(pin.as_bytes(), pin_key, &iv)?;
        let card = Card { encrypted_pin, iv };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::CardExists(username.to_string()))
            }
            Err(e) => return Err(Error::Io(e)),
        };
        file.write_all(&card.to_bytes())?;
        file.sync_all()?;

        debug!(user = username, "card written");
        Ok(())
    }

    pub fn read_card(&self, username: &str) -> Result<Card> {
        let path = self.card_path(username)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::CardNotFound(username.to_string()))
            }
            Err(e) => return Err(Error::Io(e)),
        };
        Card::from_bytes(&bytes).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("card for {} is {} bytes", username, bytes.len()),
            ))
        })
    }

    /// Re-encrypt `attempt` with the card's IV and compare in constant time.
    pub fn verify_pin(&self, username: &str, attempt: &str, pin_key: &[u8; KEY_SIZE]) -> Result<bool> {
        let card = self.read_card(username)?;
        let attempt = Zeroizing::new(attempt.as_bytes().to_vec());
        let encrypted = match crypto::cbc_encrypt_block(&attempt, pin_key, &card.iv) {
            Ok(block) => Zeroizing::new(block),
            Err(Error::BlockTooLong(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(crypto::ct_eq(&encrypted[..], &card.encrypted_pin))
    }
}
