//! Wire framing for ATM <-> Bank datagrams.
//!
//! Wire format (one frame per datagram, nothing before or after):
//! ```text
//! +-------------+------------------+----------------+-----------+------------+
//! | VERSION(1B) | CIPHER LEN (4B)  | CIPHERTEXT (N) | IV (12B)  | TAG (16B)  |
//! |             | i32 little-endian|                |           |            |
//! +-------------+------------------+----------------+-----------+------------+
//! ```
//!
//! The declared length is checked against both the maximum plaintext size
//! and the actual datagram size before any byte past the header is read.
//!
//! A request IV is a random prefix followed by a big-endian sequence number
//! (see [`RequestSequencer`]). A reply is sealed with the request's IV and
//! tag as associated data, so it only opens against the request it answers.

use std::time::{SystemTime, UNIX_EPOCH};

use zeroize::Zeroizing;

use crate::crypto::{self, GCM_IV_SIZE, KEY_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// Current framing version.
pub const FRAME_VERSION: u8 = 1;

/// Version byte plus length prefix.
pub const HEADER_SIZE: usize = 1 + 4;

/// Largest plaintext carried in one frame.
pub const MAX_PLAINTEXT_LENGTH: usize = 1024;

/// Largest frame on the wire.
pub const MAX_FRAME_LENGTH: usize = HEADER_SIZE + MAX_PLAINTEXT_LENGTH + GCM_IV_SIZE + TAG_SIZE;

/// Smallest frame on the wire (empty ciphertext).
pub const MIN_FRAME_LENGTH: usize = HEADER_SIZE + GCM_IV_SIZE + TAG_SIZE;

/// Trailing IV bytes holding a request's sequence number.
pub const SEQUENCE_SIZE: usize = 8;

const PREFIX_SIZE: usize = GCM_IV_SIZE - SEQUENCE_SIZE;

/// One encrypted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; GCM_IV_SIZE],
    pub tag: [u8; TAG_SIZE],
}

impl WireMessage {
    /// Encrypt `plaintext` under `msg_key` with a fresh random IV.
    pub fn seal(plaintext: &[u8], msg_key: &[u8; KEY_SIZE]) -> Result<Self> {
        let iv: [u8; GCM_IV_SIZE] = crypto::random_array()?;
        Self::seal_with(plaintext, msg_key, &iv, b"")
    }

    /// Encrypt a request under the IV issued by a [`RequestSequencer`].
    pub fn seal_request(plaintext: &[u8], msg_key: &[u8; KEY_SIZE], iv: &[u8; GCM_IV_SIZE]) -> Result<Self> {
        Self::seal_with(plaintext, msg_key, iv, b"")
    }

    /// Encrypt the reply to `request`, bound to it.
    pub fn seal_reply(plaintext: &[u8], msg_key: &[u8; KEY_SIZE], request: &WireMessage) -> Result<Self> {
        let iv: [u8; GCM_IV_SIZE] = crypto::random_array()?;
        Self::seal_with(plaintext, msg_key, &iv, &request.binding())
    }

    fn seal_with(plaintext: &[u8], msg_key: &[u8; KEY_SIZE], iv: &[u8; GCM_IV_SIZE], aad: &[u8]) -> Result<Self> {
        if plaintext.len() > MAX_PLAINTEXT_LENGTH {
            return Err(Error::Frame("plaintext too large"));
        }
        let (ciphertext, tag) = crypto::gcm_encrypt_aad(plaintext, msg_key, iv, aad)?;
        Ok(Self { ciphertext, iv: *iv, tag })
    }

    /// Authenticate and decrypt.
    pub fn open(&self, msg_key: &[u8; KEY_SIZE]) -> Result<Zeroizing<Vec<u8>>> {
        crypto::gcm_decrypt(&self.ciphertext, msg_key, &self.iv, &self.tag).map(Zeroizing::new)
    }

    /// Authenticate and decrypt a reply. Fails with [`Error::Integrity`]
    /// unless it was sealed for exactly this `request`.
    pub fn open_reply(&self, msg_key: &[u8; KEY_SIZE], request: &WireMessage) -> Result<Zeroizing<Vec<u8>>> {
        crypto::gcm_decrypt_aad(&self.ciphertext, msg_key, &self.iv, &self.tag, &request.binding())
            .map(Zeroizing::new)
    }

    /// IV followed by tag. Associated data for the reply.
    pub fn binding(&self) -> [u8; GCM_IV_SIZE + TAG_SIZE] {
        let mut binding = [0u8; GCM_IV_SIZE + TAG_SIZE];
        binding[..GCM_IV_SIZE].copy_from_slice(&self.iv);
        binding[GCM_IV_SIZE..].copy_from_slice(&self.tag);
        binding
    }

    /// Sequence number carried in a request IV.
    pub fn sequence(&self) -> u64 {
        let mut counter = [0u8; SEQUENCE_SIZE];
        counter.copy_from_slice(&self.iv[PREFIX_SIZE..]);
        u64::from_be_bytes(counter)
    }

    /// Serialize to wire format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.ciphertext.len() > MAX_PLAINTEXT_LENGTH {
            return Err(Error::Frame("ciphertext too large"));
        }
        // Cast is safe: bounded by MAX_PLAINTEXT_LENGTH above
        let len = self.ciphertext.len() as i32;

        let mut wire = Vec::with_capacity(MIN_FRAME_LENGTH + self.ciphertext.len());
        wire.push(FRAME_VERSION);
        wire.extend_from_slice(&len.to_le_bytes());
        wire.extend_from_slice(&self.ciphertext);
        wire.extend_from_slice(&self.iv);
        wire.extend_from_slice(&self.tag);
        Ok(wire)
    }

    /// Parse a whole datagram.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] if:
    /// - the datagram is shorter than an empty frame or longer than the maximum
    /// - the version byte is unknown
    /// - the declared length is negative or above [`MAX_PLAINTEXT_LENGTH`]
    /// - the declared length disagrees with the datagram size
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_FRAME_LENGTH {
            return Err(Error::Frame("frame too short"));
        }
        if bytes.len() > MAX_FRAME_LENGTH {
            return Err(Error::Frame("frame too long"));
        }
        if bytes[0] != FRAME_VERSION {
            return Err(Error::Frame("unknown frame version"));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[1..HEADER_SIZE]);
        let declared = i32::from_le_bytes(len_bytes);
        if declared < 0 {
            return Err(Error::Frame("negative length"));
        }
        let declared = declared as usize;
        if declared > MAX_PLAINTEXT_LENGTH {
            return Err(Error::Frame("declared length too large"));
        }
        if bytes.len() != MIN_FRAME_LENGTH + declared {
            return Err(Error::Frame("length does not match datagram"));
        }

        let ct_end = HEADER_SIZE + declared;
        let iv_end = ct_end + GCM_IV_SIZE;

        let mut iv = [0u8; GCM_IV_SIZE];
        let mut tag = [0u8; TAG_SIZE];
        iv.copy_from_slice(&bytes[ct_end..iv_end]);
        tag.copy_from_slice(&bytes[iv_end..]);

        Ok(Self {
            ciphertext: bytes[HEADER_SIZE..ct_end].to_vec(),
            iv,
            tag,
        })
    }
}

/// Issues request IVs with strictly increasing sequence numbers.
///
/// The prefix is random per sequencer, so two sequencers never share an IV
/// even if their counters collide. [`RequestSequencer::from_clock`] starts
/// the counter at the current time in microseconds, which keeps a restarted
/// ATM above every sequence number the Bank has already accepted.
#[derive(Debug)]
pub struct RequestSequencer {
    prefix: [u8; PREFIX_SIZE],
    last: u64,
}

impl RequestSequencer {
    /// The first IV issued carries `last + 1`.
    pub fn starting_after(last: u64) -> Result<Self> {
        Ok(Self {
            prefix: crypto::random_array()?,
            last,
        })
    }

    pub fn from_clock() -> Result<Self> {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(0))
            .unwrap_or(0);
        Self::starting_after(micros)
    }

    /// Sequence number of the last IV issued.
    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn next_iv(&mut self) -> Result<[u8; GCM_IV_SIZE]> {
        self.last = self
            .last
            .checked_add(1)
            .ok_or(Error::Frame("request sequence exhausted"))?;
        let mut iv = [0u8; GCM_IV_SIZE];
        iv[..PREFIX_SIZE].copy_from_slice(&self.prefix);
        iv[PREFIX_SIZE..].copy_from_slice(&self.last.to_be_bytes());
        Ok(iv)
    }
}
