//! Symmetric primitives used by the protocol.
//!
//! - AES-256-CBC for PINs at rest (one padded block, never more)
//! - AES-256-GCM for every ATM <-> Bank datagram; replies carry the
//!   request's IV and tag as associated data
//! - OS randomness for keys and IVs

use aes::Aes256;
use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm,
};
use cipher::{block_padding::Pkcs7, generic_array::GenericArray, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// AES-256 key length.
pub const KEY_SIZE: usize = 32;

/// AES block length.
pub const BLOCK_SIZE: usize = 16;

/// CBC initialization vector length.
pub const CBC_IV_SIZE: usize = 16;

/// GCM nonce length.
pub const GCM_IV_SIZE: usize = 12;

/// GCM authentication tag length.
pub const TAG_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Fill `n` bytes from the operating system's CSPRNG.
pub fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Entropy(e.to_string()))?;
    Ok(bytes)
}

/// Fixed-size variant of [`random_bytes`], for IVs.
pub fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Entropy(e.to_string()))?;
    Ok(bytes)
}

/// Encrypt a short secret into exactly one PKCS#7-padded CBC block.
///
/// Deterministic for a fixed key and IV, which is what lets a PIN attempt be
/// checked by re-encrypting it and comparing ciphertexts.
pub fn cbc_encrypt_block(
    plaintext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; CBC_IV_SIZE],
) -> Result<[u8; BLOCK_SIZE]> {
    let len = plaintext.len();
    if len >= BLOCK_SIZE {
        return Err(Error::BlockTooLong(len));
    }

    let mut block = [0u8; BLOCK_SIZE];
    block[..len].copy_from_slice(plaintext);

    Aes256CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv))
        .encrypt_padded_mut::<Pkcs7>(&mut block, len)
        .map_err(|_| Error::BlockTooLong(len))?;

    Ok(block)
}

/// AES-256-GCM encryption. Ciphertext has the same length as the plaintext.
pub fn gcm_encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; GCM_IV_SIZE],
) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
    gcm_encrypt_aad(plaintext, key, iv, b"")
}

/// [`gcm_encrypt`] with associated data covered by the tag.
pub fn gcm_encrypt_aad(
    plaintext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; GCM_IV_SIZE],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), aad, &mut buffer)
        .map_err(|_| Error::Frame("plaintext too long for GCM"))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);
    Ok((buffer, tag_bytes))
}

/// AES-256-GCM decryption.
///
/// The tag is checked before any plaintext is produced; on mismatch nothing
/// but [`Error::Integrity`] comes back.
pub fn gcm_decrypt(
    ciphertext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; GCM_IV_SIZE],
    tag: &[u8; TAG_SIZE],
) -> Result<Vec<u8>> {
    gcm_decrypt_aad(ciphertext, key, iv, tag, b"")
}

/// [`gcm_decrypt`] for a message sealed with [`gcm_encrypt_aad`]. Any
/// difference in `aad` is an [`Error::Integrity`].
pub fn gcm_decrypt_aad(
    ciphertext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; GCM_IV_SIZE],
    tag: &[u8; TAG_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            aad,
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::Integrity)?;
    Ok(buffer)
}

/// Constant-time equality for secrets.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
