//! Symmetric encryption of refresh tokens at rest.
//!
//! Refresh tokens are encrypted with AES-256 in CBC mode under a key derived
//! from an operator secret with SHA-256. The serialized form is
//! `<iv-hex>:<ciphertext-hex>`, where the IV is 16 random bytes generated
//! for every call to [`encrypt`].
//!
//! # Limitations
//!
//! CBC carries no integrity tag. Decrypting with the wrong secret normally
//! fails the padding check, but it can also produce garbage that happens to
//! carry valid padding. A successful [`decrypt`] is therefore not proof that
//! the secret was correct; callers that need that guarantee must add a keyed
//! MAC over the blob, which would change the on-disk format.
//!
//! # Example
//!
//! ```
//! use bidwarden_core::cipher::{decrypt, encrypt};
//!
//! let blob = encrypt("refresh-token-abc123", "test-key");
//! assert_eq!(decrypt(&blob, "test-key").unwrap(), "refresh-token-abc123");
//! ```

use aes::Aes256;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// Derived key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Error type for decrypting a stored blob.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecryptionError {
    /// The blob is not of the form `iv:ciphertext`.
    #[error("encrypted token is not in iv:ciphertext format")]
    MalformedBlob,

    /// The IV half is not valid hexadecimal.
    #[error("initialization vector is not valid hex: {0}")]
    InvalidIvHex(#[source] hex::FromHexError),

    /// The ciphertext half is not valid hexadecimal.
    #[error("ciphertext is not valid hex: {0}")]
    InvalidCiphertextHex(#[source] hex::FromHexError),

    /// The IV does not have the cipher's block length.
    #[error("initialization vector must be 16 bytes, got {0}")]
    InvalidIvLength(usize),

    /// The ciphertext is empty or not a whole number of blocks.
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    InvalidCiphertextLength(usize),

    /// The decrypted padding is not valid PKCS7.
    #[error("invalid padding (pad byte {0})")]
    InvalidPadding(u8),

    /// The decrypted bytes are not UTF-8.
    #[error("decrypted token is not valid UTF-8")]
    InvalidUtf8,
}

/// A 256-bit key derived from an operator secret.
///
/// Never stored; recomputed from the configured secret whenever needed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED])")
    }
}

/// Derive the encryption key for `secret`: SHA-256 over its UTF-8 bytes.
pub fn derive_key(secret: &str) -> DerivedKey {
    let digest = Sha256::digest(secret.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    DerivedKey(key)
}

/// Encrypt `plaintext` under the key derived from `secret`.
///
/// Every call draws a fresh IV, so encrypting the same plaintext twice yields
/// different blobs.
pub fn encrypt(plaintext: &str, secret: &str) -> String {
    encrypt_with_key(plaintext, &derive_key(secret))
}

/// Encrypt `plaintext` under an already derived key.
pub fn encrypt_with_key(plaintext: &str, key: &DerivedKey) -> String {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(&iv),
    )
    .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
}

/// Decrypt a blob produced by [`encrypt`] with the same `secret`.
pub fn decrypt(blob: &str, secret: &str) -> Result<String, DecryptionError> {
    decrypt_with_key(blob, &derive_key(secret))
}

/// Decrypt a blob under an already derived key.
pub fn decrypt_with_key(blob: &str, key: &DerivedKey) -> Result<String, DecryptionError> {
    let (iv_hex, ciphertext_hex) = blob
        .split_once(':')
        .ok_or(DecryptionError::MalformedBlob)?;

    let iv = hex::decode(iv_hex).map_err(DecryptionError::InvalidIvHex)?;
    let ciphertext =
        hex::decode(ciphertext_hex).map_err(DecryptionError::InvalidCiphertextHex)?;

    if iv.len() != IV_SIZE {
        return Err(DecryptionError::InvalidIvLength(iv.len()));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(DecryptionError::InvalidCiphertextLength(ciphertext.len()));
    }

    // Padding is stripped by hand so that a bad pad byte surfaces as its own error.
    let mut padded = Aes256CbcDec::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(&iv),
    )
    .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
    .map_err(|_| DecryptionError::InvalidCiphertextLength(ciphertext.len()))?;

    let unpadded_len = unpad(&padded)?;
    padded.truncate(unpadded_len);

    String::from_utf8(padded).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        DecryptionError::InvalidUtf8
    })
}

/// Validate PKCS7 padding and return the unpadded length.
fn unpad(padded: &[u8]) -> Result<usize, DecryptionError> {
    let pad = *padded.last().ok_or(DecryptionError::InvalidPadding(0))?;
    let pad_len = pad as usize;

    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > padded.len() {
        return Err(DecryptionError::InvalidPadding(pad));
    }
    if padded[padded.len() - pad_len..].iter().any(|&b| b != pad) {
        return Err(DecryptionError::InvalidPadding(pad));
    }

    Ok(padded.len() - pad_len)
}

/// Generate a random 32-byte encryption secret, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let encoded = hex::encode(bytes);
    bytes.zeroize();
    encoded
}
