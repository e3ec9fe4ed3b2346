//! Key handling for the encrypted key-value backend.
//!
//! Two-level scheme: every repository owns a random data-encryption key
//! (DEK) used to seal object payloads; the DEK itself is stored wrapped by
//! the process-wide key-encryption key (KEK). Rotating the KEK re-wraps the
//! DEK and bumps the stored key version — object ciphertext, object ids,
//! and plaintext bytes are untouched.

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Length in bytes of DEK and KEK material (AES-256).
pub const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Kek
// ---------------------------------------------------------------------------

/// The process-wide key-encryption key, with its rotation version.
///
/// Initialized once at startup from server configuration; never serialized
/// by this crate.
#[derive(Clone)]
pub struct Kek {
    version: u32,
    key: [u8; KEY_LEN],
}

impl Kek {
    /// Build a KEK from raw key material and a rotation version.
    #[must_use]
    pub const fn new(version: u32, key: [u8; KEY_LEN]) -> Self {
        Self { version, key }
    }

    /// The rotation version of this KEK.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("Kek").field("version", &self.version).finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Dek
// ---------------------------------------------------------------------------

/// A per-repository data-encryption key.
pub(crate) struct Dek {
    key: [u8; KEY_LEN],
}

impl Dek {
    /// Generate a fresh random DEK.
    pub(crate) fn generate() -> Result<Self, StoreError> {
        let rng = SystemRandom::new();
        let mut key = [0u8; KEY_LEN];
        rng.fill(&mut key).map_err(|_| StoreError::Cipher {
            message: "failed to generate DEK".to_owned(),
        })?;
        Ok(Self { key })
    }

    /// Seal `plaintext`, binding it to `aad`.
    pub(crate) fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<SealedBox, StoreError> {
        seal_with(&self.key, aad, plaintext)
    }

    /// Open a sealed record previously bound to `aad`.
    pub(crate) fn open(&self, aad: &[u8], sealed: &SealedBox) -> Result<Vec<u8>, StoreError> {
        open_with(&self.key, aad, sealed)
    }
}

// ---------------------------------------------------------------------------
// Wrapped DEK persistence
// ---------------------------------------------------------------------------

/// The on-disk form of a wrapped DEK (`dek.json`).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WrappedDek {
    /// The KEK version the DEK is currently wrapped with.
    pub key_version: u32,
    /// AEAD nonce, hex-encoded.
    pub nonce: String,
    /// Wrapped key material (ciphertext + tag), hex-encoded.
    pub wrapped: String,
}

const DEK_AAD: &[u8] = b"dogma-dek";

impl WrappedDek {
    /// Wrap `dek` with `kek`.
    pub(crate) fn wrap(dek: &Dek, kek: &Kek) -> Result<Self, StoreError> {
        let sealed = seal_with(&kek.key, DEK_AAD, &dek.key)?;
        Ok(Self {
            key_version: kek.version,
            nonce: hex_encode(&sealed.nonce),
            wrapped: hex_encode(&sealed.ciphertext),
        })
    }

    /// Unwrap with `kek`, verifying the stored key version matches.
    pub(crate) fn unwrap_with(&self, kek: &Kek) -> Result<Dek, StoreError> {
        if self.key_version != kek.version {
            return Err(StoreError::Cipher {
                message: format!(
                    "KEK version mismatch: DEK is wrapped with version {}, \
                     the process KEK is version {}",
                    self.key_version, kek.version
                ),
            });
        }
        let sealed = SealedBox {
            nonce: decode_nonce(&self.nonce)?,
            ciphertext: hex_decode(&self.wrapped)?,
        };
        let material = open_with(&kek.key, DEK_AAD, &sealed)?;
        let key: [u8; KEY_LEN] = material.try_into().map_err(|_| StoreError::Cipher {
            message: "unwrapped DEK has the wrong length".to_owned(),
        })?;
        Ok(Dek { key })
    }
}

// ---------------------------------------------------------------------------
// AEAD primitives
// ---------------------------------------------------------------------------

/// A nonce plus ciphertext-with-tag, as stored on disk.
pub(crate) struct SealedBox {
    pub(crate) nonce: [u8; NONCE_LEN],
    pub(crate) ciphertext: Vec<u8>,
}

fn seal_with(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Result<SealedBox, StoreError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| StoreError::Cipher {
        message: "invalid AES-256-GCM key".to_owned(),
    })?;
    let sealing = LessSafeKey::new(unbound);

    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce).map_err(|_| StoreError::Cipher {
        message: "failed to generate nonce".to_owned(),
    })?;

    let mut buf = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut buf)
        .map_err(|_| StoreError::Cipher {
            message: "seal failed".to_owned(),
        })?;
    Ok(SealedBox {
        nonce,
        ciphertext: buf,
    })
}

fn open_with(
    key: &[u8; KEY_LEN],
    aad: &[u8],
    sealed: &SealedBox,
) -> Result<Vec<u8>, StoreError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| StoreError::Cipher {
        message: "invalid AES-256-GCM key".to_owned(),
    })?;
    let opening = LessSafeKey::new(unbound);

    let mut buf = sealed.ciphertext.clone();
    let plaintext = opening
        .open_in_place(
            Nonce::assume_unique_for_key(sealed.nonce),
            Aad::from(aad),
            &mut buf,
        )
        .map_err(|_| StoreError::Cipher {
            message: "open failed (wrong key or corrupt record)".to_owned(),
        })?;
    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>, StoreError> {
    if s.len() % 2 != 0 {
        return Err(StoreError::Cipher {
            message: "hex string has odd length".to_owned(),
        });
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = hex_val(chunk[0])?;
        let lo = hex_val(chunk[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_val(b: u8) -> Result<u8, StoreError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(StoreError::Cipher {
            message: format!("invalid hex digit '{}'", b as char),
        }),
    }
}

fn decode_nonce(s: &str) -> Result<[u8; NONCE_LEN], StoreError> {
    let bytes = hex_decode(s)?;
    bytes.try_into().map_err(|_| StoreError::Cipher {
        message: "nonce has the wrong length".to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
