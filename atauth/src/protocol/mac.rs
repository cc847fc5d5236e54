//! AES-128 CMAC tag computation (RFC 4493).
//!
//! The device proves nothing here; the host proves knowledge of the
//! pre-shared key by returning `CMAC(key, challenge)`. The key is fixed at
//! 16 bytes and is supplied through a [`KeyProvider`] when the session is
//! built, so callers decide where the secret comes from.

use crate::error::{Error, Result};
use aes::Aes128;
use cmac::{Cmac, Mac};
use std::fmt;

/// Length of the pre-shared key in bytes.
pub const KEY_LEN: usize = 16;

/// Length of an AES-128 CMAC tag in bytes.
pub const TAG_LEN: usize = 16;

/// Source of the pre-shared key.
pub trait KeyProvider {
    /// Return the 16-byte key.
    fn key(&self) -> Result<[u8; KEY_LEN]>;
}

/// A key whose bytes are already known.
#[derive(Clone)]
pub struct StaticKey([u8; KEY_LEN]);

impl StaticKey {
    /// Wrap raw key bytes.
    pub const fn new(key: [u8; KEY_LEN]) -> Self {
        Self(key)
    }
}

impl KeyProvider for StaticKey {
    fn key(&self) -> Result<[u8; KEY_LEN]> {
        Ok(self.0)
    }
}

impl fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticKey(..)")
    }
}

/// A key given as a hex string, e.g. from a config file or environment variable.
#[derive(Clone)]
pub struct HexKey(String);

impl HexKey {
    /// Wrap a hex string; it is decoded when the key is requested.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl KeyProvider for HexKey {
    fn key(&self) -> Result<[u8; KEY_LEN]> {
        let bytes = hex::decode(self.0.trim()).map_err(|e| Error::InvalidKey(e.to_string()))?;
        <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| Error::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })
    }
}

impl fmt::Debug for HexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HexKey(..)")
    }
}

/// Authentication tag returned to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseTag([u8; TAG_LEN]);

impl ResponseTag {
    /// Raw tag bytes.
    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, as sent on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ResponseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes CMAC tags under a fixed key.
#[derive(Clone)]
pub struct MacComputer {
    key: [u8; KEY_LEN],
}

impl MacComputer {
    /// Build a computer for `key`, which must be exactly [`KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        let key = <[u8; KEY_LEN]>::try_from(key).map_err(|_| Error::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        Ok(Self { key })
    }

    /// Build a computer from a key provider.
    pub fn from_provider(provider: &dyn KeyProvider) -> Result<Self> {
        Ok(Self {
            key: provider.key()?,
        })
    }

    /// Compute the tag over `message`.
    pub fn compute(&self, message: &[u8]) -> ResponseTag {
        let mut mac = <Cmac<Aes128> as Mac>::new(&self.key.into());
        mac.update(message);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        ResponseTag(tag)
    }
}

impl fmt::Debug for MacComputer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacComputer").finish_non_exhaustive()
    }
}
