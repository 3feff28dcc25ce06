//! Fixed-width book keys.
//!
//! A key is the UTF-8 encoding of a display name, right-padded with zero
//! bytes to [`KEY_WIDTH`]. Oversized names are rejected rather than cut.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Width of a key in bytes.
pub const KEY_WIDTH: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookKey(#[serde(with = "hex32")] [u8; KEY_WIDTH]);

impl BookKey {
    /// Derives the key for `name`.
    ///
    /// NUL bytes are refused so that the zero padding stays unambiguous and
    /// distinct accepted names always map to distinct keys.
    pub fn normalize(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > KEY_WIDTH || bytes.contains(&0) {
            return Err(LedgerError::InvalidName {
                name: name.to_string(),
            });
        }
        let mut key = [0u8; KEY_WIDTH];
        key[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_WIDTH] {
        &self.0
    }

    /// Recovers the display text a key was derived from.
    pub fn to_name(&self) -> Result<String> {
        let end = self
            .0
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(KEY_WIDTH);
        let text = std::str::from_utf8(&self.0[..end]).map_err(|_| LedgerError::InvalidName {
            name: self.to_string(),
        })?;
        if text.is_empty() || self.0[end..].iter().any(|b| *b != 0) {
            return Err(LedgerError::InvalidName {
                name: self.to_string(),
            });
        }
        Ok(text.to_string())
    }
}

impl From<[u8; KEY_WIDTH]> for BookKey {
    fn from(bytes: [u8; KEY_WIDTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_name() {
            Ok(name) => write!(f, "BookKey({name:?})"),
            Err(_) => write!(f, "BookKey({self})"),
        }
    }
}

/// Parses the `0x`-prefixed (or bare) 64 hex digit form produced by `Display`.
impl FromStr for BookKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut key = [0u8; KEY_WIDTH];
        hex::decode_to_slice(digits, &mut key)?;
        Ok(Self(key))
    }
}

pub(crate) mod hex32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::KEY_WIDTH;

    pub fn serialize<S>(value: &[u8; KEY_WIDTH], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; KEY_WIDTH], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let digits = encoded.strip_prefix("0x").unwrap_or(&encoded);
        let mut out = [0u8; KEY_WIDTH];
        hex::decode_to_slice(digits, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}
