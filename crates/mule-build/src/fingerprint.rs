//! Content digests and task fingerprints

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// SHA-256 digest identifying a task's inputs or a file's content
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest of raw content
    pub fn of(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First byte, used to pick a cache shard
    pub fn shard_byte(&self) -> u8 {
        self.0[0]
    }

    /// Lowercase hex, the form used in file names and indexes
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    /// Abbreviated hex for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Invalid hex fingerprint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fingerprint '{0}': expected 64 hex digits")]
pub struct ParseFingerprintError(String);

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseFingerprintError(s.to_string());
        if s.len() != 64 || !s.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental fingerprint computation
///
/// Every field is length-prefixed so adjacent values cannot run together.
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    /// Start a fingerprint for a task of the given kind
    pub fn new(kind_tag: &str) -> Self {
        let mut builder = Self {
            hasher: Sha256::new(),
        };
        builder.field(kind_tag.as_bytes());
        builder
    }

    fn field(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    pub fn text(mut self, value: &str) -> Self {
        self.field(value.as_bytes());
        self
    }

    pub fn digest(mut self, value: &Fingerprint) -> Self {
        self.field(value.as_bytes());
        self
    }

    /// Effective flags, order preserved
    pub fn flags(mut self, flags: &[String]) -> Self {
        self.hasher.update((flags.len() as u64).to_le_bytes());
        for flag in flags {
            self.field(flag.as_bytes());
        }
        self
    }

    /// Predecessor fingerprints; sorted first so predecessor order does not matter
    pub fn predecessors(mut self, fingerprints: &[Fingerprint]) -> Self {
        let mut sorted = fingerprints.to_vec();
        sorted.sort();
        self.hasher.update((sorted.len() as u64).to_le_bytes());
        for fp in &sorted {
            self.hasher.update(fp.as_bytes());
        }
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.hasher.finalize().into())
    }
}
