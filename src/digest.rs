//! Content digests used as layer keys.
//!
//! A [`Digest`] is the `<algorithm>:<encoded>` form used throughout the container ecosystem, for
//! example `sha256:6c3c624b58dbbcd3c0dd82b4c53f04194d1247c6eebdaab7c610cf7d66709b3b`.  The store
//! never computes digests itself: chain IDs and diff IDs are opaque tokens handed to it by the
//! caller, and this module only checks that they are well-formed.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A digest algorithm recognized by the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// SHA-256, the only algorithm written in practice.
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl Algorithm {
    /// The algorithms scanned by default when enumerating the store.
    pub const DEFAULT_SUPPORTED: &'static [Algorithm] = &[Algorithm::Sha256];

    /// The algorithm name as it appears in digest strings and directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// Number of hex characters in an encoded digest of this algorithm.
    pub fn encoded_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    fn validate_encoded(&self, encoded: &str) -> Result<(), StoreError> {
        if encoded.len() != self.encoded_len() {
            return Err(StoreError::InvalidDigest(format!(
                "{}:{encoded}: expected {} hex characters, got {}",
                self,
                self.encoded_len(),
                encoded.len()
            )));
        }
        if let Some(c) = encoded.chars().find(|c| !matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(StoreError::InvalidDigest(format!(
                "{}:{encoded}: invalid character {c:?}",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(StoreError::InvalidDigest(format!(
                "unsupported digest algorithm {other:?}"
            ))),
        }
    }
}

/// A validated content digest.
///
/// Construction always validates, so holding a `Digest` means the encoded part has the right
/// length for its algorithm and consists only of lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    algorithm: Algorithm,
    encoded: String,
}

/// Content-addressed key for a point in a layer's ancestry.  Primary key of the store.
pub type ChainId = Digest;

/// Content-addressed identity of one layer's own changeset.
pub type DiffId = Digest;

impl Digest {
    /// Build a digest from an algorithm and its hex encoding, validating the encoding.
    pub fn from_encoded(algorithm: Algorithm, encoded: impl Into<String>) -> Result<Self, StoreError> {
        let encoded = encoded.into();
        algorithm.validate_encoded(&encoded)?;
        Ok(Self { algorithm, encoded })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex part of the digest, without the algorithm prefix.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((algorithm, encoded)) = s.split_once(':') else {
            return Err(StoreError::InvalidDigest(format!(
                "{s:?}: missing algorithm separator"
            )));
        };
        Self::from_encoded(algorithm.parse()?, encoded)
    }
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
