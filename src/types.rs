//! Core identifier types shared across the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Length in bytes of a content digest (BLAKE3 output)
pub const HASH_LEN: usize = 32;

/// Raw digest bytes
pub type Hash = [u8; HASH_LEN];

/// Content digest with its canonical lowercase-hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(Hash);

impl ContentHash {
    pub fn from_bytes(bytes: Hash) -> Self {
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Lowercase hex, used for shard paths and map keys.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex digest. Returns `None` unless the input is exactly
    /// `2 * HASH_LEN` hex characters.
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        if hex_str.len() != HASH_LEN * 2 {
            return None;
        }
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(hex_str, &mut bytes).ok()?;
        Some(ContentHash(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = crate::error::StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHash::from_hex(&s.to_ascii_lowercase())
            .ok_or_else(|| crate::error::StorageError::InvalidPath(format!("not a content hash: {}", s)))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier accepted by lookups.
///
/// Content stored before digests were introduced is addressed by an opaque
/// filesystem path instead of a sharded hash location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentId {
    Hash(ContentHash),
    Legacy(PathBuf),
}

impl ContentId {
    /// Well-formed hex becomes a hash; anything else is a legacy path.
    pub fn parse(id: &str) -> Self {
        match ContentHash::from_hex(&id.to_ascii_lowercase()) {
            Some(hash) => ContentId::Hash(hash),
            None => ContentId::Legacy(PathBuf::from(id)),
        }
    }

    pub fn hash(&self) -> Option<&ContentHash> {
        match self {
            ContentId::Hash(hash) => Some(hash),
            ContentId::Legacy(_) => None,
        }
    }

    /// Key for the in-memory maps: hex for hashes, the path string otherwise.
    pub fn key(&self) -> String {
        match self {
            ContentId::Hash(hash) => hash.to_hex(),
            ContentId::Legacy(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl From<ContentHash> for ContentId {
    fn from(hash: ContentHash) -> Self {
        ContentId::Hash(hash)
    }
}

impl From<&Path> for ContentId {
    fn from(path: &Path) -> Self {
        ContentId::Legacy(path.to_path_buf())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentId::Hash(hash) => write!(f, "{}", hash),
            ContentId::Legacy(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A named claim that some content must stay available.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentReference {
    content_identifier: String,
    hex_hash: String,
}

impl ContentReference {
    pub fn new(content_identifier: impl Into<String>, hex_hash: impl Into<String>) -> Self {
        Self {
            content_identifier: content_identifier.into(),
            hex_hash: hex_hash.into().to_ascii_lowercase(),
        }
    }

    pub fn for_hash(content_identifier: impl Into<String>, hash: &ContentHash) -> Self {
        Self::new(content_identifier, hash.to_hex())
    }

    pub fn content_identifier(&self) -> &str {
        &self.content_identifier
    }

    pub fn hex_hash(&self) -> &str {
        &self.hex_hash
    }

    pub fn hash(&self) -> Option<ContentHash> {
        ContentHash::from_hex(&self.hex_hash)
    }

    /// Where this reference points: the digest when it is well formed,
    /// otherwise the content identifier as a legacy path.
    pub fn content_id(&self) -> ContentId {
        match self.hash() {
            Some(hash) => ContentId::Hash(hash),
            None => ContentId::Legacy(PathBuf::from(&self.content_identifier)),
        }
    }

    /// Key into the reference map.
    pub fn key(&self) -> String {
        self.content_id().key()
    }
}
