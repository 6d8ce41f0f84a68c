//! Content fingerprinting.
//!
//! Every identifier in a snapshot is derived from bytes, never from paths or
//! pipeline state: a document is known by the xxHash64 of its contents and a
//! category by the xxHash64 of its display name. Identical inputs produce
//! identical IDs on every run and every platform, which is what lets a sync
//! reuse the rendered output of the previous one.

use crate::error::{DocShelfError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use xxhash_rust::xxh64::{xxh64, Xxh64};

const SEED: u64 = 0;
const CHUNK_SIZE: usize = 64 * 1024;

/// Fingerprint a byte slice.
pub fn fingerprint(bytes: &[u8]) -> u64 {
    xxh64(bytes, SEED)
}

/// Fingerprint a file by streaming it in fixed-size chunks.
pub fn fingerprint_file(path: &Path) -> Result<u64> {
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(path)?);
    let mut hasher = Xxh64::new(SEED);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.digest())
}

fn parse_hex(s: &str) -> Result<u64> {
    if s.is_empty() || s.len() > 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DocShelfError::InvalidId(s.to_string()));
    }
    u64::from_str_radix(s, 16).map_err(|_| DocShelfError::InvalidId(s.to_string()))
}

macro_rules! fingerprint_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name(u64);

        impl $name {
            pub const fn from_raw(value: u64) -> Self {
                Self(value)
            }

            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DocShelfError;

            fn from_str(s: &str) -> Result<Self> {
                parse_hex(s).map(Self)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = DocShelfError;

            fn try_from(s: String) -> Result<Self> {
                s.parse()
            }
        }
    };
}

fingerprint_id!(
    /// Identifies a document by the fingerprint of its raw bytes.
    DocumentId
);

fingerprint_id!(
    /// Identifies a category by the fingerprint of its display name.
    CategoryId
);

impl DocumentId {
    pub fn of(bytes: &[u8]) -> Self {
        Self(fingerprint(bytes))
    }

    pub fn of_file(path: &Path) -> Result<Self> {
        fingerprint_file(path).map(Self)
    }
}

impl CategoryId {
    pub fn of_name(name: &str) -> Self {
        Self(fingerprint(name.as_bytes()))
    }
}
