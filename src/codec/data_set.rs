//! Data-set fingerprints

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Number of hex digits carried on the wire.
pub const DATA_SET_ID_LEN: usize = 5;

const DATA_SET_ID_MASK: u32 = (1 << (DATA_SET_ID_LEN * 4)) - 1;

/// 20-bit fingerprint shared by every frame of one transfer.
///
/// Derived from the leading bits of the SHA-1 digest of the serialized
/// payload. Collisions are expected across unrelated payloads; the id only
/// lets a receiver notice that the sender switched data sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataSetId(u32);

impl DataSetId {
    /// Fingerprint a serialized payload.
    pub fn for_payload(payload: &str) -> Self {
        let digest = Sha1::digest(payload.as_bytes());
        let prefix = (u32::from(digest[0]) << 12)
            | (u32::from(digest[1]) << 4)
            | (u32::from(digest[2]) >> 4);
        Self::from_bits(prefix)
    }

    /// Build from raw bits; anything above 20 bits is discarded.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & DATA_SET_ID_MASK)
    }
}

impl fmt::Display for DataSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05x}", self.0)
    }
}

/// Error returned when a string is not exactly five hex digits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("data set id must be {DATA_SET_ID_LEN} hex digits, got {0:?}")]
pub struct InvalidDataSetId(pub String);

impl FromStr for DataSetId {
    type Err = InvalidDataSetId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DATA_SET_ID_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidDataSetId(s.to_string()));
        }
        u32::from_str_radix(s, 16).map(Self::from_bits).map_err(|_| InvalidDataSetId(s.to_string()))
    }
}

impl TryFrom<String> for DataSetId {
    type Error = InvalidDataSetId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataSetId> for String {
    fn from(id: DataSetId) -> Self {
        id.to_string()
    }
}
