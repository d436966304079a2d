//! Resource identifiers.
//!
//! Every library resource is addressed by a 32-bit hash of its name. Names
//! are case-insensitive, so the hash runs over the lower-cased ASCII bytes.
//! Mesh references store the hash directly, which is why numeric ids pass
//! through unchanged.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

/// CRC-32 of the lower-cased name.
pub fn flcrc32(name: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for byte in name.bytes() {
        hasher.update(&[byte.to_ascii_lowercase()]);
    }
    hasher.finalize()
}

impl From<u32> for ResourceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self(flcrc32(name))
    }
}

impl From<&String> for ResourceId {
    fn from(name: &String) -> Self {
        Self(flcrc32(name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
