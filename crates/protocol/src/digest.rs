use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Length of a digest in bytes (SHA-256).
pub const DIGEST_LEN: usize = 32;

/// Content digest of a transferred file, shown as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ProtocolError::MalformedStatus(format!("invalid digest {s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}
