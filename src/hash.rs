use crate::error::Error;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Content hash recorded for every archived file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgo {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgo::Sha256 => "sha256",
            HashAlgo::Sha512 => "sha512",
            HashAlgo::Blake3 => "blake3",
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            HashAlgo::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgo::Sha512 => hex::encode(Sha512::digest(data)),
            HashAlgo::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    /// Length of the hex digest text.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgo::Sha256 | HashAlgo::Blake3 => 64,
            HashAlgo::Sha512 => 128,
        }
    }

    pub(crate) fn is_default(&self) -> bool {
        *self == HashAlgo::default()
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgo::Sha256),
            "sha512" => Ok(HashAlgo::Sha512),
            "blake3" => Ok(HashAlgo::Blake3),
            _ => Err(Error::UnsupportedHash(s.to_string())),
        }
    }
}
