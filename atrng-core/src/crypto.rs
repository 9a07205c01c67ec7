//! Hashing and randomness helpers

use crate::config::HashAlgorithm;
use bytes::Bytes;
use num_bigint::BigUint;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha384, Sha512};

impl HashAlgorithm {
    /// Condense arbitrary-length input into a fixed-size digest
    pub fn digest(&self, data: &[u8]) -> Bytes {
        match self {
            Self::Sha256 => Bytes::copy_from_slice(&Sha256::digest(data)),
            Self::Sha384 => Bytes::copy_from_slice(&Sha384::digest(data)),
            Self::Sha512 => Bytes::copy_from_slice(&Sha512::digest(data)),
        }
    }
}

/// Lowercase hexadecimal text of a digest
pub fn digest_to_hex(digest: &[u8]) -> String {
    hex::encode(digest)
}

/// Unsigned big-endian integer interpretation of a digest
pub fn digest_to_integer(digest: &[u8]) -> BigUint {
    BigUint::from_bytes_be(digest)
}

/// Fill a block with bytes from the operating system CSPRNG
pub fn random_block(size: usize) -> Bytes {
    let mut block = vec![0u8; size];
    rand::rngs::OsRng.fill_bytes(&mut block);
    Bytes::from(block)
}
