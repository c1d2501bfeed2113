//! On-disk vault layout.
//!
//! A vault file is a fixed-size plaintext header followed by the encrypted
//! stream. Integers are little-endian:
//!
//! ```text
//! magic "VSTR" | version u8 | mem_cost_kib u32 | time_cost u32 |
//! parallelism u32 | salt [16] | iv [16] | stream key [32] | start bytes [32]
//! ```
//!
//! Everything after the header is AES-256-CBC ciphertext carrying the
//! start bytes again and then the hashed-block stream. Re-reading the start
//! bytes through the cipher is the fast wrong-password check: a bad key
//! decrypts them to noise.

use std::fmt;

use zeroize::Zeroize;

use crate::crypto::{IV_LEN, KdfParams, SALT_LEN, STREAM_KEY_LEN};
use crate::error::{Result, StreamError};

/// Magic bytes identifying a vault file ("VSTR").
pub const MAGIC: &[u8; MAGIC_LEN] = b"VSTR";
/// Length of the magic bytes.
pub const MAGIC_LEN: usize = 4;
/// Length of the version field.
pub const VER_LEN: usize = 1;
/// Length of one Argon2 cost field.
pub const COST_LEN: usize = 4;
/// Length of the random start-byte probe.
pub const START_BYTES_LEN: usize = 32;
/// Current format version.
pub const VERSION_V1: u8 = 1;

pub struct VaultHeader {
    version: u8,
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
    stream_key: [u8; STREAM_KEY_LEN],
    start_bytes: [u8; START_BYTES_LEN],
}

impl VaultHeader {
    pub const LEN: usize = MAGIC_LEN
        + VER_LEN
        + 3 * COST_LEN
        + SALT_LEN
        + IV_LEN
        + STREAM_KEY_LEN
        + START_BYTES_LEN;

    pub fn new(
        kdf: KdfParams,
        salt: [u8; SALT_LEN],
        iv: [u8; IV_LEN],
        stream_key: [u8; STREAM_KEY_LEN],
        start_bytes: [u8; START_BYTES_LEN],
    ) -> Self {
        Self {
            version: VERSION_V1,
            kdf,
            salt,
            iv,
            stream_key,
            start_bytes,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn stream_key(&self) -> &[u8; STREAM_KEY_LEN] {
        &self.stream_key
    }

    pub fn start_bytes(&self) -> &[u8; START_BYTES_LEN] {
        &self.start_bytes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);

        buf.extend_from_slice(MAGIC);
        buf.push(self.version);

        buf.extend_from_slice(&self.kdf.mem_cost_kib().to_le_bytes());
        buf.extend_from_slice(&self.kdf.time_cost().to_le_bytes());
        buf.extend_from_slice(&self.kdf.parallelism().to_le_bytes());

        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&self.iv);
        buf.extend_from_slice(&self.stream_key);
        buf.extend_from_slice(&self.start_bytes);

        buf
    }

    /// Parses a header from the front of `data`, returning it together
    /// with the offset where the ciphertext starts.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < Self::LEN {
            return Err(StreamError::Format("vault file too short".into()));
        }

        if &data[..MAGIC_LEN] != MAGIC {
            return Err(StreamError::Format("not a vaultstream file".into()));
        }

        let version = data[MAGIC_LEN];
        if version != VERSION_V1 {
            return Err(StreamError::Format(format!(
                "unsupported vault version: {version}"
            )));
        }

        // The length check above guarantees every take below is in bounds.
        let mut offset = MAGIC_LEN + VER_LEN;
        let mem_cost_kib = take_u32(data, &mut offset);
        let time_cost = take_u32(data, &mut offset);
        let parallelism = take_u32(data, &mut offset);

        let kdf = KdfParams::new(mem_cost_kib, time_cost, parallelism)
            .map_err(|e| StreamError::Format(format!("invalid KDF parameters in header: {e}")))?;

        let salt = take_array::<SALT_LEN>(data, &mut offset);
        let iv = take_array::<IV_LEN>(data, &mut offset);
        let stream_key = take_array::<STREAM_KEY_LEN>(data, &mut offset);
        let start_bytes = take_array::<START_BYTES_LEN>(data, &mut offset);

        Ok((
            VaultHeader {
                version,
                kdf,
                salt,
                iv,
                stream_key,
                start_bytes,
            },
            offset,
        ))
    }
}

// Keeps the stream key out of `{:?}` and log output.
impl fmt::Debug for VaultHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultHeader")
            .field("version", &self.version)
            .field("kdf", &self.kdf)
            .field("salt", &self.salt)
            .field("iv", &self.iv)
            .field("stream_key", &"[REDACTED]")
            .field("start_bytes", &self.start_bytes)
            .finish()
    }
}

impl Drop for VaultHeader {
    fn drop(&mut self) {
        self.stream_key.zeroize();
    }
}

fn take_u32(data: &[u8], offset: &mut usize) -> u32 {
    let mut buf = [0u8; COST_LEN];
    buf.copy_from_slice(&data[*offset..*offset + COST_LEN]);
    *offset += COST_LEN;
    u32::from_le_bytes(buf)
}

fn take_array<const N: usize>(data: &[u8], offset: &mut usize) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&data[*offset..*offset + N]);
    *offset += N;
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VaultHeader {
        VaultHeader::new(
            KdfParams::new(65536, 3, 2).unwrap(),
            [1u8; SALT_LEN],
            [2u8; IV_LEN],
            [3u8; STREAM_KEY_LEN],
            [4u8; START_BYTES_LEN],
        )
    }

    #[test]
    fn header_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), VaultHeader::LEN);

        let (parsed, offset) = VaultHeader::from_bytes(&bytes).unwrap();
        assert_eq!(offset, VaultHeader::LEN);
        assert_eq!(parsed.version(), VERSION_V1);
        assert_eq!(parsed.kdf().mem_cost_kib(), 65536);
        assert_eq!(parsed.kdf().time_cost(), 3);
        assert_eq!(parsed.kdf().parallelism(), 2);
        assert_eq!(parsed.salt(), header.salt());
        assert_eq!(parsed.iv(), header.iv());
        assert_eq!(parsed.stream_key(), header.stream_key());
        assert_eq!(parsed.start_bytes(), header.start_bytes());
    }

    #[test]
    fn parse_ignores_trailing_ciphertext() {
        let mut bytes = sample().to_bytes();
        bytes.extend_from_slice(&[0xCC; 64]);
        let (_, offset) = VaultHeader::from_bytes(&bytes).unwrap();
        assert_eq!(offset, VaultHeader::LEN);
    }

    #[test]
    fn invalid_magic_fails() {
        let mut bytes = sample().to_bytes();
        bytes[..4].copy_from_slice(b"FAIL");
        let err = VaultHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, StreamError::Format(ref msg) if msg.contains("not a vaultstream")));
    }

    #[test]
    fn unsupported_version_fails() {
        let mut bytes = sample().to_bytes();
        bytes[4] = 99;
        let err = VaultHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, StreamError::Format(ref msg) if msg.contains("unsupported")));
    }

    #[test]
    fn too_short_fails() {
        let bytes = sample().to_bytes();
        let err = VaultHeader::from_bytes(&bytes[..VaultHeader::LEN - 1]).unwrap_err();
        assert!(matches!(err, StreamError::Format(ref msg) if msg.contains("too short")));
    }

    #[test]
    fn debug_output_redacts_the_stream_key() {
        let header = sample();
        let rendered = format!("{header:?}");
        assert!(rendered.contains("stream_key: \"[REDACTED]\""));
        // sample() fills the stream key with 3s; none may leak.
        assert!(!rendered.contains("3, 3, 3"));
    }

    #[test]
    fn absurd_kdf_costs_fail_parsing() {
        let mut bytes = sample().to_bytes();
        // Zero out the three cost fields.
        for b in &mut bytes[MAGIC_LEN + VER_LEN..MAGIC_LEN + VER_LEN + 3 * COST_LEN] {
            *b = 0;
        }
        let err = VaultHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, StreamError::Format(ref msg) if msg.contains("KDF")));
    }
}
