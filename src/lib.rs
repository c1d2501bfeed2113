//! vaultstream: streaming encryption and integrity layer for password
//! vault files.
//!
//! A vault file is a fixed plaintext header (magic, version, Argon2 costs,
//! salt, IV, stream key, start bytes) followed by AES-256-CBC ciphertext.
//! The ciphertext carries 32 random start bytes, re-checked after
//! decryption as a fast wrong-password test, and then the payload chunked
//! into SHA-256-verified blocks:
//!
//! ```text
//! seal:  payload -> HashedBlockChannel -> CipherChannel -> channel
//! open:  payload <- HashedBlockChannel <- CipherChannel <- channel
//! ```
//!
//! Filters implement [`ByteChannel`] and own what they wrap, so a pipeline
//! is built by construction and torn down by closing the outermost filter.
//! Protected field values inside the decrypted payload are descrambled
//! separately via [`ProtectedStream`], keyed from the header's stream key.

mod channel;
mod crypto;
mod error;
mod format;
mod storage;
mod streams;

pub use crate::channel::{ByteChannel, FileChannel, MemoryChannel};
pub use crate::crypto::{
    Aes256CbcEngine, CipherEngine, Direction, KEY_LEN, KdfParams, PROTECTED_STREAM_NONCE,
    ProtectedStream, Salsa20Engine, derive_key,
};
pub use crate::error::{Result, StreamError};
pub use crate::format::{START_BYTES_LEN, VERSION_V1, VaultHeader};
pub use crate::storage::Storage;
pub use crate::streams::hashed_block::DEFAULT_BLOCK_SIZE;
pub use crate::streams::{CipherChannel, HashedBlockChannel};

use std::fmt;

use anyhow::Context;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{IV_LEN, SALT_LEN, STREAM_KEY_LEN};

/// A vault opened from its sealed form.
pub struct Unsealed {
    header: VaultHeader,
    payload: Zeroizing<Vec<u8>>,
    protected: ProtectedStream,
}

impl Unsealed {
    /// The decrypted, integrity-checked payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Zeroizing<Vec<u8>> {
        self.payload
    }

    pub fn header(&self) -> &VaultHeader {
        &self.header
    }

    /// Keystream for descrambling protected values, already keyed from the
    /// header. Values must be processed in document order.
    pub fn protected_stream(&mut self) -> &mut ProtectedStream {
        &mut self.protected
    }
}

// Keeps the decrypted payload and keystream state out of `{:?}` and log
// output.
impl fmt::Debug for Unsealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsealed")
            .field("header", &self.header)
            .field("payload", &"[REDACTED]")
            .field("protected", &"[REDACTED]")
            .finish()
    }
}

/// Seals `payload` into `inner` and returns the channel once the stream
/// has been finalized and closed.
pub fn seal_into<C: ByteChannel>(
    mut inner: C,
    password: &str,
    kdf: KdfParams,
    payload: &[u8],
) -> anyhow::Result<C> {
    let header = VaultHeader::new(
        kdf,
        random_array::<SALT_LEN>()?,
        random_array::<IV_LEN>()?,
        random_array::<STREAM_KEY_LEN>()?,
        random_array::<START_BYTES_LEN>()?,
    );
    let key = derive_key(password, header.salt(), kdf)
        .context("failed to derive encryption key")?;

    inner
        .write_all(&header.to_bytes())
        .context("failed to write vault header")?;

    let mut cipher = CipherChannel::wrap(inner, Aes256CbcEngine::new(Direction::Encrypt));
    cipher.init(key.as_slice(), header.iv())?;
    cipher.write_all(header.start_bytes())?;

    let mut blocks = HashedBlockChannel::wrap(cipher);
    blocks.write_all(payload)?;
    blocks
        .close()
        .context("failed to finalize vault stream")?;

    debug!(payload = payload.len(), "vault sealed");
    Ok(blocks.into_inner().into_inner())
}

/// Seals `payload` into a standalone byte vector.
pub fn seal(password: &str, kdf: KdfParams, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let channel = seal_into(MemoryChannel::new(), password, kdf, payload)?;
    Ok(channel.into_inner())
}

/// Opens a vault by streaming it out of `inner`.
///
/// Fails with an integrity error before touching the block stream when the
/// password is wrong, via the start-byte probe.
pub fn open_from<C: ByteChannel>(mut inner: C, password: &str) -> anyhow::Result<Unsealed> {
    let mut header_bytes = [0u8; VaultHeader::LEN];
    inner
        .read_exact(&mut header_bytes)
        .context("failed to read vault header")?;
    let (header, _) = VaultHeader::from_bytes(&header_bytes)?;

    let key = derive_key(password, header.salt(), *header.kdf())
        .context("unable to derive encryption key")?;

    let mut cipher = CipherChannel::wrap(inner, Aes256CbcEngine::new(Direction::Decrypt));
    cipher.init(key.as_slice(), header.iv())?;

    let mut probe = [0u8; START_BYTES_LEN];
    cipher
        .read_exact(&mut probe)
        .context("vault is truncated")?;
    if probe != *header.start_bytes() {
        return Err(
            StreamError::Integrity("wrong password or corrupted vault".into()).into(),
        );
    }

    let mut blocks = HashedBlockChannel::wrap(cipher);
    let payload = Zeroizing::new(blocks.read_all().context("failed to read vault payload")?);
    let protected = ProtectedStream::new(header.stream_key())?;

    debug!(payload = payload.len(), "vault opened");
    Ok(Unsealed {
        header,
        payload,
        protected,
    })
}

/// Opens a vault held in memory.
pub fn open(data: &[u8], password: &str) -> anyhow::Result<Unsealed> {
    open_from(MemoryChannel::with_data(data.to_vec()), password)
}

fn random_array<const N: usize>() -> anyhow::Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::fill(&mut buf).context("OS random generator unavailable")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_kdf() -> KdfParams {
        KdfParams::new(8 * 1024, 1, 1).unwrap()
    }

    #[test]
    fn seal_and_open_round_trip() {
        let payload: &[u8] = b"entry: example.com / alice / hunter2";
        let sealed = seal("master password", fast_kdf(), payload).unwrap();

        assert_eq!(&sealed[..4], b"VSTR");
        assert!(!sealed.windows(payload.len()).any(|w| w == payload));

        let unsealed = open(&sealed, "master password").unwrap();
        assert_eq!(unsealed.payload(), payload);
        assert_eq!(unsealed.header().version(), VERSION_V1);
    }

    #[test]
    fn empty_payload_round_trips() {
        let sealed = seal("pw", fast_kdf(), &[]).unwrap();
        let unsealed = open(&sealed, "pw").unwrap();
        assert_eq!(unsealed.payload(), b"");
    }

    #[test]
    fn multi_block_payload_round_trips() {
        // Spans two full 1 MiB blocks plus a partial third.
        let payload: Vec<u8> = (0..2_500_000u32).map(|i| (i % 251) as u8).collect();
        let sealed = seal("pw", fast_kdf(), &payload).unwrap();
        let unsealed = open(&sealed, "pw").unwrap();
        assert_eq!(unsealed.payload(), payload.as_slice());
    }

    #[test]
    fn wrong_password_fails_fast_on_the_probe() {
        let sealed = seal("correct", fast_kdf(), b"payload").unwrap();
        let err = open(&sealed, "wrong").unwrap_err();
        let stream_err = err.downcast_ref::<StreamError>();
        assert!(
            matches!(stream_err, Some(StreamError::Integrity(_))),
            "got: {err:?}"
        );
    }

    #[test]
    fn tampered_ciphertext_is_detected() {
        let sealed = seal("pw", fast_kdf(), &[0x5A; 4096]).unwrap();

        // Flip one bit in the middle of the block stream, past the header
        // and the probe.
        let mut tampered = sealed.clone();
        let mid = VaultHeader::LEN + 1000;
        tampered[mid] ^= 0x01;
        assert!(open(&tampered, "pw").is_err());
    }

    #[test]
    fn truncated_vault_fails() {
        let sealed = seal("pw", fast_kdf(), b"data").unwrap();

        // Inside the header.
        assert!(open(&sealed[..40], "pw").is_err());
        // Inside the probe block.
        assert!(open(&sealed[..VaultHeader::LEN + 10], "pw").is_err());
        // Mid block stream.
        assert!(open(&sealed[..sealed.len() - 9], "pw").is_err());
    }

    #[test]
    fn seal_into_a_file_channel_and_open_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.vstr");

        let payload = vec![0x42u8; 10_000];
        let file = FileChannel::create(&path).unwrap();
        seal_into(file, "pw", fast_kdf(), &payload).unwrap();

        let reader = FileChannel::open(&path).unwrap();
        let unsealed = open_from(reader, "pw").unwrap();
        assert_eq!(unsealed.payload(), payload.as_slice());
    }

    #[test]
    fn protected_values_descramble_through_the_reader_stream() {
        // The writer scrambles protected values with its own stream before
        // sealing; the reader reproduces the keystream from the header.
        let sealed = seal("pw", fast_kdf(), b"doc").unwrap();
        let (header, _) = VaultHeader::from_bytes(&sealed).unwrap();

        let mut writer_stream = ProtectedStream::new(header.stream_key()).unwrap();
        let scrambled_a = writer_stream.process(b"first secret").unwrap();
        let scrambled_b = writer_stream.process(b"second secret").unwrap();

        let mut unsealed = open(&sealed, "pw").unwrap();
        let reader_stream = unsealed.protected_stream();
        assert_eq!(reader_stream.process(&scrambled_a).unwrap(), b"first secret");
        assert_eq!(reader_stream.process(&scrambled_b).unwrap(), b"second secret");
    }

    #[test]
    fn each_seal_is_unique() {
        let a = seal("pw", fast_kdf(), b"same payload").unwrap();
        let b = seal("pw", fast_kdf(), b"same payload").unwrap();
        // Fresh salt, IV and start bytes every time.
        assert_ne!(a, b);
    }
}
