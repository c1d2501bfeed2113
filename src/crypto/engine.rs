//! Cipher engines behind a common trait.
//!
//! An engine owns the primitive's key schedule plus whatever chaining
//! state its mode needs. Stream filters hold their engine exclusively;
//! nothing here is shared or locked.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256Dec, Aes256Enc, Block};
use salsa20::Salsa20;
use salsa20::cipher::{KeyIvInit, StreamCipher};
use zeroize::Zeroize;

use crate::crypto::{AES_BLOCK_LEN, KEY_LEN, SALSA20_NONCE_LEN};
use crate::error::{Result, StreamError};

/// Whether [`CipherEngine::process_in_place`] encrypts or decrypts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// A cipher primitive together with its mode state.
pub trait CipherEngine {
    /// Prepares the key schedule and mode state. Must succeed before any
    /// call to [`CipherEngine::process_in_place`].
    fn init(&mut self, key: &[u8], iv: &[u8]) -> Result<()>;

    /// Transform granularity in bytes.
    fn block_size(&self) -> usize;

    /// Transforms `buf` in place. Block modes require `buf` to be a
    /// non-empty multiple of [`CipherEngine::block_size`].
    fn process_in_place(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Rewinds the mode state (chaining vector, keystream position) to
    /// the state right after `init`, keeping the key.
    fn reset(&mut self) -> Result<()>;
}

enum AesSchedule {
    Encrypt(Aes256Enc),
    Decrypt(Aes256Dec),
}

/// AES-256 in CBC mode.
///
/// Padding is the caller's concern; this engine only transforms whole
/// blocks and carries the chaining vector between calls.
pub struct Aes256CbcEngine {
    direction: Direction,
    schedule: Option<AesSchedule>,
    iv: [u8; AES_BLOCK_LEN],
    chain: [u8; AES_BLOCK_LEN],
}

impl Aes256CbcEngine {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            schedule: None,
            iv: [0u8; AES_BLOCK_LEN],
            chain: [0u8; AES_BLOCK_LEN],
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl CipherEngine for Aes256CbcEngine {
    fn init(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        if key.len() != KEY_LEN {
            return Err(StreamError::Format(format!(
                "AES-256 key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        if iv.len() != AES_BLOCK_LEN {
            return Err(StreamError::Format(format!(
                "AES-CBC IV must be {AES_BLOCK_LEN} bytes, got {}",
                iv.len()
            )));
        }
        self.schedule = Some(match self.direction {
            Direction::Encrypt => AesSchedule::Encrypt(
                Aes256Enc::new_from_slice(key)
                    .map_err(|_| StreamError::Format("invalid AES key".into()))?,
            ),
            Direction::Decrypt => AesSchedule::Decrypt(
                Aes256Dec::new_from_slice(key)
                    .map_err(|_| StreamError::Format("invalid AES key".into()))?,
            ),
        });
        self.iv.copy_from_slice(iv);
        self.chain = self.iv;
        Ok(())
    }

    fn block_size(&self) -> usize {
        AES_BLOCK_LEN
    }

    fn process_in_place(&mut self, buf: &mut [u8]) -> Result<()> {
        let schedule = self
            .schedule
            .as_ref()
            .ok_or_else(|| StreamError::State("cipher engine used before init".into()))?;
        if buf.is_empty() || buf.len() % AES_BLOCK_LEN != 0 {
            return Err(StreamError::Format(format!(
                "cipher input must be a non-empty multiple of {AES_BLOCK_LEN} bytes, got {}",
                buf.len()
            )));
        }
        for chunk in buf.chunks_mut(AES_BLOCK_LEN) {
            match schedule {
                AesSchedule::Encrypt(cipher) => {
                    for (byte, prev) in chunk.iter_mut().zip(self.chain.iter()) {
                        *byte ^= prev;
                    }
                    cipher.encrypt_block(Block::from_mut_slice(chunk));
                    self.chain.copy_from_slice(chunk);
                }
                AesSchedule::Decrypt(cipher) => {
                    let mut ciphertext = [0u8; AES_BLOCK_LEN];
                    ciphertext.copy_from_slice(chunk);
                    cipher.decrypt_block(Block::from_mut_slice(chunk));
                    for (byte, prev) in chunk.iter_mut().zip(self.chain.iter()) {
                        *byte ^= prev;
                    }
                    self.chain = ciphertext;
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        if self.schedule.is_none() {
            return Err(StreamError::State("cipher engine used before init".into()));
        }
        self.chain = self.iv;
        Ok(())
    }
}

impl Drop for Aes256CbcEngine {
    fn drop(&mut self) {
        self.iv.zeroize();
        self.chain.zeroize();
    }
}

/// Salsa20 as a keystream generator.
///
/// Stream ciphers XOR, so direction is irrelevant and any buffer length is
/// accepted. Processing a zero-filled buffer yields raw keystream bytes.
pub struct Salsa20Engine {
    cipher: Option<Salsa20>,
    key: [u8; KEY_LEN],
    nonce: [u8; SALSA20_NONCE_LEN],
}

impl Salsa20Engine {
    pub fn new() -> Self {
        Self {
            cipher: None,
            key: [0u8; KEY_LEN],
            nonce: [0u8; SALSA20_NONCE_LEN],
        }
    }
}

impl Default for Salsa20Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherEngine for Salsa20Engine {
    fn init(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        if key.len() != KEY_LEN {
            return Err(StreamError::Format(format!(
                "Salsa20 key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        if iv.len() != SALSA20_NONCE_LEN {
            return Err(StreamError::Format(format!(
                "Salsa20 nonce must be {SALSA20_NONCE_LEN} bytes, got {}",
                iv.len()
            )));
        }
        self.key.copy_from_slice(key);
        self.nonce.copy_from_slice(iv);
        self.cipher = Some(
            Salsa20::new_from_slices(&self.key, &self.nonce)
                .map_err(|_| StreamError::Format("invalid Salsa20 key or nonce".into()))?,
        );
        Ok(())
    }

    fn block_size(&self) -> usize {
        crate::crypto::KEYSTREAM_BLOCK_LEN
    }

    fn process_in_place(&mut self, buf: &mut [u8]) -> Result<()> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or_else(|| StreamError::State("cipher engine used before init".into()))?;
        cipher.apply_keystream(buf);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        if self.cipher.is_none() {
            return Err(StreamError::State("cipher engine used before init".into()));
        }
        self.cipher = Some(
            Salsa20::new_from_slices(&self.key, &self.nonce)
                .map_err(|_| StreamError::Format("invalid Salsa20 key or nonce".into()))?,
        );
        Ok(())
    }
}

impl Drop for Salsa20Engine {
    fn drop(&mut self) {
        self.key.zeroize();
        self.nonce.zeroize();
    }
}
