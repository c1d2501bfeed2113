//! Keystream scrambling for protected field values.
//!
//! Values marked protected inside the decrypted document are XORed with a
//! deterministic keystream rather than block-encrypted. The stream is keyed
//! by SHA-256 of the header's stream key and a nonce fixed by the file
//! format, so writer and reader reproduce the same byte sequence.
//!
//! Consumption is strictly sequential: every byte handed out advances the
//! stream, so protected values must be processed in document order, each
//! exactly once.

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::crypto::{CipherEngine, KEYSTREAM_BLOCK_LEN, PROTECTED_STREAM_NONCE, Salsa20Engine};
use crate::error::Result;

pub struct ProtectedStream {
    engine: Salsa20Engine,
    block: [u8; KEYSTREAM_BLOCK_LEN],
    offset: usize,
}

impl ProtectedStream {
    /// Keys the stream. The secret is hashed with SHA-256 before keying
    /// the cipher, so any length of key material is accepted.
    pub fn new(key: &[u8]) -> Result<Self> {
        let mut derived: [u8; 32] = Sha256::digest(key).into();
        let mut engine = Salsa20Engine::new();
        let keyed = engine.init(&derived, &PROTECTED_STREAM_NONCE);
        derived.zeroize();
        keyed?;
        Ok(Self {
            engine,
            block: [0u8; KEYSTREAM_BLOCK_LEN],
            offset: KEYSTREAM_BLOCK_LEN,
        })
    }

    /// Returns the next `len` keystream bytes.
    pub fn random_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            if self.offset == self.block.len() {
                self.next_block()?;
            }
            let take = (len - out.len()).min(self.block.len() - self.offset);
            out.extend_from_slice(&self.block[self.offset..self.offset + take]);
            self.offset += take;
        }
        Ok(out)
    }

    /// XORs `data` with the next keystream bytes. Self-inverse: the same
    /// call scrambles and descrambles.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = data.to_vec();
        self.process_in_place(&mut out)?;
        Ok(out)
    }

    pub fn process_in_place(&mut self, data: &mut [u8]) -> Result<()> {
        let keystream = self.random_bytes(data.len())?;
        for (byte, key) in data.iter_mut().zip(keystream.iter()) {
            *byte ^= key;
        }
        Ok(())
    }

    /// Keystream bytes are generated by running the cipher over a
    /// zero-filled block.
    fn next_block(&mut self) -> Result<()> {
        self.block = [0u8; KEYSTREAM_BLOCK_LEN];
        self.engine.process_in_place(&mut self.block)?;
        self.offset = 0;
        Ok(())
    }
}

impl Drop for ProtectedStream {
    fn drop(&mut self) {
        self.block.zeroize();
    }
}
