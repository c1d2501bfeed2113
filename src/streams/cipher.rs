//! Block-cipher stream filter.
//!
//! Wraps a channel so that writes are encrypted block by block and reads
//! are decrypted block by block, with PKCS7 padding marking the end of the
//! plaintext. The engine decides the block size; this filter only deals in
//! whole blocks and the padding rules.
//!
//! Reads may return `Ok(0)` while a block is still accumulating from a
//! slow inner channel (the filling state). Callers distinguish that from
//! exhaustion via [`ByteChannel::at_end`] and retry; the provided
//! `read_exact`/`read_all` helpers do this automatically.

use tracing::debug;

use crate::channel::ByteChannel;
use crate::crypto::CipherEngine;
use crate::error::{Result, StreamError};

pub struct CipherChannel<C: ByteChannel, E: CipherEngine> {
    inner: C,
    engine: E,
    /// Write side: plaintext accumulating toward a block. Read side:
    /// decrypted plaintext being served, or raw bytes while filling.
    buffer: Vec<u8>,
    buffer_pos: usize,
    /// Read side: a partial raw block is buffered and more inner bytes are
    /// expected.
    filling: bool,
    ready: bool,
    dirty: bool,
    error: Option<StreamError>,
}

impl<C: ByteChannel, E: CipherEngine> CipherChannel<C, E> {
    pub fn wrap(inner: C, engine: E) -> Self {
        Self {
            inner,
            engine,
            buffer: Vec::new(),
            buffer_pos: 0,
            filling: false,
            ready: false,
            dirty: false,
            error: None,
        }
    }

    /// Keys the engine. Must succeed before the channel carries data; a
    /// failed init leaves the channel unusable but not poisoned, so it may
    /// be retried.
    pub fn init(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        self.engine.init(key, iv)?;
        self.ready = true;
        Ok(())
    }

    /// Unwraps the filter, dropping any unflushed write state.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// First failure recorded on this channel, if any.
    pub fn last_error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    fn guard(&self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(err.as_sticky());
        }
        if !self.ready {
            return Err(StreamError::State("cipher channel used before init".into()));
        }
        Ok(())
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        self.error = Some(err.clone());
        err
    }

    /// Makes one attempt to complete and decrypt the next block.
    ///
    /// Returns `Ok(true)` when `buffer` holds servable plaintext and
    /// `Ok(false)` for both "still filling, retry" and "clean end of
    /// stream"; the caller tells those apart through `at_end`.
    fn read_block(&mut self) -> Result<bool> {
        let block_size = self.engine.block_size();
        if !self.filling {
            self.buffer.clear();
            self.buffer_pos = 0;
        }

        let mut chunk = vec![0u8; block_size - self.buffer.len()];
        let n = self.inner.read(&mut chunk)?;
        self.buffer.extend_from_slice(&chunk[..n]);

        if self.buffer.len() < block_size {
            if self.inner.at_end() {
                if self.buffer.is_empty() {
                    return Ok(false);
                }
                return Err(StreamError::Format("truncated cipher block".into()));
            }
            self.filling = true;
            return Ok(false);
        }

        self.filling = false;
        self.engine.process_in_place(&mut self.buffer)?;
        self.buffer_pos = 0;
        if self.inner.at_end() {
            self.strip_padding()?;
        }
        Ok(true)
    }

    /// PKCS7-unpads `buffer` as the final block of the stream. A block of
    /// nothing but padding empties the buffer.
    fn strip_padding(&mut self) -> Result<()> {
        let block_size = self.engine.block_size();
        let pad = self.buffer[block_size - 1] as usize;

        if pad == block_size {
            if self.buffer.iter().any(|&b| b as usize != block_size) {
                return Err(StreamError::Format("invalid block size".into()));
            }
            self.buffer.clear();
            return Ok(());
        }
        if pad == 0 || pad > block_size {
            return Err(StreamError::Format("invalid padding".into()));
        }
        if self.buffer[block_size - pad..].iter().any(|&b| b as usize != pad) {
            return Err(StreamError::Format("invalid padding".into()));
        }
        self.buffer.truncate(block_size - pad);
        Ok(())
    }

    /// Encrypts and flushes `buffer`. With `last` set, the buffer is first
    /// padded out to a whole block; an empty buffer becomes a block of
    /// nothing but padding.
    fn write_block(&mut self, last: bool) -> Result<()> {
        let block_size = self.engine.block_size();
        if last {
            let pad = block_size - self.buffer.len();
            self.buffer.resize(block_size, pad as u8);
        }
        self.engine.process_in_place(&mut self.buffer)?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }
}

impl<C: ByteChannel, E: CipherEngine> ByteChannel for CipherChannel<C, E> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.guard()?;
        let mut filled = 0;
        while filled < buf.len() {
            if self.filling || self.buffer_pos >= self.buffer.len() {
                match self.read_block() {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => return Err(self.fail(err)),
                }
            }
            let take = (buf.len() - filled).min(self.buffer.len() - self.buffer_pos);
            buf[filled..filled + take]
                .copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + take]);
            self.buffer_pos += take;
            filled += take;
        }
        Ok(filled)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.guard()?;
        self.dirty = true;
        let block_size = self.engine.block_size();
        let mut consumed = 0;
        while consumed < buf.len() {
            let take = (buf.len() - consumed).min(block_size - self.buffer.len());
            self.buffer.extend_from_slice(&buf[consumed..consumed + take]);
            consumed += take;
            if self.buffer.len() == block_size {
                if let Err(err) = self.write_block(false) {
                    return Err(self.fail(err));
                }
            }
        }
        Ok(buf.len())
    }

    fn at_end(&self) -> bool {
        self.inner.at_end() && self.buffer_pos >= self.buffer.len()
    }

    /// Flushes the padded final block if anything was ever written, then
    /// closes inward. Writing nothing still produces the all-padding block
    /// so an opened write session always ends in valid PKCS7.
    fn close(&mut self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(err.as_sticky());
        }
        if self.dirty {
            if let Err(err) = self.write_block(true) {
                return Err(self.fail(err));
            }
            debug!("cipher stream finalized");
        }
        self.inner.close()
    }

    /// Clears a sticky error, finalizes a dirty write session, and rewinds
    /// the engine for a fresh session over the same channel.
    fn reset(&mut self) -> Result<()> {
        self.error = None;
        if self.dirty {
            if let Err(err) = self.write_block(true) {
                return Err(self.fail(err));
            }
        }
        self.buffer.clear();
        self.buffer_pos = 0;
        self.filling = false;
        self.dirty = false;
        if self.ready {
            self.engine.reset()?;
        }
        Ok(())
    }
}
