//! Hash-verified block chunking.
//!
//! Payload bytes travel as a sequence of length-delimited blocks, each
//! carrying a SHA-256 digest of its payload:
//!
//! ```text
//! index: u32 LE | hash: [u8; 32] | size: i32 LE | payload: [u8; size]
//! ```
//!
//! Indices start at 0 and increase by one. A zero-size block with an
//! all-zero hash terminates the sequence. A block's payload is only ever
//! served after its digest has been checked, so corruption anywhere in a
//! block surfaces as an error instead of bad data.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::channel::ByteChannel;
use crate::error::{Result, StreamError};

/// Length of the per-block SHA-256 digest.
pub const BLOCK_HASH_LEN: usize = 32;
/// Default payload size per block (1 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

pub struct HashedBlockChannel<C: ByteChannel> {
    inner: C,
    block_size: usize,
    /// Write side: payload being accumulated for the next block.
    /// Read side: payload of the current block being served.
    buffer: Vec<u8>,
    buffer_pos: usize,
    block_index: u32,
    wrote: bool,
    eof: bool,
    error: Option<StreamError>,
}

impl<C: ByteChannel> HashedBlockChannel<C> {
    /// Wraps `inner` with the default 1 MiB block size.
    pub fn wrap(inner: C) -> Self {
        Self::with_block_size(inner, DEFAULT_BLOCK_SIZE)
    }

    /// Wraps `inner`, chunking written data into `block_size`-byte blocks.
    /// The read side accepts whatever sizes the wire declares; `block_size`
    /// only shapes what this instance writes.
    pub fn with_block_size(inner: C, block_size: usize) -> Self {
        assert!(
            block_size > 0 && block_size <= i32::MAX as usize,
            "block size must fit the wire size field"
        );
        Self {
            inner,
            block_size,
            buffer: Vec::new(),
            buffer_pos: 0,
            block_index: 0,
            wrote: false,
            eof: false,
            error: None,
        }
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
        match &self.error {
            Some(err) => Err(err.as_sticky()),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        self.error = Some(err.clone());
        err
    }

    /// Reads from the inner channel until `buf` is full or the channel
    /// ends, returning how many bytes landed.
    fn fill_from_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..])?;
            if n == 0 {
                if self.inner.at_end() {
                    break;
                }
                continue;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Decodes the next block into `buffer`. Returns false at the
    /// terminator.
    fn read_hashed_block(&mut self) -> Result<bool> {
        let mut index_bytes = [0u8; 4];
        if self.fill_from_inner(&mut index_bytes)? != index_bytes.len() {
            return Err(StreamError::Format("block index truncated".into()));
        }
        let index = u32::from_le_bytes(index_bytes);
        if index != self.block_index {
            return Err(StreamError::Integrity(format!(
                "block index mismatch: expected {}, found {index}",
                self.block_index
            )));
        }

        let mut hash = [0u8; BLOCK_HASH_LEN];
        if self.fill_from_inner(&mut hash)? != BLOCK_HASH_LEN {
            return Err(StreamError::Format("block hash truncated".into()));
        }

        let mut size_bytes = [0u8; 4];
        if self.fill_from_inner(&mut size_bytes)? != size_bytes.len() {
            return Err(StreamError::Format("block size truncated".into()));
        }
        let size = i32::from_le_bytes(size_bytes);
        if size < 0 {
            return Err(StreamError::Format(format!("negative block size: {size}")));
        }

        if size == 0 {
            if hash != [0u8; BLOCK_HASH_LEN] {
                return Err(StreamError::Integrity(
                    "terminator block carries a non-zero hash".into(),
                ));
            }
            self.eof = true;
            debug!(blocks = self.block_index, "hashed block stream ended");
            return Ok(false);
        }

        let mut payload = vec![0u8; size as usize];
        if self.fill_from_inner(&mut payload)? != payload.len() {
            return Err(StreamError::Format("block too short".into()));
        }

        let digest: [u8; BLOCK_HASH_LEN] = Sha256::digest(&payload).into();
        if digest != hash {
            return Err(StreamError::Integrity(format!(
                "hash mismatch in block {index}"
            )));
        }

        self.buffer = payload;
        self.buffer_pos = 0;
        self.block_index += 1;
        Ok(true)
    }

    /// Emits `buffer` as one block and clears it. An empty buffer produces
    /// the terminator: size zero, all-zero hash.
    fn write_hashed_block(&mut self) -> Result<()> {
        let hash: [u8; BLOCK_HASH_LEN] = if self.buffer.is_empty() {
            [0u8; BLOCK_HASH_LEN]
        } else {
            Sha256::digest(&self.buffer).into()
        };

        let mut block = Vec::with_capacity(4 + BLOCK_HASH_LEN + 4 + self.buffer.len());
        block.extend_from_slice(&self.block_index.to_le_bytes());
        block.extend_from_slice(&hash);
        block.extend_from_slice(&(self.buffer.len() as i32).to_le_bytes());
        block.extend_from_slice(&self.buffer);

        self.inner.write_all(&block)?;
        self.block_index += 1;
        self.buffer.clear();
        Ok(())
    }

    /// Flushes a partial block if one is buffered, then the terminator.
    fn finish_write(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.write_hashed_block()?;
        }
        self.write_hashed_block()?;
        debug!(blocks = self.block_index, "hashed block stream finalized");
        Ok(())
    }
}

impl<C: ByteChannel> ByteChannel for HashedBlockChannel<C> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.guard()?;
        let mut filled = 0;
        while filled < buf.len() && !self.eof {
            if self.buffer_pos == self.buffer.len() {
                match self.read_hashed_block() {
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
        self.wrote = true;
        let mut consumed = 0;
        while consumed < buf.len() {
            let take = (buf.len() - consumed).min(self.block_size - self.buffer.len());
            self.buffer.extend_from_slice(&buf[consumed..consumed + take]);
            consumed += take;
            if self.buffer.len() == self.block_size {
                if let Err(err) = self.write_hashed_block() {
                    return Err(self.fail(err));
                }
            }
        }
        Ok(buf.len())
    }

    fn at_end(&self) -> bool {
        self.eof && self.buffer_pos >= self.buffer.len()
    }

    /// Finalizes a write session and closes inward. Any write call opens
    /// a session, even one carrying zero payload bytes; a channel only
    /// ever read from just forwards the close.
    fn close(&mut self) -> Result<()> {
        self.guard()?;
        if self.wrote {
            if let Err(err) = self.finish_write() {
                return Err(self.fail(err));
            }
        }
        self.inner.close()
    }

    /// Clears a sticky error, finalizes any pending write session, and
    /// starts a fresh block sequence on the same channel.
    fn reset(&mut self) -> Result<()> {
        self.error = None;
        if self.wrote {
            if let Err(err) = self.finish_write() {
                return Err(self.fail(err));
            }
        }
        self.buffer.clear();
        self.buffer_pos = 0;
        self.block_index = 0;
        self.wrote = false;
        self.eof = false;
        Ok(())
    }
}
