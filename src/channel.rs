//! Byte channels: the transport abstraction shared by base endpoints and
//! stream filters.
//!
//! A channel is used in one direction per session. `read` returning
//! `Ok(0)` is ambiguous on its own: when [`ByteChannel::at_end`] is false
//! it means "no progress yet, retry", and only with `at_end` true does it
//! mean the stream is exhausted. The provided `read_exact` and `read_all`
//! helpers implement that retry loop.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Result, StreamError};

pub trait ByteChannel {
    /// Reads up to `buf.len()` bytes, returning how many were produced.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes bytes from `buf`, returning how many were consumed.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// True once the channel cannot produce any further bytes.
    fn at_end(&self) -> bool;

    /// Finalizes pending output and releases the endpoint. Filters flush
    /// their terminal markers here and then close the wrapped channel.
    fn close(&mut self) -> Result<()>;

    /// Returns the channel to a fresh state for a new session. On filters
    /// this also clears a sticky error.
    fn reset(&mut self) -> Result<()>;

    /// Reads exactly `buf.len()` bytes, retrying zero-progress reads until
    /// the channel reports its end.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                if self.at_end() {
                    return Err(StreamError::Format("unexpected end of stream".into()));
                }
                continue;
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads until the channel reports its end.
    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                if self.at_end() {
                    break;
                }
                continue;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    /// Writes all of `buf`, retrying partial writes. Always makes at least
    /// one `write` call, so an empty `buf` still opens a write session on
    /// filters that finalize on close.
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        loop {
            written += self.write(&buf[written..])?;
            if written >= buf.len() {
                return Ok(());
            }
        }
    }
}

/// In-memory channel over an owned byte buffer.
///
/// Reads and writes share one cursor; writes overwrite from the cursor and
/// extend the buffer past its end. `reset` rewinds the cursor without
/// touching the data, so a buffer written in one session can be read back
/// in the next.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteChannel for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

/// Channel over a regular file.
///
/// Length and position are tracked here rather than probed, so `at_end` is
/// exact before any zero-length read. The decrypting filter relies on that
/// to recognize the final cipher block.
#[derive(Debug)]
pub struct FileChannel {
    file: File,
    len: u64,
    pos: u64,
    dirty: bool,
}

impl FileChannel {
    /// Opens an existing file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| StreamError::Io(format!("failed to open {}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| StreamError::Io(format!("failed to stat {}: {e}", path.display())))?
            .len();
        Ok(Self { file, len, pos: 0, dirty: false })
    }

    /// Creates (or truncates) a file for writing.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| StreamError::Io(format!("failed to create {}: {e}", path.display())))?;
        Ok(Self { file, len: 0, pos: 0, dirty: false })
    }
}

impl ByteChannel for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.file.write(buf)?;
        self.pos += n as u64;
        self.len = self.len.max(self.pos);
        self.dirty = true;
        Ok(n)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.len
    }

    fn close(&mut self) -> Result<()> {
        if self.dirty {
            self.file.sync_all()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.pos = 0;
        Ok(())
    }
}
