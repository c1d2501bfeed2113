//! Stream filters layered over [`crate::channel::ByteChannel`].
//!
//! Filters own the channel they wrap and are composed by construction:
//!
//! ```text
//! writer:  HashedBlockChannel -> CipherChannel -> FileChannel
//! reader:  HashedBlockChannel <- CipherChannel <- FileChannel
//! ```
//!
//! Closing the outermost filter flushes its terminal marker and then
//! closes inward. A filter's first failure is sticky: later calls return a
//! state error until the filter is reset.

pub mod cipher;
pub mod hashed_block;

pub use cipher::CipherChannel;
pub use hashed_block::HashedBlockChannel;
