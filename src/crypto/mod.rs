//! Cryptographic building blocks for the vault pipeline.
//!
//! Provides the cipher engines, key derivation, and the protected-value
//! keystream.

pub mod engine;
pub mod kdf;
pub mod protected;

pub use engine::{Aes256CbcEngine, CipherEngine, Direction, Salsa20Engine};
pub use kdf::{KdfParams, derive_key};
pub use protected::ProtectedStream;

/// Length of the vault encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the Argon2 salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the AES-CBC initialization vector (16 bytes).
pub const IV_LEN: usize = 16;
/// AES block size (16 bytes).
pub const AES_BLOCK_LEN: usize = 16;
/// Salsa20 keystream block size (64 bytes).
pub const KEYSTREAM_BLOCK_LEN: usize = 64;
/// Length of the Salsa20 nonce (8 bytes).
pub const SALSA20_NONCE_LEN: usize = 8;
/// Length of the protected-stream key seed stored in the header (32 bytes).
pub const STREAM_KEY_LEN: usize = 32;
/// Nonce keying the protected-value keystream. Fixed by the file format so
/// any reader holding the stream key can reproduce the keystream.
pub const PROTECTED_STREAM_NONCE: [u8; SALSA20_NONCE_LEN] =
    [0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A];
