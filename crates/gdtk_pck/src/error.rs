use std::io;
use thiserror::Error;

/// Result type for pack operations.
pub type Result<T> = std::result::Result<T, PckError>;

/// Errors that can occur while writing or mounting a pack.
#[derive(Error, Debug)]
pub enum PckError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Encryption key is not 256 bits.
    #[error("encryption key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Stream does not start with the pack magic.
    #[error("bad pack magic: {0:#010x}")]
    BadMagic(u32),

    /// Pack was written by a newer format revision.
    #[error("unsupported pack format version: {0}")]
    UnsupportedFormat(u32),

    /// Directory or encrypted block failed to parse.
    #[error("corrupt pack: {0}")]
    Corrupt(String),

    /// An encrypted block decrypted to bytes whose digest does not match.
    #[error("encrypted block digest mismatch (wrong key?)")]
    DigestMismatch,

    /// A body's bytes do not hash to the digest stored in the directory.
    #[error("file digest mismatch: {0}")]
    FileDigestMismatch(String),

    /// The directory or a body is encrypted and no key was supplied.
    #[error("pack is encrypted and no key was supplied")]
    MissingKey,

    /// No directory entry for the requested path.
    #[error("file not found in pack: {0}")]
    FileNotFound(String),
}
