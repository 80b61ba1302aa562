//! The Godot `.pck` content-pack container.
//!
//! A pack is written in two passes: file bodies are staged to a temporary
//! file while an in-memory directory accumulates, then the final stream gets
//! the header, the sorted directory and the spliced bodies. This keeps peak
//! memory bounded by the largest single file rather than the whole project.
//!
//! A pack can live standalone (`game.pck`) or be appended to an executable
//! with a 12-byte trailer that loaders find by scanning back from the end of
//! the file.

pub mod crypt;
mod error;
pub mod format;
pub mod read;
pub mod writer;

pub use error::{PckError, Result};
pub use format::{
    EngineVersion, FileEntry, PACK_DIR_ENCRYPTED, PACK_FILE_ENCRYPTED, PACK_FORMAT_VERSION,
    PACK_HEADER_MAGIC, PCK_PADDING,
};
pub use read::PckArchive;
pub use writer::{PckOptions, PckSummary, PckWriter};
