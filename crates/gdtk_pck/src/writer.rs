//! Two-pass pack writer.
//!
//! [`PckWriter::add_file`] stages each body into a temporary file and records
//! a directory entry; [`PckWriter::finish`] sorts the directory, emits the
//! header and directory into the destination (optionally wrapping the
//! directory in an encrypted frame), back-patches `files_base`, splices the
//! staged bodies across, and, when embedding into an executable, appends the
//! trailer loaders scan for.
//!
//! The staging file is a [`tempfile::NamedTempFile`], so it is removed on
//! every exit path, including errors.

use byteorder::{WriteBytesExt, LE};
use rand::RngCore;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

use crate::crypt::{md5_digest, EncryptedWriter};
use crate::error::Result;
use crate::format::{
    pad, EngineVersion, FileEntry, PACK_DIR_ENCRYPTED, PACK_FILE_ENCRYPTED, PACK_FORMAT_VERSION,
    PACK_HEADER_MAGIC, PATH_PADDING, PCK_PADDING,
};

const SPLICE_BUF_SIZE: usize = 16384;

/// Final-pass options for [`PckWriter::finish`].
#[derive(Debug, Clone)]
pub struct PckOptions {
    /// Engine version stamped into the header.
    pub version: EngineVersion,
    /// When set, the directory block is wrapped in an encrypted frame and
    /// the header advertises `PACK_DIR_ENCRYPTED`.
    pub directory_key: Option<[u8; 32]>,
    /// Append to the destination instead of writing from the start, and
    /// emit the embedded trailer.
    pub embed: bool,
}

impl PckOptions {
    pub fn new(version: EngineVersion) -> Self {
        Self {
            version,
            directory_key: None,
            embed: false,
        }
    }
}

/// Byte ranges reported by [`PckWriter::finish`], used by the
/// executable-patching step after an embedded write.
#[derive(Debug, Clone, Copy)]
pub struct PckSummary {
    pub file_count: u32,
    /// Offset of the pack header in the destination.
    pub pck_start: u64,
    /// Offset where embedded data begins (equals `pck_start` rounded down
    /// to the pre-padding position; 0 for standalone packs).
    pub embedded_start: u64,
    /// Total embedded length including padding and trailer; 0 for
    /// standalone packs.
    pub embedded_size: u64,
}

/// Accumulates staged bodies and directory entries for one pack.
pub struct PckWriter {
    staging: NamedTempFile,
    entries: Vec<FileEntry>,
    deterministic: bool,
}

impl PckWriter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            staging: NamedTempFile::new()?,
            entries: Vec::new(),
            deterministic: false,
        })
    }

    /// A writer whose padding is zero-filled and whose encrypted frames use
    /// a fixed IV, so identical input produces identical output.
    pub fn new_deterministic() -> Result<Self> {
        let mut writer = Self::new()?;
        writer.deterministic = true;
        Ok(writer)
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// Stage one body. `key` enables per-body encryption; `size` and the
    /// digest always describe the plaintext.
    pub fn add_file(&mut self, path: &str, data: &[u8], key: Option<&[u8; 32]>) -> Result<()> {
        let file = self.staging.as_file_mut();
        let ofs = file.stream_position()?;

        match key {
            Some(key) => {
                let mut sink = if self.deterministic {
                    EncryptedWriter::with_iv(&mut *file, key, [0u8; 16])?
                } else {
                    EncryptedWriter::new(&mut *file, key)?
                };
                sink.write_all(data)?;
                sink.finish()?;
            }
            None => file.write_all(data)?,
        }

        let pos = file.stream_position()?;
        write_padding(file, pad(PCK_PADDING, pos), self.deterministic)?;

        self.entries.push(FileEntry {
            path: path.to_owned(),
            ofs,
            size: data.len() as u64,
            md5: md5_digest(data),
            encrypted: key.is_some(),
        });
        Ok(())
    }

    /// Emit the final pack into `out`.
    ///
    /// For standalone packs `out` is written from its current position; for
    /// embedded packs it is seeked to the end, padded to an 8-byte boundary,
    /// and the trailer `[u64 pck_size][u32 magic]` is appended after the
    /// bodies.
    pub fn finish<W: Write + Seek>(mut self, out: &mut W, options: &PckOptions) -> Result<PckSummary> {
        // Loaders binary search the directory.
        self.entries
            .sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));

        let mut embed_pos = 0;
        if options.embed {
            out.seek(SeekFrom::End(0))?;
            embed_pos = out.stream_position()?;
            // Embedded packs start at a 64-bit boundary.
            write_zeros(out, pad(8, embed_pos))?;
        }

        let pck_start = out.stream_position()?;

        out.write_u32::<LE>(PACK_HEADER_MAGIC)?;
        out.write_u32::<LE>(PACK_FORMAT_VERSION)?;
        out.write_u32::<LE>(options.version.major)?;
        out.write_u32::<LE>(options.version.minor)?;
        out.write_u32::<LE>(options.version.patch)?;

        let mut pack_flags = 0u32;
        if options.directory_key.is_some() {
            pack_flags |= PACK_DIR_ENCRYPTED;
        }
        out.write_u32::<LE>(pack_flags)?;

        let files_base_ofs = out.stream_position()?;
        out.write_u64::<LE>(0)?; // patched below once the directory size is known

        for _ in 0..16 {
            out.write_u32::<LE>(0)?; // reserved
        }

        out.write_u32::<LE>(self.entries.len() as u32)?;

        match options.directory_key {
            Some(key) => {
                let mut sink = if self.deterministic {
                    EncryptedWriter::with_iv(&mut *out, &key, [0u8; 16])?
                } else {
                    EncryptedWriter::new(&mut *out, &key)?
                };
                for entry in &self.entries {
                    write_entry(&mut sink, entry)?;
                }
                sink.finish()?;
            }
            None => {
                for entry in &self.entries {
                    write_entry(&mut *out, entry)?;
                }
            }
        }

        let pos = out.stream_position()?;
        write_padding(out, pad(PCK_PADDING, pos), self.deterministic)?;

        let files_base = out.stream_position()?;
        out.seek(SeekFrom::Start(files_base_ofs))?;
        out.write_u64::<LE>(files_base)?;
        out.seek(SeekFrom::Start(files_base))?;

        // Splice the staged bodies across in bounded chunks.
        let staging = self.staging.as_file_mut();
        staging.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; SPLICE_BUF_SIZE];
        loop {
            let got = staging.read(&mut buf)?;
            if got == 0 {
                break;
            }
            out.write_all(&buf[..got])?;
        }

        let mut summary = PckSummary {
            file_count: self.entries.len() as u32,
            pck_start,
            embedded_start: 0,
            embedded_size: 0,
        };

        if options.embed {
            // Align so the 12-byte trailer ends on a 64-bit boundary. The
            // bias accounts for the trailer itself; loaders depend on this
            // exact layout when scanning backwards.
            let pos = out.stream_position()?;
            let embed_end = pos - embed_pos + 12;
            write_zeros(out, embed_end % 8)?;

            let pck_size = out.stream_position()? - pck_start;
            out.write_u64::<LE>(pck_size)?;
            out.write_u32::<LE>(PACK_HEADER_MAGIC)?;

            summary.embedded_start = embed_pos;
            summary.embedded_size = out.stream_position()? - embed_pos;
        }

        Ok(summary)
    }
}

fn write_entry<W: Write>(out: &mut W, entry: &FileEntry) -> Result<()> {
    let path = entry.path.as_bytes();
    let path_pad = pad(PATH_PADDING, path.len() as u64);

    out.write_u32::<LE>(path.len() as u32 + path_pad as u32)?;
    out.write_all(path)?;
    for _ in 0..path_pad {
        out.write_u8(0)?;
    }

    out.write_u64::<LE>(entry.ofs)?;
    out.write_u64::<LE>(entry.size)?;
    out.write_all(&entry.md5)?;

    let mut flags = 0u32;
    if entry.encrypted {
        flags |= PACK_FILE_ENCRYPTED;
    }
    out.write_u32::<LE>(flags)?;
    Ok(())
}

fn write_padding<W: Write>(out: &mut W, count: u64, deterministic: bool) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let mut bytes = vec![0u8; count as usize];
    if !deterministic {
        // Random bytes so slot boundaries of encrypted bodies are not
        // trivially visible as runs of zeros.
        rand::thread_rng().fill_bytes(&mut bytes);
    }
    out.write_all(&bytes)?;
    Ok(())
}

fn write_zeros<W: Write>(out: &mut W, count: u64) -> Result<()> {
    for _ in 0..count {
        out.write_u8(0)?;
    }
    Ok(())
}
