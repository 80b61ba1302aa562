//! Mounting and reading packs.
//!
//! The reader exists for verification tooling and tests: it parses the
//! header, decrypts the directory when flagged, binary searches the sorted
//! directory, and checks every body against its stored digest.

use byteorder::{ReadBytesExt, LE};
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::crypt;
use crate::error::{PckError, Result};
use crate::format::{
    EngineVersion, FileEntry, PACK_DIR_ENCRYPTED, PACK_FILE_ENCRYPTED, PACK_FORMAT_VERSION,
    PACK_HEADER_MAGIC,
};

/// A mounted pack.
#[derive(Debug)]
pub struct PckArchive<R: Read + Seek> {
    source: R,
    pub format_version: u32,
    pub version: EngineVersion,
    pub pack_flags: u32,
    files_base: u64,
    entries: Vec<FileEntry>,
}

impl<R: Read + Seek> PckArchive<R> {
    /// Mount a standalone pack starting at the beginning of `source`.
    ///
    /// `key` is required when the directory is encrypted.
    pub fn mount(source: R, key: Option<&[u8; 32]>) -> Result<Self> {
        Self::mount_at(source, 0, key)
    }

    /// Mount a pack embedded in an executable by locating the 12-byte
    /// trailer `[u64 pck_size][u32 magic]` at the end of `source`.
    pub fn mount_embedded(mut source: R, key: Option<&[u8; 32]>) -> Result<Self> {
        let end = source.seek(SeekFrom::End(0))?;
        if end < 12 {
            return Err(PckError::Corrupt("file too small for a trailer".into()));
        }
        source.seek(SeekFrom::Start(end - 12))?;
        let pck_size = source.read_u64::<LE>()?;
        let magic = source.read_u32::<LE>()?;
        if magic != PACK_HEADER_MAGIC {
            return Err(PckError::BadMagic(magic));
        }
        let pck_start = (end - 12)
            .checked_sub(pck_size)
            .ok_or_else(|| PckError::Corrupt("trailer size exceeds file".into()))?;
        Self::mount_at(source, pck_start, key)
    }

    fn mount_at(mut source: R, pck_start: u64, key: Option<&[u8; 32]>) -> Result<Self> {
        source.seek(SeekFrom::Start(pck_start))?;

        let magic = source.read_u32::<LE>()?;
        if magic != PACK_HEADER_MAGIC {
            return Err(PckError::BadMagic(magic));
        }
        let format_version = source.read_u32::<LE>()?;
        if format_version > PACK_FORMAT_VERSION {
            return Err(PckError::UnsupportedFormat(format_version));
        }
        let version = EngineVersion::new(
            source.read_u32::<LE>()?,
            source.read_u32::<LE>()?,
            source.read_u32::<LE>()?,
        );
        let pack_flags = source.read_u32::<LE>()?;
        let files_base = source.read_u64::<LE>()?;
        for _ in 0..16 {
            source.read_u32::<LE>()?; // reserved
        }
        let file_count = source.read_u32::<LE>()?;

        let entries = if pack_flags & PACK_DIR_ENCRYPTED != 0 {
            let key = key.ok_or(PckError::MissingKey)?;
            let block = crypt::read_frame(&mut source, key)?;
            read_entries(&mut Cursor::new(block), file_count)?
        } else {
            read_entries(&mut source, file_count)?
        };

        Ok(Self {
            source,
            format_version,
            version,
            pack_flags,
            files_base,
            entries,
        })
    }

    /// Directory entries in sorted order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn find(&self, path: &str) -> Option<&FileEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_bytes().cmp(path.as_bytes()))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Read one body, decrypting when flagged, and verify its digest.
    pub fn read_file(&mut self, path: &str, key: Option<&[u8; 32]>) -> Result<Vec<u8>> {
        let entry = self
            .find(path)
            .cloned()
            .ok_or_else(|| PckError::FileNotFound(path.to_owned()))?;

        self.source
            .seek(SeekFrom::Start(self.files_base + entry.ofs))?;

        let data = if entry.encrypted {
            let key = key.ok_or(PckError::MissingKey)?;
            crypt::read_frame(&mut self.source, key)?
        } else {
            let mut data = vec![0u8; entry.size as usize];
            self.source.read_exact(&mut data)?;
            data
        };

        if data.len() as u64 != entry.size || crypt::md5_digest(&data) != entry.md5 {
            return Err(PckError::FileDigestMismatch(entry.path));
        }
        Ok(data)
    }

    /// Verify every body in the pack against the directory.
    pub fn verify(&mut self, key: Option<&[u8; 32]>) -> Result<()> {
        let paths: Vec<String> = self.entries.iter().map(|e| e.path.clone()).collect();
        for path in paths {
            self.read_file(&path, key)?;
        }
        Ok(())
    }
}

fn read_entries<R: Read>(source: &mut R, count: u32) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let path_len = source.read_u32::<LE>()?;
        if path_len % 4 != 0 {
            return Err(PckError::Corrupt(format!(
                "entry path length {path_len} is not 4-aligned"
            )));
        }
        let mut path = vec![0u8; path_len as usize];
        source.read_exact(&mut path)?;
        while path.last() == Some(&0) {
            path.pop();
        }
        let path = String::from_utf8(path)
            .map_err(|_| PckError::Corrupt("entry path is not UTF-8".into()))?;

        let ofs = source.read_u64::<LE>()?;
        let size = source.read_u64::<LE>()?;
        let mut md5 = [0u8; 16];
        source.read_exact(&mut md5)?;
        let flags = source.read_u32::<LE>()?;

        entries.push(FileEntry {
            path,
            ofs,
            size,
            md5,
            encrypted: flags & PACK_FILE_ENCRYPTED != 0,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{PckOptions, PckWriter};
    use std::io::Cursor;

    #[test]
    fn missing_file_is_reported() {
        let mut writer = PckWriter::new_deterministic().unwrap();
        writer.add_file("res://a.txt", b"hi", None).unwrap();
        let mut out = Cursor::new(Vec::new());
        writer
            .finish(&mut out, &PckOptions::new(EngineVersion::new(4, 0, 0)))
            .unwrap();

        let mut archive = PckArchive::mount(out, None).unwrap();
        match archive.read_file("res://nope.txt", None) {
            Err(PckError::FileNotFound(path)) => assert_eq!(path, "res://nope.txt"),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let data = vec![0u8; 128];
        match PckArchive::mount(Cursor::new(data), None) {
            Err(PckError::BadMagic(0)) => {}
            other => panic!("expected bad magic, got {other:?}"),
        }
    }

    #[test]
    fn tampered_body_fails_digest_check() {
        let mut writer = PckWriter::new_deterministic().unwrap();
        writer.add_file("res://a.txt", b"hello", None).unwrap();
        let mut out = Cursor::new(Vec::new());
        writer
            .finish(&mut out, &PckOptions::new(EngineVersion::new(4, 0, 0)))
            .unwrap();

        let mut data = out.into_inner();
        let files_base = u64::from_le_bytes(data[24..32].try_into().unwrap()) as usize;
        // Flip a bit inside the body region.
        data[files_base] ^= 0xFF;

        let mut archive = PckArchive::mount(Cursor::new(data), None).unwrap();
        match archive.read_file("res://a.txt", None) {
            Err(PckError::FileDigestMismatch(_)) => {}
            other => panic!("expected digest mismatch, got {other:?}"),
        }
    }
}
