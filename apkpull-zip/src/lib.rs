//! Minimal read-only access to the entries of a ZIP archive, as needed to inspect APKs pulled from a device.

use anyhow::{anyhow, Context, Result};
use crc::{Algorithm, Crc};
use libflate::deflate;
use std::{
    collections::HashMap,
    io::{BufReader, Read, Seek, SeekFrom, Write},
};

use self::data::{CentDirHeader, EndOfCentDir};

mod data;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

/// The CRC-32 algorithm used by the ZIP file format.
pub static ZIP_CRC: Crc<u32> = Crc::<u32>::new(&Algorithm {
    width: 32,
    poly: 0x04c11db7,
    init: 0xffffffff,
    refin: true,
    refout: true,
    xorout: 0xffffffff,
    check: 0xcbf43926,
    residue: 0xdebb20e3,
});

/// Calculates the CRC-32 hash of a slice. (using the same CRC algorithm as in ZIP files)
pub fn crc_bytes(bytes: &[u8]) -> u32 {
    let mut digest = ZIP_CRC.digest();
    digest.update(bytes);
    digest.finalize()
}

// The compression method of a file within the archive, which may be an unsupported method.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Compression {
    Deflate,
    Store,
    Unsupported(u16),
}

/// A ZIP archive opened for reading.
pub struct ZipReader<T: Read + Seek> {
    file: T,
    entries: HashMap<String, CentDirHeader>,
}

impl<T: Read + Seek> ZipReader<T> {
    /// Opens a ZIP archive from a readable stream, loading its central directory.
    pub fn open(mut file: T) -> Result<Self> {
        let mut buf_file = BufReader::new(&mut file);

        let eocd = EndOfCentDir::locate(&mut buf_file)?;
        buf_file.seek(SeekFrom::Start(eocd.cent_dir_offset as u64))?;

        let mut entries = HashMap::with_capacity(eocd.cent_dir_records as usize);
        for _ in 0..eocd.cent_dir_records {
            let cd_record = CentDirHeader::read(&mut buf_file).context("Invalid CD file header")?;
            entries.insert(cd_record.file_name.clone(), cd_record);
        }

        drop(buf_file);
        Ok(Self { file, entries })
    }

    /// Returns true if and only if a file exists with name `name`
    pub fn contains_file(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns an iterator over the entries within the ZIP file.
    pub fn iter_entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_ref)
    }

    /// Reads the contents of the file with the given name from the ZIP.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        self.read_file_contents(name, &mut contents)?;
        Ok(contents)
    }

    /// Reads the contents of entry with full name `name` and writes them to `write_to`.
    /// The CRC-32 of the decompressed data is checked against the central directory.
    pub fn read_file_contents(&mut self, name: &str, write_to: &mut impl Write) -> Result<()> {
        let cd_header = self
            .entries
            .get(name)
            .ok_or_else(|| anyhow!("File with name {name} did not exist"))?;

        let mut buf_reader = BufReader::new(&mut self.file);
        cd_header
            .seek_to_contents(&mut buf_reader)
            .context("Invalid local file header")?;

        // Use the CDH for the compressed length, the LFH may have it set to 0 if data descriptors are used.
        let compressed_contents = (&mut buf_reader).take(cd_header.compressed_len as u64);
        let mut checked = CrcWriter::new(write_to);

        match cd_header.compression_method {
            Compression::Deflate => {
                let mut decoder = deflate::Decoder::new(compressed_contents);
                std::io::copy(&mut decoder, &mut checked).context("Inflating entry")?;
            }
            Compression::Store => {
                let mut stored = compressed_contents;
                std::io::copy(&mut stored, &mut checked)?;
            }
            Compression::Unsupported(method) => {
                return Err(anyhow!(
                    "Compression method `{method}` not supported for reading"
                ))
            }
        };

        let (crc, written) = checked.finish();
        if written != cd_header.uncompressed_len as u64 {
            return Err(anyhow!(
                "Entry {name} was {written} bytes, expected {}",
                cd_header.uncompressed_len
            ));
        }
        if crc != cd_header.crc32 {
            return Err(anyhow!("CRC-32 mismatch for entry {name}"));
        }

        Ok(())
    }
}

// Passes data through to the inner writer while tracking the ZIP CRC-32 and length.
struct CrcWriter<'w, W: Write> {
    inner: &'w mut W,
    digest: crc::Digest<'static, u32>,
    written: u64,
}

impl<'w, W: Write> CrcWriter<'w, W> {
    fn new(inner: &'w mut W) -> Self {
        Self {
            inner,
            digest: ZIP_CRC.digest(),
            written: 0,
        }
    }

    fn finish(self) -> (u32, u64) {
        (self.digest.finalize(), self.written)
    }
}

impl<W: Write> Write for CrcWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
