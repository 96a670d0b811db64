use std::io::{Read, Seek, SeekFrom};

use anyhow::{anyhow, Context, Result};
use byteorder::{ReadBytesExt, LE};

use super::Compression;

impl From<u16> for Compression {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Store,
            8 => Self::Deflate,
            other => Self::Unsupported(other),
        }
    }
}

// End of central directory record. Only the fields needed to locate the central directory are kept.
pub struct EndOfCentDir {
    pub cent_dir_records: u16,
    pub cent_dir_offset: u32,
}

impl EndOfCentDir {
    pub const HEADER: u32 = 0x06054b50;
    pub const MIN_SIZE: u64 = 22;
    pub const COMMENT_LENGTH_FIELD_OFFSET: u64 = 20;

    /// Scans backwards from the end of the archive for the EOCD record.
    /// The record is only accepted if its comment length agrees with where it was found,
    /// so a stray signature inside an archive comment is not mistaken for the real thing.
    pub fn locate(data: &mut (impl Read + Seek)) -> Result<Self> {
        let archive_size = data.seek(SeekFrom::End(0))?;
        if archive_size < Self::MIN_SIZE {
            return Err(anyhow!("File too small to be a valid ZIP archive"));
        }

        let max_comment_len = (archive_size - Self::MIN_SIZE).min(u16::MAX as u64);
        let no_comment_pos = archive_size - Self::MIN_SIZE;

        for comment_len in 0..=max_comment_len {
            let eocd_pos = no_comment_pos - comment_len;
            data.seek(SeekFrom::Start(eocd_pos))?;
            if data.read_u32::<LE>()? != Self::HEADER {
                continue;
            }

            data.seek(SeekFrom::Start(eocd_pos + Self::COMMENT_LENGTH_FIELD_OFFSET))?;
            if data.read_u16::<LE>()? as u64 == comment_len {
                data.seek(SeekFrom::Start(eocd_pos))?;
                return Self::read(data).context("Invalid EOCD");
            }
        }

        Err(anyhow!("No end of central directory found, is this an APK?"))
    }

    fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(anyhow!("Invalid EOCD header"));
        }

        let disk_num = data.read_u16::<LE>()?;
        let start_of_cd_disk = data.read_u16::<LE>()?;
        let cd_records_on_disk = data.read_u16::<LE>()?;
        let cent_dir_records = data.read_u16::<LE>()?;
        let _cent_dir_size = data.read_u32::<LE>()?;
        let cent_dir_offset = data.read_u32::<LE>()?;

        if cent_dir_records != cd_records_on_disk || start_of_cd_disk != 0 || disk_num != 0 {
            return Err(anyhow!("Multi-disk archives are not supported"));
        }

        Ok(Self {
            cent_dir_records,
            cent_dir_offset,
        })
    }
}

// Central directory record for one entry
#[derive(Clone, Debug)]
pub struct CentDirHeader {
    pub compression_method: Compression,
    pub crc32: u32,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
    pub local_header_offset: u32,
    pub file_name: String,
}

impl CentDirHeader {
    pub const HEADER: u32 = 0x02014b50;

    pub fn read(data: &mut impl Read) -> Result<Self> {
        if data.read_u32::<LE>()? != Self::HEADER {
            return Err(anyhow!("Invalid CD header signature"));
        }

        let _version_made_by = data.read_u16::<LE>()?;
        let _version_needed = data.read_u16::<LE>()?;
        let _flags = data.read_u16::<LE>()?;
        let compression_method = Compression::from(data.read_u16::<LE>()?);
        let _last_modified = data.read_u32::<LE>()?;
        let crc32 = data.read_u32::<LE>()?;
        let compressed_len = data.read_u32::<LE>()?;
        let uncompressed_len = data.read_u32::<LE>()?;

        let file_name_len = data.read_u16::<LE>()? as usize;
        let extra_field_len = data.read_u16::<LE>()? as u64;
        let comment_len = data.read_u16::<LE>()? as u64;

        if data.read_u16::<LE>()? != 0 {
            return Err(anyhow!("Multi-disk archives are not supported"));
        }

        let _internal_attrs = data.read_u16::<LE>()?;
        let _external_attrs = data.read_u32::<LE>()?;
        let local_header_offset = data.read_u32::<LE>()?;

        let mut file_name_buf = vec![0u8; file_name_len];
        data.read_exact(&mut file_name_buf)?;
        // The extra field and comment are of no use when reading entries
        std::io::copy(&mut (&mut *data).take(extra_field_len + comment_len), &mut std::io::sink())?;

        Ok(Self {
            compression_method,
            crc32,
            compressed_len,
            uncompressed_len,
            local_header_offset,
            // NB: Strictly speaking this is code page 437 unless flagged otherwise,
            // but APK entry names are UTF-8 in practice.
            file_name: String::from_utf8(file_name_buf).context("File name was not valid UTF-8")?,
        })
    }
}

impl CentDirHeader {
    /// Seeks `data` past the local file header of this entry, leaving it at the first byte of the entry contents.
    pub fn seek_to_contents(&self, data: &mut (impl Read + Seek)) -> Result<()> {
        const LFH_HEADER: u32 = 0x04034b50;
        // Signature + fixed fields up to (and including) the name and extra field lengths.
        const LFH_FIXED_LEN: u64 = 30;

        data.seek(SeekFrom::Start(self.local_header_offset as u64))?;
        if data.read_u32::<LE>()? != LFH_HEADER {
            return Err(anyhow!("Invalid LFH header signature for {}", self.file_name));
        }

        // Name and extra field lengths may differ from those in the central directory.
        data.seek(SeekFrom::Start(self.local_header_offset as u64 + 26))?;
        let name_len = data.read_u16::<LE>()? as u64;
        let extra_len = data.read_u16::<LE>()? as u64;

        data.seek(SeekFrom::Start(
            self.local_header_offset as u64 + LFH_FIXED_LEN + name_len + extra_len,
        ))?;
        Ok(())
    }
}
