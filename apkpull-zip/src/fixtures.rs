//! Builds small archives in memory, for tests that need an APK on disk.

use std::io::Write;

use byteorder::{WriteBytesExt, LE};
use libflate::deflate;

use crate::{crc_bytes, Compression};

/// Assembles a ZIP archive containing the given `(name, compression, contents)` entries.
pub fn build_archive(files: &[(&str, Compression, &[u8])]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for (name, compression, contents) in files {
        let method: u16 = match compression {
            Compression::Store => 0,
            Compression::Deflate => 8,
            Compression::Unsupported(other) => *other,
        };
        let stored = match compression {
            Compression::Deflate => {
                let mut encoder = deflate::Encoder::new(Vec::new());
                encoder.write_all(contents)?;
                encoder.finish().into_result()?
            }
            _ => contents.to_vec(),
        };
        let offset = out.len() as u32;
        let crc = crc_bytes(contents);

        out.write_u32::<LE>(0x04034b50)?;
        out.write_u16::<LE>(20)?; // Version needed
        out.write_u16::<LE>(0)?; // Flags
        out.write_u16::<LE>(method)?;
        out.write_u32::<LE>(0)?; // Last modified
        out.write_u32::<LE>(crc)?;
        out.write_u32::<LE>(stored.len() as u32)?;
        out.write_u32::<LE>(contents.len() as u32)?;
        out.write_u16::<LE>(name.len() as u16)?;
        out.write_u16::<LE>(0)?; // Extra field length
        out.write_all(name.as_bytes())?;
        out.write_all(&stored)?;

        central.write_u32::<LE>(0x02014b50)?;
        central.write_u16::<LE>(20)?; // Version made by
        central.write_u16::<LE>(20)?; // Version needed
        central.write_u16::<LE>(0)?;
        central.write_u16::<LE>(method)?;
        central.write_u32::<LE>(0)?;
        central.write_u32::<LE>(crc)?;
        central.write_u32::<LE>(stored.len() as u32)?;
        central.write_u32::<LE>(contents.len() as u32)?;
        central.write_u16::<LE>(name.len() as u16)?;
        central.write_u16::<LE>(0)?; // Extra field length
        central.write_u16::<LE>(0)?; // Comment length
        central.write_u16::<LE>(0)?; // Disk number
        central.write_u16::<LE>(0)?; // Internal attributes
        central.write_u32::<LE>(0)?; // External attributes
        central.write_u32::<LE>(offset)?;
        central.write_all(name.as_bytes())?;
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);

    out.write_u32::<LE>(0x06054b50)?;
    out.write_u16::<LE>(0)?;
    out.write_u16::<LE>(0)?;
    out.write_u16::<LE>(files.len() as u16)?;
    out.write_u16::<LE>(files.len() as u16)?;
    out.write_u32::<LE>(central.len() as u32)?;
    out.write_u32::<LE>(cd_offset)?;
    out.write_u16::<LE>(0)?;
    Ok(out)
}
