use std::{
    collections::HashMap,
    io::{Cursor, Read, Seek, SeekFrom},
};

use anyhow::{anyhow, Context, Result};
use byteorder::{ReadBytesExt, LE};

use super::{
    reader::read_chunk_type, string_pool::load_string_pool, ChunkType, TYPE_REFERENCE, TYPE_STRING,
};

// Reference chains longer than this are assumed to be cyclic.
const MAX_REFERENCE_DEPTH: u32 = 8;

// Entry flags
const FLAG_COMPLEX: u16 = 0x0001;
const FLAG_COMPACT: u16 = 0x0008;

// Type chunk flags
const FLAG_SPARSE: u8 = 0x01;
const FLAG_OFFSET16: u8 = 0x02;

const NO_ENTRY: u32 = 0xFFFFFFFF;

// Length of the type chunk header fields that come before its config.
const TYPE_HEADER_FIXED_LEN: u64 = 20;

/// The simple (non-bag) values of a compiled resource table, keyed by resource ID.
pub struct ResourceTable {
    strings: Vec<String>,
    values: HashMap<u32, Vec<ConfigValue>>,
}

#[derive(Copy, Clone, Debug)]
struct ConfigValue {
    // Lower is a better match for a device with no particular configuration.
    rank: u8,
    data_type: u8,
    data: u32,
}

impl ResourceTable {
    /// Parses the contents of `resources.arsc`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut data = Cursor::new(bytes);
        if read_chunk_type(&mut data)?.0 != Some(ChunkType::Table) {
            return Err(anyhow!("Resource table did not start with a table chunk"));
        }
        let table_end = (data.read_u32::<LE>()? as u64).min(bytes.len() as u64);
        let _package_count = data.read_u32::<LE>()?;

        let mut table = Self {
            strings: Vec::new(),
            values: HashMap::new(),
        };

        let mut chunk_start = data.stream_position()?;
        while chunk_start + 8 <= table_end {
            data.seek(SeekFrom::Start(chunk_start))?;
            let (chunk_type, _) = read_chunk_type(&mut data)?;
            let length = data.read_u32::<LE>()? as u64;
            if length < 8 {
                return Err(anyhow!("Chunk at {chunk_start} had invalid length {length}"));
            }

            match chunk_type {
                Some(ChunkType::StringPool) => {
                    table.strings =
                        load_string_pool(&mut data).context("Loading global string pool")?
                }
                Some(ChunkType::TablePackage) => table
                    .read_package(&mut data, chunk_start, length)
                    .context("Reading package")?,
                _ => {}
            }

            chunk_start += length;
        }

        Ok(table)
    }

    /// Resolves a string resource, following references to other resources.
    /// The default configuration is preferred over locale or device specific ones.
    pub fn resolve_string(&self, res_id: u32) -> Option<&str> {
        let mut id = res_id;
        for _ in 0..MAX_REFERENCE_DEPTH {
            let value = self.values.get(&id)?.iter().min_by_key(|value| value.rank)?;

            match value.data_type {
                TYPE_STRING => return self.strings.get(value.data as usize).map(String::as_str),
                TYPE_REFERENCE => id = value.data,
                _ => return None,
            }
        }

        None
    }

    fn read_package(
        &mut self,
        data: &mut Cursor<&[u8]>,
        pkg_start: u64,
        pkg_len: u64,
    ) -> Result<()> {
        data.seek(SeekFrom::Start(pkg_start + 2))?;
        let header_size = data.read_u16::<LE>()? as u64;
        data.seek(SeekFrom::Start(pkg_start + 8))?;
        let package_id = data.read_u32::<LE>()?;

        // The package contains its type and key string pools, then type spec and type chunks.
        // Only the type chunks hold values.
        let pkg_end = pkg_start + pkg_len;
        let mut chunk_start = pkg_start + header_size;
        while chunk_start + 8 <= pkg_end {
            data.seek(SeekFrom::Start(chunk_start))?;
            let (chunk_type, _) = read_chunk_type(data)?;
            let length = data.read_u32::<LE>()? as u64;
            if length < 8 {
                return Err(anyhow!("Chunk at {chunk_start} had invalid length {length}"));
            }

            if chunk_type == Some(ChunkType::TableType) {
                self.read_type(data, package_id, chunk_start)
                    .context("Reading type chunk")?;
            }

            chunk_start += length;
        }

        Ok(())
    }

    fn read_type(
        &mut self,
        data: &mut Cursor<&[u8]>,
        package_id: u32,
        type_start: u64,
    ) -> Result<()> {
        data.seek(SeekFrom::Start(type_start + 2))?;
        let header_size = data.read_u16::<LE>()? as u64;
        let available = (data.get_ref().len() as u64).saturating_sub(type_start);
        let size = (data.read_u32::<LE>()? as u64).min(available);
        let type_id = data.read_u8()? as u32;
        let flags = data.read_u8()?;
        let _reserved = data.read_u16::<LE>()?;
        let entry_count = data.read_u32::<LE>()?;
        let entries_start = data.read_u32::<LE>()? as u64;

        // Every entry has an offset of at least 2 bytes after the header.
        if header_size + entry_count as u64 * 2 > size {
            return Err(anyhow!(
                "Type chunk claims {entry_count} entries but is only {size} bytes"
            ));
        }
        let rank = read_config_rank(data, header_size.saturating_sub(TYPE_HEADER_FIXED_LEN))?;

        // Pairs of (entry index, offset from entries_start)
        data.seek(SeekFrom::Start(type_start + header_size))?;
        let mut offsets = Vec::with_capacity(entry_count as usize);
        for idx in 0..entry_count {
            if flags & FLAG_SPARSE != 0 {
                let entry_idx = data.read_u16::<LE>()? as u32;
                offsets.push((entry_idx, data.read_u16::<LE>()? as u32 * 4));
            } else if flags & FLAG_OFFSET16 != 0 {
                match data.read_u16::<LE>()? {
                    0xFFFF => {}
                    offset => offsets.push((idx, offset as u32 * 4)),
                }
            } else {
                match data.read_u32::<LE>()? {
                    NO_ENTRY => {}
                    offset => offsets.push((idx, offset)),
                }
            }
        }

        for (entry_idx, offset) in offsets {
            let entry_start = type_start + entries_start + offset as u64;
            data.seek(SeekFrom::Start(entry_start))?;

            let size_or_key = data.read_u16::<LE>()? as u64;
            let entry_flags = data.read_u16::<LE>()?;
            let (data_type, value) = if entry_flags & FLAG_COMPACT != 0 {
                // Compact entries store the data type in the high byte of the flags.
                ((entry_flags >> 8) as u8, data.read_u32::<LE>()?)
            } else if entry_flags & FLAG_COMPLEX != 0 {
                continue; // Styles, arrays and plurals
            } else {
                data.seek(SeekFrom::Start(entry_start + size_or_key))?;
                let _value_size = data.read_u16::<LE>()?;
                let _res0 = data.read_u8()?;
                (data.read_u8()?, data.read_u32::<LE>()?)
            };

            let res_id = (package_id << 24) | (type_id << 16) | entry_idx;
            self.values.entry(res_id).or_default().push(ConfigValue {
                rank,
                data_type,
                data: value,
            });
        }

        Ok(())
    }
}

// Ranks a ResTable_config: 0 for the default configuration, 1 for one that does not set a locale but is
// otherwise qualified (e.g. by screen density), 2 for a locale specific one.
// The config must fit in the `max_len` bytes left in the type chunk header.
fn read_config_rank(data: &mut (impl Read + Seek), max_len: u64) -> Result<u8> {
    let config_size = data.read_u32::<LE>()? as u64;
    if config_size > max_len {
        return Err(anyhow!("Config of {config_size} bytes does not fit in type header"));
    }
    let mut config = vec![0u8; config_size.saturating_sub(4) as usize];
    data.read_exact(&mut config)?;

    // After the size come mcc and mnc (2 bytes each), then the language and country (2 bytes each).
    let locale_set = config.get(4..8).is_some_and(|locale| locale.iter().any(|b| *b != 0));
    Ok(if locale_set {
        2
    } else if config.iter().any(|b| *b != 0) {
        1
    } else {
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{resource_table, TableValue};

    #[test]
    fn resolves_default_string() {
        let bytes = resource_table(0x7f, 0x0a, &[TableValue::String("Example App")], &[]).unwrap();
        let table = ResourceTable::parse(&bytes).unwrap();
        assert_eq!(table.resolve_string(0x7f0a0000), Some("Example App"));
        assert_eq!(table.resolve_string(0x7f0a0001), None);
        assert_eq!(table.resolve_string(0x7f0b0000), None);
    }

    #[test]
    fn prefers_default_over_localized_value() {
        let bytes = resource_table(
            0x7f,
            0x0a,
            &[TableValue::String("Settings")],
            &["Paramètres"],
        )
        .unwrap();
        let table = ResourceTable::parse(&bytes).unwrap();
        assert_eq!(table.resolve_string(0x7f0a0000), Some("Settings"));
    }

    #[test]
    fn follows_references() {
        let bytes = resource_table(
            0x7f,
            0x0a,
            &[TableValue::Reference(0x7f0a0001), TableValue::String("Target")],
            &[],
        )
        .unwrap();
        let table = ResourceTable::parse(&bytes).unwrap();
        assert_eq!(table.resolve_string(0x7f0a0000), Some("Target"));
    }

    #[test]
    fn gives_up_on_reference_cycles() {
        let bytes = resource_table(
            0x7f,
            0x0a,
            &[TableValue::Reference(0x7f0a0001), TableValue::Reference(0x7f0a0000)],
            &[],
        )
        .unwrap();
        let table = ResourceTable::parse(&bytes).unwrap();
        assert_eq!(table.resolve_string(0x7f0a0000), None);
    }

    // Offset of the first type chunk in a table built by `resource_table`.
    fn first_type_chunk(bytes: &[u8]) -> usize {
        let pool_len = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
        12 + pool_len + 288
    }

    #[test]
    fn rejects_oversized_entry_count() {
        let mut bytes = resource_table(0x7f, 0x0a, &[TableValue::String("App")], &[]).unwrap();
        let entry_count_at = first_type_chunk(&bytes) + 12;
        bytes[entry_count_at..entry_count_at + 4].copy_from_slice(&0x7FFFFFFFu32.to_le_bytes());
        assert!(ResourceTable::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_oversized_config() {
        let mut bytes = resource_table(0x7f, 0x0a, &[TableValue::String("App")], &[]).unwrap();
        let config_size_at = first_type_chunk(&bytes) + 20;
        bytes[config_size_at..config_size_at + 4].copy_from_slice(&0xFFFFFFF0u32.to_le_bytes());
        assert!(ResourceTable::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_non_table_data() {
        assert!(ResourceTable::parse(&[0u8; 4]).is_err());
        let xml_header = [0x03, 0x00, 0x08, 0x00, 0x08, 0, 0, 0, 0, 0, 0, 0];
        assert!(ResourceTable::parse(&xml_header).is_err());
    }
}
