use std::io::{Read, Seek, SeekFrom};

use anyhow::{anyhow, Context, Result};
use byteorder::{ReadBytesExt, LE};

const UTF8_FLAG: u32 = 0x00000100;

// Fixed part of the string pool header, before the string offsets.
const HEADER_LEN: u64 = 28;

/// Loads a string pool chunk. `data` must be positioned just after the chunk type and length.
/// Used both by binary XML documents and by the resource table.
pub(crate) fn load_string_pool(data: &mut (impl Read + Seek)) -> Result<Vec<String>> {
    let begin_chunk = data.stream_position()? - 8; // -8 because of the chunk type/chunk length
    let stream_len = data.seek(SeekFrom::End(0))?;
    data.seek(SeekFrom::Start(begin_chunk + 4))?;
    // The length field is not trusted beyond the data actually present.
    let chunk_len = (data.read_u32::<LE>()? as u64).min(stream_len.saturating_sub(begin_chunk));
    let num_strings = data.read_u32::<LE>()?;
    // Each string needs at least a 4 byte offset, so the count is bounded by the chunk length.
    if HEADER_LEN + num_strings as u64 * 4 > chunk_len {
        return Err(anyhow!(
            "String pool claims {num_strings} strings but is only {chunk_len} bytes"
        ));
    }
    let _num_styles = data.read_u32::<LE>()?;

    let flags = data.read_u32::<LE>()?;
    // Default is UTF16 if the flag is not set
    let utf8 = (flags & UTF8_FLAG) != 0;

    let string_data_offset = data.read_u32::<LE>()?;
    let _styles_offset = data.read_u32::<LE>()?;

    // Offsets are relative to string_data_offset, which is itself relative to the chunk start.
    let mut string_offsets = Vec::with_capacity(num_strings as usize);
    for _ in 0..num_strings {
        string_offsets.push(data.read_u32::<LE>()?);
    }

    let mut result = Vec::new();
    for (idx, offset) in string_offsets.into_iter().enumerate() {
        data.seek(SeekFrom::Start(
            begin_chunk + string_data_offset as u64 + offset as u64,
        ))?;

        let string = if utf8 {
            // UTF-8 strings are prefixed with their length in UTF-16 code units, then in bytes.
            let _utf16_len = read_utf8_len(data)?;
            let length = read_utf8_len(data)? as usize;
            let mut buffer = vec![0u8; length];
            data.read_exact(&mut buffer)?;

            String::from_utf8_lossy(&buffer).into_owned()
        } else {
            let length = read_utf16_len(data)? as usize;
            if length as u64 * 2 > chunk_len {
                return Err(anyhow!("String {idx} is longer than its string pool"));
            }
            let mut buffer: Vec<u16> = Vec::with_capacity(length);
            for _ in 0..length {
                buffer.push(data.read_u16::<LE>()?);
            }

            String::from_utf16(&buffer)
                .with_context(|| format!("String {idx} was not valid UTF-16"))?
        };
        result.push(string);
    }

    Ok(result)
}

// A 1-2 byte varint. If the high bit of the first byte is set, the remaining 7 bits are the high byte.
fn read_utf8_len(data: &mut impl Read) -> Result<u16> {
    let first = data.read_u8()? as u16;
    if first & 0x80 != 0 {
        Ok(((first & 0x7F) << 8) | data.read_u8()? as u16)
    } else {
        Ok(first)
    }
}

// A 2 or 4 byte varint, with the same scheme as above in units of u16.
fn read_utf16_len(data: &mut impl Read) -> Result<u32> {
    let first = data.read_u16::<LE>()? as u32;
    if first & 0x8000 != 0 {
        Ok(((first & 0x7FFF) << 16) | data.read_u16::<LE>()? as u32)
    } else {
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    #[test]
    fn reads_utf8_pool_with_long_string() {
        let long = "x".repeat(200);
        let strings = ["label", long.as_str()];

        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(body.len() as u32);
            // Both lengths need two bytes once they exceed 0x7F.
            for _ in 0..2 {
                if s.len() > 0x7F {
                    body.push(0x80 | (s.len() >> 8) as u8);
                    body.push((s.len() & 0xFF) as u8);
                } else {
                    body.push(s.len() as u8);
                }
            }
            body.extend_from_slice(s.as_bytes());
            body.push(0);
        }

        let header_len = 28 + 4 * strings.len() as u32;
        let mut chunk = Vec::new();
        chunk.write_u16::<LE>(0x0001).unwrap();
        chunk.write_u16::<LE>(0x1C).unwrap();
        chunk.write_u32::<LE>(header_len + body.len() as u32).unwrap();
        chunk.write_u32::<LE>(strings.len() as u32).unwrap();
        chunk.write_u32::<LE>(0).unwrap();
        chunk.write_u32::<LE>(UTF8_FLAG).unwrap();
        chunk.write_u32::<LE>(header_len).unwrap();
        chunk.write_u32::<LE>(0).unwrap();
        for offset in offsets {
            chunk.write_u32::<LE>(offset).unwrap();
        }
        chunk.extend_from_slice(&body);

        let mut cursor = Cursor::new(chunk);
        cursor.set_position(8);
        let pool = load_string_pool(&mut cursor).unwrap();
        assert_eq!(pool, vec!["label".to_string(), long]);
    }

    #[test]
    fn rejects_string_count_larger_than_chunk() {
        let mut chunk = Vec::new();
        chunk.write_u16::<LE>(0x0001).unwrap();
        chunk.write_u16::<LE>(0x1C).unwrap();
        chunk.write_u32::<LE>(0xFFFFFFFF).unwrap();
        chunk.write_u32::<LE>(0x3FFFFFF0).unwrap();
        chunk.extend_from_slice(&[0u8; 16]);

        let mut cursor = Cursor::new(chunk);
        cursor.set_position(8);
        let err = load_string_pool(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("claims"));
    }
}
