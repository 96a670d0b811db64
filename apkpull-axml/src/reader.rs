use std::io::{Read, Seek, SeekFrom};

use anyhow::{anyhow, Context, Result};
use byteorder::{ReadBytesExt, LE};

use super::{
    string_pool::load_string_pool, Attribute, AttributeValue, ChunkType, Event, TYPE_FLOAT,
    TYPE_INT_BOOLEAN, TYPE_INT_DEC, TYPE_INT_HEX, TYPE_REFERENCE, TYPE_STRING,
};

/// Streams the elements of an AXML document.
pub struct AxmlReader<'r, R: Read + Seek> {
    data: &'r mut R,

    string_pool: Vec<String>,

    // Resource IDs of attribute names, indexed by the name's string pool index.
    res_map: Vec<u32>,

    end_file_offset: u64,
}

impl<'r, R: Read + Seek> AxmlReader<'r, R> {
    pub fn new(data: &'r mut R) -> Result<Self> {
        // The document is a single XML chunk which contains, in order:
        // the string pool, an (optional) resource map, then the nodes of the document.
        let start = data.stream_position()?;
        let stream_len = data.seek(SeekFrom::End(0))?;
        data.seek(SeekFrom::Start(start))?;
        let (chunk_type, _) = read_chunk_type(data)?;
        if chunk_type != Some(ChunkType::Xml) {
            return Err(anyhow!("Initial chunk was not XML"));
        }
        let end_file_offset = (start + data.read_u32::<LE>()? as u64).min(stream_len);

        let string_pool_start = data.stream_position()?;
        if read_chunk_type(data)?.0 != Some(ChunkType::StringPool) {
            return Err(anyhow!("Expected string pool after first XML tag"));
        }
        let post_string_pool = string_pool_start + data.read_u32::<LE>()? as u64;
        let string_pool = load_string_pool(data).context("Loading string pool")?;
        data.seek(SeekFrom::Start(post_string_pool))?;

        let mut res_map = Vec::new();
        if read_chunk_type(data)?.0 == Some(ChunkType::XmlResourceMap) {
            let res_map_len = data.read_u32::<LE>()?;
            if post_string_pool + res_map_len as u64 > end_file_offset {
                return Err(anyhow!("Resource map of {res_map_len} bytes overruns the document"));
            }
            // Subtract 2 for the chunk type and length
            let res_map_size = (res_map_len >> 2).saturating_sub(2);
            res_map.reserve(res_map_size as usize);
            for _ in 0..res_map_size {
                res_map.push(data.read_u32::<LE>()?);
            }
            data.seek(SeekFrom::Start(post_string_pool + res_map_len as u64))?;
        } else {
            data.seek(SeekFrom::Start(post_string_pool))?;
        }

        Ok(Self {
            data,
            string_pool,
            res_map,
            end_file_offset,
        })
    }

    /// Reads the next event from the file, or `None` at the end of the document.
    pub fn read_next_event(&mut self) -> Result<Option<Event>> {
        let chunk_start = self.data.stream_position()?;
        if chunk_start >= self.end_file_offset {
            return Ok(None);
        }

        let (chunk_type, raw_type) = read_chunk_type(self.data)?;
        let length = self.data.read_u32::<LE>()?;
        if length < 8 {
            return Err(anyhow!("Chunk at {chunk_start} had invalid length {length}"));
        }

        let event = match chunk_type {
            Some(ChunkType::XmlStartElement) => self.read_element(chunk_start)?,
            Some(ChunkType::XmlEndElement) => self.read_end_element()?,
            _ => Event::Other { res_type: raw_type },
        };

        // Always continue from the next chunk, regardless of how much of this one was read.
        self.data.seek(SeekFrom::Start(chunk_start + length as u64))?;
        Ok(Some(event))
    }

    fn read_element(&mut self, chunk_start: u64) -> Result<Event> {
        let line_num = self.data.read_u32::<LE>()?;
        let _comment = self.data.read_u32::<LE>()?;

        let namespace = self.read_optional_string()?;
        let name_idx = self.data.read_u32::<LE>()?;
        let name = self.get_pooled_string(name_idx)?.to_owned();

        // Offset of the attributes from the end of the node header, and the size of each.
        let attr_start = self.data.read_u16::<LE>()? as u64;
        let attr_size = self.data.read_u16::<LE>()? as u64;
        let num_attributes = self.data.read_u16::<LE>()?;
        // ID, class and style attribute indices are not needed.

        // The node header (type, header size, size, line number and comment) is 16 bytes.
        let attrs_begin = chunk_start + 16 + attr_start;
        let mut attributes = Vec::with_capacity(num_attributes as usize);
        for i in 0..num_attributes as u64 {
            self.data.seek(SeekFrom::Start(attrs_begin + i * attr_size))?;
            attributes.push(
                self.read_attribute()
                    .with_context(|| format!("Reading attribute {i} of <{name}>"))?,
            );
        }

        Ok(Event::StartElement {
            attributes,
            name,
            namespace,
            line_num,
        })
    }

    fn read_attribute(&mut self) -> Result<Attribute> {
        let namespace = self.read_optional_string()?;
        let name_idx = self.data.read_u32::<LE>()?;
        let _raw_string_idx = self.data.read_u32::<LE>()?;

        // Res_value: size (u16), reserved (u8), data type (u8), data (u32)
        let _value_size = self.data.read_u16::<LE>()?;
        let _res0 = self.data.read_u8()?;
        let data_type = self.data.read_u8()?;
        let data = self.data.read_u32::<LE>()?;

        let value = match data_type {
            TYPE_STRING => AttributeValue::String(self.get_pooled_string(data)?.to_owned()),
            TYPE_REFERENCE => AttributeValue::Reference(data),
            TYPE_INT_BOOLEAN => AttributeValue::Boolean(data != 0),
            TYPE_INT_DEC | TYPE_INT_HEX => AttributeValue::Integer(data as i32),
            TYPE_FLOAT => AttributeValue::Float(f32::from_bits(data)),
            data_type => AttributeValue::Other { data_type, data },
        };

        Ok(Attribute {
            // Obfuscated manifests may leave the name out of the pool entirely
            name: self
                .string_pool
                .get(name_idx as usize)
                .cloned()
                .unwrap_or_default(),
            namespace,
            resource_id: self.res_map.get(name_idx as usize).copied(),
            value,
        })
    }

    fn read_end_element(&mut self) -> Result<Event> {
        let _line_num = self.data.read_u32::<LE>()?;
        let _comment = self.data.read_u32::<LE>()?;

        let namespace = self.read_optional_string()?;
        let name_idx = self.data.read_u32::<LE>()?;
        let name = self.get_pooled_string(name_idx)?.to_owned();
        Ok(Event::EndElement { namespace, name })
    }

    // Reads a string pool index where 0xFFFFFFFF means no string.
    fn read_optional_string(&mut self) -> Result<Option<String>> {
        match self.data.read_u32::<LE>()? {
            0xFFFFFFFF => Ok(None),
            idx => Ok(Some(self.get_pooled_string(idx)?.to_owned())),
        }
    }

    fn get_pooled_string(&self, id: u32) -> Result<&str> {
        self.string_pool
            .get(id as usize)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("Invalid string index {id}"))
    }
}

// Reads the chunk type and skips the header size, returning the parsed type and the raw value.
pub(crate) fn read_chunk_type(data: &mut impl Read) -> Result<(Option<ChunkType>, u16)> {
    let raw = data.read_u16::<LE>()?;
    let _header_size = data.read_u16::<LE>()?;
    Ok((ChunkType::parse(raw), raw))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::fixtures::{manifest, Label};
    use crate::{ANDROID_NS_URI, LABEL_ATTR_RES_ID};

    fn start_elements(doc: Vec<u8>) -> Vec<(String, Vec<Attribute>)> {
        let mut cursor = Cursor::new(doc);
        let mut reader = AxmlReader::new(&mut cursor).unwrap();
        let mut elements = Vec::new();
        while let Some(event) = reader.read_next_event().unwrap() {
            if let Event::StartElement { name, attributes, .. } = event {
                elements.push((name, attributes));
            }
        }
        elements
    }

    #[test]
    fn reads_elements_and_literal_label() {
        let doc = manifest("com.example.app", Label::Literal("Example")).unwrap();
        let elements = start_elements(doc);
        let names: Vec<&str> = elements.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["manifest", "application"]);

        let package = &elements[0].1[0];
        assert!(package.is(0, "package"));
        assert_eq!(package.resource_id, None);
        assert_eq!(package.value, AttributeValue::String("com.example.app".into()));

        let label = &elements[1].1[0];
        assert_eq!(label.resource_id, Some(LABEL_ATTR_RES_ID));
        assert_eq!(label.namespace.as_deref(), Some(ANDROID_NS_URI));
        assert_eq!(label.value, AttributeValue::String("Example".into()));
    }

    #[test]
    fn reads_reference_label() {
        let doc = manifest("com.example.app", Label::Reference(0x7f010000)).unwrap();
        let elements = start_elements(doc);
        let label = &elements[1].1[0];
        assert!(label.is(LABEL_ATTR_RES_ID, "label"));
        assert_eq!(label.value, AttributeValue::Reference(0x7f010000));
    }

    #[test]
    fn yields_end_and_namespace_events() {
        let mut cursor = Cursor::new(manifest("a.b", Label::Missing).unwrap());
        let mut reader = AxmlReader::new(&mut cursor).unwrap();
        let mut events = Vec::new();
        while let Some(event) = reader.read_next_event().unwrap() {
            events.push(event);
        }

        assert_eq!(events.len(), 6);
        assert!(matches!(events[0], Event::Other { res_type: 0x0100 }));
        assert!(matches!(&events[3], Event::EndElement { name, .. } if name == "application"));
        assert!(matches!(events[5], Event::Other { res_type: 0x0101 }));
    }

    #[test]
    fn rejects_oversized_resource_map() {
        let mut doc = manifest("a.b", Label::Missing).unwrap();
        let pool_len = u32::from_le_bytes(doc[12..16].try_into().unwrap()) as usize;
        let res_map_len_at = 8 + pool_len + 4;
        doc[res_map_len_at..res_map_len_at + 4].copy_from_slice(&0xFFFFFFF0u32.to_le_bytes());

        let mut cursor = Cursor::new(doc);
        assert!(AxmlReader::new(&mut cursor).is_err());
    }

    #[test]
    fn rejects_oversized_string_pool() {
        let mut doc = manifest("a.b", Label::Missing).unwrap();
        // String count of the pool that follows the 8 byte document header.
        doc[16..20].copy_from_slice(&0xFFFFFFF0u32.to_le_bytes());

        let mut cursor = Cursor::new(doc);
        assert!(AxmlReader::new(&mut cursor).is_err());
    }

    #[test]
    fn rejects_documents_that_are_not_axml() {
        let mut cursor = Cursor::new(b"<?xml version=\"1.0\"?><manifest/>".to_vec());
        assert!(AxmlReader::new(&mut cursor).is_err());
    }
}
