//! Builders for the smallest binary manifests and resource tables that still resemble what `aapt2` produces.

use std::io::{Result, Write};

use byteorder::{WriteBytesExt, LE};

use super::{ANDROID_NS_URI, LABEL_ATTR_RES_ID, TYPE_REFERENCE, TYPE_STRING};

/// The `android:label` of the `<application>` element in a generated manifest.
#[derive(Clone, Copy, Debug)]
pub enum Label<'a> {
    Literal(&'a str),
    Reference(u32),
    Missing,
}

/// A simple value in a generated resource table.
#[derive(Clone, Copy, Debug)]
pub enum TableValue<'a> {
    String(&'a str),
    Reference(u32),
}

// An attribute as (namespace, name, raw value, data type, data).
type RawAttribute = (u32, u32, u32, u8, u32);

// A UTF-16 string pool chunk, padded to a multiple of 4 bytes.
fn string_pool(strings: &[&str]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut offsets = Vec::new();
    for s in strings {
        offsets.push(body.len() as u32);
        let units: Vec<u16> = s.encode_utf16().collect();
        body.write_u16::<LE>(units.len() as u16)?;
        for unit in units {
            body.write_u16::<LE>(unit)?;
        }
        body.write_u16::<LE>(0)?;
    }
    while body.len() % 4 != 0 {
        body.push(0);
    }

    let strings_start = 28 + 4 * strings.len() as u32;
    let mut chunk = Vec::new();
    chunk.write_u16::<LE>(0x0001)?;
    chunk.write_u16::<LE>(0x1C)?;
    chunk.write_u32::<LE>(strings_start + body.len() as u32)?;
    chunk.write_u32::<LE>(strings.len() as u32)?;
    chunk.write_u32::<LE>(0)?; // Style count
    chunk.write_u32::<LE>(0)?; // Flags (UTF-16)
    chunk.write_u32::<LE>(strings_start)?;
    chunk.write_u32::<LE>(0)?; // Styles start
    for offset in offsets {
        chunk.write_u32::<LE>(offset)?;
    }
    chunk.write_all(&body)?;
    Ok(chunk)
}

fn node_header(out: &mut Vec<u8>, chunk_type: u16, size: u32) -> Result<()> {
    out.write_u16::<LE>(chunk_type)?;
    out.write_u16::<LE>(0x10)?;
    out.write_u32::<LE>(size)?;
    out.write_u32::<LE>(1)?; // Line number
    out.write_u32::<LE>(0xFFFFFFFF) // Comment
}

fn start_element(out: &mut Vec<u8>, name: u32, attrs: &[RawAttribute]) -> Result<()> {
    node_header(out, 0x0102, 36 + 20 * attrs.len() as u32)?;
    out.write_u32::<LE>(0xFFFFFFFF)?; // Namespace
    out.write_u32::<LE>(name)?;
    out.write_u16::<LE>(0x14)?; // Attribute start
    out.write_u16::<LE>(0x14)?; // Attribute size
    out.write_u16::<LE>(attrs.len() as u16)?;
    out.write_u16::<LE>(0)?; // ID index
    out.write_u16::<LE>(0)?; // Class index
    out.write_u16::<LE>(0)?; // Style index
    for (ns, attr_name, raw, data_type, data) in attrs {
        out.write_u32::<LE>(*ns)?;
        out.write_u32::<LE>(*attr_name)?;
        out.write_u32::<LE>(*raw)?;
        out.write_u16::<LE>(8)?;
        out.write_u8(0)?;
        out.write_u8(*data_type)?;
        out.write_u32::<LE>(*data)?;
    }
    Ok(())
}

fn end_element(out: &mut Vec<u8>, name: u32) -> Result<()> {
    node_header(out, 0x0103, 0x18)?;
    out.write_u32::<LE>(0xFFFFFFFF)?;
    out.write_u32::<LE>(name)
}

/// Builds an `AndroidManifest.xml` for `package` with a single `<application>` element.
pub fn manifest(package: &str, label: Label) -> Result<Vec<u8>> {
    // The resource map covers the first string only, which is the attribute name "label".
    let literal = match label {
        Label::Literal(text) => text,
        _ => "",
    };
    let strings = [
        "label",
        "package",
        "android",
        ANDROID_NS_URI,
        "manifest",
        "application",
        package,
        literal,
    ];
    const LABEL: u32 = 0;
    const PACKAGE: u32 = 1;
    const PREFIX: u32 = 2;
    const URI: u32 = 3;
    const MANIFEST: u32 = 4;
    const APPLICATION: u32 = 5;
    const PACKAGE_VALUE: u32 = 6;
    const LITERAL: u32 = 7;

    let mut body = Vec::new();

    node_header(&mut body, 0x0100, 0x18)?;
    body.write_u32::<LE>(PREFIX)?;
    body.write_u32::<LE>(URI)?;

    start_element(
        &mut body,
        MANIFEST,
        &[(0xFFFFFFFF, PACKAGE, PACKAGE_VALUE, TYPE_STRING, PACKAGE_VALUE)],
    )?;
    match label {
        Label::Literal(_) => start_element(
            &mut body,
            APPLICATION,
            &[(URI, LABEL, LITERAL, TYPE_STRING, LITERAL)],
        )?,
        Label::Reference(id) => start_element(
            &mut body,
            APPLICATION,
            &[(URI, LABEL, 0xFFFFFFFF, TYPE_REFERENCE, id)],
        )?,
        Label::Missing => start_element(&mut body, APPLICATION, &[])?,
    }
    end_element(&mut body, APPLICATION)?;
    end_element(&mut body, MANIFEST)?;

    node_header(&mut body, 0x0101, 0x18)?;
    body.write_u32::<LE>(PREFIX)?;
    body.write_u32::<LE>(URI)?;

    let pool = string_pool(&strings)?;
    let mut res_map = Vec::new();
    res_map.write_u16::<LE>(0x0180)?;
    res_map.write_u16::<LE>(0x08)?;
    res_map.write_u32::<LE>(12)?;
    res_map.write_u32::<LE>(LABEL_ATTR_RES_ID)?;

    let mut doc = Vec::new();
    doc.write_u16::<LE>(0x0003)?;
    doc.write_u16::<LE>(0x08)?;
    doc.write_u32::<LE>((8 + pool.len() + res_map.len() + body.len()) as u32)?;
    doc.write_all(&pool)?;
    doc.write_all(&res_map)?;
    doc.write_all(&body)?;
    Ok(doc)
}

// A type chunk holding one simple value per entry, with the given language (or none).
fn type_chunk(type_id: u8, language: Option<[u8; 2]>, values: &[(u8, u32)]) -> Result<Vec<u8>> {
    const CONFIG_SIZE: u32 = 64;
    let header_size = 20 + CONFIG_SIZE;
    let entries_start = header_size + 4 * values.len() as u32;

    let mut chunk = Vec::new();
    chunk.write_u16::<LE>(0x0201)?;
    chunk.write_u16::<LE>(header_size as u16)?;
    chunk.write_u32::<LE>(entries_start + 16 * values.len() as u32)?;
    chunk.write_u8(type_id)?;
    chunk.write_u8(0)?; // Flags
    chunk.write_u16::<LE>(0)?;
    chunk.write_u32::<LE>(values.len() as u32)?;
    chunk.write_u32::<LE>(entries_start)?;

    let mut config = vec![0u8; CONFIG_SIZE as usize];
    config[..4].copy_from_slice(&CONFIG_SIZE.to_le_bytes());
    if let Some(language) = language {
        config[8..10].copy_from_slice(&language);
    }
    chunk.write_all(&config)?;

    for idx in 0..values.len() as u32 {
        chunk.write_u32::<LE>(idx * 16)?;
    }
    for (data_type, data) in values {
        chunk.write_u16::<LE>(8)?; // Entry size
        chunk.write_u16::<LE>(0)?; // Entry flags
        chunk.write_u32::<LE>(0)?; // Key
        chunk.write_u16::<LE>(8)?; // Value size
        chunk.write_u8(0)?;
        chunk.write_u8(*data_type)?;
        chunk.write_u32::<LE>(*data)?;
    }
    Ok(chunk)
}

/// Builds a `resources.arsc` with one package and one type.
/// Entry `n` of `default` has ID `0xPPTT000n`. `french` holds `fr` overrides for the first entries.
pub fn resource_table(
    package_id: u8,
    type_id: u8,
    default: &[TableValue],
    french: &[&str],
) -> Result<Vec<u8>> {
    let mut strings: Vec<&str> = Vec::new();
    let mut default_values = Vec::new();
    for value in default {
        default_values.push(match value {
            TableValue::String(s) => {
                strings.push(s);
                (TYPE_STRING, strings.len() as u32 - 1)
            }
            TableValue::Reference(id) => (TYPE_REFERENCE, *id),
        });
    }
    let mut french_values = Vec::new();
    for s in french {
        strings.push(s);
        french_values.push((TYPE_STRING, strings.len() as u32 - 1));
    }

    let mut package_body = type_chunk(type_id, None, &default_values)?;
    if !french_values.is_empty() {
        package_body.write_all(&type_chunk(type_id, Some(*b"fr"), &french_values)?)?;
    }

    const PACKAGE_HEADER_SIZE: u32 = 288;
    let mut package = Vec::new();
    package.write_u16::<LE>(0x0200)?;
    package.write_u16::<LE>(PACKAGE_HEADER_SIZE as u16)?;
    package.write_u32::<LE>(PACKAGE_HEADER_SIZE + package_body.len() as u32)?;
    package.write_u32::<LE>(package_id as u32)?;
    package.write_all(&[0u8; 256])?; // Name
    for _ in 0..5 {
        package.write_u32::<LE>(0)?; // Type/key string offsets, last public type/key, type ID offset
    }
    package.write_all(&package_body)?;

    let pool = string_pool(&strings)?;
    let mut table = Vec::new();
    table.write_u16::<LE>(0x0002)?;
    table.write_u16::<LE>(12)?;
    table.write_u32::<LE>((12 + pool.len() + package.len()) as u32)?;
    table.write_u32::<LE>(1)?;
    table.write_all(&pool)?;
    table.write_all(&package)?;
    Ok(table)
}
