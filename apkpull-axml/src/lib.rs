//! Parses the parts of an APK's compiled resources needed to name it:
//! the Android binary XML (AXML) used for `AndroidManifest.xml`,
//! and the resource table (`resources.arsc`) that `@string/...` references point into.

mod arsc;
mod reader;
mod string_pool;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use arsc::ResourceTable;
pub use reader::AxmlReader;

pub const ANDROID_NS_URI: &str = "http://schemas.android.com/apk/res/android";

/// Resource ID of the `android:label` attribute.
pub const LABEL_ATTR_RES_ID: u32 = 0x01010001;

/// An XML event within the main body of an AXML file.
#[derive(Debug, Clone)]
pub enum Event {
    StartElement {
        attributes: Vec<Attribute>,
        name: String,
        namespace: Option<String>,
        line_num: u32,
    },
    EndElement {
        namespace: Option<String>,
        name: String,
    },
    /// Namespace declarations, CDATA and anything else that carries no element data.
    Other { res_type: u16 },
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub namespace: Option<String>,
    pub resource_id: Option<u32>,
    pub value: AttributeValue,
}

impl Attribute {
    /// True if this is the attribute with the given framework resource ID, or failing that, the given name.
    /// Attribute names may be stripped by obfuscators, in which case only the resource ID remains.
    pub fn is(&self, res_id: u32, name: &str) -> bool {
        match self.resource_id {
            Some(id) => id == res_id,
            None => self.name == name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Boolean(bool),
    Integer(i32),
    Reference(u32), // Reference ID
    Float(f32),
    /// Dimensions, colours, theme attributes and so on, which are not interpreted.
    Other { data_type: u8, data: u32 },
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum ChunkType {
    StringPool,
    Table,
    Xml,
    XmlResourceMap,
    XmlStartElement,
    XmlEndElement,
    TablePackage,
    TableType,
}

impl ChunkType {
    fn parse(from: u16) -> Option<Self> {
        match from {
            0x0001 => Some(Self::StringPool),
            0x0002 => Some(Self::Table),
            0x0003 => Some(Self::Xml),
            0x0180 => Some(Self::XmlResourceMap),
            0x0102 => Some(Self::XmlStartElement),
            0x0103 => Some(Self::XmlEndElement),
            0x0200 => Some(Self::TablePackage),
            0x0201 => Some(Self::TableType),
            _ => None,
        }
    }
}

// `Res_value` data types that are interpreted.
const TYPE_REFERENCE: u8 = 0x01;
const TYPE_STRING: u8 = 0x03;
const TYPE_FLOAT: u8 = 0x04;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;
