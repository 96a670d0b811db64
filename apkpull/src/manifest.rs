//! Reads the details of an app that its binary manifest declares.

use std::io::{Read, Seek};

use anyhow::Result;
use apkpull_axml::{AttributeValue, AxmlReader, Event, LABEL_ATTR_RES_ID};

// Attribute of `<manifest>` holding the package ID.
const PACKAGE_ATTR: &str = "package";

/// Useful struct to read key details from the APK manifest.
#[derive(Debug, Default)]
pub struct ManifestInfo {
    pub package_id: Option<String>,
    /// The `android:label` of the `<application>` element. Either a literal or a string resource reference.
    pub label: Option<AttributeValue>,
}

impl ManifestInfo {
    pub fn read<T: Read + Seek>(reader: &mut AxmlReader<T>) -> Result<Self> {
        let mut info = Self::default();
        while let Some(event) = reader.read_next_event()? {
            let (name, attributes) = match event {
                Event::StartElement {
                    name, attributes, ..
                } => (name, attributes),
                _ => continue,
            };

            match name.as_str() {
                // `package` is not in the android namespace so has no resource ID.
                "manifest" => {
                    info.package_id = attributes
                        .iter()
                        .find(|attr| attr.resource_id.is_none() && attr.name == PACKAGE_ATTR)
                        .and_then(|attr| match &attr.value {
                            AttributeValue::String(package) => Some(package.clone()),
                            _ => None,
                        });
                }
                "application" => {
                    info.label = attributes
                        .into_iter()
                        .find(|attr| attr.is(LABEL_ATTR_RES_ID, "label"))
                        .map(|attr| attr.value);
                    // Nothing after the application element is of interest.
                    break;
                }
                _ => {}
            }
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use apkpull_axml::fixtures::{manifest, Label};

    fn read(doc: Vec<u8>) -> ManifestInfo {
        let mut cursor = Cursor::new(doc);
        let mut reader = AxmlReader::new(&mut cursor).unwrap();
        ManifestInfo::read(&mut reader).unwrap()
    }

    #[test]
    fn reads_package_and_label() {
        let info = read(manifest("com.example.app", Label::Literal("Example")).unwrap());
        assert_eq!(info.package_id.as_deref(), Some("com.example.app"));
        assert_eq!(info.label, Some(AttributeValue::String("Example".into())));
    }

    #[test]
    fn missing_label_is_none() {
        let info = read(manifest("com.example.app", Label::Missing).unwrap());
        assert_eq!(info.label, None);
    }
}
