//! Works out the human readable name of an app from its APK.

use std::{fs::File, io::Cursor, path::Path};

use anyhow::{anyhow, Context, Result};
use apkpull_axml::{AttributeValue, AxmlReader, ResourceTable};
use apkpull_zip::ZipReader;
use log::debug;

use crate::manifest::ManifestInfo;

const MANIFEST_PATH: &str = "AndroidManifest.xml";
const RESOURCE_TABLE_PATH: &str = "resources.arsc";

/// Gives the display name of the app in a local APK file, if one can be found.
pub trait AppNameSource {
    fn extract_app_name(&self, apk_path: &Path) -> Option<String>;
}

impl<F: Fn(&Path) -> Option<String>> AppNameSource for F {
    fn extract_app_name(&self, apk_path: &Path) -> Option<String> {
        self(apk_path)
    }
}

/// Names apps after the `android:label` of their manifest, resolving string resources
/// with the default (locale-less) configuration.
pub struct ApkLabel;

impl AppNameSource for ApkLabel {
    fn extract_app_name(&self, apk_path: &Path) -> Option<String> {
        match read_label(apk_path) {
            Ok(Some(label)) if !label.trim().is_empty() => Some(label.trim().to_string()),
            Ok(_) => {
                debug!("{} does not declare an app label", apk_path.display());
                None
            }
            Err(err) => {
                debug!("Failed to read app label from {}: {err:#}", apk_path.display());
                None
            }
        }
    }
}

/// Reads the application label declared by the APK at the given path.
pub fn read_label(apk_path: &Path) -> Result<Option<String>> {
    let apk_handle = File::open(apk_path).context("Opening APK")?;
    let mut apk_zip = ZipReader::open(apk_handle).context("APK wasn't a valid ZIP file")?;

    let manifest_contents = apk_zip
        .read_file(MANIFEST_PATH)
        .context("Failed to read manifest")?;
    let mut manifest_reader = Cursor::new(manifest_contents);
    let mut axml_reader =
        AxmlReader::new(&mut manifest_reader).context("Manifest was not valid AXML")?;
    let info = ManifestInfo::read(&mut axml_reader).context("Reading manifest")?;

    match info.label {
        None => Ok(None),
        Some(AttributeValue::String(label)) => Ok(Some(label)),
        Some(AttributeValue::Reference(res_id)) => {
            if !apk_zip.contains_file(RESOURCE_TABLE_PATH) {
                return Err(anyhow!(
                    "Label is a resource reference but the APK has no resource table"
                ));
            }

            let table_contents = apk_zip
                .read_file(RESOURCE_TABLE_PATH)
                .context("Failed to read resource table")?;
            let table = ResourceTable::parse(&table_contents).context("Parsing resource table")?;
            Ok(table.resolve_string(res_id).map(str::to_string))
        }
        Some(other) => Err(anyhow!("Label had unexpected value {other:?}")),
    }
}
