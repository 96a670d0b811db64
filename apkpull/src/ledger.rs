//! SQLite backed record of the APKs that have already been pulled, so that a package is
//! only downloaded again once its version changes.

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, Connection};
use serde::Serialize;

/// Default location of the ledger, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "downloaded_apks.db";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS apks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    package_name TEXT NOT NULL,
    app_name TEXT NOT NULL,
    version_name TEXT NOT NULL,
    is_system_app INTEGER NOT NULL,
    apk_path TEXT NOT NULL,
    UNIQUE(package_name, version_name)
)";

/// A pulled and renamed APK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApkRecord {
    pub package_name: String,
    pub app_name: String,
    pub version_name: String,
    pub is_system_app: bool,
    pub apk_path: String,
}

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Opens the ledger at the given path, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening ledger at {}", path.display());
        let conn = Connection::open(path)
            .with_context(|| format!("Opening ledger database {}", path.display()))?;
        Self::init(conn)
    }

    /// Opens a ledger that is not persisted.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(CREATE_TABLE, [])
            .context("Creating ledger table")?;
        Ok(Self { conn })
    }

    /// True if the given version of the package has already been recorded.
    pub fn contains(&self, package_name: &str, version_name: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM apks WHERE package_name = ?1 AND version_name = ?2)",
            params![package_name, version_name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Records an APK. If the package and version are already recorded, nothing changes.
    /// Returns whether a new record was added.
    pub fn insert(&self, record: &ApkRecord) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO apks (package_name, app_name, version_name, is_system_app, apk_path)
            VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.package_name,
                record.app_name,
                record.version_name,
                record.is_system_app,
                record.apk_path
            ],
        )?;
        Ok(inserted > 0)
    }

    /// All records, ordered by package then version.
    pub fn records(&self) -> Result<Vec<ApkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT package_name, app_name, version_name, is_system_app, apk_path
            FROM apks ORDER BY package_name, version_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ApkRecord {
                package_name: row.get(0)?,
                app_name: row.get(1)?,
                version_name: row.get(2)?,
                is_system_app: row.get(3)?,
                apk_path: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM apks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Closes the underlying database, reporting any error in doing so.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, err)| err)
            .context("Closing ledger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(package: &str, version: &str, path: &str) -> ApkRecord {
        ApkRecord {
            package_name: package.to_string(),
            app_name: "Example".to_string(),
            version_name: version.to_string(),
            is_system_app: false,
            apk_path: path.to_string(),
        }
    }

    #[test]
    fn duplicate_package_and_version_is_ignored() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert!(ledger.insert(&record("com.a", "1.0", "user_apks/Example-1.0.apk")).unwrap());
        assert!(!ledger.insert(&record("com.a", "1.0", "elsewhere.apk")).unwrap());
        assert_eq!(ledger.len().unwrap(), 1);

        // The first record wins
        assert_eq!(ledger.records().unwrap()[0].apk_path, "user_apks/Example-1.0.apk");
    }

    #[test]
    fn new_version_is_a_new_record() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.insert(&record("com.a", "1.0", "a")).unwrap();
        ledger.insert(&record("com.a", "1.1", "b")).unwrap();
        ledger.insert(&record("com.b", "1.0", "c")).unwrap();

        assert!(ledger.contains("com.a", "1.0").unwrap());
        assert!(ledger.contains("com.a", "1.1").unwrap());
        assert!(!ledger.contains("com.a", "2.0").unwrap());
        assert!(!ledger.contains("com.c", "1.0").unwrap());

        let versions: Vec<_> = ledger
            .records()
            .unwrap()
            .into_iter()
            .map(|r| (r.package_name, r.version_name))
            .collect();
        assert_eq!(
            versions,
            [
                ("com.a".to_string(), "1.0".to_string()),
                ("com.a".to_string(), "1.1".to_string()),
                ("com.b".to_string(), "1.0".to_string())
            ]
        );
    }

    #[test]
    fn persists_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(DEFAULT_LEDGER_PATH);

        {
            let ledger = Ledger::open(&db_path).unwrap();
            assert!(ledger.is_empty().unwrap());
            let mut system = record("android", "14", "system_apks/Android System-14.apk");
            system.is_system_app = true;
            ledger.insert(&system).unwrap();
            ledger.close().unwrap();
        }

        let ledger = Ledger::open(&db_path).unwrap();
        assert!(ledger.contains("android", "14").unwrap());
        assert!(ledger.records().unwrap()[0].is_system_app);
    }
}
