//! SQLite catalog of saved photos and the persisted access decision.
//!
//! Lives next to the photos as `.catalog.sqlite` by default and is only ever
//! touched from the library worker thread.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::{AuthorizationStatus, LibraryError};

const AUTHORIZATION_KEY: &str = "authorization";

/// A photo recorded in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedAsset {
    pub id: i64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub source: String,
    pub created_at: i64,
}

/// Metadata for an asset about to be recorded.
#[derive(Debug, Clone)]
pub struct NewAsset<'a> {
    pub content_hash: u64,
    pub width: u32,
    pub height: u32,
    pub source: &'a str,
}

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Opens or creates the catalog at the specified path.
    ///
    /// journal_mode = WAL so a reopened library never waits on a closing one.
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let catalog = Self { conn };
        catalog.create_tables()?;

        info!("Opened photo catalog at {:?}", path);
        Ok(catalog)
    }

    fn create_tables(&self) -> Result<(), LibraryError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                source TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assets_created ON assets(created_at);
            ",
        )?;

        debug!("Catalog tables created/verified");
        Ok(())
    }

    pub fn authorization(&self) -> Result<AuthorizationStatus, LibraryError> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![AUTHORIZATION_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(value) => value.parse(),
            None => Ok(AuthorizationStatus::NotDetermined),
        }
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) -> Result<(), LibraryError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![AUTHORIZATION_KEY, status.as_str()],
        )?;
        debug!(%status, "Stored library authorization");
        Ok(())
    }

    /// Records an asset and places its file in one transaction.
    ///
    /// `place` receives the final file name and must move the photo there. The
    /// catalog row only commits if placing succeeds; if the commit itself fails
    /// the placed file is removed again.
    pub fn record_asset<F>(&mut self, asset: NewAsset<'_>, place: F) -> Result<SavedAsset, LibraryError>
    where
        F: FnOnce(&str) -> Result<PathBuf, LibraryError>,
    {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO assets (file_name, width, height, source, created_at)
             VALUES ('', ?1, ?2, ?3, ?4)",
            params![asset.width, asset.height, asset.source, created_at],
        )?;
        let id = tx.last_insert_rowid();
        let file_name = format!("{:016x}-{}.jpg", asset.content_hash, id);
        tx.execute(
            "UPDATE assets SET file_name = ?1 WHERE id = ?2",
            params![file_name, id],
        )?;

        // Dropping `tx` on error rolls the insert back.
        let placed = place(&file_name)?;

        if let Err(e) = tx.commit() {
            warn!(?placed, error = ?e, "Catalog commit failed, removing photo");
            let _ = std::fs::remove_file(&placed);
            return Err(e.into());
        }

        Ok(SavedAsset {
            id,
            file_name,
            width: asset.width,
            height: asset.height,
            source: asset.source.to_string(),
            created_at,
        })
    }

    pub fn assets(&self) -> Result<Vec<SavedAsset>, LibraryError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_name, width, height, source, created_at
             FROM assets ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SavedAsset {
                id: row.get(0)?,
                file_name: row.get(1)?,
                width: row.get(2)?,
                height: row.get(3)?,
                source: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut assets = Vec::new();
        for asset in rows {
            assets.push(asset?);
        }
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_asset(source: &str) -> NewAsset<'_> {
        NewAsset {
            content_hash: 0xabcdef,
            width: 40,
            height: 30,
            source,
        }
    }

    #[test]
    fn test_open_and_default_authorization() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("nested/catalog.sqlite")).unwrap();
        assert_eq!(
            catalog.authorization().unwrap(),
            AuthorizationStatus::NotDetermined
        );
        assert!(catalog.assets().unwrap().is_empty());
    }

    #[test]
    fn test_authorization_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite");
        {
            let catalog = Catalog::open(&path).unwrap();
            catalog.set_authorization(AuthorizationStatus::Denied).unwrap();
            catalog.set_authorization(AuthorizationStatus::Authorized).unwrap();
        }
        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.authorization().unwrap(), AuthorizationStatus::Authorized);
    }

    #[test]
    fn test_record_asset_names_file_by_hash_and_id() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();

        let root = dir.path().to_path_buf();
        let asset = catalog
            .record_asset(new_asset("https://x/a.jpg"), |name| {
                let path = root.join(name);
                std::fs::write(&path, b"jpeg")?;
                Ok(path)
            })
            .unwrap();

        assert_eq!(asset.file_name, format!("{:016x}-{}.jpg", 0xabcdef, asset.id));
        assert!(dir.path().join(&asset.file_name).exists());
        assert_eq!(catalog.assets().unwrap(), vec![asset]);
    }

    #[test]
    fn test_failed_placement_rolls_back() {
        let dir = tempdir().unwrap();
        let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();

        let result = catalog.record_asset(new_asset("https://x/a.jpg"), |_| {
            Err(LibraryError::Persist("no space".into()))
        });

        assert!(matches!(result, Err(LibraryError::Persist(_))));
        assert!(catalog.assets().unwrap().is_empty());
    }
}
