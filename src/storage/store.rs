use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;

use crate::common::error::{FaceGateError, Result};

/// Durable repository of enrolled identities and audit records. Owns the
/// encrypted image blobs; feature vectors never touch disk.
pub struct EncryptedBiometricStore {
    conn: Mutex<Connection>,
}

/// Row from the unauthorized-probe audit table, evidence still encrypted.
#[derive(Debug, Clone)]
pub struct StoredUnauthorized {
    pub id: i64,
    pub envelope: Vec<u8>,
    pub recorded_at: DateTime<Utc>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_faces (
    username TEXT PRIMARY KEY,
    face_image BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS unauthorized_users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    face_image BLOB NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS malicious_attacks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    attack_info TEXT NOT NULL,
    face_image BLOB,
    recorded_at TEXT NOT NULL
);
"#;

impl EncryptedBiometricStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway store backed by an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new identity. Fails with `UsernameTaken` if the username is
    /// already enrolled; the existing record is never touched.
    pub fn write_identity(&self, username: &str, envelope: &[u8]) -> Result<()> {
        let conn = self.conn.lock();

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM user_faces WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(FaceGateError::UsernameTaken(username.to_string()));
        }

        conn.execute(
            "INSERT INTO user_faces (username, face_image, created_at) VALUES (?1, ?2, ?3)",
            params![username, envelope, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_faces WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All enrolled identities with their encrypted images. Used only for the
    /// startup index rebuild.
    pub fn read_all_identities(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT username, face_image FROM user_faces")?;
        let rows = stmt.query_map([], |row| {
            let username: String = row.get(0)?;
            let envelope: Vec<u8> = row.get(1)?;
            Ok((username, envelope))
        })?;

        let mut identities = Vec::new();
        for row in rows {
            identities.push(row?);
        }
        Ok(identities)
    }

    pub fn write_unauthorized(&self, envelope: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO unauthorized_users (face_image, recorded_at) VALUES (?1, ?2)",
            params![envelope, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn write_attack(&self, attack_info: &str, envelope: Option<&[u8]>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO malicious_attacks (attack_info, face_image, recorded_at) VALUES (?1, ?2, ?3)",
            params![attack_info, envelope, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn read_unauthorized(&self) -> Result<Vec<StoredUnauthorized>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, face_image, recorded_at FROM unauthorized_users ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let envelope: Vec<u8> = row.get(1)?;
            let recorded_at: String = row.get(2)?;
            Ok((id, envelope, recorded_at))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, envelope, recorded_at) = row?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            records.push(StoredUnauthorized {
                id,
                envelope,
                recorded_at,
            });
        }
        Ok(records)
    }

    pub fn unauthorized_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM unauthorized_users", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn attack_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM malicious_attacks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_identities() {
        let store = EncryptedBiometricStore::open_in_memory().unwrap();

        store.write_identity("alice", b"envelope-a").unwrap();
        store.write_identity("bob", b"envelope-b").unwrap();

        assert!(store.username_exists("alice").unwrap());
        assert!(!store.username_exists("carol").unwrap());

        let all = store.read_all_identities().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_duplicate_username_rejected_and_original_untouched() {
        let store = EncryptedBiometricStore::open_in_memory().unwrap();

        store.write_identity("alice", b"first").unwrap();
        let err = store.write_identity("alice", b"second").unwrap_err();
        assert!(matches!(err, FaceGateError::UsernameTaken(_)));

        let all = store.read_all_identities().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"first");
    }

    #[test]
    fn test_audit_records_append_only() {
        let store = EncryptedBiometricStore::open_in_memory().unwrap();

        store.write_unauthorized(b"probe-1").unwrap();
        store.write_unauthorized(b"probe-2").unwrap();
        store.write_attack("malformed payload", None).unwrap();
        store.write_attack("tampered image", Some(b"evidence")).unwrap();

        let records = store.read_unauthorized().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].envelope, b"probe-1");
        assert_eq!(records[1].envelope, b"probe-2");
        assert!(records[0].id < records[1].id);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("faces.db");

        let store = EncryptedBiometricStore::open(&path).unwrap();
        store.write_identity("alice", b"blob").unwrap();
        assert!(path.exists());
    }
}
