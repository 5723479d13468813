//! Relational store for the marketplace.
//!
//! One writer connection behind a mutex and a small pool of read-only
//! connections, all on the same WAL-mode SQLite file. Every write that must
//! be atomic (conversation creation, favorite toggles, rating aggregates)
//! happens inside a single transaction on the writer.

pub mod conversations;
pub mod error;
pub mod favorites;
pub mod listings;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod ratings;
pub mod users;

mod row;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::info;

pub use error::{DbError, Result};

const READER_POOL_SIZE: usize = 4;

pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(Duration::from_secs(5))?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(Duration::from_secs(5))?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| DbError::Lock(format!("reader lock poisoned: {}", e)))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| DbError::Lock(format!("writer lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    use bazaar_types::api::CreateListingRequest;
    use bazaar_types::models::{Category, ContactMethod, Listing};

    /// A database in a fresh temp directory; keep the `TempDir` alive.
    pub fn open_temp() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    pub fn user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.ensure_user(id, &format!("{}@campus.edu", name)).unwrap();
        id
    }

    pub fn listing(db: &Database, owner: Uuid, title: &str, price: f64) -> Listing {
        db.create_listing(
            owner,
            &CreateListingRequest {
                title: title.into(),
                description: format!("{} in good condition", title),
                category: Category::Product,
                price,
                contact_method: ContactMethod::Email,
                phone: None,
                image_url: None,
                location: None,
                tags: vec![],
            },
        )
        .unwrap()
    }
}
