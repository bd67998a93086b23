use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::models::{JobListing, NewListing};

/// Result of committing one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    /// A row with the same `job_link` already exists; nothing was written.
    Skipped,
}

/// Write side used by the ingestion pipeline.
pub trait ListingStore: Send + Sync {
    /// Insert the listing unless one with the same `job_link` exists.
    fn upsert_listing(&self, listing: &NewListing) -> Result<UpsertOutcome>;
}

pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database lock poisoned"))
    }

    pub fn init(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                company_name TEXT NOT NULL,
                role_title TEXT NOT NULL,
                job_description TEXT NOT NULL,
                job_link TEXT NOT NULL UNIQUE,
                hiring_manager TEXT,
                is_actioned INTEGER NOT NULL DEFAULT 0,
                resume_url TEXT,
                cover_letter_url TEXT,
                drive_folder_url TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_listings_actioned ON job_listings(is_actioned);
            CREATE INDEX IF NOT EXISTS idx_listings_user ON job_listings(user_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='job_listings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'jobsweep init' first."
            ));
        }
        Ok(())
    }

    // --- Listing operations ---

    pub fn list_listings(&self, actioned: Option<bool>) -> Result<Vec<JobListing>> {
        let mut sql = String::from(
            "SELECT id, user_id, company_name, role_title, job_description, job_link,
                    hiring_manager, is_actioned, resume_url, cover_letter_url,
                    drive_folder_url, created_at
             FROM job_listings",
        );
        if actioned.is_some() {
            sql.push_str(" WHERE is_actioned = ?1");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(a) = actioned {
            stmt.query_map([a], Self::row_to_listing)?
        } else {
            stmt.query_map([], Self::row_to_listing)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list job listings")
    }

    pub fn get_listing(&self, id: i64) -> Result<Option<JobListing>> {
        let result = self.conn()?.query_row(
            "SELECT id, user_id, company_name, role_title, job_description, job_link,
                    hiring_manager, is_actioned, resume_url, cover_letter_url,
                    drive_folder_url, created_at
             FROM job_listings WHERE id = ?1",
            [id],
            Self::row_to_listing,
        );
        match result {
            Ok(listing) => Ok(Some(listing)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Sets `is_actioned`; never clears it. Returns false if no such row.
    pub fn mark_actioned(&self, id: i64) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE job_listings SET is_actioned = 1 WHERE id = ?1",
            [id],
        )?;
        Ok(changed > 0)
    }

    fn row_to_listing(row: &rusqlite::Row) -> rusqlite::Result<JobListing> {
        Ok(JobListing {
            id: row.get(0)?,
            user_id: row.get(1)?,
            company_name: row.get(2)?,
            role_title: row.get(3)?,
            job_description: row.get(4)?,
            job_link: row.get(5)?,
            hiring_manager: row.get(6)?,
            is_actioned: row.get(7)?,
            resume_url: row.get(8)?,
            cover_letter_url: row.get(9)?,
            drive_folder_url: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

impl ListingStore for Database {
    fn upsert_listing(&self, listing: &NewListing) -> Result<UpsertOutcome> {
        let conn = self.conn()?;
        // is_actioned is left to the column default; ingestion never sets it.
        let inserted = conn
            .execute(
                "INSERT INTO job_listings
                    (user_id, company_name, role_title, job_description, job_link)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(job_link) DO NOTHING",
                params![
                    listing.user_id,
                    listing.company_name,
                    listing.role_title,
                    listing.job_description,
                    listing.job_link
                ],
            )
            .with_context(|| format!("Failed to upsert listing {}", listing.job_link))?;

        if inserted == 0 {
            Ok(UpsertOutcome::Skipped)
        } else {
            Ok(UpsertOutcome::Inserted(conn.last_insert_rowid()))
        }
    }
}
