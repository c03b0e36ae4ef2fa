//! SQLite output
//!
//! Each process run gets a row in `runs`; every exported listing is stored
//! in `listings` with the flattened column set and a reference to its run.

use crate::dispatch::RunSummary;
use crate::export::{ExportResult, ListingSink};
use crate::listing::ListingRecord;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

pub const SQLITE_FILE: &str = "listings.db";

const SCHEMA_SQL: &str = r#"
-- One row per scraper invocation
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    successful_sites INTEGER,
    failed_sites INTEGER,
    total_listings INTEGER
);

-- Exported listings, flattened
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    site TEXT NOT NULL,
    title TEXT NOT NULL,
    price TEXT NOT NULL,
    location TEXT NOT NULL,
    beds REAL,
    baths REAL,
    sqft REAL,
    acres REAL,
    property_type TEXT,
    parking TEXT,
    garage TEXT,
    agent_name TEXT,
    agent_license TEXT,
    agent_office TEXT,
    agent_phone TEXT,
    url TEXT NOT NULL,
    image_url TEXT,
    scraped_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_listings_site ON listings(site);
CREATE INDEX IF NOT EXISTS idx_listings_url ON listings(url);
"#;

/// Stores runs and listings in a SQLite database
pub struct SqliteSink {
    conn: Connection,
    run_id: i64,
}

impl SqliteSink {
    /// Opens (or creates) the database and starts a new run
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `config_hash` - Digest of the configuration used for this run
    pub fn open(path: &Path, config_hash: &str) -> ExportResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        Self::start(conn, config_hash)
    }

    #[cfg(test)]
    pub fn open_in_memory(config_hash: &str) -> ExportResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::start(conn, config_hash)
    }

    fn start(conn: Connection, config_hash: &str) -> ExportResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, 'running')",
            params![Utc::now().to_rfc3339(), config_hash],
        )?;
        let run_id = conn.last_insert_rowid();

        Ok(Self { conn, run_id })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }
}

impl ListingSink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write_listings(&mut self, listings: &[ListingRecord]) -> ExportResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO listings (
                    run_id, site, title, price, location, beds, baths, sqft, acres,
                    property_type, parking, garage, agent_name, agent_license,
                    agent_office, agent_phone, url, image_url, scraped_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            )?;

            for listing in listings {
                stmt.execute(params![
                    self.run_id,
                    listing.site,
                    listing.title,
                    listing.price,
                    listing.location,
                    listing.details.beds,
                    listing.details.baths,
                    listing.details.sqft,
                    listing.details.acres,
                    listing.details.property_type,
                    listing.details.parking,
                    listing.details.garage,
                    listing.agent.name,
                    listing.agent.license,
                    listing.agent.office,
                    listing.agent.phone,
                    listing.url,
                    listing.image_url,
                    listing.scraped_at.map(|ts| ts.to_rfc3339()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> ExportResult<()> {
        self.conn.execute(
            "UPDATE runs
             SET finished_at = ?1, status = 'completed', successful_sites = ?2,
                 failed_sites = ?3, total_listings = ?4
             WHERE id = ?5",
            params![
                summary.finished_at.to_rfc3339(),
                summary.successful.len() as i64,
                summary.failed.len() as i64,
                summary.total_listings as i64,
                self.run_id
            ],
        )?;
        Ok(())
    }
}
