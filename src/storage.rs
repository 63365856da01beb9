use crate::constants::{CAST_ETC_SUFFIX, CAST_SEPARATOR, STORED_DATETIME_FORMAT};
use crate::error::Result;
use crate::types::{CompositionEntry, ConcertRecord};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS concerts_facility (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    area_id  INTEGER NOT NULL,
    name     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS concerts_concert (
    kopis_id             TEXT PRIMARY KEY,
    prfnm                TEXT NOT NULL,
    datetime             TEXT NOT NULL,
    prfruntime           TEXT NOT NULL,
    price                TEXT NOT NULL,
    facility_id          INTEGER NOT NULL REFERENCES concerts_facility(id),
    area_id              INTEGER NOT NULL,
    display_poster_name  TEXT NOT NULL,
    prfcast              TEXT NOT NULL,
    program_blurb        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS concerts_performer (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    concert_id  TEXT NOT NULL REFERENCES concerts_concert(kopis_id),
    name        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS concerts_ticketvendor (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    concert_id  TEXT NOT NULL REFERENCES concerts_concert(kopis_id),
    name        TEXT NOT NULL,
    url         TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS concerts_fullpostername (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    concert_id  TEXT NOT NULL REFERENCES concerts_concert(kopis_id),
    name        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS concerts_composition (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    concert_id  TEXT NOT NULL REFERENCES concerts_concert(kopis_id),
    composer    TEXT NOT NULL,
    name        TEXT NOT NULL
);
"#;

/// Performer names from a cast string: drops a trailing ` 등` and splits on `, `.
pub fn split_cast(cast: &str) -> Vec<String> {
    let cast = cast.strip_suffix(CAST_ETC_SUFFIX).unwrap_or(cast);
    cast.split(CAST_SEPARATOR)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// SQLite-backed concert store. Every operation opens its own connection and
/// releases it when done.
pub struct ConcertStore {
    db_path: PathBuf,
}

impl ConcertStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Opens the store, creating the database file and tables if needed.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let store = Self::new(db_path);
        if let Some(parent) = store.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        store.connect()?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// Id of the (area, name) facility, inserting it on first sight.
    pub fn find_or_create_facility(&self, area: u16, name: &str) -> Result<i64> {
        let conn = self.connect()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM concerts_facility WHERE area_id = ?1 AND name = ?2",
                params![area, name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        let id: i64 = conn.query_row(
            "INSERT INTO concerts_facility (area_id, name) VALUES (?1, ?2) RETURNING id",
            params![area, name],
            |row| row.get(0),
        )?;
        debug!(area, name, id, "Created facility");
        Ok(id)
    }

    /// Plain insert; re-ingesting an existing `kopis_id` fails.
    pub fn insert_concert(&self, record: &ConcertRecord, facility_id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO concerts_concert
                (kopis_id, prfnm, datetime, prfruntime, price, facility_id, area_id,
                 display_poster_name, prfcast, program_blurb)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.external_id,
                record.name,
                record.starts_at.format(STORED_DATETIME_FORMAT).to_string(),
                record.runtime,
                record.price,
                facility_id,
                record.area,
                record.display_poster,
                record.cast,
                record.program_blurb,
            ],
        )?;
        Ok(())
    }

    /// Returns the number of performer rows written.
    pub fn insert_performers(&self, record: &ConcertRecord) -> Result<usize> {
        let names = split_cast(&record.cast);
        self.insert_rows(
            "INSERT INTO concerts_performer (concert_id, name) VALUES (?1, ?2)",
            names.iter().map(|name| vec![record.external_id.as_str(), name.as_str()]),
        )
    }

    pub fn insert_ticket_vendors(&self, record: &ConcertRecord) -> Result<usize> {
        self.insert_rows(
            "INSERT INTO concerts_ticketvendor (concert_id, name, url) VALUES (?1, ?2, ?3)",
            record
                .ticket_vendors
                .iter()
                .map(|(name, url)| vec![record.external_id.as_str(), name.as_str(), url.as_str()]),
        )
    }

    pub fn insert_poster_references(&self, record: &ConcertRecord) -> Result<usize> {
        self.insert_rows(
            "INSERT INTO concerts_fullpostername (concert_id, name) VALUES (?1, ?2)",
            record
                .full_posters
                .iter()
                .map(|name| vec![record.external_id.as_str(), name.as_str()]),
        )
    }

    pub fn insert_compositions(&self, external_id: &str, pieces: &[CompositionEntry]) -> Result<usize> {
        self.insert_rows(
            "INSERT INTO concerts_composition (concert_id, composer, name) VALUES (?1, ?2, ?3)",
            pieces
                .iter()
                .map(|piece| vec![external_id, piece.composer.as_str(), piece.title.as_str()]),
        )
    }

    /// Runs one prepared statement per row inside a single short transaction.
    fn insert_rows<'a, I>(&self, sql: &str, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Vec<&'a str>>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for row in rows {
                stmt.execute(rusqlite::params_from_iter(row))?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(id: &str) -> ConcertRecord {
        let mut vendors = BTreeMap::new();
        vendors.insert("interpark".to_string(), "https://tickets.interpark.com/goods/1".to_string());
        vendors.insert("ticketlink".to_string(), "https://www.ticketlink.co.kr/product/2".to_string());
        ConcertRecord {
            external_id: id.into(),
            area: 11,
            name: "신년 음악회".into(),
            event_day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            starts_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap(),
            runtime: "90분".into(),
            price: "전석 30,000원".into(),
            venue: "예술의전당".into(),
            cast: "Kim, Lee, Park 등".into(),
            program_blurb: String::new(),
            display_poster: "PF_D.jpg".into(),
            full_posters: vec!["PF_A.jpg".into(), "PF_B.jpg".into()],
            ticket_vendors: vendors,
        }
    }

    fn count(store: &ConcertStore, table: &str) -> i64 {
        let conn = Connection::open(store.path()).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_split_cast() {
        assert_eq!(split_cast("Kim, Lee, Park 등"), vec!["Kim", "Lee", "Park"]);
        assert_eq!(split_cast("Kim"), vec!["Kim"]);
        assert_eq!(split_cast("김철수, 이영희"), vec!["김철수", "이영희"]);
        assert!(split_cast("").is_empty());
    }

    #[test]
    fn test_find_or_create_facility_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ConcertStore::open(dir.path().join("concerts.sqlite3")).unwrap();

        let first = store.find_or_create_facility(11, "예술의전당").unwrap();
        let second = store.find_or_create_facility(11, "예술의전당").unwrap();
        assert_eq!(first, second);
        assert_eq!(count(&store, "concerts_facility"), 1);

        let other_area = store.find_or_create_facility(26, "예술의전당").unwrap();
        assert_ne!(first, other_area);
        assert_eq!(count(&store, "concerts_facility"), 2);
    }

    #[test]
    fn test_insert_concert_and_children() {
        let dir = tempdir().unwrap();
        let store = ConcertStore::open(dir.path().join("concerts.sqlite3")).unwrap();
        let rec = record("PF230001");
        let facility = store.find_or_create_facility(rec.area, &rec.venue).unwrap();

        store.insert_concert(&rec, facility).unwrap();
        assert_eq!(store.insert_performers(&rec).unwrap(), 3);
        assert_eq!(store.insert_ticket_vendors(&rec).unwrap(), 2);
        assert_eq!(store.insert_poster_references(&rec).unwrap(), 2);

        let conn = Connection::open(store.path()).unwrap();
        let stored: String = conn
            .query_row(
                "SELECT datetime FROM concerts_concert WHERE kopis_id = ?1",
                params!["PF230001"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored, "2024-01-01 10:30:00");

        let mut stmt = conn
            .prepare("SELECT name FROM concerts_performer WHERE concert_id = ?1 ORDER BY id")
            .unwrap();
        let performers: Vec<String> = stmt
            .query_map(params!["PF230001"], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(performers, vec!["Kim", "Lee", "Park"]);
    }

    #[test]
    fn test_insert_concert_twice_fails() {
        let dir = tempdir().unwrap();
        let store = ConcertStore::open(dir.path().join("concerts.sqlite3")).unwrap();
        let rec = record("PF230001");
        let facility = store.find_or_create_facility(rec.area, &rec.venue).unwrap();

        store.insert_concert(&rec, facility).unwrap();
        let again = store.insert_concert(&rec, facility);
        assert!(matches!(again, Err(IngestError::Database(_))));
        assert_eq!(count(&store, "concerts_concert"), 1);
    }

    #[test]
    fn test_insert_compositions() {
        let dir = tempdir().unwrap();
        let store = ConcertStore::open(dir.path().join("concerts.sqlite3")).unwrap();
        let pieces = vec![
            CompositionEntry {
                composer: "Beethoven".into(),
                title: "Symphony No. 5".into(),
            },
            CompositionEntry {
                composer: "Brahms".into(),
                title: "Violin Concerto".into(),
            },
        ];
        assert_eq!(store.insert_compositions("PF230001", &pieces).unwrap(), 2);
        assert_eq!(store.insert_compositions("PF230001", &[]).unwrap(), 0);
        assert_eq!(count(&store, "concerts_composition"), 2);
    }
}
