//! SQLite device store
//!
//! One database holds every source table the collectors sweep. The insert
//! API doubles as the collaborator interface for the host runtime; inserts
//! into the watched call log broadcast a change notice, playing the role of
//! a content-observer notification. Notices carry only the table name:
//! subscribers re-read the store instead of trusting notice payloads.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use courier_core::record::{ChangeNotice, RowId};
use courier_core::{Error, Result};

/// Capacity of the change-notice channel; a lagging subscriber misses
/// notices, which is safe because the watcher re-reads the head anyway
const NOTICE_CHANNEL_CAPACITY: usize = 64;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS calls (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    number        TEXT,
    date_ms       INTEGER NOT NULL,
    direction     TEXT,
    duration_secs INTEGER
);
CREATE INDEX IF NOT EXISTS idx_calls_date ON calls(date_ms);

CREATE TABLE IF NOT EXISTS messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    address   TEXT,
    body      TEXT,
    date_ms   INTEGER NOT NULL,
    direction TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(date_ms);

CREATE TABLE IF NOT EXISTS app_messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    app       TEXT,
    body      TEXT,
    date_ms   INTEGER NOT NULL,
    direction TEXT
);
CREATE INDEX IF NOT EXISTS idx_app_messages_date ON app_messages(date_ms);

CREATE TABLE IF NOT EXISTS locations (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude  REAL,
    longitude REAL,
    time_ms   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_locations_time ON locations(time_ms);

CREATE TABLE IF NOT EXISTS images (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    data     BLOB,
    taken_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_images_taken ON images(taken_ms);
";

/// Raw call log row, before normalization
#[derive(Debug, Clone)]
pub struct CallRow {
    pub id: RowId,
    pub number: Option<String>,
    pub date_ms: i64,
    pub direction: Option<String>,
    pub duration_secs: Option<i64>,
}

/// Raw message row, before normalization
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: RowId,
    pub address: Option<String>,
    pub body: Option<String>,
    pub date_ms: i64,
    pub direction: Option<String>,
}

/// Raw app-message row, before normalization
#[derive(Debug, Clone)]
pub struct AppMessageRow {
    pub id: RowId,
    pub app: Option<String>,
    pub body: Option<String>,
    pub date_ms: i64,
    pub direction: Option<String>,
}

/// Raw location row, before normalization
#[derive(Debug, Clone)]
pub struct LocationRow {
    pub id: RowId,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub time_ms: i64,
}

/// Raw image row, before processing
#[derive(Debug, Clone)]
pub struct ImageRow {
    pub id: RowId,
    pub data: Option<Vec<u8>>,
    pub taken_ms: i64,
}

/// SQLite-backed device store
///
/// Cheaply cloneable; clones share one connection and one notice channel,
/// so a host inserting through its clone notifies a watcher subscribed
/// through another.
#[derive(Clone)]
pub struct DeviceStore {
    conn: Arc<Mutex<Connection>>,
    change_tx: broadcast::Sender<ChangeNotice>,
}

impl DeviceStore {
    /// Open (creating if needed) a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::store(format!("failed to open device store: {}", e)))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store (tests)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store(format!("failed to open in-memory store: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::store(format!("failed to initialize schema: {}", e)))?;

        let (change_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            change_tx,
        })
    }

    /// Subscribe to change notices for the watched call log
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.change_tx.subscribe()
    }

    fn notify(&self, table: &str) {
        // No subscribers is fine; the sweep covers unwatched tables.
        let _ = self.change_tx.send(ChangeNotice::new(table));
    }

    /// Insert a call log entry; broadcasts a change notice
    pub fn insert_call(
        &self,
        number: &str,
        date_ms: i64,
        direction: &str,
        duration_secs: i64,
    ) -> Result<RowId> {
        self.insert_raw_call(Some(number), date_ms, Some(direction), Some(duration_secs))
    }

    /// Insert a call log entry with arbitrary column values (tests use this
    /// to plant malformed rows)
    pub fn insert_raw_call(
        &self,
        number: Option<&str>,
        date_ms: i64,
        direction: Option<&str>,
        duration_secs: Option<i64>,
    ) -> Result<RowId> {
        let id = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO calls (number, date_ms, direction, duration_secs)
                 VALUES (?1, ?2, ?3, ?4)",
                params![number, date_ms, direction, duration_secs],
            )
            .map_err(|e| Error::store(format!("insert into calls failed: {}", e)))?;
            conn.last_insert_rowid()
        };
        self.notify("calls");
        Ok(id)
    }

    /// Insert a text message
    pub fn insert_message(
        &self,
        address: &str,
        body: &str,
        date_ms: i64,
        direction: &str,
    ) -> Result<RowId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (address, body, date_ms, direction)
             VALUES (?1, ?2, ?3, ?4)",
            params![address, body, date_ms, direction],
        )
        .map_err(|e| Error::store(format!("insert into messages failed: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert an app-captured message (fed by an external collaborator)
    pub fn insert_app_message(
        &self,
        app: &str,
        body: &str,
        date_ms: i64,
        direction: &str,
    ) -> Result<RowId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO app_messages (app, body, date_ms, direction)
             VALUES (?1, ?2, ?3, ?4)",
            params![app, body, date_ms, direction],
        )
        .map_err(|e| Error::store(format!("insert into app_messages failed: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a location fix
    pub fn insert_location(&self, latitude: f64, longitude: f64, time_ms: i64) -> Result<RowId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO locations (latitude, longitude, time_ms) VALUES (?1, ?2, ?3)",
            params![latitude, longitude, time_ms],
        )
        .map_err(|e| Error::store(format!("insert into locations failed: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a captured image (encoded bytes as stored by the camera roll)
    pub fn insert_image(&self, data: &[u8], taken_ms: i64) -> Result<RowId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO images (data, taken_ms) VALUES (?1, ?2)",
            params![data, taken_ms],
        )
        .map_err(|e| Error::store(format!("insert into images failed: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Call rows newer than the cutoff, newest first
    pub fn calls_since(&self, cutoff_ms: i64, limit: usize) -> Result<Vec<CallRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, number, date_ms, direction, duration_secs
                 FROM calls WHERE date_ms > ?1
                 ORDER BY date_ms DESC LIMIT ?2",
            )
            .map_err(|e| Error::store(format!("calls query failed: {}", e)))?;

        let rows = stmt
            .query_map(params![cutoff_ms, limit as i64], |row| {
                Ok(CallRow {
                    id: row.get(0)?,
                    number: row.get(1)?,
                    date_ms: row.get(2)?,
                    direction: row.get(3)?,
                    duration_secs: row.get(4)?,
                })
            })
            .map_err(|e| Error::store(format!("calls query failed: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::store(format!("calls row read failed: {}", e)))?;

        Ok(rows)
    }

    /// Message rows newer than the cutoff, newest first
    pub fn messages_since(&self, cutoff_ms: i64, limit: usize) -> Result<Vec<MessageRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, address, body, date_ms, direction
                 FROM messages WHERE date_ms > ?1
                 ORDER BY date_ms DESC LIMIT ?2",
            )
            .map_err(|e| Error::store(format!("messages query failed: {}", e)))?;

        let rows = stmt
            .query_map(params![cutoff_ms, limit as i64], |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    address: row.get(1)?,
                    body: row.get(2)?,
                    date_ms: row.get(3)?,
                    direction: row.get(4)?,
                })
            })
            .map_err(|e| Error::store(format!("messages query failed: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::store(format!("messages row read failed: {}", e)))?;

        Ok(rows)
    }

    /// App-message rows newer than the cutoff, newest first
    pub fn app_messages_since(&self, cutoff_ms: i64, limit: usize) -> Result<Vec<AppMessageRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, app, body, date_ms, direction
                 FROM app_messages WHERE date_ms > ?1
                 ORDER BY date_ms DESC LIMIT ?2",
            )
            .map_err(|e| Error::store(format!("app_messages query failed: {}", e)))?;

        let rows = stmt
            .query_map(params![cutoff_ms, limit as i64], |row| {
                Ok(AppMessageRow {
                    id: row.get(0)?,
                    app: row.get(1)?,
                    body: row.get(2)?,
                    date_ms: row.get(3)?,
                    direction: row.get(4)?,
                })
            })
            .map_err(|e| Error::store(format!("app_messages query failed: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::store(format!("app_messages row read failed: {}", e)))?;

        Ok(rows)
    }

    /// Location rows newer than the cutoff, newest first
    pub fn locations_since(&self, cutoff_ms: i64, limit: usize) -> Result<Vec<LocationRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, latitude, longitude, time_ms
                 FROM locations WHERE time_ms > ?1
                 ORDER BY time_ms DESC LIMIT ?2",
            )
            .map_err(|e| Error::store(format!("locations query failed: {}", e)))?;

        let rows = stmt
            .query_map(params![cutoff_ms, limit as i64], |row| {
                Ok(LocationRow {
                    id: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    time_ms: row.get(3)?,
                })
            })
            .map_err(|e| Error::store(format!("locations query failed: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::store(format!("locations row read failed: {}", e)))?;

        Ok(rows)
    }

    /// Image rows newer than the cutoff, newest first
    pub fn images_since(&self, cutoff_ms: i64, limit: usize) -> Result<Vec<ImageRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, data, taken_ms
                 FROM images WHERE taken_ms > ?1
                 ORDER BY taken_ms DESC LIMIT ?2",
            )
            .map_err(|e| Error::store(format!("images query failed: {}", e)))?;

        let rows = stmt
            .query_map(params![cutoff_ms, limit as i64], |row| {
                Ok(ImageRow {
                    id: row.get(0)?,
                    data: row.get(1)?,
                    taken_ms: row.get(2)?,
                })
            })
            .map_err(|e| Error::store(format!("images query failed: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::store(format!("images row read failed: {}", e)))?;

        Ok(rows)
    }

    /// The newest call row, if any
    pub fn head_call(&self) -> Result<Option<CallRow>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, number, date_ms, direction, duration_secs
             FROM calls ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(CallRow {
                    id: row.get(0)?,
                    number: row.get(1)?,
                    date_ms: row.get(2)?,
                    direction: row.get(3)?,
                    duration_secs: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::store(format!("head query failed: {}", e)))
    }
}
