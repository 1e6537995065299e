//! SQLite backend
//!
//! Journal events are rows of an append-only `transactions` table.

use std::collections::VecDeque;
use std::fs;
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags};

use crate::config::SqliteConfig;
use crate::error::{KvError, Result};
use crate::journal::{Event, EventType};

use super::{EventStream, LogBackend};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS transactions (
    sequence   INTEGER PRIMARY KEY,
    event_type INTEGER NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL
)";

const INSERT_EVENT: &str =
    "INSERT INTO transactions (sequence, event_type, key, value) VALUES (?1, ?2, ?3, ?4)";

const SELECT_PAGE: &str = "SELECT sequence, event_type, key, value FROM transactions
     WHERE sequence > ?1 ORDER BY sequence LIMIT ?2";

/// Journal stored in a SQLite table
pub struct SqliteBackend {
    /// `None` once closed
    conn: Option<Connection>,

    /// Rows fetched per replay query
    page_size: usize,
}

impl SqliteBackend {
    /// Open or create the journal database
    pub fn open(cfg: &SqliteConfig) -> Result<Self> {
        if let Some(parent) = cfg.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &cfg.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Self::configure(&conn, cfg)?;

        tracing::debug!(path = %cfg.path.display(), "journal database opened");
        Self::from_connection(conn, cfg.page_size)
    }

    /// Wrap an already configured connection (e.g. in-memory databases)
    pub fn from_connection(conn: Connection, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(KvError::Config("sqlite page size must be at least 1".into()));
        }
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self {
            conn: Some(conn),
            page_size,
        })
    }

    fn configure(conn: &Connection, cfg: &SqliteConfig) -> Result<()> {
        // journal_mode returns a row, so it goes through query_row
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::trace!(journal_mode = %mode, "sqlite journal mode set");

        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())?;
        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))?;
        Ok(())
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(KvError::TransactorClosed)
    }
}

impl LogBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn append(&mut self, event: &Event) -> Result<()> {
        let sequence = i64::try_from(event.sequence).map_err(|_| {
            KvError::corrupt(
                format!("sequence {}", event.sequence),
                "sequence does not fit the sequence column",
            )
        })?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(INSERT_EVENT)?;
        stmt.execute(params![
            sequence,
            event.event_type.code(),
            event.key,
            event.value
        ])?;
        Ok(())
    }

    fn replay(&mut self) -> Result<Option<EventStream<'_>>> {
        let conn = self.conn()?;
        Ok(Some(Box::new(PagedRows {
            conn,
            after: 0,
            page_size: self.page_size,
            buffered: VecDeque::new(),
            exhausted: false,
        })))
    }

    fn close(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(KvError::TransactorClosed)?;
        conn.close().map_err(|(_, e)| KvError::Sqlite(e))?;
        tracing::debug!("journal database closed");
        Ok(())
    }
}

/// Ordered scan of the table, one page of rows at a time
struct PagedRows<'a> {
    conn: &'a Connection,

    /// Highest sequence handed out so far
    after: i64,

    page_size: usize,

    /// Decoded rows not yet handed out; a corrupt row ends the scan
    buffered: VecDeque<Result<Event>>,
    exhausted: bool,
}

impl PagedRows<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let conn = self.conn;
        let mut stmt = conn.prepare_cached(SELECT_PAGE)?;
        let rows = stmt.query_map(params![self.after, self.page_size as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut fetched = 0;
        for row in rows {
            let (sequence, code, key, value) = row?;
            fetched += 1;
            self.after = sequence;

            let decoded = decode_row(sequence, code, key, value);
            let corrupt = decoded.is_err();
            self.buffered.push_back(decoded);
            if corrupt {
                self.exhausted = true;
                return Ok(());
            }
        }

        if fetched < self.page_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for PagedRows<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                self.buffered.push_back(Err(e));
            }
        }
        self.buffered.pop_front()
    }
}

fn decode_row(sequence: i64, code: i64, key: String, value: String) -> Result<Event> {
    let location = format!("sequence {}", sequence);

    let sequence = u64::try_from(sequence)
        .map_err(|_| KvError::corrupt(location.clone(), "negative sequence"))?;
    let event_type = u8::try_from(code)
        .ok()
        .and_then(|code| EventType::try_from(code).ok())
        .ok_or_else(|| KvError::corrupt(location.clone(), format!("unknown event type {}", code)))?;
    if key.is_empty() {
        return Err(KvError::corrupt(location, "empty key"));
    }

    Ok(Event {
        sequence,
        event_type,
        key,
        value,
    })
}
