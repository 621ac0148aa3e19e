use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use crate::parser::fields::FieldRecord;

const DB_PATH: &str = "data/records.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

#[cfg(test)]
pub fn connect_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id          INTEGER PRIMARY KEY,
            base_url    TEXT NOT NULL,
            started_at  TEXT NOT NULL,
            pages       INTEGER NOT NULL DEFAULT 0,
            records     INTEGER NOT NULL DEFAULT 0,
            warnings    TEXT,
            finished_at TEXT
        );

        CREATE TABLE IF NOT EXISTS records (
            id          INTEGER PRIMARY KEY,
            run_id      INTEGER NOT NULL REFERENCES runs(id),
            page_url    TEXT NOT NULL,
            skip        INTEGER NOT NULL,
            item_index  INTEGER NOT NULL,
            kind        TEXT NOT NULL CHECK(kind IN ('title','value','link')),
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_records_run ON records(run_id);
        CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
        ",
    )?;
    Ok(())
}

/// One page's worth of records, emitted as a single ordered batch.
pub struct PageBatch<'a> {
    pub page_url: &'a str,
    pub skip: u64,
    pub records: &'a [FieldRecord],
}

/// Append-only record sink. The pipeline writes each page's batch before
/// fetching the next page, so rows land in page order with no reordering
/// or deduplication downstream.
pub trait Sink {
    fn emit_batch(&mut self, batch: &PageBatch) -> Result<()>;
}

pub struct SqliteSink {
    conn: Connection,
    run_id: i64,
}

impl SqliteSink {
    /// Open a run row for one base URL; all batches emitted through this
    /// sink attach to it.
    pub fn begin_run(conn: Connection, base_url: &str) -> Result<Self> {
        conn.execute(
            "INSERT INTO runs (base_url, started_at) VALUES (?1, ?2)",
            rusqlite::params![base_url, Utc::now().to_rfc3339()],
        )?;
        let run_id = conn.last_insert_rowid();
        Ok(Self { conn, run_id })
    }

    /// Close out the run with final counts and the warning summary.
    pub fn finish_run(self, pages: usize, records: usize, warnings_json: &str) -> Result<Connection> {
        self.conn.execute(
            "UPDATE runs SET pages = ?1, records = ?2, warnings = ?3, finished_at = ?4
             WHERE id = ?5",
            rusqlite::params![
                pages,
                records,
                warnings_json,
                Utc::now().to_rfc3339(),
                self.run_id
            ],
        )?;
        Ok(self.conn)
    }
}

impl Sink for SqliteSink {
    fn emit_batch(&mut self, batch: &PageBatch) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (run_id, page_url, skip, item_index, kind, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in batch.records {
                stmt.execute(rusqlite::params![
                    self.run_id,
                    batch.page_url,
                    batch.skip,
                    record.item_index,
                    record.kind.as_str(),
                    record.text,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub records: usize,
    pub titles: usize,
    pub values: usize,
    pub links: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    };
    Ok(Stats {
        runs: count("SELECT COUNT(*) FROM runs")?,
        records: count("SELECT COUNT(*) FROM records")?,
        titles: count("SELECT COUNT(*) FROM records WHERE kind = 'title'")?,
        values: count("SELECT COUNT(*) FROM records WHERE kind = 'value'")?,
        links: count("SELECT COUNT(*) FROM records WHERE kind = 'link'")?,
    })
}

// ── Tests ──
