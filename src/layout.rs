//! Sqlite persistence: dashboard widget layout and the export journal.
//!
//! Layout survives restarts; the journal records every finished export so
//! "what was the last report and did it match" is answerable after the
//! fact. Both live in one database file.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::report::ExportArtifact;

/// One dashboard panel: identity, display title, ordering slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Widget {
    pub id: String,
    pub title: String,
    pub position: i64,
}

/// One journal row, artifact bytes excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub ts: i64,
    pub format: String,
    pub file_name: String,
    pub fingerprint: String,
    pub bytes_len: i64,
}

pub struct LayoutStore {
    conn: Connection,
}

impl LayoutStore {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS widgets (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                position INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS exports (
                ts INTEGER NOT NULL,
                format TEXT NOT NULL,
                file_name TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                bytes_len INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// Replace the stored layout wholesale, in one transaction.
    pub fn save_layout(&mut self, widgets: &[Widget]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM widgets", [])?;
        for w in widgets {
            tx.execute(
                "INSERT INTO widgets (id, title, position) VALUES (?1, ?2, ?3)",
                params![w.id, w.title, w.position],
            )?;
        }
        tx.commit()?;
        log(
            Level::Debug,
            Domain::Layout,
            "layout_saved",
            obj(&[("widgets", v_num(widgets.len() as f64))]),
        );
        Ok(())
    }

    /// Load the layout in display order.
    pub fn load_layout(&self) -> Result<Vec<Widget>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, position FROM widgets ORDER BY position ASC, id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Widget {
                id: row.get(0)?,
                title: row.get(1)?,
                position: row.get(2)?,
            })
        })?;
        let mut widgets = Vec::new();
        for row in rows {
            widgets.push(row?);
        }
        Ok(widgets)
    }

    /// Insert or replace a single widget.
    pub fn add_widget(&mut self, widget: &Widget) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO widgets (id, title, position) VALUES (?1, ?2, ?3)",
            params![widget.id, widget.title, widget.position],
        )?;
        Ok(())
    }

    /// Remove one widget; returns whether it existed.
    pub fn remove_widget(&mut self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM widgets WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Journal one finished export.
    pub fn record_export(&mut self, artifact: &ExportArtifact) -> Result<()> {
        self.conn.execute(
            "INSERT INTO exports (ts, format, file_name, fingerprint, bytes_len)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                artifact.taken_at,
                artifact.format.as_str(),
                artifact.file_name,
                artifact.fingerprint,
                artifact.bytes.len() as i64
            ],
        )?;
        log(
            Level::Debug,
            Domain::Layout,
            "export_recorded",
            obj(&[
                ("format", v_str(artifact.format.as_str())),
                ("file", v_str(&artifact.file_name)),
            ]),
        );
        Ok(())
    }

    /// Most recent journal entries, newest first.
    pub fn recent_exports(&self, limit: usize) -> Result<Vec<ExportRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT ts, format, file_name, fingerprint, bytes_len
             FROM exports ORDER BY ts DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ExportRecord {
                ts: row.get(0)?,
                format: row.get(1)?,
                file_name: row.get(2)?,
                fingerprint: row.get(3)?,
                bytes_len: row.get(4)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Newest journal entry for one format, if any.
    pub fn last_export_for(&self, format: &str) -> Result<Option<ExportRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT ts, format, file_name, fingerprint, bytes_len
                 FROM exports WHERE format = ?1 ORDER BY ts DESC, rowid DESC LIMIT 1",
                params![format],
                |row| {
                    Ok(ExportRecord {
                        ts: row.get(0)?,
                        format: row.get(1)?,
                        file_name: row.get(2)?,
                        fingerprint: row.get(3)?,
                        bytes_len: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}
