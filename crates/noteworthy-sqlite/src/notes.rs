use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use noteworthy_core::{Error, Note, NoteStore, SaveNote, NOTES_MIGRATIONS, NOTES_SCHEMA_VERSION};

use crate::schema::{db_err, open_connection, run_migrations};

const SELECT_NOTE: &str =
    "SELECT uuid, title, last_modified, tags, content, html_content FROM notes";

/// SQLite-backed note collection.
pub struct SqliteNoteStore {
    conn: Mutex<Connection>,
}

impl SqliteNoteStore {
    /// Open the notes database at the given path and run any pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::init(open_connection(Connection::open(path))?)
    }

    /// Open an in-memory notes database and run migrations.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(open_connection(Connection::open_in_memory())?)
    }

    fn init(mut conn: Connection) -> Result<Self, Error> {
        run_migrations(&mut conn, NOTES_MIGRATIONS, NOTES_SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("notes connection lock poisoned".into()))
    }

    fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
        let tags: String = row.get(3)?;
        let content: String = row.get(4)?;
        Ok(Note {
            uuid: row.get(0)?,
            title: row.get(1)?,
            last_modified: row.get(2)?,
            tags: serde_json::from_str(&tags).map_err(|e| json_err(3, e))?,
            content: serde_json::from_str(&content).map_err(|e| json_err(4, e))?,
            html_content: row.get(5)?,
        })
    }

    fn encode(note: &SaveNote) -> Result<(String, String), Error> {
        let tags = serde_json::to_string(&note.tags)
            .map_err(|e| Error::Internal(format!("failed to encode tags: {}", e)))?;
        let content = serde_json::to_string(&note.content)
            .map_err(|e| Error::Internal(format!("failed to encode content: {}", e)))?;
        Ok((tags, content))
    }
}

fn json_err(column: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
}

#[async_trait::async_trait(?Send)]
impl NoteStore for SqliteNoteStore {
    async fn list_notes(&self) -> Result<Vec<Note>, Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(SELECT_NOTE).map_err(db_err)?;
        let notes = stmt
            .query_map([], Self::row_to_note)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        debug!(count = notes.len(), "listed notes");
        Ok(notes)
    }

    async fn get_note(&self, id: i64) -> Result<Option<Note>, Error> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{} WHERE uuid = ?1", SELECT_NOTE),
            params![id],
            Self::row_to_note,
        )
        .optional()
        .map_err(db_err)
    }

    async fn save_note(&self, note: SaveNote) -> Result<i64, Error> {
        let (tags, content) = Self::encode(&note)?;
        let conn = self.conn()?;

        let id = match note.uuid {
            None => {
                conn.execute(
                    "INSERT INTO notes (title, last_modified, tags, content, html_content)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![note.title, note.last_modified, tags, content, note.html_content],
                )
                .map_err(db_err)?;
                conn.last_insert_rowid()
            }
            Some(id) => {
                conn.execute(
                    "INSERT OR REPLACE INTO notes
                        (uuid, title, last_modified, tags, content, html_content)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![id, note.title, note.last_modified, tags, content, note.html_content],
                )
                .map_err(db_err)?;
                id
            }
        };

        debug!(note_id = id, "saved note record");
        Ok(id)
    }

    async fn delete_note(&self, id: i64) -> Result<bool, Error> {
        let conn = self.conn()?;
        let rows = conn
            .execute("DELETE FROM notes WHERE uuid = ?1", params![id])
            .map_err(db_err)?;
        debug!(note_id = id, deleted = rows > 0, "deleted note record");
        Ok(rows > 0)
    }
}
