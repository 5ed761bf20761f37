use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::debug;

use noteworthy_core::{
    clamp_count, ensure_tag_key, CountChange, Error, Tag, TagStore, TAGS_MIGRATIONS,
    TAGS_SCHEMA_VERSION,
};

use crate::schema::{db_err, open_connection, run_migrations};

/// SQLite-backed tag collection. Lives in its own database file.
pub struct SqliteTagStore {
    conn: Mutex<Connection>,
}

impl SqliteTagStore {
    /// Open the tags database at the given path, creating and seeding it on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::init(open_connection(Connection::open(path))?)
    }

    /// Open an in-memory tags database, seeded with the default tags.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(open_connection(Connection::open_in_memory())?)
    }

    fn init(mut conn: Connection) -> Result<Self, Error> {
        run_migrations(&mut conn, TAGS_MIGRATIONS, TAGS_SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("tags connection lock poisoned".into()))
    }
}

/// A duplicate key on insert. Other constraint failures (the CHECKs on the
/// name and count) are not collisions.
fn is_key_collision(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait::async_trait(?Send)]
impl TagStore for SqliteTagStore {
    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT tag_name, num_notes FROM tags")
            .map_err(db_err)?;
        let tags = stmt
            .query_map([], |row| {
                Ok(Tag {
                    tag_name: row.get(0)?,
                    num_notes: row.get(1)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(tags)
    }

    async fn get_tag(&self, name: &str) -> Result<Option<Tag>, Error> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT tag_name, num_notes FROM tags WHERE tag_name = ?1",
            params![name],
            |row| {
                Ok(Tag {
                    tag_name: row.get(0)?,
                    num_notes: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    async fn save_tag(&self, tag: &Tag, is_new: bool) -> Result<String, Error> {
        ensure_tag_key(&tag.tag_name)?;
        let conn = self.conn()?;

        let sql = if is_new {
            "INSERT INTO tags (tag_name, num_notes) VALUES (?1, ?2)"
        } else {
            "INSERT OR REPLACE INTO tags (tag_name, num_notes) VALUES (?1, ?2)"
        };

        conn.execute(sql, params![tag.tag_name, tag.num_notes])
            .map_err(|e| {
                if is_new && is_key_collision(&e) {
                    Error::KeyCollision(format!("tag '{}' already exists", tag.tag_name))
                } else if is_constraint_violation(&e) {
                    Error::Validation(format!("tag '{}' rejected: {}", tag.tag_name, e))
                } else {
                    db_err(e)
                }
            })?;

        debug!(tag = %tag.tag_name, num_notes = tag.num_notes, is_new, "saved tag record");
        Ok(tag.tag_name.clone())
    }

    async fn delete_tag(&self, name: &str) -> Result<bool, Error> {
        let conn = self.conn()?;
        let rows = conn
            .execute("DELETE FROM tags WHERE tag_name = ?1", params![name])
            .map_err(db_err)?;
        Ok(rows > 0)
    }

    async fn adjust_tag_count(
        &self,
        name: &str,
        delta: i64,
        create_if_missing: bool,
    ) -> Result<Option<CountChange>, Error> {
        ensure_tag_key(name)?;
        let mut conn = self.conn()?;

        // IMMEDIATE takes the write lock up front, so no other writer can
        // slip in between the read and the update.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT num_notes FROM tags WHERE tag_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let change = match current {
            Some(current) => {
                let (num_notes, clamped) = clamp_count(current, delta);
                tx.execute(
                    "UPDATE tags SET num_notes = ?1 WHERE tag_name = ?2",
                    params![num_notes, name],
                )
                .map_err(db_err)?;
                Some(CountChange {
                    tag: Tag {
                        tag_name: name.to_string(),
                        num_notes,
                    },
                    clamped,
                })
            }
            None if create_if_missing && delta > 0 => {
                tx.execute(
                    "INSERT INTO tags (tag_name, num_notes) VALUES (?1, ?2)",
                    params![name, delta],
                )
                .map_err(db_err)?;
                Some(CountChange {
                    tag: Tag {
                        tag_name: name.to_string(),
                        num_notes: delta,
                    },
                    clamped: false,
                })
            }
            None => None,
        };

        tx.commit().map_err(db_err)?;
        debug!(tag = %name, delta, result = ?change.as_ref().map(|c| c.tag.num_notes), "adjusted tag count");
        Ok(change)
    }
}
