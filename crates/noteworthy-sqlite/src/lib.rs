//! SQLite implementation of the NoteWorthy storage traits.
//!
//! Notes and tags live in two separate database files with no shared
//! transaction:
//!
//! ```text
//! .noteworthy/
//!   notes.sqlite    # notes(uuid, title, last_modified, tags, content, html_content)
//!   tags.sqlite     # tags(tag_name, num_notes), seeded on creation
//! ```

mod notes;
mod schema;
mod tags;

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::info;

use noteworthy_core::Error;

pub use notes::SqliteNoteStore;
pub use tags::SqliteTagStore;

pub const NOTES_DB_FILE: &str = "notes.sqlite";
pub const TAGS_DB_FILE: &str = "tags.sqlite";

/// Opens each database at most once and hands out shared handles.
pub struct SqliteConnections {
    root: PathBuf,
    notes: OnceCell<Rc<SqliteNoteStore>>,
    tags: OnceCell<Rc<SqliteTagStore>>,
}

impl SqliteConnections {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            notes: OnceCell::new(),
            tags: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The notes database handle, opened and migrated on first call.
    pub fn open_note_database(&self) -> Result<Rc<SqliteNoteStore>, Error> {
        if let Some(store) = self.notes.get() {
            return Ok(Rc::clone(store));
        }
        self.ensure_root()?;
        let path = self.root.join(NOTES_DB_FILE);
        let store = Rc::new(SqliteNoteStore::open(&path)?);
        info!(path = %path.display(), "opened notes database");
        Ok(Rc::clone(self.notes.get_or_init(|| store)))
    }

    /// The tags database handle, created and seeded on first call.
    pub fn open_tag_database(&self) -> Result<Rc<SqliteTagStore>, Error> {
        if let Some(store) = self.tags.get() {
            return Ok(Rc::clone(store));
        }
        self.ensure_root()?;
        let path = self.root.join(TAGS_DB_FILE);
        let store = Rc::new(SqliteTagStore::open(&path)?);
        info!(path = %path.display(), "opened tags database");
        Ok(Rc::clone(self.tags.get_or_init(|| store)))
    }

    fn ensure_root(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::StorageUnavailable(format!(
                "cannot create {}: {}",
                self.root.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteworthy_core::{NoteDraft, NoteStore, NoteworthyService, SaveNote, Tag, TagStore};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(title: &str, tags: &[&str]) -> SaveNote {
        SaveNote {
            uuid: None,
            title: title.to_string(),
            last_modified: "3/14/2024 at 9:05 AM".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            content: json!({ "ops": [{ "insert": "hello\n" }] }),
            html_content: "<p>hello</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_note_round_trip() {
        let db = SqliteNoteStore::open_in_memory().unwrap();
        let saved = record("Test note", &["work", "urgent"]);
        let id = db.save_note(saved.clone()).await.unwrap();

        let note = db.get_note(id).await.unwrap().unwrap();
        assert_eq!(note, saved.into_note(id));
    }

    #[tokio::test]
    async fn test_note_save_with_id_replaces() {
        let db = SqliteNoteStore::open_in_memory().unwrap();
        let id = db.save_note(record("first", &["work"])).await.unwrap();

        let mut replacement = record("second", &[]);
        replacement.uuid = Some(id);
        replacement.content = serde_json::Value::Null;
        assert_eq!(db.save_note(replacement).await.unwrap(), id);

        let notes = db.list_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "second");
        assert!(notes[0].tags.is_empty());
        assert_eq!(notes[0].content, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_note_ids_are_unique() {
        let db = SqliteNoteStore::open_in_memory().unwrap();
        let a = db.save_note(record("a", &[])).await.unwrap();
        let b = db.save_note(record("b", &[])).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_note_delete_is_idempotent() {
        let db = SqliteNoteStore::open_in_memory().unwrap();
        let id = db.save_note(record("gone", &[])).await.unwrap();

        assert!(db.delete_note(id).await.unwrap());
        assert!(!db.delete_note(id).await.unwrap());
        assert!(db.get_note(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tags_seeded() {
        let db = SqliteTagStore::open_in_memory().unwrap();
        let mut tags = db.list_tags().await.unwrap();
        tags.sort_by(|a, b| a.tag_name.cmp(&b.tag_name));
        assert_eq!(
            tags,
            vec![
                Tag::new("personal"),
                Tag::new("projects"),
                Tag::new("school"),
                Tag::new("work"),
            ]
        );
    }

    #[tokio::test]
    async fn test_tag_missing_is_none() {
        let db = SqliteTagStore::open_in_memory().unwrap();
        assert!(db.get_tag("tag100").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_save_new_and_update() {
        let db = SqliteTagStore::open_in_memory().unwrap();
        assert_eq!(db.save_tag(&Tag::new("urgent"), true).await.unwrap(), "urgent");
        assert!(matches!(
            db.save_tag(&Tag::new("urgent"), true).await,
            Err(Error::KeyCollision(_))
        ));

        let updated = Tag {
            tag_name: "projects".into(),
            num_notes: 1,
        };
        db.save_tag(&updated, false).await.unwrap();
        assert_eq!(db.get_tag("projects").await.unwrap(), Some(updated));

        assert!(matches!(
            db.save_tag(&Tag::new(" "), true).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_tag_check_failures_are_not_collisions() {
        let db = SqliteTagStore::open_in_memory().unwrap();
        let negative = Tag {
            tag_name: "brandnew".into(),
            num_notes: -1,
        };

        assert!(matches!(
            db.save_tag(&negative, true).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.save_tag(&negative, false).await,
            Err(Error::Validation(_))
        ));
        assert!(db.get_tag("brandnew").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_delete_is_idempotent() {
        let db = SqliteTagStore::open_in_memory().unwrap();
        assert!(db.delete_tag("work").await.unwrap());
        assert!(!db.delete_tag("work").await.unwrap());
        assert!(db.get_tag("work").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_adjust_tag_count() {
        let db = SqliteTagStore::open_in_memory().unwrap();

        let change = db.adjust_tag_count("work", 1, false).await.unwrap().unwrap();
        assert_eq!(change.tag.num_notes, 1);
        assert!(!change.clamped);

        let change = db.adjust_tag_count("work", -2, false).await.unwrap().unwrap();
        assert_eq!(change.tag.num_notes, 0);
        assert!(change.clamped);

        assert!(db.adjust_tag_count("urgent", -1, true).await.unwrap().is_none());
        assert!(db.adjust_tag_count("urgent", 1, false).await.unwrap().is_none());
        let created = db.adjust_tag_count("urgent", 1, true).await.unwrap().unwrap();
        assert_eq!(
            created.tag,
            Tag {
                tag_name: "urgent".into(),
                num_notes: 1
            }
        );
    }

    #[tokio::test]
    async fn test_connections_are_memoized() {
        let dir = TempDir::new().unwrap();
        let conns = SqliteConnections::new(dir.path().join(".noteworthy"));

        let a = conns.open_note_database().unwrap();
        let b = conns.open_note_database().unwrap();
        assert!(Rc::ptr_eq(&a, &b));

        let c = conns.open_tag_database().unwrap();
        let d = conns.open_tag_database().unwrap();
        assert!(Rc::ptr_eq(&c, &d));

        assert!(dir.path().join(".noteworthy").join(NOTES_DB_FILE).exists());
        assert!(dir.path().join(".noteworthy").join(TAGS_DB_FILE).exists());
    }

    #[tokio::test]
    async fn test_seed_runs_only_once() {
        let dir = TempDir::new().unwrap();
        {
            let conns = SqliteConnections::new(dir.path());
            let tags = conns.open_tag_database().unwrap();
            tags.delete_tag("school").await.unwrap();
        }

        let conns = SqliteConnections::new(dir.path());
        let tags = conns.open_tag_database().unwrap();
        let names: Vec<_> = tags
            .list_tags()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.tag_name)
            .collect();
        assert_eq!(names.len(), 3);
        assert!(!names.contains(&"school".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_storage() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let conns = SqliteConnections::new(blocker.join("nested"));
        assert!(matches!(
            conns.open_note_database(),
            Err(Error::StorageUnavailable(_))
        ));
        assert!(matches!(
            conns.open_tag_database(),
            Err(Error::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_service_over_sqlite() {
        let dir = TempDir::new().unwrap();
        let conns = SqliteConnections::new(dir.path());
        let svc = NoteworthyService::new(
            conns.open_note_database().unwrap(),
            conns.open_tag_database().unwrap(),
        );

        let draft = |title: &str, tags: &[&str]| NoteDraft {
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        };

        let (a, b) = tokio::join!(
            svc.save_note(draft("a", &["work", "urgent"])),
            svc.save_note(draft("b", &["work"]))
        );
        let a = a.unwrap();
        b.unwrap();
        svc.copy_note(a).await.unwrap();
        svc.delete_note(a).await.unwrap();

        assert_eq!(svc.get_tag("work").await.unwrap().unwrap().num_notes, 2);
        assert_eq!(svc.get_tag("urgent").await.unwrap().unwrap().num_notes, 1);
        assert!(svc.verify_tag_counts().await.unwrap().is_empty());
    }
}
