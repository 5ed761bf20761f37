//! File-based storage implementation for NoteWorthy.
//!
//! The notes and tags databases are two independent directories, each with
//! its own lock file:
//!
//! ```text
//! .noteworthy/
//!   notes_db/
//!     .lock                  # Lock file for atomic operations
//!     meta.json              # {"schema_version": 1}
//!     counter                # Highest id ever assigned
//!     notes/
//!       1.json
//!       2.json
//!   tags_db/
//!     .lock
//!     meta.json
//!     tags.json              # [{"tag_name": "work", "num_notes": 0}, ...]
//! ```

mod fsutil;
mod notes;
mod tags;

use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::info;

use noteworthy_core::Error;

pub use notes::FilesNoteStore;
pub use tags::FilesTagStore;

pub const NOTES_DB_DIR: &str = "notes_db";
pub const TAGS_DB_DIR: &str = "tags_db";

/// Opens each database directory at most once and hands out shared handles.
pub struct FilesConnections {
    root: PathBuf,
    notes: OnceCell<Rc<FilesNoteStore>>,
    tags: OnceCell<Rc<FilesTagStore>>,
}

impl FilesConnections {
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

    pub fn open_note_database(&self) -> Result<Rc<FilesNoteStore>, Error> {
        if let Some(store) = self.notes.get() {
            return Ok(Rc::clone(store));
        }
        let path = self.root.join(NOTES_DB_DIR);
        let store = Rc::new(FilesNoteStore::open(&path)?);
        info!(path = %path.display(), "opened notes database");
        Ok(Rc::clone(self.notes.get_or_init(|| store)))
    }

    pub fn open_tag_database(&self) -> Result<Rc<FilesTagStore>, Error> {
        if let Some(store) = self.tags.get() {
            return Ok(Rc::clone(store));
        }
        let path = self.root.join(TAGS_DB_DIR);
        let store = Rc::new(FilesTagStore::open(&path)?);
        info!(path = %path.display(), "opened tags database");
        Ok(Rc::clone(self.tags.get_or_init(|| store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteworthy_core::{NoteDraft, NoteStore, NoteworthyService, SaveNote, Tag, TagStore};
    use serde_json::json;
    use std::thread;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FilesConnections) {
        let temp_dir = TempDir::new().unwrap();
        let conns = FilesConnections::new(temp_dir.path());
        (temp_dir, conns)
    }

    fn record(title: &str, tags: &[&str]) -> SaveNote {
        SaveNote {
            uuid: None,
            title: title.to_string(),
            last_modified: "3/14/2024 at 9:05 AM".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            content: json!({ "ops": [{ "insert": "body\n" }] }),
            html_content: "<p>body</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_and_get_note() {
        let (_temp, conns) = setup();
        let db = conns.open_note_database().unwrap();

        let saved = record("Test note", &["tag1", "tag2"]);
        let id = db.save_note(saved.clone()).await.unwrap();
        assert_eq!(id, 1);

        let note = db.get_note(id).await.unwrap().unwrap();
        assert_eq!(note, saved.into_note(id));
    }

    #[tokio::test]
    async fn test_ids_increase_after_delete() {
        let (_temp, conns) = setup();
        let db = conns.open_note_database().unwrap();

        let a = db.save_note(record("a", &[])).await.unwrap();
        let b = db.save_note(record("b", &[])).await.unwrap();
        assert!(db.delete_note(b).await.unwrap());
        let c = db.save_note(record("c", &[])).await.unwrap();

        assert!(c > b && b > a);
    }

    #[tokio::test]
    async fn test_corrupt_counter_never_reuses_ids() {
        let (temp, conns) = setup();
        let db = conns.open_note_database().unwrap();

        let first = db.save_note(record("first", &[])).await.unwrap();
        std::fs::write(temp.path().join(NOTES_DB_DIR).join("counter"), "garbage").unwrap();
        let second = db.save_note(record("second", &[])).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(db.get_note(first).await.unwrap().unwrap().title, "first");
        assert_eq!(db.get_note(second).await.unwrap().unwrap().title, "second");
        assert_eq!(db.list_notes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let (_temp, conns) = setup();
        let db = conns.open_note_database().unwrap();

        let id = db.save_note(record("Original", &["old"])).await.unwrap();
        let mut replacement = record("Updated", &["new"]);
        replacement.uuid = Some(id);
        db.save_note(replacement).await.unwrap();

        let note = db.get_note(id).await.unwrap().unwrap();
        assert_eq!(note.title, "Updated");
        assert_eq!(note.tags, vec!["new"]);
        assert_eq!(db.list_notes().await.unwrap().len(), 1);

        assert!(db.delete_note(id).await.unwrap());
        assert!(db.get_note(id).await.unwrap().is_none());
        assert!(!db.delete_note(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_tags_seeded_once() {
        let (temp, conns) = setup();
        let tags = conns.open_tag_database().unwrap();

        let mut all = tags.list_tags().await.unwrap();
        all.sort_by(|a, b| a.tag_name.cmp(&b.tag_name));
        assert_eq!(
            all,
            vec![
                Tag::new("personal"),
                Tag::new("projects"),
                Tag::new("school"),
                Tag::new("work"),
            ]
        );

        tags.delete_tag("work").await.unwrap();
        let reopened = FilesTagStore::open(temp.path().join(TAGS_DB_DIR)).unwrap();
        assert!(reopened.get_tag("work").await.unwrap().is_none());
        assert_eq!(reopened.list_tags().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_tag_save_and_adjust() {
        let (_temp, conns) = setup();
        let tags = conns.open_tag_database().unwrap();

        assert!(matches!(
            tags.save_tag(&Tag::new("work"), true).await,
            Err(Error::KeyCollision(_))
        ));
        tags.save_tag(&Tag::new("urgent"), true).await.unwrap();

        let change = tags.adjust_tag_count("urgent", 2, false).await.unwrap().unwrap();
        assert_eq!(change.tag.num_notes, 2);
        let change = tags.adjust_tag_count("urgent", -3, false).await.unwrap().unwrap();
        assert_eq!(change.tag.num_notes, 0);
        assert!(change.clamped);

        assert!(tags.adjust_tag_count("missing", -1, true).await.unwrap().is_none());
        assert!(tags.get_tag("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connections_are_memoized() {
        let (_temp, conns) = setup();
        let a = conns.open_tag_database().unwrap();
        let b = conns.open_tag_database().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        let c = conns.open_note_database().unwrap();
        let d = conns.open_note_database().unwrap();
        assert!(Rc::ptr_eq(&c, &d));
    }

    #[tokio::test]
    async fn test_unavailable_storage() {
        let (temp, _conns) = setup();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let conns = FilesConnections::new(&blocker);
        assert!(matches!(
            conns.open_note_database(),
            Err(Error::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_increments_from_threads() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join(TAGS_DB_DIR);
        FilesTagStore::open(&root).unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let root = root.clone();
                thread::spawn(move || {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .build()
                        .unwrap();
                    rt.block_on(async {
                        let tags = FilesTagStore::open(&root).unwrap();
                        tags.adjust_tag_count("work", 1, true).await.unwrap();
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tags = FilesTagStore::open(&root).unwrap();
        assert_eq!(tags.get_tag("work").await.unwrap().unwrap().num_notes, 10);
    }

    #[tokio::test]
    async fn test_service_over_files() {
        let (_temp, conns) = setup();
        let svc = NoteworthyService::new(
            conns.open_note_database().unwrap(),
            conns.open_tag_database().unwrap(),
        );

        let id = svc
            .save_note(NoteDraft {
                title: "Work Plan".into(),
                tags: vec!["work".into(), "urgent".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        svc.set_note_tag(id, "school", true).await.unwrap();
        svc.set_note_tag(id, "work", false).await.unwrap();

        assert_eq!(svc.get_tag("urgent").await.unwrap().unwrap().num_notes, 1);
        assert_eq!(svc.get_tag("school").await.unwrap().unwrap().num_notes, 1);
        assert_eq!(svc.get_tag("work").await.unwrap().unwrap().num_notes, 0);
        assert!(svc.verify_tag_counts().await.unwrap().is_empty());

        svc.delete_note(id).await.unwrap();
        assert!(svc.verify_tag_counts().await.unwrap().is_empty());
    }
}
