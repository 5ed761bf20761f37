use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use noteworthy_core::{Error, Note, NoteStore, SaveNote, NOTES_SCHEMA_VERSION};

use crate::fsutil::{lock, prepare_dir, read_json, write_json, Meta};

/// File-based note collection: one JSON file per note.
pub struct FilesNoteStore {
    root: PathBuf,
}

impl FilesNoteStore {
    /// Open a notes database directory, creating its layout if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        let version = prepare_dir(&root)?;

        fs::create_dir_all(root.join("notes")).map_err(|e| {
            Error::StorageUnavailable(format!("failed to create notes dir: {}", e))
        })?;

        if version < NOTES_SCHEMA_VERSION {
            let _lock = lock(&root).map_err(|e| Error::StorageUnavailable(e.to_string()))?;
            write_json(
                &root.join("meta.json"),
                &Meta {
                    schema_version: NOTES_SCHEMA_VERSION,
                },
            )
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        }

        Ok(Self { root })
    }

    fn note_path(&self, id: i64) -> PathBuf {
        self.root.join("notes").join(format!("{}.json", id))
    }

    /// Get the next available note ID.
    /// Uses a counter file so IDs always increase, even after deletions.
    /// The result is also kept above every id already on disk.
    fn next_id(&self) -> Result<i64, Error> {
        let existing_max = self.list_note_ids()?.into_iter().max().unwrap_or(0);
        let current_max = self.read_counter()?.unwrap_or(0).max(existing_max);

        let next_id = current_max + 1;
        self.write_counter(next_id)?;
        Ok(next_id)
    }

    /// Keep the counter ahead of any id written explicitly.
    fn bump_counter(&self, id: i64) -> Result<(), Error> {
        match self.read_counter()? {
            Some(current) if current >= id => Ok(()),
            _ => self.write_counter(id),
        }
    }

    /// The stored counter. `None` when the file is missing or unreadable as
    /// a number; callers then fall back to the ids on disk.
    fn read_counter(&self) -> Result<Option<i64>, Error> {
        let counter_path = self.root.join("counter");
        let contents = match fs::read_to_string(&counter_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Transient(format!("failed to read counter: {}", e))),
        };
        match contents.trim().parse::<i64>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(path = %counter_path.display(), error = %e, "counter file is corrupt, rebuilding from note ids");
                Ok(None)
            }
        }
    }

    fn write_counter(&self, value: i64) -> Result<(), Error> {
        fs::write(self.root.join("counter"), value.to_string())
            .map_err(|e| Error::Transient(format!("failed to write counter: {}", e)))
    }

    fn list_note_ids(&self) -> Result<Vec<i64>, Error> {
        let entries = fs::read_dir(self.root.join("notes"))
            .map_err(|e| Error::Transient(format!("failed to read notes dir: {}", e)))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::Transient(format!("failed to read dir entry: {}", e)))?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(id) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<i64>().ok())
                {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}

#[async_trait::async_trait(?Send)]
impl NoteStore for FilesNoteStore {
    async fn list_notes(&self) -> Result<Vec<Note>, Error> {
        let mut notes = Vec::new();
        for id in self.list_note_ids()? {
            // A note deleted between the scan and the read is skipped.
            if let Some(note) = read_json::<Note>(&self.note_path(id))? {
                notes.push(note);
            }
        }
        debug!(count = notes.len(), "listed notes");
        Ok(notes)
    }

    async fn get_note(&self, id: i64) -> Result<Option<Note>, Error> {
        read_json(&self.note_path(id))
    }

    async fn save_note(&self, note: SaveNote) -> Result<i64, Error> {
        let _lock = lock(&self.root)?;

        let id = match note.uuid {
            Some(id) => {
                self.bump_counter(id)?;
                id
            }
            None => self.next_id()?,
        };
        write_json(&self.note_path(id), &note.into_note(id))?;

        debug!(note_id = id, "saved note file");
        Ok(id)
    }

    async fn delete_note(&self, id: i64) -> Result<bool, Error> {
        let _lock = lock(&self.root)?;

        let path = self.note_path(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| Error::Transient(format!("failed to delete note: {}", e)))?;

        debug!(note_id = id, "deleted note file");
        Ok(true)
    }
}
