use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::note::{normalize_tags, normalize_whitespace};
use crate::query::{self, SearchFields, SortDirection};
use crate::timestamp::now_timestamp;
use crate::{Error, Note, NoteDraft, NoteStore, SaveNote, Tag, TagMismatch, TagStore};

/// Options passed explicitly to the service instead of living in global page state.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Upper bound for every individual store call. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// The main service that contains all business logic.
///
/// Notes embed their tag names; tags carry a denormalized `num_notes`. Every
/// path that changes a note's tag membership funnels through
/// [`apply_tag_delta`](Self::apply_tag_delta) so the counter tracks the
/// number of notes referencing each tag. The two stores are independent, so
/// the counter is kept consistent per operation, not atomically with the note.
///
/// Operations on an existing note hold that note's lock from the read to the
/// last counter adjustment, so there is a single writer per note id.
pub struct NoteworthyService<N: NoteStore, T: TagStore> {
    notes: N,
    tags: T,
    options: ServiceOptions,
    note_locks: RefCell<HashMap<i64, Arc<Mutex<()>>>>,
}

impl<N: NoteStore, T: TagStore> NoteworthyService<N, T> {
    pub fn new(notes: N, tags: T) -> Self {
        Self::with_options(notes, tags, ServiceOptions::default())
    }

    pub fn with_options(notes: N, tags: T, options: ServiceOptions) -> Self {
        Self {
            notes,
            tags,
            options,
            note_locks: RefCell::new(HashMap::new()),
        }
    }

    pub fn note_store(&self) -> &N {
        &self.notes
    }

    pub fn tag_store(&self) -> &T {
        &self.tags
    }

    /// Run a store call under the configured timeout.
    ///
    /// On timeout nothing is assumed about whether the underlying write landed.
    async fn timed<R, F>(&self, fut: F) -> Result<R, Error>
    where
        F: Future<Output = Result<R, Error>>,
    {
        match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// Wait for exclusive access to one note.
    async fn lock_note(&self, id: i64) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.note_locks
                .borrow_mut()
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        lock.lock_owned().await
    }

    // ---- notes ----

    /// Every note, in no particular order.
    pub async fn list_notes(&self) -> Result<Vec<Note>, Error> {
        self.timed(self.notes.list_notes()).await
    }

    pub async fn get_note(&self, id: i64) -> Result<Option<Note>, Error> {
        self.timed(self.notes.get_note(id)).await
    }

    /// Save a draft as a full record and return its id.
    ///
    /// A draft without an id is inserted. A draft with an id replaces the
    /// stored note, which must exist. Tags gained since the previous version
    /// are incremented (and created if unknown); tags lost are decremented.
    pub async fn save_note(&self, draft: NoteDraft) -> Result<i64, Error> {
        let title = normalize_whitespace(&draft.title);
        if title.is_empty() {
            return Err(Error::Validation("title cannot be empty".into()));
        }
        let tags = normalize_tags(&draft.tags);

        // A draft for an existing note must still find it under the lock; a
        // note deleted in the meantime is not re-created.
        let _guard = match draft.uuid {
            Some(id) => Some(self.lock_note(id).await),
            None => None,
        };
        let previous = match draft.uuid {
            Some(id) => self.require_note(id).await?.tags,
            None => Vec::new(),
        };

        let record = NoteDraft {
            title,
            tags: tags.clone(),
            ..draft
        }
        .stamp(now_timestamp());
        let id = self.timed(self.notes.save_note(record)).await?;

        let added = difference(&tags, &previous);
        let removed = difference(&previous, &tags);
        self.apply_tag_delta(&added, &removed).await?;

        info!(note_id = id, ?added, ?removed, "saved note");
        Ok(id)
    }

    /// Check or uncheck a single tag on a saved note.
    ///
    /// Returns false if the note already was in the requested state.
    pub async fn set_note_tag(&self, id: i64, name: &str, checked: bool) -> Result<bool, Error> {
        let name = normalize_whitespace(name);
        if name.is_empty() {
            return Err(Error::Validation("tag name cannot be empty".into()));
        }

        let _guard = self.lock_note(id).await;
        let note = self.require_note(id).await?;
        if note.has_tag(&name) == checked {
            return Ok(false);
        }

        let mut record = SaveNote::from_note(&note);
        if checked {
            record.tags.push(name.clone());
        } else {
            record.tags.retain(|t| *t != name);
        }
        record.last_modified = now_timestamp();
        self.timed(self.notes.save_note(record)).await?;

        let changed = std::slice::from_ref(&name);
        if checked {
            self.apply_tag_delta(changed, &[]).await?;
        } else {
            self.apply_tag_delta(&[], changed).await?;
        }

        info!(note_id = id, tag = %name, checked, "toggled tag");
        Ok(true)
    }

    /// Duplicate a note. The copy is a new reference to every inherited tag.
    pub async fn copy_note(&self, id: i64) -> Result<i64, Error> {
        let source = {
            let _guard = self.lock_note(id).await;
            self.require_note(id).await?
        };
        let mut record = SaveNote::from_note(&source);
        record.uuid = None;
        record.last_modified = now_timestamp();

        let new_id = self.timed(self.notes.save_note(record)).await?;
        self.apply_tag_delta(&source.tags, &[]).await?;

        info!(source_id = id, note_id = new_id, "copied note");
        Ok(new_id)
    }

    /// Delete a note and release its tag references.
    ///
    /// Deleting a missing note is a no-op that returns false.
    pub async fn delete_note(&self, id: i64) -> Result<bool, Error> {
        let _guard = self.lock_note(id).await;
        let Some(note) = self.get_note(id).await? else {
            debug!(note_id = id, "delete of missing note ignored");
            return Ok(false);
        };

        let deleted = self.timed(self.notes.delete_note(id)).await?;
        if deleted {
            self.apply_tag_delta(&[], &note.tags).await?;
            // Ids are never reused, so nothing will ask for this lock again
            // except operations already waiting on it.
            self.note_locks.borrow_mut().remove(&id);
            info!(note_id = id, tags = ?note.tags, "deleted note");
        }
        Ok(deleted)
    }

    /// Import plain text as a new note.
    pub async fn import_text(
        &self,
        title: &str,
        text: &str,
        tags: Vec<String>,
    ) -> Result<i64, Error> {
        self.save_note(NoteDraft::from_text(title, text, tags)).await
    }

    // ---- views ----

    pub async fn notes_by_time(&self, direction: SortDirection) -> Result<Vec<Note>, Error> {
        Ok(query::sort_by_last_modified(self.list_notes().await?, direction))
    }

    pub async fn notes_by_title(&self, direction: SortDirection) -> Result<Vec<Note>, Error> {
        Ok(query::sort_by_title(self.list_notes().await?, direction))
    }

    pub async fn search(&self, text: &str, fields: SearchFields) -> Result<Vec<Note>, Error> {
        Ok(query::filter_by_query(self.list_notes().await?, text, fields))
    }

    pub async fn notes_with_tags(&self, selected: &[String]) -> Result<Vec<Note>, Error> {
        Ok(query::filter_by_tags(self.list_notes().await?, selected))
    }

    // ---- tags ----

    /// Every tag, in no particular order.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        self.timed(self.tags.list_tags()).await
    }

    pub async fn get_tag(&self, name: &str) -> Result<Option<Tag>, Error> {
        self.timed(self.tags.get_tag(name)).await
    }

    /// Write a tag record directly: insert when `is_new`, otherwise replace.
    pub async fn save_tag(&self, tag: &Tag, is_new: bool) -> Result<String, Error> {
        if tag.num_notes < 0 {
            return Err(Error::Validation(format!(
                "tag '{}' cannot have a negative note count",
                tag.tag_name
            )));
        }
        self.timed(self.tags.save_tag(tag, is_new)).await
    }

    /// Add a name to the tag vocabulary with no notes.
    ///
    /// Fails with `KeyCollision` if the tag already exists. If another
    /// operation creates it between the existence check and the insert, the
    /// existing record is returned untouched.
    pub async fn create_tag(&self, name: &str) -> Result<Tag, Error> {
        let name = normalize_whitespace(name);
        if name.is_empty() {
            return Err(Error::Validation("tag name cannot be empty".into()));
        }
        if self.get_tag(&name).await?.is_some() {
            return Err(Error::KeyCollision(format!("tag '{}' already exists", name)));
        }

        let tag = Tag::new(name.clone());
        match self.timed(self.tags.save_tag(&tag, true)).await {
            Ok(_) => {
                info!(tag = %name, "created tag");
                Ok(tag)
            }
            Err(Error::KeyCollision(_)) => {
                warn!(tag = %name, "tag appeared concurrently, keeping existing record");
                self.timed(self.tags.adjust_tag_count(&name, 0, false))
                    .await?
                    .map(|change| change.tag)
                    .ok_or_else(|| Error::NotFound(format!("tag '{}'", name)))
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a tag from every note that carries it, then delete the record.
    ///
    /// Returns false if no tag record existed.
    pub async fn delete_tag(&self, name: &str) -> Result<bool, Error> {
        let name = normalize_whitespace(name);
        if name.is_empty() {
            return Err(Error::Validation("tag name cannot be empty".into()));
        }

        let notes = self.list_notes().await?;
        let mut stripped = 0;
        for id in notes.iter().filter(|n| n.has_tag(&name)).map(|n| n.uuid) {
            let _guard = self.lock_note(id).await;
            // Re-read under the lock: the note may have changed or gone.
            let Some(note) = self.get_note(id).await? else {
                continue;
            };
            if !note.has_tag(&name) {
                continue;
            }
            let mut record = SaveNote::from_note(&note);
            record.tags.retain(|t| *t != name);
            self.timed(self.notes.save_note(record)).await?;
            stripped += 1;
        }

        let deleted = self.timed(self.tags.delete_tag(&name)).await?;
        info!(tag = %name, stripped, deleted, "deleted tag");
        Ok(deleted)
    }

    /// Compare every tag counter against the notes that reference it.
    pub async fn verify_tag_counts(&self) -> Result<Vec<TagMismatch>, Error> {
        let mut actual: BTreeMap<String, i64> = BTreeMap::new();
        for note in self.list_notes().await? {
            for tag in note.tags {
                *actual.entry(tag).or_insert(0) += 1;
            }
        }

        let mut mismatches = Vec::new();
        for tag in self.list_tags().await? {
            let count = actual.remove(&tag.tag_name).unwrap_or(0);
            if count != tag.num_notes {
                mismatches.push(TagMismatch {
                    tag_name: tag.tag_name,
                    recorded: Some(tag.num_notes),
                    actual: count,
                });
            }
        }
        mismatches.extend(actual.into_iter().map(|(tag_name, actual)| TagMismatch {
            tag_name,
            recorded: None,
            actual,
        }));
        mismatches.sort_by(|a, b| a.tag_name.cmp(&b.tag_name));
        Ok(mismatches)
    }

    /// Recompute counters from the notes and rewrite every tag that drifted.
    ///
    /// Returns the mismatches that were fixed.
    pub async fn repair_tag_counts(&self) -> Result<Vec<TagMismatch>, Error> {
        let mismatches = self.verify_tag_counts().await?;
        for m in &mismatches {
            let tag = Tag {
                tag_name: m.tag_name.clone(),
                num_notes: m.actual,
            };
            match self.timed(self.tags.save_tag(&tag, m.recorded.is_none())).await {
                Ok(_) => {}
                Err(Error::KeyCollision(_)) => {
                    self.timed(self.tags.save_tag(&tag, false)).await?;
                }
                Err(e) => return Err(e),
            }
            warn!(
                tag = %m.tag_name,
                recorded = ?m.recorded,
                actual = m.actual,
                "repaired tag count"
            );
        }
        Ok(mismatches)
    }

    // ---- internals ----

    async fn require_note(&self, id: i64) -> Result<Note, Error> {
        self.get_note(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))
    }

    /// The single place where tag counters follow note membership changes.
    ///
    /// Each adjustment is an atomic read-modify-write inside the tag store, so
    /// concurrent saves touching the same tag never lose an update.
    async fn apply_tag_delta(&self, added: &[String], removed: &[String]) -> Result<(), Error> {
        for name in added {
            let change = self
                .timed(self.tags.adjust_tag_count(name, 1, true))
                .await?;
            if let Some(change) = change {
                debug!(tag = %name, num_notes = change.tag.num_notes, "incremented tag");
            }
        }

        for name in removed {
            match self.timed(self.tags.adjust_tag_count(name, -1, false)).await? {
                Some(change) if change.clamped => {
                    warn!(tag = %name, "tag count would go negative, clamped at zero");
                }
                Some(change) => {
                    debug!(tag = %name, num_notes = change.tag.num_notes, "decremented tag");
                }
                None => {
                    warn!(tag = %name, "decrement of unknown tag ignored");
                }
            }
        }
        Ok(())
    }
}

/// Items of `a` not present in `b`, in `a`'s order.
fn difference(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|x| !b.contains(x)).cloned().collect()
}
