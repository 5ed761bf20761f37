use std::rc::Rc;

use crate::{CountChange, Error, Note, SaveNote, Tag};

/// The note collection, keyed by `uuid`.
///
/// Uses `async_trait` with `?Send`: storage is driven from a single-threaded
/// cooperative executor and handles are shared through `Rc`.
#[async_trait::async_trait(?Send)]
pub trait NoteStore {
    /// Every note. No ordering is guaranteed; callers sort explicitly.
    async fn list_notes(&self) -> Result<Vec<Note>, Error>;

    /// Point lookup by id.
    async fn get_note(&self, id: i64) -> Result<Option<Note>, Error>;

    /// Insert when `note.uuid` is `None` (a fresh id is assigned and returned),
    /// otherwise overwrite the whole record under that id.
    async fn save_note(&self, note: SaveNote) -> Result<i64, Error>;

    /// Delete a note. Returns false if it did not exist.
    async fn delete_note(&self, id: i64) -> Result<bool, Error>;
}

/// The tag collection, keyed by `tag_name`.
#[async_trait::async_trait(?Send)]
pub trait TagStore {
    /// Every tag. No ordering is guaranteed.
    async fn list_tags(&self) -> Result<Vec<Tag>, Error>;

    async fn get_tag(&self, name: &str) -> Result<Option<Tag>, Error>;

    /// Insert when `is_new` (fails with `KeyCollision` if the name exists),
    /// otherwise overwrite the whole record.
    async fn save_tag(&self, tag: &Tag, is_new: bool) -> Result<String, Error>;

    /// Delete a tag. Returns false if it did not exist.
    async fn delete_tag(&self, name: &str) -> Result<bool, Error>;

    /// Add `delta` to a tag's counter inside a single engine transaction.
    ///
    /// The counter never goes below zero; a clamped decrement is reported in
    /// the result. A missing tag is created with `num_notes = delta` when
    /// `create_if_missing` is set and `delta` is positive, otherwise `None`.
    async fn adjust_tag_count(
        &self,
        name: &str,
        delta: i64,
        create_if_missing: bool,
    ) -> Result<Option<CountChange>, Error>;
}

#[async_trait::async_trait(?Send)]
impl<S: NoteStore + ?Sized> NoteStore for Rc<S> {
    async fn list_notes(&self) -> Result<Vec<Note>, Error> {
        (**self).list_notes().await
    }

    async fn get_note(&self, id: i64) -> Result<Option<Note>, Error> {
        (**self).get_note(id).await
    }

    async fn save_note(&self, note: SaveNote) -> Result<i64, Error> {
        (**self).save_note(note).await
    }

    async fn delete_note(&self, id: i64) -> Result<bool, Error> {
        (**self).delete_note(id).await
    }
}

#[async_trait::async_trait(?Send)]
impl<S: TagStore + ?Sized> TagStore for Rc<S> {
    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        (**self).list_tags().await
    }

    async fn get_tag(&self, name: &str) -> Result<Option<Tag>, Error> {
        (**self).get_tag(name).await
    }

    async fn save_tag(&self, tag: &Tag, is_new: bool) -> Result<String, Error> {
        (**self).save_tag(tag, is_new).await
    }

    async fn delete_tag(&self, name: &str) -> Result<bool, Error> {
        (**self).delete_tag(name).await
    }

    async fn adjust_tag_count(
        &self,
        name: &str,
        delta: i64,
        create_if_missing: bool,
    ) -> Result<Option<CountChange>, Error> {
        (**self).adjust_tag_count(name, delta, create_if_missing).await
    }
}

/// Reject empty keys before they reach an engine.
pub fn ensure_tag_key(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::Validation("tag name cannot be empty".into()));
    }
    Ok(())
}

/// Compute the clamped result of applying `delta` to `current`.
pub fn clamp_count(current: i64, delta: i64) -> (i64, bool) {
    let next = current.saturating_add(delta);
    if next < 0 {
        (0, true)
    } else {
        (next, false)
    }
}
