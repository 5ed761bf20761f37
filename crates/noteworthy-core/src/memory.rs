//! In-memory stores for exercising the service without an engine.
//!
//! Every call yields to the executor first, so concurrent operations
//! interleave the way they would against a real asynchronous engine.
//! Counter adjustments also suspend between their read and their write,
//! behind a write lock standing in for an engine transaction.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::db::{clamp_count, ensure_tag_key};
use crate::migrations::DEFAULT_TAGS;
use crate::{CountChange, Error, Note, NoteStore, SaveNote, Tag, TagStore};

#[derive(Default)]
pub struct MemoryNotes {
    notes: RefCell<BTreeMap<i64, Note>>,
    next_id: Cell<i64>,
}

pub struct MemoryTags {
    tags: RefCell<BTreeMap<String, Tag>>,
    delay: Option<Duration>,
    write_lock: tokio::sync::Mutex<()>,
}

impl MemoryTags {
    pub fn seeded() -> Self {
        let tags = DEFAULT_TAGS
            .iter()
            .map(|name| (name.to_string(), Tag::new(*name)))
            .collect();
        Self {
            tags: RefCell::new(tags),
            delay: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Every call sleeps for `delay` before touching the map.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::seeded()
        }
    }

    /// Overwrite a counter behind the service's back.
    pub fn force_count(&self, name: &str, num_notes: i64) {
        self.tags.borrow_mut().insert(
            name.to_string(),
            Tag {
                tag_name: name.to_string(),
                num_notes,
            },
        );
    }

    async fn suspend(&self) {
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl NoteStore for MemoryNotes {
    async fn list_notes(&self) -> Result<Vec<Note>, Error> {
        tokio::task::yield_now().await;
        Ok(self.notes.borrow().values().cloned().collect())
    }

    async fn get_note(&self, id: i64) -> Result<Option<Note>, Error> {
        tokio::task::yield_now().await;
        Ok(self.notes.borrow().get(&id).cloned())
    }

    async fn save_note(&self, note: SaveNote) -> Result<i64, Error> {
        tokio::task::yield_now().await;
        let id = match note.uuid {
            Some(id) => id,
            None => {
                let id = self.next_id.get() + 1;
                self.next_id.set(id);
                id
            }
        };
        self.notes.borrow_mut().insert(id, note.into_note(id));
        Ok(id)
    }

    async fn delete_note(&self, id: i64) -> Result<bool, Error> {
        tokio::task::yield_now().await;
        Ok(self.notes.borrow_mut().remove(&id).is_some())
    }
}

#[async_trait::async_trait(?Send)]
impl TagStore for MemoryTags {
    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        self.suspend().await;
        Ok(self.tags.borrow().values().cloned().collect())
    }

    async fn get_tag(&self, name: &str) -> Result<Option<Tag>, Error> {
        self.suspend().await;
        Ok(self.tags.borrow().get(name).cloned())
    }

    async fn save_tag(&self, tag: &Tag, is_new: bool) -> Result<String, Error> {
        ensure_tag_key(&tag.tag_name)?;
        let _tx = self.write_lock.lock().await;
        self.suspend().await;
        let mut tags = self.tags.borrow_mut();
        if is_new && tags.contains_key(&tag.tag_name) {
            return Err(Error::KeyCollision(tag.tag_name.clone()));
        }
        tags.insert(tag.tag_name.clone(), tag.clone());
        Ok(tag.tag_name.clone())
    }

    async fn delete_tag(&self, name: &str) -> Result<bool, Error> {
        let _tx = self.write_lock.lock().await;
        self.suspend().await;
        Ok(self.tags.borrow_mut().remove(name).is_some())
    }

    async fn adjust_tag_count(
        &self,
        name: &str,
        delta: i64,
        create_if_missing: bool,
    ) -> Result<Option<CountChange>, Error> {
        ensure_tag_key(name)?;
        let _tx = self.write_lock.lock().await;

        let current = self.tags.borrow().get(name).map(|t| t.num_notes);
        self.suspend().await;

        let change = match current {
            Some(current) => {
                let (num_notes, clamped) = clamp_count(current, delta);
                CountChange {
                    tag: Tag {
                        tag_name: name.to_string(),
                        num_notes,
                    },
                    clamped,
                }
            }
            None if create_if_missing && delta > 0 => CountChange {
                tag: Tag {
                    tag_name: name.to_string(),
                    num_notes: delta,
                },
                clamped: false,
            },
            None => return Ok(None),
        };
        self.tags
            .borrow_mut()
            .insert(name.to_string(), change.tag.clone());
        Ok(Some(change))
    }
}
