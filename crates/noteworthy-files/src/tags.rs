use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use noteworthy_core::{
    clamp_count, ensure_tag_key, CountChange, Error, Tag, TagStore, DEFAULT_TAGS,
    TAGS_SCHEMA_VERSION,
};

use crate::fsutil::{lock, prepare_dir, read_json, write_json, Meta};

type TagMap = BTreeMap<String, Tag>;

/// File-based tag collection: every tag in a single `tags.json`.
///
/// Writers hold the directory lock for the whole read-modify-write, so a
/// counter adjustment is atomic with respect to other writers.
pub struct FilesTagStore {
    root: PathBuf,
}

impl FilesTagStore {
    /// Open a tags database directory, creating and seeding it on first use.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        let version = prepare_dir(&root)?;
        let store = Self { root };

        if version < TAGS_SCHEMA_VERSION {
            store
                .seed()
                .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        }
        Ok(store)
    }

    fn seed(&self) -> Result<(), Error> {
        let _lock = lock(&self.root)?;
        let mut tags = self.load()?;
        for name in DEFAULT_TAGS {
            tags.entry(name.to_string()).or_insert_with(|| Tag::new(*name));
        }
        self.store(&tags)?;
        write_json(
            &self.root.join("meta.json"),
            &Meta {
                schema_version: TAGS_SCHEMA_VERSION,
            },
        )?;
        debug!(count = DEFAULT_TAGS.len(), "seeded default tags");
        Ok(())
    }

    fn tags_path(&self) -> PathBuf {
        self.root.join("tags.json")
    }

    fn load(&self) -> Result<TagMap, Error> {
        let tags: Vec<Tag> = read_json(&self.tags_path())?.unwrap_or_default();
        Ok(tags.into_iter().map(|t| (t.tag_name.clone(), t)).collect())
    }

    fn store(&self, tags: &TagMap) -> Result<(), Error> {
        let records: Vec<&Tag> = tags.values().collect();
        write_json(&self.tags_path(), &records)
    }
}

#[async_trait::async_trait(?Send)]
impl TagStore for FilesTagStore {
    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        Ok(self.load()?.into_values().collect())
    }

    async fn get_tag(&self, name: &str) -> Result<Option<Tag>, Error> {
        Ok(self.load()?.remove(name))
    }

    async fn save_tag(&self, tag: &Tag, is_new: bool) -> Result<String, Error> {
        ensure_tag_key(&tag.tag_name)?;
        let _lock = lock(&self.root)?;

        let mut tags = self.load()?;
        if is_new && tags.contains_key(&tag.tag_name) {
            return Err(Error::KeyCollision(format!(
                "tag '{}' already exists",
                tag.tag_name
            )));
        }
        tags.insert(tag.tag_name.clone(), tag.clone());
        self.store(&tags)?;

        debug!(tag = %tag.tag_name, num_notes = tag.num_notes, is_new, "saved tag record");
        Ok(tag.tag_name.clone())
    }

    async fn delete_tag(&self, name: &str) -> Result<bool, Error> {
        let _lock = lock(&self.root)?;

        let mut tags = self.load()?;
        if tags.remove(name).is_none() {
            return Ok(false);
        }
        self.store(&tags)?;
        Ok(true)
    }

    async fn adjust_tag_count(
        &self,
        name: &str,
        delta: i64,
        create_if_missing: bool,
    ) -> Result<Option<CountChange>, Error> {
        ensure_tag_key(name)?;
        let _lock = lock(&self.root)?;

        let mut tags = self.load()?;
        let change = match tags.get_mut(name) {
            Some(tag) => {
                let (num_notes, clamped) = clamp_count(tag.num_notes, delta);
                tag.num_notes = num_notes;
                CountChange {
                    tag: tag.clone(),
                    clamped,
                }
            }
            None if create_if_missing && delta > 0 => {
                let tag = Tag {
                    tag_name: name.to_string(),
                    num_notes: delta,
                };
                tags.insert(name.to_string(), tag.clone());
                CountChange {
                    tag,
                    clamped: false,
                }
            }
            None => return Ok(None),
        };
        self.store(&tags)?;

        debug!(tag = %name, delta, num_notes = change.tag.num_notes, "adjusted tag count");
        Ok(Some(change))
    }
}
