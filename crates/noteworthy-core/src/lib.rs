//! NoteWorthy core library - shared types, traits, and business logic.
//!
//! This crate contains no I/O and can be compiled for any target. Storage
//! engines implement [`NoteStore`] and [`TagStore`]; [`NoteworthyService`]
//! keeps tag counters in step with the notes that reference them.

mod confirm;
mod db;
mod error;
mod migrations;
mod note;
mod service;
pub mod query;
pub mod timestamp;

#[cfg(test)]
mod memory;

pub use confirm::{AlwaysConfirm, Confirm};
pub use db::{clamp_count, ensure_tag_key, NoteStore, TagStore};
pub use error::Error;
pub use migrations::{
    get_pending_migrations, Migration, DEFAULT_TAGS, NOTES_MIGRATIONS, NOTES_SCHEMA_VERSION,
    TAGS_MIGRATIONS, TAGS_SCHEMA_VERSION,
};
pub use note::{
    content_text, normalize_tags, normalize_whitespace, CountChange, Note, NoteDraft, SaveNote,
    Tag, TagMismatch,
};
pub use query::{SearchFields, SortDirection};
pub use service::{NoteworthyService, ServiceOptions};
pub use timestamp::{format_timestamp, now_timestamp, parse_timestamp};
