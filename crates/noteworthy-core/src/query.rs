//! In-memory sorting and filtering over a full note snapshot.
//!
//! Stores return notes in no particular order, so every view sorts here.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::note::{content_text, normalize_whitespace};
use crate::timestamp::parse_timestamp;
use crate::{Error, Note};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(Error::Validation(format!(
                "unknown sort direction '{}' (expected asc or desc)",
                other
            ))),
        }
    }
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Which note fields a text query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchFields {
    pub title: bool,
    pub last_modified: bool,
    pub content: bool,
}

impl Default for SearchFields {
    fn default() -> Self {
        Self {
            title: true,
            last_modified: true,
            content: true,
        }
    }
}

/// Sort by the parsed `lastModified` instant. Stable; ties keep input order.
///
/// Timestamps that cannot be parsed sort before all others when ascending.
pub fn sort_by_last_modified(notes: Vec<Note>, direction: SortDirection) -> Vec<Note> {
    let mut keyed: Vec<_> = notes
        .into_iter()
        .map(|n| (parse_timestamp(&n.last_modified), n))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| direction.apply(a.cmp(b)));
    keyed.into_iter().map(|(_, n)| n).collect()
}

/// Sort by title with a locale-style comparison.
pub fn sort_by_title(mut notes: Vec<Note>, direction: SortDirection) -> Vec<Note> {
    notes.sort_by(|a, b| direction.apply(compare_titles(&a.title, &b.title)));
    notes
}

/// Case-insensitive substring search. Whitespace in the query is collapsed.
///
/// A note matches if any enabled field contains the query.
pub fn filter_by_query(notes: Vec<Note>, query: &str, fields: SearchFields) -> Vec<Note> {
    let needle = normalize_whitespace(&query.to_lowercase());
    if needle.is_empty() {
        return notes;
    }

    notes
        .into_iter()
        .filter(|note| {
            (fields.title && note.title.to_lowercase().contains(&needle))
                || (fields.content
                    && normalize_whitespace(&content_text(&note.content).to_lowercase())
                        .contains(&needle))
                || (fields.last_modified && searchable_timestamp(&note.last_modified).contains(&needle))
        })
        .collect()
}

/// Notes carrying any of the selected tags. An empty selection keeps everything.
pub fn filter_by_tags(notes: Vec<Note>, selected: &[String]) -> Vec<Note> {
    if selected.is_empty() {
        return notes;
    }
    notes
        .into_iter()
        .filter(|note| note.tags.iter().any(|t| selected.contains(t)))
        .collect()
}

/// Case-folded comparison; on a fold tie lowercase sorts first, then raw order.
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| {
            a.chars()
                .zip(b.chars())
                .find(|(x, y)| x != y)
                .map(|(x, y)| match (x.is_lowercase(), y.is_lowercase()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => x.cmp(&y),
                })
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.cmp(b))
}

fn searchable_timestamp(last_modified: &str) -> String {
    normalize_whitespace(&last_modified.replacen(" at ", " ", 1)).to_lowercase()
}
