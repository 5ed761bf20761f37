use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A saved note. Only notes that have been saved at least once have a `uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub uuid: i64,
    pub title: String,
    /// Human-readable timestamp, `M/D/YYYY at H:MM AM|PM`.
    #[serde(rename = "lastModified")]
    pub last_modified: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque rich-text document, usually a delta of the form `{"ops": [...]}`.
    #[serde(default)]
    pub content: Value,
    /// Rendered HTML cached alongside `content`.
    #[serde(rename = "htmlContent", default)]
    pub html_content: String,
}

/// A full note record handed to a store. `uuid: None` means insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveNote {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uuid: Option<i64>,
    pub title: String,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(rename = "htmlContent", default)]
    pub html_content: String,
}

/// What the editor hands over on save. The timestamp is stamped by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteDraft {
    pub uuid: Option<i64>,
    pub title: String,
    pub tags: Vec<String>,
    pub content: Value,
    pub html_content: String,
}

/// A tag record, keyed by its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_name: String,
    pub num_notes: i64,
}

/// Result of an atomic counter adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountChange {
    pub tag: Tag,
    /// True when the requested decrement would have gone below zero.
    pub clamped: bool,
}

/// A tag whose stored counter disagrees with the notes that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagMismatch {
    pub tag_name: String,
    /// `None` when notes reference a tag that has no record.
    pub recorded: Option<i64>,
    pub actual: i64,
}

impl Tag {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            num_notes: 0,
        }
    }
}

impl Note {
    /// Turn a stored note back into an editable draft, keeping its id.
    pub fn into_draft(self) -> NoteDraft {
        NoteDraft {
            uuid: Some(self.uuid),
            title: self.title,
            tags: self.tags,
            content: self.content,
            html_content: self.html_content,
        }
    }

    /// Plain text of the rich-text content.
    pub fn plain_text(&self) -> String {
        content_text(&self.content)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }
}

impl SaveNote {
    pub fn from_note(note: &Note) -> Self {
        Self {
            uuid: Some(note.uuid),
            title: note.title.clone(),
            last_modified: note.last_modified.clone(),
            tags: note.tags.clone(),
            content: note.content.clone(),
            html_content: note.html_content.clone(),
        }
    }

    pub fn into_note(self, uuid: i64) -> Note {
        Note {
            uuid,
            title: self.title,
            last_modified: self.last_modified,
            tags: self.tags,
            content: self.content,
            html_content: self.html_content,
        }
    }
}

impl NoteDraft {
    /// Build a draft from plain text, as the `.txt` importer does.
    pub fn from_text(title: impl Into<String>, text: &str, tags: Vec<String>) -> Self {
        Self {
            uuid: None,
            title: title.into(),
            tags,
            content: text_to_delta(text),
            html_content: text_to_html(text),
        }
    }

    pub(crate) fn stamp(self, last_modified: String) -> SaveNote {
        SaveNote {
            uuid: self.uuid,
            title: self.title,
            last_modified,
            tags: self.tags,
            content: self.content,
            html_content: self.html_content,
        }
    }
}

/// Collapse runs of whitespace to a single space and trim both ends.
pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a tag list: collapse whitespace, drop empties, dedup keeping first occurrence.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = normalize_whitespace(tag.as_ref());
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Extract plain text from a content value.
///
/// Deltas contribute every string `insert`; embeds (images, formulas) are skipped.
/// A bare JSON string is taken as-is.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("ops") {
            Some(Value::Array(ops)) => ops
                .iter()
                .filter_map(|op| op.get("insert").and_then(Value::as_str))
                .collect(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

fn text_to_delta(text: &str) -> Value {
    let mut insert = text.to_string();
    if !insert.ends_with('\n') {
        insert.push('\n');
    }
    serde_json::json!({ "ops": [{ "insert": insert }] })
}

fn text_to_html(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                "<p><br></p>".to_string()
            } else {
                format!("<p>{}</p>", escape_html(line))
            }
        })
        .collect()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
