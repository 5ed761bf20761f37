//! Embedded schema migrations for the two NoteWorthy databases.
//!
//! The notes and tags databases are independent and versioned separately.
//! Each keeps its schema version in a `_meta` table. Migrations only ever add.

/// Current schema version of the notes database.
pub const NOTES_SCHEMA_VERSION: i64 = 1;

/// Current schema version of the tags database.
pub const TAGS_SCHEMA_VERSION: i64 = 1;

/// Tags present in every freshly created tags database.
pub const DEFAULT_TAGS: &[&str] = &["work", "projects", "personal", "school"];

/// A database migration with version number and SQL statements.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const NOTES_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "notes_initial_schema",
    statements: &[
        "CREATE TABLE IF NOT EXISTS notes (
            uuid INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            last_modified TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            content TEXT NOT NULL DEFAULT 'null',
            html_content TEXT NOT NULL DEFAULT ''
        )",
    ],
}];

pub const TAGS_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "tags_initial_schema",
    statements: &[
        "CREATE TABLE IF NOT EXISTS tags (
            tag_name TEXT PRIMARY KEY NOT NULL CHECK (length(tag_name) > 0),
            num_notes INTEGER NOT NULL DEFAULT 0 CHECK (num_notes >= 0)
        )",
        "INSERT OR IGNORE INTO tags (tag_name, num_notes) VALUES
            ('work', 0), ('projects', 0), ('personal', 0), ('school', 0)",
    ],
}];

/// Get migrations that need to be applied given the current version.
pub fn get_pending_migrations(
    migrations: &'static [Migration],
    current_version: i64,
) -> Vec<&'static Migration> {
    migrations
        .iter()
        .filter(|m| m.version > current_version)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_match_last_migration() {
        assert_eq!(NOTES_MIGRATIONS.last().unwrap().version, NOTES_SCHEMA_VERSION);
        assert_eq!(TAGS_MIGRATIONS.last().unwrap().version, TAGS_SCHEMA_VERSION);
    }

    #[test]
    fn test_pending_migrations() {
        assert_eq!(get_pending_migrations(TAGS_MIGRATIONS, 0).len(), 1);
        assert!(get_pending_migrations(TAGS_MIGRATIONS, TAGS_SCHEMA_VERSION).is_empty());
    }

    #[test]
    fn test_seed_statement_covers_default_tags() {
        let seed = TAGS_MIGRATIONS[0].statements[1];
        for tag in DEFAULT_TAGS {
            assert!(seed.contains(&format!("'{}'", tag)));
        }
    }
}
