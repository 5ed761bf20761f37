use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};

use noteworthy_core::{
    Confirm, Error, Note, NoteDraft, NoteStore, NoteworthyService, SearchFields, SortDirection,
    TagStore,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new store in the current directory (or --dir)
    Init {
        /// Delete existing databases and reinitialize
        #[arg(long)]
        reinitialize: bool,
    },
    /// Add a new note
    Add {
        /// Note title
        #[arg(long)]
        title: String,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
        /// Note text (reads from stdin if not provided)
        #[arg(long)]
        content: Option<String>,
    },
    /// Edit a note
    Edit {
        /// Note ID
        id: i64,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// New text (reads from stdin if not provided and stdin is not a tty)
        #[arg(long)]
        content: Option<String>,
    },
    /// Show one or more notes
    Show {
        /// Comma-separated note IDs
        ids: String,
    },
    /// List notes
    Ls {
        /// Sort key
        #[arg(long, value_enum, default_value = "time")]
        sort: SortKey,
        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        order: String,
        /// Only notes carrying any of these comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Search notes by text
    Search {
        /// Text to look for, case-insensitive
        query: String,
        /// Comma-separated fields to search: title, time, content
        #[arg(long, default_value = "title,time,content")]
        fields: String,
    },
    /// Duplicate a note
    Cp {
        /// Note ID
        id: i64,
    },
    /// Delete one or more notes
    Rm {
        /// Comma-separated note IDs
        ids: String,
    },
    /// Check or uncheck a tag on a note
    Tag {
        /// Note ID
        id: i64,
        /// Tag name
        name: String,
        /// Remove the tag instead of adding it
        #[arg(long)]
        off: bool,
    },
    /// List all tags
    Tags,
    /// Create a tag with no notes
    TagNew {
        /// Tag name
        name: String,
    },
    /// Delete a tag and remove it from every note
    TagRm {
        /// Tag name
        name: String,
    },
    /// Import a plain text file as a new note
    Import {
        /// Path to a .txt file
        file: PathBuf,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// Check tag counters against the notes
    Doctor {
        /// Rewrite counters that drifted
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    Title,
    Time,
}

pub fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn parse_ids(ids: &str) -> Result<Vec<i64>> {
    ids.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().context(format!("Invalid note ID: {}", s)))
        .collect()
}

pub fn parse_fields(fields: &str) -> Result<SearchFields> {
    let mut selected = SearchFields {
        title: false,
        last_modified: false,
        content: false,
    };
    for field in parse_tags(fields) {
        match field.to_ascii_lowercase().as_str() {
            "title" => selected.title = true,
            "time" | "date" => selected.last_modified = true,
            "content" | "text" => selected.content = true,
            other => bail!("Unknown search field: {}", other),
        }
    }
    Ok(selected)
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read from stdin")?;
    Ok(buf)
}

fn is_stdin_tty() -> bool {
    atty::is(atty::Stream::Stdin)
}

fn summary_line(note: &Note) -> String {
    let preview: String = note.plain_text().split_whitespace().collect::<Vec<_>>().join(" ");
    let preview: String = preview.chars().take(60).collect();
    let tags = if note.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", note.tags.join(","))
    };
    format!(
        "{}: {} ({}){} -- {}",
        note.uuid, note.title, note.last_modified, tags, preview
    )
}

/// Execute a command against an opened service. `init` is handled by the caller.
pub async fn run<N, T>(
    service: &NoteworthyService<N, T>,
    command: Commands,
    confirm: &dyn Confirm,
) -> Result<()>
where
    N: NoteStore,
    T: TagStore,
{
    match command {
        Commands::Init { .. } => bail!("init must be handled before opening the store"),

        Commands::Add {
            title,
            tags,
            content,
        } => {
            let content = match content {
                Some(c) => c,
                None => read_stdin()?,
            };
            let draft = NoteDraft::from_text(title, &content, parse_tags(&tags));
            let id = service.save_note(draft).await?;
            println!("Added note {}", id);
        }

        Commands::Edit {
            id,
            title,
            tags,
            content,
        } => {
            let content = if content.is_none() && !is_stdin_tty() {
                Some(read_stdin()?)
            } else {
                content
            };

            let mut updated_fields = Vec::new();
            if title.is_some() {
                updated_fields.push("title");
            }
            if tags.is_some() {
                updated_fields.push("tags");
            }
            if content.is_some() {
                updated_fields.push("content");
            }
            if updated_fields.is_empty() {
                bail!("Nothing to update");
            }

            let Some(note) = service.get_note(id).await? else {
                bail!("Note {} not found", id);
            };
            let mut draft = note.into_draft();
            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(tags) = tags {
                draft.tags = parse_tags(&tags);
            }
            if let Some(content) = content {
                let body = NoteDraft::from_text("", &content, Vec::new());
                draft.content = body.content;
                draft.html_content = body.html_content;
            }

            service.save_note(draft).await?;
            println!("Edited note {}: Updated {}", id, updated_fields.join(", "));
        }

        Commands::Show { ids } => {
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                bail!("No note IDs provided");
            }

            let mut not_found = Vec::new();
            let mut first = true;
            for id in ids {
                let Some(note) = service.get_note(id).await? else {
                    not_found.push(id);
                    continue;
                };
                if !first {
                    println!("\n{}\n", "=".repeat(40));
                }
                first = false;

                println!("# {}\n", note.title);
                println!("{}", note.plain_text().trim_end());
                println!("\n---\n");
                println!("Last modified: {}", note.last_modified);
                println!("Tags: {}", note.tags.join(","));
            }

            if !not_found.is_empty() {
                let ids: Vec<String> = not_found.iter().map(|id| id.to_string()).collect();
                bail!("Note(s) not found: {}", ids.join(", "));
            }
        }

        Commands::Ls { sort, order, tags } => {
            let direction: SortDirection = order.parse()?;
            let notes = match sort {
                SortKey::Time => service.notes_by_time(direction).await?,
                SortKey::Title => service.notes_by_title(direction).await?,
            };
            let notes = match tags {
                Some(tags) => noteworthy_core::query::filter_by_tags(notes, &parse_tags(&tags)),
                None => notes,
            };
            for note in &notes {
                println!("{}", summary_line(note));
            }
        }

        Commands::Search { query, fields } => {
            let fields = parse_fields(&fields)?;
            let notes = service.search(&query, fields).await?;
            let notes = noteworthy_core::query::sort_by_last_modified(
                notes,
                SortDirection::Descending,
            );
            for note in &notes {
                println!("{}", summary_line(note));
            }
        }

        Commands::Cp { id } => {
            let new_id = service.copy_note(id).await?;
            println!("Copied note {} to {}", id, new_id);
        }

        Commands::Rm { ids } => {
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                bail!("No note IDs provided");
            }
            let listed: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            if !confirm
                .confirm(&format!("Delete note(s) {}?", listed.join(", ")))
                .await
            {
                println!("Cancelled");
                return Ok(());
            }

            let mut not_found = Vec::new();
            for id in ids {
                if service.delete_note(id).await? {
                    println!("Deleted note {}", id);
                } else {
                    not_found.push(id.to_string());
                }
            }
            if !not_found.is_empty() {
                bail!("Note(s) not found: {}", not_found.join(", "));
            }
        }

        Commands::Tag { id, name, off } => {
            let changed = service.set_note_tag(id, &name, !off).await?;
            match (changed, off) {
                (true, false) => println!("Tagged note {} with {}", id, name),
                (true, true) => println!("Removed {} from note {}", name, id),
                (false, false) => println!("Note {} already has {}", id, name),
                (false, true) => println!("Note {} does not have {}", id, name),
            }
        }

        Commands::Tags => {
            let mut tags = service.list_tags().await?;
            tags.sort_by(|a, b| noteworthy_core::query::compare_titles(&a.tag_name, &b.tag_name));
            for tag in tags {
                let noun = if tag.num_notes == 1 { "note" } else { "notes" };
                println!("{} ({} {})", tag.tag_name, tag.num_notes, noun);
            }
        }

        Commands::TagNew { name } => match service.create_tag(&name).await {
            Ok(tag) => println!("Created tag {}", tag.tag_name),
            Err(Error::KeyCollision(_)) => bail!("Tag {} already exists", name),
            Err(e) => return Err(e.into()),
        },

        Commands::TagRm { name } => {
            let Some(tag) = service.get_tag(&name).await? else {
                bail!("Tag {} not found", name);
            };
            let message = format!(
                "Delete tag {} and remove it from {} note(s)?",
                tag.tag_name, tag.num_notes
            );
            if !confirm.confirm(&message).await {
                println!("Cancelled");
                return Ok(());
            }
            service.delete_tag(&tag.tag_name).await?;
            println!("Deleted tag {}", tag.tag_name);
        }

        Commands::Import { file, tags } => {
            let is_txt = file
                .extension()
                .map(|e| e.eq_ignore_ascii_case("txt"))
                .unwrap_or(false);
            if !is_txt {
                bail!("Only .txt files can be imported: {}", file.display());
            }
            let text = std::fs::read_to_string(&file)
                .context(format!("Failed to read {}", file.display()))?;
            let title = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Imported note")
                .to_string();
            let id = service.import_text(&title, &text, parse_tags(&tags)).await?;
            println!("Imported {} as note {}", file.display(), id);
        }

        Commands::Doctor { repair } => {
            let mismatches = if repair {
                service.repair_tag_counts().await?
            } else {
                service.verify_tag_counts().await?
            };
            if mismatches.is_empty() {
                println!("All tag counts match");
            }
            for m in &mismatches {
                let recorded = m
                    .recorded
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "missing".to_string());
                let verb = if repair { "fixed" } else { "expected" };
                println!(
                    "{}: recorded {}, {} {}",
                    m.tag_name, recorded, verb, m.actual
                );
            }
            if !repair && !mismatches.is_empty() {
                bail!("Tag counts drifted; run 'noteworthy doctor --repair'");
            }
        }
    }

    Ok(())
}
