//! `authorchat provision`: Load authors and books into the store.
//!
//! Authors come from flags plus an optional JSON file:
//!
//! ```json
//! { "bio": "...", "contact": "+14155238886",
//!   "conversation_style": { "tone": "provocative" },
//!   "author_metadata": { "born": 1949 } }
//! ```
//!
//! Books are the `.txt` and `.md` files of a directory, titled by file
//! stem. An optional JSON file adds `books.<title>.publication_year` and
//! `books.<title>.metadata`. Both operations upsert.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use authorchat_config::AppConfig;
use authorchat_core::source::{Author, ContentSource};
use authorchat_store::Catalog;
use clap::Subcommand;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Subcommand)]
pub enum ProvisionCommand {
    /// Create or update an author
    Author {
        /// Author name (primary key)
        #[arg(short, long)]
        name: String,

        /// Messaging address the persona answers on
        #[arg(long)]
        contact: Option<String>,

        /// Short biography
        #[arg(short, long)]
        bio: Option<String>,

        /// JSON file with conversation_style, bio, author_metadata, contact
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },

    /// Load every .txt/.md file in a directory as a book
    Books {
        /// Owning author's name
        #[arg(short, long)]
        author: String,

        /// Directory of book texts
        #[arg(short, long)]
        dir: PathBuf,

        /// JSON file with per-book publication_year and metadata
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },

    /// List authors and their books
    List,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorFile {
    #[serde(default)]
    conversation_style: serde_json::Value,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    author_metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct BooksFile {
    #[serde(default)]
    books: HashMap<String, BookMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct BookMeta {
    #[serde(default)]
    publication_year: Option<i32>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("Invalid JSON in {}: {e}", path.display()).into())
}

pub async fn run(
    config: AppConfig,
    command: ProvisionCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let stores = authorchat_store::open(&config.store).await?;
    let catalog = stores.catalog.as_ref();

    match command {
        ProvisionCommand::Author {
            name,
            contact,
            bio,
            metadata,
        } => {
            let file = match metadata {
                Some(path) => read_json(&path)?,
                None => AuthorFile::default(),
            };
            let author = provision_author(catalog, &name, contact, bio, file).await?;
            println!("Author '{}' saved", author.name);
            if let Some(contact) = &author.contact {
                println!("   Contact: {contact}");
            }
        }
        ProvisionCommand::Books { author, dir, metadata } => {
            let file = match metadata {
                Some(path) => read_json(&path)?,
                None => BooksFile::default(),
            };
            let count = provision_books(catalog, &author, &dir, file).await?;
            println!("Loaded {count} book(s) for '{author}'");
        }
        ProvisionCommand::List => {
            let authors = catalog.list_authors().await?;
            if authors.is_empty() {
                println!("No authors provisioned yet");
            }
            for author in authors {
                let contact = author.contact.as_deref().unwrap_or("-");
                println!("{} ({contact})", author.name);
                for book in &author.sources {
                    match book.publication_year {
                        Some(year) => println!("   - {} ({year})", book.title),
                        None => println!("   - {}", book.title),
                    }
                }
            }
        }
    }
    Ok(())
}

async fn provision_author(
    catalog: &dyn Catalog,
    name: &str,
    contact: Option<String>,
    bio: Option<String>,
    file: AuthorFile,
) -> Result<Author, Box<dyn std::error::Error>> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Author name must not be empty".into());
    }

    let mut author = Author::new(name);
    author.contact = contact.or(file.contact).map(|c| c.trim().to_string());
    author.bio = bio.or(file.bio).filter(|b| !b.trim().is_empty());
    author.conversation_style = file.conversation_style;
    author.metadata = file.author_metadata;

    catalog.upsert_author(&author).await?;
    info!(author = %author.name, "Author provisioned");
    Ok(author)
}

async fn provision_books(
    catalog: &dyn Catalog,
    author: &str,
    dir: &Path,
    mut file: BooksFile,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| format!("Cannot read {}: {e}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| matches!(ext, "txt" | "md"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(format!("No .txt or .md files found in {}", dir.display()).into());
    }

    let mut loaded = 0;
    for path in &paths {
        let Some(title) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
        if content.trim().is_empty() {
            warn!(title, "Skipping empty book");
            continue;
        }

        let mut book = ContentSource::new(author, title, content);
        if let Some(meta) = file.books.remove(title) {
            book.publication_year = meta.publication_year;
            book.metadata = meta.metadata;
        }

        catalog.upsert_source(&book).await?;
        info!(author, title, chars = book.content.chars().count(), "Book provisioned");
        loaded += 1;
    }

    if loaded == 0 {
        return Err(format!("Every book in {} was empty", dir.display()).into());
    }
    Ok(loaded)
}
