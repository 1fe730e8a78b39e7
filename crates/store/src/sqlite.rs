//! SQLite backend.
//!
//! One database file with four tables:
//! - `authors` - personas, keyed by name, optionally addressable by contact
//! - `sources` - books, keyed by (author, title), ordered by `position`
//! - `conversations` - the current context of each conversation, with its
//!   messages as a JSON array
//! - `messages` - append-only log of every message
//!
//! A finished turn is written in one transaction.

use async_trait::async_trait;
use authorchat_core::error::StoreError;
use authorchat_core::message::{ConversationContext, ConversationId, Message};
use authorchat_core::source::{Author, ContentSource};
use authorchat_core::store::{ContentSourceStore, ConversationStore};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::Catalog;

/// A production SQLite backend.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to ":memory:" would otherwise see its own database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "authors table",
                r#"
                CREATE TABLE IF NOT EXISTS authors (
                    name               TEXT PRIMARY KEY,
                    contact            TEXT UNIQUE,
                    conversation_style TEXT NOT NULL DEFAULT 'null',
                    bio                TEXT,
                    metadata           TEXT NOT NULL DEFAULT '{}'
                )
                "#,
            ),
            (
                "sources table",
                r#"
                CREATE TABLE IF NOT EXISTS sources (
                    author           TEXT NOT NULL REFERENCES authors(name) ON DELETE CASCADE,
                    title            TEXT NOT NULL,
                    content          TEXT NOT NULL,
                    publication_year INTEGER,
                    metadata         TEXT NOT NULL DEFAULT '{}',
                    position         INTEGER NOT NULL,
                    PRIMARY KEY (author, title)
                )
                "#,
            ),
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id           TEXT PRIMARY KEY,
                    user_id      TEXT NOT NULL,
                    author_id    TEXT NOT NULL,
                    messages     TEXT NOT NULL DEFAULT '[]',
                    created_at   TEXT NOT NULL,
                    last_updated TEXT NOT NULL,
                    metadata     TEXT NOT NULL DEFAULT '{}'
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id              TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL,
                    kind            TEXT NOT NULL,
                    sender_id       TEXT NOT NULL,
                    recipient_id    TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    timestamp       TEXT NOT NULL,
                    metadata        TEXT NOT NULL DEFAULT '{}'
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, timestamp)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Number of rows in the message log for one conversation.
    pub async fn message_count(&self, id: &ConversationId) -> Result<usize, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?1")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("COUNT messages: {e}")))?;
        Ok(count as usize)
    }

    fn row_to_author(row: &SqliteRow) -> Result<Author, StoreError> {
        let style: String = column(row, "conversation_style")?;
        let metadata: String = column(row, "metadata")?;
        Ok(Author {
            name: column(row, "name")?,
            contact: column(row, "contact")?,
            sources: Vec::new(),
            conversation_style: from_json(&style, "conversation_style")?,
            bio: column(row, "bio")?,
            metadata: from_json(&metadata, "author metadata")?,
        })
    }

    fn row_to_source(row: &SqliteRow) -> Result<ContentSource, StoreError> {
        let metadata: String = column(row, "metadata")?;
        Ok(ContentSource {
            title: column(row, "title")?,
            content: column(row, "content")?,
            author: column(row, "author")?,
            publication_year: column(row, "publication_year")?,
            metadata: from_json(&metadata, "source metadata")?,
        })
    }

    fn row_to_context(row: &SqliteRow) -> Result<ConversationContext, StoreError> {
        let id: String = column(row, "id")?;
        let messages: String = column(row, "messages")?;
        let metadata: String = column(row, "metadata")?;
        let created_at: String = column(row, "created_at")?;
        let last_updated: String = column(row, "last_updated")?;
        Ok(ConversationContext {
            id: ConversationId(id),
            user_id: column(row, "user_id")?,
            author_id: column(row, "author_id")?,
            messages: from_json(&messages, "conversation messages")?,
            created_at: parse_time(&created_at)?,
            last_updated: parse_time(&last_updated)?,
            metadata: from_json(&metadata, "conversation metadata")?,
        })
    }

    async fn sources_for(&self, author: &str) -> Result<Vec<ContentSource>, StoreError> {
        let rows = sqlx::query("SELECT * FROM sources WHERE author = ?1 ORDER BY position")
            .bind(author)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT sources: {e}")))?;
        rows.iter().map(Self::row_to_source).collect()
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{what}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|e| StoreError::Storage(format!("{what} serialization: {e}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

/// Insert one message-log row inside `executor`'s scope.
async fn insert_message<'e, E>(executor: E, message: &Message) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let metadata = to_json(&message.metadata, "message metadata")?;
    sqlx::query(
        r#"
        INSERT INTO messages (id, conversation_id, kind, sender_id, recipient_id, content, timestamp, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&message.id)
    .bind(message.conversation_id.as_str())
    .bind(message.kind.as_str())
    .bind(&message.sender_id)
    .bind(&message.recipient_id)
    .bind(&message.content)
    .bind(message.timestamp.to_rfc3339())
    .bind(metadata)
    .execute(executor)
    .await
    .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;
    Ok(())
}

/// Overwrite a conversation row inside `executor`'s scope.
async fn update_conversation<'e, E>(
    executor: E,
    context: &ConversationContext,
) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let messages = to_json(&context.messages, "conversation messages")?;
    let metadata = to_json(&context.metadata, "conversation metadata")?;
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET user_id = ?2, author_id = ?3, messages = ?4, last_updated = ?5, metadata = ?6
        WHERE id = ?1
        "#,
    )
    .bind(context.id.as_str())
    .bind(&context.user_id)
    .bind(&context.author_id)
    .bind(messages)
    .bind(context.last_updated.to_rfc3339())
    .bind(metadata)
    .execute(executor)
    .await
    .map_err(|e| StoreError::Storage(format!("UPDATE conversation failed: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            kind: "conversation",
            id: context.id.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ContentSourceStore for SqliteStore {
    async fn list_sources(&self, author: &str) -> Result<Vec<ContentSource>, StoreError> {
        self.sources_for(author).await
    }

    async fn get_author(&self, identifier: &str) -> Result<Option<Author>, StoreError> {
        // An exact name match wins over a contact match
        let row = sqlx::query(
            "SELECT * FROM authors WHERE name = ?1 OR contact = ?1 ORDER BY (name = ?1) DESC LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT author: {e}")))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_author(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<ConversationContext>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT conversation: {e}")))?;

        row.as_ref().map(Self::row_to_context).transpose()
    }

    async fn create(&self, context: &ConversationContext) -> Result<(), StoreError> {
        let messages = to_json(&context.messages, "conversation messages")?;
        let metadata = to_json(&context.metadata, "conversation metadata")?;
        let result = sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, author_id, messages, created_at, last_updated, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(context.id.as_str())
        .bind(&context.user_id)
        .bind(&context.author_id)
        .bind(messages)
        .bind(context.created_at.to_rfc3339())
        .bind(context.last_updated.to_rfc3339())
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT conversation failed: {e}")))?;

        if result.rows_affected() == 0 {
            debug!(conversation_id = %context.id, "Conversation already exists");
        }
        Ok(())
    }

    async fn replace(&self, context: &ConversationContext) -> Result<(), StoreError> {
        update_conversation(&self.pool, context).await
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        insert_message(&self.pool, message).await
    }

    async fn commit_turn(
        &self,
        context: &ConversationContext,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        for message in messages {
            insert_message(&mut *tx, message).await?;
        }
        update_conversation(&mut *tx, context).await?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(conversation_id = %context.id, messages = messages.len(), "Turn committed");
        Ok(())
    }
}

#[async_trait]
impl Catalog for SqliteStore {
    async fn upsert_author(&self, author: &Author) -> Result<(), StoreError> {
        let style = to_json(&author.conversation_style, "conversation_style")?;
        let metadata = to_json(&author.metadata, "author metadata")?;
        sqlx::query(
            r#"
            INSERT INTO authors (name, contact, conversation_style, bio, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO UPDATE SET
                contact = excluded.contact,
                conversation_style = excluded.conversation_style,
                bio = excluded.bio,
                metadata = excluded.metadata
            "#,
        )
        .bind(&author.name)
        .bind(&author.contact)
        .bind(style)
        .bind(&author.bio)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT author failed: {e}")))?;
        Ok(())
    }

    async fn upsert_source(&self, source: &ContentSource) -> Result<(), StoreError> {
        let exists: Option<String> = sqlx::query_scalar("SELECT name FROM authors WHERE name = ?1")
            .bind(&source.author)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT author: {e}")))?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                kind: "author",
                id: source.author.clone(),
            });
        }

        let metadata = to_json(&source.metadata, "source metadata")?;
        sqlx::query(
            r#"
            INSERT INTO sources (author, title, content, publication_year, metadata, position)
            VALUES (?1, ?2, ?3, ?4, ?5,
                    (SELECT COALESCE(MAX(position), -1) + 1 FROM sources WHERE author = ?1))
            ON CONFLICT(author, title) DO UPDATE SET
                content = excluded.content,
                publication_year = excluded.publication_year,
                metadata = excluded.metadata
            "#,
        )
        .bind(&source.author)
        .bind(&source.title)
        .bind(&source.content)
        .bind(source.publication_year)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT source failed: {e}")))?;
        Ok(())
    }

    async fn list_authors(&self) -> Result<Vec<Author>, StoreError> {
        let rows = sqlx::query("SELECT * FROM authors ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT authors: {e}")))?;

        let mut authors = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut author = Self::row_to_author(row)?;
            author.sources = self.sources_for(&author.name).await?;
            authors.push(author);
        }
        Ok(authors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    async fn seeded_store() -> SqliteStore {
        let store = test_store().await;
        let mut author = Author::new("Zizek");
        author.contact = Some("+14155238886".into());
        author.conversation_style = serde_json::json!({"tone": "provocative"});
        author.bio = Some("Slovenian philosopher".into());
        store.upsert_author(&author).await.unwrap();

        let mut first = ContentSource::new("Zizek", "The Sublime Object of Ideology", "ideology");
        first.publication_year = Some(1989);
        store.upsert_source(&first).await.unwrap();
        store
            .upsert_source(&ContentSource::new("Zizek", "Less Than Nothing", "hegel"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn author_roundtrip_with_sources_in_order() {
        let store = seeded_store().await;
        let author = store.get_author("Zizek").await.unwrap().unwrap();

        assert_eq!(author.contact.as_deref(), Some("+14155238886"));
        assert_eq!(author.bio.as_deref(), Some("Slovenian philosopher"));
        assert_eq!(author.conversation_style["tone"], "provocative");
        // book text is only read through list_sources
        assert!(author.sources.is_empty());

        let sources = store.list_sources("Zizek").await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "The Sublime Object of Ideology");
        assert_eq!(sources[0].publication_year, Some(1989));
        assert_eq!(sources[1].title, "Less Than Nothing");
    }

    #[tokio::test]
    async fn get_author_by_contact() {
        let store = seeded_store().await;
        let author = store.get_author("+14155238886").await.unwrap().unwrap();
        assert_eq!(author.name, "Zizek");
        assert!(store.get_author("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_source_keeps_position() {
        let store = seeded_store().await;
        store
            .upsert_source(&ContentSource::new(
                "Zizek",
                "The Sublime Object of Ideology",
                "revised",
            ))
            .await
            .unwrap();

        let sources = store.list_sources("Zizek").await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].content, "revised");
        assert_eq!(sources[0].publication_year, None);
    }

    #[tokio::test]
    async fn upsert_source_for_unknown_author_fails() {
        let store = test_store().await;
        let result = store
            .upsert_source(&ContentSource::new("Ghost", "Book", "text"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { kind: "author", .. })));
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let store = test_store().await;
        let id = ConversationId::between("+1555user", "+1555author");
        let ctx = ConversationContext::new(id, "+1555user", "Zizek");
        store.create(&ctx).await.unwrap();

        let fetched = store.get(&ctx.id).await.unwrap().unwrap();
        assert_eq!(fetched, ctx);
        assert!(store.get(&ConversationId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_keeps_first() {
        let store = test_store().await;
        let id = ConversationId::between("u", "a");
        let first = ConversationContext::new(id.clone(), "u", "A");
        let second = ConversationContext::new(id.clone(), "u", "Someone Else");

        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        assert_eq!(store.get(&id).await.unwrap().unwrap().author_id, "A");
    }

    #[tokio::test]
    async fn replace_unknown_is_not_found() {
        let store = test_store().await;
        let ctx = ConversationContext::new(ConversationId::from("x:y"), "x", "Y");
        assert!(matches!(
            store.replace(&ctx).await,
            Err(StoreError::NotFound { kind: "conversation", .. })
        ));
    }

    #[tokio::test]
    async fn commit_turn_persists_context_and_log() {
        let store = test_store().await;
        let ctx = ConversationContext::new(ConversationId::between("u", "a"), "u", "A");
        store.create(&ctx).await.unwrap();

        let user = Message::user("What is ideology?", "u", "a");
        let reply = Message::author("Ideology is what you do not see.", "a", "u", ctx.id.clone());
        let next = ctx.with_turn(user.clone(), reply.clone());
        store.commit_turn(&next, &[user, reply]).await.unwrap();

        let fetched = store.get(&ctx.id).await.unwrap().unwrap();
        assert_eq!(fetched, next);
        assert_eq!(store.message_count(&ctx.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_messages() {
        let store = test_store().await;
        let ctx = ConversationContext::new(ConversationId::between("u", "a"), "u", "A");
        // never created: the UPDATE inside the transaction finds no row
        let user = Message::user("hi", "u", "a");
        let reply = Message::author("hello there", "a", "u", ctx.id.clone());
        let next = ctx.with_turn(user.clone(), reply.clone());

        assert!(store.commit_turn(&next, &[user, reply]).await.is_err());
        assert_eq!(store.message_count(&ctx.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_authors_sorted() {
        let store = seeded_store().await;
        store.upsert_author(&Author::new("Arendt")).await.unwrap();
        let authors = store.list_authors().await.unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].name, "Arendt");
        assert_eq!(authors[1].sources.len(), 2);
    }
}
