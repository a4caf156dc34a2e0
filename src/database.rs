use crate::models::{Author, AuthorName, Book, StoreError};
use crate::repositories::LibraryRepository;
use crate::stream::BookStream;
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn establish_pool(url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database url {url}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await
        .with_context(|| format!("Failed to open database at {url}"))?;

    MIGRATOR.run(&pool).await?;

    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct SqliteLibraryRepository {
    pool: SqlitePool,
}

impl SqliteLibraryRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_book(
        tx: &mut Transaction<'static, Sqlite>,
        name: &str,
        author_ids: &BTreeSet<i64>,
    ) -> Result<Book, StoreError> {
        let (id, created_at, updated_at): (i64, DateTime<Utc>, DateTime<Utc>) =
            sqlx::query_as("INSERT INTO book (name) VALUES (?) RETURNING id, created_at, updated_at")
                .bind(name)
                .fetch_one(&mut **tx)
                .await
                .map_err(|err| internal(err, format!(r#"Failed to insert book "{name}""#)))?;

        insert_links(&mut **tx, id, author_ids).await?;

        Ok(Book::new(
            id,
            name.to_string(),
            author_ids.iter().copied().collect(),
            created_at,
            updated_at,
        ))
    }

    async fn apply_book_update(
        tx: &mut Transaction<'static, Sqlite>,
        id: i64,
        new_name: &str,
        desired: &BTreeSet<i64>,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE book SET name = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
             WHERE id = ?",
        )
        .bind(new_name)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(|err| internal(err, format!("Failed to rename book {id}")))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::BookNotFound);
        }

        let current_ids: Vec<i64> =
            sqlx::query_scalar("SELECT author_id FROM author_book WHERE book_id = ?")
                .bind(id)
                .fetch_all(&mut **tx)
                .await
                .map_err(|err| internal(err, format!("Failed to read current authors of book {id}")))?;
        let current: BTreeSet<i64> = current_ids.into_iter().collect();

        let to_remove: BTreeSet<i64> = current.difference(desired).copied().collect();
        let to_add: BTreeSet<i64> = desired.difference(&current).copied().collect();

        delete_links(&mut **tx, id, &to_remove).await?;
        insert_links(&mut **tx, id, &to_add).await?;

        Ok(())
    }
}

impl<'r> FromRow<'r, SqliteRow> for Author {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let created_at = row.try_get("created_at")?;
        let updated_at = row.try_get("updated_at")?;

        Ok(Self::new(
            id,
            AuthorName::new_unchecked(&name),
            created_at,
            updated_at,
        ))
    }
}

impl<'r> FromRow<'r, SqliteRow> for Book {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id = row.try_get("id")?;
        let name = row.try_get("name")?;
        let author_ids = parse_author_ids(row.try_get("author_ids")?).map_err(|source| {
            sqlx::Error::ColumnDecode {
                index: "author_ids".into(),
                source,
            }
        })?;
        let created_at = row.try_get("created_at")?;
        let updated_at = row.try_get("updated_at")?;

        Ok(Self::new(id, name, author_ids, created_at, updated_at))
    }
}

// group_concat yields NULL for a book with no links; that decodes to an empty
// set, never a sentinel.
fn parse_author_ids(
    raw: Option<String>,
) -> Result<Vec<i64>, Box<dyn std::error::Error + Send + Sync + 'static>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(|id| id.parse::<i64>().map_err(Into::into))
        .collect()
}

#[async_trait]
impl LibraryRepository for SqliteLibraryRepository {
    async fn register_author(&self, name: &AuthorName) -> Result<Author, StoreError> {
        let (id, created_at, updated_at): (i64, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO author (name) VALUES (?) RETURNING id, created_at, updated_at",
        )
        .bind(name.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| internal(err, format!(r#"Failed to register author "{name}""#)))?;

        Ok(Author::new(id, name.clone(), created_at, updated_at))
    }

    async fn change_author_info(&self, id: i64, new_name: &AuthorName) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE author SET name = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
             WHERE id = ?",
        )
        .bind(new_name.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|err| classify_author_error(err, format!("Failed to rename author {id}")))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::AuthorNotFound);
        }

        Ok(())
    }

    async fn get_author_info(&self, id: i64) -> Result<Author, StoreError> {
        let author = sqlx::query_as(
            "SELECT id, name, created_at, updated_at FROM author WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            classify_author_error(err, format!(r#"Failed to retrieve author with id "{id}""#))
        })?;

        Ok(author)
    }

    async fn add_book(&self, name: &str, author_ids: &[i64]) -> Result<Book, StoreError> {
        let desired: BTreeSet<i64> = author_ids.iter().copied().collect();

        let mut tx = begin(&self.pool).await?;

        let book = match Self::insert_book(&mut tx, name, &desired).await {
            Ok(book) => book,
            Err(err) => return Err(abort(tx, err).await),
        };

        commit(tx, "Failed to commit new book").await?;

        Ok(book)
    }

    async fn update_book(
        &self,
        id: i64,
        new_name: &str,
        new_author_ids: &[i64],
    ) -> Result<(), StoreError> {
        let desired: BTreeSet<i64> = new_author_ids.iter().copied().collect();

        let mut tx = begin(&self.pool).await?;

        if let Err(err) = Self::apply_book_update(&mut tx, id, new_name, &desired).await {
            return Err(abort(tx, err).await);
        }

        commit(tx, "Failed to commit book update").await
    }

    async fn get_book(&self, id: i64) -> Result<Book, StoreError> {
        let book = sqlx::query_as(
            "SELECT b.id, b.name, b.created_at, b.updated_at, \
                    group_concat(ab.author_id) AS author_ids \
             FROM book b \
             LEFT JOIN author_book ab ON b.id = ab.book_id \
             WHERE b.id = ? \
             GROUP BY b.id",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            classify_book_error(err, format!(r#"Failed to retrieve book with id "{id}""#))
        })?;

        Ok(book)
    }

    async fn get_author_books(&self, author_id: i64) -> Result<BookStream, StoreError> {
        let tx = begin(&self.pool).await?;

        Ok(BookStream::spawn(tx, author_id))
    }
}

async fn begin(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, StoreError> {
    pool.begin()
        .await
        .map_err(|err| internal(err, "Failed to begin transaction".to_string()))
}

/// Exactly one of `commit`/`abort` runs on every write path; the transaction's
/// rollback-on-drop covers the paths that never reach either.
async fn commit(tx: Transaction<'static, Sqlite>, context: &str) -> Result<(), StoreError> {
    tx.commit().await.map_err(|err| internal(err, context.to_string()))
}

/// Rolls back and hands the original error through. A rollback failure is
/// logged, never substituted for the error that aborted the write.
async fn abort(tx: Transaction<'static, Sqlite>, err: StoreError) -> StoreError {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "rollback after failed write also failed");
    }

    err
}

async fn insert_links(
    conn: &mut SqliteConnection,
    book_id: i64,
    author_ids: &BTreeSet<i64>,
) -> Result<(), StoreError> {
    if author_ids.is_empty() {
        return Ok(());
    }

    let mut insert: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO author_book (author_id, book_id) ");
    insert.push_values(author_ids, |mut row, author_id| {
        row.push_bind(*author_id).push_bind(book_id);
    });

    insert
        .build()
        .execute(conn)
        .await
        .map_err(|err| {
            classify_author_error(err, format!("Failed to link authors to book {book_id}"))
        })?;

    Ok(())
}

async fn delete_links(
    conn: &mut SqliteConnection,
    book_id: i64,
    author_ids: &BTreeSet<i64>,
) -> Result<(), StoreError> {
    if author_ids.is_empty() {
        return Ok(());
    }

    let mut delete: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM author_book WHERE book_id = ");
    delete.push_bind(book_id);
    delete.push(" AND author_id IN (");
    let mut ids = delete.separated(", ");
    for author_id in author_ids {
        ids.push_bind(*author_id);
    }
    ids.push_unseparated(")");

    delete
        .build()
        .execute(conn)
        .await
        .map_err(|err| {
            internal(err, format!("Failed to unlink authors from book {book_id}"))
        })?;

    Ok(())
}

fn classify_author_error(err: sqlx::Error, context: String) -> StoreError {
    if is_foreign_key_violation(&err) || matches!(err, sqlx::Error::RowNotFound) {
        return StoreError::AuthorNotFound;
    }

    StoreError::Internal(anyhow!(err).context(context))
}

fn classify_book_error(err: sqlx::Error, context: String) -> StoreError {
    if matches!(err, sqlx::Error::RowNotFound) {
        return StoreError::BookNotFound;
    }

    StoreError::Internal(anyhow!(err).context(context))
}

fn internal(err: sqlx::Error, context: String) -> StoreError {
    StoreError::Internal(anyhow!(err).context(context))
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.is_foreign_key_violation();
    }

    false
}
