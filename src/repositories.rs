use crate::models::{Author, AuthorName, Book, StoreError};
use crate::stream::BookStream;
use async_trait::async_trait;

#[async_trait]
pub trait LibraryRepository: Send + Sync + 'static {
    async fn register_author(&self, name: &AuthorName) -> Result<Author, StoreError>;

    async fn change_author_info(&self, id: i64, new_name: &AuthorName) -> Result<(), StoreError>;

    async fn get_author_info(&self, id: i64) -> Result<Author, StoreError>;

    /// Creates the book and its author links in one transaction; a failed link
    /// insert discards the book row. Duplicate ids in `author_ids` collapse to
    /// a set.
    async fn add_book(&self, name: &str, author_ids: &[i64]) -> Result<Book, StoreError>;

    /// Renames the book and reconciles its link rows against `new_author_ids`.
    ///
    /// The reconciliation reads the current links and then writes the diff, so
    /// two concurrent updates of the same book can lose one of the writes.
    /// Callers that need strict consistency must serialize updates per book id.
    async fn update_book(
        &self,
        id: i64,
        new_name: &str,
        new_author_ids: &[i64],
    ) -> Result<(), StoreError>;

    async fn get_book(&self, id: i64) -> Result<Book, StoreError>;

    /// Streams every book linked to the author, fetched page by page inside a
    /// dedicated read transaction. Dropping the stream cancels the fetch and
    /// releases the transaction.
    async fn get_author_books(&self, author_id: i64) -> Result<BookStream, StoreError>;
}
