use crate::models::{Book, StoreError};
use anyhow::anyhow;
use futures::Stream;
use sqlx::{Sqlite, Transaction};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Rows fetched per round trip. The channel shares this capacity, so a slow
/// consumer stalls the fetch loop instead of growing a buffer.
const PAGE_SIZE: usize = 10;

const PAGE_QUERY: &str = "SELECT b.id, b.name, b.created_at, b.updated_at, \
            group_concat(ab.author_id) AS author_ids \
     FROM book b \
     JOIN author_book ab ON ab.book_id = b.id \
     WHERE b.id IN (SELECT book_id FROM author_book WHERE author_id = ?) \
       AND b.id > ? \
     GROUP BY b.id \
     ORDER BY b.id \
     LIMIT ?";

/// Lazy sequence of one author's books, fed by a background worker that owns a
/// read transaction for the whole traversal. Finite and not restartable; drop
/// it to cancel the traversal early.
pub struct BookStream {
    rows: mpsc::Receiver<Result<Book, StoreError>>,
}

impl BookStream {
    pub(crate) fn spawn(tx: Transaction<'static, Sqlite>, author_id: i64) -> Self {
        let (out, rows) = mpsc::channel(PAGE_SIZE);
        tokio::spawn(fetch_pages(tx, author_id, out));

        Self { rows }
    }
}

impl Stream for BookStream {
    type Item = Result<Book, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rows.poll_recv(cx)
    }
}

/// The worker releases the transaction on every exit: commit once a page comes
/// back empty, rollback when the consumer is gone or a fetch fails. Dropping
/// the sender is what ends the stream.
async fn fetch_pages(
    mut tx: Transaction<'static, Sqlite>,
    author_id: i64,
    out: mpsc::Sender<Result<Book, StoreError>>,
) {
    let mut last_id = 0_i64;

    loop {
        let page: Vec<Book> = match sqlx::query_as(PAGE_QUERY)
            .bind(author_id)
            .bind(last_id)
            .bind(PAGE_SIZE as i64)
            .fetch_all(&mut *tx)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                error!(author_id, error = %err, "fetching books page failed");
                let classified = StoreError::Internal(
                    anyhow!(err).context(format!("Failed to fetch books of author {author_id}")),
                );
                let _ = out.send(Err(classified)).await;
                rollback(tx, author_id).await;
                return;
            }
        };

        if page.is_empty() {
            if let Err(err) = tx.commit().await {
                warn!(author_id, error = %err, "commit after draining book stream failed");
            }
            return;
        }

        for book in page {
            last_id = book.id();
            if out.send(Ok(book)).await.is_err() {
                // Consumer dropped the stream mid-traversal.
                rollback(tx, author_id).await;
                return;
            }
        }
    }
}

async fn rollback(tx: Transaction<'static, Sqlite>, author_id: i64) {
    if let Err(err) = tx.rollback().await {
        warn!(author_id, error = %err, "rollback of book stream transaction failed");
    }
}
