mod common;

use common::{open_store, register_author};
use library_store::models::StoreError;
use library_store::repositories::LibraryRepository;
use sqlx::SqlitePool;
use std::collections::HashSet;

async fn link_rows(pool: &SqlitePool, book_id: i64) -> Vec<i64> {
    sqlx::query_scalar("SELECT author_id FROM author_book WHERE book_id = ? ORDER BY author_id")
        .bind(book_id)
        .fetch_all(pool)
        .await
        .expect("read link rows")
}

async fn book_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM book")
        .fetch_one(pool)
        .await
        .expect("count books")
}

fn id_set(ids: &[i64]) -> HashSet<i64> {
    ids.iter().copied().collect()
}

#[tokio::test]
async fn add_book_collapses_duplicate_authors() {
    let store = open_store().await;

    let a = register_author(&store.repo, "First Author").await;
    let b = register_author(&store.repo, "Second Author").await;

    let book = store.repo.add_book("Jointly Written", &[a, b, a]).await.unwrap();

    assert!(book.id() > 0);
    assert_eq!(book.name(), "Jointly Written");
    assert_eq!(id_set(book.author_ids()), HashSet::from([a, b]));
    assert!(book.created_at() <= book.updated_at());

    let mut expected = vec![a, b];
    expected.sort_unstable();
    assert_eq!(link_rows(&store.pool, book.id()).await, expected);
}

#[tokio::test]
async fn add_book_with_unknown_author_leaves_no_orphan_book() {
    let store = open_store().await;

    let a = register_author(&store.repo, "Existing Author").await;

    match store.repo.add_book("Ghost Written", &[a, 9999]).await {
        Err(StoreError::AuthorNotFound) => {}
        other => panic!("expected AuthorNotFound, got {other:?}"),
    }

    assert_eq!(book_count(&store.pool).await, 0);
}

#[tokio::test]
async fn add_book_without_authors_reads_back_with_empty_set() {
    let store = open_store().await;

    let book = store.repo.add_book("Anonymous Pamphlet", &[]).await.unwrap();
    let fetched = store.repo.get_book(book.id()).await.unwrap();

    assert_eq!(fetched.name(), "Anonymous Pamphlet");
    assert!(fetched.author_ids().is_empty());
}

#[tokio::test]
async fn get_book_unknown_id_is_not_found() {
    let store = open_store().await;

    match store.repo.get_book(4242).await {
        Err(StoreError::BookNotFound) => {}
        other => panic!("expected BookNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn update_book_reconciles_link_rows() {
    let store = open_store().await;

    let a = register_author(&store.repo, "Author A").await;
    let b = register_author(&store.repo, "Author B").await;
    let c = register_author(&store.repo, "Author C").await;

    let book = store.repo.add_book("First Edition", &[a, b]).await.unwrap();
    store
        .repo
        .update_book(book.id(), "Second Edition", &[b, c])
        .await
        .unwrap();

    let fetched = store.repo.get_book(book.id()).await.unwrap();
    assert_eq!(fetched.name(), "Second Edition");
    assert_eq!(id_set(fetched.author_ids()), HashSet::from([b, c]));

    let mut expected = vec![b, c];
    expected.sort_unstable();
    assert_eq!(link_rows(&store.pool, book.id()).await, expected);
}

#[tokio::test]
async fn update_book_is_idempotent() {
    let store = open_store().await;

    let a = register_author(&store.repo, "Author A").await;
    let b = register_author(&store.repo, "Author B").await;

    let book = store.repo.add_book("Draft", &[a]).await.unwrap();
    store.repo.update_book(book.id(), "Final", &[a, b]).await.unwrap();
    store.repo.update_book(book.id(), "Final", &[a, b]).await.unwrap();

    let mut expected = vec![a, b];
    expected.sort_unstable();
    assert_eq!(link_rows(&store.pool, book.id()).await, expected);
}

#[tokio::test]
async fn update_book_with_unchanged_set_is_a_noop() {
    let store = open_store().await;

    let a = register_author(&store.repo, "Only Author").await;
    let book = store.repo.add_book("Stable", &[a]).await.unwrap();

    store.repo.update_book(book.id(), "Stable", &[a]).await.unwrap();

    assert_eq!(link_rows(&store.pool, book.id()).await, vec![a]);
}

#[tokio::test]
async fn update_book_unknown_id_is_not_found() {
    let store = open_store().await;

    let a = register_author(&store.repo, "Author A").await;

    match store.repo.update_book(4242, "Renamed", &[a]).await {
        Err(StoreError::BookNotFound) => {}
        other => panic!("expected BookNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn update_book_with_unknown_author_rolls_the_whole_update_back() {
    let store = open_store().await;

    let a = register_author(&store.repo, "Author A").await;
    let book = store.repo.add_book("Original", &[a]).await.unwrap();

    match store.repo.update_book(book.id(), "Tampered", &[a, 9999]).await {
        Err(StoreError::AuthorNotFound) => {}
        other => panic!("expected AuthorNotFound, got {other:?}"),
    }

    let fetched = store.repo.get_book(book.id()).await.unwrap();
    assert_eq!(fetched.name(), "Original");
    assert_eq!(link_rows(&store.pool, book.id()).await, vec![a]);
}

#[tokio::test]
async fn concurrent_add_books_with_disjoint_authors_both_commit() {
    let store = open_store().await;

    let a = register_author(&store.repo, "Author A").await;
    let b = register_author(&store.repo, "Author B").await;

    let left_authors = [a];
    let right_authors = [b];
    let (first, second) = tokio::join!(
        store.repo.add_book("Left", &left_authors),
        store.repo.add_book("Right", &right_authors),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(link_rows(&store.pool, first.id()).await, vec![a]);
    assert_eq!(link_rows(&store.pool, second.id()).await, vec![b]);
}
