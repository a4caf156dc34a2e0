use library_store::database::{SqliteLibraryRepository, establish_pool};
use library_store::models::AuthorName;
use library_store::repositories::LibraryRepository;
use sqlx::SqlitePool;
use tempfile::TempDir;

pub struct TestStore {
    pub pool: SqlitePool,
    pub repo: SqliteLibraryRepository,
    _dir: TempDir,
}

pub async fn open_store() -> TestStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = format!("sqlite://{}/library.db", dir.path().display());
    let pool = establish_pool(&url, 5).await.expect("open database");

    TestStore {
        repo: SqliteLibraryRepository::new(pool.clone()),
        pool,
        _dir: dir,
    }
}

pub async fn register_author(repo: &SqliteLibraryRepository, name: &str) -> i64 {
    let name = AuthorName::new(name).expect("valid author name");
    repo.register_author(&name)
        .await
        .expect("register author")
        .id()
}
