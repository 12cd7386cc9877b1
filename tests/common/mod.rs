use std::path::{Path, PathBuf};

use marquee::{database::DatabaseRepository, memory::MemoryRepository, repository::MovieRepository};
use tempfile::TempDir;

pub fn catalogue_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data/movies.csv")
}

pub async fn memory_repo() -> MemoryRepository {
    let repo = MemoryRepository::new();
    repo.populate(&catalogue_path()).await.unwrap();
    repo
}

/// A populated database repository on a throwaway SQLite file. The file lives
/// as long as this value.
pub struct TempDatabase {
    pub repo: DatabaseRepository,
    _dir: TempDir,
}

pub async fn empty_database_repo() -> TempDatabase {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("catalogue.db").display());
    let repo = DatabaseRepository::connect(&url).await.unwrap();
    TempDatabase { repo, _dir: dir }
}

pub async fn database_repo() -> TempDatabase {
    let db = empty_database_repo().await;
    db.repo.populate(&catalogue_path()).await.unwrap();
    db
}
