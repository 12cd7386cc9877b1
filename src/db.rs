use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, Statement,
    TransactionTrait,
};
use tracing::debug;

use crate::error::RepositoryResult;

const PRAGMAS: [&str; 4] = [
    "PRAGMA journal_mode=WAL",
    "PRAGMA synchronous=NORMAL",
    "PRAGMA cache_size=-64000",
    "PRAGMA foreign_keys=ON",
];

/// Opens the database and brings its schema up to date.
///
/// The pool holds a single connection: SQLite serializes writers anyway, and
/// an in-memory database only exists on the connection that created it.
pub async fn connect_and_migrate(database_url: &str) -> RepositoryResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url);
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    for pragma in PRAGMAS {
        db.execute(Statement::from_string(db.get_database_backend(), pragma.to_string())).await?;
    }

    Migrator::up(&db, None).await?;
    debug!(url = database_url, "database ready");
    Ok(db)
}

/// Owns the connection and hands out units of work over it.
#[derive(Clone, Debug)]
pub struct SessionContext {
    db: DatabaseConnection,
}

impl SessionContext {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Starts a transaction. While it is open every statement must go through
    /// [`UnitOfWork::txn`]; the pool has no second connection to offer.
    pub async fn begin(&self) -> RepositoryResult<UnitOfWork> {
        Ok(UnitOfWork { txn: self.db.begin().await? })
    }
}

/// One transaction. Dropping it without calling [`commit`](Self::commit)
/// rolls every write back.
pub struct UnitOfWork {
    txn: DatabaseTransaction,
}

impl UnitOfWork {
    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> RepositoryResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> RepositoryResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{EntityTrait, PaginatorTrait, Set};

    use super::*;
    use crate::entities::genre;

    async fn session() -> SessionContext {
        SessionContext::new(connect_and_migrate("sqlite::memory:").await.unwrap())
    }

    fn horror() -> genre::ActiveModel {
        genre::ActiveModel { id: Default::default(), name: Set("Horror".to_string()) }
    }

    #[tokio::test]
    async fn committed_work_is_visible() {
        let session = session().await;
        let uow = session.begin().await.unwrap();
        genre::Entity::insert(horror()).exec(uow.txn()).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(genre::Entity::find().count(session.connection()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_work_rolls_back() {
        let session = session().await;
        {
            let uow = session.begin().await.unwrap();
            genre::Entity::insert(horror()).exec(uow.txn()).await.unwrap();
        }
        assert_eq!(genre::Entity::find().count(session.connection()).await.unwrap(), 0);

        let uow = session.begin().await.unwrap();
        genre::Entity::insert(horror()).exec(uow.txn()).await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(genre::Entity::find().count(session.connection()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        assert_eq!(Migrator::get_pending_migrations(&db).await.unwrap().len(), 0);
    }
}
