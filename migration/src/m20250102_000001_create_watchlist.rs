use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WatchlistMovies::Table)
                    .if_not_exists()
                    .col(pk_auto(WatchlistMovies::Id))
                    .col(integer(WatchlistMovies::UserId))
                    .col(integer(WatchlistMovies::MovieId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_watchlist_movies_user")
                            .from(WatchlistMovies::Table, WatchlistMovies::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_watchlist_movies_movie")
                            .from(WatchlistMovies::Table, WatchlistMovies::MovieId)
                            .to(Movies::Table, Movies::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_watchlist_movies_unique")
                    .table(WatchlistMovies::Table)
                    .col(WatchlistMovies::UserId)
                    .col(WatchlistMovies::MovieId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(WatchlistMovies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum WatchlistMovies {
    Table,
    Id,
    UserId,
    MovieId,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Id,
}
