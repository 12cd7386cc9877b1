use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_movies_order")
                    .table(Movies::Table)
                    .col(Movies::SortTitle)
                    .col(Movies::Year)
                    .col(Movies::Title)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_first_letter")
                    .table(Movies::Table)
                    .col(Movies::FirstLetter)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movie_genres_genre")
                    .table(MovieGenres::Table)
                    .col(MovieGenres::GenreId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movie_actors_actor")
                    .table(MovieActors::Table)
                    .col(MovieActors::ActorId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop().name("idx_movie_actors_actor").table(MovieActors::Table).to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop().name("idx_movie_genres_genre").table(MovieGenres::Table).to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop().name("idx_movies_first_letter").table(Movies::Table).to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_movies_order").table(Movies::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Title,
    Year,
    FirstLetter,
    SortTitle,
}

#[derive(DeriveIden)]
enum MovieGenres {
    Table,
    GenreId,
}

#[derive(DeriveIden)]
enum MovieActors {
    Table,
    ActorId,
}
