//! Relational repository over SQLite.
//!
//! Movies are stored with two derived columns, `first_letter` and `sort_title`,
//! so bucket queries and catalogue ordering happen in SQL. Every mutation runs
//! in its own [`UnitOfWork`].

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use async_trait::async_trait;
use jiff::Timestamp;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, Statement, sea_query::OnConflict,
};
use tracing::{debug, info, warn};

use crate::{
    db::{self, SessionContext, UnitOfWork},
    entities::{
        actor, director, genre, movie, movie_actor, movie_genre, review, user, watchlist_movie,
    },
    error::{RepositoryError, RepositoryResult},
    ingest,
    models::{Actor, Director, Genre, Movie, MovieId, Review, User, normalize_username},
    repository::{MovieRepository, bucket_letters, next_movie_id, review_links},
};

/// Rows per multi-row `INSERT` during bulk loading. Keeps every statement
/// below SQLite's bound-parameter limit.
const INSERT_CHUNK: usize = 200;

#[derive(Clone, Debug)]
pub struct DatabaseRepository {
    session: SessionContext,
}

impl DatabaseRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { session: SessionContext::new(db) }
    }

    pub async fn connect(database_url: &str) -> RepositoryResult<Self> {
        Ok(Self::new(db::connect_and_migrate(database_url).await?))
    }

    fn conn(&self) -> &DatabaseConnection {
        self.session.connection()
    }

    async fn begin(&self) -> RepositoryResult<UnitOfWork> {
        self.session.begin().await
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn ordered() -> Select<movie::Entity> {
    movie::Entity::find()
        .order_by_asc(movie::Column::SortTitle)
        .order_by_asc(movie::Column::Year)
        .order_by_asc(movie::Column::Title)
}

fn same_movie(movie: &Movie) -> Condition {
    let title = match movie.title() {
        Some(title) => movie::Column::Title.eq(title),
        None => movie::Column::Title.is_null(),
    };
    let year = match movie.year() {
        Some(year) => movie::Column::Year.eq(year),
        None => movie::Column::Year.is_null(),
    };
    Condition::all().add(title).add(year)
}

fn movie_row(movie: &Movie, id: MovieId, director_id: Option<i32>) -> movie::ActiveModel {
    movie::ActiveModel {
        id: Set(id),
        title: Set(movie.title().map(str::to_string)),
        year: Set(movie.year()),
        description: Set(movie.description().map(str::to_string)),
        director_id: Set(director_id),
        runtime: Set(movie.runtime_minutes().map(|minutes| minutes as i32)),
        first_letter: Set(movie.first_letter().map(String::from)),
        sort_title: Set(movie.sort_title()),
    }
}

fn letter_of(column: Option<String>) -> Option<char> {
    column.and_then(|letter| letter.chars().next())
}

async fn find_user<C: ConnectionTrait>(
    conn: &C,
    username: &str,
) -> RepositoryResult<Option<user::Model>> {
    let Some(username) = normalize_username(username) else {
        return Ok(None);
    };
    Ok(user::Entity::find().filter(user::Column::Username.eq(username)).one(conn).await?)
}

async fn find_stored_movie<C: ConnectionTrait>(
    conn: &C,
    movie: &Movie,
) -> RepositoryResult<Option<movie::Model>> {
    Ok(movie::Entity::find().filter(same_movie(movie)).one(conn).await?)
}

async fn usernames<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = i32>,
) -> RepositoryResult<HashMap<i32, String>> {
    let ids: HashSet<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = user::Entity::find().filter(user::Column::Id.is_in(ids)).all(conn).await?;
    Ok(users.into_iter().map(|u| (u.id, u.username)).collect())
}

fn restore_review(
    row: review::Model,
    usernames: &HashMap<i32, String>,
) -> RepositoryResult<Review> {
    let timestamp: Timestamp = row.timestamp.parse()?;
    Ok(Review::restore(
        usernames.get(&row.user_id).cloned(),
        row.movie_id,
        row.review,
        row.rating,
        timestamp,
    ))
}

// =============================================================================
// Hydration
// =============================================================================

/// Builds domain movies from rows with one query per related table.
async fn hydrate_movies<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<movie::Model>,
) -> RepositoryResult<Vec<Movie>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<MovieId> = rows.iter().map(|row| row.id).collect();

    let director_ids: HashSet<i32> = rows.iter().filter_map(|row| row.director_id).collect();
    let directors: HashMap<i32, String> = director::Entity::find()
        .filter(director::Column::Id.is_in(director_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|d| (d.id, d.fullname))
        .collect();

    let genre_links = movie_genre::Entity::find()
        .filter(movie_genre::Column::MovieId.is_in(ids.clone()))
        .order_by_asc(movie_genre::Column::Id)
        .all(conn)
        .await?;
    let genres: HashMap<i32, String> = genre::Entity::find()
        .filter(genre::Column::Id.is_in(genre_links.iter().map(|l| l.genre_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|g| (g.id, g.name))
        .collect();

    let actor_links = movie_actor::Entity::find()
        .filter(movie_actor::Column::MovieId.is_in(ids.clone()))
        .order_by_asc(movie_actor::Column::Id)
        .all(conn)
        .await?;
    let actors: HashMap<i32, String> = actor::Entity::find()
        .filter(actor::Column::Id.is_in(actor_links.iter().map(|l| l.actor_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|a| (a.id, a.fullname))
        .collect();

    let reviews = review::Entity::find()
        .filter(review::Column::MovieId.is_in(ids.clone()))
        .order_by_asc(review::Column::Id)
        .all(conn)
        .await?;
    let watchers = watchlist_movie::Entity::find()
        .filter(watchlist_movie::Column::MovieId.is_in(ids))
        .order_by_asc(watchlist_movie::Column::Id)
        .all(conn)
        .await?;
    let names = usernames(
        conn,
        reviews.iter().map(|r| r.user_id).chain(watchers.iter().map(|w| w.user_id)),
    )
    .await?;

    let mut movies: Vec<Movie> = Vec::with_capacity(rows.len());
    let mut position: HashMap<MovieId, usize> = HashMap::with_capacity(rows.len());
    for row in rows {
        let mut movie =
            Movie::with_id(row.id, row.title.as_deref().unwrap_or_default(), row.year.unwrap_or(0));
        if let Some(description) = &row.description {
            movie.set_description(description);
        }
        if let Some(runtime) = row.runtime {
            movie.set_runtime_minutes(runtime)?;
        }
        if let Some(name) = row.director_id.and_then(|id| directors.get(&id)) {
            movie.set_director(Director::new(name));
        }
        position.insert(row.id, movies.len());
        movies.push(movie);
    }

    for link in genre_links {
        if let (Some(&pos), Some(name)) = (position.get(&link.movie_id), genres.get(&link.genre_id))
        {
            movies[pos].add_genre(Genre::new(name));
        }
    }
    for link in actor_links {
        if let (Some(&pos), Some(name)) = (position.get(&link.movie_id), actors.get(&link.actor_id))
        {
            movies[pos].add_actor(Actor::new(name));
        }
    }
    for row in reviews {
        if let Some(&pos) = position.get(&row.movie_id) {
            let review = restore_review(row, &names)?;
            movies[pos].add_review(review);
        }
    }
    for row in watchers {
        if let (Some(&pos), Some(name)) = (position.get(&row.movie_id), names.get(&row.user_id)) {
            movies[pos].add_watcher(name);
        }
    }
    Ok(movies)
}

async fn hydrate_user<C: ConnectionTrait>(conn: &C, row: user::Model) -> RepositoryResult<User> {
    let mut user = User::new(&row.username, row.password.as_deref().unwrap_or_default());

    let own = HashMap::from([(row.id, row.username.clone())]);
    let reviews = review::Entity::find()
        .filter(review::Column::UserId.eq(row.id))
        .order_by_asc(review::Column::Id)
        .all(conn)
        .await?;
    for review in reviews {
        user.add_review(restore_review(review, &own)?);
    }

    let wanted: Vec<MovieId> = watchlist_movie::Entity::find()
        .filter(watchlist_movie::Column::UserId.eq(row.id))
        .order_by_asc(watchlist_movie::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(|link| link.movie_id)
        .collect();
    if !wanted.is_empty() {
        let rows =
            movie::Entity::find().filter(movie::Column::Id.is_in(wanted.clone())).all(conn).await?;
        let movies: HashMap<MovieId, Movie> = hydrate_movies(conn, rows)
            .await?
            .into_iter()
            .filter_map(|movie| movie.id().map(|id| (id, movie)))
            .collect();
        for id in wanted {
            if let Some(movie) = movies.get(&id) {
                user.add_to_watchlist(movie);
            }
        }
    }
    Ok(user)
}

async fn movies_by_actor<C: ConnectionTrait>(
    conn: &C,
    actor_ids: &[i32],
) -> RepositoryResult<Vec<movie_actor::Model>> {
    Ok(movie_actor::Entity::find()
        .filter(movie_actor::Column::ActorId.is_in(actor_ids.to_vec()))
        .order_by_asc(movie_actor::Column::Id)
        .all(conn)
        .await?)
}

/// Actors with their movie ids and colleagues, derived from `movie_actors` in
/// the order the links were written.
async fn hydrate_actors<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<actor::Model>,
) -> RepositoryResult<Vec<Actor>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
    let own_links = movies_by_actor(conn, &ids).await?;

    let movie_ids: HashSet<MovieId> = own_links.iter().map(|l| l.movie_id).collect();
    let cast_links = movie_actor::Entity::find()
        .filter(movie_actor::Column::MovieId.is_in(movie_ids))
        .order_by_asc(movie_actor::Column::Id)
        .all(conn)
        .await?;
    let names: HashMap<i32, String> = actor::Entity::find()
        .filter(actor::Column::Id.is_in(cast_links.iter().map(|l| l.actor_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|a| (a.id, a.fullname))
        .collect();
    let mut casts: HashMap<MovieId, Vec<&str>> = HashMap::new();
    for link in &cast_links {
        if let Some(name) = names.get(&link.actor_id) {
            casts.entry(link.movie_id).or_default().push(name);
        }
    }

    let mut actors: Vec<Actor> = rows.iter().map(|row| Actor::new(&row.fullname)).collect();
    let position: HashMap<i32, usize> =
        ids.iter().enumerate().map(|(pos, &id)| (id, pos)).collect();
    for link in &own_links {
        let Some(&pos) = position.get(&link.actor_id) else {
            continue;
        };
        let actor = &mut actors[pos];
        actor.add_movie(link.movie_id);
        for colleague in casts.get(&link.movie_id).into_iter().flatten() {
            actor.add_colleague(&Actor::new(colleague));
        }
    }
    Ok(actors)
}

async fn hydrate_directors<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<director::Model>,
) -> RepositoryResult<Vec<Director>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
    let directed: Vec<(MovieId, Option<i32>)> = movie::Entity::find()
        .select_only()
        .column(movie::Column::Id)
        .column(movie::Column::DirectorId)
        .filter(movie::Column::DirectorId.is_in(ids))
        .order_by_asc(movie::Column::Id)
        .into_tuple()
        .all(conn)
        .await?;

    let mut directors: Vec<Director> = Vec::with_capacity(rows.len());
    let mut position: HashMap<i32, usize> = HashMap::new();
    for row in rows {
        position.insert(row.id, directors.len());
        directors.push(Director::new(&row.fullname));
    }
    for (movie_id, director_id) in directed {
        if let Some(&pos) = director_id.and_then(|id| position.get(&id)) {
            directors[pos].add_movie(movie_id);
        }
    }
    Ok(directors)
}

async fn hydrate_genres<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<genre::Model>,
) -> RepositoryResult<Vec<Genre>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
    let links = movie_genre::Entity::find()
        .filter(movie_genre::Column::GenreId.is_in(ids))
        .order_by_asc(movie_genre::Column::Id)
        .all(conn)
        .await?;

    let mut genres: Vec<Genre> = Vec::with_capacity(rows.len());
    let mut position: HashMap<i32, usize> = HashMap::new();
    for row in rows {
        position.insert(row.id, genres.len());
        genres.push(Genre::new(&row.name));
    }
    for link in links {
        if let Some(&pos) = position.get(&link.genre_id) {
            genres[pos].add_movie(link.movie_id);
        }
    }
    Ok(genres)
}

// =============================================================================
// Name tables
// =============================================================================

async fn intern_director<C: ConnectionTrait>(conn: &C, fullname: &str) -> RepositoryResult<i32> {
    let existing =
        director::Entity::find().filter(director::Column::Fullname.eq(fullname)).one(conn).await?;
    if let Some(existing) = existing {
        return Ok(existing.id);
    }
    let model =
        director::ActiveModel { id: Default::default(), fullname: Set(fullname.to_string()) };
    Ok(director::Entity::insert(model).exec(conn).await?.last_insert_id)
}

async fn intern_genre<C: ConnectionTrait>(conn: &C, name: &str) -> RepositoryResult<i32> {
    let existing = genre::Entity::find().filter(genre::Column::Name.eq(name)).one(conn).await?;
    if let Some(existing) = existing {
        return Ok(existing.id);
    }
    let model = genre::ActiveModel { id: Default::default(), name: Set(name.to_string()) };
    Ok(genre::Entity::insert(model).exec(conn).await?.last_insert_id)
}

async fn intern_actor<C: ConnectionTrait>(conn: &C, fullname: &str) -> RepositoryResult<i32> {
    let existing =
        actor::Entity::find().filter(actor::Column::Fullname.eq(fullname)).one(conn).await?;
    if let Some(existing) = existing {
        return Ok(existing.id);
    }
    let model = actor::ActiveModel { id: Default::default(), fullname: Set(fullname.to_string()) };
    Ok(actor::Entity::insert(model).exec(conn).await?.last_insert_id)
}

/// Staging area for bulk loads: names seen so far mapped to the ids they will
/// be inserted under, plus the rows still to write.
struct Interned<M> {
    ids: HashMap<String, i32>,
    next_id: i32,
    pending: Vec<M>,
}

impl<M> Interned<M> {
    fn new(existing: impl IntoIterator<Item = (String, i32)>) -> Self {
        let ids: HashMap<String, i32> = existing.into_iter().collect();
        let next_id = ids.values().max().map_or(1, |max| max + 1);
        Self { ids, next_id, pending: Vec::new() }
    }

    fn intern(&mut self, name: &str, row: impl FnOnce(i32, String) -> M) -> i32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(name.to_string(), id);
        self.pending.push(row(id, name.to_string()));
        id
    }
}

macro_rules! insert_chunked {
    ($entity:path, $rows:expr, $conn:expr) => {
        for chunk in $rows.chunks(INSERT_CHUNK) {
            <$entity>::insert_many(chunk.iter().cloned()).exec_without_returning($conn).await?;
        }
    };
}

// =============================================================================
// Repository
// =============================================================================

#[async_trait]
impl MovieRepository for DatabaseRepository {
    async fn add_user(&self, user: User) -> RepositoryResult<()> {
        let Some(username) = user.username() else {
            debug!("ignoring user without a username");
            return Ok(());
        };
        let uow = self.begin().await?;
        if find_user(uow.txn(), username).await?.is_some() {
            return Ok(());
        }
        let model = user::ActiveModel {
            id: Default::default(),
            username: Set(username.to_string()),
            password: Set(user.password().map(str::to_string)),
        };
        user::Entity::insert(model).exec(uow.txn()).await?;
        uow.commit().await?;
        debug!(username, "added user");
        Ok(())
    }

    async fn get_user(&self, username: &str) -> RepositoryResult<Option<User>> {
        match find_user(self.conn(), username).await? {
            Some(row) => Ok(Some(hydrate_user(self.conn(), row).await?)),
            None => Ok(None),
        }
    }

    async fn add_movie(&self, movie: Movie) -> RepositoryResult<MovieId> {
        let uow = self.begin().await?;
        let txn = uow.txn();

        if let Some(id) = movie.id() {
            if movie::Entity::find_by_id(id).one(txn).await?.is_some() {
                return Ok(id);
            }
        }
        if let Some(existing) = find_stored_movie(txn, &movie).await? {
            return Ok(existing.id);
        }

        let id = match movie.id() {
            Some(id) => id,
            None => {
                let max: Option<Option<i32>> = movie::Entity::find()
                    .select_only()
                    .column_as(movie::Column::Id.max(), "max_id")
                    .into_tuple()
                    .one(txn)
                    .await?;
                next_movie_id(max.flatten())?
            },
        };

        let director = match movie.director().and_then(Director::full_name) {
            Some(name) => Some(intern_director(txn, name).await?),
            None => None,
        };
        movie::Entity::insert(movie_row(&movie, id, director)).exec_without_returning(txn).await?;

        for name in movie.genres().iter().filter_map(Genre::name) {
            let genre_id = intern_genre(txn, name).await?;
            let link = movie_genre::ActiveModel {
                id: Default::default(),
                movie_id: Set(id),
                genre_id: Set(genre_id),
            };
            movie_genre::Entity::insert(link).exec(txn).await?;
        }
        for name in movie.actors().iter().filter_map(Actor::full_name) {
            let actor_id = intern_actor(txn, name).await?;
            let link = movie_actor::ActiveModel {
                id: Default::default(),
                movie_id: Set(id),
                actor_id: Set(actor_id),
            };
            movie_actor::Entity::insert(link).exec(txn).await?;
        }

        uow.commit().await?;
        debug!(id, title = movie.title().unwrap_or_default(), "stored movie");
        Ok(id)
    }

    async fn get_movie(&self, id: MovieId) -> RepositoryResult<Option<Movie>> {
        let Some(row) = movie::Entity::find_by_id(id).one(self.conn()).await? else {
            return Ok(None);
        };
        Ok(hydrate_movies(self.conn(), vec![row]).await?.into_iter().next())
    }

    async fn get_movies_by_letter(&self, letter: &str) -> RepositoryResult<Vec<Movie>> {
        let letters = bucket_letters(letter);
        if letters.is_empty() {
            return Ok(Vec::new());
        }
        let rows =
            ordered().filter(movie::Column::FirstLetter.is_in(letters)).all(self.conn()).await?;
        hydrate_movies(self.conn(), rows).await
    }

    async fn get_number_of_movies(&self) -> RepositoryResult<usize> {
        Ok(movie::Entity::find().count(self.conn()).await? as usize)
    }

    async fn get_first_movie(&self) -> RepositoryResult<Option<Movie>> {
        let rows = ordered().limit(1).all(self.conn()).await?;
        Ok(hydrate_movies(self.conn(), rows).await?.into_iter().next())
    }

    async fn get_last_movie(&self) -> RepositoryResult<Option<Movie>> {
        let rows = movie::Entity::find()
            .order_by_desc(movie::Column::SortTitle)
            .order_by_desc(movie::Column::Year)
            .order_by_desc(movie::Column::Title)
            .limit(1)
            .all(self.conn())
            .await?;
        Ok(hydrate_movies(self.conn(), rows).await?.into_iter().next())
    }

    async fn get_movies_from_year(&self, year: i32) -> RepositoryResult<Vec<Movie>> {
        let rows = ordered().filter(movie::Column::Year.eq(year)).all(self.conn()).await?;
        hydrate_movies(self.conn(), rows).await
    }

    async fn get_first_letter(&self, id: MovieId) -> RepositoryResult<Option<char>> {
        let row = movie::Entity::find_by_id(id).one(self.conn()).await?;
        Ok(row.and_then(|row| letter_of(row.first_letter)))
    }

    // Catalogue order sorts by `sort_title`, which starts with the first
    // letter, so the scan reduces to the nearest distinct stored letter.
    async fn get_letter_of_next_movie(&self, movie: &Movie) -> RepositoryResult<Option<char>> {
        let Some(stored) = find_stored_movie(self.conn(), movie).await? else {
            return Ok(None);
        };
        let later = match stored.first_letter {
            Some(current) => movie::Column::FirstLetter.gt(current),
            None => movie::Column::FirstLetter.is_not_null(),
        };
        let next: Option<Option<String>> = movie::Entity::find()
            .select_only()
            .column(movie::Column::FirstLetter)
            .filter(later)
            .order_by_asc(movie::Column::FirstLetter)
            .into_tuple()
            .one(self.conn())
            .await?;
        Ok(letter_of(next.flatten()))
    }

    async fn get_letter_of_previous_movie(
        &self,
        movie: &Movie,
    ) -> RepositoryResult<Option<char>> {
        let Some(stored) = find_stored_movie(self.conn(), movie).await? else {
            return Ok(None);
        };
        let Some(current) = stored.first_letter else {
            return Ok(None);
        };
        let previous: Option<Option<String>> = movie::Entity::find()
            .select_only()
            .column(movie::Column::FirstLetter)
            .filter(movie::Column::FirstLetter.lt(current))
            .order_by_desc(movie::Column::FirstLetter)
            .into_tuple()
            .one(self.conn())
            .await?;
        Ok(letter_of(previous.flatten()))
    }

    async fn get_all_letters(&self) -> RepositoryResult<Vec<char>> {
        let letters: Vec<String> = movie::Entity::find()
            .select_only()
            .column(movie::Column::FirstLetter)
            .distinct()
            .filter(movie::Column::FirstLetter.is_not_null())
            .order_by_asc(movie::Column::FirstLetter)
            .into_tuple()
            .all(self.conn())
            .await?;
        Ok(letters.into_iter().filter_map(|letter| letter.chars().next()).collect())
    }

    async fn get_movies_from_genre(&self, genre: &Genre) -> RepositoryResult<Vec<MovieId>> {
        let Some(name) = genre.name() else {
            return Ok(Vec::new());
        };
        let conn = self.conn();
        let backend = conn.get_database_backend();

        let row = conn
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT id FROM genres WHERE name = ?",
                [name.into()],
            ))
            .await?;
        let Some(row) = row else {
            return Ok(Vec::new());
        };
        let genre_id: i32 = row.try_get("", "id")?;

        let rows = conn
            .query_all(Statement::from_sql_and_values(
                backend,
                "SELECT movie_id FROM movie_genres WHERE genre_id = ? ORDER BY movie_id",
                [genre_id.into()],
            ))
            .await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<MovieId>("", "movie_id"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    async fn add_genre(&self, genre: Genre) -> RepositoryResult<()> {
        let Some(name) = genre.name() else {
            return Ok(());
        };
        let uow = self.begin().await?;
        intern_genre(uow.txn(), name).await?;
        uow.commit().await
    }

    async fn get_genres(&self) -> RepositoryResult<Vec<Genre>> {
        let rows = genre::Entity::find().order_by_asc(genre::Column::Id).all(self.conn()).await?;
        hydrate_genres(self.conn(), rows).await
    }

    async fn add_actor(&self, actor: Actor) -> RepositoryResult<()> {
        let Some(name) = actor.full_name() else {
            return Ok(());
        };
        let uow = self.begin().await?;
        intern_actor(uow.txn(), name).await?;
        uow.commit().await
    }

    async fn get_actors(&self) -> RepositoryResult<Vec<Actor>> {
        let rows = actor::Entity::find().order_by_asc(actor::Column::Id).all(self.conn()).await?;
        hydrate_actors(self.conn(), rows).await
    }

    async fn get_actor(&self, full_name: &str) -> RepositoryResult<Option<Actor>> {
        let rows = actor::Entity::find()
            .filter(actor::Column::Fullname.eq(full_name.trim()))
            .all(self.conn())
            .await?;
        Ok(hydrate_actors(self.conn(), rows).await?.into_iter().next())
    }

    async fn add_director(&self, director: Director) -> RepositoryResult<()> {
        let Some(name) = director.full_name() else {
            return Ok(());
        };
        let uow = self.begin().await?;
        intern_director(uow.txn(), name).await?;
        uow.commit().await
    }

    async fn get_directors(&self) -> RepositoryResult<Vec<Director>> {
        let rows =
            director::Entity::find().order_by_asc(director::Column::Id).all(self.conn()).await?;
        hydrate_directors(self.conn(), rows).await
    }

    async fn get_director(&self, full_name: &str) -> RepositoryResult<Option<Director>> {
        let rows = director::Entity::find()
            .filter(director::Column::Fullname.eq(full_name.trim()))
            .all(self.conn())
            .await?;
        Ok(hydrate_directors(self.conn(), rows).await?.into_iter().next())
    }

    async fn add_review(&self, review: Review) -> RepositoryResult<()> {
        let (username, movie_id) = review_links(&review)?;
        let uow = self.begin().await?;
        let txn = uow.txn();

        let Some(author) = find_user(txn, username).await? else {
            return Err(RepositoryError::integrity(format!(
                "review author {username} is not a stored user"
            )));
        };
        if movie::Entity::find_by_id(movie_id).one(txn).await?.is_none() {
            return Err(RepositoryError::integrity(format!(
                "reviewed movie {movie_id} is not stored"
            )));
        }

        let rating = review.rating().map(i32::from);
        let timestamp = review.timestamp().to_string();
        let duplicate = review::Entity::find()
            .filter(review::Column::MovieId.eq(movie_id))
            .filter(review::Column::Review.eq(review.text()))
            .filter(match rating {
                Some(rating) => review::Column::Rating.eq(rating),
                None => review::Column::Rating.is_null(),
            })
            .filter(review::Column::Timestamp.eq(timestamp.as_str()))
            .one(txn)
            .await?;
        if duplicate.is_some() {
            return Ok(());
        }

        let model = review::ActiveModel {
            id: Default::default(),
            user_id: Set(author.id),
            movie_id: Set(movie_id),
            review: Set(review.text().to_string()),
            rating: Set(rating),
            timestamp: Set(timestamp),
        };
        review::Entity::insert(model).exec(txn).await?;
        uow.commit().await?;
        debug!(username, movie_id, "stored review");
        Ok(())
    }

    async fn get_reviews(&self) -> RepositoryResult<Vec<Review>> {
        let rows = review::Entity::find().order_by_asc(review::Column::Id).all(self.conn()).await?;
        let names = usernames(self.conn(), rows.iter().map(|r| r.user_id)).await?;
        rows.into_iter().map(|row| restore_review(row, &names)).collect()
    }

    async fn add_to_watchlist(&self, username: &str, movie_id: MovieId) -> RepositoryResult<()> {
        let uow = self.begin().await?;
        let txn = uow.txn();
        let Some(owner) = find_user(txn, username).await? else {
            return Err(RepositoryError::not_found("user", username));
        };
        if movie::Entity::find_by_id(movie_id).one(txn).await?.is_none() {
            return Err(RepositoryError::not_found("movie", movie_id));
        }

        let link = watchlist_movie::ActiveModel {
            id: Default::default(),
            user_id: Set(owner.id),
            movie_id: Set(movie_id),
        };
        watchlist_movie::Entity::insert(link)
            .on_conflict(
                OnConflict::columns([
                    watchlist_movie::Column::UserId,
                    watchlist_movie::Column::MovieId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;
        uow.commit().await
    }

    async fn remove_from_watchlist(
        &self,
        username: &str,
        movie_id: MovieId,
    ) -> RepositoryResult<()> {
        let uow = self.begin().await?;
        let txn = uow.txn();
        let Some(owner) = find_user(txn, username).await? else {
            return Err(RepositoryError::not_found("user", username));
        };
        if movie::Entity::find_by_id(movie_id).one(txn).await?.is_none() {
            return Err(RepositoryError::not_found("movie", movie_id));
        }

        watchlist_movie::Entity::delete_many()
            .filter(watchlist_movie::Column::UserId.eq(owner.id))
            .filter(watchlist_movie::Column::MovieId.eq(movie_id))
            .exec(txn)
            .await?;
        uow.commit().await
    }

    /// Bulk load. Skipped, returning 0, when the movies table already has rows.
    async fn populate(&self, path: &Path) -> RepositoryResult<usize> {
        let existing = movie::Entity::find().count(self.conn()).await?;
        if existing > 0 {
            info!(existing, "movies table already populated, skipping load");
            return Ok(0);
        }
        let records = ingest::read_csv_file(path)?;

        let uow = self.begin().await?;
        let txn = uow.txn();

        let mut directors = Interned::new(
            director::Entity::find().all(txn).await?.into_iter().map(|d| (d.fullname, d.id)),
        );
        let mut genres = Interned::new(
            genre::Entity::find().all(txn).await?.into_iter().map(|g| (g.name, g.id)),
        );
        let mut actors = Interned::new(
            actor::Entity::find().all(txn).await?.into_iter().map(|a| (a.fullname, a.id)),
        );

        let mut movies = Vec::with_capacity(records.len());
        let mut genre_links = Vec::new();
        let mut actor_links = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut seen_movies = HashSet::new();

        for record in &records {
            let movie = record.to_movie()?;
            let id = record.rank;
            let key = (movie.title().map(str::to_string), movie.year());
            if !seen_ids.insert(id) || !seen_movies.insert(key) {
                warn!(id, title = %record.title, "skipping duplicate catalogue row");
                continue;
            }

            let director = movie.director().and_then(Director::full_name).map(|name| {
                directors.intern(name, |new_id, fullname| director::ActiveModel {
                    id: Set(new_id),
                    fullname: Set(fullname),
                })
            });
            movies.push(movie_row(&movie, id, director));

            for name in movie.genres().iter().filter_map(Genre::name) {
                let genre_id = genres.intern(name, |new_id, name| genre::ActiveModel {
                    id: Set(new_id),
                    name: Set(name),
                });
                genre_links.push(movie_genre::ActiveModel {
                    id: Default::default(),
                    movie_id: Set(id),
                    genre_id: Set(genre_id),
                });
            }
            for name in movie.actors().iter().filter_map(Actor::full_name) {
                let actor_id = actors.intern(name, |new_id, fullname| actor::ActiveModel {
                    id: Set(new_id),
                    fullname: Set(fullname),
                });
                actor_links.push(movie_actor::ActiveModel {
                    id: Default::default(),
                    movie_id: Set(id),
                    actor_id: Set(actor_id),
                });
            }
        }

        insert_chunked!(director::Entity, directors.pending, txn);
        insert_chunked!(genre::Entity, genres.pending, txn);
        insert_chunked!(actor::Entity, actors.pending, txn);
        insert_chunked!(movie::Entity, movies, txn);
        insert_chunked!(movie_genre::Entity, genre_links, txn);
        insert_chunked!(movie_actor::Entity, actor_links, txn);
        uow.commit().await?;

        info!(
            movies = movies.len(),
            directors = directors.ids.len(),
            genres = genres.ids.len(),
            actors = actors.ids.len(),
            "populated database catalogue"
        );
        Ok(movies.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue_path() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("data/movies.csv")
    }

    async fn repo() -> DatabaseRepository {
        DatabaseRepository::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn populate_runs_once() {
        let repo = repo().await;
        assert_eq!(repo.populate(&catalogue_path()).await.unwrap(), 5);
        assert_eq!(repo.populate(&catalogue_path()).await.unwrap(), 0);
        assert_eq!(repo.get_number_of_movies().await.unwrap(), 5);
        assert_eq!(repo.get_genres().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn derived_columns_follow_the_title() {
        let repo = repo().await;
        let id = repo.add_movie(Movie::new("  'burbs, The", 1989)).await.unwrap();
        let row = movie::Entity::find_by_id(id).one(repo.conn()).await.unwrap().unwrap();
        assert_eq!(row.first_letter.as_deref(), Some("B"));
        assert_eq!(row.sort_title, crate::models::sort_title("'burbs, The"));
    }

    #[tokio::test]
    async fn genre_lookup_uses_stored_links() {
        let repo = repo().await;
        repo.populate(&catalogue_path()).await.unwrap();
        assert_eq!(repo.get_movies_from_genre(&Genre::new("Sci-Fi")).await.unwrap(), [1, 2]);
        assert!(repo.get_movies_from_genre(&Genre::new("Western")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_review_leaves_no_row() {
        let repo = repo().await;
        repo.populate(&catalogue_path()).await.unwrap();
        let ghost = User::new("ghost", "");
        let movie = repo.get_movie(1).await.unwrap().unwrap();
        let review = Review::new(Some(&ghost), Some(&movie), "Boo.", 3, Timestamp::UNIX_EPOCH);

        assert!(matches!(repo.add_review(review).await, Err(RepositoryError::Integrity(_))));
        assert_eq!(review::Entity::find().count(repo.conn()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn watchlist_insert_is_idempotent() {
        let repo = repo().await;
        repo.populate(&catalogue_path()).await.unwrap();
        repo.add_user(User::new("Dave", "pw")).await.unwrap();
        repo.add_to_watchlist("dave", 2).await.unwrap();
        repo.add_to_watchlist("DAVE", 2).await.unwrap();
        assert_eq!(watchlist_movie::Entity::find().count(repo.conn()).await.unwrap(), 1);

        let user = repo.get_user("dave").await.unwrap().unwrap();
        let first = user.watchlist().first_movie_in_watchlist();
        assert_eq!(first.and_then(Movie::title), Some("Prometheus"));
    }
}
