//! The storage contract shared by the in-memory and database backends.

use std::path::Path;

use async_trait::async_trait;

use crate::{
    error::{RepositoryError, RepositoryResult},
    models::{self, Actor, Director, Genre, Movie, MovieId, NUMBERS, Review, User},
};

/// Every query and mutation the catalogue needs from a storage backend.
///
/// Single-entity lookups return `Ok(None)` for unknown keys. `add_review` and
/// the watchlist mutations are the only operations that fail on bad input.
#[async_trait]
pub trait MovieRepository: Send + Sync {
    // =========================================================================
    // Users
    // =========================================================================

    /// Adds a user unless one with the same username exists.
    async fn add_user(&self, user: User) -> RepositoryResult<()>;

    /// Looks a user up by username, normalized the same way `User::new` does.
    async fn get_user(&self, username: &str) -> RepositoryResult<Option<User>>;

    // =========================================================================
    // Movies
    // =========================================================================

    /// Adds a movie and returns its id. A movie without an id is assigned the
    /// next free one; a movie already present (same id, or equal title and
    /// year) is left untouched and its stored id returned.
    async fn add_movie(&self, movie: Movie) -> RepositoryResult<MovieId>;

    async fn get_movie(&self, id: MovieId) -> RepositoryResult<Option<Movie>>;

    /// Movies whose first letter is `letter`, in catalogue order. The
    /// [`NUMBERS`] bucket matches every movie starting with a digit.
    async fn get_movies_by_letter(&self, letter: &str) -> RepositoryResult<Vec<Movie>>;

    async fn get_number_of_movies(&self) -> RepositoryResult<usize>;

    async fn get_first_movie(&self) -> RepositoryResult<Option<Movie>>;

    async fn get_last_movie(&self) -> RepositoryResult<Option<Movie>>;

    async fn get_movies_from_year(&self, year: i32) -> RepositoryResult<Vec<Movie>>;

    async fn get_first_letter(&self, id: MovieId) -> RepositoryResult<Option<char>>;

    /// The first letter after `movie`'s own, scanning forward in catalogue
    /// order. `None` when the movie is unknown or in the last bucket.
    async fn get_letter_of_next_movie(&self, movie: &Movie) -> RepositoryResult<Option<char>>;

    /// Mirror of [`get_letter_of_next_movie`](Self::get_letter_of_next_movie).
    async fn get_letter_of_previous_movie(&self, movie: &Movie)
    -> RepositoryResult<Option<char>>;

    /// Distinct first letters of stored movies, ascending.
    async fn get_all_letters(&self) -> RepositoryResult<Vec<char>>;

    fn alphabet(&self) -> Vec<String> {
        models::alphabet()
    }

    // =========================================================================
    // Genres, actors, directors
    // =========================================================================

    /// Ids of the movies tagged with `genre`, ascending.
    async fn get_movies_from_genre(&self, genre: &Genre) -> RepositoryResult<Vec<MovieId>>;

    async fn add_genre(&self, genre: Genre) -> RepositoryResult<()>;

    async fn get_genres(&self) -> RepositoryResult<Vec<Genre>>;

    async fn add_actor(&self, actor: Actor) -> RepositoryResult<()>;

    async fn get_actors(&self) -> RepositoryResult<Vec<Actor>>;

    async fn get_actor(&self, full_name: &str) -> RepositoryResult<Option<Actor>>;

    async fn add_director(&self, director: Director) -> RepositoryResult<()>;

    async fn get_directors(&self) -> RepositoryResult<Vec<Director>>;

    async fn get_director(&self, full_name: &str) -> RepositoryResult<Option<Director>>;

    // =========================================================================
    // Reviews and watchlists
    // =========================================================================

    /// Stores a review and links it to its author and movie.
    ///
    /// Fails with [`RepositoryError::Integrity`] when the review does not point
    /// at a stored user and a stored movie.
    async fn add_review(&self, review: Review) -> RepositoryResult<()>;

    async fn get_reviews(&self) -> RepositoryResult<Vec<Review>>;

    /// Fails with `NotFound` when either the user or the movie is unknown.
    async fn add_to_watchlist(&self, username: &str, movie_id: MovieId) -> RepositoryResult<()>;

    /// Fails with `NotFound` when either the user or the movie is unknown.
    async fn remove_from_watchlist(&self, username: &str, movie_id: MovieId)
    -> RepositoryResult<()>;

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads a movie catalogue CSV and returns the number of movies read.
    async fn populate(&self, path: &Path) -> RepositoryResult<usize>;
}

/// Whether `first_letter` falls in the bucket named `letter`.
pub fn in_bucket(letter: &str, first_letter: Option<char>) -> bool {
    let Some(first) = first_letter else {
        return false;
    };
    if letter == NUMBERS {
        return first.is_ascii_digit();
    }
    let mut chars = letter.chars();
    chars.next() == Some(first) && chars.next().is_none()
}

/// The `first_letter` values a bucket name can match.
pub fn bucket_letters(letter: &str) -> Vec<String> {
    if letter == NUMBERS {
        return ('0'..='9').map(String::from).collect();
    }
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => vec![c.to_string()],
        _ => Vec::new(),
    }
}

/// The id handed to a movie stored without one.
pub(crate) fn next_movie_id(max: Option<MovieId>) -> RepositoryResult<MovieId> {
    match max {
        None => Ok(1),
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| RepositoryError::integrity("movie ids exhausted")),
    }
}

/// Rejects reviews that do not name both an author and a movie.
pub(crate) fn review_links(review: &Review) -> RepositoryResult<(&str, MovieId)> {
    let user = review
        .user()
        .ok_or_else(|| RepositoryError::integrity("review is not attached to a user"))?;
    let movie = review
        .movie()
        .ok_or_else(|| RepositoryError::integrity("review is not attached to a movie"))?;
    Ok((user, movie))
}
