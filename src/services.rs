//! Catalogue use cases layered over a [`MovieRepository`].

use std::collections::BTreeSet;

use jiff::Timestamp;
use tracing::{debug, info};

use crate::{
    error::{RepositoryError, ServiceError, ServiceResult},
    models::{Genre, Movie, MovieId, NUMBERS, Review, User, make_review},
    repository::MovieRepository,
};

// =============================================================================
// Users
// =============================================================================

/// Stores a new user. `password_hash` is kept as given.
pub async fn register_user(
    repo: &dyn MovieRepository,
    username: &str,
    password_hash: &str,
) -> ServiceResult<()> {
    if repo.get_user(username).await?.is_some() {
        return Err(ServiceError::NameNotUnique(username.to_string()));
    }
    repo.add_user(User::new(username, password_hash)).await?;
    info!(username, "registered user");
    Ok(())
}

pub async fn get_user(repo: &dyn MovieRepository, username: &str) -> ServiceResult<User> {
    repo.get_user(username).await?.ok_or_else(|| ServiceError::UnknownUser(username.to_string()))
}

// =============================================================================
// Movies and reviews
// =============================================================================

pub async fn get_movie(repo: &dyn MovieRepository, movie_id: MovieId) -> ServiceResult<Movie> {
    repo.get_movie(movie_id).await?.ok_or(ServiceError::NonExistentMovie(movie_id))
}

/// Reviews `movie_id` as `username`, timestamped now.
pub async fn add_review(
    repo: &dyn MovieRepository,
    movie_id: MovieId,
    text: &str,
    rating: i32,
    username: &str,
) -> ServiceResult<Review> {
    let mut movie = get_movie(repo, movie_id).await?;
    let mut user = get_user(repo, username).await?;

    let review = make_review(text, &mut user, &mut movie, rating, Timestamp::now());
    repo.add_review(review.clone()).await?;
    debug!(username, movie_id, "review added");
    Ok(review)
}

pub async fn get_reviews_for_movie(
    repo: &dyn MovieRepository,
    movie_id: MovieId,
) -> ServiceResult<Vec<Review>> {
    Ok(get_movie(repo, movie_id).await?.reviews().to_vec())
}

// =============================================================================
// Letter navigation
// =============================================================================

/// The bucket a first letter belongs to: digits share [`NUMBERS`].
pub fn bucket_for(letter: char) -> String {
    if letter.is_ascii_digit() { NUMBERS.to_string() } else { letter.to_string() }
}

/// Accepts bucket names in any case.
fn normalize_bucket(letter: &str) -> String {
    let letter = letter.trim();
    if letter.eq_ignore_ascii_case(NUMBERS) {
        NUMBERS.to_string()
    } else {
        letter.to_uppercase()
    }
}

/// Bucket name of the movie's first letter.
pub async fn get_first_letter(
    repo: &dyn MovieRepository,
    movie_id: MovieId,
) -> ServiceResult<Option<String>> {
    if repo.get_movie(movie_id).await?.is_none() {
        return Err(ServiceError::NonExistentMovie(movie_id));
    }
    Ok(repo.get_first_letter(movie_id).await?.map(bucket_for))
}

/// One page of the alphabetical browse view.
#[derive(Clone, Debug)]
pub struct LetterPage {
    pub letter: String,
    pub movies: Vec<Movie>,
    pub previous: Option<String>,
    pub next: Option<String>,
}

pub async fn movies_by_letter(
    repo: &dyn MovieRepository,
    letter: &str,
) -> ServiceResult<LetterPage> {
    let letter = normalize_bucket(letter);
    let movies = repo.get_movies_by_letter(&letter).await?;

    let (previous, next) = match (movies.first(), movies.last()) {
        (Some(first), Some(last)) => (
            repo.get_letter_of_previous_movie(first).await?.map(bucket_for),
            repo.get_letter_of_next_movie(last).await?.map(bucket_for),
        ),
        _ => (None, None),
    };
    debug!(letter = %letter, movies = movies.len(), "letter page");
    Ok(LetterPage { letter, movies, previous, next })
}

// =============================================================================
// Search
// =============================================================================

/// Criteria left empty do not constrain the search.
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    pub genre: Option<String>,
    pub actor: Option<String>,
    pub director: Option<String>,
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        [&self.genre, &self.actor, &self.director]
            .into_iter()
            .all(|value| criterion(value).is_none())
    }
}

fn criterion(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Ids of the movies matching every given criterion, ascending. An empty
/// query matches nothing.
pub async fn search(
    repo: &dyn MovieRepository,
    query: &SearchQuery,
) -> ServiceResult<Vec<MovieId>> {
    let mut matches: Vec<BTreeSet<MovieId>> = Vec::new();

    if let Some(genre) = criterion(&query.genre) {
        let ids = repo.get_movies_from_genre(&Genre::new(genre)).await?;
        matches.push(ids.into_iter().collect());
    }
    if let Some(actor) = criterion(&query.actor) {
        let actor = repo.get_actor(actor).await?;
        matches.push(actor.map(|a| a.movies().iter().copied().collect()).unwrap_or_default());
    }
    if let Some(director) = criterion(&query.director) {
        let director = repo.get_director(director).await?;
        matches.push(director.map(|d| d.movies().iter().copied().collect()).unwrap_or_default());
    }

    let mut sets = matches.into_iter();
    let Some(first) = sets.next() else {
        return Ok(Vec::new());
    };
    let common = sets.fold(first, |acc, set| acc.intersection(&set).copied().collect());
    Ok(common.into_iter().collect())
}

// =============================================================================
// Watchlists
// =============================================================================

fn watchlist_error(err: RepositoryError, username: &str, movie_id: MovieId) -> ServiceError {
    match err {
        RepositoryError::NotFound { entity: "user", .. } => {
            ServiceError::UnknownUser(username.to_string())
        },
        RepositoryError::NotFound { entity: "movie", .. } => {
            ServiceError::NonExistentMovie(movie_id)
        },
        other => other.into(),
    }
}

pub async fn watchlist(repo: &dyn MovieRepository, username: &str) -> ServiceResult<Vec<Movie>> {
    Ok(get_user(repo, username).await?.watchlist().iter().cloned().collect())
}

pub async fn add_to_watchlist(
    repo: &dyn MovieRepository,
    username: &str,
    movie_id: MovieId,
) -> ServiceResult<()> {
    repo.add_to_watchlist(username, movie_id)
        .await
        .map_err(|err| watchlist_error(err, username, movie_id))
}

pub async fn remove_from_watchlist(
    repo: &dyn MovieRepository,
    username: &str,
    movie_id: MovieId,
) -> ServiceResult<()> {
    repo.remove_from_watchlist(username, movie_id)
        .await
        .map_err(|err| watchlist_error(err, username, movie_id))
}

pub async fn movie_in_watchlist(
    repo: &dyn MovieRepository,
    username: &str,
    movie_id: MovieId,
) -> ServiceResult<bool> {
    let user = get_user(repo, username).await?;
    Ok(user.watchlist().iter().any(|movie| movie.id() == Some(movie_id)))
}

/// Adds the movie if it is not on the watchlist, removes it otherwise.
/// Returns whether the movie is on the watchlist afterwards.
pub async fn toggle_watchlist(
    repo: &dyn MovieRepository,
    username: &str,
    movie_id: MovieId,
) -> ServiceResult<bool> {
    if movie_in_watchlist(repo, username, movie_id).await? {
        remove_from_watchlist(repo, username, movie_id).await?;
        Ok(false)
    } else {
        add_to_watchlist(repo, username, movie_id).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::memory::MemoryRepository;

    async fn populated() -> MemoryRepository {
        let repo = MemoryRepository::new();
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/movies.csv");
        repo.populate(&path).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn registration_rejects_taken_names() {
        let repo = populated().await;
        register_user(&repo, "Shaun", "hash").await.unwrap();
        let err = register_user(&repo, "shaun ", "other").await.unwrap_err();
        assert!(matches!(err, ServiceError::NameNotUnique(_)));
        assert_eq!(get_user(&repo, "SHAUN").await.unwrap().password(), Some("hash"));
    }

    #[tokio::test]
    async fn review_needs_movie_and_user() {
        let repo = populated().await;
        register_user(&repo, "thorke", "hash").await.unwrap();

        let err = add_review(&repo, 99, "Missing", 5, "thorke").await.unwrap_err();
        assert!(matches!(err, ServiceError::NonExistentMovie(99)));
        let err = add_review(&repo, 1, "Who?", 5, "nobody").await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownUser(_)));

        let review = add_review(&repo, 1, "Great soundtrack.", 9, "thorke").await.unwrap();
        assert_eq!(get_reviews_for_movie(&repo, 1).await.unwrap(), [review]);
        assert!(get_reviews_for_movie(&repo, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn letter_pages_link_neighbouring_buckets() {
        let repo = populated().await;

        let page = movies_by_letter(&repo, "s").await.unwrap();
        assert_eq!(page.letter, "S");
        assert_eq!(page.movies.len(), 3);
        assert_eq!(page.previous.as_deref(), Some("P"));
        assert_eq!(page.next, None);

        let page = movies_by_letter(&repo, "G").await.unwrap();
        assert_eq!(page.previous, None);
        assert_eq!(page.next.as_deref(), Some("P"));

        let page = movies_by_letter(&repo, "Q").await.unwrap();
        assert!(page.movies.is_empty());
        assert_eq!((page.previous, page.next), (None, None));
    }

    #[tokio::test]
    async fn digit_titles_map_to_numbers() {
        let repo = populated().await;
        let id = repo.add_movie(Movie::new("2001: A Space Odyssey", 1968)).await.unwrap();
        assert_eq!(get_first_letter(&repo, id).await.unwrap().as_deref(), Some(NUMBERS));
        assert_eq!(get_first_letter(&repo, 1).await.unwrap().as_deref(), Some("G"));

        let page = movies_by_letter(&repo, "numbers").await.unwrap();
        assert_eq!(page.movies.len(), 1);
        assert_eq!(page.next.as_deref(), Some("G"));

        let page = movies_by_letter(&repo, "G").await.unwrap();
        assert_eq!(page.previous.as_deref(), Some(NUMBERS));
    }

    #[tokio::test]
    async fn search_intersects_criteria() {
        let repo = populated().await;

        let query = SearchQuery { genre: Some("Adventure".into()), ..Default::default() };
        assert_eq!(search(&repo, &query).await.unwrap(), [1, 2, 5]);

        let query = SearchQuery {
            genre: Some("Adventure".into()),
            actor: Some("Vin Diesel".into()),
            ..Default::default()
        };
        assert_eq!(search(&repo, &query).await.unwrap(), [1]);

        let query = SearchQuery {
            genre: Some("Horror".into()),
            director: Some("James Gunn".into()),
            ..Default::default()
        };
        assert!(search(&repo, &query).await.unwrap().is_empty());

        let blank = SearchQuery { actor: Some("  ".into()), ..Default::default() };
        assert!(blank.is_empty());
        assert!(search(&repo, &blank).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggling_the_watchlist() {
        let repo = populated().await;
        register_user(&repo, "fmercury", "hash").await.unwrap();

        assert!(toggle_watchlist(&repo, "fmercury", 4).await.unwrap());
        assert!(movie_in_watchlist(&repo, "fmercury", 4).await.unwrap());
        let titles: Vec<_> = watchlist(&repo, "fmercury")
            .await
            .unwrap()
            .iter()
            .filter_map(|m| m.title().map(str::to_string))
            .collect();
        assert_eq!(titles, ["Sing"]);

        assert!(!toggle_watchlist(&repo, "fmercury", 4).await.unwrap());
        assert!(watchlist(&repo, "fmercury").await.unwrap().is_empty());

        let err = add_to_watchlist(&repo, "fmercury", 77).await.unwrap_err();
        assert!(matches!(err, ServiceError::NonExistentMovie(77)));
        let err = remove_from_watchlist(&repo, "ghost", 4).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownUser(_)));
    }
}
