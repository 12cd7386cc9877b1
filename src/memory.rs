//! In-memory repository. Movies are kept in catalogue order so letter
//! navigation is a scan over a sorted id list.

use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap},
    path::Path,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    error::{RepositoryError, RepositoryResult},
    ingest,
    models::{Actor, Director, Genre, Movie, MovieId, Review, User, normalize_username},
    repository::{MovieRepository, in_bucket, next_movie_id, review_links},
};

trait Named {
    fn key(&self) -> Option<&str>;
}

impl Named for Actor {
    fn key(&self) -> Option<&str> {
        self.full_name()
    }
}

impl Named for Director {
    fn key(&self) -> Option<&str> {
        self.full_name()
    }
}

impl Named for Genre {
    fn key(&self) -> Option<&str> {
        self.name()
    }
}

/// Insertion-ordered entities indexed by name. The first entity stored under a
/// name is the one kept.
#[derive(Debug)]
struct NameTable<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for NameTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new(), index: HashMap::new() }
    }
}

impl<T: Named> NameTable<T> {
    /// Returns the canonical entity for `entity`'s name, storing it if new.
    fn intern(&mut self, entity: T) -> Option<&mut T> {
        let name = entity.key()?.to_string();
        let pos = match self.index.get(&name) {
            Some(&pos) => pos,
            None => {
                self.entries.push(entity);
                let pos = self.entries.len() - 1;
                self.index.insert(name, pos);
                pos
            }
        };
        self.entries.get_mut(pos)
    }

    fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name.trim()).and_then(|&pos| self.entries.get(pos))
    }

    fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Default)]
struct Catalogue {
    movies: HashMap<MovieId, Movie>,
    /// Movie ids sorted by the movies' natural order.
    ordered: Vec<MovieId>,
    users: Vec<User>,
    actors: NameTable<Actor>,
    directors: NameTable<Director>,
    genres: NameTable<Genre>,
    reviews: Vec<Review>,
}

impl Catalogue {
    fn ordered_movies(&self) -> impl Iterator<Item = &Movie> + '_ {
        self.ordered.iter().filter_map(|id| self.movies.get(id))
    }

    /// Position in `ordered` of the stored movie equal to `movie`.
    fn position(&self, movie: &Movie) -> Option<usize> {
        self.ordered
            .binary_search_by(|id| self.movies.get(id).map_or(Ordering::Less, |m| m.cmp(movie)))
            .ok()
    }

    /// Stores `movie` unless an equal one is already there. The flag is true
    /// only when a new movie was stored.
    fn insert_movie(&mut self, movie: Movie) -> RepositoryResult<(MovieId, bool)> {
        if let Some(id) = movie.id().filter(|id| self.movies.contains_key(id)) {
            return Ok((id, false));
        }
        if let Some(id) = self.position(&movie).map(|pos| self.ordered[pos]) {
            return Ok((id, false));
        }

        let mut movie = movie.detached();
        let id = match movie.id() {
            Some(id) => id,
            None => next_movie_id(self.movies.keys().max().copied())?,
        };
        movie.set_id(id);

        if let Some(director) = movie.director().cloned() {
            if let Some(canonical) = self.directors.intern(director) {
                canonical.add_movie(id);
            }
        }
        for genre in movie.genres() {
            if let Some(canonical) = self.genres.intern(genre.clone()) {
                canonical.add_movie(id);
            }
        }
        let cast = movie.actors();
        for actor in cast {
            if let Some(canonical) = self.actors.intern(actor.clone()) {
                canonical.add_movie(id);
                cast.iter().for_each(|colleague| canonical.add_colleague(colleague));
            }
        }

        let pos = self
            .ordered
            .partition_point(|other| self.movies.get(other).is_some_and(|m| *m < movie));
        self.ordered.insert(pos, id);
        debug!(id, title = movie.title().unwrap_or_default(), "stored movie");
        self.movies.insert(id, movie);
        Ok((id, true))
    }

    fn user(&self, username: &str) -> Option<&User> {
        let username = normalize_username(username)?;
        self.users.iter().find(|u| u.username() == Some(username.as_str()))
    }

    fn user_mut(&mut self, username: &str) -> Option<&mut User> {
        let username = normalize_username(username)?;
        self.users.iter_mut().find(|u| u.username() == Some(username.as_str()))
    }

    /// A copy of `user` whose watchlist reflects the current movie table.
    fn hydrate_user(&self, user: &User) -> User {
        let mut user = user.clone();
        for movie in user.watchlist_mut().movies_mut() {
            if let Some(current) = movie.id().and_then(|id| self.movies.get(&id)) {
                *movie = current.clone();
            }
        }
        user
    }

    fn next_letter(&self, movie: &Movie) -> Option<char> {
        let pos = self.position(movie)?;
        let current = movie.first_letter();
        self.ordered[pos + 1..]
            .iter()
            .filter_map(|id| self.movies.get(id).and_then(Movie::first_letter))
            .find(|&letter| Some(letter) != current)
    }

    fn previous_letter(&self, movie: &Movie) -> Option<char> {
        let pos = self.position(movie)?;
        let current = movie.first_letter();
        self.ordered[..pos]
            .iter()
            .rev()
            .filter_map(|id| self.movies.get(id).and_then(Movie::first_letter))
            .find(|&letter| Some(letter) != current)
    }

    fn watched_movie(&self, username: &str, movie_id: MovieId) -> RepositoryResult<Movie> {
        if self.user(username).is_none() {
            return Err(RepositoryError::not_found("user", username));
        }
        self.movies
            .get(&movie_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("movie", movie_id))
    }
}

/// A [`MovieRepository`] that lives entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    catalogue: RwLock<Catalogue>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MovieRepository for MemoryRepository {
    async fn add_user(&self, user: User) -> RepositoryResult<()> {
        let mut catalogue = self.catalogue.write().await;
        let Some(username) = user.username() else {
            debug!("ignoring user without a username");
            return Ok(());
        };
        if catalogue.user(username).is_some() {
            return Ok(());
        }
        debug!(username, "adding user");
        catalogue.users.push(user.detached());
        Ok(())
    }

    async fn get_user(&self, username: &str) -> RepositoryResult<Option<User>> {
        let catalogue = self.catalogue.read().await;
        Ok(catalogue.user(username).map(|user| catalogue.hydrate_user(user)))
    }

    async fn add_movie(&self, movie: Movie) -> RepositoryResult<MovieId> {
        let (id, _) = self.catalogue.write().await.insert_movie(movie)?;
        Ok(id)
    }

    async fn get_movie(&self, id: MovieId) -> RepositoryResult<Option<Movie>> {
        Ok(self.catalogue.read().await.movies.get(&id).cloned())
    }

    async fn get_movies_by_letter(&self, letter: &str) -> RepositoryResult<Vec<Movie>> {
        let catalogue = self.catalogue.read().await;
        Ok(catalogue
            .ordered_movies()
            .filter(|movie| in_bucket(letter, movie.first_letter()))
            .cloned()
            .collect())
    }

    async fn get_number_of_movies(&self) -> RepositoryResult<usize> {
        Ok(self.catalogue.read().await.ordered.len())
    }

    async fn get_first_movie(&self) -> RepositoryResult<Option<Movie>> {
        Ok(self.catalogue.read().await.ordered_movies().next().cloned())
    }

    async fn get_last_movie(&self) -> RepositoryResult<Option<Movie>> {
        let catalogue = self.catalogue.read().await;
        Ok(catalogue.ordered.last().and_then(|id| catalogue.movies.get(id)).cloned())
    }

    async fn get_movies_from_year(&self, year: i32) -> RepositoryResult<Vec<Movie>> {
        let catalogue = self.catalogue.read().await;
        Ok(catalogue.ordered_movies().filter(|movie| movie.year() == Some(year)).cloned().collect())
    }

    async fn get_first_letter(&self, id: MovieId) -> RepositoryResult<Option<char>> {
        Ok(self.catalogue.read().await.movies.get(&id).and_then(Movie::first_letter))
    }

    async fn get_letter_of_next_movie(&self, movie: &Movie) -> RepositoryResult<Option<char>> {
        Ok(self.catalogue.read().await.next_letter(movie))
    }

    async fn get_letter_of_previous_movie(
        &self,
        movie: &Movie,
    ) -> RepositoryResult<Option<char>> {
        Ok(self.catalogue.read().await.previous_letter(movie))
    }

    async fn get_all_letters(&self) -> RepositoryResult<Vec<char>> {
        let catalogue = self.catalogue.read().await;
        let letters: BTreeSet<char> =
            catalogue.movies.values().filter_map(Movie::first_letter).collect();
        Ok(letters.into_iter().collect())
    }

    async fn get_movies_from_genre(&self, genre: &Genre) -> RepositoryResult<Vec<MovieId>> {
        let catalogue = self.catalogue.read().await;
        let mut ids = genre
            .name()
            .and_then(|name| catalogue.genres.get(name))
            .map(|genre| genre.movies().to_vec())
            .unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn add_genre(&self, genre: Genre) -> RepositoryResult<()> {
        self.catalogue.write().await.genres.intern(genre.detached());
        Ok(())
    }

    async fn get_genres(&self) -> RepositoryResult<Vec<Genre>> {
        Ok(self.catalogue.read().await.genres.iter().cloned().collect())
    }

    async fn add_actor(&self, actor: Actor) -> RepositoryResult<()> {
        self.catalogue.write().await.actors.intern(actor.detached());
        Ok(())
    }

    async fn get_actors(&self) -> RepositoryResult<Vec<Actor>> {
        Ok(self.catalogue.read().await.actors.iter().cloned().collect())
    }

    async fn get_actor(&self, full_name: &str) -> RepositoryResult<Option<Actor>> {
        Ok(self.catalogue.read().await.actors.get(full_name).cloned())
    }

    async fn add_director(&self, director: Director) -> RepositoryResult<()> {
        self.catalogue.write().await.directors.intern(director.detached());
        Ok(())
    }

    async fn get_directors(&self) -> RepositoryResult<Vec<Director>> {
        Ok(self.catalogue.read().await.directors.iter().cloned().collect())
    }

    async fn get_director(&self, full_name: &str) -> RepositoryResult<Option<Director>> {
        Ok(self.catalogue.read().await.directors.get(full_name).cloned())
    }

    async fn add_review(&self, review: Review) -> RepositoryResult<()> {
        let (username, movie_id) = review_links(&review)?;
        let mut catalogue = self.catalogue.write().await;
        if catalogue.user(username).is_none() {
            return Err(RepositoryError::integrity(format!(
                "review author {username} is not a stored user"
            )));
        }
        if !catalogue.movies.contains_key(&movie_id) {
            return Err(RepositoryError::integrity(format!(
                "reviewed movie {movie_id} is not stored"
            )));
        }
        if catalogue.reviews.contains(&review) {
            return Ok(());
        }

        if let Some(user) = catalogue.user_mut(username) {
            user.add_review(review.clone());
        }
        if let Some(movie) = catalogue.movies.get_mut(&movie_id) {
            movie.add_review(review.clone());
        }
        debug!(username, movie_id, "stored review");
        catalogue.reviews.push(review);
        Ok(())
    }

    async fn get_reviews(&self) -> RepositoryResult<Vec<Review>> {
        Ok(self.catalogue.read().await.reviews.clone())
    }

    async fn add_to_watchlist(&self, username: &str, movie_id: MovieId) -> RepositoryResult<()> {
        let mut catalogue = self.catalogue.write().await;
        let movie = catalogue.watched_movie(username, movie_id)?;
        let Some(user) = catalogue.user_mut(username) else {
            return Err(RepositoryError::not_found("user", username));
        };
        let added = user.add_to_watchlist(&movie);
        let watcher = user.username().unwrap_or_default().to_string();
        if added {
            if let Some(stored) = catalogue.movies.get_mut(&movie_id) {
                stored.add_watcher(&watcher);
            }
        }
        Ok(())
    }

    async fn remove_from_watchlist(
        &self,
        username: &str,
        movie_id: MovieId,
    ) -> RepositoryResult<()> {
        let mut catalogue = self.catalogue.write().await;
        let movie = catalogue.watched_movie(username, movie_id)?;
        let Some(user) = catalogue.user_mut(username) else {
            return Err(RepositoryError::not_found("user", username));
        };
        let removed = user.remove_from_watchlist(&movie);
        let watcher = user.username().unwrap_or_default().to_string();
        if removed {
            if let Some(stored) = catalogue.movies.get_mut(&movie_id) {
                stored.remove_watcher(&watcher);
            }
        }
        Ok(())
    }

    async fn populate(&self, path: &Path) -> RepositoryResult<usize> {
        let records = ingest::read_csv_file(path)?;
        let mut catalogue = self.catalogue.write().await;
        let mut added = 0;
        for record in &records {
            let (_, inserted) = catalogue.insert_movie(record.to_movie()?)?;
            added += usize::from(inserted);
        }
        info!(
            movies = catalogue.movies.len(),
            actors = catalogue.actors.len(),
            directors = catalogue.directors.len(),
            genres = catalogue.genres.len(),
            "populated in-memory catalogue"
        );
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use jiff::Timestamp;

    use super::*;
    use crate::models::make_review;

    fn catalogue_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("data/movies.csv")
    }

    async fn populated() -> MemoryRepository {
        let repo = MemoryRepository::new();
        repo.populate(&catalogue_path()).await.unwrap();
        repo
    }

    fn titles(movies: &[Movie]) -> Vec<&str> {
        movies.iter().filter_map(Movie::title).collect()
    }

    #[tokio::test]
    async fn populate_loads_every_row() {
        let repo = populated().await;
        assert_eq!(repo.get_number_of_movies().await.unwrap(), 5);
        assert_eq!(repo.get_genres().await.unwrap().len(), 10);
        assert_eq!(repo.get_actors().await.unwrap().len(), 20);
        assert_eq!(repo.get_directors().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn movies_stay_sorted_as_they_arrive() {
        let repo = MemoryRepository::new();
        repo.add_movie(Movie::new("Zodiac", 2007)).await.unwrap();
        repo.add_movie(Movie::new("Alien", 1979)).await.unwrap();
        repo.add_movie(Movie::new("21 Grams", 2003)).await.unwrap();
        repo.add_movie(Movie::new("Heat", 1995)).await.unwrap();

        let first = repo.get_first_movie().await.unwrap().unwrap();
        let last = repo.get_last_movie().await.unwrap().unwrap();
        assert_eq!(first.title(), Some("21 Grams"));
        assert_eq!(last.title(), Some("Zodiac"));
        assert_eq!(repo.get_all_letters().await.unwrap(), ['2', 'A', 'H', 'Z']);
    }

    #[tokio::test]
    async fn add_movie_assigns_next_id_and_ignores_duplicates() {
        let repo = populated().await;
        let id = repo.add_movie(Movie::new("Heat", 1995)).await.unwrap();
        assert_eq!(id, 6);

        let again = repo.add_movie(Movie::new("Heat", 1995)).await.unwrap();
        assert_eq!(again, 6);
        let clash = repo.add_movie(Movie::with_id(1, "Something Else", 2001)).await.unwrap();
        assert_eq!(clash, 1);
        assert_eq!(repo.get_number_of_movies().await.unwrap(), 6);
        let kept = repo.get_movie(1).await.unwrap().unwrap();
        assert_eq!(kept.title(), Some("Guardians of the Galaxy"));
    }

    #[tokio::test]
    async fn letter_buckets_and_navigation() {
        let repo = populated().await;
        let s_movies = repo.get_movies_by_letter("S").await.unwrap();
        assert_eq!(titles(&s_movies), ["Sing", "Split", "Suicide Squad"]);
        assert!(repo.get_movies_by_letter("A").await.unwrap().is_empty());

        let guardians = repo.get_movie(1).await.unwrap().unwrap();
        assert_eq!(repo.get_letter_of_next_movie(&guardians).await.unwrap(), Some('P'));
        assert_eq!(repo.get_letter_of_previous_movie(&guardians).await.unwrap(), None);

        let squad = repo.get_movie(5).await.unwrap().unwrap();
        assert_eq!(repo.get_letter_of_next_movie(&squad).await.unwrap(), None);
        assert_eq!(repo.get_letter_of_previous_movie(&squad).await.unwrap(), Some('P'));

        let unknown = Movie::new("Heat", 1995);
        assert_eq!(repo.get_letter_of_next_movie(&unknown).await.unwrap(), None);
    }

    #[tokio::test]
    async fn actors_know_their_colleagues() {
        let repo = populated().await;
        let pratt = repo.get_actor("Chris Pratt").await.unwrap().unwrap();
        assert_eq!(pratt.movies(), [1]);
        assert!(pratt.has_worked_with(&Actor::new("Vin Diesel")));
        assert!(!pratt.has_worked_with(&Actor::new("Chris Pratt")));
        assert!(repo.get_actor("Nobody Atall").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_movies_carry_name_only_references() {
        let repo = populated().await;
        let movie = repo.get_movie(1).await.unwrap().unwrap();
        assert!(movie.actors().iter().all(|actor| actor.movies().is_empty()));
        let gunn = repo.get_director("James Gunn").await.unwrap().unwrap();
        assert_eq!(gunn.movies(), [1]);
    }

    #[tokio::test]
    async fn review_links_user_and_movie() {
        let repo = populated().await;
        let mut user = User::new("Dave", "123456789");
        repo.add_user(user.clone()).await.unwrap();
        let mut movie = repo.get_movie(2).await.unwrap().unwrap();

        let review = make_review("Creepy.", &mut user, &mut movie, 8, Timestamp::UNIX_EPOCH);
        repo.add_review(review.clone()).await.unwrap();
        repo.add_review(review.clone()).await.unwrap();

        assert_eq!(repo.get_reviews().await.unwrap(), [review.clone()]);
        let stored = repo.get_movie(2).await.unwrap().unwrap();
        assert_eq!(stored.reviews(), [review.clone()]);
        let dave = repo.get_user("dave").await.unwrap().unwrap();
        assert_eq!(dave.reviews(), [review]);
    }

    #[tokio::test]
    async fn review_for_unstored_user_is_rejected() {
        let repo = populated().await;
        let user = User::new("ghost", "boo");
        let movie = repo.get_movie(2).await.unwrap().unwrap();
        let review = Review::new(Some(&user), Some(&movie), "?", 5, Timestamp::UNIX_EPOCH);

        let err = repo.add_review(review).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Integrity(_)));
        assert!(repo.get_reviews().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watchlist_round_trip() {
        let repo = populated().await;
        repo.add_user(User::new("fmercury", "8734gfe2058v")).await.unwrap();
        repo.add_to_watchlist("fmercury", 3).await.unwrap();
        repo.add_to_watchlist("fmercury", 3).await.unwrap();

        let user = repo.get_user("fmercury").await.unwrap().unwrap();
        assert_eq!(user.watchlist().size(), 1);
        let split = repo.get_movie(3).await.unwrap().unwrap();
        assert_eq!(split.watchers(), ["fmercury"]);

        repo.remove_from_watchlist("fmercury", 3).await.unwrap();
        let user = repo.get_user("fmercury").await.unwrap().unwrap();
        assert!(user.watchlist().is_empty());
        assert!(repo.get_movie(3).await.unwrap().unwrap().watchers().is_empty());

        let err = repo.add_to_watchlist("fmercury", 42).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: "movie", .. }));
        let err = repo.add_to_watchlist("nobody", 3).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: "user", .. }));
    }
}
