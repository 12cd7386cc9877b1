use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
};

use jiff::Timestamp;

use crate::error::ModelError;

pub type MovieId = i32;

/// Pseudo-bucket holding every movie whose first letter is a digit.
pub const NUMBERS: &str = "Numbers";

/// Fixed browse alphabet: the digit bucket followed by `A`..`Z`.
pub fn alphabet() -> Vec<String> {
    std::iter::once(NUMBERS.to_string()).chain(('A'..='Z').map(String::from)).collect()
}

/// First ASCII letter or digit of `title` (letters upper-cased), falling back
/// to the raw first character when the title has neither.
pub fn first_letter(title: &str) -> Option<char> {
    title
        .chars()
        .find(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .or_else(|| title.chars().next())
}

/// The title from its first letter onwards, with that letter normalized.
/// Ordering movies by this key keeps every letter bucket contiguous.
pub fn sort_title(title: &str) -> String {
    match title.char_indices().find(|(_, c)| c.is_ascii_alphanumeric()) {
        Some((pos, c)) => {
            let rest = &title[pos + c.len_utf8()..];
            let mut key = String::with_capacity(rest.len() + 1);
            key.push(c.to_ascii_uppercase());
            key.push_str(rest);
            key
        },
        None => title.to_string(),
    }
}

pub fn normalize_username(raw: &str) -> Option<String> {
    clean(&raw.to_lowercase())
}

fn clean(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn rating_from(rating: i32) -> Option<u8> {
    (1..=10).contains(&rating).then_some(rating as u8)
}

macro_rules! identified_by {
    ($ty:ident, $field:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.$field == other.$field
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> Ordering {
                self.$field.cmp(&other.$field)
            }
        }

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.$field.hash(state);
            }
        }
    };
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    if items.contains(&item) {
        return false;
    }
    items.push(item);
    true
}

#[derive(Clone, Debug, Default)]
pub struct Actor {
    full_name: Option<String>,
    colleagues: Vec<String>,
    movies: Vec<MovieId>,
}

identified_by!(Actor, full_name);

impl Actor {
    pub fn new(full_name: &str) -> Self {
        Self { full_name: clean(full_name), ..Default::default() }
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    pub fn colleagues(&self) -> &[String] {
        &self.colleagues
    }

    pub fn movies(&self) -> &[MovieId] {
        &self.movies
    }

    pub fn add_colleague(&mut self, colleague: &Actor) {
        let Some(name) = colleague.full_name() else {
            return;
        };
        if self.full_name() == Some(name) {
            return;
        }
        push_unique(&mut self.colleagues, name.to_string());
    }

    pub fn has_worked_with(&self, colleague: &Actor) -> bool {
        colleague.full_name().is_some_and(|name| self.colleagues.iter().any(|c| c == name))
    }

    /// The name alone, without colleagues or filmography.
    pub(crate) fn detached(&self) -> Actor {
        Actor { full_name: self.full_name.clone(), ..Default::default() }
    }

    pub(crate) fn add_movie(&mut self, id: MovieId) {
        push_unique(&mut self.movies, id);
    }
}

#[derive(Clone, Debug, Default)]
pub struct Director {
    full_name: Option<String>,
    movies: Vec<MovieId>,
}

identified_by!(Director, full_name);

impl Director {
    pub fn new(full_name: &str) -> Self {
        Self { full_name: clean(full_name), movies: Vec::new() }
    }

    pub(crate) fn detached(&self) -> Director {
        Director { full_name: self.full_name.clone(), movies: Vec::new() }
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    pub fn movies(&self) -> &[MovieId] {
        &self.movies
    }

    pub(crate) fn add_movie(&mut self, id: MovieId) {
        push_unique(&mut self.movies, id);
    }
}

#[derive(Clone, Debug, Default)]
pub struct Genre {
    name: Option<String>,
    movies: Vec<MovieId>,
}

identified_by!(Genre, name);

impl Genre {
    pub fn new(name: &str) -> Self {
        Self { name: clean(name), movies: Vec::new() }
    }

    pub(crate) fn detached(&self) -> Genre {
        Genre { name: self.name.clone(), movies: Vec::new() }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn movies(&self) -> &[MovieId] {
        &self.movies
    }

    pub(crate) fn add_movie(&mut self, id: MovieId) {
        push_unique(&mut self.movies, id);
    }
}

/// A review of one movie by one user.
///
/// The review itself is owned by a repository's review collection; `user` and
/// `movie` are keys pointing back at its author and subject.
#[derive(Clone, Debug)]
pub struct Review {
    user: Option<String>,
    movie: Option<MovieId>,
    text: String,
    rating: Option<u8>,
    timestamp: Timestamp,
}

impl Review {
    /// Builds an unlinked review. Use [`make_review`] to also attach it to the
    /// user's and movie's review lists.
    pub fn new(
        user: Option<&User>,
        movie: Option<&Movie>,
        text: &str,
        rating: i32,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            user: user.and_then(|u| u.username.clone()),
            movie: movie.and_then(Movie::id),
            text: text.to_string(),
            rating: rating_from(rating),
            timestamp,
        }
    }

    pub(crate) fn restore(
        user: Option<String>,
        movie: MovieId,
        text: String,
        rating: Option<i32>,
        timestamp: Timestamp,
    ) -> Self {
        Self { user, movie: Some(movie), text, rating: rating.and_then(rating_from), timestamp }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn movie(&self) -> Option<MovieId> {
        self.movie
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rating(&self) -> Option<u8> {
        self.rating
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl PartialEq for Review {
    fn eq(&self, other: &Self) -> bool {
        self.movie == other.movie
            && self.text == other.text
            && self.rating == other.rating
            && self.timestamp == other.timestamp
    }
}

impl Eq for Review {}

#[derive(Clone, Debug, Default)]
pub struct Movie {
    id: Option<MovieId>,
    title: Option<String>,
    year: Option<i32>,
    description: Option<String>,
    director: Option<Director>,
    runtime_minutes: Option<u32>,
    genres: Vec<Genre>,
    actors: Vec<Actor>,
    reviews: Vec<Review>,
    watchers: Vec<String>,
    first_letter: Option<char>,
}

impl Movie {
    /// Years before 1900 are treated as unknown.
    pub fn new(title: &str, year: i32) -> Self {
        let mut movie = Self { year: (year >= 1900).then_some(year), ..Default::default() };
        movie.set_title(title);
        movie
    }

    pub fn with_id(id: MovieId, title: &str, year: i32) -> Self {
        let mut movie = Self::new(title, year);
        movie.id = Some(id);
        movie
    }

    pub fn id(&self) -> Option<MovieId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: MovieId) {
        self.id = Some(id);
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = clean(title);
        self.first_letter = self.title.as_deref().and_then(first_letter);
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = clean(description);
    }

    pub fn director(&self) -> Option<&Director> {
        self.director.as_ref()
    }

    pub fn set_director(&mut self, director: Director) {
        self.director = Some(director);
    }

    pub fn runtime_minutes(&self) -> Option<u32> {
        self.runtime_minutes
    }

    pub fn set_runtime_minutes(&mut self, minutes: i32) -> Result<(), ModelError> {
        if minutes <= 0 {
            return Err(ModelError::InvalidRuntime(minutes));
        }
        self.runtime_minutes = Some(minutes as u32);
        Ok(())
    }

    pub fn genres(&self) -> &[Genre] {
        &self.genres
    }

    pub fn set_genres(&mut self, genres: Vec<Genre>) {
        self.genres.clear();
        genres.into_iter().for_each(|g| self.add_genre(g));
    }

    pub fn add_genre(&mut self, genre: Genre) {
        push_unique(&mut self.genres, genre);
    }

    pub fn remove_genre(&mut self, genre: &Genre) {
        self.genres.retain(|g| g != genre);
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn set_actors(&mut self, actors: Vec<Actor>) {
        self.actors.clear();
        actors.into_iter().for_each(|a| self.add_actor(a));
    }

    pub fn add_actor(&mut self, actor: Actor) {
        push_unique(&mut self.actors, actor);
    }

    pub fn remove_actor(&mut self, actor: &Actor) {
        self.actors.retain(|a| a != actor);
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn add_review(&mut self, review: Review) {
        push_unique(&mut self.reviews, review);
    }

    /// Usernames whose watchlist holds this movie.
    pub fn watchers(&self) -> &[String] {
        &self.watchers
    }

    pub(crate) fn add_watcher(&mut self, username: &str) {
        push_unique(&mut self.watchers, username.to_string());
    }

    pub(crate) fn remove_watcher(&mut self, username: &str) {
        self.watchers.retain(|w| w != username);
    }

    pub fn first_letter(&self) -> Option<char> {
        self.first_letter
    }

    pub fn sort_title(&self) -> String {
        self.title.as_deref().map(sort_title).unwrap_or_default()
    }

    /// Copy whose director, genres and actors are bare name references and
    /// which carries no reviews or watchers. Stores keep back-references in
    /// their own tables.
    pub(crate) fn detached(&self) -> Movie {
        Movie {
            id: self.id,
            title: self.title.clone(),
            year: self.year,
            description: self.description.clone(),
            director: self.director.as_ref().and_then(Director::full_name).map(Director::new),
            runtime_minutes: self.runtime_minutes,
            genres: self.genres.iter().filter_map(Genre::name).map(Genre::new).collect(),
            actors: self.actors.iter().filter_map(Actor::full_name).map(Actor::new).collect(),
            reviews: Vec::new(),
            watchers: Vec::new(),
            first_letter: self.first_letter,
        }
    }
}

impl PartialEq for Movie {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.year == other.year
    }
}

impl Eq for Movie {}

impl PartialOrd for Movie {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Movie {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_title()
            .cmp(&other.sort_title())
            .then_with(|| self.year.cmp(&other.year))
            .then_with(|| self.title.cmp(&other.title))
    }
}

impl Hash for Movie {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state);
        self.year.hash(state);
    }
}

/// Movies a user wants to watch later, in the order they were added.
#[derive(Clone, Debug, Default)]
pub struct WatchList {
    owner: Option<String>,
    movies: Vec<Movie>,
}

impl WatchList {
    pub fn new(owner: Option<String>) -> Self {
        Self { owner, movies: Vec::new() }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Returns `false` when the movie was already listed.
    pub fn add_movie(&mut self, movie: Movie) -> bool {
        push_unique(&mut self.movies, movie)
    }

    pub fn remove_movie(&mut self, movie: &Movie) -> bool {
        let before = self.movies.len();
        self.movies.retain(|m| m != movie);
        self.movies.len() != before
    }

    pub fn select_movie_to_watch(&self, index: usize) -> Option<&Movie> {
        self.movies.get(index)
    }

    pub fn first_movie_in_watchlist(&self) -> Option<&Movie> {
        self.movies.first()
    }

    pub fn contains(&self, movie: &Movie) -> bool {
        self.movies.contains(movie)
    }

    pub fn size(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Movie> {
        self.movies.iter()
    }

    pub(crate) fn movies_mut(&mut self) -> std::slice::IterMut<'_, Movie> {
        self.movies.iter_mut()
    }
}

impl<'a> IntoIterator for &'a WatchList {
    type Item = &'a Movie;
    type IntoIter = std::slice::Iter<'a, Movie>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Clone, Debug, Default)]
pub struct User {
    username: Option<String>,
    password: Option<String>,
    watched_movies: Vec<Movie>,
    reviews: Vec<Review>,
    watchlist: WatchList,
    time_spent_watching_movies: u32,
}

identified_by!(User, username);

impl User {
    /// `password` is stored as given; hashing happens before it gets here.
    pub fn new(username: &str, password: &str) -> Self {
        let username = normalize_username(username);
        Self {
            watchlist: WatchList::new(username.clone()),
            username,
            password: (!password.is_empty()).then(|| password.to_string()),
            ..Default::default()
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Credentials only. Reviews and watchlist entries reach a stored user
    /// through the repository, never with the user value itself.
    pub(crate) fn detached(&self) -> User {
        User {
            username: self.username.clone(),
            password: self.password.clone(),
            watchlist: WatchList::new(self.username.clone()),
            ..Default::default()
        }
    }

    pub fn watched_movies(&self) -> &[Movie] {
        &self.watched_movies
    }

    pub fn time_spent_watching_movies(&self) -> u32 {
        self.time_spent_watching_movies
    }

    /// Rewatching counts towards the time spent but is only listed once.
    pub fn watch_movie(&mut self, movie: &Movie) {
        push_unique(&mut self.watched_movies, movie.clone());
        self.time_spent_watching_movies += movie.runtime_minutes().unwrap_or(0);
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn add_review(&mut self, review: Review) {
        push_unique(&mut self.reviews, review);
    }

    pub fn watchlist(&self) -> &WatchList {
        &self.watchlist
    }

    pub fn add_to_watchlist(&mut self, movie: &Movie) -> bool {
        self.watchlist.add_movie(movie.clone())
    }

    pub fn remove_from_watchlist(&mut self, movie: &Movie) -> bool {
        self.watchlist.remove_movie(movie)
    }

    pub(crate) fn watchlist_mut(&mut self) -> &mut WatchList {
        &mut self.watchlist
    }
}

/// Creates a review and links it into both the user's and the movie's review
/// lists.
pub fn make_review(
    text: &str,
    user: &mut User,
    movie: &mut Movie,
    rating: i32,
    timestamp: Timestamp,
) -> Review {
    let review = Review::new(Some(user), Some(movie), text, rating, timestamp);
    user.add_review(review.clone());
    movie.add_review(review.clone());
    review
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guardians() -> Movie {
        Movie::with_id(1, "Guardians of the Galaxy", 2014)
    }

    #[test]
    fn movie_construction() {
        let movie = guardians();
        assert_eq!(movie.id(), Some(1));
        assert_eq!(movie.title(), Some("Guardians of the Galaxy"));
        assert_eq!(movie.year(), Some(2014));
        assert!(movie.director().is_none());
        assert!(movie.description().is_none());
        assert!(movie.runtime_minutes().is_none());
        assert!(movie.actors().is_empty());
        assert!(movie.genres().is_empty());
        assert!(movie.reviews().is_empty());
        assert_eq!(movie.first_letter(), Some('G'));
    }

    #[test]
    fn movie_normalizes_invalid_input() {
        let movie = Movie::new("   ", 1850);
        assert!(movie.title().is_none());
        assert!(movie.year().is_none());
        assert!(movie.first_letter().is_none());

        let movie = Movie::new("  Split  ", 2016);
        assert_eq!(movie.title(), Some("Split"));
    }

    #[test]
    fn first_letter_skips_punctuation_and_prefers_first_alphanumeric() {
        assert_eq!(first_letter("(500) Days of Summer"), Some('5'));
        assert_eq!(first_letter("10 Cloverfield Lane"), Some('1'));
        assert_eq!(first_letter("xXx"), Some('X'));
        assert_eq!(first_letter("...!"), Some('.'));
        assert_eq!(first_letter(""), None);
    }

    #[test]
    fn first_letter_follows_title_changes() {
        let mut movie = Movie::new("Prometheus", 2012);
        movie.set_title("Alien");
        assert_eq!(movie.first_letter(), Some('A'));
    }

    #[test]
    fn movie_ordering() {
        let prometheus = Movie::new("Prometheus", 2012);
        assert!(guardians() < prometheus);

        let older = Movie::new("Dune", 1984);
        let newer = Movie::new("Dune", 2021);
        assert!(older < newer);

        // ordering is by the normalized title, so punctuation does not jump buckets
        assert!(Movie::new("(500) Days of Summer", 2009) < Movie::new("A Quiet Place", 2018));
        assert!(Movie::new("xXx", 2002) < Movie::new("Zootopia", 2016));
    }

    #[test]
    fn movie_equality_ignores_id() {
        assert_eq!(guardians(), Movie::new("Guardians of the Galaxy", 2014));
        assert_ne!(guardians(), Movie::new("Guardians of the Galaxy", 2017));
    }

    #[test]
    fn runtime_must_be_positive() {
        let mut movie = guardians();
        assert_eq!(movie.set_runtime_minutes(0), Err(ModelError::InvalidRuntime(0)));
        assert!(movie.runtime_minutes().is_none());
        movie.set_runtime_minutes(121).unwrap();
        assert_eq!(movie.runtime_minutes(), Some(121));
    }

    #[test]
    fn movie_people_are_deduplicated() {
        let mut movie = guardians();
        movie.add_actor(Actor::new("Chris Pratt"));
        movie.add_actor(Actor::new(" Chris Pratt "));
        movie.add_genre(Genre::new("Action"));
        movie.add_genre(Genre::new("Action"));
        assert_eq!(movie.actors().len(), 1);
        assert_eq!(movie.genres().len(), 1);

        movie.remove_actor(&Actor::new("Chris Pratt"));
        movie.remove_genre(&Genre::new("Horror"));
        assert!(movie.actors().is_empty());
        assert_eq!(movie.genres().len(), 1);
    }

    #[test]
    fn names_are_trimmed_or_dropped() {
        assert_eq!(Director::new(" Taika Waititi ").full_name(), Some("Taika Waititi"));
        assert!(Director::new("").full_name().is_none());
        assert!(Genre::new("  ").name().is_none());
        assert_eq!(Actor::new("Chris Pratt"), Actor::new("Chris Pratt "));
        assert!(Actor::new("Bradley Cooper") < Actor::new("Chris Pratt"));
    }

    #[test]
    fn actor_colleagues() {
        let mut pratt = Actor::new("Chris Pratt");
        let diesel = Actor::new("Vin Diesel");
        pratt.add_colleague(&diesel);
        pratt.add_colleague(&diesel);
        pratt.add_colleague(&pratt.clone());
        assert_eq!(pratt.colleagues(), ["Vin Diesel".to_string()]);
        assert!(pratt.has_worked_with(&diesel));
        assert!(!pratt.has_worked_with(&Actor::new("Noomi Rapace")));
    }

    #[test]
    fn user_construction() {
        let user = User::new("  DBowie ", "1234567890");
        assert_eq!(user.username(), Some("dbowie"));
        assert_eq!(user.password(), Some("1234567890"));
        assert!(user.reviews().is_empty());
        assert_eq!(user.watchlist().owner(), Some("dbowie"));
        assert_eq!(user, User::new("dbowie", "other"));
    }

    #[test]
    fn user_watch_movie_accumulates_runtime() {
        let mut user = User::new("shaun", "pw");
        let mut movie = guardians();
        movie.set_runtime_minutes(121).unwrap();
        user.watch_movie(&movie);
        user.watch_movie(&movie);
        assert_eq!(user.watched_movies().len(), 1);
        assert_eq!(user.time_spent_watching_movies(), 242);
    }

    #[test]
    fn review_rating_out_of_range_is_dropped() {
        let movie = guardians();
        let review = Review::new(None, Some(&movie), "meh", 11, Timestamp::UNIX_EPOCH);
        assert!(review.rating().is_none());
        assert_eq!(review.movie(), Some(1));
        assert!(review.user().is_none());
    }

    #[test]
    fn make_review_establishes_relationships() {
        let mut user = User::new("dbowie", "pw");
        let mut movie = guardians();
        let review = make_review("Action packed!", &mut user, &mut movie, 9, Timestamp::now());

        assert!(user.reviews().contains(&review));
        assert!(movie.reviews().contains(&review));
        assert_eq!(review.user(), Some("dbowie"));
        assert_eq!(review.movie(), Some(1));
        assert_eq!(review.rating(), Some(9));
    }

    #[test]
    fn watchlist_membership_is_idempotent() {
        let mut watchlist = WatchList::new(Some("shaun".to_string()));
        let prometheus = Movie::with_id(2, "Prometheus", 2012);
        assert!(watchlist.add_movie(guardians()));
        assert!(watchlist.add_movie(prometheus.clone()));
        assert!(!watchlist.add_movie(guardians()));
        assert_eq!(watchlist.size(), 2);
        assert_eq!(watchlist.first_movie_in_watchlist(), Some(&guardians()));
        assert_eq!(watchlist.select_movie_to_watch(1), Some(&prometheus));
        assert!(watchlist.select_movie_to_watch(2).is_none());

        assert!(watchlist.remove_movie(&guardians()));
        assert!(!watchlist.remove_movie(&guardians()));
        let titles: Vec<_> = watchlist.iter().filter_map(Movie::title).collect();
        assert_eq!(titles, ["Prometheus"]);
    }

    #[test]
    fn alphabet_starts_with_numbers_bucket() {
        let letters = alphabet();
        assert_eq!(letters.len(), 27);
        assert_eq!(letters[0], NUMBERS);
        assert_eq!(letters[1], "A");
        assert_eq!(letters[26], "Z");
    }
}
