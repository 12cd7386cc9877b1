pub mod actor;
pub mod director;
pub mod genre;
pub mod movie;
pub mod movie_actor;
pub mod movie_genre;
pub mod review;
pub mod user;
pub mod watchlist_movie;
