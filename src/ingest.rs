//! Movie catalogue CSV parsing shared by both repository backends.

use std::{io, path::Path};

use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{ModelError, RepositoryResult},
    models::{Actor, Director, Genre, Movie, MovieId},
};

/// One catalogue row. Columns not listed here (rating, votes, ...) are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct MovieRecord {
    #[serde(rename = "Rank")]
    pub rank: MovieId,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Genre")]
    pub genres: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Director")]
    pub director: String,
    #[serde(rename = "Actors")]
    pub actors: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Runtime (Minutes)")]
    pub runtime_minutes: i32,
}

impl MovieRecord {
    pub fn genre_names(&self) -> impl Iterator<Item = &str> {
        split_list(&self.genres)
    }

    pub fn actor_names(&self) -> impl Iterator<Item = &str> {
        split_list(&self.actors)
    }

    /// Builds the movie this row describes, keyed by its rank.
    pub fn to_movie(&self) -> Result<Movie, ModelError> {
        let mut movie = Movie::with_id(self.rank, &self.title, self.year);
        movie.set_description(&self.description);
        movie.set_runtime_minutes(self.runtime_minutes)?;

        let director = Director::new(&self.director);
        if director.full_name().is_some() {
            movie.set_director(director);
        }
        self.genre_names().for_each(|name| movie.add_genre(Genre::new(name)));
        self.actor_names().for_each(|name| movie.add_actor(Actor::new(name)));
        Ok(movie)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub fn read_csv_file(path: &Path) -> RepositoryResult<Vec<MovieRecord>> {
    let records = parse(csv::Reader::from_path(path)?)?;
    debug!(path = %path.display(), rows = records.len(), "read movie catalogue");
    Ok(records)
}

pub fn read_csv<R: io::Read>(input: R) -> RepositoryResult<Vec<MovieRecord>> {
    parse(csv::Reader::from_reader(input))
}

fn parse<R: io::Read>(mut reader: csv::Reader<R>) -> RepositoryResult<Vec<MovieRecord>> {
    Ok(reader.deserialize().collect::<Result<Vec<MovieRecord>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;

    const HEADER: &str =
        "Rank,Title,Genre,Description,Director,Actors,Year,Runtime (Minutes),Rating,Votes\n";

    #[test]
    fn parses_lists_and_trims_names() {
        let csv = format!(
            "{HEADER}2,Prometheus,\"Adventure,Mystery,Sci-Fi\",A distant moon.,Ridley Scott,\"Noomi Rapace, Logan Marshall-Green, Michael Fassbender, Charlize Theron\",2012,124,7,485820\n"
        );
        let records = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);

        let movie = records[0].to_movie().unwrap();
        assert_eq!(movie.id(), Some(2));
        assert_eq!(movie.title(), Some("Prometheus"));
        assert_eq!(movie.year(), Some(2012));
        assert_eq!(movie.runtime_minutes(), Some(124));
        assert_eq!(movie.director().and_then(Director::full_name), Some("Ridley Scott"));
        let actors: Vec<_> = movie.actors().iter().filter_map(Actor::full_name).collect();
        assert_eq!(
            actors,
            ["Noomi Rapace", "Logan Marshall-Green", "Michael Fassbender", "Charlize Theron"]
        );
        let genres: Vec<_> = movie.genres().iter().filter_map(Genre::name).collect();
        assert_eq!(genres, ["Adventure", "Mystery", "Sci-Fi"]);
    }

    #[test]
    fn non_numeric_year_is_a_csv_error() {
        let csv = format!("{HEADER}1,Split,Horror,Kidnapped.,M. Night Shyamalan,James McAvoy,soon,117,7.3,1\n");
        assert!(matches!(read_csv(csv.as_bytes()), Err(RepositoryError::Csv(_))));
    }

    #[test]
    fn non_positive_runtime_is_rejected() {
        let csv = format!("{HEADER}1,Split,Horror,Kidnapped.,M. Night Shyamalan,James McAvoy,2016,0,7.3,1\n");
        let records = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(records[0].to_movie().unwrap_err(), ModelError::InvalidRuntime(0));
    }

    #[test]
    fn reads_bundled_catalogue() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/movies.csv");
        let records = read_csv_file(&path).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].title, "Guardians of the Galaxy");
    }
}
