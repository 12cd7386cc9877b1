use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::Context;

/// Which [`MovieRepository`](crate::repository::MovieRepository) the binary
/// runs against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Memory,
    Database,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "database" => Ok(Self::Database),
            other => anyhow::bail!("unknown repository backend {other:?}"),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Database => "database",
        })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub backend: Backend,
    pub database_url: String,
    pub data_path: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match std::env::var("REPOSITORY") {
            Ok(raw) => raw.parse().context("REPOSITORY")?,
            Err(_) => Backend::default(),
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://marquee.db?mode=rwc".to_string());

        let data_path = std::env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/movies.csv"));

        Ok(Self { backend, database_url, data_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("memory".parse::<Backend>().unwrap(), Backend::Memory);
        assert_eq!(" Database ".parse::<Backend>().unwrap(), Backend::Database);
        assert!("postgres".parse::<Backend>().is_err());
        assert_eq!(Backend::Database.to_string(), "database");
    }
}
