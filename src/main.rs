use std::sync::Arc;

use marquee::{
    config::{Backend, Config},
    database::DatabaseRepository,
    memory::MemoryRepository,
    repository::MovieRepository,
    services,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,marquee=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let repo: Arc<dyn MovieRepository> = match config.backend {
        Backend::Memory => Arc::new(MemoryRepository::new()),
        Backend::Database => Arc::new(DatabaseRepository::connect(&config.database_url).await?),
    };
    repo.populate(&config.data_path).await?;

    let movies = repo.get_number_of_movies().await?;
    tracing::info!(backend = %config.backend, movies, "catalogue loaded");

    for letter in repo.alphabet() {
        let page = services::movies_by_letter(repo.as_ref(), &letter).await?;
        if page.movies.is_empty() {
            continue;
        }
        println!("{}", page.letter);
        for movie in &page.movies {
            println!(
                "  {} ({})",
                movie.title().unwrap_or("untitled"),
                movie.year().map_or_else(|| "?".to_string(), |year| year.to_string())
            );
        }
    }

    Ok(())
}
