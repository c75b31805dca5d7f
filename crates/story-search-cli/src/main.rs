// ============================================================================
// story-search - operator CLI for the story search engine
// ============================================================================
// Usage:
//   story-search search --stories FILE [--limit N] [--threshold T]
//                [--filter field=value ...] [--json] QUERY
//   story-search extract --title TITLE TEXT       Annotate a story
//   story-search parse-query QUERY                Show parsed query params
//   story-search embed TEXT                       Embed text, show summary
//   story-search stats --stories FILE             Index a file, show stats
//
// Configuration comes from the environment (.env is loaded first) or from
// a JSON file passed with --config.
// ============================================================================

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use story_search_core::embeddings::create_embedding_provider;
use story_search_core::extract::create_metadata_extractor;
use story_search_core::{
    EmbeddingProvider, EngineConfig, HashEmbeddingProvider, MetadataExtractor, SearchOptions,
    SearchResponse, StoryRecord, StorySearchEngine,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Semantic search over short stories
#[derive(Parser)]
#[command(name = "story-search", version, about = "Index and search short stories")]
struct Cli {
    /// JSON configuration file (default: environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the Qdrant backend regardless of configuration
    #[arg(long, global = true)]
    qdrant: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a stories file and run one query against it
    Search {
        /// JSON array of story records
        #[arg(long)]
        stories: PathBuf,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum cosine similarity
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f32>,

        /// Explicit constraint, repeatable: --filter interests=art
        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,

        query: String,
    },

    /// Print extracted metadata for a story text
    Extract {
        #[arg(long, default_value = "")]
        title: String,

        text: String,
    },

    /// Print the rewritten query and parsed parameters
    ParseQuery { query: String },

    /// Embed text and print dimension, norm and leading components
    Embed { text: String },

    /// Index a stories file and print engine statistics
    Stats {
        #[arg(long)]
        stories: PathBuf,
    },
}

fn load_config(path: Option<&Path>, force_qdrant: bool) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_json(&raw)?
        }
        None => EngineConfig::from_env()?,
    };
    if force_qdrant {
        config.qdrant.enabled = true;
    }
    Ok(config)
}

fn load_stories(path: &Path) -> Result<Vec<StoryRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stories {}", path.display()))?;
    let stories: Vec<StoryRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of stories", path.display()))?;
    Ok(stories)
}

/// `field=value` into its two halves
fn parse_filter(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() && !value.trim().is_empty() => {
            Ok((field.trim().to_string(), value.trim().to_string()))
        }
        _ => anyhow::bail!("Invalid filter '{}'. Expected FIELD=VALUE", raw),
    }
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("story_search_core=info,story_search=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.qdrant)?;

    match cli.command {
        Commands::Search {
            stories,
            limit,
            threshold,
            filters,
            json,
            query,
        } => cmd_search(config, &stories, limit, threshold, &filters, json, &query).await,
        Commands::Extract { title, text } => cmd_extract(&config, &title, &text).await,
        Commands::ParseQuery { query } => cmd_parse_query(&config, &query).await,
        Commands::Embed { text } => cmd_embed(&config, &text).await,
        Commands::Stats { stories } => cmd_stats(config, &stories).await,
    }
}

async fn indexed_engine(config: EngineConfig, stories: &Path) -> Result<StorySearchEngine> {
    let records = load_stories(stories)?;
    let engine = StorySearchEngine::from_config(config).await?;
    let ids = engine.add_stories(records).await?;
    info!("Indexed {} stories into {}", ids.len(), engine.backend_name());
    Ok(engine)
}

async fn cmd_search(
    config: EngineConfig,
    stories: &Path,
    limit: Option<usize>,
    threshold: Option<f32>,
    filters: &[String],
    json: bool,
    query: &str,
) -> Result<()> {
    let mut options = SearchOptions {
        limit,
        threshold,
        ..Default::default()
    };
    for raw in filters {
        let (field, value) = parse_filter(raw)?;
        options = options.with_filter(&field, &value);
    }

    let engine = indexed_engine(config, stories).await?;
    let response = engine.search(query, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &SearchResponse) {
    println!(
        "Query: \"{}\" ({} intent)",
        response.rewritten_query, response.params.intent
    );
    let constrained = response.params.constrained_fields();
    if !constrained.is_empty() {
        let names: Vec<String> = constrained
            .iter()
            .map(|f| f.payload_key().to_string())
            .collect();
        println!("Filters: {}", names.join(", "));
    }
    println!();

    if response.results.is_empty() {
        println!("No stories found.");
        return;
    }

    println!("{:>4}  {:>6}  {:<36}  {:<12}  {}", "#", "SCORE", "ID", "CREATED", "TITLE");
    println!("{}", "-".repeat(90));
    for (rank, result) in response.results.iter().enumerate() {
        let core = &result.record.metadata.core;
        println!(
            "{:>4}  {:>6.3}  {:<36}  {:<12}  {}",
            rank + 1,
            result.score,
            result.record.id,
            format_timestamp(core.created_at),
            core.title
        );
    }

    println!(
        "\n{} of {} indexed stories matched",
        response.results_found, response.total_indexed
    );
}

async fn cmd_extract(config: &EngineConfig, title: &str, text: &str) -> Result<()> {
    let extractor = create_metadata_extractor(&config.extraction);
    let metadata = extractor.extract_metadata(text, title).await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

async fn cmd_parse_query(config: &EngineConfig, query: &str) -> Result<()> {
    let extractor = create_metadata_extractor(&config.extraction);
    let analysis = extractor.extract_query_params(query).await?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

async fn cmd_embed(config: &EngineConfig, text: &str) -> Result<()> {
    let provider = create_embedding_provider(&config.embedding);
    let (source, vector) = match provider.embed(text).await {
        Ok(vector) => (provider.name().to_string(), vector),
        Err(e) => {
            warn!("Embedding via {} failed, using hash embedding: {}", provider.name(), e);
            let fallback = HashEmbeddingProvider::new(config.embedding.dimension);
            ("hash (fallback)".to_string(), fallback.embed_text(text))
        }
    };

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    let head: Vec<String> = vector.iter().take(8).map(|x| format!("{:.4}", x)).collect();

    println!("Provider:  {}", source);
    println!("Dimension: {}", vector.len());
    println!("Norm:      {:.6}", norm);
    println!("Head:      [{}]", head.join(", "));
    Ok(())
}

async fn cmd_stats(config: EngineConfig, stories: &Path) -> Result<()> {
    let engine = indexed_engine(config, stories).await?;
    let stats = engine.stats().await;

    println!("=== Story Search Engine Stats ===");
    println!("Backend:    {}{}", stats.backend, if stats.mirrored { " (+ memory mirror)" } else { "" });
    println!("Embedder:   {} (dim {})", stats.embedder, stats.dimension);
    println!("Extractor:  {}", stats.extractor);
    println!("Indexed:    {}", stats.indexed);
    println!();
    println!("Cache:      {} entries, {} hits, {} misses", stats.cache_size, stats.cache_hits, stats.cache_misses);
    println!("Fallbacks:");
    println!("  provider   {}", stats.provider_fallbacks);
    println!("  extraction {}", stats.extraction_fallbacks);
    println!("  backend    {}", stats.backend_fallbacks);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("interests=art").unwrap(),
            ("interests".to_string(), "art".to_string())
        );
        assert_eq!(
            parse_filter(" age = 25-35 ").unwrap(),
            ("age".to_string(), "25-35".to_string())
        );
        assert!(parse_filter("interests").is_err());
        assert!(parse_filter("=art").is_err());
    }

    #[test]
    fn test_cli_parses_search() {
        let cli = Cli::try_parse_from([
            "story-search",
            "search",
            "--stories",
            "stories.json",
            "--threshold",
            "-0.5",
            "--filter",
            "interests=art",
            "--filter",
            "age=30+",
            "someone who loves art",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                threshold,
                filters,
                query,
                ..
            } => {
                assert_eq!(threshold, Some(-0.5));
                assert_eq!(filters, vec!["interests=art", "age=30+"]);
                assert_eq!(query, "someone who loves art");
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01");
    }
}
