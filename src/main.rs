//! CLI entry point for the image search service.
//!
//! Provides commands for configuring, querying and serving the ISS image
//! catalog. Main components: Cli parser, Commands enum, and async runtime
//! with HTTP/SSE server support.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use cupola::catalog::JsonCatalogSource;
use cupola::display::{THEME, create_results_table, create_stats_table};
use cupola::events::EventBroadcaster;
use cupola::tools::ToolDispatcher;
use cupola::{SearchEngine, SearchError, Settings};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic image search over ISS imagery
#[derive(Parser)]
#[command(
    name = "cupola",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic image search over ISS imagery",
    long_about = "Search the ISS image catalog in natural language and push results to live viewers.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ cupola init                      # Create .cupola/settings.toml\n  $ cupola search \"aurora from orbit\"  # One-off search\n  $ cupola serve                     # HTTP + SSE server"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dataset file to load instead of data.dataset_path
    #[arg(short, long, global = true, env = "CUPOLA_DATA")]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .cupola directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .cupola/settings.toml")]
    Config,

    /// Search the catalog once
    #[command(
        about = "Rank catalog images against a natural-language query",
        after_help = "Examples:\n  cupola search \"astronaut in the cupola\"\n  cupola search \"underwater EVA training\" --top-k 10\n  cupola search aurora --json"
    )]
    Search {
        /// Natural-language query
        query: String,

        /// Number of results (defaults to search.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show catalog statistics
    #[command(about = "Load the catalog and report readiness and counts")]
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start HTTP server
    #[command(
        about = "Start the HTTP server with the SSE event stream",
        after_help = "Examples:\n  cupola serve\n  cupola serve --bind 127.0.0.1:8080"
    )]
    Serve {
        /// Bind address (defaults to server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Entry point with tokio async runtime.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = &cli.command {
        if let Err(e) = Settings::init_config_file(*force) {
            eprintln!("{}", THEME.error_with_icon(&e.to_string()));
            std::process::exit(1);
        }
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    // Load configuration
    let mut settings = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).unwrap_or_else(|e| {
            eprintln!(
                "Configuration error loading from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        })
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })
    };

    if let Some(data) = &cli.data {
        settings.data.dataset_path = std::path::absolute(data)?;
    }
    if let Err(e) = settings.validate() {
        eprintln!("{}", THEME.error_with_icon(&format!("Invalid configuration: {e}")));
        std::process::exit(1);
    }

    cupola::logging::init(&settings.logging);

    match cli.command {
        // Handled before configuration is loaded
        Commands::Init { .. } => {}

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            match toml::to_string_pretty(&settings) {
                Ok(toml_str) => println!("{toml_str}"),
                Err(e) => eprintln!("Error displaying config: {e}"),
            }
        }

        Commands::Search { query, top_k, json } => {
            let engine = open_engine(settings, true).await?;
            let top_k = top_k.unwrap_or_else(|| engine.default_top_k());

            match engine.search(&query, top_k) {
                Ok(results) if json => {
                    let output = json!({
                        "success": true,
                        "data": { "total": results.len(), "images": results },
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                Ok(results) if results.is_empty() => {
                    println!("{}", THEME.warning_with_icon("No images matched"));
                }
                Ok(results) => {
                    println!("{}", create_results_table(&results));
                    for hit in &results {
                        println!(
                            "{} {}",
                            THEME.apply(&THEME.number, format!("#{}", hit.rank)),
                            THEME.apply(&THEME.path, &hit.record.image_url)
                        );
                    }
                }
                Err(e) => exit_with_error(&e, json),
            }
        }

        Commands::Stats { json } => {
            let engine = open_engine(settings, false).await?;
            let stats = engine.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", create_stats_table(&stats));
            }
            if !stats.ready {
                std::process::exit(1);
            }
        }

        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            let engine = open_engine(settings.clone(), false).await?;
            if engine.is_ready() {
                eprintln!(
                    "{}",
                    THEME.success_with_icon(&format!(
                        "Loaded {} images",
                        engine.stats().total
                    ))
                );
            } else {
                eprintln!(
                    "{}",
                    THEME.warning_with_icon("Catalog not loaded; health checks will report not ready")
                );
            }

            let dispatcher = ToolDispatcher::new(Arc::new(engine), EventBroadcaster::new());
            cupola::server::serve_http(settings, dispatcher, bind).await?;
        }
    }

    Ok(())
}

/// Build the engine and load the configured dataset off the async runtime.
///
/// With `require_loaded` a failed load is an error; otherwise the engine is
/// returned unloaded and the failure is logged.
async fn open_engine(settings: Settings, require_loaded: bool) -> anyhow::Result<SearchEngine> {
    tokio::task::spawn_blocking(move || {
        let engine = SearchEngine::from_settings(&settings)?;
        let source = JsonCatalogSource::new(settings.dataset_path());
        if let Err(e) = engine.load(&source) {
            if require_loaded {
                return Err(e.into());
            }
            tracing::warn!("Continuing without a catalog: {e}");
        }
        Ok(engine)
    })
    .await?
}

fn exit_with_error(err: &SearchError, json: bool) -> ! {
    if json {
        let output = json!({
            "success": false,
            "error": err.to_string(),
            "code": err.status_code(),
            "suggestions": err.recovery_suggestions(),
        });
        println!("{output}");
    } else {
        eprintln!("{}", THEME.error_with_icon(&err.to_string()));
        for suggestion in err.recovery_suggestions() {
            eprintln!("  - {suggestion}");
        }
    }
    std::process::exit(1);
}
