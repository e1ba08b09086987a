//! Mise: conversation-to-recipe generation server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod routes;
mod state;

use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("MISE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                println!("Mise: conversation-to-recipe generation server");
                println!();
                println!("Usage: mise [command]");
                println!();
                println!("Commands:");
                println!("  (none)    Start the server");
                println!("  help      Show this help message");
                println!();
                println!("Environment:");
                println!("  PORT                       Listen port (default 3004)");
                println!("  MISE_DATA_DIR              Data directory (default ./data)");
                println!("  MISE_MAX_CANDIDATES        Candidate sources per search");
                println!("  MISE_MIN_SCRAPE_CHARS      Minimum usable page text");
                println!("  MISE_STAGE_TIMEOUT_SECS    Deadline per pipeline stage");
                println!("  MISE_UNRESOLVED_POLICY     warn | reject");
                println!("  RUST_LOG                   Log filter (default info)");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'mise help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = mise_core::MiseConfig::from_env(&data_dir)?;

    let store = mise_store::SqliteStore::open(&config.data_paths.db)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let settings = mise_pipeline::PipelineSettings::load(&config.data_paths.pipeline_config_file);
    info!(
        "Pipeline: {} candidates, {} min chars, {}s stage timeout, unresolved policy {:?}",
        settings.max_candidates,
        settings.min_scrape_chars,
        settings.stage_timeout_secs,
        settings.unresolved_policy
    );
    let fetcher = mise_pipeline::HttpFetcher::new(settings.fetch_timeout())?;

    let state = Arc::new(AppState::new(config, store, Arc::new(fetcher), settings));
    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mise server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
