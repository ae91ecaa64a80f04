use anyhow::Result;
use dotenv::dotenv;
use tracing::{error, info};

use cardpulse::util::env as env_util;
use cardpulse::{run_pipeline, PipelineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // --- logging -------------------------------------------------------------
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    env_util::log_snapshot(
        "cardpulse",
        &[
            "DATA_DIR",
            "CATALOG_STRATEGY",
            "SKIP_CATALOG",
            "STRICT_CATALOG",
            "ENRICH_EN_POKEMON_KEY",
            "DAYS_WINDOW",
            "PAGES_PER_QUERY",
            "CONFIDENCE_THRESHOLD",
            "MARKET_CATEGORY",
            "FETCH_RETRY_ATTEMPTS",
        ],
    );

    let cfg = PipelineConfig::from_env();
    info!(
        strategy = ?cfg.catalog_strategy,
        data_dir = %cfg.data_dir.display(),
        queries = cfg.queries.len(),
        "pipeline run starting"
    );

    let t0 = std::time::Instant::now();
    match run_pipeline(&cfg).await {
        Ok(summary) => {
            info!(
                elapsed_ms = %t0.elapsed().as_millis(),
                cards = summary.cards,
                english = summary.english_cards,
                catalog_reused = summary.catalog_reused,
                sales_added = summary.sales_added,
                window = summary.window_size,
                priced_cards = summary.priced_cards,
                "pipeline run complete"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = %err, elapsed_ms = %t0.elapsed().as_millis(), "pipeline run failed");
            Err(err)
        }
    }
}
