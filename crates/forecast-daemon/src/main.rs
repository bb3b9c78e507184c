use std::sync::Arc;

use anyhow::Result;
use forecast_core::{ForecastSource, StockUpdate};
use forecast_engine::ForecastEngine;
use forecast_models::ModelConfig;
use polygon_client::PolygonClient;
use tokio::signal::unix::SignalKind;
use tokio::sync::broadcast::error::RecvError;

mod config;

use config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting forecast daemon");

    // 2. Load configuration
    let config = DaemonConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Watchlist: {}", config.watchlist.join(","));
    tracing::info!(
        "  Models: {}",
        config.techniques.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(",")
    );
    tracing::info!("  Horizon: {} business days", config.horizon);
    tracing::info!("  Update interval: {}s", config.engine.update_interval.as_secs());
    if let Some(limit) = config.engine.retrain_timeout {
        tracing::info!("  Retrain timeout: {}s", limit.as_secs());
    }

    // 3. Data source and engine
    let polygon = Arc::new(PolygonClient::with_rate_limit(
        config.polygon_api_key.clone(),
        config.polygon_rate_limit,
    ));
    let engine = ForecastEngine::new(polygon, ModelConfig::default(), config.engine.clone());

    // 4. Prime models for the watchlist; a symbol that cannot be fetched
    // is still subscribed so it joins once data shows up.
    for symbol in &config.watchlist {
        for technique in &config.techniques {
            match engine.request_forecast(symbol, *technique, config.horizon).await {
                Ok(forecast) => {
                    let last = forecast.points.last();
                    match &forecast.source {
                        ForecastSource::Model => tracing::info!(
                            "{} {}: {} points, last {:.2} [{:.2}, {:.2}]",
                            symbol,
                            technique,
                            forecast.len(),
                            last.map(|p| p.predicted_price).unwrap_or(f64::NAN),
                            last.map(|p| p.lower_bound).unwrap_or(f64::NAN),
                            last.map(|p| p.upper_bound).unwrap_or(f64::NAN),
                        ),
                        ForecastSource::Fallback { reason } => {
                            tracing::warn!("{} {}: fallback forecast ({})", symbol, technique, reason)
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("{} {}: forecast failed: {}", symbol, technique, e);
                    if let Err(e) = engine.subscribe(symbol) {
                        tracing::warn!("{}: cannot subscribe: {}", symbol, e);
                    }
                }
            }
        }
    }

    // 5. Live updates until SIGINT/SIGTERM
    let mut updates = engine.updates();
    let scheduler = engine.start_scheduler();

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            received = updates.recv() => {
                match received {
                    Ok(update) => log_update(&update),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Update log lagging, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        tracing::error!("Update channel closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    scheduler.stop().await;
    tracing::info!("Forecast daemon shut down.");
    Ok(())
}

fn log_update(update: &StockUpdate) {
    let predictions = update
        .predictions
        .iter()
        .map(|(technique, p)| format!("{}={:.2} [{:.2}, {:.2}] @{}", technique, p.next_price, p.lower_bound, p.upper_bound, p.target_date))
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!(
        symbol = %update.symbol,
        price = update.price,
        change = update.change,
        "{}",
        if predictions.is_empty() { "no models" } else { predictions.as_str() }
    );
}
