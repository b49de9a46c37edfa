use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use honeysentry::detector::anomaly::{self, AnomalyScorer};
use honeysentry::pipeline::TelemetryPipeline;
use honeysentry::simulator::CaptureGenerator;
use honeysentry::storage::StorageManager;
use honeysentry::{EngineConfig, EngineError};

const CONFIG_PATH: &str = "honeysentry.toml";

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    print_banner();

    info!("Starting HoneySentry - Attack Telemetry & Risk Scoring Engine");

    let config = load_config();
    ensure_model_artifacts(&config)?;

    // Artefacto ausente o corrupto = error fatal de arranque
    let scorer = AnomalyScorer::load(config.anomaly.clone())
        .map_err(|e| anyhow::anyhow!("fatal startup error: {}", e))?;

    let storage = initialize_storage(&config).await?;
    let pipeline = Arc::new(
        TelemetryPipeline::start(config.clone(), scorer, None, storage)
            .await
            .context("Failed to start telemetry pipeline")?,
    );

    start_demo_feed(Arc::clone(&pipeline));
    print_system_info();

    wait_for_shutdown_signal().await;

    info!("Shutting down HoneySentry...");
    let metrics = pipeline.shutdown().await;
    info!(
        "Final counters: {} ingested, {} finalized, {} alerts, {} rejected by backpressure",
        metrics.ingested, metrics.finalized, metrics.alerts_emitted, metrics.backpressure_rejected
    );

    Ok(())
}

/// Configure logging system
fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Display system banner
fn print_banner() {
    println!("\n{}", "=".repeat(60));
    println!("    HoneySentry - Attack Telemetry & Risk Scoring");
    println!("    Classification, Profiling & Alerting for Honeypots");
    println!("{}", "=".repeat(60));
    println!();
}

/// Carga la configuración TOML si existe; defaults en caso contrario
fn load_config() -> EngineConfig {
    if Path::new(CONFIG_PATH).exists() {
        match EngineConfig::from_file(CONFIG_PATH) {
            Ok(config) => {
                info!("Configuration loaded from {}", CONFIG_PATH);
                return config;
            }
            Err(e) => {
                warn!("Could not parse {}: {:#}. Using defaults", CONFIG_PATH, e);
            }
        }
    }
    EngineConfig::default()
}

/// Bootstrap offline de modelos: si no hay artefactos, se entrena un
/// baseline sintético y se persiste antes de arrancar el motor
fn ensure_model_artifacts(config: &EngineConfig) -> Result<()> {
    let dir = Path::new(&config.anomaly.model_dir);
    let missing = !dir.join(anomaly::PARTITIONING_ARTIFACT).exists()
        || !dir.join(anomaly::RECONSTRUCTION_ARTIFACT).exists();

    if missing {
        info!("Model artifacts not found, fitting synthetic baseline (offline bootstrap)");
        let baseline = anomaly::synthetic_baseline(2000, 42);
        anomaly::train_artifacts(dir, &baseline, 42)
            .context("Failed to train model artifacts")?;
    }
    Ok(())
}

/// Initialize storage backend
async fn initialize_storage(config: &EngineConfig) -> Result<StorageManager> {
    info!("Initializing storage system...");

    let storage = StorageManager::with_config(config.storage.clone())
        .await
        .map_err(|e| {
            error!("Error initializing storage: {:#}", e);
            e
        })?;

    info!("Storage system initialized successfully");
    Ok(storage)
}

/// Feed de demostración: capturas sintéticas contra el pipeline
fn start_demo_feed(pipeline: Arc<TelemetryPipeline>) {
    use tokio::time::{sleep, Duration};

    tokio::spawn(async move {
        let mut generator = CaptureGenerator::new();
        let mut counter: u64 = 0;

        info!("Demo capture feed started");

        loop {
            sleep(Duration::from_secs(2)).await;
            counter += 1;

            match pipeline.submit(generator.next_capture()) {
                Ok(_) => {}
                Err(EngineError::Backpressure) => {
                    // El productor debe retroceder, no insistir
                    warn!("Ingestion queue full, backing off");
                    sleep(Duration::from_secs(5)).await;
                }
                Err(e) => warn!("Capture rejected: {}", e),
            }

            if counter % 25 == 0 {
                let metrics = pipeline.metrics();
                info!(
                    "Processed {} captures, {} finalized, {} alerts, {} open",
                    metrics.ingested,
                    metrics.finalized,
                    metrics.alerts_emitted,
                    pipeline.open_alerts().len()
                );
                if let Some(top) = pipeline.profiles_by_risk(1).first() {
                    info!(
                        "Top risk source: {} (risk {:.1}, {} events, bot likelihood {:.2})",
                        top.source_ip, top.risk_score, top.total_events, top.bot_likelihood
                    );
                }
            }
        }
    });
}

/// Display system information
fn print_system_info() {
    println!("\nHoneySentry Engine Started");
    println!("{}", "-".repeat(50));
    println!("Components:");
    println!("   - Event Normalizer: Active");
    println!("   - Anomaly Ensemble (partitioning + reconstruction): Active");
    println!("   - Attack Classifier: Active");
    println!("   - Profile Aggregator & Risk Scorer: Active");
    println!("   - Alert Engine: Active");
    println!("\nControl:");
    println!("   Press Ctrl+C to stop the engine");
    println!("{}", "-".repeat(50));
}

/// Wait for system shutdown signal
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Error installing Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Error installing TERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received TERM signal");
        },
    }
}
