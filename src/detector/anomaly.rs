use crate::detector::autoencoder::ReconstructionModel;
use crate::detector::features::{FeatureExtractor, FEATURE_COUNT};
use crate::detector::isolation_forest::IsolationForestModel;
use crate::normalizer::EventNormalizer;
use crate::{AnomalyConfig, AnomalyScore, EngineError, RawCapture, ScoreFlag};
use anyhow::{Context, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::Path;

/// Nombres de artefactos con versionado independiente
pub const PARTITIONING_ARTIFACT: &str = "partitioning.json";
pub const RECONSTRUCTION_ARTIFACT: &str = "reconstruction.json";

/// Ensemble de scoring de anomalías
///
/// Combina el score de particionamiento y el de reconstrucción en un score
/// en [0,1]. Los modelos se cargan al arranque como funciones inmutables;
/// un artefacto ausente o corrupto es un error fatal de arranque. Un
/// sub-score que falla aporta 0 con su flag correspondiente y nunca aborta
/// el pipeline del evento.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    config: AnomalyConfig,
    partitioning: IsolationForestModel,
    reconstruction: ReconstructionModel,
}

impl AnomalyScorer {
    /// Carga ambos artefactos desde `config.model_dir`
    pub fn load(config: AnomalyConfig) -> Result<Self, EngineError> {
        let dir = Path::new(&config.model_dir);

        let partitioning: IsolationForestModel =
            load_artifact(&dir.join(PARTITIONING_ARTIFACT))?;
        let reconstruction: ReconstructionModel =
            load_artifact(&dir.join(RECONSTRUCTION_ARTIFACT))?;

        if partitioning.feature_count != FEATURE_COUNT
            || reconstruction.feature_count != FEATURE_COUNT
        {
            return Err(EngineError::ModelLoad(format!(
                "artifact dimensions ({}, {}) do not match feature count {}",
                partitioning.feature_count, reconstruction.feature_count, FEATURE_COUNT
            )));
        }

        tracing::info!(
            "Anomaly models loaded: partitioning {} ({} trees), reconstruction {} ({} components)",
            partitioning.version,
            partitioning.trees.len(),
            reconstruction.version,
            reconstruction.components.len()
        );

        Ok(Self::from_models(config, partitioning, reconstruction))
    }

    /// Construye el scorer con modelos ya ajustados (tests, bootstrap)
    pub fn from_models(
        config: AnomalyConfig,
        partitioning: IsolationForestModel,
        reconstruction: ReconstructionModel,
    ) -> Self {
        Self {
            config,
            partitioning,
            reconstruction,
        }
    }

    /// Evalúa el ensemble sobre un vector de características
    pub fn score(&self, features: &[f64]) -> AnomalyScore {
        let mut flags = Vec::new();

        let partitioning = match self.partitioning.score(features) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Partitioning score unavailable: {}", e);
                flags.push(ScoreFlag::PartitioningUnavailable);
                0.0
            }
        };

        let reconstruction = match self.reconstruction.score(features) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Reconstruction score unavailable: {}", e);
                flags.push(ScoreFlag::ReconstructionUnavailable);
                0.0
            }
        };

        let weight_sum = self.config.partitioning_weight + self.config.reconstruction_weight;
        let combined = if weight_sum <= f64::EPSILON {
            0.0
        } else {
            ((partitioning * self.config.partitioning_weight
                + reconstruction * self.config.reconstruction_weight)
                / weight_sum)
                .clamp(0.0, 1.0)
        };

        AnomalyScore {
            partitioning,
            reconstruction,
            combined,
            flags,
        }
    }
}

fn load_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::ModelLoad(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::ModelLoad(format!("{}: {}", path.display(), e)))
}

/// Ajusta ambos modelos offline sobre un baseline y los persiste como
/// artefactos JSON versionados
pub fn train_artifacts(dir: &Path, baseline: &[Vec<f64>], seed: u64) -> Result<()> {
    std::fs::create_dir_all(dir).context("creating model directory")?;

    let forest = IsolationForestModel::fit(baseline, 100, 256, seed)?;
    let reconstruction = ReconstructionModel::fit(baseline, 6, 50, seed)?;

    std::fs::write(
        dir.join(PARTITIONING_ARTIFACT),
        serde_json::to_string(&forest)?,
    )
    .context("writing partitioning artifact")?;
    std::fs::write(
        dir.join(RECONSTRUCTION_ARTIFACT),
        serde_json::to_string(&reconstruction)?,
    )
    .context("writing reconstruction artifact")?;

    tracing::info!(
        "Trained anomaly artifacts over {} baseline samples into {}",
        baseline.len(),
        dir.display()
    );
    Ok(())
}

/// Genera un baseline sintético de tráfico benigno, determinista por seed
pub fn synthetic_baseline(count: usize, seed: u64) -> Vec<Vec<f64>> {
    let normalizer = EventNormalizer::new();
    let extractor = FeatureExtractor::new();
    let mut rng = StdRng::seed_from_u64(seed);

    let paths = [
        "/",
        "/index.html",
        "/api/users",
        "/api/products",
        "/api/status",
        "/api/v1/orders",
        "/static/app.css",
        "/images/logo.png",
    ];
    let agents = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15",
    ];
    let payloads = ["", "page=2", "id=42", "sort=name&order=asc"];

    (0..count)
        .filter_map(|i| {
            let path = paths[rng.gen_range(0..paths.len())];
            let method = if rng.gen_bool(0.8) { "GET" } else { "POST" };
            let mut headers = HashMap::from([(
                "user-agent".to_string(),
                agents[rng.gen_range(0..agents.len())].to_string(),
            )]);
            if rng.gen_bool(0.3) {
                headers.insert(
                    "content-type".to_string(),
                    "application/json".to_string(),
                );
            }

            let capture = RawCapture {
                source_ip: format!("10.0.{}.{}", i % 200, rng.gen_range(1..250)),
                method: method.to_string(),
                path: path.to_string(),
                headers,
                body: payloads[rng.gen_range(0..payloads.len())].as_bytes().to_vec(),
                timestamp: Utc::now(),
                status_code: Some(200),
                response_time_ms: Some(rng.gen_range(1.0..40.0)),
                country: None,
            };

            normalizer
                .normalize(capture)
                .ok()
                .map(|event| extractor.extract(&event))
        })
        .collect()
}
