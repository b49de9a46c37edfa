use crate::alerting::{AlertDispatcher, AlertEngine};
use crate::detector::{AnomalyScorer, AttackClassifier, CentroidModel, FeatureExtractor};
use crate::normalizer::EventNormalizer;
use crate::profiler::ProfileAggregator;
use crate::storage::{EventFilter, StorageManager};
use crate::{
    AlertStatus, AnomalyScore, AttackEvent, AttackerProfile, EngineConfig, EngineError,
    MetricsSnapshot, PipelineMetrics, RawCapture, ScoreFlag, SecurityAlert,
};
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Pipeline de telemetría de ataques
///
/// Consume capturas normalizadas desde una cola acotada con un pool de
/// workers. Para cada evento, el scoring de anomalías y la clasificación
/// corren como tareas independientes y se juntan antes de finalizar el
/// evento; después el agregador aplica el update atómico por identidad y
/// el Alert Engine evalúa las condiciones de disparo. La cola llena
/// rechaza con `Backpressure` en lugar de bufferear sin límite.
pub struct TelemetryPipeline {
    normalizer: EventNormalizer,
    sender: mpsc::Sender<AttackEvent>,
    inner: Arc<PipelineInner>,
    shutdown_tx: watch::Sender<bool>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    queue_capacity: usize,
}

struct PipelineInner {
    extractor: FeatureExtractor,
    scorer: AnomalyScorer,
    classifier: AttackClassifier,
    aggregator: ProfileAggregator,
    alert_engine: AlertEngine,
    dispatcher: AlertDispatcher,
    storage: StorageManager,
    metrics: PipelineMetrics,
    semaphore: Arc<Semaphore>,
    in_flight: AtomicU64,
    scoring_budget: Duration,
}

impl TelemetryPipeline {
    /// Arranca el pipeline con los modelos ya cargados
    pub async fn start(
        config: EngineConfig,
        scorer: AnomalyScorer,
        classifier_model: Option<CentroidModel>,
        storage: StorageManager,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(config.queue.capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(PipelineInner {
            extractor: FeatureExtractor::new(),
            scorer,
            classifier: AttackClassifier::with_config(
                config.classifier.clone(),
                classifier_model,
            ),
            aggregator: ProfileAggregator::with_config(config.bot.clone()),
            alert_engine: AlertEngine::with_config(config.alerting.clone()),
            dispatcher: AlertDispatcher::from_config(&config.alerting)?,
            storage,
            metrics: PipelineMetrics::default(),
            semaphore: Arc::new(Semaphore::new(config.queue.workers)),
            in_flight: AtomicU64::new(0),
            scoring_budget: Duration::from_millis(config.queue.scoring_budget_ms),
        });

        let dispatcher_handle = tokio::spawn(run_dispatcher(
            Arc::clone(&inner),
            receiver,
            shutdown_rx,
            config.queue.workers,
            Duration::from_secs(config.queue.shutdown_grace_secs),
        ));

        tracing::info!(
            "Telemetry pipeline started: queue capacity {}, {} workers, {}ms scoring budget",
            config.queue.capacity,
            config.queue.workers,
            config.queue.scoring_budget_ms
        );

        Ok(Self {
            normalizer: EventNormalizer::with_config(config.normalizer.clone()),
            sender,
            inner,
            shutdown_tx,
            dispatcher_handle: Mutex::new(Some(dispatcher_handle)),
            queue_capacity: config.queue.capacity,
        })
    }

    /// Interfaz de ingesta para los productores honeypot
    pub fn submit(&self, capture: RawCapture) -> Result<Uuid, EngineError> {
        if *self.shutdown_tx.borrow() {
            return Err(EngineError::Backpressure);
        }

        let event = self.normalizer.normalize(capture).map_err(|e| {
            self.inner
                .metrics
                .validation_rejected
                .fetch_add(1, Ordering::Relaxed);
            e
        })?;

        let event_id = event.id;
        self.sender.try_send(event).map_err(|_| {
            self.inner
                .metrics
                .backpressure_rejected
                .fetch_add(1, Ordering::Relaxed);
            EngineError::Backpressure
        })?;

        self.inner.metrics.ingested.fetch_add(1, Ordering::Relaxed);
        Ok(event_id)
    }

    /// Perfil agregado de una identidad, si existe
    pub fn get_profile(&self, source_ip: &str) -> Option<AttackerProfile> {
        self.inner.aggregator.get(source_ip)
    }

    /// Eventos dentro de la ventana reciente
    pub async fn recent_events(&self, window: chrono::Duration) -> Result<Vec<AttackEvent>> {
        self.inner.storage.events_since(Utc::now() - window).await
    }

    /// Consulta filtrada para colaboradores de dashboard/reportes
    pub async fn events_filtered(&self, filter: &EventFilter) -> Result<Vec<AttackEvent>> {
        self.inner.storage.events_filtered(filter).await
    }

    /// Alertas abiertas, más recientes primero
    pub fn open_alerts(&self) -> Vec<SecurityAlert> {
        self.inner.alert_engine.open_alerts()
    }

    /// Transición de estado de alerta disparada por el operador
    pub async fn advance_alert(
        &self,
        alert_id: Uuid,
        to: AlertStatus,
    ) -> Result<SecurityAlert, EngineError> {
        let alert = self.inner.alert_engine.advance_status(alert_id, to)?;
        if let Err(e) = self.inner.storage.store_alert(&alert).await {
            tracing::error!("Failed to persist alert status change: {:#}", e);
        }
        Ok(alert)
    }

    pub fn profiles_by_risk(&self, limit: usize) -> Vec<AttackerProfile> {
        self.inner.aggregator.top_by_risk(limit)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Espera a que la cola y los workers queden vacíos
    pub async fn settle(&self) {
        loop {
            let queue_idle = self.sender.capacity() == self.queue_capacity;
            let workers_idle = self.inner.in_flight.load(Ordering::Acquire) == 0;
            if queue_idle && workers_idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Apagado ordenado: corta la ingesta y da el periodo de gracia a los
    /// eventos en vuelo; lo no procesado se abandona limpio y contado
    pub async fn shutdown(&self) -> MetricsSnapshot {
        let _ = self.shutdown_tx.send(true);

        let handle = self.dispatcher_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Dispatcher task failed during shutdown: {}", e);
            }
        }

        let snapshot = self.inner.metrics.snapshot();
        tracing::info!(
            "Pipeline stopped: {} finalized, {} abandoned on shutdown",
            snapshot.finalized,
            snapshot.abandoned_on_shutdown
        );
        snapshot
    }
}

/// Loop del dispatcher: consume la cola y reparte a los workers
async fn run_dispatcher(
    inner: Arc<PipelineInner>,
    mut receiver: mpsc::Receiver<AttackEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    workers: usize,
    grace: Duration,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            maybe_event = receiver.recv() => {
                let event = match maybe_event {
                    Some(event) => event,
                    None => break,
                };

                // Se cuenta en vuelo desde que sale de la cola, para que
                // `settle` nunca observe un falso estado ocioso
                inner.in_flight.fetch_add(1, Ordering::AcqRel);
                let permit = match Arc::clone(&inner.semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        inner.in_flight.fetch_sub(1, Ordering::AcqRel);
                        break;
                    }
                };

                let inner_clone = Arc::clone(&inner);
                tokio::spawn(async move {
                    process_event(&inner_clone, event).await;
                    inner_clone.in_flight.fetch_sub(1, Ordering::AcqRel);
                    drop(permit);
                });
            }
        }
    }

    // Gracia de apagado: lo encolado se abandona contado, lo en vuelo
    // puede terminar
    receiver.close();
    let mut abandoned = 0u64;
    while receiver.try_recv().is_ok() {
        abandoned += 1;
    }
    if abandoned > 0 {
        inner
            .metrics
            .abandoned_on_shutdown
            .fetch_add(abandoned, Ordering::Relaxed);
    }

    let all_permits = inner.semaphore.acquire_many(workers as u32);
    if tokio::time::timeout(grace, all_permits).await.is_err() {
        tracing::warn!(
            "Shutdown grace period expired with {} event(s) still in flight",
            inner.in_flight.load(Ordering::Acquire)
        );
    }
}

/// Procesa un evento: extracción, scoring + clasificación en paralelo,
/// finalización, agregación y evaluación de alertas
async fn process_event(inner: &Arc<PipelineInner>, mut event: AttackEvent) {
    let features = inner.extractor.extract(&event);

    let scorer = inner.scorer.clone();
    let features_for_scoring = features.clone();
    let scoring_task =
        tokio::task::spawn_blocking(move || scorer.score(&features_for_scoring));

    let (scoring_result, classification) = tokio::join!(
        tokio::time::timeout(inner.scoring_budget, scoring_task),
        async { inner.classifier.classify(&event, &features) },
    );

    let anomaly = match scoring_result {
        Ok(Ok(score)) => score,
        Ok(Err(join_error)) => {
            tracing::warn!("Anomaly scoring task failed: {}", join_error);
            AnomalyScore {
                partitioning: 0.0,
                reconstruction: 0.0,
                combined: 0.0,
                flags: vec![
                    ScoreFlag::PartitioningUnavailable,
                    ScoreFlag::ReconstructionUnavailable,
                ],
            }
        }
        Err(_elapsed) => {
            tracing::warn!(
                "Anomaly scoring exceeded the {}ms budget for event {}",
                inner.scoring_budget.as_millis(),
                event.id
            );
            AnomalyScore {
                partitioning: 0.0,
                reconstruction: 0.0,
                combined: 0.0,
                flags: vec![ScoreFlag::BudgetExceeded],
            }
        }
    };

    if !anomaly.flags.is_empty() {
        inner
            .metrics
            .score_unavailable
            .fetch_add(1, Ordering::Relaxed);
    }

    let severity = inner
        .classifier
        .severity_for(classification.label, anomaly.combined);
    event.finalize(anomaly, classification.label, classification.confidence, severity);
    inner.metrics.finalized.fetch_add(1, Ordering::Relaxed);

    if let Err(e) = inner.storage.store_event(&event).await {
        tracing::error!("Failed to store event {}: {:#}", event.id, e);
    }

    let profile = inner.aggregator.update(&event);
    if let Err(e) = inner.storage.upsert_profile(&profile).await {
        tracing::error!(
            "Failed to persist profile for {}: {:#}",
            profile.source_ip,
            e
        );
    }

    if let Some(alert) = inner.alert_engine.evaluate(&event, &profile) {
        inner.metrics.alerts_emitted.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = inner.storage.store_alert(&alert).await {
            tracing::error!("Failed to store alert {}: {:#}", alert.id, e);
        }
        inner.dispatcher.dispatch(&alert).await;
    }
}
