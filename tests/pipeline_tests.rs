use honeysentry::detector::anomaly::synthetic_baseline;
use honeysentry::detector::{AnomalyScorer, IsolationForestModel, ReconstructionModel};
use honeysentry::pipeline::TelemetryPipeline;
use honeysentry::storage::StorageManager;
use honeysentry::{
    AlertConfig, AnomalyConfig, AttackType, ClassifierConfig, EngineConfig, QueueConfig,
    RawCapture, Severity,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

fn scorer() -> AnomalyScorer {
    let baseline = synthetic_baseline(400, 27);
    let forest = IsolationForestModel::fit(&baseline, 50, 128, 27).unwrap();
    let reconstruction = ReconstructionModel::fit(&baseline, 4, 40, 27).unwrap();
    AnomalyScorer::from_models(AnomalyConfig::default(), forest, reconstruction)
}

/// Configuración de test: sin sink de consola y sin escalada por anomalía,
/// para que las severidades del escenario sean las de la política base
fn test_config() -> EngineConfig {
    EngineConfig {
        classifier: ClassifierConfig {
            escalation_threshold: 1.1,
            ..ClassifierConfig::default()
        },
        alerting: AlertConfig {
            console_enabled: false,
            ..AlertConfig::default()
        },
        queue: QueueConfig {
            capacity: 2048,
            workers: 8,
            ..QueueConfig::default()
        },
        ..EngineConfig::default()
    }
}

async fn start_pipeline() -> TelemetryPipeline {
    let storage = StorageManager::new().await.unwrap();
    TelemetryPipeline::start(test_config(), scorer(), None, storage)
        .await
        .unwrap()
}

fn capture(source_ip: &str, method: &str, path: &str, payload: &str) -> RawCapture {
    RawCapture {
        source_ip: source_ip.to_string(),
        method: method.to_string(),
        path: path.to_string(),
        headers: HashMap::from([(
            "user-agent".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
        )]),
        body: payload.as_bytes().to_vec(),
        timestamp: Utc::now(),
        status_code: Some(200),
        response_time_ms: Some(3.0),
        country: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sql_injection_scenario_end_to_end() {
    let pipeline = start_pipeline().await;
    let source = "233.252.0.17";

    assert!(pipeline.get_profile(source).is_none());

    let event_id = pipeline
        .submit(capture(
            source,
            "GET",
            "/api/honeypots/sql",
            "1 UNION SELECT * FROM users",
        ))
        .unwrap();
    pipeline.settle().await;

    let events = pipeline
        .recent_events(chrono::Duration::minutes(1))
        .await
        .unwrap();
    let event = events.iter().find(|e| e.id == event_id).unwrap();
    assert_eq!(event.attack_type, Some(AttackType::SqlInjection));
    assert!(event.severity >= Severity::High);
    assert!(event.confidence >= 0.8);
    let anomaly = event.anomaly.as_ref().unwrap();
    assert!((0.0..=1.0).contains(&anomaly.combined));

    let profile = pipeline.get_profile(source).unwrap();
    assert_eq!(profile.total_events, 1);
    assert!(profile.attack_types.contains(&AttackType::SqlInjection));
    assert_eq!(profile.max_severity, Severity::High);

    // La interfaz de consulta filtra por severidad y tipo de ataque
    let filter = honeysentry::storage::EventFilter {
        severity: Some(Severity::High),
        attack_type: Some(AttackType::SqlInjection),
        ..Default::default()
    };
    let matched = pipeline.events_filtered(&filter).await.unwrap();
    assert_eq!(matched.len(), 1);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_events_two_critical_trigger_exactly_one_alert() {
    let pipeline = start_pipeline().await;
    let source = "233.252.0.44";

    // Secuencia: sql (high), cmd (critical), sql, cmd (critical), sql.
    // Cada evento se asienta antes del siguiente para que el orden sea
    // determinista.
    let sequence = [
        ("GET", "/api/honeypots/sql", "1 UNION SELECT * FROM users"),
        ("POST", "/api/ping", "host=10.0.0.1;id"),
        ("GET", "/api/honeypots/sql", "2 UNION SELECT * FROM users"),
        ("POST", "/api/ping", "host=10.0.0.2;id"),
        ("GET", "/api/honeypots/sql", "3 UNION SELECT * FROM users"),
    ];
    for (method, path, payload) in sequence {
        pipeline
            .submit(capture(source, method, path, payload))
            .unwrap();
        pipeline.settle().await;
    }

    let profile = pipeline.get_profile(source).unwrap();
    assert_eq!(profile.total_events, 5);
    assert_eq!(profile.max_severity, Severity::Critical);

    // base min(5*10, 50) + 2 endpoints * 2 = 54, multiplicador critical
    // x2.0 (nunca compuesto con el x1.5 de high), recortado a 100
    assert_eq!(profile.risk_score, 100.0);

    let open = pipeline.open_alerts();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].alert_type, AttackType::CommandInjection);
    assert!(!open[0].contributing_events.is_empty());

    let metrics = pipeline.metrics();
    assert_eq!(metrics.alerts_emitted, 1);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_critical_events_deduplicate_to_one_open_alert() {
    let pipeline = start_pipeline().await;
    let source = "233.252.0.99";

    for i in 0..10 {
        pipeline
            .submit(capture(
                source,
                "POST",
                "/api/ping",
                &format!("host=10.0.0.{};id", i),
            ))
            .unwrap();
        pipeline.settle().await;
    }

    let open = pipeline.open_alerts();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].alert_type, AttackType::CommandInjection);
    assert_eq!(open[0].severity, Severity::Critical);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn thousand_concurrent_events_lose_no_updates() {
    let pipeline = Arc::new(start_pipeline().await);
    let source = "233.252.0.200";

    let mut handles = Vec::new();
    for i in 0..1000u32 {
        let pipeline = Arc::clone(&pipeline);
        let source = source.to_string();
        handles.push(tokio::spawn(async move {
            let path = format!("/api/status?probe={}", i);
            pipeline
                .submit(capture(&source, "GET", &path, ""))
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    pipeline.settle().await;

    let profile = pipeline.get_profile(source).unwrap();
    assert_eq!(profile.total_events, 1000);
    assert_eq!(pipeline.metrics().finalized, 1000);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn alert_lifecycle_is_externally_driven_and_monotone() {
    let pipeline = start_pipeline().await;
    let source = "233.252.0.150";

    pipeline
        .submit(capture(source, "POST", "/api/ping", "host=1.2.3.4;id"))
        .unwrap();
    pipeline.settle().await;

    let open = pipeline.open_alerts();
    assert_eq!(open.len(), 1);
    let alert_id = open[0].id;

    pipeline
        .advance_alert(alert_id, honeysentry::AlertStatus::Investigating)
        .await
        .unwrap();
    pipeline
        .advance_alert(alert_id, honeysentry::AlertStatus::Resolved)
        .await
        .unwrap();

    // Sin retrocesos
    assert!(pipeline
        .advance_alert(alert_id, honeysentry::AlertStatus::Open)
        .await
        .is_err());
    assert!(pipeline.open_alerts().is_empty());

    pipeline.shutdown().await;
}
