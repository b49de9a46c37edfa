
//! HoneySentry - motor de clasificación de telemetría de ataques y risk
//! scoring para endpoints honeypot simulados.

pub mod normalizer;
pub mod detector;
pub mod profiler;
pub mod alerting;
pub mod pipeline;
pub mod storage;
pub mod simulator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use uuid::Uuid;

/// Captura cruda entregada por un endpoint honeypot (productor externo)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCapture {
    pub source_ip: String,
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub country: Option<String>,
}

/// Niveles de severidad
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Escala un nivel hacia arriba (Critical se mantiene)
    pub fn escalated(&self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }
}

/// Tipos de ataque clasificables
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    DirectoryTraversal,
    SqlInjection,
    Xss,
    CommandInjection,
    BruteForce,
    AutomatedTool,
    Unknown,
}

impl AttackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::DirectoryTraversal => "directory_traversal",
            AttackType::SqlInjection => "sql_injection",
            AttackType::Xss => "xss",
            AttackType::CommandInjection => "command_injection",
            AttackType::BruteForce => "brute_force",
            AttackType::AutomatedTool => "automated_tool",
            AttackType::Unknown => "unknown",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "directory_traversal" => Some(AttackType::DirectoryTraversal),
            "sql_injection" => Some(AttackType::SqlInjection),
            "xss" => Some(AttackType::Xss),
            "command_injection" => Some(AttackType::CommandInjection),
            "brute_force" => Some(AttackType::BruteForce),
            "automated_tool" => Some(AttackType::AutomatedTool),
            "unknown" => Some(AttackType::Unknown),
            _ => None,
        }
    }
}

/// Flags de degradación del scoring de anomalías
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFlag {
    PartitioningUnavailable,
    ReconstructionUnavailable,
    BudgetExceeded,
}

/// Resultado del ensemble de anomalías - los sub-scores quedan observables,
/// nunca colapsados en un fallback numérico silencioso
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub partitioning: f64,
    pub reconstruction: f64,
    pub combined: f64,
    pub flags: Vec<ScoreFlag>,
}

impl AnomalyScore {
    pub fn is_degraded(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// Evento de ataque normalizado
///
/// `id` y `timestamp` son inmutables desde la creación. Los campos de
/// clasificación (`attack_type`, `anomaly`, `confidence`, `severity`)
/// transicionan de pendiente a final exactamente una vez vía `finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub method: String,
    pub endpoint: String,
    pub headers: HashMap<String, String>,
    pub payload: String,
    pub truncated: bool,
    pub country: Option<String>,
    pub user_agent: Option<String>,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub tags: Vec<String>,
    pub attack_type: Option<AttackType>,
    pub severity: Severity,
    pub anomaly: Option<AnomalyScore>,
    pub confidence: f64,
}

impl AttackEvent {
    /// Indica si los campos de scoring ya fueron finalizados
    pub fn is_final(&self) -> bool {
        self.attack_type.is_some()
    }

    /// Fija los resultados de análisis. Solo el worker del pipeline invoca
    /// esto; una segunda llamada se ignora para preservar la inmutabilidad
    /// del evento ya finalizado.
    pub(crate) fn finalize(
        &mut self,
        anomaly: AnomalyScore,
        attack_type: AttackType,
        confidence: f64,
        severity: Severity,
    ) {
        if self.is_final() {
            tracing::warn!("Attempted to re-finalize event {}", self.id);
            return;
        }
        self.anomaly = Some(anomaly);
        self.attack_type = Some(attack_type);
        self.confidence = confidence;
        self.severity = severity;
    }
}

/// Nivel de amenaza derivado del risk score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn from_risk(risk_score: f64) -> Self {
        if risk_score > 80.0 {
            ThreatLevel::Critical
        } else if risk_score > 60.0 {
            ThreatLevel::High
        } else if risk_score > 40.0 {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }
}

/// Perfil agregado por identidad de origen
///
/// El Aggregator es el único punto de mutación; cada update es atómico por
/// identidad. Los perfiles nunca se borran, solo se superponen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackerProfile {
    pub source_ip: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_events: u64,
    pub endpoints: HashSet<String>,
    pub attack_types: HashSet<AttackType>,
    pub user_agents: HashSet<String>,
    pub max_severity: Severity,
    /// Tipo de ataque que estableció la severidad máxima vigente
    pub dominant_attack_type: Option<AttackType>,
    pub bot_likelihood: f64,
    pub is_bot: bool,
    pub risk_score: f64,
    pub threat_level: ThreatLevel,
    pub country: Option<String>,
    /// Evidencia forense reciente para alertas (acotada)
    pub recent_event_ids: VecDeque<Uuid>,
    /// Ventana de timestamps recientes para la heurística de rate
    pub recent_timestamps: VecDeque<DateTime<Utc>>,
}

impl AttackerProfile {
    pub fn new(source_ip: &str, first_seen: DateTime<Utc>) -> Self {
        Self {
            source_ip: source_ip.to_string(),
            first_seen,
            last_seen: first_seen,
            total_events: 0,
            endpoints: HashSet::new(),
            attack_types: HashSet::new(),
            user_agents: HashSet::new(),
            max_severity: Severity::Low,
            dominant_attack_type: None,
            bot_likelihood: 0.0,
            is_bot: false,
            risk_score: 0.0,
            threat_level: ThreatLevel::Low,
            country: None,
            recent_event_ids: VecDeque::new(),
            recent_timestamps: VecDeque::new(),
        }
    }

    /// Duración de la sesión observada
    pub fn session_duration(&self) -> chrono::Duration {
        self.last_seen - self.first_seen
    }
}

/// Estado de una alerta - las transiciones son monótonas
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Investigating => "investigating",
            AlertStatus::Resolved => "resolved",
            AlertStatus::FalsePositive => "false_positive",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "open" => Some(AlertStatus::Open),
            "investigating" => Some(AlertStatus::Investigating),
            "resolved" => Some(AlertStatus::Resolved),
            "false_positive" => Some(AlertStatus::FalsePositive),
            _ => None,
        }
    }

    /// Valida una transición de estado (sin retrocesos)
    pub fn can_transition(&self, to: AlertStatus) -> bool {
        matches!(
            (self, to),
            (AlertStatus::Open, AlertStatus::Investigating)
                | (AlertStatus::Investigating, AlertStatus::Resolved)
                | (AlertStatus::Investigating, AlertStatus::FalsePositive)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AlertStatus::Open | AlertStatus::Investigating)
    }
}

/// Condición que disparó la creación de una alerta
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AlertTrigger {
    RiskThreshold { score: f64 },
    CriticalEvent,
}

/// Alerta de seguridad emitida por el Alert Engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub alert_type: AttackType,
    pub severity: Severity,
    pub confidence: f64,
    pub source_ip: String,
    pub endpoint: String,
    pub trigger: AlertTrigger,
    pub title: String,
    pub description: String,
    pub contributing_events: Vec<Uuid>,
    pub status: AlertStatus,
}

/// Taxonomía de errores del motor
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid capture: {0}")]
    Validation(String),

    #[error("ingestion queue full")]
    Backpressure,

    #[error("model artifact error: {0}")]
    ModelLoad(String),

    #[error("invalid alert transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("unknown alert: {0}")]
    UnknownAlert(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Configuración del normalizador
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Cap en bytes para snapshots de headers y payload
    pub max_snapshot_bytes: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_snapshot_bytes: 8 * 1024,
        }
    }
}

/// Configuración de la cola de ingesta y el pool de workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub workers: usize,
    /// Presupuesto de inferencia por evento en milisegundos
    pub scoring_budget_ms: u64,
    /// Periodo de gracia al apagar, en segundos
    pub shutdown_grace_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 2048,
            workers: 8,
            scoring_budget_ms: 50,
            shutdown_grace_secs: 5,
        }
    }
}

/// Configuración del ensemble de anomalías
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub partitioning_weight: f64,
    pub reconstruction_weight: f64,
    /// Directorio con los artefactos (partitioning.json, reconstruction.json)
    pub model_dir: String,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            partitioning_weight: 0.5,
            reconstruction_weight: 0.5,
            model_dir: "models".to_string(),
        }
    }
}

/// Configuración del clasificador de ataques
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Score combinado a partir del cual la severidad escala un nivel
    pub escalation_threshold: f64,
    /// Distancia máxima para que el modelo de centroides emita un label
    pub centroid_max_distance: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: 0.85,
            centroid_max_distance: 1.5,
        }
    }
}

/// Pesos de la heurística de bot-likelihood - configuración, no constantes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotHeuristicsConfig {
    pub rate_window_secs: i64,
    /// Requests por ventana que saturan la componente de rate
    pub rate_saturation: f64,
    pub rate_weight: f64,
    pub signature_weight: f64,
    pub ua_churn_weight: f64,
    /// Separación mediana (segundos) considerada ritmo humano
    pub human_gap_secs: f64,
    /// Descuento aplicado cuando el ritmo parece humano
    pub human_paced_discount: f64,
    /// Umbral sobre el cual el perfil se marca is_bot
    pub bot_flag_threshold: f64,
}

impl Default for BotHeuristicsConfig {
    fn default() -> Self {
        Self {
            rate_window_secs: 60,
            rate_saturation: 30.0,
            rate_weight: 0.5,
            signature_weight: 0.35,
            ua_churn_weight: 0.15,
            human_gap_secs: 2.0,
            human_paced_discount: 0.5,
            bot_flag_threshold: 0.7,
        }
    }
}

/// Configuración del Alert Engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub risk_threshold: f64,
    pub dedup_window_minutes: i64,
    /// Máximo de event ids retenidos como evidencia por alerta
    pub max_contributing_events: usize,
    pub console_enabled: bool,
    pub webhook_url: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 70.0,
            dedup_window_minutes: 15,
            max_contributing_events: 25,
            console_enabled: true,
            webhook_url: None,
        }
    }
}

/// Configuración general del motor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub queue: QueueConfig,
    pub anomaly: AnomalyConfig,
    pub classifier: ClassifierConfig,
    pub bot: BotHeuristicsConfig,
    pub alerting: AlertConfig,
    pub storage: storage::StorageConfig,
}

impl EngineConfig {
    /// Carga configuración desde un archivo TOML; campos ausentes usan defaults
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}

/// Contadores observables del pipeline - nada se descarta en silencio
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub ingested: AtomicU64,
    pub validation_rejected: AtomicU64,
    pub backpressure_rejected: AtomicU64,
    pub finalized: AtomicU64,
    pub score_unavailable: AtomicU64,
    pub alerts_emitted: AtomicU64,
    pub abandoned_on_shutdown: AtomicU64,
}

impl PipelineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            validation_rejected: self.validation_rejected.load(Ordering::Relaxed),
            backpressure_rejected: self.backpressure_rejected.load(Ordering::Relaxed),
            finalized: self.finalized.load(Ordering::Relaxed),
            score_unavailable: self.score_unavailable.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            abandoned_on_shutdown: self.abandoned_on_shutdown.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot serializable de las métricas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ingested: u64,
    pub validation_rejected: u64,
    pub backpressure_rejected: u64,
    pub finalized: u64,
    pub score_unavailable: u64,
    pub alerts_emitted: u64,
    pub abandoned_on_shutdown: u64,
}
