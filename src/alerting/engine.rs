use crate::{
    AlertConfig, AlertStatus, AlertTrigger, AttackEvent, AttackType, AttackerProfile,
    EngineError, SecurityAlert, Severity,
};
use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Motor de alertas
///
/// Dueño del ciclo de vida de `SecurityAlert`. Evalúa cada evento
/// finalizado contra el perfil de su origen y crea a lo sumo una alerta por
/// (identidad, tipo de alerta) dentro de la ventana de deduplicación. La
/// creación es idempotente y atómica por clave; las transiciones
/// posteriores llegan de afuera (operador) y solo se validan monótonas.
pub struct AlertEngine {
    config: AlertConfig,
    /// (identidad|tipo) -> última alerta creada para esa clave
    dedup_index: DashMap<String, Uuid>,
    alerts: DashMap<Uuid, SecurityAlert>,
    created: AtomicU64,
    deduplicated: AtomicU64,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::with_config(AlertConfig::default())
    }

    pub fn with_config(config: AlertConfig) -> Self {
        Self {
            config,
            dedup_index: DashMap::new(),
            alerts: DashMap::new(),
            created: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
        }
    }

    /// Evalúa las condiciones de disparo tras aplicar un evento al perfil
    pub fn evaluate(
        &self,
        event: &AttackEvent,
        profile: &AttackerProfile,
    ) -> Option<SecurityAlert> {
        let trigger = if event.severity == Severity::Critical {
            AlertTrigger::CriticalEvent
        } else if profile.risk_score >= self.config.risk_threshold {
            AlertTrigger::RiskThreshold {
                score: profile.risk_score,
            }
        } else {
            return None;
        };

        let alert_type = profile
            .dominant_attack_type
            .or(event.attack_type)
            .unwrap_or(AttackType::Unknown);
        let key = format!("{}|{}", profile.source_ip, alert_type.as_str());
        let window_start = Utc::now() - Duration::minutes(self.config.dedup_window_minutes);

        match self.dedup_index.entry(key) {
            Entry::Occupied(mut occupied) => {
                let existing = *occupied.get();
                let is_duplicate = self
                    .alerts
                    .get(&existing)
                    .map(|a| a.status.is_active() && a.created_at > window_start)
                    .unwrap_or(false);
                if is_duplicate {
                    self.deduplicated.fetch_add(1, Ordering::Relaxed);
                    return None;
                }

                let alert = self.build_alert(event, profile, alert_type, trigger);
                occupied.insert(alert.id);
                self.alerts.insert(alert.id, alert.clone());
                self.created.fetch_add(1, Ordering::Relaxed);
                Some(alert)
            }
            Entry::Vacant(vacant) => {
                let alert = self.build_alert(event, profile, alert_type, trigger);
                vacant.insert(alert.id);
                self.alerts.insert(alert.id, alert.clone());
                self.created.fetch_add(1, Ordering::Relaxed);
                Some(alert)
            }
        }
    }

    /// Transición de estado disparada externamente; solo avances válidos
    pub fn advance_status(
        &self,
        alert_id: Uuid,
        to: AlertStatus,
    ) -> Result<SecurityAlert, EngineError> {
        let mut alert = self
            .alerts
            .get_mut(&alert_id)
            .ok_or(EngineError::UnknownAlert(alert_id))?;

        if !alert.status.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                from: alert.status.as_str(),
                to: to.as_str(),
            });
        }

        alert.status = to;
        tracing::info!("Alert {} moved to {}", alert_id, to.as_str());
        Ok(alert.clone())
    }

    /// Alertas en estado `open`, más recientes primero
    pub fn open_alerts(&self) -> Vec<SecurityAlert> {
        let mut open: Vec<SecurityAlert> = self
            .alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Open)
            .map(|a| a.clone())
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open
    }

    pub fn get(&self, alert_id: Uuid) -> Option<SecurityAlert> {
        self.alerts.get(&alert_id).map(|a| a.clone())
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn deduplicated_count(&self) -> u64 {
        self.deduplicated.load(Ordering::Relaxed)
    }

    fn build_alert(
        &self,
        event: &AttackEvent,
        profile: &AttackerProfile,
        alert_type: AttackType,
        trigger: AlertTrigger,
    ) -> SecurityAlert {
        let confidence = match &trigger {
            AlertTrigger::CriticalEvent => event.confidence,
            AlertTrigger::RiskThreshold { score } => (score / 100.0).clamp(0.0, 1.0),
        };

        let skip = profile
            .recent_event_ids
            .len()
            .saturating_sub(self.config.max_contributing_events);
        let contributing_events: Vec<Uuid> =
            profile.recent_event_ids.iter().skip(skip).copied().collect();

        let description = format!(
            "Source {} triggered {} over {} event(s) across {} endpoint(s). \
             Risk score {:.1}, max severity {}, bot likelihood {:.2}.",
            profile.source_ip,
            match &trigger {
                AlertTrigger::CriticalEvent => "a critical-severity event".to_string(),
                AlertTrigger::RiskThreshold { score } =>
                    format!("the risk threshold ({:.1})", score),
            },
            profile.total_events,
            profile.endpoints.len(),
            profile.risk_score,
            profile.max_severity.as_str(),
            profile.bot_likelihood,
        );

        SecurityAlert {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            alert_type,
            severity: profile.max_severity,
            confidence,
            source_ip: profile.source_ip.clone(),
            endpoint: event.endpoint.clone(),
            trigger,
            title: format!(
                "{} activity from {}",
                alert_type.as_str(),
                profile.source_ip
            ),
            description,
            contributing_events,
            status: AlertStatus::Open,
        }
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}
