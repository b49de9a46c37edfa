pub mod risk;

use crate::{AttackEvent, AttackerProfile, BotHeuristicsConfig, ThreatLevel};
use chrono::Duration;
use dashmap::DashMap;

/// Máximo de event ids retenidos como evidencia forense por perfil
const RECENT_EVENTS_CAP: usize = 50;
/// Cota dura de timestamps retenidos para la ventana de rate
const RECENT_TIMESTAMPS_CAP: usize = 512;

/// Agregador de perfiles de atacante
///
/// Único punto de mutación de `AttackerProfile`. El mapa particionado
/// serializa los writers de una misma identidad (el guard del entry cubre
/// todo el read-modify-write) mientras identidades distintas se actualizan
/// en paralelo. Un update es todo-o-nada: ningún perfil parcial es
/// observable.
pub struct ProfileAggregator {
    profiles: DashMap<String, AttackerProfile>,
    config: BotHeuristicsConfig,
}

impl ProfileAggregator {
    pub fn new() -> Self {
        Self::with_config(BotHeuristicsConfig::default())
    }

    pub fn with_config(config: BotHeuristicsConfig) -> Self {
        Self {
            profiles: DashMap::new(),
            config,
        }
    }

    /// Aplica un evento finalizado al perfil de su identidad de origen y
    /// devuelve el agregado resultante
    pub fn update(&self, event: &AttackEvent) -> AttackerProfile {
        let mut entry = self
            .profiles
            .entry(event.source_ip.clone())
            .or_insert_with(|| AttackerProfile::new(&event.source_ip, event.timestamp));
        let profile = entry.value_mut();

        // last_seen es monótono no-decreciente aunque lleguen fuera de orden
        if event.timestamp > profile.last_seen {
            profile.last_seen = event.timestamp;
        }
        profile.total_events += 1;
        profile
            .endpoints
            .insert(strip_query(&event.endpoint).to_string());

        if let Some(attack_type) = event.attack_type {
            profile.attack_types.insert(attack_type);
        }
        if let Some(user_agent) = &event.user_agent {
            profile.user_agents.insert(user_agent.clone());
        }
        if event.country.is_some() {
            profile.country = event.country.clone();
        }

        if event.severity > profile.max_severity || profile.dominant_attack_type.is_none() {
            profile.max_severity = profile.max_severity.max(event.severity);
            if let Some(attack_type) = event.attack_type {
                profile.dominant_attack_type = Some(attack_type);
            }
        }

        profile.recent_event_ids.push_back(event.id);
        while profile.recent_event_ids.len() > RECENT_EVENTS_CAP {
            profile.recent_event_ids.pop_front();
        }

        profile.recent_timestamps.push_back(event.timestamp);
        let window_start = profile.last_seen - Duration::seconds(self.config.rate_window_secs);
        while let Some(oldest) = profile.recent_timestamps.front() {
            if *oldest < window_start || profile.recent_timestamps.len() > RECENT_TIMESTAMPS_CAP {
                profile.recent_timestamps.pop_front();
            } else {
                break;
            }
        }

        profile.bot_likelihood = self.bot_likelihood(profile);
        profile.is_bot = profile.bot_likelihood >= self.config.bot_flag_threshold;
        profile.risk_score = risk::score(profile);
        profile.threat_level = ThreatLevel::from_risk(profile.risk_score);

        profile.clone()
    }

    pub fn get(&self, source_ip: &str) -> Option<AttackerProfile> {
        self.profiles.get(source_ip).map(|p| p.clone())
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// Perfiles ordenados por risk score descendente
    pub fn top_by_risk(&self, limit: usize) -> Vec<AttackerProfile> {
        let mut profiles: Vec<AttackerProfile> =
            self.profiles.iter().map(|p| p.clone()).collect();
        profiles.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        profiles.truncate(limit);
        profiles
    }

    /// Heurística de bot-likelihood con pesos configurables: rate alto en
    /// ventana corta y user-agents de herramienta suben el score; ritmo
    /// humano lo descuenta
    fn bot_likelihood(&self, profile: &AttackerProfile) -> f64 {
        let cfg = &self.config;

        let rate_component =
            (profile.recent_timestamps.len() as f64 / cfg.rate_saturation).clamp(0.0, 1.0);

        let has_tool_signature = profile.user_agents.iter().any(|ua| {
            let ua = ua.to_lowercase();
            crate::detector::features::TOOL_SIGNATURES
                .iter()
                .any(|sig| ua.contains(sig))
        });
        let signature_component = if has_tool_signature { 1.0 } else { 0.0 };

        let churn_component = (profile.user_agents.len() as f64 / 4.0).clamp(0.0, 1.0);

        let mut likelihood = cfg.rate_weight * rate_component
            + cfg.signature_weight * signature_component
            + cfg.ua_churn_weight * churn_component;

        if median_gap_secs(profile) > cfg.human_gap_secs {
            likelihood *= cfg.human_paced_discount;
        }

        likelihood.clamp(0.0, 1.0)
    }
}

impl Default for ProfileAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_query(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

/// Separación mediana entre llegadas recientes, en segundos
fn median_gap_secs(profile: &AttackerProfile) -> f64 {
    if profile.recent_timestamps.len() < 3 {
        return 0.0;
    }
    let mut gaps: Vec<f64> = profile
        .recent_timestamps
        .iter()
        .zip(profile.recent_timestamps.iter().skip(1))
        .map(|(a, b)| (*b - *a).num_milliseconds() as f64 / 1000.0)
        .collect();
    gaps.sort_by(f64::total_cmp);
    gaps[gaps.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnomalyScore, AttackType, Severity};
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use uuid::Uuid;

    fn finalized_event(
        source_ip: &str,
        endpoint: &str,
        severity: Severity,
        attack_type: AttackType,
        timestamp: DateTime<Utc>,
    ) -> AttackEvent {
        let mut event = AttackEvent {
            id: Uuid::new_v4(),
            timestamp,
            source_ip: source_ip.to_string(),
            method: "GET".to_string(),
            endpoint: endpoint.to_string(),
            headers: HashMap::new(),
            payload: String::new(),
            truncated: false,
            country: Some("PE".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            status_code: Some(200),
            response_time_ms: None,
            tags: vec![],
            attack_type: None,
            severity: Severity::Low,
            anomaly: None,
            confidence: 0.0,
        };
        event.finalize(
            AnomalyScore {
                partitioning: 0.2,
                reconstruction: 0.2,
                combined: 0.2,
                flags: vec![],
            },
            attack_type,
            0.8,
            severity,
        );
        event
    }

    #[test]
    fn test_first_event_creates_profile() {
        let aggregator = ProfileAggregator::new();
        let now = Utc::now();
        let event = finalized_event("203.0.113.1", "/api/honeypots/sql", Severity::High,
            AttackType::SqlInjection, now);

        let profile = aggregator.update(&event);
        assert_eq!(profile.total_events, 1);
        assert_eq!(profile.first_seen, now);
        assert_eq!(profile.last_seen, now);
        assert!(profile.endpoints.contains("/api/honeypots/sql"));
        assert!(profile.attack_types.contains(&AttackType::SqlInjection));
        assert_eq!(profile.max_severity, Severity::High);
        assert_eq!(profile.dominant_attack_type, Some(AttackType::SqlInjection));
        assert_eq!(profile.country.as_deref(), Some("PE"));
    }

    #[test]
    fn test_last_seen_is_monotone() {
        let aggregator = ProfileAggregator::new();
        let now = Utc::now();

        aggregator.update(&finalized_event("1.2.3.4", "/a", Severity::Low,
            AttackType::Unknown, now));
        // Evento que llega fuera de orden con timestamp anterior
        aggregator.update(&finalized_event("1.2.3.4", "/b", Severity::Low,
            AttackType::Unknown, now - chrono::Duration::minutes(10)));

        let profile = aggregator.get("1.2.3.4").unwrap();
        assert_eq!(profile.last_seen, now);
        assert_eq!(profile.total_events, 2);
    }

    #[test]
    fn test_dominant_attack_type_follows_max_severity() {
        let aggregator = ProfileAggregator::new();
        let now = Utc::now();
        let ip = "5.6.7.8";

        aggregator.update(&finalized_event(ip, "/a", Severity::Medium,
            AttackType::Xss, now));
        aggregator.update(&finalized_event(ip, "/b", Severity::Critical,
            AttackType::CommandInjection, now));
        aggregator.update(&finalized_event(ip, "/c", Severity::High,
            AttackType::SqlInjection, now));

        let profile = aggregator.get(ip).unwrap();
        assert_eq!(profile.max_severity, Severity::Critical);
        assert_eq!(
            profile.dominant_attack_type,
            Some(AttackType::CommandInjection)
        );
    }

    #[test]
    fn test_endpoint_set_ignores_query_strings() {
        let aggregator = ProfileAggregator::new();
        let now = Utc::now();
        let ip = "9.9.9.9";

        aggregator.update(&finalized_event(ip, "/api/users?id=1", Severity::Low,
            AttackType::Unknown, now));
        aggregator.update(&finalized_event(ip, "/api/users?id=2", Severity::Low,
            AttackType::Unknown, now));

        assert_eq!(aggregator.get(ip).unwrap().endpoints.len(), 1);
    }

    #[test]
    fn test_tool_signature_raises_bot_likelihood() {
        let aggregator = ProfileAggregator::new();
        let now = Utc::now();

        let mut scanner = finalized_event("7.7.7.7", "/", Severity::Medium,
            AttackType::AutomatedTool, now);
        scanner.user_agent = Some("sqlmap/1.7".to_string());
        let with_tool = aggregator.update(&scanner);

        let human = aggregator.update(&finalized_event("8.8.8.8", "/", Severity::Low,
            AttackType::Unknown, now));

        assert!(with_tool.bot_likelihood > human.bot_likelihood);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_updates_lose_nothing() {
        let aggregator = Arc::new(ProfileAggregator::new());
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..1000 {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                let event = finalized_event(
                    "203.0.113.77",
                    &format!("/endpoint/{}", i % 7),
                    Severity::Medium,
                    AttackType::BruteForce,
                    now,
                );
                aggregator.update(&event);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let profile = aggregator.get("203.0.113.77").unwrap();
        assert_eq!(profile.total_events, 1000);
        assert_eq!(profile.endpoints.len(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_distinct_identities_update_independently() {
        let aggregator = Arc::new(ProfileAggregator::new());
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..100 {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                let ip = format!("10.1.1.{}", i % 10);
                aggregator.update(&finalized_event(&ip, "/x", Severity::Low,
                    AttackType::Unknown, now));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(aggregator.profile_count(), 10);
        for i in 0..10 {
            let profile = aggregator.get(&format!("10.1.1.{}", i)).unwrap();
            assert_eq!(profile.total_events, 10);
        }
    }
}
