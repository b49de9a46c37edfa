use crate::storage::EventFilter;
use crate::{AlertStatus, AttackEvent, AttackerProfile, SecurityAlert};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Configuración del storage en memoria
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// Máximo número de eventos retenidos
    pub max_events: usize,
    /// Máximo número de alertas retenidas
    pub max_alerts: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            max_alerts: 10_000,
        }
    }
}

/// Storage en memoria - backend por defecto, útil para tests y despliegues
/// sin persistencia
#[derive(Clone)]
pub struct MemoryStorage {
    events: Arc<RwLock<VecDeque<AttackEvent>>>,
    profiles: Arc<RwLock<HashMap<String, AttackerProfile>>>,
    alerts: Arc<RwLock<HashMap<Uuid, SecurityAlert>>>,
    config: MemoryStorageConfig,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }

    pub fn with_config(config: MemoryStorageConfig) -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(1024))),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            alerts: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Append-only; al superar la capacidad se desaloja el más antiguo
    pub async fn store_event(&self, event: AttackEvent) -> Result<()> {
        let mut events = self.events.write().await;
        if events.len() >= self.config.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    /// Upsert por identidad de origen
    pub async fn upsert_profile(&self, profile: AttackerProfile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.source_ip.clone(), profile);
        Ok(())
    }

    pub async fn get_profile(&self, source_ip: &str) -> Result<Option<AttackerProfile>> {
        Ok(self.profiles.read().await.get(source_ip).cloned())
    }

    pub async fn store_alert(&self, alert: SecurityAlert) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        if alerts.len() >= self.config.max_alerts && !alerts.contains_key(&alert.id) {
            // Se desaloja primero alguna alerta ya cerrada
            let closed = alerts
                .iter()
                .find(|(_, a)| !a.status.is_active())
                .map(|(id, _)| *id);
            if let Some(id) = closed {
                alerts.remove(&id);
            }
        }
        alerts.insert(alert.id, alert);
        Ok(())
    }

    /// Eventos más recientes primero
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<AttackEvent>> {
        let events = self.events.read().await;
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    pub async fn events_since(&self, from: DateTime<Utc>) -> Result<Vec<AttackEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.timestamp >= from)
            .cloned()
            .collect())
    }

    /// Búsqueda filtrada por severidad, tipo de ataque, origen y rango
    pub async fn events_filtered(&self, filter: &EventFilter) -> Result<Vec<AttackEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<AttackEvent> = events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.limit)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched)
    }

    pub async fn open_alerts(&self) -> Result<Vec<SecurityAlert>> {
        let alerts = self.alerts.read().await;
        let mut open: Vec<SecurityAlert> = alerts
            .values()
            .filter(|a| a.status == AlertStatus::Open)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn profile_count(&self) -> usize {
        self.profiles.read().await.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttackType, Severity};
    use std::collections::HashMap as StdHashMap;

    fn event(source_ip: &str, severity: Severity) -> AttackEvent {
        AttackEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source_ip: source_ip.to_string(),
            method: "GET".to_string(),
            endpoint: "/api/test".to_string(),
            headers: StdHashMap::new(),
            payload: String::new(),
            truncated: false,
            country: None,
            user_agent: None,
            status_code: Some(200),
            response_time_ms: None,
            tags: vec![],
            attack_type: Some(AttackType::Unknown),
            severity,
            anomaly: None,
            confidence: 0.0,
        }
    }

    #[tokio::test]
    async fn test_event_eviction_respects_cap() {
        let storage = MemoryStorage::with_config(MemoryStorageConfig {
            max_events: 5,
            max_alerts: 10,
        });

        for i in 0..12 {
            storage
                .store_event(event(&format!("10.0.0.{}", i), Severity::Low))
                .await
                .unwrap();
        }

        assert_eq!(storage.event_count().await, 5);
        // Los sobrevivientes son los más recientes
        let recent = storage.recent_events(10).await.unwrap();
        assert_eq!(recent[0].source_ip, "10.0.0.11");
    }

    #[tokio::test]
    async fn test_profile_upsert_supersedes() {
        let storage = MemoryStorage::new();
        let mut profile = AttackerProfile::new("10.1.1.1", Utc::now());
        profile.total_events = 1;
        storage.upsert_profile(profile.clone()).await.unwrap();

        profile.total_events = 7;
        storage.upsert_profile(profile).await.unwrap();

        let fetched = storage.get_profile("10.1.1.1").await.unwrap().unwrap();
        assert_eq!(fetched.total_events, 7);
        assert_eq!(storage.profile_count().await, 1);
    }

    #[tokio::test]
    async fn test_filtered_queries() {
        let storage = MemoryStorage::new();
        storage.store_event(event("1.1.1.1", Severity::High)).await.unwrap();
        storage.store_event(event("1.1.1.1", Severity::Low)).await.unwrap();
        storage.store_event(event("2.2.2.2", Severity::High)).await.unwrap();

        let filter = EventFilter {
            severity: Some(Severity::High),
            source_ip: Some("1.1.1.1".to_string()),
            ..EventFilter::default()
        };
        let matched = storage.events_filtered(&filter).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].source_ip, "1.1.1.1");
    }
}
