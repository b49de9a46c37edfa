use crate::storage::{EventFilter, MemoryStorage, MemoryStorageConfig, SqliteStorage};
use crate::{AttackEvent, AttackerProfile, SecurityAlert};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tipos de storage disponibles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Memory,
    Sqlite,
    /// Memoria para lecturas + SQLite como respaldo durable
    Hybrid,
}

/// Configuración del Storage Manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub storage_type: StorageType,
    pub sqlite_path: String,
    pub memory_max_events: usize,
    pub memory_max_alerts: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            sqlite_path: "honeysentry.db".to_string(),
            memory_max_events: 100_000,
            memory_max_alerts: 10_000,
        }
    }
}

/// Fachada que abstrae los backends de almacenamiento
#[derive(Clone)]
pub struct StorageManager {
    storage_impl: StorageImplementation,
}

#[derive(Clone)]
enum StorageImplementation {
    Memory(Arc<MemoryStorage>),
    Sqlite(Arc<SqliteStorage>),
    Hybrid {
        memory: Arc<MemoryStorage>,
        sqlite: Arc<SqliteStorage>,
    },
}

impl StorageManager {
    /// Storage en memoria con configuración por defecto
    pub async fn new() -> Result<Self> {
        Self::with_config(StorageConfig::default()).await
    }

    pub async fn with_config(config: StorageConfig) -> Result<Self> {
        let memory_config = MemoryStorageConfig {
            max_events: config.memory_max_events,
            max_alerts: config.memory_max_alerts,
        };

        let storage_impl = match config.storage_type {
            StorageType::Memory => {
                StorageImplementation::Memory(Arc::new(MemoryStorage::with_config(memory_config)))
            }
            StorageType::Sqlite => {
                let url = format!("sqlite:{}", config.sqlite_path);
                StorageImplementation::Sqlite(Arc::new(SqliteStorage::new(&url).await?))
            }
            StorageType::Hybrid => {
                let url = format!("sqlite:{}", config.sqlite_path);
                StorageImplementation::Hybrid {
                    memory: Arc::new(MemoryStorage::with_config(memory_config)),
                    sqlite: Arc::new(SqliteStorage::new(&url).await?),
                }
            }
        };

        Ok(Self { storage_impl })
    }

    pub async fn store_event(&self, event: &AttackEvent) -> Result<()> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.store_event(event.clone()).await,
            StorageImplementation::Sqlite(sqlite) => sqlite.store_event(event).await,
            StorageImplementation::Hybrid { memory, sqlite } => {
                memory.store_event(event.clone()).await?;
                sqlite.store_event(event).await
            }
        }
    }

    pub async fn upsert_profile(&self, profile: &AttackerProfile) -> Result<()> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.upsert_profile(profile.clone()).await,
            StorageImplementation::Sqlite(sqlite) => sqlite.upsert_profile(profile).await,
            StorageImplementation::Hybrid { memory, sqlite } => {
                memory.upsert_profile(profile.clone()).await?;
                sqlite.upsert_profile(profile).await
            }
        }
    }

    pub async fn get_profile(&self, source_ip: &str) -> Result<Option<AttackerProfile>> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.get_profile(source_ip).await,
            StorageImplementation::Sqlite(sqlite) => sqlite.get_profile(source_ip).await,
            StorageImplementation::Hybrid { memory, .. } => memory.get_profile(source_ip).await,
        }
    }

    pub async fn store_alert(&self, alert: &SecurityAlert) -> Result<()> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.store_alert(alert.clone()).await,
            StorageImplementation::Sqlite(sqlite) => sqlite.store_alert(alert).await,
            StorageImplementation::Hybrid { memory, sqlite } => {
                memory.store_alert(alert.clone()).await?;
                sqlite.store_alert(alert).await
            }
        }
    }

    pub async fn recent_events(&self, limit: usize) -> Result<Vec<AttackEvent>> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.recent_events(limit).await,
            StorageImplementation::Sqlite(sqlite) => sqlite.recent_events(limit).await,
            StorageImplementation::Hybrid { memory, .. } => memory.recent_events(limit).await,
        }
    }

    pub async fn events_since(&self, from: DateTime<Utc>) -> Result<Vec<AttackEvent>> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.events_since(from).await,
            StorageImplementation::Sqlite(sqlite) => sqlite.events_since(from).await,
            StorageImplementation::Hybrid { memory, .. } => memory.events_since(from).await,
        }
    }

    pub async fn events_filtered(&self, filter: &EventFilter) -> Result<Vec<AttackEvent>> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.events_filtered(filter).await,
            StorageImplementation::Sqlite(sqlite) => sqlite.events_filtered(filter).await,
            StorageImplementation::Hybrid { memory, .. } => memory.events_filtered(filter).await,
        }
    }

    pub async fn open_alerts(&self) -> Result<Vec<SecurityAlert>> {
        match &self.storage_impl {
            StorageImplementation::Memory(memory) => memory.open_alerts().await,
            StorageImplementation::Sqlite(sqlite) => sqlite.open_alerts().await,
            StorageImplementation::Hybrid { memory, .. } => memory.open_alerts().await,
        }
    }
}
