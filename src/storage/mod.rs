pub mod manager;
pub mod memory;
pub mod sqlite;

pub use manager::{StorageConfig, StorageManager, StorageType};
pub use memory::{MemoryStorage, MemoryStorageConfig};
pub use sqlite::SqliteStorage;

use crate::{AttackEvent, AttackType, Severity};
use chrono::{DateTime, Utc};

/// Filtro de consulta sobre eventos almacenados
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub severity: Option<Severity>,
    pub attack_type: Option<AttackType>,
    pub source_ip: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            severity: None,
            attack_type: None,
            source_ip: None,
            from: None,
            to: None,
            limit: 100,
        }
    }
}

impl EventFilter {
    pub fn matches(&self, event: &AttackEvent) -> bool {
        if let Some(severity) = self.severity {
            if event.severity != severity {
                return false;
            }
        }
        if let Some(attack_type) = self.attack_type {
            if event.attack_type != Some(attack_type) {
                return false;
            }
        }
        if let Some(source_ip) = &self.source_ip {
            if &event.source_ip != source_ip {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.timestamp > to {
                return false;
            }
        }
        true
    }
}
