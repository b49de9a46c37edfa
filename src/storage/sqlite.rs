use crate::storage::EventFilter;
use crate::{AnomalyScore, AttackEvent, AttackType, AttackerProfile, SecurityAlert, Severity};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};
use uuid::Uuid;

/// Storage durable sobre SQLite
///
/// Eventos append-only, perfiles upsert-por-clave y alertas con reemplazo
/// de estado. El esquema indexa identidad de origen, timestamp, severidad
/// y tipo de ataque para las consultas del dashboard.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
            Sqlite::create_database(database_url)
                .await
                .context("Failed to create SQLite database")?;
            tracing::info!("Created SQLite database: {}", database_url);
        }

        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        tracing::info!("SQLite storage initialized successfully");
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attack_events (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                source_ip TEXT NOT NULL,
                method TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                headers TEXT NOT NULL,
                payload TEXT NOT NULL,
                truncated BOOLEAN NOT NULL DEFAULT FALSE,
                country TEXT,
                user_agent TEXT,
                status_code INTEGER,
                response_time_ms REAL,
                tags TEXT NOT NULL,
                attack_type TEXT,
                severity TEXT NOT NULL,
                anomaly TEXT,
                confidence REAL NOT NULL DEFAULT 0.0
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create attack_events table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attacker_profiles (
                source_ip TEXT PRIMARY KEY,
                risk_score REAL NOT NULL,
                threat_level TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                profile TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create attacker_profiles table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS security_alerts (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                source_ip TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                status TEXT NOT NULL,
                alert TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create security_alerts table")?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON attack_events(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_events_source_ip ON attack_events(source_ip)",
            "CREATE INDEX IF NOT EXISTS idx_events_severity ON attack_events(severity)",
            "CREATE INDEX IF NOT EXISTS idx_events_attack_type ON attack_events(attack_type)",
            "CREATE INDEX IF NOT EXISTS idx_profiles_last_seen ON attacker_profiles(last_seen)",
            "CREATE INDEX IF NOT EXISTS idx_alerts_status ON security_alerts(status)",
        ] {
            sqlx::query(statement).execute(&self.pool).await.ok();
        }

        tracing::debug!("Database schema initialized with indices");
        Ok(())
    }

    /// Inserta un evento finalizado (append-only)
    pub async fn store_event(&self, event: &AttackEvent) -> Result<()> {
        let headers_json = serde_json::to_string(&event.headers)?;
        let tags_json = serde_json::to_string(&event.tags)?;
        let anomaly_json = event
            .anomaly
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO attack_events (
                id, timestamp, source_ip, method, endpoint, headers, payload,
                truncated, country, user_agent, status_code, response_time_ms,
                tags, attack_type, severity, anomaly, confidence
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(event.id.to_string())
        .bind(event.timestamp.to_rfc3339())
        .bind(&event.source_ip)
        .bind(&event.method)
        .bind(&event.endpoint)
        .bind(headers_json)
        .bind(&event.payload)
        .bind(event.truncated)
        .bind(&event.country)
        .bind(&event.user_agent)
        .bind(event.status_code.map(|s| s as i64))
        .bind(event.response_time_ms)
        .bind(tags_json)
        .bind(event.attack_type.map(|t| t.as_str()))
        .bind(event.severity.as_str())
        .bind(anomaly_json)
        .bind(event.confidence)
        .execute(&self.pool)
        .await
        .context("Failed to store attack event")?;

        Ok(())
    }

    /// Upsert del perfil por identidad de origen
    pub async fn upsert_profile(&self, profile: &AttackerProfile) -> Result<()> {
        let profile_json = serde_json::to_string(profile)?;

        sqlx::query(
            r#"
            INSERT INTO attacker_profiles (source_ip, risk_score, threat_level, last_seen, profile)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source_ip) DO UPDATE SET
                risk_score = excluded.risk_score,
                threat_level = excluded.threat_level,
                last_seen = excluded.last_seen,
                profile = excluded.profile
        "#,
        )
        .bind(&profile.source_ip)
        .bind(profile.risk_score)
        .bind(format!("{:?}", profile.threat_level).to_lowercase())
        .bind(profile.last_seen.to_rfc3339())
        .bind(profile_json)
        .execute(&self.pool)
        .await
        .context("Failed to upsert attacker profile")?;

        Ok(())
    }

    pub async fn get_profile(&self, source_ip: &str) -> Result<Option<AttackerProfile>> {
        let row = sqlx::query("SELECT profile FROM attacker_profiles WHERE source_ip = ?")
            .bind(source_ip)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch attacker profile")?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("profile")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Inserta o reemplaza una alerta (los cambios de estado reescriben)
    pub async fn store_alert(&self, alert: &SecurityAlert) -> Result<()> {
        let alert_json = serde_json::to_string(alert)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO security_alerts (
                id, created_at, alert_type, severity, source_ip, endpoint, status, alert
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(alert.id.to_string())
        .bind(alert.created_at.to_rfc3339())
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.source_ip)
        .bind(&alert.endpoint)
        .bind(alert.status.as_str())
        .bind(alert_json)
        .execute(&self.pool)
        .await
        .context("Failed to store security alert")?;

        Ok(())
    }

    pub async fn recent_events(&self, limit: usize) -> Result<Vec<AttackEvent>> {
        let rows = sqlx::query("SELECT * FROM attack_events ORDER BY timestamp DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch recent events")?;

        rows.iter().map(row_to_event).collect()
    }

    pub async fn events_since(&self, from: DateTime<Utc>) -> Result<Vec<AttackEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM attack_events WHERE timestamp >= ? ORDER BY timestamp DESC",
        )
        .bind(from.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch events by range")?;

        rows.iter().map(row_to_event).collect()
    }

    /// Consulta filtrada; las cláusulas se agregan según el filtro
    pub async fn events_filtered(&self, filter: &EventFilter) -> Result<Vec<AttackEvent>> {
        let mut sql = String::from("SELECT * FROM attack_events WHERE 1 = 1");
        if filter.severity.is_some() {
            sql.push_str(" AND severity = ?");
        }
        if filter.attack_type.is_some() {
            sql.push_str(" AND attack_type = ?");
        }
        if filter.source_ip.is_some() {
            sql.push_str(" AND source_ip = ?");
        }
        if filter.from.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if filter.to.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(severity) = filter.severity {
            query = query.bind(severity.as_str());
        }
        if let Some(attack_type) = filter.attack_type {
            query = query.bind(attack_type.as_str());
        }
        if let Some(source_ip) = &filter.source_ip {
            query = query.bind(source_ip.clone());
        }
        if let Some(from) = filter.from {
            query = query.bind(from.to_rfc3339());
        }
        if let Some(to) = filter.to {
            query = query.bind(to.to_rfc3339());
        }
        query = query.bind(filter.limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch filtered events")?;

        rows.iter().map(row_to_event).collect()
    }

    pub async fn open_alerts(&self) -> Result<Vec<SecurityAlert>> {
        let rows = sqlx::query(
            "SELECT alert FROM security_alerts WHERE status = 'open' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch open alerts")?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("alert")?;
                Ok(serde_json::from_str(&raw)?)
            })
            .collect()
    }

    pub async fn event_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM attack_events")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }
}

fn row_to_event(row: &SqliteRow) -> Result<AttackEvent> {
    let id: String = row.try_get("id")?;
    let timestamp: String = row.try_get("timestamp")?;
    let headers: String = row.try_get("headers")?;
    let tags: String = row.try_get("tags")?;
    let attack_type: Option<String> = row.try_get("attack_type")?;
    let severity: String = row.try_get("severity")?;
    let anomaly: Option<String> = row.try_get("anomaly")?;
    let status_code: Option<i64> = row.try_get("status_code")?;

    let anomaly: Option<AnomalyScore> = anomaly
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .context("corrupt anomaly column")?;

    Ok(AttackEvent {
        id: Uuid::parse_str(&id).context("corrupt event id")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .context("corrupt event timestamp")?
            .with_timezone(&Utc),
        source_ip: row.try_get("source_ip")?,
        method: row.try_get("method")?,
        endpoint: row.try_get("endpoint")?,
        headers: serde_json::from_str(&headers).context("corrupt headers column")?,
        payload: row.try_get("payload")?,
        truncated: row.try_get("truncated")?,
        country: row.try_get("country")?,
        user_agent: row.try_get("user_agent")?,
        status_code: status_code.map(|s| s as u16),
        response_time_ms: row.try_get("response_time_ms")?,
        tags: serde_json::from_str(&tags).context("corrupt tags column")?,
        attack_type: attack_type.and_then(|t| AttackType::from_str_loose(&t)),
        severity: Severity::from_str_loose(&severity).unwrap_or(Severity::Low),
        anomaly,
        confidence: row.try_get("confidence")?,
    })
}
