use crate::{AttackEvent, EngineError, NormalizerConfig, RawCapture, Severity};
use std::collections::HashMap;
use std::net::IpAddr;
use uuid::Uuid;

/// Normalizador de capturas crudas a eventos canónicos
///
/// Transformación pura: valida, acota los snapshots y produce un
/// `AttackEvent` con identificador nuevo. Una captura malformada se
/// descarta con `Validation` y nunca entra al pipeline.
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    config: NormalizerConfig,
}

impl EventNormalizer {
    pub fn new() -> Self {
        Self::with_config(NormalizerConfig::default())
    }

    pub fn with_config(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Valida y canonicaliza una captura. Total para capturas válidas.
    pub fn normalize(&self, capture: RawCapture) -> Result<AttackEvent, EngineError> {
        self.validate(&capture)?;

        let cap = self.config.max_snapshot_bytes;
        let mut truncated = false;

        let (headers, headers_truncated) = self.snapshot_headers(&capture.headers, cap);
        truncated |= headers_truncated;

        let raw_payload = String::from_utf8_lossy(&capture.body);
        let (payload, payload_truncated) = truncate_to_boundary(&raw_payload, cap);
        truncated |= payload_truncated;

        let user_agent = header_value(&capture.headers, "user-agent");
        let country = self.derive_country(&capture);
        let tags = self.extract_tags(&capture);

        Ok(AttackEvent {
            id: Uuid::new_v4(),
            timestamp: capture.timestamp,
            source_ip: capture.source_ip,
            method: capture.method.to_uppercase(),
            endpoint: capture.path,
            headers,
            payload,
            truncated,
            country,
            user_agent,
            status_code: capture.status_code,
            response_time_ms: capture.response_time_ms,
            tags,
            attack_type: None,
            severity: Severity::Low,
            anomaly: None,
            confidence: 0.0,
        })
    }

    fn validate(&self, capture: &RawCapture) -> Result<(), EngineError> {
        if capture.source_ip.trim().is_empty() {
            return Err(EngineError::Validation("missing source address".to_string()));
        }
        if capture.method.trim().is_empty()
            || !capture.method.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(EngineError::Validation(format!(
                "invalid method: {:?}",
                capture.method
            )));
        }
        if !capture.path.starts_with('/') {
            return Err(EngineError::Validation(format!(
                "invalid path: {:?}",
                capture.path
            )));
        }
        Ok(())
    }

    /// Acota el snapshot de headers a un presupuesto total de bytes
    fn snapshot_headers(
        &self,
        headers: &HashMap<String, String>,
        cap: usize,
    ) -> (HashMap<String, String>, bool) {
        let mut snapshot = HashMap::new();
        let mut used = 0usize;
        let mut truncated = false;

        // Orden estable para que el truncamiento sea reproducible
        let mut entries: Vec<(&String, &String)> = headers.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (name, value) in entries {
            let entry_size = name.len() + value.len();
            if used + entry_size > cap {
                truncated = true;
                let remaining = cap.saturating_sub(used + name.len());
                if remaining > 0 {
                    let (partial, _) = truncate_to_boundary(value, remaining);
                    used += name.len() + partial.len();
                    snapshot.insert(name.to_lowercase(), partial);
                }
                continue;
            }
            used += entry_size;
            snapshot.insert(name.to_lowercase(), value.clone());
        }

        (snapshot, truncated)
    }

    /// Deriva el tag de país: campo explícito > header geo > rango local
    fn derive_country(&self, capture: &RawCapture) -> Option<String> {
        if let Some(country) = &capture.country {
            if !country.is_empty() {
                return Some(country.to_uppercase());
            }
        }

        for header in ["cf-ipcountry", "x-geoip-country"] {
            if let Some(value) = header_value(&capture.headers, header) {
                if !value.is_empty() {
                    return Some(value.to_uppercase());
                }
            }
        }

        if let Ok(addr) = capture.source_ip.parse::<IpAddr>() {
            let local = match addr {
                IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
                IpAddr::V6(v6) => v6.is_loopback(),
            };
            if local {
                return Some("LOCAL".to_string());
            }
        }

        None
    }

    /// Extrae tags relevantes de la captura
    fn extract_tags(&self, capture: &RawCapture) -> Vec<String> {
        let mut tags = Vec::new();
        let path = capture.path.to_lowercase();

        if ["admin", "login", "auth"].iter().any(|p| path.contains(p)) {
            tags.push("authentication_related".to_string());
        }
        if ["api", "rest", "json"].iter().any(|p| path.contains(p)) {
            tags.push("api_endpoint".to_string());
        }
        if ["sql", "database", "query"].iter().any(|p| path.contains(p)) {
            tags.push("database_related".to_string());
        }
        if ["file", "upload", "download"].iter().any(|p| path.contains(p)) {
            tags.push("file_operation".to_string());
        }

        if header_value(&capture.headers, "x-forwarded-for").is_some() {
            tags.push("proxied_request".to_string());
        }

        if let Some(ua) = header_value(&capture.headers, "user-agent") {
            let ua = ua.to_lowercase();
            if ["sqlmap", "nikto", "nmap", "burp", "zap"]
                .iter()
                .any(|tool| ua.contains(tool))
            {
                tags.push("automated_tool".to_string());
            }
        }

        tags
    }
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lookup de header sin distinguir mayúsculas
fn header_value(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

/// Recorta un string a `cap` bytes respetando límites de caracteres
fn truncate_to_boundary(s: &str, cap: usize) -> (String, bool) {
    if s.len() <= cap {
        return (s.to_string(), false);
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    (s[..end].to_string(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn capture(path: &str, body: &[u8]) -> RawCapture {
        RawCapture {
            source_ip: "203.0.113.7".to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            headers: HashMap::from([(
                "User-Agent".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            )]),
            body: body.to_vec(),
            timestamp: Utc::now(),
            status_code: Some(200),
            response_time_ms: Some(3.4),
            country: None,
        }
    }

    #[test]
    fn test_normalize_is_total_for_valid_captures() {
        let normalizer = EventNormalizer::new();
        let event = normalizer
            .normalize(capture("/api/honeypots/sql", b"id=1"))
            .unwrap();

        assert!(!event.id.to_string().is_empty());
        assert_eq!(event.endpoint, "/api/honeypots/sql");
        assert_eq!(event.method, "GET");
        assert!(!event.is_final());
        assert!(!event.truncated);
    }

    #[test]
    fn test_payload_is_capped() {
        let normalizer = EventNormalizer::with_config(NormalizerConfig {
            max_snapshot_bytes: 64,
        });
        let big = vec![b'A'; 10_000];
        let event = normalizer.normalize(capture("/upload", &big)).unwrap();

        assert!(event.truncated);
        assert!(event.payload.len() <= 64);
    }

    #[test]
    fn test_header_snapshot_is_capped() {
        let normalizer = EventNormalizer::with_config(NormalizerConfig {
            max_snapshot_bytes: 32,
        });
        let mut raw = capture("/", b"");
        raw.headers.insert("X-Filler".to_string(), "v".repeat(500));
        let event = normalizer.normalize(raw).unwrap();

        assert!(event.truncated);
        let total: usize = event
            .headers
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        assert!(total <= 32);
    }

    #[test]
    fn test_rejects_malformed_captures() {
        let normalizer = EventNormalizer::new();

        let mut no_ip = capture("/", b"");
        no_ip.source_ip = "".to_string();
        assert!(matches!(
            normalizer.normalize(no_ip),
            Err(EngineError::Validation(_))
        ));

        let mut bad_method = capture("/", b"");
        bad_method.method = "G3T!".to_string();
        assert!(matches!(
            normalizer.normalize(bad_method),
            Err(EngineError::Validation(_))
        ));

        let mut bad_path = capture("/", b"");
        bad_path.path = "no-slash".to_string();
        assert!(matches!(
            normalizer.normalize(bad_path),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_country_derivation() {
        let normalizer = EventNormalizer::new();

        let mut with_header = capture("/", b"");
        with_header
            .headers
            .insert("CF-IPCountry".to_string(), "pe".to_string());
        let event = normalizer.normalize(with_header).unwrap();
        assert_eq!(event.country.as_deref(), Some("PE"));

        let mut local = capture("/", b"");
        local.source_ip = "192.168.1.50".to_string();
        let event = normalizer.normalize(local).unwrap();
        assert_eq!(event.country.as_deref(), Some("LOCAL"));
    }

    #[test]
    fn test_tags_extraction() {
        let normalizer = EventNormalizer::new();
        let mut raw = capture("/api/admin/login", b"");
        raw.headers
            .insert("User-Agent".to_string(), "sqlmap/1.7".to_string());
        raw.headers
            .insert("X-Forwarded-For".to_string(), "10.1.1.1".to_string());

        let event = normalizer.normalize(raw).unwrap();
        assert!(event.tags.contains(&"authentication_related".to_string()));
        assert!(event.tags.contains(&"api_endpoint".to_string()));
        assert!(event.tags.contains(&"proxied_request".to_string()));
        assert!(event.tags.contains(&"automated_tool".to_string()));
    }
}
