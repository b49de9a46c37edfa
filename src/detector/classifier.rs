use crate::detector::rules;
use crate::{AttackEvent, AttackType, ClassifierConfig, Severity};
use serde::{Deserialize, Serialize};

/// Resultado de clasificación de un evento
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub label: AttackType,
    pub confidence: f64,
    /// Nombre de la regla que disparó, si la etapa de patrones decidió
    pub matched_rule: Option<String>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            label: AttackType::Unknown,
            confidence: 0.0,
            matched_rule: None,
        }
    }
}

/// Centroide de un tipo de ataque en el espacio de características
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Centroid {
    pub label: AttackType,
    pub vector: Vec<f64>,
}

/// Modelo supervisado liviano: vecino más cercano entre centroides
/// ajustados offline sobre muestras etiquetadas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModel {
    pub centroids: Vec<Centroid>,
}

impl CentroidModel {
    /// Ajusta un centroide por label como la media de sus muestras
    pub fn fit(samples: &[(AttackType, Vec<f64>)]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let dims = samples[0].1.len();

        let mut sums: std::collections::HashMap<AttackType, (Vec<f64>, usize)> =
            std::collections::HashMap::new();
        for (label, vector) in samples {
            if vector.len() != dims {
                continue;
            }
            let entry = sums.entry(*label).or_insert_with(|| (vec![0.0; dims], 0));
            for (acc, v) in entry.0.iter_mut().zip(vector) {
                *acc += v;
            }
            entry.1 += 1;
        }

        let mut centroids: Vec<Centroid> = sums
            .into_iter()
            .map(|(label, (sum, count))| Centroid {
                label,
                vector: sum.iter().map(|s| s / count as f64).collect(),
            })
            .collect();
        centroids.sort_by_key(|c| c.label.as_str());

        Some(Self { centroids })
    }

    /// Predice el centroide más cercano y su distancia euclídea
    pub fn predict(&self, features: &[f64]) -> Option<(AttackType, f64)> {
        self.centroids
            .iter()
            .map(|c| (c.label, euclidean(&c.vector, features)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Clasificador de ataques en dos etapas
///
/// Primero la tabla de reglas por prioridad; si ninguna dispara, el modelo
/// de centroides opcional. Sin modelo configurado el resultado es `unknown`
/// con confianza 0. Esta etapa nunca falla el pipeline.
#[derive(Debug, Clone)]
pub struct AttackClassifier {
    config: ClassifierConfig,
    model: Option<CentroidModel>,
}

impl AttackClassifier {
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default(), None)
    }

    pub fn with_config(config: ClassifierConfig, model: Option<CentroidModel>) -> Self {
        Self { config, model }
    }

    /// Clasifica un evento; `features` es el vector ya extraído del evento
    pub fn classify(&self, event: &AttackEvent, features: &[f64]) -> Classification {
        let request_line = decode_for_matching(&format!(
            "{} {} {}",
            event.method, event.endpoint, event.payload
        ));
        let user_agent = event
            .user_agent
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        if let Some(rule) = rules::first_match(&request_line, &user_agent) {
            return Classification {
                label: rule.attack_type,
                confidence: rule.confidence,
                matched_rule: Some(rule.name.to_string()),
            };
        }

        if let Some(model) = &self.model {
            if let Some((label, distance)) = model.predict(features) {
                if distance <= self.config.centroid_max_distance {
                    let confidence =
                        (1.0 - distance / self.config.centroid_max_distance).clamp(0.0, 1.0) * 0.75;
                    return Classification {
                        label,
                        confidence,
                        matched_rule: None,
                    };
                }
            }
        }

        Classification::unknown()
    }

    /// Política de severidad: base por tipo de ataque, escalada un nivel
    /// cuando el score combinado de anomalía supera el umbral configurado
    pub fn severity_for(&self, label: AttackType, combined_anomaly: f64) -> Severity {
        let base = match label {
            AttackType::CommandInjection => Severity::Critical,
            AttackType::DirectoryTraversal | AttackType::SqlInjection => Severity::High,
            AttackType::Xss | AttackType::BruteForce | AttackType::AutomatedTool => {
                Severity::Medium
            }
            AttackType::Unknown => Severity::Low,
        };

        if combined_anomaly >= self.config.escalation_threshold {
            base.escalated()
        } else {
            base
        }
    }
}

impl Default for AttackClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodifica url-encoding (hasta dos pasadas) y normaliza a minúsculas
fn decode_for_matching(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..2 {
        match urlencoding::decode(&current) {
            Ok(decoded) => {
                if decoded == current {
                    break;
                }
                current = decoded.into_owned();
            }
            Err(_) => break,
        }
    }
    current.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::features::{FeatureExtractor, FEATURE_COUNT};
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn event(method: &str, path: &str, payload: &str, ua: &str) -> AttackEvent {
        AttackEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source_ip: "203.0.113.9".to_string(),
            method: method.to_string(),
            endpoint: path.to_string(),
            headers: HashMap::new(),
            payload: payload.to_string(),
            truncated: false,
            country: None,
            user_agent: Some(ua.to_string()),
            status_code: Some(200),
            response_time_ms: None,
            tags: vec![],
            attack_type: None,
            severity: Severity::Low,
            anomaly: None,
            confidence: 0.0,
        }
    }

    #[test]
    fn test_sql_injection_classification() {
        let classifier = AttackClassifier::new();
        let e = event(
            "POST",
            "/api/honeypots/sql",
            "1 UNION SELECT * FROM users",
            "Mozilla/5.0",
        );
        let features = FeatureExtractor::new().extract(&e);

        let result = classifier.classify(&e, &features);
        assert_eq!(result.label, AttackType::SqlInjection);
        assert!(result.confidence >= 0.8);
        assert!(result.matched_rule.is_some());
    }

    #[test]
    fn test_url_encoded_payload_is_decoded() {
        let classifier = AttackClassifier::new();
        let e = event(
            "GET",
            "/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E",
            "",
            "Mozilla/5.0",
        );
        let features = FeatureExtractor::new().extract(&e);

        let result = classifier.classify(&e, &features);
        assert_eq!(result.label, AttackType::Xss);
    }

    #[test]
    fn test_no_rule_and_no_model_yields_unknown() {
        let classifier = AttackClassifier::new();
        let e = event("GET", "/api/products", "page=2", "Mozilla/5.0");
        let features = FeatureExtractor::new().extract(&e);

        let result = classifier.classify(&e, &features);
        assert_eq!(result.label, AttackType::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_centroid_model_fallback() {
        let mut hostile = vec![0.0; FEATURE_COUNT];
        hostile[1] = 0.9;
        hostile[14] = 0.8;
        let mut benign = vec![0.0; FEATURE_COUNT];
        benign[0] = 0.05;

        let model = CentroidModel::fit(&[
            (AttackType::SqlInjection, hostile.clone()),
            (AttackType::Unknown, benign),
        ])
        .unwrap();
        let classifier = AttackClassifier::with_config(ClassifierConfig::default(), Some(model));

        // Sin regla que dispare, decide el centroide más cercano
        let e = event("GET", "/api/products", "page=2", "Mozilla/5.0");
        let result = classifier.classify(&e, &hostile);
        assert_eq!(result.label, AttackType::SqlInjection);
        assert!(result.confidence > 0.0);
        assert!(result.matched_rule.is_none());
    }

    #[test]
    fn test_severity_policy() {
        let classifier = AttackClassifier::new();

        assert_eq!(
            classifier.severity_for(AttackType::SqlInjection, 0.3),
            Severity::High
        );
        assert_eq!(
            classifier.severity_for(AttackType::CommandInjection, 0.0),
            Severity::Critical
        );
        assert_eq!(
            classifier.severity_for(AttackType::Xss, 0.2),
            Severity::Medium
        );
        // Escalada por anomalía extrema
        assert_eq!(
            classifier.severity_for(AttackType::SqlInjection, 0.9),
            Severity::Critical
        );
        assert_eq!(
            classifier.severity_for(AttackType::Unknown, 0.9),
            Severity::Medium
        );
    }
}
