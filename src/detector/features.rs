use crate::AttackEvent;

/// Dimensión fija del vector de características
pub const FEATURE_COUNT: usize = 20;

/// Keywords sospechosas buscadas en path y payload
const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "sql", "union", "select", "insert", "delete", "update", "drop", "script",
    "javascript", "onerror", "onload", "alert", "admin", "login", "auth",
    "password", "user", "../", "..\\", "/etc/passwd", "/windows/system32",
    "eval", "exec", "system", "cmd", "shell",
];

/// Firmas de herramientas automatizadas en el User-Agent
pub const TOOL_SIGNATURES: &[&str] = &[
    "sqlmap", "nikto", "nmap", "burp", "zap", "scanner", "bot", "crawler",
    "spider", "scraper", "automated", "curl", "python-requests",
];

const SPECIAL_CHARS: &[char] = &[
    '<', '>', '"', '\'', ';', '(', ')', '{', '}', '[', ']', '&', '|', '*',
    '%', '$', '#', '@', '!', '?', '\\', '/', '+', '=', '~', '`', '^',
];

/// Extractor de características para el scoring de anomalías
///
/// Función determinista del evento: el mismo evento produce siempre el mismo
/// vector. Campos ausentes aportan el valor por defecto, nunca un error.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Deriva el vector de longitud fija `FEATURE_COUNT`
    pub fn extract(&self, event: &AttackEvent) -> Vec<f64> {
        let path = event.endpoint.to_lowercase();
        let payload = event.payload.to_lowercase();
        let combined = format!("{} {}", path, payload);
        let user_agent = event
            .user_agent
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        let keyword_hits = SUSPICIOUS_KEYWORDS
            .iter()
            .filter(|k| combined.contains(*k))
            .count();
        let ua_hits = TOOL_SIGNATURES
            .iter()
            .filter(|s| user_agent.contains(*s))
            .count();
        let query = path.split('?').nth(1);
        let query_params = query.map(|q| q.split('&').count()).unwrap_or(0);
        let content_type = event
            .headers
            .get("content-type")
            .map(|v| v.to_lowercase())
            .unwrap_or_default();

        let special_count = combined.chars().filter(|c| SPECIAL_CHARS.contains(c)).count();
        let special_density = if combined.is_empty() {
            0.0
        } else {
            special_count as f64 / combined.chars().count() as f64
        };
        let digit_count = combined.chars().filter(|c| c.is_ascii_digit()).count();
        let digit_ratio = if combined.is_empty() {
            0.0
        } else {
            digit_count as f64 / combined.chars().count() as f64
        };

        let features = vec![
            clamp01(path.len() as f64 / 1000.0),
            clamp01(keyword_hits as f64 / 10.0),
            clamp01(query_params as f64 / 20.0),
            clamp01(user_agent.len() as f64 / 500.0),
            clamp01(ua_hits as f64 / 5.0),
            method_encoding(&event.method),
            clamp01(event.headers.len() as f64 / 50.0),
            flag(content_type.contains("json")),
            flag(content_type.contains("form")),
            flag(event.headers.contains_key("authorization")),
            flag(event.headers.contains_key("x-forwarded-for")),
            flag(query.is_some()),
            flag(combined.contains("../") || combined.contains("..\\")),
            clamp01(event.payload.len() as f64 / 8192.0),
            clamp01(special_density),
            clamp01(shannon_entropy(&payload) / 8.0),
            clamp01(path_depth(&path) as f64 / 10.0),
            clamp01(digit_ratio),
            status_class(event.status_code),
            clamp01(event.response_time_ms.unwrap_or(0.0) / 1000.0),
        ];

        debug_assert_eq!(features.len(), FEATURE_COUNT);
        features
    }

    /// Nombres posicionales, útiles para explicar un score
    pub fn feature_names(&self) -> Vec<&'static str> {
        vec![
            "path_length",
            "keyword_density",
            "query_param_count",
            "user_agent_length",
            "tool_signature_density",
            "method_encoding",
            "header_count",
            "content_type_json",
            "content_type_form",
            "has_authorization",
            "has_forwarded_for",
            "has_query",
            "has_traversal",
            "payload_length",
            "special_char_density",
            "payload_entropy",
            "path_depth",
            "digit_ratio",
            "status_class",
            "response_time",
        ]
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn method_encoding(method: &str) -> f64 {
    let index = match method {
        "GET" => 0.0,
        "POST" => 1.0,
        "PUT" => 2.0,
        "DELETE" => 3.0,
        "HEAD" => 4.0,
        "OPTIONS" => 5.0,
        _ => 6.0,
    };
    index / 6.0
}

fn status_class(status: Option<u16>) -> f64 {
    match status {
        Some(s) if s < 300 => 0.2,
        Some(s) if s < 400 => 0.4,
        Some(s) if s < 500 => 0.6,
        Some(_) => 0.8,
        None => 0.0,
    }
}

fn path_depth(path: &str) -> usize {
    path.split('?')
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|seg| !seg.is_empty())
        .count()
}

/// Entropía de Shannon del payload
fn shannon_entropy(payload: &str) -> f64 {
    if payload.is_empty() {
        return 0.0;
    }

    let mut char_counts = std::collections::BTreeMap::new();
    for ch in payload.chars() {
        *char_counts.entry(ch).or_insert(0u64) += 1;
    }

    let len = payload.chars().count() as f64;
    let mut entropy = 0.0;
    for &count in char_counts.values() {
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }
    entropy
}
