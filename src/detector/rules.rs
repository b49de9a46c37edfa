use crate::AttackType;
use once_cell::sync::Lazy;
use regex::Regex;

/// Sobre qué parte del evento se evalúa la regla
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    /// Método + path + payload decodificados
    RequestLine,
    /// Solo el User-Agent
    UserAgent,
}

/// Regla de patrón con prioridad explícita
///
/// Las reglas se evalúan en orden de prioridad descendente; la primera que
/// matchea gana y los empates se resuelven por orden de declaración.
#[derive(Debug)]
pub struct PatternRule {
    pub name: &'static str,
    pub attack_type: AttackType,
    pub confidence: f64,
    pub priority: u8,
    pub target: RuleTarget,
    pub regex: Regex,
}

fn rule(
    name: &'static str,
    attack_type: AttackType,
    confidence: f64,
    priority: u8,
    target: RuleTarget,
    pattern: &str,
) -> PatternRule {
    PatternRule {
        name,
        attack_type,
        confidence,
        priority,
        target,
        regex: Regex::new(pattern).expect("invalid rule pattern"),
    }
}

/// Tabla de reglas ordenada por prioridad: traversal > sql > xss > command
/// injection > brute force > herramienta automatizada
pub static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    let mut rules = vec![
        // Directory traversal
        rule(
            "traversal_dotdot",
            AttackType::DirectoryTraversal,
            0.9,
            100,
            RuleTarget::RequestLine,
            r"\.\./|\.\.\\",
        ),
        rule(
            "traversal_sensitive_file",
            AttackType::DirectoryTraversal,
            0.9,
            100,
            RuleTarget::RequestLine,
            r"/etc/passwd|/etc/shadow|/windows/system32|boot\.ini",
        ),
        // SQL injection
        rule(
            "sql_union_select",
            AttackType::SqlInjection,
            0.9,
            90,
            RuleTarget::RequestLine,
            r"union\s+(all\s+)?select",
        ),
        rule(
            "sql_tautology",
            AttackType::SqlInjection,
            0.85,
            90,
            RuleTarget::RequestLine,
            r#"('|")?\s*or\s+('|")?\d+('|")?\s*=\s*('|")?\d+"#,
        ),
        rule(
            "sql_statement",
            AttackType::SqlInjection,
            0.85,
            90,
            RuleTarget::RequestLine,
            r"\b(select\s+.+\s+from|insert\s+into|drop\s+table|delete\s+from|update\s+\w+\s+set)\b",
        ),
        rule(
            "sql_comment_or_timing",
            AttackType::SqlInjection,
            0.8,
            90,
            RuleTarget::RequestLine,
            r"--\s*$|;\s*--|\bsleep\s*\(|\bbenchmark\s*\(|\bwaitfor\s+delay\b",
        ),
        // XSS
        rule(
            "xss_script_tag",
            AttackType::Xss,
            0.8,
            80,
            RuleTarget::RequestLine,
            r"<\s*script|<\s*/\s*script",
        ),
        rule(
            "xss_event_handler",
            AttackType::Xss,
            0.8,
            80,
            RuleTarget::RequestLine,
            r"javascript\s*:|onerror\s*=|onload\s*=|onmouseover\s*=",
        ),
        rule(
            "xss_dom_access",
            AttackType::Xss,
            0.75,
            80,
            RuleTarget::RequestLine,
            r"document\.cookie|document\.write|window\.location",
        ),
        // Command injection
        rule(
            "cmd_shell_chain",
            AttackType::CommandInjection,
            0.85,
            70,
            RuleTarget::RequestLine,
            r"[;&|]\s*(cat|ls|id|whoami|uname|wget|curl|nc|sh|bash|rm|chmod)\b",
        ),
        rule(
            "cmd_substitution",
            AttackType::CommandInjection,
            0.85,
            70,
            RuleTarget::RequestLine,
            r"\$\([^)]*\)|`[^`]*`",
        ),
        // Brute force sobre rutas de autenticación
        rule(
            "brute_force_auth_path",
            AttackType::BruteForce,
            0.6,
            60,
            RuleTarget::RequestLine,
            r"/(login|signin|logon|auth|wp-login)\b",
        ),
        // Firmas de herramientas
        rule(
            "tool_signature",
            AttackType::AutomatedTool,
            0.7,
            50,
            RuleTarget::UserAgent,
            r"sqlmap|nikto|nmap|masscan|burp|zap|dirb|gobuster|hydra|wfuzz",
        ),
    ];

    // Prioridad descendente, empates por orden de declaración
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
});

/// Evalúa la tabla y devuelve la primera regla que matchea
pub fn first_match(request_line: &str, user_agent: &str) -> Option<&'static PatternRule> {
    RULES.iter().find(|rule| match rule.target {
        RuleTarget::RequestLine => rule.regex.is_match(request_line),
        RuleTarget::UserAgent => rule.regex.is_match(user_agent),
    })
}
