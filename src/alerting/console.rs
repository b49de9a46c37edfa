use crate::{AlertTrigger, SecurityAlert, Severity};
use colored::Colorize;

/// Configuración del sink de consola
#[derive(Debug, Clone)]
pub struct ConsoleSinkConfig {
    pub use_colors: bool,
    pub show_contributing_events: bool,
    pub minimum_severity: Severity,
}

impl Default for ConsoleSinkConfig {
    fn default() -> Self {
        Self {
            use_colors: true,
            show_contributing_events: true,
            minimum_severity: Severity::Low,
        }
    }
}

/// Sink que imprime alertas en la consola del operador
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    config: ConsoleSinkConfig,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConsoleSinkConfig) -> Self {
        Self { config }
    }

    pub fn emit(&self, alert: &SecurityAlert) {
        if alert.severity < self.config.minimum_severity {
            return;
        }

        let severity_label = format!("[{}]", alert.severity.as_str().to_uppercase());
        let severity_label = if self.config.use_colors {
            match alert.severity {
                Severity::Critical => severity_label.red().bold().to_string(),
                Severity::High => severity_label.red().to_string(),
                Severity::Medium => severity_label.yellow().to_string(),
                Severity::Low => severity_label.green().to_string(),
            }
        } else {
            severity_label
        };

        let trigger = match &alert.trigger {
            AlertTrigger::RiskThreshold { score } => format!("risk score {:.1}", score),
            AlertTrigger::CriticalEvent => "critical event".to_string(),
        };

        println!(
            "{} {} {} | source {} | endpoint {} | {}",
            alert.created_at.format("%Y-%m-%d %H:%M:%S"),
            severity_label,
            alert.title,
            alert.source_ip,
            alert.endpoint,
            trigger,
        );

        if self.config.show_contributing_events && !alert.contributing_events.is_empty() {
            println!(
                "    evidence: {} event(s), first {}",
                alert.contributing_events.len(),
                alert.contributing_events[0]
            );
        }
    }
}
