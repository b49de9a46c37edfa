pub mod console;
pub mod engine;
pub mod webhook;

pub use console::ConsoleSink;
pub use engine::AlertEngine;
pub use webhook::WebhookSink;

use crate::{AlertConfig, SecurityAlert};
use anyhow::Result;

/// Fan-out de alertas emitidas hacia los sinks configurados
///
/// El fallo de un sink se registra y nunca es fatal: la alerta ya quedó
/// creada y almacenada cuando llega aquí.
pub struct AlertDispatcher {
    console: Option<ConsoleSink>,
    webhook: Option<WebhookSink>,
}

impl AlertDispatcher {
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        let console = config.console_enabled.then(ConsoleSink::new);
        let webhook = match &config.webhook_url {
            Some(url) => Some(WebhookSink::new(url)?),
            None => None,
        };

        Ok(Self { console, webhook })
    }

    pub async fn dispatch(&self, alert: &SecurityAlert) {
        if let Some(console) = &self.console {
            console.emit(alert);
        }
        if let Some(webhook) = &self.webhook {
            if let Err(e) = webhook.emit(alert).await {
                tracing::warn!("Webhook delivery failed for alert {}: {:#}", alert.id, e);
            }
        }
    }
}
