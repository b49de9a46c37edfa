use crate::SecurityAlert;
use anyhow::{Context, Result};
use std::time::Duration;

/// Sink que entrega alertas como JSON a un webhook externo
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("building webhook client")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn emit(&self, alert: &SecurityAlert) -> Result<()> {
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .context("sending alert webhook")?
            .error_for_status()
            .context("webhook endpoint rejected alert")?;

        tracing::debug!("Alert {} delivered to webhook", alert.id);
        Ok(())
    }
}
