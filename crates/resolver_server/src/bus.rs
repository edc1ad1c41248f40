//! HTTP publisher for the event bus inject endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use resolver_core::ports::{EventBus, Result};
use resolver_core::{Envelope, ResolverError};

pub struct HttpBus {
    http: Client,
    inject_url: String,
    timeout: Duration,
}

impl HttpBus {
    pub fn new(inject_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            inject_url: inject_url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl EventBus for HttpBus {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let response = self
            .http
            .post(&self.inject_url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolverError::UpstreamTimeout {
                        operation: "bus.publish".into(),
                        timeout: self.timeout,
                    }
                } else {
                    ResolverError::Publish(format!("{} publish failed: {e}", envelope.channel))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolverError::Publish(format!(
                "{} rejected with {status}: {}",
                envelope.channel,
                body.chars().take(200).collect::<String>()
            )));
        }

        tracing::debug!(channel = %envelope.channel, "published");
        Ok(())
    }
}
