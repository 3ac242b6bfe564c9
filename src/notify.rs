//! Webhook delivery of workflow events

use reqwest::Client;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::workflow::WorkflowEvent;

/// Posts workflow events as JSON to a single webhook endpoint
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    /// Deliver one event
    pub async fn dispatch<E: Serialize>(&self, event: &E) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| AppError::Dispatch(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Dispatch(format!(
                "Webhook rejected event: {} - {}",
                status, text
            )));
        }

        Ok(())
    }

    /// Forward events until the sending side closes.
    ///
    /// Delivery failures are logged and skipped; a transition is never undone
    /// because its notification could not be sent.
    pub async fn run(self, mut events: broadcast::Receiver<WorkflowEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.dispatch(&event).await {
                        tracing::warn!(url = %self.url, error = %e, "notification delivery failed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("notification dispatcher stopped");
    }

    pub fn spawn(self, events: broadcast::Receiver<WorkflowEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}
