//! Pass-through relay from the input route to the output route
//!
//! Every inbound message is counted and logged. Non-empty payloads are
//! republished unchanged, with a copy of their metadata, on the output
//! route. The dispatcher always gets `Completed` back, so a message that
//! could not be forwarded is dropped rather than redelivered.

use crate::domain::{MessageResponse, RelayError, RelayedMessage};
use crate::infra::metrics::RelayMetrics;
use crate::io::mqtt::{HandlerContext, InputMessageHandler};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PipeHandler {
    output: String,
    metrics: Arc<RelayMetrics>,
}

impl PipeHandler {
    pub fn new(output: impl Into<String>, metrics: Arc<RelayMetrics>) -> Self {
        Self { output: output.into(), metrics }
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

#[async_trait]
impl InputMessageHandler for PipeHandler {
    async fn handle(
        &self,
        message: &RelayedMessage,
        context: &HandlerContext,
    ) -> Result<MessageResponse, RelayError> {
        let counter = self.metrics.record_message_received();

        let client = context.upgrade().ok_or(RelayError::InvalidContext)?;

        info!(counter = %counter, body = %message.body_lossy(), "relay_received");

        if message.is_empty() {
            self.metrics.record_message_skipped();
            return Ok(MessageResponse::Completed);
        }

        let outbound = message.clone();
        match client.send_event(&self.output, outbound).await {
            Ok(()) => {
                self.metrics.record_message_forwarded();
                info!(counter = %counter, output = %self.output, "relay_forwarded");
            }
            Err(e) => {
                self.metrics.record_relay_failure();
                warn!(counter = %counter, output = %self.output, error = %e, "relay_publish_failed");
            }
        }

        Ok(MessageResponse::Completed)
    }
}
