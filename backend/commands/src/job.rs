/// Job: one parsed command travelling through query → format → render → deliver.
use std::sync::Arc;

use apibot_core::{ApiBotError, DeliveryAdapter, OutboundMessage, ParsedCommand};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::renderer::{ArgMap, Renderer, RENDERER_ERROR};

pub struct Job {
    pub id: Uuid,
    pub sender_id: String,
    pub args: ArgMap,
    /// Target URL, computed once at construction.
    pub url: String,
    /// Formatted response body, set once the query succeeds.
    pub body: Option<Value>,
    /// Rendered reply, set once rendering succeeds.
    pub text: Option<String>,
    renderer: Arc<Renderer>,
    delivery: Arc<dyn DeliveryAdapter>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("cmd", &self.renderer.cmd())
            .field("sender_id", &self.sender_id)
            .field("args", &self.args)
            .field("url", &self.url)
            .field("body", &self.body)
            .field("text", &self.text)
            .field("delivery", &self.delivery.name())
            .finish()
    }
}

impl Job {
    pub fn new(
        parsed: &ParsedCommand,
        renderer: Arc<Renderer>,
        delivery: Arc<dyn DeliveryAdapter>,
    ) -> Self {
        let id = Uuid::new_v4();
        let args = renderer.get_args(&parsed.tokens);
        let url = renderer.url_of(&args).unwrap_or_else(|e| {
            warn!(job = %id, cmd = %renderer.cmd(), error = %e, "Failed to build URL");
            RENDERER_ERROR.to_string()
        });
        Self {
            id,
            sender_id: parsed.sender_id.clone(),
            args,
            url,
            body: None,
            text: None,
            renderer,
            delivery,
        }
    }

    pub fn cmd(&self) -> &str {
        self.renderer.cmd()
    }

    /// Run the pipeline; the first failing stage ends the job with its error.
    pub async fn exec(mut self) -> Result<Self, ApiBotError> {
        debug!(job = %self.id, cmd = %self.cmd(), "Job started");

        let body = self.renderer.query(&self.url).await?;
        let body = self.renderer.format_body(body);
        let text = self.renderer.render(&self.args, &body)?;
        self.body = Some(body);
        self.text = Some(text.clone());

        let message = OutboundMessage {
            sender_id: self.sender_id.clone(),
            text,
        };
        self.delivery.deliver(&message).await?;

        info!(job = %self.id, cmd = %self.cmd(), via = self.delivery.name(), "Job delivered");
        Ok(self)
    }
}
