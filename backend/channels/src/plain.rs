/// Local adapters for the CLI: plain JSON events in, stdout out.
use apibot_core::{ApiBotError, CommandRequest, DeliveryAdapter, OutboundMessage, RequestAdapter};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const CONSOLE_SENDER: &str = "console";

/// Accepts a bare string, a `{ "sender_id", "text" }` object, or an array of either.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainAdapter;

#[derive(Deserialize)]
struct PlainRequest {
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl PlainAdapter {
    fn one(value: &Value) -> Option<CommandRequest> {
        match value {
            Value::String(text) => Some(CommandRequest::new(CONSOLE_SENDER, Some(text.clone()))),
            Value::Object(_) => match PlainRequest::deserialize(value) {
                Ok(req) => Some(CommandRequest::new(
                    req.sender_id.unwrap_or_else(|| CONSOLE_SENDER.to_string()),
                    req.text,
                )),
                Err(e) => {
                    warn!(error = %e, "[Plain] Ignoring malformed request object");
                    None
                }
            },
            other => {
                debug!(value = %other, "[Plain] Ignoring unsupported request value");
                None
            }
        }
    }
}

impl RequestAdapter for PlainAdapter {
    fn name(&self) -> &str {
        "plain"
    }

    fn process(&self, raw: &Value) -> Vec<CommandRequest> {
        match raw {
            Value::Array(items) => items.iter().filter_map(Self::one).collect(),
            other => Self::one(other).into_iter().collect(),
        }
    }
}

/// Prints each reply to stdout as `[sender] text`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDelivery;

#[async_trait]
impl DeliveryAdapter for ConsoleDelivery {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), ApiBotError> {
        println!("[{}] {}", message.sender_id, message.text);
        Ok(())
    }
}
