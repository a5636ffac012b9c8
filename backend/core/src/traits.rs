use async_trait::async_trait;
use tracing::warn;

use crate::error::ApiBotError;
use crate::message::{CommandRequest, OutboundMessage, ParsedCommand};

/// Normalizes a raw inbound payload into command requests.
///
/// Implementations never fail: an unrecognised payload yields no requests.
pub trait RequestAdapter: Send + Sync {
    /// Human-readable adapter name for logging.
    fn name(&self) -> &str;

    fn process(&self, raw: &serde_json::Value) -> Vec<CommandRequest>;

    /// Parse a raw request body first; bodies that are not JSON yield no requests.
    fn process_str(&self, raw: &str) -> Vec<CommandRequest> {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => self.process(&value),
            Err(e) => {
                warn!(adapter = self.name(), error = %e, "Inbound payload is not JSON");
                Vec::new()
            }
        }
    }
}

/// Splits a command request's text into a command key and argument tokens.
pub trait CommandParser: Send + Sync {
    fn parse(&self, request: &CommandRequest) -> ParsedCommand;
}

/// Posts a rendered reply back to the originating chat channel.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), ApiBotError>;
}
