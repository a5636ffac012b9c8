//! Request and delivery adapters for the chat channels the bot speaks on.

// --------------- Webhook adapters ---------------
pub mod messenger;

// --------------- Local adapters ---------------
pub mod plain;

pub use messenger::{MessengerAdapter, MessengerConfig, WebhookState};
pub use plain::{ConsoleDelivery, PlainAdapter};
