pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use error::ApiBotError;
pub use message::{CommandRequest, OutboundMessage, ParsedCommand};
pub use traits::{CommandParser, DeliveryAdapter, RequestAdapter};
pub use types::{CommandConfig, FormatSpec, ResponseShape, ResponseType};
