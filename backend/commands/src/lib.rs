pub mod detection;
pub mod dispatch;
pub mod format;
pub mod job;
pub mod registry;
pub mod renderer;
pub mod template;

pub use detection::{detect_command, SlashParser};
pub use dispatch::{CommandDispatcher, DispatchOutcome, SkipReason, Skipped, DEFAULT_MAX_CONCURRENT_JOBS};
pub use format::{FormatError, NumberFormat};
pub use job::Job;
pub use registry::{CommandSummary, RendererRegistry};
pub use renderer::{
    default_client, http_client, ArgMap, Renderer, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, RENDERER_ERROR,
};
pub use template::{Scope, Template, TemplateError};
