use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for the apibot command pipeline.
///
/// Every stage of a job converts its local failure into one of these
/// variants; the first one produced ends that job.
#[derive(Debug, Error)]
pub enum ApiBotError {
    #[error("template compile error in `{cmd}`: {message}")]
    TemplateCompile { cmd: String, message: String },

    #[error("network error querying {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("API for `{cmd}` returned nothing")]
    EmptyResponse { cmd: String },

    #[error("malformed response for `{cmd}`: {source}")]
    MalformedResponse {
        cmd: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("render error in `{cmd}`: {message}")]
    Render { cmd: String, message: String },

    #[error("delivery via {channel} failed: {message}")]
    Delivery { channel: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiBotError {
    pub fn network(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Network {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn delivery(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Short, stable name of the failure class, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TemplateCompile { .. } => "template_compile",
            Self::Network { .. } => "network",
            Self::EmptyResponse { .. } => "empty_response",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Render { .. } => "render",
            Self::Delivery { .. } => "delivery",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }
}
