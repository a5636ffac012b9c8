/// The compiled, executable form of one command configuration.
///
/// Owns the URL and text templates, the compiled response format, and the
/// HTTP client used to query the command's API.
use std::collections::BTreeMap;
use std::time::Duration;

use apibot_core::{ApiBotError, CommandConfig, FormatSpec, ResponseType};
use apibot_logging::redact_sensitive_data;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::format::NumberFormat;
use crate::template::{Scope, Template};

/// Text produced by a template that failed to compile.
pub const RENDERER_ERROR: &str = "renderer error";

/// Separator placed between the renderings of a sequence body.
pub const ELEMENT_SEPARATOR: &str = "\n\n";

const URL_BINDINGS: &[&str] = &["args"];
const TEXT_BINDINGS: &[&str] = &["args", "body"];

/// Argument name → raw token, bound positionally.
pub type ArgMap = BTreeMap<String, String>;

/// Request timeout of clients built without explicit settings.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_USER_AGENT: &str = concat!("apibot/", env!("CARGO_PKG_VERSION"));

/// Client with [`DEFAULT_TIMEOUT`], for renderers and registries built without one.
pub fn default_client() -> Client {
    // Fails only where `Client::new` would panic too (TLS backend unavailable).
    http_client(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT).expect("default HTTP client")
}

/// Build the HTTP client shared by every renderer of a registry.
pub fn http_client(timeout: Duration, user_agent: &str) -> Result<Client, ApiBotError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| ApiBotError::Config(format!("failed to build HTTP client: {e}")))
}

/// Response format resolved once at construction.
#[derive(Debug, Clone)]
enum CompiledFormat {
    Scalar(NumberFormat),
    Fields(Vec<(String, NumberFormat)>),
}

pub struct Renderer {
    cmd: String,
    config: CommandConfig,
    method: Method,
    url: Template,
    text: Template,
    format: Option<CompiledFormat>,
    compile_errors: Vec<ApiBotError>,
    client: Client,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("cmd", &self.cmd)
            .field("method", &self.method)
            .field("url", &self.config.url)
            .field("compile_errors", &self.compile_errors.len())
            .finish()
    }
}

impl Renderer {
    /// Build a renderer with a [`default_client`].
    ///
    /// Never fails: broken templates degrade to a fixed `renderer error` reply
    /// and are reported through the log and [`Renderer::compile_errors`].
    pub fn new(cmd: impl Into<String>, config: CommandConfig) -> Self {
        Self::with_client(cmd, config, default_client())
    }

    pub fn with_client(cmd: impl Into<String>, config: CommandConfig, client: Client) -> Self {
        let cmd = cmd.into();
        let mut compile_errors = Vec::new();

        let url = compile_or_fallback(&cmd, "url", &config.url, URL_BINDINGS, &mut compile_errors);
        let text = compile_or_fallback(&cmd, "text", &config.text, TEXT_BINDINGS, &mut compile_errors);
        let format = config
            .format()
            .and_then(|spec| compile_format(&cmd, spec, &mut compile_errors));

        let method = match config.method.as_deref() {
            None => Method::GET,
            Some(m) => match Method::from_bytes(m.trim().to_uppercase().as_bytes()) {
                Ok(method) => method,
                Err(_) => {
                    warn!(cmd = %cmd, method = %m, "Unknown HTTP method, falling back to GET");
                    Method::GET
                }
            },
        };

        Self {
            cmd,
            config,
            method,
            url,
            text,
            format,
            compile_errors,
            client,
        }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Errors found while compiling this renderer's templates and formats.
    pub fn compile_errors(&self) -> &[ApiBotError] {
        &self.compile_errors
    }

    /// Bind configured argument names to tokens by position.
    pub fn get_args(&self, tokens: &[String]) -> ArgMap {
        self.config
            .args
            .iter()
            .zip(tokens)
            .map(|(name, token)| (name.clone(), token.clone()))
            .collect()
    }

    pub fn url_of(&self, args: &ArgMap) -> Result<String, ApiBotError> {
        let args = args_value(args);
        self.url
            .render(&Scope::new().bind("args", &args))
            .map_err(|e| ApiBotError::Render {
                cmd: self.cmd.clone(),
                message: e.to_string(),
            })
    }

    pub fn text_of(&self, args: &ArgMap, body: &Value) -> Result<String, ApiBotError> {
        let args = args_value(args);
        self.text_with(&args, body)
    }

    fn text_with(&self, args: &Value, body: &Value) -> Result<String, ApiBotError> {
        self.text
            .render(&Scope::new().bind("args", args).bind("body", body))
            .map_err(|e| ApiBotError::Render {
                cmd: self.cmd.clone(),
                message: e.to_string(),
            })
    }

    /// Request the command's API and parse the body per the response shape.
    pub async fn query(&self, url: &str) -> Result<Value, ApiBotError> {
        debug!(cmd = %self.cmd, method = %self.method, url = %redact_sensitive_data(url), "Querying API");

        let response = self
            .client
            .request(self.method.clone(), url)
            .send()
            .await
            .map_err(|e| {
                error!(cmd = %self.cmd, error = %redact_sensitive_data(&e.to_string()), "API request failed");
                ApiBotError::network(redact_sensitive_data(url), e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(cmd = %self.cmd, status = %status, "API returned a non-success status");
        }

        let raw = response.text().await.map_err(|e| {
            error!(cmd = %self.cmd, error = %redact_sensitive_data(&e.to_string()), "Failed to read API response");
            ApiBotError::network(redact_sensitive_data(url), e)
        })?;

        self.parse_response(&raw)
    }

    /// Interpret a raw body: opaque text, or JSON.
    pub fn parse_response(&self, raw: &str) -> Result<Value, ApiBotError> {
        match self.config.response_type() {
            ResponseType::Text => {
                if raw.is_empty() {
                    warn!(cmd = %self.cmd, "API returned an empty body");
                    Err(ApiBotError::EmptyResponse {
                        cmd: self.cmd.clone(),
                    })
                } else {
                    Ok(Value::String(raw.to_string()))
                }
            }
            ResponseType::Json => match serde_json::from_str(raw) {
                Ok(Value::Null) => {
                    warn!(cmd = %self.cmd, "API returned a null body");
                    Err(ApiBotError::EmptyResponse {
                        cmd: self.cmd.clone(),
                    })
                }
                Ok(body) => Ok(body),
                Err(source) => {
                    error!(cmd = %self.cmd, body = %truncate(raw, 200), error = %source, "Malformed JSON response");
                    Err(ApiBotError::MalformedResponse {
                        cmd: self.cmd.clone(),
                        source,
                    })
                }
            },
        }
    }

    /// Apply the configured numeric formats; sequences are formatted per element.
    pub fn format_body(&self, body: Value) -> Value {
        let Some(format) = &self.format else {
            return body;
        };
        match body {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| format_entry(format, item))
                    .collect(),
            ),
            other => format_entry(format, other),
        }
    }

    /// Render the reply text, once per element for a sequence body.
    pub fn render(&self, args: &ArgMap, body: &Value) -> Result<String, ApiBotError> {
        let args = args_value(args);
        let rendered = match body {
            Value::Array(items) => items
                .iter()
                .map(|item| self.text_with(&args, item))
                .collect::<Result<Vec<_>, _>>()
                .map(|parts| parts.join(ELEMENT_SEPARATOR)),
            single => self.text_with(&args, single),
        };
        rendered.inspect_err(|e| error!(cmd = %self.cmd, error = %e, "Failed to render reply"))
    }
}

fn compile_or_fallback(
    cmd: &str,
    field: &str,
    source: &str,
    bindings: &[&str],
    errors: &mut Vec<ApiBotError>,
) -> Template {
    match Template::compile(source, bindings) {
        Ok(template) => template,
        Err(e) => {
            error!(cmd = %cmd, field, error = %e, "Failed to compile template");
            errors.push(ApiBotError::TemplateCompile {
                cmd: cmd.to_string(),
                message: format!("{field}: {e}"),
            });
            Template::literal(RENDERER_ERROR)
        }
    }
}

fn compile_format(
    cmd: &str,
    spec: &FormatSpec,
    errors: &mut Vec<ApiBotError>,
) -> Option<CompiledFormat> {
    let mut parse = |field: &str, spec: &str| match NumberFormat::parse(spec) {
        Ok(f) => Some(f),
        Err(e) => {
            error!(cmd = %cmd, field, error = %e, "Ignoring invalid response format");
            errors.push(ApiBotError::TemplateCompile {
                cmd: cmd.to_string(),
                message: format!("response.format.{field}: {e}"),
            });
            None
        }
    };
    match spec {
        FormatSpec::Scalar(s) => parse("*", s).map(CompiledFormat::Scalar),
        FormatSpec::FieldMap(map) => {
            let fields: Vec<_> = map
                .iter()
                .filter_map(|(field, s)| parse(field, s).map(|f| (field.clone(), f)))
                .collect();
            (!fields.is_empty()).then_some(CompiledFormat::Fields(fields))
        }
    }
}

fn format_entry(format: &CompiledFormat, item: Value) -> Value {
    match (format, item) {
        (CompiledFormat::Scalar(f), item @ (Value::String(_) | Value::Number(_))) => f.apply(&item),
        (CompiledFormat::Fields(fields), Value::Object(mut record)) => {
            for (field, f) in fields {
                if let Some(value) = record.get_mut(field) {
                    if !value.is_null() {
                        *value = f.apply(value);
                    }
                }
            }
            Value::Object(record)
        }
        (_, item) => item,
    }
}

fn args_value(args: &ArgMap) -> Value {
    Value::Object(
        args.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
