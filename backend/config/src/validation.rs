//! Config validation: schema checks with user-friendly error messages.

use std::collections::HashSet;

use thiserror::Error;

use crate::schema::ApiBotConfig;

/// A config validation finding with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation findings from one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Emit every finding through `tracing`.
    pub fn log(&self) {
        for warning in &self.warnings {
            tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
        }
        for error in &self.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &ApiBotConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_http(config, &mut report);
    validate_messenger(config, &mut report);
    validate_commands(config, &mut report);
    report
}

fn validate_server(config: &ApiBotConfig, report: &mut ValidationReport) {
    let server = &config.server;
    if !server.webhook_path.starts_with('/') {
        report.error("server.webhook_path", "webhook_path must start with '/'");
    }
    if server.port == 0 {
        report.error("server.port", "port must be > 0");
    }
}

fn validate_http(config: &ApiBotConfig, report: &mut ValidationReport) {
    if config.http.timeout_secs == 0 {
        report.error("http.timeout_secs", "timeout_secs must be >= 1");
    }
    if config.http.max_concurrent_jobs == 0 {
        report.error("http.max_concurrent_jobs", "max_concurrent_jobs must be >= 1");
    }
}

fn validate_messenger(config: &ApiBotConfig, report: &mut ValidationReport) {
    let Some(m) = &config.messenger else {
        report.warn("messenger", "No messenger section; `serve` is unavailable");
        return;
    };
    if m.access_token.trim().is_empty() {
        report.error("messenger.access_token", "Messenger access token is required");
    }
    if m.verify_token.trim().is_empty() {
        report.error("messenger.verify_token", "Messenger verify token is required");
    }
}

fn validate_commands(config: &ApiBotConfig, report: &mut ValidationReport) {
    if config.commands.is_empty() {
        report.warn("commands", "No commands configured; every request will be skipped");
        return;
    }

    let mut seen = HashSet::new();
    for (i, command) in config.commands.iter().enumerate() {
        let path = format!("commands[{i}]");
        let key = command.cmd.trim();

        if key.is_empty() {
            report.error(format!("{path}.cmd"), "Command key cannot be empty");
        } else {
            if !seen.insert(key) {
                report.error(format!("{path}.cmd"), format!("Duplicate command '{key}'"));
            }
            if key.chars().any(char::is_uppercase) {
                report.warn(
                    format!("{path}.cmd"),
                    format!("'{key}' has uppercase letters; typed commands are lowercased and will never match"),
                );
            }
        }
        if command.url.trim().is_empty() {
            report.error(format!("{path}.url"), "url cannot be empty");
        }
        if command.text.trim().is_empty() {
            report.error(format!("{path}.text"), "text cannot be empty");
        }

        for arg in &command.args {
            let referenced = [format!("args.{arg}"), format!("args?.{arg}"), format!("args[\"{arg}\"]")]
                .iter()
                .any(|needle| command.url.contains(needle) || command.text.contains(needle));
            if !referenced {
                report.warn(
                    format!("{path}.args"),
                    format!("Argument '{arg}' is not used by the url or text template"),
                );
            }
        }
    }
}
