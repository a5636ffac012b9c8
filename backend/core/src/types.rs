use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Operator-authored description of one bot command.
///
/// ```yaml
/// cmd: /country
/// args: [name]
/// url: https://restcountries.com/v2/name/${args.name}
/// text: ${body.name} can be found in ${body.subregion}.
/// response: { type: json, format: { population: ",d" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Command key as typed by users, e.g. `/country`.
    #[serde(default)]
    pub cmd: String,
    /// Argument names, bound positionally to the tokens following the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// HTTP method; GET when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// URL template; may reference `args`.
    pub url: String,
    /// Reply template; may reference `args` and `body`.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseShape>,
}

impl CommandConfig {
    pub fn new(cmd: impl Into<String>, url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: Vec::new(),
            method: None,
            url: url.into(),
            text: text.into(),
            description: None,
            response: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_response(mut self, response: ResponseShape) -> Self {
        self.response = Some(response);
        self
    }

    pub fn response_type(&self) -> ResponseType {
        self.response.as_ref().map(|r| r.kind).unwrap_or_default()
    }

    pub fn format(&self) -> Option<&FormatSpec> {
        self.response.as_ref().and_then(|r| r.format.as_ref())
    }
}

/// How to parse an API response body and which parts to number-format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseShape {
    #[serde(rename = "type", default)]
    pub kind: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatSpec>,
}

impl ResponseShape {
    pub fn json() -> Self {
        Self {
            kind: ResponseType::Json,
            format: None,
        }
    }

    pub fn text() -> Self {
        Self {
            kind: ResponseType::Text,
            format: None,
        }
    }

    pub fn with_format(mut self, format: FormatSpec) -> Self {
        self.format = Some(format);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    #[serde(alias = "JSON", alias = "Json")]
    Json,
    #[serde(alias = "TEXT", alias = "Text")]
    Text,
}

/// Numeric format applied to a response: one specifier for a scalar body, or
/// one per named field of a record body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatSpec {
    Scalar(String),
    FieldMap(BTreeMap<String, String>),
}

impl FormatSpec {
    pub fn field(name: impl Into<String>, spec: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(name.into(), spec.into());
        Self::FieldMap(map)
    }
}
