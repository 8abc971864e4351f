//! Resource parsing and schema validation seams.
//!
//! The observability gate treats both as black boxes: [`ResourceParser`]
//! turns body text into a [`Resource`], [`SchemaValidator`] turns a resource
//! into severity-tagged messages. The defaults here are shallow
//! (JSON shape plus a few structural rules); plug in a real profile
//! validator through the same traits.

use std::fmt;

use serde_json::{Map, Value};

/// A parsed domain resource: its declared type plus the raw JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    pub resource_type: String,
    pub content: Value,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Severity {
    Information,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Information => "information",
            Self::Warning     => "warning",
            Self::Error       => "error",
            Self::Fatal       => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validator finding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub text: String,
}

impl ValidationMessage {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self { severity, text: text.into() }
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("body is not a JSON object")]
    NotAnObject,
    #[error("resource has no string `resourceType`")]
    MissingResourceType,
}

/// Turns body text into a resource.
pub trait ResourceParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Resource, ParseError>;
}

/// Checks a resource and reports findings, most severe first or in any order
/// the implementation likes. An empty list means no findings.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, resource: &Resource) -> Vec<ValidationMessage>;
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Parses JSON resources: an object with a string `resourceType`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonResourceParser;

impl ResourceParser for JsonResourceParser {
    fn parse(&self, text: &str) -> Result<Resource, ParseError> {
        let content: Value = serde_json::from_str(text)?;
        let resource_type = content
            .as_object()
            .ok_or(ParseError::NotAnObject)?
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingResourceType)?
            .to_owned();

        Ok(Resource { resource_type, content })
    }
}

/// Structural rules every resource must satisfy regardless of its type.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralValidator;

const MAX_ID_LEN: usize = 64;

impl SchemaValidator for StructuralValidator {
    fn validate(&self, resource: &Resource) -> Vec<ValidationMessage> {
        let mut messages = Vec::new();

        if !is_type_name(&resource.resource_type) {
            messages.push(ValidationMessage::new(
                Severity::Error,
                format!("resourceType `{}` is not a valid type name", resource.resource_type),
            ));
        }

        let Some(fields) = resource.content.as_object() else {
            messages.push(ValidationMessage::new(Severity::Fatal, "resource is not an object"));
            return messages;
        };

        match fields.get("id") {
            None => {}
            Some(Value::String(id)) if is_logical_id(id) => {}
            Some(Value::String(id)) => messages.push(ValidationMessage::new(
                Severity::Error,
                format!("id `{id}` must be 1-{MAX_ID_LEN} characters of [A-Za-z0-9-.]"),
            )),
            Some(_) => messages.push(ValidationMessage::new(Severity::Error, "id must be a string")),
        }

        if fields.get("meta").is_some_and(|m| !m.is_object()) {
            messages.push(ValidationMessage::new(Severity::Error, "meta must be an object"));
        }

        check_members(fields, &mut messages);
        messages
    }
}

fn check_members(fields: &Map<String, Value>, messages: &mut Vec<ValidationMessage>) {
    for (key, value) in fields {
        if key.is_empty() {
            messages.push(ValidationMessage::new(Severity::Error, "empty property name"));
        } else if value.is_null() {
            messages.push(ValidationMessage::new(
                Severity::Warning,
                format!("property `{key}` is null; omit it instead"),
            ));
        }
    }
}

fn is_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

fn is_logical_id(id: &str) -> bool {
    (1..=MAX_ID_LEN).contains(&id.len())
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}
