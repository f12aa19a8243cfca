// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the native bridge: commands, their arguments, and
// the two ways a command can end.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KioskError, Result};
use crate::human_errors::error_payload;

/// One invocation posted by web content.
///
/// Built by the transport from an inbound message and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    correlation_id: String,
    capability: String,
    arguments: Arguments,
}

impl Command {
    pub fn new(
        correlation_id: impl Into<String>,
        capability: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            capability: capability.into(),
            arguments: Arguments(arguments),
        }
    }

    /// Token pairing this command with the web-side promise.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Name of the capability to invoke.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Split into (correlation id, capability name, arguments).
    pub fn into_parts(self) -> (String, String, Arguments) {
        (self.correlation_id, self.capability, self.arguments)
    }
}

/// Ordered, loosely-typed argument list of a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(Vec<Value>);

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Argument at `index`; JSON `null` counts as absent.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index).filter(|v| !v.is_null())
    }

    /// Required string argument.
    pub fn str(&self, index: usize) -> Result<&str> {
        match self.get(index) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(KioskError::InvalidArgument(format!(
                "argument {index} must be a string, got {}",
                json_kind(other)
            ))),
            None => Err(KioskError::InvalidArgument(format!(
                "missing argument {index}"
            ))),
        }
    }

    /// Optional boolean argument. Accepts JS-style truthy strings
    /// ("true"/"1") since page code often passes form values through.
    pub fn bool_or(&self, index: usize, default: bool) -> Result<bool> {
        match self.get(index) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
            Some(Value::String(s)) => match s.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                _ => Err(KioskError::InvalidArgument(format!(
                    "argument {index} is not a boolean: {s:?}"
                ))),
            },
            Some(other) => Err(KioskError::InvalidArgument(format!(
                "argument {index} must be a boolean, got {}",
                json_kind(other)
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Human name of a JSON value's type, for argument errors.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Which way a command ended, as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// Terminal outcome of a command, each side carrying an optional payload
/// (absent, a string, or a structured mapping).
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Success(Option<Value>),
    Error(Option<Value>),
}

impl Resolution {
    /// Success with no payload.
    pub fn success() -> Self {
        Self::Success(None)
    }

    pub fn error_string(response: impl Into<String>) -> Self {
        Self::Error(Some(Value::String(response.into())))
    }

    /// Error resolution carrying the display payload for `err`.
    pub fn from_error(err: &KioskError) -> Self {
        Self::Error(Some(error_payload(err)))
    }

    /// Map a handler result onto a resolution.
    pub fn from_result(result: Result<Option<Value>>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Success(_) => Outcome::Success,
            Self::Error(_) => Outcome::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success(p) | Self::Error(p) => p.as_ref(),
        }
    }

    pub fn into_payload(self) -> Option<Value> {
        match self {
            Self::Success(p) | Self::Error(p) => p,
        }
    }
}
