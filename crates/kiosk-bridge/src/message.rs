// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire format between the page and the bridge.
//
// Inbound (web -> native), one JSON object per invocation:
//
//   { "correlationId": "...", "capabilityName": "...", "arguments": [ ... ] }
//
// The page shim posts the same fields as `promiseId`, `name`, and `data`;
// both spellings are accepted.
//
// Outbound (native -> web):
//
//   { "correlationId": "...", "outcome": "success" | "error", "payload": ... }
//
// delivered into the page as
//
//   window.<ns>.ResolveNativePromise("<id>", <payload>, <isError>);

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use kiosk_core::error::{KioskError, Result};
use kiosk_core::{Command, Outcome, Resolution, json_kind};

const CORRELATION_KEYS: &[&str] = &["correlationId", "promiseId"];
const CAPABILITY_KEYS: &[&str] = &["capabilityName", "name"];
const ARGUMENT_KEYS: &[&str] = &["arguments", "data"];

/// Web -> native invocation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(alias = "promiseId")]
    pub correlation_id: String,
    #[serde(alias = "name")]
    pub capability_name: String,
    #[serde(default, alias = "data")]
    pub arguments: Vec<Value>,
}

impl InboundMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<InboundMessage> for Command {
    fn from(msg: InboundMessage) -> Self {
        Command::new(msg.correlation_id, msg.capability_name, msg.arguments)
    }
}

/// An inbound message that could not become a command.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DecodeError {
    /// Correlation id salvaged from the message, if any. Without one the
    /// failure cannot be reported to the page.
    pub correlation_id: Option<String>,
    pub error: KioskError,
}

impl DecodeError {
    fn unaddressed(detail: impl Into<String>) -> Self {
        Self {
            correlation_id: None,
            error: KioskError::MalformedMessage(detail.into()),
        }
    }

    fn addressed(correlation_id: &str, detail: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.to_string()),
            error: KioskError::MalformedMessage(detail.into()),
        }
    }
}

/// Decode one inbound message into a [`Command`].
///
/// A `null` field counts as absent, so the other spelling of the same field
/// still applies.  A missing argument list decodes as empty.  Anything else
/// that is wrong is reported with whatever correlation id could be recovered.
pub fn decode_inbound(raw: &str) -> std::result::Result<Command, DecodeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DecodeError::unaddressed(format!("not valid JSON: {e}")))?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(DecodeError::unaddressed(format!(
                "expected an object, got {}",
                json_kind(&other)
            )));
        }
    };

    let correlation_id = match lookup(&fields, CORRELATION_KEYS) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(other) => {
            return Err(DecodeError::unaddressed(format!(
                "correlation id must be a non-empty string, got {}",
                json_kind(other)
            )));
        }
        None => return Err(DecodeError::unaddressed("missing correlation id")),
    };

    let capability = match lookup(&fields, CAPABILITY_KEYS) {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::String(_)) => {
            return Err(DecodeError::addressed(&correlation_id, "empty capability name"));
        }
        Some(other) => {
            return Err(DecodeError::addressed(
                &correlation_id,
                format!("capability name must be a string, got {}", json_kind(other)),
            ));
        }
        None => return Err(DecodeError::addressed(&correlation_id, "missing capability name")),
    };

    let arguments = match lookup(&fields, ARGUMENT_KEYS) {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            return Err(DecodeError::addressed(
                &correlation_id,
                format!("argument list must be an array, got {}", json_kind(other)),
            ));
        }
    };

    Ok(Command::new(correlation_id, capability, arguments))
}

fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| fields.get(*key).filter(|value| !value.is_null()))
}

/// Native -> web resolution message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub correlation_id: String,
    pub outcome: Outcome,
    pub payload: Option<Value>,
}

impl OutboundMessage {
    pub fn new(correlation_id: impl Into<String>, resolution: Resolution) -> Self {
        let outcome = resolution.outcome();
        // `Some(null)` and `None` look the same on the wire.
        let payload = resolution.into_payload().filter(|p| !p.is_null());
        Self {
            correlation_id: correlation_id.into(),
            outcome,
            payload,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome == Outcome::Error
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Script that settles the page's promise for this message.
    pub fn to_script(&self, namespace: &str) -> Result<String> {
        let id = serde_json::to_string(&self.correlation_id)?;
        let payload = payload_literal(self.payload.as_ref())?;
        Ok(format!(
            "window.{namespace}.ResolveNativePromise({id}, {payload}, {});",
            self.is_error()
        ))
    }
}

/// Unsolicited native -> web notification (e.g. a passive camera scan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEvent {
    pub event: String,
    pub payload: Option<Value>,
}

impl WebEvent {
    pub fn new(event: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    pub fn to_script(&self, namespace: &str) -> Result<String> {
        let event = serde_json::to_string(&self.event)?;
        let payload = payload_literal(self.payload.as_ref())?;
        Ok(format!(
            "window.{namespace}.DispatchEvent && window.{namespace}.DispatchEvent({event}, {payload});"
        ))
    }
}

/// Everything the bridge sends toward the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Resolution(OutboundMessage),
    Event(WebEvent),
}

impl Outbound {
    pub fn to_script(&self, namespace: &str) -> Result<String> {
        match self {
            Self::Resolution(msg) => msg.to_script(namespace),
            Self::Event(event) => event.to_script(namespace),
        }
    }
}

fn payload_literal(payload: Option<&Value>) -> Result<String> {
    match payload {
        Some(value) => Ok(serde_json::to_string(value)?),
        None => Ok("null".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_canonical_message() {
        let cmd = decode_inbound(
            r#"{"correlationId":"1","capabilityName":"getSetting","arguments":["device.pin"]}"#,
        )
        .expect("decode");
        assert_eq!(cmd, Command::new("1", "getSetting", vec![json!("device.pin")]));
    }

    #[test]
    fn decodes_page_shim_spelling() {
        let cmd = decode_inbound(
            r#"{"name":"PrintLabels","promiseId":"a1b2","data":["[{\"LabelKey\":\"x\"}]"]}"#,
        )
        .expect("decode");
        assert_eq!(cmd.correlation_id(), "a1b2");
        assert_eq!(cmd.capability(), "PrintLabels");
        assert_eq!(cmd.arguments().len(), 1);
    }

    #[test]
    fn missing_arguments_decode_as_empty() {
        let cmd = decode_inbound(r#"{"promiseId":"7","name":"StopCamera"}"#).expect("decode");
        assert!(cmd.arguments().is_empty());
    }

    #[test]
    fn bad_argument_list_keeps_correlation() {
        let raw = r#"{"correlationId":"9","capabilityName":"x","arguments":{"a":1}}"#;
        let err = decode_inbound(raw).expect_err("object arguments");
        assert_eq!(err.correlation_id.as_deref(), Some("9"));
        assert!(matches!(err.error, KioskError::MalformedMessage(_)));
    }

    #[test]
    fn missing_name_keeps_correlation() {
        let err = decode_inbound(r#"{"correlationId":"3","arguments":[]}"#).expect_err("no name");
        assert_eq!(err.correlation_id.as_deref(), Some("3"));
        assert_eq!(err.to_string(), "malformed message: missing capability name");
    }

    #[test]
    fn null_fields_fall_back_to_shim_spelling() {
        let raw = json!({
            "correlationId": null,
            "promiseId": "p-4",
            "capabilityName": null,
            "name": "getSetting",
        });
        let cmd = decode_inbound(&raw.to_string()).expect("decode");
        assert_eq!(cmd.correlation_id(), "p-4");
        assert_eq!(cmd.capability(), "getSetting");
    }

    #[test]
    fn null_arguments_with_data_use_data() {
        let raw = json!({
            "promiseId": "p-5",
            "name": "getSetting",
            "arguments": null,
            "data": ["device.pin"],
        });
        let cmd = decode_inbound(&raw.to_string()).expect("decode");
        assert_eq!(cmd.arguments().get(0), Some(&json!("device.pin")));
    }

    #[test]
    fn unrecoverable_messages_have_no_correlation() {
        for raw in [
            "not json",
            "[1,2,3]",
            r#"{"capabilityName":"getSetting"}"#,
            r#"{"correlationId":42,"capabilityName":"getSetting"}"#,
            r#"{"correlationId":"","capabilityName":"getSetting"}"#,
        ] {
            let err = decode_inbound(raw).expect_err(raw);
            assert!(err.correlation_id.is_none(), "{raw} should be unaddressed");
        }
    }

    #[test]
    fn absent_payload_serializes_as_null() {
        let msg = OutboundMessage::new("1", Resolution::success());
        assert_eq!(
            serde_json::to_value(&msg).expect("to value"),
            json!({ "correlationId": "1", "outcome": "success", "payload": null })
        );
    }

    #[test]
    fn structured_payload_survives_the_wire() {
        let payload = json!({ "Error": "jam", "CanReprint": true, "labels": [1, 2.5, "x", null] });
        let msg = OutboundMessage::new("p", Resolution::Error(Some(payload.clone())));
        let back: OutboundMessage =
            serde_json::from_str(&msg.to_json().expect("json")).expect("parse");
        assert_eq!(back, msg);
        assert_eq!(back.payload, Some(payload));
    }

    #[test]
    fn script_quotes_correlation_and_payload() {
        let msg = OutboundMessage::new("a\"b", Resolution::error_string("it's \"bad\""));
        let script = msg.to_script("RockCheckinNative").expect("script");
        assert_eq!(
            script,
            r#"window.RockCheckinNative.ResolveNativePromise("a\"b", "it's \"bad\"", true);"#
        );
    }

    #[test]
    fn event_script_is_guarded() {
        let event = WebEvent::new("codeScanned", Some(json!("12345")));
        assert_eq!(
            event.to_script("K").expect("script"),
            r#"window.K.DispatchEvent && window.K.DispatchEvent("codeScanned", "12345");"#
        );
    }
}
