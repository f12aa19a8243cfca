// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Check-in label tags and ZPL merging.
//
// The page sends a JSON array of tags.  Each names a ZPL template (inline or
// by URL) and the merge fields to substitute.  Templates mark merge slots as
// `^FD<key>^FS`; the key is replaced by the field value with ZPL control
// characters stripped so a name cannot inject printer commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kiosk_core::error::{KioskError, Result};
use kiosk_core::json_kind;

/// One label to print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LabelTag {
    /// Network printer as `host` or `host:port`.
    #[serde(default)]
    pub printer_address: Option<String>,
    /// URL of the ZPL template.
    #[serde(default)]
    pub label_file: Option<String>,
    /// Stable template identifier, used as the download cache key.
    #[serde(default)]
    pub label_key: Option<String>,
    /// Inline ZPL template; takes precedence over `label_file`.
    #[serde(default)]
    pub label_content: Option<String>,
    #[serde(default)]
    pub merge_fields: BTreeMap<String, Value>,
}

impl LabelTag {
    /// Key under which a downloaded template is cached.
    pub fn cache_key(&self) -> Option<&str> {
        self.label_key.as_deref().or(self.label_file.as_deref())
    }
}

/// Parse the `PrintLabels` argument: a JSON string or an array of tags.
pub fn parse_label_tags(data: &Value) -> Result<Vec<LabelTag>> {
    let tags: Vec<LabelTag> = match data {
        Value::String(json) => serde_json::from_str(json)
            .map_err(|e| KioskError::LabelFormat(format!("label JSON: {e}")))?,
        Value::Array(_) => serde_json::from_value(data.clone())
            .map_err(|e| KioskError::LabelFormat(format!("label list: {e}")))?,
        other => {
            return Err(KioskError::LabelFormat(format!(
                "expected a label list, got {}",
                json_kind(other)
            )));
        }
    };

    if tags.is_empty() {
        return Err(KioskError::LabelFormat("no labels to print".into()));
    }
    for (index, tag) in tags.iter().enumerate() {
        if tag.label_content.is_none() && tag.label_file.is_none() {
            return Err(KioskError::LabelFormat(format!(
                "label {index} has neither LabelContent nor LabelFile"
            )));
        }
    }
    Ok(tags)
}

/// Substitute merge fields into a ZPL template.
///
/// Single pass over the `^FD..^FS` blocks, so a merged value is never
/// itself treated as a merge key.
pub fn merge_fields(template: &str, fields: &BTreeMap<String, Value>) -> String {
    let mut zpl = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("^FD") {
        let body = start + 3;
        let Some(len) = rest[body..].find("^FS") else {
            break;
        };
        let key = &rest[body..body + len];

        zpl.push_str(&rest[..body]);
        match fields.get(key) {
            Some(value) => zpl.push_str(&sanitize(&field_text(value))),
            None => zpl.push_str(key),
        }
        zpl.push_str("^FS");
        rest = &rest[body + len + 3..];
    }

    zpl.push_str(rest);
    zpl
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Drop ZPL command prefixes (`^` and `~`) from merged text.
fn sanitize(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '^' | '~')).collect()
}
