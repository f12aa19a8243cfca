// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Display-ready error payloads.
//
// Every rejection that reaches the page carries something a check-in
// volunteer can read.  Label printing failures use the object shape the
// page's label code unpacks (`Error` + `CanReprint`); everything else is the
// plain error message.

use serde_json::{Map, Value, json};

use crate::error::KioskError;

/// A printing failure phrased for the person at the kiosk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanError {
    /// Plain English summary shown on the check-in screen.
    pub message: String,
    /// Whether offering a "reprint" button makes sense.
    pub can_reprint: bool,
}

/// Phrase a label printing error, or `None` if `err` is not about printing.
pub fn humanize_print_error(err: &KioskError) -> Option<HumanError> {
    let human = match err {
        KioskError::NoPrinter => HumanError {
            message: "No label printer is set up for this kiosk.".into(),
            can_reprint: false,
        },
        KioskError::PrinterConnection(detail) => HumanError {
            message: format!(
                "Could not reach the label printer. Check that it is on and has labels. ({detail})"
            ),
            can_reprint: true,
        },
        KioskError::LabelFetch(detail) => HumanError {
            message: format!("Could not download the label. ({detail})"),
            can_reprint: true,
        },
        KioskError::LabelFormat(detail) => HumanError {
            message: format!("The label data could not be read. ({detail})"),
            can_reprint: false,
        },
        _ => return None,
    };
    Some(human)
}

/// JSON payload for an error resolution.
pub fn error_payload(err: &KioskError) -> Value {
    match humanize_print_error(err) {
        Some(human) => {
            let mut map = Map::new();
            map.insert("Error".into(), json!(human.message));
            map.insert("CanReprint".into(), json!(human.can_reprint));
            Value::Object(map)
        }
        None => Value::String(err.to_string()),
    }
}
