// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default global JavaScript object that settles bridge promises.
pub const DEFAULT_SCRIPT_NAMESPACE: &str = "RockCheckinNative";

/// Default raw TCP port for label printers (Zebra / JetDirect).
pub const DEFAULT_PRINTER_PORT: u16 = 9100;

/// Legacy page scripts that would install a second, conflicting bridge.
pub const DEFAULT_BLOCKED_REQUESTS: &[&str] = &[
    "cordova-2.4.0.js",
    "cordova-2.4.0-ios.js",
    "ZebraPrint.js",
    "ApplicationPreferences.js",
];

/// Persistent kiosk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    /// Global JS object exposing `ResolveNativePromise` and `DispatchEvent`.
    pub script_namespace: String,
    /// Reject commands still unresolved after this many seconds. `None`
    /// leaves resolution latency entirely to the handler.
    pub handler_timeout_secs: Option<u64>,
    /// Label printer settings.
    pub printer: PrinterConfig,
    /// URL path suffixes the request filter refuses to load.
    pub blocked_request_patterns: Vec<String>,
    /// SQLite file for stored preferences (defaults to the data directory).
    pub preferences_db: Option<PathBuf>,
    /// Values `getSetting` returns for keys the page never stored.
    pub preference_defaults: HashMap<String, String>,
    /// Check-in server endpoint returning the label tags for a pre-check-in
    /// code, which is passed as the `code` query parameter.  Without it,
    /// scanned pre-check-in codes are reported back as failures.
    pub pre_check_in_url: Option<String>,
}

impl KioskConfig {
    /// Watchdog duration, if one is configured.
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            script_namespace: DEFAULT_SCRIPT_NAMESPACE.into(),
            handler_timeout_secs: None,
            printer: PrinterConfig::default(),
            blocked_request_patterns: DEFAULT_BLOCKED_REQUESTS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            preferences_db: None,
            preference_defaults: HashMap::new(),
            pre_check_in_url: None,
        }
    }
}

/// Label printer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Port used when a label's printer address carries none.
    pub default_port: u16,
    /// Connection timeout for network label printers.
    pub connect_timeout_secs: u64,
    /// Bluetooth printer to use instead of the per-label network address.
    pub bluetooth_printer: Option<String>,
}

impl PrinterConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PRINTER_PORT,
            connect_timeout_secs: 10,
            bluetooth_printer: None,
        }
    }
}
