// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the native side of the bridge.
//
// The web view, the barcode camera, and the Bluetooth label printer are
// provided by the device shell.  Everything above these traits is plain
// Rust and runs the same on a kiosk tablet and in CI.

use std::sync::Arc;

use kiosk_core::error::Result;
use tokio::sync::mpsc;

/// The embedded web view whose page talks to the bridge.
pub trait WebView: Send + Sync {
    /// Run `script` in the page's JavaScript context.
    fn evaluate_script(&self, script: &str) -> Result<()>;
}

/// Something the camera saw, or the camera going away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// An ordinary barcode (e.g. a check-in search code).
    GenericCode(String),
    /// A pre-check-in code whose labels should print without the page.
    PreCheckInCode(String),
    /// The user dismissed the camera.
    Cancelled,
}

/// Barcode camera.
pub trait NativeScanner: Send + Sync {
    /// Show the camera and start watching for barcodes.
    ///
    /// In passive mode the camera stays up and keeps reporting codes until
    /// stopped.  The returned channel closes when the camera goes away.
    fn start_scanning(&self, passive: bool) -> Result<mpsc::UnboundedReceiver<ScanEvent>>;

    /// Hide the camera and stop watching for barcodes.
    fn stop_scanning(&self) -> Result<()>;
}

/// Bluetooth (BLE) label printer.
pub trait NativeLabelPrinter: Send + Sync {
    /// Send ZPL to the named printer. Blocks until the data is written.
    fn print_label(&self, printer_name: &str, zpl: &str) -> Result<()>;
}

/// Native capability implementations for one build target.
#[derive(Clone)]
pub struct Platform {
    /// Human-readable platform name (e.g. "iPadOS 17").
    pub name: String,
    pub scanner: Arc<dyn NativeScanner>,
    pub label_printer: Arc<dyn NativeLabelPrinter>,
}
