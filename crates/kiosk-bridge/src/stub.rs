// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for desktop/CI builds where the kiosk hardware is unavailable.
//
// Every hardware operation returns `PlatformUnavailable`, which the
// capability handlers turn into an error resolution for the page.

use kiosk_core::error::{KioskError, Result};
use tokio::sync::mpsc;

use crate::traits::*;

/// No-op bridge returned on platforms without kiosk hardware.
pub struct StubBridge;

impl StubBridge {
    pub fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl NativeScanner for StubBridge {
    fn start_scanning(&self, _passive: bool) -> Result<mpsc::UnboundedReceiver<ScanEvent>> {
        tracing::warn!("NativeScanner::start_scanning called on stub bridge");
        Err(KioskError::PlatformUnavailable)
    }

    fn stop_scanning(&self) -> Result<()> {
        // Nothing is running, so there is nothing to stop.
        Ok(())
    }
}

impl NativeLabelPrinter for StubBridge {
    fn print_label(&self, _printer_name: &str, _zpl: &str) -> Result<()> {
        tracing::warn!("NativeLabelPrinter::print_label called on stub bridge");
        Err(KioskError::PlatformUnavailable)
    }
}
