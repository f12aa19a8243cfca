// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kiosk Capabilities: the native operations the check-in page can invoke
// through the bridge: stored preferences, label printing (network or
// Bluetooth Zebra printers), and the barcode camera.  The request filter
// also lives here; it guards the web view's network layer and is not a
// bridge capability.

pub mod camera;
pub mod label_source;
pub mod labels;
pub mod preferences;
pub mod printer;
pub mod raw_client;
pub mod request_filter;

pub use camera::{CameraService, PreCheckIn};
pub use label_source::{HttpLabelSource, HttpPreCheckIn, LabelSource};
pub use labels::LabelTag;
pub use preferences::PreferenceStore;
pub use printer::LabelPrinterService;
pub use request_filter::RequestFilter;

use std::sync::Arc;

use kiosk_bridge::CapabilityRegistry;
use kiosk_core::error::Result;

/// The capability services of one kiosk, ready to be registered.
#[derive(Clone)]
pub struct Capabilities {
    pub preferences: Arc<PreferenceStore>,
    pub printer: Arc<LabelPrinterService>,
    pub camera: Arc<CameraService>,
}

impl Capabilities {
    /// Bind every capability name to its handler.
    pub fn register_all(&self, registry: &mut CapabilityRegistry) -> Result<()> {
        preferences::register(registry, Arc::clone(&self.preferences))?;
        printer::register(registry, Arc::clone(&self.printer))?;
        camera::register(registry, Arc::clone(&self.camera))?;
        Ok(())
    }
}
