// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Kiosk: native command bridge.
//!
//! Web content posts invocation messages; the [`Transport`] decodes each
//! into a [`Command`](kiosk_core::Command), the [`CapabilityRegistry`] hands
//! it to the named handler together with a single-use [`ResolutionSink`],
//! and the eventual resolution travels back through the [`OutboundPump`]
//! into the web view, tagged with the original correlation id.
//!
//! The stages are independent: decoding lives in [`message`], lookup and
//! invocation in [`registry`], and delivery in [`transport`], so each can
//! be exercised without a live web view.

pub mod message;
pub mod registry;
pub mod sink;
pub mod stub;
pub mod traits;
pub mod transport;

pub use message::{DecodeError, InboundMessage, Outbound, OutboundMessage, WebEvent, decode_inbound};
pub use registry::{AsyncCapability, CapabilityHandler, CapabilityRegistry, async_handler};
pub use sink::{ResolutionSink, SharedSink};
pub use traits::{NativeLabelPrinter, NativeScanner, Platform, ScanEvent, WebView};
pub use transport::{EventEmitter, OutboundPump, OutboundSender, Transport, outbound_channel};

use std::sync::Arc;

/// Retrieves the native capability implementations for this build.
///
/// Desktop and CI builds get the stub, which reports every hardware
/// operation as unavailable. Device shells construct a [`Platform`] from
/// their own scanner and printer implementations instead.
pub fn platform_bridge() -> Platform {
    let stub = Arc::new(stub::StubBridge);
    Platform {
        name: stub.platform_name().to_string(),
        scanner: stub.clone(),
        label_printer: stub,
    }
}
