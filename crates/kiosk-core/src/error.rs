// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the kiosk bridge.

use thiserror::Error;

/// Top-level error type for all bridge and capability operations.
#[derive(Debug, Error)]
pub enum KioskError {
    // -- Bridge protocol --
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("capability already registered: {0}")]
    DuplicateCapability(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("handler for {0} finished without resolving")]
    Unresolved(String),

    #[error("{capability} did not resolve within {seconds}s")]
    Timeout { capability: String, seconds: u64 },

    // -- Label printing --
    #[error("no printer configured")]
    NoPrinter,

    #[error("printer connection failed: {0}")]
    PrinterConnection(String),

    #[error("label download failed: {0}")]
    LabelFetch(String),

    #[error("invalid label data: {0}")]
    LabelFormat(String),

    // -- Camera --
    #[error("camera is already active")]
    CameraBusy,

    #[error("scan cancelled")]
    ScanCancelled,

    // -- Storage / persistence --
    #[error("preference storage error: {0}")]
    Preferences(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform --
    #[error("web view delivery failed: {0}")]
    WebView(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KioskError>;
