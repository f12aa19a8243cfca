// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP label printing (Zebra / JetDirect, port 9100).
//
// Zebra network printers accept ZPL on a plain socket: connect, write,
// close.  There is no acknowledgement, so "sent" is the strongest success
// we can report.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use kiosk_core::error::{KioskError, Result};

/// Resolve a label's printer address to `host:port`.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port`, and bare IPv6.
pub fn printer_socket_addr(address: &str, default_port: u16) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(KioskError::NoPrinter);
    }

    if address.starts_with('[') {
        return if address.contains("]:") {
            Ok(address.to_string())
        } else {
            Ok(format!("{address}:{default_port}"))
        };
    }

    match address.matches(':').count() {
        0 => Ok(format!("{address}:{default_port}")),
        1 => {
            let (host, port) = address.split_once(':').unwrap_or((address, ""));
            let port: u16 = port.parse().map_err(|_| {
                KioskError::LabelFormat(format!("invalid printer port in {address:?}"))
            })?;
            Ok(format!("{host}:{port}"))
        }
        _ => Ok(format!("[{address}]:{default_port}")),
    }
}

/// Send `data` to the printer at `addr` (`host:port`).
#[instrument(skip(data), fields(bytes = data.len()))]
pub async fn send_raw(addr: &str, data: &[u8], connect_timeout: Duration) -> Result<()> {
    info!("connecting to label printer");

    let mut stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            KioskError::PrinterConnection(format!(
                "{addr} timed out after {}s",
                connect_timeout.as_secs()
            ))
        })?
        .map_err(|e| KioskError::PrinterConnection(format!("{addr}: {e}")))?;

    stream
        .write_all(data)
        .await
        .map_err(|e| KioskError::PrinterConnection(format!("{addr}: send failed: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| KioskError::PrinterConnection(format!("{addr}: flush: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| KioskError::PrinterConnection(format!("{addr}: shutdown: {e}")))?;

    debug!("label data sent");
    Ok(())
}
