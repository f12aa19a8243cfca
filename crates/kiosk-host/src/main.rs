// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kiosk host
//
// Entry point. Initialises logging and backend services, then serves the
// bridge over standard streams: one inbound JSON message per stdin line, one
// page script per stdout line.  Logs go to stderr.

mod services;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use kiosk_bridge::{Transport, WebView, outbound_channel};
use kiosk_core::error::{KioskError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use services::data_dir;
use services::kiosk_services::KioskServices;

/// How long to wait for pending resolutions after stdin closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Web view stand-in that prints each script on its own stdout line.
struct StdoutWebView;

impl WebView for StdoutWebView {
    fn evaluate_script(&self, script: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{script}")
            .and_then(|()| out.flush())
            .map_err(|e| KioskError::WebView(e.to_string()))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("kiosk host starting");

    if let Err(e) = run().await {
        error!(error = %e, "kiosk host failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let (outbound, pump) = outbound_channel();

    let services = match data_dir::data_dir()
        .and_then(|dir| KioskServices::init(&dir, outbound.events()))
    {
        Ok(services) => services,
        Err(e) => {
            error!(error = %e, "persistent storage failed; using in-memory fallback");
            KioskServices::fallback(outbound.events())?
        }
    };

    let transport = Transport::from_config(services.registry()?, outbound, &services.config);
    let pump = tokio::spawn(pump.run(
        Arc::new(StdoutWebView),
        services.config.script_namespace.clone(),
    ));
    info!(platform = %services.platform_name, "bridge ready");

    let received = serve_lines(BufReader::new(tokio::io::stdin()), &transport).await?;

    info!(received, "stdin closed; draining pending resolutions");
    services.shutdown();
    drop(transport);
    drop(services);

    match tokio::time::timeout(DRAIN_TIMEOUT, pump).await {
        Ok(Ok(())) => info!("kiosk host stopped"),
        Ok(Err(e)) => warn!(error = %e, "outbound pump task failed"),
        Err(_) => warn!("gave up waiting for pending resolutions"),
    }
    Ok(())
}

/// Hand every line of `reader` to `transport` until EOF. Returns how many
/// messages were received.
///
/// Lines are read as bytes.  Invalid UTF-8 is replaced rather than treated
/// as a read failure, so one bad line costs at most its own command.
async fn serve_lines<R>(mut reader: R, transport: &Transport) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut received = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(received);
        }

        let line = String::from_utf8_lossy(&buf);
        if matches!(line, std::borrow::Cow::Owned(_)) {
            warn!(len = buf.len(), "inbound line is not valid UTF-8");
        }
        let line = line.trim();
        if !line.is_empty() {
            transport.receive(line);
            received += 1;
        }
    }
}
