// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Where label templates come from when a tag names them by URL, and where
// the labels for a pre-check-in code come from.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use kiosk_core::error::{KioskError, Result};

use crate::camera::PreCheckIn;
use crate::labels::{LabelTag, parse_label_tags};

/// Fetches ZPL templates by URL.
#[async_trait]
pub trait LabelSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Downloads templates from the check-in server over HTTP(S).
pub struct HttpLabelSource {
    client: reqwest::Client,
}

impl HttpLabelSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KioskError::LabelFetch(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LabelSource for HttpLabelSource {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KioskError::LabelFetch(format!("{url}: {e}")))?
            .error_for_status()
            .map_err(|e| KioskError::LabelFetch(format!("{url}: {e}")))?;

        let zpl = response
            .text()
            .await
            .map_err(|e| KioskError::LabelFetch(format!("{url}: reading body: {e}")))?;

        debug!(bytes = zpl.len(), "label template downloaded");
        Ok(zpl)
    }
}

/// Asks the check-in server for the labels of a pre-check-in code.
///
/// `GET <url>?code=<code>` must answer with the same label tag JSON that
/// `PrintLabels` accepts.
pub struct HttpPreCheckIn {
    client: reqwest::Client,
    url: String,
}

impl HttpPreCheckIn {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KioskError::LabelFetch(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PreCheckIn for HttpPreCheckIn {
    #[instrument(skip(self))]
    async fn labels_for_code(&self, code: &str) -> Result<Vec<LabelTag>> {
        let text = self
            .client
            .get(&self.url)
            .query(&[("code", code)])
            .send()
            .await
            .map_err(|e| KioskError::LabelFetch(format!("pre-check-in {code}: {e}")))?
            .error_for_status()
            .map_err(|e| KioskError::LabelFetch(format!("pre-check-in {code}: {e}")))?
            .text()
            .await
            .map_err(|e| KioskError::LabelFetch(format!("pre-check-in {code}: body: {e}")))?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| KioskError::LabelFormat(format!("pre-check-in {code}: {e}")))?;

        let tags = parse_label_tags(&body)?;
        debug!(labels = tags.len(), "pre-check-in labels received");
        Ok(tags)
    }
}
