// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Web view request filter.
//
// Check-in pages written for older kiosk apps still reference their own
// bridge scripts.  Loading them would install a second bridge next to the
// native one, so the web view's network layer asks this filter first.

use tracing::debug;

use kiosk_core::KioskConfig;

/// Refuses URLs whose path ends with a blocked suffix.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    /// Lowercased path suffixes.
    patterns: Vec<String>,
}

impl RequestFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn from_config(config: &KioskConfig) -> Self {
        Self::new(&config.blocked_request_patterns)
    }

    /// Whether the web view should refuse to load `url`.
    ///
    /// Matching ignores case and anything after `?` or `#`.
    pub fn should_block(&self, url: &str) -> bool {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        let path = url[..end].to_ascii_lowercase();

        let blocked = self.patterns.iter().any(|p| path.ends_with(p.as_str()));
        if blocked {
            debug!(url, "blocked legacy bridge script");
        }
        blocked
    }
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self::from_config(&KioskConfig::default())
    }
}
