// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: builds the capability services behind the bridge from the
// kiosk's data directory and configuration.

pub mod data_dir;
pub mod kiosk_services;
