// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Vocabulary types shared by the platform library and the transceiver /
//! autonegotiation management daemon.

pub mod logging;
pub mod ports;

/// Return the current time as nanoseconds since the UNIX epoch.
pub fn timestamp_ns() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .expect("current time is far within the representable range")
}
