// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Run-time configuration for the daemon.

use std::time::Duration;

use bitflags::bitflags;

/// The OUI assigned to the 25G Ethernet Consortium, expected in the
/// extended-technology-ability next page.
pub const CONSORTIUM_25G_OUI: u32 = 0x6a737d;

bitflags! {
    /// Categories of verbose module-management logging.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DebugFlags: u32 {
        /// Module state transitions and configuration writes.
        const MOD_STATE = 1 << 0;
        /// Module type identification.
        const MOD_TYPE = 1 << 1;
        /// Module interrupt handling.
        const MOD_INTR = 1 << 2;
    }
}

/// Tunable settings for one managed switch.
#[derive(Clone, Debug)]
pub struct Config {
    /// How often the management task polls transceiver state in the absence
    /// of interrupts. `None` disables the management task entirely; API
    /// calls that rely on background retries then return `Unsupported`.
    pub xcvr_poll_period: Option<Duration>,

    /// The platform GPIO wired to the port-interrupt line, if any. Without
    /// one the management task polls unconditionally.
    pub gpio_port_intr: Option<u32>,

    /// Widen the valid range of the link-fail-inhibit timers from the
    /// spec's 1..=511 ms up to the hardware maximum of 1..=1023 ms.
    pub an_timer_allow_out_spec: bool,

    /// The OUI expected in the 25G extended-technology-ability next page.
    pub autoneg_25g_nxt_pg_oui: u32,

    /// Verbose logging categories.
    pub debug: DebugFlags,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xcvr_poll_period: Some(Duration::from_secs(1)),
            gpio_port_intr: None,
            an_timer_allow_out_spec: false,
            autoneg_25g_nxt_pg_oui: CONSORTIUM_25G_OUI,
            debug: DebugFlags::empty(),
        }
    }
}
