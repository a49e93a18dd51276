// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Types describing switch ports, ethernet modes, and link speeds.
//!
//! A physical switch port is a socket on the front panel (SFP+ or QSFP) or a
//! backplane connector. A QSFP socket carries four SerDes lanes which may be
//! configured as one 4-lane link or as four independent single-lane links; in
//! the latter case each lane is its own logical port. Throughout the daemon a
//! logical port is named by a [`PortId`], while internal tables are indexed
//! by position in the per-switch port configuration list.

use bitflags::bitflags;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// A logical switch port number.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct PortId(pub u16);

impl From<u16> for PortId {
    fn from(x: u16) -> Self {
        Self(x)
    }
}

impl From<PortId> for u16 {
    fn from(p: PortId) -> Self {
        p.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ethernet interface mode of a port.
///
/// Single-lane modes run on one SerDes lane; the 40G and 100G modes gang all
/// four lanes of an EPL. `An73` is the transitional mode a port is placed in
/// while Clause 73 autonegotiation selects the final mode.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    JsonSchema,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EthMode {
    #[default]
    Disabled,
    Sgmii,
    Base1000X,
    Base1000Kx,
    Base10GSr,
    Base10GKr,
    Base25GKr,
    Base25GCr,
    Base40GKr4,
    Base40GCr4,
    Base100GKr4,
    Base100GCr4,
    An73,
}

impl EthMode {
    /// True for the modes that gang all four lanes of an EPL.
    pub fn is_multi_lane(&self) -> bool {
        matches!(
            self,
            EthMode::Base40GKr4
                | EthMode::Base40GCr4
                | EthMode::Base100GKr4
                | EthMode::Base100GCr4
        )
    }

    /// True for the modes that clock the lane at 1G or below.
    ///
    /// Used to pick the rate-select setting for dual-rate SFP+ modules; a
    /// disabled port is left in the low-rate setting.
    pub fn is_1g(&self) -> bool {
        matches!(
            self,
            EthMode::Disabled
                | EthMode::Sgmii
                | EthMode::Base1000X
                | EthMode::Base1000Kx
        )
    }

    /// The nominal speed of the mode.
    pub fn speed(&self) -> PortSpeed {
        match self {
            EthMode::Disabled => PortSpeed::Speed0G,
            EthMode::Sgmii | EthMode::Base1000X | EthMode::Base1000Kx => {
                PortSpeed::Speed1G
            }
            EthMode::Base10GSr | EthMode::Base10GKr => PortSpeed::Speed10G,
            EthMode::Base25GKr | EthMode::Base25GCr => PortSpeed::Speed25G,
            EthMode::Base40GKr4 | EthMode::Base40GCr4 => PortSpeed::Speed40G,
            EthMode::Base100GKr4 | EthMode::Base100GCr4 => {
                PortSpeed::Speed100G
            }
            EthMode::An73 => PortSpeed::Speed0G,
        }
    }
}

impl fmt::Display for EthMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EthMode::Disabled => "DISABLED",
            EthMode::Sgmii => "SGMII",
            EthMode::Base1000X => "1000BASE-X",
            EthMode::Base1000Kx => "1000BASE-KX",
            EthMode::Base10GSr => "10GBASE-SR",
            EthMode::Base10GKr => "10GBASE-KR",
            EthMode::Base25GKr => "25GBASE-KR",
            EthMode::Base25GCr => "25GBASE-CR",
            EthMode::Base40GKr4 => "40GBASE-KR4",
            EthMode::Base40GCr4 => "40GBASE-CR4",
            EthMode::Base100GKr4 => "100GBASE-KR4",
            EthMode::Base100GCr4 => "100GBASE-CR4",
            EthMode::An73 => "AN-73",
        };
        write!(f, "{name}")
    }
}

/// The configured or negotiated speed of a link.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PortSpeed {
    #[default]
    Speed0G,
    Speed1G,
    /// The 2.5 Gb/s line rate carrying 1000BASE-KX.
    Speed2_5G,
    Speed10G,
    Speed25G,
    Speed40G,
    Speed100G,
}

impl PortSpeed {
    /// The speed in Mb/s.
    pub fn mbps(&self) -> u32 {
        match self {
            PortSpeed::Speed0G => 0,
            PortSpeed::Speed1G => 1_000,
            PortSpeed::Speed2_5G => 2_500,
            PortSpeed::Speed10G => 10_000,
            PortSpeed::Speed25G => 25_000,
            PortSpeed::Speed40G => 40_000,
            PortSpeed::Speed100G => 100_000,
        }
    }
}

impl fmt::Display for PortSpeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mbps = self.mbps();
        if mbps % 1000 == 0 {
            write!(f, "{}G", mbps / 1000)
        } else {
            write!(f, "{}.{}G", mbps / 1000, (mbps % 1000) / 100)
        }
    }
}

bitflags! {
    /// The speeds a port is physically capable of.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Capabilities: u32 {
        const SPEED_1G = 1 << 0;
        const SPEED_10G = 1 << 1;
        const SPEED_25G = 1 << 2;
        const SPEED_40G = 1 << 3;
        const SPEED_100G = 1 << 4;
    }
}

/// The autonegotiation protocol configured on a port.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    JsonSchema,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AutonegMode {
    #[default]
    None,
    Sgmii,
    Clause37,
    Clause73,
}

/// How the lanes of a port are grouped for scheduling.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LaneMode {
    #[default]
    None,
    Single,
    Quad,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_lane_modes() {
        assert!(EthMode::Base40GCr4.is_multi_lane());
        assert!(EthMode::Base100GKr4.is_multi_lane());
        assert!(!EthMode::Base25GKr.is_multi_lane());
        assert!(!EthMode::Sgmii.is_multi_lane());
    }

    #[test]
    fn test_1g_modes() {
        for mode in [
            EthMode::Disabled,
            EthMode::Sgmii,
            EthMode::Base1000X,
            EthMode::Base1000Kx,
        ] {
            assert!(mode.is_1g(), "{mode} should select the 1G rate");
        }
        assert!(!EthMode::Base10GSr.is_1g());
        assert!(!EthMode::Base10GKr.is_1g());
    }

    #[test]
    fn test_speed_mbps() {
        assert_eq!(PortSpeed::Speed25G.mbps(), 25_000);
        assert_eq!(PortSpeed::Speed2_5G.mbps(), 2_500);
        assert_eq!(EthMode::Base100GCr4.speed(), PortSpeed::Speed100G);
    }
}
