// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Autonegotiation register layout.
//!
//! Each EPL block carries four lanes, and each lane has its own
//! autonegotiation register file: an interrupt-pending register (`AN_IP`), a
//! matching interrupt-mask register (`AN_IM`, where a set bit suppresses the
//! interrupt), and the Clause 73 configuration register (`AN_73_CFG`). The
//! Clause 37 and Clause 73 pending bits share the one `AN_IP` register, in
//! separate bit ranges.

use bitflags::bitflags;

const EPL_BASE: u32 = 0x0e00_0000;
const EPL_STRIDE: u32 = 0x0000_0400;
const LANE_STRIDE: u32 = 0x0000_0080;

const AN_IP_OFFSET: u32 = 0x10;
const AN_IM_OFFSET: u32 = 0x14;
const AN_73_CFG_OFFSET: u32 = 0x18;

fn lane_base(epl: u8, lane: u8) -> u32 {
    EPL_BASE + u32::from(epl) * EPL_STRIDE + u32::from(lane) * LANE_STRIDE
}

/// Address of the interrupt-pending register for an EPL lane.
pub fn an_ip(epl: u8, lane: u8) -> u32 {
    lane_base(epl, lane) + AN_IP_OFFSET
}

/// Address of the interrupt-mask register for an EPL lane.
pub fn an_im(epl: u8, lane: u8) -> u32 {
    lane_base(epl, lane) + AN_IM_OFFSET
}

/// Address of the Clause 73 configuration register for an EPL lane.
pub fn an_73_cfg(epl: u8, lane: u8) -> u32 {
    lane_base(epl, lane) + AN_73_CFG_OFFSET
}

/// `AN_73_CFG`: ignore the nonce-match check, allowing a port to negotiate
/// against itself in loopback.
pub const AN_73_CFG_IGNORE_NONCE_MATCH: u32 = 1 << 3;

bitflags! {
    /// The `AN_IP` / `AN_IM` bit assignments.
    ///
    /// Bits 0..=9 belong to the Clause 37 (and SGMII) engine, bits 16..=23
    /// to the Clause 73 engine.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct AnIp: u32 {
        const AN37_AN_ENABLE = 1 << 0;
        const AN37_AN_RESTART = 1 << 1;
        const AN37_AN_DISABLE_LINK_OK = 1 << 2;
        const AN37_ABILITY_DETECT = 1 << 3;
        const AN37_ACKNOWLEDGE_DETECT = 1 << 4;
        const AN37_COMPLETE_ACKNOWLEDGE = 1 << 5;
        const AN37_NEXT_PAGE_WAIT = 1 << 6;
        const AN37_IDLE_DETECT = 1 << 7;
        const AN37_LINK_OK = 1 << 8;
        const AN37_MR_PAGE_RX = 1 << 9;

        const AN73_TRANSMIT_DISABLE = 1 << 16;
        const AN73_ABILITY_DETECT = 1 << 17;
        const AN73_ACKNOWLEDGE_DETECT = 1 << 18;
        const AN73_COMPLETE_ACKNOWLEDGE = 1 << 19;
        const AN73_NEXT_PAGE_WAIT = 1 << 20;
        const AN73_AN_GOOD_CHECK = 1 << 21;
        const AN73_AN_GOOD = 1 << 22;
        const AN73_MR_PAGE_RX = 1 << 23;
    }
}

impl AnIp {
    /// The interrupt sources enabled while a port runs Clause 73.
    pub const AN73_INT_MASK: AnIp = AnIp::AN73_TRANSMIT_DISABLE
        .union(AnIp::AN73_ABILITY_DETECT)
        .union(AnIp::AN73_ACKNOWLEDGE_DETECT)
        .union(AnIp::AN73_COMPLETE_ACKNOWLEDGE)
        .union(AnIp::AN73_NEXT_PAGE_WAIT)
        .union(AnIp::AN73_AN_GOOD_CHECK)
        .union(AnIp::AN73_AN_GOOD);

    /// The interrupt sources enabled while a port runs Clause 37 or SGMII.
    pub const AN37_INT_MASK: AnIp = AnIp::AN37_AN_ENABLE
        .union(AnIp::AN37_AN_RESTART)
        .union(AnIp::AN37_AN_DISABLE_LINK_OK)
        .union(AnIp::AN37_ABILITY_DETECT)
        .union(AnIp::AN37_COMPLETE_ACKNOWLEDGE)
        .union(AnIp::AN37_NEXT_PAGE_WAIT)
        .union(AnIp::AN37_IDLE_DETECT)
        .union(AnIp::AN37_LINK_OK);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_addressing_is_disjoint() {
        let mut seen = std::collections::BTreeSet::new();
        for epl in 0..9 {
            for lane in 0..4 {
                assert!(seen.insert(an_ip(epl, lane)));
                assert!(seen.insert(an_im(epl, lane)));
                assert!(seen.insert(an_73_cfg(epl, lane)));
            }
        }
    }

    #[test]
    fn test_int_masks_do_not_overlap() {
        assert_eq!(
            AnIp::AN73_INT_MASK & AnIp::AN37_INT_MASK,
            AnIp::empty()
        );
    }
}
