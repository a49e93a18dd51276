// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Interpretation of Clause 73 negotiation outcomes.
//!
//! The hardware reports the highest common denominator of the two link
//! partners as a small code; this module maps that code to an ethernet
//! mode, scans next-page sequences for the 25G Consortium's OUI-tagged
//! extended technology ability message, and checks received pages for an
//! EEE advertisement.

use common::ports::AutonegMode;
use common::ports::Capabilities;
use common::ports::EthMode;
use common::ports::LaneMode;
use common::ports::PortSpeed;
use slog::debug;
use slog::Logger;

use super::base_page;
use super::base_page::Clause73Ability;
use crate::types::XcvrdError;
use crate::types::XcvrdResult;

/// The highest-common-denominator codes reported by the Clause 73 engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Hcd {
    IncompatibleLink = 0,
    Kr10G = 1,
    Kx4 = 2,
    Kx = 3,
    Kr440G = 4,
    Cr440G = 5,
    Cr10100G = 6,
    Kp4100G = 7,
    Kr4100G = 8,
    Cr4100G = 9,
    Kr25G = 10,
    Cr25G = 11,
}

impl Hcd {
    /// Decode a raw HCD value; anything out of range reads as an
    /// incompatible link.
    pub fn from_raw(value: u32) -> Hcd {
        match value {
            1 => Hcd::Kr10G,
            2 => Hcd::Kx4,
            3 => Hcd::Kx,
            4 => Hcd::Kr440G,
            5 => Hcd::Cr440G,
            6 => Hcd::Cr10100G,
            7 => Hcd::Kp4100G,
            8 => Hcd::Kr4100G,
            9 => Hcd::Cr4100G,
            10 => Hcd::Kr25G,
            11 => Hcd::Cr25G,
            _ => Hcd::IncompatibleLink,
        }
    }

    /// A printable name, including the raw code.
    pub fn name(&self) -> &'static str {
        match self {
            Hcd::IncompatibleLink => "HCD_INCOMPATIBLE_LINK(0)",
            Hcd::Kr10G => "HCD_10_KR(1)",
            Hcd::Kx4 => "HCD_KX4(2)",
            Hcd::Kx => "HCD_KX(3)",
            Hcd::Kr440G => "HCD_40_KR4(4)",
            Hcd::Cr440G => "HCD_40_CR4(5)",
            Hcd::Cr10100G => "HCD_100_CR10(6)",
            Hcd::Kp4100G => "HCD_100_KP4(7)",
            Hcd::Kr4100G => "HCD_100_KR4(8)",
            Hcd::Cr4100G => "HCD_100_CR4(9)",
            Hcd::Kr25G => "HCD_25_KR(10)",
            Hcd::Cr25G => "HCD_25_CR(11)",
        }
    }
}

/// The ethernet mode a negotiated HCD resolves to.
///
/// The codes the hardware can negotiate but the switch cannot run (KX4,
/// 100G-CR10, 100G-KP4) resolve to `Disabled`, as does an incompatible
/// link.
pub fn hcd_to_eth_mode(hcd: Hcd) -> EthMode {
    match hcd {
        Hcd::Kx => EthMode::Base1000Kx,
        Hcd::Kr10G => EthMode::Base10GKr,
        Hcd::Kr440G => EthMode::Base40GKr4,
        Hcd::Cr440G => EthMode::Base40GCr4,
        Hcd::Kr4100G => EthMode::Base100GKr4,
        Hcd::Cr4100G => EthMode::Base100GCr4,
        Hcd::Kr25G => EthMode::Base25GKr,
        Hcd::Cr25G => EthMode::Base25GCr,
        Hcd::IncompatibleLink | Hcd::Kx4 | Hcd::Cr10100G | Hcd::Kp4100G => {
            EthMode::Disabled
        }
    }
}

/// Reassemble the 24-bit OUI spread across an OUI-tagged message page and
/// its unformatted companion.
///
/// The ordering is unusual: the two low OUI bits ride in bits 9..10 of the
/// unformatted page, the next eleven in bits 32..42 of the message page,
/// and the top eleven in bits 16..26 of the message page.
fn next_page_oui(message_page: u64, unformatted_page: u64) -> u32 {
    let mut oui: u32 = 0;
    for bit in 0..2 {
        oui |= (((unformatted_page >> (9 + bit)) & 1) as u32) << bit;
    }
    for bit in 0..11 {
        oui |= (((message_page >> (32 + bit)) & 1) as u32) << (bit + 2);
    }
    for bit in 0..11 {
        oui |= (((message_page >> (16 + bit)) & 1) as u32) << (bit + 13);
    }
    oui
}

/// Find the extended-technology-ability page in a next-page sequence.
///
/// An OUI-tagged message page must be followed by an unformatted page whose
/// code is the extended technology ability, and the OUI spread across the
/// pair must match `expected_oui`. Returns the index of the unformatted
/// page.
pub fn ext_tech_ability_index(
    log: &Logger,
    pages: &[u64],
    expected_oui: u32,
) -> Option<usize> {
    for (i, &page) in pages.iter().enumerate() {
        if base_page::message_code(page) != base_page::OUI_MSG_CODE {
            continue;
        }
        let Some(&unformatted) = pages.get(i + 1) else {
            debug!(log, "OUI message page has no unformatted next page");
            continue;
        };
        if base_page::unformatted_code(unformatted)
            != base_page::EXT_TECH_ABILITY_CODE
        {
            continue;
        }
        let oui = next_page_oui(page, unformatted);
        if oui == expected_oui {
            debug!(
                log,
                "matched extended technology ability next page";
                "oui" => format!("{oui:#08x}"),
                "page" => i + 1,
            );
            return Some(i + 1);
        }
        debug!(
            log,
            "extended technology ability OUI not recognized";
            "expected" => format!("{expected_oui:#08x}"),
            "received" => format!("{oui:#08x}"),
        );
    }
    None
}

/// Whether a next-page sequence advertises 25G support via the extended
/// technology ability page.
pub fn is_25g_in_next_pages(
    log: &Logger,
    pages: &[u64],
    expected_oui: u32,
) -> bool {
    match ext_tech_ability_index(log, pages, expected_oui) {
        Some(index) => {
            let page = pages[index];
            page & (base_page::EXT_TECH_25G_KR1 | base_page::EXT_TECH_25G_CR1)
                != 0
        }
        None => false,
    }
}

/// Check received partner next pages for an EEE advertisement covering the
/// negotiated mode.
pub fn eee_negotiated(
    log: &Logger,
    mode: AutonegMode,
    partner_pages: &[u64],
    eth_mode: EthMode,
) -> bool {
    if mode != AutonegMode::Clause73 {
        return false;
    }
    for (i, &page) in partner_pages.iter().enumerate() {
        if base_page::message_code(page) != base_page::EEE_MSG_CODE {
            continue;
        }
        debug!(
            log,
            "EEE message next page received";
            "page" => i,
            "contents" => format!("{page:#018x}"),
        );
        let advertised = match eth_mode {
            EthMode::Base10GKr => page & base_page::EEE_10GBASE_KR != 0,
            EthMode::Base1000Kx => page & base_page::EEE_1000BASE_KX != 0,
            _ => false,
        };
        if advertised {
            return true;
        }
    }
    false
}

/// Compute the maximum speed a port may negotiate and the lane grouping it
/// requires.
///
/// For Clause 73 an all-zero base page means the caller has not configured
/// abilities yet; the supported set is synthesized from the port's own
/// capabilities instead. 25G is selected when advertised in the base page
/// or via the extended-technology-ability next page.
pub fn max_speed_ability_and_mode(
    log: &Logger,
    mode: AutonegMode,
    base_page: u64,
    next_pages: &[u64],
    capabilities: Capabilities,
    expected_oui: u32,
) -> XcvrdResult<(PortSpeed, LaneMode)> {
    match mode {
        AutonegMode::Clause37 | AutonegMode::Sgmii => {
            Ok((PortSpeed::Speed1G, LaneMode::Single))
        }
        AutonegMode::Clause73 => {
            let ability = if base_page == 0 {
                let mut ability = Clause73Ability::SUPPORTED;
                if !capabilities.contains(Capabilities::SPEED_40G) {
                    ability &= !Clause73Ability::ABILITIES_40G;
                }
                if !capabilities.contains(Capabilities::SPEED_100G) {
                    ability &= !Clause73Ability::ABILITIES_100G;
                }
                ability
            } else {
                base_page::ability_field(base_page)
            };

            let is_25g_next_page =
                is_25g_in_next_pages(log, next_pages, expected_oui);

            let (speed, lanes) =
                if ability.intersects(Clause73Ability::ABILITIES_100G) {
                    (PortSpeed::Speed100G, LaneMode::Quad)
                } else if ability.intersects(Clause73Ability::ABILITIES_40G) {
                    (PortSpeed::Speed40G, LaneMode::Quad)
                } else if ability.intersects(Clause73Ability::ABILITIES_25G)
                    || is_25g_next_page
                {
                    (PortSpeed::Speed25G, LaneMode::Single)
                } else if ability.contains(Clause73Ability::KR_10G) {
                    (PortSpeed::Speed10G, LaneMode::Single)
                } else if ability.contains(Clause73Ability::KX_1G) {
                    (PortSpeed::Speed2_5G, LaneMode::Single)
                } else {
                    (PortSpeed::Speed0G, LaneMode::None)
                };
            Ok((speed, lanes))
        }
        AutonegMode::None => Err(XcvrdError::Unsupported(
            "no autonegotiation mode configured".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    /// Build an (OUI message page, unformatted ext-tech page) pair carrying
    /// `oui` and the given 25G ability bits.
    fn ext_tech_pages(oui: u32, kr1: bool, cr1: bool) -> [u64; 2] {
        let mut message = u64::from(base_page::OUI_MSG_CODE);
        let mut unformatted = u64::from(base_page::EXT_TECH_ABILITY_CODE);
        for bit in 0..2 {
            unformatted |= u64::from((oui >> bit) & 1) << (9 + bit);
        }
        for bit in 0..11 {
            message |= u64::from((oui >> (bit + 2)) & 1) << (32 + bit);
        }
        for bit in 0..11 {
            message |= u64::from((oui >> (bit + 13)) & 1) << (16 + bit);
        }
        if kr1 {
            unformatted |= base_page::EXT_TECH_25G_KR1;
        }
        if cr1 {
            unformatted |= base_page::EXT_TECH_25G_CR1;
        }
        message |= base_page::NP_BIT;
        [message, unformatted]
    }

    const OUI: u32 = 0x6a737d;

    #[test]
    fn test_hcd_mapping_is_total_and_invertible() {
        // Every raw value maps somewhere.
        for raw in 0..16 {
            let _ = hcd_to_eth_mode(Hcd::from_raw(raw));
        }
        // The eight defined outcomes are distinct.
        let defined = [
            Hcd::Kx,
            Hcd::Kr10G,
            Hcd::Kr440G,
            Hcd::Cr440G,
            Hcd::Kr4100G,
            Hcd::Cr4100G,
            Hcd::Kr25G,
            Hcd::Cr25G,
        ];
        let modes: std::collections::BTreeSet<_> = defined
            .iter()
            .map(|&h| format!("{}", hcd_to_eth_mode(h)))
            .collect();
        assert_eq!(modes.len(), defined.len());
    }

    #[test]
    fn test_undefined_hcds_disable() {
        for hcd in [Hcd::IncompatibleLink, Hcd::Kx4, Hcd::Cr10100G, Hcd::Kp4100G]
        {
            assert_eq!(hcd_to_eth_mode(hcd), EthMode::Disabled);
            assert!(!hcd.name().is_empty());
        }
    }

    #[test]
    fn test_oui_reconstruction() {
        let pages = ext_tech_pages(OUI, true, false);
        assert_eq!(next_page_oui(pages[0], pages[1]), OUI);
    }

    #[test]
    fn test_ext_tech_scan() {
        let log = test_logger();
        let pages = ext_tech_pages(OUI, false, true);
        assert_eq!(ext_tech_ability_index(&log, &pages, OUI), Some(1));
        assert!(is_25g_in_next_pages(&log, &pages, OUI));

        // A mismatched OUI is not recognized.
        assert_eq!(ext_tech_ability_index(&log, &pages, 0x123456), None);

        // Neither ability bit set: found, but no 25G.
        let pages = ext_tech_pages(OUI, false, false);
        assert!(!is_25g_in_next_pages(&log, &pages, OUI));

        // A trailing message page with no companion is skipped.
        let lonely = [pages[0]];
        assert_eq!(ext_tech_ability_index(&log, &lonely, OUI), None);
    }

    #[test]
    fn test_eee_check() {
        let log = test_logger();
        let eee_kr = u64::from(base_page::EEE_MSG_CODE)
            | base_page::EEE_10GBASE_KR;
        assert!(eee_negotiated(
            &log,
            AutonegMode::Clause73,
            &[eee_kr],
            EthMode::Base10GKr,
        ));
        assert!(!eee_negotiated(
            &log,
            AutonegMode::Clause73,
            &[eee_kr],
            EthMode::Base1000Kx,
        ));
        assert!(!eee_negotiated(
            &log,
            AutonegMode::Clause37,
            &[eee_kr],
            EthMode::Base10GKr,
        ));
        let eee_kx = u64::from(base_page::EEE_MSG_CODE)
            | base_page::EEE_1000BASE_KX;
        assert!(eee_negotiated(
            &log,
            AutonegMode::Clause73,
            &[eee_kx],
            EthMode::Base1000Kx,
        ));
    }

    #[test]
    fn test_max_speed_from_base_page() {
        let log = test_logger();
        let page = base_page::with_ability_field(
            0,
            Clause73Ability::KR_10G | Clause73Ability::KX_1G,
        );
        let (speed, lanes) = max_speed_ability_and_mode(
            &log,
            AutonegMode::Clause73,
            page,
            &[],
            Capabilities::all(),
            OUI,
        )
        .unwrap();
        assert_eq!(speed, PortSpeed::Speed10G);
        assert_eq!(lanes, LaneMode::Single);
    }

    #[test]
    fn test_max_speed_25g_via_next_page_only() {
        let log = test_logger();
        // The base page only advertises 10G-KR; 25G arrives via the
        // extended technology ability page.
        let page =
            base_page::with_ability_field(0, Clause73Ability::KR_10G);
        let next_pages = ext_tech_pages(OUI, true, false);
        let (speed, lanes) = max_speed_ability_and_mode(
            &log,
            AutonegMode::Clause73,
            page,
            &next_pages,
            Capabilities::all(),
            OUI,
        )
        .unwrap();
        assert_eq!(speed, PortSpeed::Speed25G);
        assert_eq!(lanes, LaneMode::Single);
    }

    #[test]
    fn test_max_speed_synthesized_for_empty_base_page() {
        let log = test_logger();
        // A port without 40G/100G support synthesizes a single-lane set.
        let (speed, lanes) = max_speed_ability_and_mode(
            &log,
            AutonegMode::Clause73,
            0,
            &[],
            Capabilities::SPEED_1G
                | Capabilities::SPEED_10G
                | Capabilities::SPEED_25G,
            OUI,
        )
        .unwrap();
        assert_eq!(speed, PortSpeed::Speed25G);
        assert_eq!(lanes, LaneMode::Single);

        // A fully capable port synthesizes the quad set.
        let (speed, lanes) = max_speed_ability_and_mode(
            &log,
            AutonegMode::Clause73,
            0,
            &[],
            Capabilities::all(),
            OUI,
        )
        .unwrap();
        assert_eq!(speed, PortSpeed::Speed100G);
        assert_eq!(lanes, LaneMode::Quad);
    }

    #[test]
    fn test_max_speed_clause37() {
        let log = test_logger();
        for mode in [AutonegMode::Clause37, AutonegMode::Sgmii] {
            let (speed, lanes) = max_speed_ability_and_mode(
                &log,
                mode,
                0,
                &[],
                Capabilities::empty(),
                OUI,
            )
            .unwrap();
            assert_eq!(speed, PortSpeed::Speed1G);
            assert_eq!(lanes, LaneMode::Single);
        }
        assert!(max_speed_ability_and_mode(
            &log,
            AutonegMode::None,
            0,
            &[],
            Capabilities::empty(),
            OUI,
        )
        .is_err());
    }
}
