// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Clause 73 base-page and next-page encodings.
//!
//! A Clause 73 base page is a 48-bit word carried here in a `u64`: selector
//! in D[4:0], echoed and transmitted nonces, the technology ability field in
//! D[45:21], and FEC bits at the top. Next pages carry an 11-bit message
//! code in D[10:0] and the next-page bit at D15; an OUI-tagged message page
//! is followed by an unformatted page whose low nine bits identify the
//! message (per IEEE Annex 28C).

use bitflags::bitflags;
use common::ports::AutonegMode;
use common::ports::Capabilities;
use common::ports::PortId;
use slog::debug;
use slog::error;
use slog::Logger;

use crate::types::XcvrdError;
use crate::types::XcvrdResult;

/// Bit position of the technology ability field in the base page.
pub const ABILITY_SHIFT: u32 = 21;
/// Width of the technology ability field.
pub const ABILITY_WIDTH: u32 = 25;

/// The next-page bit, set on every page of a sequence except the last.
pub const NP_BIT: u64 = 1 << 15;

/// Message code of an OUI-tagged message next page.
pub const OUI_MSG_CODE: u16 = 0x5;
/// Message code of the EEE technology message next page.
pub const EEE_MSG_CODE: u16 = 0xa;

/// Unformatted-page code of the extended technology ability message.
pub const EXT_TECH_ABILITY_CODE: u16 = 0x3;

/// EEE support bits inside an EEE message next page.
pub const EEE_1000BASE_KX: u64 = 1 << 20;
pub const EEE_10GBASE_KR: u64 = 1 << 22;

/// 25G support bits inside the extended-technology-ability unformatted page.
pub const EXT_TECH_25G_CR1: u64 = 1 << 20;
pub const EXT_TECH_25G_KR1: u64 = 1 << 21;

bitflags! {
    /// The Clause 73 technology ability bits, numbered per IEEE table 73-4.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Clause73Ability: u32 {
        const KX_1G = 1 << 0;
        const KX4_10G = 1 << 1;
        const KR_10G = 1 << 2;
        const KR4_40G = 1 << 3;
        const CR4_40G = 1 << 4;
        const CR10_100G = 1 << 5;
        const KP4_100G = 1 << 6;
        const KR4_100G = 1 << 7;
        const CR4_100G = 1 << 8;
        const KR_25G = 1 << 9;
        const CR_25G = 1 << 10;
    }
}

impl Clause73Ability {
    /// The abilities this switch can negotiate.
    pub const SUPPORTED: Clause73Ability = Clause73Ability::KX_1G
        .union(Clause73Ability::KR_10G)
        .union(Clause73Ability::KR_25G)
        .union(Clause73Ability::CR_25G)
        .union(Clause73Ability::KR4_40G)
        .union(Clause73Ability::CR4_40G)
        .union(Clause73Ability::KR4_100G)
        .union(Clause73Ability::CR4_100G);

    pub const ABILITIES_25G: Clause73Ability =
        Clause73Ability::KR_25G.union(Clause73Ability::CR_25G);

    pub const ABILITIES_40G: Clause73Ability =
        Clause73Ability::KR4_40G.union(Clause73Ability::CR4_40G);

    pub const ABILITIES_100G: Clause73Ability = Clause73Ability::CR10_100G
        .union(Clause73Ability::KP4_100G)
        .union(Clause73Ability::KR4_100G)
        .union(Clause73Ability::CR4_100G);
}

/// Extract the technology ability field from a base page.
pub fn ability_field(base_page: u64) -> Clause73Ability {
    let mask = (1u64 << ABILITY_WIDTH) - 1;
    Clause73Ability::from_bits_truncate(
        ((base_page >> ABILITY_SHIFT) & mask) as u32,
    )
}

/// Replace the technology ability field of a base page.
pub fn with_ability_field(base_page: u64, ability: Clause73Ability) -> u64 {
    let mask = ((1u64 << ABILITY_WIDTH) - 1) << ABILITY_SHIFT;
    (base_page & !mask) | (u64::from(ability.bits()) << ABILITY_SHIFT)
}

/// The message code of a message next page.
pub fn message_code(page: u64) -> u16 {
    (page & 0x7ff) as u16
}

/// The code in the low nine bits of an unformatted next page.
pub fn unformatted_code(page: u64) -> u16 {
    (page & 0x1ff) as u16
}

/// Validate a Clause 73 base page against a port's capabilities.
///
/// Ability bits outside the supported set are masked off with a debug log.
/// If nothing supported remains, or a remaining bit advertises a speed the
/// port cannot run, the page is rejected. The cleaned ability field is
/// written back into the returned page. An all-zero ability field passes
/// through untouched: the base page may legitimately be configured before
/// the ethernet mode, and cannot be validated until then.
pub fn validate_base_page(
    log: &Logger,
    port_id: PortId,
    mode: AutonegMode,
    capabilities: Capabilities,
    base_page: u64,
) -> XcvrdResult<u64> {
    if mode != AutonegMode::Clause73 {
        return Ok(base_page);
    }

    let mut ability = ability_field(base_page);
    if ability.is_empty() {
        return Ok(base_page);
    }

    let unsupported = ability & !Clause73Ability::SUPPORTED;
    if !unsupported.is_empty() {
        debug!(
            log,
            "unsupported Clause 73 abilities configured";
            "port_id" => %port_id,
            "unsupported" => ?unsupported,
        );
    }
    ability &= Clause73Ability::SUPPORTED;

    if ability.is_empty() {
        error!(
            log,
            "no supported Clause 73 abilities configured";
            "port_id" => %port_id,
        );
        return Err(XcvrdError::Unsupported(format!(
            "no supported Clause 73 abilities on port {port_id}"
        )));
    }

    let speed_checks = [
        (Clause73Ability::KX_1G, Capabilities::SPEED_1G, "1G-KX", "1G"),
        (
            Clause73Ability::KR_10G,
            Capabilities::SPEED_10G,
            "10G-KR",
            "10G",
        ),
        (
            Clause73Ability::ABILITIES_25G,
            Capabilities::SPEED_25G,
            "25G-CR/KR",
            "25G",
        ),
        (
            Clause73Ability::KR4_40G,
            Capabilities::SPEED_40G,
            "40G-KR4",
            "40G",
        ),
        (
            Clause73Ability::CR4_40G,
            Capabilities::SPEED_40G,
            "40G-CR4",
            "40G",
        ),
        (
            Clause73Ability::KR4_100G,
            Capabilities::SPEED_100G,
            "100G-KR4",
            "100G",
        ),
        (
            Clause73Ability::CR4_100G,
            Capabilities::SPEED_100G,
            "100G-CR4",
            "100G",
        ),
    ];
    for (bits, cap, tech, speed) in speed_checks {
        if ability.intersects(bits) && !capabilities.contains(cap) {
            error!(
                log,
                "request to advertise {tech} but port does not support \
                 {speed} speed";
                "port_id" => %port_id,
            );
            return Err(XcvrdError::Unsupported(format!(
                "port {port_id} cannot advertise {tech}: no {speed} support"
            )));
        }
    }

    Ok(with_ability_field(base_page, ability))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn page_with(ability: Clause73Ability) -> u64 {
        with_ability_field(0x1001, ability)
    }

    const ALL_SPEEDS: Capabilities = Capabilities::all();

    #[test]
    fn test_ability_field_round_trip() {
        let ability = Clause73Ability::KR_10G | Clause73Ability::CR4_100G;
        let page = with_ability_field(0xffff_ffff_ffff_ffff, ability);
        assert_eq!(ability_field(page), ability);
        // The bits outside the ability field are untouched.
        assert_eq!(page & 0x1f_ffff, 0x1f_ffff);
    }

    #[test]
    fn test_validate_masks_unsupported() {
        let log = test_logger();
        let page =
            page_with(Clause73Ability::KR_10G | Clause73Ability::KX4_10G);
        let out = validate_base_page(
            &log,
            PortId(1),
            AutonegMode::Clause73,
            ALL_SPEEDS,
            page,
        )
        .unwrap();
        assert_eq!(ability_field(out), Clause73Ability::KR_10G);
    }

    #[test]
    fn test_validate_rejects_unsupported_only() {
        let log = test_logger();
        let page =
            page_with(Clause73Ability::KX4_10G | Clause73Ability::KP4_100G);
        let err = validate_base_page(
            &log,
            PortId(1),
            AutonegMode::Clause73,
            ALL_SPEEDS,
            page,
        )
        .unwrap_err();
        assert!(matches!(err, XcvrdError::Unsupported(_)));
    }

    #[test]
    fn test_validate_rejects_speed_beyond_port() {
        let log = test_logger();
        let page = page_with(Clause73Ability::CR4_100G);
        let err = validate_base_page(
            &log,
            PortId(9),
            AutonegMode::Clause73,
            Capabilities::SPEED_1G | Capabilities::SPEED_10G,
            page,
        )
        .unwrap_err();
        assert!(matches!(err, XcvrdError::Unsupported(_)));
    }

    #[test]
    fn test_validate_is_idempotent() {
        let log = test_logger();
        let page = page_with(
            Clause73Ability::KR_10G
                | Clause73Ability::KX_1G
                | Clause73Ability::CR10_100G,
        );
        let once = validate_base_page(
            &log,
            PortId(3),
            AutonegMode::Clause73,
            ALL_SPEEDS,
            page,
        )
        .unwrap();
        let twice = validate_base_page(
            &log,
            PortId(3),
            AutonegMode::Clause73,
            ALL_SPEEDS,
            once,
        )
        .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_validate_ignores_other_modes() {
        let log = test_logger();
        let page = page_with(Clause73Ability::KX4_10G);
        let out = validate_base_page(
            &log,
            PortId(2),
            AutonegMode::Clause37,
            Capabilities::empty(),
            page,
        )
        .unwrap();
        assert_eq!(out, page);
    }

    #[test]
    fn test_empty_ability_passes_through() {
        let log = test_logger();
        let out = validate_base_page(
            &log,
            PortId(2),
            AutonegMode::Clause73,
            Capabilities::empty(),
            0,
        )
        .unwrap();
        assert_eq!(out, 0);
    }
}
