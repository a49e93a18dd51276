// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Decoding of cached transceiver EEPROM contents.
//!
//! SFP+ modules follow the SFF-8472 memory map, QSFP modules the
//! SFF-8436/SFF-8636 map. Everything here operates on the raw byte cache
//! held in the per-port transceiver record; no I/O happens in this module.

use std::fmt;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Size of the per-port EEPROM cache, covering the full lower device.
pub const EEPROM_CACHE_SIZE: usize = 256;

// SFF-8472 identifiers.
const ID_SFP: u8 = 0x03;
// SFF-8436 / SFF-8636 identifiers.
const ID_QSFP: u8 = 0x0c;
const ID_QSFP_PLUS: u8 = 0x0d;
const ID_QSFP28: u8 = 0x11;

// SFF-8472 field offsets.
const SFP_COMPLIANCE_10G: usize = 3;
const SFP_COMPLIANCE_SONET: usize = 6;
const SFP_CABLE_TECH: usize = 8;
const SFP_LENGTH_COPPER: usize = 18;
const SFP_OPTIONS: usize = 65;
const SFP_CC_BASE: usize = 63;
const SFP_CC_EXT: usize = 95;

// SFF-8636 field offsets.
const QSFP_COMPLIANCE: usize = 131;
const QSFP_LENGTH_COPPER: usize = 146;
const QSFP_DEVICE_TECH: usize = 147;
const QSFP_EXT_COMPLIANCE: usize = 192;
const QSFP_CC_BASE: usize = 191;
const QSFP_CC_EXT: usize = 223;

/// The identity of a transceiver module, derived from its EEPROM.
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
pub enum XcvrType {
    /// No module is seated in the cage.
    #[default]
    NotPresent,
    /// A module is present but its EEPROM could not be read or decoded.
    Unknown,
    Sfp1000BaseT,
    Sfp1000BaseSx,
    Sfp1000BaseLx,
    Sfp10GSr,
    Sfp10GLr,
    SfpDac,
    SfpAoc,
    Qsfp40GSr4,
    Qsfp40GLr4,
    Qsfp40GDac,
    Qsfp100GSr4,
    Qsfp100GLr4,
    Qsfp100GDac,
    Qsfp100GAoc,
}

impl XcvrType {
    /// True for cable assemblies whose length field is meaningful.
    pub fn is_cable(&self) -> bool {
        matches!(
            self,
            XcvrType::SfpDac
                | XcvrType::SfpAoc
                | XcvrType::Qsfp40GDac
                | XcvrType::Qsfp100GDac
                | XcvrType::Qsfp100GAoc
        )
    }
}

impl fmt::Display for XcvrType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            XcvrType::NotPresent => "NOT_PRESENT",
            XcvrType::Unknown => "UNKNOWN",
            XcvrType::Sfp1000BaseT => "SFP_1000BASE_T",
            XcvrType::Sfp1000BaseSx => "SFP_1000BASE_SX",
            XcvrType::Sfp1000BaseLx => "SFP_1000BASE_LX",
            XcvrType::Sfp10GSr => "SFP_10G_SR",
            XcvrType::Sfp10GLr => "SFP_10G_LR",
            XcvrType::SfpDac => "SFP_DAC",
            XcvrType::SfpAoc => "SFP_AOC",
            XcvrType::Qsfp40GSr4 => "QSFP_40G_SR4",
            XcvrType::Qsfp40GLr4 => "QSFP_40G_LR4",
            XcvrType::Qsfp40GDac => "QSFP_40G_DAC",
            XcvrType::Qsfp100GSr4 => "QSFP_100G_SR4",
            XcvrType::Qsfp100GLr4 => "QSFP_100G_LR4",
            XcvrType::Qsfp100GDac => "QSFP_100G_DAC",
            XcvrType::Qsfp100GAoc => "QSFP_100G_AOC",
        };
        write!(f, "{name}")
    }
}

fn is_sfp(eeprom: &[u8]) -> bool {
    eeprom[0] == ID_SFP
}

fn is_qsfp(eeprom: &[u8]) -> bool {
    matches!(eeprom[0], ID_QSFP | ID_QSFP_PLUS | ID_QSFP28)
}

// The check codes are the low eight bits of the sum of the bytes they cover.
fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().copied().map(u32::from).sum();
    (sum & 0xff) as u8
}

/// Validate the base-section check code (CC_BASE).
pub fn is_base_csum_valid(eeprom: &[u8]) -> bool {
    if eeprom.len() < EEPROM_CACHE_SIZE {
        return false;
    }
    if is_sfp(eeprom) {
        checksum(&eeprom[0..SFP_CC_BASE]) == eeprom[SFP_CC_BASE]
    } else if is_qsfp(eeprom) {
        checksum(&eeprom[128..QSFP_CC_BASE]) == eeprom[QSFP_CC_BASE]
    } else {
        false
    }
}

/// Validate the extended-section check code (CC_EXT).
pub fn is_ext_csum_valid(eeprom: &[u8]) -> bool {
    if eeprom.len() < EEPROM_CACHE_SIZE {
        return false;
    }
    if is_sfp(eeprom) {
        checksum(&eeprom[64..SFP_CC_EXT]) == eeprom[SFP_CC_EXT]
    } else if is_qsfp(eeprom) {
        checksum(&eeprom[192..QSFP_CC_EXT]) == eeprom[QSFP_CC_EXT]
    } else {
        false
    }
}

fn sfp_type(eeprom: &[u8]) -> XcvrType {
    // Cable assemblies first: byte 8 distinguishes passive and active.
    if eeprom[SFP_CABLE_TECH] & 0x04 != 0 {
        return XcvrType::SfpDac;
    }
    if eeprom[SFP_CABLE_TECH] & 0x08 != 0 {
        return XcvrType::SfpAoc;
    }
    let ten_g = eeprom[SFP_COMPLIANCE_10G];
    if ten_g & 0x10 != 0 {
        return XcvrType::Sfp10GSr;
    }
    if ten_g & 0x20 != 0 {
        return XcvrType::Sfp10GLr;
    }
    let one_g = eeprom[SFP_COMPLIANCE_SONET];
    if one_g & 0x08 != 0 {
        return XcvrType::Sfp1000BaseT;
    }
    if one_g & 0x01 != 0 {
        return XcvrType::Sfp1000BaseSx;
    }
    if one_g & 0x02 != 0 {
        return XcvrType::Sfp1000BaseLx;
    }
    XcvrType::Unknown
}

fn qsfp_type(eeprom: &[u8]) -> XcvrType {
    if eeprom[0] == ID_QSFP28 {
        return match eeprom[QSFP_EXT_COMPLIANCE] {
            0x01 | 0x18 => XcvrType::Qsfp100GAoc,
            0x02 => XcvrType::Qsfp100GSr4,
            0x03 => XcvrType::Qsfp100GLr4,
            0x0b => XcvrType::Qsfp100GDac,
            _ => XcvrType::Unknown,
        };
    }
    // A transmitter-technology nibble of 0b1010 or above means copper.
    if eeprom[QSFP_DEVICE_TECH] >> 4 >= 0x0a {
        return XcvrType::Qsfp40GDac;
    }
    let compliance = eeprom[QSFP_COMPLIANCE];
    if compliance & 0x04 != 0 {
        return XcvrType::Qsfp40GSr4;
    }
    if compliance & 0x02 != 0 {
        return XcvrType::Qsfp40GLr4;
    }
    XcvrType::Unknown
}

/// Identify the module from a cache whose base checksum already passed.
pub fn get_type(eeprom: &[u8]) -> XcvrType {
    if is_sfp(eeprom) {
        sfp_type(eeprom)
    } else if is_qsfp(eeprom) {
        qsfp_type(eeprom)
    } else {
        XcvrType::Unknown
    }
}

/// The cable length in metres; 0 for optical modules and unknown types.
pub fn get_length(eeprom: &[u8]) -> u32 {
    match get_type(eeprom) {
        XcvrType::SfpDac | XcvrType::SfpAoc => {
            u32::from(eeprom[SFP_LENGTH_COPPER])
        }
        XcvrType::Qsfp40GDac
        | XcvrType::Qsfp100GDac
        | XcvrType::Qsfp100GAoc => u32::from(eeprom[QSFP_LENGTH_COPPER]),
        _ => 0,
    }
}

/// True for copper SFP modules carrying a 1000BASE-T PHY.
pub fn is_1000base_t(eeprom: &[u8]) -> bool {
    is_sfp(eeprom) && eeprom[SFP_COMPLIANCE_SONET] & 0x08 != 0
}

/// True for SFP+ modules implementing rate select, i.e. able to run at
/// either 1G or 10G (SFF-8472 table 3.17).
pub fn is_10g1g_dual_rate(eeprom: &[u8]) -> bool {
    is_sfp(eeprom) && eeprom[SFP_OPTIONS] & 0x20 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalize_sfp(mut map: [u8; EEPROM_CACHE_SIZE]) -> [u8; EEPROM_CACHE_SIZE] {
        map[SFP_CC_BASE] = checksum(&map[0..SFP_CC_BASE]);
        map[SFP_CC_EXT] = checksum(&map[64..SFP_CC_EXT]);
        map
    }

    fn sfp_sr() -> [u8; EEPROM_CACHE_SIZE] {
        let mut map = [0u8; EEPROM_CACHE_SIZE];
        map[0] = ID_SFP;
        map[SFP_COMPLIANCE_10G] = 0x10;
        finalize_sfp(map)
    }

    fn sfp_copper_t() -> [u8; EEPROM_CACHE_SIZE] {
        let mut map = [0u8; EEPROM_CACHE_SIZE];
        map[0] = ID_SFP;
        map[SFP_COMPLIANCE_SONET] = 0x08;
        finalize_sfp(map)
    }

    fn qsfp28_dac(len: u8) -> [u8; EEPROM_CACHE_SIZE] {
        let mut map = [0u8; EEPROM_CACHE_SIZE];
        map[0] = ID_QSFP28;
        map[128] = ID_QSFP28;
        map[QSFP_EXT_COMPLIANCE] = 0x0b;
        map[QSFP_LENGTH_COPPER] = len;
        map[QSFP_CC_BASE] = checksum(&map[128..QSFP_CC_BASE]);
        map[QSFP_CC_EXT] = checksum(&map[192..QSFP_CC_EXT]);
        map
    }

    #[test]
    fn test_checksums() {
        let map = sfp_sr();
        assert!(is_base_csum_valid(&map));
        assert!(is_ext_csum_valid(&map));

        let mut corrupt = map;
        corrupt[10] ^= 0xff;
        assert!(!is_base_csum_valid(&corrupt));
        assert!(is_ext_csum_valid(&corrupt));
    }

    #[test]
    fn test_sfp_identification() {
        let map = sfp_sr();
        assert_eq!(get_type(&map), XcvrType::Sfp10GSr);
        assert_eq!(get_length(&map), 0);
        assert!(!is_1000base_t(&map));
        assert!(!is_10g1g_dual_rate(&map));
    }

    #[test]
    fn test_copper_sfp() {
        let map = sfp_copper_t();
        assert_eq!(get_type(&map), XcvrType::Sfp1000BaseT);
        assert!(is_1000base_t(&map));
    }

    #[test]
    fn test_dual_rate_option_bit() {
        let mut map = [0u8; EEPROM_CACHE_SIZE];
        map[0] = ID_SFP;
        map[SFP_COMPLIANCE_10G] = 0x10;
        map[SFP_OPTIONS] = 0x20;
        let map = finalize_sfp(map);
        assert!(is_10g1g_dual_rate(&map));
    }

    #[test]
    fn test_qsfp28_dac() {
        let map = qsfp28_dac(3);
        assert!(is_base_csum_valid(&map));
        assert!(is_ext_csum_valid(&map));
        assert_eq!(get_type(&map), XcvrType::Qsfp100GDac);
        assert_eq!(get_length(&map), 3);
        assert!(get_type(&map).is_cable());
    }

    #[test]
    fn test_unidentifiable_module() {
        let map = [0u8; EEPROM_CACHE_SIZE];
        assert_eq!(get_type(&map), XcvrType::Unknown);
        assert!(!is_base_csum_valid(&map));
        assert_eq!(get_length(&map), 0);
    }
}
