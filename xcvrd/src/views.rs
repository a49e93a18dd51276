// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Views of internal state for diagnostic consumers.

use std::fmt;

use common::ports::EthMode;
use common::ports::PortId;
use schemars::JsonSchema;
use serde::Serialize;

use crate::transceivers::eeprom::XcvrType;
use crate::transceivers::XcvrInfo;

/// Everything the management engine caches about one port.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct PortDump {
    pub port_id: PortId,
    pub eth_mode: EthMode,
    pub disabled: bool,
    pub an_enabled: bool,
    pub xcvr_type: XcvrType,
    pub cable_length: u32,
    /// The raw module status bits.
    pub mod_state: u32,
    pub present: bool,
    pub eeprom_base_valid: bool,
    pub eeprom_ext_valid: bool,
    /// Remaining background EEPROM read attempts.
    pub eeprom_read_retries: u8,
    /// Remaining background configuration attempts.
    pub config_retries: u8,
    /// The cached EEPROM contents.
    pub eeprom: Vec<u8>,
}

impl PortDump {
    pub(crate) fn new(port_id: PortId, xcvr: &XcvrInfo) -> Self {
        Self {
            port_id,
            eth_mode: xcvr.eth_mode,
            disabled: xcvr.disabled,
            an_enabled: xcvr.an_enabled,
            xcvr_type: xcvr.xcvr_type,
            cable_length: xcvr.cable_length,
            mod_state: xcvr.mod_state.bits(),
            present: xcvr.present,
            eeprom_base_valid: xcvr.eeprom_base_valid,
            eeprom_ext_valid: xcvr.eeprom_ext_valid,
            eeprom_read_retries: xcvr.eeprom_read_retries,
            config_retries: xcvr.config_retries,
            eeprom: xcvr.eeprom.to_vec(),
        }
    }
}

impl fmt::Display for PortDump {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "port           : {}", self.port_id)?;
        writeln!(f, "ethMode        : {}", self.eth_mode)?;
        writeln!(f, "disabled       : {}", self.disabled)?;
        writeln!(f, "anEnabled      : {}", self.an_enabled)?;
        writeln!(f, "transceiverType: {}", self.xcvr_type)?;
        writeln!(f, "cableLength    : {}", self.cable_length)?;
        writeln!(f, "modState       : {:#x}", self.mod_state)?;
        writeln!(f, "present        : {}", self.present)?;
        writeln!(f, "eepromBaseValid: {}", self.eeprom_base_valid)?;
        writeln!(f, "eepromExtValid : {}", self.eeprom_ext_valid)?;
        writeln!(f, "eepromRetries  : {}", self.eeprom_read_retries)?;
        writeln!(f, "configRetries  : {}", self.config_retries)?;
        writeln!(f, "cached EEPROM  :")?;
        for (offset, chunk) in self.eeprom.chunks(16).enumerate() {
            write!(f, "{:04x}:", offset * 16)?;
            for byte in chunk {
                write!(f, " {byte:02x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
