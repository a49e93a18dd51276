// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Restarting autonegotiation when its configuration changes.
//!
//! Switching between Clause 73 and Clause 37 on a live port must pass
//! through a disable of the running machine before a new one is bound.
//! [`Switch::an_restart_on_new_config`] is the single entry point enforcing
//! that; nothing else writes a port's bound state machine.

use common::ports::AutonegMode;
use common::ports::EthMode;
use common::ports::PortId;
use pal::regs::AnIp;
use slog::debug;

use super::sm::AnConfig;
use super::sm::AnEvent;
use super::sm::AnSmType;
use super::sm::StateMachine;
use super::AnPort;
use super::NextPages;
use crate::port_map::PortIndex;
use crate::types::XcvrdError;
use crate::types::XcvrdResult;
use crate::Switch;

impl Switch {
    /// Whether a port is configured so autonegotiation can start, and the
    /// state machine type its protocol calls for.
    ///
    /// Clause 73 requires the port to sit in the `An73` holding mode;
    /// Clause 37 and SGMII require a 1G SerDes mode.
    pub(crate) fn is_port_autoneg_ready(
        &self,
        index: PortIndex,
        eth_mode: EthMode,
        an_mode: AutonegMode,
    ) -> (bool, AnSmType) {
        match an_mode {
            AutonegMode::Clause73 => {
                (eth_mode == EthMode::An73, AnSmType::Clause73)
            }
            AutonegMode::Clause37 | AutonegMode::Sgmii => (
                matches!(eth_mode, EthMode::Base1000X | EthMode::Sgmii),
                AnSmType::Clause37,
            ),
            AutonegMode::None => (false, self.an_port(index).sm_type()),
        }
    }

    /// Deliver a configuration event to a port's bound state machine.
    pub(crate) fn an_send_config_event(
        &self,
        port_id: PortId,
        an: &mut AnPort,
        event: AnEvent,
    ) -> XcvrdResult<()> {
        let sm = an
            .sm
            .as_mut()
            .ok_or(XcvrdError::StateMachineHandle(port_id))?;
        sm.notify(&self.log, event)
    }

    /// Rebind and restart autonegotiation for a new configuration.
    ///
    /// If the port is not ready for the requested protocol this returns
    /// without touching any state. Otherwise: an existing machine of the
    /// wrong type is sent a disable event carrying the configuration being
    /// torn down and replaced with a fresh machine in `Disabled`; the AN
    /// interrupt mask is retargeted for the protocol; and a config event
    /// carrying the new settings starts negotiation.
    pub fn an_restart_on_new_config(
        &self,
        port_id: PortId,
        eth_mode: EthMode,
        an_mode: AutonegMode,
        base_page: u64,
        next_pages: NextPages,
    ) -> XcvrdResult<()> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;

        let (ready, new_sm_type) =
            self.is_port_autoneg_ready(index, eth_mode, an_mode);
        if !ready {
            return Ok(());
        }

        let mut an = self.an_port(index);

        if new_sm_type != an.sm_type() {
            if an.sm_type() != AnSmType::None {
                // Disable the outgoing machine with the configuration it
                // was running, not the one we are about to apply.
                let old_config = AnConfig {
                    mode: an.autoneg_mode,
                    base_page: an.base_page,
                    next_pages: an.next_pages.clone(),
                };
                self.an_send_config_event(
                    port_id,
                    &mut an,
                    AnEvent::DisableReq(old_config),
                )?;
            }
            an.sm = Some(StateMachine::start(new_sm_type));
        }

        an.interrupt_mask = match an_mode {
            AutonegMode::Clause73 => AnIp::AN73_INT_MASK,
            AutonegMode::Clause37 | AutonegMode::Sgmii => AnIp::AN37_INT_MASK,
            AutonegMode::None => unreachable!("filtered by readiness check"),
        };

        debug!(
            self.log,
            "restarting autonegotiation";
            "port_id" => %port_id,
            "an_mode" => ?an_mode,
            "interrupt_mask" => format!("{:#010x}", an.interrupt_mask.bits()),
        );

        an.autoneg_mode = an_mode;
        an.base_page = base_page;
        an.next_pages = next_pages.clone();

        let new_config = AnConfig {
            mode: an_mode,
            base_page,
            next_pages,
        };
        self.an_send_config_event(
            port_id,
            &mut an,
            AnEvent::ConfigReq(new_config),
        )
    }
}
