// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Decoding of autonegotiation interrupts into state machine events.
//!
//! Several pending bits may arrive in one interrupt notification; the
//! standard's state ordering dictates the order in which they are replayed
//! to the state machine, so each protocol has a fixed scan order below. A
//! failure aborts the remainder of the chain, but the consumed bits are
//! re-armed in the hardware mask on every path.

use pal::regs::AnIp;
use slog::debug;

use super::sm::AnEvent;
use super::sm::AnSmType;
use crate::types::XcvrdResult;
use crate::Switch;

// Scan order for Clause 73 pending bits.
fn clause73_scan() -> [(AnIp, AnEvent); 7] {
    [
        (AnIp::AN73_ABILITY_DETECT, AnEvent::AbilityDetectInd),
        (AnIp::AN73_ACKNOWLEDGE_DETECT, AnEvent::AckDetectInd),
        (AnIp::AN73_COMPLETE_ACKNOWLEDGE, AnEvent::CompleteAckInd),
        (AnIp::AN73_NEXT_PAGE_WAIT, AnEvent::NextPageWaitInd),
        (AnIp::AN73_AN_GOOD_CHECK, AnEvent::GoodCheckInd),
        (AnIp::AN73_AN_GOOD, AnEvent::GoodInd),
        (AnIp::AN73_TRANSMIT_DISABLE, AnEvent::TransmitDisableInd),
    ]
}

// Scan order for Clause 37 pending bits. The next-page-wait bit has its
// own event here, delivered to the Clause 37 table directly.
fn clause37_scan() -> [(AnIp, AnEvent); 8] {
    [
        (AnIp::AN37_AN_ENABLE, AnEvent::EnableInd),
        (AnIp::AN37_AN_RESTART, AnEvent::RestartInd),
        (AnIp::AN37_AN_DISABLE_LINK_OK, AnEvent::DisableLinkOkInd),
        (AnIp::AN37_ABILITY_DETECT, AnEvent::AbilityDetectInd),
        (AnIp::AN37_COMPLETE_ACKNOWLEDGE, AnEvent::CompleteAckInd),
        (AnIp::AN37_NEXT_PAGE_WAIT, AnEvent::NextPageWaitInd),
        (AnIp::AN37_IDLE_DETECT, AnEvent::IdleDetectInd),
        (AnIp::AN37_LINK_OK, AnEvent::LinkOkInd),
    ]
}

impl Switch {
    /// Process an autonegotiation interrupt for one EPL lane.
    ///
    /// Called from the interrupt service path; must not block on I/O other
    /// than the mask re-arm itself. If no port owns the lane the pending
    /// bits are dropped silently, but the mask is still re-armed.
    pub fn an_event_handler(
        &self,
        epl: u8,
        lane: u8,
        an_ip: AnIp,
    ) -> XcvrdResult<()> {
        if let Some(index) = self.ports.port_for_lane(epl, lane) {
            let port_id = self.ports.port(index).port_id;
            let mut an = self.an_port(index);

            debug!(
                self.log,
                "AN interrupt";
                "port_id" => %port_id,
                "sm_type" => %an.sm_type(),
                "an_ip" => ?an_ip,
            );

            let scan: Vec<(AnIp, AnEvent)> = match an.sm_type() {
                AnSmType::Clause73 => clause73_scan().to_vec(),
                AnSmType::Clause37 => clause37_scan().to_vec(),
                AnSmType::None => Vec::new(),
            };

            for (bit, event) in scan {
                if !an_ip.contains(bit) {
                    continue;
                }
                let sm = an
                    .sm
                    .as_mut()
                    .expect("a bound sm type implies a machine");
                if let Err(e) = sm.notify(&self.log, event) {
                    // Abort the rest of the chain; the mask below is
                    // still re-armed.
                    debug!(
                        self.log,
                        "aborting AN event chain";
                        "port_id" => %port_id,
                        "error" => %e,
                    );
                    break;
                }
            }
        }

        self.regs
            .mask32(pal::regs::an_im(epl, lane), an_ip.bits(), false)?;
        Ok(())
    }
}
