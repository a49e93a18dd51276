// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Per-port autonegotiation state and the driver-facing AN API.
//!
//! Each port carries an [`AnPort`] record alongside its transceiver record:
//! the bound state machine (if any), the configured base page and next
//! pages, the pages received from the link partner, and the attribute
//! values that shape negotiation. The record sits behind its own mutex so
//! the interrupt-path dispatcher can reach it without touching the
//! management task's locks.

use common::ports::AutonegMode;
use common::ports::EthMode;
use common::ports::LaneMode;
use common::ports::PortId;
use common::ports::PortSpeed;
use pal::regs::AnIp;
use slog::debug;

use crate::types::XcvrdError;
use crate::types::XcvrdResult;
use crate::Switch;

pub mod base_page;
mod dispatch;
mod restart;
pub mod hcd;
pub mod sm;
pub mod timer;

pub use sm::AnConfig;
pub use sm::AnEvent;
pub use sm::AnSmType;
pub use sm::AnState;
pub use sm::StateMachine;

/// The most next pages a port may queue for transmission.
pub const MAX_NUM_NEXT_PAGES: usize = 8;

/// An ordered, bounded sequence of 48-bit next-page words.
///
/// Appending a page sets the next-page bit on its predecessor, so every
/// page but the last always carries it.
#[derive(Clone, Debug, Default)]
pub struct NextPages {
    pages: Vec<u64>,
}

impl NextPages {
    /// Append a page, failing with `NoFreeResources` when full.
    pub fn add(&mut self, page: u64) -> XcvrdResult<()> {
        if self.pages.len() >= MAX_NUM_NEXT_PAGES {
            return Err(XcvrdError::NoFreeResources(format!(
                "next page list is limited to {MAX_NUM_NEXT_PAGES} pages"
            )));
        }
        if let Some(last) = self.pages.last_mut() {
            *last |= base_page::NP_BIT;
        }
        self.pages.push(page);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

/// The autonegotiation extension of a port record.
#[derive(Debug)]
pub struct AnPort {
    /// The bound state machine; `None` until the first configuration.
    pub sm: Option<StateMachine>,
    /// The AN interrupt sources currently enabled for the port.
    pub interrupt_mask: AnIp,
    /// The configured autonegotiation protocol.
    pub autoneg_mode: AutonegMode,
    /// The configured Clause 73 base page (or Clause 37 ability word).
    pub base_page: u64,
    /// Next pages queued for transmission.
    pub next_pages: NextPages,
    /// Next pages received from the link partner.
    pub partner_next_pages: NextPages,
    /// Link-fail-inhibit timeout for the KR modes, in milliseconds.
    pub link_inhibit_timer_ms: u32,
    /// Link-fail-inhibit timeout for KX, in milliseconds.
    pub link_inhibit_timer_kx_ms: u32,
    /// Ignore the Clause 73 nonce-match check (loopback support).
    pub ignore_nonce: bool,
    /// Whether the last negotiation concluded with EEE support.
    pub negotiated_eee: bool,
}

impl Default for AnPort {
    fn default() -> Self {
        Self {
            sm: None,
            interrupt_mask: AnIp::empty(),
            autoneg_mode: AutonegMode::None,
            base_page: 0,
            next_pages: NextPages::default(),
            partner_next_pages: NextPages::default(),
            link_inhibit_timer_ms: timer::LINK_INHIBIT_TIMER_DEFAULT_MS,
            link_inhibit_timer_kx_ms: timer::LINK_INHIBIT_TIMER_DEFAULT_KX_MS,
            ignore_nonce: false,
            negotiated_eee: false,
        }
    }
}

impl AnPort {
    /// The type of the bound state machine.
    pub fn sm_type(&self) -> AnSmType {
        self.sm.as_ref().map_or(AnSmType::None, |sm| sm.sm_type())
    }
}

impl Switch {
    /// Validate a Clause 73 base page against the port's capabilities,
    /// returning the page with unsupported abilities cleared.
    pub fn an_validate_base_page(
        &self,
        port_id: PortId,
        mode: AutonegMode,
        base_page: u64,
    ) -> XcvrdResult<u64> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        base_page::validate_base_page(
            &self.log,
            port_id,
            mode,
            self.ports.port(index).capabilities,
            base_page,
        )
    }

    /// Queue a next page for transmission on a port.
    pub fn an_add_next_page(
        &self,
        port_id: PortId,
        page: u64,
    ) -> XcvrdResult<()> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        let mut an = self.an_port(index);
        debug!(
            self.log,
            "queueing next page";
            "port_id" => %port_id,
            "pages" => an.next_pages.len(),
            "page" => format!("{page:#018x}"),
        );
        an.next_pages.add(page)
    }

    /// Record and report whether the link partner advertised EEE for the
    /// negotiated mode.
    pub fn an_verify_eee_negotiation(
        &self,
        port_id: PortId,
        eth_mode: EthMode,
    ) -> XcvrdResult<bool> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        let mut an = self.an_port(index);
        let negotiated = hcd::eee_negotiated(
            &self.log,
            an.autoneg_mode,
            an.partner_next_pages.as_slice(),
            eth_mode,
        );
        an.negotiated_eee = negotiated;
        debug!(
            self.log,
            "EEE {} supported by partner",
            if negotiated { "is" } else { "is not" };
            "port_id" => %port_id,
        );
        Ok(negotiated)
    }

    /// Record the next pages received from the link partner. Called by
    /// the state machine's page-receive path as pages arrive.
    pub fn an_set_partner_next_pages(
        &self,
        port_id: PortId,
        pages: NextPages,
    ) -> XcvrdResult<()> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        self.an_port(index).partner_next_pages = pages;
        Ok(())
    }

    /// The maximum speed the given configuration may negotiate, and the
    /// lane grouping that speed needs.
    pub fn an_get_max_speed_ability_and_mode(
        &self,
        port_id: PortId,
        mode: AutonegMode,
        base_page: u64,
        next_pages: &[u64],
    ) -> XcvrdResult<(PortSpeed, LaneMode)> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        hcd::max_speed_ability_and_mode(
            &self.log,
            mode,
            base_page,
            next_pages,
            self.ports.port(index).capabilities,
            self.config.autoneg_25g_nxt_pg_oui,
        )
    }

    /// Set the Clause 73 link-fail-inhibit timer. Zero selects the
    /// default.
    pub fn an_73_set_link_inhibit_timer(
        &self,
        port_id: PortId,
        timeout_ms: u32,
    ) -> XcvrdResult<()> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        let timeout = timer::checked_inhibit_timeout_ms(
            timeout_ms,
            self.config.an_timer_allow_out_spec,
            timer::LINK_INHIBIT_TIMER_DEFAULT_MS,
        )?;
        self.an_port(index).link_inhibit_timer_ms = timeout;
        Ok(())
    }

    /// Set the Clause 73 link-fail-inhibit timer used for KX. Zero selects
    /// the default.
    pub fn an_73_set_link_inhibit_timer_kx(
        &self,
        port_id: PortId,
        timeout_ms: u32,
    ) -> XcvrdResult<()> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        let timeout = timer::checked_inhibit_timeout_ms(
            timeout_ms,
            self.config.an_timer_allow_out_spec,
            timer::LINK_INHIBIT_TIMER_DEFAULT_KX_MS,
        )?;
        self.an_port(index).link_inhibit_timer_kx_ms = timeout;
        Ok(())
    }

    /// Tell the Clause 73 engine whether to ignore the nonce-match check.
    pub fn an_73_set_ignore_nonce(
        &self,
        port_id: PortId,
        ignore_nonce: bool,
    ) -> XcvrdResult<()> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        let cfg = self.ports.port(index);
        let addr = pal::regs::an_73_cfg(cfg.epl, cfg.intf_type.lane());

        debug!(
            self.log,
            "setting IgnoreNonceMatch";
            "port_id" => %port_id,
            "ignore_nonce" => ignore_nonce,
        );

        // Read-modify-write under the register lock; the guard covers the
        // whole sequence including the error paths.
        {
            let _reg = self.reg_lock.lock().unwrap();
            let mut an_cfg = self.regs.read32(addr)?;
            if ignore_nonce {
                an_cfg |= pal::regs::AN_73_CFG_IGNORE_NONCE_MATCH;
            } else {
                an_cfg &= !pal::regs::AN_73_CFG_IGNORE_NONCE_MATCH;
            }
            self.regs.write32(addr, an_cfg)?;
        }

        self.an_port(index).ignore_nonce = ignore_nonce;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_page_bit_maintenance() {
        let mut pages = NextPages::default();
        pages.add(0x0005).unwrap();
        pages.add(0x0a0a).unwrap();
        pages.add(0x1111).unwrap();

        let words = pages.as_slice();
        assert_eq!(words.len(), 3);
        // Every page but the last carries the NP bit.
        assert!(words[0] & base_page::NP_BIT != 0);
        assert!(words[1] & base_page::NP_BIT != 0);
        assert!(words[2] & base_page::NP_BIT == 0);
    }

    #[test]
    fn test_next_pages_bounded() {
        let mut pages = NextPages::default();
        for i in 0..MAX_NUM_NEXT_PAGES {
            pages.add(i as u64).unwrap();
        }
        assert!(matches!(
            pages.add(0xdead),
            Err(XcvrdError::NoFreeResources(_))
        ));
        assert_eq!(pages.len(), MAX_NUM_NEXT_PAGES);
    }

    #[test]
    fn test_an_port_defaults() {
        let an = AnPort::default();
        assert_eq!(an.sm_type(), AnSmType::None);
        assert_eq!(an.autoneg_mode, AutonegMode::None);
        assert_eq!(an.interrupt_mask, AnIp::empty());
        assert_eq!(
            an.link_inhibit_timer_ms,
            timer::LINK_INHIBIT_TIMER_DEFAULT_MS
        );
        assert_eq!(
            an.link_inhibit_timer_kx_ms,
            timer::LINK_INHIBIT_TIMER_DEFAULT_KX_MS
        );
    }
}
