// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Transceiver state tracking and the management task.
//!
//! One long-lived task per switch reconciles the module status bits the
//! board library reports with the cached per-port records, reads and
//! validates module EEPROMs, applies SerDes and SFP+ rate configuration,
//! and notifies the upper layers about changes. The task wakes on the
//! management interrupt (signalled from ISR context) or on the configured
//! poll period; transient I²C failures are retried across poll cycles with
//! bounded counters rather than timers.
//!
//! Lock order within a sweep: the transceiver table first (the switch
//! protection token, taken with `try_lock` so a busy table just defers the
//! sweep), then the I²C bus lock around each platform I/O sequence. The
//! bus lock is scoped so it is released on every path, including a failed
//! mux select.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::ports::AutonegMode;
use common::ports::EthMode;
use common::ports::PortId;
use pal::BusKind;
use pal::GpioDirection;
use pal::GpioIntrMode;
use pal::PalCapabilities;
use pal::XcvrState;
use slog::error;
use slog::info;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::events::EventLanes;
use crate::events::XcvrChange;
use crate::events::XcvrSignals;
use crate::events::XcvrStateEvent;
use crate::mod_debug;
use crate::port_map::IntfType;
use crate::port_map::PortIndex;
use crate::types::XcvrdError;
use crate::types::XcvrdResult;
use crate::views;
use crate::Switch;

pub mod eeprom;

use eeprom::XcvrType;
use eeprom::EEPROM_CACHE_SIZE;

/// EEPROM read attempts per module insertion before giving up.
pub const MAX_EEPROM_READ_RETRY: u8 = 4;
/// SFP+ configuration attempts before giving up.
pub const MAX_CONFIG_RETRY: u8 = 4;

/// One port's transceiver record.
#[derive(Clone, Debug)]
pub struct XcvrInfo {
    /// The raw status bits last read from the board library.
    pub mod_state: XcvrState,
    /// Mirror of the PRESENT bit.
    pub present: bool,
    /// The current negotiated or administratively set ethernet mode.
    pub eth_mode: EthMode,
    /// Whether 1000BASE-T autonegotiation is enabled in the module's PHY.
    pub an_enabled: bool,
    /// The module identity parsed from its EEPROM.
    pub xcvr_type: XcvrType,
    /// Cable length in metres; zero for optical modules.
    pub cable_length: u32,
    /// The last EEPROM dump; all 0xFF while no module is present.
    pub eeprom: [u8; EEPROM_CACHE_SIZE],
    pub eeprom_base_valid: bool,
    pub eeprom_ext_valid: bool,
    /// Remaining background EEPROM read attempts.
    pub eeprom_read_retries: u8,
    /// Remaining background configuration attempts.
    pub config_retries: u8,
    /// Administrative disable.
    pub disabled: bool,
}

impl XcvrInfo {
    pub(crate) fn new(eth_mode: EthMode) -> Self {
        Self {
            mod_state: XcvrState::empty(),
            present: false,
            eth_mode,
            an_enabled: false,
            xcvr_type: XcvrType::NotPresent,
            cable_length: 0,
            eeprom: [0xff; EEPROM_CACHE_SIZE],
            eeprom_base_valid: false,
            eeprom_ext_valid: false,
            eeprom_read_retries: 0,
            config_retries: 0,
            disabled: false,
        }
    }

    // Wipe everything derived from a previously present module.
    fn clear_module_state(&mut self) {
        self.xcvr_type = XcvrType::NotPresent;
        self.cable_length = 0;
        self.eeprom_base_valid = false;
        self.eeprom_ext_valid = false;
        self.eeprom_read_retries = 0;
        self.eeprom = [0xff; EEPROM_CACHE_SIZE];
    }

    fn is_1000base_t(&self) -> bool {
        self.eeprom_base_valid && eeprom::is_1000base_t(&self.eeprom)
    }

    fn is_dual_rate(&self) -> bool {
        self.eeprom_base_valid && eeprom::is_10g1g_dual_rate(&self.eeprom)
    }
}

/// Wake and gating state for the management task.
#[derive(Debug, Default)]
pub(crate) struct MgmtState {
    /// Signalled by the interrupt handler and by explicit polling
    /// requests.
    pub(crate) wake: Notify,
    /// Set when a caller has scheduled background work for the next wake.
    polling_pending: AtomicBool,
    /// Management stays inert until the enable-interrupt step completes
    /// its forced sweep.
    enabled: AtomicBool,
}

impl Switch {
    /// Whether the driver has Clause 37 or SGMII autonegotiation
    /// configured on a port.
    fn is_port_an_enabled(&self, index: PortIndex) -> bool {
        matches!(
            self.an_port(index).autoneg_mode,
            AutonegMode::Sgmii | AutonegMode::Clause37
        )
    }

    fn notify_api(&self, change: XcvrChange) {
        if let Some(tx) = self.xcvr_change_tx.lock().unwrap().as_ref() {
            let _ = tx.send(change);
        }
    }

    fn notify_app(&self, event: XcvrStateEvent) {
        if let Some(tx) = self.xcvr_event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// The main loop of the management task.
    pub(crate) async fn mgmt_main(self: Arc<Self>) {
        let poll_period = self
            .config
            .xcvr_poll_period
            .unwrap_or(Duration::from_secs(1));
        // Without an interrupt GPIO the task polls unconditionally.
        let poll_xcvr_status = self.config.gpio_port_intr.is_none();

        info!(
            self.log,
            "management task starting";
            "poll_period" => ?poll_period,
            "poll_xcvr_status" => poll_xcvr_status,
        );

        loop {
            // An elapsed timeout means poll; a wake-up means interrupt or
            // an explicitly scheduled task.
            let interrupt =
                timeout(poll_period, self.mgmt.wake.notified()).await.is_ok();

            // Don't start before the switch is brought up.
            if !self.mgmt.enabled.load(Ordering::SeqCst) {
                continue;
            }

            // The switch protection token; contention just defers the
            // sweep to the next wake.
            let Ok(mut xcvrs) = self.xcvrs.try_lock() else {
                continue;
            };

            if !interrupt || self.mgmt.polling_pending.load(Ordering::SeqCst)
            {
                self.mgmt.polling_pending.store(false, Ordering::SeqCst);
                self.retry_eeprom_read(&mut xcvrs).await;
                self.retry_config(&mut xcvrs).await;
            }

            if interrupt || poll_xcvr_status {
                self.update_state(&mut xcvrs, false, interrupt).await;
            }
        }
    }

    /// One-time synchronous sweep run at switch initialization: reset every
    /// record, read module status, and read the EEPROM of every module that
    /// is already present and enabled.
    pub async fn mgmt_xcvr_initialize(&self) -> XcvrdResult<()> {
        let mut xcvrs = self.xcvrs.lock().await;

        let mut hw_res_ids = Vec::new();
        let mut indices = Vec::new();
        for (index, cfg) in self.ports.iter() {
            xcvrs[index.0] = XcvrInfo::new(cfg.eth_mode);

            if !self
                .platform
                .capabilities()
                .contains(PalCapabilities::XCVR_STATE)
                || !cfg.intf_type.has_xcvr()
            {
                continue;
            }
            hw_res_ids.push(cfg.hw_res_id);
            indices.push(index);
        }

        if indices.is_empty() {
            mod_debug!(self, MOD_STATE, "no port to process");
            return Ok(());
        }

        let entries = {
            let _bus = self.i2c_lock.lock().await;
            if self
                .platform
                .capabilities()
                .contains(PalCapabilities::SELECT_BUS)
            {
                if let Err(e) =
                    self.platform.select_bus(BusKind::XcvrState, hw_res_ids[0])
                {
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "failed to select transceiver bus";
                        "error" => %e,
                    );
                    return Err(e.into());
                }
            }
            self.platform.get_port_xcvr_state(&hw_res_ids)
        };
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                mod_debug!(
                    self,
                    MOD_STATE,
                    "failed to read transceiver state";
                    "error" => %e,
                );
                return Err(e.into());
            }
        };

        for (&index, entry) in indices.iter().zip(entries.iter()) {
            let port_id = self.ports.port(index).port_id;
            xcvrs[index.0].mod_state = entry.state;

            let present = entry.valid.contains(XcvrState::PRESENT)
                && entry.state.contains(XcvrState::PRESENT);
            xcvrs[index.0].present = present;
            mod_debug!(
                self,
                MOD_STATE,
                "module {}", if present { "PRESENT" } else { "NOT_PRESENT" };
                "port_id" => %port_id,
            );

            if entry.valid.contains(XcvrState::ENABLE)
                && entry.state.contains(XcvrState::ENABLE)
                && present
            {
                mod_debug!(
                    self,
                    MOD_STATE,
                    "module is ENABLED";
                    "port_id" => %port_id,
                );
                let _ = self
                    .read_and_validate_eeprom(&mut xcvrs[index.0], index, false)
                    .await;
            }
        }

        Ok(())
    }

    /// Program the board library and GPIO for the management interrupt,
    /// run one forced update sweep, and enable management.
    pub async fn mgmt_enable_interrupt(&self) {
        if self
            .platform
            .capabilities()
            .contains(PalCapabilities::PORT_INTR_ENABLE)
        {
            mod_debug!(self, MOD_INTR, "enabling port interrupts");

            let hw_res_ids: Vec<u32> = self
                .ports
                .iter()
                .filter(|(_, cfg)| cfg.intf_type.has_xcvr())
                .map(|(_, cfg)| cfg.hw_res_id)
                .collect();
            let enable = vec![true; hw_res_ids.len()];
            if let Err(e) =
                self.platform.enable_port_intr(&hw_res_ids, &enable)
            {
                error!(
                    self.log,
                    "failed to enable port interrupts";
                    "error" => %e,
                );
            }
        }

        if let Some(gpio) = self.config.gpio_port_intr {
            mod_debug!(
                self,
                MOD_INTR,
                "arming port interrupt GPIO";
                "gpio" => gpio,
            );
            if let Err(e) =
                self.platform.gpio_set_direction(gpio, GpioDirection::Input)
            {
                error!(self.log, "failed to set GPIO direction"; "error" => %e);
            }
            if let Err(e) =
                self.platform.gpio_unmask_intr(gpio, GpioIntrMode::Falling)
            {
                error!(self.log, "failed to unmask GPIO"; "error" => %e);
            }
        }

        // Publish the start-up state.
        let mut xcvrs = self.xcvrs.lock().await;
        self.update_state(&mut xcvrs, true, false).await;

        self.mgmt.enabled.store(true, Ordering::SeqCst);
    }

    /// ISR-path entry for the management interrupt: re-arm the GPIO and
    /// wake the management task.
    pub fn mgmt_signal_interrupt(&self, gpio: u32) {
        mod_debug!(self, MOD_INTR, "management interrupt"; "gpio" => gpio);
        if let Err(e) =
            self.platform.gpio_unmask_intr(gpio, GpioIntrMode::Falling)
        {
            error!(self.log, "failed to re-arm GPIO"; "error" => %e);
        }
        self.mgmt.wake.notify_one();
    }

    /// Ask the management task to run its background work promptly.
    pub fn mgmt_signal_polling_thread(&self) {
        self.mgmt.polling_pending.store(true, Ordering::SeqCst);
        self.mgmt.wake.notify_one();
    }

    /// The module identity of a port. Queries against the lane 1..3 ports
    /// of a QSFP cage are redirected to the lane 0 port, which owns the
    /// EEPROM.
    pub async fn mgmt_get_transceiver_type(
        &self,
        port_id: PortId,
    ) -> XcvrdResult<(XcvrType, u32)> {
        let mut index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;

        let cfg = self.ports.port(index);
        if matches!(
            cfg.intf_type,
            IntfType::QsfpLane1 | IntfType::QsfpLane2 | IntfType::QsfpLane3
        ) {
            index = self
                .ports
                .port_for_lane(cfg.epl, 0)
                .ok_or(XcvrdError::InvalidPort(port_id))?;
        }

        let xcvrs = self.xcvrs.lock().await;
        let xcvr = &xcvrs[index.0];
        mod_debug!(
            self,
            MOD_TYPE,
            "transceiver type";
            "port_id" => %port_id,
            "type" => %xcvr.xcvr_type,
            "length" => xcvr.cable_length,
        );
        Ok((xcvr.xcvr_type, xcvr.cable_length))
    }

    /// Record a port's new ethernet mode, reapply its SerDes TX settings,
    /// and reconfigure an SFP+ module to match.
    pub async fn mgmt_notify_eth_mode_change(
        &self,
        port_id: PortId,
        mode: EthMode,
    ) {
        let Some(index) = self.ports.index_of(port_id) else {
            return;
        };

        let mut xcvrs = self.xcvrs.lock().await;
        mod_debug!(
            self,
            MOD_TYPE,
            "ethernet mode change";
            "port_id" => %port_id,
            "from" => %xcvrs[index.0].eth_mode,
            "to" => %mode,
        );
        xcvrs[index.0].eth_mode = mode;

        self.set_serdes_tx_cfg(port_id, mode.is_multi_lane(), mode);

        if mode.is_multi_lane() {
            return;
        }

        let cfg = self.ports.port(index);
        if cfg.intf_type == IntfType::Sfpp && xcvrs[index.0].present {
            mod_debug!(
                self,
                MOD_STATE,
                "reconfiguring SFP+ for mode change";
                "port_id" => %port_id,
            );
            if self.config.xcvr_poll_period.is_none() {
                // No background task, so do it inline.
                let _ = self
                    .configure_sfpp_xcvr(&mut xcvrs[index.0], index)
                    .await;
            } else {
                xcvrs[index.0].config_retries = MAX_CONFIG_RETRY;
                self.mgmt_signal_polling_thread();
            }
        }
    }

    /// Schedule a background reconfiguration of an SFP+ module after its
    /// autonegotiation setting changed.
    pub async fn mgmt_config_sfpp_xcvr_autoneg(
        &self,
        port_id: PortId,
        enable: bool,
    ) -> XcvrdResult<()> {
        mod_debug!(
            self,
            MOD_STATE,
            "SFP+ autoneg config";
            "port_id" => %port_id,
            "enable" => enable,
        );

        if self.config.xcvr_poll_period.is_none() {
            return Err(XcvrdError::Unsupported(
                "background configuration requires the polling task"
                    .to_string(),
            ));
        }

        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;

        let mut xcvrs = self.xcvrs.lock().await;
        xcvrs[index.0].config_retries = MAX_CONFIG_RETRY;
        drop(xcvrs);
        self.mgmt_signal_polling_thread();
        Ok(())
    }

    /// The diagnostic view of one port's cached management state.
    pub async fn mgmt_dump_port(
        &self,
        port_id: PortId,
    ) -> XcvrdResult<views::PortDump> {
        let index = self
            .ports
            .index_of(port_id)
            .ok_or(XcvrdError::InvalidPort(port_id))?;
        let xcvrs = self.xcvrs.lock().await;
        Ok(views::PortDump::new(port_id, &xcvrs[index.0]))
    }

    // Apply SerDes TX settings through the facade, if the board library
    // supports it.
    fn set_serdes_tx_cfg(&self, port_id: PortId, multi_lane: bool, mode: EthMode) {
        if !self
            .platform
            .capabilities()
            .contains(PalCapabilities::SERDES_TX_CFG)
        {
            return;
        }
        if let Err(e) =
            self.platform.set_serdes_tx_cfg(port_id, multi_lane, mode)
        {
            error!(
                self.log,
                "failed to apply SerDes TX settings";
                "port_id" => %port_id,
                "error" => %e,
            );
        }
    }

    // Update SerDes settings for a port after its module or mode changed.
    // A broken-out QSFP applies each lane port's own mode.
    fn update_serdes(&self, xcvrs: &[XcvrInfo], index: PortIndex) {
        let cfg = self.ports.port(index);
        match cfg.intf_type {
            IntfType::Sfpp => {
                self.set_serdes_tx_cfg(
                    cfg.port_id,
                    false,
                    xcvrs[index.0].eth_mode,
                );
            }
            IntfType::QsfpLane0 => {
                if xcvrs[index.0].eth_mode.is_multi_lane() {
                    self.set_serdes_tx_cfg(
                        cfg.port_id,
                        true,
                        xcvrs[index.0].eth_mode,
                    );
                } else {
                    // Four individual ports.
                    for lane_index in
                        self.ports.lanes_of(cfg.epl).into_iter().flatten()
                    {
                        let lane_cfg = self.ports.port(lane_index);
                        self.set_serdes_tx_cfg(
                            lane_cfg.port_id,
                            false,
                            xcvrs[lane_index.0].eth_mode,
                        );
                    }
                }
            }
            _ => {}
        }
    }

    // Perform any configuration the SFP+ module needs when brought up:
    // force dual-rate modules to the lane rate, and align the PHY
    // autonegotiation setting of 1000BASE-T modules.
    async fn configure_sfpp_xcvr(
        &self,
        xcvr: &mut XcvrInfo,
        index: PortIndex,
    ) -> XcvrdResult<()> {
        let cfg = self.ports.port(index);
        let port_id = cfg.port_id;
        let an_wanted = self.is_port_an_enabled(index);

        mod_debug!(
            self,
            MOD_STATE,
            "configuring SFP+ module";
            "port_id" => %port_id,
            "dual_rate" => xcvr.is_dual_rate(),
            "1000base_t" => xcvr.is_1000base_t(),
            "an" => an_wanted,
        );

        if !xcvr.mod_state.contains(XcvrState::ENABLE) {
            mod_debug!(
                self,
                MOD_STATE,
                "module not enabled, skipping configuration";
                "port_id" => %port_id,
            );
            return Ok(());
        }

        if xcvr.is_dual_rate() {
            // Rate select per SFF-8472 table 3.17. Offsets 110 and 118
            // cover modules with separate RX and TX rate control; writing
            // both is harmless on modules with only one.
            let data = if xcvr.eth_mode.is_1g() { 0x00 } else { 0x08 };
            {
                let _bus = self.i2c_lock.lock().await;
                self.platform
                    .xcvr_mem_write(cfg.hw_res_id, 1, 110, &[data])?;
                self.platform
                    .xcvr_mem_write(cfg.hw_res_id, 1, 118, &[data])?;
            }
            mod_debug!(
                self,
                MOD_STATE,
                "forced dual-rate module to {}",
                if xcvr.eth_mode.is_1g() { "1G" } else { "10G" };
                "port_id" => %port_id,
            );
        }

        if xcvr.is_1000base_t() {
            if xcvr.an_enabled != an_wanted {
                self.platform.phy_set_1000base_t_an(port_id, an_wanted)?;
                xcvr.an_enabled = an_wanted;
                mod_debug!(
                    self,
                    MOD_STATE,
                    "{} 1000BASE-T autoneg",
                    if an_wanted { "enabled" } else { "disabled" };
                    "port_id" => %port_id,
                );
            } else {
                mod_debug!(
                    self,
                    MOD_STATE,
                    "1000BASE-T autoneg already {}",
                    if an_wanted { "enabled" } else { "disabled" };
                    "port_id" => %port_id,
                );
            }
        }

        Ok(())
    }

    // Start (or restart) the bounded configuration of a freshly readable
    // module.
    async fn update_xcvr_config(
        &self,
        xcvrs: &mut [XcvrInfo],
        index: PortIndex,
        retries: u8,
    ) {
        let cfg = self.ports.port(index);
        match cfg.intf_type {
            IntfType::Sfpp => {
                xcvrs[index.0].config_retries = retries - 1;
                if self
                    .configure_sfpp_xcvr(&mut xcvrs[index.0], index)
                    .await
                    .is_ok()
                {
                    xcvrs[index.0].config_retries = 0;
                }
            }
            IntfType::QsfpLane0 => {
                // Nothing to configure on QSFP modules today.
            }
            _ => {}
        }
    }

    // Read the module EEPROM into the cache and parse identity out of it.
    //
    // A failure on the initial read schedules the background retries; a
    // failure during a retry just propagates, and the sweep owns the
    // counter.
    async fn read_and_validate_eeprom(
        &self,
        xcvr: &mut XcvrInfo,
        index: PortIndex,
        retry: bool,
    ) -> XcvrdResult<()> {
        let cfg = self.ports.port(index);
        let port_id = cfg.port_id;

        let result = {
            let _bus = self.i2c_lock.lock().await;
            if self
                .platform
                .capabilities()
                .contains(PalCapabilities::SELECT_BUS)
            {
                if let Err(e) = self
                    .platform
                    .select_bus(BusKind::XcvrEeprom, cfg.hw_res_id)
                {
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "failed to select EEPROM bus";
                        "port_id" => %port_id,
                        "error" => %e,
                    );
                    // Continue so the lock is released in order; the read
                    // below will report the failure.
                }
            }
            self.platform
                .xcvr_eeprom_read(cfg.hw_res_id, 0, 0, &mut xcvr.eeprom)
        };

        match result {
            Ok(()) => {
                xcvr.eeprom_read_retries = 0;
                xcvr.eeprom_base_valid =
                    eeprom::is_base_csum_valid(&xcvr.eeprom);
                xcvr.eeprom_ext_valid =
                    eeprom::is_ext_csum_valid(&xcvr.eeprom);

                if xcvr.eeprom_base_valid {
                    xcvr.xcvr_type = eeprom::get_type(&xcvr.eeprom);
                    xcvr.cable_length = eeprom::get_length(&xcvr.eeprom);
                } else {
                    xcvr.xcvr_type = XcvrType::Unknown;
                    xcvr.cable_length = 0;
                }

                mod_debug!(
                    self,
                    MOD_TYPE,
                    "transceiver identified";
                    "port_id" => %port_id,
                    "type" => %xcvr.xcvr_type,
                    "length" => xcvr.cable_length,
                );
                Ok(())
            }
            Err(e) => {
                if !retry {
                    // Some modules need a while to respond; mark the port
                    // for the polling task to try again later.
                    xcvr.eeprom_read_retries = MAX_EEPROM_READ_RETRY;
                    xcvr.xcvr_type = XcvrType::Unknown;
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "failed to read module EEPROM";
                        "port_id" => %port_id,
                        "error" => %e,
                    );
                }
                Err(e.into())
            }
        }
    }

    // Background sweep: retry EEPROM reads for modules that were not ready,
    // and refresh SerDes settings once a read finally succeeds.
    pub(crate) async fn retry_eeprom_read(&self, xcvrs: &mut Vec<XcvrInfo>) {
        if !self
            .platform
            .capabilities()
            .contains(PalCapabilities::XCVR_EEPROM_READ)
        {
            return;
        }

        for (index, cfg) in self.ports.iter() {
            if !cfg.intf_type.has_xcvr() {
                continue;
            }
            if xcvrs[index.0].eeprom_read_retries == 0 {
                continue;
            }
            xcvrs[index.0].eeprom_read_retries -= 1;

            if self
                .read_and_validate_eeprom(&mut xcvrs[index.0], index, true)
                .await
                .is_err()
            {
                if xcvrs[index.0].eeprom_read_retries == 0 {
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "reading module EEPROM failed";
                        "port_id" => %cfg.port_id,
                    );
                }
                continue;
            }

            mod_debug!(
                self,
                MOD_STATE,
                "module EEPROM read succeeded after {} tries",
                MAX_EEPROM_READ_RETRY - xcvrs[index.0].eeprom_read_retries;
                "port_id" => %cfg.port_id,
            );
            xcvrs[index.0].eeprom_read_retries = 0;
            self.update_serdes(xcvrs, index);
        }
    }

    // Background sweep: retry SFP+ module configuration.
    pub(crate) async fn retry_config(&self, xcvrs: &mut Vec<XcvrInfo>) {
        if !self
            .platform
            .capabilities()
            .contains(PalCapabilities::XCVR_MEM_WRITE)
        {
            return;
        }

        for (index, cfg) in self.ports.iter() {
            if cfg.intf_type != IntfType::Sfpp {
                continue;
            }
            if !(xcvrs[index.0].eeprom_base_valid
                && xcvrs[index.0].config_retries > 0)
            {
                continue;
            }
            xcvrs[index.0].config_retries -= 1;

            if self
                .configure_sfpp_xcvr(&mut xcvrs[index.0], index)
                .await
                .is_ok()
            {
                mod_debug!(
                    self,
                    MOD_STATE,
                    "SFP+ module configured after {} tries",
                    MAX_CONFIG_RETRY - xcvrs[index.0].config_retries;
                    "port_id" => %cfg.port_id,
                );
                xcvrs[index.0].config_retries = 0;
            } else if xcvrs[index.0].config_retries == 0 {
                error!(
                    self.log,
                    "failed to configure SFP+ module";
                    "port_id" => %cfg.port_id,
                );
            }
        }
    }

    // Reconcile hardware-reported module status with the cached records,
    // reacting to changes and notifying upward.
    pub(crate) async fn update_state(
        &self,
        xcvrs: &mut Vec<XcvrInfo>,
        force: bool,
        interrupting: bool,
    ) {
        if !self
            .platform
            .capabilities()
            .contains(PalCapabilities::XCVR_STATE)
        {
            return;
        }

        // Build the candidate list, preferring the pending-interrupt set
        // when this wake came from an interrupt.
        let mut candidates: Vec<PortIndex> = Vec::new();
        let mut had_pending = false;
        if interrupting
            && self
                .platform
                .capabilities()
                .contains(PalCapabilities::PORT_INTR_PENDING)
        {
            let pending = {
                let _bus = self.i2c_lock.lock().await;
                self.platform.get_port_intr_pending(self.ports.len())
            };
            match pending {
                Ok(pending) => {
                    had_pending = !pending.is_empty();
                    for hw_res_id in &pending {
                        if let Some(index) =
                            self.ports.index_of_hw_res(*hw_res_id)
                        {
                            candidates.push(index);
                        }
                    }
                    mod_debug!(
                        self,
                        MOD_INTR,
                        "interrupt pending ports";
                        "ports" => ?candidates,
                    );
                    if candidates.len() != pending.len() {
                        // Some resource IDs did not resolve; carry on with
                        // the ones that did.
                        error!(
                            self.log,
                            "unexpected mismatch resolving pending ports";
                            "resolved" => candidates.len(),
                            "pending" => pending.len(),
                            "hw_res_ids" => ?pending,
                            "port_indices" => ?candidates,
                        );
                    }
                }
                Err(e) => {
                    mod_debug!(
                        self,
                        MOD_INTR,
                        "failed to query pending ports";
                        "error" => %e,
                    );
                }
            }
        }

        if candidates.is_empty() && !had_pending {
            candidates = self
                .ports
                .iter()
                .filter(|(_, cfg)| cfg.intf_type.has_xcvr())
                .map(|(index, _)| index)
                .collect();
        }

        if candidates.is_empty() {
            mod_debug!(self, MOD_STATE, "no port to process");
            return;
        }

        let hw_res_ids: Vec<u32> = candidates
            .iter()
            .map(|&index| self.ports.port(index).hw_res_id)
            .collect();

        // Read the status bits for every candidate in one bus
        // acquisition.
        let entries = {
            let _bus = self.i2c_lock.lock().await;
            if self
                .platform
                .capabilities()
                .contains(PalCapabilities::SELECT_BUS)
            {
                if let Err(e) = self
                    .platform
                    .select_bus(BusKind::XcvrState, hw_res_ids[0])
                {
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "failed to select transceiver bus";
                        "error" => %e,
                    );
                    // Continue so the lock is released in order.
                }
            }
            self.platform.get_port_xcvr_state(&hw_res_ids)
        };
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                mod_debug!(
                    self,
                    MOD_STATE,
                    "failed to read transceiver state";
                    "error" => %e,
                );
                return;
            }
        };

        for (&index, entry) in candidates.iter().zip(entries.iter()) {
            let cfg = self.ports.port(index);
            if !cfg.intf_type.has_xcvr() {
                error!(
                    self.log,
                    "unexpected port interface type";
                    "port_id" => %cfg.port_id,
                );
                continue;
            }
            let port_id = cfg.port_id;

            let valid = entry.valid;
            let new_state = entry.state;
            let old_state = xcvrs[index.0].mod_state;
            let present = new_state.contains(XcvrState::PRESENT);
            let mut notify = false;

            if old_state != new_state {
                let changed = old_state ^ new_state;
                xcvrs[index.0].mod_state = new_state;

                if valid.contains(XcvrState::PRESENT)
                    && changed.contains(XcvrState::PRESENT)
                {
                    notify = true;
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "module presence changed to {}",
                        if present { "PRESENT" } else { "NOT_PRESENT" };
                        "port_id" => %port_id,
                    );
                    xcvrs[index.0].present = present;
                    xcvrs[index.0].clear_module_state();
                }

                if valid.contains(XcvrState::ENABLE)
                    && changed.contains(XcvrState::ENABLE)
                {
                    notify = true;
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "module enable changed to {}",
                        new_state.contains(XcvrState::ENABLE);
                        "port_id" => %port_id,
                    );
                    xcvrs[index.0].config_retries = 0;
                    xcvrs[index.0].an_enabled = false;
                }

                if notify
                    && present
                    && new_state.contains(XcvrState::ENABLE)
                {
                    let status = self
                        .read_and_validate_eeprom(
                            &mut xcvrs[index.0],
                            index,
                            false,
                        )
                        .await;
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "module EEPROM read: {}",
                        if status.is_ok() { "ok" } else { "failed" };
                        "port_id" => %port_id,
                    );
                    if status.is_ok() {
                        self.update_serdes(xcvrs, index);
                        self.update_xcvr_config(xcvrs, index, MAX_CONFIG_RETRY)
                            .await;
                    }
                }

                if valid.contains(XcvrState::RXLOS)
                    && changed.contains(XcvrState::RXLOS)
                {
                    notify = true;
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "module RXLOS changed to {}",
                        new_state.contains(XcvrState::RXLOS);
                        "port_id" => %port_id,
                    );
                }

                if valid.contains(XcvrState::TXFAULT)
                    && changed.contains(XcvrState::TXFAULT)
                {
                    notify = true;
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "module TXFAULT changed to {}",
                        new_state.contains(XcvrState::TXFAULT);
                        "port_id" => %port_id,
                    );
                }

                if valid.contains(XcvrState::INTR)
                    && changed.contains(XcvrState::INTR)
                {
                    // Logged, never latched.
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "module INTR changed to {}",
                        new_state.contains(XcvrState::INTR);
                        "port_id" => %port_id,
                    );
                }
            }

            if notify || force {
                self.notify_xcvr_state(xcvrs, index, present, new_state);
            }
        }
    }

    // Compose the upward signal set for one port and fan it out.
    fn notify_xcvr_state(
        &self,
        xcvrs: &[XcvrInfo],
        index: PortIndex,
        present: bool,
        state: XcvrState,
    ) {
        let cfg = self.ports.port(index);
        let port_id = cfg.port_id;

        let mut signals = XcvrSignals::empty();
        if present {
            signals |= XcvrSignals::MODPRES;
        }

        match cfg.intf_type {
            IntfType::Sfpp => {
                if state.contains(XcvrState::RXLOS) {
                    signals |= XcvrSignals::RXLOS;
                }
                if state.contains(XcvrState::TXFAULT) {
                    signals |= XcvrSignals::TXFAULT;
                }

                // The port layer only cares while the port is in use.
                if xcvrs[index.0].eth_mode != EthMode::Disabled {
                    self.notify_api(XcvrChange {
                        port_id,
                        lane: 0,
                        signals,
                    });
                    mod_debug!(
                        self,
                        MOD_STATE,
                        "notified port layer";
                        "port_id" => %port_id,
                        "signals" => ?signals,
                    );
                }

                self.notify_app(XcvrStateEvent {
                    port_id,
                    lanes: EventLanes::NotApplicable,
                    signals,
                });
                mod_debug!(
                    self,
                    MOD_STATE,
                    "notified application";
                    "port_id" => %port_id,
                    "signals" => ?signals,
                );
            }
            IntfType::QsfpLane0 => {
                if !xcvrs[index.0].eth_mode.is_multi_lane() {
                    // Four individual ports share the cage; tell each one
                    // that is in use.
                    for lane_index in
                        self.ports.lanes_of(cfg.epl).into_iter().flatten()
                    {
                        if xcvrs[lane_index.0].eth_mode == EthMode::Disabled {
                            continue;
                        }
                        let lane_port = self.ports.port(lane_index).port_id;
                        self.notify_api(XcvrChange {
                            port_id: lane_port,
                            lane: 0,
                            signals,
                        });
                        mod_debug!(
                            self,
                            MOD_STATE,
                            "notified port layer";
                            "port_id" => %lane_port,
                            "signals" => ?signals,
                        );
                    }

                    self.notify_app(XcvrStateEvent {
                        port_id,
                        lanes: EventLanes::NotApplicable,
                        signals,
                    });
                } else {
                    for lane in 0..4 {
                        if xcvrs[index.0].eth_mode == EthMode::Disabled {
                            continue;
                        }
                        self.notify_api(XcvrChange {
                            port_id,
                            lane,
                            signals,
                        });
                        mod_debug!(
                            self,
                            MOD_STATE,
                            "notified port layer";
                            "port_id" => %port_id,
                            "lane" => lane,
                            "signals" => ?signals,
                        );
                    }

                    self.notify_app(XcvrStateEvent {
                        port_id,
                        lanes: EventLanes::All,
                        signals,
                    });
                }
                mod_debug!(
                    self,
                    MOD_STATE,
                    "notified application";
                    "port_id" => %port_id,
                    "signals" => ?signals,
                );
            }
            _ => {}
        }
    }
}
