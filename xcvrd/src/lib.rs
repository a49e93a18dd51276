// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Transceiver and autonegotiation management for the switch driver.
//!
//! This crate owns two tightly coupled subsystems. The transceiver
//! management engine discovers and monitors the pluggable modules seated
//! in the switch's SFP+ and QSFP cages, reconciling the status signals the
//! board library reports with cached EEPROM contents and pushing SerDes
//! and module configuration when something changes. The autonegotiation
//! layer drives the IEEE 802.3 Clause 37 and Clause 73 state machines that
//! bring a port to a negotiated link, from decoding interrupt-pending bits
//! into ordered state machine events up to interpreting the negotiated
//! outcome.
//!
//! The [`Switch`] object is the root of all of it: the immutable port
//! table, the per-port transceiver and autonegotiation records, the locks
//! that serialize hardware access, and the handles to the board library.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use pal::PlatformOps;
use pal::RegisterOps;
use slog::info;
use slog::Logger;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

pub mod autoneg;
pub mod config;
pub mod events;
pub mod port_map;
pub mod transceivers;
pub mod types;
pub mod views;

use autoneg::AnPort;
use config::Config;
use events::XcvrChange;
use events::XcvrStateEvent;
use port_map::PortConfig;
use port_map::PortIndex;
use port_map::PortMap;
use transceivers::MgmtState;
use transceivers::XcvrInfo;

// Debug logging gated by a `config::DebugFlags` category.
macro_rules! mod_debug {
    ($sw:expr, $flag:ident, $($rest:tt)*) => {
        if $sw.config.debug.contains($crate::config::DebugFlags::$flag) {
            slog::debug!($sw.log, $($rest)*);
        }
    };
}
pub(crate) use mod_debug;

/// The management context for one switch.
pub struct Switch {
    pub log: Logger,
    pub config: Config,
    /// The immutable per-session port table.
    pub ports: PortMap,

    pub(crate) platform: Arc<dyn PlatformOps>,
    pub(crate) regs: Arc<dyn RegisterOps>,

    // The per-port transceiver records. The mutex doubles as the switch
    // protection token: management sweeps hold it for the whole sweep.
    pub(crate) xcvrs: TokioMutex<Vec<XcvrInfo>>,

    // Per-port autonegotiation state, reachable from the interrupt path
    // without awaiting.
    pub(crate) an_ports: Vec<Mutex<AnPort>>,

    // Serializes every platform I/O sequence, including the mux select
    // that precedes it.
    pub(crate) i2c_lock: TokioMutex<()>,

    // Serializes read-modify-write of switch registers on the AN path.
    pub(crate) reg_lock: Mutex<()>,

    pub(crate) mgmt: MgmtState,

    pub(crate) xcvr_change_tx: Mutex<Option<UnboundedSender<XcvrChange>>>,
    pub(crate) xcvr_event_tx: Mutex<Option<UnboundedSender<XcvrStateEvent>>>,

    mgmt_task: Mutex<Option<JoinHandle<()>>>,
}

impl Switch {
    /// Build the management context: the port table and the per-port
    /// transceiver and autonegotiation records.
    pub fn new(
        log: Logger,
        config: Config,
        ports: Vec<PortConfig>,
        platform: Arc<dyn PlatformOps>,
        regs: Arc<dyn RegisterOps>,
    ) -> anyhow::Result<Self> {
        let ports = PortMap::new(ports)?;
        let xcvrs = ports
            .iter()
            .map(|(_, cfg)| XcvrInfo::new(cfg.eth_mode))
            .collect();
        let an_ports =
            (0..ports.len()).map(|_| Mutex::new(AnPort::default())).collect();

        Ok(Self {
            log,
            config,
            ports,
            platform,
            regs,
            xcvrs: TokioMutex::new(xcvrs),
            an_ports,
            i2c_lock: TokioMutex::new(()),
            reg_lock: Mutex::new(()),
            mgmt: MgmtState::default(),
            xcvr_change_tx: Mutex::new(None),
            xcvr_event_tx: Mutex::new(None),
            mgmt_task: Mutex::new(None),
        })
    }

    /// Start the management task, unless polling is disabled by
    /// configuration.
    pub fn mgmt_init(self: &Arc<Self>) {
        if self.config.xcvr_poll_period.is_none() {
            info!(self.log, "management task disabled by configuration");
            return;
        }
        let sw = Arc::clone(self);
        let handle = tokio::spawn(sw.mgmt_main());
        self.mgmt_task.lock().unwrap().replace(handle);
    }

    /// Stop the management task at switch teardown.
    pub fn shutdown(&self) {
        if let Some(handle) = self.mgmt_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Register the channel on which the driver's port layer receives
    /// per-port transceiver change notifications.
    pub fn register_xcvr_change_handler(
        &self,
        tx: UnboundedSender<XcvrChange>,
    ) {
        self.xcvr_change_tx.lock().unwrap().replace(tx);
    }

    /// Register the channel on which the application receives per-cage
    /// transceiver state events.
    pub fn register_xcvr_event_handler(
        &self,
        tx: UnboundedSender<XcvrStateEvent>,
    ) {
        self.xcvr_event_tx.lock().unwrap().replace(tx);
    }

    // Lock one port's autonegotiation record.
    pub(crate) fn an_port(&self, index: PortIndex) -> MutexGuard<'_, AnPort> {
        self.an_ports[index.0].lock().unwrap()
    }

    /// Inspect one port's autonegotiation record.
    pub fn with_an_port<T>(
        &self,
        index: PortIndex,
        f: impl FnOnce(&AnPort) -> T,
    ) -> T {
        f(&self.an_port(index))
    }
}

impl Drop for Switch {
    fn drop(&mut self) {
        self.shutdown();
    }
}
