// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The Platform Abstraction Library.
//!
//! Every board design pairs the switch ASIC with its own arrangement of I²C
//! muxes, GPIO expanders, and module cages. The daemon reaches all of that
//! hardware through the [`PlatformOps`] trait defined here. A board library
//! implements the subset of operations its hardware supports and reports
//! that subset through [`PlatformOps::capabilities`]; callers must check the
//! relevant capability bit before invoking an operation, and unimplemented
//! operations return [`PalError::Unsupported`].
//!
//! Platform operations may block for an unspecified time (an I²C transaction
//! behind a mux can be slow). Callers serialize every I/O sequence through
//! the daemon's bus lock; implementations must not take that lock
//! themselves.

use std::fmt;

use bitflags::bitflags;
use common::ports::EthMode;
use common::ports::PortId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub mod regs;

/// A specialized Result type for platform operations.
pub type PalResult<T> = Result<T, PalError>;

/// Errors reported by a board library.
#[derive(Debug, Error)]
pub enum PalError {
    /// The operation is not implemented by this board library.
    #[error("operation unsupported by the platform library: {0}")]
    Unsupported(&'static str),
    /// An I²C transaction failed.
    #[error("i2c bus failure: {0}")]
    I2cBusFailure(String),
    /// A switch register access failed.
    #[error("register access failed: {0}")]
    Register(String),
    /// A GPIO operation failed.
    #[error("gpio operation failed: {0}")]
    Gpio(String),
    /// An argument was out of range for the board.
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

bitflags! {
    /// The per-port module status bits reported by the board library.
    ///
    /// `valid` masks in [`XcvrStateEntry`] report which of these bits are
    /// meaningful on a given port; a bit outside the valid mask carries no
    /// information.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
    pub struct XcvrState: u32 {
        /// A module is seated in the cage (MODPRES).
        const PRESENT = 1 << 0;
        /// The module is enabled (TX not disabled, out of reset).
        const ENABLE = 1 << 1;
        /// The module reports receive loss-of-signal.
        const RXLOS = 1 << 2;
        /// The module reports a transmit fault.
        const TXFAULT = 1 << 3;
        /// The module has an interrupt pending.
        const INTR = 1 << 4;
    }
}

/// One port's worth of output from [`PlatformOps::get_port_xcvr_state`].
#[derive(Clone, Copy, Debug, Default)]
pub struct XcvrStateEntry {
    /// Which bits of `state` are meaningful for this port.
    pub valid: XcvrState,
    /// The current status bits.
    pub state: XcvrState,
}

/// The shared I²C mux targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BusKind {
    /// The bus segment carrying module status registers.
    XcvrState,
    /// The bus segment carrying module EEPROMs.
    XcvrEeprom,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BusKind::XcvrState => write!(f, "xcvr-state"),
            BusKind::XcvrEeprom => write!(f, "xcvr-eeprom"),
        }
    }
}

/// Direction of a platform GPIO.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GpioDirection {
    Input,
    Output,
}

/// The edge on which a platform GPIO raises an interrupt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GpioIntrMode {
    Rising,
    Falling,
}

bitflags! {
    /// The operations a board library implements.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct PalCapabilities: u32 {
        const SELECT_BUS = 1 << 0;
        const I2C_WRITE_READ = 1 << 1;
        const XCVR_MEM_WRITE = 1 << 2;
        const XCVR_EEPROM_READ = 1 << 3;
        const XCVR_STATE = 1 << 4;
        const PORT_INTR_PENDING = 1 << 5;
        const PORT_INTR_ENABLE = 1 << 6;
        const GPIO = 1 << 7;
        const SERDES_TX_CFG = 1 << 8;
        const PHY_1000BASE_T_AN = 1 << 9;
    }
}

/// The board library interface.
///
/// Ports are addressed by the board's hardware resource ID, an opaque value
/// assigned in the platform configuration; the daemon translates between
/// resource IDs and its own port indices. Default implementations return
/// [`PalError::Unsupported`] so a board library only writes the operations
/// its hardware has.
pub trait PlatformOps: Send + Sync {
    /// The set of operations this library implements.
    fn capabilities(&self) -> PalCapabilities;

    /// Bind the shared I²C mux to the segment for `bus`, routed toward the
    /// port owning `hw_res_id`.
    fn select_bus(&self, bus: BusKind, hw_res_id: u32) -> PalResult<()> {
        let _ = (bus, hw_res_id);
        Err(PalError::Unsupported("select_bus"))
    }

    /// Raw I²C write-then-read on the currently selected bus segment.
    ///
    /// The first `write_len` bytes of `buf` are written to `addr`; up to
    /// `read_len` bytes are then read back into the front of `buf`.
    fn i2c_write_read(
        &self,
        addr: u8,
        buf: &mut [u8],
        write_len: usize,
        read_len: usize,
    ) -> PalResult<()> {
        let _ = (addr, buf, write_len, read_len);
        Err(PalError::Unsupported("i2c_write_read"))
    }

    /// Write bytes into a module's memory map at (`dev`, `reg`).
    fn xcvr_mem_write(
        &self,
        hw_res_id: u32,
        dev: u8,
        reg: u8,
        data: &[u8],
    ) -> PalResult<()> {
        let _ = (hw_res_id, dev, reg, data);
        Err(PalError::Unsupported("xcvr_mem_write"))
    }

    /// Compound read of a module's memory map, honoring page boundaries.
    fn xcvr_eeprom_read(
        &self,
        hw_res_id: u32,
        dev: u8,
        reg: u8,
        buf: &mut [u8],
    ) -> PalResult<()> {
        let _ = (hw_res_id, dev, reg, buf);
        Err(PalError::Unsupported("xcvr_eeprom_read"))
    }

    /// Bulk query of module status for each listed port.
    ///
    /// Returns one entry per element of `hw_res_ids`, in the same order.
    fn get_port_xcvr_state(
        &self,
        hw_res_ids: &[u32],
    ) -> PalResult<Vec<XcvrStateEntry>> {
        let _ = hw_res_ids;
        Err(PalError::Unsupported("get_port_xcvr_state"))
    }

    /// Dequeue the hardware resource IDs with an edge-triggered port
    /// interrupt pending, up to `max` of them.
    fn get_port_intr_pending(&self, max: usize) -> PalResult<Vec<u32>> {
        let _ = max;
        Err(PalError::Unsupported("get_port_intr_pending"))
    }

    /// Enable or disable the port interrupt for each listed port.
    fn enable_port_intr(
        &self,
        hw_res_ids: &[u32],
        enable: &[bool],
    ) -> PalResult<()> {
        let _ = (hw_res_ids, enable);
        Err(PalError::Unsupported("enable_port_intr"))
    }

    /// Configure the direction of a platform GPIO.
    fn gpio_set_direction(
        &self,
        gpio: u32,
        direction: GpioDirection,
    ) -> PalResult<()> {
        let _ = (gpio, direction);
        Err(PalError::Unsupported("gpio_set_direction"))
    }

    /// Re-arm the interrupt on a platform GPIO.
    fn gpio_unmask_intr(
        &self,
        gpio: u32,
        mode: GpioIntrMode,
    ) -> PalResult<()> {
        let _ = (gpio, mode);
        Err(PalError::Unsupported("gpio_unmask_intr"))
    }

    /// Apply the SerDes TX equalization settings appropriate for `mode` to
    /// the lane (or, when `multi_lane` is set, all four lanes) of `port`.
    fn set_serdes_tx_cfg(
        &self,
        port: PortId,
        multi_lane: bool,
        mode: EthMode,
    ) -> PalResult<()> {
        let _ = (port, multi_lane, mode);
        Err(PalError::Unsupported("set_serdes_tx_cfg"))
    }

    /// Enable or disable autonegotiation on the 1000BASE-T PHY inside a
    /// copper SFP module.
    fn phy_set_1000base_t_an(
        &self,
        port: PortId,
        enable: bool,
    ) -> PalResult<()> {
        let _ = (port, enable);
        Err(PalError::Unsupported("phy_set_1000base_t_an"))
    }
}

/// Switch register access used by the autonegotiation path.
///
/// These map directly onto the switch driver's register primitives; they are
/// cheap relative to platform I/O but still serialize through the register
/// lock for read-modify-write sequences.
pub trait RegisterOps: Send + Sync {
    fn read32(&self, addr: u32) -> PalResult<u32>;

    fn write32(&self, addr: u32, value: u32) -> PalResult<()>;

    /// Set (or clear) the `bits` of the register at `addr`.
    fn mask32(&self, addr: u32, bits: u32, set: bool) -> PalResult<()>;
}
