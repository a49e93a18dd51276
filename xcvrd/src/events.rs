// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Upward notifications about transceiver state changes.
//!
//! Two consumers care about module signals: the port layer of the driver,
//! which reacts per logical port (and so receives one notification per lane
//! port of a broken-out QSFP), and the application, which receives a single
//! event per physical cage. Either consumer registers an unbounded channel;
//! notifications are dropped silently when no consumer has registered.

use bitflags::bitflags;
use common::ports::PortId;

bitflags! {
    /// The module signals reported upward.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct XcvrSignals: u32 {
        /// A module is present in the cage.
        const MODPRES = 1 << 0;
        /// The module reports receive loss-of-signal.
        const RXLOS = 1 << 1;
        /// The module reports a transmit fault.
        const TXFAULT = 1 << 2;
    }
}

/// A per-logical-port notification delivered to the driver's port layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct XcvrChange {
    pub port_id: PortId,
    /// The lane within the port, for multi-lane ports.
    pub lane: u8,
    pub signals: XcvrSignals,
}

/// Which lanes an application event describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventLanes {
    /// Lane numbering does not apply (single-lane port or whole cage).
    NotApplicable,
    /// The event covers all lanes of the port.
    All,
}

/// A per-cage event delivered to the application.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct XcvrStateEvent {
    pub port_id: PortId,
    pub lanes: EventLanes,
    pub signals: XcvrSignals,
}
