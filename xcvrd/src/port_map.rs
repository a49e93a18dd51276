// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The per-switch port configuration table.
//!
//! The board design assigns each front-panel cage to an EPL, an on-die group
//! of four SerDes lanes. An SFP+ cage uses a single lane; a QSFP cage uses
//! all four, either ganged into one 4-lane port or broken out into four
//! independent single-lane ports. In the broken-out arrangement the port on
//! lane 0 still owns the cage hardware (EEPROM, status signals), so queries
//! against the lane 1..3 ports are redirected to it.
//!
//! Ports are described once at switch initialization and never change for
//! the life of the session. Internal tables are indexed by [`PortIndex`],
//! the position of a port in the configuration list; the board library
//! addresses the same port by its hardware resource ID.

use std::collections::BTreeMap;
use std::fmt;

use common::ports::Capabilities;
use common::ports::EthMode;
use common::ports::PortId;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// A handle naming a port by its position in the configuration list.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PortIndex(pub usize);

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of physical interface behind a port.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IntfType {
    /// An SFP+ cage.
    Sfpp,
    /// Lane 0 of a QSFP cage; owns the cage hardware.
    QsfpLane0,
    /// Lanes 1..3 of a broken-out QSFP cage.
    QsfpLane1,
    QsfpLane2,
    QsfpLane3,
    /// A port with no managed module (backplane, internal).
    Other,
}

impl IntfType {
    /// True for the interface types that own transceiver hardware, i.e. the
    /// ones the management sweeps visit.
    pub fn has_xcvr(&self) -> bool {
        matches!(self, IntfType::Sfpp | IntfType::QsfpLane0)
    }

    /// The EPL lane this interface type occupies.
    pub fn lane(&self) -> u8 {
        match self {
            IntfType::Sfpp | IntfType::QsfpLane0 | IntfType::Other => 0,
            IntfType::QsfpLane1 => 1,
            IntfType::QsfpLane2 => 2,
            IntfType::QsfpLane3 => 3,
        }
    }
}

/// The immutable description of one logical port.
#[derive(Clone, Debug)]
pub struct PortConfig {
    /// The logical port number used in the driver API.
    pub port_id: PortId,
    /// The kind of physical interface.
    pub intf_type: IntfType,
    /// The EPL carrying this port's lane(s).
    pub epl: u8,
    /// The board library's name for this port.
    pub hw_res_id: u32,
    /// The speeds the port is physically capable of.
    pub capabilities: Capabilities,
    /// The ethernet mode configured at startup.
    pub eth_mode: EthMode,
}

/// The full port table for one switch.
#[derive(Debug)]
pub struct PortMap {
    ports: Vec<PortConfig>,
    id_to_index: BTreeMap<PortId, PortIndex>,
    hw_res_to_index: BTreeMap<u32, PortIndex>,
    // Per-EPL map from lane number to the port occupying it.
    epl_lanes: BTreeMap<u8, [Option<PortIndex>; 4]>,
}

impl PortMap {
    /// Build the port table from the platform configuration.
    ///
    /// Fails if two ports share a logical ID, a hardware resource ID, or an
    /// EPL lane.
    pub fn new(ports: Vec<PortConfig>) -> anyhow::Result<Self> {
        let mut id_to_index = BTreeMap::new();
        let mut hw_res_to_index = BTreeMap::new();
        let mut epl_lanes: BTreeMap<u8, [Option<PortIndex>; 4]> =
            BTreeMap::new();

        for (i, cfg) in ports.iter().enumerate() {
            let index = PortIndex(i);
            if id_to_index.insert(cfg.port_id, index).is_some() {
                anyhow::bail!("duplicate port id {}", cfg.port_id);
            }
            if cfg.intf_type.has_xcvr()
                && hw_res_to_index.insert(cfg.hw_res_id, index).is_some()
            {
                anyhow::bail!(
                    "duplicate hardware resource id {}",
                    cfg.hw_res_id
                );
            }
            if !matches!(cfg.intf_type, IntfType::Other) {
                let lanes = epl_lanes.entry(cfg.epl).or_default();
                let lane = usize::from(cfg.intf_type.lane());
                if lanes[lane].replace(index).is_some() {
                    anyhow::bail!(
                        "EPL {} lane {lane} is claimed twice",
                        cfg.epl
                    );
                }
            }
        }

        Ok(Self {
            ports,
            id_to_index,
            hw_res_to_index,
            epl_lanes,
        })
    }

    /// The number of configured ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// The configuration of the port at `index`.
    pub fn port(&self, index: PortIndex) -> &PortConfig {
        &self.ports[index.0]
    }

    /// Iterate over all ports in index order.
    pub fn iter(&self) -> impl Iterator<Item = (PortIndex, &PortConfig)> {
        self.ports
            .iter()
            .enumerate()
            .map(|(i, cfg)| (PortIndex(i), cfg))
    }

    /// Look up a port by its logical ID.
    pub fn index_of(&self, port_id: PortId) -> Option<PortIndex> {
        self.id_to_index.get(&port_id).copied()
    }

    /// Look up a transceiver-bearing port by its hardware resource ID.
    pub fn index_of_hw_res(&self, hw_res_id: u32) -> Option<PortIndex> {
        self.hw_res_to_index.get(&hw_res_id).copied()
    }

    /// The lane-to-port map for an EPL.
    pub fn lanes_of(&self, epl: u8) -> [Option<PortIndex>; 4] {
        self.epl_lanes.get(&epl).copied().unwrap_or([None; 4])
    }

    /// The port occupying a single EPL lane, if any.
    pub fn port_for_lane(&self, epl: u8, lane: u8) -> Option<PortIndex> {
        if lane >= 4 {
            return None;
        }
        self.lanes_of(epl)[usize::from(lane)]
    }
}
