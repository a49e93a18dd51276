// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout the daemon.

use common::ports::PortId;
use pal::PalError;

pub type XcvrdResult<T> = Result<T, XcvrdError>;

#[derive(Debug, thiserror::Error)]
pub enum XcvrdError {
    #[error("out of memory")]
    NoMem,
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("invalid port {0}")]
    InvalidPort(PortId),
    #[error("invalid switch")]
    InvalidSwitch,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no free resources: {0}")]
    NoFreeResources(String),
    #[error("port {0} has no autonegotiation state machine bound")]
    StateMachineHandle(PortId),
    #[error("event is not valid for the bound state machine type")]
    StateMachineType,
    #[error("i2c bus failure: {0}")]
    I2cBusFailure(String),
    #[error("EEPROM checksum invalid")]
    ChecksumInvalid,
    #[error("platform library error")]
    Platform(#[from] PalError),
}
