// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The per-port autonegotiation state machine engine.
//!
//! The hardware runs the Clause 37 and Clause 73 arbitration state machines
//! itself; this engine mirrors their progress so the rest of the driver can
//! reason about where negotiation stands. Each port owns at most one
//! machine, bound to the transition table for its configured protocol.
//! Events are either configuration requests from the driver or indications
//! decoded from the interrupt-pending register; a table entry maps
//! `(current state, event)` to the next state and an optional action
//! callback run on the transition.
//!
//! Transitions run with the port's autonegotiation lock held; callers hold
//! it for the duration of an event chain.

use std::collections::VecDeque;
use std::fmt;

use common::ports::AutonegMode;
use slog::debug;
use slog::Logger;

use super::NextPages;
use crate::types::XcvrdError;
use crate::types::XcvrdResult;

/// How many transitions are retained per port for diagnostics.
const HISTORY_DEPTH: usize = 32;

/// Which transition table a port is bound to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AnSmType {
    #[default]
    None,
    Clause37,
    Clause73,
}

impl fmt::Display for AnSmType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnSmType::None => write!(f, "none"),
            AnSmType::Clause37 => write!(f, "clause-37"),
            AnSmType::Clause73 => write!(f, "clause-73"),
        }
    }
}

/// The states of the mirrored arbitration machines. The Clause 73 machine
/// uses the first block, the Clause 37 machine the second; `Disabled` is
/// shared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnState {
    Disabled,
    // Clause 73.
    TransmitDisable,
    AbilityDetect,
    AcknowledgeDetect,
    CompleteAcknowledge,
    NextPageWait,
    AnGoodCheck,
    AnGood,
    // Clause 37.
    AnEnable,
    AnRestart,
    DisableLinkOk,
    IdleDetect,
    LinkOk,
}

impl fmt::Display for AnState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AnState::Disabled => "DISABLED",
            AnState::TransmitDisable => "TRANSMIT_DISABLE",
            AnState::AbilityDetect => "ABILITY_DETECT",
            AnState::AcknowledgeDetect => "ACKNOWLEDGE_DETECT",
            AnState::CompleteAcknowledge => "COMPLETE_ACKNOWLEDGE",
            AnState::NextPageWait => "NEXT_PAGE_WAIT",
            AnState::AnGoodCheck => "AN_GOOD_CHECK",
            AnState::AnGood => "AN_GOOD",
            AnState::AnEnable => "AN_ENABLE",
            AnState::AnRestart => "AN_RESTART",
            AnState::DisableLinkOk => "DISABLE_LINK_OK",
            AnState::IdleDetect => "IDLE_DETECT",
            AnState::LinkOk => "LINK_OK",
        };
        write!(f, "{name}")
    }
}

/// The autonegotiation configuration carried by a config or disable event.
#[derive(Clone, Debug, Default)]
pub struct AnConfig {
    pub mode: AutonegMode,
    pub base_page: u64,
    pub next_pages: NextPages,
}

/// An event delivered to a port's state machine.
#[derive(Clone, Debug)]
pub enum AnEvent {
    /// Apply a new autonegotiation configuration and (re)start.
    ConfigReq(AnConfig),
    /// Disable negotiation; carries the configuration being torn down.
    DisableReq(AnConfig),
    // Clause 73 indications.
    AbilityDetectInd,
    AckDetectInd,
    CompleteAckInd,
    NextPageWaitInd,
    GoodCheckInd,
    GoodInd,
    TransmitDisableInd,
    // Clause 37 indications.
    EnableInd,
    RestartInd,
    DisableLinkOkInd,
    IdleDetectInd,
    LinkOkInd,
}

/// The fieldless discriminant of an [`AnEvent`], used for table lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnEventKind {
    ConfigReq,
    DisableReq,
    AbilityDetectInd,
    AckDetectInd,
    CompleteAckInd,
    NextPageWaitInd,
    GoodCheckInd,
    GoodInd,
    TransmitDisableInd,
    EnableInd,
    RestartInd,
    DisableLinkOkInd,
    IdleDetectInd,
    LinkOkInd,
}

impl AnEvent {
    pub fn kind(&self) -> AnEventKind {
        match self {
            AnEvent::ConfigReq(_) => AnEventKind::ConfigReq,
            AnEvent::DisableReq(_) => AnEventKind::DisableReq,
            AnEvent::AbilityDetectInd => AnEventKind::AbilityDetectInd,
            AnEvent::AckDetectInd => AnEventKind::AckDetectInd,
            AnEvent::CompleteAckInd => AnEventKind::CompleteAckInd,
            AnEvent::NextPageWaitInd => AnEventKind::NextPageWaitInd,
            AnEvent::GoodCheckInd => AnEventKind::GoodCheckInd,
            AnEvent::GoodInd => AnEventKind::GoodInd,
            AnEvent::TransmitDisableInd => AnEventKind::TransmitDisableInd,
            AnEvent::EnableInd => AnEventKind::EnableInd,
            AnEvent::RestartInd => AnEventKind::RestartInd,
            AnEvent::DisableLinkOkInd => AnEventKind::DisableLinkOkInd,
            AnEvent::IdleDetectInd => AnEventKind::IdleDetectInd,
            AnEvent::LinkOkInd => AnEventKind::LinkOkInd,
        }
    }
}

type Action = fn(&mut StateMachine, &AnEvent);

fn act_latch_config(sm: &mut StateMachine, event: &AnEvent) {
    if let AnEvent::ConfigReq(config) = event {
        sm.config = Some(config.clone());
    }
}

fn act_clear_config(sm: &mut StateMachine, _event: &AnEvent) {
    sm.config = None;
}

struct Transition {
    /// The state the entry applies in; `None` matches any state.
    from: Option<AnState>,
    event: AnEventKind,
    to: AnState,
    action: Option<Action>,
}

const fn arc(
    from: Option<AnState>,
    event: AnEventKind,
    to: AnState,
    action: Option<Action>,
) -> Transition {
    Transition {
        from,
        event,
        to,
        action,
    }
}

const CLAUSE73_TABLE: &[Transition] = &[
    arc(
        None,
        AnEventKind::ConfigReq,
        AnState::TransmitDisable,
        Some(act_latch_config),
    ),
    arc(
        None,
        AnEventKind::DisableReq,
        AnState::Disabled,
        Some(act_clear_config),
    ),
    arc(
        None,
        AnEventKind::TransmitDisableInd,
        AnState::TransmitDisable,
        None,
    ),
    arc(None, AnEventKind::AbilityDetectInd, AnState::AbilityDetect, None),
    arc(
        Some(AnState::AbilityDetect),
        AnEventKind::AckDetectInd,
        AnState::AcknowledgeDetect,
        None,
    ),
    arc(
        None,
        AnEventKind::CompleteAckInd,
        AnState::CompleteAcknowledge,
        None,
    ),
    arc(None, AnEventKind::NextPageWaitInd, AnState::NextPageWait, None),
    arc(None, AnEventKind::GoodCheckInd, AnState::AnGoodCheck, None),
    arc(None, AnEventKind::GoodInd, AnState::AnGood, None),
];

const CLAUSE37_TABLE: &[Transition] = &[
    arc(
        None,
        AnEventKind::ConfigReq,
        AnState::AnEnable,
        Some(act_latch_config),
    ),
    arc(
        None,
        AnEventKind::DisableReq,
        AnState::Disabled,
        Some(act_clear_config),
    ),
    arc(None, AnEventKind::EnableInd, AnState::AnEnable, None),
    arc(None, AnEventKind::RestartInd, AnState::AnRestart, None),
    arc(None, AnEventKind::DisableLinkOkInd, AnState::DisableLinkOk, None),
    arc(None, AnEventKind::AbilityDetectInd, AnState::AbilityDetect, None),
    arc(
        None,
        AnEventKind::CompleteAckInd,
        AnState::CompleteAcknowledge,
        None,
    ),
    arc(None, AnEventKind::NextPageWaitInd, AnState::NextPageWait, None),
    arc(None, AnEventKind::IdleDetectInd, AnState::IdleDetect, None),
    arc(None, AnEventKind::LinkOkInd, AnState::LinkOk, None),
];

/// One recorded transition, for the diagnostic dump.
#[derive(Clone, Copy, Debug)]
pub struct TransitionRecord {
    /// Nanoseconds since the UNIX epoch.
    pub when: i64,
    pub from: AnState,
    pub event: AnEventKind,
    pub to: AnState,
}

/// A port's bound state machine instance.
#[derive(Clone, Debug)]
pub struct StateMachine {
    sm_type: AnSmType,
    state: AnState,
    config: Option<AnConfig>,
    history: VecDeque<TransitionRecord>,
}

impl StateMachine {
    /// Start a machine of the given type in the `Disabled` state.
    pub fn start(sm_type: AnSmType) -> Self {
        debug_assert!(sm_type != AnSmType::None);
        Self {
            sm_type,
            state: AnState::Disabled,
            config: None,
            history: VecDeque::with_capacity(HISTORY_DEPTH),
        }
    }

    pub fn sm_type(&self) -> AnSmType {
        self.sm_type
    }

    pub fn state(&self) -> AnState {
        self.state
    }

    /// The configuration latched by the last `ConfigReq`, if any.
    pub fn config(&self) -> Option<&AnConfig> {
        self.config.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.history.iter()
    }

    /// Deliver one event.
    ///
    /// Indications that are not meaningful in the current state are ignored
    /// (several may coalesce into one interrupt, and the hardware has
    /// already moved on); configuration events always apply. Returns
    /// `StateMachineType` if the event belongs to the other protocol's
    /// table.
    pub fn notify(
        &mut self,
        log: &Logger,
        event: AnEvent,
    ) -> XcvrdResult<()> {
        let kind = event.kind();
        let table = match self.sm_type {
            AnSmType::Clause73 => CLAUSE73_TABLE,
            AnSmType::Clause37 => CLAUSE37_TABLE,
            AnSmType::None => return Err(XcvrdError::StateMachineType),
        };

        // Hardware indications cannot move a machine that the driver has
        // disabled; only a new configuration can.
        let config_event = matches!(
            kind,
            AnEventKind::ConfigReq | AnEventKind::DisableReq
        );
        if self.state == AnState::Disabled && !config_event {
            debug!(
                log,
                "ignoring indication while disabled";
                "event" => ?kind,
            );
            return Ok(());
        }

        let entry = table.iter().find(|t| {
            t.event == kind && (t.from.is_none() || t.from == Some(self.state))
        });
        let Some(entry) = entry else {
            debug!(
                log,
                "no transition for event";
                "state" => %self.state,
                "event" => ?kind,
            );
            return Ok(());
        };

        let from = self.state;
        if let Some(action) = entry.action {
            action(self, &event);
        }
        self.state = entry.to;

        if self.history.len() == HISTORY_DEPTH {
            self.history.pop_front();
        }
        self.history.push_back(TransitionRecord {
            when: common::timestamp_ns(),
            from,
            event: kind,
            to: self.state,
        });

        debug!(
            log,
            "autoneg transition";
            "sm_type" => %self.sm_type,
            "from" => %from,
            "event" => ?kind,
            "to" => %self.state,
        );
        Ok(())
    }
}
