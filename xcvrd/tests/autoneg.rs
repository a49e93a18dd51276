// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Autonegotiation scenarios driven through the public API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use common::ports::AutonegMode;
use common::ports::Capabilities;
use common::ports::EthMode;
use common::ports::LaneMode;
use common::ports::PortId;
use common::ports::PortSpeed;
use pal::regs::AnIp;
use pal::PalCapabilities;
use pal::PalResult;
use pal::PlatformOps;
use pal::RegisterOps;

use xcvrd::autoneg::base_page;
use xcvrd::autoneg::base_page::Clause73Ability;
use xcvrd::autoneg::AnSmType;
use xcvrd::autoneg::AnState;
use xcvrd::autoneg::NextPages;
use xcvrd::config::Config;
use xcvrd::port_map::IntfType;
use xcvrd::port_map::PortConfig;
use xcvrd::types::XcvrdError;
use xcvrd::Switch;

struct NullPlatform;

impl PlatformOps for NullPlatform {
    fn capabilities(&self) -> PalCapabilities {
        PalCapabilities::empty()
    }
}

#[derive(Default)]
struct RecordingRegisters {
    regs: Mutex<BTreeMap<u32, u32>>,
    masks: Mutex<Vec<(u32, u32, bool)>>,
}

impl RegisterOps for RecordingRegisters {
    fn read32(&self, addr: u32) -> PalResult<u32> {
        Ok(self.regs.lock().unwrap().get(&addr).copied().unwrap_or(0))
    }

    fn write32(&self, addr: u32, value: u32) -> PalResult<()> {
        self.regs.lock().unwrap().insert(addr, value);
        Ok(())
    }

    fn mask32(&self, addr: u32, bits: u32, set: bool) -> PalResult<()> {
        self.masks.lock().unwrap().push((addr, bits, set));
        let mut regs = self.regs.lock().unwrap();
        let value = regs.entry(addr).or_insert(0);
        if set {
            *value |= bits;
        } else {
            *value &= !bits;
        }
        Ok(())
    }
}

fn backplane_port(port_id: u16, epl: u8) -> PortConfig {
    PortConfig {
        port_id: PortId(port_id),
        intf_type: IntfType::Sfpp,
        epl,
        hw_res_id: u32::from(port_id),
        capabilities: Capabilities::all(),
        eth_mode: EthMode::An73,
    }
}

fn new_switch(
    ports: Vec<PortConfig>,
    config: Config,
) -> (Arc<Switch>, Arc<RecordingRegisters>) {
    let log = slog::Logger::root(slog::Discard, slog::o!());
    let regs = Arc::new(RecordingRegisters::default());
    let switch = Arc::new(
        Switch::new(log, config, ports, Arc::new(NullPlatform), regs.clone())
            .unwrap(),
    );
    (switch, regs)
}

fn kr_base_page() -> u64 {
    base_page::with_ability_field(0x1001, Clause73Ability::KR_10G)
}

// Build an (OUI message page, unformatted ext-tech page) pair.
fn ext_tech_pages(oui: u32, kr1: bool, cr1: bool) -> [u64; 2] {
    let mut message = u64::from(base_page::OUI_MSG_CODE);
    let mut unformatted = u64::from(base_page::EXT_TECH_ABILITY_CODE);
    for bit in 0..2 {
        unformatted |= u64::from((oui >> bit) & 1) << (9 + bit);
    }
    for bit in 0..11 {
        message |= u64::from((oui >> (bit + 2)) & 1) << (32 + bit);
    }
    for bit in 0..11 {
        message |= u64::from((oui >> (bit + 13)) & 1) << (16 + bit);
    }
    if kr1 {
        unformatted |= base_page::EXT_TECH_25G_KR1;
    }
    if cr1 {
        unformatted |= base_page::EXT_TECH_25G_CR1;
    }
    message |= base_page::NP_BIT;
    [message, unformatted]
}

// Binding a port to Clause 73 sets the mask and starts negotiation.
#[test]
fn test_clause73_binding() {
    let (switch, _regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(1)).unwrap();

    switch
        .an_restart_on_new_config(
            PortId(1),
            EthMode::An73,
            AutonegMode::Clause73,
            kr_base_page(),
            NextPages::default(),
        )
        .unwrap();

    switch.with_an_port(index, |an| {
        assert_eq!(an.sm_type(), AnSmType::Clause73);
        assert_eq!(
            an.sm.as_ref().unwrap().state(),
            AnState::TransmitDisable
        );
        assert_eq!(an.interrupt_mask, AnIp::AN73_INT_MASK);
        assert_eq!(an.autoneg_mode, AutonegMode::Clause73);
        assert_eq!(an.base_page, kr_base_page());
    });
}

// A port that is not in the required ethernet mode is left untouched.
#[test]
fn test_restart_requires_ready_port() {
    let (switch, _regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(1)).unwrap();

    switch
        .an_restart_on_new_config(
            PortId(1),
            EthMode::Base10GKr,
            AutonegMode::Clause73,
            kr_base_page(),
            NextPages::default(),
        )
        .unwrap();

    switch.with_an_port(index, |an| {
        assert_eq!(an.sm_type(), AnSmType::None);
        assert_eq!(an.interrupt_mask, AnIp::empty());
    });
}

// Live Clause 73 -> Clause 37 switch: the old machine is torn down, a new
// one starts, and the interrupt mask is retargeted.
#[test]
fn test_live_clause73_to_clause37_switch() {
    let (switch, _regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(1)).unwrap();

    switch
        .an_restart_on_new_config(
            PortId(1),
            EthMode::An73,
            AutonegMode::Clause73,
            kr_base_page(),
            NextPages::default(),
        )
        .unwrap();

    let c37_page = 0x20;
    switch
        .an_restart_on_new_config(
            PortId(1),
            EthMode::Base1000X,
            AutonegMode::Clause37,
            c37_page,
            NextPages::default(),
        )
        .unwrap();

    switch.with_an_port(index, |an| {
        assert_eq!(an.sm_type(), AnSmType::Clause37);
        // The fresh machine started in DISABLED and then took the new
        // configuration.
        assert_eq!(an.sm.as_ref().unwrap().state(), AnState::AnEnable);
        assert_eq!(an.interrupt_mask, AnIp::AN37_INT_MASK);
        assert_eq!(an.autoneg_mode, AutonegMode::Clause37);
        assert_eq!(an.base_page, c37_page);
    });
}

// An interrupt burst with several Clause 73 bits pending delivers the
// events in state order and re-arms the consumed bits.
#[test]
fn test_clause73_interrupt_burst() {
    let (switch, regs) = new_switch(
        vec![backplane_port(1, 2)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(1)).unwrap();

    switch
        .an_restart_on_new_config(
            PortId(1),
            EthMode::An73,
            AutonegMode::Clause73,
            kr_base_page(),
            NextPages::default(),
        )
        .unwrap();

    let pending = AnIp::AN73_ABILITY_DETECT
        | AnIp::AN73_ACKNOWLEDGE_DETECT
        | AnIp::AN73_AN_GOOD;
    switch.an_event_handler(2, 0, pending).unwrap();

    switch.with_an_port(index, |an| {
        let sm = an.sm.as_ref().unwrap();
        assert_eq!(sm.state(), AnState::AnGood);
        // Config plus the three indications, in scan order.
        let states: Vec<AnState> =
            sm.history().map(|record| record.to).collect();
        assert_eq!(
            states,
            vec![
                AnState::TransmitDisable,
                AnState::AbilityDetect,
                AnState::AcknowledgeDetect,
                AnState::AnGood,
            ]
        );
    });

    let masks = regs.masks.lock().unwrap();
    assert_eq!(
        masks.last(),
        Some(&(pal::regs::an_im(2, 0), pending.bits(), false))
    );
}

// An interrupt on a lane no port owns is dropped, but still re-armed.
#[test]
fn test_orphan_lane_interrupt() {
    let (switch, regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );

    switch
        .an_event_handler(7, 3, AnIp::AN73_AN_GOOD)
        .unwrap();

    let masks = regs.masks.lock().unwrap();
    assert_eq!(
        masks.as_slice(),
        &[(pal::regs::an_im(7, 3), AnIp::AN73_AN_GOOD.bits(), false)]
    );
}

// 25G negotiated via next page only: the base page carries 10G-KR but the
// extended technology ability page lifts the outcome to 25G, single lane.
#[test]
fn test_25g_via_next_page_only() {
    let config = Config::default();
    let oui = config.autoneg_25g_nxt_pg_oui;
    let (switch, _regs) =
        new_switch(vec![backplane_port(1, 0)], config);

    let next_pages = ext_tech_pages(oui, true, false);
    let (speed, lanes) = switch
        .an_get_max_speed_ability_and_mode(
            PortId(1),
            AutonegMode::Clause73,
            kr_base_page(),
            &next_pages,
        )
        .unwrap();
    assert_eq!(speed, PortSpeed::Speed25G);
    assert_eq!(lanes, LaneMode::Single);

    // Without the next page the same base page resolves to 10G.
    let (speed, _) = switch
        .an_get_max_speed_ability_and_mode(
            PortId(1),
            AutonegMode::Clause73,
            kr_base_page(),
            &[],
        )
        .unwrap();
    assert_eq!(speed, PortSpeed::Speed10G);
}

// A base page carrying only unsupported abilities is rejected.
#[test]
fn test_validate_rejects_unsupported_only() {
    let (switch, _regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );
    let page = base_page::with_ability_field(
        0,
        Clause73Ability::KX4_10G | Clause73Ability::CR10_100G,
    );
    let err = switch
        .an_validate_base_page(PortId(1), AutonegMode::Clause73, page)
        .unwrap_err();
    assert!(matches!(err, XcvrdError::Unsupported(_)));
}

// Next pages queued through the API keep the next-page bit chained.
#[test]
fn test_add_next_page_chains_np_bit() {
    let (switch, _regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(1)).unwrap();

    switch.an_add_next_page(PortId(1), 0x5).unwrap();
    switch.an_add_next_page(PortId(1), 0x3).unwrap();

    switch.with_an_port(index, |an| {
        let pages = an.next_pages.as_slice();
        assert!(pages[0] & base_page::NP_BIT != 0);
        assert!(pages[1] & base_page::NP_BIT == 0);
    });
}

// Link-fail-inhibit timer bounds, with and without the out-of-spec
// override.
#[test]
fn test_link_inhibit_timer_bounds() {
    let (switch, _regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(1)).unwrap();

    // Zero selects the defaults.
    switch.an_73_set_link_inhibit_timer(PortId(1), 0).unwrap();
    switch.an_73_set_link_inhibit_timer_kx(PortId(1), 0).unwrap();
    switch.with_an_port(index, |an| {
        assert_eq!(an.link_inhibit_timer_ms, 500);
        assert_eq!(an.link_inhibit_timer_kx_ms, 50);
    });

    for ok in [1, 511] {
        switch.an_73_set_link_inhibit_timer(PortId(1), ok).unwrap();
    }
    for bad in [512, 1023, 1024] {
        assert!(
            switch.an_73_set_link_inhibit_timer(PortId(1), bad).is_err(),
            "{bad} should be out of range"
        );
    }

    let config = Config {
        an_timer_allow_out_spec: true,
        ..Config::default()
    };
    let (switch, _regs) = new_switch(vec![backplane_port(1, 0)], config);
    let index = switch.ports.index_of(PortId(1)).unwrap();
    for ok in [512, 1023] {
        switch.an_73_set_link_inhibit_timer(PortId(1), ok).unwrap();
    }
    assert!(switch.an_73_set_link_inhibit_timer(PortId(1), 1024).is_err());
    switch.with_an_port(index, |an| {
        assert_eq!(an.link_inhibit_timer_ms, 1023);
    });
}

// The ignore-nonce attribute is a read-modify-write of AN_73_CFG.
#[test]
fn test_ignore_nonce_register_update() {
    let (switch, regs) = new_switch(
        vec![backplane_port(5, 4)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(5)).unwrap();
    let addr = pal::regs::an_73_cfg(4, 0);

    switch.an_73_set_ignore_nonce(PortId(5), true).unwrap();
    assert_eq!(
        regs.regs.lock().unwrap().get(&addr),
        Some(&pal::regs::AN_73_CFG_IGNORE_NONCE_MATCH)
    );
    switch.with_an_port(index, |an| assert!(an.ignore_nonce));

    switch.an_73_set_ignore_nonce(PortId(5), false).unwrap();
    assert_eq!(regs.regs.lock().unwrap().get(&addr), Some(&0));
}

// EEE verification walks the partner's received next pages.
#[test]
fn test_eee_verification() {
    let (switch, _regs) = new_switch(
        vec![backplane_port(1, 0)],
        Config::default(),
    );
    let index = switch.ports.index_of(PortId(1)).unwrap();

    {
        let eee_page = u64::from(base_page::EEE_MSG_CODE)
            | base_page::EEE_10GBASE_KR;
        // Configure the negotiated mode, then record the pages the
        // partner sent.
        switch
            .an_restart_on_new_config(
                PortId(1),
                EthMode::An73,
                AutonegMode::Clause73,
                kr_base_page(),
                NextPages::default(),
            )
            .unwrap();
        let mut pages = NextPages::default();
        pages.add(eee_page).unwrap();
        switch.an_set_partner_next_pages(PortId(1), pages).unwrap();
    }

    assert!(switch
        .an_verify_eee_negotiation(PortId(1), EthMode::Base10GKr)
        .unwrap());
    assert!(!switch
        .an_verify_eee_negotiation(PortId(1), EthMode::Base1000Kx)
        .unwrap());
    switch.with_an_port(index, |an| assert!(!an.negotiated_eee));
}
