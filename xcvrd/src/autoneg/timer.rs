// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Autonegotiation timer scaling.
//!
//! The hardware expresses each autoneg timer as a (timescale, count) pair,
//! where the timescale selects a decade granularity and the count runs at
//! that granularity. Timescale 2 is a granularity of 1 µs and each higher
//! value multiplies it by ten, up to timescale 7.

use crate::types::XcvrdError;
use crate::types::XcvrdResult;

/// Valid range ceiling of the link-fail-inhibit timers, in milliseconds.
pub const LINK_FAIL_INHIBIT_TIMEOUT_MAX_MS: u32 = 511;
/// The hardware ceiling, reachable with `an_timer_allow_out_spec`.
pub const LINK_FAIL_INHIBIT_TIMEOUT_DEBUG_MS: u32 = 1023;

/// Default link-fail-inhibit timeout for the KR modes.
pub const LINK_INHIBIT_TIMER_DEFAULT_MS: u32 = 500;
/// Default link-fail-inhibit timeout for KX.
pub const LINK_INHIBIT_TIMER_DEFAULT_KX_MS: u32 = 50;

/// A hardware timer setting produced by [`an_get_time_scale`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AnTimerSetting {
    pub timescale: u32,
    pub count: u32,
    /// The timeout the hardware will actually run, in microseconds.
    pub effective_usec: u32,
}

/// Compute the (timescale, count) pair for a desired timeout.
///
/// Walks the timescales from finest to coarsest and returns the first whose
/// count fits under `max_count`; past the coarsest it returns the timescale
/// 7 setting regardless.
pub fn an_get_time_scale(timeout_usec: u32, max_count: u32) -> AnTimerSetting {
    let mut granularity: u64 = 1;
    let mut setting = AnTimerSetting {
        timescale: 2,
        count: timeout_usec,
        effective_usec: timeout_usec,
    };
    for timescale in 2..=7 {
        let count = u64::from(timeout_usec) / granularity;
        setting = AnTimerSetting {
            timescale,
            count: count as u32,
            effective_usec: (granularity * count) as u32,
        };
        if count < u64::from(max_count) {
            break;
        }
        granularity *= 10;
    }
    setting
}

/// Validate a user-supplied link-fail-inhibit timeout in milliseconds.
///
/// Zero selects `default_ms`. Otherwise the value must lie in 1..=511, or
/// 1..=1023 when the out-of-spec override is configured; values of 512 and
/// above land in the 10 ms timescale and are rounded down by the hardware.
pub fn checked_inhibit_timeout_ms(
    timeout_ms: u32,
    allow_out_spec: bool,
    default_ms: u32,
) -> XcvrdResult<u32> {
    if timeout_ms == 0 {
        return Ok(default_ms);
    }
    let max = if allow_out_spec {
        LINK_FAIL_INHIBIT_TIMEOUT_DEBUG_MS
    } else {
        LINK_FAIL_INHIBIT_TIMEOUT_MAX_MS
    };
    if timeout_ms > max {
        return Err(XcvrdError::InvalidArg(format!(
            "link inhibit timeout {timeout_ms} ms outside 1..={max}"
        )));
    }
    Ok(timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_scale_fine() {
        // 300 µs fits in the finest timescale.
        let s = an_get_time_scale(300, 1024);
        assert_eq!(s.timescale, 2);
        assert_eq!(s.count, 300);
        assert_eq!(s.effective_usec, 300);
    }

    #[test]
    fn test_time_scale_promotes() {
        // 500 ms with a 10-bit counter needs the 1 ms granularity.
        let s = an_get_time_scale(500_000, 1024);
        assert_eq!(s.timescale, 5);
        assert_eq!(s.count, 500);
        assert_eq!(s.effective_usec, 500_000);
    }

    #[test]
    fn test_time_scale_rounds_down() {
        let s = an_get_time_scale(1_234_567, 1024);
        assert_eq!(s.timescale, 6);
        assert_eq!(s.count, 123);
        assert_eq!(s.effective_usec, 1_230_000);
        // The error is below one granule.
        assert!(1_234_567 - s.effective_usec < 10_000);
    }

    #[test]
    fn test_time_scale_saturates_at_coarsest() {
        let s = an_get_time_scale(u32::MAX, 2);
        assert_eq!(s.timescale, 7);
    }

    #[test]
    fn test_time_scale_count_always_under_max() {
        for usec in [0, 1, 999, 1_000, 511_000, 512_000, 1_023_000] {
            let s = an_get_time_scale(usec, 1024);
            assert!(s.count < 1024, "count {} for {usec} µs", s.count);
        }
    }

    #[test]
    fn test_inhibit_timeout_range() {
        let default = LINK_INHIBIT_TIMER_DEFAULT_MS;
        assert_eq!(
            checked_inhibit_timeout_ms(0, false, default).unwrap(),
            default
        );
        assert_eq!(checked_inhibit_timeout_ms(1, false, default).unwrap(), 1);
        assert_eq!(
            checked_inhibit_timeout_ms(511, false, default).unwrap(),
            511
        );
        assert!(checked_inhibit_timeout_ms(512, false, default).is_err());
        assert!(checked_inhibit_timeout_ms(1024, false, default).is_err());

        assert_eq!(
            checked_inhibit_timeout_ms(512, true, default).unwrap(),
            512
        );
        assert_eq!(
            checked_inhibit_timeout_ms(1023, true, default).unwrap(),
            1023
        );
        assert!(checked_inhibit_timeout_ms(1024, true, default).is_err());
    }
}
