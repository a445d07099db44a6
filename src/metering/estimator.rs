//! Pulse-to-watt conversion for metering channels
//!
//! An energy meter's pulse output fires once per fixed amount of energy, so
//! the time between two pulses gives the instantaneous power draw. Readings
//! are only published when the period moves by more than
//! [`CONFIRM_THRESHOLD_PERCENT`], which keeps a steady load from flooding
//! the host. When pulses stop arriving, the elapsed time is used as a lower
//! bound on the period so the reported draw decays instead of staying stale.

use crate::metering::registers::Registers;

/// Converts a millisecond period and a pulses-per-Wh constant into watts
pub const WATT_CONVERSION: f64 = 3_600_000.0;

/// Minimum period change, in percent, for a reading to be confirmed
pub const CONFIRM_THRESHOLD_PERCENT: f64 = 7.5;

/// Decay estimates are published every this many ticks without a pulse
pub const DECAY_EVERY_TICKS: u32 = 5;

/// Outcome of evaluating one metering channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterEvent {
    /// Raw pulse counter, published on the counter register
    Counter(u32),
    /// Power draw, published on the period register
    Watts {
        watts: f64,
        /// True for a decay estimate, false for a confirmed reading
        estimated: bool,
    },
}

/// Power estimator for a given meter constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerEstimator {
    pulses_per_watt: f64,
}

impl PowerEstimator {
    pub fn new(pulses_per_watt: f64) -> Self {
        Self { pulses_per_watt }
    }

    /// Watts drawn when pulses arrive every `period_ms`
    ///
    /// A zero period (no measurement yet) yields 0 W.
    pub fn watts_for_period(&self, period_ms: u32) -> f64 {
        let divisor = period_ms as f64 * self.pulses_per_watt;
        if divisor != 0.0 {
            WATT_CONVERSION / divisor
        } else {
            0.0
        }
    }

    /// Relative change between the confirmed and the new period, in percent
    ///
    /// With no confirmed period yet any non-zero period counts as an
    /// unbounded change; two zero periods count as no change.
    pub fn delta_percent(last_period: u32, period: u32) -> f64 {
        let diff = last_period.abs_diff(period);
        if last_period == 0 {
            return if diff == 0 { 0.0 } else { f64::INFINITY };
        }
        (diff as f64 / last_period as f64) * 100.0
    }

    /// Evaluate a metering channel after its raw sample was stored
    pub fn evaluate(
        &self,
        regs: &mut Registers,
        send_counters: bool,
        tick_interval_ms: u32,
    ) -> Vec<MeterEvent> {
        let mut events = Vec::new();

        if regs.has_new_pulse() {
            if send_counters {
                events.push(MeterEvent::Counter(regs.counter));
            }

            let watts = self.watts_for_period(regs.period);
            let delta = Self::delta_percent(regs.last_period, regs.period);
            if delta > CONFIRM_THRESHOLD_PERCENT {
                events.push(MeterEvent::Watts { watts, estimated: false });
                regs.last_period = regs.period;
            }
            log::trace!(
                "pulse: counter={} period={}ms watts={:.1} delta={:.2}%",
                regs.counter,
                regs.period,
                watts,
                delta
            );

            regs.last_counter = regs.counter;
            regs.last_period_elapsed_ms = 0;
        } else {
            regs.last_period_elapsed_ms = regs.last_period_elapsed_ms.saturating_add(tick_interval_ms);

            if self.decay_due(regs, tick_interval_ms) {
                let divisor = regs.last_period_elapsed_ms as f64 * self.pulses_per_watt;
                let watts = WATT_CONVERSION / divisor;
                log::trace!(
                    "no pulse for {}ms, estimated watts={:.1}",
                    regs.last_period_elapsed_ms,
                    watts
                );
                events.push(MeterEvent::Watts { watts, estimated: true });
            }
        }

        events
    }

    fn decay_due(&self, regs: &Registers, tick_interval_ms: u32) -> bool {
        let on_cadence = tick_interval_ms
            .checked_mul(DECAY_EVERY_TICKS)
            .and_then(|every| regs.last_period_elapsed_ms.checked_rem(every))
            .map_or(false, |rem| rem == 0);

        on_cadence && regs.last_period_elapsed_ms > regs.period && regs.last_period > 0
    }
}
