//! Sampling tick: read every monitored channel and publish what changed

use crate::core::{
    PropertyChanged, TickReport, GPIO_DESCRIPTION, METER_WATTS, REGISTER_DESCRIPTION, STATUS_LEVEL,
};
use crate::events::EventSink;
use crate::hardware::{PinSource, COUNTER_OFFSET, MONITORED_CHANNELS, PERIOD_OFFSET};
use crate::metering::calibration::{Calibration, ChannelKind};
use crate::metering::estimator::{MeterEvent, PowerEstimator};
use crate::metering::registers::RegisterStore;

/// Owns the register table and turns raw samples into events
pub struct SampleEngine {
    registers: RegisterStore,
    calibration: Calibration,
    tick_interval_ms: u32,
}

impl SampleEngine {
    pub fn new(calibration: Calibration, tick_interval_ms: u32) -> Self {
        Self {
            registers: RegisterStore::new(),
            calibration,
            tick_interval_ms,
        }
    }

    pub fn registers(&self) -> &RegisterStore {
        &self.registers
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    pub fn tick_interval_ms(&self) -> u32 {
        self.tick_interval_ms
    }

    /// Zero all registers
    pub fn reset(&mut self) {
        self.registers.reset();
    }

    /// Run one sampling pass over all monitored channels
    ///
    /// A channel whose pins cannot be read is logged and skipped; the
    /// remaining channels are still processed.
    pub fn tick(
        &mut self,
        source: &dyn PinSource,
        sink: &mut dyn EventSink,
        send_counters: bool,
    ) -> TickReport {
        let estimator = PowerEstimator::new(self.calibration.pulses_per_watt());
        let mut report = TickReport::default();

        for channel in 0..MONITORED_CHANNELS {
            let sample = match source.read_channel(channel) {
                Ok(sample) => sample,
                Err(e) => {
                    log::warn!("Skipping channel {} this tick: {}", channel, e);
                    report.skipped += 1;
                    continue;
                }
            };
            report.sampled += 1;

            let Some(regs) = self.registers.get_mut(channel) else {
                continue;
            };
            regs.store(sample);

            match self.calibration.classify(channel) {
                ChannelKind::Input => {
                    if regs.has_new_pulse() {
                        sink.emit(PropertyChanged::new(
                            channel,
                            GPIO_DESCRIPTION,
                            STATUS_LEVEL,
                            regs.status,
                        ));
                        report.emitted += 1;
                        regs.last_counter = regs.counter;
                    }
                }
                ChannelKind::Metering => {
                    for event in estimator.evaluate(regs, send_counters, self.tick_interval_ms) {
                        report.emitted += publish(channel, event, sink);
                    }
                }
            }
        }

        report
    }
}

/// Forward a metering outcome to the sink, returning how many events went out
fn publish(channel: u8, event: MeterEvent, sink: &mut dyn EventSink) -> usize {
    match event {
        MeterEvent::Counter(counter) => {
            sink.emit(PropertyChanged::new(
                channel + COUNTER_OFFSET,
                REGISTER_DESCRIPTION,
                STATUS_LEVEL,
                counter,
            ));
            1
        }
        MeterEvent::Watts { watts, estimated } => {
            let address = channel + PERIOD_OFFSET;
            if estimated {
                log::debug!("channel {} estimated {:.1} W (no pulse)", channel, watts);
            } else {
                log::debug!("channel {} confirmed {:.1} W", channel, watts);
            }
            // the level carries the text form, the meter property the number
            let level = watts.to_string();
            sink.emit(PropertyChanged::new(address, REGISTER_DESCRIPTION, STATUS_LEVEL, level.as_str()));
            sink.emit(PropertyChanged::new(address, REGISTER_DESCRIPTION, METER_WATTS, watts));
            2
        }
    }
}
