//! Driver lifecycle
//!
//! Ties the pin source, the event sink and the sampling engine together
//! behind one mutex shared by the sampling loop and command handling.

mod commands;
mod scheduler;

pub use commands::Command;
pub use scheduler::{CounterBudget, Scheduler, SchedulerState};

use crate::core::{Error, MeteringConfig, ModuleInfo, Result, TickReport};
use crate::events::EventSink;
use crate::hardware::{gpio_addresses, register_addresses, PinSource};
use crate::metering::{Calibration, Registers, SampleEngine};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How long `disconnect` waits for a tick stuck in pin I/O
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(2);

/// State touched by both the sampling loop and host commands
pub struct DriverState {
    engine: SampleEngine,
    source: Box<dyn PinSource>,
    sink: Box<dyn EventSink>,
    /// Last known level of every GPIO line
    gpio_pins: BTreeMap<u8, bool>,
    /// Last known text of every register file
    reg_pins: BTreeMap<u8, String>,
}

impl DriverState {
    fn new(engine: SampleEngine, source: Box<dyn PinSource>, sink: Box<dyn EventSink>) -> Self {
        Self {
            engine,
            source,
            sink,
            gpio_pins: gpio_addresses().map(|a| (a, false)).collect(),
            reg_pins: register_addresses().map(|a| (a, "0".to_string())).collect(),
        }
    }

    /// Run one sampling pass
    pub fn tick(&mut self, send_counters: bool) -> TickReport {
        self.engine.tick(self.source.as_ref(), self.sink.as_mut(), send_counters)
    }

    pub fn engine(&self) -> &SampleEngine {
        &self.engine
    }

    pub fn gpio_level(&self, address: u8) -> Option<bool> {
        self.gpio_pins.get(&address).copied()
    }

    pub fn register_value(&self, address: u8) -> Option<&str> {
        self.reg_pins.get(&address).map(String::as_str)
    }
}

/// Handle shared between the driver and its sampling task
pub type SharedState = Arc<Mutex<DriverState>>;

/// Metering driver for one board
pub struct Driver {
    config: MeteringConfig,
    shared: SharedState,
    scheduler: Scheduler,
    present: bool,
}

impl Driver {
    /// Create a driver; `present` tells whether the board was found
    pub fn new(
        config: MeteringConfig,
        source: Box<dyn PinSource>,
        sink: Box<dyn EventSink>,
        present: bool,
    ) -> Result<Self> {
        if config.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be > 0".to_string()));
        }
        let calibration = Calibration::from_config(&config)?;
        let engine = SampleEngine::new(calibration, config.tick_interval_ms);
        log::info!("Driver created on {} (present: {})", source.name(), present);

        Ok(Self {
            config,
            shared: Arc::new(Mutex::new(DriverState::new(engine, source, sink))),
            scheduler: Scheduler::new(),
            present,
        })
    }

    /// Apply the configured calibration and start sampling if the board is present
    pub async fn connect(&mut self) -> Result<bool> {
        {
            let mut state = self.shared.lock().await;
            let calibration = state.engine.calibration_mut();
            calibration.set_input_channel_count(self.config.input_channel_count)?;
            calibration.set_pulses_per_watt(self.config.pulses_per_watt)?;
        }

        if self.present {
            self.scheduler.start(
                Arc::clone(&self.shared),
                self.config.tick_interval_ms,
                self.config.send_counters_every_ms,
            );
            log::info!(
                "Connected: {} input channels, {} pulses per watt",
                self.config.input_channel_count,
                self.config.pulses_per_watt
            );
        } else {
            log::warn!("Board not present, sampling not started");
        }

        Ok(self.present)
    }

    /// Stop sampling and drive every output to off
    ///
    /// A tick already blocked in pin I/O keeps the state locked and may still
    /// publish its events once it completes. Output cleanup waits for it for
    /// at most two seconds and then gives up with [`Error::Timeout`].
    pub async fn disconnect(&mut self) -> Result<()> {
        self.scheduler.stop().await;
        log::info!("Disconnected");

        match tokio::time::timeout(CLEANUP_TIMEOUT, self.shared.lock()).await {
            Ok(mut state) => state.clean_up_all_pins(),
            Err(_) => Err(Error::Timeout(
                "pin cleanup skipped, a sampling tick is still running".to_string(),
            )),
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn is_connected(&self) -> bool {
        self.scheduler.state() == SchedulerState::Running
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.shared)
    }

    /// Change how many leading channels are plain inputs (0-7)
    pub async fn set_input_channel_count(&mut self, count: u8) -> Result<()> {
        self.shared
            .lock()
            .await
            .engine
            .calibration_mut()
            .set_input_channel_count(count)?;
        self.config.input_channel_count = count;
        Ok(())
    }

    /// Change the meter constant (>= 0, 0 is taken as 1.0)
    pub async fn set_pulses_per_watt(&mut self, pulses_per_watt: f64) -> Result<()> {
        self.shared
            .lock()
            .await
            .engine
            .calibration_mut()
            .set_pulses_per_watt(pulses_per_watt)?;
        self.config.pulses_per_watt = pulses_per_watt;
        Ok(())
    }

    pub async fn calibration(&self) -> Calibration {
        self.shared.lock().await.engine.calibration().clone()
    }

    /// Execute a host command
    pub async fn execute(&self, command: Command, address: u8) -> Result<Option<String>> {
        self.shared.lock().await.execute(command, address)
    }

    /// List modules and publish their current values
    pub async fn modules(&self) -> Vec<ModuleInfo> {
        self.shared.lock().await.modules()
    }

    /// Snapshot of one channel's registers
    pub async fn registers(&self, channel: u8) -> Option<Registers> {
        self.shared.lock().await.engine.registers().get(channel).copied()
    }

    /// Run a single tick outside the scheduler
    pub async fn tick_now(&self, send_counters: bool) -> TickReport {
        self.shared.lock().await.tick(send_counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GPIO_DESCRIPTION, METER_WATTS};
    use crate::events::MemorySink;
    use crate::hardware::{SysfsBoard, MONITORED_CHANNELS};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Temporary directory laid out like the board's sysfs files
    struct FakeSysfs {
        dir: tempfile::TempDir,
    }

    impl FakeSysfs {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let fake = Self { dir };
            fs::create_dir_all(fake.input_dir()).unwrap();
            for channel in 0..MONITORED_CHANNELS {
                fake.set_channel(channel, 0, 0, 0);
            }
            for led in ["led_orange", "led_green", "output1", "output2"] {
                fs::create_dir_all(fake.led_dir().join(led)).unwrap();
                fs::write(fake.led_dir().join(led).join("brightness"), "0\n").unwrap();
            }
            fake
        }

        fn input_dir(&self) -> PathBuf {
            self.dir.path().join("lgw4m-8di")
        }

        fn led_dir(&self) -> PathBuf {
            self.dir.path().join("leds")
        }

        fn set_channel(&self, channel: u8, status: u32, counter: u32, period_us: u32) {
            let input = self.input_dir();
            // counter last: a tick that sees the new counter also sees the rest
            fs::write(input.join(format!("in{}_periode", channel)), format!("{}\n", period_us)).unwrap();
            fs::write(input.join(format!("in{}_value", channel)), format!("{}\n", status)).unwrap();
            fs::write(input.join(format!("in{}_counter", channel)), format!("{}\n", counter)).unwrap();
        }

        fn read(&self, relative: &str) -> String {
            fs::read_to_string(self.dir.path().join(relative)).unwrap().trim().to_string()
        }

        fn board(&self) -> Box<dyn PinSource> {
            Box::new(SysfsBoard::detect(&self.input_dir(), &self.led_dir()).unwrap())
        }
    }

    fn metering_config(tick_interval_ms: u32) -> MeteringConfig {
        MeteringConfig {
            input_channel_count: 6,
            pulses_per_watt: 2.0,
            tick_interval_ms,
            send_counters_every_ms: 0,
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done()
    }

    #[tokio::test]
    async fn test_reset_clears_outputs_and_registers() {
        let fake = FakeSysfs::new();
        let sink = MemorySink::new();
        let driver =
            Driver::new(metering_config(1000), fake.board(), Box::new(sink.clone()), false).unwrap();

        driver.execute(Command::ControlOn, 10).await.unwrap();
        assert_eq!(fake.read("leds/output1/brightness"), "1");
        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].description, GPIO_DESCRIPTION);
        assert_eq!(driver.state().lock().await.gpio_level(10), Some(true));

        fake.set_channel(7, 1, 5, 1_000_000);
        driver.tick_now(false).await;
        assert_eq!(driver.registers(7).await.unwrap().counter, 5);
        assert_eq!(driver.registers(7).await.unwrap().last_period, 1000);

        assert_eq!(driver.execute(Command::ControlReset, 0).await.unwrap(), None);

        assert_eq!(fake.read("leds/output1/brightness"), "0");
        assert_eq!(fake.read("lgw4m-8di/in7_counter"), "0");
        assert_eq!(fake.read("lgw4m-8di/in7_periode"), "0");
        for channel in 0..MONITORED_CHANNELS {
            assert_eq!(driver.registers(channel).await.unwrap(), Registers::default());
        }
        assert_eq!(driver.execute(Command::ParameterStatus, 10).await.unwrap(), Some("0".to_string()));
        assert_eq!(driver.execute(Command::ParameterStatus, 23).await.unwrap(), Some("0".to_string()));

        let state = driver.state();
        let state = state.lock().await;
        assert_eq!(state.gpio_level(10), Some(false));
        assert_eq!(state.register_value(23), Some("0"));
    }

    #[tokio::test]
    async fn test_status_refreshes_cached_values() {
        let fake = FakeSysfs::new();
        let driver =
            Driver::new(metering_config(1000), fake.board(), Box::new(MemorySink::new()), false).unwrap();

        fake.set_channel(3, 1, 17, 0);
        assert_eq!(driver.execute(Command::ParameterStatus, 3).await.unwrap(), Some("1".to_string()));
        assert_eq!(driver.execute(Command::ParameterStatus, 19).await.unwrap(), Some("17".to_string()));

        let state = driver.state();
        let state = state.lock().await;
        assert_eq!(state.gpio_level(3), Some(true));
        assert_eq!(state.register_value(19), Some("17"));
    }

    #[tokio::test]
    async fn test_unknown_address_rejected() {
        let fake = FakeSysfs::new();
        let driver =
            Driver::new(metering_config(1000), fake.board(), Box::new(MemorySink::new()), false).unwrap();

        assert!(matches!(
            driver.execute(Command::ControlOn, 12).await,
            Err(Error::UnknownAddress(12))
        ));
    }

    #[tokio::test]
    async fn test_modules_listing() {
        let fake = FakeSysfs::new();
        let sink = MemorySink::new();
        let driver =
            Driver::new(metering_config(1000), fake.board(), Box::new(sink.clone()), false).unwrap();

        let modules = driver.modules().await;
        assert_eq!(modules.len(), 28);
        assert_eq!(
            modules.iter().filter(|m| m.module_type == crate::core::ModuleType::Sensor).count(),
            16
        );
        assert_eq!(sink.len(), 28);
    }

    #[tokio::test]
    async fn test_calibration_setters_validate() {
        let fake = FakeSysfs::new();
        let mut driver =
            Driver::new(metering_config(1000), fake.board(), Box::new(MemorySink::new()), false).unwrap();

        driver.set_input_channel_count(4).await.unwrap();
        assert!(matches!(
            driver.set_input_channel_count(9).await,
            Err(Error::InvalidCalibration(_))
        ));
        assert_eq!(driver.calibration().await.input_channel_count(), 4);

        driver.set_pulses_per_watt(0.0).await.unwrap();
        assert_eq!(driver.calibration().await.pulses_per_watt(), 1.0);
        assert!(driver.set_pulses_per_watt(-2.0).await.is_err());
        assert_eq!(driver.calibration().await.pulses_per_watt(), 1.0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_creation() {
        let fake = FakeSysfs::new();
        let config = MeteringConfig {
            input_channel_count: 8,
            ..metering_config(1000)
        };

        assert!(matches!(
            Driver::new(config, fake.board(), Box::new(MemorySink::new()), true),
            Err(Error::InvalidCalibration(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_tick_interval_rejected_at_creation() {
        let fake = FakeSysfs::new();

        assert!(matches!(
            Driver::new(metering_config(0), fake.board(), Box::new(MemorySink::new()), true),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_absent_board_stays_idle() {
        let fake = FakeSysfs::new();
        let mut driver =
            Driver::new(metering_config(10), fake.board(), Box::new(MemorySink::new()), false).unwrap();

        assert!(!driver.connect().await.unwrap());
        assert_eq!(driver.scheduler_state(), SchedulerState::Idle);
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn test_connected_driver_samples_until_disconnect() {
        let fake = FakeSysfs::new();
        let sink = MemorySink::new();
        let mut driver =
            Driver::new(metering_config(10), fake.board(), Box::new(sink.clone()), true).unwrap();

        driver.execute(Command::ControlOn, 8).await.unwrap();
        sink.take();

        assert!(driver.connect().await.unwrap());
        assert!(driver.is_connected());

        fake.set_channel(6, 1, 3, 1_000_000);
        assert!(wait_until(|| sink.events().iter().any(|e| e.property == METER_WATTS)).await);

        let watts = sink
            .events()
            .into_iter()
            .find(|e| e.property == METER_WATTS)
            .and_then(|e| e.value.as_f64());
        assert_eq!(watts, Some(1800.0));
        assert!(sink.events().iter().any(|e| e.source == "22"));

        driver.disconnect().await.unwrap();
        assert_eq!(driver.scheduler_state(), SchedulerState::Idle);
        assert_eq!(fake.read("leds/led_orange/brightness"), "0");

        let seen = sink.len();
        fake.set_channel(0, 1, 1, 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.len(), seen);
    }

    #[tokio::test]
    async fn test_missing_file_does_not_stop_sampling() {
        let fake = FakeSysfs::new();
        let sink = MemorySink::new();
        let mut driver =
            Driver::new(metering_config(10), fake.board(), Box::new(sink.clone()), true).unwrap();

        fs::remove_file(fake.input_dir().join("in1_counter")).unwrap();
        driver.connect().await.unwrap();

        fake.set_channel(2, 1, 1, 0);
        assert!(wait_until(|| sink.events().iter().any(|e| e.source == "2")).await);
        assert!(driver.is_connected());

        driver.disconnect().await.unwrap();
    }

    /// Pin source whose reads block until released
    struct StuckPins {
        release: std::sync::Mutex<mpsc::Receiver<()>>,
    }

    impl PinSource for StuckPins {
        fn read(&self, _address: u8) -> Result<String> {
            let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(5));
            Ok("0".to_string())
        }

        fn write(&self, _address: u8, _value: &str) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "stuck"
        }

        fn is_emulated(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_stop_does_not_wait_for_stuck_tick() {
        let (release_tx, release_rx) = mpsc::channel();
        let pins = StuckPins {
            release: std::sync::Mutex::new(release_rx),
        };
        let mut scheduler = Scheduler::new();
        let engine = SampleEngine::new(Calibration::new(), 10);
        let shared = Arc::new(Mutex::new(DriverState::new(
            engine,
            Box::new(pins),
            Box::new(MemorySink::new()),
        )));

        scheduler.start(Arc::clone(&shared), 10, 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        let stopped = tokio::time::timeout(Duration::from_secs(1), scheduler.stop()).await;
        assert!(stopped.is_ok());
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        // unblock the abandoned tick so the runtime can shut down
        drop(release_tx);
    }

    #[tokio::test]
    async fn test_disconnect_gives_up_on_stuck_tick() {
        let (release_tx, release_rx) = mpsc::channel();
        let pins = StuckPins {
            release: std::sync::Mutex::new(release_rx),
        };
        let mut driver =
            Driver::new(metering_config(10), Box::new(pins), Box::new(MemorySink::new()), true).unwrap();

        driver.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = tokio::time::timeout(Duration::from_secs(4), driver.disconnect()).await;
        assert!(matches!(result, Ok(Err(Error::Timeout(_)))));
        assert!(!driver.is_connected());

        drop(release_tx);
    }
}
