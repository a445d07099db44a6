//! Pulsemeter - Demo CLI
//!
//! Drives the metering engine against the emulated board and prints the
//! events it publishes. No hardware needed.

use pulsemeter_lib::core::{MeteringConfig, PropertyChanged, METER_WATTS};
use pulsemeter_lib::driver::{Command, CounterBudget, Driver};
use pulsemeter_lib::events::MemorySink;
use pulsemeter_lib::hardware::{EmulatedBoard, COUNTER_OFFSET, PERIOD_OFFSET};

const TICKS: u32 = 20;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("==============================================");
    println!("   Pulsemeter - Demo CLI (emulated board)");
    println!("==============================================\n");

    // 1. Driver on the emulated board
    println!("[1/3] Creating driver...");
    let config = MeteringConfig {
        tick_interval_ms: 1000,
        send_counters_every_ms: 5000,
        ..Default::default()
    };
    let sink = MemorySink::new();
    let mut driver = Driver::new(
        config.clone(),
        Box::new(EmulatedBoard::new()),
        Box::new(sink.clone()),
        true,
    )?;
    let calibration = driver.calibration().await;
    println!("      Input channels:  0..{}", calibration.input_channel_count());
    println!("      Pulses per watt: {}\n", calibration.pulses_per_watt());

    // 2. Module listing and a switched output
    println!("[2/3] Listing modules...");
    let modules = driver.modules().await;
    println!("      {} modules", modules.len());
    driver.execute(Command::ControlOn, 9).await?;
    println!("      Green LED on");
    sink.take();
    println!();

    // 3. Sampling
    println!("[3/3] Sampling {} ticks...\n", TICKS);
    println!("----------------------------------------------");
    println!("  Tick | Counters | Watts events");
    println!("----------------------------------------------");

    let mut budget = CounterBudget::new(config.send_counters_every_ms);
    let mut total_watts = 0;
    let mut total_counters = 0;

    for tick in 1..=TICKS {
        let send_counters = budget.next_tick(config.tick_interval_ms);
        driver.tick_now(send_counters).await;

        let events = sink.take();
        let counters = events.iter().filter(|e| is_counter(e)).count();
        let watts: Vec<String> = events
            .iter()
            .filter(|e| e.is_watts())
            .map(|e| format!("{}={}", e.source, e.value))
            .collect();
        total_watts += watts.len();
        total_counters += counters;

        println!(
            "  {:>4} | {:>8} | {}",
            tick,
            counters,
            if watts.is_empty() { "-".to_string() } else { watts.join(" ") }
        );
    }

    println!("----------------------------------------------\n");

    // Summary
    println!("=== Session Summary ===\n");
    println!("  Ticks:          {}", TICKS);
    println!("  Counter events: {}", total_counters);
    println!("  Watts events:   {}", total_watts);
    for channel in calibration.input_channel_count()..8 {
        if let Some(registers) = driver.registers(channel).await {
            println!(
                "  Channel {}:      counter={} period={}ms last_period={}ms",
                channel, registers.counter, registers.period, registers.last_period
            );
        }
    }

    driver.disconnect().await?;
    println!("\n  Outputs cleared, driver disconnected");
    println!("\n==============================================\n");

    Ok(())
}

fn is_counter(event: &PropertyChanged) -> bool {
    let Ok(source) = event.source.parse::<u8>() else {
        return false;
    };
    (COUNTER_OFFSET..PERIOD_OFFSET).contains(&source) && event.property != METER_WATTS
}
