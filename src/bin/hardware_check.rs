//! On-device wiring check
//!
//! Exercises every pin role through the same code paths the doorbell uses:
//! each output is pulsed, the inputs are sampled for a few seconds and the
//! status LED plays every pattern once.

#![no_std]
#![no_main]

extern crate alloc;

use doorbell_rs::capture::CaptureTrigger;
use doorbell_rs::hal::HalPins;
use doorbell_rs::indicator::{IndicatorPattern, StatusIndicator};
use doorbell_rs::input::{EdgeKind, InputReader};
use doorbell_rs::{Config, DoorbellIo, PinRole};
use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::time::Instant as HalInstant;
use esp_println::println;

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("[CHECK] Panic: {}", info);
    loop {}
}

/// Milliseconds since boot as an embassy-time instant
fn now() -> Instant {
    Instant::from_millis(HalInstant::now().duration_since_epoch().as_millis())
}

#[esp_hal::main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    // Initialize heap allocator
    esp_alloc::heap_allocator!(size: 32 * 1024);

    println!("=== Doorbell hardware check ===");

    println!("\n1. Configuration");
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Invalid configuration: {}", e);
            panic!("invalid configuration");
        }
    };
    println!("✅ Configuration valid, server {}", config.server.url);

    let mut io = HalPins::new(
        Input::new(peripherals.GPIO1, InputConfig::default().with_pull(Pull::Down)),
        Input::new(
            peripherals.GPIO3,
            InputConfig::default().with_pull(if config.sensors.doorbell_active_low { Pull::Up } else { Pull::Down }),
        ),
        Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO6, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO7, Level::Low, OutputConfig::default()),
        config.pins,
    );
    let mut delay = Delay::new();

    println!("\n2. Outputs");
    for role in [PinRole::StatusLed, PinRole::MotionLed, PinRole::Buzzer] {
        let pulse = io
            .write_pin(role, true)
            .and_then(|_| {
                delay.delay_ms(300);
                io.write_pin(role, false)
            });
        match pulse {
            Ok(()) => println!("✅ {:?} on GPIO{} pulsed", role, config.pins.pin(role)),
            Err(e) => println!("❌ {}", e),
        }
        delay.delay_ms(300);
    }

    let capture = CaptureTrigger::new(&config);
    match capture.fire(&mut io, &mut delay) {
        Ok(()) => println!("✅ Camera trigger pulsed for {} ms", config.camera.trigger_duration.as_millis()),
        Err(e) => println!("❌ {}", e),
    }

    println!("\n3. Inputs (press the button and wave at the PIR for 10 s)");
    let mut inputs = InputReader::new(&config);
    let deadline = now() + Duration::from_secs(10);
    let (mut presses, mut motions) = (0u32, 0u32);
    while now() < deadline {
        for role in [PinRole::DoorbellButton, PinRole::Pir] {
            match inputs.poll(&mut io, role, now()) {
                Ok(Some(edge)) => {
                    println!("   {:?} {:?} at {} ms", edge.role, edge.kind, edge.at.as_millis());
                    match (role, edge.kind) {
                        (PinRole::DoorbellButton, EdgeKind::Activated) => presses += 1,
                        (PinRole::Pir, EdgeKind::Activated) => motions += 1,
                        _ => {}
                    }
                }
                Ok(None) => {}
                Err(e) => println!("❌ {}", e),
            }
        }
        delay.delay_ms(config.power.tick_interval.as_millis() as u32);
    }
    println!("✅ {} button press(es), {} motion onset(s)", presses, motions);

    println!("\n4. Status LED patterns");
    let mut led = StatusIndicator::new(config.indicators.alert_hold, now());
    for pattern in [
        IndicatorPattern::Connecting,
        IndicatorPattern::Online,
        IndicatorPattern::Offline,
        IndicatorPattern::ServerRejected,
        IndicatorPattern::HardwareFault,
    ] {
        println!("   {:?}", pattern);
        if pattern.is_alert() {
            led.raise_alert(pattern, now());
        } else {
            led.set_pattern(pattern, now());
        }
        let end = now() + Duration::from_secs(3);
        while now() < end {
            if let Err(e) = led.refresh(&mut io, now()) {
                println!("❌ {}", e);
                break;
            }
            delay.delay_ms(10);
        }
    }
    let _ = io.write_pin(PinRole::StatusLed, false);

    println!("\n=== Hardware check complete ===");
    loop {
        delay.delay_ms(1000);
    }
}
