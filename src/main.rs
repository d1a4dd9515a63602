#![no_std]
#![no_main]

use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};

extern crate alloc;

// WiFi imports
use esp_wifi::wifi;

// Embassy imports
use embassy_futures::select::{select3, Either3};
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{Duration, Instant, Timer};
use esp_hal_embassy::Executor;
use static_cell::StaticCell;

use doorbell_rs::board::{EspWifiLink, TcpTransport};
use doorbell_rs::hal::HalPins;
use doorbell_rs::power::PowerDecision;
use doorbell_rs::{Config, Doorbell};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

type DoorbellPins = HalPins<
    Input<'static>,
    Input<'static>,
    Output<'static>,
    Output<'static>,
    Output<'static>,
    Output<'static>,
>;
type App = Doorbell<'static, DoorbellPins, Delay, EspWifiLink<'static>, TcpTransport<'static>>;

// Static cells for embassy components
static CONFIG_CELL: StaticCell<Config> = StaticCell::new();
static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    esp_println::println!("[MAIN] Panic: {}", info);
    loop {}
}

// Embassy task to run the network stack
#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, wifi::WifiDevice<'static>>) -> ! {
    runner.run().await
}

// Doorbell control loop
#[embassy_executor::task]
async fn doorbell_task(mut doorbell: App, tick_interval: Duration) -> ! {
    info!("[MAIN] Control loop started");

    loop {
        match doorbell.tick(Instant::now()).await {
            PowerDecision::StayActive => Timer::after(tick_interval).await,
            PowerDecision::Sleep { until } => {
                // The executor idles the core until the timer or a pin edge fires
                let pins = doorbell.io_mut();
                let woke = select3(
                    Timer::at(until),
                    pins.button.wait_for_any_edge(),
                    pins.pir.wait_for_any_edge(),
                )
                .await;
                if !matches!(woke, Either3::First(_)) {
                    doorbell.wake(Instant::now());
                }
            }
        }
    }
}

#[esp_hal::main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    let config = Config::load();
    esp_println::logger::init_logger(config.as_ref().map_or(log::LevelFilter::Info, Config::log_level));
    let config: &'static Config = match config {
        Ok(config) => CONFIG_CELL.init(config),
        Err(e) => {
            error!("[MAIN] Invalid configuration: {}", e);
            panic!("invalid configuration");
        }
    };
    info!("[MAIN] doorbell-rs v{}", doorbell_rs::VERSION);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let mut rng = Rng::new(peripherals.RNG);
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let wifi_init = esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK).unwrap();
    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);

    let (wifi_controller, wifi_interfaces) = wifi::new(wifi_init_ref, peripherals.WIFI).unwrap();
    info!("[WIFI] WiFi driver initialized successfully");

    // Create embassy-net stack with DHCP configuration
    let stack_resources = STACK_RESOURCES.init(StackResources::new());
    let net_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, runner): (Stack<'static>, _) =
        embassy_net::new(wifi_interfaces.sta, net_config, stack_resources, seed);
    info!("[WIFI] Embassy-net stack created with DHCP configuration");

    // GPIO peripherals are typed per pin; keep them in sync with config::defaults
    let pins = HalPins::new(
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
    info!(
        "[MAIN] PIR GPIO{}, button GPIO{}, camera GPIO{}",
        config.pins.pir, config.pins.doorbell_button, config.pins.camera_trigger
    );

    let doorbell = Doorbell::new(
        config,
        pins,
        Delay::new(),
        EspWifiLink::new(wifi_controller, stack),
        TcpTransport::new(stack),
        Instant::now(),
    );

    // Initialize embassy executor and run tasks
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        info!("[MAIN] Spawning network task...");
        spawner.spawn(net_task(runner)).ok();

        info!("[MAIN] Spawning doorbell task...");
        if let Err(e) = spawner.spawn(doorbell_task(doorbell, config.power.tick_interval)) {
            error!("[MAIN] Failed to spawn doorbell task: {:?}", e);
        }
    });
}
