//! Device configuration
//!
//! All settings are compiled in. [`defaults`] holds the raw constants (the
//! string values come from the build environment, see `build.rs`) and
//! [`Config::load`] turns them into one validated, immutable value that is
//! shared by reference with every component.

use core::fmt;

use embassy_time::Duration;

use crate::hal::PinRole;
use crate::http::ServerUrl;

/// Default configuration constants
pub mod defaults {
    /// WiFi configuration
    /// Read from environment variables at compile time
    pub const WIFI_SSID: &str = env!("WIFI_SSID");
    pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

    /// Report server base URL and API key
    pub const SERVER_URL: &str = env!("SERVER_URL");
    pub const API_KEY: &str = env!("API_KEY");

    /// Device identity sent with every report
    pub const DEVICE_ID: &str = env!("DEVICE_ID");
    pub const LOCATION: &str = env!("LOCATION");
    pub const DEBUG_MODE: bool = true;

    // GPIO assignments (ESP32-C3)
    pub const PIR_SENSOR_PIN: u8 = 1;
    pub const DOORBELL_BUTTON_PIN: u8 = 3;
    pub const STATUS_LED_PIN: u8 = 4;
    pub const MOTION_LED_PIN: u8 = 5;
    pub const BUZZER_PIN: u8 = 6;
    pub const CAMERA_TRIGGER_PIN: u8 = 7;
    /// Button wired to ground with the internal pull-up enabled
    pub const DOORBELL_ACTIVE_LOW: bool = true;

    /// PIR sensitivity, 1 (least) to 10 (most sensitive)
    pub const PIR_SENSITIVITY: u8 = 7;
    pub const MOTION_TIMEOUT_MS: u64 = 5000;
    pub const DOORBELL_DEBOUNCE_MS: u64 = 300;
    pub const PIR_DEBOUNCE_MS: u64 = 50;

    pub const MAX_WIFI_RETRY: u32 = 20;
    pub const WIFI_RETRY_INTERVAL_MS: u64 = 500;
    /// How long the link stays offline before a fresh reconnect cycle
    pub const WIFI_OFFLINE_RETRY_INTERVAL_MS: u64 = 300_000;

    pub const HTTP_TIMEOUT_MS: u64 = 5000;
    pub const MAX_REPORT_ATTEMPTS: u8 = 5;
    pub const MAX_BACKOFF_MS: u64 = 120_000;
    pub const STATUS_UPDATE_INTERVAL_MS: u64 = 30_000;
    pub const REPORTS_PER_TICK: usize = 1;

    pub const CAMERA_TRIGGER_DURATION_MS: u64 = 200;
    /// One of "low", "medium", "high"
    pub const PHOTO_QUALITY: &str = "high";

    pub const DEEP_SLEEP_ENABLE: bool = false;
    pub const BATTERY_CHECK_INTERVAL_MS: u64 = 60_000;
    pub const TICK_INTERVAL_MS: u64 = 10;

    pub const BUZZER_CHIME_MS: u64 = 500;
    pub const MOTION_LED_HOLD_MS: u64 = 1000;
    pub const ALERT_HOLD_MS: u64 = 10_000;
}

/// Maximum number of qualified sensor events waiting for the control loop
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// Maximum number of report jobs in each of the primary and retry queues
pub const REPORT_QUEUE_CAPACITY: usize = 16;

/// Longest camera pulse; the pulse blocks the control loop
pub const MAX_TRIGGER_DURATION: Duration = Duration::from_millis(2000);

/// Highest GPIO number on the ESP32-C3
const MAX_GPIO: u8 = 21;

/// GPIOs wired to the SPI flash on ESP32-C3 modules
const FLASH_GPIOS: core::ops::RangeInclusive<u8> = 11..=17;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Sensitivity outside 1..=10
    InvalidSensitivity(u8),
    /// Two roles share one GPIO
    DuplicatePin { pin: u8, first: PinRole, second: PinRole },
    /// GPIO does not exist or belongs to the flash bus
    UnusablePin { pin: u8, role: PinRole },
    /// Server URL could not be parsed or is not plain http
    InvalidServerUrl,
    /// Unknown photo quality name
    InvalidPhotoQuality,
    /// A timing value that must be non-zero is zero
    ZeroDuration(&'static str),
    /// Attempt budget must allow at least one send
    ZeroAttempts,
    /// Camera pulse longer than [`MAX_TRIGGER_DURATION`]
    TriggerTooLong(Duration),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidSensitivity(s) => write!(f, "PIR sensitivity {} is outside 1..=10", s),
            ConfigError::DuplicatePin { pin, first, second } => {
                write!(f, "GPIO{} assigned to both {:?} and {:?}", pin, first, second)
            }
            ConfigError::UnusablePin { pin, role } => write!(f, "GPIO{} cannot be used for {:?}", pin, role),
            ConfigError::InvalidServerUrl => write!(f, "server URL must look like http://host[:port][/path]"),
            ConfigError::InvalidPhotoQuality => write!(f, "photo quality must be low, medium or high"),
            ConfigError::ZeroDuration(name) => write!(f, "{} must be greater than zero", name),
            ConfigError::ZeroAttempts => write!(f, "report attempt budget must be at least 1"),
            ConfigError::TriggerTooLong(d) => write!(
                f,
                "camera trigger duration {} ms exceeds {} ms",
                d.as_millis(),
                MAX_TRIGGER_DURATION.as_millis()
            ),
        }
    }
}

/// PIR sensitivity on a 1-10 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sensitivity(u8);

impl Sensitivity {
    /// Full scale of a level reading
    pub const LEVEL_MAX: u16 = 4095;

    pub fn new(value: u8) -> Result<Self, ConfigError> {
        if (1..=10).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidSensitivity(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Minimum level that counts as motion. Higher sensitivity lowers it.
    pub fn threshold(self) -> u16 {
        (Self::LEVEL_MAX as u32 * (11 - self.0 as u32) / 11) as u16
    }
}

/// Photo quality requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoQuality {
    Low,
    Medium,
    High,
}

impl PhotoQuality {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim() {
            n if n.eq_ignore_ascii_case("low") => Ok(PhotoQuality::Low),
            n if n.eq_ignore_ascii_case("medium") => Ok(PhotoQuality::Medium),
            n if n.eq_ignore_ascii_case("high") => Ok(PhotoQuality::High),
            _ => Err(ConfigError::InvalidPhotoQuality),
        }
    }

    /// JPEG quality hint forwarded to the server
    pub fn jpeg_quality(self) -> u8 {
        match self {
            PhotoQuality::Low => 60,
            PhotoQuality::Medium => 80,
            PhotoQuality::High => 95,
        }
    }
}

/// GPIO number per logical pin role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub pir: u8,
    pub doorbell_button: u8,
    pub status_led: u8,
    pub motion_led: u8,
    pub buzzer: u8,
    pub camera_trigger: u8,
}

impl PinMap {
    pub fn pin(&self, role: PinRole) -> u8 {
        match role {
            PinRole::Pir => self.pir,
            PinRole::DoorbellButton => self.doorbell_button,
            PinRole::StatusLed => self.status_led,
            PinRole::MotionLed => self.motion_led,
            PinRole::Buzzer => self.buzzer,
            PinRole::CameraTrigger => self.camera_trigger,
        }
    }

    /// Every role must own a distinct, usable GPIO
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, &role) in PinRole::ALL.iter().enumerate() {
            let pin = self.pin(role);
            if pin > MAX_GPIO || FLASH_GPIOS.contains(&pin) {
                return Err(ConfigError::UnusablePin { pin, role });
            }
            if let Some(&first) = PinRole::ALL[..i].iter().find(|r| self.pin(**r) == pin) {
                return Err(ConfigError::DuplicatePin { pin, first, second: role });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: &'static str,
    pub location: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiSettings {
    pub ssid: &'static str,
    pub password: &'static str,
    /// Consecutive failed attempts before going offline
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub offline_retry_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub url: ServerUrl,
    pub api_key: &'static str,
    pub http_timeout: Duration,
    /// Total send attempts per job, first try included
    pub max_attempts: u8,
    pub max_backoff: Duration,
    pub status_interval: Duration,
    pub reports_per_tick: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSettings {
    pub pir_sensitivity: Sensitivity,
    pub motion_timeout: Duration,
    pub doorbell_debounce: Duration,
    pub pir_debounce: Duration,
    pub doorbell_active_low: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSettings {
    pub trigger_duration: Duration,
    pub photo_quality: PhotoQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSettings {
    pub sleep_enabled: bool,
    pub battery_check_interval: Duration,
    pub tick_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorSettings {
    pub buzzer_chime: Duration,
    pub motion_led_hold: Duration,
    pub alert_hold: Duration,
}

/// Complete device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device: DeviceIdentity,
    pub wifi: WifiSettings,
    pub server: ServerSettings,
    pub pins: PinMap,
    pub sensors: SensorSettings,
    pub camera: CameraSettings,
    pub power: PowerSettings,
    pub indicators: IndicatorSettings,
    pub debug_mode: bool,
}

impl Config {
    /// Build the configuration from the compiled-in constants and validate it
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::from_defaults()?;
        config.validate()?;
        Ok(config)
    }

    /// Assemble the compiled-in constants without cross-field validation
    pub fn from_defaults() -> Result<Self, ConfigError> {
        use defaults::*;

        Ok(Self {
            device: DeviceIdentity {
                device_id: DEVICE_ID,
                location: LOCATION,
            },
            wifi: WifiSettings {
                ssid: WIFI_SSID,
                password: WIFI_PASSWORD,
                max_retries: MAX_WIFI_RETRY,
                retry_interval: Duration::from_millis(WIFI_RETRY_INTERVAL_MS),
                offline_retry_interval: Duration::from_millis(WIFI_OFFLINE_RETRY_INTERVAL_MS),
            },
            server: ServerSettings {
                url: ServerUrl::parse(SERVER_URL)?,
                api_key: API_KEY,
                http_timeout: Duration::from_millis(HTTP_TIMEOUT_MS),
                max_attempts: MAX_REPORT_ATTEMPTS,
                max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
                status_interval: Duration::from_millis(STATUS_UPDATE_INTERVAL_MS),
                reports_per_tick: REPORTS_PER_TICK,
            },
            pins: PinMap {
                pir: PIR_SENSOR_PIN,
                doorbell_button: DOORBELL_BUTTON_PIN,
                status_led: STATUS_LED_PIN,
                motion_led: MOTION_LED_PIN,
                buzzer: BUZZER_PIN,
                camera_trigger: CAMERA_TRIGGER_PIN,
            },
            sensors: SensorSettings {
                pir_sensitivity: Sensitivity::new(PIR_SENSITIVITY)?,
                motion_timeout: Duration::from_millis(MOTION_TIMEOUT_MS),
                doorbell_debounce: Duration::from_millis(DOORBELL_DEBOUNCE_MS),
                pir_debounce: Duration::from_millis(PIR_DEBOUNCE_MS),
                doorbell_active_low: DOORBELL_ACTIVE_LOW,
            },
            camera: CameraSettings {
                trigger_duration: Duration::from_millis(CAMERA_TRIGGER_DURATION_MS),
                photo_quality: PhotoQuality::parse(PHOTO_QUALITY)?,
            },
            power: PowerSettings {
                sleep_enabled: DEEP_SLEEP_ENABLE,
                battery_check_interval: Duration::from_millis(BATTERY_CHECK_INTERVAL_MS),
                tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            },
            indicators: IndicatorSettings {
                buzzer_chime: Duration::from_millis(BUZZER_CHIME_MS),
                motion_led_hold: Duration::from_millis(MOTION_LED_HOLD_MS),
                alert_hold: Duration::from_millis(ALERT_HOLD_MS),
            },
            debug_mode: DEBUG_MODE,
        })
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pins.validate()?;

        let required = [
            ("motion timeout", self.sensors.motion_timeout),
            ("HTTP timeout", self.server.http_timeout),
            ("status interval", self.server.status_interval),
            ("camera trigger duration", self.camera.trigger_duration),
            ("battery check interval", self.power.battery_check_interval),
            ("tick interval", self.power.tick_interval),
            ("WiFi retry interval", self.wifi.retry_interval),
        ];
        if let Some(&(name, _)) = required.iter().find(|(_, d)| d.as_ticks() == 0) {
            return Err(ConfigError::ZeroDuration(name));
        }

        if self.camera.trigger_duration > MAX_TRIGGER_DURATION {
            return Err(ConfigError::TriggerTooLong(self.camera.trigger_duration));
        }

        if self.server.max_attempts == 0 || self.server.reports_per_tick == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        Ok(())
    }

    /// Log verbosity selected by the debug flag
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_defaults_are_valid() {
        let config = Config::load().expect("defaults must validate");
        assert_eq!(config.sensors.pir_sensitivity.value(), 7);
        assert_eq!(config.camera.photo_quality, PhotoQuality::High);
        assert_eq!(config.server.http_timeout, Duration::from_millis(5000));
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn sensitivity_bounds() {
        assert!(Sensitivity::new(0).is_err());
        assert!(Sensitivity::new(11).is_err());
        assert_eq!(Sensitivity::new(10).unwrap().threshold(), 372);
        assert_eq!(Sensitivity::new(1).unwrap().threshold(), 3722);
        assert!(Sensitivity::new(7).unwrap().threshold() < Sensitivity::new(3).unwrap().threshold());
    }

    #[test]
    fn duplicate_pins_are_rejected() {
        let mut config = Config::from_defaults().unwrap();
        config.pins.buzzer = config.pins.status_led;

        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicatePin {
                pin: config.pins.status_led,
                first: PinRole::StatusLed,
                second: PinRole::Buzzer,
            })
        );
    }

    #[test]
    fn flash_pins_are_rejected() {
        let mut config = Config::from_defaults().unwrap();
        config.pins.status_led = 13;

        assert_eq!(
            config.validate(),
            Err(ConfigError::UnusablePin { pin: 13, role: PinRole::StatusLed })
        );
    }

    #[test]
    fn zero_timing_is_rejected() {
        let mut config = Config::from_defaults().unwrap();
        config.server.http_timeout = Duration::from_millis(0);

        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("HTTP timeout")));
    }

    #[test]
    fn long_camera_pulse_is_rejected() {
        let mut config = Config::from_defaults().unwrap();
        config.camera.trigger_duration = MAX_TRIGGER_DURATION;
        assert!(config.validate().is_ok());

        config.camera.trigger_duration = Duration::from_secs(72 * 60);
        assert_eq!(config.validate(), Err(ConfigError::TriggerTooLong(Duration::from_secs(72 * 60))));
    }

    #[test]
    fn photo_quality_names() {
        assert_eq!(PhotoQuality::parse("Medium"), Ok(PhotoQuality::Medium));
        assert_eq!(PhotoQuality::parse("ultra"), Err(ConfigError::InvalidPhotoQuality));
        assert_eq!(PhotoQuality::Low.jpeg_quality(), 60);
    }
}
