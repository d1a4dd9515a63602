#![cfg_attr(not(test), no_std)]

//! ESP32-C3 Smart Doorbell Library
//!
//! This library provides the hardware-independent core of a WiFi doorbell:
//! debounced button and PIR inputs, a camera trigger, HTTP event/status
//! reporting with retry and backoff, and power-aware scheduling. The firmware
//! binary binds it to esp-hal pins, esp-wifi and an embassy-net TCP stack.

extern crate alloc;

use core::fmt;

pub mod capture;
pub mod config;
pub mod controller;
pub mod events;
pub mod hal;
pub mod http;
pub mod indicator;
pub mod input;
pub mod power;
pub mod report;
pub mod wifi;

#[cfg(feature = "firmware")]
pub mod board;

pub use config::Config;
pub use controller::Doorbell;
pub use hal::{DoorbellIo, HardwareFault, PinRole};
pub use http::{HttpTransport, NetworkError};
pub use wifi::{WifiError, WifiLink};

/// Project version information
pub const VERSION: &str = "0.1.0";

/// Outcome of a single report attempt that did not end in delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    /// Timeout or connection failure; the job is retried with backoff
    Transient(NetworkError),
    /// Non-2xx response; the job is discarded
    ServerRejected(u16),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Transient(e) => write!(f, "transient network error: {}", e),
            ReportError::ServerRejected(status) => write!(f, "server rejected report (HTTP {})", status),
        }
    }
}

/// Error types for the doorbell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoorbellError {
    /// Pin read or write failed
    Hardware(HardwareFault),
    /// Report delivery failed
    Report(ReportError),
    /// WiFi association attempt failed
    Wifi(WifiError),
}

impl fmt::Display for DoorbellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorbellError::Hardware(e) => e.fmt(f),
            DoorbellError::Report(e) => e.fmt(f),
            DoorbellError::Wifi(e) => e.fmt(f),
        }
    }
}

impl From<HardwareFault> for DoorbellError {
    fn from(e: HardwareFault) -> Self {
        DoorbellError::Hardware(e)
    }
}

impl From<ReportError> for DoorbellError {
    fn from(e: ReportError) -> Self {
        DoorbellError::Report(e)
    }
}

impl From<WifiError> for DoorbellError {
    fn from(e: WifiError) -> Self {
        DoorbellError::Wifi(e)
    }
}
