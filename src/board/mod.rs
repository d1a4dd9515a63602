//! ESP32-C3 bindings
//!
//! Implementations of the core's WiFi and HTTP seams on top of esp-wifi and
//! embassy-net. Only built with the `firmware` feature.

pub mod http_client;
pub mod wifi;

pub use http_client::TcpTransport;
pub use wifi::EspWifiLink;
