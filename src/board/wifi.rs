//! WiFi station for ESP32-C3 board
//!
//! Handles WiFi association using esp-wifi 0.14.1; addressing comes from the
//! embassy-net DHCP client. Nothing here waits on the radio.

use embassy_net::Stack;
use esp_wifi::wifi::{AuthMethod, ClientConfiguration, Configuration, WifiController};
use log::{debug, info, warn};

use crate::wifi::{WifiError, WifiLink};

/// [`WifiLink`] over the esp-wifi station interface
pub struct EspWifiLink<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    configured: bool,
    /// Association seen on the previous check
    was_associated: bool,
}

impl<'a> EspWifiLink<'a> {
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>) -> Self {
        Self {
            controller,
            stack,
            configured: false,
            was_associated: false,
        }
    }

    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| WifiError::InvalidCredentials)?,
            password: password.try_into().map_err(|_| WifiError::InvalidCredentials)?,
            auth_method: if password.is_empty() { AuthMethod::None } else { AuthMethod::WPA2Personal },
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::Client(client_config))
            .map_err(|_| WifiError::Driver)?;
        self.controller.start().map_err(|_| WifiError::Driver)?;

        self.configured = true;
        Ok(())
    }

    fn associated(&self) -> bool {
        self.controller.is_connected().unwrap_or(false)
    }

    /// Log the DHCP lease once it is available
    fn log_dhcp_lease(&self) {
        match self.stack.config_v4() {
            Some(config) => {
                info!("[WIFI] DHCP IP address: {}", config.address.address());
                if let Some(gateway) = config.gateway {
                    debug!("[DHCP] Gateway: {}", gateway);
                }
                for (i, dns) in config.dns_servers.iter().enumerate() {
                    debug!("[DHCP] DNS Server {}: {}", i + 1, dns);
                }
            }
            None => debug!("[WIFI] DHCP configuration not yet available"),
        }
    }
}

impl WifiLink for EspWifiLink<'_> {
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        if !self.configured {
            self.configure(ssid, password)?;
        }

        if self.associated() {
            return Ok(());
        }

        // The driver associates in the background; `is_connected` reports
        // the outcome on later ticks.
        if self.controller.connect().is_err() {
            // usually a previous attempt still in flight
            debug!("[WIFI] Connect request refused, waiting on the pending one");
        }
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        let associated = self.associated();
        if associated && !self.was_associated {
            info!("[WIFI] Successfully connected to WiFi network");
            self.log_dhcp_lease();
        } else if !associated && self.was_associated {
            warn!("[WIFI] Association lost");
        }
        self.was_associated = associated;
        associated
    }

    fn rssi(&mut self) -> Option<i8> {
        self.controller
            .rssi()
            .ok()
            .map(|dbm| dbm.clamp(i8::MIN as i32, i8::MAX as i32) as i8)
    }
}
