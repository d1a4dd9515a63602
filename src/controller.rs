//! Main control loop
//!
//! [`Doorbell`] owns every component and the hardware collaborators. The
//! firmware calls [`Doorbell::tick`] once per tick interval (or after a
//! sleep) and waits as the returned [`PowerDecision`] says.

use embassy_time::Instant;
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::capture::CaptureTrigger;
use crate::config::Config;
use crate::events::{EventAggregator, EventKind};
use crate::hal::{DoorbellIo, PinRole};
use crate::http::HttpTransport;
use crate::indicator::{IndicatorPattern, Indicators};
use crate::input::InputReader;
use crate::power::{Activity, PowerDecision, PowerScheduler};
use crate::report::{DeviceStatus, NetworkReporter};
use crate::wifi::{LinkState, WifiLink, WifiSupervisor};
use crate::{DoorbellError, ReportError};

/// The doorbell application
pub struct Doorbell<'a, IO, D, W, T> {
    io: IO,
    delay: D,
    link: W,
    transport: T,
    inputs: InputReader,
    events: EventAggregator,
    capture: CaptureTrigger,
    reporter: NetworkReporter<'a>,
    wifi: WifiSupervisor<'a>,
    power: PowerScheduler,
    indicators: Indicators,
    status: DeviceStatus,
}

impl<'a, IO, D, W, T> Doorbell<'a, IO, D, W, T>
where
    IO: DoorbellIo,
    D: DelayNs,
    W: WifiLink,
    T: HttpTransport,
{
    pub fn new(config: &'a Config, io: IO, delay: D, link: W, transport: T, now: Instant) -> Self {
        info!(
            "[MAIN] Doorbell {} at {} reporting to {}",
            config.device.device_id, config.device.location, config.server.url
        );

        Self {
            io,
            delay,
            link,
            transport,
            inputs: InputReader::new(config),
            events: EventAggregator::new(config),
            capture: CaptureTrigger::new(config),
            reporter: NetworkReporter::new(config, now),
            wifi: WifiSupervisor::new(&config.wifi),
            power: PowerScheduler::new(config, now),
            indicators: Indicators::new(config, now),
            status: DeviceStatus::new(&config.device),
        }
    }

    /// Run one iteration of the control loop
    pub async fn tick(&mut self, now: Instant) -> PowerDecision {
        // Inputs into the aggregator
        for role in [PinRole::DoorbellButton, PinRole::Pir] {
            match self.inputs.poll(&mut self.io, role, now) {
                Ok(Some(edge)) => {
                    self.power.wake(now);
                    self.events.submit(edge);
                }
                Ok(None) => {}
                Err(fault) => self.handle_error(fault.into(), now),
            }
        }

        // Capture, local feedback and report per event
        while let Some(event) = self.events.next() {
            if let Err(fault) = self.capture.fire(&mut self.io, &mut self.delay) {
                self.handle_error(fault.into(), now);
            }

            let output = match event.kind {
                EventKind::Doorbell => &mut self.indicators.buzzer,
                EventKind::Motion => &mut self.indicators.motion_led,
            };
            if let Err(fault) = output.trigger(&mut self.io, now) {
                self.handle_error(fault.into(), now);
            }

            self.reporter.report_event(&event, now, &mut self.status);
        }

        // Link supervision
        if let Err(e) = self.wifi.poll(&mut self.link, now) {
            self.handle_error(e.into(), now);
        }
        self.indicators.status.set_pattern(self.wifi.indicator_pattern(), now);

        // Periodic work
        self.power.refresh_status(now, &mut self.status);
        if self.power.battery_due(now) {
            if let Err(fault) = self.power.check_battery(&mut self.io, now, &mut self.status) {
                self.handle_error(fault.into(), now);
            }
        }
        if self.reporter.status_due(now) {
            self.reporter.report_status(now, self.wifi.rssi(), &mut self.status);
        }

        if self.wifi.is_online() {
            let summary = self
                .reporter
                .drain_queue(&mut self.transport, now, &mut self.status)
                .await;
            if let Some(code) = summary.rejected {
                self.handle_error(ReportError::ServerRejected(code).into(), now);
            }
        }

        if let Err(fault) = self.indicators.refresh(&mut self.io, now) {
            self.handle_error(fault.into(), now);
        }

        let activity = Activity {
            pending_reports: self.reporter.has_pending(),
            debounce_open: self.inputs.debounce_open(now),
            input_active: self.inputs.any_active(),
            outputs_running: !self.indicators.outputs_idle(),
        };
        let deadline = match self.wifi.next_deadline() {
            Some(wifi) => wifi.min(self.reporter.next_status_at()),
            None => self.reporter.next_status_at(),
        };
        self.power.evaluate(now, activity, Some(deadline))
    }

    /// An input edge ended a sleep early
    pub fn wake(&mut self, now: Instant) {
        self.power.wake(now);
    }

    /// Errors never stop the loop; they are logged and shown on the status LED
    fn handle_error(&mut self, error: DoorbellError, now: Instant) {
        warn!("[MAIN] {}", error);
        match error {
            DoorbellError::Hardware(_) => {
                self.indicators.status.raise_alert(IndicatorPattern::HardwareFault, now)
            }
            DoorbellError::Report(ReportError::ServerRejected(_)) => {
                self.indicators.status.raise_alert(IndicatorPattern::ServerRejected, now)
            }
            _ => {}
        }
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn link_state(&self) -> LinkState {
        self.wifi.state()
    }

    pub fn pending_reports(&self) -> usize {
        self.reporter.pending()
    }

    pub fn status_pattern(&self, now: Instant) -> IndicatorPattern {
        self.indicators.status.active_pattern(now)
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn link_mut(&mut self) -> &mut W {
        &mut self.link
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
