//! Status LED patterns and timed outputs
//!
//! Every output level is a pure function of the active pattern and the
//! time elapsed since it started, so the control loop only has to call
//! `refresh` each tick. Pins are written when the level changes.

use embassy_time::{Duration, Instant};
use log::{debug, info};

use crate::config::Config;
use crate::hal::{DoorbellIo, HardwareFault, PinRole};

/// Status LED patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPattern {
    /// Fast blink while the link is coming up
    Connecting,
    /// Solid on
    Online,
    /// Slow blink while reporting is suspended
    Offline,
    /// Triple flash after the server refused a report
    ServerRejected,
    /// Rapid blink after a pin I/O failure
    HardwareFault,
}

impl IndicatorPattern {
    /// Alerts temporarily override the link pattern
    pub fn is_alert(self) -> bool {
        matches!(self, IndicatorPattern::ServerRejected | IndicatorPattern::HardwareFault)
    }

    /// LED level `elapsed` into the pattern
    pub fn level_at(self, elapsed: Duration) -> bool {
        let ms = elapsed.as_millis();
        match self {
            IndicatorPattern::Connecting => (ms / 125) % 2 == 0,
            IndicatorPattern::Online => true,
            IndicatorPattern::Offline => (ms / 1000) % 2 == 0,
            IndicatorPattern::ServerRejected => {
                // three 150 ms flashes, then a pause, every 1.5 s
                let phase = ms % 1500;
                phase < 900 && (phase / 150) % 2 == 0
            }
            IndicatorPattern::HardwareFault => (ms / 50) % 2 == 0,
        }
    }
}

/// Status LED driver
pub struct StatusIndicator {
    pattern: IndicatorPattern,
    since: Instant,
    alert: Option<(IndicatorPattern, Instant)>,
    alert_hold: Duration,
    level: Option<bool>,
}

impl StatusIndicator {
    pub fn new(alert_hold: Duration, now: Instant) -> Self {
        Self {
            pattern: IndicatorPattern::Connecting,
            since: now,
            alert: None,
            alert_hold,
            level: None,
        }
    }

    /// Set the base pattern. Restarts the pattern only when it changes.
    pub fn set_pattern(&mut self, pattern: IndicatorPattern, now: Instant) {
        if self.pattern != pattern {
            debug!("[LED] Status pattern: {:?}", pattern);
            self.pattern = pattern;
            self.since = now;
        }
    }

    /// Show `alert` for the configured hold time
    pub fn raise_alert(&mut self, alert: IndicatorPattern, now: Instant) {
        if self.alert.map(|(current, _)| current) != Some(alert) {
            info!("[LED] Alert: {:?}", alert);
        }
        self.alert = Some((alert, now));
    }

    /// Pattern that is showing at `now`
    pub fn active_pattern(&self, now: Instant) -> IndicatorPattern {
        self.active(now).0
    }

    fn active(&self, now: Instant) -> (IndicatorPattern, Instant) {
        match self.alert {
            Some((alert, raised)) if now.saturating_duration_since(raised) < self.alert_hold => (alert, raised),
            _ => (self.pattern, self.since),
        }
    }

    pub fn refresh<IO: DoorbellIo>(&mut self, io: &mut IO, now: Instant) -> Result<(), HardwareFault> {
        if self.alert.is_some_and(|(_, raised)| now.saturating_duration_since(raised) >= self.alert_hold) {
            self.alert = None;
        }

        let (pattern, started) = self.active(now);
        let level = pattern.level_at(now.saturating_duration_since(started));
        if self.level == Some(level) {
            return Ok(());
        }

        // A failed write is reported once per level change, not every tick
        self.level = Some(level);
        io.write_pin(PinRole::StatusLed, level)
    }
}

/// Output held high for a fixed time after each trigger
pub struct TimedOutput {
    role: PinRole,
    hold: Duration,
    until: Option<Instant>,
}

impl TimedOutput {
    pub fn new(role: PinRole, hold: Duration) -> Self {
        Self { role, hold, until: None }
    }

    /// Drive the output high, or extend the hold if it already is
    pub fn trigger<IO: DoorbellIo>(&mut self, io: &mut IO, now: Instant) -> Result<(), HardwareFault> {
        let was_running = self.until.is_some();
        self.until = Some(now + self.hold);
        if was_running { Ok(()) } else { io.write_pin(self.role, true) }
    }

    /// Release the output once its hold has expired
    pub fn refresh<IO: DoorbellIo>(&mut self, io: &mut IO, now: Instant) -> Result<(), HardwareFault> {
        match self.until {
            Some(until) if now >= until => {
                self.until = None;
                io.write_pin(self.role, false)
            }
            _ => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.until.is_some()
    }
}

/// The status LED, motion LED and buzzer
pub struct Indicators {
    pub status: StatusIndicator,
    pub motion_led: TimedOutput,
    pub buzzer: TimedOutput,
}

impl Indicators {
    pub fn new(config: &Config, now: Instant) -> Self {
        let timing = &config.indicators;
        Self {
            status: StatusIndicator::new(timing.alert_hold, now),
            motion_led: TimedOutput::new(PinRole::MotionLed, timing.motion_led_hold),
            buzzer: TimedOutput::new(PinRole::Buzzer, timing.buzzer_chime),
        }
    }

    /// Refresh every output; the first failure is returned after all ran
    pub fn refresh<IO: DoorbellIo>(&mut self, io: &mut IO, now: Instant) -> Result<(), HardwareFault> {
        let status = self.status.refresh(io, now);
        let motion = self.motion_led.refresh(io, now);
        let buzzer = self.buzzer.refresh(io, now);
        status.and(motion).and(buzzer)
    }

    /// No timed output is holding its pin high
    pub fn outputs_idle(&self) -> bool {
        !self.motion_led.is_running() && !self.buzzer.is_running()
    }
}
