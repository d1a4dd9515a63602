//! Power scheduler
//!
//! Decides after each tick whether the control loop may sleep until its next
//! deadline, and owns the periodic battery check.

use embassy_time::{Duration, Instant};
use log::{debug, trace};

use crate::config::{Config, PowerSettings};
use crate::hal::{DoorbellIo, HardwareFault};
use crate::report::DeviceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Active,
    LightSleep,
}

/// What the control loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDecision {
    /// Tick again after the regular tick interval
    StayActive,
    /// Sleep until `until` or the next input edge
    Sleep { until: Instant },
}

/// Work that keeps the device awake
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub pending_reports: bool,
    pub debounce_open: bool,
    pub input_active: bool,
    pub outputs_running: bool,
}

impl Activity {
    pub fn is_idle(&self) -> bool {
        !(self.pending_reports || self.debounce_open || self.input_active || self.outputs_running)
    }
}

pub struct PowerScheduler {
    settings: PowerSettings,
    state: PowerState,
    boot: Instant,
    next_battery_check: Instant,
}

impl PowerScheduler {
    pub fn new(config: &Config, boot: Instant) -> Self {
        Self {
            settings: config.power,
            state: PowerState::Active,
            boot,
            // first reading right away so status reports carry it
            next_battery_check: boot,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn battery_due(&self, now: Instant) -> bool {
        now >= self.next_battery_check
    }

    pub fn next_battery_check(&self) -> Instant {
        self.next_battery_check
    }

    /// Read the battery and schedule the next check. The schedule advances
    /// even if the read fails.
    pub fn check_battery<IO: DoorbellIo>(
        &mut self,
        io: &mut IO,
        now: Instant,
        status: &mut DeviceStatus,
    ) -> Result<(), HardwareFault> {
        self.next_battery_check = now + self.settings.battery_check_interval;
        status.battery_level = io.read_battery()?;
        debug!("[POWER] Battery: {:?}%", status.battery_level);
        Ok(())
    }

    pub fn refresh_status(&self, now: Instant, status: &mut DeviceStatus) {
        status.uptime = now.saturating_duration_since(self.boot);
    }

    /// Choose between ticking again and sleeping until the earliest of the
    /// battery check and `deadline`
    pub fn evaluate(&mut self, now: Instant, activity: Activity, deadline: Option<Instant>) -> PowerDecision {
        if !self.settings.sleep_enabled || !activity.is_idle() {
            self.state = PowerState::Active;
            return PowerDecision::StayActive;
        }

        let until = deadline.map_or(self.next_battery_check, |d| d.min(self.next_battery_check));
        // not worth sleeping for less than one tick
        if until <= now + self.settings.tick_interval {
            self.state = PowerState::Active;
            return PowerDecision::StayActive;
        }

        if self.state == PowerState::Active {
            debug!("[POWER] Light sleep for {} ms", (until - now).as_millis());
        }
        self.state = PowerState::LightSleep;
        PowerDecision::Sleep { until }
    }

    /// Return to Active after an input edge
    pub fn wake(&mut self, now: Instant) {
        if self.state == PowerState::LightSleep {
            trace!("[POWER] Woken at {} ms", now.as_millis());
            self.state = PowerState::Active;
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.settings.tick_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::PinRole;

    struct Battery(Option<u8>);

    impl DoorbellIo for Battery {
        fn read_pin(&mut self, role: PinRole) -> Result<bool, HardwareFault> {
            Err(HardwareFault { role, pin: 0 })
        }

        fn write_pin(&mut self, role: PinRole, _high: bool) -> Result<(), HardwareFault> {
            Err(HardwareFault { role, pin: 0 })
        }

        fn read_battery(&mut self) -> Result<Option<u8>, HardwareFault> {
            Ok(self.0)
        }
    }

    fn scheduler(sleep_enabled: bool) -> PowerScheduler {
        let mut config = Config::from_defaults().unwrap();
        config.power.sleep_enabled = sleep_enabled;
        PowerScheduler::new(&config, Instant::from_millis(0))
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn never_sleeps_when_disabled() {
        let mut power = scheduler(false);
        assert_eq!(power.evaluate(at(100), Activity::default(), None), PowerDecision::StayActive);
        assert_eq!(power.state(), PowerState::Active);
    }

    #[test]
    fn any_activity_keeps_it_awake() {
        let mut power = scheduler(true);
        let busy = [
            Activity { pending_reports: true, ..Default::default() },
            Activity { debounce_open: true, ..Default::default() },
            Activity { input_active: true, ..Default::default() },
            Activity { outputs_running: true, ..Default::default() },
        ];

        for activity in busy {
            assert_eq!(power.evaluate(at(100), activity, None), PowerDecision::StayActive);
        }
    }

    #[test]
    fn sleep_deadline_never_passes_battery_check() {
        let mut power = scheduler(true);
        let mut status = DeviceStatus::new(&Config::from_defaults().unwrap().device);

        assert!(power.battery_due(at(0)));
        power.check_battery(&mut Battery(Some(87)), at(0), &mut status).unwrap();
        assert_eq!(status.battery_level, Some(87));

        assert_eq!(
            power.evaluate(at(100), Activity::default(), Some(at(90_000))),
            PowerDecision::Sleep { until: at(60_000) }
        );
        assert_eq!(power.state(), PowerState::LightSleep);
        assert_eq!(
            power.evaluate(at(100), Activity::default(), Some(at(30_000))),
            PowerDecision::Sleep { until: at(30_000) }
        );

        power.wake(at(200));
        assert_eq!(power.state(), PowerState::Active);
    }

    #[test]
    fn imminent_deadline_keeps_ticking() {
        let mut power = scheduler(true);
        power.check_battery(&mut Battery(None), at(0), &mut DeviceStatus::new(&Config::from_defaults().unwrap().device)).unwrap();

        assert_eq!(power.evaluate(at(1000), Activity::default(), Some(at(1005))), PowerDecision::StayActive);
    }

    #[test]
    fn uptime_follows_clock() {
        let power = scheduler(false);
        let mut status = DeviceStatus::new(&Config::from_defaults().unwrap().device);
        power.refresh_status(at(42_000), &mut status);
        assert_eq!(status.uptime.as_secs(), 42);
    }
}
