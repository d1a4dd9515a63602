//! Debounced input reader
//!
//! Turns raw doorbell button and PIR samples into clean edge events. The
//! debounce window of each pin is measured from its last accepted transition;
//! a level change seen inside the window is treated as a bounce and ignored.

use embassy_time::{Duration, Instant};
use log::{debug, trace};

use crate::config::Config;
use crate::hal::{DoorbellIo, HardwareFault, PinRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Input became active
    Activated,
    /// Level-triggered input is still active
    Held,
    /// Input became inactive
    Released,
}

/// A clean transition (or sustained level) on an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub role: PinRole,
    pub kind: EdgeKind,
    pub at: Instant,
    pub pin: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sampling {
    /// Plain digital read, optionally inverted
    Digital { active_low: bool },
    /// Level reading compared against a threshold
    Threshold(u16),
}

/// Debounce state for one input pin
#[derive(Debug, Clone)]
pub struct DebouncedInput {
    role: PinRole,
    pin: u8,
    debounce: Duration,
    sampling: Sampling,
    /// Report `Held` on every poll while active
    level_triggered: bool,
    active: bool,
    last_accepted: Option<Instant>,
}

impl DebouncedInput {
    /// Button-style input: only transitions are reported
    pub fn edge_triggered(role: PinRole, pin: u8, debounce: Duration, active_low: bool) -> Self {
        Self::with_sampling(role, pin, debounce, Sampling::Digital { active_low }, false)
    }

    /// Sensor-style input: active while the level reaches `threshold`
    pub fn level_triggered(role: PinRole, pin: u8, debounce: Duration, threshold: u16) -> Self {
        Self::with_sampling(role, pin, debounce, Sampling::Threshold(threshold), true)
    }

    fn with_sampling(role: PinRole, pin: u8, debounce: Duration, sampling: Sampling, level_triggered: bool) -> Self {
        Self {
            role,
            pin,
            debounce,
            sampling,
            level_triggered,
            active: false,
            last_accepted: None,
        }
    }

    fn sample<IO: DoorbellIo>(&self, io: &mut IO) -> Result<bool, HardwareFault> {
        match self.sampling {
            Sampling::Digital { active_low } => Ok(io.read_pin(self.role)? != active_low),
            Sampling::Threshold(threshold) => Ok(io.read_level(self.role)? >= threshold),
        }
    }

    pub fn poll<IO: DoorbellIo>(&mut self, io: &mut IO, now: Instant) -> Result<Option<EdgeEvent>, HardwareFault> {
        let active = self.sample(io)?;

        if active != self.active {
            if self.debounce_open(now) {
                trace!("[INPUT] Bounce on GPIO{} ignored", self.pin);
                return Ok(None);
            }

            self.active = active;
            self.last_accepted = Some(now);
            let kind = if active { EdgeKind::Activated } else { EdgeKind::Released };
            debug!("[INPUT] {:?} {:?} at {} ms", self.role, kind, now.as_millis());
            return Ok(Some(self.edge(kind, now)));
        }

        if self.active && self.level_triggered {
            return Ok(Some(self.edge(EdgeKind::Held, now)));
        }

        Ok(None)
    }

    fn edge(&self, kind: EdgeKind, at: Instant) -> EdgeEvent {
        EdgeEvent {
            role: self.role,
            kind,
            at,
            pin: self.pin,
        }
    }

    /// Whether a transition was accepted less than one debounce window ago
    pub fn debounce_open(&self, now: Instant) -> bool {
        self.last_accepted
            .is_some_and(|t| now.saturating_duration_since(t) < self.debounce)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// The doorbell button and PIR inputs
#[derive(Debug, Clone)]
pub struct InputReader {
    doorbell: DebouncedInput,
    motion: DebouncedInput,
}

impl InputReader {
    pub fn new(config: &Config) -> Self {
        Self {
            doorbell: DebouncedInput::edge_triggered(
                PinRole::DoorbellButton,
                config.pins.doorbell_button,
                config.sensors.doorbell_debounce,
                config.sensors.doorbell_active_low,
            ),
            motion: DebouncedInput::level_triggered(
                PinRole::Pir,
                config.pins.pir,
                config.sensors.pir_debounce,
                config.sensors.pir_sensitivity.threshold(),
            ),
        }
    }

    /// Poll one input role. Output roles never produce events.
    pub fn poll<IO: DoorbellIo>(
        &mut self,
        io: &mut IO,
        role: PinRole,
        now: Instant,
    ) -> Result<Option<EdgeEvent>, HardwareFault> {
        match role {
            PinRole::DoorbellButton => self.doorbell.poll(io, now),
            PinRole::Pir => self.motion.poll(io, now),
            _ => Ok(None),
        }
    }

    pub fn debounce_open(&self, now: Instant) -> bool {
        self.doorbell.debounce_open(now) || self.motion.debounce_open(now)
    }

    pub fn any_active(&self) -> bool {
        self.doorbell.is_active() || self.motion.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Sensitivity;

    /// Inputs whose levels the test sets directly
    #[derive(Default)]
    struct Levels {
        button: bool,
        pir: u16,
        fail: bool,
    }

    impl DoorbellIo for Levels {
        fn read_pin(&mut self, role: PinRole) -> Result<bool, HardwareFault> {
            if self.fail {
                return Err(HardwareFault { role, pin: 0 });
            }
            Ok(match role {
                PinRole::DoorbellButton => self.button,
                _ => self.pir > 0,
            })
        }

        fn write_pin(&mut self, role: PinRole, _high: bool) -> Result<(), HardwareFault> {
            Err(HardwareFault { role, pin: 0 })
        }

        fn read_level(&mut self, _role: PinRole) -> Result<u16, HardwareFault> {
            Ok(self.pir)
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn button() -> DebouncedInput {
        DebouncedInput::edge_triggered(PinRole::DoorbellButton, 3, Duration::from_millis(300), false)
    }

    #[test]
    fn press_inside_debounce_window_yields_one_edge() {
        let mut io = Levels::default();
        let mut input = button();
        let mut edges = 0;

        // press at 0, bounce open at 50, press again at 100
        for (ms, level) in [(0, true), (50, false), (100, true), (150, true), (250, true)] {
            io.button = level;
            if let Some(edge) = input.poll(&mut io, at(ms)).unwrap() {
                assert_eq!(edge.kind, EdgeKind::Activated);
                edges += 1;
            }
        }

        assert_eq!(edges, 1);
    }

    #[test]
    fn release_after_window_is_reported() {
        let mut io = Levels::default();
        let mut input = button();

        io.button = true;
        assert!(input.poll(&mut io, at(0)).unwrap().is_some());
        io.button = false;
        assert_eq!(input.poll(&mut io, at(299)).unwrap(), None);
        assert!(input.debounce_open(at(299)));

        let edge = input.poll(&mut io, at(300)).unwrap().unwrap();
        assert_eq!(edge.kind, EdgeKind::Released);
        assert_eq!(edge.pin, 3);
        assert!(!input.debounce_open(at(300 + 300)));
    }

    #[test]
    fn active_low_button_idles_high() {
        let mut io = Levels { button: true, ..Default::default() };
        let mut input = DebouncedInput::edge_triggered(PinRole::DoorbellButton, 3, Duration::from_millis(300), true);

        assert_eq!(input.poll(&mut io, at(0)).unwrap(), None);
        io.button = false;
        assert_eq!(input.poll(&mut io, at(10)).unwrap().map(|e| e.kind), Some(EdgeKind::Activated));
    }

    #[test]
    fn pir_threshold_follows_sensitivity() {
        let threshold = Sensitivity::new(7).unwrap().threshold();
        let mut io = Levels { pir: threshold - 1, ..Default::default() };
        let mut pir = DebouncedInput::level_triggered(PinRole::Pir, 1, Duration::from_millis(50), threshold);

        assert_eq!(pir.poll(&mut io, at(0)).unwrap(), None);

        io.pir = threshold;
        assert_eq!(pir.poll(&mut io, at(10)).unwrap().map(|e| e.kind), Some(EdgeKind::Activated));
        assert_eq!(pir.poll(&mut io, at(20)).unwrap().map(|e| e.kind), Some(EdgeKind::Held));
        assert!(pir.is_active());
    }

    #[test]
    fn pir_dropout_inside_debounce_window_is_ignored() {
        let threshold = Sensitivity::new(7).unwrap().threshold();
        let mut io = Levels::default();
        let mut pir = DebouncedInput::level_triggered(PinRole::Pir, 1, Duration::from_millis(50), threshold);
        let mut kinds = Vec::new();

        for (ms, level) in [(0, threshold), (20, 0), (40, threshold), (60, 0)] {
            io.pir = level;
            kinds.push(pir.poll(&mut io, at(ms)).unwrap().map(|e| e.kind));
        }

        assert_eq!(
            kinds,
            [Some(EdgeKind::Activated), None, Some(EdgeKind::Held), Some(EdgeKind::Released)]
        );
    }

    #[test]
    fn read_failure_is_a_hardware_fault() {
        let mut io = Levels { fail: true, ..Default::default() };
        let mut input = button();

        assert!(input.poll(&mut io, at(0)).is_err());
    }

    #[test]
    fn reader_ignores_output_roles() {
        let config = Config::from_defaults().unwrap();
        let mut reader = InputReader::new(&config);
        let mut io = Levels { button: true, pir: Sensitivity::LEVEL_MAX, ..Default::default() };

        assert_eq!(reader.poll(&mut io, PinRole::Buzzer, at(0)).unwrap(), None);
        // defaults wire the button active-low, so a high level is idle
        assert_eq!(reader.poll(&mut io, PinRole::DoorbellButton, at(0)).unwrap(), None);
        assert!(reader.poll(&mut io, PinRole::Pir, at(0)).unwrap().is_some());
        assert!(reader.any_active());
        assert!(reader.debounce_open(at(10)));
    }
}
