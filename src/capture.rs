//! Camera trigger
//!
//! The camera takes a photo on a high pulse of its trigger line. The pulse is
//! timed with a busy-wait; it is the one place the control loop blocks.

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::config::{Config, PhotoQuality};
use crate::hal::{DoorbellIo, HardwareFault, PinRole};

pub struct CaptureTrigger {
    duration: Duration,
    quality: PhotoQuality,
}

impl CaptureTrigger {
    pub fn new(config: &Config) -> Self {
        Self {
            duration: config.camera.trigger_duration,
            quality: config.camera.photo_quality,
        }
    }

    pub fn quality(&self) -> PhotoQuality {
        self.quality
    }

    /// Pulse the trigger pin high for the configured duration
    pub fn fire<IO: DoorbellIo, D: DelayNs>(&self, io: &mut IO, delay: &mut D) -> Result<(), HardwareFault> {
        io.write_pin(PinRole::CameraTrigger, true)?;
        delay.delay_us(u32::try_from(self.duration.as_micros()).unwrap_or(u32::MAX));

        if let Err(fault) = io.write_pin(PinRole::CameraTrigger, false) {
            // A trigger stuck high keeps the camera busy, so try once more
            warn!("[CAMERA] Failed to release trigger, retrying");
            io.write_pin(PinRole::CameraTrigger, false).map_err(|_| fault)?;
        }

        info!(
            "[CAMERA] Capture triggered ({} ms, {:?} quality)",
            self.duration.as_millis(),
            self.quality
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records pin writes against a clock advanced by the delay
    #[derive(Default)]
    struct Bench {
        writes: Vec<(u64, bool)>,
        fail_writes: Vec<bool>,
    }

    struct BenchDelay<'a>(&'a core::cell::Cell<u64>);

    impl DelayNs for BenchDelay<'_> {
        fn delay_ns(&mut self, ns: u32) {
            self.0.set(self.0.get() + ns as u64 / 1000);
        }
    }

    struct BenchIo<'a> {
        clock: &'a core::cell::Cell<u64>,
        bench: Bench,
    }

    impl DoorbellIo for BenchIo<'_> {
        fn read_pin(&mut self, role: PinRole) -> Result<bool, HardwareFault> {
            Err(HardwareFault { role, pin: 0 })
        }

        fn write_pin(&mut self, role: PinRole, high: bool) -> Result<(), HardwareFault> {
            assert_eq!(role, PinRole::CameraTrigger);
            if !self.bench.fail_writes.is_empty() && self.bench.fail_writes.remove(0) {
                return Err(HardwareFault { role, pin: 7 });
            }
            self.bench.writes.push((self.clock.get(), high));
            Ok(())
        }
    }

    fn trigger() -> CaptureTrigger {
        CaptureTrigger::new(&Config::from_defaults().unwrap())
    }

    #[test]
    fn pulse_lasts_trigger_duration() {
        let clock = core::cell::Cell::new(1_000);
        let mut io = BenchIo { clock: &clock, bench: Bench::default() };

        trigger().fire(&mut io, &mut BenchDelay(&clock)).unwrap();

        let writes = &io.bench.writes;
        assert_eq!(writes.len(), 2);
        assert_eq!((writes[0].1, writes[1].1), (true, false));
        assert_eq!(writes[1].0 - writes[0].0, 200_000);
    }

    #[test]
    fn overlong_pulse_saturates() {
        let clock = core::cell::Cell::new(0);
        let mut io = BenchIo { clock: &clock, bench: Bench::default() };
        let trigger = CaptureTrigger {
            duration: Duration::from_secs(72 * 60),
            quality: PhotoQuality::Low,
        };

        trigger.fire(&mut io, &mut BenchDelay(&clock)).unwrap();

        let writes = &io.bench.writes;
        assert_eq!(writes[1].0 - writes[0].0, u32::MAX as u64);
    }

    #[test]
    fn failed_rise_is_a_fault() {
        let clock = core::cell::Cell::new(0);
        let mut io = BenchIo {
            clock: &clock,
            bench: Bench { fail_writes: vec![true], ..Default::default() },
        };

        assert_eq!(
            trigger().fire(&mut io, &mut BenchDelay(&clock)),
            Err(HardwareFault { role: PinRole::CameraTrigger, pin: 7 })
        );
        assert!(io.bench.writes.is_empty());
    }

    #[test]
    fn failed_release_is_retried_once() {
        let clock = core::cell::Cell::new(0);
        let mut io = BenchIo {
            clock: &clock,
            bench: Bench { fail_writes: vec![false, true, false], ..Default::default() },
        };

        assert!(trigger().fire(&mut io, &mut BenchDelay(&clock)).is_ok());
        assert_eq!(io.bench.writes.last().map(|w| w.1), Some(false));
    }
}
