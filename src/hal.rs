//! Hardware seams
//!
//! The core never touches a peripheral directly. Pins are addressed by the
//! logical role they play and reached through [`DoorbellIo`]; [`HalPins`]
//! implements it for any set of `embedded-hal` 1.0 pins.

use core::fmt;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::config::{PinMap, Sensitivity};

/// Logical pin roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    Pir,
    DoorbellButton,
    StatusLed,
    MotionLed,
    Buzzer,
    CameraTrigger,
}

impl PinRole {
    pub const ALL: [PinRole; 6] = [
        PinRole::Pir,
        PinRole::DoorbellButton,
        PinRole::StatusLed,
        PinRole::MotionLed,
        PinRole::Buzzer,
        PinRole::CameraTrigger,
    ];

    pub fn is_input(self) -> bool {
        matches!(self, PinRole::Pir | PinRole::DoorbellButton)
    }
}

/// Pin read or write failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareFault {
    pub role: PinRole,
    pub pin: u8,
}

impl HardwareFault {
    pub fn new(role: PinRole, pins: &PinMap) -> Self {
        Self { role, pin: pins.pin(role) }
    }
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hardware fault on GPIO{} ({:?})", self.pin, self.role)
    }
}

/// Pin access by role
pub trait DoorbellIo {
    /// Raw digital level of an input pin
    fn read_pin(&mut self, role: PinRole) -> Result<bool, HardwareFault>;

    /// Drive an output pin
    fn write_pin(&mut self, role: PinRole, high: bool) -> Result<(), HardwareFault>;

    /// Analog level in `0..=Sensitivity::LEVEL_MAX`. Digital-only pins
    /// report full scale when high.
    fn read_level(&mut self, role: PinRole) -> Result<u16, HardwareFault> {
        Ok(if self.read_pin(role)? { Sensitivity::LEVEL_MAX } else { 0 })
    }

    /// Battery charge in percent, `None` when mains powered
    fn read_battery(&mut self) -> Result<Option<u8>, HardwareFault> {
        Ok(None)
    }
}

/// [`DoorbellIo`] over six `embedded-hal` pins
pub struct HalPins<PIR, BTN, SLED, MLED, BZ, CAM> {
    pub pir: PIR,
    pub button: BTN,
    pub status_led: SLED,
    pub motion_led: MLED,
    pub buzzer: BZ,
    pub camera: CAM,
    pins: PinMap,
}

impl<PIR, BTN, SLED, MLED, BZ, CAM> HalPins<PIR, BTN, SLED, MLED, BZ, CAM>
where
    PIR: InputPin,
    BTN: InputPin,
    SLED: OutputPin,
    MLED: OutputPin,
    BZ: OutputPin,
    CAM: OutputPin,
{
    pub fn new(pir: PIR, button: BTN, status_led: SLED, motion_led: MLED, buzzer: BZ, camera: CAM, pins: PinMap) -> Self {
        Self {
            pir,
            button,
            status_led,
            motion_led,
            buzzer,
            camera,
            pins,
        }
    }

    fn fault(&self, role: PinRole) -> HardwareFault {
        HardwareFault::new(role, &self.pins)
    }
}

impl<PIR, BTN, SLED, MLED, BZ, CAM> DoorbellIo for HalPins<PIR, BTN, SLED, MLED, BZ, CAM>
where
    PIR: InputPin,
    BTN: InputPin,
    SLED: OutputPin,
    MLED: OutputPin,
    BZ: OutputPin,
    CAM: OutputPin,
{
    fn read_pin(&mut self, role: PinRole) -> Result<bool, HardwareFault> {
        let level = match role {
            PinRole::Pir => self.pir.is_high().ok(),
            PinRole::DoorbellButton => self.button.is_high().ok(),
            _ => None,
        };
        level.ok_or_else(|| self.fault(role))
    }

    fn write_pin(&mut self, role: PinRole, high: bool) -> Result<(), HardwareFault> {
        fn drive<P: OutputPin>(pin: &mut P, high: bool) -> bool {
            if high { pin.set_high().is_ok() } else { pin.set_low().is_ok() }
        }

        let ok = match role {
            PinRole::StatusLed => drive(&mut self.status_led, high),
            PinRole::MotionLed => drive(&mut self.motion_led, high),
            PinRole::Buzzer => drive(&mut self.buzzer, high),
            PinRole::CameraTrigger => drive(&mut self.camera, high),
            PinRole::Pir | PinRole::DoorbellButton => false,
        };
        if ok { Ok(()) } else { Err(self.fault(role)) }
    }
}
