//! WiFi link supervision
//!
//! A small state machine decides when to (re)connect, when to give up and
//! run offline, and when to try again. The radio itself sits behind
//! [`WifiLink`], whose `connect` only starts an association. Later polls
//! check whether it completed, so a dead access point never stalls sensor
//! polling.

use alloc::vec::Vec;
use core::fmt;

use embassy_time::Instant;
use log::{debug, info, warn};

use crate::config::WifiSettings;
use crate::indicator::IndicatorPattern;

/// WiFi failures reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    /// SSID or password rejected before association
    InvalidCredentials,
    /// Driver refused a configuration or start request
    Driver,
    /// Association did not complete in time
    NotConnected,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WifiError::InvalidCredentials => write!(f, "invalid WiFi credentials"),
            WifiError::Driver => write!(f, "WiFi driver error"),
            WifiError::NotConnected => write!(f, "WiFi not connected"),
        }
    }
}

/// Station-mode WiFi radio
pub trait WifiLink {
    /// Start one association attempt without waiting for it to complete
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError>;

    fn is_connected(&mut self) -> bool;

    /// Signal strength in dBm, when the driver knows it
    fn rssi(&mut self) -> Option<i8> {
        None
    }
}

/// Link states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Online,
    Reconnecting,
    /// Retry budget exhausted; reporting is suspended
    Offline,
}

/// Link events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Started,
    Connected,
    ConnectionFailed,
    Disconnected,
    OfflineRetryElapsed,
}

/// State transition result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Stay in the current state
    Stay,
    /// Move to a new state
    Transition(LinkState),
    /// Move to a new state and reset the retry count
    TransitionWithReset(LinkState),
}

/// Work the state machine asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    AttemptConnection,
    MonitorConnection,
    AwaitOfflineRetry,
}

/// WiFi link state machine
pub struct LinkStateMachine {
    current_state: LinkState,
    previous_state: Option<LinkState>,
    retry_count: u32,
    max_retries: u32,
}

impl LinkStateMachine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            current_state: LinkState::Idle,
            previous_state: None,
            retry_count: 0,
            max_retries,
        }
    }

    pub fn current_state(&self) -> LinkState {
        self.current_state
    }

    pub fn previous_state(&self) -> Option<LinkState> {
        self.previous_state
    }

    /// Consecutive failed attempts in the current cycle
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Status LED pattern for the current state
    pub fn indicator_pattern(&self) -> IndicatorPattern {
        match self.current_state {
            LinkState::Idle | LinkState::Connecting | LinkState::Reconnecting => IndicatorPattern::Connecting,
            LinkState::Online => IndicatorPattern::Online,
            LinkState::Offline => IndicatorPattern::Offline,
        }
    }

    pub fn handle_event(&mut self, event: LinkEvent) -> StateTransition {
        let transition = self.get_state_transition(self.current_state, event);

        match transition {
            StateTransition::Transition(new_state) => self.transition_to_state(new_state),
            StateTransition::TransitionWithReset(new_state) => {
                self.retry_count = 0;
                self.transition_to_state(new_state);
            }
            StateTransition::Stay => {}
        }

        transition
    }

    /// Actions for the current state
    pub fn update(&self) -> Vec<LinkAction> {
        let mut actions = Vec::new();

        match self.current_state {
            LinkState::Idle => {}
            LinkState::Connecting | LinkState::Reconnecting => actions.push(LinkAction::AttemptConnection),
            LinkState::Online => actions.push(LinkAction::MonitorConnection),
            LinkState::Offline => actions.push(LinkAction::AwaitOfflineRetry),
        }

        actions
    }

    fn transition_to_state(&mut self, new_state: LinkState) {
        if new_state != self.current_state {
            match new_state {
                LinkState::Online => info!("[WIFI] Link online"),
                LinkState::Offline => warn!("[WIFI] Link offline, reporting suspended"),
                _ => {}
            }

            self.previous_state = Some(self.current_state);
            self.current_state = new_state;
        }
    }

    fn get_state_transition(&mut self, current_state: LinkState, event: LinkEvent) -> StateTransition {
        match (current_state, event) {
            (LinkState::Idle, LinkEvent::Started) => StateTransition::Transition(LinkState::Connecting),

            (LinkState::Connecting | LinkState::Reconnecting, LinkEvent::Connected) => {
                StateTransition::TransitionWithReset(LinkState::Online)
            }
            (LinkState::Connecting | LinkState::Reconnecting, LinkEvent::ConnectionFailed) => {
                self.retry_count += 1;
                if self.retry_count < self.max_retries {
                    StateTransition::Stay
                } else {
                    StateTransition::Transition(LinkState::Offline)
                }
            }

            (LinkState::Online, LinkEvent::Disconnected) => {
                StateTransition::TransitionWithReset(LinkState::Reconnecting)
            }

            (LinkState::Offline, LinkEvent::OfflineRetryElapsed) => {
                StateTransition::TransitionWithReset(LinkState::Reconnecting)
            }
            // the driver may reassociate on its own
            (LinkState::Offline, LinkEvent::Connected) => StateTransition::TransitionWithReset(LinkState::Online),

            _ => StateTransition::Stay,
        }
    }

    pub fn is_online(&self) -> bool {
        self.current_state == LinkState::Online
    }
}

/// Drives a [`WifiLink`] through the link state machine
pub struct WifiSupervisor<'a> {
    settings: &'a WifiSettings,
    machine: LinkStateMachine,
    next_attempt_at: Instant,
    /// End of the window of the attempt in flight
    attempt_deadline: Option<Instant>,
    offline_since: Option<Instant>,
    rssi: Option<i8>,
}

impl<'a> WifiSupervisor<'a> {
    pub fn new(settings: &'a WifiSettings) -> Self {
        Self {
            settings,
            machine: LinkStateMachine::new(settings.max_retries),
            next_attempt_at: Instant::from_ticks(0),
            attempt_deadline: None,
            offline_since: None,
            rssi: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.machine.current_state()
    }

    pub fn is_online(&self) -> bool {
        self.machine.is_online()
    }

    pub fn indicator_pattern(&self) -> IndicatorPattern {
        self.machine.indicator_pattern()
    }

    /// Last signal strength seen while online
    pub fn rssi(&self) -> Option<i8> {
        self.rssi
    }

    /// When the supervisor next needs a tick, if it is waiting on a timer
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.machine.current_state() {
            LinkState::Connecting | LinkState::Reconnecting => {
                Some(self.attempt_deadline.unwrap_or(self.next_attempt_at))
            }
            LinkState::Offline => self.offline_since.map(|t| t + self.settings.offline_retry_interval),
            LinkState::Idle | LinkState::Online => None,
        }
    }

    /// Advance the link without waiting on the radio.
    ///
    /// Returns the failure of an attempt that ended during this poll; the
    /// link state is updated either way.
    pub fn poll<W: WifiLink>(&mut self, link: &mut W, now: Instant) -> Result<LinkState, WifiError> {
        if self.machine.current_state() == LinkState::Idle {
            info!("[WIFI] Connecting to WiFi network: {}", self.settings.ssid);
            self.machine.handle_event(LinkEvent::Started);
            self.next_attempt_at = now;
        }

        let mut result = Ok(());
        for action in self.machine.update() {
            match action {
                LinkAction::AttemptConnection => result = self.advance_attempt(link, now),
                LinkAction::MonitorConnection => {
                    if link.is_connected() {
                        self.rssi = link.rssi();
                    } else {
                        warn!("[WIFI] WiFi connection lost!");
                        self.machine.handle_event(LinkEvent::Disconnected);
                        self.next_attempt_at = now;
                        self.attempt_deadline = None;
                        self.rssi = None;
                    }
                }
                LinkAction::AwaitOfflineRetry => {
                    if link.is_connected() {
                        info!("[WIFI] WiFi connection restored!");
                        self.associated(link);
                    } else if self.next_deadline().is_some_and(|deadline| now >= deadline) {
                        info!("[WIFI] Offline retry window elapsed, reconnecting");
                        self.machine.handle_event(LinkEvent::OfflineRetryElapsed);
                        self.offline_since = None;
                        self.next_attempt_at = now;
                    }
                }
            }
        }

        result.map(|()| self.machine.current_state())
    }

    /// Check the attempt in flight, or start one when the retry interval
    /// allows. An attempt fails when its window passes without association.
    fn advance_attempt<W: WifiLink>(&mut self, link: &mut W, now: Instant) -> Result<(), WifiError> {
        if link.is_connected() {
            self.associated(link);
            return Ok(());
        }

        let mut result = Ok(());
        match self.attempt_deadline {
            Some(deadline) if now < deadline => return Ok(()),
            Some(_) => {
                self.attempt_deadline = None;
                self.attempt_failed(WifiError::NotConnected, now);
                result = Err(WifiError::NotConnected);
            }
            None if now < self.next_attempt_at => return Ok(()),
            None => {}
        }

        if !matches!(self.machine.current_state(), LinkState::Connecting | LinkState::Reconnecting) {
            return result;
        }

        self.next_attempt_at = now + self.settings.retry_interval;
        match link.connect(self.settings.ssid, self.settings.password) {
            Ok(()) => {
                self.attempt_deadline = Some(self.next_attempt_at);
                if link.is_connected() {
                    self.associated(link);
                }
            }
            Err(e) => {
                self.attempt_failed(e, now);
                result = Err(e);
            }
        }
        result
    }

    fn associated<W: WifiLink>(&mut self, link: &mut W) {
        self.attempt_deadline = None;
        self.offline_since = None;
        self.machine.handle_event(LinkEvent::Connected);
        self.rssi = link.rssi();
    }

    fn attempt_failed(&mut self, error: WifiError, now: Instant) {
        debug!(
            "[WIFI] Attempt {}/{} failed: {}",
            self.machine.retry_count() + 1,
            self.settings.max_retries,
            error
        );
        self.machine.handle_event(LinkEvent::ConnectionFailed);
        if self.machine.current_state() == LinkState::Offline {
            self.offline_since = Some(now);
        }
    }
}
