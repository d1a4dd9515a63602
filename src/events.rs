//! Event aggregator
//!
//! Merges doorbell and motion edges into one FIFO of qualified sensor events.
//! Motion is rate limited by a cooldown window so a PIR that stays triggered
//! cannot flood the queue; the queue itself is bounded and drops its oldest
//! entry when full.

use embassy_time::{Duration, Instant};
use heapless::Deque;
use log::{debug, info, warn};

use crate::config::{Config, EVENT_QUEUE_CAPACITY};
use crate::hal::PinRole;
use crate::input::{EdgeEvent, EdgeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Motion,
    Doorbell,
}

impl EventKind {
    /// Name used in wire payloads
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Motion => "motion",
            EventKind::Doorbell => "doorbell",
        }
    }
}

/// A qualified doorbell press or motion detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorEvent {
    pub kind: EventKind,
    pub timestamp: Instant,
    pub raw_pin: u8,
}

/// Qualifies edges and queues the resulting events
pub struct EventAggregator<const N: usize = EVENT_QUEUE_CAPACITY> {
    queue: Deque<SensorEvent, N>,
    motion_timeout: Duration,
    last_motion: Option<Instant>,
    dropped: u32,
}

impl<const N: usize> EventAggregator<N> {
    pub fn new(config: &Config) -> Self {
        Self::with_motion_timeout(config.sensors.motion_timeout)
    }

    pub fn with_motion_timeout(motion_timeout: Duration) -> Self {
        Self {
            queue: Deque::new(),
            motion_timeout,
            last_motion: None,
            dropped: 0,
        }
    }

    /// Qualify an edge. A qualified event is queued and also returned.
    pub fn submit(&mut self, edge: EdgeEvent) -> Option<SensorEvent> {
        let kind = match (edge.role, edge.kind) {
            (_, EdgeKind::Released) => return None,
            (PinRole::DoorbellButton, EdgeKind::Activated) => EventKind::Doorbell,
            (PinRole::DoorbellButton, EdgeKind::Held) => return None,
            (PinRole::Pir, _) => {
                if self.motion_cooling_down(edge.at) {
                    return None;
                }
                self.last_motion = Some(edge.at);
                EventKind::Motion
            }
            _ => return None,
        };

        let event = SensorEvent {
            kind,
            timestamp: edge.at,
            raw_pin: edge.pin,
        };
        info!("[EVENT] {} at {} ms", kind.as_str(), edge.at.as_millis());
        self.push(event);
        Some(event)
    }

    fn motion_cooling_down(&self, now: Instant) -> bool {
        self.last_motion
            .is_some_and(|t| now.saturating_duration_since(t) < self.motion_timeout)
    }

    fn push(&mut self, event: SensorEvent) {
        if self.queue.is_full() {
            if let Some(oldest) = self.queue.pop_front() {
                self.dropped += 1;
                warn!(
                    "[EVENT] Queue full, dropped {} from {} ms",
                    oldest.kind.as_str(),
                    oldest.timestamp.as_millis()
                );
            }
        }
        // Cannot fail after making room above
        let _ = self.queue.push_back(event);
        debug!("[EVENT] {} event(s) queued", self.queue.len());
    }

    /// Next event in arrival order
    pub fn next(&mut self) -> Option<SensorEvent> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events lost to overflow since startup
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
