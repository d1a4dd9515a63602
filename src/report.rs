//! Network reporter
//!
//! Events and periodic status updates become [`ReportJob`]s holding an
//! already serialized JSON body. New jobs wait in a bounded FIFO; jobs that
//! failed transiently move to a separate retry list with exponential backoff.
//! At most one status report waits at a time; a newer one replaces it.
//! Each drain sends the due job with the earliest due time, at most
//! `reports_per_tick` of them, so one tick never waits on more than that many
//! HTTP timeouts.

use alloc::vec::Vec;

use embassy_time::{Duration, Instant};
use heapless::Deque;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{Config, DeviceIdentity, REPORT_QUEUE_CAPACITY};
use crate::events::{EventKind, SensorEvent};
use crate::http::{HttpRequest, HttpTransport};
use crate::ReportError;

/// Server endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    MotionDetected,
    DoorbellPressed,
    SystemStatus,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::MotionDetected => "/api/motion/detected",
            Endpoint::DoorbellPressed => "/api/doorbell/pressed",
            Endpoint::SystemStatus => "/api/system/status",
        }
    }
}

impl From<EventKind> for Endpoint {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Motion => Endpoint::MotionDetected,
            EventKind::Doorbell => Endpoint::DoorbellPressed,
        }
    }
}

/// Device health and report counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device_id: &'static str,
    pub location: &'static str,
    pub uptime: Duration,
    pub last_event_timestamp: Option<Instant>,
    /// Percent, `None` when mains powered
    pub battery_level: Option<u8>,
    /// dBm
    pub wifi_strength: Option<i8>,
    pub reports_delivered: u32,
    pub reports_failed: u32,
}

impl DeviceStatus {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            device_id: identity.device_id,
            location: identity.location,
            uptime: Duration::from_ticks(0),
            last_event_timestamp: None,
            battery_level: None,
            wifi_strength: None,
            reports_delivered: 0,
            reports_failed: 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct EventPayload<'a> {
    device_id: &'a str,
    location: &'a str,
    event_type: &'a str,
    /// Uptime in milliseconds
    timestamp: u64,
    photo_quality: u8,
}

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    device_id: &'a str,
    location: &'a str,
    /// Seconds
    uptime: u64,
    battery: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wifi_strength: Option<i8>,
}

/// One pending report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    pub endpoint: Endpoint,
    pub payload: Vec<u8>,
    /// Failed attempts so far
    pub attempt_count: u8,
    /// Not sent before this time. For new jobs this is the enqueue time.
    pub next_retry_at: Instant,
}

impl ReportJob {
    pub fn new(endpoint: Endpoint, payload: Vec<u8>, now: Instant) -> Self {
        Self {
            endpoint,
            payload,
            attempt_count: 0,
            next_retry_at: now,
        }
    }
}

/// What one drain did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub sent: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
    /// Status code of the last rejected report
    pub rejected: Option<u16>,
}

pub struct NetworkReporter<'a, const Q: usize = REPORT_QUEUE_CAPACITY> {
    config: &'a Config,
    primary: Deque<ReportJob, Q>,
    retries: heapless::Vec<ReportJob, Q>,
    next_status_at: Instant,
}

impl<'a, const Q: usize> NetworkReporter<'a, Q> {
    pub fn new(config: &'a Config, now: Instant) -> Self {
        Self {
            config,
            primary: Deque::new(),
            retries: heapless::Vec::new(),
            next_status_at: now + config.server.status_interval,
        }
    }

    /// Queue a new job. A full queue loses its oldest job.
    pub fn enqueue(&mut self, job: ReportJob, status: &mut DeviceStatus) {
        if self.primary.is_full() {
            if let Some(oldest) = self.primary.pop_front() {
                warn!("[REPORT] Queue full, dropped {}", oldest.endpoint.path());
                status.reports_failed += 1;
            }
        }
        let _ = self.primary.push_back(job);
        debug!("[REPORT] {} job(s) pending", self.pending());
    }

    /// Serialize and queue an event report
    pub fn report_event(&mut self, event: &SensorEvent, now: Instant, status: &mut DeviceStatus) {
        status.last_event_timestamp = Some(event.timestamp);

        let payload = EventPayload {
            device_id: status.device_id,
            location: status.location,
            event_type: event.kind.as_str(),
            timestamp: event.timestamp.as_millis(),
            photo_quality: self.config.camera.photo_quality.jpeg_quality(),
        };
        match serde_json::to_vec(&payload) {
            Ok(body) => self.enqueue(ReportJob::new(event.kind.into(), body, now), status),
            Err(e) => warn!("[REPORT] Failed to encode {} event: {}", event.kind.as_str(), e),
        }
    }

    /// Serialize and queue a status report, and schedule the next one
    pub fn report_status(&mut self, now: Instant, wifi_strength: Option<i8>, status: &mut DeviceStatus) {
        self.next_status_at = now + self.config.server.status_interval;
        status.wifi_strength = wifi_strength;

        let payload = StatusPayload {
            device_id: status.device_id,
            location: status.location,
            uptime: status.uptime.as_secs(),
            battery: status.battery_level,
            wifi_strength,
        };
        match serde_json::to_vec(&payload) {
            Ok(body) => {
                self.drop_pending_status();
                self.enqueue(ReportJob::new(Endpoint::SystemStatus, body, now), status);
            }
            Err(e) => warn!("[REPORT] Failed to encode status: {}", e),
        }
    }

    /// Remove status jobs still waiting. A newer status supersedes them, so
    /// they never crowd event reports out of the queue during an outage.
    fn drop_pending_status(&mut self) {
        let before = self.pending();

        for _ in 0..self.primary.len() {
            if let Some(job) = self.primary.pop_front() {
                if job.endpoint != Endpoint::SystemStatus {
                    let _ = self.primary.push_back(job);
                }
            }
        }
        self.retries.retain(|job| job.endpoint != Endpoint::SystemStatus);

        let superseded = before - self.pending();
        if superseded > 0 {
            debug!("[REPORT] Superseded {} pending status report(s)", superseded);
        }
    }

    pub fn status_due(&self, now: Instant) -> bool {
        now >= self.next_status_at
    }

    pub fn next_status_at(&self) -> Instant {
        self.next_status_at
    }

    pub fn pending(&self) -> usize {
        self.primary.len() + self.retries.len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }

    /// Earliest time any queued job may be sent
    pub fn next_due(&self) -> Option<Instant> {
        let primary = self.primary.front().map(|job| job.next_retry_at);
        let retry = self.retries.iter().map(|job| job.next_retry_at).min();
        match (primary, retry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Delay before retrying a job that has failed `attempts` times
    pub fn backoff(&self, attempts: u8) -> Duration {
        let server = &self.config.server;
        let factor = 1u64.checked_shl(attempts.saturating_sub(1) as u32).unwrap_or(u64::MAX);
        let ticks = server.http_timeout.as_ticks().saturating_mul(factor);
        Duration::from_ticks(ticks.min(server.max_backoff.as_ticks()))
    }

    /// Send up to `reports_per_tick` due jobs
    pub async fn drain_queue<T: HttpTransport>(
        &mut self,
        transport: &mut T,
        now: Instant,
        status: &mut DeviceStatus,
    ) -> DrainSummary {
        let mut summary = DrainSummary::default();

        for _ in 0..self.config.server.reports_per_tick {
            let Some(mut job) = self.take_due(now) else {
                break;
            };
            summary.sent += 1;

            match self.attempt(transport, &job).await {
                Ok(()) => {
                    info!("[REPORT] Delivered {}", job.endpoint.path());
                    status.reports_delivered += 1;
                    summary.delivered += 1;
                }
                Err(ReportError::ServerRejected(code)) => {
                    warn!("[REPORT] {} rejected with HTTP {}, discarded", job.endpoint.path(), code);
                    status.reports_failed += 1;
                    summary.rejected = Some(code);
                }
                Err(ReportError::Transient(e)) => {
                    job.attempt_count = job.attempt_count.saturating_add(1);
                    if job.attempt_count < self.config.server.max_attempts {
                        let delay = self.backoff(job.attempt_count);
                        warn!(
                            "[REPORT] {} failed ({}), attempt {}/{}, retry in {} ms",
                            job.endpoint.path(),
                            e,
                            job.attempt_count,
                            self.config.server.max_attempts,
                            delay.as_millis()
                        );
                        job.next_retry_at = now + delay;
                        self.schedule_retry(job, status);
                        summary.retried += 1;
                    } else {
                        warn!(
                            "[REPORT] {} failed ({}), giving up after {} attempts",
                            job.endpoint.path(),
                            e,
                            job.attempt_count
                        );
                        status.reports_failed += 1;
                        summary.dropped += 1;
                    }
                }
            }
        }

        summary
    }

    async fn attempt<T: HttpTransport>(&self, transport: &mut T, job: &ReportJob) -> Result<(), ReportError> {
        let server = &self.config.server;
        let path = server.url.path_for(job.endpoint.path());
        let headers = [("X-API-Key", server.api_key)];
        let request = HttpRequest {
            server: &server.url,
            path: &path,
            headers: &headers,
            body: &job.payload,
        };

        let response = transport
            .send(&request, server.http_timeout)
            .await
            .map_err(ReportError::Transient)?;

        if response.is_success() {
            Ok(())
        } else {
            Err(ReportError::ServerRejected(response.status))
        }
    }

    /// Remove the due job with the earliest due time. Ties go to the
    /// primary queue.
    fn take_due(&mut self, now: Instant) -> Option<ReportJob> {
        let retry = self
            .retries
            .iter()
            .enumerate()
            .filter(|(_, job)| job.next_retry_at <= now)
            .min_by_key(|(_, job)| job.next_retry_at)
            .map(|(idx, job)| (idx, job.next_retry_at));
        let primary = self
            .primary
            .front()
            .map(|job| job.next_retry_at)
            .filter(|due| *due <= now);

        match (primary, retry) {
            (Some(p), Some((idx, r))) if r < p => Some(self.retries.remove(idx)),
            (Some(_), _) => self.primary.pop_front(),
            (None, Some((idx, _))) => Some(self.retries.remove(idx)),
            (None, None) => None,
        }
    }

    /// Park a failed job. A full retry list loses the job due last.
    fn schedule_retry(&mut self, job: ReportJob, status: &mut DeviceStatus) {
        let job = match self.retries.push(job) {
            Ok(()) => return,
            Err(job) => job,
        };

        let latest = self
            .retries
            .iter()
            .enumerate()
            .max_by_key(|(_, queued)| queued.next_retry_at)
            .map(|(idx, queued)| (idx, queued.next_retry_at));

        status.reports_failed += 1;
        match latest {
            Some((idx, due)) if due > job.next_retry_at => {
                let dropped = core::mem::replace(&mut self.retries[idx], job);
                warn!("[REPORT] Retry list full, dropped {}", dropped.endpoint.path());
            }
            _ => warn!("[REPORT] Retry list full, dropped {}", job.endpoint.path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, NetworkError};
    use embassy_futures::block_on;

    /// Transport answering from a script, one entry per send
    #[derive(Default)]
    struct Scripted {
        replies: Vec<Result<u16, NetworkError>>,
        sent: Vec<(alloc::string::String, Vec<u8>)>,
    }

    impl HttpTransport for Scripted {
        async fn send(&mut self, request: &HttpRequest<'_>, _timeout: Duration) -> Result<HttpResponse, NetworkError> {
            self.sent.push((request.path.into(), request.body.to_vec()));
            let reply = if self.replies.is_empty() { Ok(200) } else { self.replies.remove(0) };
            reply.map(|status| HttpResponse { status })
        }
    }

    fn config() -> Config {
        Config::from_defaults().unwrap()
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn doorbell(ms: u64) -> SensorEvent {
        SensorEvent {
            kind: EventKind::Doorbell,
            timestamp: at(ms),
            raw_pin: 3,
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let config = config();
        let reporter: NetworkReporter = NetworkReporter::new(&config, at(0));
        let delays: Vec<u64> = (1..=7).map(|n| reporter.backoff(n).as_secs()).collect();

        assert_eq!(delays, [5, 10, 20, 40, 80, 120, 120]);
    }

    #[test]
    fn event_payload_shape() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter = NetworkReporter::new(&config, at(0));
        let mut transport = Scripted::default();

        reporter.report_event(&doorbell(1234), at(1234), &mut status);
        block_on(reporter.drain_queue(&mut transport, at(1234), &mut status));

        let (path, body) = &transport.sent[0];
        assert_eq!(path, "/api/doorbell/pressed");
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["event_type"], "doorbell");
        assert_eq!(json["timestamp"], 1234);
        assert_eq!(json["photo_quality"], 95);
        assert_eq!(json["device_id"], config.device.device_id);
        assert_eq!(status.reports_delivered, 1);
        assert_eq!(status.last_event_timestamp, Some(at(1234)));
    }

    #[test]
    fn status_payload_omits_unknown_signal() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        status.uptime = Duration::from_secs(95);
        let mut reporter: NetworkReporter = NetworkReporter::new(&config, at(0));
        let mut transport = Scripted::default();

        assert!(!reporter.status_due(at(29_999)));
        assert!(reporter.status_due(at(30_000)));
        reporter.report_status(at(30_000), None, &mut status);
        assert_eq!(reporter.next_status_at(), at(60_000));

        block_on(reporter.drain_queue(&mut transport, at(30_000), &mut status));
        let json: serde_json::Value = serde_json::from_slice(&transport.sent[0].1).unwrap();
        assert_eq!(json["uptime"], 95);
        assert!(json["battery"].is_null());
        assert!(json.get("wifi_strength").is_none());
    }

    #[test]
    fn three_timeouts_then_success() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter = NetworkReporter::new(&config, at(0));
        let mut transport = Scripted {
            replies: vec![Err(NetworkError::Timeout), Err(NetworkError::Timeout), Err(NetworkError::Timeout), Ok(201)],
            ..Default::default()
        };

        reporter.report_event(&doorbell(0), at(0), &mut status);

        let mut now = 0;
        let mut delays = Vec::new();
        for _ in 0..3 {
            let summary = block_on(reporter.drain_queue(&mut transport, at(now), &mut status));
            assert_eq!(summary.retried, 1);
            let due = reporter.next_due().unwrap().as_millis();
            delays.push(due - now);

            // nothing is sent before the job is due
            let early = block_on(reporter.drain_queue(&mut transport, at(due - 1), &mut status));
            assert_eq!(early.sent, 0);
            now = due;
        }

        let summary = block_on(reporter.drain_queue(&mut transport, at(now), &mut status));
        assert_eq!(summary.delivered, 1);
        assert_eq!(delays, [5000, 10_000, 20_000]);
        assert_eq!(transport.sent.len(), 4);
        assert!(!reporter.has_pending());
    }

    #[test]
    fn gives_up_after_attempt_budget() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter = NetworkReporter::new(&config, at(0));
        let mut transport = Scripted {
            replies: vec![Err(NetworkError::ConnectionFailed); 5],
            ..Default::default()
        };

        reporter.report_event(&doorbell(0), at(0), &mut status);
        let mut now = at(0);
        let mut last = DrainSummary::default();
        while reporter.has_pending() {
            last = block_on(reporter.drain_queue(&mut transport, now, &mut status));
            if let Some(due) = reporter.next_due() {
                now = due;
            }
        }

        assert_eq!(transport.sent.len(), 5);
        assert_eq!(last.dropped, 1);
        assert_eq!(status.reports_failed, 1);
    }

    #[test]
    fn client_error_is_not_retried() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter = NetworkReporter::new(&config, at(0));
        let mut transport = Scripted { replies: vec![Ok(401)], ..Default::default() };

        reporter.report_event(&doorbell(0), at(0), &mut status);
        let summary = block_on(reporter.drain_queue(&mut transport, at(0), &mut status));

        assert_eq!(summary.rejected, Some(401));
        assert!(!reporter.has_pending());
        assert_eq!(status.reports_failed, 1);
    }

    #[test]
    fn earliest_due_job_goes_first() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter = NetworkReporter::new(&config, at(0));
        let mut transport = Scripted { replies: vec![Err(NetworkError::Timeout)], ..Default::default() };

        // first job fails and is due again at 5 s
        reporter.report_event(&doorbell(0), at(0), &mut status);
        block_on(reporter.drain_queue(&mut transport, at(0), &mut status));

        // a motion report queued at 6 s is due later than the retry
        let motion = SensorEvent { kind: EventKind::Motion, timestamp: at(6000), raw_pin: 1 };
        reporter.report_event(&motion, at(6000), &mut status);

        block_on(reporter.drain_queue(&mut transport, at(6000), &mut status));
        block_on(reporter.drain_queue(&mut transport, at(6000), &mut status));

        let paths: Vec<&str> = transport.sent.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, ["/api/doorbell/pressed", "/api/doorbell/pressed", "/api/motion/detected"]);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter<2> = NetworkReporter::new(&config, at(0));

        for ms in [0, 1, 2] {
            reporter.report_event(&doorbell(ms), at(ms), &mut status);
        }

        assert_eq!(reporter.pending(), 2);
        assert_eq!(status.reports_failed, 1);
        assert_eq!(reporter.next_due(), Some(at(1)));
    }

    #[test]
    fn newer_status_replaces_pending_one() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter<4> = NetworkReporter::new(&config, at(0));

        reporter.report_event(&doorbell(0), at(0), &mut status);
        for k in 1..=10 {
            status.uptime = Duration::from_secs(30 * k);
            reporter.report_status(at(30_000 * k), None, &mut status);
        }

        assert_eq!(reporter.pending(), 2);
        assert_eq!(status.reports_failed, 0);

        let mut transport = Scripted::default();
        block_on(reporter.drain_queue(&mut transport, at(300_000), &mut status));
        block_on(reporter.drain_queue(&mut transport, at(300_000), &mut status));

        let (first, _) = &transport.sent[0];
        let (second, body) = &transport.sent[1];
        assert_eq!(first, "/api/doorbell/pressed");
        assert_eq!(second, "/api/system/status");
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["uptime"], 300);
    }

    #[test]
    fn full_retry_list_drops_job_due_last() {
        let config = config();
        let mut status = DeviceStatus::new(&config.device);
        let mut reporter: NetworkReporter<2> = NetworkReporter::new(&config, at(0));
        let mut transport = Scripted {
            replies: vec![Err(NetworkError::Timeout); 4],
            ..Default::default()
        };

        // A fails twice and is due again at 15 s
        reporter.report_event(&doorbell(0), at(0), &mut status);
        block_on(reporter.drain_queue(&mut transport, at(0), &mut status));
        block_on(reporter.drain_queue(&mut transport, at(5000), &mut status));
        // B is due again at 11 s
        reporter.report_event(&doorbell(6000), at(6000), &mut status);
        block_on(reporter.drain_queue(&mut transport, at(6000), &mut status));
        // C is due again at 12 s and takes the slot of A
        reporter.report_event(&doorbell(7000), at(7000), &mut status);
        block_on(reporter.drain_queue(&mut transport, at(7000), &mut status));

        assert_eq!(status.reports_failed, 1);
        assert_eq!(reporter.pending(), 2);
        assert_eq!(reporter.next_due(), Some(at(11_000)));

        block_on(reporter.drain_queue(&mut transport, at(11_000), &mut status));
        block_on(reporter.drain_queue(&mut transport, at(12_000), &mut status));
        assert!(!reporter.has_pending());

        let resent: Vec<u64> = transport.sent[4..]
            .iter()
            .map(|(_, body)| serde_json::from_slice::<serde_json::Value>(body).unwrap()["timestamp"].as_u64().unwrap())
            .collect();
        assert_eq!(resent, [6000, 7000]);
        assert_eq!(status.reports_delivered, 2);
    }
}
