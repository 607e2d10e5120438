//! Instance-status polling: ask the gateway whether an instance is paired and,
//! until it is, show the QR code with a countdown to the next check.
//!
//! One poll task per session. The task owns no state of its own; every
//! mutation goes through [`PollSession`] under a mutex that is never held
//! across an `.await`. Each (re)start bumps the session epoch so a reply that
//! belongs to an earlier run is discarded instead of applied.


use disparo_core::{
    config::PollerConfig,
    error::DisparoError,
    session::Session,
    status::StatusReply,
    traits::{Notification, Notifier, StatusGateway},
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accepted range for the gap between a QR reply and the next request.
const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Where the pairing flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Idle,
    AwaitingInput,
    Polling,
    ShowingQr,
    Connected,
    Failed,
}

/// What a renderer needs to draw the pairing screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollSnapshot {
    pub instance_name: String,
    pub status: PollStatus,
    /// Base64 PNG, present while `ShowingQr` (and during the re-poll after it).
    pub qr_image: Option<String>,
    pub countdown_secs: u64,
    pub last_error: Option<String>,
}

/// Handle on the running poll task.
struct ScheduledPoll {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ScheduledPoll {
    fn cancel(self) {
        self.token.cancel();
        self.task.abort();
    }
}

struct PollSession {
    instance_name: String,
    status: PollStatus,
    qr_image: Option<String>,
    countdown_secs: u64,
    last_error: Option<String>,
    busy: bool,
    epoch: u64,
    scheduled: Option<ScheduledPoll>,
}

impl PollSession {
    fn new() -> Self {
        Self {
            instance_name: String::new(),
            status: PollStatus::Idle,
            qr_image: None,
            countdown_secs: 0,
            last_error: None,
            busy: false,
            epoch: 0,
            scheduled: None,
        }
    }

    fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            instance_name: self.instance_name.clone(),
            status: self.status,
            qr_image: self.qr_image.clone(),
            countdown_secs: self.countdown_secs,
            last_error: self.last_error.clone(),
        }
    }

    /// Stop the scheduled task and orphan any reply still in flight.
    fn invalidate(&mut self) {
        if let Some(scheduled) = self.scheduled.take() {
            scheduled.cancel();
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.busy = false;
    }

    fn reset(&mut self, status: PollStatus) {
        self.status = status;
        self.qr_image = None;
        self.countdown_secs = 0;
        self.last_error = None;
    }
}

struct Inner {
    gateway: Arc<dyn StatusGateway>,
    notifier: Arc<dyn Notifier>,
    session: Arc<Session>,
    interval: Duration,
    state: Mutex<PollSession>,
    snapshots: watch::Sender<PollSnapshot>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PollSession> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PollSession) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Mark a request as outstanding; `None` if this run was superseded.
    fn begin_request(&self, epoch: u64) -> Option<String> {
        let mut state = self.lock();
        if state.epoch != epoch {
            return None;
        }
        state.busy = true;
        state.status = PollStatus::Polling;
        self.publish(&state);
        Some(state.instance_name.trim().to_string())
    }

    /// Apply a status reply. Returns whether the loop should count down and
    /// poll again.
    fn handle_reply(
        &self,
        epoch: u64,
        instance: &str,
        reply: Result<StatusReply, DisparoError>,
    ) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            debug!("discarding stale status reply for {instance}");
            return false;
        }
        state.busy = false;

        let (notice, again) = match reply {
            Ok(StatusReply::Open) => {
                info!("instance {instance} is connected");
                state.reset(PollStatus::Connected);
                state.scheduled = None;
                (
                    Some(Notification::success(
                        "WhatsApp connected",
                        format!("Instance {instance} is ready to send messages."),
                    )),
                    false,
                )
            }
            Ok(StatusReply::Qr(image)) => {
                debug!("instance {instance} not paired yet, showing QR");
                state.status = PollStatus::ShowingQr;
                state.qr_image = Some(image);
                state.countdown_secs = ceil_secs(self.interval);
                (None, true)
            }
            Ok(StatusReply::Unexpected(detail)) => {
                warn!("unexpected status reply for {instance}: {detail}");
                state.reset(PollStatus::Failed);
                state.last_error = Some(detail);
                state.scheduled = None;
                (
                    Some(Notification::error(
                        "Unexpected response",
                        "The gateway did not return a QR code or a connection status.",
                    )),
                    false,
                )
            }
            Err(e) => {
                warn!("status check for {instance} failed: {e}");
                let message = e.to_string();
                state.reset(PollStatus::Failed);
                state.last_error = Some(message.clone());
                state.scheduled = None;
                (
                    Some(Notification::error("Could not check the connection", message)),
                    false,
                )
            }
        };
        let connected = state.status == PollStatus::Connected;
        self.publish(&state);
        drop(state);

        if connected {
            self.session.set_connected_instance(Some(instance.to_string()));
        }
        if let Some(notice) = notice {
            self.notifier.notify(notice);
        }
        again
    }

    fn tick(&self, epoch: u64, left: u64) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        state.countdown_secs = left;
        self.publish(&state);
        true
    }
}

/// Drives the QR pairing flow for one gateway instance.
pub struct ConnectionPoller {
    inner: Arc<Inner>,
}

impl ConnectionPoller {
    pub fn new(
        gateway: Arc<dyn StatusGateway>,
        notifier: Arc<dyn Notifier>,
        session: Arc<Session>,
        config: &PollerConfig,
    ) -> Self {
        let state = PollSession::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(Inner {
                gateway,
                notifier,
                session,
                interval: config.interval().clamp(MIN_INTERVAL, MAX_INTERVAL),
                state: Mutex::new(state),
                snapshots,
            }),
        }
    }

    /// Show the instance-name prompt. No-op unless `Idle`.
    pub fn open(&self) {
        let mut state = self.inner.lock();
        if state.status == PollStatus::Idle {
            state.status = PollStatus::AwaitingInput;
            self.inner.publish(&state);
        }
    }

    /// Store the instance name. A different name abandons whatever the
    /// previous one was doing and goes back to the prompt.
    pub fn set_instance_name(&self, name: &str) {
        let mut state = self.inner.lock();
        let changed = state.instance_name != name;
        state.instance_name = name.to_string();
        match state.status {
            PollStatus::Idle => state.status = PollStatus::AwaitingInput,
            PollStatus::AwaitingInput => {}
            _ if changed => {
                debug!("instance name changed to {name:?}, resetting");
                state.invalidate();
                state.reset(PollStatus::AwaitingInput);
            }
            _ => {}
        }
        self.inner.publish(&state);
    }

    /// Begin polling. The first status request goes out immediately.
    pub fn start(&self) -> Result<(), DisparoError> {
        let mut state = self.inner.lock();
        let instance = state.instance_name.trim().to_string();
        if instance.is_empty() {
            drop(state);
            self.inner.notifier.notify(Notification::error(
                "Instance name required",
                "Enter the name of the WhatsApp instance to connect.",
            ));
            return Err(DisparoError::invalid(
                "instance_name",
                "enter the instance name",
            ));
        }
        if state.busy {
            return Err(DisparoError::Busy(format!(
                "a status request for {instance} is already in flight"
            )));
        }
        if state.status == PollStatus::Connected {
            return Err(DisparoError::Busy(format!(
                "instance {instance} is already connected"
            )));
        }

        state.invalidate();
        state.reset(PollStatus::Polling);
        state.busy = true;
        let epoch = state.epoch;
        let token = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            epoch,
            token.clone(),
        ));
        state.scheduled = Some(ScheduledPoll { token, task });
        self.inner.publish(&state);
        info!("checking connection status of instance {instance}");
        Ok(())
    }

    /// Stop everything, forget the instance name and return to `Idle`. Safe
    /// to call repeatedly.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.invalidate();
        state.reset(PollStatus::Idle);
        state.instance_name.clear();
        self.inner.publish(&state);
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Follow state changes as they happen.
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.inner.snapshots.subscribe()
    }
}

impl Drop for ConnectionPoller {
    fn drop(&mut self) {
        self.inner.lock().invalidate();
    }
}

/// Request, then (on a QR reply) count down and request again.
async fn poll_loop(inner: Arc<Inner>, epoch: u64, token: CancellationToken) {
    loop {
        let Some(instance) = inner.begin_request(epoch) else {
            return;
        };

        let reply = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            reply = inner.gateway.instance_status(&instance) => reply,
        };

        if !inner.handle_reply(epoch, &instance, reply) {
            return;
        }
        if !count_down(&inner, epoch, &token).await {
            return;
        }
    }
}

/// Tick the countdown once per second so it hits 0 exactly at the deadline.
async fn count_down(inner: &Inner, epoch: u64, token: &CancellationToken) -> bool {
    let deadline = Instant::now() + inner.interval;
    let mut left = ceil_secs(inner.interval);
    while left > 0 {
        left -= 1;
        let at = deadline
            .checked_sub(Duration::from_secs(left))
            .unwrap_or(deadline);
        tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep_until(at) => {}
        }
        if !inner.tick(epoch, left) {
            return false;
        }
    }
    true
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
