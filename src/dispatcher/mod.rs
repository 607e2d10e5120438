//! Bulk dispatch: one request per recipient, in order, with a pause between
//! recipients. Cancellation is checked at every recipient boundary and ends
//! the pause early; the first failed send aborts the rest of the job.


use disparo_core::{
    error::DisparoError,
    message::{MessageKind, Payload},
    recipients::parse_recipients,
    session::Session,
    traits::{MessageGateway, Notification, Notifier},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Messages delivered so far out of the job's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchProgress {
    pub sent: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Completed,
    Cancelled,
    Failed { recipient: String, reason: String },
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub id: Uuid,
    pub kind: MessageKind,
    pub progress: DispatchProgress,
    pub outcome: DispatchOutcome,
}

impl DispatchReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == DispatchOutcome::Completed
    }

    /// The abort reason as an error, for callers that want `?`.
    pub fn error(&self) -> Option<DisparoError> {
        match &self.outcome {
            DispatchOutcome::Failed { reason, .. } => Some(DisparoError::Dispatch(reason.clone())),
            _ => None,
        }
    }
}

/// A validated job, ready to run.
pub struct DispatchJob {
    id: Uuid,
    instance: String,
    recipients: Vec<String>,
    payload: Payload,
    delay: Duration,
    cancel: CancellationToken,
    progress: watch::Sender<DispatchProgress>,
}

impl DispatchJob {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Cancelling this token stops the job at the next recipient boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchProgress> {
        self.progress.subscribe()
    }
}

/// A job running in the background.
pub struct DispatchHandle {
    id: Uuid,
    kind: MessageKind,
    cancel: CancellationToken,
    progress: watch::Receiver<DispatchProgress>,
    task: JoinHandle<DispatchReport>,
}

impl DispatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn progress(&self) -> DispatchProgress {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchProgress> {
        self.progress.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> DispatchReport {
        let progress = *self.progress.borrow();
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                error!("dispatch {} task ended abnormally: {e}", self.id);
                DispatchReport {
                    id: self.id,
                    kind: self.kind,
                    progress,
                    outcome: DispatchOutcome::Failed {
                        recipient: String::new(),
                        reason: format!("dispatch task ended abnormally: {e}"),
                    },
                }
            }
        }
    }
}

/// Sends one payload to many recipients through a [`MessageGateway`].
#[derive(Clone)]
pub struct BulkDispatcher {
    gateway: Arc<dyn MessageGateway>,
    notifier: Arc<dyn Notifier>,
    session: Arc<Session>,
    default_instance: String,
}

impl BulkDispatcher {
    /// `default_instance` is used when no instance was connected this session.
    pub fn new(
        gateway: Arc<dyn MessageGateway>,
        notifier: Arc<dyn Notifier>,
        session: Arc<Session>,
        default_instance: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            notifier,
            session,
            default_instance: default_instance.into(),
        }
    }

    /// Validate the form and build a job. Every problem is reported at once.
    pub fn prepare(
        &self,
        recipients: &str,
        payload: Payload,
        delay_seconds: f64,
    ) -> Result<DispatchJob, DisparoError> {
        let recipients = parse_recipients(recipients);
        let instance = self
            .session
            .connected_instance()
            .unwrap_or_else(|| self.default_instance.clone());

        let mut fields = Vec::new();
        if recipients.is_empty() {
            fields.push("recipients".to_string());
        }
        fields.extend(payload.invalid_fields());
        // Rejects negatives, NaN and anything past `Duration::MAX`.
        let delay = Duration::try_from_secs_f64(delay_seconds).ok();
        if delay.is_none() {
            fields.push("delay_seconds".to_string());
        }
        if instance.trim().is_empty() {
            fields.push("instance".to_string());
        }
        let Some(delay) = delay.filter(|_| fields.is_empty()) else {
            return Err(DisparoError::Validation {
                fields,
                message: "fill in the required fields".to_string(),
            });
        };

        let (progress, _) = watch::channel(DispatchProgress {
            sent: 0,
            total: recipients.len(),
        });
        Ok(DispatchJob {
            id: Uuid::new_v4(),
            instance,
            recipients,
            payload,
            delay,
            cancel: CancellationToken::new(),
            progress,
        })
    }

    /// Validate and start a job in the background.
    pub fn submit(
        &self,
        recipients: &str,
        payload: Payload,
        delay_seconds: f64,
    ) -> Result<DispatchHandle, DisparoError> {
        let job = match self.prepare(recipients, payload, delay_seconds) {
            Ok(job) => job,
            Err(e) => {
                self.notifier
                    .notify(Notification::error("Check the form", e.to_string()));
                return Err(e);
            }
        };

        let id = job.id;
        let kind = job.payload.kind();
        let cancel = job.cancellation_token();
        let progress = job.subscribe();
        let dispatcher = self.clone();
        let task = tokio::spawn(async move { dispatcher.run(job).await });

        Ok(DispatchHandle {
            id,
            kind,
            cancel,
            progress,
            task,
        })
    }

    /// Send to every recipient in order. Never fails; the report says how
    /// the job ended.
    pub async fn run(&self, job: DispatchJob) -> DispatchReport {
        let DispatchJob {
            id,
            instance,
            recipients,
            payload,
            delay,
            cancel,
            progress,
        } = job;
        let kind = payload.kind();
        let total = recipients.len();
        let mut sent = 0;
        progress.send_replace(DispatchProgress { sent, total });
        info!(
            "dispatch {id}: {} message to {total} recipient(s) via {instance}, {delay:?} apart",
            kind.label()
        );

        let mut outcome = DispatchOutcome::Completed;
        for (i, recipient) in recipients.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome = DispatchOutcome::Cancelled;
                break;
            }

            if let Err(e) = self.gateway.send(&instance, recipient, &payload).await {
                let reason = format!("send to {recipient} failed: {e}");
                error!("dispatch {id}: {reason}");
                outcome = DispatchOutcome::Failed {
                    recipient: recipient.clone(),
                    reason,
                };
                break;
            }
            sent += 1;
            progress.send_replace(DispatchProgress { sent, total });
            debug!("dispatch {id}: {sent}/{total}");

            if i + 1 < total && !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        outcome = DispatchOutcome::Cancelled;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let notice = match &outcome {
            DispatchOutcome::Completed => {
                info!("dispatch {id}: done, {sent}/{total} sent");
                Notification::success(
                    "Messages sent",
                    format!("{sent} of {total} messages sent."),
                )
            }
            DispatchOutcome::Cancelled => {
                warn!("dispatch {id}: cancelled after {sent}/{total}");
                Notification::info(
                    "Sending cancelled",
                    format!("{sent} of {total} messages were sent before cancelling."),
                )
            }
            DispatchOutcome::Failed { reason, .. } => {
                Notification::error("Sending failed", reason.clone())
            }
        };
        self.notifier.notify(notice);

        DispatchReport {
            id,
            kind,
            progress: DispatchProgress { sent, total },
            outcome,
        }
    }
}
