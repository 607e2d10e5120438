//! Terminal notifier: the CLI's stand-in for dashboard toasts.

use disparo_core::traits::{Notification, NotificationLevel, Notifier};
use tracing::debug;

/// Prints notifications to stderr and mirrors them into the log.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, n: Notification) {
        let marker = match n.level {
            NotificationLevel::Success => "✓",
            NotificationLevel::Info => "i",
            NotificationLevel::Error => "✗",
        };
        debug!(level = ?n.level, "{}: {}", n.title, n.description);
        eprintln!("{marker} {}: {}", n.title, n.description);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Keeps every notification for assertions.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingNotifier {
        pub(crate) seen: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingNotifier {
        pub(crate) fn levels(&self) -> Vec<NotificationLevel> {
            self.seen.lock().unwrap().iter().map(|n| n.level).collect()
        }

        pub(crate) fn last(&self) -> Option<Notification> {
            self.seen.lock().unwrap().last().cloned()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.seen.lock().unwrap().push(notification);
        }
    }
}
