//! Expiry countdown for front ends.
//!
//! Polls the session once per `expiry_poll` and publishes an [`ExpiryStatus`]
//! on a watch channel, so a UI can show a countdown and warn before the
//! credential lapses.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    /// No authenticated session.
    Inactive,
    Healthy { remaining: Duration },
    /// Inside the warning window.
    Warning { remaining: Duration },
    /// Authenticated but the credential has lapsed and nothing renewed it.
    Expired,
}

impl ExpiryStatus {
    pub fn evaluate(authenticated: bool, remaining: Duration, warning: Duration) -> Self {
        if !authenticated {
            ExpiryStatus::Inactive
        } else if remaining.is_zero() {
            ExpiryStatus::Expired
        } else if remaining <= warning {
            ExpiryStatus::Warning { remaining }
        } else {
            ExpiryStatus::Healthy { remaining }
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            ExpiryStatus::Healthy { remaining } | ExpiryStatus::Warning { remaining } => {
                Some(*remaining)
            }
            _ => None,
        }
    }

    /// Same variant, ignoring the countdown value.
    pub fn same_phase(&self, other: &ExpiryStatus) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

pub struct ExpiryNotifier {
    task: Option<JoinHandle<()>>,
    status: watch::Receiver<ExpiryStatus>,
}

impl ExpiryNotifier {
    pub fn spawn(session: SessionManager) -> Self {
        let warning = session.settings().expiry_warning();
        let poll = session.settings().expiry_poll();
        let initial = ExpiryStatus::evaluate(
            session.is_authenticated(),
            session.time_until_expiration(),
            warning,
        );
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = ExpiryStatus::evaluate(
                    session.is_authenticated(),
                    session.time_until_expiration(),
                    warning,
                );
                tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    if !current.same_phase(&next) {
                        debug!(from = ?current, to = ?next, "Expiry status changed");
                    }
                    *current = next;
                    true
                });
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self {
            task: Some(task),
            status: rx,
        }
    }

    pub fn status(&self) -> ExpiryStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExpiryStatus> {
        self.status.clone()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ExpiryNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::testing::{settle, CountingNavigator, FakeBackend};
    use crate::config::SessionSettings;
    use crate::models::Credentials;

    const WARNING: Duration = Duration::from_secs(120);

    #[test]
    fn test_evaluate_phases() {
        assert_eq!(
            ExpiryStatus::evaluate(false, Duration::from_secs(600), WARNING),
            ExpiryStatus::Inactive
        );
        assert_eq!(
            ExpiryStatus::evaluate(true, Duration::from_secs(600), WARNING),
            ExpiryStatus::Healthy { remaining: Duration::from_secs(600) }
        );
        assert_eq!(
            ExpiryStatus::evaluate(true, Duration::from_secs(120), WARNING),
            ExpiryStatus::Warning { remaining: Duration::from_secs(120) }
        );
        assert_eq!(
            ExpiryStatus::evaluate(true, Duration::ZERO, WARNING),
            ExpiryStatus::Expired
        );
    }

    #[test]
    fn test_same_phase_ignores_countdown() {
        let a = ExpiryStatus::Warning { remaining: Duration::from_secs(90) };
        let b = ExpiryStatus::Warning { remaining: Duration::from_secs(30) };
        assert!(a.same_phase(&b));
        assert!(!a.same_phase(&ExpiryStatus::Expired));
        assert_eq!(a.remaining(), Some(Duration::from_secs(90)));
        assert_eq!(ExpiryStatus::Inactive.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_walks_through_phases() {
        let backend = Arc::new(FakeBackend::granting(900_000));
        // Keep the scheduler from renewing so the credential runs out.
        let settings = SessionSettings {
            min_schedule_delay_secs: 10_000,
            ..SessionSettings::default()
        };
        let session = SessionManager::new(
            backend.clone(),
            Arc::new(CountingNavigator::default()),
            settings,
            false,
        );
        let notifier = ExpiryNotifier::spawn(session.clone());
        assert_eq!(notifier.status(), ExpiryStatus::Inactive);

        session
            .login(&Credentials::new("alice", "secret"))
            .await
            .expect("login succeeds");
        settle().await;
        assert!(matches!(notifier.status(), ExpiryStatus::Healthy { .. }));

        tokio::time::sleep(Duration::from_secs(790)).await;
        match notifier.status() {
            ExpiryStatus::Warning { remaining } => assert!(remaining <= WARNING),
            other => panic!("expected warning, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(notifier.status(), ExpiryStatus::Expired);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_goes_inactive() {
        let backend = Arc::new(FakeBackend::granting(900_000));
        let session = SessionManager::new(
            backend,
            Arc::new(CountingNavigator::default()),
            SessionSettings::default(),
            false,
        );
        session
            .login(&Credentials::new("alice", "secret"))
            .await
            .expect("login succeeds");
        let notifier = ExpiryNotifier::spawn(session.clone());
        let mut updates = notifier.subscribe();
        assert!(matches!(notifier.status(), ExpiryStatus::Healthy { .. }));

        session.logout().await;
        updates.changed().await.expect("notifier running");
        settle().await;

        assert_eq!(notifier.status(), ExpiryStatus::Inactive);
    }
}
