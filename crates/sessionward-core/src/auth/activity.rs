//! Activity-driven renewal.
//!
//! An actively used session should never be force-logged-out, while an idle
//! one should not be kept alive by background timers alone. The monitor
//! watches user-interaction signals and, at most once per throttle window,
//! renews the credential when it is close to expiring.
//!
//! Signals arrive as any `Stream<Item = ActivityKind>`, so non-browser front
//! ends can feed whatever counts as activity for them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SessionSettings;

use super::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerClick,
    KeyPress,
    PointerMove,
    Scroll,
}

pub type ActivitySender = mpsc::UnboundedSender<ActivityKind>;

/// Push-style activity source.
pub fn activity_channel() -> (ActivitySender, BoxStream<'static, ActivityKind>) {
    let (tx, rx) = mpsc::unbounded();
    (tx, rx.boxed())
}

/// Merge several activity sources into one stream.
pub fn merge_sources(
    sources: Vec<BoxStream<'static, ActivityKind>>,
) -> BoxStream<'static, ActivityKind> {
    stream::select_all(sources).boxed()
}

/// Leading-edge throttle: admits the first signal, then nothing until the
/// window has passed.
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now < last + self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    NotAuthenticated,
    /// Plenty of lifetime left.
    NotDue,
    /// An activity renewal happened too recently.
    CoolingDown,
    Renew,
}

/// Decides whether a throttled activity tick should renew.
#[derive(Debug)]
struct RenewalPolicy {
    threshold: Duration,
    cooldown: Duration,
    last_renewal: Option<Instant>,
}

impl RenewalPolicy {
    fn new(settings: &SessionSettings) -> Self {
        Self {
            threshold: settings.activity_renewal_threshold(),
            cooldown: settings.activity_cooldown(),
            last_renewal: None,
        }
    }

    fn evaluate(&self, authenticated: bool, remaining: Duration, now: Instant) -> Evaluation {
        if !authenticated {
            return Evaluation::NotAuthenticated;
        }
        if remaining >= self.threshold {
            return Evaluation::NotDue;
        }
        match self.last_renewal {
            Some(last) if now.saturating_duration_since(last) < self.cooldown => {
                Evaluation::CoolingDown
            }
            _ => Evaluation::Renew,
        }
    }
}

/// Background task turning user activity into opportunistic renewals.
pub struct ActivityMonitor {
    task: Option<JoinHandle<()>>,
    evaluations: Arc<AtomicU64>,
}

impl ActivityMonitor {
    pub fn spawn<S>(session: SessionManager, source: S) -> Self
    where
        S: Stream<Item = ActivityKind> + Send + 'static,
    {
        let evaluations = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run(session, source, Arc::clone(&evaluations)));
        Self {
            task: Some(task),
            evaluations,
        }
    }

    /// Number of throttled ticks that were evaluated so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Activity monitor stopped");
        }
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<S>(session: SessionManager, source: S, evaluations: Arc<AtomicU64>)
where
    S: Stream<Item = ActivityKind> + Send + 'static,
{
    let settings = session.settings().clone();
    let mut throttle = Throttle::new(settings.activity_throttle());
    let mut policy = RenewalPolicy::new(&settings);
    let mut source = Box::pin(source);

    while let Some(kind) = source.next().await {
        let now = Instant::now();
        if !throttle.admit(now) {
            continue;
        }
        evaluations.fetch_add(1, Ordering::Relaxed);

        let remaining = session.time_until_expiration();
        match policy.evaluate(session.is_authenticated(), remaining, now) {
            Evaluation::Renew => {
                policy.last_renewal = Some(now);
                debug!(?kind, remaining_secs = remaining.as_secs(), "Renewing on user activity");
                match session.renew().await {
                    Ok(_) => info!("Credential renewed on user activity"),
                    Err(err) => warn!(error = %err, "Activity-triggered renewal failed"),
                }
            }
            outcome => trace!(?kind, ?outcome, "No renewal on activity"),
        }
    }
    debug!("Activity source closed");
}
