//! Fixed-cadence progress poller.
//!
//! One spawned task per bulk task id. Each tick issues exactly one status
//! query; a slow query delays the next tick instead of stacking requests.
//! Query failures are ignored and the next tick proceeds unchanged.
//!
//! The poller is owned through a [`PollHandle`]. Releasing or dropping the
//! handle cancels the timer; cancellation is idempotent.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assign::TaskOps;
use crate::backend::client::redact_id;
use crate::backend::BulkAssignProgress;
use crate::config::PollConfig;

/// Smallest cadence accepted; `tokio::time::interval` rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Something the poller observed.
#[derive(Debug)]
pub enum PollEvent {
    /// A successful status response.
    Progress(BulkAssignProgress),
    /// The configured maximum polling duration elapsed.
    Expired,
}

/// Whether the poller keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// Owned handle to a running poller.
///
/// Dropping the handle cancels the poller.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Cancels the timer. A query already in flight completes but its
    /// response is discarded.
    pub fn release(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns a poller for `task_id`.
///
/// `on_event` runs on the poller task after every successful query (and once
/// on expiry). Returning [`PollControl::Stop`] ends the loop.
pub fn spawn<T, F>(tasks: T, task_id: String, config: PollConfig, mut on_event: F) -> PollHandle
where
    T: TaskOps,
    F: FnMut(PollEvent) -> PollControl + Send + 'static,
{
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let period = config.interval.max(MIN_INTERVAL);

    let task = tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = interval_at(started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        info!(
            "[POLLER] Polling task {} every {}ms",
            redact_id(&task_id),
            period.as_millis()
        );

        loop {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Some(max) = config.max_duration {
                if started.elapsed() >= max {
                    info!(
                        "[POLLER] Task {} still running after {}s, giving up",
                        redact_id(&task_id),
                        max.as_secs()
                    );
                    on_event(PollEvent::Expired);
                    break;
                }
            }

            ticks += 1;
            let response = tasks.get_bulk_assign_progress(&task_id).await;

            if cancelled.is_cancelled() {
                debug!(
                    "[POLLER] Discarding response for released task {}",
                    redact_id(&task_id)
                );
                break;
            }

            match response {
                Ok(progress) => {
                    if on_event(PollEvent::Progress(progress)) == PollControl::Stop {
                        break;
                    }
                }
                Err(e) => {
                    debug!(
                        "[POLLER] Tick {} for task {} failed, retrying next tick: {}",
                        ticks,
                        redact_id(&task_id),
                        e
                    );
                }
            }
        }

        debug!(
            "[POLLER] Task {} poller stopped after {} ticks",
            redact_id(&task_id),
            ticks
        );
    });

    PollHandle { token, task }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BulkAssignStarted, TaskStatus};
    use crate::error::AppError;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Fake that replays scripted responses, then repeats "processing".
    #[derive(Clone)]
    struct ScriptedTasks {
        script: Arc<Mutex<VecDeque<Result<BulkAssignProgress, AppError>>>>,
        queries: Arc<AtomicUsize>,
    }

    impl ScriptedTasks {
        fn new(script: Vec<Result<BulkAssignProgress, AppError>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                queries: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    impl TaskOps for ScriptedTasks {
        fn start_bulk_assign<'a>(
            &'a self,
            _target_ids: &'a [String],
            _assignee_ids: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<BulkAssignStarted, AppError>> + Send + 'a>>
        {
            Box::pin(async { Err(AppError::Internal("not used".into())) })
        }

        fn get_bulk_assign_progress<'a>(
            &'a self,
            _task_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<BulkAssignProgress, AppError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.queries.fetch_add(1, Ordering::SeqCst);
                self.script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(processing(0)))
            })
        }
    }

    fn processing(completed: u64) -> BulkAssignProgress {
        BulkAssignProgress {
            status: TaskStatus::Processing,
            total: 2,
            completed,
            results: Vec::new(),
        }
    }

    fn completed() -> BulkAssignProgress {
        BulkAssignProgress {
            status: TaskStatus::Completed,
            total: 2,
            completed: 2,
            results: Vec::new(),
        }
    }

    fn config() -> PollConfig {
        PollConfig::default().with_interval(Duration::from_millis(2000))
    }

    #[tokio::test(start_paused = true)]
    async fn first_query_waits_one_interval() {
        let tasks = ScriptedTasks::new(vec![]);
        let _handle = spawn(tasks.clone(), "t1".into(), config(), |_| PollControl::Continue);

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(tasks.queries(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(tasks.queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_query_per_tick() {
        let tasks = ScriptedTasks::new(vec![]);
        let _handle = spawn(tasks.clone(), "t1".into(), config(), |_| PollControl::Continue);

        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(tasks.queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_skipped() {
        let tasks = ScriptedTasks::new(vec![
            Err(AppError::ConnectionFailed("blip".into())),
            Err(AppError::ApiError("HTTP 503".into())),
            Ok(completed()),
        ]);
        let events = Arc::new(AtomicUsize::new(0));
        let seen = events.clone();

        let handle = spawn(tasks.clone(), "t1".into(), config(), move |event| {
            seen.fetch_add(1, Ordering::SeqCst);
            match event {
                PollEvent::Progress(p) if p.status.is_terminal() => PollControl::Stop,
                _ => PollControl::Continue,
            }
        });

        tokio::time::sleep(Duration::from_millis(10_000)).await;

        assert_eq!(tasks.queries(), 3, "polling stops after completion");
        assert_eq!(events.load(Ordering::SeqCst), 1, "errors never reach the callback");
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn release_stops_polling() {
        let tasks = ScriptedTasks::new(vec![]);
        let handle = spawn(tasks.clone(), "t1".into(), config(), |_| PollControl::Continue);

        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(tasks.queries(), 2);

        handle.release();
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(tasks.queries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_expires_once() {
        let tasks = ScriptedTasks::new(vec![]);
        let expired = Arc::new(AtomicUsize::new(0));
        let seen = expired.clone();
        let config = config().with_max_duration(Duration::from_secs(5));

        let _handle = spawn(tasks.clone(), "t1".into(), config, move |event| {
            if matches!(event, PollEvent::Expired) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            PollControl::Continue
        });

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.queries(), 2, "queries at 2s and 4s, expiry at 6s");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let tasks = ScriptedTasks::new(vec![Ok(completed())]);
        let config = PollConfig::default().with_interval(Duration::ZERO);

        let handle = spawn(tasks.clone(), "t1".into(), config, |_| PollControl::Stop);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tasks.queries(), 1);
        assert!(handle.is_finished());
    }
}
