use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info};

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Consecutive failures of the same tag beyond which repeat log lines are
/// suppressed down to a summary every 10th failure (spec §4.4: "Consecutive
/// failures of the same tag are rate-limited in logging").
const FAILURE_LOG_BURST: u32 = 3;
const FAILURE_LOG_SUMMARY_EVERY: u32 = 10;

struct Job {
    tag: &'static str,
    period: StdDuration,
    run: JobFn,
    next_run: Instant,
    consecutive_failures: u32,
}

/// Single-threaded cooperative scheduler running named periodic jobs (spec
/// §4.4: "a single-threaded cooperative scheduler"; §5: "scout, value-update,
/// and pruning never run concurrently with each other or with themselves").
/// All registered jobs are driven from one loop in `run_until_shutdown`: the
/// loop sleeps until the nearest job's due time, then runs every job that is
/// due, one at a time, awaiting each to completion before starting the next.
/// No job is ever spawned onto its own task, so two jobs (or two runs of the
/// same job) can never overlap. Grounded on the teacher's
/// `engine::controller::BotController` (running/stopped shape) for shutdown
/// signaling and `tokio::time::interval` + `tokio::select!` for the tick
/// loop, generalized from one `interval` per job to a single loop that
/// tracks each job's own due time.
pub struct Supervisor {
    jobs: Vec<Job>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Registers a job tagged `tag`, due to run every `period` starting one
    /// `period` from now. Jobs keep running independently of each other's
    /// failures; a failing job never stops others from being scheduled, but
    /// (per spec §5) no two jobs ever run at the same instant.
    pub fn every<F, Fut>(&mut self, period: StdDuration, tag: &'static str, f: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let run: JobFn = Arc::new(move || Box::pin(f()) as JobFuture);
        self.jobs.push(Job {
            tag,
            period,
            run,
            next_run: Instant::now() + period,
            consecutive_failures: 0,
        });
        self
    }

    /// Runs the cooperative loop until `tokio::signal::ctrl_c` fires, then
    /// returns (spec §4.4 Shutdown: "drain in-flight jobs ... then exit" —
    /// the in-flight job, if any, is always let run to completion before the
    /// loop checks the shutdown signal again).
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        tokio::pin!(shutdown);
        self.drive(shutdown).await
    }

    /// The scheduler loop itself, parameterized over the external shutdown
    /// signal so tests can drive it without `ctrl_c`. Jobs run strictly
    /// sequentially within this one task: the loop never starts a job while
    /// another is still running, and never proceeds past a due tick until
    /// every job due at that tick has finished.
    async fn drive(mut self, mut external_shutdown: impl Future<Output = ()> + Unpin) -> Result<()> {
        loop {
            let earliest = self.jobs.iter().map(|job| job.next_run).min();

            tokio::select! {
                _ = tokio::time::sleep_until(earliest.unwrap_or_else(|| Instant::now() + StdDuration::from_secs(3600))), if earliest.is_some() => {
                    let now = Instant::now();
                    for job in &mut self.jobs {
                        if job.next_run > now {
                            continue;
                        }
                        match (job.run)().await {
                            Ok(()) => job.consecutive_failures = 0,
                            Err(e) => {
                                job.consecutive_failures += 1;
                                if job.consecutive_failures <= FAILURE_LOG_BURST
                                    || job.consecutive_failures % FAILURE_LOG_SUMMARY_EVERY == 0
                                {
                                    error!(tag = job.tag, failures = job.consecutive_failures, "job failed: {e}");
                                }
                            }
                        }
                        job.next_run = Instant::now() + job.period;
                    }
                }
                _ = &mut external_shutdown => {
                    info!("supervisor: shutdown signal received");
                    break;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("supervisor: shutdown signal received");
                        break;
                    }
                }
            }
        }

        info!("supervisor: loop drained");
        Ok(())
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Drives `supervisor` until `shutdown_tx` is sent `true`, with no
    /// `ctrl_c` involved.
    async fn drive_until(supervisor: Supervisor, shutdown_tx: watch::Sender<bool>, run_for: StdDuration) {
        let shutdown = async move {
            tokio::time::sleep(run_for).await;
            let _ = shutdown_tx.send(true);
        };
        tokio::pin!(shutdown);
        supervisor.drive(shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn job_ticks_repeatedly_until_shutdown() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let mut supervisor = Supervisor::new();
        let shutdown_tx = supervisor.shutdown_tx.clone();
        supervisor.every(StdDuration::from_millis(10), "counting", move || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        drive_until(supervisor, shutdown_tx, StdDuration::from_millis(35)).await;

        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn failing_job_keeps_ticking() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let mut supervisor = Supervisor::new();
        let shutdown_tx = supervisor.shutdown_tx.clone();
        supervisor.every(StdDuration::from_millis(10), "failing", move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("boom")
            }
        });

        drive_until(supervisor, shutdown_tx, StdDuration::from_millis(35)).await;

        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn jobs_never_overlap() {
        let overlapping = Arc::new(AtomicU32::new(0));
        let running = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let mut supervisor = Supervisor::new();
        let shutdown_tx = supervisor.shutdown_tx.clone();

        for tag in ["a", "b"] {
            let overlapping = overlapping.clone();
            let running = running.clone();
            supervisor.every(StdDuration::from_millis(5), tag, move || {
                let overlapping = overlapping.clone();
                let running = running.clone();
                async move {
                    if running.swap(true, Ordering::SeqCst) {
                        overlapping.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(StdDuration::from_millis(8)).await;
                    running.store(false, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        drive_until(supervisor, shutdown_tx, StdDuration::from_millis(60)).await;

        assert_eq!(overlapping.load(Ordering::SeqCst), 0);
    }
}
