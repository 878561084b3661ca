use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use uuid::Uuid;

use rc_core::{BatchSubmission, JobSpec, JobStatus, Verdict, reconcile};

use crate::error::SessionError;
use crate::gateway::PipelineGateway;

/// Lifecycle of a session: `Idle -> Submitting -> Polling` and then exactly
/// one of the terminal phases. `Complete` means "polling is done", not "all
/// jobs succeeded"; per-job outcomes are read from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Submitting,
    Polling,
    Complete,
    TimedOut,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::TimedOut | Self::Failed)
    }
}

/// Read-only view of the session, published on every state change. Job order
/// mirrors submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub jobs: Vec<JobStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub timed_out: bool,
    /// Most recent transient poll failure, cleared by the next successful
    /// poll.
    pub last_poll_error: Option<String>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            phase: SessionPhase::Idle,
            jobs: Vec::new(),
            started_at: None,
            finished_at: None,
            timed_out: false,
            last_poll_error: None,
        }
    }

    pub fn job(&self, job_id: &str) -> Option<&JobStatus> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    /// Total generation time, known once polling finished.
    pub fn duration(&self) -> Option<chrono::TimeDelta> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some(finished - started),
            _ => None,
        }
    }
}

/// Owns one generation batch: the per-job status list, the poll cadence and
/// the global deadline. One-shot; a retry after failure is a fresh session.
pub struct GenerationSession {
    gateway: Arc<dyn PipelineGateway>,
    poll_interval: Duration,
    poll_deadline: Duration,
    state_tx: watch::Sender<SessionSnapshot>,
    cancel_tx: watch::Sender<bool>,
    driver: Option<JoinHandle<()>>,
}

impl GenerationSession {
    pub fn new(
        gateway: Arc<dyn PipelineGateway>,
        poll_interval: Duration,
        poll_deadline: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionSnapshot::idle());
        let (cancel_tx, _) = watch::channel(false);
        Self {
            gateway,
            poll_interval,
            poll_deadline,
            state_tx,
            cancel_tx,
            driver: None,
        }
    }

    /// Stream of state snapshots for the presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Enqueues the batch and starts the poll driver.
    ///
    /// Rejected unless the session is still `Idle`, so a double submit can
    /// never issue a second enqueue. On enqueue failure the session moves to
    /// `Failed` with no job entries and no timers scheduled.
    pub async fn start(&mut self, jobs: Vec<JobSpec>) -> Result<BatchSubmission, SessionError> {
        if self.state_tx.borrow().phase != SessionPhase::Idle {
            return Err(SessionError::AlreadyRunning);
        }

        let trace_id = Uuid::new_v4().to_string();
        self.state_tx.send_modify(|s| {
            s.phase = SessionPhase::Submitting;
            s.started_at = Some(Utc::now());
        });

        let submission = match self.gateway.enqueue(&trace_id, &jobs).await {
            Ok(submission) => submission,
            Err(err) => {
                warn!("enqueue failed for trace {trace_id}: {err}");
                self.state_tx.send_modify(|s| s.phase = SessionPhase::Failed);
                return Err(err.into());
            }
        };

        if submission.accepted_count != jobs.len() {
            // Informational only; the backend may deduplicate.
            warn!(
                "backend accepted {} of {} jobs for trace {trace_id}",
                submission.accepted_count,
                jobs.len()
            );
        }
        info!("queued {} jobs under trace {trace_id}", jobs.len());

        self.state_tx.send_modify(|s| {
            s.jobs = jobs
                .iter()
                .map(|j| JobStatus::pending(j.job_id.as_str()))
                .collect();
            s.phase = SessionPhase::Polling;
        });
        self.spawn_driver();

        Ok(submission)
    }

    /// Cancels the poll and the deadline. Idempotent, callable from any
    /// state; nothing fires after this returns. Does not rewrite the
    /// snapshot: an externally stopped session keeps whatever state it had.
    pub fn stop(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = self.cancel_tx.send(true);
            driver.abort();
            debug!("stopped poll driver");
        }
    }

    fn spawn_driver(&mut self) {
        let gateway = Arc::clone(&self.gateway);
        let state = self.state_tx.clone();
        let mut cancel = self.cancel_tx.subscribe();
        let deadline = Instant::now() + self.poll_deadline;
        let poll_interval = self.poll_interval;

        self.driver = Some(tokio::spawn(async move {
            let mut ticker = time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.changed() => break,

                    // Wall-clock bound from start(), never reset by poll
                    // activity.
                    _ = time::sleep_until(deadline) => {
                        warn!("generation batch timed out before all jobs finished");
                        state.send_modify(|s| {
                            s.timed_out = true;
                            s.phase = SessionPhase::TimedOut;
                        });
                        break;
                    }

                    // Ticks are consumed strictly one at a time; the await on
                    // the status call below keeps polls from pipelining.
                    _ = ticker.tick() => {
                        let outstanding: Vec<String> = state
                            .borrow()
                            .jobs
                            .iter()
                            .filter(|j| !j.state.is_terminal())
                            .map(|j| j.job_id.clone())
                            .collect();

                        if outstanding.is_empty() {
                            // Vacuously terminal (empty batch).
                            state.send_modify(|s| {
                                s.finished_at = Some(Utc::now());
                                s.phase = SessionPhase::Complete;
                            });
                            break;
                        }

                        // The deadline also bounds the in-flight call; a hung
                        // transport must not outlive it.
                        let polled =
                            time::timeout_at(deadline, gateway.query_status(&outstanding)).await;
                        let Ok(result) = polled else {
                            warn!("generation batch timed out with a status call still in flight");
                            state.send_modify(|s| {
                                s.timed_out = true;
                                s.phase = SessionPhase::TimedOut;
                            });
                            break;
                        };

                        match result {
                            Ok(fetched) => {
                                if *cancel.borrow() {
                                    break;
                                }
                                let mut done = false;
                                state.send_modify(|s| {
                                    let (updated, verdict) = reconcile(&s.jobs, &fetched);
                                    s.jobs = updated;
                                    s.last_poll_error = None;
                                    if verdict == Verdict::AllTerminal {
                                        s.finished_at = Some(Utc::now());
                                        s.phase = SessionPhase::Complete;
                                        done = true;
                                    }
                                });
                                if done {
                                    info!("all jobs terminal, polling done");
                                    break;
                                }
                            }
                            Err(err) => {
                                if *cancel.borrow() {
                                    break;
                                }
                                // Transient; the next tick retries and only
                                // the deadline ends a batch stuck here.
                                debug!("status poll failed, retrying next tick: {err}");
                                state.send_modify(|s| {
                                    s.last_poll_error = Some(err.to_string());
                                });
                            }
                        }
                    }
                }
            }
        }));
    }
}

impl Drop for GenerationSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use rc_core::{JobState, TemplateRead};

    use crate::error::GatewayError;

    #[derive(Default)]
    struct ScriptedGateway {
        fail_enqueue: bool,
        enqueue_calls: AtomicUsize,
        /// Responses served in order, one per poll.
        polls: Mutex<VecDeque<Result<Vec<JobStatus>, GatewayError>>>,
        /// Served once the script runs out.
        repeat: Option<Vec<JobStatus>>,
        poll_calls: AtomicUsize,
    }

    #[async_trait]
    impl PipelineGateway for ScriptedGateway {
        async fn enqueue(
            &self,
            trace_id: &str,
            jobs: &[JobSpec],
        ) -> Result<BatchSubmission, GatewayError> {
            self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_enqueue {
                return Err(GatewayError::Protocol {
                    status: 502,
                    message: "queue unavailable".to_string(),
                });
            }
            Ok(BatchSubmission {
                trace_id: trace_id.to_string(),
                job_ids: jobs.iter().map(|j| j.job_id.clone()).collect(),
                accepted_count: jobs.len(),
            })
        }

        async fn query_status(&self, job_ids: &[String]) -> Result<Vec<JobStatus>, GatewayError> {
            assert!(!job_ids.is_empty(), "status query must carry ids");
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = self.polls.lock().unwrap().pop_front() {
                return next;
            }
            match &self.repeat {
                Some(jobs) => Ok(jobs.clone()),
                None => Ok(Vec::new()),
            }
        }

        async fn list_templates(&self) -> Result<Vec<TemplateRead>, GatewayError> {
            Ok(Vec::new())
        }
    }

    fn spec(id: &str) -> JobSpec {
        JobSpec {
            job_id: id.to_string(),
            pipeline_name: "recast".to_string(),
            input: serde_json::Map::new(),
        }
    }

    fn status(id: &str, state: JobState) -> JobStatus {
        JobStatus {
            job_id: id.to_string(),
            state,
            result_locator: None,
            error_detail: None,
        }
    }

    fn completed(id: &str) -> JobStatus {
        JobStatus {
            job_id: id.to_string(),
            state: JobState::Completed,
            result_locator: Some(format!("https://cdn.example.com/media/out/{id}.png")),
            error_detail: None,
        }
    }

    fn session(gateway: Arc<ScriptedGateway>) -> GenerationSession {
        let _ = env_logger::builder().is_test(true).try_init();
        GenerationSession::new(gateway, Duration::from_secs(1), Duration::from_secs(90))
    }

    async fn wait_terminal(rx: &mut watch::Receiver<SessionSnapshot>) -> SessionSnapshot {
        while !rx.borrow().phase.is_terminal() {
            rx.changed().await.unwrap();
        }
        rx.borrow().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_once_every_job_is_terminal() {
        let gateway = Arc::new(ScriptedGateway {
            polls: Mutex::new(VecDeque::from([
                Ok(vec![status("a", JobState::Pending), status("b", JobState::Pending)]),
                Ok(vec![completed("a"), status("b", JobState::Running)]),
                Ok(vec![completed("b")]),
            ])),
            ..Default::default()
        });
        let mut session = session(gateway.clone());
        let mut rx = session.subscribe();

        let submission = session.start(vec![spec("a"), spec("b")]).await.unwrap();
        assert_eq!(submission.job_ids, ["a", "b"]);

        let snapshot = wait_terminal(&mut rx).await;
        assert_eq!(snapshot.phase, SessionPhase::Complete);
        assert!(snapshot.finished_at.is_some());
        assert!(snapshot.duration().is_some());
        assert!(!snapshot.timed_out);
        assert_eq!(snapshot.job("a").unwrap().state, JobState::Completed);
        assert!(snapshot.job("a").unwrap().result_locator.is_some());
        assert_eq!(snapshot.job("b").unwrap().state, JobState::Completed);
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 3);

        // Polling is torn down; time passing changes nothing.
        time::advance(Duration::from_secs(30)).await;
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 3);
        assert_eq!(*rx.borrow(), snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_preserves_partial_results() {
        let gateway = Arc::new(ScriptedGateway {
            repeat: Some(vec![completed("a"), status("b", JobState::Pending)]),
            ..Default::default()
        });
        let mut session = session(gateway.clone());
        let mut rx = session.subscribe();

        session.start(vec![spec("a"), spec("b")]).await.unwrap();
        let snapshot = wait_terminal(&mut rx).await;

        assert_eq!(snapshot.phase, SessionPhase::TimedOut);
        assert!(snapshot.timed_out);
        assert!(snapshot.finished_at.is_none());
        // The finished job keeps its result; the stuck one stays pending.
        assert_eq!(snapshot.job("a").unwrap().state, JobState::Completed);
        assert!(snapshot.job("a").unwrap().result_locator.is_some());
        assert_eq!(snapshot.job("b").unwrap().state, JobState::Pending);

        let polls = gateway.poll_calls.load(Ordering::SeqCst);
        time::advance(Duration::from_secs(30)).await;
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), polls);
    }

    /// Status calls that hang forever instead of answering.
    #[derive(Default)]
    struct HangingGateway {
        poll_calls: AtomicUsize,
    }

    #[async_trait]
    impl PipelineGateway for HangingGateway {
        async fn enqueue(
            &self,
            trace_id: &str,
            jobs: &[JobSpec],
        ) -> Result<BatchSubmission, GatewayError> {
            Ok(BatchSubmission {
                trace_id: trace_id.to_string(),
                job_ids: jobs.iter().map(|j| j.job_id.clone()).collect(),
                accepted_count: jobs.len(),
            })
        }

        async fn query_status(&self, _job_ids: &[String]) -> Result<Vec<JobStatus>, GatewayError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn list_templates(&self) -> Result<Vec<TemplateRead>, GatewayError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_while_poll_is_in_flight() {
        let gateway = Arc::new(HangingGateway::default());
        let _ = env_logger::builder().is_test(true).try_init();
        let mut session = GenerationSession::new(
            gateway.clone(),
            Duration::from_secs(1),
            Duration::from_secs(90),
        );
        let mut rx = session.subscribe();

        session.start(vec![spec("a")]).await.unwrap();
        let snapshot = wait_terminal(&mut rx).await;

        // The first tick's status call is still outstanding when the
        // deadline hits; it must not keep the session alive.
        assert_eq!(snapshot.phase, SessionPhase::TimedOut);
        assert!(snapshot.timed_out);
        assert!(snapshot.finished_at.is_none());
        assert_eq!(snapshot.job("a").unwrap().state, JobState::Pending);
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 1);

        time::advance(Duration::from_secs(60)).await;
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*rx.borrow(), snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_failure_recovers() {
        let gateway = Arc::new(ScriptedGateway {
            polls: Mutex::new(VecDeque::from([
                Err(GatewayError::Transport("connection reset".to_string())),
                Err(GatewayError::Transport("connection reset".to_string())),
                Ok(vec![completed("a"), completed("b")]),
            ])),
            ..Default::default()
        });
        let mut session = session(gateway.clone());
        let mut rx = session.subscribe();

        session.start(vec![spec("a"), spec("b")]).await.unwrap();

        let mut saw_poll_error = false;
        while !rx.borrow().phase.is_terminal() {
            rx.changed().await.unwrap();
            saw_poll_error |= rx.borrow().last_poll_error.is_some();
        }
        let snapshot = rx.borrow().clone();

        assert!(saw_poll_error);
        assert_eq!(snapshot.phase, SessionPhase::Complete);
        assert!(snapshot.last_poll_error.is_none());
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_failure_schedules_nothing() {
        let gateway = Arc::new(ScriptedGateway {
            fail_enqueue: true,
            ..Default::default()
        });
        let mut session = session(gateway.clone());

        let err = session.start(vec![spec("a")]).await.unwrap_err();
        assert!(matches!(err, SessionError::Enqueue(_)));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Failed);
        assert!(snapshot.jobs.is_empty());

        time::advance(Duration::from_secs(120)).await;
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_rejected() {
        let gateway = Arc::new(ScriptedGateway {
            repeat: Some(vec![status("a", JobState::Running)]),
            ..Default::default()
        });
        let mut session = session(gateway.clone());

        session.start(vec![spec("a")]).await.unwrap();
        let err = session.start(vec![spec("b")]).await.unwrap_err();

        assert!(matches!(err, SessionError::AlreadyRunning));
        assert_eq!(gateway.enqueue_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let gateway = Arc::new(ScriptedGateway {
            repeat: Some(vec![status("a", JobState::Pending)]),
            ..Default::default()
        });
        let mut session = session(gateway.clone());
        let rx = session.subscribe();

        session.start(vec![spec("a")]).await.unwrap();
        session.stop();
        session.stop();
        session.stop();

        let before = rx.borrow().clone();
        let polls = gateway.poll_calls.load(Ordering::SeqCst);

        // Fast-forward well past the deadline: no tick fires, no timeout
        // fires, the snapshot stays frozen.
        time::advance(Duration::from_secs(180)).await;
        assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), polls);
        assert_eq!(*rx.borrow(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_on_idle_session_is_a_noop() {
        let gateway = Arc::new(ScriptedGateway::default());
        let mut session = session(gateway);
        session.stop();
        session.stop();
        assert_eq!(session.snapshot().phase, SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_even_when_every_job_failed() {
        let gateway = Arc::new(ScriptedGateway {
            polls: Mutex::new(VecDeque::from([Ok(vec![
                JobStatus {
                    job_id: "a".to_string(),
                    state: JobState::Failed,
                    result_locator: None,
                    error_detail: Some("face not detected".to_string()),
                },
            ])])),
            ..Default::default()
        });
        let mut session = session(gateway);
        let mut rx = session.subscribe();

        session.start(vec![spec("a")]).await.unwrap();
        let snapshot = wait_terminal(&mut rx).await;

        // "Complete" means polling is done; the per-job failure is read from
        // the snapshot.
        assert_eq!(snapshot.phase, SessionPhase::Complete);
        assert_eq!(snapshot.job("a").unwrap().state, JobState::Failed);
        assert_eq!(
            snapshot.job("a").unwrap().error_detail.as_deref(),
            Some("face not detected")
        );
    }
}
