use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info};

use crate::api::ReviewApi;
use crate::config::{Config, VerdictTable};
use crate::error::Fault;
use crate::homework;
use crate::notifier::Notifier;
use crate::report::{Report, ReportTracker};

/// Output reported when the window holds no homework records.
pub const NO_NEW_STATUSES: &str = "no new statuses";

/// What a single cycle decided.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub report: Report,
    pub notified: bool,
}

/// Fetch → validate → extract → dedup → notify, forever.
///
/// Owns the cursor and the report tracker; nothing else holds state between
/// cycles. Faults inside a cycle become reports and never escape `run_cycle`.
pub struct PollLoop<A, N> {
    api: A,
    notifier: N,
    verdicts: VerdictTable,
    interval: Duration,
    cursor: i64,
    tracker: ReportTracker,
    cycles: u64,
}

impl<A, N> PollLoop<A, N>
where
    A: ReviewApi,
    N: Notifier,
{
    pub fn new(api: A, notifier: N, config: &Config, cursor: i64) -> Self {
        Self {
            api,
            notifier,
            verdicts: config.verdicts.clone(),
            interval: config.poll.interval(),
            cursor,
            tracker: ReportTracker::new(),
            cycles: 0,
        }
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Run cycles until `shutdown` resolves. Shutdown is only observed
    /// between cycles, while sleeping.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let outcome = self.run_cycle().await;
            info!(
                "Cycle {} finished (notified={}, cursor={}); sleeping {:?}",
                self.cycles, outcome.notified, self.cursor, self.interval
            );

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping poll loop");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One full cycle, including notification. Never fails.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        info!("Starting cycle {} (from_date={})", self.cycles, self.cursor);

        let result = AssertUnwindSafe(self.poll()).catch_unwind().await;
        let candidate = match result {
            Ok(Ok(report)) => report,
            Ok(Err(fault)) => self.fault_report(&fault),
            Err(panic) => self.fault_report(&Fault::Unexpected(panic_message(panic))),
        };

        let notified = self.tracker.update(candidate);
        let report = self.tracker.current().clone();
        if notified {
            info!("Report changed, sending notification");
            // Delivery failures are logged only; the report still counts as emitted.
            if let Err(e) = self.notifier.send(&report.output).await {
                error!("Failed to send notification: {:#}", e);
            }
        } else {
            debug!("Report unchanged, notification skipped");
        }

        CycleOutcome { report, notified }
    }

    async fn poll(&mut self) -> Result<Report, Fault> {
        let raw = self.api.fetch(self.cursor).await?;

        info!("Validating API response");
        let response = homework::validate(raw)?;
        if response.current_date != self.cursor {
            debug!("Cursor advanced {} -> {}", self.cursor, response.current_date);
        }
        self.cursor = response.current_date;

        let Some(latest) = response.homeworks.first() else {
            debug!("No new homework statuses");
            return Ok(Report::new("", NO_NEW_STATUSES));
        };

        info!("Extracting status of the latest homework");
        let message = homework::extract(latest, &self.verdicts)?;
        Ok(Report::new(message.homework_name, message.text))
    }

    /// Faults keep the identity of the last emitted report.
    fn fault_report(&self, fault: &Fault) -> Report {
        error!("Program fault: {}", fault);
        Report::new(
            self.tracker.previous().name.clone(),
            format!("program fault: {}", fault),
        )
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in poll cycle".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionError, ShapeError};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    const REVIEWING: &str = "Changed review status of \"hw1\". Work taken for review.";
    const APPROVED: &str =
        "Changed review status of \"hw1\". Work reviewed: the reviewer liked everything. Hooray!";

    /// Replays queued results; the last one repeats once the queue drains.
    #[derive(Clone, Default)]
    struct ScriptedApi {
        responses: Arc<Mutex<VecDeque<Result<Value, Fault>>>>,
        requested: Arc<Mutex<Vec<i64>>>,
        stop_after: Option<(usize, Arc<Notify>)>,
    }

    impl ScriptedApi {
        fn new(responses: Vec<Result<Value, Fault>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                ..Self::default()
            }
        }

        fn requested(&self) -> Vec<i64> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReviewApi for ScriptedApi {
        async fn fetch(&self, from_date: i64) -> Result<Value, Fault> {
            let calls = {
                let mut requested = self.requested.lock().unwrap();
                requested.push(from_date);
                requested.len()
            };
            if let Some((limit, notify)) = &self.stop_after {
                if calls == *limit {
                    notify.notify_one();
                }
            }

            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<String>>>,
        failing: bool,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.failing {
                anyhow::bail!("telegram is down");
            }
            Ok(())
        }
    }

    struct PanickingApi;

    #[async_trait]
    impl ReviewApi for PanickingApi {
        async fn fetch(&self, _from_date: i64) -> Result<Value, Fault> {
            panic!("decoder exploded");
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.poll.interval_secs = 0;
        config
    }

    fn body(status: &str, current_date: i64) -> Result<Value, Fault> {
        Ok(json!({
            "homeworks": [{"homework_name": "hw1", "status": status}],
            "current_date": current_date
        }))
    }

    fn empty(current_date: i64) -> Result<Value, Fault> {
        Ok(json!({"homeworks": [], "current_date": current_date}))
    }

    #[tokio::test]
    async fn test_status_change_scenario() {
        let api = ScriptedApi::new(vec![
            body("reviewing", 2000),
            body("reviewing", 2000),
            body("approved", 3000),
        ]);
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api.clone(), notifier.clone(), &test_config(), 1000);

        let first = poll.run_cycle().await;
        assert!(first.notified);
        assert_eq!(first.report, Report::new("hw1", REVIEWING));
        assert_eq!(poll.cursor(), 2000);

        let second = poll.run_cycle().await;
        assert!(!second.notified);
        assert_eq!(poll.cursor(), 2000);

        let third = poll.run_cycle().await;
        assert!(third.notified);
        assert_eq!(poll.cursor(), 3000);

        assert_eq!(notifier.sent(), vec![REVIEWING.to_string(), APPROVED.to_string()]);
        assert_eq!(api.requested(), vec![1000, 2000, 2000]);
    }

    #[tokio::test]
    async fn test_empty_homeworks_notifies_once_per_transition() {
        let api = ScriptedApi::new(vec![
            empty(10),
            empty(20),
            body("reviewing", 30),
            empty(40),
            empty(50),
        ]);
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api, notifier.clone(), &test_config(), 0);

        for _ in 0..5 {
            poll.run_cycle().await;
        }

        assert_eq!(
            notifier.sent(),
            vec![
                NO_NEW_STATUSES.to_string(),
                REVIEWING.to_string(),
                NO_NEW_STATUSES.to_string(),
            ]
        );
        assert_eq!(poll.cursor(), 50);
    }

    #[tokio::test]
    async fn test_name_change_with_same_status_notifies() {
        let api = ScriptedApi::new(vec![
            body("approved", 1),
            Ok(json!({
                "homeworks": [{"homework_name": "hw2", "status": "approved"}],
                "current_date": 2
            })),
        ]);
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api, notifier.clone(), &test_config(), 0);

        assert!(poll.run_cycle().await.notified);
        let second = poll.run_cycle().await;
        assert!(second.notified);
        assert_eq!(second.report.name, "hw2");
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_fault_notifies_once_and_recovers() {
        let api = ScriptedApi::new(vec![
            Err(Fault::transport("connection refused")),
            Err(Fault::transport("connection refused")),
            body("reviewing", 2000),
        ]);
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api.clone(), notifier.clone(), &test_config(), 1000);

        let first = poll.run_cycle().await;
        assert!(first.notified);
        assert_eq!(first.report.name, "");
        assert_eq!(
            first.report.output,
            "program fault: request to review API failed: connection refused"
        );
        assert_eq!(poll.cursor(), 1000);

        assert!(!poll.run_cycle().await.notified);
        assert_eq!(poll.cursor(), 1000);

        assert!(poll.run_cycle().await.notified);
        assert_eq!(poll.cursor(), 2000);

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.sent()[1], REVIEWING);
        assert_eq!(api.requested(), vec![1000, 1000, 1000]);
    }

    #[tokio::test]
    async fn test_fault_keeps_previous_identity() {
        let api = ScriptedApi::new(vec![
            body("reviewing", 2000),
            Ok(json!({"homeworks": [{"homework_name": "hw1", "status": "lost"}], "current_date": 2500})),
        ]);
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api, notifier.clone(), &test_config(), 1000);

        poll.run_cycle().await;
        let outcome = poll.run_cycle().await;

        assert!(outcome.notified);
        assert_eq!(outcome.report.name, "hw1");
        assert_eq!(
            outcome.report.output,
            format!(
                "program fault: {}",
                Fault::from(ExtractionError::UnknownStatus(Some("lost".to_string())))
            )
        );
        // the response itself was well-formed
        assert_eq!(poll.cursor(), 2500);
    }

    #[tokio::test]
    async fn test_unknown_status_repeated_notifies_once() {
        let api = ScriptedApi::new(vec![Ok(
            json!({"homeworks": [{"homework_name": "hw1"}], "current_date": 5}),
        )]);
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api, notifier.clone(), &test_config(), 0);

        for _ in 0..3 {
            poll.run_cycle().await;
        }
        assert_eq!(notifier.sent().len(), 1);
        assert!(notifier.sent()[0].contains("unknown homework status"));
    }

    #[tokio::test]
    async fn test_shape_fault_leaves_cursor() {
        let api = ScriptedApi::new(vec![Ok(json!({"homeworks": []}))]);
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api, notifier.clone(), &test_config(), 77);

        let outcome = poll.run_cycle().await;
        assert!(outcome.notified);
        assert_eq!(
            outcome.report.output,
            format!("program fault: {}", ShapeError::MissingKey("current_date"))
        );
        assert_eq!(poll.cursor(), 77);
    }

    #[tokio::test]
    async fn test_panic_becomes_fault_report() {
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(PanickingApi, notifier.clone(), &test_config(), 0);

        let outcome = poll.run_cycle().await;
        assert!(outcome.notified);
        assert_eq!(
            outcome.report.output,
            "program fault: unexpected error: decoder exploded"
        );
        assert!(!poll.run_cycle().await.notified);
    }

    #[tokio::test]
    async fn test_failed_notification_is_not_retried() {
        let api = ScriptedApi::new(vec![body("reviewing", 2000)]);
        let notifier = RecordingNotifier {
            failing: true,
            ..RecordingNotifier::default()
        };
        let mut poll = PollLoop::new(api, notifier.clone(), &test_config(), 1000);

        assert!(poll.run_cycle().await.notified);
        assert_eq!(poll.cursor(), 2000);
        assert!(!poll.run_cycle().await.notified);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let stop = Arc::new(Notify::new());
        let api = ScriptedApi {
            stop_after: Some((3, stop.clone())),
            ..ScriptedApi::new(vec![body("reviewing", 2000)])
        };
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api.clone(), notifier.clone(), &test_config(), 1000);

        poll.run(async move { stop.notified().await }).await;

        assert_eq!(api.requested(), vec![1000, 2000, 2000]);
        assert_eq!(notifier.sent(), vec![REVIEWING.to_string()]);
    }

    #[tokio::test]
    async fn test_run_resumes_after_transport_fault() {
        let stop = Arc::new(Notify::new());
        let api = ScriptedApi {
            stop_after: Some((4, stop.clone())),
            ..ScriptedApi::new(vec![
                Err(Fault::transport("connection refused")),
                Err(Fault::transport("connection refused")),
                body("reviewing", 2000),
            ])
        };
        let notifier = RecordingNotifier::default();
        let mut poll = PollLoop::new(api.clone(), notifier.clone(), &test_config(), 1000);

        poll.run(async move { stop.notified().await }).await;

        assert_eq!(api.requested(), vec![1000, 1000, 1000, 2000]);
        assert_eq!(
            notifier.sent(),
            vec![
                "program fault: request to review API failed: connection refused".to_string(),
                REVIEWING.to_string(),
            ]
        );
        assert_eq!(poll.cursor(), 2000);
    }
}
