use super::error::WaitError;
use super::signal::{
    CancellationToken, Clock, SleepOutcome, Sleeper, SystemClock, ThreadSleeper,
};
use crate::ownership::{load_owned_thread, owned_threads, ControllerId};
use crate::shared::time::now_utc;
use crate::state::{
    LaunchAttempt, LaunchRegistry, LaunchStatus, MessageLog, PathLayout, ThreadMetadata,
    ThreadRegistry, DEFAULT_STALE_LAUNCH_THRESHOLD,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const REMOVED_STATUS: &str = "removed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitSelection {
    pub thread_ids: Vec<String>,
    pub labels: Vec<String>,
    pub all_owned: bool,
}

impl WaitSelection {
    pub fn threads<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            thread_ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            labels: vec![label.into()],
            ..Self::default()
        }
    }

    pub fn all_owned() -> Self {
        Self {
            all_owned: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequest {
    pub selection: WaitSelection,
    pub controller: ControllerId,
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub include_summary: bool,
    // Pending launches older than this are failed on each poll.
    pub stale_launch_threshold: Option<Duration>,
}

impl WaitRequest {
    pub fn new(selection: WaitSelection, controller: ControllerId) -> Self {
        Self {
            selection,
            controller,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            include_summary: false,
            stale_launch_threshold: Some(DEFAULT_STALE_LAUNCH_THRESHOLD),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_summary(mut self, include_summary: bool) -> Self {
        self.include_summary = include_summary;
        self
    }

    pub fn with_stale_launch_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.stale_launch_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedThread {
    pub thread_id: String,
    pub status: String,
    pub label: Option<String>,
    pub summary: Option<String>,
}

impl FinishedThread {
    pub fn was_removed(&self) -> bool {
        self.status == REMOVED_STATUS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub finished: Vec<FinishedThread>,
    pub elapsed: Duration,
    pub polls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitPhase {
    Polling,
    Done,
    TimedOut,
    Aborted,
}

#[derive(Debug, Default)]
struct WaitTargets {
    threads: Vec<String>,
    seen: BTreeSet<String>,
    launches: Vec<String>,
    finished: Vec<FinishedThread>,
}

impl WaitTargets {
    fn add_thread(&mut self, thread_id: &str) {
        if self.seen.insert(thread_id.to_string()) {
            self.threads.push(thread_id.to_string());
        }
    }

    fn add_launch(&mut self, launch_id: &str) {
        if !self.launches.iter().any(|id| id == launch_id) {
            self.launches.push(launch_id.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.threads.is_empty() && self.launches.is_empty()
    }

    fn unresolved(&self) -> usize {
        self.threads.len() + self.launches.len()
    }
}

pub struct WaitCoordinator<C = SystemClock, S = ThreadSleeper> {
    layout: PathLayout,
    threads: ThreadRegistry,
    launches: LaunchRegistry,
    clock: C,
    sleeper: S,
    cancel: CancellationToken,
}

impl WaitCoordinator {
    pub fn new(layout: &PathLayout) -> Self {
        Self {
            layout: layout.clone(),
            threads: ThreadRegistry::for_layout(layout),
            launches: LaunchRegistry::for_layout(layout),
            clock: SystemClock::default(),
            sleeper: ThreadSleeper,
            cancel: CancellationToken::new(),
        }
    }
}

impl<C: Clock, S: Sleeper> WaitCoordinator<C, S> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> WaitCoordinator<C2, S> {
        WaitCoordinator {
            layout: self.layout,
            threads: self.threads,
            launches: self.launches,
            clock,
            sleeper: self.sleeper,
            cancel: self.cancel,
        }
    }

    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> WaitCoordinator<C, S2> {
        WaitCoordinator {
            layout: self.layout,
            threads: self.threads,
            launches: self.launches,
            clock: self.clock,
            sleeper,
            cancel: self.cancel,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn run(&mut self, request: &WaitRequest) -> Result<WaitOutcome, WaitError> {
        let started = self.clock.now();
        let mut targets = self.resolve_selection(request)?;
        if targets.is_empty() {
            return Err(WaitError::NothingToWait);
        }
        tracing::debug!(
            threads = targets.threads.len(),
            launches = targets.launches.len(),
            controller = %request.controller,
            "wait started"
        );

        let mut polls = 0_u32;
        let mut phase = WaitPhase::Polling;
        while phase == WaitPhase::Polling {
            polls += 1;
            self.poll_once(request, &mut targets)?;

            let elapsed = self.clock.now().saturating_sub(started);
            phase = if targets.is_empty() {
                WaitPhase::Done
            } else if request.timeout.is_some_and(|timeout| elapsed > timeout) {
                WaitPhase::TimedOut
            } else if self.cancel.is_cancelled() {
                WaitPhase::Aborted
            } else if self.sleeper.sleep(request.interval, &self.cancel) == SleepOutcome::Cancelled
                || self.cancel.is_cancelled()
            {
                WaitPhase::Aborted
            } else {
                WaitPhase::Polling
            };
        }

        let elapsed = self.clock.now().saturating_sub(started);
        match phase {
            WaitPhase::Done => {
                tracing::info!(
                    finished = targets.finished.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "wait finished"
                );
                Ok(WaitOutcome {
                    finished: targets.finished,
                    elapsed,
                    polls,
                })
            }
            WaitPhase::TimedOut => Err(WaitError::Timeout {
                unresolved: targets.unresolved(),
                elapsed_ms: elapsed.as_millis() as u64,
            }),
            WaitPhase::Aborted | WaitPhase::Polling => Err(WaitError::Aborted),
        }
    }

    fn resolve_selection(&self, request: &WaitRequest) -> Result<WaitTargets, WaitError> {
        let mut targets = WaitTargets::default();
        let selection = &request.selection;
        let controller = &request.controller;

        for thread_id in &selection.thread_ids {
            let thread = load_owned_thread(&self.threads, thread_id, controller)?;
            targets.add_thread(&thread.thread_id);
        }

        if selection.labels.is_empty() && !selection.all_owned {
            return Ok(targets);
        }

        let wanted = |label: Option<&str>| {
            selection.all_owned
                || label.is_some_and(|label| selection.labels.iter().any(|l| l == label))
        };
        for thread in owned_threads(&self.threads, controller)? {
            if wanted(thread.label.as_deref()) {
                targets.add_thread(&thread.thread_id);
            }
        }
        for attempt in self.launches.list_attempts()? {
            if attempt.is_pending()
                && attempt.controller_id == controller.as_str()
                && wanted(attempt.label.as_deref())
            {
                targets.add_launch(&attempt.id);
            }
        }
        Ok(targets)
    }

    fn poll_once(&self, request: &WaitRequest, targets: &mut WaitTargets) -> Result<(), WaitError> {
        if let Some(threshold) = request.stale_launch_threshold {
            if !targets.launches.is_empty() {
                self.launches.cleanup_stale(threshold, now_utc())?;
            }
        }
        let threads = self.threads.load()?;
        let launches = self.launches.load()?;

        let pending_launches = std::mem::take(&mut targets.launches);
        for launch_id in pending_launches {
            match self.check_launch(&launch_id, &launches, &threads)? {
                LaunchProgress::Pending => targets.launches.push(launch_id),
                LaunchProgress::Linked(thread_id) => {
                    tracing::debug!(%launch_id, %thread_id, "launch produced a thread");
                    targets.add_thread(&thread_id);
                }
                LaunchProgress::Vanished => {
                    tracing::warn!(%launch_id, "launch left the registry without a linked thread");
                }
            }
        }

        let watched = std::mem::take(&mut targets.threads);
        for thread_id in watched {
            match threads.get(&thread_id) {
                None => targets.finished.push(FinishedThread {
                    thread_id,
                    status: REMOVED_STATUS.to_string(),
                    label: None,
                    summary: None,
                }),
                Some(thread) if !thread.is_active() => {
                    let summary = if request.include_summary {
                        self.latest_summary(thread)
                    } else {
                        None
                    };
                    targets.finished.push(FinishedThread {
                        thread_id,
                        status: thread.status_label().to_string(),
                        label: thread.label.clone(),
                        summary,
                    });
                }
                Some(_) => targets.threads.push(thread_id),
            }
        }
        Ok(())
    }

    fn check_launch(
        &self,
        launch_id: &str,
        launches: &BTreeMap<String, LaunchAttempt>,
        threads: &BTreeMap<String, ThreadMetadata>,
    ) -> Result<LaunchProgress, WaitError> {
        if let Some(attempt) = launches.get(launch_id) {
            if attempt.status == LaunchStatus::Failed {
                return Err(WaitError::LaunchFailed {
                    launch_id: launch_id.to_string(),
                    message: attempt
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "launch failed".to_string()),
                    log_path: attempt.log_path.clone(),
                });
            }
        }
        let linked = threads
            .values()
            .find(|thread| thread.launch_id.as_deref() == Some(launch_id))
            .map(|thread| thread.thread_id.clone());
        Ok(match (linked, launches.contains_key(launch_id)) {
            (Some(thread_id), _) => LaunchProgress::Linked(thread_id),
            (None, true) => LaunchProgress::Pending,
            (None, false) => LaunchProgress::Vanished,
        })
    }

    fn latest_summary(&self, thread: &ThreadMetadata) -> Option<String> {
        let log = MessageLog::for_thread(&self.layout, &thread.thread_id).ok()?;
        match log.last_assistant_message() {
            Ok(message) => message.map(|message| message.content),
            Err(err) => {
                tracing::warn!(
                    thread_id = %thread.thread_id,
                    error = %err,
                    "failed to read thread summary"
                );
                None
            }
        }
    }
}

enum LaunchProgress {
    Pending,
    Linked(String),
    Vanished,
}
