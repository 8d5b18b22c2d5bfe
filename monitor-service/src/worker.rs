use futures::FutureExt;
use postwatch_core::{ErrorRecovery, PollSchedule, PostSnapshot};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use x_client::ContentExtractor;

use crate::recorder::PostRecorder;
use crate::store::{DedupGuard, DedupStore};

/// Where an account worker is in its poll cycle.
#[derive(Debug)]
pub enum WorkerState {
    Polling,
    Comparing(PostSnapshot),
    /// Holds the dedup guard taken while comparing; released once the
    /// record is written and the state persisted. If this state is dropped
    /// before the record is written, the guard rolls the mark back.
    Recording {
        snapshot: PostSnapshot,
        guard: DedupGuard,
    },
    Sleeping(Duration),
}

impl WorkerState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerState::Polling => "polling",
            WorkerState::Comparing(_) => "comparing",
            WorkerState::Recording { .. } => "recording",
            WorkerState::Sleeping(_) => "sleeping",
        }
    }
}

/// Polling loop for exactly one account.
pub struct AccountWorker {
    account: String,
    extractor: Arc<dyn ContentExtractor>,
    store: DedupStore,
    recorder: Arc<PostRecorder>,
    schedule: PollSchedule,
}

impl AccountWorker {
    pub fn new(
        account: String,
        extractor: Arc<dyn ContentExtractor>,
        store: DedupStore,
        recorder: Arc<PostRecorder>,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            account,
            extractor,
            store,
            recorder,
            schedule,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Run one state transition.
    pub async fn step(&self, state: WorkerState) -> WorkerState {
        let account = self.account.as_str();
        match state {
            WorkerState::Polling => match self.extractor.fetch_latest(account).await {
                Ok(snapshot) => WorkerState::Comparing(snapshot),
                Err(e) => {
                    error!(account, "Error checking account {}", account);
                    let strategy = ErrorRecovery::handle(account, &e);
                    let delay = ErrorRecovery::delay_for(
                        strategy,
                        self.schedule.failure_delay(),
                        self.schedule.cooldown_delay(),
                    )
                    .unwrap_or_else(|| self.schedule.failure_delay());
                    WorkerState::Sleeping(delay)
                }
            },

            WorkerState::Comparing(snapshot) => {
                let mut guard = self.store.lock().await;
                if guard.compare_and_mark(account, &snapshot.id) {
                    WorkerState::Recording { snapshot, guard }
                } else {
                    debug!(account, post_id = %snapshot.id, "No new post");
                    if guard.is_dirty() {
                        debug!(account, "Retrying persist of unsaved dedup state");
                        if let Err(e) = guard.persist().await {
                            ErrorRecovery::handle(account, &e);
                        }
                    }
                    WorkerState::Sleeping(self.schedule.next_poll_delay())
                }
            }

            WorkerState::Recording {
                snapshot,
                mut guard,
            } => {
                match self.recorder.record(&guard, account, &snapshot).await {
                    Ok(_) => guard.commit(),
                    Err(e) => {
                        ErrorRecovery::handle(account, &e);
                        guard.revert();
                    }
                }
                if let Err(e) = guard.persist().await {
                    ErrorRecovery::handle(account, &e);
                }
                WorkerState::Sleeping(self.schedule.next_poll_delay())
            }

            WorkerState::Sleeping(delay) => {
                debug!(account, ?delay, "Sleeping until next poll");
                tokio::time::sleep(delay).await;
                WorkerState::Polling
            }
        }
    }

    /// Run one cycle from `Polling` up to (not including) the sleep, and
    /// return the delay the worker would sleep for.
    pub async fn run_cycle(&self) -> Duration {
        let mut state = WorkerState::Polling;
        loop {
            state = self.step(state).await;
            if let WorkerState::Sleeping(delay) = state {
                return delay;
            }
        }
    }

    /// Poll forever. A panic inside a step is caught here and followed by
    /// the cooldown, so one account can neither spin hot nor take the
    /// process down.
    pub async fn run(self) {
        info!(account = %self.account, "Account worker started");
        let mut state = WorkerState::Polling;
        loop {
            let name = state.name();
            state = match AssertUnwindSafe(self.step(state)).catch_unwind().await {
                Ok(next) => next,
                Err(panic) => {
                    error!(
                        account = %self.account,
                        state = name,
                        panic = %panic_message(&*panic),
                        "Monitor error for {}, cooling down",
                        self.account
                    );
                    WorkerState::Sleeping(self.schedule.cooldown_delay())
                }
            };
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
