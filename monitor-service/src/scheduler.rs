use postwatch_core::{CoreError, PollSchedule};
use std::sync::Arc;
use storage::{DedupFile, PostLog};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use x_client::{ContentExtractor, MediaFetcher};

use crate::recorder::PostRecorder;
use crate::store::DedupStore;
use crate::worker::AccountWorker;

/// Launches one [`AccountWorker`] per configured account and keeps the
/// process alive while they run.
pub struct Scheduler {
    accounts: Vec<String>,
    extractor: Arc<dyn ContentExtractor>,
    recorder: Arc<PostRecorder>,
    store: DedupStore,
    schedule: PollSchedule,
}

impl Scheduler {
    pub fn new(
        accounts: Vec<String>,
        extractor: Arc<dyn ContentExtractor>,
        media: Arc<dyn MediaFetcher>,
        store: DedupStore,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            accounts,
            extractor,
            recorder: Arc::new(PostRecorder::new(media)),
            store,
            schedule,
        }
    }

    /// Load the dedup state (nothing seen if the file is absent) and build a
    /// scheduler around it.
    pub async fn open(
        accounts: Vec<String>,
        extractor: Arc<dyn ContentExtractor>,
        media: Arc<dyn MediaFetcher>,
        dedup_file: DedupFile,
        post_log: PostLog,
        schedule: PollSchedule,
    ) -> Result<Self, CoreError> {
        let store = DedupStore::open(dedup_file, post_log, &accounts).await?;
        Ok(Self::new(accounts, extractor, media, store, schedule))
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn worker_for(&self, account: &str) -> AccountWorker {
        AccountWorker::new(
            account.to_string(),
            self.extractor.clone(),
            self.store.clone(),
            self.recorder.clone(),
            self.schedule.clone(),
        )
    }

    /// Spawn every worker, sleeping a random stagger delay between launches.
    pub async fn spawn_workers(&self) -> Vec<(String, JoinHandle<()>)> {
        let mut handles = Vec::with_capacity(self.accounts.len());
        for (i, account) in self.accounts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.schedule.stagger_delay()).await;
            }
            let worker = self.worker_for(account);
            info!(account = %account, "Starting monitor for {}", account);
            handles.push((account.clone(), tokio::spawn(worker.run())));
        }
        handles
    }

    /// Start all workers and wait for them. Workers never return on their
    /// own, so in normal operation this only ends with the process.
    pub async fn run(self) -> Result<(), CoreError> {
        info!(
            accounts = self.accounts.len(),
            interval = ?self.schedule.base_interval,
            "Starting monitoring"
        );
        for (account, last_seen) in self.store.snapshot().await {
            info!(account = %account, last_seen = ?last_seen, "Loaded dedup state");
        }
        let handles = self.spawn_workers().await;

        for (account, handle) in handles {
            if let Err(e) = handle.await {
                error!(account = %account, error = %e, "Worker task for {} ended", account);
            }
        }

        warn!("All account workers have exited");
        Ok(())
    }
}
