use async_trait::async_trait;
use monitor_service::{AccountWorker, DedupStore, PostRecorder, Scheduler, WorkerState};
use postwatch_core::{
    CoreError, ExtractionError, MediaError, PersistenceError, PollSchedule, PostSnapshot,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::{media_file_name, DedupFile, PostLog};
use x_client::{ContentExtractor, MediaFetcher};

// --- fakes ---

/// Returns whatever post is currently set for an account; accounts without
/// a post fail like a page with no post elements.
#[derive(Default)]
struct FakeExtractor {
    posts: Mutex<HashMap<String, PostSnapshot>>,
    panics_for: Mutex<Option<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeExtractor {
    fn set(&self, account: &str, snapshot: PostSnapshot) {
        self.posts
            .lock()
            .unwrap()
            .insert(account.to_string(), snapshot);
    }

    fn calls(&self, account: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ContentExtractor for FakeExtractor {
    async fn fetch_latest(&self, account: &str) -> Result<PostSnapshot, CoreError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(account.to_string())
            .or_insert(0) += 1;

        if self.panics_for.lock().unwrap().as_deref() == Some(account) {
            panic!("extractor blew up for {account}");
        }

        self.posts
            .lock()
            .unwrap()
            .get(account)
            .cloned()
            .ok_or_else(|| {
                ExtractionError::NoPosts {
                    account: account.to_string(),
                }
                .into()
            })
    }
}

/// Writes a small file named like the real fetcher does, or fails.
struct FakeMedia {
    dir: PathBuf,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeMedia {
    fn new(dir: &Path, fail: bool) -> Self {
        Self {
            dir: dir.to_path_buf(),
            fail,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MediaFetcher for FakeMedia {
    async fn download(
        &self,
        media_url: &str,
        account: &str,
        post_id: &str,
    ) -> Result<PathBuf, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MediaError::TransferFailed {
                url: media_url.to_string(),
                reason: "connection reset".to_string(),
            }
            .into());
        }
        let path = self.dir.join(media_file_name(
            account,
            post_id,
            chrono::Local::now(),
            media_url,
        ));
        tokio::fs::write(&path, b"img").await?;
        Ok(path)
    }
}

/// Panics on the first download, then fails like an unreachable host.
#[derive(Default)]
struct PanicOnceMedia {
    calls: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for PanicOnceMedia {
    async fn download(
        &self,
        media_url: &str,
        _account: &str,
        _post_id: &str,
    ) -> Result<PathBuf, CoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("media fetcher blew up");
        }
        Err(MediaError::TransferFailed {
            url: media_url.to_string(),
            reason: "connection refused".to_string(),
        }
        .into())
    }
}

// --- helpers ---

fn accounts() -> Vec<String> {
    vec!["alpha".to_string(), "beta".to_string()]
}

fn post(account: &str, id: &str, text: &str, media_url: Option<&str>) -> PostSnapshot {
    PostSnapshot {
        id: id.to_string(),
        text: text.to_string(),
        permalink: format!("https://x.com/{}/status/{}", account, id),
        media_url: media_url.map(String::from),
    }
}

fn fast_schedule() -> PollSchedule {
    PollSchedule {
        base_interval: Duration::from_millis(20),
        interval_jitter: Duration::ZERO,
        failure_backoff: Duration::from_millis(5),
        cooldown: Duration::from_millis(7),
        stagger_min: Duration::ZERO,
        stagger_max: Duration::from_millis(2),
    }
}

async fn open_store(dir: &Path) -> DedupStore {
    DedupStore::open(
        DedupFile::new(dir.join("last_tweets.json")),
        PostLog::new(dir.join("tweets_log.txt")),
        &accounts(),
    )
    .await
    .unwrap()
}

fn worker(
    account: &str,
    extractor: Arc<FakeExtractor>,
    store: &DedupStore,
    media: Arc<FakeMedia>,
    schedule: PollSchedule,
) -> AccountWorker {
    AccountWorker::new(
        account.to_string(),
        extractor,
        store.clone(),
        Arc::new(PostRecorder::new(media)),
        schedule,
    )
}

fn read_log(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("tweets_log.txt")).unwrap_or_default()
}

fn read_dedup(dir: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(dir.join("last_tweets.json")).unwrap()).unwrap()
}

// --- scenarios ---

#[tokio::test]
async fn test_first_poll_records_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    extractor.set("alpha", post("alpha", "100", "hello", None));

    let alpha = worker("alpha", extractor.clone(), &store, media.clone(), PollSchedule::default());
    let delay = alpha.run_cycle().await;

    assert!(delay >= Duration::from_secs(280) && delay <= Duration::from_secs(320));
    let log = read_log(dir.path());
    assert_eq!(log.matches("Account: alpha").count(), 1);
    assert!(log.contains("Text: hello\n"));
    assert!(log.contains("Link: https://x.com/alpha/status/100\n"));
    assert!(log.contains("Image: No image\n"));
    assert_eq!(media.calls.load(Ordering::SeqCst), 0);

    let dedup = read_dedup(dir.path());
    assert_eq!(dedup["alpha"], "100");
    assert!(dedup["beta"].is_null());

    // Same post again: nothing new
    alpha.run_cycle().await;
    assert_eq!(read_log(dir.path()).matches("Account: alpha").count(), 1);
    assert_eq!(store.get("alpha").await, Some("100".to_string()));
}

#[tokio::test]
async fn test_state_machine_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    let schedule = fast_schedule();
    let alpha = worker("alpha", extractor.clone(), &store, media, schedule.clone());

    // Failed extraction goes straight to the failure backoff
    let state = alpha.step(WorkerState::Polling).await;
    assert!(matches!(state, WorkerState::Sleeping(d) if d == schedule.failure_backoff));

    extractor.set("alpha", post("alpha", "100", "hello", None));
    let state = alpha.step(WorkerState::Polling).await;
    assert!(matches!(state, WorkerState::Comparing(ref s) if s.id == "100"));

    let state = alpha.step(state).await;
    assert_eq!(state.name(), "recording");

    let state = alpha.step(state).await;
    assert!(matches!(state, WorkerState::Sleeping(d) if d == schedule.base_interval));

    let state = alpha.step(state).await;
    assert!(matches!(state, WorkerState::Polling));

    // Unchanged post: comparing goes back to sleep
    let state = alpha.step(WorkerState::Polling).await;
    let state = alpha.step(state).await;
    assert!(matches!(state, WorkerState::Sleeping(_)));
    assert_eq!(read_log(dir.path()).matches("Account: alpha").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sleeping_waits_full_delay() {
    let store = DedupStore::with_state(
        Default::default(),
        DedupFile::new("unused.json"),
        PostLog::new("unused.txt"),
    );
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(Path::new("."), false));
    let alpha = worker("alpha", extractor.clone(), &store, media, PollSchedule::default());

    let start = tokio::time::Instant::now();
    let state = alpha.step(WorkerState::Sleeping(Duration::from_secs(300))).await;

    assert!(matches!(state, WorkerState::Polling));
    assert!(start.elapsed() >= Duration::from_secs(300));
    assert_eq!(extractor.calls("alpha"), 0);
}

#[tokio::test]
async fn test_new_post_after_seen_post_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    let alpha = worker("alpha", extractor.clone(), &store, media, fast_schedule());

    extractor.set("alpha", post("alpha", "100", "first", None));
    alpha.run_cycle().await;
    extractor.set("alpha", post("alpha", "101", "second", None));
    alpha.run_cycle().await;

    let log = read_log(dir.path());
    let first = log.find("Text: first").unwrap();
    let second = log.find("Text: second").unwrap();
    assert!(first < second);
    assert_eq!(read_dedup(dir.path())["alpha"], "101");
}

#[tokio::test]
async fn test_media_is_downloaded_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    extractor.set(
        "alpha",
        post("alpha", "100", "picture", Some("https://pbs.example/media/abc.webp")),
    );

    worker("alpha", extractor, &store, media.clone(), fast_schedule())
        .run_cycle()
        .await;

    assert_eq!(media.calls.load(Ordering::SeqCst), 1);
    let stored: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("alpha_100_"))
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with(".jpg"));

    let log = read_log(dir.path());
    assert!(log.contains(&format!("Image: {}", dir.path().join(&stored[0]).display())));
}

#[tokio::test]
async fn test_failing_media_still_records_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), true));
    extractor.set(
        "alpha",
        post("alpha", "100", "picture", Some("https://pbs.example/media/abc.png")),
    );

    let alpha = worker("alpha", extractor, &store, media.clone(), fast_schedule());
    alpha.run_cycle().await;
    alpha.run_cycle().await;

    assert_eq!(media.calls.load(Ordering::SeqCst), 1);
    let log = read_log(dir.path());
    assert_eq!(log.matches("Account: alpha").count(), 1);
    assert!(log.contains("Image: No image\n"));
    assert_eq!(read_dedup(dir.path())["alpha"], "100");
}

#[tokio::test]
async fn test_racing_workers_record_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    extractor.set("alpha", post("alpha", "100", "hello", None));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let w = worker(
            "alpha",
            extractor.clone(),
            &store,
            media.clone(),
            fast_schedule(),
        );
        handles.push(tokio::spawn(async move { w.run_cycle().await }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(read_log(dir.path()).matches("Account: alpha").count(), 1);
    assert_eq!(extractor.calls("alpha"), 16);
}

#[tokio::test]
async fn test_restart_after_persist_does_not_rerecord() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    extractor.set("alpha", post("alpha", "100", "hello", None));

    let store = open_store(dir.path()).await;
    worker("alpha", extractor.clone(), &store, media.clone(), fast_schedule())
        .run_cycle()
        .await;
    drop(store);

    // Process restart: fresh store loaded from disk
    let store = open_store(dir.path()).await;
    let alpha = worker("alpha", extractor.clone(), &store, media, fast_schedule());
    alpha.run_cycle().await;
    assert_eq!(read_log(dir.path()).matches("Account: alpha").count(), 1);

    extractor.set("alpha", post("alpha", "101", "later", None));
    alpha.run_cycle().await;
    assert_eq!(read_log(dir.path()).matches("Account: alpha").count(), 2);
}

#[tokio::test]
async fn test_unwritable_log_reverts_mark() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let store = DedupStore::open(
        DedupFile::new(dir.path().join("last_tweets.json")),
        PostLog::new(blocker.join("tweets_log.txt")),
        &accounts(),
    )
    .await
    .unwrap();
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    extractor.set("alpha", post("alpha", "100", "hello", None));

    let alpha = worker("alpha", extractor, &store, media, fast_schedule());
    let delay = alpha.run_cycle().await;

    assert_eq!(delay, fast_schedule().base_interval);
    assert_eq!(store.get("alpha").await, None);
    assert!(read_dedup(dir.path())["alpha"].is_null());
}

#[tokio::test]
async fn test_scheduler_open_loads_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("last_tweets.json"), r#"{"alpha": "100"}"#).unwrap();

    let scheduler = Scheduler::open(
        accounts(),
        Arc::new(FakeExtractor::default()),
        Arc::new(FakeMedia::new(dir.path(), false)),
        DedupFile::new(dir.path().join("last_tweets.json")),
        PostLog::new(dir.path().join("tweets_log.txt")),
        fast_schedule(),
    )
    .await
    .unwrap();

    assert_eq!(scheduler.store().get("alpha").await, Some("100".to_string()));
    assert_eq!(scheduler.store().get("beta").await, None);
    assert_eq!(scheduler.store().snapshot().await.len(), 2);
}

#[tokio::test]
async fn test_scheduler_open_rejects_corrupt_state() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("last_tweets.json"), "{not json").unwrap();

    let result = Scheduler::open(
        accounts(),
        Arc::new(FakeExtractor::default()),
        Arc::new(FakeMedia::new(dir.path(), false)),
        DedupFile::new(dir.path().join("last_tweets.json")),
        PostLog::new(dir.path().join("tweets_log.txt")),
        fast_schedule(),
    )
    .await;

    assert!(matches!(
        result,
        Err(CoreError::Persistence(PersistenceError::DedupCorrupt { .. }))
    ));
}

#[tokio::test]
async fn test_failing_account_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    // alpha never has a post; beta does
    extractor.set("beta", post("beta", "200", "from beta", None));

    let scheduler = Scheduler::new(
        accounts(),
        extractor.clone(),
        media,
        store.clone(),
        fast_schedule(),
    );
    let running = tokio::spawn(scheduler.run());

    let recorded = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.get("beta").await.is_some() && extractor.calls("alpha") >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    running.abort();

    assert!(recorded.is_ok());
    assert!(read_log(dir.path()).contains("Text: from beta"));
    assert!(!read_log(dir.path()).contains("Account: alpha"));
}

#[tokio::test]
async fn test_panicking_worker_cools_down_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    *extractor.panics_for.lock().unwrap() = Some("alpha".to_string());
    extractor.set("beta", post("beta", "200", "from beta", None));

    let scheduler = Scheduler::new(
        accounts(),
        extractor.clone(),
        media,
        store.clone(),
        fast_schedule(),
    );
    let running = tokio::spawn(scheduler.run());

    let survived = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if extractor.calls("alpha") >= 3 && store.get("beta").await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(survived.is_ok());
    assert!(!running.is_finished());
    running.abort();
}

#[tokio::test]
async fn test_panic_while_recording_does_not_lose_post() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path()).await;
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(PanicOnceMedia::default());
    extractor.set(
        "alpha",
        post("alpha", "100", "picture", Some("https://pbs.example/media/abc.png")),
    );

    let alpha = AccountWorker::new(
        "alpha".to_string(),
        extractor.clone(),
        store.clone(),
        Arc::new(PostRecorder::new(media.clone())),
        fast_schedule(),
    );
    let running = tokio::spawn(alpha.run());

    let recorded = tokio::time::timeout(Duration::from_secs(5), async {
        while !read_log(dir.path()).contains("Account: alpha") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    running.abort();

    assert!(recorded.is_ok());
    assert!(media.calls.load(Ordering::SeqCst) >= 2);
    let log = read_log(dir.path());
    assert_eq!(log.matches("Account: alpha").count(), 1);
    assert!(log.contains("Image: No image\n"));
    assert_eq!(store.get("alpha").await, Some("100".to_string()));
}

#[tokio::test]
async fn test_failed_persist_is_retried_on_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    std::fs::write(&state_dir, "not a directory yet").unwrap();
    let dedup_path = state_dir.join("last_tweets.json");

    let store = DedupStore::open(
        DedupFile::new(&dedup_path),
        PostLog::new(dir.path().join("tweets_log.txt")),
        &accounts(),
    )
    .await
    .unwrap();
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(dir.path(), false));
    extractor.set("alpha", post("alpha", "100", "hello", None));
    let alpha = worker("alpha", extractor, &store, media, fast_schedule());

    alpha.run_cycle().await;
    assert_eq!(read_log(dir.path()).matches("Account: alpha").count(), 1);
    assert!(!dedup_path.exists());

    std::fs::remove_file(&state_dir).unwrap();
    std::fs::create_dir(&state_dir).unwrap();

    // Same post again: nothing new to record, but the unsaved state is written
    alpha.run_cycle().await;
    assert_eq!(read_log(dir.path()).matches("Account: alpha").count(), 1);
    let dedup: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&dedup_path).unwrap()).unwrap();
    assert_eq!(dedup["alpha"], "100");
}

#[tokio::test]
async fn test_unwritable_log_discards_downloaded_media() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let store = DedupStore::open(
        DedupFile::new(dir.path().join("last_tweets.json")),
        PostLog::new(blocker.join("tweets_log.txt")),
        &accounts(),
    )
    .await
    .unwrap();
    let extractor = Arc::new(FakeExtractor::default());
    let media = Arc::new(FakeMedia::new(&images, false));
    extractor.set(
        "alpha",
        post("alpha", "100", "picture", Some("https://pbs.example/media/abc.png")),
    );

    worker("alpha", extractor, &store, media.clone(), fast_schedule())
        .run_cycle()
        .await;

    assert_eq!(media.calls.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read_dir(&images).unwrap().count(), 0);
    assert_eq!(store.get("alpha").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_workers_start_staggered() {
    let accounts = vec![
        "alpha".to_string(),
        "beta".to_string(),
        "gamma".to_string(),
    ];
    let store = DedupStore::with_state(
        Default::default(),
        DedupFile::new("unused.json"),
        PostLog::new("unused.txt"),
    );
    let schedule = PollSchedule {
        stagger_min: Duration::from_secs(2),
        stagger_max: Duration::from_secs(2),
        ..fast_schedule()
    };
    // No posts anywhere: workers only poll and back off
    let scheduler = Scheduler::new(
        accounts.clone(),
        Arc::new(FakeExtractor::default()),
        Arc::new(FakeMedia::new(Path::new("."), false)),
        store,
        schedule,
    );

    let start = tokio::time::Instant::now();
    let handles = scheduler.spawn_workers().await;
    let elapsed = start.elapsed();

    assert_eq!(handles.len(), accounts.len());
    assert!(elapsed >= Duration::from_secs(2) * (accounts.len() as u32 - 1));
    let started: Vec<&str> = handles.iter().map(|(account, _)| account.as_str()).collect();
    assert_eq!(started, vec!["alpha", "beta", "gamma"]);
    for (_, handle) in handles {
        handle.abort();
    }
}
