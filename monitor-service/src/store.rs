use postwatch_core::{CoreError, LogRecord};
use std::fmt;
use std::sync::Arc;
use storage::{DedupFile, DedupState, PostLog};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Everything shared between workers: the dedup map, its backing file and
/// the post log. Only reachable through [`DedupGuard`].
struct Journal {
    state: DedupState,
    file: DedupFile,
    log: PostLog,
    /// The map has changes the dedup file does not have yet.
    dirty: bool,
}

/// Last recorded post id per account, behind a single mutual-exclusion guard.
///
/// The map itself is never handed out for read-modify-write: callers use
/// `get`, `compare_and_mark` and `persist`, either one at a time through the
/// store or inside one critical section through [`DedupStore::lock`].
#[derive(Clone)]
pub struct DedupStore {
    journal: Arc<Mutex<Journal>>,
}

impl DedupStore {
    /// Load the persisted state (or start with nothing seen) for `accounts`.
    pub async fn open(
        file: DedupFile,
        log: PostLog,
        accounts: &[String],
    ) -> Result<Self, CoreError> {
        let state = file.load(accounts).await?;
        Ok(Self::with_state(state, file, log))
    }

    pub fn with_state(state: DedupState, file: DedupFile, log: PostLog) -> Self {
        Self {
            journal: Arc::new(Mutex::new(Journal {
                state,
                file,
                log,
                dirty: false,
            })),
        }
    }

    /// Acquire the guard. Held across mark, record and persist so no two
    /// workers interleave those steps.
    pub async fn lock(&self) -> DedupGuard {
        DedupGuard {
            journal: self.journal.clone().lock_owned().await,
            pending: None,
        }
    }

    pub async fn get(&self, account: &str) -> Option<String> {
        self.lock().await.get(account).map(String::from)
    }

    pub async fn compare_and_mark(&self, account: &str, candidate: &str) -> bool {
        let mut guard = self.lock().await;
        let marked = guard.compare_and_mark(account, candidate);
        guard.commit();
        marked
    }

    pub async fn persist(&self) -> Result<(), CoreError> {
        self.lock().await.persist().await
    }

    /// Copy of the current map, for reporting.
    pub async fn snapshot(&self) -> DedupState {
        self.lock().await.journal.state.clone()
    }
}

/// Exclusive access to the dedup state and post log.
///
/// A mark made through the guard is provisional until [`commit`]. Dropping
/// the guard with an uncommitted mark (early return, panic unwinding through
/// the recording step) restores the previous id, so the post is seen as new
/// again on the next poll.
///
/// [`commit`]: DedupGuard::commit
pub struct DedupGuard {
    journal: OwnedMutexGuard<Journal>,
    pending: Option<(String, Option<String>)>,
}

impl DedupGuard {
    pub fn get(&self, account: &str) -> Option<&str> {
        self.journal
            .state
            .get(account)
            .and_then(|id| id.as_deref())
    }

    /// Returns true and stores `candidate` if it differs from the stored id.
    pub fn compare_and_mark(&mut self, account: &str, candidate: &str) -> bool {
        let previous = self.journal.state.get(account).cloned().flatten();
        if previous.as_deref() == Some(candidate) {
            return false;
        }

        self.journal
            .state
            .insert(account.to_string(), Some(candidate.to_string()));
        self.journal.dirty = true;
        self.pending = Some((account.to_string(), previous));
        debug!(account, post_id = candidate, "Marked post as seen");
        true
    }

    /// Keep the last mark; it is no longer undone when the guard drops.
    pub fn commit(&mut self) {
        self.pending = None;
    }

    /// Undo the last uncommitted `compare_and_mark` made through this guard,
    /// so a post whose record could not be written is picked up again next
    /// cycle.
    pub fn revert(&mut self) {
        if let Some((account, previous)) = self.pending.take() {
            debug!(account = %account, "Reverting dedup mark");
            self.journal.state.insert(account, previous);
        }
    }

    /// True if a previous persist failed or a mark has not been written yet.
    pub fn is_dirty(&self) -> bool {
        self.journal.dirty
    }

    /// Write the whole map to the dedup file. On failure the map stays
    /// dirty and the next persist writes it again.
    pub async fn persist(&mut self) -> Result<(), CoreError> {
        let saved = self.journal.file.save(&self.journal.state).await;
        match saved {
            Ok(()) => {
                self.journal.dirty = false;
                Ok(())
            }
            Err(e) => {
                self.journal.dirty = true;
                Err(e.into())
            }
        }
    }

    /// Append one record to the post log.
    pub async fn append(&self, record: &LogRecord) -> Result<(), CoreError> {
        self.journal.log.append(record).await?;
        Ok(())
    }
}

impl Drop for DedupGuard {
    fn drop(&mut self) {
        if self.pending.is_some() {
            warn!("Dedup guard dropped with an unrecorded mark, rolling back");
            self.revert();
        }
    }
}

impl fmt::Debug for DedupGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupGuard")
            .field("state", &self.journal.state)
            .field("pending", &self.pending)
            .field("dirty", &self.journal.dirty)
            .finish()
    }
}
