use postwatch_core::PersistenceError;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Account name -> id of the last recorded post (`None` if nothing recorded yet).
pub type DedupState = BTreeMap<String, Option<String>>;

/// JSON file holding the dedup state. Read once at startup, overwritten
/// wholesale on every persist.
#[derive(Debug, Clone)]
pub struct DedupFile {
    path: PathBuf,
}

impl DedupFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, making sure every configured account has an
    /// entry. A missing file means nothing has been seen yet. Entries for
    /// accounts that are no longer configured are kept so they survive a
    /// temporary removal from the account list.
    pub async fn load(&self, accounts: &[String]) -> Result<DedupState, PersistenceError> {
        let mut state = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<DedupState>(&bytes).map_err(|source| {
                PersistenceError::DedupCorrupt {
                    path: self.path.display().to_string(),
                    source,
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No dedup file yet, starting with nothing seen");
                DedupState::new()
            }
            Err(source) => {
                return Err(PersistenceError::DedupRead {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };

        for account in accounts {
            state.entry(account.clone()).or_insert(None);
        }

        Ok(state)
    }

    /// Serialize the whole map to a sibling temp file and rename it over the
    /// dedup file, so a reader never observes a half-written map.
    pub async fn save(&self, state: &DedupState) -> Result<(), PersistenceError> {
        let write_err = |source: std::io::Error| PersistenceError::DedupWrite {
            path: self.path.display().to_string(),
            source,
        };

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| write_err(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        let tmp_path = self.tmp_path();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        if let Err(e) = tokio::fs::write(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        debug!(path = %self.path.display(), entries = state.len(), "Persisted dedup state");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dedup".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
    }
}
