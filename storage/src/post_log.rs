use postwatch_core::{LogRecord, PersistenceError};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const DELIMITER_WIDTH: usize = 50;

/// Render one record as a self-contained block of the post log.
pub fn format_record(record: &LogRecord) -> String {
    format!(
        "\nAccount: {}\nText: {}\nLink: {}\nImage: {}\nTime: {}\n{}\n",
        record.account,
        record.text,
        record.permalink,
        record.media_display(),
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        "-".repeat(DELIMITER_WIDTH)
    )
}

/// Append-only, human-readable log of recorded posts.
///
/// Callers serialize appends through the dedup guard; each record is also
/// written with a single `write_all` so a block is never split.
#[derive(Debug, Clone)]
pub struct PostLog {
    path: PathBuf,
}

impl PostLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &LogRecord) -> Result<(), PersistenceError> {
        let append_err = |source: std::io::Error| PersistenceError::LogAppend {
            path: self.path.display().to_string(),
            source,
        };

        let block = format_record(record);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(append_err)?;
        file.write_all(block.as_bytes()).await.map_err(append_err)?;
        file.flush().await.map_err(append_err)?;
        Ok(())
    }
}
