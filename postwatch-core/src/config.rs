use crate::error::ConfigError;
use crate::schedule::PollSchedule;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "postwatch.toml";
pub const CONFIG_PATH_ENV: &str = "POSTWATCH_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub accounts: Vec<String>,
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_jitter_secs: u64,
    pub failure_backoff_secs: u64,
    pub cooldown_secs: u64,
    pub stagger_min_secs: u64,
    pub stagger_max_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_jitter_secs: 20,
            failure_backoff_secs: 60,
            cooldown_secs: 60,
            stagger_min_secs: 1,
            stagger_max_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub dedup_file: PathBuf,
    pub post_log: PathBuf,
    pub media_dir: PathBuf,
    pub process_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dedup_file: PathBuf::from("last_tweets.json"),
            post_log: PathBuf::from("tweets_log.txt"),
            media_dir: PathBuf::from("images"),
            process_log: PathBuf::from("postwatch.log"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    Chrome,
    Browserless,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub renderer: RendererKind,
    pub chrome_bin: String,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub base_url: String,
    pub post_wait_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            renderer: RendererKind::Chrome,
            chrome_bin: std::env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string()),
            browserless_url: None,
            browserless_token: None,
            base_url: "https://x.com".to_string(),
            post_wait_secs: 10,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 2,
        }
    }
}

impl AppConfig {
    /// Resolve the config path: explicit argument, then `POSTWATCH_CONFIG`,
    /// then `postwatch.toml` in the working directory.
    pub fn resolve_path(arg: Option<String>) -> PathBuf {
        arg.or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            },
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::MissingField {
                field: "accounts".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "accounts".to_string(),
                    value: format!("{:?}", account),
                });
            }
            if !seen.insert(account.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("account '{}' is listed more than once", account),
                });
            }
        }

        match self.poll_interval_secs {
            None => {
                return Err(ConfigError::MissingField {
                    field: "poll_interval_secs".to_string(),
                })
            }
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    field: "poll_interval_secs".to_string(),
                    value: "0".to_string(),
                })
            }
            Some(_) => {}
        }

        if self.schedule.stagger_min_secs > self.schedule.stagger_max_secs {
            return Err(ConfigError::ValidationFailed {
                reason: "schedule.stagger_min_secs is greater than schedule.stagger_max_secs"
                    .to_string(),
            });
        }

        if self.extractor.renderer == RendererKind::Browserless
            && self.extractor.browserless_url.is_none()
        {
            return Err(ConfigError::MissingField {
                field: "extractor.browserless_url".to_string(),
            });
        }

        if self.extractor.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "extractor.timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }

        if self.media.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "media.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    pub fn schedule(&self) -> PollSchedule {
        let base = Duration::from_secs(self.poll_interval_secs.unwrap_or(300));
        PollSchedule {
            base_interval: base,
            interval_jitter: Duration::from_secs(self.schedule.interval_jitter_secs),
            failure_backoff: Duration::from_secs(self.schedule.failure_backoff_secs),
            cooldown: Duration::from_secs(self.schedule.cooldown_secs),
            stagger_min: Duration::from_secs(self.schedule.stagger_min_secs),
            stagger_max: Duration::from_secs(self.schedule.stagger_max_secs),
        }
    }
}
