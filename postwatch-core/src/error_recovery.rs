//! Error recovery strategies for the account polling loop.
//!
//! Every failure a worker can hit is mapped to one of a small set of
//! strategies. None of them stop the worker: the worst case is a cooldown
//! before the next poll.

use crate::{CoreError, ErrorExt};
use std::time::Duration;
use tracing::{error, warn};

/// Recovery strategy for handling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Skip the rest of this cycle and retry after the short failure backoff
    Backoff,
    /// Continue without the failed enrichment
    Degrade,
    /// Log and carry on; in-memory state stays authoritative
    Continue,
    /// Unclassified failure: sleep for the long cooldown before resuming
    Cooldown,
}

/// Error recovery handler that maps errors to worker strategies
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            // Page not retrievable or not in the expected shape
            CoreError::Extraction(_) | CoreError::Timeout { .. } => RecoveryStrategy::Backoff,

            // Media is an enrichment, never a gate
            CoreError::Media(_) => RecoveryStrategy::Degrade,

            // Dedup file or post log unwritable; retried next cycle
            CoreError::Persistence(_) => RecoveryStrategy::Continue,

            // A network error surfacing outside the extractor still only
            // warrants the short backoff
            CoreError::Network(_) => RecoveryStrategy::Backoff,

            CoreError::Config(_)
            | CoreError::Io(_)
            | CoreError::Serialization(_)
            | CoreError::Internal { .. } => RecoveryStrategy::Cooldown,
        }
    }

    /// Log the error at the level its strategy warrants and return the strategy
    pub fn handle(account: &str, error: &CoreError) -> RecoveryStrategy {
        let strategy = Self::determine_strategy(error);
        match strategy {
            RecoveryStrategy::Backoff | RecoveryStrategy::Degrade => {
                warn!(
                    account,
                    code = %error.error_code(),
                    error = %error,
                    "{}",
                    error.user_friendly_message()
                );
            }
            RecoveryStrategy::Continue | RecoveryStrategy::Cooldown => {
                error!(
                    account,
                    code = %error.error_code(),
                    error = %error,
                    "{}",
                    error.user_friendly_message()
                );
            }
        }
        strategy
    }

    /// Sleep duration suggested by the strategy, given the schedule's bounds
    pub fn delay_for(
        strategy: RecoveryStrategy,
        failure_backoff: Duration,
        cooldown: Duration,
    ) -> Option<Duration> {
        match strategy {
            RecoveryStrategy::Backoff => Some(failure_backoff),
            RecoveryStrategy::Cooldown => Some(cooldown),
            RecoveryStrategy::Degrade | RecoveryStrategy::Continue => None,
        }
    }
}
