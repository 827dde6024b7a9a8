//! Bounded admission for pipeline calls.
//!
//! A single [`ConcurrencyLimiter`] is built at startup and handed to the query service. Each
//! query, batch, or analyze call holds one [`LimiterPermit`] for its whole duration; dropping the
//! permit (on success, error, or panic unwinding) frees the slot.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Errors raised when a permit cannot be granted.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// Every slot is taken and the limiter is configured to reject.
    #[error("The server is busy processing requests.")]
    Busy,
    /// The underlying semaphore was closed.
    #[error("concurrency limiter is closed")]
    Closed,
}

/// What happens to a request arriving while every slot is held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimiterMode {
    /// Fail immediately with [`LimiterError::Busy`].
    #[default]
    Reject,
    /// Queue until a slot frees up.
    Wait,
}

impl std::str::FromStr for LimiterMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "wait" => Ok(Self::Wait),
            _ => Err(()),
        }
    }
}

/// Shared gate bounding how many requests run a pipeline call at once.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    mode: LimiterMode,
}

/// Scoped slot held while a pipeline call runs.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyLimiter {
    /// Build a limiter admitting at most `capacity` holders; `0` disables the limit.
    pub fn new(capacity: usize, mode: LimiterMode) -> Self {
        let semaphore = (capacity > 0).then(|| Arc::new(Semaphore::new(capacity)));
        Self { semaphore, mode }
    }

    /// Limiter that admits everyone.
    pub fn unbounded() -> Self {
        Self {
            semaphore: None,
            mode: LimiterMode::Wait,
        }
    }

    /// Number of free slots, or `None` when unbounded.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Acquire a slot according to the configured [`LimiterMode`].
    pub async fn acquire(&self) -> Result<LimiterPermit, LimiterError> {
        let Some(semaphore) = self.semaphore.as_ref() else {
            return Ok(LimiterPermit { _permit: None });
        };

        let permit = match self.mode {
            LimiterMode::Reject => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    tracing::warn!("Concurrency limit reached; rejecting request");
                    return Err(LimiterError::Busy);
                }
                Err(TryAcquireError::Closed) => return Err(LimiterError::Closed),
            },
            LimiterMode::Wait => semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| LimiterError::Closed)?,
        };

        Ok(LimiterPermit {
            _permit: Some(permit),
        })
    }
}
