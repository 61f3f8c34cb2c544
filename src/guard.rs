use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ResearchError;

/// Per-request budget applied to every external call: a uniform timeout
/// plus a cancellation token shared by all calls of the request.
#[derive(Debug, Clone, Default)]
pub struct CallGuard {
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl CallGuard {
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// No timeout and a token nobody else holds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `fut`, failing with `Cancelled` or `Timeout` if the request is
    /// aborted or the call overruns its budget.
    pub async fn run<T, F>(&self, stage: &'static str, fut: F) -> Result<T, ResearchError>
    where
        F: Future<Output = Result<T, ResearchError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }

        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| ResearchError::Timeout { stage, limit })?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ResearchError::Cancelled),
            result = bounded => result,
        }
    }
}
