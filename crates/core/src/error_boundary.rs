use std::backtrace::Backtrace;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::action_log::{unix_timestamp_millis, ActionLog, ActionOutcome, ActionRecord};

/// Wraps a single user-triggered action so that no failure escapes it.
///
/// On success the result passes through untouched. On an error or a panic
/// the failure is appended to the action log with a captured backtrace,
/// echoed to stderr, and suppressed: the caller gets `None` and the
/// application stays alive. Bad SQL and programming errors are treated
/// identically.
pub struct ErrorBoundary {
    log: Option<ActionLog>,
}

impl ErrorBoundary {
    #[must_use]
    pub fn new(log: ActionLog) -> Self {
        Self { log: Some(log) }
    }

    /// Boundary without a log sink; failures are still suppressed and
    /// echoed to stderr.
    #[must_use]
    pub fn unlogged() -> Self {
        Self { log: None }
    }

    pub fn record_success(&self, action: &str, detail: Option<&str>) {
        self.append(ActionRecord {
            timestamp_unix_ms: unix_timestamp_millis(),
            action: action.to_string(),
            detail: detail.map(str::to_string),
            outcome: ActionOutcome::Succeeded,
            error: None,
            backtrace: None,
        });
    }

    pub fn run<T, E: Display>(
        &self,
        action: &str,
        detail: Option<&str>,
        body: impl FnOnce() -> Result<T, E>,
    ) -> Option<T> {
        match std::panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(value)) => {
                self.record_success(action, detail);
                Some(value)
            }
            Ok(Err(error)) => {
                self.record_failure(action, detail, &error.to_string());
                None
            }
            Err(payload) => {
                self.record_failure(action, detail, &panic_message(payload.as_ref()));
                None
            }
        }
    }

    pub async fn run_async<T, E, Fut>(&self, action: &str, detail: Option<&str>, body: Fut) -> Option<T>
    where
        E: Display,
        Fut: Future<Output = Result<T, E>>,
    {
        match AssertUnwindSafe(body).catch_unwind().await {
            Ok(Ok(value)) => {
                self.record_success(action, detail);
                Some(value)
            }
            Ok(Err(error)) => {
                self.record_failure(action, detail, &error.to_string());
                None
            }
            Err(payload) => {
                self.record_failure(action, detail, &panic_message(payload.as_ref()));
                None
            }
        }
    }

    fn record_failure(&self, action: &str, detail: Option<&str>, message: &str) {
        eprintln!("{action} failed: {message}");
        self.append(ActionRecord {
            timestamp_unix_ms: unix_timestamp_millis(),
            action: action.to_string(),
            detail: detail.map(str::to_string),
            outcome: ActionOutcome::Failed,
            error: Some(message.to_string()),
            backtrace: Some(Backtrace::force_capture().to_string()),
        });
    }

    fn append(&self, record: ActionRecord) {
        // A failing log sink must not take the boundary down with it.
        if let Some(log) = &self.log {
            let _ = log.append(&record);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
