//! Retry loop: run an operation until it succeeds or the policy says stop.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::policy::{RetryDecision, RetryPolicy, ShouldRetry};
use super::sink::{AttemptFailure, DiagnosticSink, TracingSink};

/// How often an abortable wait re-checks its abort flag.
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs a closure until it succeeds or the retry policy says to stop,
/// logging each failure through `tracing`.
pub fn run_with_retry<P, T, E, F>(policy: &P, f: F) -> Result<T, E>
where
    P: RetryPolicy<E>,
    E: fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    RetryExecutor::new().run("run_with_retry", policy, f)
}

/// Drives operations through a retry policy.
///
/// The executor owns nothing but its diagnostic sink; every call obtains a
/// fresh decider from the policy and keeps its own attempt counter, so one
/// executor and one policy can serve many concurrent callers.
///
/// The error returned after the last attempt is the operation's own error,
/// untouched. How many attempts were made is only visible in the sink.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor<S = TracingSink> {
    sink: S,
}

impl RetryExecutor {
    /// Executor that reports through [`TracingSink`].
    pub fn new() -> Self {
        Self { sink: TracingSink }
    }
}

impl<S: DiagnosticSink> RetryExecutor<S> {
    pub fn with_sink(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Blocking form: sleeps the calling thread between attempts.
    pub fn run<P, T, E, F>(&self, context: &str, policy: &P, f: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        self.drive(context, policy, None, f)
    }

    /// Like [`run`](Self::run), but stops waiting once `abort` is set.
    /// An aborted loop returns the most recent operation error.
    pub fn run_abortable<P, T, E, F>(
        &self,
        context: &str,
        policy: &P,
        abort: &AtomicBool,
        f: F,
    ) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        self.drive(context, policy, Some(abort), f)
    }

    /// Async form: the delay is a `tokio` timer instead of a blocked thread.
    pub async fn run_async<P, T, E, F, Fut>(&self, context: &str, policy: &P, f: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive_async(context, policy, None, f).await
    }

    pub async fn run_async_abortable<P, T, E, F, Fut>(
        &self,
        context: &str,
        policy: &P,
        abort: &AtomicBool,
        f: F,
    ) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive_async(context, policy, Some(abort), f).await
    }

    fn drive<P, T, E, F>(
        &self,
        context: &str,
        policy: &P,
        abort: Option<&AtomicBool>,
        mut f: F,
    ) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let decider = policy.should_retry();
        let mut attempt = 0u32;
        loop {
            let err = match f() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let delay = match self.next_delay(context, attempt, &decider, &err) {
                Some(d) => d,
                None => return Err(err),
            };
            if !wait_blocking(delay, abort) {
                tracing::debug!(context, attempt, "retry aborted while waiting");
                return Err(err);
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn drive_async<P, T, E, F, Fut>(
        &self,
        context: &str,
        policy: &P,
        abort: Option<&AtomicBool>,
        mut f: F,
    ) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let decider = policy.should_retry();
        let mut attempt = 0u32;
        loop {
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let delay = match self.next_delay(context, attempt, &decider, &err) {
                Some(d) => d,
                None => return Err(err),
            };
            if !wait_async(delay, abort).await {
                tracing::debug!(context, attempt, "retry aborted while waiting");
                return Err(err);
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Report the failure, then ask the decider. `None` means give up.
    fn next_delay<D, E>(&self, context: &str, attempt: u32, decider: &D, err: &E) -> Option<Duration>
    where
        D: ShouldRetry<E>,
        E: fmt::Display,
    {
        self.sink.attempt_failed(&AttemptFailure {
            context,
            attempt,
            error: err,
        });
        match decider.decide(attempt, err) {
            RetryDecision::NoRetry => None,
            RetryDecision::RetryAfter(d) => {
                tracing::debug!(context, attempt, delay_ms = d.as_millis() as u64, "retrying");
                Some(d)
            }
        }
    }
}

/// Sleep for `delay`. Returns `false` if `abort` was set first.
fn wait_blocking(delay: Duration, abort: Option<&AtomicBool>) -> bool {
    let Some(flag) = abort else {
        std::thread::sleep(delay);
        return true;
    };
    let deadline = Instant::now() + delay;
    loop {
        if flag.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(ABORT_POLL_INTERVAL));
    }
}

async fn wait_async(delay: Duration, abort: Option<&AtomicBool>) -> bool {
    let Some(flag) = abort else {
        tokio::time::sleep(delay).await;
        return true;
    };
    let deadline = tokio::time::Instant::now() + delay;
    loop {
        if flag.load(Ordering::Relaxed) {
            return false;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(ABORT_POLL_INTERVAL)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::classify::RetryIf;
    use crate::retry::policy::{FixedRetry, NeverRetry};
    use crate::retry::sink::MemorySink;
    use std::cell::Cell;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct OpError(&'static str, u32);

    impl fmt::Display for OpError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} (call {})", self.0, self.1)
        }
    }

    fn no_delay(max_retries: u32) -> FixedRetry {
        FixedRetry::new(max_retries, Duration::ZERO)
    }

    #[test]
    fn succeeds_after_k_failures() {
        let sink = MemorySink::new();
        let exec = RetryExecutor::with_sink(&sink);
        let calls = Cell::new(0u32);
        let result = exec.run("scenario", &no_delay(3), || {
            calls.set(calls.get() + 1);
            if calls.get() <= 3 {
                Err(OpError("connection reset", calls.get()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 4);
        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].attempt, 0);
        assert_eq!(records[2].attempt, 2);
        assert!(records.iter().all(|r| r.context == "scenario"));
        assert_eq!(records[0].error, "connection reset (call 1)");
    }

    #[test]
    fn always_failing_runs_n_plus_one_times_and_returns_last_error() {
        for n in [0u32, 1, 4] {
            let sink = MemorySink::new();
            let exec = RetryExecutor::with_sink(&sink);
            let calls = Cell::new(0u32);
            let result: Result<(), OpError> = exec.run("always", &no_delay(n), || {
                calls.set(calls.get() + 1);
                Err(OpError("boom", calls.get()))
            });
            assert_eq!(calls.get(), n + 1);
            assert_eq!(result, Err(OpError("boom", n + 1)));
            assert_eq!(sink.len() as u32, n + 1);
        }
    }

    #[test]
    fn zero_retries_fails_immediately_without_delay() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let policy = FixedRetry::new(0, Duration::from_secs(60));
        let start = Instant::now();
        let result: Result<u8, OpError> = exec.run("once", &policy, || Err(OpError("nope", 1)));
        assert_eq!(result, Err(OpError("nope", 1)));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(exec.sink().len(), 1);
    }

    #[test]
    fn unit_operations_are_supported() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let calls = Cell::new(0u32);
        let result = exec.run("unit", &no_delay(2), || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(OpError("reset", 1))
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Ok(()));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn waits_at_least_the_delay_between_attempts() {
        let delay = Duration::from_millis(20);
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let calls = Cell::new(0u32);
        let start = Instant::now();
        let result = exec.run("timed", &FixedRetry::new(5, delay), || {
            calls.set(calls.get() + 1);
            if calls.get() <= 3 {
                Err(OpError("reset", calls.get()))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result, Ok(4));
        assert!(start.elapsed() >= delay * 3);
    }

    #[test]
    fn classifier_rejection_propagates_first_error() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let policy = no_delay(10).with_classifier(RetryIf::new(|e: &OpError| e.0 != "syntax"));
        let calls = Cell::new(0u32);
        let result: Result<(), OpError> = exec.run("classified", &policy, || {
            calls.set(calls.get() + 1);
            Err(OpError("syntax", calls.get()))
        });
        assert_eq!(result, Err(OpError("syntax", 1)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn never_retry_policy() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let result: Result<(), OpError> = exec.run("never", &NeverRetry, || Err(OpError("x", 1)));
        assert!(result.is_err());
        assert_eq!(exec.sink().len(), 1);
    }

    #[test]
    fn abort_flag_stops_waiting() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let policy = FixedRetry::new(100, Duration::from_secs(30));
        let abort = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&abort);
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.store(true, Ordering::Relaxed);
        });
        let start = Instant::now();
        let calls = Cell::new(0u32);
        let result: Result<(), OpError> = exec.run_abortable("abortable", &policy, &abort, || {
            calls.set(calls.get() + 1);
            Err(OpError("reset", calls.get()))
        });
        setter.join().unwrap();
        assert_eq!(result, Err(OpError("reset", 1)));
        assert_eq!(calls.get(), 1);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn preset_abort_flag_still_makes_one_attempt() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let abort = AtomicBool::new(true);
        let calls = Cell::new(0u32);
        let result: Result<(), OpError> = exec.run_abortable("preset", &no_delay(3), &abort, || {
            calls.set(calls.get() + 1);
            Err(OpError("e", calls.get()))
        });
        assert_eq!(result, Err(OpError("e", 1)));
        assert_eq!(calls.get(), 1);
        assert_eq!(exec.sink().len(), 1);
    }

    #[test]
    fn run_with_retry_uses_default_executor() {
        let calls = Cell::new(0u32);
        let result = run_with_retry(&no_delay(2), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(OpError("reset", calls.get()))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);

        calls.set(0);
        let result: Result<(), OpError> = run_with_retry(&no_delay(1), || {
            calls.set(calls.get() + 1);
            Err(OpError("down", calls.get()))
        });
        assert_eq!(result, Err(OpError("down", 2)));
    }

    #[test]
    fn concurrent_loops_do_not_share_attempt_counts() {
        let sink = Arc::new(MemorySink::new());
        let exec = Arc::new(RetryExecutor::with_sink(Arc::clone(&sink)));
        let policy = Arc::new(FixedRetry::new(5, Duration::from_millis(1)));

        let handles: Vec<_> = [1u32, 3]
            .into_iter()
            .map(|failures| {
                let exec = Arc::clone(&exec);
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || {
                    let calls = AtomicU32::new(0);
                    let result = exec.run("concurrent", policy.as_ref(), || {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        if n <= failures {
                            Err(OpError("reset", n))
                        } else {
                            Ok(n)
                        }
                    });
                    (failures, result, calls.load(Ordering::SeqCst))
                })
            })
            .collect();

        for handle in handles {
            let (failures, result, calls) = handle.join().unwrap();
            assert_eq!(result, Ok(failures + 1));
            assert_eq!(calls, failures + 1);
        }
        assert_eq!(sink.len(), 4);
    }

    #[tokio::test]
    async fn async_form_retries_and_returns_value() {
        let sink = MemorySink::new();
        let exec = RetryExecutor::with_sink(&sink);
        let calls = AtomicU32::new(0);
        let result = exec
            .run_async("async", &no_delay(3), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        Err(OpError("reset", n))
                    } else {
                        Ok(n * 10)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(30));
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn async_delay_is_honoured() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let policy = FixedRetry::new(2, Duration::from_secs(3));
        let start = tokio::time::Instant::now();
        let result: Result<(), OpError> = exec
            .run_async("paused", &policy, || async { Err(OpError("reset", 0)) })
            .await;
        assert!(result.is_err());
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn async_abort_returns_last_error() {
        let exec = RetryExecutor::with_sink(MemorySink::new());
        let policy = FixedRetry::new(10, Duration::from_secs(30));
        let abort = AtomicBool::new(true);
        let result: Result<(), OpError> = exec
            .run_async_abortable("aborted", &policy, &abort, || async { Err(OpError("reset", 1)) })
            .await;
        assert_eq!(result, Err(OpError("reset", 1)));
        assert_eq!(exec.sink().len(), 1);
    }
}
