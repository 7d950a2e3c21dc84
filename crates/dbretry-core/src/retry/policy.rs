use std::time::Duration;

use super::classify::{AlwaysRetry, ErrorClassifier};

/// Decision returned by a retry decider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the error goes back to the caller.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Per-sequence decision function.
///
/// `attempt` is 0-based: it is the number of retries already performed when
/// `error` was observed. Implementations must be deterministic in
/// `(attempt, error)`.
pub trait ShouldRetry<E: ?Sized> {
    fn decide(&self, attempt: u32, error: &E) -> RetryDecision;
}

impl<E, F> ShouldRetry<E> for F
where
    E: ?Sized,
    F: Fn(u32, &E) -> RetryDecision,
{
    fn decide(&self, attempt: u32, error: &E) -> RetryDecision {
        self(attempt, error)
    }
}

/// Factory for decision functions.
///
/// A policy is built once (typically when a connection provider or command is
/// constructed) and hands out a fresh decider for every top-level operation,
/// so retry sequences never share state.
pub trait RetryPolicy<E: ?Sized> {
    type Decider: ShouldRetry<E>;

    fn should_retry(&self) -> Self::Decider;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverRetry;

impl<E: ?Sized> ShouldRetry<E> for NeverRetry {
    fn decide(&self, _attempt: u32, _error: &E) -> RetryDecision {
        RetryDecision::NoRetry
    }
}

impl<E: ?Sized> RetryPolicy<E> for NeverRetry {
    type Decider = NeverRetry;

    fn should_retry(&self) -> Self::Decider {
        NeverRetry
    }
}

/// Fixed retry count with a fixed delay between attempts.
///
/// With the default [`AlwaysRetry`] classifier every error is retried until
/// the count runs out, including permanent ones such as SQL syntax errors or
/// constraint violations. Those surface only after `max_retries * delay`.
/// Pass a classifier via [`FixedRetry::with_classifier`] to stop early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedRetry<C = AlwaysRetry> {
    max_retries: u32,
    delay: Duration,
    classifier: C,
}

impl FixedRetry {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            classifier: AlwaysRetry,
        }
    }
}

impl<C> FixedRetry<C> {
    /// Replace the error classifier, keeping count and delay.
    pub fn with_classifier<C2>(self, classifier: C2) -> FixedRetry<C2> {
        FixedRetry {
            max_retries: self.max_retries,
            delay: self.delay,
            classifier,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<E, C> ShouldRetry<E> for FixedRetry<C>
where
    E: ?Sized,
    C: ErrorClassifier<E>,
{
    fn decide(&self, attempt: u32, error: &E) -> RetryDecision {
        if attempt >= self.max_retries || !self.classifier.is_retryable(error) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay)
    }
}

impl<E, C> RetryPolicy<E> for FixedRetry<C>
where
    E: ?Sized,
    C: ErrorClassifier<E> + Clone,
{
    type Decider = FixedRetry<C>;

    fn should_retry(&self) -> Self::Decider {
        self.clone()
    }
}

/// Exponential backoff with a cap: `base_delay * 2^attempt`, at most `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialRetry<C = AlwaysRetry> {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    classifier: C,
}

impl ExponentialRetry {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            classifier: AlwaysRetry,
        }
    }
}

impl<C> ExponentialRetry<C> {
    pub fn with_classifier<C2>(self, classifier: C2) -> ExponentialRetry<C2> {
        ExponentialRetry {
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            classifier,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the retry that follows failure number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Shift is clamped so the multiplier cannot overflow.
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl<E, C> ShouldRetry<E> for ExponentialRetry<C>
where
    E: ?Sized,
    C: ErrorClassifier<E>,
{
    fn decide(&self, attempt: u32, error: &E) -> RetryDecision {
        if attempt >= self.max_retries || !self.classifier.is_retryable(error) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt))
    }
}

impl<E, C> RetryPolicy<E> for ExponentialRetry<C>
where
    E: ?Sized,
    C: ErrorClassifier<E> + Clone,
{
    type Decider = ExponentialRetry<C>;

    fn should_retry(&self) -> Self::Decider {
        self.clone()
    }
}

/// One of the built-in policies, chosen at runtime (usually from config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfiguredPolicy<C = AlwaysRetry> {
    Never,
    Fixed(FixedRetry<C>),
    Exponential(ExponentialRetry<C>),
}

impl<C> ConfiguredPolicy<C> {
    pub fn with_classifier<C2>(self, classifier: C2) -> ConfiguredPolicy<C2> {
        match self {
            ConfiguredPolicy::Never => ConfiguredPolicy::Never,
            ConfiguredPolicy::Fixed(p) => ConfiguredPolicy::Fixed(p.with_classifier(classifier)),
            ConfiguredPolicy::Exponential(p) => {
                ConfiguredPolicy::Exponential(p.with_classifier(classifier))
            }
        }
    }
}

impl Default for ConfiguredPolicy {
    /// Ten retries, three seconds apart.
    fn default() -> Self {
        ConfiguredPolicy::Fixed(FixedRetry::new(10, Duration::from_millis(3000)))
    }
}

impl<E, C> ShouldRetry<E> for ConfiguredPolicy<C>
where
    E: ?Sized,
    C: ErrorClassifier<E>,
{
    fn decide(&self, attempt: u32, error: &E) -> RetryDecision {
        match self {
            ConfiguredPolicy::Never => RetryDecision::NoRetry,
            ConfiguredPolicy::Fixed(p) => p.decide(attempt, error),
            ConfiguredPolicy::Exponential(p) => p.decide(attempt, error),
        }
    }
}

impl<E, C> RetryPolicy<E> for ConfiguredPolicy<C>
where
    E: ?Sized,
    C: ErrorClassifier<E> + Clone,
{
    type Decider = ConfiguredPolicy<C>;

    fn should_retry(&self) -> Self::Decider {
        self.clone()
    }
}
