//! Circuit breaker for a single protected resource
//!
//! The breaker is an explicit three-state machine:
//!
//! ```text
//!            K consecutive failures
//!   Closed ─────────────────────────▶ Open
//!     ▲                                │ reset_timeout elapsed,
//!     │ trial succeeds                 │ checked at call time
//!     │                                ▼
//!     └────────────────────────── HalfOpen ──▶ Open (trial fails,
//!                                                fresh opened_at)
//! ```
//!
//! `HalfOpen` lasts for exactly one trial call. The Open→HalfOpen check and
//! the trial admission happen under one lock acquisition, so concurrent
//! callers arriving while the trial is in flight are rejected with
//! `CircuitOpen` instead of each running their own trial.
//!
//! The internal lock is held only to read or transition state. It is
//! released before the protected operation runs and re-acquired to record
//! the outcome.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{Clock, ResilienceError, ResilienceResult, SystemClock};
use crate::config::CircuitBreakerSettings;
use crate::error::{CommonError, CommonResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without running the operation
    Open,
    /// One trial call is in flight
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Name of the protected resource, used in errors and logs
    pub name: String,
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time to stay open before admitting a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: settings.reset_timeout,
            ..Self::default()
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.failure_threshold == 0 {
            return Err(CommonError::config_field("failure_threshold", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn build(self) -> CommonResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time snapshot of breaker state and counters
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    /// Calls whose operation actually ran
    pub total_calls: u64,
    /// Calls rejected with `CircuitOpen`
    pub rejected_calls: u64,
    pub opened_at: Option<Instant>,
}

/// How a call was let through.
///
/// Admitted calls carry the machine generation they were admitted under, so
/// an outcome that arrives after a state change is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal { generation: u64 },
    Trial { generation: u64 },
    Rejected { retry_after: Option<Duration> },
}

/// Outcome of an admitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Finished without a verdict (filtered error, dropped future)
    Neutral,
}

#[derive(Debug, Clone)]
struct Machine {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Bumped on every state transition and on manual reset
    generation: u64,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            generation: 0,
        }
    }

    fn transition(&mut self, to: CircuitState) {
        self.state = to;
        self.generation = self.generation.wrapping_add(1);
    }

    fn reset(&mut self) {
        self.transition(CircuitState::Closed);
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    fn admit(&mut self, now: Instant, reset_timeout: Duration) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Normal { generation: self.generation },
            CircuitState::Open => {
                let opened_at = self.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= reset_timeout {
                    self.transition(CircuitState::HalfOpen);
                    Admission::Trial { generation: self.generation }
                } else {
                    Admission::Rejected { retry_after: Some(reset_timeout - elapsed) }
                }
            }
            CircuitState::HalfOpen => Admission::Rejected { retry_after: None },
        }
    }

    /// Apply an outcome; returns the new state when a transition happened.
    fn record(
        &mut self,
        admission: Admission,
        outcome: Outcome,
        now: Instant,
        threshold: u32,
    ) -> Option<CircuitState> {
        match admission {
            Admission::Rejected { .. } => None,
            // Admitted under an earlier state: the circuit has moved on.
            Admission::Normal { generation } | Admission::Trial { generation }
                if generation != self.generation =>
            {
                None
            }
            Admission::Normal { .. } => match outcome {
                Outcome::Success => {
                    self.consecutive_failures = 0;
                    None
                }
                Outcome::Failure => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    if self.consecutive_failures >= threshold {
                        self.transition(CircuitState::Open);
                        self.opened_at = Some(now);
                        Some(CircuitState::Open)
                    } else {
                        None
                    }
                }
                Outcome::Neutral => None,
            },
            Admission::Trial { .. } => match outcome {
                Outcome::Success => {
                    self.reset();
                    Some(CircuitState::Closed)
                }
                Outcome::Failure => {
                    self.transition(CircuitState::Open);
                    self.opened_at = Some(now);
                    Some(CircuitState::Open)
                }
                Outcome::Neutral => {
                    self.transition(CircuitState::Open);
                    Some(CircuitState::Open)
                }
            },
        }
    }
}

/// Generic circuit breaker
///
/// Clones share state, so one breaker can be handed to every caller of the
/// protected resource.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use healer_common::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CircuitBreakerConfig::builder()
///     .name("llm")
///     .failure_threshold(2)
///     .reset_timeout(Duration::from_secs(30))
///     .build()?;
/// let breaker = CircuitBreaker::new(config)?;
///
/// for _ in 0..2 {
///     let _ = breaker.call(|| Err::<(), _>(std::io::Error::other("boom")));
/// }
/// assert_eq!(breaker.state(), CircuitState::Open);
/// # Ok(())
/// # }
/// ```
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    machine: Arc<Mutex<Machine>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("total_calls", &self.total_calls.load(Ordering::Relaxed))
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            machine: Arc::clone(&self.machine),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            machine: Arc::new(Mutex::new(Machine::new())),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current stored state.
    ///
    /// An open circuit whose reset timeout has elapsed still reports `Open`
    /// until the next call performs the transition.
    pub fn state(&self) -> CircuitState {
        self.machine.lock().state
    }

    /// Snapshot of state and counters
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let machine = self.machine.lock().clone();
        CircuitBreakerMetrics {
            state: machine.state,
            consecutive_failures: machine.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            opened_at: machine.opened_at,
        }
    }

    /// Force the circuit closed and clear the failure count
    pub fn reset(&self) {
        self.machine.lock().reset();
        info!(circuit = %self.config.name, "circuit breaker manually reset");
    }

    /// Run an async operation under breaker protection.
    ///
    /// Every operation error counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.execute_filtered(operation, |_| true).await
    }

    /// Run an async operation, counting only errors for which
    /// `counts_as_failure` returns `true`. Other errors are returned to the
    /// caller without touching the failure count.
    #[instrument(skip(self, operation, counts_as_failure), fields(circuit = %self.config.name))]
    pub async fn execute_filtered<F, Fut, T, E, P>(
        &self,
        operation: F,
        counts_as_failure: P,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: FnOnce(&E) -> bool,
    {
        let permit = self.acquire()?;
        let result = operation().await;
        self.settle(permit, result, counts_as_failure)
    }

    /// Run a synchronous operation under breaker protection
    #[instrument(skip(self, operation), fields(circuit = %self.config.name))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let permit = self.acquire()?;
        let result = operation();
        self.settle(permit, result, |_| true)
    }

    fn acquire<E>(&self) -> ResilienceResult<CallPermit<'_, C>, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let now = self.clock.now();
        let admission = self.machine.lock().admit(now, self.config.reset_timeout);

        match admission {
            Admission::Rejected { retry_after } => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.config.name, "circuit open, rejecting call");
                Err(ResilienceError::CircuitOpen { name: self.config.name.clone(), retry_after })
            }
            Admission::Trial { .. } => {
                info!(circuit = %self.config.name, "circuit half-open, admitting trial call");
                self.total_calls.fetch_add(1, Ordering::Relaxed);
                Ok(CallPermit { breaker: self, admission: Some(admission) })
            }
            Admission::Normal { .. } => {
                self.total_calls.fetch_add(1, Ordering::Relaxed);
                Ok(CallPermit { breaker: self, admission: Some(admission) })
            }
        }
    }

    fn settle<T, E, P>(
        &self,
        permit: CallPermit<'_, C>,
        result: Result<T, E>,
        counts_as_failure: P,
    ) -> ResilienceResult<T, E>
    where
        E: std::error::Error + Send + Sync + 'static,
        P: FnOnce(&E) -> bool,
    {
        match result {
            Ok(value) => {
                permit.complete(Outcome::Success);
                Ok(value)
            }
            Err(error) => {
                let outcome =
                    if counts_as_failure(&error) { Outcome::Failure } else { Outcome::Neutral };
                permit.complete(outcome);
                Err(ResilienceError::OperationFailed {
                    operation: self.config.name.clone(),
                    attempts: 1,
                    source: error,
                })
            }
        }
    }

    fn record(&self, admission: Admission, outcome: Outcome) {
        let now = self.clock.now();
        let (transition, failures) = {
            let mut machine = self.machine.lock();
            let transition =
                machine.record(admission, outcome, now, self.config.failure_threshold);
            (transition, machine.consecutive_failures)
        };

        match transition {
            Some(CircuitState::Open) if matches!(admission, Admission::Trial { .. }) => {
                warn!(
                    circuit = %self.config.name,
                    ?outcome,
                    "trial call did not succeed, circuit reopened"
                );
            }
            Some(CircuitState::Open) => {
                warn!(circuit = %self.config.name, failures, "circuit opened");
            }
            Some(CircuitState::Closed) => {
                info!(circuit = %self.config.name, "trial call succeeded, circuit closed");
            }
            _ => {}
        }
    }
}

/// Admission held while the protected operation runs.
///
/// Dropping it without an outcome (for example when the caller's future is
/// dropped mid-call) records a neutral outcome, so a cancelled trial reopens
/// the circuit instead of leaving it half-open forever.
struct CallPermit<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    admission: Option<Admission>,
}

impl<C: Clock> CallPermit<'_, C> {
    fn complete(mut self, outcome: Outcome) {
        if let Some(admission) = self.admission.take() {
            self.breaker.record(admission, outcome);
        }
    }
}

impl<C: Clock> Drop for CallPermit<'_, C> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.record(admission, Outcome::Neutral);
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the breaker state machine and its call wrappers

    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::error::{CommonError, ErrorKind};
    use crate::resilience::MockClock;

    fn breaker(threshold: u32, reset: Duration) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder()
            .name("test")
            .failure_threshold(threshold)
            .reset_timeout(reset)
            .build()
            .unwrap();
        (CircuitBreaker::with_clock(config, clock.clone()).unwrap(), clock)
    }

    fn fail() -> Result<(), CommonError> {
        Err(CommonError::internal("boom"))
    }

    fn succeed() -> Result<u32, CommonError> {
        Ok(7)
    }

    fn closed(machine: &Machine) -> Admission {
        Admission::Normal { generation: machine.generation }
    }

    // =========================================================================
    // Machine
    // =========================================================================

    #[test]
    fn test_machine_opens_at_threshold() {
        let now = Instant::now();
        let mut machine = Machine::new();
        let reset = Duration::from_secs(10);

        for _ in 0..2 {
            let admission = machine.admit(now, reset);
            assert_eq!(machine.record(admission, Outcome::Failure, now, 3), None);
        }
        let admission = machine.admit(now, reset);
        assert_eq!(machine.record(admission, Outcome::Failure, now, 3), Some(CircuitState::Open));
        assert_eq!(machine.opened_at, Some(now));
    }

    #[test]
    fn test_machine_success_resets_count() {
        let now = Instant::now();
        let mut machine = Machine::new();
        machine.record(closed(&machine), Outcome::Failure, now, 3);
        machine.record(closed(&machine), Outcome::Failure, now, 3);
        machine.record(closed(&machine), Outcome::Success, now, 3);
        assert_eq!(machine.consecutive_failures, 0);
        assert_eq!(machine.state, CircuitState::Closed);
    }

    #[test]
    fn test_machine_admits_single_trial() {
        let start = Instant::now();
        let reset = Duration::from_secs(5);
        let mut machine = Machine::new();
        machine.record(closed(&machine), Outcome::Failure, start, 1);

        let early = start + Duration::from_secs(2);
        assert_eq!(
            machine.admit(early, reset),
            Admission::Rejected { retry_after: Some(Duration::from_secs(3)) }
        );

        let later = start + reset;
        assert!(matches!(machine.admit(later, reset), Admission::Trial { .. }));
        assert_eq!(machine.state, CircuitState::HalfOpen);
        assert_eq!(machine.admit(later, reset), Admission::Rejected { retry_after: None });
    }

    #[test]
    fn test_machine_trial_failure_refreshes_opened_at() {
        let start = Instant::now();
        let reset = Duration::from_secs(5);
        let mut machine = Machine::new();
        machine.record(closed(&machine), Outcome::Failure, start, 1);

        let later = start + Duration::from_secs(6);
        let admission = machine.admit(later, reset);
        machine.record(admission, Outcome::Failure, later, 1);
        assert_eq!(machine.state, CircuitState::Open);
        assert_eq!(machine.opened_at, Some(later));
    }

    #[test]
    fn test_machine_neutral_trial_reopens_keeping_opened_at() {
        let start = Instant::now();
        let reset = Duration::from_secs(5);
        let mut machine = Machine::new();
        machine.record(closed(&machine), Outcome::Failure, start, 1);

        let later = start + Duration::from_secs(6);
        let admission = machine.admit(later, reset);
        machine.record(admission, Outcome::Neutral, later, 1);
        assert_eq!(machine.state, CircuitState::Open);
        assert_eq!(machine.opened_at, Some(start));
        assert!(matches!(machine.admit(later, reset), Admission::Trial { .. }));
    }

    #[test]
    fn test_machine_ignores_stale_normal_results() {
        let now = Instant::now();
        let mut machine = Machine::new();
        let slow = machine.admit(now, Duration::from_secs(1));
        machine.record(closed(&machine), Outcome::Failure, now, 1);
        assert_eq!(machine.state, CircuitState::Open);

        // A call admitted before the circuit opened finishes late.
        assert_eq!(machine.record(slow, Outcome::Success, now, 1), None);
        assert_eq!(machine.state, CircuitState::Open);
    }

    /// Validates that outcomes from an earlier closed period are ignored
    /// after the circuit recovers.
    ///
    /// Assertions:
    /// - A late failure does not count against the new closed period.
    /// - A late success does not clear failures of the new period.
    #[test]
    fn test_machine_ignores_results_from_before_recovery() {
        let start = Instant::now();
        let reset = Duration::from_secs(10);
        let mut machine = Machine::new();
        let slow_failure = machine.admit(start, reset);
        let slow_success = machine.admit(start, reset);

        machine.record(closed(&machine), Outcome::Failure, start, 2);
        machine.record(closed(&machine), Outcome::Failure, start, 2);
        assert_eq!(machine.state, CircuitState::Open);

        let later = start + reset;
        let trial = machine.admit(later, reset);
        machine.record(trial, Outcome::Success, later, 2);
        assert_eq!(machine.state, CircuitState::Closed);

        assert_eq!(machine.record(slow_failure, Outcome::Failure, later, 2), None);
        assert_eq!(machine.consecutive_failures, 0);

        machine.record(closed(&machine), Outcome::Failure, later, 2);
        machine.record(slow_success, Outcome::Success, later, 2);
        assert_eq!(machine.consecutive_failures, 1);
    }

    #[test]
    fn test_machine_trial_outcome_after_reset_is_stale() {
        let start = Instant::now();
        let reset = Duration::from_secs(5);
        let mut machine = Machine::new();
        machine.record(closed(&machine), Outcome::Failure, start, 1);

        let later = start + reset;
        let trial = machine.admit(later, reset);
        machine.reset();
        assert_eq!(machine.record(trial, Outcome::Failure, later, 1), None);
        assert_eq!(machine.state, CircuitState::Closed);
    }

    // =========================================================================
    // Breaker
    // =========================================================================

    #[test]
    fn test_config_rejects_zero_threshold() {
        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
    }

    /// Validates that the K-th failure opens the circuit.
    ///
    /// Assertions:
    /// - The operation error is returned for every failing call.
    /// - The next call is rejected without running the operation.
    #[test]
    fn test_opens_after_threshold_and_rejects() {
        let (breaker, _clock) = breaker(3, Duration::from_secs(30));

        for _ in 0..3 {
            let err = breaker.call(fail).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Operation);
            assert!(err.to_string().contains("boom"));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let err = breaker
            .call(|| {
                invoked.fetch_add(1, Ordering::SeqCst);
                succeed()
            })
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    #[test]
    fn test_trial_success_closes() {
        let (breaker, clock) = breaker(1, Duration::from_secs(10));
        let _ = breaker.call(fail);
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(10));
        assert_eq!(breaker.call(succeed).unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 0);
    }

    #[test]
    fn test_trial_failure_returns_operation_error_and_reopens() {
        let (breaker, clock) = breaker(1, Duration::from_secs(10));
        let _ = breaker.call(fail);

        clock.advance(Duration::from_secs(11));
        let err = breaker.call(fail).unwrap_err();
        assert!(!err.is_circuit_open(), "trial outcome is transparent");
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(5));
        assert!(breaker.call(succeed).unwrap_err().is_circuit_open());
    }

    #[test]
    fn test_reset_closes_circuit() {
        let (breaker, _clock) = breaker(1, Duration::from_secs(60));
        let _ = breaker.call(fail);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.call(succeed).is_ok());
    }

    #[tokio::test]
    async fn test_execute_async() {
        let (breaker, _clock) = breaker(2, Duration::from_secs(60));
        let value = breaker.execute(|| async { Ok::<_, CommonError>(42) }).await.unwrap();
        assert_eq!(value, 42);

        for _ in 0..2 {
            let _ = breaker.execute(|| async { fail() }).await;
        }
        let err = breaker.execute(|| async { succeed() }).await.unwrap_err();
        assert!(err.is_circuit_open());
    }

    /// Validates that a slow call admitted before the circuit opened does
    /// not count against the circuit after it recovers.
    ///
    /// Assertions:
    /// - The slow call's late failure leaves the failure count at 0.
    /// - The circuit stays closed.
    #[tokio::test]
    async fn test_late_failure_after_recovery_is_ignored() {
        let (breaker, clock) = breaker(2, Duration::from_secs(10));
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let slow = breaker.execute(|| async move {
            let _ = released.await;
            Err::<(), _>(CommonError::internal("stale"))
        });
        tokio::pin!(slow);
        assert!(futures::poll!(&mut slow).is_pending());

        let _ = breaker.call(fail);
        let _ = breaker.call(fail);
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(10));
        assert_eq!(breaker.call(succeed).unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);

        release.send(()).unwrap();
        assert!(slow.await.is_err());
        assert_eq!(breaker.metrics().consecutive_failures, 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_filtered_errors_do_not_count() {
        let (breaker, _clock) = breaker(1, Duration::from_secs(60));
        let err = breaker
            .execute_filtered(
                || async { Err::<(), _>(CommonError::task_cancelled("run")) },
                |e| !matches!(e, CommonError::TaskCancelled { .. }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_trial_reopens() {
        let (breaker, clock) = breaker(1, Duration::from_secs(10));
        let _ = breaker.call(fail);
        clock.advance(Duration::from_secs(10));

        let trial = breaker.execute(|| async {
            std::future::pending::<()>().await;
            succeed()
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), trial).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.call(succeed).unwrap(), 7, "next caller gets a fresh trial");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_get_one_trial() {
        let (breaker, clock) = breaker(1, Duration::from_secs(10));
        let _ = breaker.call(fail);
        clock.advance(Duration::from_secs(10));

        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let invoked = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let breaker = breaker.clone();
            let invoked = Arc::clone(&invoked);
            let release_rx = release_rx.clone();
            handles.push(tokio::spawn(async move {
                breaker
                    .execute(|| async move {
                        invoked.fetch_add(1, Ordering::SeqCst);
                        let mut release_rx = release_rx;
                        let _ = release_rx.wait_for(|released| *released).await;
                        succeed()
                    })
                    .await
            }));
        }

        // Give every task time to reach admission before releasing the trial.
        tokio::time::sleep(Duration::from_millis(50)).await;
        release_tx.send(true).unwrap();

        let mut rejected = 0;
        for handle in handles {
            if let Err(err) = handle.await.unwrap() {
                assert!(err.is_circuit_open());
                rejected += 1;
            }
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(rejected, 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
