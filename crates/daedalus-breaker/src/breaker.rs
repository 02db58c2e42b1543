//! The circuit breaker state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{BreakerConfig, TripPolicy};
use crate::error::{BreakerError, BreakerResult};
use crate::state::{Counts, State};

/// Callback invoked on every state transition with `(name, from, to)`.
pub type StateChangeHook = Arc<dyn Fn(&str, State, State) + Send + Sync>;

#[derive(Debug)]
struct Inner {
    state: State,
    generation: u64,
    counts: Counts,
    /// Closed: next counter reset. Open: end of the timeout. Half-open: unused.
    expiry: Option<Instant>,
}

/// A named circuit breaker.
///
/// Closed breakers count outcomes and open when the trip policy says so.
/// Open breakers reject calls until the timeout passes, then let up to
/// `max_requests` probes through in half-open. That many consecutive
/// successes close the breaker; any failure re-opens it.
///
/// # Example
///
/// ```rust
/// use daedalus_breaker::{Breaker, BreakerConfig, BreakerError, State};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = Breaker::new("db", &BreakerConfig::consecutive_failures(1));
///
/// let failed: Result<(), BreakerError> = breaker
///     .execute(async { Err(BreakerError::InvalidConfig("boom".into())) })
///     .await;
/// assert!(failed.is_err());
/// assert_eq!(breaker.state(), State::Open);
///
/// let rejected: Result<(), BreakerError> = breaker.execute(async { Ok(()) }).await;
/// assert!(matches!(rejected, Err(BreakerError::Open(_))));
/// # }
/// ```
pub struct Breaker {
    name: String,
    policy: TripPolicy,
    interval: Option<Duration>,
    timeout: Duration,
    max_requests: u32,
    on_state_change: Option<StateChangeHook>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Breaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("max_requests", &self.max_requests)
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl Breaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        let interval = config.interval();
        Self {
            name: name.into(),
            policy: config.policy.policy(),
            interval,
            timeout: config.timeout(),
            max_requests: config.max_requests(),
            on_state_change: None,
            inner: Mutex::new(Inner {
                state: State::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: interval.map(|i| Instant::now() + i),
            }),
        }
    }

    /// Registers a transition callback.
    #[must_use]
    pub fn with_state_change(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state, applying any pending timed transition.
    #[must_use]
    pub fn state(&self) -> State {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now())
    }

    /// Returns the counters of the current generation.
    #[must_use]
    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Runs `fut` if the breaker admits it and counts `Err` as a failure.
    ///
    /// When the breaker rejects the call, `fut` is never polled.
    pub async fn execute<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<BreakerError>,
    {
        self.call(fut, Result::is_ok).await?
    }

    /// Runs `fut` if the breaker admits it; `is_success` classifies the output.
    ///
    /// A call dropped before completing, including by a panic, counts as a
    /// failure.
    pub async fn call<F, P>(&self, fut: F, is_success: P) -> BreakerResult<F::Output>
    where
        F: Future,
        P: FnOnce(&F::Output) -> bool,
    {
        let generation = self.before_request()?;
        let mut guard = OutcomeGuard {
            breaker: self,
            generation,
            armed: true,
        };
        let output = fut.await;
        guard.armed = false;
        self.after_request(generation, is_success(&output));
        Ok(output)
    }

    /// Records a failed no-op call, as if a wrapped call had failed.
    pub fn record_failure(&self) -> BreakerResult<()> {
        let generation = self.before_request()?;
        self.after_request(generation, false);
        Ok(())
    }

    /// Records a successful no-op call.
    pub fn record_success(&self) -> BreakerResult<()> {
        let generation = self.before_request()?;
        self.after_request(generation, true);
        Ok(())
    }

    fn before_request(&self) -> BreakerResult<u64> {
        let mut inner = self.inner.lock();
        let state = self.current_state(&mut inner, Instant::now());
        match state {
            State::Open => return Err(BreakerError::Open(self.name.clone())),
            State::HalfOpen if inner.counts.requests >= self.max_requests => {
                return Err(BreakerError::TooManyRequests(self.name.clone()));
            }
            State::Closed | State::HalfOpen => {}
        }
        inner.counts.on_request();
        Ok(inner.generation)
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let state = self.current_state(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        if success {
            inner.counts.on_success();
            if state == State::HalfOpen && inner.counts.consecutive_successes >= self.max_requests
            {
                self.set_state(&mut inner, State::Closed, now);
            }
        } else {
            inner.counts.on_failure();
            match state {
                State::Closed if self.policy.should_trip(&inner.counts) => {
                    self.set_state(&mut inner, State::Open, now);
                }
                State::HalfOpen => self.set_state(&mut inner, State::Open, now),
                State::Closed | State::Open => {}
            }
        }
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) -> State {
        match inner.state {
            State::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            State::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, State::HalfOpen, now);
                }
            }
            State::HalfOpen => {}
        }
        inner.state
    }

    fn set_state(&self, inner: &mut Inner, to: State, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.new_generation(inner, now);

        match to {
            State::Open => tracing::warn!(breaker = %self.name, %from, %to, "circuit breaker state changed"),
            State::Closed | State::HalfOpen => {
                tracing::info!(breaker = %self.name, %from, %to, "circuit breaker state changed");
            }
        }
        if let Some(hook) = &self.on_state_change {
            hook(&self.name, from, to);
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts.clear();
        inner.expiry = match inner.state {
            State::Closed => self.interval.map(|i| now + i),
            State::Open => Some(now + self.timeout),
            State::HalfOpen => None,
        };
    }
}

struct OutcomeGuard<'a> {
    breaker: &'a Breaker,
    generation: u64,
    armed: bool,
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.after_request(self.generation, false);
        }
    }
}
