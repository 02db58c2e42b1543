//! Lazily created breakers keyed by name.

use std::sync::Arc;

use dashmap::DashMap;

use crate::breaker::{Breaker, StateChangeHook};
use crate::config::BreakerConfig;
use crate::state::State;

/// Owns one [`Breaker`] per name, all built from the same config.
///
/// # Example
///
/// ```rust
/// use daedalus_breaker::{BreakerConfig, BreakerManager, State};
///
/// let manager = BreakerManager::new(BreakerConfig::consecutive_failures(2));
/// manager.break_n("/orders", 2);
///
/// assert_eq!(manager.get("/orders").state(), State::Open);
/// assert_eq!(manager.get("/users").state(), State::Closed);
/// ```
pub struct BreakerManager {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<Breaker>>,
    on_state_change: Option<StateChangeHook>,
}

impl std::fmt::Debug for BreakerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerManager")
            .field("config", &self.config)
            .field("breakers", &self.breakers.len())
            .finish_non_exhaustive()
    }
}

impl BreakerManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            on_state_change: None,
        }
    }

    /// Installs a transition callback on every breaker created afterwards.
    #[must_use]
    pub fn with_state_change(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    /// Returns the shared config.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the breaker for `name`, creating it on first use.
    ///
    /// Concurrent first calls for one name create a single breaker.
    pub fn get(&self, name: &str) -> Arc<Breaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }
        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            let breaker = Breaker::new(name, &self.config);
            let breaker = match &self.on_state_change {
                Some(hook) => breaker.with_state_change(Arc::clone(hook)),
                None => breaker,
            };
            tracing::debug!(breaker = %name, "circuit breaker created");
            Arc::new(breaker)
        });
        Arc::clone(entry.value())
    }

    /// Records `n` failed no-op calls against `name`.
    ///
    /// Stops early once the breaker rejects calls.
    pub fn break_n(&self, name: &str, n: u32) {
        let breaker = self.get(name);
        for _ in 0..n {
            if breaker.record_failure().is_err() {
                break;
            }
        }
    }

    /// Returns the state of every known breaker.
    #[must_use]
    pub fn states(&self) -> Vec<(String, State)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }

    /// Returns the number of breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true when no breaker exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_is_single_flighted() {
        let manager = Arc::new(BreakerManager::new(BreakerConfig::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.get("shared"))
            })
            .collect();
        let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(breakers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_break_n_opens_only_that_breaker() {
        let manager = BreakerManager::new(BreakerConfig::consecutive_failures(3));
        manager.break_n("a", 2);
        assert_eq!(manager.get("a").state(), State::Closed);

        manager.break_n("a", 1);
        assert_eq!(manager.get("a").state(), State::Open);
        assert_eq!(manager.get("b").state(), State::Closed);

        let mut states = manager.states();
        states.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(
            states,
            vec![("a".to_string(), State::Open), ("b".to_string(), State::Closed)]
        );
    }

    #[test]
    fn test_hook_applies_to_new_breakers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let manager = BreakerManager::new(BreakerConfig::consecutive_failures(1))
            .with_state_change(Arc::new(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        manager.break_n("x", 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
