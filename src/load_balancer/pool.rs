//! Backend registry and selection.
//!
//! # Responsibilities
//! - Hold the ordered backend set (rotation order = configuration order)
//! - Own the health map shared by the request path and the prober
//! - Select the next healthy backend in round-robin order

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::BalancerConfig;
use crate::health::state::HealthState;
use crate::load_balancer::{
    backend::{Backend, BackendStatus},
    round_robin::RoundRobin,
    Algorithm, RouterError,
};

/// Backend registry with health tracking.
///
/// The backend list is immutable after construction. Health flags are keyed
/// by normalized address in a single map; flips are rare compared to reads,
/// so one reader/writer lock covers all of them.
#[derive(Debug)]
pub struct Router {
    backends: Vec<Arc<Backend>>,
    health: RwLock<HashMap<String, HealthState>>,
    cursor: RoundRobin,
}

impl Router {
    /// Build a router over `addresses`, all starting in `initial` state.
    ///
    /// Fails if the list is empty or any address is invalid.
    pub fn new<I, S>(addresses: I, initial: HealthState) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backends = addresses
            .into_iter()
            .map(|a| Backend::parse(a.as_ref()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        if backends.is_empty() {
            return Err(RouterError::NoAvailableBackends);
        }

        let health = backends
            .iter()
            .map(|b| (b.address().to_string(), initial))
            .collect();

        Ok(Self {
            backends,
            health: RwLock::new(health),
            cursor: RoundRobin::new(),
        })
    }

    /// Build a router from the `[balancer]` section.
    pub fn from_config(config: &BalancerConfig, initial: HealthState) -> Result<Self, RouterError> {
        match Algorithm::from_name(&config.algorithm) {
            Algorithm::RoundRobin => {
                let router = Self::new(config.backends.iter().map(|b| b.url.as_str()), initial)?;
                tracing::info!(
                    backends = router.len(),
                    initial_state = %initial,
                    "Round-robin router ready"
                );
                Ok(router)
            }
        }
    }

    /// Number of configured backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Select the next selectable backend in rotation order.
    pub fn next(&self) -> Result<Arc<Backend>, RouterError> {
        let len = self.backends.len();
        if len == 0 {
            return Err(RouterError::NoAvailableBackends);
        }

        let health = self.read_health();
        let selectable = |b: &Arc<Backend>| {
            health
                .get(b.address())
                .copied()
                .unwrap_or_default()
                .is_selectable()
        };

        if !self.backends.iter().any(|b| selectable(b)) {
            return Err(RouterError::AllBackendsDown);
        }

        // Each attempt claims a fresh slot, so a skipped backend hands its
        // turn to the next one instead of doubling a neighbour's share.
        for _ in 0..len {
            let backend = &self.backends[self.cursor.claim(len)];
            if selectable(backend) {
                return Ok(backend.clone());
            }
        }

        // Concurrent claims can interleave with ours and hide the healthy
        // slot from this sweep.
        self.backends
            .iter()
            .find(|&b| selectable(b))
            .cloned()
            .ok_or(RouterError::AllBackendsDown)
    }

    /// Flag `backend` unhealthy. Returns true if this call changed its state.
    ///
    /// Unknown backends and backends already failed are left alone.
    pub fn mark_failed(&self, backend: &Backend) -> bool {
        self.transition(backend, HealthState::Unhealthy)
    }

    /// Flag `backend` healthy. Returns true if this call changed its state.
    pub fn mark_recovered(&self, backend: &Backend) -> bool {
        self.transition(backend, HealthState::Healthy)
    }

    fn transition(&self, backend: &Backend, to: HealthState) -> bool {
        // Cheap check first; the write lock is only taken for a real flip.
        match self.read_health().get(backend.address()) {
            Some(state) if *state != to => {}
            _ => return false,
        }

        let mut health = self.write_health();
        match health.get_mut(backend.address()) {
            Some(state) if *state != to => {
                *state = to;
                true
            }
            _ => false,
        }
    }

    /// Current state of `backend`, if it is registered.
    pub fn state_of(&self, backend: &Backend) -> Option<HealthState> {
        self.read_health().get(backend.address()).copied()
    }

    /// Snapshot of every backend with its current health, in rotation order.
    pub fn list_backends(&self) -> Vec<BackendStatus> {
        let health = self.read_health();
        self.backends
            .iter()
            .map(|b| BackendStatus {
                backend: b.clone(),
                state: health.get(b.address()).copied().unwrap_or_default(),
            })
            .collect()
    }

    fn read_health(&self) -> RwLockReadGuard<'_, HashMap<String, HealthState>> {
        self.health.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_health(&self) -> RwLockWriteGuard<'_, HashMap<String, HealthState>> {
        self.health.write().unwrap_or_else(PoisonError::into_inner)
    }
}
