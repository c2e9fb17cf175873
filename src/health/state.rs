//! Backend health state machine.
//!
//! # States
//! - Unknown: never probed; takes traffic under the optimistic startup policy
//! - Healthy: last probe succeeded
//! - Unhealthy: excluded from selection
//!
//! # State Transitions
//! ```text
//! Unknown → Healthy:   probe succeeded
//! Unknown → Unhealthy: probe or forward failed
//! Healthy → Unhealthy: probe or forward failed
//! Unhealthy → Healthy: probe succeeded
//! ```
//!
//! Only the prober moves a backend back to Healthy. The request path can only
//! mark backends failed.

use crate::config::InitialHealth;

/// Health of a single backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl HealthState {
    /// Whether the router may hand this backend out.
    pub fn is_selectable(self) -> bool {
        !matches!(self, HealthState::Unhealthy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InitialHealth> for HealthState {
    fn from(policy: InitialHealth) -> Self {
        match policy {
            InitialHealth::Optimistic => HealthState::Unknown,
            InitialHealth::Pessimistic => HealthState::Unhealthy,
        }
    }
}
