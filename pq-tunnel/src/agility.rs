//! Health-driven suite selection
//!
//! The controller never touches a live session. It resolves the suite a new
//! session should use and, when the signal moves far enough to call for a
//! different one, broadcasts a [`SuiteChange`] so the session layer can
//! tear down and re-establish.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::{AgilityPolicy, FallbackPolicy, TunnelConfig};
use crate::error::{Result, TunnelError};
use crate::registry::SuiteRegistry;
use crate::suite::{SuiteDescriptor, SuiteId};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Health of the environment, 0 (collapsed) to 100 (nominal)
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64")]
pub struct HealthSignal(f64);

impl HealthSignal {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    /// Rejects NaN and anything outside 0..=100.
    pub fn new(value: f64) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TunnelError::InvalidHealth(value))
        }
    }

    /// Clamps into range; NaN reads as fully degraded.
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self(Self::MIN)
        } else {
            Self(value.clamp(Self::MIN, Self::MAX))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for HealthSignal {
    type Error = TunnelError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for HealthSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Renegotiation is due: the signal now resolves to `next`
#[derive(Clone, Debug, PartialEq)]
pub struct SuiteChange {
    /// Suite backing the active session
    pub previous: SuiteId,
    pub next: SuiteId,
    pub health: HealthSignal,
}

#[derive(Debug, Default)]
struct ControllerState {
    active: Option<SuiteId>,
    pending: Option<SuiteId>,
}

pub struct AgilityController {
    registry: Arc<SuiteRegistry>,
    hysteresis: f64,
    fallback_policy: FallbackPolicy,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<SuiteChange>,
}

impl AgilityController {
    pub fn new(registry: Arc<SuiteRegistry>, policy: &AgilityPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            hysteresis: policy.hysteresis,
            fallback_policy: policy.fallback_policy,
            state: Mutex::new(ControllerState::default()),
            events,
        }
    }

    /// Build the registry and controller from one configuration.
    pub fn from_config(config: &TunnelConfig) -> Result<Self> {
        let registry = Arc::new(SuiteRegistry::from_config(config)?);
        Ok(Self::new(registry, &config.agility))
    }

    pub fn registry(&self) -> &Arc<SuiteRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SuiteChange> {
        self.events.subscribe()
    }

    /// Suite the current session was established with, if any
    pub fn active_suite(&self) -> Option<SuiteId> {
        self.lock().active
    }

    /// Suite announced by the last unacknowledged change, if any
    pub fn pending_suite(&self) -> Option<SuiteId> {
        self.lock().pending
    }

    /// Resolve the suite a new session should use and record it as active.
    pub fn select_suite(&self, health: HealthSignal) -> Result<SuiteDescriptor> {
        let mut state = self.lock();
        let descriptor = self.resolve(health, state.active);
        self.check_policy(descriptor, health)?;
        state.active = Some(descriptor.id);
        state.pending = None;
        tracing::debug!(suite = %descriptor.id, %health, "suite selected");
        Ok(descriptor.clone())
    }

    /// Re-evaluate against a new sample.
    ///
    /// Returns the change if one was emitted. Nothing is emitted while no
    /// session is active, and a target that was already announced and not
    /// yet acknowledged is not announced again.
    pub fn on_health_change(&self, health: HealthSignal) -> Result<Option<SuiteChange>> {
        let mut state = self.lock();
        let Some(active) = state.active else {
            return Ok(None);
        };
        let target = self.resolve(health, Some(active));

        if active == target.id {
            state.pending = None;
            return Ok(None);
        }
        if state.pending == Some(target.id) {
            return Ok(None);
        }
        self.check_policy(target, health)?;

        let change = SuiteChange {
            previous: active,
            next: target.id,
            health,
        };
        state.pending = Some(target.id);
        drop(state);

        tracing::info!(
            previous = %change.previous,
            next = %change.next,
            %health,
            "suite renegotiation due"
        );
        // No subscribers is fine; the change is also returned.
        let _ = self.events.send(change.clone());
        Ok(Some(change))
    }

    /// The session layer has re-established on `suite`.
    pub fn acknowledge(&self, suite: SuiteId) {
        let mut state = self.lock();
        state.active = Some(suite);
        if state.pending == Some(suite) {
            state.pending = None;
        }
    }

    fn resolve(&self, health: HealthSignal, active: Option<SuiteId>) -> &SuiteDescriptor {
        let raw = self.registry.resolve(health);
        let Some(active) = active else {
            return raw;
        };
        if self.hysteresis <= 0.0 || raw.id == active {
            return raw;
        }
        let (Some(current), Some(active_threshold)) =
            (self.registry.get(active), self.registry.threshold_of(active))
        else {
            return raw;
        };
        let raw_threshold = self.registry.threshold_of(raw.id).unwrap_or(0.0);

        if raw_threshold > active_threshold {
            // Moving up must clear the higher threshold by the margin.
            let damped = self.registry.resolve_value(health.value() - self.hysteresis);
            let damped_threshold = self.registry.threshold_of(damped.id).unwrap_or(0.0);
            if damped_threshold > active_threshold {
                damped
            } else {
                current
            }
        } else if health.value() < active_threshold - self.hysteresis {
            raw
        } else {
            current
        }
    }

    fn check_policy(&self, descriptor: &SuiteDescriptor, health: HealthSignal) -> Result<()> {
        if descriptor.post_quantum {
            return Ok(());
        }
        match self.fallback_policy {
            FallbackPolicy::Accept => Ok(()),
            FallbackPolicy::Warn => {
                tracing::warn!(
                    suite = %descriptor.id,
                    %health,
                    "selected suite has no post-quantum protection"
                );
                Ok(())
            }
            FallbackPolicy::Refuse => Err(TunnelError::PolicyRefused(descriptor.id)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        // Bookkeeping stays consistent across a panic in another holder.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
